use actix::prelude::*;

use crate::core::task::record::TaskId;
use crate::core::task::state::TransferState;

/// 传输事件，携带发布时刻传输状态的完整拷贝
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub id: TaskId,
    pub state: TransferState,
}
impl Message for TransferEvent { type Result = (); }

/// 事件发布：调用方不等待投递完成
pub trait EventPublisher: Send {
    fn publish(&self, event: TransferEvent);
}

/// 订阅传输事件
pub struct Subscribe(pub Recipient<TransferEvent>);
impl Message for Subscribe { type Result = (); }

/// 事件池 Actor，在自己的线程上把事件分发给所有订阅者
#[derive(Default)]
pub struct EventPoolActor {
    subscribers: Vec<Recipient<TransferEvent>>,
}

impl Actor for EventPoolActor {
    type Context = Context<Self>;
}

impl Handler<Subscribe> for EventPoolActor {
    type Result = ();
    fn handle(&mut self, msg: Subscribe, _ctx: &mut Self::Context) {
        self.subscribers.push(msg.0);
    }
}

impl Handler<TransferEvent> for EventPoolActor {
    type Result = ();
    fn handle(&mut self, msg: TransferEvent, _ctx: &mut Self::Context) {
        // 订阅者已停止则移除
        self.subscribers.retain(|subscriber| match subscriber.try_send(msg.clone()) {
            Ok(()) => true,
            Err(SendError::Full(_)) => {
                log::warn!("订阅者邮箱已满，丢弃事件 {} {}", msg.id, msg.state.status);
                true
            }
            Err(SendError::Closed(_)) => false,
        });
    }
}

impl EventPublisher for Addr<EventPoolActor> {
    fn publish(&self, event: TransferEvent) {
        self.do_send(event);
    }
}
