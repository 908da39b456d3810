use actix::prelude::*;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;

use crate::core::events::TransferEvent;
use crate::core::task::{TaskId, TaskStatus, TotalBytes};

/// 消息：为任务创建进度条
pub struct Track {
    pub id: TaskId,
    pub name: String,
}
impl Message for Track { type Result = (); }

/// 订阅事件池，把传输事件画成进度条
pub struct ProgressActor {
    multi: MultiProgress,
    bars: HashMap<TaskId, ProgressBar>,
}

impl ProgressActor {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// 测试里用 `ProgressDrawTarget::hidden()`
    pub fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
        }
    }

    fn bytes_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{prefix:20!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA:{eta} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
    }

    /// 总大小未知时没有进度条长度，只显示已下载字节数
    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:20!} {spinner} {bytes} {bytes_per_sec} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn apply(&mut self, event: &TransferEvent) {
        let Some(pb) = self.bars.get(&event.id) else {
            log::debug!("收到未跟踪任务的事件: {}", event.id);
            return;
        };
        let state = &event.state;
        match state.status {
            TaskStatus::Connected => {
                match state.total {
                    TotalBytes::Known(total) => {
                        pb.set_style(Self::bytes_style());
                        pb.set_length(total);
                    }
                    TotalBytes::Unknown => pb.set_style(Self::spinner_style()),
                }
                pb.set_position(state.so_far);
                pb.set_message(if state.is_continue { "续传中" } else { "下载中" });
            }
            TaskStatus::Progress => pb.set_position(state.so_far),
            TaskStatus::Retry => {
                let reached = state.percent().map(|p| format!(" ({:.0}%)", p)).unwrap_or_default();
                pb.set_message(format!(
                    "重试 {}{} : {}",
                    state.retry_count,
                    reached,
                    state.error.as_deref().unwrap_or_default()
                ));
            }
            TaskStatus::Completed => {
                pb.set_length(state.so_far);
                pb.set_position(state.so_far);
                pb.finish_with_message("✓ 完成");
            }
            TaskStatus::Paused => pb.abandon_with_message("已暂停"),
            TaskStatus::Error => {
                pb.abandon_with_message(format!("✗ {}", state.error.as_deref().unwrap_or("未知错误")));
            }
            TaskStatus::Pending => pb.set_message("等待中"),
        }
        // 结束后的进度条不再接收事件
        if state.status.is_terminal() {
            self.bars.remove(&event.id);
        }
    }
}

impl Default for ProgressActor {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for ProgressActor {
    type Context = Context<Self>;
}

impl Handler<Track> for ProgressActor {
    type Result = ();
    fn handle(&mut self, msg: Track, _ctx: &mut Self::Context) {
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(Self::bytes_style());
        pb.set_prefix(msg.name);
        pb.set_message("等待中");
        self.bars.insert(msg.id, pb);
    }
}

impl Handler<TransferEvent> for ProgressActor {
    type Result = ();
    fn handle(&mut self, msg: TransferEvent, _ctx: &mut Self::Context) {
        self.apply(&msg);
    }
}

/// 查询进度条当前位置，只在测试中使用
#[cfg(test)]
struct Position(TaskId);
#[cfg(test)]
impl Message for Position { type Result = Option<(u64, Option<u64>, bool)>; }
#[cfg(test)]
impl Handler<Position> for ProgressActor {
    type Result = Option<(u64, Option<u64>, bool)>;
    fn handle(&mut self, msg: Position, _ctx: &mut Self::Context) -> Self::Result {
        self.bars.get(&msg.0).map(|pb| (pb.position(), pb.length(), pb.is_finished()))
    }
}
