use super::state::TotalBytes;

/// 进度节流：每块数据都写入持久化，但只按调用方要求的次数通知观察者
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    callback_times: i32,
    /// None 表示不发中间进度通知
    notify_interval: Option<u64>,
    last_notified: u64,
}

impl ProgressReporter {
    pub fn new(callback_times: i32) -> Self {
        Self {
            callback_times: callback_times.max(0),
            notify_interval: None,
            last_notified: 0,
        }
    }

    /// 每次连接成功后按新的总大小重新计算通知间隔。
    /// 总大小未知时每块数据都可以通知
    pub fn begin_attempt(&mut self, so_far: u64, total: TotalBytes) {
        self.notify_interval = if self.callback_times == 0 {
            None
        } else {
            Some(match total {
                TotalBytes::Known(total) => total / self.callback_times as u64,
                TotalBytes::Unknown => 0,
            })
        };
        self.last_notified = so_far;
    }

    pub fn notify_interval(&self) -> Option<u64> {
        self.notify_interval
    }

    /// 最后一块（so_far == total）由完成流程写入
    pub fn should_persist(so_far: u64, total: TotalBytes) -> bool {
        total != TotalBytes::Known(so_far)
    }

    /// 距上次通知累计到间隔字节数才通知，并推进水位
    pub fn should_notify(&mut self, so_far: u64) -> bool {
        let Some(interval) = self.notify_interval else {
            return false;
        };
        if so_far.saturating_sub(self.last_notified) < interval {
            return false;
        }
        self.last_notified = so_far;
        true
    }
}
