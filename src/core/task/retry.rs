use std::time::Duration;
use crate::core::error::{DownloadError, ErrorKind};

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 自动重试次数上限，0 表示不重试
    pub max_retries: u32,
    /// 第一次重试前的等待时间，为 0 时立即重试
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 添加抖动因子避免重试风暴
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// 一次失败之后的处置
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// 第 `attempt` 次重试，等待 `delay` 后开始
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

impl RetryPolicy {
    /// `retries_made` 是此前已经进行的重试次数
    pub fn decide(&self, error: &DownloadError, retries_made: u32) -> RetryDecision {
        match error.kind() {
            ErrorKind::GiveUp | ErrorKind::Integrity | ErrorKind::Setup => RetryDecision::GiveUp,
            ErrorKind::Transport | ErrorKind::Unclassified => {
                if retries_made >= self.max_retries {
                    return RetryDecision::GiveUp;
                }
                let attempt = retries_made + 1;
                RetryDecision::Retry { attempt, delay: self.get_delay(attempt) }
            }
        }
    }

    pub fn get_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let delay_secs = self.base_delay.as_secs_f64() *
            self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        // 添加抖动避免重试风暴
        let jitter = delay_secs * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = delay_secs + jitter;

        let delay = Duration::from_secs_f64(final_delay.max(0.1)); // 最小延迟100ms
        delay.min(self.max_delay)
    }
}
