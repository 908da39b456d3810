use serde::{Serialize, Deserialize};
use std::fmt;

/// 下载任务状态
///
/// `Pending → Connected → Progress* → (Completed | Paused | Retry → Connected | Error)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Connected,
    Progress,
    Completed,
    Paused,
    Error,
    Retry,
}

impl TaskStatus {
    /// 任务整体的终态（错误状态只在放弃重试后才会设置）
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Paused | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Connected => "connected",
            TaskStatus::Progress => "progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Paused => "paused",
            TaskStatus::Error => "error",
            TaskStatus::Retry => "retry",
        };
        f.write_str(s)
    }
}

/// 文件总大小，chunked 传输在结束前是未知的
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalBytes {
    #[default]
    Unknown,
    Known(u64),
}

impl TotalBytes {
    pub fn known(self) -> Option<u64> {
        match self {
            TotalBytes::Known(total) => Some(total),
            TotalBytes::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, TotalBytes::Known(_))
    }
}

impl From<Option<u64>> for TotalBytes {
    fn from(value: Option<u64>) -> Self {
        value.map(TotalBytes::Known).unwrap_or(TotalBytes::Unknown)
    }
}

impl fmt::Display for TotalBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TotalBytes::Known(total) => write!(f, "{}", total),
            TotalBytes::Unknown => f.write_str("未知"),
        }
    }
}

/// 单个任务的传输状态，只由任务自己的工作线程修改；
/// 发布事件时整体克隆一份，不会跨线程共享引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    pub status: TaskStatus,
    pub so_far: u64,
    pub total: TotalBytes,
    pub etag: Option<String>,
    /// 本次连接是否为断点续传（206）
    pub is_continue: bool,
    pub retry_count: u32,
    /// 最近一次失败的原因（已过滤的错误信息）
    pub error: Option<String>,
}

impl TransferState {
    pub fn new(status: TaskStatus, so_far: u64, total: TotalBytes, etag: Option<String>) -> Self {
        Self {
            status,
            so_far,
            total,
            etag,
            is_continue: false,
            retry_count: 0,
            error: None,
        }
    }

    /// 百分比进度，总大小未知时为 None
    pub fn percent(&self) -> Option<f32> {
        match self.total {
            TotalBytes::Known(0) => Some(100.0),
            TotalBytes::Known(total) => Some(self.so_far as f32 / total as f32 * 100.0),
            TotalBytes::Unknown => None,
        }
    }
}
