use serde::{Serialize, Deserialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::headers::HeaderList;
use super::state::{TaskStatus, TotalBytes, TransferState};

pub type TaskId = Uuid;

/// 单向的取消信号：一旦置位就不会再复位，工作线程无锁轮询
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 任务记录：持久化层保存的任务描述
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskRecord {
    pub id: TaskId,
    pub url: String,
    pub path: String,
    /// 整个下载过程中希望收到的进度回调次数，<= 0 表示不回调中间进度
    pub callback_progress_times: i32,
    #[serde(default)]
    pub headers: Option<HeaderList>,
    pub status: TaskStatus,
    pub so_far: u64,
    pub total: TotalBytes,
    pub etag: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// 只在内存中存在，克隆后共享同一个信号
    #[serde(skip)]
    pub canceled: CancelFlag,
}

impl TaskRecord {
    pub fn new(url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            path: path.into(),
            callback_progress_times: 0,
            headers: None,
            status: TaskStatus::Pending,
            so_far: 0,
            total: TotalBytes::Unknown,
            etag: None,
            error_message: None,
            retry_count: 0,
            canceled: CancelFlag::new(),
        }
    }

    pub fn with_callback_progress_times(mut self, times: i32) -> Self {
        self.callback_progress_times = times;
        self
    }

    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.headers = if headers.is_empty() { None } else { Some(headers) };
        self
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.is_cancelled()
    }

    /// 由记录构造本次运行的传输状态
    pub fn transfer_state(&self) -> TransferState {
        TransferState::new(self.status, self.so_far, self.total, self.etag.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let record = TaskRecord::new("https://example.com/a.zip", "/tmp/a.zip");
        let copy = record.clone();
        assert!(!copy.is_canceled());
        record.canceled.cancel();
        assert!(copy.is_canceled());
    }

    #[test]
    fn test_record_json_skips_cancel_flag() {
        let record = TaskRecord::new("https://example.com/a.zip", "/tmp/a.zip").with_callback_progress_times(4);
        record.canceled.cancel();
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("canceled"));
        let loaded: TaskRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.callback_progress_times, 4);
        assert!(!loaded.is_canceled());
    }

    #[test]
    fn test_empty_headers_are_dropped() {
        let record = TaskRecord::new("u", "p").with_headers(HeaderList::new());
        assert!(record.headers.is_none());
    }
}
