//! `task` 模块包含了与单个下载任务相关的所有逻辑
//!
//! 主要包括：
//! - `runner`: `DownloadTask` 的定义、状态流转与重试循环
//! - `download`: 单次尝试的实际下载逻辑
//! - `resume`: 断点续传判断
//! - `etag`: ETag 记录
//! - `progress`: 进度通知节流
//! - `retry`: 重试策略
//! - `record`: 持久化的任务记录与取消信号
//! - `state`: 任务状态 `TaskStatus` 与传输状态
//! - `util`: 目标文件写入

pub mod runner;
pub mod state;
pub mod record;
pub mod download;
pub mod resume;
pub mod etag;
pub mod progress;
pub mod retry;
pub mod util;


// 导出核心组件，方便外部使用
pub use runner::{DownloadTask, DownloadTaskBuilder, TaskHandle, TaskOutcome};
pub use record::{CancelFlag, TaskId, TaskRecord};
pub use state::{TaskStatus, TotalBytes, TransferState};
pub use resume::{BreakpointCheck, FileBreakpointCheck, ResumeCandidate};
pub use retry::{RetryDecision, RetryPolicy};
