//! Core: 下载任务的执行引擎，以及它依赖的持久化、事件、传输等外部协作者

pub mod error;
pub mod events;
pub mod headers;
pub mod store;
pub mod task;
pub mod transport;
pub mod worker;

// 只导出主流程和其它模块实际用到的类型
pub use error::{DownloadError, DownloadResult, ErrorKind};
pub use events::{EventPoolActor, EventPublisher, Subscribe, TransferEvent};
pub use headers::HeaderList;
pub use store::{JsonTaskStore, TaskStore};
pub use task::{DownloadTask, TaskHandle, TaskOutcome, TaskRecord, TaskStatus, TotalBytes};
pub use transport::{AwcTransport, Transport};
