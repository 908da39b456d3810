//! 每个下载任务独占一个工作线程，线程内运行自己的 actix 系统（awc 需要）

use std::thread::JoinHandle;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::task::{DownloadTask, TaskHandle, TaskOutcome};

pub struct Worker {
    handle: TaskHandle,
    join: JoinHandle<(DownloadTask, TaskOutcome)>,
}

/// 在新线程上启动任务
pub fn spawn(mut task: DownloadTask) -> DownloadResult<Worker> {
    let handle = task.handle();
    let name = format!("download-{}", &task.id().simple().to_string()[..8]);
    let join = std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            let system = actix_rt::System::new();
            let outcome = system.block_on(task.start());
            (task, outcome)
        })?;
    Ok(Worker { handle, join })
}

impl Worker {
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// 等待线程结束，返回任务本身（可再次恢复）和结果
    pub fn join(self) -> DownloadResult<(DownloadTask, TaskOutcome)> {
        self.join.join().map_err(|e| {
            log::error!("下载线程异常: {:?}", e);
            DownloadError::Unknown("下载线程异常".to_string())
        })
    }
}
