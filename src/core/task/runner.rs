use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::DownloadError;
use crate::core::events::{EventPublisher, TransferEvent};
use crate::core::store::TaskStore;
use crate::core::transport::Transport;
use super::download::AttemptOutcome;
use super::etag::EtagTracker;
use super::progress::ProgressReporter;
use super::record::{CancelFlag, TaskId, TaskRecord};
use super::resume::{BreakpointCheck, FileBreakpointCheck};
use super::retry::{RetryDecision, RetryPolicy};
use super::state::{TaskStatus, TotalBytes, TransferState};

/// 每次从响应体读取并写入的最大字节数
pub const BUFFER_SIZE: usize = 4 * 1024;

/// 重试等待期间检查取消信号的间隔
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 一个任务运行结束后的结果
#[derive(Debug)]
pub enum TaskOutcome {
    Completed { total: u64 },
    Paused { so_far: u64 },
    Failed(DownloadError),
}

/// 可跨线程查询任务是否存活，并发出取消信号
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    pending: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    canceled: CancelFlag,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 排队中或正在运行
    pub fn is_alive(&self) -> bool {
        self.is_pending() || self.is_running()
    }

    /// 请求暂停，在下一个数据块边界生效
    pub fn cancel(&self) {
        self.canceled.cancel();
    }
}

/// 单个文件的下载任务：断点协商、传输、重试与进度上报都在这里完成
pub struct DownloadTask {
    pub(super) record: TaskRecord,
    pub(super) transfer: TransferState,
    pub(super) store: Arc<dyn TaskStore>,
    pub(super) publisher: Box<dyn EventPublisher>,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) breakpoint: Arc<dyn BreakpointCheck>,
    pub(super) retry: RetryPolicy,
    pub(super) buffer_size: usize,
    pub(super) etag: EtagTracker,
    pub(super) reporter: ProgressReporter,
    pending: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

pub struct DownloadTaskBuilder {
    record: TaskRecord,
    store: Arc<dyn TaskStore>,
    publisher: Box<dyn EventPublisher>,
    transport: Arc<dyn Transport>,
    breakpoint: Arc<dyn BreakpointCheck>,
    retry: RetryPolicy,
    buffer_size: usize,
}

impl DownloadTaskBuilder {
    pub fn breakpoint_check(mut self, check: Arc<dyn BreakpointCheck>) -> Self {
        self.breakpoint = check;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn build(self) -> DownloadTask {
        let transfer = self.record.transfer_state();
        let etag = EtagTracker::new(self.record.etag.clone());
        let reporter = ProgressReporter::new(self.record.callback_progress_times);
        DownloadTask {
            record: self.record,
            transfer,
            store: self.store,
            publisher: self.publisher,
            transport: self.transport,
            breakpoint: self.breakpoint,
            retry: self.retry,
            buffer_size: self.buffer_size,
            etag,
            reporter,
            pending: Arc::new(AtomicBool::new(true)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl DownloadTask {
    pub fn builder(
        record: TaskRecord,
        store: Arc<dyn TaskStore>,
        publisher: Box<dyn EventPublisher>,
        transport: Arc<dyn Transport>,
    ) -> DownloadTaskBuilder {
        DownloadTaskBuilder {
            record,
            store,
            publisher,
            transport,
            breakpoint: Arc::new(FileBreakpointCheck::default()),
            retry: RetryPolicy::default(),
            buffer_size: BUFFER_SIZE,
        }
    }

    /// 从持久化层取出记录构造任务，记录不存在时返回 None
    pub fn from_store(
        id: TaskId,
        store: Arc<dyn TaskStore>,
        publisher: Box<dyn EventPublisher>,
        transport: Arc<dyn Transport>,
    ) -> Option<DownloadTaskBuilder> {
        match store.find(id) {
            Some(record) => Some(Self::builder(record, store, publisher, transport)),
            None => {
                log::error!("任务记录不存在: {}", id);
                None
            }
        }
    }

    pub fn id(&self) -> TaskId {
        self.record.id
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.record.id,
            pending: self.pending.clone(),
            running: self.running.clone(),
            canceled: self.record.canceled.clone(),
        }
    }

    /// 当前传输状态的拷贝
    pub fn snapshot(&self) -> TransferState {
        self.transfer.clone()
    }

    /// 运行下载循环直到完成、暂停或最终失败
    pub async fn start(&mut self) -> TaskOutcome {
        self.pending.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let outcome = self.run().await;
        self.running.store(false, Ordering::SeqCst);
        outcome
    }

    /// 把已暂停的任务重新标记为等待执行，返回新的句柄（带新的取消信号）。
    /// 任务仍在运行时不做任何事
    pub fn request_resume(&mut self) -> Option<TaskHandle> {
        if self.running.load(Ordering::SeqCst) {
            log::warn!("[{}] 任务仍在运行，忽略恢复请求", self.id());
            return None;
        }
        log::debug!("[{}] 恢复任务", self.id());
        self.record.canceled = CancelFlag::new();
        self.transfer.status = TaskStatus::Pending;
        self.pending.store(true, Ordering::SeqCst);

        self.store.update_pending(self.id());
        self.publish();
        Some(self.handle())
    }

    async fn run(&mut self) -> TaskOutcome {
        let id = self.id();
        if self.transfer.status != TaskStatus::Pending {
            log::error!("[{}] 启动任务但状态异常: {}", id, self.transfer.status);
            return self.on_error(DownloadError::InvalidStatus(self.transfer.status.to_string()));
        }
        self.transfer.retry_count = 0;

        loop {
            if self.record.is_canceled() {
                log::debug!("[{}] 任务已被取消", id);
                return self.on_pause();
            }

            log::debug!("[{}] 开始下载 {}", id, self.record.url);
            match self.attempt().await {
                Ok(AttemptOutcome::Completed { total }) => return self.on_complete(total),
                Ok(AttemptOutcome::Paused) => return self.on_pause(),
                Err(error) => match self.retry.decide(&error, self.transfer.retry_count) {
                    RetryDecision::Retry { attempt, delay } => {
                        self.on_retry(error, attempt);
                        if !delay.is_zero() {
                            log::info!("[{}] 将在 {:?} 后重试", id, delay);
                            self.backoff(delay).await;
                        }
                    }
                    RetryDecision::GiveUp => return self.on_error(error),
                },
            }
        }
    }

    /// 等待重试，取消后立即返回，由循环开头的检查转为暂停
    async fn backoff(&self, delay: Duration) {
        let deadline = tokio::time::Instant::now() + delay;
        while !self.record.is_canceled() {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep((deadline - now).min(CANCEL_POLL_INTERVAL)).await;
        }
    }

    fn publish(&self) {
        self.publisher.publish(TransferEvent {
            id: self.record.id,
            state: self.transfer.clone(),
        });
    }

    pub(super) fn on_connected(&mut self, is_continue: bool, so_far: u64, total: TotalBytes) {
        log::info!("[{}] 已连接 续传={} 已下载={} 总大小={}", self.id(), is_continue, so_far, total);
        self.transfer.so_far = so_far;
        self.transfer.total = total;
        self.transfer.etag = self.etag.current().map(str::to_string);
        self.transfer.is_continue = is_continue;
        self.transfer.status = TaskStatus::Connected;

        self.store.update(self.id(), TaskStatus::Connected, so_far, total);
        self.publish();
    }

    pub(super) fn on_progress(&mut self, so_far: u64, total: TotalBytes) {
        self.transfer.so_far = so_far;
        self.transfer.total = total;
        self.transfer.status = TaskStatus::Progress;

        if ProgressReporter::should_persist(so_far, total) {
            self.store.update(self.id(), TaskStatus::Progress, so_far, total);
        }
        if self.reporter.should_notify(so_far) {
            log::trace!("[{}] 进度 {}/{}", self.id(), so_far, total);
            self.publish();
        }
    }

    fn on_retry(&mut self, error: DownloadError, attempt: u32) {
        let error = error.filtered();
        let message = error.to_string();
        log::warn!(
            "[{}] 下载失败，第 {}/{} 次重试 (已下载 {} 字节): {}",
            self.id(), attempt, self.retry.max_retries, self.transfer.so_far, message
        );
        self.transfer.status = TaskStatus::Retry;
        self.transfer.retry_count = attempt;
        self.transfer.error = Some(message.clone());

        self.store.update_retry(self.id(), &message, attempt);
        self.publish();
    }

    fn on_error(&mut self, error: DownloadError) -> TaskOutcome {
        let error = error.filtered();
        let message = error.to_string();
        log::error!("[{}] 下载失败: {}", self.id(), message);
        self.transfer.status = TaskStatus::Error;
        self.transfer.error = Some(message.clone());

        self.store.update_error(self.id(), &message);
        self.publish();
        TaskOutcome::Failed(error)
    }

    fn on_complete(&mut self, total: u64) -> TaskOutcome {
        log::info!("[{}] 下载完成，共 {} 字节", self.id(), total);
        self.transfer.status = TaskStatus::Completed;
        self.transfer.so_far = total;
        self.transfer.total = TotalBytes::Known(total);
        self.transfer.error = None;

        self.store.update_complete(self.id(), total);
        self.publish();
        TaskOutcome::Completed { total }
    }

    fn on_pause(&mut self) -> TaskOutcome {
        log::info!("[{}] 已暂停 {}/{}", self.id(), self.transfer.so_far, self.transfer.total);
        self.transfer.status = TaskStatus::Paused;

        self.store.update_pause(self.id());
        self.publish();
        TaskOutcome::Paused { so_far: self.transfer.so_far }
    }
}
