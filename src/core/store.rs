//! 任务记录的持久化：下载任务只通过 `TaskStore` 写入状态

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::task::record::{TaskId, TaskRecord};
use crate::core::task::state::{TaskStatus, TotalBytes};

/// 持久化桥接。实现方自行处理写入失败（记录日志），不会把错误抛回下载任务
pub trait TaskStore: Send + Sync {
    fn find(&self, id: TaskId) -> Option<TaskRecord>;
    fn update(&self, id: TaskId, status: TaskStatus, so_far: u64, total: TotalBytes);
    fn update_header(&self, id: TaskId, etag: &str);
    fn update_retry(&self, id: TaskId, message: &str, retry_count: u32);
    fn update_error(&self, id: TaskId, message: &str);
    fn update_complete(&self, id: TaskId, total: u64);
    fn update_pause(&self, id: TaskId);
    fn update_pending(&self, id: TaskId);
}

/// 进度更新两次落盘之间的最短间隔
pub const PROGRESS_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

struct Records {
    map: HashMap<TaskId, TaskRecord>,
    last_saved: Option<Instant>,
}

/// 以 JSON 文件保存全部任务记录。状态变化立即整体落盘，
/// 下载中的进度只更新内存，按 `flush_interval` 节流落盘
pub struct JsonTaskStore {
    path: PathBuf,
    records: Mutex<Records>,
    flush_interval: Duration,
}

impl JsonTaskStore {
    /// 打开（或新建）任务文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut records = HashMap::new();
        if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("无法读取任务文件: {}", path.display()))?;
            if !data.trim().is_empty() {
                let list: Vec<TaskRecord> = serde_json::from_str(&data)
                    .with_context(|| format!("任务文件格式错误: {}", path.display()))?;
                for record in list {
                    records.insert(record.id, record);
                }
            }
        }
        log::debug!("加载了 {} 条任务记录: {}", records.len(), path.display());
        Ok(Self {
            path,
            records: Mutex::new(Records { map: records, last_saved: None }),
            flush_interval: PROGRESS_FLUSH_INTERVAL,
        })
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// 立即把内存中的记录写入文件
    pub fn flush(&self) {
        let mut records = self.lock();
        self.save_logged(&mut records);
    }

    /// 新增或覆盖一条记录
    pub fn insert(&self, record: TaskRecord) {
        self.modify(|records| {
            records.insert(record.id, record);
        });
    }

    pub fn remove(&self, id: TaskId) -> Option<TaskRecord> {
        let mut removed = None;
        self.modify(|records| removed = records.remove(&id));
        removed
    }

    /// 按 URL 与目标路径查找已有任务，用于断点续传时复用记录
    pub fn find_by_target(&self, url: &str, path: &str) -> Option<TaskRecord> {
        self.lock().map.values().find(|r| r.url == url && r.path == path).cloned()
    }

    pub fn list(&self) -> Vec<TaskRecord> {
        self.lock().map.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Records> {
        match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn modify<F: FnOnce(&mut HashMap<TaskId, TaskRecord>)>(&self, f: F) {
        let mut records = self.lock();
        f(&mut records.map);
        self.save_logged(&mut records);
    }

    fn update_record<F: FnOnce(&mut TaskRecord)>(&self, id: TaskId, f: F) {
        self.modify(|records| match records.get_mut(&id) {
            Some(record) => f(record),
            None => log::warn!("任务ID不存在: {}", id),
        });
    }

    /// 进度只写内存，距上次落盘超过间隔时才写文件
    fn update_progress(&self, id: TaskId, so_far: u64, total: TotalBytes) {
        let mut records = self.lock();
        let Some(record) = records.map.get_mut(&id) else {
            log::warn!("任务ID不存在: {}", id);
            return;
        };
        record.status = TaskStatus::Progress;
        record.so_far = so_far;
        record.total = total;
        let due = records
            .last_saved
            .map_or(true, |at| at.elapsed() >= self.flush_interval);
        if due {
            self.save_logged(&mut records);
        }
    }

    fn save_logged(&self, records: &mut Records) {
        match self.save(&records.map) {
            Ok(()) => records.last_saved = Some(Instant::now()),
            Err(e) => log::error!("保存任务文件失败: {:#}", e),
        }
    }

    fn save(&self, records: &HashMap<TaskId, TaskRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&records.values().collect::<Vec<_>>())?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TaskStore for JsonTaskStore {
    fn find(&self, id: TaskId) -> Option<TaskRecord> {
        self.lock().map.get(&id).cloned()
    }

    fn update(&self, id: TaskId, status: TaskStatus, so_far: u64, total: TotalBytes) {
        if status == TaskStatus::Progress {
            return self.update_progress(id, so_far, total);
        }
        self.update_record(id, |record| {
            record.status = status;
            record.so_far = so_far;
            record.total = total;
        });
    }

    fn update_header(&self, id: TaskId, etag: &str) {
        self.update_record(id, |record| record.etag = Some(etag.to_string()));
    }

    fn update_retry(&self, id: TaskId, message: &str, retry_count: u32) {
        self.update_record(id, |record| {
            record.status = TaskStatus::Retry;
            record.error_message = Some(message.to_string());
            record.retry_count = retry_count;
        });
    }

    fn update_error(&self, id: TaskId, message: &str) {
        self.update_record(id, |record| {
            record.status = TaskStatus::Error;
            record.error_message = Some(message.to_string());
        });
    }

    fn update_complete(&self, id: TaskId, total: u64) {
        self.update_record(id, |record| {
            record.status = TaskStatus::Completed;
            record.so_far = total;
            record.total = TotalBytes::Known(total);
            record.error_message = None;
        });
    }

    fn update_pause(&self, id: TaskId) {
        self.update_record(id, |record| record.status = TaskStatus::Paused);
    }

    fn update_pending(&self, id: TaskId) {
        self.update_record(id, |record| record.status = TaskStatus::Pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_persists_updates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let store = JsonTaskStore::open(&path).unwrap();

        let record = TaskRecord::new("https://example.com/a.bin", "/tmp/a.bin");
        let id = record.id;
        store.insert(record);
        store.update(id, TaskStatus::Progress, 400, TotalBytes::Known(1000));
        store.update_header(id, "\"v1\"");
        store.update_pause(id);

        let reopened = JsonTaskStore::open(&path).unwrap();
        let loaded = reopened.find(id).unwrap();
        assert_eq!(loaded.status, TaskStatus::Paused);
        assert_eq!(loaded.so_far, 400);
        assert_eq!(loaded.total, TotalBytes::Known(1000));
        assert_eq!(loaded.etag.as_deref(), Some("\"v1\""));
    }

    #[test]
    fn test_retry_error_and_complete() {
        let dir = tempdir().unwrap();
        let store = JsonTaskStore::open(dir.path().join("tasks.json")).unwrap();
        let record = TaskRecord::new("https://example.com/b.bin", "/tmp/b.bin");
        let id = record.id;
        store.insert(record);

        store.update_retry(id, "Timeout", 2);
        let loaded = store.find(id).unwrap();
        assert_eq!(loaded.status, TaskStatus::Retry);
        assert_eq!(loaded.retry_count, 2);
        assert_eq!(loaded.error_message.as_deref(), Some("Timeout"));

        store.update_error(id, "响应码错误: 500");
        assert_eq!(store.find(id).unwrap().status, TaskStatus::Error);

        store.update_complete(id, 1000);
        let loaded = store.find(id).unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.so_far, 1000);
        assert!(loaded.error_message.is_none());
    }

    #[test]
    fn test_find_by_target_and_remove() {
        let dir = tempdir().unwrap();
        let store = JsonTaskStore::open(dir.path().join("tasks.json")).unwrap();
        let record = TaskRecord::new("https://example.com/c.bin", "/tmp/c.bin");
        let id = record.id;
        store.insert(record);

        assert_eq!(store.find_by_target("https://example.com/c.bin", "/tmp/c.bin").map(|r| r.id), Some(id));
        assert!(store.find_by_target("https://example.com/c.bin", "/tmp/other.bin").is_none());
        assert!(store.remove(id).is_some());
        assert!(store.find(id).is_none());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_progress_updates_are_throttled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let store = JsonTaskStore::open(&path)
            .unwrap()
            .with_flush_interval(Duration::from_secs(3600));

        let record = TaskRecord::new("https://example.com/d.bin", "/tmp/d.bin");
        let id = record.id;
        store.insert(record);
        store.update(id, TaskStatus::Connected, 0, TotalBytes::Known(10_000));

        for so_far in (1..=2000).map(|i| i * 4) {
            store.update(id, TaskStatus::Progress, so_far, TotalBytes::Known(10_000));
        }
        // 内存中是最新进度，文件里还是连接时的状态
        assert_eq!(store.find(id).unwrap().so_far, 8000);
        let on_disk = JsonTaskStore::open(&path).unwrap().find(id).unwrap();
        assert_eq!(on_disk.status, TaskStatus::Connected);
        assert_eq!(on_disk.so_far, 0);

        // 状态变化会把进度一起写入
        store.update_pause(id);
        let on_disk = JsonTaskStore::open(&path).unwrap().find(id).unwrap();
        assert_eq!(on_disk.status, TaskStatus::Paused);
        assert_eq!(on_disk.so_far, 8000);
    }

    #[test]
    fn test_progress_flushes_after_interval() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let store = JsonTaskStore::open(&path).unwrap().with_flush_interval(Duration::ZERO);

        let record = TaskRecord::new("https://example.com/e.bin", "/tmp/e.bin");
        let id = record.id;
        store.insert(record);
        store.update(id, TaskStatus::Progress, 400, TotalBytes::Known(1000));

        let on_disk = JsonTaskStore::open(&path).unwrap().find(id).unwrap();
        assert_eq!(on_disk.status, TaskStatus::Progress);
        assert_eq!(on_disk.so_far, 400);
    }

    #[test]
    fn test_update_unknown_id_is_ignored() {
        let dir = tempdir().unwrap();
        let store = JsonTaskStore::open(dir.path().join("tasks.json")).unwrap();
        store.update_pause(uuid::Uuid::new_v4());
        store.update(uuid::Uuid::new_v4(), TaskStatus::Progress, 1, TotalBytes::Unknown);
        assert!(store.list().is_empty());
    }
}
