use std::fs;
use std::io;
use std::path::Path;

use super::record::TaskId;
use super::state::TotalBytes;

/// 断点续传判断所需的本地信息
#[derive(Debug, Clone, Copy)]
pub struct ResumeCandidate<'a> {
    pub path: &'a str,
    pub so_far: u64,
    pub total: TotalBytes,
    pub etag: Option<&'a str>,
}

/// 断点是否仍然有效的外部策略
pub trait BreakpointCheck: Send + Sync {
    fn is_resume_eligible(&self, id: TaskId, candidate: &ResumeCandidate<'_>) -> bool;
}

/// 默认策略：已知 ETag 与总大小，且本地文件长度不小于已下载字节数
#[derive(Debug, Clone)]
pub struct FileBreakpointCheck {
    pub enable_resume: bool,
}

impl Default for FileBreakpointCheck {
    fn default() -> Self {
        Self { enable_resume: true }
    }
}

impl BreakpointCheck for FileBreakpointCheck {
    fn is_resume_eligible(&self, id: TaskId, candidate: &ResumeCandidate<'_>) -> bool {
        if !self.enable_resume || candidate.so_far == 0 {
            return false;
        }
        if candidate.etag.map_or(true, |etag| etag.is_empty()) {
            log::debug!("[{}] 没有 ETag，无法断点续传", id);
            return false;
        }
        match candidate.total {
            TotalBytes::Known(total) if candidate.so_far < total => {}
            _ => return false,
        }
        match fs::metadata(candidate.path) {
            Ok(meta) if meta.is_file() => meta.len() >= candidate.so_far,
            _ => false,
        }
    }
}

/// 判断本次尝试能否续传；不能续传时删除残留的半截文件
pub fn negotiate(id: TaskId, candidate: &ResumeCandidate<'_>, check: &dyn BreakpointCheck) -> bool {
    if check.is_resume_eligible(id, candidate) {
        log::debug!("[{}] 从 {} 字节处断点续传", id, candidate.so_far);
        return true;
    }

    let path = Path::new(candidate.path);
    if path.is_file() {
        match fs::remove_file(path) {
            Ok(()) => log::debug!("[{}] 删除无法续传的残留文件 {}", id, candidate.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("[{}] 删除残留文件失败 {}: {}", id, candidate.path, e),
        }
    }
    false
}
