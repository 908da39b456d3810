use futures::StreamExt;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::transport::{TransferRequest, TransferResponse};
use super::resume::{self, ResumeCandidate};
use super::runner::DownloadTask;
use super::state::TotalBytes;
use super::util::DestinationFile;

/// 单次尝试的正常结束方式，失败通过 Err 返回
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AttemptOutcome {
    Completed { total: u64 },
    Paused,
}

impl DownloadTask {
    /// 执行一次完整的尝试：断点协商、请求、流式写盘
    pub(super) async fn attempt(&mut self) -> DownloadResult<AttemptOutcome> {
        let id = self.record.id;
        let candidate = ResumeCandidate {
            path: &self.record.path,
            so_far: self.transfer.so_far,
            total: self.transfer.total,
            etag: self.etag.current(),
        };
        let is_continue_available = resume::negotiate(id, &candidate, self.breakpoint.as_ref());

        let request = self.build_request(is_continue_available);
        let request_headers = request.headers.clone();
        log::debug!("[{}] 请求头 {}", id, request_headers);

        let response = self.transport.execute(request).await?;

        let is_succeed_start = response.status == 200;
        let is_succeed_continue = response.status == 206 && is_continue_available;
        if !is_succeed_start && !is_succeed_continue {
            return Err(DownloadError::HttpStatus {
                status: response.status,
                request_headers,
                response_headers: response.headers,
            });
        }

        let total = self.resolve_total(&response, is_succeed_start)?;
        let mut so_far = if is_succeed_continue { self.transfer.so_far } else { 0 };

        // 文件句柄和响应体在任何返回路径上都会被 drop
        let mut file = DestinationFile::open(&self.record.path, is_succeed_continue.then_some(so_far))?;
        log::debug!("[{}] 写入 {} 起始位置 {}", id, file.path(), file.position());

        if let Some(new_etag) = self.etag.observe(response.etag()) {
            log::debug!("[{}] ETag 更新为 {}", id, new_etag);
            self.store.update_header(id, new_etag);
        }

        self.reporter.begin_attempt(so_far, total);
        self.on_connected(is_succeed_continue, so_far, total);

        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for piece in chunk.chunks(self.buffer_size) {
                verify_length(&file, so_far)?;
                file.write(piece)?;
                so_far += piece.len() as u64;
                verify_length(&file, so_far)?;

                if let TotalBytes::Known(expected) = total {
                    if so_far > expected {
                        return Err(DownloadError::SizeMismatch { expected, actual: so_far });
                    }
                }

                self.on_progress(so_far, total);

                if self.record.is_canceled() {
                    log::debug!("[{}] 在 {} 字节处收到取消信号", id, so_far);
                    return Ok(AttemptOutcome::Paused);
                }
            }
        }
        file.sync()?;

        let total = total.known().unwrap_or(so_far);
        if so_far != total {
            return Err(DownloadError::SizeMismatch { expected: total, actual: so_far });
        }
        Ok(AttemptOutcome::Completed { total })
    }

    fn build_request(&self, is_continue_available: bool) -> TransferRequest {
        let mut headers = self.record.headers.clone().unwrap_or_default();
        if is_continue_available {
            if let Some(etag) = self.etag.current() {
                headers.push("If-Match", etag);
            }
            headers.push("Range", format!("bytes={}-", self.transfer.so_far));
        }
        // 下载不走任何缓存
        headers.push("Cache-Control", "no-cache");

        TransferRequest {
            tag: self.record.id,
            url: self.record.url.clone(),
            headers,
        }
    }

    /// 重新开始或之前不知道总大小时，从响应头取总大小。
    /// 有 Transfer-Encoding 时 Content-Length 不可信
    fn resolve_total(&self, response: &TransferResponse, is_succeed_start: bool) -> DownloadResult<TotalBytes> {
        let mut total = self.transfer.total;
        if is_succeed_start || !total.is_known() {
            total = match response.transfer_encoding() {
                None => TotalBytes::from(response.content_length()),
                Some(_) => TotalBytes::Unknown,
            };
        }
        if !total.is_known() && !response.is_chunked() {
            return Err(DownloadError::UnknownSize);
        }
        Ok(total)
    }
}

/// 磁盘上的文件比已写入的字节数短，说明被其他进程改动过
fn verify_length(file: &DestinationFile, so_far: u64) -> DownloadResult<()> {
    let file_len = file.len_on_disk()?;
    if file_len < so_far {
        return Err(DownloadError::FileTampered { file_len, so_far });
    }
    Ok(())
}
