use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use crate::core::error::{DownloadError, DownloadResult};
use crate::utils::validator::is_filename_valid;

/// 目标文件：随机写入，不做缓冲，保证每次写入后磁盘长度可校验
#[derive(Debug)]
pub struct DestinationFile {
    file: File,
    path: String,
    position: u64,
}

impl DestinationFile {
    /// 打开目标文件。`resume_from` 为 Some 时文件必须已存在并定位到该偏移，
    /// 否则创建（或清空）文件从头写入
    pub fn open(path: &str, resume_from: Option<u64>) -> DownloadResult<Self> {
        if path.trim().is_empty() {
            return Err(DownloadError::InvalidPath("目标路径为空".to_string()));
        }
        if !is_filename_valid(path) {
            return Err(DownloadError::InvalidPath(path.to_string()));
        }

        let target = Path::new(path);
        if target.is_dir() {
            return Err(DownloadError::PathIsDirectory(path.to_string()));
        }
        let setup_error = |source| DownloadError::FileSetup { path: path.to_string(), source };

        if resume_from.is_some() && !target.is_file() {
            return Err(setup_error(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "续传的目标文件不存在",
            )));
        }
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(setup_error)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(target)
            .map_err(setup_error)?;

        let position = match resume_from {
            Some(offset) => file.seek(SeekFrom::Start(offset)).map_err(setup_error)?,
            None => {
                file.set_len(0).map_err(setup_error)?;
                0
            }
        };

        Ok(Self { file, path: path.to_string(), position })
    }

    /// 在当前位置写入
    pub fn write(&mut self, data: &[u8]) -> DownloadResult<()> {
        self.file.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    /// 磁盘上的实际长度
    pub fn len_on_disk(&self) -> DownloadResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn sync(&mut self) -> DownloadResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}
