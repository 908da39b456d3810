use thiserror::Error;
use std::io;

use crate::core::headers::HeaderList;

/// 错误分类，在出错的位置一次性确定，重试控制器只看这个分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 重试也无济于事，例如无法确定文件大小
    GiveUp,
    /// 目标文件已不可信或传输字节数对不上
    Integrity,
    /// 路径无效、路径是目录、文件无法创建等准备阶段错误
    Setup,
    /// HTTP 状态码错误与网络 IO 错误（包括超时）
    Transport,
    /// 其他未归类的错误
    Unclassified,
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("无法确定文件大小，且响应不是 chunked 传输编码")]
    UnknownSize,

    #[error("文件在下载过程中被其他进程修改: 文件长度 {file_len} 字节, 已写入 {so_far} 字节")]
    FileTampered {
        file_len: u64,
        so_far: u64,
    },

    #[error("文件大小不匹配: 预期 {expected} 字节, 实际 {actual} 字节")]
    SizeMismatch {
        expected: u64,
        actual: u64,
    },

    #[error("无效的目标路径: {0}")]
    InvalidPath(String),

    #[error("目标路径是目录: {0}")]
    PathIsDirectory(String),

    #[error("无法打开目标文件 {path}: {source}")]
    FileSetup {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("任务状态异常，无法启动: {0}")]
    InvalidStatus(String),

    #[error("响应码错误: {status}\n 请求头: {request_headers}\n 响应头: {response_headers}")]
    HttpStatus {
        status: u16,
        request_headers: HeaderList,
        response_headers: HeaderList,
    },

    /// `class` 是错误类别名（如 `Timeout`），`message` 可能为空
    #[error("{message}")]
    Network {
        class: &'static str,
        message: String,
    },

    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Unknown(String),
}

impl DownloadError {
    pub fn network(class: &'static str, message: impl Into<String>) -> Self {
        DownloadError::Network { class, message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::UnknownSize => ErrorKind::GiveUp,
            DownloadError::FileTampered { .. } | DownloadError::SizeMismatch { .. } => ErrorKind::Integrity,
            DownloadError::InvalidPath(_)
            | DownloadError::PathIsDirectory(_)
            | DownloadError::FileSetup { .. }
            | DownloadError::InvalidStatus(_) => ErrorKind::Setup,
            DownloadError::HttpStatus { .. } | DownloadError::Network { .. } => ErrorKind::Transport,
            DownloadError::Io(_) | DownloadError::Unknown(_) => ErrorKind::Unclassified,
        }
    }

    /// 只有传输错误和未归类错误允许重试
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Unclassified)
    }

    /// 没有可读信息的错误（典型的是超时）用其类别名重新包装，
    /// 空消息永远不会进入存储或事件
    pub fn filtered(self) -> Self {
        if !self.to_string().trim().is_empty() {
            return self;
        }
        match self {
            DownloadError::Network { class, .. } => DownloadError::Network {
                class,
                message: class.to_string(),
            },
            _ => DownloadError::Unknown("Unknown".to_string()),
        }
    }
}

impl From<String> for DownloadError {
    fn from(error: String) -> Self {
        DownloadError::Unknown(error)
    }
}

impl From<&str> for DownloadError {
    fn from(error: &str) -> Self {
        DownloadError::Unknown(error.to_string())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
