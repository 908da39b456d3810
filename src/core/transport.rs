//! HTTP 传输层：下载任务只依赖 `Transport`，默认实现基于 awc

use async_trait::async_trait;
use awc::error::SendRequestError;
use bytes::Bytes;
use futures::stream::{LocalBoxStream, StreamExt};
use std::time::Duration;

use crate::config::Config;
use crate::core::error::{DownloadError, DownloadResult};
use crate::core::headers::HeaderList;
use crate::core::task::record::TaskId;

/// 一次 GET 请求
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// 任务 ID，外部可以按标签取消进行中的请求
    pub tag: TaskId,
    pub url: String,
    pub headers: HeaderList,
}

/// 响应头和流式响应体，响应体在 drop 时释放
pub struct TransferResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: LocalBoxStream<'static, DownloadResult<Bytes>>,
}

impl TransferResponse {
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn transfer_encoding(&self) -> Option<&str> {
        self.headers.get("transfer-encoding")
    }

    pub fn is_chunked(&self) -> bool {
        self.transfer_encoding()
            .map(|v| v.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get("etag")
    }
}

#[async_trait(?Send)]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransferRequest) -> DownloadResult<TransferResponse>;
}

/// 基于 awc 的传输实现，必须在 actix 系统内运行
#[derive(Debug, Clone)]
pub struct AwcTransport {
    /// 连接、等待响应头、两次数据块之间各自的超时，不限制整个传输的时长
    timeout: Duration,
    user_agent: String,
}

impl AwcTransport {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self { timeout, user_agent: user_agent.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_secs(config.timeout), config.user_agent.clone())
    }

    fn client(&self) -> awc::Client {
        // awc 的整体超时会连响应体一起计时，这里关掉，改为在 execute 里按空闲计时
        awc::Client::builder()
            .connector(awc::Connector::new().timeout(self.timeout))
            .disable_timeout()
            .add_default_header((awc::http::header::USER_AGENT, self.user_agent.clone()))
            .finish()
    }
}

#[async_trait(?Send)]
impl Transport for AwcTransport {
    async fn execute(&self, request: TransferRequest) -> DownloadResult<TransferResponse> {
        log::debug!("[{}] GET {} 请求头 {}", request.tag, request.url, request.headers);

        // 不解压，保证写入字节数与 Content-Length 一致
        let mut builder = self.client().get(&request.url).no_decompress();
        for (name, value) in request.headers.iter() {
            builder = builder.append_header((name, value));
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| timeout_error())?
            .map_err(|e| DownloadError::network(send_error_class(&e), e.to_string()))?;

        let status = response.status().as_u16();
        let headers: HeaderList = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string()))
            .collect();
        let raw = response
            .map(|chunk| chunk.map_err(|e| DownloadError::network("Payload", e.to_string())))
            .boxed_local();
        let body = idle_timeout(raw, self.timeout);

        Ok(TransferResponse { status, headers, body })
    }
}

/// 消息留空，由 `DownloadError::filtered` 换成类别名
fn timeout_error() -> DownloadError {
    DownloadError::network("Timeout", "")
}

/// 相邻两个数据块之间超过 `idle` 没有数据时产出超时错误并结束
fn idle_timeout(
    body: LocalBoxStream<'static, DownloadResult<Bytes>>,
    idle: Duration,
) -> LocalBoxStream<'static, DownloadResult<Bytes>> {
    futures::stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(item)) => Some((item, Some(body))),
            Ok(None) => None,
            Err(_) => Some((Err(timeout_error()), None)),
        }
    })
    .boxed_local()
}

fn send_error_class(error: &SendRequestError) -> &'static str {
    match error {
        SendRequestError::Timeout => "Timeout",
        SendRequestError::Connect(_) => "Connect",
        SendRequestError::Url(_) => "InvalidUrl",
        SendRequestError::Send(_) => "Send",
        SendRequestError::Response(_) => "Response",
        _ => "SendRequest",
    }
}
