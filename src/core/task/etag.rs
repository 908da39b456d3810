/// 记录断点续传用的 ETag，只有服务端给出不同的新值时才更新
#[derive(Debug, Clone, Default)]
pub struct EtagTracker {
    etag: Option<String>,
}

impl EtagTracker {
    pub fn new(etag: Option<String>) -> Self {
        Self { etag }
    }

    pub fn current(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// 比较响应中的 ETag，发生变化时返回新值（调用方负责持久化）。
    /// 响应没有 ETag 头时保留原值
    pub fn observe(&mut self, from_response: Option<&str>) -> Option<&str> {
        let new_etag = from_response?;
        if self.etag.as_deref() == Some(new_etag) {
            return None;
        }
        self.etag = Some(new_etag.to_string());
        self.etag.as_deref()
    }
}
