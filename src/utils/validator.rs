use anyhow::Result;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use url::Url;

use crate::config::Config;
use crate::core::headers::HeaderList;

pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

fn invalid_filename_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\x00-\x1f<>:"|?*]"#).expect("文件名正则无效"))
}

/// 目标路径中的文件名是否合法（只检查最后一段）
pub fn is_filename_valid(path: &str) -> bool {
    let Some(name) = Path::new(path).file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.trim().is_empty() && name.len() <= 255 && !invalid_filename_chars().is_match(name)
}

fn header_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([!#$%&'*+.^_`|~0-9A-Za-z-]+)\s*:\s*(.*?)\s*$").expect("请求头正则无效"))
}

/// 解析 `Name: Value` 形式的自定义请求头
pub fn parse_headers(lines: &[String]) -> Result<HeaderList> {
    let mut headers = HeaderList::new();
    for line in lines {
        let Some(caps) = header_line().captures(line) else {
            anyhow::bail!("请求头格式错误，应为 `Name: Value`: {}", line);
        };
        headers.push(&caps[1], &caps[2]);
    }
    Ok(headers)
}

pub fn validate_output_path(path: &str) -> Result<()> {
    if path.is_empty() {
        anyhow::bail!("输出路径不能为空");
    }
    if !is_filename_valid(path) {
        anyhow::bail!("非法的文件名: {}", path);
    }
    Ok(())
}

pub fn validate_urls(urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        anyhow::bail!("URL列表不能为空");
    }
    if let Some(bad) = urls.iter().find(|u| !is_valid_url(u)) {
        anyhow::bail!("无效的URL: {}", bad);
    }
    Ok(())
}

pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()
}
