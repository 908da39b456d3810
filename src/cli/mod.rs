//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 基本下载：`resumedown <url>`
//! - 批量下载：`resumedown -f urls.txt`
//! - 编辑配置：`resumedown -e`
//! - 指定配置：`resumedown -c config.conf <url>`
//! - 附加请求头：`resumedown -H "Authorization: Bearer xxx" <url>`
//!
//! ## 配置文件位置
//!
//! - Windows: `%APPDATA%/resumedown/resumedown.conf`
//! - macOS: `~/Library/Application Support/resumedown/resumedown.conf`
//! - Linux: `~/.config/resumedown/resumedown.conf`

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::core::headers::HeaderList;
use crate::utils::validator;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/resumedown/resumedown.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/resumedown/resumedown.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/resumedown/resumedown.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 xdg-open，否则 nano
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// resumedown 命令行参数
///
/// 示例用法：
///   resumedown https://example.com/file.zip
///   resumedown -e  # 编辑配置文件
///   resumedown -n a.zip -r 5 https://example.com/file.zip
#[derive(Parser, Debug, Clone)]
#[command(
    name = "resumedown",
    author = "panzhifu",
    version = env!("CARGO_PKG_VERSION"),
    about = "一个用 Rust 编写的可断点续传下载器",
    long_about = "基于 ETag 的断点续传、自动重试和进度显示。中断后再次运行相同命令即可从断点继续。\n\n示例：\n  resumedown https://example.com/file.zip\n  resumedown -e\n  resumedown -H \"Authorization: Bearer xxx\" https://example.com/file.zip\n"
)]
pub struct Args {
    #[arg(required = false, help = "要下载的URL列表，可以同时指定多个URL。")]
    pub urls: Vec<String>,

    #[arg(short, long, help = "包含URL列表的文件路径，每行一个URL。")]
    pub file: Option<String>,

    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    #[arg(long, short = 'd', help = "指定下载目录，覆盖配置文件中的设置。")]
    pub download_dir: Option<String>,

    /// 只在下载单个 URL 时生效
    #[arg(long, short = 'n', help = "指定下载文件名，覆盖URL自动推断。")]
    pub file_name: Option<String>,

    #[arg(long, short = 'r', help = "网络错误时的重试次数，覆盖配置文件中的设置。")]
    pub retry_count: Option<u32>,

    #[arg(long = "progress", short = 'g', help = "进度通知次数，0 表示只显示开始和结束。")]
    pub progress_times: Option<i32>,

    #[arg(long = "header", short = 'H', help = "附加请求头，格式为 `Name: Value`，可重复指定。")]
    pub headers: Vec<String>,

    #[arg(long, help = "禁用断点续传，总是从头下载。")]
    pub no_resume: bool,
}

impl Args {
    /// 解析命令行参数并加载配置，命令行参数覆盖配置文件
    pub fn parse_args() -> Result<(Self, Config)> {
        let args = Args::parse();

        if args.edit_config {
            // 确保编辑器打开的是带教程的文件
            Config::load(&args.config)?;
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config)
            .with_context(|| format!("无法加载配置文件: {}", self.config))?;
        config.merge_from_args(self);
        validator::validate_config(&config).context("配置无效")?;
        Ok(config)
    }

    /// 合并命令行和 URL 文件中的地址，忽略空行和注释
    pub fn get_urls(&self) -> Result<Vec<String>> {
        let mut urls = Vec::new();
        urls.extend_from_slice(&self.urls);

        if let Some(file_path) = &self.file {
            let content = fs::read_to_string(file_path)
                .with_context(|| format!("无法读取URL文件: {}", file_path))?;
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    urls.push(line.to_string());
                }
            }
        }

        if urls.is_empty() {
            anyhow::bail!("未提供任何URL。请通过命令行参数或文件提供至少一个URL。");
        }
        validator::validate_urls(&urls)?;
        Ok(urls)
    }

    pub fn custom_headers(&self) -> Result<HeaderList> {
        validator::parse_headers(&self.headers)
    }

    /// 计算某个 URL 的保存路径
    pub fn target_path(&self, url: &str, download_dir: &str, single: bool) -> Result<String> {
        let file_name = match (&self.file_name, single) {
            (Some(name), true) => name.clone(),
            _ => extract_filename_from_url(url),
        };
        let path = Path::new(download_dir).join(file_name).to_string_lossy().to_string();
        validator::validate_output_path(&path)?;
        Ok(path)
    }
}

/// 从 URL 路径的最后一段推断文件名
pub fn extract_filename_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("download_{}", chrono::Local::now().format("%Y%m%d%H%M%S")))
}
