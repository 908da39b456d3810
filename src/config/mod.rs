use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};

use crate::core::task::RetryPolicy;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 默认下载目录
    pub download_dir: String,
    /// 网络超时时间（秒），连接、等待响应头和等待下一块数据分别计时
    pub timeout: u64,
    /// User-Agent
    pub user_agent: String,
    /// 是否启用断点续传
    pub enable_resume: bool,
    /// 每次写盘的最大字节数
    pub buffer_size: usize,
    /// 整个下载过程中期望的进度通知次数，0 表示只通知开始和结束
    pub callback_progress_times: i32,
    /// 重试次数
    pub retry_count: u32,
    /// 第一次重试前的等待（毫秒），0 表示立即重试
    pub retry_delay_ms: u64,
    /// 最大重试延迟（毫秒）
    pub retry_max_delay_ms: u64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 随机抖动比例
    pub jitter_factor: f64,
    /// 任务记录文件
    pub store_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: "./downloads".to_string(),
            timeout: 30,
            user_agent: format!("resumedown/{}", env!("CARGO_PKG_VERSION")),
            enable_resume: true,
            buffer_size: 4096,
            callback_progress_times: 100,
            retry_count: 3,
            retry_delay_ms: 0, // 默认立即重试
            retry_max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            store_path: "./downloads/tasks.json".to_string(),
        }
    }
}

impl Config {
    /// 加载配置文件，不存在时写入默认配置
    pub fn load(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("无法读取配置文件: {}", path))?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                    let config = Config::default();
                    config.save_with_tutorial(path)?;
                    Ok(config)
                }
            }
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建配置目录: {}", parent.display()))?;
        }
        let config_content = toml::to_string_pretty(self).context("无法序列化配置")?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content).with_context(|| format!("无法写入配置文件: {}", path))?;
        Ok(())
    }

    fn generate_tutorial_content() -> &'static str {
        r#"# resumedown 配置文件
# ====================
#
# 这是一个 TOML 格式的配置文件。命令行参数会覆盖这里的设置，
# 优先级：命令行 > 配置文件 > 默认值
#
# 使用示例：
#   resumedown https://example.com/file.zip                 # 使用默认配置
#   resumedown -r 5 https://example.com/file.zip            # 最多重试 5 次
#   resumedown -H "Authorization: Bearer xxx" <url>         # 附加请求头
#   resumedown -d /path/to/downloads <url>                  # 指定下载目录
#
# ==================== 下载设置 ====================
#
# download_dir            默认下载目录，支持相对路径和绝对路径
# enable_resume           是否启用断点续传。需要服务端返回 ETag 才能续传
# buffer_size             每次写盘的最大字节数
# callback_progress_times 整个下载过程中进度通知的次数，0 表示只显示开始和结束
# store_path              任务记录文件，保存已下载字节数和 ETag，用于下次续传
#
# ==================== 网络设置 ====================
#
# timeout                 网络超时时间（秒），连接、等待响应和两次数据之间分别计时，
#                         不限制整个下载的时长
# user_agent              某些服务器可能需要特定的 User-Agent
#
# ==================== 重试设置 ====================
#
# retry_count             网络错误时的重试次数
# retry_delay_ms          第一次重试前的等待（毫秒），0 表示立即重试
# retry_max_delay_ms      重试等待的上限（毫秒）
# backoff_multiplier      每次重试等待时间的倍数
# jitter_factor           等待时间的随机抖动比例（0.0 - 1.0）
#
# ==================== 故障排除 ====================
#
# 问题：每次都从头下载
# 解决：确认 enable_resume = true，且服务端返回 ETag
#
# 问题：经常下载失败
# 解决：增加 retry_count 或 timeout，或设置 retry_delay_ms
#
# 问题：提示文件大小不匹配
# 解决：服务端返回的数据与声明的大小不一致，重试通常无效，请检查链接
"#
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<()> {
        if self.timeout == 0 {
            anyhow::bail!("超时时间必须大于0");
        }
        if self.download_dir.is_empty() {
            anyhow::bail!("下载目录不能为空");
        }
        if self.buffer_size == 0 {
            anyhow::bail!("缓冲区大小必须大于0");
        }
        if self.callback_progress_times < 0 {
            anyhow::bail!("进度通知次数不能为负数");
        }
        if self.backoff_multiplier < 1.0 {
            anyhow::bail!("退避倍数不能小于1");
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            anyhow::bail!("抖动比例必须在 0 到 1 之间");
        }
        if self.retry_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("重试延迟不能大于最大重试延迟");
        }
        if self.store_path.is_empty() {
            anyhow::bail!("任务记录文件路径不能为空");
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(dir) = &args.download_dir {
            self.download_dir = dir.clone();
        }
        if let Some(retry_count) = args.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(times) = args.progress_times {
            self.callback_progress_times = times;
        }
        if args.no_resume {
            self.enable_resume = false;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_count,
            base_delay: Duration::from_millis(self.retry_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 任务记录: {}\n\
            - 超时时间: {} 秒\n\
            - 重试次数: {}\n\
            - 重试延迟: {}\n\
            - 进度通知: {} 次\n\
            - 断点续传: {}",
            self.download_dir,
            self.store_path,
            self.timeout,
            self.retry_count,
            if self.retry_delay_ms == 0 { "立即重试".to_string() } else { format!("{} 毫秒", self.retry_delay_ms) },
            self.callback_progress_times,
            if self.enable_resume { "启用" } else { "禁用" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.timeout, 30);
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_delay_ms, 0);
        assert_eq!(config.callback_progress_times, 100);
        assert!(config.enable_resume);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.timeout = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.callback_progress_times = -1;
        assert!(config.validate().is_err());

        config = Config::default();
        config.jitter_factor = 1.5;
        assert!(config.validate().is_err());

        config = Config::default();
        config.retry_delay_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("resumedown.conf");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.retry_count = 7;
        config.save_with_tutorial(path).expect("保存带教程的配置失败");

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("resumedown 配置文件"));
        assert!(content.contains("故障排除"));

        let loaded = Config::load(path).expect("加载配置失败");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.conf");
        let path = path.to_str().unwrap();

        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
        assert!(Path::new(path).exists());
    }

    #[test]
    fn test_broken_config_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.conf");
        fs::write(&path, "timeout = \"soon\"").unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("retry_count = 9").unwrap();
        assert_eq!(config.retry_count, 9);
        assert_eq!(config.timeout, 30);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let mut config = Config::default();
        config.retry_count = 5;
        config.retry_delay_ms = 500;
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_config_summary() {
        let summary = Config::default().get_summary();
        assert!(summary.contains("配置摘要"));
        assert!(summary.contains("下载目录"));
        assert!(summary.contains("立即重试"));
    }
}
