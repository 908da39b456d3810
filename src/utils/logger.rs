use anyhow::{Context, Result};
use chrono::Local; // 用于获取本地时间
use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// 日志文件默认位置，写文件可以避免日志打乱终端上的进度条
pub const DEFAULT_LOG_FILE: &str = "logs/resumedown.log";

fn builder(default_level: LevelFilter) -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder
}

/// 初始化全局日志。`log_file` 为 None 时输出到 stderr，
/// 级别可以用 `RUST_LOG` 覆盖
pub fn init(log_file: Option<&str>, default_level: LevelFilter) -> Result<()> {
    let mut builder = builder(default_level);
    if let Some(path) = log_file {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("无法创建日志目录: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("无法打开日志文件: {}", path))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.try_init().context("日志已经初始化")?;
    Ok(())
}
