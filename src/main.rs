use actix::prelude::*;
use anyhow::{Context, Result};
use crossterm::{
    cursor, execute, terminal,
    event::{self, Event, KeyCode},
};
use log::LevelFilter;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use resumedown::cli;
use resumedown::config::Config;
use resumedown::core::task::{FileBreakpointCheck, TaskId, TaskRecord};
use resumedown::core::worker::{self, Worker};
use resumedown::core::{
    AwcTransport, DownloadTask, EventPoolActor, HeaderList, JsonTaskStore, Subscribe, TaskOutcome,
    TaskStatus,
};
use resumedown::ui::{self, DownloadSummary, ProgressActor, Track};
use resumedown::utils::logger;

const KEYBOARD_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[actix::main]
async fn main() -> Result<()> {
    logger::init(Some(logger::DEFAULT_LOG_FILE), LevelFilter::Info)?;
    log::info!(
        "程序启动 版本={} 提交={} 构建时间={}",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
    );

    let (args, config) = cli::Args::parse_args()?;
    let urls = args.get_urls()?;
    let headers = args.custom_headers()?;
    log::info!("解析到的URLs: {:?}", urls);
    log::info!("{}", config.get_summary());
    println!("{}", config.get_summary());

    let store = Arc::new(JsonTaskStore::open(&config.store_path)?);
    let pool = EventPoolActor::default().start();
    let progress = ProgressActor::new().start();
    pool.send(Subscribe(progress.clone().recipient()))
        .await
        .context("无法订阅进度事件")?;

    let transport = Arc::new(AwcTransport::from_config(&config));
    let breakpoint = Arc::new(FileBreakpointCheck { enable_resume: config.enable_resume });

    let started = Instant::now();
    let single = urls.len() == 1;
    let mut workers = Vec::new();
    let mut summary = DownloadSummary { total_files: urls.len(), ..Default::default() };

    for url in &urls {
        let path = args.target_path(url, &config.download_dir, single)?;
        let Some(id) = prepare_record(&store, &config, url, &path, &headers) else {
            ui::print_success(&format!("已下载过，跳过: {}", path));
            summary.success_count += 1;
            continue;
        };

        let name = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone());
        let Some(builder) = DownloadTask::from_store(id, store.clone(), Box::new(pool.clone()), transport.clone())
        else {
            ui::print_error(&format!("任务记录丢失: {}", path));
            summary.failed_count += 1;
            continue;
        };
        progress.send(Track { id, name }).await.context("无法创建进度条")?;

        let task = builder
            .breakpoint_check(breakpoint.clone())
            .retry_policy(config.retry_policy())
            .buffer_size(config.buffer_size)
            .build();
        workers.push(worker::spawn(task)?);
    }

    if !workers.is_empty() {
        println!("\n开始下载... (按 'p' 暂停全部, 'q' 退出)");
        run_keyboard_loop(&workers).await?;
    }

    for worker in workers {
        match worker.join()? {
            (_, TaskOutcome::Completed { total }) => {
                summary.success_count += 1;
                summary.total_size += total;
            }
            (task, TaskOutcome::Paused { so_far }) => {
                log::info!("[{}] 暂停于 {} 字节", task.id(), so_far);
                summary.paused_count += 1;
                summary.total_size += so_far;
            }
            (task, TaskOutcome::Failed(e)) => {
                ui::print_error(&format!("[{}] {}", task.id(), e));
                summary.failed_count += 1;
            }
        }
    }
    // 让进度条处理完剩余事件
    tokio::time::sleep(Duration::from_millis(100)).await;

    summary.elapsed_time = started.elapsed();
    println!("{}", summary);
    log::info!(
        "下载结束 - 成功: {}, 暂停: {}, 失败: {}",
        summary.success_count, summary.paused_count, summary.failed_count
    );
    System::current().stop();
    Ok(())
}

/// 复用上次同一 URL 和路径的任务记录以便续传，已完成且文件仍在时返回 None
fn prepare_record(
    store: &JsonTaskStore,
    config: &Config,
    url: &str,
    path: &str,
    headers: &HeaderList,
) -> Option<TaskId> {
    let record = match store.find_by_target(url, path) {
        Some(mut record) => {
            if record.status == TaskStatus::Completed && Path::new(path).is_file() {
                return None;
            }
            log::info!("[{}] 复用任务记录 状态={} 已下载={}", record.id, record.status, record.so_far);
            record.status = TaskStatus::Pending;
            record
        }
        None => TaskRecord::new(url, path),
    };
    let record = record
        .with_callback_progress_times(config.callback_progress_times)
        .with_headers(headers.clone());
    let id = record.id;
    store.insert(record);
    Some(id)
}

/// 处理键盘输入，所有下载线程结束后返回
async fn run_keyboard_loop(workers: &[Worker]) -> Result<()> {
    terminal::enable_raw_mode()?;
    execute!(std::io::stderr(), cursor::Hide)?;

    let result = async {
        while !workers.iter().all(Worker::is_finished) {
            if event::poll(KEYBOARD_POLL_INTERVAL)? {
                if let Event::Key(key_event) = event::read()? {
                    match key_event.code {
                        KeyCode::Char('p') | KeyCode::Char('P') => {
                            workers.iter().for_each(|w| w.handle().cancel());
                            log::info!("用户暂停所有下载任务");
                        }
                        KeyCode::Char('q') | KeyCode::Char('Q') => {
                            // 退出前先暂停，保证进度已写入任务记录
                            workers.iter().for_each(|w| w.handle().cancel());
                            log::info!("用户主动退出下载");
                            break;
                        }
                        _ => {}
                    }
                }
            }
            // 让出执行权给进度条 actor
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    execute!(std::io::stderr(), cursor::Show)?;
    terminal::disable_raw_mode()?;
    result
}
