//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber` 实现按组件的日志控制。日志写到 stderr，
//! stdout 只留给流水线输出。

use crate::config::LogConfig;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::Targets,
    fmt::{self, writer::MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::{SubscriberInitExt, TryInitError},
    Layer,
};

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

/// Failure while installing the subscriber
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("cannot open log file: {0}")]
    File(#[from] io::Error),

    #[error(transparent)]
    Init(#[from] TryInitError),
}

/// Build the per-component filter
pub fn targets(log_config: &LogConfig) -> Targets {
    Targets::new()
        .with_default(log_config.global)
        .with_target("passline::builder", log_config.level_for("passline::builder"))
        .with_target("passline::policy", log_config.level_for("passline::policy"))
        .with_target("passline::cli", log_config.global)
}

/// 使用指定格式和日志配置初始化日志系统，可选同时写入文件
pub fn init_with_file(
    log_config: &LogConfig,
    format: LogFormat,
    file: Option<&Path>,
) -> Result<(), LoggingError> {
    let targets = targets(log_config);

    let console = create_format_layer(format, io::stderr).with_filter(targets.clone());

    let file_layer = match file {
        Some(path) => {
            let handle = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(create_format_layer(format, Arc::new(handle)).with_filter(targets))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()?;
    Ok(())
}

/// Create formatter layer based on format
fn create_format_layer<S, W>(format: LogFormat, make_writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}
