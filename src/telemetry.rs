//! 日志与追踪系统
//! 初始化结构化日志

use crate::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Third-party targets that are too chatty at `debug`
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "hyper=info", "tower_http=info"];

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 生产环境
    Json,
    /// 开发环境
    Pretty,
    Compact,
}

impl LogFormat {
    /// Unrecognized names fall back to `Compact`
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Filter directives built from the configured level
pub fn filter_directives(config: &AppConfig) -> String {
    std::iter::once(config.logging.level.as_str())
        .chain(QUIET_TARGETS.iter().copied())
        .collect::<Vec<_>>()
        .join(",")
}

/// 初始化日志与追踪系统
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_telemetry(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(config))?,
    };

    let format = LogFormat::parse(&config.logging.format);
    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(false)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(log_layer)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.logging.level,
        format = ?format,
        "Telemetry initialized"
    );

    Ok(())
}
