//! # Observability
//!
//! 可观测性模块：日志订阅器 + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact)，日志统一写到 stderr
//! - 过滤指令优先级：显式指令 > `RUST_LOG` > 默认指令
//! - Prometheus 指标导出
//! - 逐 spin 指标采集与汇总
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{LogFormat, ObservabilityConfig};
//!
//! observability::init_with_config(ObservabilityConfig {
//!     log_format: LogFormat::Compact,
//!     ..Default::default()
//! })?;
//!
//! while synchronizer.next_spin()? {
//!     if let Some(spin) = synchronizer.get_spin() {
//!         observability::record_spin_emitted(spin, wait_s);
//!     }
//! }
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_localization_switch, record_pending_depth, record_spin_discarded, record_spin_emitted,
    record_stale_update, record_transform_broadcast, MetricsSummary, PlaybackMetricsAggregator,
    RunningStats, StatsSummary,
};

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// 显式过滤指令，设置后忽略 `RUST_LOG`
    pub filter: Option<String>,
    /// `RUST_LOG` 未设置时使用的指令
    pub default_filter: String,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            filter: None,
            default_filter: "info".to_string(),
            metrics_port: None,
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志，带文件与行号
    Json,
    /// 人类可读的多行格式
    Pretty,
    /// 紧凑单行格式
    #[default]
    Compact,
}

/// 按优先级构造过滤器
///
/// # Errors
/// 显式指令或默认指令无法解析时返回错误；`RUST_LOG` 无效时退回默认指令。
pub fn build_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    if let Some(directives) = &config.filter {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter: {directives}"));
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.default_filter)
        .with_context(|| format!("Invalid default log filter: {}", config.default_filter))
}

/// 安装全局日志订阅器，按需启动 Prometheus
///
/// stdout 留给报告输出，日志只写 stderr。重复调用返回错误。
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_writer(std::io::stderr).pretty().boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// 仅安装 Prometheus recorder
///
/// 每个进程只能安装一次。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
