//! 日志系统
//!
//! 基于 tracing 生态：控制台输出、JSON 格式、按时间轮转的文件输出（异步非阻塞）。
//! 过滤规则优先取环境变量 `RUST_LOG`，否则使用配置中的级别。
//!
//! # 示例
//!
//! ```rust,no_run
//! use chips_runtime::utils::logger::{Logger, LoggerConfig, RotationStrategy};
//!
//! let _guard = Logger::init(
//!     LoggerConfig::builder()
//!         .level("debug")
//!         .file_output("./logs")
//!         .rotation(RotationStrategy::Hourly)
//!         .build(),
//! )
//! .unwrap();
//! tracing::info!(module_id = 1, "模块已启动");
//! ```

use crate::core::config::LogConfig;
use crate::utils::{CoreError, Result};
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// 日志轮转策略
// ============================================================================

/// 日志轮转策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    /// 不轮转（单个日志文件）
    Never,
    /// 每小时轮转
    Hourly,
    /// 每天轮转（默认）
    #[default]
    Daily,
}

impl RotationStrategy {
    fn to_rotation(self) -> Rotation {
        match self {
            RotationStrategy::Never => Rotation::NEVER,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        }
    }

    /// 从字符串解析，无法识别时使用每天轮转
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "never" | "none" => RotationStrategy::Never,
            "hourly" | "hour" => RotationStrategy::Hourly,
            _ => RotationStrategy::Daily,
        }
    }
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationStrategy::Never => write!(f, "never"),
            RotationStrategy::Hourly => write!(f, "hourly"),
            RotationStrategy::Daily => write!(f, "daily"),
        }
    }
}

// ============================================================================
// 日志配置
// ============================================================================

/// 日志系统配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 默认日志级别（例如 "trace", "debug", "info", "warn", "error"）
    pub level: String,

    /// 是否使用 JSON 格式输出
    pub json_format: bool,

    /// 是否输出到控制台
    pub console_output: bool,

    /// 文件输出目录（None 表示不输出到文件）
    pub file_output: Option<PathBuf>,

    /// 日志文件名前缀
    pub file_prefix: String,

    /// 日志轮转策略
    pub rotation: RotationStrategy,

    /// 是否显示目标模块
    pub show_target: bool,

    /// 自定义过滤指令（EnvFilter 格式）
    /// 例如："chips_runtime=debug,chips_runtime::event=trace"
    pub filter_directives: Option<String>,

    /// 是否启用 ANSI 颜色（控制台输出）
    pub ansi_colors: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: None,
            file_prefix: "chips-runtime".to_string(),
            rotation: RotationStrategy::Daily,
            show_target: true,
            filter_directives: None,
            ansi_colors: true,
        }
    }
}

impl LoggerConfig {
    /// 创建配置构建器
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::new()
    }

    /// 从运行时配置的日志段创建
    pub fn from_log_config(log_config: &LogConfig) -> Self {
        Self {
            level: log_config.level.clone(),
            json_format: log_config.json_format,
            file_output: if log_config.file_output {
                log_config.log_dir.clone()
            } else {
                None
            },
            rotation: RotationStrategy::parse(&log_config.rotation),
            ..Default::default()
        }
    }
}

/// 日志配置构建器
#[derive(Debug, Default)]
pub struct LoggerConfigBuilder {
    config: LoggerConfig,
}

impl LoggerConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置日志级别
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// 启用 JSON 格式输出
    pub fn json_format(mut self, enable: bool) -> Self {
        self.config.json_format = enable;
        self
    }

    /// 设置控制台输出
    pub fn console_output(mut self, enable: bool) -> Self {
        self.config.console_output = enable;
        self
    }

    /// 设置文件输出目录
    pub fn file_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.file_output = Some(dir.into());
        self
    }

    /// 设置日志文件前缀
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    /// 设置轮转策略
    pub fn rotation(mut self, strategy: RotationStrategy) -> Self {
        self.config.rotation = strategy;
        self
    }

    /// 设置过滤指令
    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.config.filter_directives = Some(directives.into());
        self
    }

    /// 启用 ANSI 颜色
    pub fn ansi_colors(mut self, enable: bool) -> Self {
        self.config.ansi_colors = enable;
        self
    }

    /// 构建配置
    pub fn build(self) -> LoggerConfig {
        self.config
    }
}

// ============================================================================
// 日志守卫
// ============================================================================

/// 日志系统守卫
///
/// 持有非阻塞写入器的 WorkerGuard，丢弃时等待挂起的日志写入完成。
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

impl LogGuard {
    fn empty() -> Self {
        Self {
            _guards: Vec::new(),
        }
    }

    /// 是否持有写入器
    pub fn is_empty(&self) -> bool {
        self._guards.is_empty()
    }
}

// ============================================================================
// 日志系统
// ============================================================================

static LOGGER_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// 日志系统
pub struct Logger;

impl Logger {
    /// 初始化日志系统
    ///
    /// # Arguments
    ///
    /// * `config` - 日志配置
    ///
    /// # Returns
    ///
    /// 返回 `LogGuard`，必须保持活动状态直到程序退出
    ///
    /// # Errors
    ///
    /// 日志系统已初始化或全局订阅者已被设置时返回 [`CoreError::InitFailed`]
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if LOGGER_INITIALIZED.get().is_some() {
            return Err(CoreError::InitFailed(
                "日志系统已初始化，不能重复初始化".to_string(),
            ));
        }

        let env_filter = Self::create_env_filter(&config);
        let mut guard = LogGuard::empty();

        let console_writer = config.console_output.then(|| {
            let (writer, console_guard) = tracing_appender::non_blocking(io::stdout());
            guard._guards.push(console_guard);
            writer
        });
        let file_writer = config.file_output.as_ref().map(|log_dir| {
            let appender = RollingFileAppender::new(
                config.rotation.to_rotation(),
                log_dir,
                format!("{}.log", config.file_prefix),
            );
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard._guards.push(file_guard);
            writer
        });

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = if config.json_format {
            registry
                .with(console_writer.map(|w| {
                    fmt::layer()
                        .json()
                        .with_writer(w)
                        .with_target(config.show_target)
                }))
                .with(file_writer.map(|w| {
                    fmt::layer()
                        .json()
                        .with_writer(w)
                        .with_target(config.show_target)
                }))
                .try_init()
        } else {
            registry
                .with(console_writer.map(|w| {
                    fmt::layer()
                        .with_writer(w)
                        .with_target(config.show_target)
                        .with_ansi(config.ansi_colors)
                }))
                .with(file_writer.map(|w| {
                    fmt::layer()
                        .with_writer(w)
                        .with_target(config.show_target)
                        .with_ansi(false)
                }))
                .try_init()
        };
        result.map_err(|e| CoreError::InitFailed(format!("日志系统初始化失败: {}", e)))?;

        let _ = LOGGER_INITIALIZED.set(true);
        Ok(guard)
    }

    /// 尝试初始化日志系统，已初始化时返回空守卫
    pub fn try_init(config: LoggerConfig) -> LogGuard {
        Self::init(config).unwrap_or_else(|_| LogGuard::empty())
    }

    fn create_env_filter(config: &LoggerConfig) -> EnvFilter {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.level));

        match &config.filter_directives {
            Some(directives) => directives
                .split(',')
                .filter_map(|d| d.trim().parse().ok())
                .fold(filter, |f, directive| f.add_directive(directive)),
            None => filter,
        }
    }
}
