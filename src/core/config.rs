//! 运行时配置
//!
//! 定义运行时的配置结构和加载逻辑。配置文件按扩展名选择格式：`.json` 使用 JSON，其余按 YAML 解析。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::event::DispatcherConfig;
use crate::module::ModuleDescriptor;
use crate::utils::{CoreError, Result};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略（hourly / daily / never）
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 事件投递配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// 是否同步投递模块/框架事件
    #[serde(default)]
    pub synchronous_delivery: bool,

    /// 是否在调用方任务中完成系统模块的停止
    #[serde(default)]
    pub synchronous_stop: bool,

    /// 单个监听器的处理超时（毫秒）
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
}

fn default_handler_timeout_ms() -> u64 {
    5000
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            synchronous_delivery: false,
            synchronous_stop: false,
            handler_timeout_ms: default_handler_timeout_ms(),
        }
    }
}

impl EventConfig {
    /// 转换为分发器配置
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            synchronous_delivery: self.synchronous_delivery,
            handler_timeout: Duration::from_millis(self.handler_timeout_ms),
        }
    }
}

/// 配置文件中声明的模块
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// 符号名（覆盖头信息中的值）
    #[serde(default)]
    pub symbolic_name: Option<String>,

    /// 版本（覆盖头信息中的值）
    #[serde(default)]
    pub version: Option<String>,

    /// 入口点标识（覆盖头信息中的值）
    #[serde(default)]
    pub activator: Option<String>,

    /// 位置，缺省为 `config:<序号>`
    #[serde(default)]
    pub location: Option<String>,

    /// 原始头信息
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ModuleEntry {
    /// 转换为模块描述
    ///
    /// # Arguments
    ///
    /// * `index` - 条目在配置中的序号，用于生成缺省位置
    pub fn to_descriptor(&self, index: usize) -> ModuleDescriptor {
        let location = self
            .location
            .clone()
            .unwrap_or_else(|| format!("config:{}", index));
        let mut descriptor = ModuleDescriptor::from_headers(location, self.headers.clone());
        if let Some(name) = &self.symbolic_name {
            descriptor = descriptor.symbolic_name(name.as_str());
        }
        if let Some(version) = &self.version {
            descriptor = descriptor.version(version);
        }
        if let Some(activator) = &self.activator {
            descriptor = descriptor.activator(activator.as_str());
        }
        descriptor
    }
}

/// 运行时配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 事件投递配置
    #[serde(default)]
    pub events: EventConfig,

    /// 启动时安装的模块
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,

    /// 运行时属性，模块上下文可读取
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl FrameworkConfig {
    /// 创建配置构建器
    pub fn builder() -> FrameworkConfigBuilder {
        FrameworkConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// # Errors
    ///
    /// 文件无法读取或格式错误时返回错误；取值不合法时返回 [`CoreError::InvalidConfigValue`]
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("无法读取 {}: {}", path.display(), e))
        })?;

        let mut config: FrameworkConfig =
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                serde_json::from_str(&content)?
            } else {
                serde_yaml::from_str(&content)?
            };

        config.validate()?;
        config.config_path = Some(path);
        Ok(config)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        if self.events.handler_timeout_ms == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "events.handler_timeout_ms".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if !matches!(self.logging.rotation.as_str(), "hourly" | "daily" | "never") {
            return Err(CoreError::InvalidConfigValue {
                key: "logging.rotation".to_string(),
                reason: format!("未知的轮转策略 '{}'", self.logging.rotation),
            });
        }
        Ok(())
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: FrameworkConfig) {
        // 只覆盖非默认值的配置
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.events.synchronous_delivery {
            self.events.synchronous_delivery = true;
        }
        if other.events.synchronous_stop {
            self.events.synchronous_stop = true;
        }
        if other.events.handler_timeout_ms != default_handler_timeout_ms() {
            self.events.handler_timeout_ms = other.events.handler_timeout_ms;
        }
        self.modules.extend(other.modules);
        self.properties.extend(other.properties);
    }

    /// 配置中声明的模块描述，按声明顺序
    pub fn module_descriptors(&self) -> Vec<ModuleDescriptor> {
        self.modules
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.to_descriptor(index))
            .collect()
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct FrameworkConfigBuilder {
    config: FrameworkConfig,
}

impl FrameworkConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 同步投递模块/框架事件
    pub fn synchronous_delivery(mut self) -> Self {
        self.config.events.synchronous_delivery = true;
        self
    }

    /// 在调用方任务中完成系统模块的停止
    pub fn synchronous_stop(mut self) -> Self {
        self.config.events.synchronous_stop = true;
        self
    }

    /// 设置监听器处理超时
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.config.events.handler_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// 添加模块
    pub fn module(mut self, entry: ModuleEntry) -> Self {
        self.config.modules.push(entry);
        self
    }

    /// 设置运行时属性
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.properties.insert(key.into(), value.into());
        self
    }

    /// 构建配置
    pub fn build(self) -> FrameworkConfig {
        self.config
    }
}
