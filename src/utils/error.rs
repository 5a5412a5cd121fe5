//! 运行时错误类型定义
//!
//! 本模块定义了模块运行时中使用的所有错误类型。

use thiserror::Error;

/// 运行时核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 生命周期错误 ====================

    /// 当前状态不允许该操作
    #[error("非法状态: {0}")]
    IllegalState(String),

    /// 模块激活失败（入口点加载或 start 钩子出错）
    #[error("模块激活失败: '{module}' - {source}")]
    Activation {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    /// 模块停止钩子出错（清理已完成）
    #[error("模块停止钩子失败: '{module}' - {source}")]
    Deactivation {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    /// 不支持的操作（更新、卸载）
    #[error("不支持的操作: {0}")]
    UnsupportedOperation(String),

    // ==================== 服务注册表错误 ====================

    /// 参数无效
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    /// 过滤器语法错误
    #[error("过滤器语法错误: '{filter}' 位置 {position} - {reason}")]
    InvalidSyntax {
        filter: String,
        position: usize,
        reason: String,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 运行时操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    pub const MODULE_ILLEGAL_STATE: &str = "MODULE-001";
    pub const MODULE_ACTIVATION_FAILED: &str = "MODULE-002";
    pub const MODULE_DEACTIVATION_FAILED: &str = "MODULE-003";
    pub const MODULE_UNSUPPORTED_OPERATION: &str = "MODULE-004";

    // 服务错误 (SERVICE-xxx)
    pub const SERVICE_INVALID_ARGUMENT: &str = "SERVICE-001";

    // 过滤器错误 (FILTER-xxx)
    pub const FILTER_SYNTAX_ERROR: &str = "FILTER-001";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 核心错误 (CORE-xxx)
    pub const CORE_INIT_FAILED: &str = "CORE-001";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::IllegalState(_) => error_code::MODULE_ILLEGAL_STATE,
            CoreError::Activation { .. } => error_code::MODULE_ACTIVATION_FAILED,
            CoreError::Deactivation { .. } => error_code::MODULE_DEACTIVATION_FAILED,
            CoreError::UnsupportedOperation(_) => error_code::MODULE_UNSUPPORTED_OPERATION,
            CoreError::InvalidArgument(_) => error_code::SERVICE_INVALID_ARGUMENT,
            CoreError::InvalidSyntax { .. } => error_code::FILTER_SYNTAX_ERROR,
            CoreError::ConfigLoadFailed(_) | CoreError::Yaml(_) | CoreError::Json(_) => {
                error_code::CONFIG_LOAD_FAILED
            }
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::InitFailed(_) => error_code::CORE_INIT_FAILED,
            _ => "UNKNOWN",
        }
    }

    /// 创建非法状态错误
    pub fn illegal_state(message: impl Into<String>) -> Self {
        CoreError::IllegalState(message.into())
    }

    /// 是否为生命周期相关错误
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            CoreError::IllegalState(_)
                | CoreError::Activation { .. }
                | CoreError::Deactivation { .. }
                | CoreError::UnsupportedOperation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::UnsupportedOperation("卸载 com.example.a".to_string());
        assert!(err.to_string().contains("com.example.a"));
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::illegal_state("starting");
        assert_eq!(err.error_code(), error_code::MODULE_ILLEGAL_STATE);

        let err = CoreError::InvalidSyntax {
            filter: "(a=".to_string(),
            position: 3,
            reason: "缺少右括号".to_string(),
        };
        assert_eq!(err.error_code(), error_code::FILTER_SYNTAX_ERROR);

        let err = CoreError::InitFailed("重复初始化".to_string());
        assert_eq!(err.error_code(), error_code::CORE_INIT_FAILED);
    }

    #[test]
    fn test_activation_error_keeps_source() {
        let err = CoreError::Activation {
            module: "a".to_string(),
            source: anyhow::anyhow!("boom"),
        };
        assert!(err.is_lifecycle_error());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }
}
