//! # Chips Runtime - 薯片模块运行时
//!
//! 进程内的模块运行时：独立打包的模块通过服务注册表发布和发现服务，无需构建期装配。
//!
//! - **模块生命周期**: RESOLVED → STARTING → ACTIVE → STOPPING → RESOLVED，
//!   每个模块独立加锁，系统模块（ID 0）负责启动和停止其余模块
//! - **服务注册表**: 按接口和过滤器查找服务，按排名和 ID 选出最佳服务
//! - **事件分发**: 模块、服务和框架事件，服务事件同步投递，其余可排队投递
//! - **过滤器**: LDAP 风格的过滤表达式
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_runtime::{ActivatorRegistry, Framework, FrameworkConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let framework = Framework::new(FrameworkConfig::default(), Arc::new(ActivatorRegistry::new()));
//!
//!     // 启动系统模块及所有模块
//!     framework.start().await?;
//!
//!     framework.stop().await?;
//!     framework.wait_for_stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块、上下文、入口点
//! - `service` - 属性、过滤器、服务注册表
//! - `event` - 事件定义与分发
//! - `compat` - 启动级别和模块管理兼容服务
//! - `core` - 运行时配置
//! - `utils` - 错误类型和日志

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod compat;
pub mod core;
pub mod event;
pub mod framework;
pub mod module;
pub mod service;
pub mod utils;

// 重导出常用类型，方便使用
pub use compat::{ModuleAdminService, StartLevelService};
pub use event::{
    EventDispatcher, FrameworkEvent, FrameworkEventKind, ModuleEvent, ModuleEventKind,
    ServiceEvent, ServiceEventKind,
};
pub use framework::Framework;
pub use module::{
    Activator, ActivatorLoader, ActivatorRegistry, Module, ModuleContext, ModuleDescriptor,
    ModuleState, StaticResources,
};
pub use service::{
    Filter, Properties, PropertyValue, ServiceFactory, ServiceReference, ServiceRegistration,
    ServiceRegistry, ServiceSource,
};

pub use core::config::{EventConfig, FrameworkConfig, FrameworkConfigBuilder, LogConfig, ModuleEntry};
pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, CoreError, Result};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
