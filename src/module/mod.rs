//! 模块层
//!
//! 包含模块系统的核心组件：
//! - 模块描述与头信息
//! - 生命周期状态机和系统模块
//! - 模块上下文
//! - 入口点加载

pub mod activator;
pub mod context;
pub mod headers;
pub mod metadata;
#[allow(clippy::module_inception)]
pub mod module;
pub mod table;

mod system;

// 重导出常用类型
pub use activator::{Activator, ActivatorConstructor, ActivatorLoader, ActivatorRegistry};
pub use context::ModuleContext;
pub use headers::{localize_headers, ModuleResources, StaticResources};
pub use metadata::{ModuleDescriptor, ModuleKind, ModuleState};
pub use module::Module;
pub use table::ModuleTable;
