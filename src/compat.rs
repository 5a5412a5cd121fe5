//! 兼容服务
//!
//! 系统模块进入 ACTIVE 时由系统上下文注册两个服务，供依赖启动级别和模块管理接口的模块使用。
//! 运行时没有启动级别，也不做依赖解析，这两个服务只给出固定的答复。

use std::sync::{Arc, Weak};

use tracing::debug;

use crate::event::{FrameworkEvent, FrameworkEventKind};
use crate::framework::FrameworkInner;
use crate::module::{Module, ModuleContext};
use crate::service::Properties;
use crate::utils::Result;

/// 启动级别服务接口名
pub const START_LEVEL_INTERFACE: &str = "chips.runtime.StartLevel";

/// 模块管理服务接口名
pub const MODULE_ADMIN_INTERFACE: &str = "chips.runtime.ModuleAdmin";

/// 启动级别服务
///
/// 所有启动级别都是 1，设置操作被接受但不生效。
#[derive(Debug, Default)]
pub struct StartLevelService;

impl StartLevelService {
    /// 运行时启动级别
    pub fn start_level(&self) -> u32 {
        1
    }

    /// 设置运行时启动级别（忽略）
    pub fn set_start_level(&self, level: u32) {
        debug!(level, "忽略启动级别设置");
    }

    /// 模块启动级别
    pub fn module_start_level(&self, _module: &Module) -> u32 {
        1
    }

    /// 设置模块启动级别（忽略）
    pub fn set_module_start_level(&self, module: &Module, level: u32) {
        debug!(module_id = module.id(), level, "忽略模块启动级别设置");
    }

    /// 新安装模块的初始启动级别
    pub fn initial_module_start_level(&self) -> u32 {
        1
    }

    /// 设置初始启动级别（忽略）
    pub fn set_initial_module_start_level(&self, level: u32) {
        debug!(level, "忽略初始启动级别设置");
    }

    /// 模块是否被持久启动
    pub fn is_persistently_started(&self, _module: &Module) -> bool {
        true
    }

    /// 模块是否使用激活策略
    pub fn is_activation_policy_used(&self, _module: &Module) -> bool {
        false
    }
}

/// 模块管理服务
pub struct ModuleAdminService {
    framework: Weak<FrameworkInner>,
}

impl ModuleAdminService {
    pub(crate) fn new(framework: Weak<FrameworkInner>) -> Self {
        Self { framework }
    }

    /// 按符号名查找模块（名称会先去除首尾空白）
    pub fn modules_by_name(&self, name: &str) -> Vec<Arc<Module>> {
        self.framework
            .upgrade()
            .and_then(|fw| fw.modules.get_by_name(name.trim()))
            .into_iter()
            .collect()
    }

    /// 刷新模块，只触发 PACKAGES_REFRESHED 框架事件
    pub fn refresh(&self, _modules: &[Arc<Module>]) {
        let Some(fw) = self.framework.upgrade() else {
            return;
        };
        if let Some(system) = fw.modules.get(0) {
            fw.dispatcher.fire_framework_event(FrameworkEvent::new(
                FrameworkEventKind::PackagesRefreshed,
                system,
            ));
        }
    }

    /// 解析模块，总是成功
    pub fn resolve(&self, _modules: &[Arc<Module>]) -> bool {
        true
    }

    /// 模块类型，总是 0
    pub fn module_type(&self, _module: &Module) -> u32 {
        0
    }
}

/// 在系统上下文中注册兼容服务
pub(crate) fn register_services(context: &ModuleContext, fw: &Arc<FrameworkInner>) -> Result<()> {
    context.register_object(&[START_LEVEL_INTERFACE], StartLevelService, Properties::new())?;
    context.register_object(
        &[MODULE_ADMIN_INTERFACE],
        ModuleAdminService::new(Arc::downgrade(fw)),
        Properties::new(),
    )?;
    debug!("兼容服务已注册");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_level_answers() {
        let module = Module::detached(1);
        let service = StartLevelService;
        assert_eq!(service.start_level(), 1);
        service.set_start_level(5);
        assert_eq!(service.start_level(), 1);
        service.set_module_start_level(&module, 3);
        assert_eq!(service.module_start_level(&module), 1);
        assert_eq!(service.initial_module_start_level(), 1);
        assert!(service.is_persistently_started(&module));
        assert!(!service.is_activation_policy_used(&module));
    }

    #[test]
    fn test_module_admin_without_framework() {
        let admin = ModuleAdminService::new(Weak::new());
        let module = Module::detached(1);
        assert!(admin.modules_by_name("anything").is_empty());
        assert!(admin.resolve(&[module.clone()]));
        assert_eq!(admin.module_type(&module), 0);
        admin.refresh(&[]);
    }
}
