//! 运行时入口
//!
//! [`Framework`] 组装服务注册表、事件分发器和模块表，安装系统模块（ID 0）以及配置中声明的模块。
//!
//! # 示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_runtime::{ActivatorRegistry, Framework, FrameworkConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FrameworkConfig::builder().synchronous_stop().build();
//!     let framework = Framework::new(config, Arc::new(ActivatorRegistry::new()));
//!
//!     framework.start().await?;
//!     framework.stop().await?;
//!     framework.wait_for_stop().await;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::config::FrameworkConfig;
use crate::event::EventDispatcher;
use crate::module::{
    ActivatorLoader, Module, ModuleContext, ModuleDescriptor, ModuleKind, ModuleTable,
};
use crate::service::ServiceRegistry;
use crate::utils::Result;

/// 系统模块符号名
pub const SYSTEM_SYMBOLIC_NAME: &str = "chips.runtime.system";

/// 运行时共享状态，模块通过弱引用访问
pub(crate) struct FrameworkInner {
    pub(crate) config: FrameworkConfig,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) registry: Arc<ServiceRegistry>,
    pub(crate) modules: ModuleTable,
    pub(crate) loader: Arc<dyn ActivatorLoader>,
    /// 后台停止任务
    pub(crate) stop_task: Mutex<Option<JoinHandle<()>>>,
}

/// 模块运行时
pub struct Framework {
    inner: Arc<FrameworkInner>,
    system: Arc<Module>,
}

impl Framework {
    /// 创建运行时
    ///
    /// 安装系统模块，然后按声明顺序安装配置中的模块。符号名重复的模块被跳过。
    ///
    /// # Arguments
    ///
    /// * `config` - 运行时配置
    /// * `loader` - 入口点加载器
    pub fn new(config: FrameworkConfig, loader: Arc<dyn ActivatorLoader>) -> Self {
        let dispatcher = Arc::new(EventDispatcher::with_config(
            config.events.to_dispatcher_config(),
        ));
        let registry = ServiceRegistry::new(dispatcher.clone());
        let descriptors = config.module_descriptors();

        let inner = Arc::new(FrameworkInner {
            config,
            dispatcher,
            registry,
            modules: ModuleTable::new(),
            loader,
            stop_task: Mutex::new(None),
        });

        let system_descriptor = ModuleDescriptor::new("System Module")
            .symbolic_name(SYSTEM_SYMBOLIC_NAME)
            .version(crate::VERSION);
        let weak = Arc::downgrade(&inner);
        let system = Module::new(0, ModuleKind::System, system_descriptor, weak);
        inner
            .modules
            .install(Some(SYSTEM_SYMBOLIC_NAME), |_| system.clone());

        let framework = Self { inner, system };
        for descriptor in descriptors {
            let location = descriptor.location.clone();
            if framework.install(descriptor).is_none() {
                warn!(location = %location, "符号名重复，模块未安装");
            }
        }
        info!(modules = framework.inner.modules.len(), "运行时已创建");
        framework
    }

    /// 安装模块
    ///
    /// # Returns
    ///
    /// 符号名已被占用时返回 None，模块不会获得 ID
    pub fn install(&self, descriptor: ModuleDescriptor) -> Option<Arc<Module>> {
        let name = descriptor.symbolic_name.clone();
        let weak = Arc::downgrade(&self.inner);
        self.inner.modules.install(name.as_deref(), move |id| {
            Module::new(id, ModuleKind::Regular, descriptor, weak)
        })
    }

    /// 启动系统模块及所有模块
    ///
    /// # Errors
    ///
    /// 只有系统模块自身的启动失败会返回错误；其他模块的失败通过日志和框架 ERROR 事件报告
    pub async fn start(&self) -> Result<()> {
        self.system.start().await
    }

    /// 停止系统模块及所有模块
    ///
    /// 未配置同步停止时，其余模块在后台任务中停止，用 [`Framework::wait_for_stop`] 等待完成。
    pub async fn stop(&self) -> Result<()> {
        self.system.stop().await
    }

    /// 等待后台停止任务完成，并等待已排队的事件投递完毕
    pub async fn wait_for_stop(&self) {
        let task = self.inner.stop_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "后台停止任务异常结束");
            }
        }
        self.inner.dispatcher.flush().await;
    }

    /// 系统模块
    pub fn system_module(&self) -> &Arc<Module> {
        &self.system
    }

    /// 按 ID 获取模块
    pub fn module(&self, id: u64) -> Option<Arc<Module>> {
        self.inner.modules.get(id)
    }

    /// 按符号名获取模块
    pub fn module_by_name(&self, name: &str) -> Option<Arc<Module>> {
        self.inner.modules.get_by_name(name)
    }

    /// 所有模块，按 ID 升序
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.inner.modules.all()
    }

    /// 服务注册表
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.inner.registry
    }

    /// 事件分发器
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }

    /// 系统上下文（系统模块运行期间存在）
    pub fn context(&self) -> Option<Arc<ModuleContext>> {
        self.system.context()
    }

    /// 运行时配置
    pub fn config(&self) -> &FrameworkConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ActivatorRegistry, ModuleState};

    fn framework() -> Framework {
        Framework::new(
            FrameworkConfig::builder().synchronous_stop().build(),
            Arc::new(ActivatorRegistry::new()),
        )
    }

    #[test]
    fn test_system_module_is_zero() {
        let fw = framework();
        let system = fw.system_module();
        assert_eq!(system.id(), 0);
        assert!(system.is_system());
        assert_eq!(system.symbolic_name(), Some(SYSTEM_SYMBOLIC_NAME));
        assert_eq!(system.state(), ModuleState::Resolved);
        assert!(fw.context().is_none());
    }

    #[test]
    fn test_install_assigns_ids() {
        let fw = framework();
        let a = fw
            .install(ModuleDescriptor::new("mem:a").symbolic_name("a"))
            .unwrap();
        let b = fw.install(ModuleDescriptor::new("mem:b")).unwrap();
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert!(fw
            .install(ModuleDescriptor::new("mem:a2").symbolic_name("a"))
            .is_none());
        assert_eq!(fw.modules().len(), 3);
        assert_eq!(fw.module_by_name("a").map(|m| m.id()), Some(1));
    }

    #[tokio::test]
    async fn test_start_and_stop_empty_framework() {
        let fw = framework();
        fw.start().await.unwrap();
        assert_eq!(fw.system_module().state(), ModuleState::Active);
        assert!(fw.context().is_some());
        assert_eq!(fw.registry().service_count(), 2);

        fw.stop().await.unwrap();
        fw.wait_for_stop().await;
        assert_eq!(fw.system_module().state(), ModuleState::Resolved);
        assert_eq!(fw.registry().service_count(), 0);
        assert!(!fw.dispatcher().is_delivering());
    }
}
