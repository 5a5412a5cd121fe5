//! 模块生命周期状态机
//!
//! 状态：RESOLVED → STARTING → ACTIVE → STOPPING → RESOLVED。
//!
//! 每个模块有独立的生命周期锁，同一模块同一时刻只有一个启动/停止在进行；
//! 不同模块的过渡可以并发。状态本身另用读写锁保存，过渡期间可被读取，
//! 入口点在 start/stop 钩子里重入本模块时据此快速返回，而不是等锁。

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use semver::Version;
use tracing::{debug, info, instrument, warn};

use super::activator::Activator;
use super::context::ModuleContext;
use super::headers::localize_headers;
use super::metadata::{ModuleDescriptor, ModuleKind, ModuleState};
use super::system;
use crate::event::{ModuleEvent, ModuleEventKind};
use crate::framework::FrameworkInner;
use crate::service::ServiceReference;
use crate::utils::{CoreError, Result};

/// 模块
pub struct Module {
    /// 模块 ID（0 为系统模块）
    id: u64,

    /// 模块种类
    kind: ModuleKind,

    /// 模块描述
    descriptor: ModuleDescriptor,

    /// 安装时间
    installed_at: DateTime<Utc>,

    /// 生命周期状态
    state: RwLock<ModuleState>,

    /// 生命周期锁
    pub(crate) lifecycle: Arc<tokio::sync::Mutex<()>>,

    /// 当前上下文（STARTING / ACTIVE / STOPPING 期间存在）
    context: RwLock<Option<Arc<ModuleContext>>>,

    /// 入口点实例（ACTIVE 期间存在）
    activator: Mutex<Option<Arc<dyn Activator>>>,

    /// 所属运行时
    framework: Weak<FrameworkInner>,
}

impl Module {
    pub(crate) fn new(
        id: u64,
        kind: ModuleKind,
        descriptor: ModuleDescriptor,
        framework: Weak<FrameworkInner>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            descriptor,
            installed_at: Utc::now(),
            state: RwLock::new(ModuleState::Resolved),
            lifecycle: Arc::new(tokio::sync::Mutex::new(())),
            context: RwLock::new(None),
            activator: Mutex::new(None),
            framework,
        })
    }

    /// 不属于任何运行时的模块，仅用于测试事件和注册表
    #[cfg(test)]
    pub(crate) fn detached(id: u64) -> Arc<Self> {
        Self::new(
            id,
            ModuleKind::Regular,
            ModuleDescriptor::new(format!("test:{}", id)),
            Weak::new(),
        )
    }

    // ====== 身份与元数据 ======

    /// 模块 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 模块种类
    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// 是否为系统模块
    pub fn is_system(&self) -> bool {
        self.kind == ModuleKind::System
    }

    /// 符号名
    pub fn symbolic_name(&self) -> Option<&str> {
        self.descriptor.symbolic_name.as_deref()
    }

    /// 版本
    pub fn version(&self) -> &Version {
        &self.descriptor.version
    }

    /// 位置
    pub fn location(&self) -> &str {
        &self.descriptor.location
    }

    /// 入口点标识
    pub fn activator_identifier(&self) -> Option<&str> {
        self.descriptor.activator.as_deref()
    }

    /// 原始头信息
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.descriptor.headers
    }

    /// 本地化后的头信息
    pub fn localized_headers(&self, locale: &str) -> BTreeMap<String, String> {
        localize_headers(
            &self.descriptor.headers,
            locale,
            self.descriptor.resources.as_deref(),
        )
    }

    /// 最后修改时间（无资源时为安装时间）
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.descriptor.last_modified().unwrap_or(self.installed_at)
    }

    /// 读取资源条目
    pub fn entry(&self, path: &str) -> Option<Vec<u8>> {
        self.descriptor.resources.as_ref()?.entry(path)
    }

    /// 当前状态
    pub fn state(&self) -> ModuleState {
        *self.state.read()
    }

    /// 当前上下文
    pub fn context(&self) -> Option<Arc<ModuleContext>> {
        self.context.read().clone()
    }

    /// 本模块注册的服务
    pub fn registered_services(&self) -> Vec<ServiceReference> {
        self.framework
            .upgrade()
            .map(|fw| fw.registry.registered_by(self.id))
            .unwrap_or_default()
    }

    /// 本模块正在使用的服务
    pub fn services_in_use(&self) -> Vec<ServiceReference> {
        self.framework
            .upgrade()
            .map(|fw| fw.registry.in_use_by(self.id))
            .unwrap_or_default()
    }

    // ====== 生命周期 ======

    /// 启动模块
    ///
    /// - RESOLVED：创建上下文并调用入口点 start 钩子，成功后进入 ACTIVE
    /// - ACTIVE：无操作
    /// - 其他状态：[`CoreError::IllegalState`]
    ///
    /// # Errors
    ///
    /// 入口点加载或 start 钩子失败时返回 [`CoreError::Activation`]，模块回到 RESOLVED，
    /// 其间注册的服务和监听器全部撤销。
    #[instrument(skip(self), fields(module_id = self.id))]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_system() {
            return system::start(self).await;
        }

        match self.state() {
            ModuleState::Active => return Ok(()),
            ModuleState::Resolved => {}
            other => return Err(self.illegal_transition("启动", other)),
        }
        let fw = self.framework()?;
        let _guard = self.lifecycle.lock().await;
        match self.state() {
            ModuleState::Active => return Ok(()),
            ModuleState::Resolved => {}
            other => return Err(self.illegal_transition("启动", other)),
        }

        self.set_state(ModuleState::Starting);
        let context = ModuleContext::new(self, &fw);
        *self.context.write() = Some(context.clone());
        self.fire(&fw, ModuleEventKind::Starting);

        match self.activate(&fw, &context).await {
            Ok(activator) => {
                *self.activator.lock() = activator;
                self.set_state(ModuleState::Active);
                self.fire(&fw, ModuleEventKind::Started);
                info!(symbolic_name = ?self.symbolic_name(), "模块已启动");
                Ok(())
            }
            Err(source) => {
                self.teardown(&fw, &context);
                self.set_state(ModuleState::Resolved);
                self.fire(&fw, ModuleEventKind::Stopped);
                warn!(error = %source, "模块启动失败");
                Err(CoreError::Activation {
                    module: self.display_name(),
                    source,
                })
            }
        }
    }

    /// 停止模块
    ///
    /// - ACTIVE：调用 stop 钩子，然后无条件撤销服务、监听器和上下文，回到 RESOLVED
    /// - RESOLVED / STOPPING：无操作
    /// - STARTING：[`CoreError::IllegalState`]
    ///
    /// # Errors
    ///
    /// stop 钩子失败时在清理完成后返回 [`CoreError::Deactivation`]
    #[instrument(skip(self), fields(module_id = self.id))]
    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        if self.is_system() {
            return system::stop(self).await;
        }

        match self.state() {
            ModuleState::Resolved | ModuleState::Stopping => return Ok(()),
            ModuleState::Active => {}
            other => return Err(self.illegal_transition("停止", other)),
        }
        let fw = self.framework()?;
        let _guard = self.lifecycle.lock().await;
        match self.state() {
            ModuleState::Resolved | ModuleState::Stopping => return Ok(()),
            ModuleState::Active => {}
            other => return Err(self.illegal_transition("停止", other)),
        }

        self.set_state(ModuleState::Stopping);
        self.fire(&fw, ModuleEventKind::Stopping);

        let activator = self.activator.lock().take();
        let context = self.context();
        let hook_result = match (activator, &context) {
            (Some(activator), Some(context)) => {
                match AssertUnwindSafe(activator.stop(context)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(anyhow::anyhow!(
                        "stop 钩子 panic: {}",
                        panic_message(panic.as_ref())
                    )),
                }
            }
            _ => Ok(()),
        };

        if let Some(context) = &context {
            self.teardown(&fw, context);
        }
        self.set_state(ModuleState::Resolved);
        self.fire(&fw, ModuleEventKind::Stopped);

        match hook_result {
            Ok(()) => {
                info!(symbolic_name = ?self.symbolic_name(), "模块已停止");
                Ok(())
            }
            Err(source) => {
                warn!(error = %source, "模块 stop 钩子失败，清理已完成");
                Err(CoreError::Deactivation {
                    module: self.display_name(),
                    source,
                })
            }
        }
    }

    /// 更新模块（不支持）
    pub async fn update(&self) -> Result<()> {
        Err(CoreError::UnsupportedOperation(format!(
            "模块 {} 不支持更新",
            self.display_name()
        )))
    }

    /// 卸载模块（不支持）
    pub async fn uninstall(&self) -> Result<()> {
        Err(CoreError::UnsupportedOperation(format!(
            "模块 {} 不支持卸载",
            self.display_name()
        )))
    }

    // ====== 内部实现 ======

    pub(crate) fn framework(&self) -> Result<Arc<FrameworkInner>> {
        self.framework
            .upgrade()
            .ok_or_else(|| CoreError::illegal_state("运行时已关闭"))
    }

    pub(crate) fn set_state(&self, state: ModuleState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        debug!(module_id = self.id, from = %previous, to = %state, "模块状态变更");
    }

    pub(crate) fn set_context(&self, context: Option<Arc<ModuleContext>>) {
        *self.context.write() = context;
    }

    pub(crate) fn fire(self: &Arc<Self>, fw: &FrameworkInner, kind: ModuleEventKind) {
        fw.dispatcher
            .fire_module_event(ModuleEvent::new(kind, self.clone()));
    }

    /// 等待进行中的过渡完成
    pub(crate) async fn settle(&self) {
        let _guard = self.lifecycle.lock().await;
    }

    /// 撤销上下文创建的一切：服务、使用中的服务、监听器
    pub(crate) fn teardown(self: &Arc<Self>, fw: &FrameworkInner, context: &Arc<ModuleContext>) {
        context.invalidate();
        let unregistered = fw.registry.unregister_all(self.id);
        fw.registry.release_usages(self);
        let listeners = fw.dispatcher.remove_all_listeners(context.id());
        self.set_context(None);
        debug!(
            module_id = self.id,
            unregistered, listeners, "模块上下文已销毁"
        );
    }

    async fn activate(
        self: &Arc<Self>,
        fw: &FrameworkInner,
        context: &Arc<ModuleContext>,
    ) -> anyhow::Result<Option<Arc<dyn Activator>>> {
        let Some(identifier) = self.activator_identifier() else {
            return Ok(None);
        };
        let activator = fw.loader.load(identifier)?;

        match AssertUnwindSafe(activator.start(context)).catch_unwind().await {
            Ok(Ok(())) => Ok(Some(activator)),
            Ok(Err(e)) => Err(e),
            Err(panic) => Err(anyhow::anyhow!(
                "start 钩子 panic: {}",
                panic_message(panic.as_ref())
            )),
        }
    }

    fn illegal_transition(&self, action: &str, state: ModuleState) -> CoreError {
        CoreError::illegal_state(format!(
            "模块 {} 处于 {} 状态，无法{}",
            self.display_name(),
            state,
            action
        ))
    }

    pub(crate) fn display_name(&self) -> String {
        match self.symbolic_name() {
            Some(name) => format!("{} [{}]", name, self.id),
            None => format!("[{}]", self.id),
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("symbolic_name", &self.symbolic_name())
            .field("version", &self.descriptor.version.to_string())
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
