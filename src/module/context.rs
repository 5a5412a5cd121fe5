//! 模块上下文
//!
//! 入口点与注册表、分发器交互的能力对象。每次启动创建一个新的上下文，
//! 模块停止时失效，之后的任何调用都返回 [`CoreError::IllegalState`]。
//!
//! 注册服务、获取服务和添加监听器在整个调用期间持有有效性读锁，`invalidate` 取写锁，
//! 因此失效之后不会再有新的注册、使用记录或监听器进入注册表和分发器。

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::trace;

use super::module::Module;
use crate::event::{
    EventDispatcher, FrameworkListener, ListenerId, ModuleListener, ServiceListener,
};
use crate::framework::FrameworkInner;
use crate::service::{
    Filter, Properties, ServiceObject, ServiceReference, ServiceRegistration, ServiceRegistry,
    ServiceSource,
};
use crate::utils::{CoreError, Result};

/// 上下文 ID 生成器
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// 模块上下文
pub struct ModuleContext {
    id: u64,
    module: Weak<Module>,
    framework: Weak<FrameworkInner>,
    registry: Arc<ServiceRegistry>,
    dispatcher: Arc<EventDispatcher>,
    properties: BTreeMap<String, String>,
    valid: RwLock<bool>,
}

impl ModuleContext {
    pub(crate) fn new(module: &Arc<Module>, fw: &Arc<FrameworkInner>) -> Arc<Self> {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        trace!(context_id = id, module_id = module.id(), "创建模块上下文");
        Arc::new(Self {
            id,
            module: Arc::downgrade(module),
            framework: Arc::downgrade(fw),
            registry: fw.registry.clone(),
            dispatcher: fw.dispatcher.clone(),
            properties: fw.config.properties.clone(),
            valid: RwLock::new(true),
        })
    }

    /// 上下文 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 上下文是否仍然有效
    pub fn is_valid(&self) -> bool {
        *self.valid.read_recursive()
    }

    /// 使上下文失效，等待进行中的注册类调用结束
    pub(crate) fn invalidate(&self) {
        *self.valid.write() = false;
    }

    /// 所属模块
    pub fn module(&self) -> Result<Arc<Module>> {
        let _valid = self.ensure_valid()?;
        self.owner()
    }

    /// 读取框架属性
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }

    // ====== 服务 ======

    /// 注册服务
    ///
    /// # Arguments
    ///
    /// * `interfaces` - 发布的接口名
    /// * `source` - 服务对象或工厂
    /// * `properties` - 服务属性
    ///
    /// # Errors
    ///
    /// - 上下文已失效：[`CoreError::IllegalState`]
    /// - 接口列表为空：[`CoreError::InvalidArgument`]
    pub fn register_service(
        &self,
        interfaces: &[&str],
        source: ServiceSource,
        properties: Properties,
    ) -> Result<ServiceRegistration> {
        let _valid = self.ensure_valid()?;
        let owner = self.owner()?;
        self.registry
            .register(&owner, interfaces, source, properties)
    }

    /// 注册普通对象服务
    pub fn register_object<T: Any + Send + Sync>(
        &self,
        interfaces: &[&str],
        service: T,
        properties: Properties,
    ) -> Result<ServiceRegistration> {
        self.register_service(interfaces, ServiceSource::object(service), properties)
    }

    /// 按接口和过滤器文本查找服务引用
    ///
    /// # Errors
    ///
    /// 过滤器格式错误时返回 [`CoreError::InvalidSyntax`]
    pub fn get_service_references(
        &self,
        interface: Option<&str>,
        filter: Option<&str>,
    ) -> Result<Vec<ServiceReference>> {
        let _valid = self.ensure_valid()?;
        let filter = filter.map(Filter::parse).transpose()?;
        Ok(self.registry.get_references(interface, filter.as_ref()))
    }

    /// 查找接口的最佳服务引用
    pub fn get_service_reference(&self, interface: &str) -> Result<Option<ServiceReference>> {
        let _valid = self.ensure_valid()?;
        Ok(self.registry.get_best_reference(Some(interface), None))
    }

    /// 获取服务对象
    pub fn get_service(&self, reference: &ServiceReference) -> Result<Option<ServiceObject>> {
        let _valid = self.ensure_valid()?;
        let owner = self.owner()?;
        self.registry.get_service(reference, &owner)
    }

    /// 获取服务对象并转换为具体类型
    ///
    /// 类型不匹配时释放使用计数并返回 None
    pub fn get_service_as<T: Any + Send + Sync>(
        &self,
        reference: &ServiceReference,
    ) -> Result<Option<Arc<T>>> {
        let Some(service) = self.get_service(reference)? else {
            return Ok(None);
        };
        match service.downcast::<T>() {
            Ok(typed) => Ok(Some(typed)),
            Err(_) => {
                self.unget_service(reference)?;
                Ok(None)
            }
        }
    }

    /// 释放服务对象
    ///
    /// # Returns
    ///
    /// 调用前使用计数是否大于 0
    pub fn unget_service(&self, reference: &ServiceReference) -> Result<bool> {
        let _valid = self.ensure_valid()?;
        let owner = self.owner()?;
        Ok(self.registry.unget_service(reference, &owner))
    }

    /// 解析过滤器
    pub fn create_filter(&self, text: &str) -> Result<Filter> {
        let _valid = self.ensure_valid()?;
        Filter::parse(text)
    }

    // ====== 监听器 ======

    /// 添加服务监听器
    ///
    /// # Errors
    ///
    /// 过滤器格式错误时返回 [`CoreError::InvalidSyntax`]
    pub fn add_service_listener(
        &self,
        listener: ServiceListener,
        filter: Option<&str>,
    ) -> Result<ListenerId> {
        let _valid = self.ensure_valid()?;
        let filter = filter.map(Filter::parse).transpose()?;
        Ok(self
            .dispatcher
            .add_service_listener(self.id, listener, filter))
    }

    /// 移除服务监听器
    pub fn remove_service_listener(&self, listener_id: ListenerId) -> Result<bool> {
        self.remove_listener(listener_id)
    }

    /// 添加模块监听器
    pub fn add_module_listener(&self, listener: ModuleListener) -> Result<ListenerId> {
        let _valid = self.ensure_valid()?;
        Ok(self.dispatcher.add_module_listener(self.id, listener))
    }

    /// 添加同步模块监听器
    pub fn add_sync_module_listener(&self, listener: ModuleListener) -> Result<ListenerId> {
        let _valid = self.ensure_valid()?;
        Ok(self.dispatcher.add_sync_module_listener(self.id, listener))
    }

    /// 添加框架监听器
    pub fn add_framework_listener(&self, listener: FrameworkListener) -> Result<ListenerId> {
        let _valid = self.ensure_valid()?;
        Ok(self.dispatcher.add_framework_listener(self.id, listener))
    }

    /// 移除本上下文的任意监听器
    pub fn remove_listener(&self, listener_id: ListenerId) -> Result<bool> {
        let _valid = self.ensure_valid()?;
        Ok(self.dispatcher.remove_listener(self.id, listener_id))
    }

    // ====== 模块查询 ======

    /// 按 ID 获取模块
    pub fn get_module(&self, id: u64) -> Result<Option<Arc<Module>>> {
        let _valid = self.ensure_valid()?;
        Ok(self.framework()?.modules.get(id))
    }

    /// 按符号名获取模块
    pub fn get_module_by_name(&self, name: &str) -> Result<Option<Arc<Module>>> {
        let _valid = self.ensure_valid()?;
        Ok(self.framework()?.modules.get_by_name(name))
    }

    /// 全部模块
    pub fn get_modules(&self) -> Result<Vec<Arc<Module>>> {
        let _valid = self.ensure_valid()?;
        Ok(self.framework()?.modules.all())
    }

    /// 运行时安装模块（不支持）
    pub fn install_module(&self, location: &str) -> Result<Arc<Module>> {
        Err(CoreError::UnsupportedOperation(format!(
            "不支持运行时安装模块: {}",
            location
        )))
    }

    // ====== 内部实现 ======

    /// 返回的读锁在调用结束前阻止上下文失效
    ///
    /// 使用递归读锁：回调在持锁期间可能再次进入同一上下文。
    fn ensure_valid(&self) -> Result<RwLockReadGuard<'_, bool>> {
        let valid = self.valid.read_recursive();
        if *valid {
            Ok(valid)
        } else {
            Err(CoreError::illegal_state(format!(
                "模块上下文已失效: context_id {}",
                self.id
            )))
        }
    }

    fn owner(&self) -> Result<Arc<Module>> {
        self.module
            .upgrade()
            .ok_or_else(|| CoreError::illegal_state("模块已销毁"))
    }

    fn framework(&self) -> Result<Arc<FrameworkInner>> {
        self.framework
            .upgrade()
            .ok_or_else(|| CoreError::illegal_state("运行时已关闭"))
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("id", &self.id)
            .field("module_id", &self.module.upgrade().map(|m| m.id()))
            .field("valid", &self.is_valid())
            .finish()
    }
}
