//! 服务注册记录、服务引用与服务工厂

use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::properties::{Properties, PropertyValue};
use super::registry::ServiceRegistry;
use crate::module::Module;
use crate::utils::{CoreError, Result};

/// 服务对象
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// 服务工厂
///
/// 每个（注册，使用者模块）组合只调用一次 `get_service`，结果被缓存到该模块
/// 释放全部使用计数为止。
pub trait ServiceFactory: Send + Sync {
    /// 为使用者模块创建服务对象
    fn get_service(
        &self,
        module: &Arc<Module>,
        registration: &ServiceRegistration,
    ) -> anyhow::Result<ServiceObject>;

    /// 使用者释放服务对象
    fn unget_service(
        &self,
        _module: &Arc<Module>,
        _registration: &ServiceRegistration,
        _service: ServiceObject,
    ) {
    }
}

/// 服务来源：直接对象或工厂
#[derive(Clone)]
pub enum ServiceSource {
    /// 所有使用者共享的对象
    Object(ServiceObject),
    /// 按使用者创建对象的工厂
    Factory(Arc<dyn ServiceFactory>),
}

impl ServiceSource {
    /// 包装任意对象
    pub fn object<T: Any + Send + Sync>(service: T) -> Self {
        ServiceSource::Object(Arc::new(service))
    }

    /// 包装工厂
    pub fn factory(factory: impl ServiceFactory + 'static) -> Self {
        ServiceSource::Factory(Arc::new(factory))
    }
}

impl fmt::Debug for ServiceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceSource::Object(_) => write!(f, "ServiceSource::Object"),
            ServiceSource::Factory(_) => write!(f, "ServiceSource::Factory"),
        }
    }
}

pub(crate) const STATE_REGISTERED: u8 = 0;
pub(crate) const STATE_UNREGISTERING: u8 = 1;
pub(crate) const STATE_UNREGISTERED: u8 = 2;

/// 单个使用者的使用记录
pub(crate) struct Usage {
    pub(crate) module: Weak<Module>,
    pub(crate) count: usize,
    pub(crate) service: Option<ServiceObject>,
}

/// 注册表内部记录
pub(crate) struct RegistrationRecord {
    pub(crate) id: u64,
    pub(crate) interfaces: Vec<String>,
    pub(crate) owner_id: u64,
    pub(crate) owner: Weak<Module>,
    pub(crate) properties: RwLock<Properties>,
    pub(crate) ranking: AtomicI64,
    pub(crate) source: ServiceSource,
    pub(crate) state: AtomicU8,
    pub(crate) usages: Mutex<HashMap<u64, Usage>>,
    pub(crate) registry: Weak<ServiceRegistry>,
}

impl RegistrationRecord {
    pub(crate) fn is_registered(&self) -> bool {
        self.state.load(Ordering::Acquire) != STATE_UNREGISTERED
    }
}

// ============================================================================
// 服务引用
// ============================================================================

/// 服务引用
///
/// 轻量句柄，用于查找、排序和使用计数，不直接暴露服务对象。
///
/// 排序：`service.ranking` 高者为大；权重相同时注册序号小（更早）者为大。
/// 因此"最佳"引用是排序中的最大值。
#[derive(Clone)]
pub struct ServiceReference {
    pub(crate) record: Arc<RegistrationRecord>,
}

impl ServiceReference {
    /// 注册序号（`service.id`）
    pub fn id(&self) -> u64 {
        self.record.id
    }

    /// 排序权重
    pub fn ranking(&self) -> i64 {
        self.record.ranking.load(Ordering::Acquire)
    }

    /// 发布的接口名
    pub fn interfaces(&self) -> &[String] {
        &self.record.interfaces
    }

    /// 读取属性
    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.record.properties.read().get(key).cloned()
    }

    /// 所有属性键
    pub fn property_keys(&self) -> Vec<String> {
        self.record.properties.read().keys()
    }

    /// 属性快照
    pub fn properties(&self) -> Properties {
        self.record.properties.read().clone()
    }

    /// 注册该服务的模块，服务注销后返回 None
    pub fn module(&self) -> Option<Arc<Module>> {
        if !self.record.is_registered() {
            return None;
        }
        self.record.owner.upgrade()
    }

    /// 正在使用该服务的模块
    pub fn using_modules(&self) -> Vec<Arc<Module>> {
        self.record
            .usages
            .lock()
            .values()
            .filter(|u| u.count > 0)
            .filter_map(|u| u.module.upgrade())
            .collect()
    }

    /// 服务是否仍处于注册状态
    pub fn is_registered(&self) -> bool {
        self.record.is_registered()
    }

    /// 所有模块共享同一执行环境，接口总是可赋值
    pub fn is_assignable_to(&self, _module: &Module, _interface: &str) -> bool {
        true
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.record.id == other.record.id
    }
}

impl Eq for ServiceReference {}

impl PartialOrd for ServiceReference {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceReference {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.ranking()
            .cmp(&other.ranking())
            .then_with(|| other.id().cmp(&self.id()))
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.id())
            .field("ranking", &self.ranking())
            .field("interfaces", &self.record.interfaces)
            .field("owner", &self.record.owner_id)
            .finish()
    }
}

// ============================================================================
// 服务注册句柄
// ============================================================================

/// 服务注册句柄，由注册方持有
#[derive(Clone)]
pub struct ServiceRegistration {
    pub(crate) record: Arc<RegistrationRecord>,
}

impl ServiceRegistration {
    /// 注册序号
    pub fn id(&self) -> u64 {
        self.record.id
    }

    /// 获取服务引用
    pub fn reference(&self) -> ServiceReference {
        ServiceReference {
            record: self.record.clone(),
        }
    }

    /// 整体替换服务属性并触发 MODIFIED 事件
    ///
    /// `objectClass` 和 `service.id` 保持不变。
    pub fn set_properties(&self, properties: Properties) -> Result<()> {
        self.registry()?.set_properties(&self.record, properties)
    }

    /// 注销服务
    ///
    /// # Errors
    ///
    /// 重复注销返回 [`CoreError::IllegalState`]
    pub fn unregister(&self) -> Result<()> {
        self.registry()?.unregister(&self.record)
    }

    fn registry(&self) -> Result<Arc<ServiceRegistry>> {
        self.record
            .registry
            .upgrade()
            .ok_or_else(|| CoreError::illegal_state("服务注册表已销毁"))
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("id", &self.id())
            .field("interfaces", &self.record.interfaces)
            .finish()
    }
}
