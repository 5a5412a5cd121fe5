//! 服务注册表
//!
//! 持有所有已发布的服务，提供注册/注销、按接口和过滤器的排序查找，
//! 以及按使用者模块的使用计数。
//!
//! # 并发模型
//!
//! 整张注册表由一把读写锁保护，查找与变更互斥，读者不会看到半注册或半注销的记录。
//! 锁顺序固定为：注册表锁 → 记录属性锁。服务事件在释放注册表锁后、调用返回前同步触发。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, instrument, trace, warn};

use super::filter::Filter;
use super::properties::{Properties, PropertyValue, OBJECT_CLASS, SERVICE_ID, SERVICE_RANKING};
use super::reference::{
    RegistrationRecord, ServiceObject, ServiceReference, ServiceRegistration, ServiceSource, Usage,
    STATE_REGISTERED, STATE_UNREGISTERED, STATE_UNREGISTERING,
};
use crate::event::{EventDispatcher, ServiceEvent, ServiceEventKind};
use crate::module::Module;
use crate::utils::{CoreError, Result};

#[derive(Default)]
struct RegistryTable {
    services: BTreeMap<u64, Arc<RegistrationRecord>>,
    by_interface: HashMap<String, BTreeSet<u64>>,
    by_module: HashMap<u64, BTreeSet<u64>>,
}

impl RegistryTable {
    fn insert(&mut self, record: Arc<RegistrationRecord>) {
        for name in &record.interfaces {
            self.by_interface
                .entry(name.clone())
                .or_default()
                .insert(record.id);
        }
        self.by_module
            .entry(record.owner_id)
            .or_default()
            .insert(record.id);
        self.services.insert(record.id, record);
    }

    fn remove(&mut self, record: &RegistrationRecord) {
        self.services.remove(&record.id);
        for name in &record.interfaces {
            if let Some(ids) = self.by_interface.get_mut(name) {
                ids.remove(&record.id);
                if ids.is_empty() {
                    self.by_interface.remove(name);
                }
            }
        }
        if let Some(ids) = self.by_module.get_mut(&record.owner_id) {
            ids.remove(&record.id);
            if ids.is_empty() {
                self.by_module.remove(&record.owner_id);
            }
        }
    }
}

/// 服务注册表
pub struct ServiceRegistry {
    /// 注册表
    table: RwLock<RegistryTable>,

    /// 注册序号生成器
    next_service_id: AtomicU64,

    /// 事件分发器
    dispatcher: Arc<EventDispatcher>,

    /// 自引用，供注册句柄回调
    self_ref: Weak<ServiceRegistry>,
}

impl ServiceRegistry {
    /// 创建注册表
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            table: RwLock::new(RegistryTable::default()),
            next_service_id: AtomicU64::new(1),
            dispatcher,
            self_ref: self_ref.clone(),
        })
    }

    // ====== 注册与注销 ======

    /// 注册服务
    ///
    /// # Arguments
    ///
    /// * `owner` - 注册方模块
    /// * `interfaces` - 发布的接口名，不能为空
    /// * `source` - 服务对象或工厂
    /// * `properties` - 服务属性，`objectClass`、`service.id` 由注册表写入
    ///
    /// # Returns
    ///
    /// 注册句柄。返回前已同步投递 REGISTERED 事件。
    ///
    /// # Errors
    ///
    /// 接口列表为空或包含空名时返回 [`CoreError::InvalidArgument`]
    #[instrument(level = "debug", skip_all, fields(module_id = owner.id()))]
    pub fn register(
        &self,
        owner: &Arc<Module>,
        interfaces: &[&str],
        source: ServiceSource,
        properties: Properties,
    ) -> Result<ServiceRegistration> {
        let interfaces: Vec<String> = interfaces.iter().map(|s| s.trim().to_string()).collect();
        if interfaces.is_empty() || interfaces.iter().any(String::is_empty) {
            return Err(CoreError::InvalidArgument(
                "服务至少需要一个非空接口名".to_string(),
            ));
        }

        let id = self.next_service_id.fetch_add(1, Ordering::SeqCst);
        let properties = Self::normalize(properties, &interfaces, id);
        let record = Arc::new(RegistrationRecord {
            id,
            interfaces,
            owner_id: owner.id(),
            owner: Arc::downgrade(owner),
            ranking: AtomicI64::new(properties.ranking()),
            properties: RwLock::new(properties),
            source,
            state: AtomicU8::new(STATE_REGISTERED),
            usages: Mutex::new(HashMap::new()),
            registry: self.self_ref.clone(),
        });

        self.table.write().insert(record.clone());
        debug!(service_id = id, interfaces = ?record.interfaces, "服务已注册");

        let registration = ServiceRegistration { record };
        self.dispatcher.fire_service_event(ServiceEvent::new(
            ServiceEventKind::Registered,
            registration.reference(),
        ));
        Ok(registration)
    }

    /// 注销服务
    ///
    /// 先在服务仍可见时投递 UNREGISTERING，再从表中移除，最后释放所有使用者持有的对象。
    pub(crate) fn unregister(&self, record: &Arc<RegistrationRecord>) -> Result<()> {
        if record
            .state
            .compare_exchange(
                STATE_REGISTERED,
                STATE_UNREGISTERING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(CoreError::illegal_state(format!(
                "服务已注销: service_id {}",
                record.id
            )));
        }

        self.dispatcher.fire_service_event(ServiceEvent::new(
            ServiceEventKind::Unregistering,
            ServiceReference {
                record: record.clone(),
            },
        ));

        self.table.write().remove(record);
        record.state.store(STATE_UNREGISTERED, Ordering::Release);
        self.release_all_usages(record);

        debug!(service_id = record.id, "服务已注销");
        Ok(())
    }

    /// 注销某个模块注册的全部服务
    ///
    /// # Returns
    ///
    /// 实际注销的数量
    pub fn unregister_all(&self, owner_id: u64) -> usize {
        let records: Vec<Arc<RegistrationRecord>> = {
            let table = self.table.read();
            table
                .by_module
                .get(&owner_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| table.services.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut count = 0;
        for record in records {
            match self.unregister(&record) {
                Ok(()) => count += 1,
                // 并发注销，已由另一方完成
                Err(e) => trace!(service_id = record.id, error = %e, "跳过服务"),
            }
        }
        if count > 0 {
            debug!(module_id = owner_id, count, "已注销模块的全部服务");
        }
        count
    }

    /// 整体替换服务属性
    pub(crate) fn set_properties(
        &self,
        record: &Arc<RegistrationRecord>,
        properties: Properties,
    ) -> Result<()> {
        if record.state.load(Ordering::Acquire) != STATE_REGISTERED {
            return Err(CoreError::illegal_state(format!(
                "服务已注销: service_id {}",
                record.id
            )));
        }

        let properties = Self::normalize(properties, &record.interfaces, record.id);
        let previous = {
            let _table = self.table.write();
            let ranking = properties.ranking();
            let previous = std::mem::replace(&mut *record.properties.write(), properties);
            record.ranking.store(ranking, Ordering::Release);
            previous
        };

        debug!(service_id = record.id, "服务属性已修改");
        self.dispatcher.fire_service_event(ServiceEvent::modified(
            ServiceReference {
                record: record.clone(),
            },
            previous,
        ));
        Ok(())
    }

    // ====== 查找 ======

    /// 按接口和过滤器查找服务引用
    ///
    /// # Arguments
    ///
    /// * `interface` - 接口名，None 表示所有服务
    /// * `filter` - 过滤器，None 表示不过滤
    ///
    /// # Returns
    ///
    /// 按排序权重降序、注册序号升序排列的引用
    pub fn get_references(
        &self,
        interface: Option<&str>,
        filter: Option<&Filter>,
    ) -> Vec<ServiceReference> {
        let accept = |record: &Arc<RegistrationRecord>| {
            filter.map_or(true, |f| f.matches(&record.properties.read()))
        };
        let mut refs: Vec<ServiceReference> = {
            let table = self.table.read();
            match interface {
                Some(name) => table
                    .by_interface
                    .get(name)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| table.services.get(id))
                    .filter(|r| accept(r))
                    .map(|r| ServiceReference { record: r.clone() })
                    .collect(),
                None => table
                    .services
                    .values()
                    .filter(|r| accept(r))
                    .map(|r| ServiceReference { record: r.clone() })
                    .collect(),
            }
        };
        refs.sort_by(|a, b| b.cmp(a));
        refs
    }

    /// 查找最佳服务引用（排序中的第一个）
    pub fn get_best_reference(
        &self,
        interface: Option<&str>,
        filter: Option<&Filter>,
    ) -> Option<ServiceReference> {
        self.get_references(interface, filter).into_iter().next()
    }

    /// 某个模块注册的服务
    pub fn registered_by(&self, module_id: u64) -> Vec<ServiceReference> {
        let table = self.table.read();
        table
            .by_module
            .get(&module_id)
            .into_iter()
            .flatten()
            .filter_map(|id| table.services.get(id))
            .map(|r| ServiceReference { record: r.clone() })
            .collect()
    }

    /// 某个模块正在使用的服务
    pub fn in_use_by(&self, module_id: u64) -> Vec<ServiceReference> {
        let table = self.table.read();
        table
            .services
            .values()
            .filter(|r| {
                r.usages
                    .lock()
                    .get(&module_id)
                    .is_some_and(|u| u.count > 0)
            })
            .map(|r| ServiceReference { record: r.clone() })
            .collect()
    }

    /// 已注册服务数量
    pub fn service_count(&self) -> usize {
        self.table.read().services.len()
    }

    // ====== 使用计数 ======

    /// 获取服务对象并增加使用计数
    ///
    /// 工厂服务对每个（注册，使用者）组合只调用一次工厂，结果缓存到使用计数归零。
    ///
    /// # Returns
    ///
    /// 服务已注销时返回 `Ok(None)`
    pub fn get_service(
        &self,
        reference: &ServiceReference,
        consumer: &Arc<Module>,
    ) -> Result<Option<ServiceObject>> {
        let record = &reference.record;
        if !record.is_registered() {
            return Ok(None);
        }
        let consumer_id = consumer.id();

        let factory = {
            let mut usages = record.usages.lock();
            // 注销在清空使用记录前先写入状态，持锁复查后新记录不会漏掉
            if !record.is_registered() {
                return Ok(None);
            }
            let usage = usages.entry(consumer_id).or_insert_with(|| Usage {
                module: Arc::downgrade(consumer),
                count: 0,
                service: None,
            });
            usage.count += 1;
            match &record.source {
                ServiceSource::Object(service) => return Ok(Some(service.clone())),
                ServiceSource::Factory(factory) => {
                    if let Some(service) = &usage.service {
                        return Ok(Some(service.clone()));
                    }
                    factory.clone()
                }
            }
        };

        // 在锁外调用工厂
        let registration = ServiceRegistration {
            record: record.clone(),
        };
        match factory.get_service(consumer, &registration) {
            Ok(service) => {
                let mut usages = record.usages.lock();
                let registered = record.is_registered();
                match usages.get_mut(&consumer_id) {
                    Some(usage) if registered && usage.count > 0 => {
                        if let Some(existing) = usage.service.clone() {
                            drop(usages);
                            factory.unget_service(consumer, &registration, service);
                            return Ok(Some(existing));
                        }
                        usage.service = Some(service.clone());
                        Ok(Some(service))
                    }
                    _ => {
                        // 期间已被释放或服务已注销
                        drop(usages);
                        factory.unget_service(consumer, &registration, service);
                        Ok(None)
                    }
                }
            }
            Err(e) => {
                {
                    let mut usages = record.usages.lock();
                    if let Some(usage) = usages.get_mut(&consumer_id) {
                        usage.count = usage.count.saturating_sub(1);
                        if usage.count == 0 {
                            usages.remove(&consumer_id);
                        }
                    }
                }
                warn!(service_id = record.id, module_id = consumer_id, error = %e, "服务工厂创建服务失败");
                Err(CoreError::Other(
                    e.context(format!("服务工厂创建服务失败: service_id {}", record.id)),
                ))
            }
        }
    }

    /// 释放服务对象，减少使用计数
    ///
    /// # Returns
    ///
    /// 调用前使用计数是否大于 0
    pub fn unget_service(&self, reference: &ServiceReference, consumer: &Arc<Module>) -> bool {
        let record = &reference.record;
        let consumer_id = consumer.id();
        let released = {
            let mut usages = record.usages.lock();
            let Some(usage) = usages.get_mut(&consumer_id) else {
                return false;
            };
            if usage.count == 0 {
                return false;
            }
            usage.count -= 1;
            if usage.count == 0 {
                usages.remove(&consumer_id).and_then(|u| u.service)
            } else {
                None
            }
        };

        if let (Some(service), ServiceSource::Factory(factory)) = (released, &record.source) {
            let registration = ServiceRegistration {
                record: record.clone(),
            };
            factory.unget_service(consumer, &registration, service);
        }
        true
    }

    /// 释放某个模块持有的全部服务（模块停止时调用）
    ///
    /// # Returns
    ///
    /// 释放的服务数量
    pub fn release_usages(&self, consumer: &Arc<Module>) -> usize {
        let consumer_id = consumer.id();
        let records: Vec<Arc<RegistrationRecord>> =
            self.table.read().services.values().cloned().collect();

        let mut released = 0;
        for record in records {
            let usage = record.usages.lock().remove(&consumer_id);
            let Some(usage) = usage else { continue };
            released += 1;
            if let (Some(service), ServiceSource::Factory(factory)) = (usage.service, &record.source)
            {
                let registration = ServiceRegistration {
                    record: record.clone(),
                };
                factory.unget_service(consumer, &registration, service);
            }
        }
        if released > 0 {
            debug!(module_id = consumer_id, released, "已释放模块使用的服务");
        }
        released
    }

    // ====== 内部实现 ======

    fn normalize(mut properties: Properties, interfaces: &[String], id: u64) -> Properties {
        properties.insert(OBJECT_CLASS, PropertyValue::from(interfaces.to_vec()));
        properties.insert(SERVICE_ID, PropertyValue::Long(id as i64));
        if !properties.contains_key(SERVICE_RANKING) {
            properties.insert(SERVICE_RANKING, PropertyValue::Long(0));
        }
        properties
    }

    fn release_all_usages(&self, record: &Arc<RegistrationRecord>) {
        let usages = std::mem::take(&mut *record.usages.lock());
        let ServiceSource::Factory(factory) = &record.source else {
            return;
        };
        let registration = ServiceRegistration {
            record: record.clone(),
        };
        for usage in usages.into_values() {
            if let (Some(service), Some(module)) = (usage.service, usage.module.upgrade()) {
                factory.unget_service(&module, &registration, service);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DispatcherConfig;
    use std::sync::atomic::AtomicUsize;

    fn setup() -> (Arc<EventDispatcher>, Arc<ServiceRegistry>) {
        let dispatcher = Arc::new(EventDispatcher::with_config(DispatcherConfig {
            synchronous_delivery: true,
            ..Default::default()
        }));
        dispatcher.enable_delivery();
        let registry = ServiceRegistry::new(dispatcher.clone());
        (dispatcher, registry)
    }

    fn ranked(ranking: i64) -> Properties {
        Properties::new().with(SERVICE_RANKING, ranking)
    }

    #[test]
    fn test_register_requires_interface() {
        let (_, registry) = setup();
        let owner = Module::detached(1);
        let result = registry.register(&owner, &[], ServiceSource::object(1u32), Properties::new());
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
        let result = registry.register(&owner, &[" "], ServiceSource::object(1u32), Properties::new());
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
        assert_eq!(registry.service_count(), 0);
    }

    #[test]
    fn test_registration_properties() {
        let (_, registry) = setup();
        let owner = Module::detached(1);
        let reg = registry
            .register(&owner, &["X", "Y"], ServiceSource::object(()), Properties::new())
            .unwrap();
        let reference = reg.reference();

        assert_eq!(reference.property(SERVICE_ID), Some(PropertyValue::Long(reg.id() as i64)));
        assert_eq!(reference.ranking(), 0);
        assert_eq!(
            reference.property(OBJECT_CLASS).unwrap().to_string_list(),
            vec!["X", "Y"]
        );
        assert_eq!(reference.module().unwrap().id(), 1);
        assert_eq!(registry.get_references(Some("Y"), None).len(), 1);
    }

    #[test]
    fn test_ranking_order() {
        let (_, registry) = setup();
        let owner = Module::detached(1);
        let a = registry.register(&owner, &["X"], ServiceSource::object(()), ranked(5)).unwrap();
        let b = registry.register(&owner, &["X"], ServiceSource::object(()), ranked(10)).unwrap();
        let c = registry.register(&owner, &["X"], ServiceSource::object(()), ranked(5)).unwrap();
        let d = registry.register(&owner, &["X"], ServiceSource::object(()), Properties::new()).unwrap();

        let ids: Vec<u64> = registry
            .get_references(Some("X"), None)
            .iter()
            .map(|r| r.id())
            .collect();
        assert_eq!(ids, vec![b.id(), a.id(), c.id(), d.id()]);
        assert_eq!(registry.get_best_reference(Some("X"), None).unwrap().id(), b.id());
    }

    #[test]
    fn test_filtered_lookup() {
        let (_, registry) = setup();
        let owner = Module::detached(1);
        registry
            .register(&owner, &["X"], ServiceSource::object(()), Properties::new().with("color", "red"))
            .unwrap();
        let blue = registry
            .register(&owner, &["X"], ServiceSource::object(()), Properties::new().with("color", "blue"))
            .unwrap();

        let filter = Filter::parse("(color=blue)").unwrap();
        let refs = registry.get_references(Some("X"), Some(&filter));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id(), blue.id());
        assert_eq!(registry.get_references(None, None).len(), 2);
        assert!(registry.get_references(Some("Z"), None).is_empty());
    }

    #[test]
    fn test_events_are_synchronous() {
        let (dispatcher, registry) = setup();
        let owner = Module::detached(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let weak = Arc::downgrade(&registry);
        dispatcher.add_service_listener(
            99,
            Arc::new(move |event: ServiceEvent| {
                // 事件投递时服务仍可见
                let visible = weak
                    .upgrade()
                    .map(|r| !r.get_references(Some("X"), None).is_empty())
                    .unwrap_or(false);
                s.lock().push((event.kind, visible));
            }),
            None,
        );

        let reg = registry.register(&owner, &["X"], ServiceSource::object(()), Properties::new()).unwrap();
        assert_eq!(*seen.lock(), vec![(ServiceEventKind::Registered, true)]);

        reg.unregister().unwrap();
        assert_eq!(
            *seen.lock(),
            vec![
                (ServiceEventKind::Registered, true),
                (ServiceEventKind::Unregistering, true)
            ]
        );
        assert!(registry.get_references(Some("X"), None).is_empty());
        assert!(reg.reference().module().is_none());
    }

    #[test]
    fn test_double_unregister() {
        let (_, registry) = setup();
        let owner = Module::detached(1);
        let reg = registry.register(&owner, &["X"], ServiceSource::object(()), Properties::new()).unwrap();
        reg.unregister().unwrap();
        assert!(matches!(reg.unregister(), Err(CoreError::IllegalState(_))));
        assert_eq!(registry.service_count(), 0);
    }

    #[test]
    fn test_unregister_all() {
        let (_, registry) = setup();
        let a = Module::detached(1);
        let b = Module::detached(2);
        registry.register(&a, &["X"], ServiceSource::object(()), Properties::new()).unwrap();
        registry.register(&a, &["Y"], ServiceSource::object(()), Properties::new()).unwrap();
        registry.register(&b, &["X"], ServiceSource::object(()), Properties::new()).unwrap();

        assert_eq!(registry.registered_by(1).len(), 2);
        assert_eq!(registry.unregister_all(1), 2);
        assert_eq!(registry.unregister_all(1), 0);
        assert_eq!(registry.service_count(), 1);
    }

    #[test]
    fn test_use_counting() {
        let (_, registry) = setup();
        let owner = Module::detached(1);
        let consumer = Module::detached(2);
        let reg = registry.register(&owner, &["X"], ServiceSource::object(42u32), Properties::new()).unwrap();
        let reference = reg.reference();

        let service = registry.get_service(&reference, &consumer).unwrap().unwrap();
        assert_eq!(service.downcast_ref::<u32>(), Some(&42));
        registry.get_service(&reference, &consumer).unwrap();
        assert_eq!(reference.using_modules().len(), 1);
        assert_eq!(registry.in_use_by(2).len(), 1);

        assert!(registry.unget_service(&reference, &consumer));
        assert!(registry.unget_service(&reference, &consumer));
        assert!(!registry.unget_service(&reference, &consumer));
        assert!(reference.using_modules().is_empty());
    }

    struct CountingFactory {
        created: AtomicUsize,
        released: AtomicUsize,
    }

    impl crate::service::ServiceFactory for Arc<CountingFactory> {
        fn get_service(
            &self,
            module: &Arc<Module>,
            _registration: &ServiceRegistration,
        ) -> anyhow::Result<ServiceObject> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(format!("for-{}", module.id())))
        }

        fn unget_service(
            &self,
            _module: &Arc<Module>,
            _registration: &ServiceRegistration,
            _service: ServiceObject,
        ) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_factory_cached_per_consumer() {
        let (_, registry) = setup();
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        });
        let owner = Module::detached(1);
        let c1 = Module::detached(2);
        let c2 = Module::detached(3);
        let reg = registry
            .register(&owner, &["X"], ServiceSource::factory(factory.clone()), Properties::new())
            .unwrap();
        let reference = reg.reference();

        let s1 = registry.get_service(&reference, &c1).unwrap().unwrap();
        let s1_again = registry.get_service(&reference, &c1).unwrap().unwrap();
        assert!(Arc::ptr_eq(&s1, &s1_again));
        let s2 = registry.get_service(&reference, &c2).unwrap().unwrap();
        assert_eq!(s2.downcast_ref::<String>().map(String::as_str), Some("for-3"));
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);

        registry.unget_service(&reference, &c1);
        assert_eq!(factory.released.load(Ordering::SeqCst), 0);
        registry.unget_service(&reference, &c1);
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);

        // 注销时释放剩余使用者
        reg.unregister().unwrap();
        assert_eq!(factory.released.load(Ordering::SeqCst), 2);
        assert!(registry.get_service(&reference, &c1).unwrap().is_none());
    }

    /// 工厂运行期间服务被注销
    struct UnregisteringFactory {
        released: AtomicUsize,
    }

    impl crate::service::ServiceFactory for Arc<UnregisteringFactory> {
        fn get_service(
            &self,
            _module: &Arc<Module>,
            registration: &ServiceRegistration,
        ) -> anyhow::Result<ServiceObject> {
            registration.unregister()?;
            Ok(Arc::new(()))
        }

        fn unget_service(
            &self,
            _module: &Arc<Module>,
            _registration: &ServiceRegistration,
            _service: ServiceObject,
        ) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_factory_result_released_when_unregistered_meanwhile() {
        let (_, registry) = setup();
        let factory = Arc::new(UnregisteringFactory {
            released: AtomicUsize::new(0),
        });
        let owner = Module::detached(1);
        let consumer = Module::detached(2);
        let reg = registry
            .register(&owner, &["X"], ServiceSource::factory(factory.clone()), Properties::new())
            .unwrap();
        let reference = reg.reference();

        assert!(registry.get_service(&reference, &consumer).unwrap().is_none());
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);
        assert!(reference.using_modules().is_empty());
        assert!(registry.in_use_by(2).is_empty());
    }

    #[test]
    fn test_concurrent_get_service_and_unregister_release_everything() {
        let (_, registry) = setup();
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        });
        let owner = Module::detached(1);
        let consumer = Module::detached(2);

        for _ in 0..300 {
            let reg = registry
                .register(&owner, &["X"], ServiceSource::factory(factory.clone()), Properties::new())
                .unwrap();
            let reference = reg.reference();
            std::thread::scope(|s| {
                s.spawn(|| {
                    while registry.get_service(&reference, &consumer).unwrap().is_some() {}
                });
                std::thread::yield_now();
                reg.unregister().unwrap();
            });
            assert!(reference.using_modules().is_empty());
        }

        assert_eq!(
            factory.created.load(Ordering::SeqCst),
            factory.released.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn test_set_properties_fires_modified_and_endmatch() {
        let (dispatcher, registry) = setup();
        let owner = Module::detached(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        dispatcher.add_service_listener(
            5,
            Arc::new(move |event: ServiceEvent| s.lock().push(event.kind)),
            Some(Filter::parse("(color=red)").unwrap()),
        );

        let reg = registry
            .register(&owner, &["X"], ServiceSource::object(()), Properties::new().with("color", "red"))
            .unwrap();
        reg.set_properties(Properties::new().with("color", "red").with(SERVICE_RANKING, 3))
            .unwrap();
        assert_eq!(reg.reference().ranking(), 3);
        reg.set_properties(Properties::new().with("color", "blue")).unwrap();
        reg.set_properties(Properties::new().with("color", "green")).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ServiceEventKind::Registered,
                ServiceEventKind::Modified,
                ServiceEventKind::ModifiedEndMatch,
            ]
        );
        // 身份属性保持不变
        assert_eq!(
            reg.reference().property(SERVICE_ID),
            Some(PropertyValue::Long(reg.id() as i64))
        );
        assert_eq!(reg.reference().ranking(), 0);
    }
}
