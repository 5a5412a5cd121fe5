//! 事件分发器
//!
//! 持有所有模块、服务和框架监听器，负责把事件投递给感兴趣的监听器。
//!
//! # 投递模型
//!
//! - 服务事件总是在触发线程上同步投递，保证 `register()` 返回前监听器已收到 REGISTERED。
//! - 同步模块监听器总是同步投递。
//! - 普通模块监听器和框架监听器在异步模式下进入 FIFO 队列，由单个后台任务按顺序投递；
//!   后台任务对每个回调使用 `spawn_blocking` + `catch_unwind` + 超时保护。
//! - 后台投递超时后回调线程仍可能在运行；在它返回前，同一监听器的后续排队事件被跳过
//!   并计入 `skipped`，因此任何监听器都不会并发执行两个回调。
//! - 投递开关关闭时，触发的事件直接丢弃。
//!
//! 每个监听器都绑定到一个上下文 ID，`remove_all_listeners` 会原子地移除该上下文的
//! 全部监听器，并使已排队但尚未投递的事件不再到达它们。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::event::{FrameworkEvent, ModuleEvent, ServiceEvent, ServiceEventKind};
use crate::service::Filter;

/// 默认监听器处理超时时间（毫秒）
const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 5000;

/// 监听器 ID
pub type ListenerId = u64;

/// 模块事件监听器
pub type ModuleListener = Arc<dyn Fn(ModuleEvent) + Send + Sync>;

/// 服务事件监听器
pub type ServiceListener = Arc<dyn Fn(ServiceEvent) + Send + Sync>;

/// 框架事件监听器
pub type FrameworkListener = Arc<dyn Fn(FrameworkEvent) + Send + Sync>;

/// 排队投递的单个回调
type Job = Box<dyn FnOnce() + Send + 'static>;

/// 排队中的一次投递
struct QueuedJob {
    active: Arc<AtomicBool>,
    /// 监听器上一次回调仍在执行
    busy: Arc<AtomicBool>,
    job: Job,
}

/// 分发器配置
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// 是否同步投递模块/框架事件
    pub synchronous_delivery: bool,

    /// 后台任务中单个监听器的处理超时
    pub handler_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            synchronous_delivery: false,
            handler_timeout: Duration::from_millis(DEFAULT_HANDLER_TIMEOUT_MS),
        }
    }
}

/// 分发统计信息
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    /// 总投递次数
    pub total_dispatched: u64,

    /// 成功投递次数
    pub successful: u64,

    /// 监听器 panic 次数
    pub failed: u64,

    /// 超时次数
    pub timeouts: u64,

    /// 投递关闭期间丢弃的事件数
    pub dropped: u64,

    /// 因监听器上一次超时回调未返回而跳过的投递数
    pub skipped: u64,

    /// 最后投递时间
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

/// 单次回调结果
enum DispatchResult {
    Success,
    Failed(String),
    Timeout,
    Skipped,
}

#[derive(Clone)]
struct ListenerEntry<L> {
    id: ListenerId,
    context_id: u64,
    callback: L,
    /// 移除时置为 false，排队中的投递据此跳过
    active: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
}

impl<L> ListenerEntry<L> {
    fn new(id: ListenerId, context_id: u64, callback: L) -> Self {
        Self {
            id,
            context_id,
            callback,
            active: Arc::new(AtomicBool::new(true)),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Clone)]
struct ServiceListenerEntry {
    entry: ListenerEntry<ServiceListener>,
    filter: Option<Filter>,
}

#[derive(Default)]
struct ListenerTable {
    module: Vec<ListenerEntry<ModuleListener>>,
    sync_module: Vec<ListenerEntry<ModuleListener>>,
    service: Vec<ServiceListenerEntry>,
    framework: Vec<ListenerEntry<FrameworkListener>>,
}

impl ListenerTable {
    fn len(&self) -> usize {
        self.module.len() + self.sync_module.len() + self.service.len() + self.framework.len()
    }

    /// 移除满足条件的监听器，返回移除数量
    fn remove_where(&mut self, pred: impl Fn(ListenerId, u64) -> bool) -> usize {
        fn retain<L>(
            list: &mut Vec<ListenerEntry<L>>,
            pred: &impl Fn(ListenerId, u64) -> bool,
        ) -> usize {
            let before = list.len();
            list.retain(|e| {
                if pred(e.id, e.context_id) {
                    e.active.store(false, Ordering::Release);
                    false
                } else {
                    true
                }
            });
            before - list.len()
        }

        let mut removed = retain(&mut self.module, &pred);
        removed += retain(&mut self.sync_module, &pred);
        removed += retain(&mut self.framework, &pred);

        let before = self.service.len();
        self.service.retain(|s| {
            if pred(s.entry.id, s.entry.context_id) {
                s.entry.active.store(false, Ordering::Release);
                false
            } else {
                true
            }
        });
        removed + (before - self.service.len())
    }
}

/// 后台队列消息
enum Delivery {
    Jobs(Vec<QueuedJob>),
    Flush(oneshot::Sender<()>),
}

/// 事件分发器
pub struct EventDispatcher {
    /// 配置
    config: DispatcherConfig,

    /// 投递开关
    delivering: AtomicBool,

    /// 监听器 ID 生成器
    next_listener_id: AtomicU64,

    /// 监听器表
    listeners: RwLock<ListenerTable>,

    /// 后台投递队列（首次异步投递时惰性创建）
    queue: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,

    /// 分发统计
    stats: Arc<Mutex<DispatchStats>>,
}

impl EventDispatcher {
    /// 使用默认配置创建分发器（投递默认关闭）
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// 使用指定配置创建分发器
    pub fn with_config(config: DispatcherConfig) -> Self {
        debug!(
            synchronous = config.synchronous_delivery,
            timeout = ?config.handler_timeout,
            "创建事件分发器"
        );
        Self {
            config,
            delivering: AtomicBool::new(false),
            next_listener_id: AtomicU64::new(1),
            listeners: RwLock::new(ListenerTable::default()),
            queue: Mutex::new(None),
            stats: Arc::new(Mutex::new(DispatchStats::default())),
        }
    }

    // ====== 投递开关 ======

    /// 开启投递
    pub fn enable_delivery(&self) {
        if !self.delivering.swap(true, Ordering::AcqRel) {
            debug!("事件投递已开启");
        }
    }

    /// 关闭投递，之后触发的事件会被丢弃
    pub fn disable_delivery(&self) {
        if self.delivering.swap(false, Ordering::AcqRel) {
            debug!("事件投递已关闭");
        }
    }

    /// 投递是否开启
    pub fn is_delivering(&self) -> bool {
        self.delivering.load(Ordering::Acquire)
    }

    // ====== 监听器管理 ======

    /// 添加模块监听器
    pub fn add_module_listener(&self, context_id: u64, listener: ModuleListener) -> ListenerId {
        let id = self.next_id();
        self.listeners
            .write()
            .module
            .push(ListenerEntry::new(id, context_id, listener));
        trace!(listener_id = id, context_id, "添加模块监听器");
        id
    }

    /// 添加同步模块监听器（总是在触发线程上投递）
    pub fn add_sync_module_listener(
        &self,
        context_id: u64,
        listener: ModuleListener,
    ) -> ListenerId {
        let id = self.next_id();
        self.listeners
            .write()
            .sync_module
            .push(ListenerEntry::new(id, context_id, listener));
        trace!(listener_id = id, context_id, "添加同步模块监听器");
        id
    }

    /// 添加服务监听器
    ///
    /// # Arguments
    ///
    /// * `context_id` - 所属上下文
    /// * `listener` - 回调
    /// * `filter` - 可选过滤器，对服务当前属性求值
    pub fn add_service_listener(
        &self,
        context_id: u64,
        listener: ServiceListener,
        filter: Option<Filter>,
    ) -> ListenerId {
        let id = self.next_id();
        self.listeners.write().service.push(ServiceListenerEntry {
            entry: ListenerEntry::new(id, context_id, listener),
            filter,
        });
        trace!(listener_id = id, context_id, "添加服务监听器");
        id
    }

    /// 添加框架监听器
    pub fn add_framework_listener(
        &self,
        context_id: u64,
        listener: FrameworkListener,
    ) -> ListenerId {
        let id = self.next_id();
        self.listeners
            .write()
            .framework
            .push(ListenerEntry::new(id, context_id, listener));
        trace!(listener_id = id, context_id, "添加框架监听器");
        id
    }

    /// 移除指定上下文的某个监听器
    ///
    /// # Returns
    ///
    /// 监听器存在并被移除时返回 true
    pub fn remove_listener(&self, context_id: u64, listener_id: ListenerId) -> bool {
        let removed = self
            .listeners
            .write()
            .remove_where(|id, ctx| id == listener_id && ctx == context_id);
        removed > 0
    }

    /// 移除指定上下文的全部监听器
    ///
    /// # Returns
    ///
    /// 移除的监听器数量
    pub fn remove_all_listeners(&self, context_id: u64) -> usize {
        let removed = self
            .listeners
            .write()
            .remove_where(|_, ctx| ctx == context_id);
        if removed > 0 {
            debug!(context_id, removed, "移除上下文的全部监听器");
        }
        removed
    }

    /// 监听器总数
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// 指定上下文的监听器数量
    pub fn listener_count_for_context(&self, context_id: u64) -> usize {
        let table = self.listeners.read();
        table.module.iter().filter(|e| e.context_id == context_id).count()
            + table
                .sync_module
                .iter()
                .filter(|e| e.context_id == context_id)
                .count()
            + table
                .service
                .iter()
                .filter(|s| s.entry.context_id == context_id)
                .count()
            + table
                .framework
                .iter()
                .filter(|e| e.context_id == context_id)
                .count()
    }

    // ====== 事件触发 ======

    /// 触发模块事件
    pub fn fire_module_event(&self, event: ModuleEvent) {
        if !self.accepting(&event.kind) {
            return;
        }
        let (sync_listeners, listeners) = {
            let table = self.listeners.read();
            (table.sync_module.clone(), table.module.clone())
        };

        for l in &sync_listeners {
            self.deliver_inline(&l.callback, &l.active, event.clone());
        }

        if self.config.synchronous_delivery {
            for l in &listeners {
                self.deliver_inline(&l.callback, &l.active, event.clone());
            }
        } else {
            let jobs = listeners
                .into_iter()
                .map(|l| {
                    let callback = l.callback;
                    let event = event.clone();
                    QueuedJob {
                        active: l.active,
                        busy: l.busy,
                        job: Box::new(move || callback(event)),
                    }
                })
                .collect();
            self.enqueue(jobs);
        }
    }

    /// 触发服务事件（同步投递）
    ///
    /// 带过滤器的监听器只在服务当前属性匹配时收到事件；对 MODIFIED 事件，
    /// 修改前匹配而修改后不匹配的监听器收到 MODIFIED_ENDMATCH。
    pub fn fire_service_event(&self, event: ServiceEvent) {
        if !self.accepting(&event.kind) {
            return;
        }
        let listeners = self.listeners.read().service.clone();
        if listeners.is_empty() {
            return;
        }
        let current = event.reference.properties();

        for l in &listeners {
            let kind = match &l.filter {
                None => Some(event.kind),
                Some(f) if f.matches(&current) => Some(event.kind),
                Some(f)
                    if event.kind == ServiceEventKind::Modified
                        && event.previous.as_ref().is_some_and(|p| f.matches(p)) =>
                {
                    Some(ServiceEventKind::ModifiedEndMatch)
                }
                _ => None,
            };
            let Some(kind) = kind else { continue };
            let delivered = if kind == event.kind {
                event.clone()
            } else {
                event.with_kind(kind)
            };
            self.deliver_inline(&l.entry.callback, &l.entry.active, delivered);
        }
    }

    /// 触发框架事件
    pub fn fire_framework_event(&self, event: FrameworkEvent) {
        if !self.accepting(&event.kind) {
            return;
        }
        let listeners = self.listeners.read().framework.clone();

        if self.config.synchronous_delivery {
            for l in &listeners {
                self.deliver_inline(&l.callback, &l.active, event.clone());
            }
        } else {
            let jobs = listeners
                .into_iter()
                .map(|l| {
                    let callback = l.callback;
                    let event = event.clone();
                    QueuedJob {
                        active: l.active,
                        busy: l.busy,
                        job: Box::new(move || callback(event)),
                    }
                })
                .collect();
            self.enqueue(jobs);
        }
    }

    /// 等待已排队的事件全部投递完成
    pub async fn flush(&self) {
        let tx = self.queue.lock().clone();
        if let Some(tx) = tx {
            let (done_tx, done_rx) = oneshot::channel();
            if tx.send(Delivery::Flush(done_tx)).is_ok() {
                let _ = done_rx.await;
            }
        }
    }

    /// 获取分发统计
    pub fn stats(&self) -> DispatchStats {
        self.stats.lock().clone()
    }

    // ====== 内部实现 ======

    fn next_id(&self) -> ListenerId {
        self.next_listener_id.fetch_add(1, Ordering::Relaxed)
    }

    fn accepting(&self, kind: &dyn std::fmt::Display) -> bool {
        if self.is_delivering() {
            return true;
        }
        trace!(kind = %kind, "投递已关闭，丢弃事件");
        self.stats.lock().dropped += 1;
        false
    }

    fn deliver_inline<E>(
        &self,
        callback: &Arc<dyn Fn(E) + Send + Sync>,
        active: &AtomicBool,
        event: E,
    ) {
        if !active.load(Ordering::Acquire) {
            return;
        }
        let result = match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(()) => DispatchResult::Success,
            Err(_) => DispatchResult::Failed("监听器 panic".to_string()),
        };
        Self::record(&self.stats, result);
    }

    fn enqueue(&self, jobs: Vec<QueuedJob>) {
        if jobs.is_empty() {
            return;
        }
        let Some(tx) = self.sender() else {
            Self::run_inline(&self.stats, jobs);
            return;
        };
        if let Err(mpsc::error::SendError(delivery)) = tx.send(Delivery::Jobs(jobs)) {
            // 运行时已关闭，后台任务不可用
            *self.queue.lock() = None;
            if let Delivery::Jobs(jobs) = delivery {
                Self::run_inline(&self.stats, jobs);
            }
        }
    }

    /// 获取（必要时创建）后台队列发送端；没有 tokio 运行时时返回 None
    fn sender(&self) -> Option<mpsc::UnboundedSender<Delivery>> {
        let mut queue = self.queue.lock();
        if let Some(tx) = queue.as_ref() {
            if !tx.is_closed() {
                return Some(tx.clone());
            }
        }
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(Self::run_worker(
            rx,
            self.stats.clone(),
            self.config.handler_timeout,
        ));
        debug!("事件投递后台任务已启动");
        *queue = Some(tx.clone());
        Some(tx)
    }

    async fn run_worker(
        mut rx: mpsc::UnboundedReceiver<Delivery>,
        stats: Arc<Mutex<DispatchStats>>,
        handler_timeout: Duration,
    ) {
        while let Some(delivery) = rx.recv().await {
            match delivery {
                Delivery::Jobs(jobs) => {
                    for queued in jobs {
                        if !queued.active.load(Ordering::Acquire) {
                            continue;
                        }
                        if queued.busy.load(Ordering::Acquire) {
                            Self::record(&stats, DispatchResult::Skipped);
                            continue;
                        }
                        let result = Self::invoke_with_timeout(queued, handler_timeout).await;
                        Self::record(&stats, result);
                    }
                }
                Delivery::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        trace!("事件投递后台任务退出");
    }

    fn run_inline(stats: &Mutex<DispatchStats>, jobs: Vec<QueuedJob>) {
        for queued in jobs {
            if !queued.active.load(Ordering::Acquire) {
                continue;
            }
            let result = match catch_unwind(AssertUnwindSafe(queued.job)) {
                Ok(()) => DispatchResult::Success,
                Err(_) => DispatchResult::Failed("监听器 panic".to_string()),
            };
            Self::record(stats, result);
        }
    }

    /// 带超时的回调调用
    ///
    /// 回调是同步的，放到 `spawn_blocking` 线程中执行；超时后不再等待其结果，
    /// 但监听器保持 busy 直到回调真正返回。
    async fn invoke_with_timeout(queued: QueuedJob, handler_timeout: Duration) -> DispatchResult {
        let QueuedJob { busy, job, .. } = queued;
        busy.store(true, Ordering::Release);
        let result = timeout(
            handler_timeout,
            tokio::task::spawn_blocking(move || {
                let outcome = catch_unwind(AssertUnwindSafe(job));
                busy.store(false, Ordering::Release);
                outcome
            }),
        )
        .await;

        match result {
            Ok(Ok(Ok(()))) => DispatchResult::Success,
            Ok(Ok(Err(_))) => DispatchResult::Failed("监听器 panic".to_string()),
            Ok(Err(e)) => DispatchResult::Failed(format!("任务执行失败: {}", e)),
            Err(_) => DispatchResult::Timeout,
        }
    }

    fn record(stats: &Mutex<DispatchStats>, result: DispatchResult) {
        let mut stats = stats.lock();
        if let DispatchResult::Skipped = result {
            stats.skipped += 1;
            warn!("监听器上一次回调仍在执行，跳过本次投递");
            return;
        }
        stats.total_dispatched += 1;
        stats.last_dispatch_at = Some(Utc::now());
        match result {
            DispatchResult::Success => stats.successful += 1,
            DispatchResult::Failed(reason) => {
                stats.failed += 1;
                warn!(reason = %reason, "监听器处理事件失败");
            }
            DispatchResult::Timeout => {
                stats.timeouts += 1;
                warn!("监听器处理事件超时");
            }
            DispatchResult::Skipped => {}
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{FrameworkEventKind, ModuleEventKind};
    use crate::module::Module;
    use std::sync::atomic::AtomicUsize;

    fn counting_module_listener(counter: &Arc<AtomicUsize>) -> ModuleListener {
        let counter = counter.clone();
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn sync_dispatcher() -> EventDispatcher {
        let dispatcher = EventDispatcher::with_config(DispatcherConfig {
            synchronous_delivery: true,
            ..Default::default()
        });
        dispatcher.enable_delivery();
        dispatcher
    }

    #[test]
    fn test_disabled_dispatcher_drops_events() {
        let dispatcher = EventDispatcher::with_config(DispatcherConfig {
            synchronous_delivery: true,
            ..Default::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.add_module_listener(1, counting_module_listener(&counter));

        let module = Module::detached(1);
        dispatcher.fire_module_event(ModuleEvent::new(ModuleEventKind::Started, module));

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.stats().dropped, 1);
    }

    #[test]
    fn test_sync_delivery_and_removal() {
        let dispatcher = sync_dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        let a = dispatcher.add_module_listener(1, counting_module_listener(&counter));
        dispatcher.add_module_listener(2, counting_module_listener(&counter));
        assert_eq!(dispatcher.listener_count(), 2);

        let module = Module::detached(1);
        dispatcher.fire_module_event(ModuleEvent::new(ModuleEventKind::Started, module.clone()));
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        // 其他上下文不能移除
        assert!(!dispatcher.remove_listener(2, a));
        assert!(dispatcher.remove_listener(1, a));
        dispatcher.fire_module_event(ModuleEvent::new(ModuleEventKind::Stopped, module));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_remove_all_listeners_for_context() {
        let dispatcher = sync_dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.add_module_listener(7, counting_module_listener(&counter));
        dispatcher.add_sync_module_listener(7, counting_module_listener(&counter));
        dispatcher.add_framework_listener(7, Arc::new(|_| {}));
        dispatcher.add_module_listener(8, counting_module_listener(&counter));

        assert_eq!(dispatcher.listener_count_for_context(7), 3);
        assert_eq!(dispatcher.remove_all_listeners(7), 3);
        assert_eq!(dispatcher.listener_count(), 1);

        dispatcher.fire_module_event(ModuleEvent::new(
            ModuleEventKind::Started,
            Module::detached(3),
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let dispatcher = sync_dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.add_framework_listener(1, Arc::new(|_| panic!("listener failure")));
        let c = counter.clone();
        dispatcher.add_framework_listener(
            1,
            Arc::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        dispatcher.fire_framework_event(FrameworkEvent::new(
            FrameworkEventKind::Started,
            Module::detached(0),
        ));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let stats = dispatcher.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.successful, 1);
    }

    #[tokio::test]
    async fn test_async_delivery_preserves_order() {
        let dispatcher = EventDispatcher::new();
        dispatcher.enable_delivery();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        dispatcher.add_module_listener(
            1,
            Arc::new(move |e: ModuleEvent| s.lock().push(e.kind)),
        );

        let module = Module::detached(4);
        for kind in [
            ModuleEventKind::Starting,
            ModuleEventKind::Started,
            ModuleEventKind::Stopping,
            ModuleEventKind::Stopped,
        ] {
            dispatcher.fire_module_event(ModuleEvent::new(kind, module.clone()));
        }
        dispatcher.flush().await;

        assert_eq!(
            *seen.lock(),
            vec![
                ModuleEventKind::Starting,
                ModuleEventKind::Started,
                ModuleEventKind::Stopping,
                ModuleEventKind::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_queued_event_skips_removed_listener() {
        let dispatcher = EventDispatcher::new();
        dispatcher.enable_delivery();
        let counter = Arc::new(AtomicUsize::new(0));

        // 第一个监听器阻塞后台任务，确保第二个事件仍在队列中
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));
        let gate = dispatcher.add_module_listener(
            1,
            Arc::new(move |_| {
                let _ = release_rx.lock().recv_timeout(Duration::from_secs(2));
            }),
        );
        dispatcher.add_module_listener(2, counting_module_listener(&counter));

        let module = Module::detached(5);
        dispatcher.fire_module_event(ModuleEvent::new(ModuleEventKind::Starting, module));
        dispatcher.remove_all_listeners(2);
        let _ = release_tx.send(());
        dispatcher.flush().await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(dispatcher.remove_listener(1, gate));
    }

    #[tokio::test]
    async fn test_handler_timeout() {
        let dispatcher = EventDispatcher::with_config(DispatcherConfig {
            synchronous_delivery: false,
            handler_timeout: Duration::from_millis(50),
        });
        dispatcher.enable_delivery();
        dispatcher.add_framework_listener(
            1,
            Arc::new(|_| std::thread::sleep(Duration::from_millis(300))),
        );

        dispatcher.fire_framework_event(FrameworkEvent::new(
            FrameworkEventKind::Started,
            Module::detached(0),
        ));
        dispatcher.flush().await;

        assert_eq!(dispatcher.stats().timeouts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_listener_never_runs_concurrently() {
        let dispatcher = EventDispatcher::with_config(DispatcherConfig {
            synchronous_delivery: false,
            handler_timeout: Duration::from_millis(50),
        });
        dispatcher.enable_delivery();

        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let (r, m, c) = (running.clone(), max_running.clone(), calls.clone());
        dispatcher.add_framework_listener(
            1,
            Arc::new(move |_| {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    std::thread::sleep(Duration::from_millis(300));
                }
                r.fetch_sub(1, Ordering::SeqCst);
            }),
        );

        let fire = |d: &EventDispatcher| {
            d.fire_framework_event(FrameworkEvent::new(
                FrameworkEventKind::Started,
                Module::detached(0),
            ))
        };
        fire(&dispatcher);
        fire(&dispatcher);
        dispatcher.flush().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.skipped, 1);

        // 慢回调返回后恢复投递
        tokio::time::sleep(Duration::from_millis(400)).await;
        fire(&dispatcher);
        dispatcher.flush().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.stats().successful, 1);
    }
}
