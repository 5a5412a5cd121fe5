//! 事件定义
//!
//! 三类不可变事件：模块生命周期事件、服务变更事件和框架事件。

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::module::Module;
use crate::service::{Properties, ServiceReference};
use crate::utils::CoreError;

// ============================================================================
// 模块事件
// ============================================================================

/// 模块事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleEventKind {
    /// 正在启动
    Starting,
    /// 已启动
    Started,
    /// 正在停止
    Stopping,
    /// 已停止
    Stopped,
}

impl fmt::Display for ModuleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleEventKind::Starting => write!(f, "STARTING"),
            ModuleEventKind::Started => write!(f, "STARTED"),
            ModuleEventKind::Stopping => write!(f, "STOPPING"),
            ModuleEventKind::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// 模块生命周期事件
#[derive(Clone)]
pub struct ModuleEvent {
    /// 事件类型
    pub kind: ModuleEventKind,
    /// 事件主体模块
    pub module: Arc<Module>,
    /// 触发时间
    pub fired_at: DateTime<Utc>,
}

impl ModuleEvent {
    /// 创建模块事件
    pub fn new(kind: ModuleEventKind, module: Arc<Module>) -> Self {
        Self {
            kind,
            module,
            fired_at: Utc::now(),
        }
    }
}

impl fmt::Debug for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEvent")
            .field("kind", &self.kind)
            .field("module_id", &self.module.id())
            .field("fired_at", &self.fired_at)
            .finish()
    }
}

// ============================================================================
// 服务事件
// ============================================================================

/// 服务事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
    /// 已注册
    Registered,
    /// 属性已修改
    Modified,
    /// 属性已修改，且不再匹配监听器过滤器
    ModifiedEndMatch,
    /// 正在注销
    Unregistering,
}

impl fmt::Display for ServiceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEventKind::Registered => write!(f, "REGISTERED"),
            ServiceEventKind::Modified => write!(f, "MODIFIED"),
            ServiceEventKind::ModifiedEndMatch => write!(f, "MODIFIED_ENDMATCH"),
            ServiceEventKind::Unregistering => write!(f, "UNREGISTERING"),
        }
    }
}

/// 服务变更事件
#[derive(Clone)]
pub struct ServiceEvent {
    /// 事件类型
    pub kind: ServiceEventKind,
    /// 事件主体服务引用
    pub reference: ServiceReference,
    /// 修改前的属性快照（仅 MODIFIED）
    pub previous: Option<Properties>,
    /// 触发时间
    pub fired_at: DateTime<Utc>,
}

impl ServiceEvent {
    /// 创建服务事件
    pub fn new(kind: ServiceEventKind, reference: ServiceReference) -> Self {
        Self {
            kind,
            reference,
            previous: None,
            fired_at: Utc::now(),
        }
    }

    /// 创建属性修改事件
    pub fn modified(reference: ServiceReference, previous: Properties) -> Self {
        Self {
            kind: ServiceEventKind::Modified,
            reference,
            previous: Some(previous),
            fired_at: Utc::now(),
        }
    }

    /// 以新的类型复制事件（用于 MODIFIED_ENDMATCH）
    pub(crate) fn with_kind(&self, kind: ServiceEventKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }
}

impl fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEvent")
            .field("kind", &self.kind)
            .field("service_id", &self.reference.id())
            .field("has_previous", &self.previous.is_some())
            .finish()
    }
}

// ============================================================================
// 框架事件
// ============================================================================

/// 框架事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameworkEventKind {
    /// 框架已启动
    Started,
    /// 出现可恢复错误
    Error,
    /// 包刷新完成
    PackagesRefreshed,
    /// 框架已停止
    Stopped,
}

impl fmt::Display for FrameworkEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameworkEventKind::Started => write!(f, "STARTED"),
            FrameworkEventKind::Error => write!(f, "ERROR"),
            FrameworkEventKind::PackagesRefreshed => write!(f, "PACKAGES_REFRESHED"),
            FrameworkEventKind::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// 框架事件
#[derive(Clone)]
pub struct FrameworkEvent {
    /// 事件类型
    pub kind: FrameworkEventKind,
    /// 相关模块
    pub module: Arc<Module>,
    /// 相关错误
    pub error: Option<Arc<CoreError>>,
    /// 触发时间
    pub fired_at: DateTime<Utc>,
}

impl FrameworkEvent {
    /// 创建框架事件
    pub fn new(kind: FrameworkEventKind, module: Arc<Module>) -> Self {
        Self {
            kind,
            module,
            error: None,
            fired_at: Utc::now(),
        }
    }

    /// 创建错误事件
    pub fn error(module: Arc<Module>, error: CoreError) -> Self {
        Self {
            kind: FrameworkEventKind::Error,
            module,
            error: Some(Arc::new(error)),
            fired_at: Utc::now(),
        }
    }
}

impl fmt::Debug for FrameworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameworkEvent")
            .field("kind", &self.kind)
            .field("module_id", &self.module.id())
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .finish()
    }
}
