//! 事件系统
//!
//! 模块、服务和框架事件的定义与分发。

#[allow(clippy::module_inception)]
pub mod event;
pub mod dispatcher;

pub use dispatcher::{
    DispatchStats, DispatcherConfig, EventDispatcher, FrameworkListener, ListenerId,
    ModuleListener, ServiceListener,
};
pub use event::{
    FrameworkEvent, FrameworkEventKind, ModuleEvent, ModuleEventKind, ServiceEvent,
    ServiceEventKind,
};
