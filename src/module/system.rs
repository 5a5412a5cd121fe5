//! 系统模块（id 0）的生命周期
//!
//! 系统模块持有分发器的投递开关，并负责启动/停止其余所有模块：
//!
//! - 启动：先开启投递，再进入 ACTIVE，随后按 ID 升序启动其余模块。单个模块失败只记录日志
//!   并触发框架 ERROR 事件，不影响其他模块。
//! - 停止：进入 STOPPING 后按 ID 降序停止其余模块，最后撤销系统上下文、回到 RESOLVED、
//!   关闭投递。同步模式在调用方任务中完成；否则交给后台任务，句柄保存在运行时中，
//!   可通过 `Framework::wait_for_stop` 等待。
//!
//! 模块的 start/stop 会经由这里再次进入其他模块的 start/stop，因此这里返回装箱的 future。

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use super::context::ModuleContext;
use super::metadata::ModuleState;
use super::module::Module;
use crate::compat;
use crate::event::{FrameworkEvent, FrameworkEventKind, ModuleEventKind};
use crate::framework::FrameworkInner;
use crate::utils::{CoreError, Result};

/// 启动系统模块及其余所有模块
pub(crate) fn start(system: &Arc<Module>) -> BoxFuture<'_, Result<()>> {
    async move {
        match system.state() {
            ModuleState::Active | ModuleState::Starting => return Ok(()),
            ModuleState::Stopping => {
                return Err(CoreError::illegal_state("系统模块正在停止，无法启动"))
            }
            ModuleState::Resolved => {}
        }
        let fw = system.framework()?;

        {
            let _guard = system.lifecycle.lock().await;
            match system.state() {
                ModuleState::Active | ModuleState::Starting => return Ok(()),
                ModuleState::Stopping => {
                    return Err(CoreError::illegal_state("系统模块正在停止，无法启动"))
                }
                ModuleState::Resolved => {}
            }

            // 先开启投递，STARTING 事件才不会被丢弃
            fw.dispatcher.enable_delivery();
            system.set_state(ModuleState::Starting);
            let context = ModuleContext::new(system, &fw);
            system.set_context(Some(context.clone()));
            system.fire(&fw, ModuleEventKind::Starting);

            system.set_state(ModuleState::Active);
            system.fire(&fw, ModuleEventKind::Started);

            if let Err(e) = compat::register_services(&context, &fw) {
                warn!(error = %e, "兼容服务注册失败");
            }
            info!("系统模块已启动");
        }

        let mut started = 0usize;
        let mut failed = 0usize;
        for module in fw.modules.all().into_iter().filter(|m| !m.is_system()) {
            if system.state() != ModuleState::Active {
                warn!("系统模块已不在运行状态，停止启动其余模块");
                break;
            }
            match module.start().await {
                Ok(()) => started += 1,
                Err(e) => {
                    failed += 1;
                    warn!(module_id = module.id(), error = %e, "模块启动失败，继续启动其余模块");
                    fw.dispatcher
                        .fire_framework_event(FrameworkEvent::error(module.clone(), e));
                }
            }
        }

        if system.state() == ModuleState::Active {
            fw.dispatcher
                .fire_framework_event(FrameworkEvent::new(FrameworkEventKind::Started, system.clone()));
        }
        info!(started, failed, "模块启动完成");
        Ok(())
    }
    .boxed()
}

/// 停止系统模块及其余所有模块
pub(crate) fn stop(system: &Arc<Module>) -> BoxFuture<'_, Result<()>> {
    async move {
        match system.state() {
            ModuleState::Stopping => return Ok(()),
            ModuleState::Active => {}
            other => {
                return Err(CoreError::illegal_state(format!(
                    "系统模块处于 {} 状态，无法停止",
                    other
                )))
            }
        }
        let fw = system.framework()?;

        {
            let _guard = system.lifecycle.lock().await;
            match system.state() {
                ModuleState::Stopping => return Ok(()),
                ModuleState::Active => {}
                other => {
                    return Err(CoreError::illegal_state(format!(
                        "系统模块处于 {} 状态，无法停止",
                        other
                    )))
                }
            }
            system.set_state(ModuleState::Stopping);
            system.fire(&fw, ModuleEventKind::Stopping);
        }

        if fw.config.events.synchronous_stop {
            shutdown(system.clone(), fw).await;
        } else {
            debug!("在后台任务中停止模块");
            let task = tokio::spawn(shutdown(system.clone(), fw.clone()));
            *fw.stop_task.lock() = Some(task);
        }
        Ok(())
    }
    .boxed()
}

/// 停止其余模块并撤销系统上下文
fn shutdown(system: Arc<Module>, fw: Arc<FrameworkInner>) -> BoxFuture<'static, ()> {
    async move {
        for module in fw.modules.all().into_iter().rev().filter(|m| !m.is_system()) {
            let mut result = module.stop().await;
            if matches!(result, Err(CoreError::IllegalState(_))) {
                // 启动尚未完成，等待后重试一次
                module.settle().await;
                result = module.stop().await;
            }
            if let Err(e) = result {
                warn!(module_id = module.id(), error = %e, "模块停止失败，继续停止其余模块");
                fw.dispatcher
                    .fire_framework_event(FrameworkEvent::error(module.clone(), e));
            }
        }

        let _guard = system.lifecycle.lock().await;
        if let Some(context) = system.context() {
            system.teardown(&fw, &context);
        }
        system.set_state(ModuleState::Resolved);
        system.fire(&fw, ModuleEventKind::Stopped);
        fw.dispatcher
            .fire_framework_event(FrameworkEvent::new(FrameworkEventKind::Stopped, system.clone()));
        fw.dispatcher.disable_delivery();
        info!("系统模块已停止");
    }
    .boxed()
}
