//! 模块入口点
//!
//! 入口点由 [`ActivatorLoader`] 按标识解析。[`ActivatorRegistry`] 是基于静态表的实现：
//! 宿主程序在启动前把标识和构造函数登记进去。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::context::ModuleContext;

/// 模块入口点
#[async_trait]
pub trait Activator: Send + Sync {
    /// 模块启动时调用
    async fn start(&self, context: &Arc<ModuleContext>) -> anyhow::Result<()>;

    /// 模块停止时调用；出错不会阻止清理
    async fn stop(&self, context: &Arc<ModuleContext>) -> anyhow::Result<()>;
}

/// 入口点加载器
pub trait ActivatorLoader: Send + Sync {
    /// 按标识创建入口点实例
    fn load(&self, identifier: &str) -> anyhow::Result<Arc<dyn Activator>>;
}

/// 入口点构造函数
pub type ActivatorConstructor = Arc<dyn Fn() -> Arc<dyn Activator> + Send + Sync>;

/// 静态入口点注册表
#[derive(Default)]
pub struct ActivatorRegistry {
    constructors: RwLock<HashMap<String, ActivatorConstructor>>,
}

impl ActivatorRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记构造函数，重复标识会覆盖旧值
    pub fn register<F>(&self, identifier: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn Activator> + Send + Sync + 'static,
    {
        self.constructors
            .write()
            .insert(identifier.into(), Arc::new(constructor));
    }

    /// 构建器风格的登记
    pub fn with<F>(self, identifier: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Arc<dyn Activator> + Send + Sync + 'static,
    {
        self.register(identifier, constructor);
        self
    }

    /// 是否包含标识
    pub fn contains(&self, identifier: &str) -> bool {
        self.constructors.read().contains_key(identifier)
    }

    /// 已登记的标识
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl ActivatorLoader for ActivatorRegistry {
    fn load(&self, identifier: &str) -> anyhow::Result<Arc<dyn Activator>> {
        let constructor = self
            .constructors
            .read()
            .get(identifier)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("未登记的入口点: '{}'", identifier))?;
        Ok(constructor())
    }
}

impl fmt::Debug for ActivatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivatorRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}
