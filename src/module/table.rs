//! 模块表
//!
//! id → 模块、符号名 → 模块 两个索引。ID 在安装时按当前表大小分配，之后不变；
//! 符号名冲突的模块直接跳过，不分配 ID。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::module::Module;

#[derive(Default)]
struct TableInner {
    by_id: BTreeMap<u64, Arc<Module>>,
    by_name: HashMap<String, Arc<Module>>,
}

/// 模块表
#[derive(Default)]
pub struct ModuleTable {
    inner: RwLock<TableInner>,
}

impl ModuleTable {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装模块
    ///
    /// # Arguments
    ///
    /// * `symbolic_name` - 模块符号名，None 表示不建名称索引
    /// * `make` - 按分配到的 ID 构造模块
    ///
    /// # Returns
    ///
    /// 符号名已被占用时返回 None
    pub(crate) fn install(
        &self,
        symbolic_name: Option<&str>,
        make: impl FnOnce(u64) -> Arc<Module>,
    ) -> Option<Arc<Module>> {
        let mut inner = self.inner.write();
        if let Some(name) = symbolic_name {
            if inner.by_name.contains_key(name) {
                debug!(symbolic_name = name, "符号名已存在，跳过模块");
                return None;
            }
        }

        let id = inner.by_id.len() as u64;
        let module = make(id);
        inner.by_id.insert(id, module.clone());
        if let Some(name) = symbolic_name {
            inner.by_name.insert(name.to_string(), module.clone());
        }
        info!(module_id = id, symbolic_name = ?symbolic_name, "模块已安装");
        Some(module)
    }

    /// 按 ID 获取
    pub fn get(&self, id: u64) -> Option<Arc<Module>> {
        self.inner.read().by_id.get(&id).cloned()
    }

    /// 按符号名获取（忽略首尾空白）
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Module>> {
        self.inner.read().by_name.get(name.trim()).cloned()
    }

    /// 全部模块，按 ID 升序
    pub fn all(&self) -> Vec<Arc<Module>> {
        self.inner.read().by_id.values().cloned().collect()
    }

    /// 模块数量
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
