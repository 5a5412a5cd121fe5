//! 模块头信息与资源访问
//!
//! 头信息本地化是纯函数：输入原始头信息、请求的区域和模块资源，输出解析后的头信息。
//! 以 `%` 开头的值被视为本地化键，按以下顺序查找属性文件：
//!
//! 1. `<basename>_<lang>_<country>.properties`
//! 2. `<basename>_<lang>.properties`
//! 3. `<basename>.properties`
//!
//! 找不到的键保留 `%` 之后的原文。

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

/// 符号名头
pub const SYMBOLIC_NAME: &str = "Module-SymbolicName";

/// 版本头
pub const VERSION: &str = "Module-Version";

/// 入口点头
pub const ACTIVATOR: &str = "Module-Activator";

/// 本地化文件基名头
pub const LOCALIZATION: &str = "Module-Localization";

/// 显示名头
pub const NAME: &str = "Module-Name";

/// 默认本地化文件基名
pub const DEFAULT_LOCALIZATION_BASENAME: &str = "module/localization";

/// 模块资源访问
pub trait ModuleResources: Send + Sync {
    /// 资源最后修改时间
    fn last_modified(&self) -> DateTime<Utc>;

    /// 读取指定路径的条目内容
    fn entry(&self, path: &str) -> Option<Vec<u8>>;

    /// 列出以指定前缀开头的条目路径
    fn entry_paths(&self, prefix: &str) -> Vec<String>;
}

/// 内存中的模块资源
#[derive(Debug, Clone)]
pub struct StaticResources {
    entries: BTreeMap<String, Vec<u8>>,
    last_modified: DateTime<Utc>,
}

impl StaticResources {
    /// 创建空资源集
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            last_modified: Utc::now(),
        }
    }

    /// 添加条目
    pub fn with_entry(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(path.into(), content.into());
        self
    }

    /// 设置最后修改时间
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = at;
        self
    }
}

impl Default for StaticResources {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleResources for StaticResources {
    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn entry(&self, path: &str) -> Option<Vec<u8>> {
        self.entries.get(path.trim_start_matches('/')).cloned()
    }

    fn entry_paths(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.trim_start_matches('/');
        self.entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// 本地化头信息
///
/// # Arguments
///
/// * `raw` - 原始头信息
/// * `locale` - 区域，例如 `zh_CN`；空字符串表示默认
/// * `resources` - 模块资源，None 时只剥离 `%` 前缀
pub fn localize_headers(
    raw: &BTreeMap<String, String>,
    locale: &str,
    resources: Option<&dyn ModuleResources>,
) -> BTreeMap<String, String> {
    if !raw.values().any(|v| v.starts_with('%')) {
        return raw.clone();
    }

    let basename = raw
        .get(LOCALIZATION)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| DEFAULT_LOCALIZATION_BASENAME.to_string());
    let table = resources
        .map(|r| load_localization(r, &basename, locale))
        .unwrap_or_default();

    raw.iter()
        .map(|(key, value)| {
            let resolved = match value.strip_prefix('%') {
                Some(lookup) => table
                    .get(lookup)
                    .cloned()
                    .unwrap_or_else(|| lookup.to_string()),
                None => value.clone(),
            };
            (key.clone(), resolved)
        })
        .collect()
}

/// 合并各级本地化文件，越具体的文件优先
fn load_localization(
    resources: &dyn ModuleResources,
    basename: &str,
    locale: &str,
) -> HashMap<String, String> {
    let mut candidates = vec![format!("{}.properties", basename)];
    let mut suffix = String::new();
    for part in locale.split('_').filter(|p| !p.is_empty()) {
        suffix.push('_');
        suffix.push_str(part);
        candidates.push(format!("{}{}.properties", basename, suffix));
    }

    let mut merged = HashMap::new();
    for path in candidates {
        if let Some(content) = resources.entry(&path) {
            merged.extend(parse_properties(&String::from_utf8_lossy(&content)));
        }
    }
    merged
}

/// 解析 `key=value` / `key: value` 格式的属性文件
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let idx = line.find(['=', ':'])?;
            let key = line[..idx].trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), line[idx + 1..].trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> BTreeMap<String, String> {
        let mut raw = BTreeMap::new();
        raw.insert(NAME.to_string(), "%name".to_string());
        raw.insert("Module-Vendor".to_string(), "%vendor".to_string());
        raw.insert(SYMBOLIC_NAME.to_string(), "com.example.a".to_string());
        raw
    }

    fn resources() -> StaticResources {
        StaticResources::new()
            .with_entry(
                "module/localization.properties",
                "# default\nname=Example\nvendor = Example Inc.\n",
            )
            .with_entry("module/localization_zh.properties", "name=示例\n")
            .with_entry("module/localization_zh_CN.properties", "vendor: 示例公司\n")
    }

    #[test]
    fn test_localize_most_specific_wins() {
        let res = resources();
        let localized = localize_headers(&headers(), "zh_CN", Some(&res as &dyn ModuleResources));
        assert_eq!(localized[NAME], "示例");
        assert_eq!(localized["Module-Vendor"], "示例公司");
        assert_eq!(localized[SYMBOLIC_NAME], "com.example.a");
    }

    #[test]
    fn test_localize_falls_back_to_default() {
        let res = resources();
        let localized = localize_headers(&headers(), "en_US", Some(&res as &dyn ModuleResources));
        assert_eq!(localized[NAME], "Example");
        assert_eq!(localized["Module-Vendor"], "Example Inc.");
    }

    #[test]
    fn test_localize_unresolved_keeps_key() {
        let localized = localize_headers(&headers(), "", None);
        assert_eq!(localized[NAME], "name");
    }

    #[test]
    fn test_custom_basename() {
        let mut raw = headers();
        raw.insert(LOCALIZATION.to_string(), "l10n/bundle".to_string());
        let res = StaticResources::new().with_entry("l10n/bundle.properties", "name=Custom");
        let localized = localize_headers(&raw, "fr", Some(&res as &dyn ModuleResources));
        assert_eq!(localized[NAME], "Custom");
    }

    #[test]
    fn test_entry_paths() {
        let res = resources();
        assert_eq!(res.entry_paths("/module/localization_zh").len(), 2);
        assert!(res.entry("/module/localization.properties").is_some());
    }
}
