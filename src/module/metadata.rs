//! 模块元数据定义
//!
//! 模块状态和模块描述（由外部发现流程生成，安装时转成模块）。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use semver::{Prerelease, Version};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::headers::{self, ModuleResources};

/// 模块状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// 已解析（初始状态，停止后回到此状态）
    Resolved,
    /// 正在启动
    Starting,
    /// 运行中
    Active,
    /// 正在停止
    Stopping,
}

impl Default for ModuleState {
    fn default() -> Self {
        ModuleState::Resolved
    }
}

impl ModuleState {
    /// 是否处于过渡状态
    pub fn is_transitional(&self) -> bool {
        matches!(self, ModuleState::Starting | ModuleState::Stopping)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Resolved => write!(f, "RESOLVED"),
            ModuleState::Starting => write!(f, "STARTING"),
            ModuleState::Active => write!(f, "ACTIVE"),
            ModuleState::Stopping => write!(f, "STOPPING"),
        }
    }
}

/// 模块种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// 普通模块
    Regular,
    /// 系统模块（id 0）
    System,
}

/// 模块描述
///
/// 不含 ID；安装时由模块表分配。
#[derive(Clone)]
pub struct ModuleDescriptor {
    /// 符号名
    pub symbolic_name: Option<String>,
    /// 版本
    pub version: Version,
    /// 位置
    pub location: String,
    /// 入口点标识
    pub activator: Option<String>,
    /// 原始头信息
    pub headers: BTreeMap<String, String>,
    /// 模块资源
    pub resources: Option<Arc<dyn ModuleResources>>,
}

impl ModuleDescriptor {
    /// 创建只有位置的描述
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            symbolic_name: None,
            version: Version::new(0, 0, 0),
            location: location.into(),
            activator: None,
            headers: BTreeMap::new(),
            resources: None,
        }
    }

    /// 从头信息构造
    ///
    /// 符号名取 `Module-SymbolicName` 第一个 `;` 之前的部分；版本解析失败时使用 `0.0.0`。
    pub fn from_headers(location: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        let symbolic_name = headers
            .get(headers::SYMBOLIC_NAME)
            .and_then(|raw| parse_symbolic_name(raw));
        let version = headers
            .get(headers::VERSION)
            .map(|v| parse_version(v))
            .unwrap_or_else(|| Version::new(0, 0, 0));
        let activator = headers
            .get(headers::ACTIVATOR)
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        Self {
            symbolic_name,
            version,
            location: location.into(),
            activator,
            headers,
            resources: None,
        }
    }

    /// 设置符号名
    pub fn symbolic_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .insert(headers::SYMBOLIC_NAME.to_string(), name.clone());
        self.symbolic_name = parse_symbolic_name(&name);
        self
    }

    /// 设置版本（宽松解析）
    pub fn version(mut self, version: &str) -> Self {
        self.headers
            .insert(headers::VERSION.to_string(), version.to_string());
        self.version = parse_version(version);
        self
    }

    /// 设置入口点标识
    pub fn activator(mut self, activator: impl Into<String>) -> Self {
        let activator = activator.into();
        self.headers
            .insert(headers::ACTIVATOR.to_string(), activator.clone());
        self.activator = Some(activator);
        self
    }

    /// 添加头信息
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// 设置模块资源
    pub fn resources(mut self, resources: Arc<dyn ModuleResources>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// 资源最后修改时间
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.resources.as_ref().map(|r| r.last_modified())
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("symbolic_name", &self.symbolic_name)
            .field("version", &self.version.to_string())
            .field("location", &self.location)
            .field("activator", &self.activator)
            .field("headers", &self.headers.len())
            .finish()
    }
}

/// 解析符号名：去掉第一个 `;` 之后的指令部分
pub fn parse_symbolic_name(raw: &str) -> Option<String> {
    let name = match raw.find(';') {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// 宽松解析版本号
///
/// 接受 semver 以及 `1`、`1.2`、`1.2.3.qualifier` 形式；无法解析时返回 `0.0.0`。
pub fn parse_version(raw: &str) -> Version {
    let raw = raw.trim();
    if raw.is_empty() {
        return Version::new(0, 0, 0);
    }
    if let Ok(version) = Version::parse(raw) {
        return version;
    }

    let mut parts = raw.splitn(4, '.');
    let mut numbers = [0u64; 3];
    for slot in numbers.iter_mut() {
        match parts.next() {
            Some(p) => match p.parse::<u64>() {
                Ok(n) => *slot = n,
                Err(_) => {
                    debug!(version = raw, "无效的版本号，使用 0.0.0");
                    return Version::new(0, 0, 0);
                }
            },
            None => break,
        }
    }

    let mut version = Version::new(numbers[0], numbers[1], numbers[2]);
    if let Some(qualifier) = parts.next() {
        match Prerelease::new(qualifier) {
            Ok(pre) => version.pre = pre,
            Err(_) => {
                debug!(version = raw, "无效的版本限定符，使用 0.0.0");
                return Version::new(0, 0, 0);
            }
        }
    }
    version
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_lenient() {
        assert_eq!(parse_version("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(parse_version("1.2"), Version::new(1, 2, 0));
        assert_eq!(parse_version(" 4 "), Version::new(4, 0, 0));
        assert_eq!(parse_version("1.0.0.SNAPSHOT").pre.as_str(), "SNAPSHOT");
        assert_eq!(parse_version("abc"), Version::new(0, 0, 0));
        assert_eq!(parse_version(""), Version::new(0, 0, 0));
    }

    #[test]
    fn test_symbolic_name_strips_directives() {
        assert_eq!(
            parse_symbolic_name("com.example.a; singleton:=true"),
            Some("com.example.a".to_string())
        );
        assert_eq!(parse_symbolic_name("  b  "), Some("b".to_string()));
        assert_eq!(parse_symbolic_name(";x"), None);
    }

    #[test]
    fn test_descriptor_from_headers() {
        let mut raw = BTreeMap::new();
        raw.insert(headers::SYMBOLIC_NAME.to_string(), "a;singleton:=true".to_string());
        raw.insert(headers::VERSION.to_string(), "2.1".to_string());
        raw.insert(headers::ACTIVATOR.to_string(), "a.Activator".to_string());

        let desc = ModuleDescriptor::from_headers("mem:a", raw);
        assert_eq!(desc.symbolic_name.as_deref(), Some("a"));
        assert_eq!(desc.version, Version::new(2, 1, 0));
        assert_eq!(desc.activator.as_deref(), Some("a.Activator"));
        assert_eq!(desc.location, "mem:a");
    }

    #[test]
    fn test_descriptor_builder_writes_headers() {
        let desc = ModuleDescriptor::new("mem:b")
            .symbolic_name("b")
            .version("1.0.0")
            .activator("b.Activator");
        assert_eq!(desc.headers[headers::SYMBOLIC_NAME], "b");
        assert_eq!(desc.headers[headers::ACTIVATOR], "b.Activator");
        assert!(desc.last_modified().is_none());
    }

    #[test]
    fn test_module_state_display() {
        assert_eq!(ModuleState::default(), ModuleState::Resolved);
        assert_eq!(ModuleState::Active.to_string(), "ACTIVE");
        assert!(ModuleState::Stopping.is_transitional());
    }
}
