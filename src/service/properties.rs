//! 服务属性集
//!
//! 服务注册时携带的键值对集合。属性值是带类型的，过滤器会根据类型选择
//! 字符串、整数或浮点比较。

use std::collections::BTreeMap;
use std::fmt;

/// 接口名列表属性键
pub const OBJECT_CLASS: &str = "objectClass";

/// 服务 ID 属性键
pub const SERVICE_ID: &str = "service.id";

/// 服务排序权重属性键
pub const SERVICE_RANKING: &str = "service.ranking";

/// 属性值
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// 字符串
    String(String),
    /// 64 位整数
    Long(i64),
    /// 浮点数
    Double(f64),
    /// 布尔值
    Bool(bool),
    /// 列表（过滤时任一元素匹配即匹配）
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// 以字符串形式读取
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 以整数形式读取
    pub fn as_long(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// 以列表形式读取
    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// 收集为字符串列表（单值视为一个元素的列表）
    pub fn to_string_list(&self) -> Vec<String> {
        match self {
            PropertyValue::List(items) => items.iter().map(|v| v.to_string()).collect(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::Long(n) => write!(f, "{}", n),
            PropertyValue::Double(d) => write!(f, "{}", d),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Long(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Long(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        PropertyValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// 属性集
///
/// 默认区分键的大小写；通过 [`Properties::case_insensitive`] 创建的属性集
/// 在按键查找和字符串比较时都忽略大小写。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: BTreeMap<String, PropertyValue>,
    case_insensitive: bool,
}

impl Properties {
    /// 创建空属性集
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建忽略大小写的属性集
    pub fn case_insensitive() -> Self {
        Self {
            entries: BTreeMap::new(),
            case_insensitive: true,
        }
    }

    /// 是否忽略大小写
    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// 构建器风格的插入
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// 插入属性，返回旧值
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        let key = key.into();
        let old = match self.find_key(&key) {
            Some(existing) => self.entries.remove(&existing),
            None => None,
        };
        self.entries.insert(key, value.into());
        old
    }

    /// 读取属性
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        if !self.case_insensitive {
            return self.entries.get(key);
        }
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// 删除属性
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        let existing = self.find_key(key)?;
        self.entries.remove(&existing)
    }

    /// 是否包含某个键
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 所有键
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// 遍历键值对
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.entries.iter()
    }

    /// 属性数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 服务排序权重，非整数或缺失时为 0
    pub fn ranking(&self) -> i64 {
        self.get(SERVICE_RANKING)
            .and_then(PropertyValue::as_long)
            .unwrap_or(0)
    }

    fn find_key(&self, key: &str) -> Option<String> {
        if self.case_insensitive {
            self.entries
                .keys()
                .find(|k| k.eq_ignore_ascii_case(key))
                .cloned()
        } else if self.entries.contains_key(key) {
            Some(key.to_string())
        } else {
            None
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.insert(k, v);
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut props = Properties::new();
        assert!(props.insert("color", "red").is_none());
        assert_eq!(props.insert("color", "blue"), Some(PropertyValue::from("red")));
        assert_eq!(props.get("color").and_then(|v| v.as_str()), Some("blue"));
        assert!(props.get("Color").is_none());
    }

    #[test]
    fn test_case_insensitive_keys() {
        let mut props = Properties::case_insensitive().with("Color", "red");
        assert_eq!(props.get("COLOR"), Some(&PropertyValue::from("red")));

        props.insert("color", "blue");
        assert_eq!(props.len(), 1);
        assert_eq!(props.keys(), vec!["color".to_string()]);
        assert!(props.remove("COLOR").is_some());
        assert!(props.is_empty());
    }

    #[test]
    fn test_ranking_defaults_to_zero() {
        assert_eq!(Properties::new().ranking(), 0);
        assert_eq!(Properties::new().with(SERVICE_RANKING, "high").ranking(), 0);
        assert_eq!(Properties::new().with(SERVICE_RANKING, 7).ranking(), 7);
    }

    #[test]
    fn test_list_display() {
        let value = PropertyValue::from(vec!["a", "b"]);
        assert_eq!(value.to_string(), "[a, b]");
        assert_eq!(value.to_string_list(), vec!["a", "b"]);
    }
}
