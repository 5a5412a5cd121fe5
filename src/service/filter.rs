//! 服务过滤器
//!
//! LDAP 风格的布尔查询表达式，用于服务查找和服务监听器的兴趣声明。
//!
//! 支持的语法：
//!
//! - 组合：`(&(a=1)(b=2))`、`(|(a=1)(b=2))`、`(!(a=1))`
//! - 比较：`=`、`~=`（近似，忽略大小写和空白）、`>=`、`<=`
//! - 存在性：`(a=*)`
//! - 子串：`(name=foo*bar*)`
//! - 转义：`\(`、`\)`、`\*`、`\\`
//!
//! 语法错误在构造过滤器时报告，匹配本身不会失败。
//!
//! ```rust
//! use chips_runtime::service::{Filter, Properties};
//!
//! let filter: Filter = "(&(color=red)(size>=3))".parse().unwrap();
//! let props = Properties::new().with("color", "red").with("size", 4);
//! assert!(filter.matches(&props));
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::properties::{Properties, PropertyValue};
use crate::utils::{CoreError, Result};

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Equal,
    /// `~=`
    Approx,
    /// `>=`
    GreaterEq,
    /// `<=`
    LessEq,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Equal => "=",
            CompareOp::Approx => "~=",
            CompareOp::GreaterEq => ">=",
            CompareOp::LessEq => "<=",
        }
    }
}

/// 过滤器语法树节点
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// 与
    And(Vec<FilterNode>),
    /// 或
    Or(Vec<FilterNode>),
    /// 非
    Not(Box<FilterNode>),
    /// 属性比较
    Compare {
        /// 属性名
        attr: String,
        /// 运算符
        op: CompareOp,
        /// 比较值（已去转义）
        value: String,
    },
    /// 属性存在
    Present {
        /// 属性名
        attr: String,
    },
    /// 子串匹配
    Substring {
        /// 属性名
        attr: String,
        /// 前缀
        initial: Option<String>,
        /// 中间片段（按顺序出现）
        any: Vec<String>,
        /// 后缀
        last: Option<String>,
    },
}

impl FilterNode {
    /// 对属性集求值
    pub fn matches(&self, props: &Properties) -> bool {
        let ci = props.is_case_insensitive();
        match self {
            FilterNode::And(children) => children.iter().all(|c| c.matches(props)),
            FilterNode::Or(children) => children.iter().any(|c| c.matches(props)),
            FilterNode::Not(child) => !child.matches(props),
            FilterNode::Present { attr } => props.contains_key(attr),
            FilterNode::Compare { attr, op, value } => props
                .get(attr)
                .map(|v| compare_value(v, *op, value, ci))
                .unwrap_or(false),
            FilterNode::Substring {
                attr,
                initial,
                any,
                last,
            } => props
                .get(attr)
                .map(|v| substring_value(v, initial.as_deref(), any, last.as_deref(), ci))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterNode::And(children) | FilterNode::Or(children) => {
                let op = if matches!(self, FilterNode::And(_)) { '&' } else { '|' };
                write!(f, "({}", op)?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            FilterNode::Not(child) => write!(f, "(!{})", child),
            FilterNode::Present { attr } => write!(f, "({}=*)", attr),
            FilterNode::Compare { attr, op, value } => {
                write!(f, "({}{}{})", attr, op.symbol(), escape(value))
            }
            FilterNode::Substring {
                attr,
                initial,
                any,
                last,
            } => {
                write!(f, "({}=", attr)?;
                if let Some(initial) = initial {
                    write!(f, "{}", escape(initial))?;
                }
                write!(f, "*")?;
                for part in any {
                    write!(f, "{}*", escape(part))?;
                }
                if let Some(last) = last {
                    write!(f, "{}", escape(last))?;
                }
                write!(f, ")")
            }
        }
    }
}

/// 已解析的过滤器
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    text: String,
    root: FilterNode,
}

impl Filter {
    /// 解析过滤器表达式
    ///
    /// # Errors
    ///
    /// 表达式格式错误时返回 [`CoreError::InvalidSyntax`]
    pub fn parse(text: &str) -> Result<Self> {
        let root = Parser::new(text).parse()?;
        Ok(Self {
            text: text.to_string(),
            root,
        })
    }

    /// 原始表达式文本
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// 语法树根节点
    pub fn root(&self) -> &FilterNode {
        &self.root
    }

    /// 对属性集求值
    pub fn matches(&self, props: &Properties) -> bool {
        self.root.matches(props)
    }
}

impl FromStr for Filter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

// ============================================================================
// 求值
// ============================================================================

fn compare_value(value: &PropertyValue, op: CompareOp, literal: &str, ci: bool) -> bool {
    match value {
        PropertyValue::List(items) => items.iter().any(|v| compare_value(v, op, literal, ci)),
        PropertyValue::String(s) => match op {
            CompareOp::Approx => normalize_approx(s) == normalize_approx(literal),
            _ => {
                let ord = if ci {
                    s.to_lowercase().cmp(&literal.to_lowercase())
                } else {
                    s.as_str().cmp(literal)
                };
                ordering_satisfies(ord, op)
            }
        },
        PropertyValue::Long(n) => match literal.trim().parse::<i64>() {
            Ok(rhs) => ordering_satisfies(n.cmp(&rhs), op),
            Err(_) => false,
        },
        PropertyValue::Double(d) => match literal.trim().parse::<f64>() {
            Ok(rhs) => d
                .partial_cmp(&rhs)
                .map(|ord| ordering_satisfies(ord, op))
                .unwrap_or(false),
            Err(_) => false,
        },
        PropertyValue::Bool(b) => match op {
            CompareOp::Equal | CompareOp::Approx => literal
                .trim()
                .parse::<bool>()
                .map(|rhs| rhs == *b)
                .unwrap_or_else(|_| literal.trim().eq_ignore_ascii_case(&b.to_string())),
            _ => false,
        },
    }
}

fn ordering_satisfies(ord: Ordering, op: CompareOp) -> bool {
    match op {
        CompareOp::Equal | CompareOp::Approx => ord == Ordering::Equal,
        CompareOp::GreaterEq => ord != Ordering::Less,
        CompareOp::LessEq => ord != Ordering::Greater,
    }
}

fn normalize_approx(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn substring_value(
    value: &PropertyValue,
    initial: Option<&str>,
    any: &[String],
    last: Option<&str>,
    ci: bool,
) -> bool {
    match value {
        PropertyValue::List(items) => items
            .iter()
            .any(|v| substring_value(v, initial, any, last, ci)),
        PropertyValue::String(s) => {
            let fold = |t: &str| if ci { t.to_lowercase() } else { t.to_string() };
            let subject = fold(s);
            let mut pos = 0;

            if let Some(initial) = initial {
                let initial = fold(initial);
                if !subject.starts_with(&initial) {
                    return false;
                }
                pos = initial.len();
            }
            for part in any {
                let part = fold(part);
                match subject[pos..].find(&part) {
                    Some(idx) => pos += idx + part.len(),
                    None => return false,
                }
            }
            match last {
                Some(last) => {
                    let last = fold(last);
                    subject.len() >= pos + last.len() && subject.ends_with(&last)
                }
                None => true,
            }
        }
        _ => false,
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// 解析
// ============================================================================

/// 值片段：通配符或文本
enum ValuePart {
    Text(String),
    Wildcard,
}

struct Parser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<FilterNode> {
        self.skip_whitespace();
        let node = self.parse_filter()?;
        self.skip_whitespace();
        if self.pos < self.chars.len() {
            return Err(self.error("表达式末尾存在多余字符"));
        }
        Ok(node)
    }

    fn error(&self, reason: &str) -> CoreError {
        CoreError::InvalidSyntax {
            filter: self.text.to_string(),
            position: self.pos,
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(self.error(&format!("期望 '{}'", expected))),
            None => Err(self.error(&format!("表达式意外结束，期望 '{}'", expected))),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse_filter(&mut self) -> Result<FilterNode> {
        self.expect('(')?;
        self.skip_whitespace();
        let node = match self.peek() {
            Some('&') => {
                self.pos += 1;
                FilterNode::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                FilterNode::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_whitespace();
                FilterNode::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("表达式意外结束")),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(node)
    }

    fn parse_list(&mut self) -> Result<Vec<FilterNode>> {
        let mut children = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some('(') {
            children.push(self.parse_filter()?);
            self.skip_whitespace();
        }
        if children.is_empty() {
            return Err(self.error("组合表达式至少需要一个子表达式"));
        }
        Ok(children)
    }

    fn parse_item(&mut self) -> Result<FilterNode> {
        let attr = self.parse_attr()?;
        let op = match (self.peek(), self.chars.get(self.pos + 1).copied()) {
            (Some('='), _) => {
                self.pos += 1;
                CompareOp::Equal
            }
            (Some('~'), Some('=')) => {
                self.pos += 2;
                CompareOp::Approx
            }
            (Some('>'), Some('=')) => {
                self.pos += 2;
                CompareOp::GreaterEq
            }
            (Some('<'), Some('=')) => {
                self.pos += 2;
                CompareOp::LessEq
            }
            _ => return Err(self.error("无效的比较运算符")),
        };

        let parts = self.parse_value()?;
        let has_wildcard = parts.iter().any(|p| matches!(p, ValuePart::Wildcard));

        if op != CompareOp::Equal || !has_wildcard {
            if has_wildcard {
                return Err(self.error("通配符只能用于 '=' 比较"));
            }
            let value = parts
                .into_iter()
                .map(|p| match p {
                    ValuePart::Text(t) => t,
                    ValuePart::Wildcard => String::new(),
                })
                .collect();
            return Ok(FilterNode::Compare { attr, op, value });
        }

        if parts.len() == 1 {
            return Ok(FilterNode::Present { attr });
        }

        // 按通配符切分为 initial / any / last
        let mut segments: Vec<String> = vec![String::new()];
        for part in parts {
            match part {
                ValuePart::Text(t) => {
                    if let Some(current) = segments.last_mut() {
                        current.push_str(&t);
                    }
                }
                ValuePart::Wildcard => segments.push(String::new()),
            }
        }
        let last = segments.pop().filter(|s| !s.is_empty());
        let mut iter = segments.into_iter();
        let initial = iter.next().filter(|s| !s.is_empty());
        let any = iter.filter(|s| !s.is_empty()).collect();

        Ok(FilterNode::Substring {
            attr,
            initial,
            any,
            last,
        })
    }

    fn parse_attr(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let attr: String = self.chars[start..self.pos].iter().collect();
        let attr = attr.trim();
        if attr.is_empty() {
            return Err(self.error("缺少属性名"));
        }
        Ok(attr.to_string())
    }

    fn parse_value(&mut self) -> Result<Vec<ValuePart>> {
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                Some(')') => break,
                Some('(') => return Err(self.error("值中存在未转义的 '('")),
                Some('*') => {
                    self.pos += 1;
                    if !text.is_empty() {
                        parts.push(ValuePart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(ValuePart::Wildcard);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => {
                            text.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("转义字符后缺少内容")),
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("表达式意外结束，期望 ')'")),
            }
        }
        if !text.is_empty() {
            parts.push(ValuePart::Text(text));
        }
        if parts.is_empty() {
            return Err(self.error("缺少比较值"));
        }
        Ok(parts)
    }
}
