//! BSON 文档结构模块
//!
//! 文档是保持插入顺序的键值映射。键可以是字符串或符号,
//! 同名的字符串键和符号键是两个不同的键,宿主允许二者同时存在,
//! 编码器负责在输出时处理 `_id` 的重复。

use crate::value::{Bson, Text};
use cbson_common::ObjectId;
use compact_str::CompactString;
use indexmap::{Equivalent, IndexMap};
use std::fmt;
use std::hash::{Hash, Hasher};

/// 文档键
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Key {
    /// 字符串键
    Str(Text),
    /// 符号键
    Symbol(CompactString),
}

impl Key {
    pub fn symbol(name: impl Into<CompactString>) -> Self {
        Key::Symbol(name.into())
    }

    /// 键名的原始字节
    pub fn name(&self) -> &[u8] {
        match self {
            Key::Str(text) => text.as_bytes(),
            Key::Symbol(name) => name.as_bytes(),
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Key::Symbol(_))
    }

    pub(crate) fn as_key_ref(&self) -> KeyRef<'_> {
        KeyRef {
            name: self.name(),
            symbol: self.is_symbol(),
        }
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_key_ref().hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(text) => write!(f, "{}", text),
            Key::Symbol(name) => write!(f, ":{}", name),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Text::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(Text::from(s))
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Str(Text::from(s))
    }
}

impl From<Text> for Key {
    fn from(text: Text) -> Self {
        Key::Str(text)
    }
}

/// 借用形式的键,用于免分配查找
///
/// 哈希必须与 [`Key`] 保持一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct KeyRef<'a> {
    name: &'a [u8],
    symbol: bool,
}

impl<'a> KeyRef<'a> {
    pub(crate) fn string(name: &'a [u8]) -> Self {
        Self { name, symbol: false }
    }

    pub(crate) fn symbol(name: &'a [u8]) -> Self {
        Self { name, symbol: true }
    }
}

impl Equivalent<Key> for KeyRef<'_> {
    fn equivalent(&self, key: &Key) -> bool {
        *self == key.as_key_ref()
    }
}

/// 文档的宿主映射类型
///
/// 两者在线上没有区别;只有 `Plain` 文档在同时含有字符串 `_id`
/// 和符号 `_id` 时,编码器会把二者合并成一个条目。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentKind {
    /// 显式有序的映射
    #[default]
    Ordered,
    /// 普通映射
    Plain,
}

/// BSON 文档
///
/// 使用 `IndexMap` 保持字段插入顺序;相等比较对顺序敏感,忽略 [`DocumentKind`]。
#[derive(Debug, Clone, Default)]
pub struct Document {
    entries: IndexMap<Key, Bson>,
    kind: DocumentKind,
}

impl Document {
    /// 创建空的有序文档
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建空的普通映射文档
    pub fn plain() -> Self {
        Self {
            entries: IndexMap::new(),
            kind: DocumentKind::Plain,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: DocumentKind) {
        self.kind = kind;
    }

    pub fn is_plain(&self) -> bool {
        self.kind == DocumentKind::Plain
    }

    /// 插入字段
    ///
    /// # Brief
    /// 插入或更新一个字段;键已存在时保留其原有位置
    ///
    /// # Arguments
    /// * `key` - 字段名
    /// * `value` - 字段值
    ///
    /// # Returns
    /// 被替换的旧值
    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Bson>) -> Option<Bson> {
        self.entries.insert(key.into(), value.into())
    }

    /// 按字符串键取值
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.entries.get(&KeyRef::string(key.as_bytes()))
    }

    /// 按原始字节键取值,键不必是合法 UTF-8
    pub fn get_raw(&self, key: &[u8]) -> Option<&Bson> {
        self.entries.get(&KeyRef::string(key))
    }

    /// 按符号键取值
    pub fn get_symbol(&self, name: &str) -> Option<&Bson> {
        self.entries.get(&KeyRef::symbol(name.as_bytes()))
    }

    pub fn get_key(&self, key: &Key) -> Option<&Bson> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Bson> {
        self.entries.get_mut(&KeyRef::string(key.as_bytes()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&KeyRef::string(key.as_bytes()))
    }

    pub fn contains_symbol(&self, name: &str) -> bool {
        self.entries.contains_key(&KeyRef::symbol(name.as_bytes()))
    }

    /// 移除字段,其余字段保持原有顺序
    pub fn remove(&mut self, key: &str) -> Option<Bson> {
        self.entries.shift_remove(&KeyRef::string(key.as_bytes()))
    }

    pub fn remove_key(&mut self, key: &Key) -> Option<Bson> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Bson)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Bson> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn entries(&self) -> &IndexMap<Key, Bson> {
        &self.entries
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Bson::as_str)
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get_i64(key).and_then(|n| i32::try_from(n).ok())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Bson::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Bson::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Bson::as_bool)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Bson>> {
        self.get(key).and_then(Bson::as_array)
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Bson::as_document)
    }

    pub fn get_object_id(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(Bson::as_object_id)
    }

    /// 按路径获取值
    ///
    /// # Brief
    /// 支持点分隔的嵌套路径,数组用数字下标,如 "address.city"、"tags.0"
    ///
    /// # Arguments
    /// * `path` - 字段路径
    ///
    /// # Returns
    /// 找到的值
    pub fn get_path(&self, path: &str) -> Option<&Bson> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// 转换为扩展 JSON 字符串
    pub fn to_json(&self) -> String {
        crate::json::document_to_json(self).to_string()
    }

    /// 转换为带缩进的扩展 JSON 字符串
    pub fn to_json_pretty(&self) -> String {
        let value = crate::json::document_to_json(self);
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().zip(other.entries.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

impl<K: Into<Key>, V: Into<Bson>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        doc.extend(iter);
        doc
    }
}

impl<K: Into<Key>, V: Into<Bson>> Extend<(K, V)> for Document {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a Key, &'a Bson);
    type IntoIter = indexmap::map::Iter<'a, Key, Bson>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// 创建有序文档的宏
///
/// # 示例
///
/// ```rust,ignore
/// use cbson::doc;
///
/// let empty = doc!();
/// let doc = doc! {
///     "name" => "test",
///     "value" => 123,
///     "inner" => doc! { "a" => true },
/// };
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut doc = $crate::Document::new();
        $(
            doc.insert($key, $value);
        )+
        doc
    }};
}
