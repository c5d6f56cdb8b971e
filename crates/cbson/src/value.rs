//! BSON 值类型定义模块
//!
//! 定义编解码器支持的全部值类型。值模型是一个封闭的枚举,
//! 编码和解码各是一次穷尽匹配,新增变体时由编译器检查遗漏。
//!
//! 字符串类负载使用 [`Text`]:它是"期望为 UTF-8"的字节串,
//! 可以由宿主的原始字节构造,合法性在编码时检查。

use crate::document::Document;
use crate::regexp::{NativeRegex, Regex};
use cbson_common::ObjectId;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, TimeZone, Utc};
use compact_str::CompactString;
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;

/// 期望为 UTF-8 的字节串
///
/// 短文本内联存储,避免为常见的短键名分配堆内存。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Text(SmallVec<[u8; 24]>);

impl Text {
    /// 从任意字节构造,不做校验
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self(SmallVec::from_slice(bytes.as_ref()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 字节是合法 UTF-8 时返回字符串切片
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "{:?}", s),
            None => write!(f, "b\"{}\"", self.0.escape_ascii()),
        }
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Self::from_bytes(s)
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Self::from_bytes(s)
    }
}

impl From<&String> for Text {
    fn from(s: &String) -> Self {
        Self::from_bytes(s)
    }
}

impl From<CompactString> for Text {
    fn from(s: CompactString) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for Text {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

/// 二进制数据及其子类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

impl Binary {
    /// 通用子类型 (0x00)
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype: crate::spec::BINARY_SUBTYPE_GENERIC,
            bytes: bytes.into(),
        }
    }

    /// 旧式子类型 (0x02)
    pub fn old(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype: crate::spec::BINARY_SUBTYPE_OLD,
            bytes: bytes.into(),
        }
    }
}

/// 服务端单调时间戳:秒 + 序号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    pub seconds: u32,
    pub increment: u32,
}

impl Timestamp {
    pub fn new(seconds: u32, increment: u32) -> Self {
        Self { seconds, increment }
    }
}

/// UTC 日期时间:自 Unix 纪元起的有符号毫秒数
///
/// 直接保存线上的 64 位毫秒值,任何线上取值都能解码并原样写回;
/// chrono 只覆盖约 ±262000 年,超出时 [`to_chrono`](Self::to_chrono) 返回 `None`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtcDateTime(i64);

impl UtcDateTime {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.0
    }

    pub fn to_chrono(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

/// 按最近毫秒舍入,半毫秒向正无穷进位
impl From<DateTime<Utc>> for UtcDateTime {
    fn from(dt: DateTime<Utc>) -> Self {
        let nanos = i64::from(dt.timestamp_subsec_nanos());
        Self(dt.timestamp() * 1000 + (nanos + 500_000) / 1_000_000)
    }
}

impl fmt::Display for UtcDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// 文档引用:集合名 + 任意类型的 id
///
/// 编码为 `{ "$ref": namespace, "$id": id }` 形式的内嵌文档。
#[derive(Debug, Clone, PartialEq)]
pub struct DbRef {
    pub namespace: Text,
    pub id: Box<Bson>,
}

impl DbRef {
    pub fn new(namespace: impl Into<Text>, id: impl Into<Bson>) -> Self {
        Self {
            namespace: namespace.into(),
            id: Box::new(id.into()),
        }
    }
}

/// 旧式紧凑引用:集合名 + ObjectId (0x0C)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbPointer {
    pub namespace: Text,
    pub id: ObjectId,
}

impl DbPointer {
    pub fn new(namespace: impl Into<Text>, id: ObjectId) -> Self {
        Self {
            namespace: namespace.into(),
            id,
        }
    }
}

/// 代码及其作用域
///
/// 总是以 code-with-scope (0x0F) 形式编码,没有绑定时作用域为空文档。
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub code: Text,
    pub scope: Document,
}

impl Code {
    pub fn new(code: impl Into<Text>) -> Self {
        Self {
            code: code.into(),
            scope: Document::new(),
        }
    }

    pub fn with_scope(code: impl Into<Text>, scope: Document) -> Self {
        Self {
            code: code.into(),
            scope,
        }
    }
}

/// BSON 值的枚举类型
///
/// 最后三个变体是宿主中存在、但线格式无法表示的类型,
/// 编码时会以 `InvalidDocument` 拒绝并给出类型名。
#[derive(Debug, Clone, PartialEq)]
pub enum Bson {
    /// 64 位浮点数
    Double(f64),
    /// UTF-8 字符串
    String(Text),
    /// 内嵌文档
    Document(Document),
    /// 数组(线上是以 "0","1",... 为键的文档)
    Array(Vec<Bson>),
    /// 二进制数据
    Binary(Binary),
    /// 12 字节对象标识符
    ObjectId(ObjectId),
    /// 布尔值
    Boolean(bool),
    /// UTC 日期时间(线上精度为毫秒)
    DateTime(UtcDateTime),
    /// 空值
    Null,
    /// 可移植正则
    Regex(Regex),
    /// 已编译的原生正则
    NativeRegex(NativeRegex),
    /// 文档引用
    DbRef(DbRef),
    /// 旧式紧凑引用
    DbPointer(DbPointer),
    /// 符号(宿主内部标识符)
    Symbol(CompactString),
    /// 代码及作用域
    Code(Code),
    /// 整数;比 64 位宽,以便表示并拒绝超出范围的宿主整数
    Integer(i128),
    /// 服务端时间戳
    Timestamp(Timestamp),
    /// 比任何值都小的哨兵
    MinKey,
    /// 比任何值都大的哨兵
    MaxKey,
    /// 高精度十进制数(无线上表示)
    Decimal(Decimal),
    /// 日历日期(无线上表示)
    Date(NaiveDate),
    /// 带时区偏移的日期时间(无线上表示)
    ZonedDateTime(DateTime<FixedOffset>),
}

impl Bson {
    /// 获取值的类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            Bson::Double(_) => "double",
            Bson::String(_) => "string",
            Bson::Document(_) => "document",
            Bson::Array(_) => "array",
            Bson::Binary(_) => "binary",
            Bson::ObjectId(_) => "objectId",
            Bson::Boolean(_) => "boolean",
            Bson::DateTime(_) => "dateTime",
            Bson::Null => "null",
            Bson::Regex(_) => "regex",
            Bson::NativeRegex(_) => "nativeRegex",
            Bson::DbRef(_) => "dbRef",
            Bson::DbPointer(_) => "dbPointer",
            Bson::Symbol(_) => "symbol",
            Bson::Code(_) => "code",
            Bson::Integer(_) => "integer",
            Bson::Timestamp(_) => "timestamp",
            Bson::MinKey => "minKey",
            Bson::MaxKey => "maxKey",
            Bson::Decimal(_) => "Decimal",
            Bson::Date(_) => "Date",
            Bson::ZonedDateTime(_) => "ZonedDateTime",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Bson::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Bson::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// 整数在 i64 范围内时返回其值
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Bson::Integer(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Bson::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// 字符串是合法 UTF-8 时返回字符串切片
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Bson::String(s) => s.as_str(),
            Bson::Symbol(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Bson>> {
        match self {
            Bson::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Bson::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Bson::ObjectId(id) => Some(*id),
            _ => None,
        }
    }

    /// 从文档中按键,或从数组中按下标取值
    pub fn get(&self, key: &str) -> Option<&Bson> {
        match self {
            Bson::Document(doc) => doc.get(key),
            Bson::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)),
            _ => None,
        }
    }
}

impl Default for Bson {
    fn default() -> Self {
        Bson::Null
    }
}

impl fmt::Display for Bson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::json::to_extended_json(self))
    }
}

// ============================================================================
// From 特征实现 - 支持从各种 Rust 类型转换为 Bson
// ============================================================================

impl From<bool> for Bson {
    fn from(v: bool) -> Self {
        Bson::Boolean(v)
    }
}

impl From<i32> for Bson {
    fn from(v: i32) -> Self {
        Bson::Integer(v as i128)
    }
}

impl From<i64> for Bson {
    fn from(v: i64) -> Self {
        Bson::Integer(v as i128)
    }
}

impl From<u32> for Bson {
    fn from(v: u32) -> Self {
        Bson::Integer(v as i128)
    }
}

impl From<u64> for Bson {
    fn from(v: u64) -> Self {
        Bson::Integer(v as i128)
    }
}

impl From<i128> for Bson {
    fn from(v: i128) -> Self {
        Bson::Integer(v)
    }
}

impl From<f64> for Bson {
    fn from(v: f64) -> Self {
        Bson::Double(v)
    }
}

impl From<f32> for Bson {
    fn from(v: f32) -> Self {
        Bson::Double(v as f64)
    }
}

impl From<&str> for Bson {
    fn from(v: &str) -> Self {
        Bson::String(Text::from(v))
    }
}

impl From<String> for Bson {
    fn from(v: String) -> Self {
        Bson::String(Text::from(v))
    }
}

impl From<Text> for Bson {
    fn from(v: Text) -> Self {
        Bson::String(v)
    }
}

impl From<Document> for Bson {
    fn from(v: Document) -> Self {
        Bson::Document(v)
    }
}

impl From<Binary> for Bson {
    fn from(v: Binary) -> Self {
        Bson::Binary(v)
    }
}

impl From<ObjectId> for Bson {
    fn from(v: ObjectId) -> Self {
        Bson::ObjectId(v)
    }
}

impl From<UtcDateTime> for Bson {
    fn from(v: UtcDateTime) -> Self {
        Bson::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Bson {
    fn from(v: DateTime<Utc>) -> Self {
        Bson::DateTime(v.into())
    }
}

impl From<Regex> for Bson {
    fn from(v: Regex) -> Self {
        Bson::Regex(v)
    }
}

impl From<NativeRegex> for Bson {
    fn from(v: NativeRegex) -> Self {
        Bson::NativeRegex(v)
    }
}

impl From<DbRef> for Bson {
    fn from(v: DbRef) -> Self {
        Bson::DbRef(v)
    }
}

impl From<DbPointer> for Bson {
    fn from(v: DbPointer) -> Self {
        Bson::DbPointer(v)
    }
}

impl From<Code> for Bson {
    fn from(v: Code) -> Self {
        Bson::Code(v)
    }
}

impl From<Timestamp> for Bson {
    fn from(v: Timestamp) -> Self {
        Bson::Timestamp(v)
    }
}

impl From<Decimal> for Bson {
    fn from(v: Decimal) -> Self {
        Bson::Decimal(v)
    }
}

impl From<NaiveDate> for Bson {
    fn from(v: NaiveDate) -> Self {
        Bson::Date(v)
    }
}

impl From<DateTime<FixedOffset>> for Bson {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Bson::ZonedDateTime(v)
    }
}

impl<T: Into<Bson>> From<Option<T>> for Bson {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Bson::Null)
    }
}

impl<T: Into<Bson>> From<Vec<T>> for Bson {
    fn from(v: Vec<T>) -> Self {
        Bson::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_invalid_bytes() {
        let text = Text::from_bytes(b"123\xD9");
        assert_eq!(text.len(), 4);
        assert!(text.as_str().is_none());
        assert_eq!(format!("{:?}", text), "b\"123\\xd9\"");
        assert_eq!(Text::from("abc"), "abc");
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(Bson::from(42i32), Bson::Integer(42));
        assert_eq!(Bson::from(u64::MAX).as_i64(), None);
        assert_eq!(Bson::from(i64::MIN).as_i64(), Some(i64::MIN));
    }

    #[test]
    fn test_get_nested() {
        let mut inner = Document::new();
        inner.insert("city", "Tokyo");
        let value = Bson::Array(vec![Bson::Null, Bson::Document(inner)]);
        assert_eq!(value.get("1").and_then(|v| v.get("city")).and_then(Bson::as_str), Some("Tokyo"));
        assert!(value.get("5").is_none());
    }

    #[test]
    fn test_datetime_rounds_to_millis() {
        let up = Utc.timestamp_opt(0, 1_500_000).unwrap();
        let down = Utc.timestamp_opt(0, 1_499_999).unwrap();
        assert_eq!(UtcDateTime::from(up).timestamp_millis(), 2);
        assert_eq!(UtcDateTime::from(down).timestamp_millis(), 1);
        let before_epoch = Utc.timestamp_opt(-1, 999_600_000).unwrap();
        assert_eq!(UtcDateTime::from(before_epoch).timestamp_millis(), 0);
    }

    #[test]
    fn test_datetime_beyond_chrono_range() {
        let far = UtcDateTime::from_millis(i64::MAX);
        assert!(far.to_chrono().is_none());
        assert_eq!(far.to_string(), "9223372036854775807ms");

        let near = UtcDateTime::from_millis(1_300_000_000_123);
        assert_eq!(near.to_chrono(), Utc.timestamp_millis_opt(1_300_000_000_123).single());
        assert_eq!(near.to_string(), "2011-03-13T07:06:40.123Z");
    }

    #[test]
    fn test_option_into_null() {
        let none: Option<i32> = None;
        assert!(Bson::from(none).is_null());
        assert_eq!(Bson::from(Some("x")), Bson::from("x"));
    }
}
