//! BSON 编码模块
//!
//! 把 [`Document`] 写成线格式字节。长度前缀先占位、写完后回填;
//! 任何错误都会中止整个编码,已写入的缓冲区随编码器一起丢弃。

use crate::buffer::{BsonBuffer, Position};
use crate::document::{Document, KeyRef};
use crate::spec::{ElementType, BINARY_SUBTYPE_OLD, DEFAULT_MAX_DOCUMENT_SIZE};
use crate::utf8::{self, Utf8Status};
use crate::value::{Binary, Bson, Code, DbPointer, DbRef, Text};
use crate::{BsonError, BsonResult};
use bytes::Bytes;
use cbson_common::CodecConfig;
use tracing::trace;

const ID_KEY: &[u8] = b"_id";

/// 编码选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// 拒绝以 `$` 开头或含 `.` 的键名
    pub check_keys: bool,
    /// 把 `_id` 提到文档最前面
    pub move_id: bool,
    /// 单个文档编码后的最大字节数
    pub max_size: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            check_keys: false,
            move_id: false,
            max_size: DEFAULT_MAX_DOCUMENT_SIZE,
        }
    }
}

impl From<&CodecConfig> for EncodeOptions {
    fn from(config: &CodecConfig) -> Self {
        Self {
            check_keys: config.check_keys,
            move_id: config.move_id,
            max_size: config.max_document_size,
        }
    }
}

/// 序列化文档
///
/// # Brief
/// 将文档编码为 BSON 字节串
///
/// # Arguments
/// * `doc` - 要编码的文档
/// * `options` - 键检查、`_id` 提前和大小上限
///
/// # Returns
/// 成功返回不可变字节串, 失败返回错误且不产生任何部分输出
pub fn serialize(doc: &Document, options: &EncodeOptions) -> BsonResult<Bytes> {
    let mut encoder = Encoder::new(options.max_size);
    encoder.write_doc(doc, options.check_keys, options.move_id)?;
    let bytes = encoder.into_bytes();
    trace!(len = bytes.len(), "document serialized");
    Ok(bytes)
}

/// 序列化任意值
///
/// 顶层只接受文档,其他类型返回 `InvalidDocument` 并给出实际类型名。
pub fn serialize_value(value: &Bson, options: &EncodeOptions) -> BsonResult<Bytes> {
    match value {
        Bson::Document(doc) => serialize(doc, options),
        other => Err(BsonError::InvalidDocument(format!(
            "serialize takes a document but got a {}",
            other.type_name()
        ))),
    }
}

/// BSON 编码器
///
/// 持有一次顶层编码所用的缓冲区。
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BsonBuffer,
}

impl Encoder {
    pub fn new(max_size: usize) -> Self {
        let mut buf = BsonBuffer::new();
        buf.set_max_size(max_size);
        Self { buf }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.into_bytes()
    }

    /// 写入一个完整文档
    ///
    /// # Brief
    /// 占位长度前缀,处理 `_id` 提前或普通映射中的 `_id` 合并,
    /// 按文档顺序写入元素,最后检查大小上限并回填长度
    ///
    /// # Arguments
    /// * `doc` - 文档
    /// * `check_keys` - 是否检查键名
    /// * `move_id` - 是否把 `_id` 提到最前
    pub fn write_doc(&mut self, doc: &Document, check_keys: bool, move_id: bool) -> BsonResult<()> {
        let start = self.buf.position();
        let length_at = self.buf.save_space(4)?;
        let entries = doc.entries();
        let string_id = entries.get_index_of(&KeyRef::string(ID_KEY));
        let symbol_id = entries.get_index_of(&KeyRef::symbol(ID_KEY));

        if move_id {
            if let Some((_, id)) = string_id.or(symbol_id).and_then(|i| entries.get_index(i)) {
                self.write_element(ID_KEY, id, check_keys, true)?;
            }
            for (key, value) in entries {
                self.write_element(key.name(), value, check_keys, false)?;
            }
        } else {
            // 普通映射同时含字符串和符号 `_id` 时,符号的值写到字符串键的位置
            let collapse = match (doc.is_plain(), string_id, symbol_id) {
                (true, Some(string_at), Some(symbol_at)) => Some((string_at, symbol_at)),
                _ => None,
            };
            for (index, (key, value)) in entries.iter().enumerate() {
                let value = match collapse {
                    Some((_, symbol_at)) if index == symbol_at => continue,
                    Some((string_at, symbol_at)) if index == string_at => entries
                        .get_index(symbol_at)
                        .map(|(_, v)| v)
                        .unwrap_or(value),
                    _ => value,
                };
                self.write_element(key.name(), value, check_keys, true)?;
            }
        }

        self.buf.write(&[0])?;
        let length = self.buf.position() - start;
        if length > self.buf.max_size() {
            return Err(BsonError::DocumentTooLarge {
                max: self.buf.max_size(),
            });
        }
        self.backpatch_length(length_at, length)
    }

    /// 写入一个元素
    ///
    /// # Brief
    /// 写入类型标记、键名和值负载
    ///
    /// # Arguments
    /// * `name` - 键名字节(符号键已取其名字)
    /// * `value` - 值
    /// * `check_keys` - 是否检查 `$` 开头和 `.`
    /// * `allow_id` - 为 false 时静默跳过 `_id`
    pub fn write_element(
        &mut self,
        name: &[u8],
        value: &Bson,
        check_keys: bool,
        allow_id: bool,
    ) -> BsonResult<()> {
        if !allow_id && name == ID_KEY {
            return Ok(());
        }
        if check_keys {
            check_key(name)?;
        }

        match value {
            Bson::Integer(n) => {
                let n = i64::try_from(*n).map_err(|_| BsonError::Range(*n))?;
                match i32::try_from(n) {
                    Ok(small) => {
                        self.write_name_and_type(name, ElementType::Int32)?;
                        self.buf.write(&small.to_le_bytes())?;
                    }
                    Err(_) => {
                        self.write_name_and_type(name, ElementType::Int64)?;
                        self.buf.write(&n.to_le_bytes())?;
                    }
                }
            }
            Bson::Boolean(b) => {
                self.write_name_and_type(name, ElementType::Boolean)?;
                self.buf.write(&[u8::from(*b)])?;
            }
            Bson::Double(n) => {
                self.write_name_and_type(name, ElementType::Double)?;
                self.buf.write(&n.to_le_bytes())?;
            }
            Bson::Null => {
                self.write_name_and_type(name, ElementType::Null)?;
            }
            Bson::Document(doc) => {
                self.write_name_and_type(name, ElementType::EmbeddedDocument)?;
                self.write_doc(doc, check_keys, false)?;
            }
            Bson::Array(items) => {
                self.write_name_and_type(name, ElementType::Array)?;
                self.write_array(items, check_keys)?;
            }
            Bson::String(text) => {
                self.write_name_and_type(name, ElementType::String)?;
                self.write_string(text)?;
            }
            Bson::Symbol(symbol) => {
                self.write_name_and_type(name, ElementType::Symbol)?;
                self.write_length_prefix(symbol.len() + 1)?;
                self.buf.write(symbol.as_bytes())?;
                self.buf.write(&[0])?;
            }
            Bson::Binary(binary) => {
                self.write_name_and_type(name, ElementType::Binary)?;
                self.write_binary(binary)?;
            }
            Bson::ObjectId(id) => {
                self.write_name_and_type(name, ElementType::ObjectId)?;
                self.buf.write(id.as_bytes())?;
            }
            Bson::DbPointer(DbPointer { namespace, id }) => {
                self.write_name_and_type(name, ElementType::DbPointer)?;
                self.write_string(namespace)?;
                self.buf.write(id.as_bytes())?;
            }
            Bson::DbRef(dbref) => {
                self.write_name_and_type(name, ElementType::EmbeddedDocument)?;
                self.write_dbref(dbref)?;
            }
            Bson::Code(code) => {
                self.write_name_and_type(name, ElementType::JavaScriptCodeWithScope)?;
                self.write_code(code)?;
            }
            Bson::Regex(regex) => {
                self.write_name_and_type(name, ElementType::Regex)?;
                self.write_regex(regex.pattern.as_bytes(), &regex.options())?;
            }
            Bson::NativeRegex(regex) => {
                self.write_name_and_type(name, ElementType::Regex)?;
                self.write_regex(regex.pattern().as_bytes(), &regex.options())?;
            }
            Bson::MinKey => {
                self.write_name_and_type(name, ElementType::MinKey)?;
            }
            Bson::MaxKey => {
                self.write_name_and_type(name, ElementType::MaxKey)?;
            }
            Bson::Timestamp(ts) => {
                self.write_name_and_type(name, ElementType::Timestamp)?;
                self.buf.write(&ts.increment.to_le_bytes())?;
                self.buf.write(&ts.seconds.to_le_bytes())?;
            }
            Bson::DateTime(dt) => {
                self.write_name_and_type(name, ElementType::DateTime)?;
                self.buf.write(&dt.timestamp_millis().to_le_bytes())?;
            }
            Bson::Decimal(_) | Bson::Date(_) | Bson::ZonedDateTime(_) => {
                return Err(BsonError::InvalidDocument(format!(
                    "Cannot serialize an object of class {} into BSON.",
                    value.type_name()
                )));
            }
        }
        Ok(())
    }

    /// 写入类型标记和键名
    ///
    /// 键名按 UTF-8 校验且不允许 NUL。
    pub fn write_name_and_type(&mut self, name: &[u8], element_type: ElementType) -> BsonResult<()> {
        self.buf.write(&[element_type.as_u8()])?;
        self.write_utf8(name, false)?;
        self.buf.write(&[0])
    }

    fn write_utf8(&mut self, bytes: &[u8], allow_null: bool) -> BsonResult<()> {
        match utf8::validate(bytes, allow_null) {
            Utf8Status::Valid => self.buf.write(bytes),
            Utf8Status::HasNull => Err(BsonError::InvalidKeyName(
                "Key names / regex patterns must not contain the NULL byte".to_string(),
            )),
            Utf8Status::Invalid => Err(BsonError::InvalidStringEncoding(
                "String not valid UTF-8".to_string(),
            )),
        }
    }

    /// 长度前缀 + 字节 + NUL;字符串值允许内嵌 NUL
    fn write_string(&mut self, text: &Text) -> BsonResult<()> {
        self.write_length_prefix(text.len() + 1)?;
        self.write_utf8(text.as_bytes(), true)?;
        self.buf.write(&[0])
    }

    fn write_array(&mut self, items: &[Bson], check_keys: bool) -> BsonResult<()> {
        let start = self.buf.position();
        let length_at = self.buf.save_space(4)?;
        for (index, item) in items.iter().enumerate() {
            let name = index.to_string();
            self.write_element(name.as_bytes(), item, check_keys, true)?;
        }
        self.buf.write(&[0])?;
        self.backpatch_length(length_at, self.buf.position() - start)
    }

    fn write_binary(&mut self, binary: &Binary) -> BsonResult<()> {
        let len = binary.bytes.len();
        if binary.subtype == BINARY_SUBTYPE_OLD {
            self.write_length_prefix(len + 4)?;
            self.buf.write(&[binary.subtype])?;
            self.write_length_prefix(len)?;
        } else {
            self.write_length_prefix(len)?;
            self.buf.write(&[binary.subtype])?;
        }
        self.buf.write(&binary.bytes)
    }

    fn write_dbref(&mut self, dbref: &DbRef) -> BsonResult<()> {
        let start = self.buf.position();
        let length_at = self.buf.save_space(4)?;
        self.write_name_and_type(b"$ref", ElementType::String)?;
        self.write_string(&dbref.namespace)?;
        self.write_element(b"$id", &dbref.id, false, true)?;
        self.buf.write(&[0])?;
        self.backpatch_length(length_at, self.buf.position() - start)
    }

    fn write_code(&mut self, code: &Code) -> BsonResult<()> {
        let start = self.buf.position();
        let length_at = self.buf.save_space(4)?;
        self.write_string(&code.code)?;
        self.write_doc(&code.scope, false, false)?;
        self.backpatch_length(length_at, self.buf.position() - start)
    }

    fn write_regex(&mut self, pattern: &[u8], options: &[u8]) -> BsonResult<()> {
        self.write_utf8(pattern, false)?;
        self.buf.write(&[0])?;
        self.write_utf8(options, false)?;
        self.buf.write(&[0])
    }

    fn write_length_prefix(&mut self, len: usize) -> BsonResult<()> {
        let len = checked_length(len)?;
        self.buf.write(&len.to_le_bytes())
    }

    fn backpatch_length(&mut self, at: Position, len: usize) -> BsonResult<()> {
        let len = checked_length(len)?;
        self.buf.write_at(at, &len.to_le_bytes())
    }
}

fn check_key(name: &[u8]) -> BsonResult<()> {
    if name.first() == Some(&b'$') {
        return Err(BsonError::InvalidKeyName(format!(
            "key {} must not start with '$'",
            String::from_utf8_lossy(name)
        )));
    }
    if name.contains(&b'.') {
        return Err(BsonError::InvalidKeyName(format!(
            "key {} must not contain '.'",
            String::from_utf8_lossy(name)
        )));
    }
    Ok(())
}

fn checked_length(len: usize) -> BsonResult<i32> {
    i32::try_from(len)
        .map_err(|_| BsonError::InvalidDocument(format!("length {} exceeds the 32-bit limit", len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Key;
    use crate::regexp::Regex;
    use crate::value::Timestamp;
    use rust_decimal::Decimal;

    fn encode(doc: &Document) -> Vec<u8> {
        serialize(doc, &EncodeOptions::default()).unwrap().to_vec()
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(encode(&Document::new()), vec![5, 0, 0, 0, 0]);
    }

    #[test]
    fn test_int32_layout() {
        let doc = crate::doc! { "a" => 1 };
        assert_eq!(encode(&doc), vec![12, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_int64_when_outside_int32() {
        let doc = crate::doc! { "n" => i32::MAX as i64 + 1 };
        let bytes = encode(&doc);
        assert_eq!(bytes[4], 0x12);
        assert_eq!(bytes.len(), 4 + 1 + 2 + 8 + 1);
    }

    #[test]
    fn test_string_layout() {
        let doc = crate::doc! { "s" => "hello" };
        let bytes = encode(&doc);
        assert_eq!(bytes.len(), 18);
        assert_eq!(&bytes[4..7], &[0x02, b's', 0]);
        assert_eq!(&bytes[7..11], &6i32.to_le_bytes());
        assert_eq!(&bytes[11..17], b"hello\0");
    }

    #[test]
    fn test_string_value_may_contain_nul() {
        let doc = crate::doc! { "s" => "a\0b" };
        let bytes = encode(&doc);
        assert_eq!(&bytes[11..15], b"a\0b\0");
    }

    #[test]
    fn test_symbol_keys_written_as_strings() {
        let mut doc = Document::new();
        doc.insert(Key::symbol("name"), "miku");
        let mut expected = Document::new();
        expected.insert("name", "miku");
        assert_eq!(encode(&doc), encode(&expected));
    }

    #[test]
    fn test_old_binary_layout() {
        let doc = crate::doc! { "b" => Binary::old(vec![9, 8, 7]) };
        let bytes = encode(&doc);
        assert_eq!(&bytes[7..11], &7i32.to_le_bytes());
        assert_eq!(bytes[11], BINARY_SUBTYPE_OLD);
        assert_eq!(&bytes[12..16], &3i32.to_le_bytes());
        assert_eq!(&bytes[16..19], &[9, 8, 7]);
    }

    #[test]
    fn test_generic_binary_layout() {
        let doc = crate::doc! { "b" => Binary::new(vec![1, 2]) };
        let bytes = encode(&doc);
        assert_eq!(&bytes[7..11], &2i32.to_le_bytes());
        assert_eq!(bytes[11], 0);
        assert_eq!(&bytes[12..14], &[1, 2]);
    }

    #[test]
    fn test_timestamp_writes_increment_first() {
        let doc = crate::doc! { "t" => Timestamp::new(100, 7) };
        let bytes = encode(&doc);
        assert_eq!(bytes[4], 0x11);
        assert_eq!(&bytes[7..11], &7u32.to_le_bytes());
        assert_eq!(&bytes[11..15], &100u32.to_le_bytes());
    }

    #[test]
    fn test_sentinel_tags() {
        let doc = crate::doc! { "lo" => Bson::MinKey, "hi" => Bson::MaxKey };
        let bytes = encode(&doc);
        assert_eq!(bytes[4], 0xFF);
        assert_eq!(bytes[8], 0x7F);
    }

    #[test]
    fn test_regex_options_sorted() {
        let mut regex = Regex::new("^a", "xi");
        regex.extra_options = "g".into();
        let doc = crate::doc! { "r" => regex };
        let bytes = encode(&doc);
        assert_eq!(&bytes[7..10], b"^a\0");
        assert_eq!(&bytes[10..14], b"gix\0");
    }

    #[test]
    fn test_regex_pattern_rejects_nul() {
        let doc = crate::doc! { "r" => Regex::new("a\0b", "") };
        let err = serialize(&doc, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, BsonError::InvalidKeyName(_)));
    }

    #[test]
    fn test_dbref_as_embedded_document() {
        let doc = crate::doc! { "r" => DbRef::new("users", 5) };
        let bytes = encode(&doc);
        assert_eq!(bytes[4], 0x03);
        let inner = &bytes[7..bytes.len() - 1];
        assert_eq!(&inner[..4], &(inner.len() as i32).to_le_bytes());
        assert_eq!(&inner[4..10], b"\x02$ref\0");
        assert!(inner.windows(4).any(|w| w == b"$id\0"));
    }

    #[test]
    fn test_dbref_id_skips_key_checks() {
        let inner = crate::doc! { "$bad.key" => 1 };
        let doc = crate::doc! { "r" => DbRef::new("users", inner) };
        let options = EncodeOptions { check_keys: true, ..Default::default() };
        assert!(serialize(&doc, &options).is_ok());
    }

    #[test]
    fn test_code_scope_skips_key_checks() {
        let code = Code::with_scope("return x;", crate::doc! { "$x" => 1 });
        let doc = crate::doc! { "c" => code };
        let options = EncodeOptions { check_keys: true, ..Default::default() };
        let bytes = serialize(&doc, &options).unwrap();
        assert_eq!(bytes[4], 0x0F);
        let total = i32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]) as usize;
        assert_eq!(total, bytes.len() - 7 - 1);
    }

    #[test]
    fn test_array_index_keys() {
        let doc = crate::doc! { "a" => vec![true, false] };
        let bytes = encode(&doc);
        assert_eq!(bytes[4], 0x04);
        assert_eq!(&bytes[11..14], &[0x08, b'0', 0]);
        assert_eq!(&bytes[15..18], &[0x08, b'1', 0]);
    }

    #[test]
    fn test_unsupported_type_named() {
        let doc = crate::doc! { "d" => Decimal::new(15, 1) };
        match serialize(&doc, &EncodeOptions::default()).unwrap_err() {
            BsonError::InvalidDocument(msg) => assert!(msg.contains("Decimal")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_serialize_value_rejects_non_document() {
        let err = serialize_value(&Bson::from(1), &EncodeOptions::default()).unwrap_err();
        match err {
            BsonError::InvalidDocument(msg) => assert!(msg.contains("integer")),
            other => panic!("unexpected error: {:?}", other),
        }
        let doc = Bson::Document(crate::doc! { "a" => 1 });
        assert!(serialize_value(&doc, &EncodeOptions::default()).is_ok());
    }

    #[test]
    fn test_nested_document_size_checked() {
        let doc = crate::doc! { "inner" => crate::doc! { "s" => "x".repeat(64) } };
        let options = EncodeOptions { max_size: 32, ..Default::default() };
        let err = serialize(&doc, &options).unwrap_err();
        assert!(matches!(err, BsonError::DocumentTooLarge { max: 32 }));
    }
}
