//! BSON 解码模块
//!
//! 从线格式字节构建新的有序文档。游标是贯穿递归调用的单一偏移量,
//! 每次读取都做边界检查:截断或自相矛盾的输入返回错误,不会 panic。

use crate::document::Document;
use crate::regexp::Regex;
use crate::spec::{ElementType, BINARY_SUBTYPE_OLD, MIN_DOCUMENT_SIZE};
use crate::utf8::{self, Utf8Status};
use crate::value::{Binary, Bson, Code, DbPointer, DbRef, Text, Timestamp, UtcDateTime};
use crate::{BsonError, BsonResult};
use cbson_common::{CodecConfig, ObjectId};
use compact_str::CompactString;
use tracing::trace;

/// 内嵌文档首个元素为 `"$ref"` 字符串时按引用解码
const REF_ELEMENT_HEADER: &[u8] = b"\x02$ref\0";

/// 解码选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// 正则是否编译为原生 `regex::Regex`
    pub compile_regex: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { compile_regex: true }
    }
}

impl From<&CodecConfig> for DecodeOptions {
    fn from(config: &CodecConfig) -> Self {
        Self {
            compile_regex: config.compile_regex,
        }
    }
}

/// 反序列化文档
///
/// # Brief
/// 解析一个完整的顶层文档;声明长度必须等于输入长度且以 NUL 结尾
///
/// # Arguments
/// * `data` - 输入字节
/// * `options` - 解码选项
///
/// # Returns
/// 成功返回新建的有序文档, 格式错误返回错误
pub fn deserialize(data: &[u8], options: &DecodeOptions) -> BsonResult<Document> {
    if data.len() < MIN_DOCUMENT_SIZE {
        return Err(BsonError::UnexpectedEof);
    }
    let declared = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if usize::try_from(declared).ok() != Some(data.len()) {
        return Err(BsonError::InvalidDocument(format!(
            "declared length {} does not match input length {}",
            declared,
            data.len()
        )));
    }
    let mut decoder = Decoder::new(data, options.compile_regex);
    let doc = decoder.read_document()?;
    trace!(len = data.len(), fields = doc.len(), "document deserialized");
    Ok(doc)
}

/// BSON 解码器
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    compile_regex: bool,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8], compile_regex: bool) -> Self {
        Self {
            data,
            pos: 0,
            compile_regex,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// 读取当前位置的一个长度前缀文档
    pub fn read_document(&mut self) -> BsonResult<Document> {
        let end = self.enter_document()?;
        let doc = self.read_elements(end - 1)?;
        self.finish_document(end)?;
        Ok(doc)
    }

    /// 读取元素直到 `limit`(不含结尾 NUL)
    fn read_elements(&mut self, limit: usize) -> BsonResult<Document> {
        let mut doc = Document::new();
        while self.pos < limit {
            let tag = self.read_u8()?;
            let key = self.read_key()?;
            let value = self.read_value(tag)?;
            doc.insert(key, value);
        }
        Ok(doc)
    }

    /// 按类型标记读取一个值
    ///
    /// # Arguments
    /// * `tag` - 元素类型标记
    ///
    /// # Returns
    /// 解码出的值;未知标记返回 `UnknownElementType`
    pub fn read_value(&mut self, tag: u8) -> BsonResult<Bson> {
        let element_type = ElementType::from_u8(tag).ok_or(BsonError::UnknownElementType(tag))?;
        let value = match element_type {
            ElementType::Double => Bson::Double(f64::from_le_bytes(self.read_bytes::<8>()?)),
            ElementType::String | ElementType::JavaScriptCode => Bson::String(self.read_string()?),
            ElementType::EmbeddedDocument => self.read_embedded()?,
            ElementType::Array => Bson::Array(self.read_array()?),
            ElementType::Binary => Bson::Binary(self.read_binary()?),
            ElementType::Undefined | ElementType::Null => Bson::Null,
            ElementType::ObjectId => Bson::ObjectId(ObjectId::from_bytes(self.read_bytes::<12>()?)),
            ElementType::Boolean => Bson::Boolean(self.read_u8()? != 0),
            ElementType::DateTime => Bson::DateTime(UtcDateTime::from_millis(self.read_i64()?)),
            ElementType::Regex => self.read_regex()?,
            ElementType::DbPointer => {
                let namespace = self.read_string()?;
                let id = ObjectId::from_bytes(self.read_bytes::<12>()?);
                Bson::DbPointer(DbPointer::new(namespace, id))
            }
            ElementType::Symbol => {
                let text = self.read_string()?;
                let symbol = text.as_str().map(CompactString::from).unwrap_or_default();
                Bson::Symbol(symbol)
            }
            ElementType::JavaScriptCodeWithScope => Bson::Code(self.read_code()?),
            ElementType::Int32 => Bson::Integer(i32::from_le_bytes(self.read_bytes::<4>()?).into()),
            ElementType::Timestamp => {
                let increment = self.read_u32()?;
                let seconds = self.read_u32()?;
                Bson::Timestamp(Timestamp::new(seconds, increment))
            }
            ElementType::Int64 => Bson::Integer(self.read_i64()?.into()),
            ElementType::MinKey => Bson::MinKey,
            ElementType::MaxKey => Bson::MaxKey,
        };
        Ok(value)
    }

    fn read_embedded(&mut self) -> BsonResult<Bson> {
        let start = self.pos;
        let end = self.enter_document()?;
        let is_ref = self
            .data
            .get(start + 4..end - 1)
            .map_or(false, |body| body.starts_with(REF_ELEMENT_HEADER));
        if !is_ref {
            let doc = self.read_elements(end - 1)?;
            self.finish_document(end)?;
            return Ok(Bson::Document(doc));
        }

        self.pos += REF_ELEMENT_HEADER.len();
        let namespace = self.read_string()?;
        if self.pos >= end - 1 {
            return Err(BsonError::InvalidDocument(
                "reference document has no $id element".to_string(),
            ));
        }
        let tag = self.read_u8()?;
        self.read_key()?;
        let id = self.read_value(tag)?;
        if self.pos > end - 1 {
            return Err(BsonError::InvalidDocument(
                "reference element overruns its document".to_string(),
            ));
        }
        // $id 之后的多余字段照常解析校验,结果丢弃
        self.read_elements(end - 1)?;
        self.finish_document(end)?;
        Ok(Bson::DbRef(DbRef::new(namespace, id)))
    }

    fn read_array(&mut self) -> BsonResult<Vec<Bson>> {
        let end = self.enter_document()?;
        let mut items = Vec::new();
        while self.pos < end - 1 {
            let tag = self.read_u8()?;
            self.read_cstring()?;
            items.push(self.read_value(tag)?);
        }
        self.finish_document(end)?;
        Ok(items)
    }

    fn read_binary(&mut self) -> BsonResult<Binary> {
        let len = self.read_length()?;
        let subtype = self.read_u8()?;
        let len = if subtype == BINARY_SUBTYPE_OLD {
            let inner = self.read_length()?;
            if inner.checked_add(4) != Some(len) {
                return Err(BsonError::InvalidDocument(format!(
                    "binary length {} inconsistent with inner length {}",
                    len, inner
                )));
            }
            inner
        } else {
            len
        };
        let bytes = self.take(len)?.to_vec();
        Ok(Binary { subtype, bytes })
    }

    fn read_regex(&mut self) -> BsonResult<Bson> {
        let pattern = Text::from_bytes(self.read_cstring()?);
        let options = std::str::from_utf8(self.read_cstring()?).map_err(|_| {
            BsonError::InvalidStringEncoding("regex options not valid UTF-8".to_string())
        })?;
        let regex = Regex::new(pattern, options);
        if self.compile_regex {
            if let Some(native) = regex.try_compile() {
                return Ok(Bson::NativeRegex(native));
            }
        }
        Ok(Bson::Regex(regex))
    }

    fn read_code(&mut self) -> BsonResult<Code> {
        let start = self.pos;
        let total = self.read_length()?;
        let code = self.read_string()?;
        let scope = self.read_document()?;
        if start.checked_add(total) != Some(self.pos) {
            return Err(BsonError::InvalidDocument(format!(
                "code with scope length {} does not match its contents",
                total
            )));
        }
        Ok(Code::with_scope(code, scope))
    }

    /// 长度前缀 + 字节 + NUL,内容须为合法 UTF-8
    fn read_string(&mut self) -> BsonResult<Text> {
        let len = self.read_length()?;
        if len == 0 {
            return Err(BsonError::InvalidDocument("string length must be at least 1".to_string()));
        }
        let bytes = self.take(len)?;
        let (content, terminator) = bytes.split_at(len - 1);
        if terminator != [0] {
            return Err(BsonError::InvalidDocument("string not terminated by NUL".to_string()));
        }
        if utf8::validate(content, true) != Utf8Status::Valid {
            return Err(BsonError::InvalidStringEncoding("String not valid UTF-8".to_string()));
        }
        Ok(Text::from_bytes(content))
    }

    fn read_key(&mut self) -> BsonResult<Text> {
        let name = self.read_cstring()?;
        if utf8::validate(name, true) != Utf8Status::Valid {
            return Err(BsonError::InvalidStringEncoding("Key name not valid UTF-8".to_string()));
        }
        Ok(Text::from_bytes(name))
    }

    /// 读取长度前缀,返回文档结束位置(不含)
    fn enter_document(&mut self) -> BsonResult<usize> {
        let start = self.pos;
        let declared = self.read_i32()?;
        let len = usize::try_from(declared)
            .ok()
            .filter(|len| *len >= MIN_DOCUMENT_SIZE)
            .ok_or_else(|| BsonError::InvalidDocument(format!("invalid document length {}", declared)))?;
        start
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(BsonError::UnexpectedEof)
    }

    fn finish_document(&mut self, end: usize) -> BsonResult<()> {
        if self.pos != end - 1 {
            return Err(BsonError::InvalidDocument(
                "document elements do not match the declared length".to_string(),
            ));
        }
        if self.data.get(end - 1) != Some(&0) {
            return Err(BsonError::InvalidDocument("document not terminated by NUL".to_string()));
        }
        self.pos = end;
        Ok(())
    }

    fn take(&mut self, n: usize) -> BsonResult<&'a [u8]> {
        let data = self.data;
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= data.len())
            .ok_or(BsonError::UnexpectedEof)?;
        let bytes = &data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_cstring(&mut self) -> BsonResult<&'a [u8]> {
        let data = self.data;
        let rest = data.get(self.pos..).ok_or(BsonError::UnexpectedEof)?;
        let nul = rest.iter().position(|b| *b == 0).ok_or(BsonError::UnexpectedEof)?;
        self.pos += nul + 1;
        Ok(&rest[..nul])
    }

    fn read_bytes<const N: usize>(&mut self) -> BsonResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> BsonResult<u8> {
        Ok(self.read_bytes::<1>()?[0])
    }

    fn read_i32(&mut self) -> BsonResult<i32> {
        Ok(i32::from_le_bytes(self.read_bytes::<4>()?))
    }

    fn read_u32(&mut self) -> BsonResult<u32> {
        Ok(u32::from_le_bytes(self.read_bytes::<4>()?))
    }

    fn read_i64(&mut self) -> BsonResult<i64> {
        Ok(i64::from_le_bytes(self.read_bytes::<8>()?))
    }

    fn read_length(&mut self) -> BsonResult<usize> {
        let len = self.read_i32()?;
        usize::try_from(len)
            .map_err(|_| BsonError::InvalidDocument(format!("negative length {}", len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{serialize, EncodeOptions};
    use crate::regexp::RegexFlags;

    fn decode(bytes: &[u8]) -> BsonResult<Document> {
        deserialize(bytes, &DecodeOptions::default())
    }

    /// 手工拼装一个文档:长度前缀 + 元素 + NUL
    fn frame(elements: &[u8]) -> Vec<u8> {
        let len = (elements.len() + 5) as i32;
        let mut out = len.to_le_bytes().to_vec();
        out.extend_from_slice(elements);
        out.push(0);
        out
    }

    #[test]
    fn test_decode_int32() {
        let doc = decode(&[12, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0]).unwrap();
        assert_eq!(doc.get("a"), Some(&Bson::Integer(1)));
    }

    #[test]
    fn test_empty_document() {
        assert!(decode(&[5, 0, 0, 0, 0]).unwrap().is_empty());
    }

    #[test]
    fn test_plain_code_decodes_as_string() {
        let mut elements = vec![0x0D, b'c', 0];
        elements.extend_from_slice(&3i32.to_le_bytes());
        elements.extend_from_slice(b"f;\0");
        let doc = decode(&frame(&elements)).unwrap();
        assert_eq!(doc.get_str("c"), Some("f;"));
    }

    #[test]
    fn test_undefined_decodes_as_null() {
        let doc = decode(&frame(&[0x06, b'u', 0])).unwrap();
        assert_eq!(doc.get("u"), Some(&Bson::Null));
    }

    #[test]
    fn test_unknown_tag() {
        let err = decode(&frame(&[0x13, b'x', 0])).unwrap_err();
        assert!(matches!(err, BsonError::UnknownElementType(0x13)));
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(decode(&[5, 0, 0]), Err(BsonError::UnexpectedEof)));
        let mut bytes = frame(&[0x10, b'a', 0, 1, 0]);
        let len = bytes.len();
        bytes[len - 1] = 0;
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_declared_length_mismatch() {
        let mut bytes = frame(&[0x0A, b'n', 0]);
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(BsonError::InvalidDocument(_))));
    }

    #[test]
    fn test_missing_terminator() {
        let mut bytes = frame(&[0x0A, b'n', 0]);
        let last = bytes.len() - 1;
        bytes[last] = 1;
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_invalid_utf8_key() {
        let err = decode(&frame(&[0x0A, 0xFF, 0])).unwrap_err();
        assert!(matches!(err, BsonError::InvalidStringEncoding(_)));
    }

    #[test]
    fn test_invalid_utf8_string_value() {
        let mut elements = vec![0x02, b's', 0];
        elements.extend_from_slice(&2i32.to_le_bytes());
        elements.extend_from_slice(b"\xD9\0");
        let err = decode(&frame(&elements)).unwrap_err();
        assert!(matches!(err, BsonError::InvalidStringEncoding(_)));
    }

    #[test]
    fn test_ref_sniffing() {
        let mut inner = Document::new();
        inner.insert("$ref", "users");
        inner.insert("$id", 42);
        inner.insert("extra", true);
        let doc = crate::doc! { "owner" => inner };
        let bytes = serialize(&doc, &EncodeOptions::default()).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.get("owner"), Some(&Bson::DbRef(DbRef::new("users", 42))));
    }

    fn ref_elements() -> Vec<u8> {
        let mut elements = vec![0x02];
        elements.extend_from_slice(b"$ref\0");
        elements.extend_from_slice(&2i32.to_le_bytes());
        elements.extend_from_slice(b"a\0");
        elements.extend_from_slice(&[0x10, b'$', b'i', b'd', 0, 1, 0, 0, 0]);
        elements
    }

    fn embed(inner: &[u8]) -> Vec<u8> {
        let mut elements = vec![0x03, b'r', 0];
        elements.extend_from_slice(inner);
        frame(&elements)
    }

    #[test]
    fn test_ref_with_bad_terminator() {
        let intact = embed(&frame(&ref_elements()));
        assert_eq!(
            decode(&intact).unwrap().get("r"),
            Some(&Bson::DbRef(DbRef::new("a", 1)))
        );

        let mut inner = frame(&ref_elements());
        let last = inner.len() - 1;
        inner[last] = 0x07;
        let err = decode(&embed(&inner)).unwrap_err();
        assert!(matches!(err, BsonError::InvalidDocument(_)));
    }

    #[test]
    fn test_ref_with_trailing_garbage() {
        let mut elements = ref_elements();
        elements.extend_from_slice(&[0x13, b'z', 0]);
        let err = decode(&embed(&frame(&elements))).unwrap_err();
        assert!(matches!(err, BsonError::UnknownElementType(0x13)));
    }

    #[test]
    fn test_datetime_extremes_round_trip() {
        for millis in [i64::MAX, i64::MIN, 9_000_000_000_000_000, -1] {
            let mut elements = vec![0x09, b'd', 0];
            elements.extend_from_slice(&millis.to_le_bytes());
            let bytes = frame(&elements);
            let doc = decode(&bytes).unwrap();
            assert_eq!(doc.get("d"), Some(&Bson::DateTime(UtcDateTime::from_millis(millis))));
            let again = serialize(&doc, &EncodeOptions::default()).unwrap();
            assert_eq!(again.to_vec(), bytes);
        }
    }

    #[test]
    fn test_ref_not_first_key_is_document() {
        let mut inner = Document::new();
        inner.insert("a", 1);
        inner.insert("$ref", "users");
        let doc = crate::doc! { "x" => inner.clone() };
        let bytes = serialize(&doc, &EncodeOptions::default()).unwrap();
        assert_eq!(decode(&bytes).unwrap().get_document("x"), Some(&inner));
    }

    #[test]
    fn test_regex_compile_toggle() {
        let doc = crate::doc! { "r" => Regex::new("^ab+", "i") };
        let bytes = serialize(&doc, &EncodeOptions::default()).unwrap();

        match decode(&bytes).unwrap().get("r") {
            Some(Bson::NativeRegex(native)) => {
                assert!(native.as_regex().is_match("ABBB"));
                assert_eq!(native.flags(), RegexFlags::IGNORE_CASE);
            }
            other => panic!("expected native regex, got {:?}", other),
        }

        let portable = deserialize(&bytes, &DecodeOptions { compile_regex: false }).unwrap();
        assert_eq!(portable.get("r"), Some(&Bson::Regex(Regex::new("^ab+", "i"))));
    }

    #[test]
    fn test_regex_with_unsupported_flag_stays_portable() {
        let doc = crate::doc! { "r" => Regex::new("a", "lu") };
        let bytes = serialize(&doc, &EncodeOptions::default()).unwrap();
        assert!(matches!(decode(&bytes).unwrap().get("r"), Some(Bson::Regex(_))));
    }

    #[test]
    fn test_old_binary_round_trip() {
        let doc = crate::doc! { "b" => Binary::old(vec![1, 2, 3]) };
        let bytes = serialize(&doc, &EncodeOptions::default()).unwrap();
        assert_eq!(decode(&bytes).unwrap(), doc);
    }

    #[test]
    fn test_old_binary_inconsistent_lengths() {
        let mut elements = vec![0x05, b'b', 0];
        elements.extend_from_slice(&5i32.to_le_bytes());
        elements.push(BINARY_SUBTYPE_OLD);
        elements.extend_from_slice(&3i32.to_le_bytes());
        elements.push(9);
        let err = decode(&frame(&elements)).unwrap_err();
        assert!(matches!(err, BsonError::InvalidDocument(_)));
    }

    #[test]
    fn test_code_with_scope_round_trip() {
        let code = Code::with_scope("return x;", crate::doc! { "x" => 1 });
        let doc = crate::doc! { "c" => code };
        let bytes = serialize(&doc, &EncodeOptions::default()).unwrap();
        assert_eq!(decode(&bytes).unwrap(), doc);
    }

    #[test]
    fn test_negative_lengths_rejected() {
        let mut elements = vec![0x02, b's', 0];
        elements.extend_from_slice(&(-1i32).to_le_bytes());
        assert!(decode(&frame(&elements)).is_err());
    }
}
