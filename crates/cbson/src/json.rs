//! 扩展 JSON 输出模块
//!
//! 把解码得到的值渲染成扩展 JSON,用于调试和 `Display`。
//! JSON 无法直接表达的类型使用 `$` 前缀的包装对象。只输出,不解析。

use crate::document::Document;
use crate::value::Bson;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Number, Value as JsonValue};

/// 将 Bson 值转换为扩展 JSON
///
/// # Brief
/// 标量直接映射到 JSON,其余类型使用扩展 JSON 包装
///
/// # 扩展 JSON 格式
/// - ObjectId: `{"$oid": "507f1f77bcf86cd799439011"}`
/// - DateTime: `{"$date": 1234567890000}`
/// - Binary: `{"$binary": "base64_string", "$type": "00"}`
/// - Regex: `{"$regex": "pattern", "$options": "i"}`
/// - Code: `{"$code": "...", "$scope": {...}}`
/// - 引用: `{"$ref": "collection", "$id": ...}`
/// - Timestamp: `{"$timestamp": {"t": 秒, "i": 序号}}`
/// - 超出 i64 的整数: `{"$numberLong": "..."}`
///
/// # Arguments
/// * `value` - 要转换的值
///
/// # Returns
/// JSON 值;非法 UTF-8 文本按有损方式转换
pub fn to_extended_json(value: &Bson) -> JsonValue {
    match value {
        Bson::Null => JsonValue::Null,
        Bson::Boolean(b) => JsonValue::Bool(*b),
        Bson::Integer(n) => match i64::try_from(*n) {
            Ok(n) => json!(n),
            Err(_) => json!({ "$numberLong": n.to_string() }),
        },
        Bson::Double(f) => match Number::from_f64(*f) {
            Some(n) => JsonValue::Number(n),
            None => json!(f.to_string()),
        },
        Bson::String(s) => JsonValue::String(s.to_string_lossy().into_owned()),
        Bson::Symbol(s) => json!({ "$symbol": s.as_str() }),
        Bson::Document(doc) => document_to_json(doc),
        Bson::Array(items) => JsonValue::Array(items.iter().map(to_extended_json).collect()),
        Bson::Binary(binary) => json!({
            "$binary": STANDARD.encode(&binary.bytes),
            "$type": format!("{:02x}", binary.subtype),
        }),
        Bson::ObjectId(oid) => json!({ "$oid": oid.to_hex() }),
        Bson::DateTime(dt) => json!({ "$date": dt.timestamp_millis() }),
        Bson::Regex(regex) => json!({
            "$regex": regex.pattern.to_string_lossy(),
            "$options": String::from_utf8_lossy(&regex.options()),
        }),
        Bson::NativeRegex(regex) => json!({
            "$regex": regex.pattern(),
            "$options": String::from_utf8_lossy(&regex.options()),
        }),
        Bson::Code(code) => json!({
            "$code": code.code.to_string_lossy(),
            "$scope": document_to_json(&code.scope),
        }),
        Bson::DbRef(dbref) => json!({
            "$ref": dbref.namespace.to_string_lossy(),
            "$id": to_extended_json(&dbref.id),
        }),
        Bson::DbPointer(pointer) => json!({
            "$dbPointer": {
                "$ref": pointer.namespace.to_string_lossy(),
                "$id": { "$oid": pointer.id.to_hex() },
            }
        }),
        Bson::Timestamp(ts) => json!({
            "$timestamp": { "t": ts.seconds, "i": ts.increment }
        }),
        Bson::MinKey => json!({ "$minKey": 1 }),
        Bson::MaxKey => json!({ "$maxKey": 1 }),
        // 以下类型没有线格式,仅用于显示
        Bson::Decimal(d) => json!({ "$numberDecimal": d.to_string() }),
        Bson::Date(d) => json!({ "$date": d.to_string() }),
        Bson::ZonedDateTime(dt) => json!({ "$date": dt.to_rfc3339() }),
    }
}

/// 将文档转换为 JSON 对象,符号键使用其名字
pub fn document_to_json(doc: &Document) -> JsonValue {
    let mut object = Map::new();
    for (key, value) in doc {
        object.insert(
            String::from_utf8_lossy(key.name()).into_owned(),
            to_extended_json(value),
        );
    }
    JsonValue::Object(object)
}
