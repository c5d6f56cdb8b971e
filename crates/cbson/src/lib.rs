//! # cbson - BSON 线格式编解码器
//!
//! 在内存中的有序文档与 BSON 字节之间转换,并提供 ObjectId 的
//! 校验、解析与生成。
//!
//! - **严格校验**:键名、字符串和正则模式在写入时做 UTF-8 校验,
//!   键名和正则模式不允许 NUL
//! - **`_id` 处理**:可选地把 `_id` 提到文档首位;普通映射中
//!   重复的字符串/符号 `_id` 会被合并
//! - **大小上限**:每个文档编码后不超过可配置的上限 (默认 4 MiB)
//! - **安全解码**:所有读取都做边界检查,畸形输入返回错误
//!
//! ## 快速开始
//!
//! ```rust,ignore
//! use cbson::{doc, deserialize, serialize, DecodeOptions, EncodeOptions};
//!
//! let doc = doc! { "name" => "miku", "version" => 1 };
//! let bytes = serialize(&doc, &EncodeOptions::default()).unwrap();
//! let back = deserialize(&bytes, &DecodeOptions::default()).unwrap();
//! assert_eq!(back, doc);
//! ```

pub mod buffer;
pub mod context;
pub mod decoder;
pub mod document;
pub mod encoder;
pub mod json;
pub mod regexp;
pub mod spec;
pub mod utf8;
pub mod value;

pub use cbson_common::{CodecConfig, ObjectId, ObjectIdGenerator};
pub use context::CodecContext;
pub use decoder::{deserialize, DecodeOptions};
pub use document::{Document, DocumentKind, Key};
pub use encoder::{serialize, serialize_value, EncodeOptions};
pub use json::to_extended_json;
pub use regexp::{NativeRegex, Regex, RegexFlags};
pub use value::{Binary, Bson, Code, DbPointer, DbRef, Text, Timestamp, UtcDateTime};

use cbson_common::CommonError;
use thiserror::Error;

/// 编解码错误类型
#[derive(Error, Debug)]
pub enum BsonError {
    /// 缓冲区扩容失败
    #[error("Out of memory: failed to allocate {requested} bytes")]
    OutOfMemory { requested: usize },

    /// 整数超出 64 位范围
    #[error("integer {0} out of range: BSON can only handle 8-byte ints")]
    Range(i128),

    /// 非法键名
    #[error("Invalid key name: {0}")]
    InvalidKeyName(String),

    /// 非法 UTF-8
    #[error("Invalid string encoding: {0}")]
    InvalidStringEncoding(String),

    /// 文档格式无效或包含不支持的类型
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// 文档体积超出上限
    #[error("Document too large: This BSON document is limited to {max} bytes.")]
    DocumentTooLarge { max: usize },

    /// ObjectId 文本格式无效
    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    /// 未知的元素类型标记
    #[error("Unknown element type: {0:#04x}")]
    UnknownElementType(u8),

    /// 意外的输入结束
    #[error("Unexpected end of input")]
    UnexpectedEof,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfMemory,
    Range,
    InvalidKeyName,
    InvalidStringEncoding,
    InvalidDocument,
    InvalidObjectId,
    UnknownWireType,
}

impl BsonError {
    /// 错误所属类别;体积超限和输入截断都归入 `InvalidDocument`
    pub fn kind(&self) -> ErrorKind {
        match self {
            BsonError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            BsonError::Range(_) => ErrorKind::Range,
            BsonError::InvalidKeyName(_) => ErrorKind::InvalidKeyName,
            BsonError::InvalidStringEncoding(_) => ErrorKind::InvalidStringEncoding,
            BsonError::InvalidDocument(_)
            | BsonError::DocumentTooLarge { .. }
            | BsonError::UnexpectedEof => ErrorKind::InvalidDocument,
            BsonError::InvalidObjectId(_) => ErrorKind::InvalidObjectId,
            BsonError::UnknownElementType(_) => ErrorKind::UnknownWireType,
        }
    }
}

impl From<CommonError> for BsonError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::InvalidObjectId(s) => BsonError::InvalidObjectId(s),
            other => BsonError::InvalidDocument(other.to_string()),
        }
    }
}

/// 编解码 Result 类型别名
pub type BsonResult<T> = Result<T, BsonError>;

/// 解析 24 位十六进制 ObjectId 文本
pub fn parse_object_id(s: &str) -> BsonResult<ObjectId> {
    Ok(ObjectId::parse_str(s)?)
}

/// 初始化日志
///
/// # Brief
/// 安装 tracing 订阅者;日志级别读取 `RUST_LOG`,默认 info
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .try_init();
}
