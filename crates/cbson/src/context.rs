//! 编解码上下文
//!
//! 持有进程级状态:文档大小上限和 ObjectId 生成器。
//! 上限是原子整数,每次编码开始时读取一次;可以跨线程共享同一个上下文。

use crate::decoder::{self, DecodeOptions};
use crate::document::Document;
use crate::encoder::{self, EncodeOptions};
use crate::BsonResult;
use bytes::Bytes;
use cbson_common::{CodecConfig, ObjectId, ObjectIdGenerator};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// 编解码上下文
#[derive(Debug)]
pub struct CodecContext {
    max_document_size: AtomicUsize,
    check_keys: bool,
    move_id: bool,
    compile_regex: bool,
    ids: ObjectIdGenerator,
}

impl CodecContext {
    /// 使用默认配置和当前主机指纹创建上下文
    pub fn new() -> Self {
        Self::from_config(&CodecConfig::default())
    }

    /// # Brief
    /// 从配置创建上下文
    ///
    /// # Arguments
    /// * `config` - 编解码配置
    ///
    /// # Returns
    /// 新的上下文
    pub fn from_config(config: &CodecConfig) -> Self {
        Self::with_generator(config, ObjectIdGenerator::new())
    }

    /// 使用指定的 ObjectId 生成器创建上下文
    pub fn with_generator(config: &CodecConfig, ids: ObjectIdGenerator) -> Self {
        Self {
            max_document_size: AtomicUsize::new(config.max_document_size),
            check_keys: config.check_keys,
            move_id: config.move_id,
            compile_regex: config.compile_regex,
            ids,
        }
    }

    pub fn max_document_size(&self) -> usize {
        self.max_document_size.load(Ordering::Relaxed)
    }

    /// 更新文档大小上限,返回新值
    pub fn update_max_document_size(&self, max_size: usize) -> usize {
        let previous = self.max_document_size.swap(max_size, Ordering::Relaxed);
        debug!(previous, current = max_size, "max document size updated");
        max_size
    }

    /// 当前配置的快照
    pub fn config(&self) -> CodecConfig {
        CodecConfig {
            max_document_size: self.max_document_size(),
            check_keys: self.check_keys,
            move_id: self.move_id,
            compile_regex: self.compile_regex,
        }
    }

    /// 以配置中的键检查和 `_id` 提前设置构造编码选项
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            check_keys: self.check_keys,
            move_id: self.move_id,
            max_size: self.max_document_size(),
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            compile_regex: self.compile_regex,
        }
    }

    /// # Brief
    /// 使用上下文的大小上限序列化文档
    ///
    /// # Arguments
    /// * `doc` - 要编码的文档
    /// * `check_keys` - 是否检查键名
    /// * `move_id` - 是否把 `_id` 提到最前
    ///
    /// # Returns
    /// 编码后的字节串
    pub fn serialize(&self, doc: &Document, check_keys: bool, move_id: bool) -> BsonResult<Bytes> {
        let options = EncodeOptions {
            check_keys,
            move_id,
            max_size: self.max_document_size(),
        };
        encoder::serialize(doc, &options)
    }

    pub fn deserialize(&self, data: &[u8]) -> BsonResult<Document> {
        decoder::deserialize(data, &self.decode_options())
    }

    /// 生成新的 ObjectId;`seconds` 为 None 时使用当前时间
    pub fn generate_object_id(&self, seconds: Option<u32>) -> ObjectId {
        self.ids.generate(seconds)
    }
}

impl Default for CodecContext {
    fn default() -> Self {
        Self::new()
    }
}
