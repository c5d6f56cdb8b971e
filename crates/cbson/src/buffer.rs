//! 可增长写缓冲区
//!
//! 只追加的字节缓冲区,支持"先预留、后回填"写入:
//! 长度前缀在写完子结构之前无法确定,先用 `save_space` 占位,
//! 写完后再用 `write_at` 回填。
//!
//! 缓冲区本身不做任何校验,`max_size` 仅供文档写入器查询。

use crate::spec::DEFAULT_MAX_DOCUMENT_SIZE;
use crate::{BsonError, BsonResult};
use bytes::Bytes;

const INITIAL_CAPACITY: usize = 256;

/// 预留空间的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position(usize);

impl Position {
    pub fn offset(self) -> usize {
        self.0
    }
}

/// 编码缓冲区
///
/// 容量按倍增策略扩展;扩容失败返回 `BsonError::OutOfMemory`,
/// 调用方丢弃整个缓冲区。
#[derive(Debug)]
pub struct BsonBuffer {
    data: Vec<u8>,
    max_size: usize,
}

impl BsonBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            max_size: DEFAULT_MAX_DOCUMENT_SIZE,
        }
    }

    /// 追加字节并前移写入位置
    pub fn write(&mut self, bytes: &[u8]) -> BsonResult<()> {
        self.grow_for(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// 预留 `n` 个零字节
    ///
    /// # Brief
    /// 在当前位置预留空间,返回该位置以便之后回填
    ///
    /// # Arguments
    /// * `n` - 预留字节数
    ///
    /// # Returns
    /// 预留区域的起始位置
    pub fn save_space(&mut self, n: usize) -> BsonResult<Position> {
        let position = Position(self.data.len());
        self.grow_for(n)?;
        self.data.resize(self.data.len() + n, 0);
        Ok(position)
    }

    /// 覆盖已写入区域,不改变写入位置
    pub fn write_at(&mut self, position: Position, bytes: &[u8]) -> BsonResult<()> {
        let end = position
            .0
            .checked_add(bytes.len())
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                BsonError::InvalidDocument(format!(
                    "invalid write at position {} in buffer of {} bytes",
                    position.0,
                    self.data.len()
                ))
            })?;
        self.data[position.0..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.data.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// 转换为不可变的输出字节串
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }

    fn grow_for(&mut self, additional: usize) -> BsonResult<()> {
        let needed = self
            .data
            .len()
            .checked_add(additional)
            .ok_or(BsonError::OutOfMemory { requested: usize::MAX })?;
        if needed <= self.data.capacity() {
            return Ok(());
        }
        let target = needed
            .max(self.data.capacity().saturating_mul(2))
            .max(INITIAL_CAPACITY);
        self.data
            .try_reserve_exact(target - self.data.len())
            .map_err(|_| BsonError::OutOfMemory { requested: target })
    }
}

impl Default for BsonBuffer {
    fn default() -> Self {
        Self::new()
    }
}
