//! 公共类型定义模块
//!
//! 定义 cbson 的核心标识类型:
//! - ObjectId: 12 字节唯一标识符
//! - ObjectIdGenerator: 进程级 ObjectId 生成器(机器指纹 + 进程号 + 计数器)

use crate::error::{CommonError, CommonResult};
use crate::platform::Fingerprint;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// ObjectId 十六进制文本表示的长度
pub const OBJECT_ID_HEX_LEN: usize = 24;

/// ObjectId - 12 字节唯一标识符
///
/// 格式:
/// - 字节 0..4: 时间戳(秒,大端)
/// - 字节 4..7: 机器指纹(主机名哈希)
/// - 字节 7..9: 进程号(大端,截断为 16 位)
/// - 字节 9..12: 计数器(大端,低 24 位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// 读取嵌入的生成时间(秒)
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// 校验 ObjectId 文本表示是否合法
    ///
    /// # Brief
    /// 合法的文本恰好是 24 个十六进制字符,大小写均可
    ///
    /// # Arguments
    /// * `s` - 待校验的字符串
    ///
    /// # Returns
    /// 合法返回 true
    pub fn is_legal(s: &str) -> bool {
        s.len() == OBJECT_ID_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// 从 24 位十六进制字符串解析 ObjectId
    ///
    /// # Arguments
    /// * `s` - 十六进制字符串
    ///
    /// # Returns
    /// 成功返回 ObjectId,格式非法返回 `CommonError::InvalidObjectId`
    pub fn parse_str(s: &str) -> CommonResult<Self> {
        if !Self::is_legal(s) {
            return Err(CommonError::InvalidObjectId(format!(
                "illegal ObjectId format: {}",
                s
            )));
        }
        let mut arr = [0u8; 12];
        hex::decode_to_slice(s, &mut arr)
            .map_err(|e| CommonError::InvalidObjectId(format!("Invalid hex: {}", e)))?;
        Ok(Self(arr))
    }
}

impl FromStr for ObjectId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// ObjectId 生成器
///
/// 机器指纹和进程号在创建时计算一次;计数器为原子整数,
/// 同一进程内并发生成也不会得到相同的 ObjectId。
#[derive(Debug)]
pub struct ObjectIdGenerator {
    machine: [u8; 3],
    pid: u16,
    counter: AtomicU32,
}

impl ObjectIdGenerator {
    /// 使用当前主机与进程信息创建生成器
    pub fn new() -> Self {
        Self::with_fingerprint(Fingerprint::current())
    }

    pub fn with_fingerprint(fingerprint: Fingerprint) -> Self {
        Self {
            machine: fingerprint.machine,
            pid: fingerprint.pid,
            counter: AtomicU32::new(0),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            machine: self.machine,
            pid: self.pid,
        }
    }

    /// 生成新的 ObjectId
    ///
    /// # Brief
    /// 依次写入时间戳、机器指纹、进程号和计数器的低 3 字节
    ///
    /// # Arguments
    /// * `seconds` - 自定义时间戳(秒);为 None 时使用当前时间
    ///
    /// # Returns
    /// 新生成的 ObjectId
    pub fn generate(&self, seconds: Option<u32>) -> ObjectId {
        let seconds = seconds.unwrap_or_else(now_secs);
        let inc = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..7].copy_from_slice(&self.machine);
        bytes[7..9].copy_from_slice(&self.pid.to_be_bytes());
        bytes[9..12].copy_from_slice(&inc.to_be_bytes()[1..4]);
        ObjectId(bytes)
    }
}

impl Default for ObjectIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
