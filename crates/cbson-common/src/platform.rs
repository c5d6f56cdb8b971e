//! 平台信息模块
//!
//! 提供 ObjectId 生成所需的主机名与进程号。
//! Unix 平台通过 `gethostname(2)` 读取主机名,其余平台读取环境变量。

use tracing::warn;
use xxhash_rust::xxh3::xxh3_64;

/// 主机名获取失败时使用的回退值
pub const FALLBACK_HOSTNAME: &str = "localhost";

/// 进程指纹
///
/// 包含主机名哈希的前 3 字节和截断为 16 位的进程号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub machine: [u8; 3],
    pub pid: u16,
}

impl Fingerprint {
    /// 计算当前进程的指纹
    pub fn current() -> Self {
        Self {
            machine: machine_fingerprint(&hostname()),
            pid: std::process::id() as u16,
        }
    }
}

/// 计算主机名指纹
///
/// # Brief
/// 对主机名做 xxHash3-64,取大端摘要的前 3 字节
///
/// # Arguments
/// * `hostname` - 主机名
///
/// # Returns
/// 3 字节机器指纹
pub fn machine_fingerprint(hostname: &str) -> [u8; 3] {
    let digest = xxh3_64(hostname.as_bytes()).to_be_bytes();
    [digest[0], digest[1], digest[2]]
}

/// 读取主机名
///
/// 失败时依次尝试 `HOSTNAME`、`COMPUTERNAME` 环境变量,最后回退为 `localhost`。
pub fn hostname() -> String {
    if let Some(name) = system_hostname() {
        return name;
    }
    match std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")) {
        Ok(name) if !name.is_empty() => name,
        _ => {
            warn!("Failed to determine hostname, using {}", FALLBACK_HOSTNAME);
            FALLBACK_HOSTNAME.to_string()
        }
    }
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => name.into_string().ok().filter(|s| !s.is_empty()),
        Err(e) => {
            warn!("gethostname failed: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    None
}
