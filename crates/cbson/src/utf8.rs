//! 严格 UTF-8 校验
//!
//! 单次前向扫描,按 UTF-8 语法解码 1~4 字节序列:拒绝非法首字节、
//! 错误的续字节、过长编码、代理区码点以及超过 U+10FFFF 的码点。
//! 键名和正则模式不允许出现 NUL,由 `allow_null` 控制。

/// 校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8Status {
    Valid,
    HasNull,
    Invalid,
}

/// 校验字节串
///
/// # Arguments
/// * `bytes` - 待校验的字节
/// * `allow_null` - 是否允许 NUL 字节
///
/// # Returns
/// 扫描中遇到的第一个问题;没有问题时返回 `Utf8Status::Valid`
pub fn validate(bytes: &[u8], allow_null: bool) -> Utf8Status {
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        if lead < 0x80 {
            if lead == 0 && !allow_null {
                return Utf8Status::HasNull;
            }
            i += 1;
            continue;
        }

        let width = match lead {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return Utf8Status::Invalid,
        };
        if i + width > bytes.len() {
            return Utf8Status::Invalid;
        }

        // 第二个字节的合法范围取决于首字节,以排除过长编码和代理区
        let second = bytes[i + 1];
        let second_ok = match lead {
            0xE0 => (0xA0..=0xBF).contains(&second),
            0xED => (0x80..=0x9F).contains(&second),
            0xF0 => (0x90..=0xBF).contains(&second),
            0xF4 => (0x80..=0x8F).contains(&second),
            _ => (0x80..=0xBF).contains(&second),
        };
        if !second_ok {
            return Utf8Status::Invalid;
        }
        if bytes[i + 2..i + width].iter().any(|b| b & 0xC0 != 0x80) {
            return Utf8Status::Invalid;
        }
        i += width;
    }
    Utf8Status::Valid
}
