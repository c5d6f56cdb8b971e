//! 正则表达式值
//!
//! 两种表示:
//! - [`Regex`]: 可移植形式,保存模式文本、标志位和附加的原始选项字符
//! - [`NativeRegex`]: 已编译的 `regex::Regex`,解码时按需生成
//!
//! 线上的选项字符串必须按字节升序排列。

use crate::value::Text;
use compact_str::CompactString;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// 正则标志位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegexFlags(u8);

impl RegexFlags {
    pub const IGNORE_CASE: Self = Self(0x01);
    pub const LOCALE_DEPENDENT: Self = Self(0x02);
    pub const MULTILINE: Self = Self(0x04);
    pub const DOTALL: Self = Self(0x08);
    pub const UNICODE: Self = Self(0x10);
    pub const EXTENDED: Self = Self(0x20);

    /// 输出顺序固定为 i, l, m, s, u, x
    const LETTERS: [(Self, u8); 6] = [
        (Self::IGNORE_CASE, b'i'),
        (Self::LOCALE_DEPENDENT, b'l'),
        (Self::MULTILINE, b'm'),
        (Self::DOTALL, b's'),
        (Self::UNICODE, b'u'),
        (Self::EXTENDED, b'x'),
    ];

    /// 原生 Regex 能表达的标志
    const NATIVE: Self = Self(0x01 | 0x04 | 0x08 | 0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 单个选项字符对应的标志
    pub fn from_letter(letter: char) -> Option<Self> {
        Self::LETTERS
            .iter()
            .find(|(_, l)| *l as char == letter)
            .map(|(flag, _)| *flag)
    }

    /// 按固定顺序输出选项字符
    pub fn letters(self) -> String {
        Self::LETTERS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, l)| *l as char)
            .collect()
    }
}

impl BitOr for RegexFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RegexFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// 可移植正则表达式
///
/// `extra_options` 保存无法映射到 [`RegexFlags`] 的选项字符,
/// 编码时原样追加,并与标志字符一起按字节排序。
#[derive(Debug, Clone, PartialEq)]
pub struct Regex {
    pub pattern: Text,
    pub flags: RegexFlags,
    pub extra_options: CompactString,
}

impl Regex {
    /// 从模式和选项字符串构造
    ///
    /// # Arguments
    /// * `pattern` - 正则模式
    /// * `options` - 选项字符串,如 "imx";未知字符进入 `extra_options`
    pub fn new(pattern: impl Into<Text>, options: &str) -> Self {
        let mut flags = RegexFlags::empty();
        let mut extra_options = CompactString::default();
        for c in options.chars() {
            match RegexFlags::from_letter(c) {
                Some(flag) => flags.insert(flag),
                None => extra_options.push(c),
            }
        }
        Self {
            pattern: pattern.into(),
            flags,
            extra_options,
        }
    }

    pub fn with_flags(pattern: impl Into<Text>, flags: RegexFlags) -> Self {
        Self {
            pattern: pattern.into(),
            flags,
            extra_options: CompactString::default(),
        }
    }

    /// 线上的选项字符串(已按字节排序)
    pub fn options(&self) -> Vec<u8> {
        let mut options = self.flags.letters().into_bytes();
        options.extend_from_slice(self.extra_options.as_bytes());
        options.sort_unstable();
        options
    }

    /// 尝试编译为原生正则
    ///
    /// # Brief
    /// 仅当所有选项都能由 `regex::Regex` 表达且模式可编译时成功;
    /// 否则返回 None,调用方保留可移植形式,避免丢失信息
    ///
    /// # Returns
    /// 编译成功返回 `Some(NativeRegex)`
    pub fn try_compile(&self) -> Option<NativeRegex> {
        if !self.extra_options.is_empty() {
            return None;
        }
        if !RegexFlags::NATIVE.contains(self.flags) {
            return None;
        }
        let pattern = self.pattern.as_str()?;
        NativeRegex::new(pattern, self.flags).ok()
    }
}

impl fmt::Display for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}",
            self.pattern,
            String::from_utf8_lossy(&self.options())
        )
    }
}

/// 已编译的原生正则
#[derive(Debug, Clone)]
pub struct NativeRegex {
    regex: regex::Regex,
    flags: RegexFlags,
}

impl NativeRegex {
    /// 编译原生正则
    ///
    /// `flags` 中 i/m/s/x 之外的标志会被忽略。
    pub fn new(pattern: &str, flags: RegexFlags) -> Result<Self, regex::Error> {
        let flags = RegexFlags(flags.0 & RegexFlags::NATIVE.0);
        let regex = regex::RegexBuilder::new(pattern)
            .case_insensitive(flags.contains(RegexFlags::IGNORE_CASE))
            .multi_line(flags.contains(RegexFlags::MULTILINE))
            .dot_matches_new_line(flags.contains(RegexFlags::DOTALL))
            .ignore_whitespace(flags.contains(RegexFlags::EXTENDED))
            .build()?;
        Ok(Self { regex, flags })
    }

    pub fn as_regex(&self) -> &regex::Regex {
        &self.regex
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn flags(&self) -> RegexFlags {
        self.flags
    }

    /// 线上的选项字符串
    pub fn options(&self) -> Vec<u8> {
        let mut options = self.flags.letters().into_bytes();
        options.sort_unstable();
        options
    }

    pub fn to_portable(&self) -> Regex {
        Regex::with_flags(self.pattern(), self.flags)
    }
}

impl PartialEq for NativeRegex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern() == other.pattern() && self.flags == other.flags
    }
}

impl fmt::Display for NativeRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.pattern(), self.flags.letters())
    }
}
