//! 编解码配置模块
//!
//! 定义 cbson 的可配置项,支持从 TOML 文件加载:
//!
//! ```toml
//! max_document_size = 16777216
//! check_keys = true
//! move_id = true
//! compile_regex = false
//! ```

use crate::error::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 默认文档体积上限 (4 MiB)
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 4 * 1024 * 1024;

/// 编解码配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// 单个文档序列化后的最大字节数 (默认: 4 MiB)
    #[serde(default = "default_max_document_size")]
    pub max_document_size: usize,

    /// 是否校验键名 (`$` 开头或包含 `.` 视为非法)
    #[serde(default)]
    pub check_keys: bool,

    /// 是否把 `_id` 字段提前到文档首位
    #[serde(default)]
    pub move_id: bool,

    /// 解码时是否把正则编译为原生 Regex (默认: true)
    #[serde(default = "default_compile_regex")]
    pub compile_regex: bool,
}

fn default_max_document_size() -> usize {
    DEFAULT_MAX_DOCUMENT_SIZE
}

fn default_compile_regex() -> bool {
    true
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_document_size: default_max_document_size(),
            check_keys: false,
            move_id: false,
            compile_regex: default_compile_regex(),
        }
    }
}

impl CodecConfig {
    /// # Brief
    /// 从 TOML 字符串解析配置
    ///
    /// # Arguments
    /// * `content` - TOML 文本
    ///
    /// # Returns
    /// 解析后的配置实例
    pub fn from_toml_str(content: &str) -> CommonResult<Self> {
        toml::from_str(content)
            .map_err(|e| CommonError::Config(format!("Failed to parse config: {}", e)))
    }

    /// # Brief
    /// 从 TOML 文件加载配置
    ///
    /// # Arguments
    /// * `path` - 配置文件路径
    ///
    /// # Returns
    /// 解析后的配置实例
    pub fn from_file(path: &Path) -> CommonResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> CommonResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CommonError::Config(format!("Failed to serialize config: {}", e)))
    }
}
