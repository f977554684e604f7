//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::PlaybackError;
use serde::de::DeserializeOwned;

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// 猜测内联文本的格式 (参数存储中的值)
    pub fn sniff(content: &str) -> Self {
        match content.trim_start().chars().next() {
            Some('{') => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T, PlaybackError> {
    toml::from_str(content).map_err(|e| PlaybackError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T, PlaybackError> {
    serde_json::from_str(content).map_err(|e| PlaybackError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T, PlaybackError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}
