//! 日志读取器，每种格式一个实现。

mod jsonl;
mod memory;

use std::path::Path;

use contracts::{LogReader, PlaybackError};

pub use jsonl::JsonlLogReader;
pub use memory::MemoryLogReader;

/// 支持的日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 每行一条 JSON 序列化的 `LogRecord`
    Jsonl,
}

impl LogFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jsonl" | "ndjson" => Some(Self::Jsonl),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// 按扩展名选择读取器并打开日志文件
///
/// # Errors
/// 扩展名不支持、文件缺失或格式错误时返回 `SourceUnavailable`。
pub fn open_log(path: &Path) -> Result<Box<dyn LogReader>, PlaybackError> {
    let format = LogFormat::from_path(path).ok_or_else(|| {
        PlaybackError::source_unavailable(path.display().to_string(), "unsupported log format")
    })?;

    match format {
        LogFormat::Jsonl => Ok(Box::new(JsonlLogReader::open(path)?)),
    }
}
