//! 内存日志读取器
//!
//! 提供预先构造的记录列表，用于测试和合成日志。
//! 可在指定条数之后模拟读取失败。

use std::collections::VecDeque;

use contracts::{LogReader, LogRecord, PlaybackError};

/// 内存日志读取器
#[derive(Debug)]
pub struct MemoryLogReader {
    name: String,
    records: VecDeque<LogRecord>,
    current: Option<LogRecord>,
    served: usize,
    fail_after: Option<usize>,
}

impl MemoryLogReader {
    pub fn new(name: impl Into<String>, records: impl IntoIterator<Item = LogRecord>) -> Self {
        let mut records: VecDeque<LogRecord> = records.into_iter().collect();
        let current = records.pop_front();
        Self {
            name: name.into(),
            served: usize::from(current.is_some()),
            records,
            current,
            fail_after: None,
        }
    }

    /// 读取第 `n + 1` 条记录时返回失败
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// 尚未读取的记录数
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl LogReader for MemoryLogReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_more(&self) -> bool {
        self.current.is_some()
    }

    fn advance(&mut self) -> Result<(), PlaybackError> {
        if let Some(limit) = self.fail_after {
            if self.served >= limit && !self.records.is_empty() {
                self.current = None;
                self.records.clear();
                return Err(PlaybackError::source_unavailable(
                    self.name.as_str(),
                    format!("simulated read failure after {limit} records"),
                ));
            }
        }

        self.current = self.records.pop_front();
        if self.current.is_some() {
            self.served += 1;
        }
        Ok(())
    }

    fn current(&self) -> Option<&LogRecord> {
        self.current.as_ref()
    }
}
