//! 求解上下文
//!
//! 一次求解独占的暂存空间，按命名空间保存中间产物：
//! 下载的文件、解析出的表格、中间结果、图片 / 音频。
//! 求解结束即丢弃，不会跨测验共享。

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::error::{QuizError, Result};
use crate::services::data_tools::Table;

/// 解码后的媒体
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// 求解上下文
#[derive(Debug, Default)]
pub struct ExecutionContext {
    files: HashMap<String, Vec<u8>>,
    tables: HashMap<String, Table>,
    results: HashMap<String, JsonValue>,
    media: HashMap<String, MediaAsset>,
}

fn missing(kind: &str, key: &str) -> QuizError {
    QuizError::data_processing(format!("{} '{}' 不存在", kind, key)).with_context("key", key)
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_file(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(key.into(), bytes);
    }

    pub fn file(&self, key: &str) -> Result<&[u8]> {
        self.files
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| missing("文件", key))
    }

    pub fn put_table(&mut self, key: impl Into<String>, table: Table) {
        self.tables.insert(key.into(), table);
    }

    pub fn table(&self, key: &str) -> Result<&Table> {
        self.tables.get(key).ok_or_else(|| missing("表格", key))
    }

    pub fn put_result(&mut self, key: impl Into<String>, value: JsonValue) {
        self.results.insert(key.into(), value);
    }

    pub fn result(&self, key: &str) -> Option<&JsonValue> {
        self.results.get(key)
    }

    pub fn put_media(&mut self, key: impl Into<String>, asset: MediaAsset) {
        self.media.insert(key.into(), asset);
    }

    pub fn media(&self, key: &str) -> Result<&MediaAsset> {
        self.media.get(key).ok_or_else(|| missing("媒体", key))
    }

    /// 各命名空间的条目数（文件、表格、结果、媒体）
    pub fn sizes(&self) -> (usize, usize, usize, usize) {
        (
            self.files.len(),
            self.tables.len(),
            self.results.len(),
            self.media.len(),
        )
    }
}
