//! 任务定义

use std::fmt;

use reqwest::Url;
use serde_json::{Map, Value as JsonValue};

/// 答案的形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerShape {
    Boolean,
    Number,
    String,
    /// 图片等二进制内容，以 base64 data URI 提交
    BinaryBlob,
    /// JSON 对象
    Structured,
}

impl AnswerShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerShape::Boolean => "boolean",
            AnswerShape::Number => "number",
            AnswerShape::String => "string",
            AnswerShape::BinaryBlob => "base64",
            AnswerShape::Structured => "json",
        }
    }
}

impl fmt::Display for AnswerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 从测验页面解析出的任务
///
/// 解析完成后不再修改；`submit_endpoint` 一定是合法的绝对 URL。
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    /// 解码后的任务说明
    pub instructions: String,
    /// 答案提交地址
    pub submit_endpoint: Url,
    /// 要求的答案形态
    pub answer_shape: AnswerShape,
    /// 任务引用的文件 URL（按首次出现顺序去重）
    pub file_urls: Vec<Url>,
    /// 额外上下文
    pub extra: Map<String, JsonValue>,
}

impl TaskDefinition {
    /// 是否是文档 / 演示页
    pub fn is_demo(&self) -> bool {
        self.extra
            .get("is_demo")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}
