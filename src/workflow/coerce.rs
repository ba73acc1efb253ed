//! 答案形态转换
//!
//! 把模型的最终文本转换成任务要求的答案形态。转换失败时退回原始文本，
//! 不会报错：格式不完美的答案仍然可以提交给远端判分。

use regex::Regex;
use serde_json::{Number, Value as JsonValue};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::AnswerShape;
use crate::workflow::context::ExecutionContext;

/// 答案转换器
pub struct AnswerCoercer {
    number: Regex,
    fenced_object: Regex,
    bare_object: Regex,
}

impl AnswerCoercer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            number: Regex::new(r"-?\d+\.?\d*")?,
            fenced_object: Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")?,
            bare_object: Regex::new(r"(?s)\{.*\}")?,
        })
    }

    /// 按答案形态转换
    ///
    /// # 参数
    /// - `raw`: 模型给出的最终文本
    /// - `shape`: 要求的答案形态
    /// - `ctx`: 求解上下文，`BinaryBlob` 形态会把文本当作结果键查找
    pub fn coerce(&self, raw: &str, shape: AnswerShape, ctx: &ExecutionContext) -> JsonValue {
        let content = raw.trim();
        debug!("转换答案为 {}", shape);

        let coerced = match shape {
            AnswerShape::Boolean => self.boolean(content),
            AnswerShape::Number => self.number(content),
            AnswerShape::String => Some(string(content)),
            AnswerShape::BinaryBlob => Some(
                ctx.result(content)
                    .cloned()
                    .unwrap_or_else(|| JsonValue::String(content.to_string())),
            ),
            AnswerShape::Structured => self.structured(content),
        };

        coerced.unwrap_or_else(|| {
            warn!("答案无法转换为 {}，按原文提交", shape);
            JsonValue::String(content.to_string())
        })
    }

    fn boolean(&self, content: &str) -> Option<JsonValue> {
        let lower = content.to_lowercase();
        if lower.contains("true") || lower.contains("yes") {
            return Some(JsonValue::Bool(true));
        }
        if lower.contains("false") || lower.contains("no") {
            return Some(JsonValue::Bool(false));
        }
        serde_json::from_str::<JsonValue>(content)
            .ok()
            .map(|v| JsonValue::Bool(truthy(&v)))
    }

    fn number(&self, content: &str) -> Option<JsonValue> {
        match self.number.find(content) {
            Some(found) => parse_number(found.as_str()),
            None => serde_json::from_str(content).ok(),
        }
    }

    fn structured(&self, content: &str) -> Option<JsonValue> {
        if let Ok(value) = serde_json::from_str(content) {
            return Some(value);
        }
        if let Some(inner) = self.fenced_object.captures(content).and_then(|c| c.get(1)) {
            return serde_json::from_str(inner.as_str()).ok();
        }
        self.bare_object
            .find(content)
            .and_then(|m| serde_json::from_str(m.as_str()).ok())
    }
}

fn string(content: &str) -> JsonValue {
    match serde_json::from_str::<JsonValue>(content) {
        Ok(JsonValue::String(inner)) => JsonValue::String(inner),
        _ => JsonValue::String(content.to_string()),
    }
}

/// 句末的点号不算小数点
fn parse_number(text: &str) -> Option<JsonValue> {
    let text = text.trim_end_matches('.');
    if !text.contains('.') {
        if let Ok(int) = text.parse::<i64>() {
            return Some(JsonValue::from(int));
        }
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(JsonValue::Number)
}

/// JSON 值的真假
fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}
