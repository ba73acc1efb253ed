//! 答案提交相关的数据结构

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 提交者身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub secret: String,
}

impl Identity {
    pub fn new(email: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            secret: secret.into(),
        }
    }
}

/// 提交请求体
#[derive(Debug, Clone, Serialize)]
pub struct SubmitPayload<'a> {
    pub email: &'a str,
    pub secret: &'a str,
    pub url: &'a str,
    pub answer: &'a JsonValue,
}

/// 远端返回的原始判定
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub correct: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// 提交结果，编排层唯一的分支依据
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub correct: bool,
    pub reason: Option<String>,
    pub next_url: Option<Url>,
}
