//! 集成测试共用的假协作者
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Url;
use serde_json::Value as JsonValue;

use quiz_chain_solver::infrastructure::{FileFetcher, PageRenderer, ReasoningService};
use quiz_chain_solver::models::{
    ChatMessage, Identity, ModelTurn, SubmissionOutcome, TaskDefinition, ToolDescriptor,
};
use quiz_chain_solver::{AnswerSubmission, OrchestratorSettings, QuizError, QuizSolver, Result};

pub fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

pub fn identity() -> Identity {
    Identity::new("student@example.com", "s3cret")
}

/// 把任务说明编码进一个最小的测验页面
pub fn quiz_page(instructions: &str) -> String {
    format!(
        "<html><body><h1>Quiz</h1><pre>{}</pre></body></html>",
        general_purpose::STANDARD.encode(instructions)
    )
}

pub fn settings(timeout: Duration, max_retries_per_quiz: u32) -> OrchestratorSettings {
    OrchestratorSettings {
        timeout,
        max_retries_per_quiz,
        skip_after_one_retry: Duration::from_secs(30),
        skip_after_two_retries: Duration::from_secs(60),
        render_timeout: Duration::from_secs(5),
        retry_pause: Duration::from_millis(5),
    }
}

pub fn outcome(correct: bool, next: Option<&str>) -> SubmissionOutcome {
    SubmissionOutcome {
        correct,
        reason: (!correct).then(|| "wrong".to_string()),
        next_url: next.map(url),
    }
}

// ========== 渲染器 ==========

#[derive(Default)]
pub struct FakeRenderer {
    pages: HashMap<String, String>,
    release_delay: Duration,
    pub renders: AtomicUsize,
    pub releases: AtomicUsize,
}

impl FakeRenderer {
    pub fn with_pages(pages: &[(&str, String)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(u, markup)| (url(u).to_string(), markup.clone()))
                .collect(),
            ..Default::default()
        })
    }

    /// 释放资源需要一段时间的渲染器（模拟关闭浏览器）
    pub fn with_slow_release(pages: &[(&str, String)], release_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(u, markup)| (url(u).to_string(), markup.clone()))
                .collect(),
            release_delay,
            ..Default::default()
        })
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, url: &Url, _timeout: Duration) -> Result<String> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| QuizError::render(format!("no page for {}", url)))
    }

    async fn release(&self) {
        if !self.release_delay.is_zero() {
            tokio::time::sleep(self.release_delay).await;
        }
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// ========== 求解器 ==========

pub struct FixedSolver {
    answer: JsonValue,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FixedSolver {
    pub fn new(answer: JsonValue) -> Arc<Self> {
        Self::slow(answer, Duration::ZERO)
    }

    pub fn slow(answer: JsonValue, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer,
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl QuizSolver for FixedSolver {
    async fn solve(&self, _task: &TaskDefinition) -> Result<JsonValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.answer.clone())
    }
}

// ========== 提交 ==========

/// 按顺序返回预设的判定，并记录每次提交
pub struct ScriptedSubmitter {
    script: Mutex<VecDeque<Result<SubmissionOutcome>>>,
    pub submitted: Mutex<Vec<(Url, Url, JsonValue)>>,
}

impl ScriptedSubmitter {
    pub fn new(script: Vec<Result<SubmissionOutcome>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            submitted: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl AnswerSubmission for ScriptedSubmitter {
    async fn submit(
        &self,
        endpoint: &Url,
        _identity: &Identity,
        task_url: &Url,
        answer: &JsonValue,
    ) -> Result<SubmissionOutcome> {
        self.submitted
            .lock()
            .unwrap()
            .push((endpoint.clone(), task_url.clone(), answer.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(outcome(true, None)))
    }
}

// ========== 推理服务与下载 ==========

pub struct ScriptedReasoning {
    turns: Mutex<VecDeque<ModelTurn>>,
}

impl ScriptedReasoning {
    pub fn new(turns: Vec<ModelTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
        })
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn complete(
        &self,
        _model: &str,
        _transcript: &[ChatMessage],
        _tools: &[ToolDescriptor],
    ) -> Result<ModelTurn> {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| QuizError::reasoning("script exhausted"))
    }

    async fn analyze_image(&self, _image: &[u8], _mime: &str, _prompt: &str) -> Result<String> {
        Ok("an image".to_string())
    }

    async fn transcribe_audio(&self, _audio: &[u8], _format: &str) -> Result<String> {
        Ok("spoken words".to_string())
    }
}

pub struct MapFetcher(pub HashMap<String, Vec<u8>>);

#[async_trait]
impl FileFetcher for MapFetcher {
    async fn download(&self, url: &Url, _headers: Option<&HashMap<String, String>>) -> Result<Vec<u8>> {
        self.0
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| QuizError::network(format!("404 {}", url)))
    }
}

/// 每次调用都返回同一个推理服务错误对象，并记录调用次数
pub struct RejectingReasoning {
    error: async_openai::error::ApiError,
    pub calls: AtomicUsize,
}

impl RejectingReasoning {
    pub fn new(code: Option<&str>, message: &str) -> Arc<Self> {
        Arc::new(Self {
            error: async_openai::error::ApiError {
                message: message.to_string(),
                r#type: Some("invalid_request_error".to_string()),
                param: None,
                code: code.map(str::to_string),
            },
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ReasoningService for RejectingReasoning {
    async fn complete(
        &self,
        _model: &str,
        _transcript: &[ChatMessage],
        _tools: &[ToolDescriptor],
    ) -> Result<ModelTurn> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(async_openai::error::OpenAIError::ApiError(self.error.clone()).into())
    }

    async fn analyze_image(&self, _image: &[u8], _mime: &str, _prompt: &str) -> Result<String> {
        Err(async_openai::error::OpenAIError::ApiError(self.error.clone()).into())
    }

    async fn transcribe_audio(&self, _audio: &[u8], _format: &str) -> Result<String> {
        Err(async_openai::error::OpenAIError::ApiError(self.error.clone()).into())
    }
}
