//! 答案提交 - 业务能力层
//!
//! 只负责把一次答案发给远端判分服务并解析判定结果

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ErrorCategory, QuizError, Result};
use crate::models::{Identity, SubmissionOutcome, SubmitPayload, SubmitResponse};
use crate::retry::RetryPolicy;
use crate::utils::truncate_text;

/// 答案提交能力
#[async_trait]
pub trait AnswerSubmission: Send + Sync {
    /// 提交答案
    ///
    /// # 参数
    /// - `endpoint`: 提交地址
    /// - `identity`: 提交者身份
    /// - `task_url`: 当前测验页面地址
    /// - `answer`: 已经按答案形态转换过的答案
    async fn submit(
        &self,
        endpoint: &Url,
        identity: &Identity,
        task_url: &Url,
        answer: &JsonValue,
    ) -> Result<SubmissionOutcome>;
}

/// 提交统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionStats {
    pub count: u64,
    pub total_time: Duration,
}

/// 基于 reqwest 的提交客户端
pub struct HttpAnswerSubmitter {
    client: reqwest::Client,
    retry: RetryPolicy,
    max_retries: u32,
    submissions: AtomicU64,
    total_micros: AtomicU64,
}

impl HttpAnswerSubmitter {
    pub fn new(timeout: Duration, max_retries: u32, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            retry,
            max_retries,
            submissions: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            Duration::from_secs(config.submit_timeout_secs),
            config.submit_max_retries,
            RetryPolicy::from_config(config),
        )
    }

    /// 累计提交次数和耗时
    pub fn stats(&self) -> SubmissionStats {
        SubmissionStats {
            count: self.submissions.load(Ordering::Relaxed),
            total_time: Duration::from_micros(self.total_micros.load(Ordering::Relaxed)),
        }
    }

    async fn submit_once(&self, endpoint: &Url, payload: &SubmitPayload<'_>) -> Result<SubmissionOutcome> {
        let response = self.client.post(endpoint.clone()).json(payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_server_error() {
            return Err(QuizError::network(format!(
                "提交服务异常 {}: {}",
                status,
                truncate_text(&body, 200)
            ))
            .with_context("status", status.as_u16()));
        }
        if status.is_client_error() {
            let category = match status.as_u16() {
                401 | 403 => ErrorCategory::Auth,
                _ => ErrorCategory::Validation,
            };
            return Err(QuizError::new(
                category,
                format!("提交被拒绝 {}: {}", status, truncate_text(&body, 200)),
            )
            .with_context("status", status.as_u16()));
        }

        let parsed: SubmitResponse = serde_json::from_str(&body).map_err(|e| {
            QuizError::validation(format!("提交响应格式错误: {}", e))
                .with_context("body", truncate_text(&body, 200))
                .with_source(e)
        })?;

        let next_url = match parsed.url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(endpoint.join(raw).map_err(|e| {
                QuizError::validation(format!("下一题地址无效 {}: {}", raw, e))
            })?),
            _ => None,
        };

        Ok(SubmissionOutcome {
            correct: parsed.correct,
            reason: parsed.reason,
            next_url,
        })
    }
}

#[async_trait]
impl AnswerSubmission for HttpAnswerSubmitter {
    async fn submit(
        &self,
        endpoint: &Url,
        identity: &Identity,
        task_url: &Url,
        answer: &JsonValue,
    ) -> Result<SubmissionOutcome> {
        let payload = SubmitPayload {
            email: &identity.email,
            secret: &identity.secret,
            url: task_url.as_str(),
            answer,
        };
        debug!("提交答案到 {}: {}", endpoint, truncate_text(&answer.to_string(), 200));

        let started = Instant::now();
        let result = self
            .retry
            .execute(
                "答案提交",
                Some(self.max_retries),
                Some(&[ErrorCategory::Network, ErrorCategory::Timeout]),
                || self.submit_once(endpoint, &payload),
            )
            .await;

        let elapsed = started.elapsed();
        self.submissions.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );

        match &result {
            Ok(outcome) if outcome.correct => info!("✅ 答案正确 ({:?})", elapsed),
            Ok(outcome) => warn!(
                "❌ 答案错误: {}",
                outcome.reason.as_deref().unwrap_or("未给出原因")
            ),
            Err(err) => warn!("提交失败: {}", err),
        }
        result
    }
}
