//! 测验链编排器 - 编排层
//!
//! ## 职责
//!
//! 在一个全局时限内，按 渲染 → 解析 → 求解 → 提交 的顺序依次处理测验链，
//! 根据判定结果决定前进、重试当前题、跳到下一题或停止。
//!
//! ## 终止条件
//!
//! - 没有下一题地址 → `completed`
//! - 下一题地址已经访问过（循环）→ 停止，已完成部分视为成功
//! - 全局时限到达 → `timeout`，正在进行的渲染 / 求解 / 提交立即取消
//! - 不可恢复的错误 → `error`
//!
//! 无论哪种结束方式，渲染器资源都会在返回前释放。

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{report, QuizError, Result};
use crate::infrastructure::PageRenderer;
use crate::metrics::{MetricsEvent, MetricsSink, Stage};
use crate::models::{Identity, SequenceResult, SubmissionOutcome, TaskDefinition, TerminalStatus};
use crate::services::submitter::AnswerSubmission;
use crate::services::task_parser::{TaskParser, DEMO_ANSWER};
use crate::workflow::{QuizCtx, QuizSolver};

/// 编排参数
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// 整个测验链的时限
    pub timeout: Duration,
    /// 单题答错后最多重试次数
    pub max_retries_per_quiz: u32,
    /// 已重试 1 次且剩余时间低于此值时跳题
    pub skip_after_one_retry: Duration,
    /// 已重试 2 次且剩余时间低于此值时跳题
    pub skip_after_two_retries: Duration,
    /// 单次页面渲染时限
    pub render_timeout: Duration,
    /// 求解 / 提交出错后再次尝试前的等待
    pub retry_pause: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.quiz_timeout_secs),
            max_retries_per_quiz: config.max_retries_per_quiz,
            skip_after_one_retry: Duration::from_secs(config.skip_threshold_one_attempt_secs),
            skip_after_two_retries: Duration::from_secs(config.skip_threshold_two_attempts_secs),
            render_timeout: Duration::from_millis(config.browser_timeout_ms),
            retry_pause: Duration::from_secs(1),
        }
    }

    /// 答错且有下一题地址时，是否因为时间紧张直接跳题
    ///
    /// # 参数
    /// - `retries`: 当前测验已经重试的次数
    /// - `remaining`: 全局剩余时间
    pub fn should_skip(&self, retries: u32, remaining: Duration) -> bool {
        (retries >= 1 && remaining < self.skip_after_one_retry)
            || (retries >= 2 && remaining < self.skip_after_two_retries)
    }
}

/// 测验链编排器
///
/// 每次 [`solve_quiz_sequence`](Self::solve_quiz_sequence) 结束时都会释放渲染器，
/// 而渲染器在各条测验链之间共享，因此同一个实例上的测验链需要依次执行；
/// 并发的测验链各自构造一个渲染器和编排器。
pub struct QuizOrchestrator {
    renderer: Arc<dyn PageRenderer>,
    parser: TaskParser,
    solver: Arc<dyn QuizSolver>,
    submitter: Arc<dyn AnswerSubmission>,
    metrics: Arc<dyn MetricsSink>,
    settings: OrchestratorSettings,
}

impl QuizOrchestrator {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        solver: Arc<dyn QuizSolver>,
        submitter: Arc<dyn AnswerSubmission>,
        metrics: Arc<dyn MetricsSink>,
        settings: OrchestratorSettings,
    ) -> Result<Self> {
        Ok(Self {
            renderer,
            parser: TaskParser::new()?,
            solver,
            submitter,
            metrics,
            settings,
        })
    }

    /// 求解整个测验链
    ///
    /// # 参数
    /// - `identity`: 提交者身份
    /// - `start_url`: 第一题地址
    ///
    /// # 返回
    /// 测验链结果；所有失败都体现在结果中，不会返回错误
    pub async fn solve_quiz_sequence(&self, identity: &Identity, start_url: &Url) -> SequenceResult {
        let started = Instant::now();
        let deadline = started + self.settings.timeout;
        info!("🚀 开始测验链: {} (时限 {:?})", start_url, self.settings.timeout);
        self.metrics.emit(MetricsEvent::SequenceStarted {
            start_url: start_url.to_string(),
        });

        let mut completed = 0usize;
        let outcome = tokio::time::timeout(
            self.settings.timeout,
            self.run_chain(identity, start_url, deadline, &mut completed),
        )
        .await;

        let elapsed = started.elapsed();
        self.renderer.release().await;
        info!("🧹 渲染器资源已释放");

        let result = match outcome {
            Ok(Ok(())) => SequenceResult {
                succeeded: true,
                elapsed,
                quizzes_completed: completed,
                terminal_status: TerminalStatus::Completed,
                error: None,
            },
            Ok(Err(err)) => {
                let err = err.with_context("quizzes_completed", completed);
                report(&err, "quiz_sequence");
                SequenceResult {
                    succeeded: false,
                    elapsed,
                    quizzes_completed: completed,
                    terminal_status: TerminalStatus::Error,
                    error: Some(err.summary()),
                }
            }
            Err(_) => {
                let message = format!("超过 {} 秒时限", self.settings.timeout.as_secs_f64());
                warn!("⏰ 测验链超时，已完成 {} 题", completed);
                SequenceResult {
                    succeeded: false,
                    elapsed,
                    quizzes_completed: completed,
                    terminal_status: TerminalStatus::Timeout,
                    error: Some(message),
                }
            }
        };

        self.metrics.emit(MetricsEvent::SequenceFinished {
            start_url: start_url.to_string(),
            result: result.clone(),
        });
        result
    }

    async fn run_chain(
        &self,
        identity: &Identity,
        start_url: &Url,
        deadline: Instant,
        completed: &mut usize,
    ) -> Result<()> {
        let mut visited: Vec<Url> = Vec::new();
        let mut current = Some(start_url.clone());

        while let Some(url) = current.take() {
            if visited.contains(&url) {
                warn!("🔁 检测到循环地址，停止: {}", url);
                break;
            }
            visited.push(url.clone());

            let ctx = QuizCtx::new(visited.len(), url);
            info!(
                "{} 📄 开始处理 {} (剩余 {:.0}s)",
                ctx,
                ctx.url,
                remaining(deadline).as_secs_f64()
            );

            current = self.solve_single_quiz(identity, &ctx, deadline).await?;
            *completed += 1;

            if current.is_none() {
                info!("🎉 测验链全部完成");
            }
        }
        Ok(())
    }

    /// 处理一道测验，返回下一题地址
    async fn solve_single_quiz(
        &self,
        identity: &Identity,
        ctx: &QuizCtx,
        deadline: Instant,
    ) -> Result<Option<Url>> {
        let quiz_url = ctx.url.to_string();

        let started = Instant::now();
        let markup = self
            .renderer
            .render(&ctx.url, self.settings.render_timeout)
            .await
            .map_err(|e| e.with_context("quiz_url", &quiz_url))?;
        self.timing(Stage::Render, &quiz_url, started);

        let started = Instant::now();
        let task = self
            .parser
            .parse(&markup, &ctx.url)
            .map_err(|e| e.with_context("quiz_url", &quiz_url))?;
        self.timing(Stage::Parse, &quiz_url, started);

        let max_retries = self.settings.max_retries_per_quiz;
        let mut retries: u32 = 0;
        let mut attempt_ctx = ctx.clone();

        loop {
            match self.attempt(identity, &attempt_ctx, &task).await {
                Ok(outcome) if outcome.correct => {
                    info!("{} ✅ 答案正确", attempt_ctx);
                    return Ok(outcome.next_url);
                }
                Ok(SubmissionOutcome { reason, next_url, .. }) => {
                    let reason = reason.unwrap_or_else(|| "未给出原因".to_string());
                    warn!("{} ❌ 答案错误: {}", attempt_ctx, reason);

                    if let Some(next) = next_url {
                        if retries >= max_retries {
                            info!("{} ⏭️ 重试次数已用完，跳到下一题: {}", attempt_ctx, next);
                            return Ok(Some(next));
                        }
                        if self.settings.should_skip(retries, remaining(deadline)) {
                            info!("{} ⏭️ 剩余时间不足，跳到下一题: {}", attempt_ctx, next);
                            return Ok(Some(next));
                        }
                    }

                    retries += 1;
                    if retries > max_retries {
                        return Err(QuizError::task_execution(format!(
                            "重试 {} 次后仍未答对: {}",
                            max_retries, reason
                        ))
                        .with_context("quiz_url", &quiz_url));
                    }
                    self.metrics.emit(MetricsEvent::Retry {
                        quiz_url: quiz_url.clone(),
                        category: None,
                    });
                }
                Err(err) => {
                    let err = err.with_context("quiz_url", &quiz_url);
                    report(&err, "quiz_solving");
                    if !err.is_retryable() {
                        return Err(err);
                    }

                    retries += 1;
                    if retries > max_retries {
                        error!("{} 重试 {} 次后仍然失败", attempt_ctx, max_retries);
                        return Err(err.with_context("attempts", retries));
                    }
                    self.metrics.emit(MetricsEvent::Retry {
                        quiz_url: quiz_url.clone(),
                        category: Some(err.category),
                    });
                    sleep(self.settings.retry_pause).await;
                }
            }

            attempt_ctx = attempt_ctx.next_attempt();
            info!("{} 🔁 重新尝试", attempt_ctx);
        }
    }

    /// 一次 求解 → 提交
    async fn attempt(
        &self,
        identity: &Identity,
        ctx: &QuizCtx,
        task: &TaskDefinition,
    ) -> Result<SubmissionOutcome> {
        let quiz_url = ctx.url.to_string();

        let started = Instant::now();
        let answer = if task.is_demo() {
            info!("{} 📘 演示页，直接提交固定答案", ctx);
            JsonValue::String(DEMO_ANSWER.to_string())
        } else {
            self.solver.solve(task).await?
        };
        self.timing(Stage::Solve, &quiz_url, started);

        let started = Instant::now();
        let outcome = self
            .submitter
            .submit(&task.submit_endpoint, identity, &ctx.url, &answer)
            .await?;
        self.timing(Stage::Submit, &quiz_url, started);
        self.metrics.emit(MetricsEvent::SubmissionCompleted {
            quiz_url,
            correct: outcome.correct,
            elapsed: started.elapsed(),
        });
        Ok(outcome)
    }

    fn timing(&self, stage: Stage, quiz_url: &str, started: Instant) {
        self.metrics.emit(MetricsEvent::StageTiming {
            stage,
            quiz_url: quiz_url.to_string(),
            elapsed: started.elapsed(),
        });
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings::from_config(&Config::default())
    }

    #[test]
    fn skip_thresholds() {
        let s = settings();
        assert!(!s.should_skip(0, Duration::from_secs(5)));
        assert!(s.should_skip(1, Duration::from_secs(29)));
        assert!(!s.should_skip(1, Duration::from_secs(45)));
        assert!(s.should_skip(2, Duration::from_secs(45)));
        assert!(!s.should_skip(2, Duration::from_secs(90)));
    }

    #[test]
    fn settings_follow_config() {
        let config = Config {
            quiz_timeout_secs: 60,
            skip_threshold_one_attempt_secs: 10,
            ..Config::default()
        };
        let s = OrchestratorSettings::from_config(&config);
        assert_eq!(s.timeout, Duration::from_secs(60));
        assert!(s.should_skip(1, Duration::from_secs(9)));
        assert!(!s.should_skip(1, Duration::from_secs(11)));
    }
}
