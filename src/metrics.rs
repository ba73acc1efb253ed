//! 指标上报
//!
//! 核心只负责发出事件，不持有长期存储。`MetricsSink` 在构造时注入，
//! 不存在进程级单例。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::ErrorCategory;
use crate::models::{SequenceResult, TokenUsage};

/// 计时阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Render,
    Parse,
    Solve,
    Submit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Render => "render",
            Stage::Parse => "parse",
            Stage::Solve => "solve",
            Stage::Submit => "submit",
        }
    }
}

/// 指标事件
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsEvent {
    SequenceStarted {
        start_url: String,
    },
    StageTiming {
        stage: Stage,
        quiz_url: String,
        elapsed: Duration,
    },
    ReasoningUsage {
        model: String,
        usage: TokenUsage,
        cost: f64,
    },
    Retry {
        quiz_url: String,
        category: Option<ErrorCategory>,
    },
    SubmissionCompleted {
        quiz_url: String,
        correct: bool,
        elapsed: Duration,
    },
    SequenceFinished {
        start_url: String,
        result: SequenceResult,
    },
}

/// 指标接收端
pub trait MetricsSink: Send + Sync {
    fn emit(&self, event: MetricsEvent);
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn emit(&self, _event: MetricsEvent) {}
}

/// 把事件写进日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn emit(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::SequenceStarted { start_url } => {
                info!("📈 开始统计测验链: {}", start_url);
            }
            MetricsEvent::StageTiming {
                stage,
                quiz_url,
                elapsed,
            } => {
                debug!("⏱️ {} 阶段耗时 {:?} ({})", stage.as_str(), elapsed, quiz_url);
            }
            MetricsEvent::ReasoningUsage { model, usage, cost } => {
                debug!(
                    "🤖 推理调用 {}: {} tokens, 估算费用 ${:.4}",
                    model,
                    usage.total(),
                    cost
                );
            }
            MetricsEvent::Retry { quiz_url, category } => {
                debug!(
                    "🔁 重试 {} (分类: {})",
                    quiz_url,
                    category.map(|c| c.as_str()).unwrap_or("incorrect-answer")
                );
            }
            MetricsEvent::SubmissionCompleted {
                quiz_url,
                correct,
                elapsed,
            } => {
                debug!("📤 提交完成 {} correct={} 耗时 {:?}", quiz_url, correct, elapsed);
            }
            MetricsEvent::SequenceFinished { start_url, result } => {
                info!(
                    "📊 测验链 {} 结束: {} / 完成 {} 题 / 耗时 {:.1}s",
                    start_url,
                    result.terminal_status,
                    result.quizzes_completed,
                    result.elapsed.as_secs_f64()
                );
            }
        }
    }
}

/// 单条测验链的指标
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuizMetrics {
    pub start_url: String,
    pub stage_times: HashMap<Stage, Duration>,
    pub reasoning_calls: u32,
    pub tokens_used: u64,
    pub cost: f64,
    pub retries: u32,
    pub submissions: u32,
    pub quizzes_completed: usize,
    pub total_time: Duration,
    pub success: bool,
    pub error: Option<String>,
}

/// 汇总统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    pub total_sequences: usize,
    pub successful_sequences: usize,
    pub failed_sequences: usize,
    pub total_quizzes_completed: usize,
    pub total_reasoning_calls: u32,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub success_rate: f64,
    pub average_time: Duration,
    pub average_cost: f64,
}

/// 内存中的指标聚合器
///
/// 同一时刻只追踪一条进行中的测验链；多个并发测验链应各自持有一个实例。
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    inner: Mutex<MetricsState>,
}

#[derive(Debug, Default)]
struct MetricsState {
    current: Option<QuizMetrics>,
    finished: Vec<QuizMetrics>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已结束的测验链
    pub fn finished(&self) -> Vec<QuizMetrics> {
        self.lock().finished.clone()
    }

    /// 汇总所有已结束的测验链
    pub fn summary(&self) -> MetricsSummary {
        let state = self.lock();
        let finished = &state.finished;
        let total = finished.len();
        let successful = finished.iter().filter(|m| m.success).count();
        let total_time: Duration = finished.iter().map(|m| m.total_time).sum();
        let total_cost: f64 = finished.iter().map(|m| m.cost).sum();

        MetricsSummary {
            total_sequences: total,
            successful_sequences: successful,
            failed_sequences: total - successful,
            total_quizzes_completed: finished.iter().map(|m| m.quizzes_completed).sum(),
            total_reasoning_calls: finished.iter().map(|m| m.reasoning_calls).sum(),
            total_tokens: finished.iter().map(|m| m.tokens_used).sum(),
            total_cost,
            success_rate: if total == 0 { 0.0 } else { successful as f64 / total as f64 },
            average_time: if total == 0 { Duration::ZERO } else { total_time / total as u32 },
            average_cost: if total == 0 { 0.0 } else { total_cost / total as f64 },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsState> {
        // 指标不影响主流程，锁中毒时继续使用内部数据
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MetricsSink for InMemoryMetrics {
    fn emit(&self, event: MetricsEvent) {
        let mut state = self.lock();
        match event {
            MetricsEvent::SequenceStarted { start_url } => {
                state.current = Some(QuizMetrics {
                    start_url,
                    ..Default::default()
                });
            }
            MetricsEvent::SequenceFinished { start_url, result } => {
                let mut metrics = state.current.take().unwrap_or_else(|| QuizMetrics {
                    start_url,
                    ..Default::default()
                });
                metrics.quizzes_completed = result.quizzes_completed;
                metrics.total_time = result.elapsed;
                metrics.success = result.succeeded;
                metrics.error = result.error;
                state.finished.push(metrics);
            }
            other => {
                let Some(current) = state.current.as_mut() else {
                    return;
                };
                match other {
                    MetricsEvent::StageTiming { stage, elapsed, .. } => {
                        *current.stage_times.entry(stage).or_default() += elapsed;
                    }
                    MetricsEvent::ReasoningUsage { usage, cost, .. } => {
                        current.reasoning_calls += 1;
                        current.tokens_used += u64::from(usage.total());
                        current.cost += cost;
                    }
                    MetricsEvent::Retry { .. } => current.retries += 1,
                    MetricsEvent::SubmissionCompleted { .. } => current.submissions += 1,
                    MetricsEvent::SequenceStarted { .. } | MetricsEvent::SequenceFinished { .. } => {}
                }
            }
        }
    }
}

/// 按每 1k token 单价估算费用
pub fn estimate_cost(usage: TokenUsage, prompt_per_1k: f64, completion_per_1k: f64) -> f64 {
    f64::from(usage.prompt_tokens) / 1000.0 * prompt_per_1k
        + f64::from(usage.completion_tokens) / 1000.0 * completion_per_1k
}
