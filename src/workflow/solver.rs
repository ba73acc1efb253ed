//! 求解流程 - 流程层
//!
//! 核心职责：把一个任务变成一个答案
//!
//! 流程：
//! 1. 根据任务内容选择模型（涉及图片时使用视觉模型）
//! 2. 与推理服务多轮对话，按模型请求执行工具
//! 3. 模型给出最终文本后，按答案形态转换
//!
//! 每次求解独占一个 [`ExecutionContext`]，返回时即丢弃。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ErrorCategory, QuizError, Result};
use crate::infrastructure::{FileFetcher, ReasoningService};
use crate::metrics::{estimate_cost, MetricsEvent, MetricsSink};
use crate::models::{ChatMessage, TaskDefinition, ToolDescriptor};
use crate::retry::RetryPolicy;
use crate::utils::truncate_text;
use crate::workflow::coerce::AnswerCoercer;
use crate::workflow::context::ExecutionContext;
use crate::workflow::tools::{tool_menu, ToolExecutor};

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp"];
const VISION_KEYWORDS: &[&str] = &["image", "picture", "photo", "visual", "chart", "diagram"];
const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".m4a", ".ogg", ".flac"];
const AUDIO_KEYWORDS: &[&str] = &["audio", "sound", "speech", "transcribe", "voice"];

const SYSTEM_PROMPT: &str = "You are a data analysis assistant that helps solve data-related tasks.

You have access to the following tools:
- download_file: Download files from URLs
- parse_file: Parse files (CSV, JSON, text) into structured data
- filter_data: Filter data based on conditions
- aggregate_data: Perform aggregations (sum, count, mean, etc.)
- analyze_data: Perform statistical analysis
- create_chart: Generate visualizations
- get_value: Read a stored result or table
- process_image / analyze_image: Load an image and ask questions about it
- transcribe_audio: Turn an audio file into text

Your job is to:
1. Understand the task requirements
2. Use tools to download and process data
3. Perform required analysis
4. Return the final answer in the specified format

Always think step-by-step and use tools systematically. Store intermediate results for later use.";

/// 求解能力
#[async_trait]
pub trait QuizSolver: Send + Sync {
    /// 求解任务，返回已按答案形态转换的答案
    async fn solve(&self, task: &TaskDefinition) -> Result<JsonValue>;
}

/// 求解参数
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSettings {
    pub model: String,
    pub vision_model: String,
    /// 对话轮数上限
    pub max_iterations: usize,
    /// 单轮推理调用的重试次数
    pub max_retries: u32,
    pub prompt_cost_per_1k: f64,
    pub completion_cost_per_1k: f64,
}

impl SolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.llm_model_name.clone(),
            vision_model: config.llm_vision_model_name.clone(),
            max_iterations: config.llm_max_iterations,
            max_retries: config.llm_max_retries,
            prompt_cost_per_1k: config.llm_prompt_cost_per_1k,
            completion_cost_per_1k: config.llm_completion_cost_per_1k,
        }
    }
}

/// 任务是否涉及图片
pub fn requires_vision(task: &TaskDefinition) -> bool {
    mentions(task, IMAGE_EXTENSIONS, VISION_KEYWORDS)
}

/// 任务是否涉及音频
pub fn requires_audio(task: &TaskDefinition) -> bool {
    mentions(task, AUDIO_EXTENSIONS, AUDIO_KEYWORDS)
}

fn mentions(task: &TaskDefinition, extensions: &[&str], keywords: &[&str]) -> bool {
    let by_file = task.file_urls.iter().any(|url| {
        let url = url.as_str().to_lowercase();
        extensions.iter().any(|ext| url.contains(ext))
    });
    let instructions = task.instructions.to_lowercase();
    by_file || keywords.iter().any(|k| instructions.contains(k))
}

/// 初始用户消息
pub fn user_prompt(task: &TaskDefinition) -> String {
    let mut prompt = format!(
        "Task Instructions:\n{}\n\nRequired Answer Format: {}\n\n",
        task.instructions, task.answer_shape
    );

    if !task.file_urls.is_empty() {
        prompt.push_str("Files to process:\n");
        for (i, url) in task.file_urls.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, url));
        }
        prompt.push('\n');
    }

    if !task.extra.is_empty() {
        if let Ok(extra) = serde_json::to_string_pretty(&task.extra) {
            prompt.push_str(&format!("Additional Context:\n{}\n\n", extra));
        }
    }

    prompt.push_str("Please solve this task step by step using the available tools.");
    prompt
}

/// 基于工具调用的求解器
pub struct ToolCallingSolver {
    reasoning: Arc<dyn ReasoningService>,
    executor: ToolExecutor,
    coercer: AnswerCoercer,
    metrics: Arc<dyn MetricsSink>,
    retry: RetryPolicy,
    settings: SolverSettings,
    tools: Vec<ToolDescriptor>,
}

impl ToolCallingSolver {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        fetcher: Arc<dyn FileFetcher>,
        metrics: Arc<dyn MetricsSink>,
        retry: RetryPolicy,
        settings: SolverSettings,
    ) -> Result<Self> {
        Ok(Self {
            executor: ToolExecutor::new(fetcher, Arc::clone(&reasoning)),
            reasoning,
            coercer: AnswerCoercer::new()?,
            metrics,
            retry,
            settings,
            tools: tool_menu(),
        })
    }

    fn select_model(&self, task: &TaskDefinition) -> &str {
        if requires_vision(task) {
            info!("🖼️ 任务涉及图片，使用视觉模型: {}", self.settings.vision_model);
            return &self.settings.vision_model;
        }
        if requires_audio(task) {
            info!("🎧 任务涉及音频，通过 transcribe_audio 工具转写");
        }
        &self.settings.model
    }

    fn record_usage(&self, model: &str, usage: Option<crate::models::TokenUsage>) {
        let Some(usage) = usage else {
            return;
        };
        let cost = estimate_cost(
            usage,
            self.settings.prompt_cost_per_1k,
            self.settings.completion_cost_per_1k,
        );
        self.metrics.emit(MetricsEvent::ReasoningUsage {
            model: model.to_string(),
            usage,
            cost,
        });
    }
}

#[async_trait]
impl QuizSolver for ToolCallingSolver {
    async fn solve(&self, task: &TaskDefinition) -> Result<JsonValue> {
        info!("🧠 开始求解，答案形态: {}", task.answer_shape);
        let model = self.select_model(task);

        let mut ctx = ExecutionContext::new();
        let mut transcript = vec![
            ChatMessage::System(SYSTEM_PROMPT.to_string()),
            ChatMessage::User(user_prompt(task)),
        ];

        for iteration in 0..self.settings.max_iterations {
            debug!("推理第 {}/{} 轮", iteration + 1, self.settings.max_iterations);

            let turn = self
                .retry
                .execute(
                    "推理服务调用",
                    Some(self.settings.max_retries),
                    Some(&[
                        ErrorCategory::ReasoningService,
                        ErrorCategory::Network,
                        ErrorCategory::Timeout,
                    ]),
                    || self.reasoning.complete(model, &transcript, &self.tools),
                )
                .await?;
            self.record_usage(model, turn.usage);

            if turn.tool_calls.is_empty() {
                let text = turn.content.unwrap_or_default();
                info!("💡 模型给出最终答案: {}", truncate_text(&text, 120));
                let answer = self.coercer.coerce(&text, task.answer_shape, &ctx);
                let (files, tables, results, media) = ctx.sizes();
                debug!(
                    "上下文: {} 个文件, {} 张表, {} 个结果, {} 个媒体",
                    files, tables, results, media
                );
                return Ok(answer);
            }

            let calls = turn.tool_calls;
            transcript.push(ChatMessage::Assistant {
                content: turn.content,
                tool_calls: calls.clone(),
            });

            for call in &calls {
                let feedback = self.executor.execute(call, &mut ctx).await;
                transcript.push(ChatMessage::Tool {
                    call_id: call.id.clone(),
                    content: feedback.to_string(),
                });
            }
        }

        warn!("⚠️ 达到对话轮数上限，模型未给出最终答案");
        Err(QuizError::task_execution(format!(
            "推理服务在 {} 轮内没有给出最终答案",
            self.settings.max_iterations
        ))
        .with_context("model", model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use reqwest::Url;
    use serde_json::{json, Map};

    use crate::metrics::InMemoryMetrics;
    use crate::models::{AnswerShape, ModelTurn, TokenUsage, ToolCall};

    struct ScriptedReasoning {
        turns: Mutex<VecDeque<Result<ModelTurn>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
        models: Mutex<Vec<String>>,
    }

    impl ScriptedReasoning {
        fn new(turns: Vec<Result<ModelTurn>>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
                seen: Mutex::new(Vec::new()),
                models: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ReasoningService for ScriptedReasoning {
        async fn complete(
            &self,
            model: &str,
            transcript: &[ChatMessage],
            _tools: &[ToolDescriptor],
        ) -> Result<ModelTurn> {
            self.seen.lock().unwrap().push(transcript.to_vec());
            self.models.lock().unwrap().push(model.to_string());
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ModelTurn::tool_calls(vec![call("x", "get_value", "{}")])))
        }

        async fn analyze_image(&self, _image: &[u8], _mime: &str, _prompt: &str) -> Result<String> {
            Ok("a cat".into())
        }

        async fn transcribe_audio(&self, _audio: &[u8], _format: &str) -> Result<String> {
            Ok("hello".into())
        }
    }

    struct StaticFetcher(Vec<u8>);

    #[async_trait]
    impl FileFetcher for StaticFetcher {
        async fn download(&self, _url: &Url, _headers: Option<&HashMap<String, String>>) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn task(instructions: &str, shape: AnswerShape) -> TaskDefinition {
        TaskDefinition {
            instructions: instructions.into(),
            submit_endpoint: Url::parse("https://x/submit").unwrap(),
            answer_shape: shape,
            file_urls: vec![Url::parse("https://x/data.csv").unwrap()],
            extra: Map::new(),
        }
    }

    fn solver(reasoning: Arc<ScriptedReasoning>, metrics: Arc<InMemoryMetrics>, max_iterations: usize) -> ToolCallingSolver {
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        };
        let settings = SolverSettings {
            max_iterations,
            ..SolverSettings::from_config(&Config::default())
        };
        ToolCallingSolver::new(
            reasoning,
            Arc::new(StaticFetcher(b"a,b\n1,2\n".to_vec())),
            metrics,
            retry,
            settings,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn download_then_final_answer_yields_number() {
        let mut first = ModelTurn::tool_calls(vec![call(
            "c1",
            "download_file",
            r#"{"url": "https://x/data.csv", "file_id": "data"}"#,
        )]);
        first.usage = Some(TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 500,
        });
        let reasoning = ScriptedReasoning::new(vec![Ok(first), Ok(ModelTurn::final_text("The answer is 42"))]);
        let metrics = Arc::new(InMemoryMetrics::new());
        let solver = solver(Arc::clone(&reasoning), Arc::clone(&metrics), 10);

        let answer = solver
            .solve(&task("Sum column b. Return a number.", AnswerShape::Number))
            .await
            .unwrap();
        assert_eq!(answer, json!(42));

        let seen = reasoning.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        match seen[1].last() {
            Some(ChatMessage::Tool { call_id, content }) => {
                assert_eq!(call_id, "c1");
                let feedback: JsonValue = serde_json::from_str(content).unwrap();
                assert_eq!(feedback["success"], true);
                assert_eq!(feedback["size"], 8);
            }
            other => panic!("unexpected last message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn tool_failures_are_fed_back() {
        let reasoning = ScriptedReasoning::new(vec![
            Ok(ModelTurn::tool_calls(vec![call("c1", "no_such_tool", "{}")])),
            Ok(ModelTurn::final_text("yes")),
        ]);
        let solver = solver(Arc::clone(&reasoning), Arc::new(InMemoryMetrics::new()), 10);

        let answer = solver
            .solve(&task("Is it true?", AnswerShape::Boolean))
            .await
            .unwrap();
        assert_eq!(answer, json!(true));

        let seen = reasoning.seen.lock().unwrap();
        let Some(ChatMessage::Tool { content, .. }) = seen[1].last() else {
            panic!("expected tool feedback");
        };
        assert!(content.contains("\"success\":false"));
    }

    #[tokio::test]
    async fn iteration_ceiling_is_a_task_execution_error() {
        let reasoning = ScriptedReasoning::new(Vec::new());
        let solver = solver(Arc::clone(&reasoning), Arc::new(InMemoryMetrics::new()), 3);

        let err = solver
            .solve(&task("loop forever", AnswerShape::String))
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::TaskExecution);
        assert_eq!(reasoning.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn transient_reasoning_errors_are_retried() {
        let reasoning = ScriptedReasoning::new(vec![
            Err(QuizError::reasoning("rate limit")),
            Ok(ModelTurn::final_text("\"done\"")),
        ]);
        let solver = solver(Arc::clone(&reasoning), Arc::new(InMemoryMetrics::new()), 10);

        let answer = solver.solve(&task("say done", AnswerShape::String)).await;
        tokio_test::assert_ok!(&answer);
        assert_eq!(answer.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn image_tasks_use_the_vision_model() {
        let reasoning = ScriptedReasoning::new(vec![Ok(ModelTurn::final_text("3"))]);
        let solver = solver(Arc::clone(&reasoning), Arc::new(InMemoryMetrics::new()), 10);

        solver
            .solve(&task("Count the cats in the picture", AnswerShape::Number))
            .await
            .unwrap();
        assert_eq!(reasoning.models.lock().unwrap()[0], Config::default().llm_vision_model_name);
    }

    #[test]
    fn prompt_lists_files_and_shape() {
        let prompt = user_prompt(&task("Do it", AnswerShape::Number));
        assert!(prompt.starts_with("Task Instructions:\nDo it\n\nRequired Answer Format: number"));
        assert!(prompt.contains("1. https://x/data.csv"));
        assert!(!prompt.contains("Additional Context"));
        assert!(requires_audio(&task("transcribe the clip", AnswerShape::String)));
        assert!(!requires_vision(&task("Sum the values", AnswerShape::Number)));
    }
}
