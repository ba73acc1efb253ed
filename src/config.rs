use std::path::Path;

use serde::Deserialize;

use crate::error::{QuizError, Result};

/// 程序配置文件
///
/// 加载顺序：默认值 → TOML 文件（可选）→ 环境变量
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    // --- 身份 ---
    pub student_email: String,
    pub student_secret: String,
    /// 起始测验 URL
    pub start_url: String,

    // --- 编排 ---
    /// 整个测验链的全局时限（秒）
    pub quiz_timeout_secs: u64,
    /// 单个测验答错后最多重试次数
    pub max_retries_per_quiz: u32,
    /// 已尝试 1 次且剩余时间低于此值时直接跳到下一题
    pub skip_threshold_one_attempt_secs: u64,
    /// 已尝试 2 次且剩余时间低于此值时直接跳到下一题
    pub skip_threshold_two_attempts_secs: u64,

    // --- 重试 ---
    pub retry_max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_multiplier: f64,
    pub retry_max_delay_ms: u64,

    // --- 提交 ---
    pub submit_timeout_secs: u64,
    pub submit_max_retries: u32,

    // --- 浏览器 ---
    pub browser_timeout_ms: u64,
    pub browser_headless: bool,
    pub browser_max_retries: u32,
    pub chrome_executable: Option<String>,

    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_vision_model_name: String,
    pub llm_transcription_model: String,
    pub llm_max_iterations: usize,
    pub llm_max_retries: u32,
    /// 每 1k prompt token 的估算费用（美元）
    pub llm_prompt_cost_per_1k: f64,
    /// 每 1k completion token 的估算费用（美元）
    pub llm_completion_cost_per_1k: f64,

    // --- 下载 ---
    pub max_file_size_mb: u64,
    pub download_timeout_secs: u64,

    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            student_email: String::new(),
            student_secret: String::new(),
            start_url: String::new(),
            quiz_timeout_secs: 180,
            max_retries_per_quiz: 2,
            skip_threshold_one_attempt_secs: 30,
            skip_threshold_two_attempts_secs: 60,
            retry_max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_multiplier: 2.0,
            retry_max_delay_ms: 30_000,
            submit_timeout_secs: 30,
            submit_max_retries: 2,
            browser_timeout_ms: 30_000,
            browser_headless: true,
            browser_max_retries: 2,
            chrome_executable: None,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4".to_string(),
            llm_vision_model_name: "gpt-4o".to_string(),
            llm_transcription_model: "gpt-4o-audio-preview".to_string(),
            llm_max_iterations: 10,
            llm_max_retries: 2,
            llm_prompt_cost_per_1k: 0.03,
            llm_completion_cost_per_1k: 0.06,
            max_file_size_mb: 10,
            download_timeout_secs: 60,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 仅使用默认值 + 环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，缺省字段使用默认值
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuizError::from(e).with_context("path", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// TOML 文件（可选）+ 环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        let d = self;
        Self {
            student_email: env_string("STUDENT_EMAIL").unwrap_or(d.student_email),
            student_secret: env_string("STUDENT_SECRET").unwrap_or(d.student_secret),
            start_url: env_string("START_URL").unwrap_or(d.start_url),
            quiz_timeout_secs: env_parse("QUIZ_TIMEOUT").unwrap_or(d.quiz_timeout_secs),
            max_retries_per_quiz: env_parse("MAX_RETRIES_PER_QUIZ").unwrap_or(d.max_retries_per_quiz),
            skip_threshold_one_attempt_secs: env_parse("SKIP_THRESHOLD_ONE_ATTEMPT_SECS")
                .unwrap_or(d.skip_threshold_one_attempt_secs),
            skip_threshold_two_attempts_secs: env_parse("SKIP_THRESHOLD_TWO_ATTEMPTS_SECS")
                .unwrap_or(d.skip_threshold_two_attempts_secs),
            retry_max_retries: env_parse("MAX_RETRIES").unwrap_or(d.retry_max_retries),
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS").unwrap_or(d.retry_base_delay_ms),
            retry_multiplier: env_parse("RETRY_MULTIPLIER").unwrap_or(d.retry_multiplier),
            retry_max_delay_ms: env_parse("RETRY_MAX_DELAY_MS").unwrap_or(d.retry_max_delay_ms),
            submit_timeout_secs: env_parse("SUBMIT_TIMEOUT").unwrap_or(d.submit_timeout_secs),
            submit_max_retries: env_parse("SUBMIT_MAX_RETRIES").unwrap_or(d.submit_max_retries),
            browser_timeout_ms: env_parse("BROWSER_TIMEOUT").unwrap_or(d.browser_timeout_ms),
            browser_headless: env_parse("BROWSER_HEADLESS").unwrap_or(d.browser_headless),
            browser_max_retries: env_parse("BROWSER_MAX_RETRIES").unwrap_or(d.browser_max_retries),
            chrome_executable: env_string("CHROME_EXECUTABLE").or(d.chrome_executable),
            llm_api_key: env_string("LLM_API_KEY").unwrap_or(d.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL").unwrap_or(d.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME").unwrap_or(d.llm_model_name),
            llm_vision_model_name: env_string("LLM_VISION_MODEL_NAME").unwrap_or(d.llm_vision_model_name),
            llm_transcription_model: env_string("LLM_TRANSCRIPTION_MODEL")
                .unwrap_or(d.llm_transcription_model),
            llm_max_iterations: env_parse("LLM_MAX_ITERATIONS").unwrap_or(d.llm_max_iterations),
            llm_max_retries: env_parse("LLM_MAX_RETRIES").unwrap_or(d.llm_max_retries),
            llm_prompt_cost_per_1k: env_parse("LLM_PROMPT_COST_PER_1K").unwrap_or(d.llm_prompt_cost_per_1k),
            llm_completion_cost_per_1k: env_parse("LLM_COMPLETION_COST_PER_1K")
                .unwrap_or(d.llm_completion_cost_per_1k),
            max_file_size_mb: env_parse("MAX_FILE_SIZE_MB").unwrap_or(d.max_file_size_mb),
            download_timeout_secs: env_parse("DOWNLOAD_TIMEOUT").unwrap_or(d.download_timeout_secs),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(d.verbose_logging),
        }
    }

    /// 下载大小上限（字节）
    pub fn max_file_size_bytes(&self) -> usize {
        (self.max_file_size_mb as usize).saturating_mul(1024 * 1024)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
