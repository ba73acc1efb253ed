//! 错误分类体系
//!
//! 所有失败最终都会落到 [`ErrorCategory`] 的某一个分类上，
//! 编排层只看分类和 `retryable`，从不检查具体的错误类型。

use std::collections::BTreeMap;
use std::fmt;

use tracing::error;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 认证失败（403 / 401）
    Auth,
    /// 参数或响应校验失败（400、响应体格式错误、超出大小限制）
    Validation,
    /// 超时
    Timeout,
    /// 页面渲染（浏览器）失败
    Render,
    /// 网络失败
    Network,
    /// 推理服务（LLM API）失败，包括限流
    ReasoningService,
    /// 数据解析 / 处理失败
    DataProcessing,
    /// 任务执行失败（解析不出任务、迭代耗尽等）
    TaskExecution,
    /// 无法识别
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Render => "render",
            ErrorCategory::Network => "network",
            ErrorCategory::ReasoningService => "reasoning-service",
            ErrorCategory::DataProcessing => "data-processing",
            ErrorCategory::TaskExecution => "task-execution",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// 是否值得重试
    ///
    /// auth / validation 需要改代码或改配置，重试不会自愈；unknown 也不重试。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout
                | ErrorCategory::Render
                | ErrorCategory::Network
                | ErrorCategory::ReasoningService
                | ErrorCategory::DataProcessing
                | ErrorCategory::TaskExecution
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 系统内部统一的错误记录
///
/// 内部抛出的错误在创建时就已经打好分类标签；第三方错误通过 `From` 转换时分类。
#[derive(Debug)]
pub struct QuizError {
    pub category: ErrorCategory,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub context: BTreeMap<String, String>,
}

impl fmt::Display for QuizError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

impl std::error::Error for QuizError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ========== 便捷构造函数 ==========

impl QuizError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Auth, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Render, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Network, message)
    }

    pub fn reasoning(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ReasoningService, message)
    }

    pub fn data_processing(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::DataProcessing, message)
    }

    pub fn task_execution(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TaskExecution, message)
    }

    /// 附加底层原因
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// 附加上下文字段（用于日志）
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    /// 一行摘要，直接给最终结果使用
    ///
    /// 消息中的换行和连续空白（例如远端返回的原因）会被压缩成单个空格。
    pub fn summary(&self) -> String {
        format!(
            "[{}] {}",
            self.category,
            self.message.split_whitespace().collect::<Vec<_>>().join(" ")
        )
    }
}

// ========== 分类 ==========

const AUTH_SIGNALS: &[&str] = &["403", "forbidden", "unauthorized"];
const VALIDATION_SIGNALS: &[&str] = &["400", "validation", "invalid"];
const RENDER_TYPE_SIGNALS: &[&str] = &["playwright", "chromium", "cdp"];
const NETWORK_TYPE_SIGNALS: &[&str] = &["http", "connection", "network", "reqwest"];
const REASONING_TYPE_SIGNALS: &[&str] = &["openai", "ratelimit", "api"];
const DATA_TYPE_SIGNALS: &[&str] = &["parse", "decode", "json", "csv", "pdf"];

/// 对任意错误进行分类
///
/// 已经带分类的 [`QuizError`] 直接返回自身分类，其它错误按类型名和消息中的关键字判断。
pub fn classify<E>(error: &E) -> ErrorCategory
where
    E: std::error::Error + 'static,
{
    let any: &(dyn std::error::Error + 'static) = error;
    if let Some(quiz_error) = any.downcast_ref::<QuizError>() {
        return quiz_error.category;
    }
    classify_signals(std::any::type_name::<E>(), &error.to_string())
}

/// 按关键字优先级分类，顺序即优先级
pub fn classify_signals(type_name: &str, message: &str) -> ErrorCategory {
    let type_name = type_name.to_lowercase();
    let message = message.to_lowercase();
    let in_type = |signals: &[&str]| signals.iter().any(|s| type_name.contains(s));
    let in_message = |signals: &[&str]| signals.iter().any(|s| message.contains(s));

    if in_message(AUTH_SIGNALS) {
        return ErrorCategory::Auth;
    }
    if in_message(VALIDATION_SIGNALS) {
        return ErrorCategory::Validation;
    }
    if type_name.contains("timeout") || message.contains("timeout") || message.contains("timed out") {
        return ErrorCategory::Timeout;
    }
    if in_type(RENDER_TYPE_SIGNALS) || message.contains("browser") {
        return ErrorCategory::Render;
    }
    if in_type(NETWORK_TYPE_SIGNALS) {
        return ErrorCategory::Network;
    }
    if in_type(REASONING_TYPE_SIGNALS) || message.contains("rate limit") {
        return ErrorCategory::ReasoningService;
    }
    if in_type(DATA_TYPE_SIGNALS) {
        return ErrorCategory::DataProcessing;
    }
    ErrorCategory::Unknown
}

/// 统一的错误日志出口
pub fn report(error: &QuizError, stage: &str) {
    let context = error
        .context
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    error!(
        stage,
        category = error.category.as_str(),
        retryable = error.is_retryable(),
        "❌ {} {}",
        error,
        if context.is_empty() { String::new() } else { format!("({})", context) }
    );
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for QuizError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        let category = match err {
            chromiumoxide::error::CdpError::Timeout => ErrorCategory::Timeout,
            _ => ErrorCategory::Render,
        };
        QuizError::new(category, format!("浏览器操作失败: {}", err)).with_source(err)
    }
}

impl From<reqwest::Error> for QuizError {
    fn from(err: reqwest::Error) -> Self {
        let category = if err.is_timeout() {
            ErrorCategory::Timeout
        } else if let Some(status) = err.status() {
            categorize_status(status.as_u16())
        } else if err.is_decode() {
            ErrorCategory::Validation
        } else {
            ErrorCategory::Network
        };
        QuizError::new(category, format!("HTTP 请求失败: {}", err)).with_source(err)
    }
}

impl From<serde_json::Error> for QuizError {
    fn from(err: serde_json::Error) -> Self {
        QuizError::data_processing(format!("JSON 解析失败: {}", err)).with_source(err)
    }
}

impl From<base64::DecodeError> for QuizError {
    fn from(err: base64::DecodeError) -> Self {
        QuizError::data_processing(format!("base64 解码失败: {}", err)).with_source(err)
    }
}

impl From<async_openai::error::OpenAIError> for QuizError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        use async_openai::error::OpenAIError;

        let category = match &err {
            OpenAIError::ApiError(api) => categorize_api_error(api),
            OpenAIError::InvalidArgument(message) => match classify_signals("", message) {
                ErrorCategory::Auth => ErrorCategory::Auth,
                _ => ErrorCategory::Validation,
            },
            OpenAIError::Reqwest(inner) if inner.is_timeout() => ErrorCategory::Timeout,
            OpenAIError::Reqwest(inner) => match inner.status().map(|s| categorize_status(s.as_u16())) {
                Some(category @ (ErrorCategory::Auth | ErrorCategory::Validation)) => category,
                _ => ErrorCategory::ReasoningService,
            },
            _ => ErrorCategory::ReasoningService,
        };
        QuizError::new(category, format!("推理服务调用失败: {}", err)).with_source(err)
    }
}

const API_AUTH_CODES: &[&str] = &[
    "invalid_api_key",
    "authentication_error",
    "permission_error",
    "permission_denied",
    "insufficient_quota",
];
const API_TRANSIENT_CODES: &[&str] = &[
    "rate_limit_exceeded",
    "rate_limit_error",
    "server_error",
    "overloaded_error",
    "timeout",
];

/// 推理服务返回的错误对象分类
///
/// 先看 `code` / `type`，再按消息关键字判断；只有认证和校验类错误是永久性的。
fn categorize_api_error(api: &async_openai::error::ApiError) -> ErrorCategory {
    let tags: Vec<String> = [api.code.as_deref(), api.r#type.as_deref()]
        .into_iter()
        .flatten()
        .map(str::to_lowercase)
        .collect();
    let tagged = |codes: &[&str]| tags.iter().any(|t| codes.contains(&t.as_str()));

    if tagged(API_AUTH_CODES) {
        return ErrorCategory::Auth;
    }
    if tagged(API_TRANSIENT_CODES) {
        return ErrorCategory::ReasoningService;
    }
    match classify_signals("", &api.message) {
        ErrorCategory::Auth => ErrorCategory::Auth,
        ErrorCategory::Validation => ErrorCategory::Validation,
        _ if tags.iter().any(|t| t == "invalid_request_error") => ErrorCategory::Validation,
        _ => ErrorCategory::ReasoningService,
    }
}

impl From<regex::Error> for QuizError {
    fn from(err: regex::Error) -> Self {
        QuizError::task_execution(format!("正则表达式无效: {}", err)).with_source(err)
    }
}

impl From<toml::de::Error> for QuizError {
    fn from(err: toml::de::Error) -> Self {
        QuizError::validation(format!("TOML 配置解析失败: {}", err)).with_source(err)
    }
}

impl From<std::io::Error> for QuizError {
    fn from(err: std::io::Error) -> Self {
        let category = match err.kind() {
            std::io::ErrorKind::TimedOut => ErrorCategory::Timeout,
            _ => classify(&err),
        };
        QuizError::new(category, format!("IO 错误: {}", err)).with_source(err)
    }
}

/// HTTP 状态码到分类的映射
pub fn categorize_status(status: u16) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::Auth,
        408 | 504 => ErrorCategory::Timeout,
        429 => ErrorCategory::ReasoningService,
        400..=499 => ErrorCategory::Validation,
        _ => ErrorCategory::Network,
    }
}

// ========== Result 类型别名 ==========

/// 库内统一的结果类型
pub type Result<T> = std::result::Result<T, QuizError>;
