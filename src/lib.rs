//! # Quiz Chain Solver
//!
//! 在限定时间内自动求解一条测验链：渲染页面、解析任务、借助推理服务和工具求解、提交答案
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有外部资源，只暴露能力
//! - `PageRenderer` - 无头浏览器渲染页面（chromiumoxide）
//! - `ReasoningService` - 带工具调用的推理服务、图片分析、音频转写（async-openai）
//! - `FileFetcher` - 文件下载（reqwest）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `TaskParser` - 从渲染后的页面中恢复任务定义
//! - `AnswerSubmission` - 提交答案并解析判定结果
//! - `data_tools` / `pdf` / `chart` - 表格处理、PDF 提取与图表渲染
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的求解流程
//! - `ExecutionContext` - 单次求解的暂存空间
//! - `ToolCallingSolver` - 多轮对话 + 工具调用 + 答案转换
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/sequence` - 全局时限内的测验链状态机
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{ErrorCategory, QuizError, Result};
pub use metrics::{InMemoryMetrics, MetricsEvent, MetricsSink, NoopMetrics, TracingMetricsSink};
pub use models::{Identity, SequenceResult, TaskDefinition, TerminalStatus};
pub use orchestrator::{OrchestratorSettings, QuizOrchestrator};
pub use retry::RetryPolicy;
pub use services::{AnswerSubmission, HttpAnswerSubmitter, TaskParser};
pub use workflow::{QuizSolver, SolverSettings, ToolCallingSolver};
