//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责测验链的调度，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! sequence::QuizOrchestrator (处理整条测验链)
//!     ↓
//! workflow::QuizSolver (处理单个任务)
//!     ↓
//! services (能力层：解析 / 提交 / 数据工具 / 图表)
//!     ↓
//! infrastructure (基础设施：渲染器 / 推理服务 / 下载器)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层决定渲染器资源何时释放
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度、计时和统计

pub mod sequence;

pub use sequence::{OrchestratorSettings, QuizOrchestrator};
