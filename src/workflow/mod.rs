pub mod coerce;
pub mod context;
pub mod quiz_ctx;
pub mod solver;
pub mod tools;

pub use coerce::AnswerCoercer;
pub use context::{ExecutionContext, MediaAsset};
pub use quiz_ctx::QuizCtx;
pub use solver::{QuizSolver, SolverSettings, ToolCallingSolver};
pub use tools::{tool_menu, Blob, ToolExecutor, ToolKind, ToolOutcome, ToolOutput};
