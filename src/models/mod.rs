pub mod conversation;
pub mod sequence;
pub mod submission;
pub mod task;

pub use conversation::{ChatMessage, ModelTurn, TokenUsage, ToolCall, ToolDescriptor};
pub use sequence::{SequenceResult, TerminalStatus};
pub use submission::{Identity, SubmissionOutcome, SubmitPayload, SubmitResponse};
pub use task::{AnswerShape, TaskDefinition};
