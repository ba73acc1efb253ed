pub mod chart;
pub mod data_tools;
pub mod pdf;
pub mod submitter;
pub mod task_parser;

pub use chart::{render_chart, render_png, ChartConfig, ChartKind};
pub use data_tools::{Table, TableError};
pub use pdf::PdfDocument;
pub use submitter::{AnswerSubmission, HttpAnswerSubmitter, SubmissionStats};
pub use task_parser::TaskParser;
