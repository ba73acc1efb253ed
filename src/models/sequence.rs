//! 测验链的最终结果

use std::fmt;
use std::time::Duration;

/// 终止状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed,
    Timeout,
    Error,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::Completed => "completed",
            TerminalStatus::Timeout => "timeout",
            TerminalStatus::Error => "error",
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次测验链编排的结果
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceResult {
    pub succeeded: bool,
    pub elapsed: Duration,
    pub quizzes_completed: usize,
    pub terminal_status: TerminalStatus,
    /// 失败时的一行错误信息
    pub error: Option<String>,
}
