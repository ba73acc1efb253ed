//! 测验处理上下文
//!
//! 封装"我正在处理测验链中的第几题、第几次尝试"这一信息

use std::fmt::Display;

use reqwest::Url;

/// 测验处理上下文
#[derive(Debug, Clone)]
pub struct QuizCtx {
    /// 测验在链中的序号（从1开始，仅用于日志显示）
    pub quiz_index: usize,

    /// 当前尝试次数（从1开始）
    pub attempt: u32,

    /// 测验页面地址
    pub url: Url,
}

impl QuizCtx {
    /// 创建新的测验上下文
    pub fn new(quiz_index: usize, url: Url) -> Self {
        Self {
            quiz_index,
            attempt: 1,
            url,
        }
    }

    /// 同一测验的下一次尝试
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

impl Display for QuizCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.attempt > 1 {
            write!(f, "[测验 {} 第{}次]", self.quiz_index, self.attempt)
        } else {
            write!(f, "[测验 {}]", self.quiz_index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_attempt_only_on_retry() {
        let ctx = QuizCtx::new(3, Url::parse("https://quiz.example/q3").unwrap());
        assert_eq!(ctx.to_string(), "[测验 3]");
        assert_eq!(ctx.next_attempt().to_string(), "[测验 3 第2次]");
    }
}
