//! 重试策略
//!
//! 指数退避：`delay = min(base × multiplier^attempt, cap)`。
//! 网络重试、推理服务限流重试、页面渲染重试都走同一个 [`RetryPolicy::execute`]。

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{ErrorCategory, Result};

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 首次尝试之后最多再重试几次
    pub max_retries: u32,
    /// 基础延迟
    pub base_delay: Duration,
    /// 指数底数
    pub multiplier: f64,
    /// 单次延迟上限
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.retry_max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            multiplier: config.retry_multiplier,
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// 第 `attempt` 次（从 0 开始）重试前应等待的时间
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// 带重试地执行异步操作
    ///
    /// # 参数
    /// - `label`: 操作名（仅用于日志）
    /// - `max_retries`: 覆盖默认的重试次数
    /// - `retry_on`: 可选的分类白名单，不在名单内的错误立即返回
    /// - `operation`: 每次调用都会产生一个新的 future
    ///
    /// # 返回
    /// 成功结果，或最后一次失败的错误
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        max_retries: Option<u32>,
        retry_on: Option<&[ErrorCategory]>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = max_retries.unwrap_or(self.max_retries);
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("✓ {} 第 {} 次尝试成功", label, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let category = err.category;

                    if let Some(allowed) = retry_on {
                        if !allowed.contains(&category) {
                            error!("{} 失败，分类 {} 不在重试名单内: {}", label, category, err);
                            return Err(err);
                        }
                    }

                    if !category.is_retryable() {
                        error!("{} 失败，分类 {} 不可重试: {}", label, category, err);
                        return Err(err);
                    }

                    if attempt >= max_retries {
                        error!(
                            "{} 失败，已尝试 {} 次，放弃: {}",
                            label,
                            attempt + 1,
                            err
                        );
                        return Err(err.with_context("attempts", attempt + 1));
                    }

                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "⚠️ {} 失败 ({}/{}), {:?} 后重试: {}",
                        label,
                        attempt + 1,
                        max_retries + 1,
                        delay,
                        err
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuizError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        };
        let delays: Vec<u64> = (0..6).map(|n| policy.backoff_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn backoff_is_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..200 {
            let delay = policy.backoff_delay(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast_policy(3)
            .execute("flaky", None, None, || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(QuizError::network("connection reset"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        tokio_test::assert_ok!(&result);
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_and_validation_are_never_retried() {
        for err in [QuizError::auth("403"), QuizError::validation("bad body")] {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = calls.clone();
            let category = err.category;
            let mut slot = Some(err);
            let result: Result<()> = fast_policy(10)
                .execute("no-retry", None, None, || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let err = slot.take().unwrap_or_else(|| QuizError::new(category, "again"));
                    async move { Err(err) }
                })
                .await;
            tokio_test::assert_err!(&result);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn gives_up_after_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = fast_policy(2)
            .execute("always-timeout", None, None, || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(QuizError::timeout("slow")) }
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Timeout);
        assert_eq!(err.context.get("attempts").map(String::as_str), Some("3"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn allow_list_filters_categories() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = fast_policy(5)
            .execute(
                "llm-only",
                None,
                Some(&[ErrorCategory::ReasoningService]),
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(QuizError::data_processing("bad json")) }
                },
            )
            .await;
        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
