//! 页面渲染器 - 基础设施层
//!
//! 持有唯一的浏览器资源，只暴露"渲染页面拿到 HTML"的能力

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use reqwest::Url;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ErrorCategory, QuizError, Result};
use crate::retry::RetryPolicy;

/// 页面渲染能力
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// 渲染页面（执行页面脚本）并返回最终 HTML
    ///
    /// 内部对加载超时做有限次数的重试，耗尽后返回 render 分类错误。
    async fn render(&self, url: &Url, timeout: Duration) -> Result<String>;

    /// 释放底层资源，可重复调用
    async fn release(&self);
}

/// 浏览器启动参数
#[derive(Debug, Clone)]
pub struct ChromiumSettings {
    pub headless: bool,
    pub chrome_executable: Option<String>,
    pub max_retries: u32,
}

impl ChromiumSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            headless: config.browser_headless,
            chrome_executable: config.chrome_executable.clone(),
            max_retries: config.browser_max_retries,
        }
    }
}

struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// 基于 chromiumoxide 的渲染器
///
/// 浏览器在第一次渲染时惰性启动，`release` 后下一次渲染会重新启动。
pub struct ChromiumRenderer {
    settings: ChromiumSettings,
    retry: RetryPolicy,
    session: Mutex<Option<BrowserSession>>,
}

impl ChromiumRenderer {
    pub fn new(settings: ChromiumSettings, retry: RetryPolicy) -> Self {
        Self {
            settings,
            retry,
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ChromiumSettings::from_config(config), RetryPolicy::from_config(config))
    }

    /// 启动无头浏览器
    async fn launch(&self) -> Result<BrowserSession> {
        info!("🚀 启动无头浏览器...");

        let mut builder = BrowserConfig::builder();
        builder = if self.settings.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(executable) = &self.settings.chrome_executable {
            builder = builder.chrome_executable(Path::new(executable));
        }
        let config = builder
            .args(vec![
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
            ])
            .build()
            .map_err(|e| {
                error!("配置无头浏览器失败: {}", e);
                QuizError::render(format!("配置无头浏览器失败: {}", e))
            })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            error!("启动无头浏览器失败: {}", e);
            QuizError::from(e)
        })?;

        // 在后台处理浏览器事件
        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        debug!("无头浏览器启动成功");
        Ok(BrowserSession { browser, handler })
    }

    async fn render_once(&self, url: &Url, timeout: Duration) -> Result<String> {
        let mut session = self.session.lock().await;
        if session.is_none() {
            *session = Some(self.launch().await?);
        }
        let Some(active) = session.as_ref() else {
            return Err(QuizError::render("浏览器未启动"));
        };

        let load = async {
            let page = active.browser.new_page(url.as_str()).await?;
            page.wait_for_navigation().await?;
            let html = page.content().await?;
            if let Err(e) = page.close().await {
                debug!("关闭页面失败: {}", e);
            }
            Ok::<_, QuizError>(html)
        };

        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(QuizError::timeout(format!(
                "页面加载超时 ({:?}): {}",
                timeout, url
            ))),
        }
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<String> {
        debug!("渲染页面: {}", url);
        let result = self
            .retry
            .execute(
                "页面渲染",
                Some(self.settings.max_retries),
                Some(&[ErrorCategory::Timeout, ErrorCategory::Render, ErrorCategory::Network]),
                || self.render_once(url, timeout),
            )
            .await;

        match result {
            Ok(html) => {
                info!("✅ 页面渲染完成: {} ({} 字符)", url, html.len());
                Ok(html)
            }
            Err(err) if err.category == ErrorCategory::Render => Err(err),
            Err(err) => Err(QuizError::render(format!("页面渲染失败: {}", err.message))
                .with_context("url", url)
                .with_source(err)),
        }
    }

    async fn release(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };
        if let Err(e) = session.browser.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        if let Err(e) = session.browser.wait().await {
            debug!("等待浏览器退出失败: {}", e);
        }
        session.handler.abort();
        info!("🧹 浏览器已释放");
    }
}
