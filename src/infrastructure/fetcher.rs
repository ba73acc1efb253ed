//! 文件下载 - 基础设施层

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ErrorCategory, QuizError, Result};
use crate::retry::RetryPolicy;

/// 文件下载能力
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// 下载文件，返回原始字节
    async fn download(&self, url: &Url, headers: Option<&HashMap<String, String>>) -> Result<Vec<u8>>;
}

/// 基于 reqwest 的下载器
pub struct HttpFileFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    retry: RetryPolicy,
}

impl HttpFileFetcher {
    pub fn new(timeout: Duration, max_bytes: usize, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_bytes,
            retry,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            Duration::from_secs(config.download_timeout_secs),
            config.max_file_size_bytes(),
            RetryPolicy::from_config(config),
        )
    }

    fn too_large(&self, url: &Url, size: usize) -> QuizError {
        QuizError::validation(format!(
            "文件过大: {} 字节，上限 {} 字节",
            size, self.max_bytes
        ))
        .with_context("url", url)
    }

    async fn download_once(
        &self,
        url: &Url,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Vec<u8>> {
        let mut request = self.client.get(url.clone());
        if let Some(headers) = headers {
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await?.error_for_status()?;

        if let Some(length) = response.content_length() {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            if length > self.max_bytes {
                return Err(self.too_large(url, length));
            }
        }

        let bytes = response.bytes().await?;
        if bytes.len() > self.max_bytes {
            return Err(self.too_large(url, bytes.len()));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FileFetcher for HttpFileFetcher {
    async fn download(&self, url: &Url, headers: Option<&HashMap<String, String>>) -> Result<Vec<u8>> {
        debug!("下载文件: {}", url);
        let bytes = self
            .retry
            .execute(
                "文件下载",
                None,
                Some(&[ErrorCategory::Network, ErrorCategory::Timeout]),
                || self.download_once(url, headers),
            )
            .await?;
        info!("📥 下载完成: {} ({} 字节)", url, bytes.len());
        Ok(bytes)
    }
}
