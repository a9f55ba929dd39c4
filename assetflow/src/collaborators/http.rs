//! HTTP download collaborator.

use crate::errors::Result;
use async_trait::async_trait;
use std::path::Path;

/// Downloads a URL to a local file.
///
/// Retry and backoff policy belong to the implementation; the engine
/// treats any error as fatal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Fetches `url` and writes the body to `destination`.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

#[cfg(feature = "http")]
pub use self::reqwest_fetcher::ReqwestFetcher;

#[cfg(feature = "http")]
mod reqwest_fetcher {
    use super::HttpFetcher;
    use crate::config::FetchConfig;
    use crate::errors::{ExecutionError, Result};
    use async_trait::async_trait;
    use std::path::Path;
    use tokio::io::AsyncWriteExt;

    /// [`HttpFetcher`] backed by a shared `reqwest` client.
    #[derive(Debug, Clone)]
    pub struct ReqwestFetcher {
        client: reqwest::Client,
        max_response_size: u64,
    }

    impl ReqwestFetcher {
        /// Creates a fetcher from fetch settings.
        ///
        /// # Errors
        ///
        /// Returns an `ExecutionError` if the client cannot be constructed.
        pub fn new(config: &FetchConfig) -> Result<Self> {
            let client = reqwest::Client::builder()
                .user_agent(config.user_agent.clone())
                .timeout(config.timeout())
                .build()
                .map_err(|e| ExecutionError::new("fetch", format!("failed to create HTTP client: {e}")))?;
            Ok(Self {
                client,
                max_response_size: u64::try_from(config.max_response_size).unwrap_or(u64::MAX),
            })
        }
    }

    #[async_trait]
    impl HttpFetcher for ReqwestFetcher {
        async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
            let fail = |message: String| ExecutionError::new("fetch", format!("{url}: {message}"));

            tracing::info!(url, destination = %destination.display(), "Downloading");
            let mut response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| fail(e.to_string()))?;

            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::File::create(destination).await?;
            let mut written: u64 = 0;
            while let Some(chunk) = response.chunk().await.map_err(|e| fail(e.to_string()))? {
                written += chunk.len() as u64;
                if written > self.max_response_size {
                    return Err(fail(format!(
                        "response exceeds {} bytes",
                        self.max_response_size
                    ))
                    .into());
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;

            tracing::debug!(url, bytes = written, "Download complete");
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_builds_from_config() {
            let config = FetchConfig::default().with_timeout(5.0);
            let fetcher = ReqwestFetcher::new(&config).unwrap();
            assert_eq!(fetcher.max_response_size, 200 * 1024 * 1024);
        }
    }
}
