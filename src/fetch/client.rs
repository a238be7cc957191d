// src/fetch/client.rs
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;

use crate::fetch::models::{FetchError, RenderedDocument, RequestDescriptor};

const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (X11; Linux x86_64) field_scraper/",
    env!("CARGO_PKG_VERSION")
);
const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_MAX_DELAY_SECS: u64 = 30;

/// Anything that can turn a request into a rendered page.
/// Retry policy, proxies and timeouts are the provider's business.
#[async_trait]
pub trait FetchProvider: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<RenderedDocument, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Extra attempts after the first one, for retryable failures only.
    pub max_retries: u32,
    pub timeout: Duration,
    /// When false, environment proxies are ignored too.
    pub use_proxy: bool,
    pub proxy_url: Option<String>,
    pub user_agent: String,
    pub retry_base_delay: Duration,
    /// Upper bound for a single backoff sleep.
    pub retry_max_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries: 1,
            timeout: Duration::from_secs(90),
            use_proxy: true,
            proxy_url: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            retry_max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
        }
    }
}

/// Plain HTTP fetch provider backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(options.user_agent.as_str())
            .timeout(options.timeout);

        if !options.use_proxy {
            builder = builder.no_proxy();
        } else if let Some(proxy_url) = &options.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url.as_str())
                .map_err(|e| FetchError::InvalidRequest(format!("proxy '{}': {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("HTTP client: {}", e)))?;

        tracing::debug!("HTTP fetcher ready: {:?}", options);
        Ok(Self { client, options })
    }

    async fn fetch_once(&self, url: &str) -> Result<RenderedDocument, FetchError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("HTTP error status: {} for URL: {}", status, url);
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| FetchError::from_reqwest(url, e))?;
        tracing::debug!("Downloaded {} bytes from {}", body.len(), final_url);

        Ok(RenderedDocument { url: final_url, status: status.as_u16(), body })
    }
}

/// Exponential backoff: base, 2x base, 4x base and so on, never above `max`.
pub fn retry_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.min(20))).min(max)
}

/// Runs `fetch_once` until it succeeds, fails with a non-retryable error,
/// or `options.max_retries` extra attempts are used up. The last error is returned.
pub(crate) async fn fetch_with_retries<F, Fut>(
    url: &str,
    options: &FetchOptions,
    mut fetch_once: F,
) -> Result<RenderedDocument, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RenderedDocument, FetchError>>,
{
    let mut attempt = 0;
    loop {
        tracing::info!("Fetching {} (attempt {})", url, attempt + 1);
        match fetch_once().await {
            Ok(document) => return Ok(document),
            Err(e) if e.is_retryable() && attempt < options.max_retries => {
                let delay = retry_delay(options.retry_base_delay, options.retry_max_delay, attempt);
                tracing::warn!("Retrying {} in {:?} after: {}", url, delay, e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl FetchProvider for HttpFetcher {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<RenderedDocument, FetchError> {
        fetch_with_retries(&request.url, &self.options, || self.fetch_once(&request.url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let base = Duration::from_millis(500);
        let max = Duration::from_secs(60);
        assert_eq!(retry_delay(base, max, 0), Duration::from_millis(500));
        assert_eq!(retry_delay(base, max, 2), Duration::from_millis(2000));
        assert_eq!(retry_delay(base, max, 20), max);
        assert_eq!(retry_delay(base, max, u32::MAX), max);
    }

    fn quick_options(max_retries: u32) -> FetchOptions {
        FetchOptions { max_retries, retry_base_delay: Duration::ZERO, ..FetchOptions::default() }
    }

    fn page(url: &str) -> RenderedDocument {
        RenderedDocument { url: url.to_string(), status: 200, body: "<p>ok</p>".to_string() }
    }

    #[tokio::test]
    async fn retryable_failures_use_every_retry_and_return_the_last_error() {
        let mut calls: u16 = 0;
        let result = fetch_with_retries("http://site.test/a", &quick_options(2), || {
            calls += 1;
            let status = 500 + calls;
            async move { Err(FetchError::Status { url: "http://site.test/a".to_string(), status }) }
        })
        .await;

        assert_eq!(calls, 3);
        assert!(matches!(result, Err(FetchError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let mut calls = 0;
        let result = fetch_with_retries("http://site.test/b", &quick_options(5), || {
            calls += 1;
            async { Err(FetchError::Status { url: "http://site.test/b".to_string(), status: 404 }) }
        })
        .await;

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn recovers_after_a_transient_failure() {
        let mut calls = 0;
        let result = fetch_with_retries("http://site.test/c", &quick_options(3), || {
            calls += 1;
            let outcome = if calls == 1 {
                Err(FetchError::Status { url: "http://site.test/c".to_string(), status: 429 })
            } else {
                Ok(page("http://site.test/c"))
            };
            async move { outcome }
        })
        .await;

        assert_eq!(calls, 2);
        assert_eq!(result.unwrap().status, 200);
    }

    #[test]
    fn invalid_proxy_is_a_configuration_error() {
        let options = FetchOptions { proxy_url: Some("not a url".into()), ..FetchOptions::default() };
        let err = HttpFetcher::new(options).err().unwrap();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn builds_without_proxy() {
        let options = FetchOptions { use_proxy: false, ..FetchOptions::default() };
        assert!(HttpFetcher::new(options).is_ok());
    }
}
