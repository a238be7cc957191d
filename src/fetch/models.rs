// src/fetch/models.rs
use serde::Serialize;
use thiserror::Error;

/// One page to fetch, with the target it stands for (a ticker, a city slug, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub label: String,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self { url: url.into(), label: label.into() }
    }
}

/// A page as delivered by the fetch provider.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// What ultimately went wrong with a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCause {
    HttpStatus(u16),
    Timeout,
    Network,
    Configuration,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Network request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid fetch configuration: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else if let Some(status) = err.status() {
            FetchError::Status { url: url.to_string(), status: status.as_u16() }
        } else {
            FetchError::Network { url: url.to_string(), source: err }
        }
    }

    pub fn cause(&self) -> FetchCause {
        match self {
            FetchError::Status { status, .. } => FetchCause::HttpStatus(*status),
            FetchError::Timeout { .. } => FetchCause::Timeout,
            FetchError::Network { .. } => FetchCause::Network,
            FetchError::InvalidRequest(_) => FetchCause::Configuration,
        }
    }

    /// Throttling, server errors, timeouts and transport failures may succeed on a retry.
    pub fn is_retryable(&self) -> bool {
        match self.cause() {
            FetchCause::HttpStatus(status) => status == 429 || status == 408 || (500..600).contains(&status),
            FetchCause::Timeout | FetchCause::Network => true,
            FetchCause::Configuration => false,
        }
    }
}
