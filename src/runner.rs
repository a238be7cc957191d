// src/runner.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::extractors::ExtractedRecord;
use crate::fetch::{FetchError, FetchProvider, RenderedDocument, RequestDescriptor};
use crate::sites::Site;
use crate::storage::{RecordSink, StorageManager};
use crate::utils::AppError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Pages that produced a stored record.
    pub succeeded: usize,
    /// Stored records that carried no data.
    pub empty: usize,
    /// Pages that could not be fetched, or whose record could not be stored.
    pub failed: usize,
}

type Outcome = (RequestDescriptor, Result<(ExtractedRecord, RenderedDocument, DateTime<Utc>), FetchError>);

/// Fetches every request of `site`, extracts each page and hands the records to `sink`.
///
/// Pages are fetched and extracted concurrently, at most `max_concurrency` at a time.
/// A failed fetch is logged and produces no record; it never stops the other requests.
pub async fn run<S: RecordSink>(
    site: Arc<dyn Site>,
    provider: Arc<dyn FetchProvider>,
    sink: &mut S,
    max_concurrency: usize,
    snapshots: Option<&StorageManager>,
) -> Result<RunSummary, AppError> {
    let requests = site.requests();
    tracing::info!("Starting {} scraper for {} page(s)", site.name(), requests.len());

    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks: JoinSet<Outcome> = JoinSet::new();

    for request in requests {
        let site = Arc::clone(&site);
        let provider = Arc::clone(&provider);
        let permits = Arc::clone(&permits);

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                let err = FetchError::InvalidRequest("fetch slots closed".to_string());
                return (request, Err(err));
            };
            let outcome = match provider.fetch(&request).await {
                Ok(document) => {
                    let fetched_at = Utc::now();
                    let record = site.extract(&request, &document, fetched_at);
                    Ok((record, document, fetched_at))
                }
                Err(e) => Err(e),
            };
            (request, outcome)
        });
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = tasks.join_next().await {
        let (request, outcome) = joined
            .map_err(|e| AppError::Processing(format!("Scrape task failed: {}", e)))?;

        let (record, document, fetched_at) = match outcome {
            Ok(done) => done,
            Err(e) => {
                tracing::error!("Failed to crawl {}: {} (retryable: {})", request.url, e, e.is_retryable());
                summary.failed += 1;
                continue;
            }
        };

        if record.has_data() {
            tracing::info!("Scraped {} (HTTP {}) - found data", document.url, document.status);
        } else {
            tracing::warn!("No data parsed from {}", request.url);
            summary.empty += 1;
        }

        if let Some(storage) = snapshots.filter(|_| site.debug()) {
            if let Err(e) = storage.save_debug_snapshot(site.name(), &request.label, &document.body, &site.debug_patterns(fetched_at)) {
                tracing::warn!("Failed to create debug HTML: {}", e);
            }
        }

        match sink.push(&record) {
            Ok(_) => summary.succeeded += 1,
            Err(e) => {
                tracing::error!("Failed to save record for {}: {}", request.url, e);
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        "Processing finished. Success: {}, Empty: {}, Failures: {}",
        summary.succeeded, summary.empty, summary.failed
    );
    Ok(summary)
}
