// src/sites/mod.rs
pub mod aqi;
pub mod psx;

use chrono::{DateTime, Utc};

use crate::extractors::ExtractedRecord;
use crate::fetch::{RenderedDocument, RequestDescriptor};

/// One scraper variant: which pages to request and how a page becomes a record.
pub trait Site: Send + Sync {
    /// Short name used for the output folder and logs.
    fn name(&self) -> &'static str;

    fn requests(&self) -> Vec<RequestDescriptor>;

    /// Pure transform of one delivered page into one record.
    fn extract(
        &self,
        request: &RequestDescriptor,
        document: &RenderedDocument,
        fetched_at: DateTime<Utc>,
    ) -> ExtractedRecord;

    fn debug(&self) -> bool;

    /// Regex patterns worth highlighting in the debug snapshot of a page fetched at `fetched_at`,
    /// with their highlight type.
    fn debug_patterns(&self, fetched_at: DateTime<Utc>) -> Vec<(String, &'static str)>;
}
