// src/extractors/mod.rs
pub mod assembly;
pub mod date_window;
pub mod document;
pub mod engine;
pub mod rules;

// Re-export key extraction types for convenience
pub use assembly::{ExtractedRecord, RecordAssembler, RecordMeta};
pub use date_window::{match_readings, DateReading, DateWindow};
pub use document::HtmlPage;
pub use engine::extract;
pub use rules::{Column, ExtractionRule, Locator, RowSpec, RuleSet, Transform};
