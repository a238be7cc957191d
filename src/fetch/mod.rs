// src/fetch/mod.rs
pub mod client;
pub mod models;

pub use client::{FetchOptions, FetchProvider, HttpFetcher};
pub use models::{FetchError, RenderedDocument, RequestDescriptor};
