// src/lib.rs

//! Single-purpose page scrapers built on a small extraction core.
//!
//! Pages come from a [`fetch::FetchProvider`], are turned into records by declarative
//! [`extractors::RuleSet`]s or the [`extractors::date_window`] matcher, and end up in a
//! [`storage::RecordSink`].

pub mod config;
pub mod extractors;
pub mod fetch;
pub mod runner;
pub mod sites;
pub mod storage;
pub mod utils;
