// src/sites/aqi.rs
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::extractors::{match_readings, DateWindow, ExtractedRecord, HtmlPage, RecordAssembler, RecordMeta};
use crate::fetch::{RenderedDocument, RequestDescriptor};
use crate::sites::Site;
use crate::utils::html_debug::{capped_excerpt, DEBUG_EXCERPT_CHARS};

const AQI_BASE_URL: &str = "https://www.aqi.in/dashboard/pakistan";

static NON_SLUG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\w\s-]").expect("Failed to compile NON_SLUG_RE")
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RE")
});

#[derive(Debug, Clone, Serialize)]
pub struct AqiInput {
    pub city: String,
    pub province: Option<String>,
    pub days: u32,
    pub debug: bool,
}

/// "Dera Ghazi Khan" -> "dera-ghazi-khan"
pub fn slugify(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let kept = NON_SLUG_RE.replace_all(&lowered, "");
    WHITESPACE_RE.replace_all(&kept, "-").into_owned()
}

/// Air-quality dashboard: one reading per day of the requested window.
pub struct AqiSite {
    input: AqiInput,
    base_url: String,
}

impl AqiSite {
    pub fn new(input: AqiInput) -> Self {
        Self::with_base_url(input, AQI_BASE_URL)
    }

    pub fn with_base_url(input: AqiInput, base_url: &str) -> Self {
        Self { input, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn params(&self) -> Value {
        json!({
            "city": self.input.city,
            "province": self.input.province,
            "days": self.input.days,
            "debug": self.input.debug,
        })
    }
}

impl Site for AqiSite {
    fn name(&self) -> &'static str {
        "aqi"
    }

    fn requests(&self) -> Vec<RequestDescriptor> {
        let city = slugify(&self.input.city);
        let mut requests = vec![RequestDescriptor::new(format!("{}/{}", self.base_url, city), city.clone())];

        if let Some(province) = &self.input.province {
            let province = slugify(province);
            requests.push(RequestDescriptor::new(
                format!("{}/{}/{}", self.base_url, province, city),
                format!("{}-{}", province, city),
            ));
        }
        requests
    }

    fn extract(&self, request: &RequestDescriptor, document: &RenderedDocument, fetched_at: DateTime<Utc>) -> ExtractedRecord {
        let page = HtmlPage::parse(&document.body);
        let window = DateWindow::ending_at(fetched_at, self.input.days);
        let readings = match_readings(&page, &window);
        let found_any = readings.iter().any(|r| r.value.is_some());
        tracing::debug!(
            "{}: {} of {} days matched",
            request.label,
            readings.iter().filter(|r| r.is_matched()).count(),
            readings.len()
        );

        let mut assembler = RecordAssembler::new(RecordMeta {
            source: self.name().to_string(),
            url: document.url.clone(),
            target: json!({ "city": self.input.city, "province": self.input.province }),
            params: self.params(),
            fetched_at,
        });
        assembler
            .field("city", self.input.city.as_str())
            .field("province", self.input.province.clone())
            .field("days_requested", self.input.days)
            .data("results", Value::Array(readings.iter().map(|r| r.to_value()).collect()), found_any)
            .field("found_any", found_any);

        let snippet = self.input.debug.then(|| capped_excerpt(&document.body, DEBUG_EXCERPT_CHARS));
        assembler.field("debug_html_snippet", snippet);
        assembler.finish()
    }

    fn debug(&self) -> bool {
        self.input.debug
    }

    fn debug_patterns(&self, fetched_at: DateTime<Utc>) -> Vec<(String, &'static str)> {
        DateWindow::ending_at(fetched_at, self.input.days)
            .labels()
            .into_iter()
            .map(|label| (regex::escape(&label), "date"))
            .collect()
    }
}
