// src/extractors/date_window.rs

//! Pairs each of the last N calendar days with a reading found in a table row
//! labelled with that day's ISO date.

use chrono::{DateTime, Days, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::extractors::document::{PageDocument, PageNode};
use crate::extractors::engine::first_integer;

pub const MIN_DAYS: u32 = 1;
pub const MAX_DAYS: u32 = 90;

const ISO_FORMAT: &str = "%Y-%m-%d";

// Date labels are removed from a row before looking for the reading, so the
// year or day of the label itself is never mistaken for a value.
static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}").expect("Failed to compile ISO_DATE_RE")
});

/// The last `days` calendar dates, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    dates: Vec<NaiveDate>,
}

impl DateWindow {
    /// Window ending on the UTC calendar date of `at`.
    pub fn ending_at(at: DateTime<Utc>, days: u32) -> Self {
        Self::ending_on(at.date_naive(), days)
    }

    /// `days` is clamped to [`MIN_DAYS`, `MAX_DAYS`].
    pub fn ending_on(today: NaiveDate, days: u32) -> Self {
        let days = days.clamp(MIN_DAYS, MAX_DAYS);
        let dates = (0..days)
            .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
            .collect();
        Self { dates }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn labels(&self) -> Vec<String> {
        self.dates.iter().map(|d| d.format(ISO_FORMAT).to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReadingNote {
    #[serde(rename = "not found yet")]
    NotFoundYet,
    #[serde(rename = "matched")]
    Matched,
    #[serde(rename = "label found, no reading")]
    LabelWithoutReading,
}

impl ReadingNote {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingNote::NotFoundYet => "not found yet",
            ReadingNote::Matched => "matched",
            ReadingNote::LabelWithoutReading => "label found, no reading",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateReading {
    pub date: String,
    pub value: Option<i64>,
    pub note: ReadingNote,
}

impl DateReading {
    fn pending(date: String) -> Self {
        Self { date, value: None, note: ReadingNote::NotFoundYet }
    }

    pub fn is_matched(&self) -> bool {
        self.note == ReadingNote::Matched
    }

    pub fn to_value(&self) -> Value {
        json!({
            "date": self.date,
            "value": self.value,
            "note": self.note.as_str(),
        })
    }
}

/// The reading in a row: first digit run once every ISO date label is blanked out.
pub fn row_reading(row_text: &str) -> Option<i64> {
    let without_dates = ISO_DATE_RE.replace_all(row_text, " ");
    first_integer(&without_dates)
}

/// Scans every `table tr` in document order and fills the window.
///
/// A matched date is final; the first row carrying a reading wins. A row holding the
/// label but no digits leaves the date as `LabelWithoutReading`, still open to a later row.
pub fn match_readings<D: PageDocument>(document: &D, window: &DateWindow) -> Vec<DateReading> {
    let mut readings: Vec<DateReading> = window.labels().into_iter().map(DateReading::pending).collect();

    let rows: Vec<String> = document
        .root()
        .select_all("table tr")
        .into_iter()
        .map(|row| row.text_fragments().join(" "))
        .collect();
    tracing::debug!("Scanning {} table rows for {} dates", rows.len(), readings.len());

    for row in &rows {
        for reading in readings.iter_mut().filter(|r| !r.is_matched()) {
            if !row.contains(reading.date.as_str()) {
                continue;
            }
            match row_reading(row) {
                Some(value) => {
                    reading.value = Some(value);
                    reading.note = ReadingNote::Matched;
                }
                None => {
                    tracing::trace!("Row labelled {} carries no reading", reading.date);
                    reading.note = ReadingNote::LabelWithoutReading;
                }
            }
        }
    }

    readings
}
