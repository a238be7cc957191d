// src/extractors/assembly.rs
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::extractors::engine::SectionRecord;

/// Request metadata stamped on every record.
#[derive(Debug, Clone)]
pub struct RecordMeta {
    pub source: String,
    pub url: String,
    pub target: Value,
    pub params: Value,
    pub fetched_at: DateTime<Utc>,
}

/// A finished record, ready for the sink. Not modifiable after assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtractedRecord {
    fields: Map<String, Value>,
}

impl ExtractedRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn source(&self) -> &str {
        self.fields.get("source").and_then(Value::as_str).unwrap_or_default()
    }

    /// Mirrors the `no_data_parsed` flag.
    pub fn has_data(&self) -> bool {
        !self.fields.get("no_data_parsed").and_then(Value::as_bool).unwrap_or(true)
    }
}

/// Combines independently extracted sections into one record keyed by section name.
///
/// Sections that came back empty are kept with their defaults; the record reports
/// which fields defaulted under `missing_fields` and sets `no_data_parsed` when no
/// data-bearing entry yielded anything.
pub struct RecordAssembler {
    fields: Map<String, Value>,
    missing: Map<String, Value>,
    has_data: bool,
}

impl RecordAssembler {
    pub fn new(meta: RecordMeta) -> Self {
        let mut fields = Map::new();
        fields.insert("source".into(), Value::String(meta.source));
        fields.insert("source_url".into(), Value::String(meta.url));
        fields.insert(
            "fetched_at".into(),
            Value::String(meta.fetched_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        fields.insert("target".into(), meta.target);
        fields.insert("params".into(), meta.params);

        Self { fields, missing: Map::new(), has_data: false }
    }

    /// Plain metadata entry; does not count towards `no_data_parsed`.
    pub fn field(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Data-bearing entry produced outside a rule set.
    pub fn data(&mut self, name: &str, value: Value, has_data: bool) -> &mut Self {
        self.has_data |= has_data;
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn section(&mut self, record: SectionRecord) -> &mut Self {
        self.has_data |= record.has_data();

        if !record.absences.is_empty() {
            let mut report = Map::new();
            for (field, absence) in &record.absences {
                report.insert(field.clone(), serde_json::to_value(absence).unwrap_or(Value::Null));
            }
            self.missing.insert(record.section.clone(), Value::Object(report));
        }

        let value = if record.flat {
            record.fields.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)
        } else {
            Value::Object(record.fields)
        };
        self.fields.insert(record.section, value);
        self
    }

    pub fn finish(self) -> ExtractedRecord {
        let mut fields = self.fields;
        fields.insert("missing_fields".into(), Value::Object(self.missing));
        fields.insert("no_data_parsed".into(), Value::Bool(!self.has_data));
        ExtractedRecord { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::document::HtmlPage;
    use crate::extractors::engine::extract;
    use crate::extractors::rules::{ExtractionRule, Locator, RowSpec, RuleSet};
    use chrono::TimeZone;
    use serde_json::json;

    fn meta() -> RecordMeta {
        RecordMeta {
            source: "psx".into(),
            url: "https://example.test/company/SYS".into(),
            target: json!("SYS"),
            params: json!({"symbols": ["SYS"]}),
            fetched_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        }
    }

    fn sections() -> (RuleSet, RuleSet) {
        let profile = RuleSet::new(
            "company_profile",
            vec![
                ExtractionRule::text("address", Locator::css("h4").containing("ADDRESS").next("p")),
                ExtractionRule::text("auditor", Locator::css("h4").containing("AUDITOR").next("p")),
            ],
        )
        .unwrap();
        let payouts = RuleSet::single(
            "payouts",
            Locator::css("h3").containing("Payouts").parent().find("table tr"),
            crate::extractors::rules::Transform::Rows(RowSpec::inferred()),
            json!([]),
        )
        .unwrap();
        (profile, payouts)
    }

    #[test]
    fn missing_section_does_not_block_the_others() {
        let page = HtmlPage::parse("<div><h4>ADDRESS</h4><p>Karachi</p></div>");
        let (profile, payouts) = sections();

        let mut assembler = RecordAssembler::new(meta());
        assembler
            .section(extract(&page, &profile))
            .section(extract(&page, &payouts));
        let record = assembler.finish();

        assert_eq!(record.get("company_profile"), Some(&json!({"address": "Karachi", "auditor": ""})));
        assert_eq!(record.get("payouts"), Some(&json!([])));
        assert_eq!(
            record.get("missing_fields"),
            Some(&json!({
                "company_profile": {"auditor": "field_absent"},
                "payouts": {"payouts": "field_absent"}
            }))
        );
        assert!(record.has_data());
        assert_eq!(record.source(), "psx");
        assert_eq!(record.get("fetched_at"), Some(&json!("2024-05-01T08:30:00.000Z")));
    }

    #[test]
    fn empty_page_is_flagged_but_still_complete() {
        let page = HtmlPage::parse("<p>maintenance</p>");
        let (profile, payouts) = sections();

        let mut assembler = RecordAssembler::new(meta());
        assembler.section(extract(&page, &profile)).section(extract(&page, &payouts));
        let record = assembler.finish();

        assert!(!record.has_data());
        assert_eq!(record.get("no_data_parsed"), Some(&json!(true)));
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["source", "source_url", "fetched_at", "target", "params", "company_profile", "payouts", "missing_fields", "no_data_parsed"]
        );
    }

    #[test]
    fn data_entries_drive_the_flag() {
        let mut assembler = RecordAssembler::new(meta());
        assembler.field("days_requested", 3).data("results", json!([]), false);
        assert!(!assembler.finish().has_data());

        let mut assembler = RecordAssembler::new(meta());
        assembler.data("results", json!([1]), true);
        assert!(assembler.finish().has_data());
    }
}
