// src/sites/psx.rs

//! Company pages of the stock-exchange data portal.
//!
//! Every section of the page is a `RuleSet` literal below. When the portal changes its
//! layout, edit the locators here; the extraction engine stays untouched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::extractors::engine::extract;
use crate::extractors::rules::{Column, ExtractionRule, Locator, RowSpec, RuleSet, Transform};
use crate::extractors::{ExtractedRecord, HtmlPage, RecordAssembler, RecordMeta};
use crate::fetch::{RenderedDocument, RequestDescriptor};
use crate::sites::Site;
use crate::utils::error::ExtractError;
use crate::utils::html_debug::{capped_excerpt, DEBUG_EXCERPT_CHARS};

const PSX_BASE_URL: &str = "https://dps.psx.com.pk/company";
const MAX_ANNOUNCEMENTS: usize = 10;

/// Label shown next to each market figure, and the field it lands in.
const MARKET_METRICS: &[(&str, &str)] = &[
    ("OPEN", "open"),
    ("HIGH", "high"),
    ("LOW", "low"),
    ("VOLUME", "volume"),
    ("LDCP", "ldcp"),
    ("VAR", "var"),
    ("ASK PRICE", "ask_price"),
    ("BID PRICE", "bid_price"),
    ("P/E RATIO", "pe_ratio"),
    ("HAIRCUT", "haircut"),
];

#[derive(Debug, Clone, Serialize)]
pub struct PsxInput {
    pub symbols: Vec<String>,
    pub debug: bool,
}

fn profile_item(heading: &str) -> Locator {
    Locator::css("h4").containing(heading).next("p")
}

fn panel(heading: &str) -> Locator {
    Locator::css("h3").containing(heading).parent()
}

fn company_profile() -> Result<RuleSet, ExtractError> {
    RuleSet::new(
        "company_profile",
        vec![
            ExtractionRule::text("business_description", profile_item("BUSINESS DESCRIPTION")),
            ExtractionRule::rows(
                "key_people",
                Locator::css("h4").containing("KEY PEOPLE").parent().find("table tr"),
                RowSpec::declared(vec![Column::Text("name".into()), Column::Text("position".into())], 2),
            ),
            ExtractionRule::text("address", profile_item("ADDRESS")),
            ExtractionRule::new(
                "website",
                profile_item("WEBSITE").find("a"),
                Transform::AttrOrText("href".into()),
                json!(""),
            ),
            ExtractionRule::text("registrar", profile_item("REGISTRAR")),
            ExtractionRule::text("auditor", profile_item("AUDITOR")),
            ExtractionRule::text("fiscal_year_end", profile_item("Fiscal Year End")),
        ],
    )
}

fn equity_profile() -> Result<RuleSet, ExtractError> {
    let paragraph = |label: &str| panel("Equity Profile").find("p").containing(label);
    RuleSet::new(
        "equity_profile",
        vec![
            ExtractionRule::new(
                "market_cap",
                paragraph("MARKET CAP"),
                Transform::capture(r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?)")?,
                Value::Null,
            ),
            ExtractionRule::new("total_shares", paragraph("SHARES"), Transform::capture(r"SHARES\s+([\d,]+)")?, Value::Null),
            ExtractionRule::new("free_float", paragraph("FREE FLOAT"), Transform::capture(r"FREE FLOAT\s+([\d,]+)")?, Value::Null),
            ExtractionRule::new(
                "free_float_percentage",
                paragraph("FREE FLOAT").containing("%"),
                Transform::capture(r"([\d.]+%)")?,
                Value::Null,
            ),
        ],
    )
}

fn market_data() -> Result<RuleSet, ExtractError> {
    let mut rules = vec![ExtractionRule::text("last_price", Locator::css(".stock-price, .price").first())];
    for (label, field) in MARKET_METRICS {
        rules.push(ExtractionRule::new(
            field,
            Locator::css("b").containing(label).parent(),
            Transform::TextWithout(label.to_string()),
            Value::Null,
        ));
    }
    RuleSet::new("market_data", rules)
}

fn first_table(heading: &str) -> Locator {
    panel(heading).find("table").first()
}

fn financials() -> Result<RuleSet, ExtractError> {
    RuleSet::single("financials", first_table("Financials"), Transform::Rows(RowSpec::inferred()), json!([]))
}

fn ratios() -> Result<RuleSet, ExtractError> {
    RuleSet::single("ratios", first_table("Ratios"), Transform::Rows(RowSpec::inferred()), json!([]))
}

fn announcements() -> Result<RuleSet, ExtractError> {
    let columns = vec![
        Column::Text("date".into()),
        Column::Text("description".into()),
        Column::Link("link".into()),
    ];
    RuleSet::single(
        "announcements",
        panel("Announcements").find("table tr"),
        Transform::Rows(RowSpec::declared(columns, 2).limit(MAX_ANNOUNCEMENTS)),
        json!([]),
    )
}

fn payouts() -> Result<RuleSet, ExtractError> {
    let columns = vec![
        Column::Text("announcement_date".into()),
        Column::Text("period".into()),
        Column::Text("dividend".into()),
        Column::Text("book_closure_period".into()),
    ];
    RuleSet::single(
        "payouts",
        panel("Payouts").find("table tr"),
        Transform::Rows(RowSpec::declared(columns, 3)),
        json!([]),
    )
}

/// All sections of a company page, in output order.
pub fn rule_sets() -> Result<Vec<RuleSet>, ExtractError> {
    Ok(vec![
        company_profile()?,
        equity_profile()?,
        market_data()?,
        financials()?,
        ratios()?,
        announcements()?,
        payouts()?,
    ])
}

pub struct PsxSite {
    input: PsxInput,
    base_url: String,
    rule_sets: Vec<RuleSet>,
}

impl PsxSite {
    pub fn new(input: PsxInput) -> Result<Self, ExtractError> {
        Self::with_base_url(input, PSX_BASE_URL)
    }

    pub fn with_base_url(input: PsxInput, base_url: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            input,
            base_url: base_url.trim_end_matches('/').to_string(),
            rule_sets: rule_sets()?,
        })
    }
}

impl Site for PsxSite {
    fn name(&self) -> &'static str {
        "psx"
    }

    fn requests(&self) -> Vec<RequestDescriptor> {
        self.input
            .symbols
            .iter()
            .map(|symbol| RequestDescriptor::new(format!("{}/{}", self.base_url, symbol), symbol.clone()))
            .collect()
    }

    fn extract(&self, request: &RequestDescriptor, document: &RenderedDocument, fetched_at: DateTime<Utc>) -> ExtractedRecord {
        tracing::info!("Extracting data for {}", request.label);
        let page = HtmlPage::parse(&document.body);

        let mut assembler = RecordAssembler::new(RecordMeta {
            source: self.name().to_string(),
            url: document.url.clone(),
            target: Value::String(request.label.clone()),
            params: json!({ "symbols": self.input.symbols, "debug": self.input.debug }),
            fetched_at,
        });
        assembler.field("symbol", request.label.as_str());

        for rule_set in &self.rule_sets {
            assembler.section(extract(&page, rule_set));
        }

        let snippet = self.input.debug.then(|| capped_excerpt(&document.body, DEBUG_EXCERPT_CHARS));
        assembler.field("debug_html_snippet", snippet);
        assembler.finish()
    }

    fn debug(&self) -> bool {
        self.input.debug
    }

    fn debug_patterns(&self, _fetched_at: DateTime<Utc>) -> Vec<(String, &'static str)> {
        let mut patterns: Vec<(String, &'static str)> = Vec::new();
        for rule in self.rule_sets.iter().flat_map(|rs| rs.rules()) {
            for needle in rule.locator.needles() {
                let pattern = regex::escape(needle);
                if !patterns.iter().any(|(p, _)| *p == pattern) {
                    patterns.push((pattern, "section"));
                }
            }
        }
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const COMPANY_PAGE: &str = r#"
        <html><body>
          <div class="quote"><div class="price">Rs. 512.40</div></div>
          <div class="stats">
            <div class="stats_item"><b>OPEN</b> 505.00</div>
            <div class="stats_item"><b>VOLUME</b> 1,204,500</div>
            <div class="stats_item"><b>P/E RATIO</b> 14.2</div>
          </div>
          <div class="profile">
            <div class="item"><h4>BUSINESS DESCRIPTION</h4><p>Systems Limited provides IT services.</p></div>
            <div class="item">
              <h4>KEY PEOPLE</h4>
              <table>
                <tr><td>Asif Peer</td><td>CEO</td></tr>
                <tr><td>Roohi Khan</td><td>Company Secretary</td></tr>
              </table>
            </div>
            <div class="item"><h4>ADDRESS</h4><p>E-1, Sehjpal Road, Lahore</p></div>
            <div class="item"><h4>WEBSITE</h4><p><a href="https://www.systemsltd.com">systemsltd.com</a></p></div>
            <div class="item"><h4>AUDITOR</h4><p>A.F. Ferguson</p></div>
          </div>
          <div class="panel">
            <h3>Equity Profile</h3>
            <p>MARKET CAP (000's) 149,311,220.50</p>
            <p>SHARES 291,396,000</p>
            <p>FREE FLOAT 137,000,000 47.01%</p>
          </div>
          <div class="panel">
            <h3>Financials</h3>
            <table>
              <tr><th>Annual</th><th>2023</th><th>2022</th></tr>
              <tr><td>Sales</td><td>53,000</td><td>40,000</td></tr>
              <tr><td>EPS</td><td>22.1</td><td>18.4</td></tr>
            </table>
          </div>
          <div class="panel">
            <h3>Announcements</h3>
            <table>
              <tr><th>Date</th><th>Title</th><th>Document</th></tr>
              <tr><td>Apr 20, 2024</td><td>Board Meeting</td><td><a href="/download/1.pdf">PDF</a></td></tr>
              <tr><td>Mar 2, 2024</td><td>Material Information</td><td></td></tr>
            </table>
          </div>
        </body></html>
    "#;

    fn site() -> PsxSite {
        PsxSite::new(PsxInput { symbols: vec!["SYS".into()], debug: false }).unwrap()
    }

    fn record(body: &str) -> ExtractedRecord {
        let site = site();
        let request = &site.requests()[0];
        let document = RenderedDocument { url: request.url.clone(), status: 200, body: body.into() };
        site.extract(request, &document, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn rule_sets_are_valid_and_ordered() {
        let sections: Vec<String> = rule_sets().unwrap().iter().map(|rs| rs.section().to_string()).collect();
        assert_eq!(
            sections,
            vec!["company_profile", "equity_profile", "market_data", "financials", "ratios", "announcements", "payouts"]
        );
    }

    #[test]
    fn company_urls_use_symbols() {
        let site = PsxSite::new(PsxInput { symbols: vec!["SYS".into(), "OGDC".into()], debug: false }).unwrap();
        let requests = site.requests();
        assert_eq!(requests[1].url, "https://dps.psx.com.pk/company/OGDC");
        assert_eq!(requests[1].label, "OGDC");
    }

    #[test]
    fn company_profile_section() {
        let record = record(COMPANY_PAGE);
        assert_eq!(
            record.get("company_profile"),
            Some(&json!({
                "business_description": "Systems Limited provides IT services.",
                "key_people": [
                    {"name": "Asif Peer", "position": "CEO"},
                    {"name": "Roohi Khan", "position": "Company Secretary"}
                ],
                "address": "E-1, Sehjpal Road, Lahore",
                "website": "https://www.systemsltd.com",
                "registrar": "",
                "auditor": "A.F. Ferguson",
                "fiscal_year_end": ""
            }))
        );
    }

    #[test]
    fn equity_and_market_sections() {
        let record = record(COMPANY_PAGE);
        assert_eq!(
            record.get("equity_profile"),
            Some(&json!({
                "market_cap": "149,311,220.50",
                "total_shares": "291,396,000",
                "free_float": "137,000,000",
                "free_float_percentage": "47.01%"
            }))
        );

        let market = record.get("market_data").unwrap();
        assert_eq!(market["last_price"], json!("Rs. 512.40"));
        assert_eq!(market["open"], json!("505.00"));
        assert_eq!(market["volume"], json!("1,204,500"));
        assert_eq!(market["pe_ratio"], json!("14.2"));
        assert_eq!(market["haircut"], Value::Null);
        assert_eq!(market.as_object().map(|m| m.len()), Some(11));
    }

    #[test]
    fn tabular_sections() {
        let record = record(COMPANY_PAGE);
        assert_eq!(
            record.get("financials"),
            Some(&json!([
                {"Annual": "Sales", "2023": "53,000", "2022": "40,000"},
                {"Annual": "EPS", "2023": "22.1", "2022": "18.4"}
            ]))
        );
        assert_eq!(
            record.get("announcements"),
            Some(&json!([
                {"date": "Apr 20, 2024", "description": "Board Meeting", "link": "/download/1.pdf"},
                {"date": "Mar 2, 2024", "description": "Material Information", "link": null}
            ]))
        );
        assert_eq!(record.get("ratios"), Some(&json!([])));
        assert_eq!(record.get("payouts"), Some(&json!([])));

        let missing = record.get("missing_fields").unwrap();
        assert_eq!(missing["ratios"], json!({"ratios": "field_absent"}));
        assert_eq!(missing["company_profile"]["registrar"], json!("field_absent"));
        assert!(record.has_data());
    }

    #[test]
    fn unrelated_page_yields_complete_default_record() {
        let record = record("<html><body><h1>Service unavailable</h1></body></html>");
        assert!(!record.has_data());
        for section in ["company_profile", "equity_profile", "market_data", "financials", "ratios", "announcements", "payouts"] {
            assert!(record.get(section).is_some(), "missing section {}", section);
        }
        assert_eq!(record.get("symbol"), Some(&json!("SYS")));
        assert_eq!(record.get("debug_html_snippet"), Some(&Value::Null));
    }

    #[test]
    fn debug_runs_carry_the_page_excerpt() {
        let site = PsxSite::new(PsxInput { symbols: vec!["SYS".into()], debug: true }).unwrap();
        let request = &site.requests()[0];
        let document = RenderedDocument { url: request.url.clone(), status: 200, body: "<p>maintenance</p>".into() };
        let record = site.extract(request, &document, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(record.get("debug_html_snippet"), Some(&json!("<p>maintenance</p>")));
    }

    #[test]
    fn debug_patterns_cover_section_headings() {
        let patterns = site().debug_patterns(Utc::now());
        assert!(patterns.iter().any(|(p, _)| p == "BUSINESS DESCRIPTION"));
        assert!(patterns.iter().any(|(p, _)| p == r"P/E RATIO"));
        assert_eq!(patterns.iter().filter(|(p, _)| p == "FREE FLOAT").count(), 1);
    }
}
