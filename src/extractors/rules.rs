// src/extractors/rules.rs

//! Declarative extraction rules.
//!
//! A site section is described as data: each output field names a `Locator` (a chain of
//! selection steps evaluated from the document root), a `Transform` turning the located
//! nodes into a JSON value, and the default used when nothing usable is found.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

use crate::extractors::document::{check_selector, PageNode};
use crate::utils::error::ExtractError;

/// One step of a locator chain, applied to the current node set.
#[derive(Debug, Clone)]
pub enum Step {
    /// Descendants matching a CSS selector.
    Find(String),
    /// Keep nodes whose text contains the literal.
    Containing(String),
    /// Parent element of each node.
    Parent,
    /// Immediately following element sibling, kept only if it matches the selector.
    Next(String),
    /// Only the first node.
    First,
}

/// Chain of steps that finds zero or more nodes in a document.
#[derive(Debug, Clone, Default)]
pub struct Locator {
    steps: Vec<Step>,
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Self::default().find(selector)
    }

    pub fn find(mut self, selector: &str) -> Self {
        self.steps.push(Step::Find(selector.to_string()));
        self
    }

    pub fn containing(mut self, needle: &str) -> Self {
        self.steps.push(Step::Containing(needle.to_string()));
        self
    }

    pub fn parent(mut self) -> Self {
        self.steps.push(Step::Parent);
        self
    }

    pub fn next(mut self, selector: &str) -> Self {
        self.steps.push(Step::Next(selector.to_string()));
        self
    }

    pub fn first(mut self) -> Self {
        self.steps.push(Step::First);
        self
    }

    /// Literal text the locator anchors on (section headings, labels).
    pub fn needles(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            Step::Containing(needle) => Some(needle.as_str()),
            _ => None,
        })
    }

    fn selectors(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            Step::Find(css) | Step::Next(css) => Some(css.as_str()),
            _ => None,
        })
    }

    /// Evaluates the chain from `root`. Result is in document order without duplicates.
    pub fn locate<'a, N: PageNode<'a>>(&self, root: N) -> Vec<N> {
        let mut nodes = vec![root];

        for step in &self.steps {
            nodes = match step {
                Step::Find(css) => {
                    let mut found = Vec::new();
                    for node in &nodes {
                        for hit in node.select_all(css) {
                            push_unique(&mut found, hit);
                        }
                    }
                    found
                }
                Step::Containing(needle) => nodes
                    .into_iter()
                    .filter(|node| node.visible_text().contains(needle.as_str()))
                    .collect(),
                Step::Parent => {
                    let mut parents = Vec::new();
                    for parent in nodes.iter().filter_map(|node| node.parent_element()) {
                        push_unique(&mut parents, parent);
                    }
                    parents
                }
                Step::Next(css) => {
                    let mut siblings = Vec::new();
                    for sibling in nodes.iter().filter_map(|node| node.next_element()) {
                        if sibling.matches_css(css) {
                            push_unique(&mut siblings, sibling);
                        }
                    }
                    siblings
                }
                Step::First => nodes.into_iter().take(1).collect(),
            };

            if nodes.is_empty() {
                break;
            }
        }

        nodes
    }
}

fn push_unique<T: PartialEq>(nodes: &mut Vec<T>, node: T) {
    if !nodes.contains(&node) {
        nodes.push(node);
    }
}

/// A positional column of a row-shaped rule.
#[derive(Debug, Clone)]
pub enum Column {
    /// Cleaned cell text; missing cells yield "".
    Text(String),
    /// `href` of the first link in the cell; missing yields null.
    Link(String),
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::Text(name) | Column::Link(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Columns {
    /// Fixed names by position; only `td` cells count.
    Declared(Vec<Column>),
    /// Names from the first row (`th` or `td`), positional `col<i>` where unusable.
    Inferred,
}

/// How located nodes become a list of per-row records.
#[derive(Debug, Clone)]
pub struct RowSpec {
    pub columns: Columns,
    /// Rows with fewer cells are skipped.
    pub min_cells: usize,
    /// Keep at most this many rows.
    pub limit: Option<usize>,
}

impl RowSpec {
    pub fn declared(columns: Vec<Column>, min_cells: usize) -> Self {
        Self { columns: Columns::Declared(columns), min_cells, limit: None }
    }

    pub fn inferred() -> Self {
        Self { columns: Columns::Inferred, min_cells: 1, limit: None }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone)]
pub enum Transform {
    /// Cleaned visible text.
    Text,
    /// Trimmed attribute value.
    Attr(String),
    /// Attribute value if present and non-blank, otherwise cleaned text.
    AttrOrText(String),
    /// Cleaned text with the first occurrence of a label removed.
    TextWithout(String),
    /// First capture group (or whole match) of a pattern over the cleaned text.
    Capture(Regex),
    /// First base-10 digit run parsed as an integer.
    Integer,
    /// Table rows: consumes every located node (`tr` nodes, or containers of them).
    Rows(RowSpec),
}

impl Transform {
    pub fn capture(pattern: &str) -> Result<Self, ExtractError> {
        Regex::new(pattern)
            .map(Transform::Capture)
            .map_err(|e| ExtractError::InvalidPattern(format!("'{}': {}", pattern, e)))
    }
}

/// How one output field is found and shaped.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub field: String,
    pub locator: Locator,
    pub transform: Transform,
    pub default: Value,
    /// Apply the transform to every located node instead of the first one.
    pub multi: bool,
}

impl ExtractionRule {
    pub fn new(field: &str, locator: Locator, transform: Transform, default: Value) -> Self {
        Self { field: field.to_string(), locator, transform, default, multi: false }
    }

    /// Cleaned text of the first match, "" when absent.
    pub fn text(field: &str, locator: Locator) -> Self {
        Self::new(field, locator, Transform::Text, Value::String(String::new()))
    }

    /// Row records, an empty list when absent.
    pub fn rows(field: &str, locator: Locator, spec: RowSpec) -> Self {
        Self::new(field, locator, Transform::Rows(spec), Value::Array(Vec::new()))
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }
}

/// Ordered rules for one named section of a page.
#[derive(Debug, Clone)]
pub struct RuleSet {
    section: String,
    rules: Vec<ExtractionRule>,
    flatten: bool,
}

impl RuleSet {
    /// Validates field-name uniqueness, selectors and attribute names.
    pub fn new(section: &str, rules: Vec<ExtractionRule>) -> Result<Self, ExtractError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.field.as_str()) {
                return Err(ExtractError::DuplicateField {
                    section: section.to_string(),
                    field: rule.field.clone(),
                });
            }
            for css in rule.locator.selectors() {
                check_selector(css)?;
            }
            if let Transform::Attr(name) | Transform::AttrOrText(name) = &rule.transform {
                if name.trim().is_empty() {
                    return Err(ExtractError::InvalidSelector(format!(
                        "empty attribute name for field '{}'", rule.field
                    )));
                }
            }
        }

        Ok(Self { section: section.to_string(), rules, flatten: false })
    }

    /// A section holding one value directly; the field takes the section's name.
    pub fn single(section: &str, locator: Locator, transform: Transform, default: Value) -> Result<Self, ExtractError> {
        let rule = ExtractionRule::new(section, locator, transform, default);
        let mut rule_set = Self::new(section, vec![rule])?;
        rule_set.flatten = true;
        Ok(rule_set)
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    pub fn is_flat(&self) -> bool {
        self.flatten
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.field.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::document::{HtmlPage, PageDocument};

    const HTML: &str = r#"
        <html><body>
          <div class="item">
            <h4>BUSINESS DESCRIPTION</h4>
            <p>Software house.</p>
          </div>
          <div class="item">
            <h4>AUDITOR</h4>
            <span>not a paragraph</span>
            <p>Audit Co.</p>
          </div>
          <div class="stats"><b>OPEN</b> 10.5</div>
        </body></html>
    "#;

    #[test]
    fn heading_then_next_paragraph() {
        let page = HtmlPage::parse(HTML);
        let hits = Locator::css("h4").containing("BUSINESS DESCRIPTION").next("p").locate(page.root());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].visible_text(), "Software house.");
    }

    #[test]
    fn next_requires_the_immediate_sibling_to_match() {
        let page = HtmlPage::parse(HTML);
        let hits = Locator::css("h4").containing("AUDITOR").next("p").locate(page.root());
        assert!(hits.is_empty());
    }

    #[test]
    fn parent_deduplicates_shared_ancestors() {
        let page = HtmlPage::parse(HTML);
        let hits = Locator::css("div.item h4, div.item p").parent().locate(page.root());
        assert_eq!(hits.len(), 2);
        let first = Locator::css("div.item").first().locate(page.root());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0], hits[0]);
    }

    #[test]
    fn needles_list_anchor_literals() {
        let locator = Locator::css("b").containing("OPEN").parent();
        assert_eq!(locator.needles().collect::<Vec<_>>(), vec!["OPEN"]);
    }

    #[test]
    fn rule_set_rejects_duplicate_fields() {
        let err = RuleSet::new(
            "profile",
            vec![
                ExtractionRule::text("auditor", Locator::css("p")),
                ExtractionRule::text("auditor", Locator::css("span")),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::DuplicateField { ref field, .. } if field == "auditor"));
    }

    #[test]
    fn rule_set_rejects_bad_selectors_and_patterns() {
        let err = RuleSet::new("profile", vec![ExtractionRule::text("x", Locator::css("p").next("a["))]);
        assert!(matches!(err, Err(ExtractError::InvalidSelector(_))));
        assert!(matches!(Transform::capture("(["), Err(ExtractError::InvalidPattern(_))));
    }

    #[test]
    fn single_section_is_flat() {
        let rule_set = RuleSet::single("ratios", Locator::css("table tr"), Transform::Rows(RowSpec::inferred()), Value::Array(vec![])).unwrap();
        assert!(rule_set.is_flat());
        assert_eq!(rule_set.field_names().collect::<Vec<_>>(), vec!["ratios"]);
    }
}
