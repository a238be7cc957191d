// src/extractors/engine.rs

//! Applies a `RuleSet` to a page. Extraction is total: every declared field appears in the
//! result, with its default and a recorded `Absence` when nothing usable was found.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::extractors::document::{PageDocument, PageNode};
use crate::extractors::rules::{Column, Columns, ExtractionRule, RowSpec, RuleSet, Transform};

static MARKUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?[A-Za-z][^>]*>").expect("Failed to compile MARKUP_RE")
});

static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+").expect("Failed to compile DIGIT_RUN_RE")
});

/// Why a field holds its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Absence {
    /// The locator matched nothing, or only blank content.
    FieldAbsent,
    /// Something was found but did not have the expected shape.
    MalformedReading,
}

/// Output of one rule set applied to one page.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionRecord {
    pub section: String,
    pub flat: bool,
    pub fields: Map<String, Value>,
    pub absences: Vec<(String, Absence)>,
}

impl SectionRecord {
    /// True when at least one field was actually extracted.
    pub fn has_data(&self) -> bool {
        self.absences.len() < self.fields.len()
    }
}

/// Trims, strips embedded markup and collapses whitespace runs to one space.
pub fn clean_text(raw: &str) -> String {
    let stripped = MARKUP_RE.replace_all(raw, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First base-10 digit run in `text`.
pub fn first_integer(text: &str) -> Option<i64> {
    DIGIT_RUN_RE.find(text).and_then(|m| m.as_str().parse().ok())
}

pub fn extract<D: PageDocument>(document: &D, rule_set: &RuleSet) -> SectionRecord {
    let root = document.root();
    let mut fields = Map::new();
    let mut absences = Vec::new();

    for rule in rule_set.rules() {
        let value = match apply_rule(root, rule) {
            Ok(value) => value,
            Err(absence) => {
                tracing::debug!("{}.{}: {:?}, using default", rule_set.section(), rule.field, absence);
                absences.push((rule.field.clone(), absence));
                rule.default.clone()
            }
        };
        fields.insert(rule.field.clone(), value);
    }

    SectionRecord {
        section: rule_set.section().to_string(),
        flat: rule_set.is_flat(),
        fields,
        absences,
    }
}

fn apply_rule<'a, N: PageNode<'a>>(root: N, rule: &ExtractionRule) -> Result<Value, Absence> {
    let nodes = rule.locator.locate(root);
    if nodes.is_empty() {
        return Err(Absence::FieldAbsent);
    }

    if let Transform::Rows(spec) = &rule.transform {
        let rows = rows_value(&nodes, spec);
        return if rows.is_empty() { Err(Absence::FieldAbsent) } else { Ok(Value::Array(rows)) };
    }

    if rule.multi {
        let values: Vec<Value> = nodes
            .iter()
            .filter_map(|node| transform_node(*node, &rule.transform).ok())
            .collect();
        return if values.is_empty() { Err(Absence::FieldAbsent) } else { Ok(Value::Array(values)) };
    }

    transform_node(nodes[0], &rule.transform)
}

fn non_blank(text: String) -> Result<Value, Absence> {
    if text.is_empty() {
        Err(Absence::FieldAbsent)
    } else {
        Ok(Value::String(text))
    }
}

fn transform_node<'a, N: PageNode<'a>>(node: N, transform: &Transform) -> Result<Value, Absence> {
    match transform {
        Transform::Text => non_blank(clean_text(&node.visible_text())),
        Transform::Attr(name) => non_blank(node.attribute(name).map(str::trim).unwrap_or_default().to_string()),
        Transform::AttrOrText(name) => match node.attribute(name).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(Value::String(value.to_string())),
            _ => non_blank(clean_text(&node.visible_text())),
        },
        Transform::TextWithout(label) => {
            non_blank(clean_text(&node.visible_text().replacen(label.as_str(), "", 1)))
        }
        Transform::Capture(re) => {
            let text = clean_text(&node.visible_text());
            let captures = re.captures(&text).ok_or(Absence::MalformedReading)?;
            let hit = captures.get(1).or_else(|| captures.get(0)).ok_or(Absence::MalformedReading)?;
            Ok(Value::String(hit.as_str().to_string()))
        }
        Transform::Integer => first_integer(&node.visible_text())
            .map(Value::from)
            .ok_or(Absence::MalformedReading),
        Transform::Rows(spec) => {
            let rows = rows_value(&[node], spec);
            if rows.is_empty() { Err(Absence::FieldAbsent) } else { Ok(Value::Array(rows)) }
        }
    }
}

struct Cell<N> {
    node: N,
    text: String,
}

fn row_nodes<'a, N: PageNode<'a>>(nodes: &[N]) -> Vec<N> {
    let mut rows = Vec::new();
    for node in nodes {
        if node.matches_css("tr") {
            rows.push(*node);
        } else {
            rows.extend(node.select_all("tr"));
        }
    }
    rows
}

fn cells<'a, N: PageNode<'a>>(row: N, css: &str) -> Vec<Cell<N>> {
    row.select_all(css)
        .into_iter()
        .map(|node| Cell { node, text: clean_text(&node.visible_text()) })
        .collect()
}

fn rows_value<'a, N: PageNode<'a>>(nodes: &[N], spec: &RowSpec) -> Vec<Value> {
    let rows = row_nodes(nodes);
    let limit = spec.limit.unwrap_or(usize::MAX);

    match &spec.columns {
        Columns::Declared(columns) => rows
            .into_iter()
            .map(|row| cells(row, "td"))
            .filter(|cells| !cells.is_empty() && cells.len() >= spec.min_cells)
            .take(limit)
            .map(|cells| declared_record(columns, &cells))
            .collect(),
        Columns::Inferred => {
            let mut cell_rows = rows
                .into_iter()
                .map(|row| cells(row, "td, th"))
                .filter(|cells| !cells.is_empty());

            let Some(header_cells) = cell_rows.next() else {
                return Vec::new();
            };
            let headers = header_labels(&header_cells);

            cell_rows
                .filter(|cells| cells.len() >= spec.min_cells)
                .take(limit)
                .map(|cells| inferred_record(&headers, &cells))
                .collect()
        }
    }
}

fn declared_record<'a, N: PageNode<'a>>(columns: &[Column], cells: &[Cell<N>]) -> Value {
    let mut record = Map::new();
    for (idx, column) in columns.iter().enumerate() {
        let value = match column {
            Column::Text(_) => Value::String(cells.get(idx).map(|c| c.text.clone()).unwrap_or_default()),
            Column::Link(_) => cells
                .get(idx)
                .and_then(|c| c.node.select_all("a").into_iter().next())
                .and_then(|a| a.attribute("href"))
                .map(|href| Value::String(href.trim().to_string()))
                .unwrap_or(Value::Null),
        };
        record.insert(column.name().to_string(), value);
    }
    Value::Object(record)
}

/// Header names from the first row; blank or repeated names become `col<i>`.
fn header_labels<N>(header_cells: &[Cell<N>]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::with_capacity(header_cells.len());
    for (idx, cell) in header_cells.iter().enumerate() {
        let label = if cell.text.is_empty() || labels.contains(&cell.text) {
            positional_label(idx, &labels)
        } else {
            cell.text.clone()
        };
        labels.push(label);
    }
    labels
}

/// `col<i>`, suffixed until it clashes with none of `taken`.
fn positional_label(idx: usize, taken: &[String]) -> String {
    let base = format!("col{}", idx);
    let mut label = base.clone();
    let mut bump = 2;
    while taken.contains(&label) {
        label = format!("{}_{}", base, bump);
        bump += 1;
    }
    label
}

fn inferred_record<N>(headers: &[String], cells: &[Cell<N>]) -> Value {
    let mut keys = headers.to_vec();
    let mut record = Map::new();
    for (idx, cell) in cells.iter().enumerate() {
        let key = match headers.get(idx) {
            Some(header) => header.clone(),
            None => {
                let label = positional_label(idx, &keys);
                keys.push(label.clone());
                label
            }
        };
        record.insert(key, Value::String(cell.text.clone()));
    }
    Value::Object(record)
}
