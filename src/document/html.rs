//! HTML visualization embeds: the results live in a JSON segment
//! `"data":[{"label": ..., "value": [...]}, ...]` inside a script, while the
//! visible headings carry the question and population.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Document, LabeledSeries, Page};
use crate::error::{MinerError, Result};
use crate::types::TextElement;

static DATA_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r#""data"\s*:\s*\["#).expect("valid regex"));

pub fn read_html(path: &Path) -> Result<Document> {
    let bytes = fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    parse_html(&content)
}

pub fn parse_html(content: &str) -> Result<Document> {
    let segment = find_data_segment(content)
        .ok_or_else(|| MinerError::Layout("no embedded \"data\" array found in HTML".to_string()))?;
    let items: Vec<Value> = serde_json::from_str(segment)?;

    let mut series = Vec::new();
    for item in items {
        let label = item.get("label").and_then(Value::as_str).map(str::trim).unwrap_or_default();
        if label.is_empty() {
            debug!("Skipping data entry without label");
            continue;
        }
        let values = match item.get("value") {
            Some(Value::Array(values)) => values.iter().map(value_text).collect(),
            Some(single) => vec![value_text(single)],
            None => {
                warn!("Data entry '{}' has no value array", label);
                Vec::new()
            }
        };
        series.push(LabeledSeries { label: label.to_string(), values });
    }

    Ok(Document { pages: vec![heading_page(content)], series, ..Default::default() })
}

/// The JSON array following the first `"data":[`, brackets balanced and
/// string literals skipped
fn find_data_segment(content: &str) -> Option<&str> {
    let marker = DATA_MARKER.find(content)?;
    let start = marker.end() - 1;
    let bytes = content.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    }
}

/// Title and headings as a single synthetic page, top to bottom
fn heading_page(content: &str) -> Page {
    let html = Html::parse_document(content);
    let mut elements = Vec::new();
    if let Ok(selector) = Selector::parse("title, h1, h2, h3, figcaption") {
        for (index, node) in html.select(&selector).enumerate() {
            let text = node.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                elements.push(TextElement::new(0.0, 1000.0 - 20.0 * index as f64, text));
            }
        }
    }
    Page { number: 1, elements }
}
