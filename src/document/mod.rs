//! Positioned-text model of a source document and its loaders.
//!
//! Every loader produces the same [`Document`]: pages of positioned text
//! elements and, for HTML embeds, a list of labelled value series.

pub mod html;
pub mod layout;
pub mod pdf;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MinerError, Result};
use crate::types::TextElement;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub elements: Vec<TextElement>,
}

/// A run of elements sharing a baseline, left to right
#[derive(Debug, Clone)]
pub struct TextLine {
    pub y: f64,
    pub elements: Vec<TextElement>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.elements
            .iter()
            .map(|e| e.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Page {
    /// Group elements into lines, top of the page first.
    ///
    /// An element joins the current line when its baseline is within
    /// `tolerance` of the line's first element.
    pub fn lines(&self, tolerance: f64) -> Vec<TextLine> {
        let mut elements: Vec<&TextElement> = self.elements.iter().filter(|e| !e.text.trim().is_empty()).collect();
        elements.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

        let mut lines: Vec<TextLine> = Vec::new();
        for element in elements {
            match lines.last_mut() {
                Some(line) if (line.y - element.y).abs() <= tolerance => line.elements.push(element.clone()),
                _ => lines.push(TextLine { y: element.y, elements: vec![element.clone()] }),
            }
        }
        for line in &mut lines {
            line.elements.sort_by(|a, b| a.x.total_cmp(&b.x));
        }
        lines
    }

    /// Page text, one line per row
    pub fn text(&self, tolerance: f64) -> String {
        self.lines(tolerance).iter().map(TextLine::text).collect::<Vec<_>>().join("\n")
    }
}

/// Values published for one label in an embedded data segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSeries {
    pub label: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(skip)]
    pub source: PathBuf,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<LabeledSeries>,
}

impl Document {
    /// Load a document, choosing the reader from the file extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(MinerError::DocumentNotFound(path.to_path_buf()));
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let mut document = match extension.as_str() {
            "pdf" => pdf::read_pdf(path)?,
            "json" => layout::read_layout(path)?,
            "html" | "htm" => html::read_html(path)?,
            other => {
                return Err(MinerError::Layout(format!(
                    "unsupported document type '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };
        document.source = path.to_path_buf();

        if document.is_blank() {
            return Err(MinerError::Layout(format!("no extractable text in {}", path.display())));
        }

        info!(
            "📄 Loaded {} ({} pages, {} series)",
            path.display(),
            document.pages.len(),
            document.series.len()
        );
        Ok(document)
    }

    pub fn page(&self, number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.number == number)
    }

    pub fn is_blank(&self) -> bool {
        self.series.is_empty() && self.pages.iter().all(|p| p.elements.iter().all(|e| e.text.trim().is_empty()))
    }
}
