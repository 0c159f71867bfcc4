//! Layout JSON: the positioned-text dump written by `inspect --save`,
//! readable back as a source document.
//!
//! ```json
//! {"pages": [{"number": 4, "elements": [{"x": 52.0, "y": 701.3, "text": "Anne Dupont"}]}]}
//! ```

use std::fs;
use std::path::Path;

use super::Document;
use crate::error::Result;

pub fn read_layout(path: &Path) -> Result<Document> {
    let content = fs::read_to_string(path)?;
    let document: Document = serde_json::from_str(&content)?;
    Ok(document)
}

pub fn write_layout(document: &Document, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(document)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;
    use crate::error::MinerError;
    use crate::types::TextElement;
    use tempfile::tempdir;

    #[test]
    fn test_saved_layout_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layout.json");
        let document = Document {
            pages: vec![Page { number: 4, elements: vec![TextElement::new(52.0, 701.5, "Anne Dupont")] }],
            ..Default::default()
        };
        write_layout(&document, &path).unwrap();

        let loaded = Document::load(&path).unwrap();
        assert_eq!(loaded.pages.len(), 1);
        assert_eq!(loaded.pages[0].number, 4);
        assert_eq!(loaded.pages[0].elements[0].text, "Anne Dupont");
        assert_eq!(loaded.source, path);
    }

    #[test]
    fn test_malformed_layout_is_json_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layout.json");
        fs::write(&path, "{\"pages\": 3}").unwrap();
        assert!(matches!(read_layout(&path), Err(MinerError::Json(_))));
    }

    #[test]
    fn test_empty_layout_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layout.json");
        fs::write(&path, "{\"pages\": []}").unwrap();
        assert!(matches!(Document::load(&path), Err(MinerError::Layout(_))));
    }
}
