//! PDF text-layer reader built on `lopdf`.
//!
//! Content streams are interpreted just enough to know where each shown
//! string starts: text and graphics matrices, leading and font switches.
//! Strings are decoded through the font's ToUnicode CMap when it has one,
//! as UTF-16 when they carry a byte-order mark, and as Windows-1252 otherwise.

use std::collections::HashMap;
use std::path::Path;

use lopdf::content::Content;
use lopdf::{Dictionary, Object, ObjectId};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::{Document, Page};
use crate::error::Result;
use crate::types::TextElement;

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Kerning (thousandths of an em) beyond which a TJ gap is read as a space
const TJ_SPACE_THRESHOLD: f64 = 200.0;

static BFCHAR_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)beginbfchar(.*?)endbfchar").expect("valid regex"));
static BFRANGE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)beginbfrange(.*?)endbfrange").expect("valid regex"));
static BFCHAR_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").expect("valid regex"));
static BFRANGE_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(<[0-9A-Fa-f]*>|\[[^\]]*\])").expect("valid regex")
});
static HEX_STRING: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([0-9A-Fa-f]*)>").expect("valid regex"));

pub fn read_pdf(path: &Path) -> Result<Document> {
    let pdf = lopdf::Document::load(path)?;
    let mut pages = Vec::new();

    for (number, page_id) in pdf.get_pages() {
        let elements = match page_elements(&pdf, page_id) {
            Ok(elements) => elements,
            Err(e) => {
                warn!("Skipping unreadable page {} of {}: {}", number, path.display(), e);
                Vec::new()
            }
        };
        debug!("Page {}: {} text elements", number, elements.len());
        pages.push(Page { number, elements });
    }

    Ok(Document { pages, ..Default::default() })
}

fn page_elements(pdf: &lopdf::Document, page_id: ObjectId) -> Result<Vec<TextElement>> {
    let fonts = page_fonts(pdf, page_id);
    let content = pdf.get_page_content(page_id)?;
    let content = Content::decode(&content)?;

    let mut state = TextState::default();
    let mut elements = Vec::new();

    for operation in &content.operations {
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "q" => state.saved.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.saved.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operands(operands) {
                    state.ctm = multiply(&m, &state.ctm);
                }
            }
            "BT" => {
                state.tm = IDENTITY;
                state.tlm = IDENTITY;
            }
            "Tf" => {
                state.font = operands.first().and_then(name_of);
                state.font_size = operands.get(1).and_then(number).unwrap_or(state.font_size);
            }
            "TL" => state.leading = operands.first().and_then(number).unwrap_or(state.leading),
            "Td" => {
                let (tx, ty) = pair(operands);
                state.next_line(tx, ty);
            }
            "TD" => {
                let (tx, ty) = pair(operands);
                state.leading = -ty;
                state.next_line(tx, ty);
            }
            "Tm" => {
                if let Some(m) = matrix_operands(operands) {
                    state.tm = m;
                    state.tlm = m;
                }
            }
            "T*" => state.next_line(0.0, -state.leading),
            "Tj" => {
                if let Some(bytes) = operands.first().and_then(string_bytes) {
                    let text = state.decode(&fonts, bytes);
                    state.show(text, &mut elements);
                }
            }
            "'" => {
                state.next_line(0.0, -state.leading);
                if let Some(bytes) = operands.first().and_then(string_bytes) {
                    let text = state.decode(&fonts, bytes);
                    state.show(text, &mut elements);
                }
            }
            "\"" => {
                state.next_line(0.0, -state.leading);
                if let Some(bytes) = operands.get(2).and_then(string_bytes) {
                    let text = state.decode(&fonts, bytes);
                    state.show(text, &mut elements);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let mut text = String::new();
                    for item in items {
                        match item {
                            Object::String(bytes, _) => text.push_str(&state.decode(&fonts, bytes)),
                            other => {
                                if number(other).map(|k| -k > TJ_SPACE_THRESHOLD).unwrap_or(false)
                                    && !text.ends_with(' ')
                                {
                                    text.push(' ');
                                }
                            }
                        }
                    }
                    state.show(text, &mut elements);
                }
            }
            _ => {}
        }
    }

    Ok(elements)
}

#[derive(Debug, Clone)]
struct TextState {
    ctm: Matrix,
    saved: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    leading: f64,
    font: Option<Vec<u8>>,
    font_size: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            saved: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            leading: 0.0,
            font: None,
            font_size: 1.0,
        }
    }
}

impl TextState {
    fn next_line(&mut self, tx: f64, ty: f64) {
        self.tlm = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.tlm);
        self.tm = self.tlm;
    }

    fn decode(&self, fonts: &HashMap<Vec<u8>, FontDecoder>, bytes: &[u8]) -> String {
        match self.font.as_ref().and_then(|name| fonts.get(name)) {
            Some(decoder) => decoder.decode(bytes),
            None => decode_plain(bytes),
        }
    }

    /// Record a shown string at the current text position, then advance
    /// roughly by its width so later strings on the line sort after it
    fn show(&mut self, text: String, elements: &mut Vec<TextElement>) {
        if text.trim().is_empty() {
            return;
        }
        let origin = multiply(&self.tm, &self.ctm);
        elements.push(TextElement::new(origin[4], origin[5], text.trim()));

        let advance = text.chars().count() as f64 * self.font_size * 0.5;
        self.tm = multiply(&[1.0, 0.0, 0.0, 1.0, advance, 0.0], &self.tm);
    }
}

/// `a × b` in PDF's row-vector convention
fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn pair(operands: &[Object]) -> (f64, f64) {
    let x = operands.first().and_then(number).unwrap_or(0.0);
    let y = operands.get(1).and_then(number).unwrap_or(0.0);
    (x, y)
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, operand) in m.iter_mut().zip(operands.iter()) {
        *slot = number(operand)?;
    }
    Some(m)
}

fn name_of(object: &Object) -> Option<Vec<u8>> {
    match object {
        Object::Name(name) => Some(name.clone()),
        _ => None,
    }
}

fn string_bytes(object: &Object) -> Option<&[u8]> {
    match object {
        Object::String(bytes, _) => Some(bytes.as_slice()),
        _ => None,
    }
}

fn decode_plain(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (text, _, _) = encoding_rs::UTF_16BE.decode(&bytes[2..]);
        text.into_owned()
    } else {
        let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
        text.into_owned()
    }
}

fn resolve<'a>(pdf: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => pdf.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(pdf: &'a lopdf::Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(pdf, object)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Resources dictionary of a page, inherited through the page tree if needed
fn page_resources(pdf: &lopdf::Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = pdf.get_object(page_id).ok().and_then(|o| o.as_dict().ok());
    // The page tree is shallow; the bound only guards against reference cycles
    for _ in 0..32 {
        let dict = node?;
        if let Some(resources) = dict.get(b"Resources").ok().and_then(|r| resolve_dict(pdf, r)) {
            return Some(resources);
        }
        node = dict.get(b"Parent").ok().and_then(|p| resolve_dict(pdf, p));
    }
    None
}

fn page_fonts(pdf: &lopdf::Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontDecoder> {
    let mut fonts = HashMap::new();
    let Some(font_dict) = page_resources(pdf, page_id)
        .and_then(|r| r.get(b"Font").ok())
        .and_then(|f| resolve_dict(pdf, f))
    else {
        return fonts;
    };

    for (name, font) in font_dict.iter() {
        let cmap = resolve_dict(pdf, font)
            .and_then(|font| font.get(b"ToUnicode").ok())
            .and_then(|object| resolve(pdf, object))
            .and_then(|object| match object {
                Object::Stream(stream) => stream
                    .decompressed_content()
                    .ok()
                    .or_else(|| Some(stream.content.clone())),
                _ => None,
            })
            .map(|bytes| ToUnicodeMap::parse(&String::from_utf8_lossy(&bytes)));
        fonts.insert(name.clone(), FontDecoder { cmap });
    }
    fonts
}

#[derive(Debug, Clone, Default)]
struct FontDecoder {
    cmap: Option<ToUnicodeMap>,
}

impl FontDecoder {
    fn decode(&self, bytes: &[u8]) -> String {
        match &self.cmap {
            Some(cmap) if !cmap.is_empty() => cmap.decode(bytes),
            _ => decode_plain(bytes),
        }
    }
}

/// Character-code to Unicode mapping parsed from a ToUnicode CMap
#[derive(Debug, Clone, Default, PartialEq)]
struct ToUnicodeMap {
    code_len: usize,
    map: HashMap<u32, String>,
}

impl ToUnicodeMap {
    fn parse(cmap: &str) -> Self {
        let mut result = Self { code_len: 1, map: HashMap::new() };

        for block in BFCHAR_BLOCK.captures_iter(cmap) {
            for entry in BFCHAR_ENTRY.captures_iter(&block[1]) {
                result.note_code_len(&entry[1]);
                if let Ok(code) = u32::from_str_radix(&entry[1], 16) {
                    result.map.insert(code, utf16_hex(&entry[2]));
                }
            }
        }

        for block in BFRANGE_BLOCK.captures_iter(cmap) {
            for entry in BFRANGE_ENTRY.captures_iter(&block[1]) {
                result.note_code_len(&entry[1]);
                let (Ok(low), Ok(high)) = (u32::from_str_radix(&entry[1], 16), u32::from_str_radix(&entry[2], 16))
                else {
                    continue;
                };
                if high < low || high - low > 0xFFFF {
                    continue;
                }
                let target = &entry[3];
                if target.starts_with('[') {
                    for (code, item) in (low..=high).zip(HEX_STRING.captures_iter(target)) {
                        result.map.insert(code, utf16_hex(&item[1]));
                    }
                } else {
                    let hex = target.trim_matches(|c| c == '<' || c == '>');
                    let Ok(base) = u32::from_str_radix(hex, 16) else {
                        continue;
                    };
                    for (offset, code) in (low..=high).enumerate() {
                        let Some(c) = base.checked_add(offset as u32).and_then(char::from_u32) else {
                            continue;
                        };
                        result.map.insert(code, c.to_string());
                    }
                }
            }
        }

        result
    }

    fn note_code_len(&mut self, hex: &str) {
        self.code_len = self.code_len.max(hex.len().div_ceil(2));
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn decode(&self, bytes: &[u8]) -> String {
        let width = self.code_len.clamp(1, 4);
        bytes
            .chunks(width)
            .map(|chunk| {
                let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                match self.map.get(&code) {
                    Some(text) => text.clone(),
                    None => decode_plain(chunk),
                }
            })
            .collect()
    }
}

fn utf16_hex(hex: &str) -> String {
    let units: Vec<u16> = hex
        .as_bytes()
        .chunks(4)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .filter_map(|chunk| u16::from_str_radix(chunk, 16).ok())
        .collect();
    String::from_utf16_lossy(&units)
}
