//! Text folding used before any signature or name comparison.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

static SPLIT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)-\s+(\w)").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Lowercase, strip accents, fold typographic apostrophes and hyphens,
/// re-join words broken across lines and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            '\u{2019}' | '\u{2018}' | '\u{02BC}' | '\u{00B4}' | '`' => '\'',
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' => '-',
            _ => c,
        })
        .collect();

    let joined = SPLIT_WORD.replace_all(&folded, "$1$2");
    let spaced = joined.replace('-', " ");
    WHITESPACE.replace_all(&spaced, " ").trim().to_string()
}

/// Normalized text with every whitespace removed, for layout-insensitive matching.
pub fn squash(text: &str) -> String {
    normalize(text).chars().filter(|c| !c.is_whitespace()).collect()
}

/// Parse a printed score cell ("38", "38 %", "12,5%") into a number.
pub fn parse_score(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%' && *c != '\u{00A0}' && *c != '\u{202F}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| (0.0..=100.0).contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_accents_and_apostrophes() {
        assert_eq!(normalize("Électeurs d\u{2019}Emmanuel Macron"), "electeurs d'emmanuel macron");
        assert_eq!(normalize("  L'ensemble   des\nFrançais "), "l'ensemble des francais");
    }

    #[test]
    fn test_normalize_hyphens() {
        assert_eq!(normalize("Jean-Luc Mélenchon"), "jean luc melenchon");
        assert_eq!(normalize("non\u{2010}inscrits"), "non inscrits");
        assert_eq!(normalize("absten- tionnistes"), "abstentionnistes");
    }

    #[test]
    fn test_squash_ignores_spacing() {
        assert_eq!(squash("Ensemble des  Français"), squash("ensembledes francais"));
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("38"), Some(38.0));
        assert_eq!(parse_score("38 %"), Some(38.0));
        assert_eq!(parse_score("12,5%"), Some(12.5));
        assert_eq!(parse_score("Total"), None);
        assert_eq!(parse_score("-"), None);
        assert_eq!(parse_score("140"), None);
        assert_eq!(parse_score(""), None);
    }
}
