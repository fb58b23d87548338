// 🔤 Text Helpers - folding, Argentine numbers, dates, sections
// Shared by the CPE and settlement parsers

use chrono::NaiveDate;
use regex::Regex;
use sha2::{Digest, Sha256};

// ============================================================================
// FOLDING
// ============================================================================

/// Lowercase and strip Spanish accents so keyword scans don't care about
/// "Liquidación" vs "LIQUIDACION".
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Accent/case-insensitive substring test
pub fn contains_folded(haystack: &str, needle: &str) -> bool {
    fold(haystack).contains(&fold(needle))
}

/// Keep only ASCII digits ("33-71234567-9" → "33712345679")
pub fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

// ============================================================================
// NUMBERS
// ============================================================================

/// Parse a number as printed on Argentine documents.
///
/// Handles:
/// - "30.160"     → 30160.0  (dot as thousands separator)
/// - "1.234,56"   → 1234.56
/// - "1234,56"    → 1234.56
/// - "1,234.56"   → 1234.56
/// - "$ 12.500,00" → 12500.0
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');

    let normalized = match (last_dot, last_comma) {
        (Some(d), Some(c)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => {
            if cleaned.matches(',').count() > 1 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (Some(d), None) => {
            let decimals = cleaned.len() - d - 1;
            if cleaned.matches('.').count() > 1 || decimals == 3 {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, None) => cleaned,
    };

    normalized.parse::<f64>().ok()
}

/// Round to a fixed number of decimals (half away from zero)
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ============================================================================
// DATES
// ============================================================================

/// Parse dd/mm/yyyy, dd-mm-yyyy or ISO yyyy-mm-dd
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d/%m/%y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Return the slice between two section headers (case-insensitive).
///
/// With `end == None`, or when the end marker never shows up after the
/// start marker, the section runs to the end of the text.
pub fn extract_section<'a>(text: &'a str, start: &str, end: Option<&str>) -> Option<&'a str> {
    let start_re = Regex::new(&format!("(?i){}", regex::escape(start))).ok()?;
    let start_match = start_re.find(text)?;
    let rest = &text[start_match.end()..];

    let section = match end {
        Some(end_marker) => {
            let end_re = Regex::new(&format!("(?i){}", regex::escape(end_marker))).ok()?;
            match end_re.find(rest) {
                Some(m) => &rest[..m.start()],
                None => rest,
            }
        }
        None => rest,
    };

    Some(section)
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// SHA-256 of the whitespace-normalised document text.
/// Same document extracted twice → same hash, regardless of line wrapping.
pub fn document_hash(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================
