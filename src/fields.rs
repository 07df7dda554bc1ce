//! Best-effort structured fields parsed from extracted text.
//!
//! Scanned forms tend to carry a document designator ("Form 1040") and
//! label/value pairs ("Refund: $2500"). We pull out the obvious ones so
//! clients get something structured without a second model call. Absence of
//! any recognizable field is not an error.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;

/// A document/form designator like "Form 1040" or "form W-2".
static FORM_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bform\s+([0-9A-Z][0-9A-Za-z-]*)").expect("failed to compile regex")
});

/// A `Label: value` line. Labels are kept short so we don't mistake prose
/// containing a colon for a field.
static KEY_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9 /_-]{0,40}?)\s*:\s*(\S.*?)\s*$")
        .expect("failed to compile regex")
});

/// Upper bound on captured pairs, to keep records small for noisy documents.
const MAX_FIELDS: usize = 16;

/// Parse structured key/value data out of extracted lines.
///
/// Returns `None` when nothing recognizable was found. Never fails: a
/// best-effort field miss must not fail the job.
pub fn extract_fields(lines: &[String]) -> Option<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    for line in lines {
        if !fields.contains_key("form_type")
            && let Some(caps) = FORM_TYPE_RE.captures(line)
        {
            fields.insert(
                "form_type".to_owned(),
                format!("Form {}", caps[1].to_uppercase()),
            );
        }
        if fields.len() >= MAX_FIELDS {
            break;
        }
        if let Some(caps) = KEY_VALUE_RE.captures(line) {
            let key = normalize_key(&caps[1]);
            if !key.is_empty() {
                // First occurrence wins; OCR output often repeats headers.
                fields.entry(key).or_insert_with(|| caps[2].to_owned());
            }
        }
    }
    if fields.is_empty() { None } else { Some(fields) }
}

/// Lowercase a label and join its words with underscores.
fn normalize_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn finds_form_type_and_key_value_pairs() {
        let fields = extract_fields(&lines(&[
            "Form 1040",
            "Tax Year 2023",
            "Refund: $2500",
        ]))
        .unwrap();
        assert_eq!(fields.get("form_type").unwrap(), "Form 1040");
        assert_eq!(fields.get("refund").unwrap(), "$2500");
    }

    #[test]
    fn labels_are_normalized_and_first_occurrence_wins() {
        let fields = extract_fields(&lines(&[
            "Tax Year: 2023",
            "Tax Year: 1999",
        ]))
        .unwrap();
        assert_eq!(fields.get("tax_year").unwrap(), "2023");
    }

    #[test]
    fn unrecognizable_text_yields_none() {
        assert!(extract_fields(&lines(&["just a sentence of prose"])).is_none());
        assert!(extract_fields(&[]).is_none());
    }

    #[test]
    fn field_count_is_bounded() {
        let noisy: Vec<String> = (0..100).map(|i| format!("Field{i}: value{i}")).collect();
        let fields = extract_fields(&noisy).unwrap();
        assert!(fields.len() <= MAX_FIELDS);
    }
}
