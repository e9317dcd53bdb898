//! Short heuristic summary of an ingest request.

use serde_json::Value;

/// Summary used when neither demographics nor a note are available.
pub const DEFAULT_SUMMARY: &str = "Clinical data provided";

const FRAGMENT_SEPARATOR: &str = " - ";
const FIRST_SENTENCE_CHARS: usize = 50;

/// Case-insensitive phrases and the abbreviation each contributes.
const KEYWORDS: &[(&[&str], &str)] = &[
    (&["chest pain"], "chest pain"),
    (&["shortness of breath", "dyspnea"], "dyspnea"),
    (&["hypertension", "high blood pressure"], "HTN"),
    (&["diabetes"], "DM"),
];

/// A structured field value as summary text. Null, false, zero and empty
/// values count as missing.
fn field_text(structured: &Value, key: &str) -> Option<String> {
    match structured.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".into()),
        _ => None,
    }
}

/// `"<age>yo <gender>"`, `"<age>yo"` or `"<gender>"`.
pub fn demographics(structured: &Value) -> Option<String> {
    match (field_text(structured, "age"), field_text(structured, "gender")) {
        (Some(age), Some(gender)) => Some(format!("{age}yo {gender}")),
        (Some(age), None) => Some(format!("{age}yo")),
        (None, Some(gender)) => Some(gender),
        (None, None) => None,
    }
}

pub fn keyword_fragments(note: &str) -> Vec<&'static str> {
    let lower = note.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|(phrases, _)| phrases.iter().any(|p| lower.contains(p)))
        .map(|(_, abbreviation)| *abbreviation)
        .collect()
}

/// Text before the first period, cut to 50 characters.
pub fn first_sentence(note: &str) -> String {
    note.split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .take(FIRST_SENTENCE_CHARS)
        .collect()
}

pub fn summarize(structured: Option<&Value>, note: Option<&str>) -> String {
    let mut fragments: Vec<String> = structured.and_then(demographics).into_iter().collect();

    if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
        fragments.extend(keyword_fragments(note).into_iter().map(String::from));
        if fragments.len() < 2 {
            fragments.push(first_sentence(note));
        }
    }

    if fragments.is_empty() {
        DEFAULT_SUMMARY.to_string()
    } else {
        fragments.join(FRAGMENT_SEPARATOR)
    }
}
