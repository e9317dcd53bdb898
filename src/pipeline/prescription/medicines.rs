//! Medicine line extraction: segmentation, name/dose rules, frequency and
//! duration lookup, stoplist filtering and de-duplication.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::rules::{Rule, RuleTable};
use crate::models::{ExtractionRecord, DEFAULT_FREQUENCY};

/// Shortest accepted medicine name, in characters.
pub const MIN_NAME_LEN: usize = 3;

/// Words that look like names on a prescription but never are medicines.
const STOPLIST: &[&str] = &[
    "patient", "name", "age", "sex", "gender", "male", "female", "date", "doctor", "dr", "mr",
    "mrs", "ms", "miss", "hospital", "clinic", "pharmacy", "prescription", "rx", "diagnosis",
    "address", "phone", "mobile", "signature", "sign", "reg", "no", "take", "tab", "tabs",
    "tablet", "tablets", "cap", "caps", "capsule", "capsules", "syp", "syr", "syrup", "inj",
    "injection", "dose", "dosage", "qty", "quantity", "refill", "refills", "daily", "once",
    "twice", "thrice", "morning", "evening", "night", "bedtime", "after", "before", "with",
    "food", "meal", "meals", "breakfast", "lunch", "dinner", "day", "days", "week", "weeks",
    "month", "months", "for", "and", "the", "then", "each", "every", "times", "follow", "review",
    "advice", "advised", "next", "visit", "weight", "height", "pulse", "temp", "note", "notes",
    "instructions", "continue", "stop", "apply", "use", "oral", "orally", "total", "as",
    "directed", "needed", "if", "required", "empty", "stomach", "other", "please", "give",
    "start", "started", "starting", "continued", "stopped", "sig",
];

const MEAL_RELATIVE: &str =
    r"(?i)\b((?:before|after|with)\s+(?:meals?|food|breakfast|lunch|dinner))\b";
const TIME_OF_DAY: &str =
    r"(?i)\b(at\s+(?:bedtime|night)|in\s+the\s+(?:morning|evening)|on\s+(?:an\s+)?empty\s+stomach)\b";

/// Rule whose match only counts inside a segment that carries a medication cue.
const CUE_GATED_RULE: &str = "capitalised_token";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    name: String,
    dosage: Option<String>,
    /// Segment text after the matched dose, searched first for the schedule.
    tail: String,
}

static ABBREVIATION_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(tabs?|caps?|syp|syr|inj|dr|mr|mrs|ms|no)\.").unwrap());

static SEGMENT_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n;|•]+|\.(?:\s+|$)").unwrap());

static DOSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(mg|g|ml|tablet|cap)s?\b").unwrap()
});

static DOSAGE_AT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*(mg|g|ml|tablet|cap)s?\b").unwrap()
});

static FORM_CUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:tabs?|caps?|syp|syr|inj)\b").unwrap());

static MEDICINE_RULES: LazyLock<RuleTable<Candidate>> = LazyLock::new(|| {
    RuleTable::new(vec![
        Rule::new(
            "name_dose_frequency",
            r"(?i)\b([a-z][a-z\-]*(?:\s+[a-z][a-z\-]*){0,2})\s*(\d+(?:\.\d+)?)\s*(mg|g|ml|tablet|cap)s?\b(.*)$",
            name_with_dose,
        ),
        Rule::new(CUE_GATED_RULE, r"\b([A-Z][A-Za-z]{2,}(?:-[A-Za-z]+)?)\b", bare_name),
    ])
});

static FREQUENCY_RULES: LazyLock<RuleTable<String>> = LazyLock::new(|| {
    RuleTable::new(vec![
        Rule::new(
            "numeric_schedule",
            r"\b(\d\s*-\s*\d\s*-\s*\d(?:\s*-\s*\d)?)\b",
            |c| Some(c[1].split_whitespace().collect()),
        ),
        Rule::new(
            "named_frequency",
            r"(?i)\b((?:once|twice|thrice)\s+(?:a\s+)?(?:daily|day|weekly|week))\b",
            lowercase_collapsed,
        ),
        Rule::new(
            "times_per_day",
            r"(?i)\b(\d+\s*times?\s*(?:a\s+|per\s+)?(?:day|daily))\b",
            lowercase_collapsed,
        ),
        Rule::new(
            "every_hours",
            r"(?i)\b(every\s+\d+\s*(?:hours?|hrs?))\b",
            lowercase_collapsed,
        ),
        Rule::new(
            "abbreviation",
            r"(?i)\b(od|bd|bid|tid|tds|qid|qds|hs|prn|sos|stat)\b",
            |c| Some(c[1].to_uppercase()),
        ),
        Rule::new(
            "frequency_word",
            r"(?i)\b(daily|nightly|weekly)\b",
            lowercase_collapsed,
        ),
        Rule::new(
            "meal_relative",
            MEAL_RELATIVE,
            lowercase_collapsed,
        ),
        Rule::new(
            "time_of_day",
            TIME_OF_DAY,
            lowercase_collapsed,
        ),
    ])
});

/// Rules describing when to take a dose rather than how often.
const TIMING_RULES: &[&str] = &["meal_relative", "time_of_day"];

static DURATION_RULES: LazyLock<RuleTable<String>> = LazyLock::new(|| {
    RuleTable::new(vec![
        Rule::new(
            "for_span",
            r"(?i)\bfor\s+(\d+)\s*(day|week|month)s?\b",
            span,
        ),
        Rule::new(
            "times_span",
            r"(?i)(?:\bx|×)\s*(\d+)\s*(day|week|month)s?\b",
            span,
        ),
        Rule::new("bare_span", r"(?i)\b(\d+)\s*(day|week|month)s?\b", span),
    ])
});

static TIMING_TABLE: LazyLock<RuleTable<String>> = LazyLock::new(|| {
    RuleTable::new(vec![
        Rule::new(
            "meal_relative",
            MEAL_RELATIVE,
            lowercase_collapsed,
        ),
        Rule::new(
            "time_of_day",
            TIME_OF_DAY,
            lowercase_collapsed,
        ),
    ])
});

// ──────────────────────────────────────────────
// Rule extractors
// ──────────────────────────────────────────────

fn name_with_dose(caps: &Captures<'_>) -> Option<Candidate> {
    let name = clean_name(&caps[1])?;
    Some(Candidate {
        name,
        dosage: Some(format!("{}{}", &caps[2], caps[3].to_lowercase())),
        tail: caps.get(4).map(|m| m.as_str().to_string()).unwrap_or_default(),
    })
}

fn bare_name(caps: &Captures<'_>) -> Option<Candidate> {
    let name = caps[1].to_string();
    if !is_acceptable_name(&name) {
        return None;
    }
    Some(Candidate {
        name,
        dosage: None,
        tail: String::new(),
    })
}

fn lowercase_collapsed(caps: &Captures<'_>) -> Option<String> {
    let collapsed = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed.to_lowercase())
}

fn span(caps: &Captures<'_>) -> Option<String> {
    let count: u32 = caps[1].parse().ok()?;
    let unit = caps[2].to_lowercase();
    Some(if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    })
}

// ──────────────────────────────────────────────
// Name filtering
// ──────────────────────────────────────────────

fn is_stopword(word: &str) -> bool {
    STOPLIST.contains(&word.to_lowercase().as_str())
}

fn is_acceptable_name(name: &str) -> bool {
    name.chars().count() >= MIN_NAME_LEN && !is_stopword(name)
}

/// Second words that stay attached to the word before them
/// (`Folic Acid`, `Diclofenac Sodium`).
const NAME_QUALIFIERS: &[&str] = &[
    "acid", "sodium", "potassium", "calcium", "magnesium", "hydrochloride", "hcl", "forte", "plus",
];

/// Short all-caps suffixes such as `D` in `Vitamin D` or `SR`.
fn is_qualifier(word: &str) -> bool {
    let short_caps = word.len() <= 2 && word.chars().all(|c| c.is_ascii_uppercase());
    short_caps || NAME_QUALIFIERS.contains(&word.to_lowercase().as_str())
}

/// Reduce a multi-word candidate to the medicine name at its end.
///
/// The name is the last non-stoplisted word, plus the word before it when
/// the last word is a qualifier. `Take Tab Amoxicillin` and
/// `was given Paracetamol` both become the bare drug name.
fn clean_name(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw.split_whitespace().collect();
    let end = words.iter().rposition(|w| !is_stopword(w))?;
    let start = match end.checked_sub(1) {
        Some(prev) if is_qualifier(words[end]) && !is_stopword(words[prev]) => prev,
        _ => end,
    };
    let name = words[start..=end].join(" ");
    is_acceptable_name(&name).then_some(name)
}

// ──────────────────────────────────────────────
// Segmentation
// ──────────────────────────────────────────────

/// Split text into candidate medicine segments.
///
/// Breaks on line ends, `;`, `|`, bullets and sentence-ending periods
/// (decimal points are kept). Inside a segment that already holds a dose,
/// a capitalised word directly followed by another dose starts a new segment.
pub fn segment(text: &str) -> Vec<String> {
    let normalized = ABBREVIATION_DOT.replace_all(text, "$1");
    SEGMENT_BREAK
        .split(&normalized)
        .flat_map(split_on_capitalised_names)
        .filter(|s| !s.trim().is_empty())
        .collect()
}

fn split_on_capitalised_names(segment: &str) -> Vec<String> {
    let tokens: Vec<&str> = segment.split_whitespace().collect();
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut has_dose = false;

    for (i, token) in tokens.iter().enumerate() {
        if has_dose && starts_uppercase(token) && dose_follows(&tokens[i..]) {
            segments.push(current.join(" "));
            current.clear();
            has_dose = false;
        }
        // A dose spans at most two tokens (`500 mg`).
        let split_dose = current
            .last()
            .is_some_and(|prev| DOSAGE.is_match(&format!("{prev} {token}")));
        has_dose = has_dose || split_dose || DOSAGE.is_match(token);
        current.push(token);
    }
    if !current.is_empty() {
        segments.push(current.join(" "));
    }
    segments
}

fn starts_uppercase(token: &str) -> bool {
    token.chars().next().is_some_and(char::is_uppercase)
}

/// True when the tokens starting at a name carry a dose right after it,
/// either glued (`Ibuprofen400mg`) or in the next one or two tokens.
fn dose_follows(tokens: &[&str]) -> bool {
    let Some(name) = tokens.first() else {
        return false;
    };
    let glued = name.trim_start_matches(|c: char| c.is_alphabetic() || c == '-');
    if !glued.is_empty() && DOSAGE_AT_START.is_match(glued) {
        return true;
    }
    let next = tokens[1..].iter().take(2).copied().collect::<Vec<_>>().join(" ");
    DOSAGE_AT_START.is_match(&next)
}

fn has_medication_cue(segment: &str) -> bool {
    DOSAGE.is_match(segment) || FREQUENCY_RULES.first_match(segment).is_some() || FORM_CUE.is_match(segment)
}

// ──────────────────────────────────────────────
// Field derivation
// ──────────────────────────────────────────────

fn derive_dosage(segment: &str) -> String {
    DOSAGE
        .captures(segment)
        .map(|c| format!("{}{}", &c[1], c[2].to_lowercase()))
        .unwrap_or_default()
}

/// Schedule from the text after the dose, else from the whole segment.
/// A when-to-take phrase is appended to a numeric or named schedule.
pub fn derive_frequency(tail: &str, segment: &str) -> String {
    let matched = FREQUENCY_RULES
        .first_match(tail)
        .or_else(|| FREQUENCY_RULES.first_match(segment));

    match matched {
        Some((rule, frequency)) if !TIMING_RULES.contains(&rule) => {
            match TIMING_TABLE.first_match(segment) {
                Some((_, timing)) => format!("{frequency} {timing}"),
                None => frequency,
            }
        }
        Some((_, timing)) => timing,
        None => DEFAULT_FREQUENCY.to_string(),
    }
}

pub fn derive_duration(segment: &str) -> Option<String> {
    DURATION_RULES.first_match(segment).map(|(_, d)| d)
}

// ──────────────────────────────────────────────
// Entry point
// ──────────────────────────────────────────────

/// Extract medicine records from free text.
///
/// Never fails. Returns exactly one sentinel record when nothing matched.
pub fn extract_medicines(text: &str) -> Vec<ExtractionRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::new();

    for segment in segment(text) {
        let Some((rule, candidate)) = MEDICINE_RULES.first_match(&segment) else {
            continue;
        };
        if rule == CUE_GATED_RULE && !has_medication_cue(&segment) {
            continue;
        }
        if !seen.insert(candidate.name.to_lowercase()) {
            tracing::debug!(name = %candidate.name, "Duplicate medicine skipped");
            continue;
        }

        let dosage = candidate.dosage.unwrap_or_else(|| derive_dosage(&segment));
        let frequency = derive_frequency(&candidate.tail, &segment);
        let duration = derive_duration(&segment);
        tracing::debug!(rule, name = %candidate.name, %dosage, %frequency, "Medicine matched");

        records.push(ExtractionRecord {
            name: candidate.name,
            dosage,
            frequency,
            duration,
        });
    }

    if records.is_empty() {
        records.push(ExtractionRecord::sentinel());
    }
    records
}
