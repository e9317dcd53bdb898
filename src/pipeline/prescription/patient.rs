//! Patient, prescriber and date lookup. Each field has its own ordered
//! table and defaults to an empty string.

use std::sync::LazyLock;

use regex::Captures;

use super::rules::{group1, Rule, RuleTable};
use crate::models::PatientMeta;

/// Longest person name kept, in words.
const MAX_NAME_WORDS: usize = 4;

/// Words that end a captured name (the next label on the same line).
const LABEL_WORDS: &[&str] = &[
    "age", "sex", "gender", "date", "dob", "dr", "doctor", "mobile", "phone", "address", "id",
    "reg", "no", "weight", "wt", "height", "ht", "bp", "m", "f", "male", "female", "yrs",
    "years", "rx", "diagnosis",
];

/// Titles dropped from the front of a captured name.
const TITLES: &[&str] = &["mr", "mrs", "ms", "miss", "dr", "doctor", "prof"];

const MONTHS: &str = "jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec";

static PATIENT_RULES: LazyLock<RuleTable<String>> = LazyLock::new(|| {
    RuleTable::new(vec![
        Rule::new(
            "patient_label",
            r"(?im)\bpatient(?:'s)?[ \t]*(?:name)?[ \t]*[:\-][ \t]*([^\n]+)",
            person_name,
        ),
        Rule::new("name_label", r"(?im)^[ \t]*name[ \t]*[:\-][ \t]*([^\n]+)", person_name),
        Rule::new(
            "salutation",
            r"\b(?i:mr|mrs|ms|miss)\.?[ \t]+([A-Z][^\n]*)",
            person_name,
        ),
    ])
});

static DOCTOR_RULES: LazyLock<RuleTable<String>> = LazyLock::new(|| {
    RuleTable::new(vec![
        Rule::new("dr_title", r"\b(?i:dr)\.?[ \t]+([A-Z][^\n]*)", person_name),
        Rule::new(
            "doctor_label",
            r"(?im)\b(?:doctor|consultant|physician|prescribed[ \t]+by)[ \t]*[:\-][ \t]*([^\n]+)",
            person_name,
        ),
    ])
});

static DATE_RULES: LazyLock<RuleTable<String>> = LazyLock::new(|| {
    RuleTable::new(vec![
        Rule::new("iso", r"\b(\d{4}-\d{2}-\d{2})\b", group1),
        Rule::new("numeric", r"\b(\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4})\b", group1),
        Rule::new(
            "day_month_year",
            &format!(r"(?i)\b(\d{{1,2}}(?:st|nd|rd|th)?[ \t]+(?:{MONTHS})[a-z]*\.?,?[ \t]+\d{{2,4}})\b"),
            group1,
        ),
        Rule::new(
            "month_day_year",
            &format!(r"(?i)\b((?:{MONTHS})[a-z]*\.?[ \t]+\d{{1,2}}(?:st|nd|rd|th)?,?[ \t]+\d{{4}})\b"),
            group1,
        ),
    ])
});

/// Up to four name words from the start of the capture, stopping at the next
/// label, a number or a field separator.
fn person_name(caps: &Captures<'_>) -> Option<String> {
    let mut words: Vec<&str> = Vec::new();

    for raw in caps[1].split_whitespace() {
        let word = raw.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '.' | '(' | ')'));
        let lower = word.to_lowercase();
        if word.is_empty() || word.chars().any(|c| c.is_ascii_digit()) {
            break;
        }
        if words.is_empty() && TITLES.contains(&lower.as_str()) {
            continue;
        }
        if LABEL_WORDS.contains(&lower.as_str()) || (raw.contains(':') && !words.is_empty()) {
            break;
        }
        words.push(word);
        if words.len() == MAX_NAME_WORDS || raw.ends_with([',', ';']) {
            break;
        }
    }

    (!words.is_empty()).then(|| words.join(" "))
}

pub fn patient_name(text: &str) -> Option<String> {
    PATIENT_RULES.first_match(text).map(|(_, name)| name)
}

pub fn doctor_name(text: &str) -> Option<String> {
    DOCTOR_RULES.first_match(text).map(|(_, name)| name)
}

pub fn date(text: &str) -> Option<String> {
    DATE_RULES.first_match(text).map(|(_, date)| date)
}

/// Fill every metadata field independently; unmatched fields stay empty.
pub fn extract_patient_meta(text: &str) -> PatientMeta {
    PatientMeta {
        patient_name: patient_name(text).unwrap_or_default(),
        doctor_name: doctor_name(text).unwrap_or_default(),
        date: date(text).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_compile() {
        assert_eq!(PATIENT_RULES.names().collect::<Vec<_>>(), ["patient_label", "name_label", "salutation"]);
        assert_eq!(DOCTOR_RULES.len(), 2);
        assert_eq!(DATE_RULES.len(), 4);
    }

    #[test]
    fn labelled_patient_name() {
        assert_eq!(patient_name("Patient Name: John Carter").as_deref(), Some("John Carter"));
        assert_eq!(patient_name("patient - Asha Rao, 34y").as_deref(), Some("Asha Rao"));
    }

    #[test]
    fn patient_name_stops_at_next_label() {
        let text = "Patient: Ravi Kumar Age: 45 Sex: M";
        assert_eq!(patient_name(text).as_deref(), Some("Ravi Kumar"));
    }

    #[test]
    fn patient_name_is_capped_at_four_words() {
        let text = "Name: Anna Maria Lopez Garcia Fernandez";
        assert_eq!(patient_name(text).as_deref(), Some("Anna Maria Lopez Garcia"));
    }

    #[test]
    fn salutation_fallback() {
        assert_eq!(patient_name("Mrs. Jane Doe 12 Hill Rd").as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn labelled_patient_beats_salutation() {
        let text = "Mr Bob Stone\nPatient: Alice Stone";
        assert_eq!(patient_name(text).as_deref(), Some("Alice Stone"));
    }

    #[test]
    fn doctor_by_title_and_label() {
        assert_eq!(doctor_name("Dr. Meera Shah MBBS").as_deref(), Some("Meera Shah MBBS"));
        assert_eq!(doctor_name("Consultant: Paul Adams").as_deref(), Some("Paul Adams"));
        assert_eq!(doctor_name("Doctor: Dr. Lee").as_deref(), Some("Lee"));
    }

    #[test]
    fn titles_match_in_any_case() {
        assert_eq!(doctor_name("DR. ALAN BROOKS").as_deref(), Some("ALAN BROOKS"));
        assert_eq!(doctor_name("dr Alan Brooks").as_deref(), Some("Alan Brooks"));
        assert_eq!(patient_name("MR. RAVI KUMAR AGE 45").as_deref(), Some("RAVI KUMAR"));
        assert_eq!(patient_name("MRS Jane Doe").as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn title_needs_a_capitalised_name_after_it() {
        assert_eq!(patient_name("do not miss the evening dose"), None);
    }

    #[test]
    fn dates_in_several_formats() {
        assert_eq!(date("Date: 12/03/2024").as_deref(), Some("12/03/2024"));
        assert_eq!(date("on 2024-03-12").as_deref(), Some("2024-03-12"));
        assert_eq!(date("seen 12 March 2024").as_deref(), Some("12 March 2024"));
        assert_eq!(date("seen March 12, 2024").as_deref(), Some("March 12, 2024"));
    }

    #[test]
    fn dosing_schedule_is_not_a_date() {
        assert_eq!(date("Paracetamol 500mg 1-0-1"), None);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let meta = extract_patient_meta("Paracetamol 500mg");
        assert!(meta.is_empty());
    }

    #[test]
    fn full_header() {
        let text = "City Clinic\nDr. Priya Nair\nPatient: Sam Wilson\nDate: 05-06-2023\nAmoxicillin 500mg tid";
        let meta = extract_patient_meta(text);
        assert_eq!(meta.patient_name, "Sam Wilson");
        assert_eq!(meta.doctor_name, "Priya Nair");
        assert_eq!(meta.date, "05-06-2023");
    }
}
