use serde::{Deserialize, Serialize};

/// Name carried by the placeholder record returned when nothing matched.
pub const NO_MEDICINES_FOUND: &str = "No medicines found";

/// Frequency used when no schedule pattern matches.
pub const DEFAULT_FREQUENCY: &str = "As directed";

/// One medicine line pulled out of free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl ExtractionRecord {
    /// The "no medicines found" placeholder. Not data: check `is_sentinel`.
    pub fn sentinel() -> Self {
        Self {
            name: NO_MEDICINES_FOUND.to_string(),
            dosage: String::new(),
            frequency: String::new(),
            duration: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.name == NO_MEDICINES_FOUND && self.dosage.is_empty()
    }
}

/// Patient, prescriber and date fields. Empty string when not found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientMeta {
    pub patient_name: String,
    pub doctor_name: String,
    pub date: String,
}

impl PatientMeta {
    pub fn is_empty(&self) -> bool {
        self.patient_name.is_empty() && self.doctor_name.is_empty() && self.date.is_empty()
    }
}

/// Output of one Field Extractor run.
///
/// `records` is never empty: when no medicine matched it holds exactly the
/// sentinel record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub records: Vec<ExtractionRecord>,
    pub meta: PatientMeta,
}

impl Extraction {
    pub fn found_nothing(&self) -> bool {
        self.records.iter().all(ExtractionRecord::is_sentinel)
    }

    /// Records with the sentinel removed.
    pub fn medicines(&self) -> impl Iterator<Item = &ExtractionRecord> {
        self.records.iter().filter(|r| !r.is_sentinel())
    }

    pub fn into_medicines(self) -> Vec<ExtractionRecord> {
        self.records.into_iter().filter(|r| !r.is_sentinel()).collect()
    }
}
