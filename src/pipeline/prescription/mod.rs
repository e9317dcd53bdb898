//! Field Extractor: turns raw prescription or note text into medicine
//! records and patient metadata using ordered regex rule tables.
//!
//! Extraction never fails. When no medicine matches, the record list holds
//! exactly one sentinel (see [`ExtractionRecord::sentinel`]).

pub mod medicines;
pub mod patient;
pub mod rules;

use crate::models::{Extraction, ExtractionRecord};

pub use medicines::extract_medicines;
pub use patient::extract_patient_meta;

/// Run both medicine and metadata extraction over `text`.
pub fn extract(text: &str) -> Extraction {
    let records = extract_medicines(text);
    let meta = extract_patient_meta(text);

    let found = records.iter().filter(|r| !r.is_sentinel()).count();
    tracing::debug!(found, chars = text.len(), "Field extraction complete");

    Extraction { records, meta }
}

/// Medicine records with the sentinel dropped, for callers that treat an
/// empty list as "none".
pub fn extract_records(text: &str) -> Vec<ExtractionRecord> {
    extract(text).into_medicines()
}
