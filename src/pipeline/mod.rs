pub mod extraction;
pub mod inference;
pub mod ingest;
pub mod ollama;
pub mod prescription;
