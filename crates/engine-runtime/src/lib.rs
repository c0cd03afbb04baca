pub mod capability;
pub mod error;
pub mod ingest;
pub mod orchestrator;
pub mod sizing;
