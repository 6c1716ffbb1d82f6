//! Orchestration of the extract -> diff -> generate -> validate pipeline

pub mod orchestrator;

pub use orchestrator::{DiffOutcome, GenerateOutcome, Orchestrator, ValidateOutcome};
