//! Pipeline stages
//!
//! Each stage wraps one generation call with its role instruction and
//! contract. Stages never retry; the orchestrator owns retry policy.

pub mod extraction;
pub mod gatekeeper;
pub mod summarization;
pub mod validation;

pub use extraction::ExtractionStage;
pub use gatekeeper::GatekeeperStage;
pub use summarization::SummarizationStage;
pub use validation::ValidationStage;
