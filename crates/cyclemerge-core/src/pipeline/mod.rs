pub mod config;
mod orchestrator;
mod types;

pub use orchestrator::{run_registration, run_registration_reported};
pub use types::{PipelineStage, ProgressReporter, RegistrationOutput};
