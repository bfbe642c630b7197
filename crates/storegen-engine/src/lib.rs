pub mod assistant;
pub mod config;
pub mod dryrun;
pub mod gemini;
pub mod images;
pub mod invoke;
pub mod orchestrator;
pub mod prompts;
pub mod service;

#[cfg(test)]
mod test_support;

pub use assistant::AssistantInterpreter;
pub use config::SynthesisConfig;
pub use invoke::FallbackPolicy;
pub use orchestrator::{CancelToken, Orchestrator, RunOutcome};
pub use service::{InlineImage, ModelRequest, ModelResponse, ModelService, Operation, ServiceRouter};
