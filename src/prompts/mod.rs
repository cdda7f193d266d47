pub mod error;
pub mod instructions;
pub mod orchestrator;
pub mod preferences;
pub mod sampling;
pub mod selection;
pub mod template;
pub mod types;

pub use error::GenerationError;
pub use orchestrator::generate_prompts;
pub use preferences::{FeedbackUpdate, PreferenceStore, StructureInsights};
pub use types::{GeneratedPrompt, GenerationRequest, PromptPools};
