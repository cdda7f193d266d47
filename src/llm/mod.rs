pub mod openai;

use std::future::Future;

use anyhow::Result;
use serde_json::Value;

pub use openai::{OpenAiGenerator, OpenAiSettings};

/// A text-completion backend for prompt generation. Returns the raw model
/// text; callers validate it.
pub trait TextGenerator: Send + Sync {
    fn complete(
        &self,
        system_instruction: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<String>> + Send;
}
