use std::sync::Arc;

use crate::config::CONFIG;
use crate::llm::{OpenAiGenerator, OpenAiSettings};
use crate::prompts::orchestrator::MAX_PROMPTS_PER_REQUEST;
use crate::prompts::PreferenceStore;
use crate::records::{AirtableClient, AirtableSettings};

#[derive(Clone)]
pub struct AppState {
    pub store: PreferenceStore,
    pub records: Arc<AirtableClient>,
    pub generator: Option<Arc<OpenAiGenerator>>,
    pub max_prompts_per_request: usize,
}

impl AppState {
    pub fn new(
        store: PreferenceStore,
        records: AirtableClient,
        generator: Option<OpenAiGenerator>,
    ) -> Self {
        AppState {
            store,
            records: Arc::new(records),
            generator: generator.map(Arc::new),
            max_prompts_per_request: MAX_PROMPTS_PER_REQUEST,
        }
    }

    pub fn with_max_prompts(mut self, max_prompts_per_request: usize) -> Self {
        self.max_prompts_per_request = max_prompts_per_request.clamp(1, MAX_PROMPTS_PER_REQUEST);
        self
    }

    pub fn from_config() -> Self {
        AppState::new(
            PreferenceStore::new(CONFIG.preference_exploration_rate),
            AirtableClient::new(AirtableSettings::from_config()),
            OpenAiSettings::from_config().map(OpenAiGenerator::new),
        )
        .with_max_prompts(CONFIG.max_prompts_per_request)
    }
}
