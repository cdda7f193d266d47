use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("No prompt structures found for renderer {0}")]
    NoStructuresForRenderer(String),
    #[error("Designers and colors are required")]
    MissingDesignersOrColors,
    #[error("No garments available")]
    NoGarments,
    #[error("No prompt structures available")]
    NoStructures,
    #[error("LLM could not return required prompt count (requested {requested}, got {produced})")]
    Exhausted { requested: usize, produced: usize },
}

impl GenerationError {
    /// Input errors cannot be fixed by retrying the generator.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, GenerationError::Exhausted { .. })
    }
}
