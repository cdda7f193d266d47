use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::handlers::{error_response, rejection_response};
use crate::prompts::{GeneratedPrompt, GenerationRequest};
use crate::state::AppState;
use crate::utils::timing::{complete_request_timer, start_request_timer, RequestTimer};

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratePromptsRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub num_prompts: i64,
    pub renderer: String,
}

impl GeneratePromptsRequest {
    fn validate(&self, max_prompts: usize) -> Result<GenerationRequest, String> {
        if self.num_prompts <= 0 {
            return Err("num_prompts must be greater than 0".to_string());
        }
        if u64::try_from(self.num_prompts).map_or(true, |count| count > max_prompts as u64) {
            return Err(format!("num_prompts must be at most {max_prompts}"));
        }
        if self.renderer.trim().is_empty() {
            return Err("renderer must not be empty".to_string());
        }
        let num_prompts = usize::try_from(self.num_prompts)
            .map_err(|_| format!("num_prompts must be at most {max_prompts}"))?;
        Ok(GenerationRequest {
            num_prompts,
            renderer: self.renderer.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct GeneratePromptsResponse {
    pub prompts: Vec<GeneratedPrompt>,
}

pub async fn generate_prompts(
    State(state): State<AppState>,
    payload: Result<Json<GeneratePromptsRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected /generate-prompts body: {}", rejection.body_text());
            return rejection_response(rejection);
        }
    };
    let request = match payload.validate(state.max_prompts_per_request) {
        Ok(request) => request,
        Err(message) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, message),
    };

    let mut timer = start_request_timer(
        RequestTimer::new("/generate-prompts", payload.request_id.clone())
            .with_generation(&request.renderer, request.num_prompts),
    );

    let pools = match state.records.load_pools(&request.renderer).await {
        Ok(pools) => pools,
        Err(err) => {
            error!("Failed to load records from Airtable: {err}");
            let message = format!("Airtable error: {err}");
            complete_request_timer(&mut timer, "error", Some(message.clone()));
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, message);
        }
    };

    let mut rng = StdRng::from_os_rng();
    let result = crate::prompts::generate_prompts(
        &request,
        &pools,
        &state.store,
        state.generator.as_deref(),
        &mut rng,
    )
    .await;

    match result {
        Ok(prompts) => {
            info!(
                "Generated {} prompt(s) for renderer={} request_id={:?}",
                prompts.len(),
                request.renderer,
                payload.request_id
            );
            complete_request_timer(&mut timer, "success", Some(format!("prompts={}", prompts.len())));
            Json(GeneratePromptsResponse { prompts }).into_response()
        }
        Err(err) => {
            if err.is_input_error() {
                warn!("Prompt generation rejected for renderer={}: {err}", request.renderer);
            } else {
                error!("Prompt generation failed for renderer={}: {err}", request.renderer);
            }
            complete_request_timer(&mut timer, "error", Some(err.to_string()));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
