pub mod generate;
pub mod preferences;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub const SERVICE_NAME: &str = "evolving-prompt-maker";

/// Every failure leaves the service as a single `{"error": "..."}` body.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Missing or mistyped fields come back as 422, broken JSON as 400.
pub fn rejection_response(rejection: JsonRejection) -> Response {
    error_response(rejection.status(), rejection.body_text())
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Evolving Prompt Maker API",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(preferences::health))
        .route("/generate-prompts", post(generate::generate_prompts))
        .route("/update_preferences", post(preferences::update_preferences))
        .route(
            "/preferences",
            get(preferences::get_preferences).delete(preferences::clear_preferences),
        )
        .route(
            "/preferences/structure/{structure_id}",
            get(preferences::get_structure_preferences),
        )
        .route(
            "/preferences/structures/top",
            get(preferences::get_top_structures),
        )
        .route(
            "/preferences/exploration_stats",
            get(preferences::get_exploration_stats),
        )
        .route(
            "/preferences/reset_exploration_stats",
            post(preferences::reset_exploration_stats),
        )
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::response::Response;
    use serde_json::Value;

    use crate::prompts::PreferenceStore;
    use crate::records::{AirtableClient, AirtableSettings};
    use crate::state::AppState;

    pub fn airtable_settings(api_url: String) -> AirtableSettings {
        AirtableSettings {
            api_key: "key-test".to_string(),
            base_id: "appBase".to_string(),
            api_url,
            timeout: Duration::from_secs(5),
            retry_base_delay: Duration::from_millis(1),
            designers_table_id: "tblDesigners".to_string(),
            colors_table_id: "tblColors".to_string(),
            garments_table_id: "tblGarments".to_string(),
            prompt_structures_table_id: "tblStructures".to_string(),
            garments_tops_view: "Tops".to_string(),
            garments_dresses_view: "Dresses".to_string(),
            garments_outerwear_view: "Outerwear".to_string(),
            garments_pants_view: "Pants".to_string(),
            ..AirtableSettings::default()
        }
    }

    pub fn state_with(api_url: String) -> AppState {
        AppState::new(
            PreferenceStore::new(0.2),
            AirtableClient::new(airtable_settings(api_url)),
            None,
        )
    }

    pub async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
