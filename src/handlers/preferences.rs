use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::handlers::{rejection_response, SERVICE_NAME};
use crate::prompts::{FeedbackUpdate, StructureInsights};
use crate::state::AppState;

const TOP_PREFERENCES_LIMIT: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub global_preference_vector: HashMap<String, f64>,
    #[serde(default)]
    pub exploration_rate: Option<f64>,
    #[serde(default)]
    pub structure_scores: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub structure_prompt_insights: Option<HashMap<String, StructureInsights>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopStructuresQuery {
    #[serde(default = "default_top_limit")]
    pub limit: usize,
}

fn default_top_limit() -> usize {
    10
}

/// `{name: score}` object keeping the descending order of `entries`.
fn ranked_object(entries: Vec<(String, f64)>) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(name, score)| (name, json!(score)))
        .collect()
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let preferences = state.store.snapshot();
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "message": "Service is running and ready",
        "preferences_loaded": preferences.has_preferences(),
        "structure_scores_loaded": preferences.has_structure_scores(),
        "structure_insights_loaded": preferences.has_structure_insights(),
        "exploration_rate": preferences.exploration_rate(),
        "generator_configured": state.generator.is_some(),
    }))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    payload: Result<Json<UpdatePreferencesRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    let preferences_count = request.global_preference_vector.len();
    state.store.update(FeedbackUpdate {
        attribute_weights: request.global_preference_vector,
        exploration_rate: request.exploration_rate,
        structure_scores: request.structure_scores,
        structure_insights: request.structure_prompt_insights,
    });

    let preferences = state.store.snapshot();
    let scores = preferences.structures_with_scores_count();
    let insights = preferences.structures_with_insights_count();
    Json(json!({
        "status": "success",
        "preferences_count": preferences_count,
        "exploration_rate": preferences.exploration_rate(),
        "structures_with_scores": scores,
        "structures_with_insights": insights,
        "message": format!(
            "Updated {preferences_count} preferences, {scores} structure scores, {insights} structure insights"
        ),
    }))
    .into_response()
}

pub async fn get_preferences(State(state): State<AppState>) -> Json<Value> {
    let preferences = state.store.snapshot();
    let status = if preferences.has_preferences() {
        "loaded"
    } else {
        "empty"
    };
    Json(json!({
        "status": status,
        "has_preferences": preferences.has_preferences(),
        "has_structure_scores": preferences.has_structure_scores(),
        "has_structure_insights": preferences.has_structure_insights(),
        "top_preferences": ranked_object(preferences.top_preferences(TOP_PREFERENCES_LIMIT)),
        "exploration_rate": preferences.exploration_rate(),
        "structures_with_scores": preferences.structures_with_scores_count(),
        "structures_with_insights": preferences.structures_with_insights_count(),
        "last_updated": preferences.last_updated(),
    }))
}

pub async fn get_structure_preferences(
    State(state): State<AppState>,
    Path(structure_id): Path<String>,
) -> Json<Value> {
    let preferences = state.store.snapshot();
    let score = preferences.structure_score(&structure_id);
    let insights = preferences.structure_insights(&structure_id);

    if score.is_none() && insights.is_none() {
        return Json(json!({
            "status": "not_found",
            "structure_id": structure_id,
            "message": "No data available for this structure",
        }));
    }

    Json(json!({
        "status": "found",
        "structure_id": structure_id,
        "optimizer_score": score,
        "insights": insights,
    }))
}

pub async fn get_top_structures(
    State(state): State<AppState>,
    Query(query): Query<TopStructuresQuery>,
) -> Json<Value> {
    let preferences = state.store.snapshot();
    if !preferences.has_structure_scores() {
        return Json(json!({
            "status": "not_loaded",
            "message": "No structure scores loaded",
        }));
    }

    Json(json!({
        "status": "loaded",
        "top_structures": ranked_object(preferences.top_structures(query.limit)),
        "total_structures_with_scores": preferences.structures_with_scores_count(),
    }))
}

pub async fn get_exploration_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.store.exploration_stats()))
}

pub async fn reset_exploration_stats(State(state): State<AppState>) -> Json<Value> {
    state.store.reset_exploration_stats();
    info!("Exploration stats reset");
    Json(json!({
        "status": "reset",
        "message": "Exploration stats reset to zero",
    }))
}

pub async fn clear_preferences(State(state): State<AppState>) -> Json<Value> {
    state.store.clear();
    Json(json!({
        "status": "cleared",
        "message": "Preferences reset to default",
    }))
}
