use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::prompts::types::{Color, Designer, Garment, GarmentPools, PromptPools, PromptStructure};
use crate::utils::http::get_http_client;

const AIRTABLE_MAX_ATTEMPTS: usize = 3;
const AIRTABLE_RETRY_BASE_DELAY_MS: u64 = 1000;
const ERROR_BODY_LIMIT: usize = 800;

#[derive(Debug, Clone, Default)]
pub struct AirtableSettings {
    pub api_key: String,
    pub base_id: String,
    pub api_url: String,
    pub timeout: Duration,
    pub retry_base_delay: Duration,
    pub designers_table_id: String,
    pub colors_table_id: String,
    pub garments_table_id: String,
    pub prompt_structures_table_id: String,
    pub colors_active_view: String,
    pub garments_tops_view: String,
    pub garments_dresses_view: String,
    pub garments_outerwear_view: String,
    pub garments_pants_view: String,
    pub prompt_structures_active_view: String,
}

impl AirtableSettings {
    pub fn from_config() -> Self {
        AirtableSettings {
            api_key: CONFIG.airtable_api_key.clone(),
            base_id: CONFIG.airtable_base_id.clone(),
            api_url: CONFIG.airtable_api_url.clone(),
            timeout: Duration::from_secs(CONFIG.airtable_timeout_seconds),
            retry_base_delay: Duration::from_millis(AIRTABLE_RETRY_BASE_DELAY_MS),
            designers_table_id: CONFIG.designers_table_id.clone(),
            colors_table_id: CONFIG.colors_table_id.clone(),
            garments_table_id: CONFIG.garments_table_id.clone(),
            prompt_structures_table_id: CONFIG.prompt_structures_table_id.clone(),
            colors_active_view: CONFIG.colors_active_view.clone(),
            garments_tops_view: CONFIG.garments_tops_view.clone(),
            garments_dresses_view: CONFIG.garments_dresses_view.clone(),
            garments_outerwear_view: CONFIG.garments_outerwear_view.clone(),
            garments_pants_view: CONFIG.garments_pants_view.clone(),
            prompt_structures_active_view: CONFIG.prompt_structures_active_view.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AirtableRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct AirtableListResponse {
    #[serde(default)]
    records: Vec<AirtableRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AirtableClient {
    settings: AirtableSettings,
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Airtable returns multi-selects as arrays but single values as strings.
fn list_field(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    match fields.get(key) {
        Some(Value::String(value)) => vec![value.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str())
            .map(|v| v.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

fn number_field(fields: &Map<String, Value>, key: &str) -> f64 {
    fields.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

pub fn map_designer(record: &AirtableRecord) -> Designer {
    Designer {
        id: record.id.clone(),
        name: text_field(&record.fields, "Designer Name").unwrap_or_default(),
        style: list_field(&record.fields, "Design Style"),
    }
}

pub fn map_color(record: &AirtableRecord) -> Color {
    Color {
        id: record.id.clone(),
        name: text_field(&record.fields, "Old Color Name")
            .map(|name| name.trim().to_string())
            .unwrap_or_default(),
    }
}

pub fn map_garment(record: &AirtableRecord) -> Garment {
    Garment {
        id: record.id.clone(),
        name: text_field(&record.fields, "Garment Name").unwrap_or_default(),
        primary_design_elements: list_field(&record.fields, "Primary Design Element"),
        technical_features: list_field(&record.fields, "Technical Feature"),
        premium_constructions: list_field(&record.fields, "Premium Construction"),
    }
}

pub fn map_prompt_structure(record: &AirtableRecord) -> PromptStructure {
    let fields = &record.fields;
    PromptStructure {
        id: record.id.clone(),
        structure_id: text_field(fields, "Structure ID").unwrap_or_default(),
        renderer: text_field(fields, "Renderer").unwrap_or_default(),
        skeleton: text_field(fields, "Skeleton")
            .or_else(|| text_field(fields, "skeleton"))
            .unwrap_or_default(),
        outlier_count: number_field(fields, "outlier_count"),
        usage_count: number_field(fields, "usage_count"),
        avg_rating: number_field(fields, "avg_rating"),
        z_score: number_field(fields, "z_score"),
        age_weeks: number_field(fields, "age_weeks"),
        ai_critique: text_field(fields, "AI Critique")
            .or_else(|| text_field(fields, "ai_critique"))
            .unwrap_or_default(),
        comments: text_field(fields, "Comments").unwrap_or_default(),
    }
}

impl AirtableClient {
    pub fn new(settings: AirtableSettings) -> Self {
        AirtableClient { settings }
    }

    fn table_url(&self, table_id: &str) -> Result<String> {
        if self.settings.base_id.trim().is_empty() {
            return Err(anyhow!("Missing AIRTABLE_BASE_ID (set it in your .env)"));
        }
        if self.settings.api_key.trim().is_empty() {
            return Err(anyhow!("Missing AIRTABLE_API_KEY (set it in your .env)"));
        }
        if table_id.trim().is_empty() {
            return Err(anyhow!(
                "Missing Airtable table id (check your .env variables)"
            ));
        }
        Ok(format!(
            "{}/{}/{}",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.base_id,
            table_id
        ))
    }

    async fn fetch_page(
        &self,
        url: &str,
        view: &str,
        offset: Option<&str>,
    ) -> Result<AirtableListResponse> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if !view.is_empty() {
            query.push(("view", view));
        }
        if let Some(offset) = offset {
            query.push(("offset", offset));
        }

        for attempt in 0..AIRTABLE_MAX_ATTEMPTS {
            let last_attempt = attempt + 1 == AIRTABLE_MAX_ATTEMPTS;
            let delay = self.settings.retry_base_delay * (1u32 << attempt);

            let response = match get_http_client()
                .get(url)
                .bearer_auth(&self.settings.api_key)
                .query(&query)
                .timeout(self.settings.timeout)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(
                        "Airtable request to {url} failed: {err} (attempt={}/{})",
                        attempt + 1,
                        AIRTABLE_MAX_ATTEMPTS
                    );
                    if last_attempt {
                        return Err(anyhow!("Airtable request failed: {err}"));
                    }
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(anyhow!(
                    "Invalid Airtable credentials. Check AIRTABLE_API_KEY."
                ));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let summary = truncate_for_log(&body, ERROR_BODY_LIMIT);
                warn!(
                    "Airtable request to {url} failed with status {status}: {summary} (attempt={}/{})",
                    attempt + 1,
                    AIRTABLE_MAX_ATTEMPTS
                );
                if !should_retry_status(status) || last_attempt {
                    return Err(anyhow!(
                        "Airtable request failed with status {}: {}",
                        status,
                        summary
                    ));
                }
                tokio::time::sleep(delay).await;
                continue;
            }

            return response
                .json::<AirtableListResponse>()
                .await
                .map_err(|err| anyhow!("Failed to parse Airtable response: {err}"));
        }

        Err(anyhow!("Airtable request failed"))
    }

    /// Fetches every record of a table (following pagination), optionally
    /// restricted to a view.
    pub async fn fetch_records(&self, table_id: &str, view: &str) -> Result<Vec<AirtableRecord>> {
        let url = self.table_url(table_id)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let page = self.fetch_page(&url, view, offset.as_deref()).await?;
            records.extend(page.records);
            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }

        debug!(
            "Fetched {} Airtable record(s) from table={} view={}",
            records.len(),
            table_id,
            view
        );
        Ok(records)
    }

    pub async fn fetch_designers(&self) -> Result<Vec<Designer>> {
        let records = self
            .fetch_records(&self.settings.designers_table_id, "")
            .await?;
        Ok(records.iter().map(map_designer).collect())
    }

    pub async fn fetch_colors(&self) -> Result<Vec<Color>> {
        let records = self
            .fetch_records(
                &self.settings.colors_table_id,
                &self.settings.colors_active_view,
            )
            .await?;
        Ok(records.iter().map(map_color).collect())
    }

    pub async fn fetch_garments_by_category(&self) -> Result<GarmentPools> {
        let table = &self.settings.garments_table_id;
        let tops = self
            .fetch_records(table, &self.settings.garments_tops_view)
            .await?;

        let mut others = Vec::new();
        for view in [
            &self.settings.garments_dresses_view,
            &self.settings.garments_outerwear_view,
            &self.settings.garments_pants_view,
        ] {
            others.extend(self.fetch_records(table, view).await?);
        }

        Ok(GarmentPools {
            tops: tops.iter().map(map_garment).collect(),
            others: others.iter().map(map_garment).collect(),
        })
    }

    pub async fn fetch_prompt_structures(&self, renderer: &str) -> Result<Vec<PromptStructure>> {
        let records = self
            .fetch_records(
                &self.settings.prompt_structures_table_id,
                &self.settings.prompt_structures_active_view,
            )
            .await?;
        Ok(records
            .iter()
            .map(map_prompt_structure)
            .filter(|structure| structure.renderer == renderer)
            .collect())
    }

    pub async fn load_pools(&self, renderer: &str) -> Result<PromptPools> {
        Ok(PromptPools {
            designers: self.fetch_designers().await?,
            colors: self.fetch_colors().await?,
            garments: self.fetch_garments_by_category().await?,
            structures: self.fetch_prompt_structures(renderer).await?,
        })
    }
}
