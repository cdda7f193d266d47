use std::env;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::prompts::orchestrator::MAX_PROMPTS_PER_REQUEST;
use crate::prompts::preferences::DEFAULT_EXPLORATION_RATE;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub host: String,
    pub port: u16,
    pub service_url: String,
    pub optimizer_service_url: String,
    pub preference_exploration_rate: f64,
    pub max_prompts_per_request: usize,
    pub airtable_api_key: String,
    pub airtable_base_id: String,
    pub airtable_api_url: String,
    pub airtable_timeout_seconds: u64,
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
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub openai_base_url: String,
    pub openai_timeout_seconds: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

/// First non-empty value among `names`; later names are legacy aliases.
fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn env_string(names: &[&str], default: &str) -> String {
    env_any(names).unwrap_or_else(|| default.to_string())
}

fn env_f32(names: &[&str], default: f32) -> f32 {
    env_any(names)
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_f64(names: &[&str], default: f64) -> f64 {
    env_any(names)
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_u64(names: &[&str], default: u64) -> u64 {
    env_any(names)
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn normalize_exploration_rate(value: f64) -> f64 {
    if (0.0..=1.0).contains(&value) {
        return value;
    }
    warn!(
        "PREFERENCE_EXPLORATION_RATE {} is outside [0, 1]; defaulting to {}.",
        value, DEFAULT_EXPLORATION_RATE
    );
    DEFAULT_EXPLORATION_RATE
}

fn normalize_max_prompts(value: u64) -> usize {
    let ceiling = MAX_PROMPTS_PER_REQUEST as u64;
    if (1..=ceiling).contains(&value) {
        return value as usize;
    }
    warn!(
        "MAX_PROMPTS_PER_REQUEST {} is outside [1, {}]; using {}.",
        value, ceiling, ceiling
    );
    MAX_PROMPTS_PER_REQUEST
}

fn parse_port(value: Option<String>) -> Result<u16> {
    match value {
        None => Ok(8000),
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: {raw}")),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let port = parse_port(env_any(&["PORT", "VITE_PORT"]))?;

        Ok(Config {
            log_level: env_string(&["LOG_LEVEL"], "info").to_lowercase(),
            host: env_string(&["HOST"], "0.0.0.0"),
            port,
            service_url: env_string(&["SERVICE_URL", "VITE_APP_URL"], ""),
            optimizer_service_url: env_string(
                &["OPTIMIZER_SERVICE_URL"],
                "https://optimizer-2ym2.onrender.com",
            ),
            preference_exploration_rate: normalize_exploration_rate(env_f64(
                &["PREFERENCE_EXPLORATION_RATE"],
                DEFAULT_EXPLORATION_RATE,
            )),
            max_prompts_per_request: normalize_max_prompts(env_u64(
                &["MAX_PROMPTS_PER_REQUEST"],
                MAX_PROMPTS_PER_REQUEST as u64,
            )),
            airtable_api_key: env_string(&["AIRTABLE_API_KEY", "VITE_AIRTABLE_API_KEY"], ""),
            airtable_base_id: env_string(&["AIRTABLE_BASE_ID", "VITE_AIRTABLE_BASE_ID"], ""),
            airtable_api_url: env_string(&["AIRTABLE_API_URL"], "https://api.airtable.com/v0"),
            airtable_timeout_seconds: env_u64(&["AIRTABLE_TIMEOUT_SECONDS"], 15),
            designers_table_id: env_string(
                &[
                    "DESIGNERS_TABLE_ID",
                    "VITE_DESIGNERS_TABLE_ID",
                    "VITE_AIRTABLE_DESIGNERS_TABLE",
                ],
                "",
            ),
            colors_table_id: env_string(
                &[
                    "COLORS_TABLE_ID",
                    "VITE_COLORS_TABLE_ID",
                    "VITE_AIRTABLE_COLORS_TABLE",
                ],
                "",
            ),
            garments_table_id: env_string(
                &[
                    "GARMENTS_TABLE_ID",
                    "VITE_GARMENTS_TABLE_ID",
                    "VITE_AIRTABLE_GARMENTS_TABLE",
                ],
                "",
            ),
            prompt_structures_table_id: env_string(
                &[
                    "PROMPT_STRUCTURES_TABLE_ID",
                    "VITE_PROMPT_STRUCTURES_TABLE_ID",
                    "VITE_AIRTABLE_STRUCTURES_TABLE",
                ],
                "",
            ),
            colors_active_view: env_string(
                &[
                    "COLORS_ACTIVE_VIEW",
                    "VITE_COLORS_ACTIVE_VIEW",
                    "VITE_VIEW_COLORS_ACTIVE",
                ],
                "",
            ),
            garments_tops_view: env_string(
                &[
                    "GARMENTS_TOPS_VIEW",
                    "VITE_GARMENTS_TOPS_VIEW",
                    "VITE_VIEW_GARMENTS_TOPS",
                ],
                "",
            ),
            garments_dresses_view: env_string(
                &[
                    "GARMENTS_DRESSES_VIEW",
                    "VITE_GARMENTS_DRESSES_VIEW",
                    "VITE_VIEW_GARMENTS_DRESSES",
                ],
                "",
            ),
            garments_outerwear_view: env_string(
                &[
                    "GARMENTS_OUTERWEAR_VIEW",
                    "VITE_GARMENTS_OUTERWEAR_VIEW",
                    "VITE_VIEW_GARMENTS_OUTERWEAR",
                ],
                "",
            ),
            garments_pants_view: env_string(
                &[
                    "GARMENTS_PANTS_VIEW",
                    "VITE_GARMENTS_PANTS_VIEW",
                    "VITE_VIEW_GARMENTS_PANTS",
                ],
                "",
            ),
            prompt_structures_active_view: env_string(
                &[
                    "PROMPT_STRUCTURES_ACTIVE_VIEW",
                    "VITE_PROMPT_STRUCTURES_ACTIVE_VIEW",
                    "VITE_VIEW_STRUCTURES_ACTIVE",
                ],
                "",
            ),
            openai_api_key: env_string(&["OPENAI_API_KEY", "VITE_OPENAI_API_KEY"], ""),
            openai_model: env_string(&["OPENAI_MODEL", "VITE_OPENAI_MODEL"], "gpt-4o-mini"),
            openai_temperature: env_f32(&["OPENAI_TEMPERATURE", "VITE_OPENAI_TEMPERATURE"], 0.4),
            openai_base_url: env_string(&["OPENAI_BASE_URL"], "https://api.openai.com/v1"),
            openai_timeout_seconds: env_u64(&["OPENAI_TIMEOUT_SECONDS"], 30),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_and_rejects_garbage() {
        assert_eq!(parse_port(None).unwrap(), 8000);
        assert_eq!(parse_port(Some("9100".to_string())).unwrap(), 9100);
        assert!(parse_port(Some("eighty".to_string())).is_err());
    }

    #[test]
    fn out_of_range_exploration_rate_falls_back() {
        assert_eq!(normalize_exploration_rate(0.35), 0.35);
        assert_eq!(normalize_exploration_rate(1.5), DEFAULT_EXPLORATION_RATE);
        assert_eq!(normalize_exploration_rate(-0.1), DEFAULT_EXPLORATION_RATE);
    }

    #[test]
    fn prompt_limit_is_capped_at_the_hard_ceiling() {
        assert_eq!(normalize_max_prompts(25), 25);
        assert_eq!(normalize_max_prompts(0), MAX_PROMPTS_PER_REQUEST);
        assert_eq!(normalize_max_prompts(1_000_000), MAX_PROMPTS_PER_REQUEST);
    }

    #[test]
    fn service_url_reads_legacy_alias() {
        env::set_var("VITE_APP_URL", "https://prompts.example.com");
        let config = Config::load().unwrap();
        assert_eq!(config.service_url, "https://prompts.example.com");
    }

    #[test]
    fn alias_lookup_skips_blank_values() {
        env::set_var("EPM_TEST_PRIMARY", "   ");
        env::set_var("EPM_TEST_ALIAS", "from-alias");
        assert_eq!(
            env_string(&["EPM_TEST_PRIMARY", "EPM_TEST_ALIAS"], "default"),
            "from-alias"
        );
        assert_eq!(env_string(&["EPM_TEST_MISSING"], "default"), "default");
    }
}
