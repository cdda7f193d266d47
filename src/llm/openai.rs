use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::llm::TextGenerator;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const OPENAI_MAX_ATTEMPTS: usize = 2;
const OPENAI_RETRY_BASE_DELAY_MS: u64 = 1000;
const ERROR_BODY_LIMIT: usize = 2000;

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub retry_base_delay: Duration,
}

impl OpenAiSettings {
    /// `None` when no API key is configured; generation then runs locally.
    pub fn from_config() -> Option<Self> {
        let api_key = CONFIG.openai_api_key.trim();
        if api_key.is_empty() {
            return None;
        }
        Some(OpenAiSettings {
            api_key: api_key.to_string(),
            base_url: CONFIG.openai_base_url.clone(),
            model: CONFIG.openai_model.clone(),
            temperature: CONFIG.openai_temperature,
            timeout: Duration::from_secs(CONFIG.openai_timeout_seconds),
            retry_base_delay: Duration::from_millis(OPENAI_RETRY_BASE_DELAY_MS),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    settings: OpenAiSettings,
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn extract_message_content(response: &Value) -> Option<String> {
    response
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

impl OpenAiGenerator {
    pub fn new(settings: OpenAiSettings) -> Self {
        OpenAiGenerator { settings }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    async fn post_chat_completion(&self, payload: &Value) -> Result<Value> {
        let endpoint = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        let response = get_http_client()
            .post(&endpoint)
            .bearer_auth(&self.settings.api_key)
            .timeout(self.settings.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| anyhow!("OpenAI request failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let summary = truncate_for_log(&body, ERROR_BODY_LIMIT);
            warn!("OpenAI API error: status={}, body={}", status, summary);
            return Err(anyhow!(
                "OpenAI request failed with status {}: {}",
                status,
                summary
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| anyhow!("Failed to parse OpenAI response: {err}"))
    }

    async fn chat(&self, system_instruction: &str, user_content: &str) -> Result<String> {
        let payload = json!({
            "model": self.settings.model,
            "temperature": self.settings.temperature,
            "messages": [
                { "role": "system", "content": system_instruction },
                { "role": "user", "content": user_content },
            ],
        });

        let mut last_error = None;
        for attempt in 0..OPENAI_MAX_ATTEMPTS {
            match self.post_chat_completion(&payload).await {
                Ok(response) => {
                    debug!("OpenAI response received for model={}", self.settings.model);
                    return extract_message_content(&response)
                        .ok_or_else(|| anyhow!("OpenAI response had no message content"));
                }
                Err(err) => {
                    warn!(
                        "OpenAI call failed (attempt={}/{}): {}",
                        attempt + 1,
                        OPENAI_MAX_ATTEMPTS,
                        err
                    );
                    last_error = Some(err);
                    if attempt + 1 == OPENAI_MAX_ATTEMPTS {
                        break;
                    }
                    let delay = self.settings.retry_base_delay * (1u32 << attempt);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("OpenAI call failed")))
    }
}

impl TextGenerator for OpenAiGenerator {
    fn complete(
        &self,
        system_instruction: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<String>> + Send {
        let user_content = payload.to_string();
        let metadata = json!({
            "num_prompts": payload.get("num_prompts").cloned().unwrap_or(Value::Null),
            "explore_mode": payload.get("explore_mode").cloned().unwrap_or(Value::Null),
        });
        let system_instruction = system_instruction.to_string();
        async move {
            log_llm_timing(
                "openai",
                &self.settings.model,
                "generate_prompts",
                Some(metadata),
                || async { self.chat(&system_instruction, &user_content).await },
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: String) -> OpenAiSettings {
        OpenAiSettings {
            api_key: "sk-test".to_string(),
            base_url,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.4,
            timeout: Duration::from_secs(5),
            retry_base_delay: Duration::from_millis(1),
        }
    }

    fn completion(content: &str) -> Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"prompts\":[]}")))
            .expect(1)
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(settings(server.uri()));
        let text = generator
            .complete("system", &json!({ "num_prompts": 1 }))
            .await
            .unwrap();
        assert_eq!(text, "{\"prompts\":[]}");
    }

    #[tokio::test]
    async fn retries_server_errors_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(2)
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(settings(server.uri()));
        let err = generator
            .complete("system", &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(settings(server.uri()));
        assert!(generator.complete("system", &json!({})).await.is_err());
    }
}
