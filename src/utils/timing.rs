use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "service.timing";

#[derive(Debug)]
pub struct RequestTimer {
    route: String,
    request_id: Option<String>,
    renderer: Option<String>,
    num_prompts: Option<usize>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl RequestTimer {
    pub fn new(route: &str, request_id: Option<String>) -> Self {
        RequestTimer {
            route: route.to_string(),
            request_id,
            renderer: None,
            num_prompts: None,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn with_generation(mut self, renderer: &str, num_prompts: usize) -> Self {
        self.renderer = Some(renderer.to_string());
        self.num_prompts = Some(num_prompts);
        self
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=request_received route={} request_id={:?} renderer={:?} num_prompts={:?} received_at={}",
            self.route,
            self.request_id,
            self.renderer,
            self.num_prompts,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=request_completed route={} request_id={:?} renderer={:?} num_prompts={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.route,
            self.request_id,
            self.renderer,
            self.num_prompts,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_request_timer(timer: RequestTimer) -> RequestTimer {
    timer.log_received();
    timer
}

pub fn complete_request_timer(timer: &mut RequestTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_err() { "error" } else { "success" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn completion_is_logged_once() {
        let mut timer = RequestTimer::new("/generate-prompts", Some("req-1".to_string()))
            .with_generation("Recraft", 3);
        complete_request_timer(&mut timer, "error", Some("Airtable error".to_string()));
        assert!(timer.completed);
        assert_eq!(timer.status, "error");
        timer.mark_status("success", None);
        timer.log_completed();
        assert_eq!(timer.status, "success");
    }

    #[tokio::test]
    async fn llm_timing_passes_result_through() {
        let ok = log_llm_timing("openai", "gpt-4o-mini", "test", None, || async {
            Ok::<_, anyhow::Error>(7)
        })
        .await
        .unwrap();
        assert_eq!(ok, 7);

        let err = log_llm_timing::<u8, _, _>("openai", "gpt-4o-mini", "test", None, || async {
            Err(anyhow!("boom"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
