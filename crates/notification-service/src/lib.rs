//! Notifier (C10, spec §4.10): synthesizes a message from a terminal
//! `AnalysisResult` and POSTs it to a Discord webhook. Delivery is
//! best-effort with a small bounded retry; failures log but never abort the
//! owning task.
//!
//! Grounded on the teacher's `DiscordWebhookNotifier` for the embed shape
//! and on `polygon-client`'s `send_request` bounded-retry loop for the
//! retry/backoff policy, generalized from a 429-specific wait to an
//! exponential backoff applied to any delivery failure.

use analysis_orchestrator::AnalysisResult;
use std::time::Duration;

/// Maximum delivery attempts for one notification (§4.10).
const MAX_ATTEMPTS: u32 = 3;

/// Base delay doubled on each retry (`attempt` is 0-indexed): 200ms, 400ms.
const BASE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("webhook delivery error: {0}")]
    Webhook(String),
    #[error("no webhook URL configured")]
    NotConfigured,
}

/// Notifier configuration, read from the environment the way the teacher's
/// `NotificationConfig::from_env` reads `DISCORD_WEBHOOK_URL`.
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub webhook_url: Option<String>,
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        Self {
            webhook_url: std::env::var("DISCORD_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
        }
    }
}

/// Dispatches terminal-task notifications to a Discord webhook.
pub struct Notifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(config: &NotifierConfig) -> Self {
        if config.webhook_url.is_none() {
            tracing::info!("no DISCORD_WEBHOOK_URL configured; task notifications are disabled");
        }
        Self { webhook_url: config.webhook_url.clone(), client: reqwest::Client::new() }
    }

    /// Fire-and-forget: spawn delivery so the owning task never blocks on
    /// notification I/O (§4.10 "failures log but never abort the owning task").
    pub fn notify(&self, result: AnalysisResult) {
        let webhook_url = match &self.webhook_url {
            Some(url) => url.clone(),
            None => return,
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = deliver_with_retry(&client, &webhook_url, &result).await {
                tracing::warn!(
                    "failed to deliver notification for execution {}: {}",
                    result.execution_id,
                    e
                );
            }
        });
    }

    /// Awaited variant for callers (tests, a synchronous CLI path) that need
    /// delivery to complete before proceeding.
    pub async fn notify_async(&self, result: &AnalysisResult) -> Result<(), NotificationError> {
        let webhook_url = self.webhook_url.as_ref().ok_or(NotificationError::NotConfigured)?;
        deliver_with_retry(&self.client, webhook_url, result).await
    }
}

async fn deliver_with_retry(
    client: &reqwest::Client,
    webhook_url: &str,
    result: &AnalysisResult,
) -> Result<(), NotificationError> {
    let payload = build_payload(result);
    let mut last_error = String::new();

    for attempt in 0..MAX_ATTEMPTS {
        match client.post(webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => last_error = format!("webhook returned status {}", response.status()),
            Err(e) => last_error = e.to_string(),
        }

        if attempt + 1 < MAX_ATTEMPTS {
            let backoff = BASE_BACKOFF * 2u32.pow(attempt);
            tracing::warn!(
                "notification delivery attempt {}/{} failed for execution {}, retrying in {:?}: {}",
                attempt + 1,
                MAX_ATTEMPTS,
                result.execution_id,
                backoff,
                last_error
            );
            tokio::time::sleep(backoff).await;
        }
    }

    Err(NotificationError::Webhook(last_error))
}

/// Two message styles, selected from the Analysis Result fields (§4.10):
/// "early-exit detail" (stage + reason + suggestion) and "simple completion"
/// (signal found / error).
fn build_payload(result: &AnalysisResult) -> serde_json::Value {
    let color = if result.completed {
        0x22c55e
    } else if result.early_exit {
        0xf97316
    } else {
        0xef4444
    };

    let title = format!("{} / {} / {}", result.symbol, result.timeframe, result.strategy);
    let description = if result.early_exit {
        let suggestion = result.suggestions().into_iter().next().unwrap_or_default();
        format!(
            "No trade — stopped at **{:?}** ({:?})\n{}",
            result.exit_stage.unwrap_or(analysis_core::Stage::Initializing),
            result.exit_reason,
            suggestion
        )
    } else {
        result.user_message()
    };

    serde_json::json!({
        "embeds": [{
            "title": title,
            "description": description,
            "color": color,
            "timestamp": result.completed_at.unwrap_or(result.started_at).to_rfc3339(),
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{ExitReason, Stage};
    use analysis_orchestrator::StageResult;

    fn early_exit_result() -> AnalysisResult {
        let mut result = AnalysisResult::new("BTC", "1h", "momentum", "exec-1");
        result.record_stage(StageResult {
            stage: Stage::SupportResistance,
            success: true,
            execution_time_ms: 5,
            data_processed: None,
            items_found: Some(0),
            error_message: None,
        });
        result.into_early_exit(Stage::SupportResistance, ExitReason::NoSupportResistance, "no levels")
    }

    #[test]
    fn payload_for_early_exit_includes_the_stage_and_reason() {
        let result = early_exit_result();
        let payload = build_payload(&result);
        let description = payload["embeds"][0]["description"].as_str().unwrap();
        assert!(description.contains("SupportResistance"));
        assert!(description.contains("No trade"));
    }

    #[test]
    fn payload_for_completion_uses_the_simple_style() {
        let result = AnalysisResult::new("ETH", "15m", "mean_reversion", "exec-2")
            .into_completed(serde_json::json!({"recommended_leverage": 3.0}));
        let payload = build_payload(&result);
        let description = payload["embeds"][0]["description"].as_str().unwrap();
        assert!(description.contains("signal found"));
    }

    #[tokio::test]
    async fn notify_is_a_no_op_without_a_configured_webhook() {
        let notifier = Notifier::new(&NotifierConfig { webhook_url: None });
        let result = notifier.notify_async(&early_exit_result()).await;
        assert!(matches!(result, Err(NotificationError::NotConfigured)));
    }

    #[test]
    fn from_env_is_none_when_unset() {
        std::env::remove_var("DISCORD_WEBHOOK_URL");
        let config = NotifierConfig::from_env();
        assert!(config.webhook_url.is_none());
    }
}
