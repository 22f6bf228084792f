//! Webhook delivery of join outcomes

use super::JoinSink;
use crate::config::{WebhookConfig, WebhookEvent};
use crate::error::{Error, Result};
use crate::types::{Event, JoinOutcome, JoinProgress, WebhookPayload};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;

/// POSTs a [`WebhookPayload`] for every join outcome
///
/// Only webhooks subscribed to the outcome kind are called. Start and
/// progress notifications are not forwarded. Delivery runs in the background
/// so a slow endpoint never holds up the join that produced the outcome.
/// Failures are logged and published as [`Event::WebhookFailed`] when an
/// event channel is attached.
#[derive(Clone)]
pub struct WebhookSink {
    webhooks: Vec<WebhookConfig>,
    client: reqwest::Client,
    event_tx: Option<broadcast::Sender<Event>>,
    tracker: Option<TaskTracker>,
}

impl WebhookSink {
    /// Deliver to `webhooks`
    pub fn new(webhooks: Vec<WebhookConfig>) -> Self {
        Self {
            webhooks,
            client: reqwest::Client::new(),
            event_tx: None,
            tracker: None,
        }
    }

    /// Also publish delivery failures on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Spawn deliveries on `tracker` so the owner can wait for them on shutdown
    pub fn with_tracker(mut self, tracker: TaskTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Number of configured webhooks
    pub fn len(&self) -> usize {
        self.webhooks.len()
    }

    /// Whether no webhook is configured
    pub fn is_empty(&self) -> bool {
        self.webhooks.is_empty()
    }
}

/// POST `payload` to one webhook
async fn deliver(
    client: &reqwest::Client,
    webhook: &WebhookConfig,
    payload: &WebhookPayload,
) -> Result<()> {
    let mut request = client.post(&webhook.url).json(payload).timeout(webhook.timeout);

    if let Some(auth) = &webhook.auth_header {
        request = request.header("Authorization", auth);
    }

    let response = tokio::time::timeout(webhook.timeout, request.send())
        .await
        .map_err(|_| Error::Sink(format!("webhook timed out after {:?}", webhook.timeout)))??;

    if !response.status().is_success() {
        return Err(Error::Sink(format!(
            "webhook returned status {}: {}",
            response.status(),
            response.text().await.unwrap_or_default()
        )));
    }

    tracing::debug!(url = %webhook.url, "webhook sent successfully");
    Ok(())
}

#[async_trait]
impl JoinSink for WebhookSink {
    async fn announce_start(&self, _logical_id: &str, _fragment_count: usize) -> Result<()> {
        Ok(())
    }

    async fn report_progress(&self, _progress: &JoinProgress) -> Result<()> {
        Ok(())
    }

    async fn announce_outcome(&self, outcome: &JoinOutcome) -> Result<()> {
        let (kind, event) = if outcome.success {
            (WebhookEvent::OnComplete, "complete")
        } else {
            (WebhookEvent::OnFailed, "failed")
        };

        let matching: Vec<WebhookConfig> = self
            .webhooks
            .iter()
            .filter(|w| w.events.contains(&kind))
            .cloned()
            .collect();
        if matching.is_empty() {
            return Ok(());
        }

        let payload = Arc::new(WebhookPayload {
            event: event.to_string(),
            logical_id: outcome.logical_id.clone(),
            output_path: outcome.output_path.clone(),
            actual_size: outcome.actual_size,
            expected_size: outcome.expected_size,
            size_mismatch: outcome.size_mismatch,
            error: outcome.error.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        });

        for webhook in matching {
            let client = self.client.clone();
            let payload = Arc::clone(&payload);
            let event_tx = self.event_tx.clone();

            let delivery = async move {
                if let Err(e) = deliver(&client, &webhook, &payload).await {
                    tracing::warn!(url = %webhook.url, error = %e, "webhook failed");
                    if let Some(tx) = event_tx {
                        tx.send(Event::WebhookFailed {
                            url: webhook.url,
                            error: e.to_string(),
                        })
                        .ok();
                    }
                }
            };

            match &self.tracker {
                Some(tracker) => {
                    tracker.spawn(delivery);
                }
                None => {
                    tokio::spawn(delivery);
                }
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn webhook(url: String, events: Vec<WebhookEvent>) -> WebhookConfig {
        WebhookConfig {
            url,
            events,
            auth_header: None,
            timeout: Duration::from_secs(5),
        }
    }

    fn outcome(success: bool) -> JoinOutcome {
        JoinOutcome {
            logical_id: "movie".into(),
            success,
            output_path: PathBuf::from("/downloads/movie.rar"),
            actual_size: 100,
            expected_size: 100,
            size_mismatch: false,
            cancelled: false,
            error: (!success).then(|| "cannot read fragment".to_string()),
        }
    }

    /// Sink whose deliveries can be awaited
    fn tracked(webhooks: Vec<WebhookConfig>) -> (WebhookSink, TaskTracker) {
        let tracker = TaskTracker::new();
        (WebhookSink::new(webhooks).with_tracker(tracker.clone()), tracker)
    }

    async fn settle(tracker: &TaskTracker) {
        tracker.close();
        tokio::time::timeout(Duration::from_secs(10), tracker.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn posts_completion_payload_with_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "event": "complete",
                "logical_id": "movie",
                "actual_size": 100,
                "size_mismatch": false
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = webhook(format!("{}/hook", server.uri()), vec![WebhookEvent::OnComplete]);
        config.auth_header = Some("Bearer secret".into());

        let (sink, tracker) = tracked(vec![config]);
        sink.announce_outcome(&outcome(true)).await.unwrap();
        settle(&tracker).await;
    }

    #[tokio::test]
    async fn skips_webhooks_not_subscribed_to_the_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (sink, tracker) = tracked(vec![webhook(server.uri(), vec![WebhookEvent::OnComplete])]);
        sink.announce_outcome(&outcome(false)).await.unwrap();
        sink.announce_start("movie", 2).await.unwrap();
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn failure_payload_carries_the_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "event": "failed",
                "error": "cannot read fragment"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (sink, tracker) = tracked(vec![webhook(server.uri(), vec![WebhookEvent::OnFailed])]);
        sink.announce_outcome(&outcome(false)).await.unwrap();
        settle(&tracker).await;
    }

    #[tokio::test]
    async fn error_status_is_published_not_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (tx, mut rx) = broadcast::channel(4);
        let (sink, tracker) = tracked(vec![webhook(server.uri(), vec![WebhookEvent::OnComplete])]);
        let sink = sink.with_events(tx);

        sink.announce_outcome(&outcome(true)).await.unwrap();
        settle(&tracker).await;

        match rx.recv().await.unwrap() {
            Event::WebhookFailed { url, error } => {
                assert_eq!(url, server.uri());
                assert!(error.contains("500"));
                assert!(error.contains("boom"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_webhook_does_not_hold_up_the_caller() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let mut config = webhook(server.uri(), vec![WebhookEvent::OnComplete]);
        config.timeout = Duration::from_millis(300);

        let (tx, mut rx) = broadcast::channel(4);
        let (sink, tracker) = tracked(vec![config]);
        let sink = sink.with_events(tx);
        assert_eq!(sink.len(), 1);

        let started = std::time::Instant::now();
        sink.announce_outcome(&outcome(true)).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(tracker.len(), 1);

        settle(&tracker).await;
        match rx.recv().await.unwrap() {
            Event::WebhookFailed { url, .. } => assert_eq!(url, server.uri()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        // Bind then drop a listener to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = webhook(format!("http://127.0.0.1:{port}/hook"), vec![WebhookEvent::OnComplete]);
        let payload = WebhookPayload {
            event: "complete".into(),
            logical_id: "movie".into(),
            output_path: PathBuf::from("/downloads/movie.rar"),
            actual_size: 1,
            expected_size: 1,
            size_mismatch: false,
            error: None,
            timestamp: 0,
        };

        let err = deliver(&reqwest::Client::new(), &config, &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)), "{err}");
        assert_eq!(err.code(), "network_error");
    }
}
