use async_trait::async_trait;
use klaxon_alert::bus::{WebhookPayload, WebhookSender};
use klaxon_alert::error::NotifyError;
use tokio_util::sync::CancellationToken;

/// [`WebhookSender`] backed by a shared `reqwest` client, with bounded
/// retry and exponential backoff. Cancelling the evaluation cycle aborts
/// the in-flight request and any pending backoff sleep.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn post_once(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&payload.url)
            .header("Content-Type", "application/json")
            .body(payload.body.clone())
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(NotifyError::Delivery(format!("HTTP {status}: {body}")))
        }
    }
}

impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(
        &self,
        payload: &WebhookPayload,
        cancel: &CancellationToken,
    ) -> Result<(), NotifyError> {
        let mut last_err = None;

        for attempt in 0..3u32 {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(NotifyError::Cancelled),
                res = self.post_once(payload) => res,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url = %payload.url,
                        error = %e,
                        "webhook delivery failed, retrying"
                    );
                    last_err = Some(e);
                }
            }
            if attempt < 2 {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(NotifyError::Cancelled),
                    _ = tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt))) => {}
                }
            }
        }

        Err(last_err.unwrap_or_else(|| NotifyError::Delivery("no attempts made".into())))
    }
}
