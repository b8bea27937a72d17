use std::sync::Arc;

use async_trait::async_trait;
use klaxon_alert::base::NotifierBase;
use klaxon_alert::bus::{WebhookPayload, WebhookSender};
use klaxon_alert::context::EvalContext;
use klaxon_alert::error::NotifyError;
use klaxon_alert::plugin::NotifierPlugin;
use klaxon_alert::Notifier;
use klaxon_common::types::NotificationConfig;
use serde::Deserialize;

/// Sends the evaluation result as a generic JSON POST to a configured URL.
pub struct WebhookNotifier {
    base: NotifierBase,
    url: String,
    sender: Arc<dyn WebhookSender>,
}

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: "webhook",
        name: "Webhook",
        description: "Sends an HTTP POST request with the evaluation result to a configurable URL",
        factory: new_webhook_notifier,
        options_schema: serde_json::json!({
            "fields": [
                { "key": "url", "label": "Url", "type": "text", "required": true }
            ]
        }),
    }
}

#[derive(Deserialize)]
struct WebhookSettings {
    url: String,
}

fn new_webhook_notifier(
    cfg: &NotificationConfig,
    sender: Arc<dyn WebhookSender>,
) -> Result<Box<dyn Notifier>, NotifyError> {
    let settings: WebhookSettings = serde_json::from_value(cfg.settings.clone())
        .map_err(|e| NotifyError::InvalidConfig(format!("invalid webhook settings: {e}")))?;
    if settings.url.is_empty() {
        return Err(NotifyError::InvalidConfig(
            "could not find url property in settings".into(),
        ));
    }

    Ok(Box::new(WebhookNotifier {
        base: NotifierBase::new(cfg),
        url: settings.url,
        sender,
    }))
}

impl WebhookNotifier {
    fn body(&self, ctx: &EvalContext, rule_url: &str) -> String {
        let matches: Vec<_> = ctx
            .matches
            .iter()
            .map(|m| {
                serde_json::json!({
                    "metric": m.metric,
                    "value": m.value,
                    "tags": m.tags,
                })
            })
            .collect();
        serde_json::json!({
            "title": ctx.notification_title(),
            "state": ctx.rule.state,
            "rule_id": ctx.rule.id,
            "rule_name": ctx.rule.name,
            "rule_url": rule_url,
            "message": ctx.rule.message,
            "eval_matches": matches,
        })
        .to_string()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn should_notify(&self, ctx: &EvalContext) -> bool {
        self.base.should_notify(ctx)
    }

    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(
            rule_id = ctx.rule.id,
            notifier = %self.base.name,
            "sending webhook notification"
        );

        // Optional decoration: a missing rule URL degrades to an empty
        // string rather than aborting the send.
        let rule_url = match ctx.rule_url().await {
            Ok(url) => url,
            Err(err) => {
                tracing::error!(
                    notifier = %self.base.name,
                    error = %err,
                    "failed to resolve rule url"
                );
                String::new()
            }
        };

        let payload = WebhookPayload {
            url: self.url.clone(),
            body: self.body(ctx, &rule_url),
        };
        self.sender.send(&payload, &ctx.cancel).await?;
        self.base.record_notified();
        Ok(())
    }

    fn id(&self) -> i64 {
        self.base.id
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn kind(&self) -> &str {
        &self.base.kind
    }

    fn is_default(&self) -> bool {
        self.base.is_default
    }
}
