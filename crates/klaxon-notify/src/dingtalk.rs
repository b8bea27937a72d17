use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use klaxon_alert::base::NotifierBase;
use klaxon_alert::bus::{WebhookPayload, WebhookSender};
use klaxon_alert::context::EvalContext;
use klaxon_alert::error::NotifyError;
use klaxon_alert::plugin::NotifierPlugin;
use klaxon_alert::Notifier;
use klaxon_common::types::{Dashboard, DataSource, NotificationConfig};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sends a markdown card to a DingTalk robot webhook.
pub struct DingTalkNotifier {
    base: NotifierBase,
    url: String,
    secret: Option<String>,
    sender: Arc<dyn WebhookSender>,
}

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: "dingtalk",
        name: "DingTalk",
        description: "Sends an HTTP POST request to a DingTalk robot webhook",
        factory: new_dingtalk_notifier,
        options_schema: serde_json::json!({
            "fields": [
                { "key": "url", "label": "Url", "type": "text", "required": true },
                { "key": "secret", "label": "Secret", "type": "password", "required": false }
            ]
        }),
    }
}

#[derive(Deserialize)]
struct DingTalkSettings {
    url: String,
    secret: Option<String>,
}

fn new_dingtalk_notifier(
    cfg: &NotificationConfig,
    sender: Arc<dyn WebhookSender>,
) -> Result<Box<dyn Notifier>, NotifyError> {
    let settings: DingTalkSettings = serde_json::from_value(cfg.settings.clone())
        .map_err(|e| NotifyError::InvalidConfig(format!("invalid dingtalk settings: {e}")))?;
    if settings.url.is_empty() {
        return Err(NotifyError::InvalidConfig(
            "could not find url property in settings".into(),
        ));
    }

    Ok(Box::new(DingTalkNotifier {
        base: NotifierBase::new(cfg),
        url: settings.url,
        secret: settings.secret,
        sender,
    }))
}

impl DingTalkNotifier {
    /// Appends the timestamp and HMAC-SHA256 signature that DingTalk
    /// security-enabled robots require. Without a secret the URL is used
    /// as-is.
    pub fn sign_url(&self, base_url: &str) -> String {
        let Some(secret) = &self.secret else {
            return base_url.to_string();
        };

        let timestamp = chrono::Utc::now().timestamp_millis();
        let string_to_sign = format!("{}\n{}", timestamp, secret);

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        let sign = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        let sign_encoded = urlencoding::encode(&sign);

        format!("{}&timestamp={}&sign={}", base_url, timestamp, sign_encoded)
    }

    fn format_markdown(
        ctx: &EvalContext,
        dashboard: &Dashboard,
        data_source: &DataSource,
        rule_url: &str,
    ) -> (String, String) {
        let title = ctx.notification_title();
        let text = format!(
            "### {title}\n\n\
             - **State**: {state}\n\
             - **Dashboard**: {dash}\n\
             - **Rule**: {rule}\n\
             - **Data source**: {ds}\n\
             - **Query**: {query}\n\
             - **Graph**: [dashboard]({url})\n\n\
             > {message}",
            title = title,
            state = ctx.state_description().text,
            dash = dashboard.title,
            rule = ctx.rule.name,
            ds = data_source.name,
            query = ctx.rule.query,
            url = rule_url,
            message = ctx.rule.message,
        );
        (title, text)
    }
}

#[async_trait]
impl Notifier for DingTalkNotifier {
    fn should_notify(&self, ctx: &EvalContext) -> bool {
        self.base.should_notify(ctx)
    }

    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(
            rule_id = ctx.rule.id,
            notifier = %self.base.name,
            "sending dingtalk notification"
        );

        // Optional decoration degrades to an empty link target.
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

        // Enrichment lookups are fatal: the card cannot be meaningfully
        // constructed without them.
        let data_source = match ctx.get_data_source().await {
            Ok(ds) => ds,
            Err(err) => {
                tracing::error!(
                    notifier = %self.base.name,
                    error = %err,
                    "failed to get data source"
                );
                return Err(err);
            }
        };
        let dashboard = match ctx.get_dashboard().await {
            Ok(dash) => dash,
            Err(err) => {
                tracing::error!(
                    notifier = %self.base.name,
                    error = %err,
                    "failed to get dashboard"
                );
                return Err(err);
            }
        };

        let (card_title, text) = Self::format_markdown(ctx, &dashboard, &data_source, &rule_url);
        let body = serde_json::json!({
            "msgtype": "markdown",
            "markdown": {
                "title": card_title,
                "text": text,
            },
            "at": {
                "isAtAll": false
            }
        })
        .to_string();

        let payload = WebhookPayload {
            url: self.sign_url(&self.url),
            body,
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio_util::sync::CancellationToken;

    struct NullSender;

    #[async_trait]
    impl WebhookSender for NullSender {
        async fn send(
            &self,
            _payload: &WebhookPayload,
            _cancel: &CancellationToken,
        ) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn make_notifier(secret: Option<String>) -> DingTalkNotifier {
        let now = Utc::now();
        let cfg = NotificationConfig {
            id: 1,
            org_id: 1,
            name: "ops".into(),
            kind: "dingtalk".into(),
            is_default: false,
            cooldown_secs: None,
            settings: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        DingTalkNotifier {
            base: NotifierBase::new(&cfg),
            url: "https://oapi.dingtalk.com/robot/send?access_token=test".into(),
            secret,
            sender: Arc::new(NullSender),
        }
    }

    #[test]
    fn signing_appends_timestamp_and_signature() {
        let notifier = make_notifier(Some("SEC_test_secret".into()));
        let signed = notifier.sign_url("https://oapi.dingtalk.com/robot/send?access_token=test");
        assert!(signed.starts_with("https://oapi.dingtalk.com/robot/send?access_token=test&timestamp="));
        assert!(signed.contains("&sign="));
    }

    #[test]
    fn no_secret_leaves_url_unchanged() {
        let notifier = make_notifier(None);
        let url = "https://oapi.dingtalk.com/robot/send?access_token=test";
        assert_eq!(notifier.sign_url(url), url);
    }
}
