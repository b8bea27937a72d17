use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use klaxon_alert::bus::{MetaLookup, WebhookPayload, WebhookSender};
use klaxon_alert::context::EvalContext;
use klaxon_alert::error::NotifyError;
use klaxon_alert::plugin::NotifierRegistry;
use klaxon_common::types::{AlertState, Dashboard, DataSource, NotificationConfig, Rule};
use tokio_util::sync::CancellationToken;

use crate::register_builtin;

const APP_URL: &str = "https://klaxon.example.com/";

fn make_rule(state: AlertState) -> Rule {
    Rule {
        id: 42,
        org_id: 1,
        dashboard_id: 7,
        panel_id: 3,
        name: "High CPU".into(),
        message: "CPU usage is above the configured threshold".into(),
        query: "avg(cpu.usage) > 90".into(),
        data_source_id: 5,
        state,
        notifications: vec![100],
    }
}

fn make_config(kind: &str, settings: serde_json::Value) -> NotificationConfig {
    let now = Utc::now();
    NotificationConfig {
        id: 100,
        org_id: 1,
        name: "ops".into(),
        kind: kind.into(),
        is_default: false,
        cooldown_secs: None,
        settings,
        created_at: now,
        updated_at: now,
    }
}

struct FakeMeta;

#[async_trait]
impl MetaLookup for FakeMeta {
    async fn dashboard_by_id(&self, id: i64, _org_id: i64) -> Result<Dashboard, NotifyError> {
        Ok(Dashboard {
            id,
            title: "Service Health".into(),
            slug: "service-health".into(),
        })
    }

    async fn dashboard_slug_by_id(&self, _id: i64) -> Result<String, NotifyError> {
        Ok("service-health".into())
    }

    async fn data_source_by_id(&self, id: i64, _org_id: i64) -> Result<DataSource, NotifyError> {
        Ok(DataSource {
            id,
            name: "prod-metrics".into(),
            url: "http://tsdb.internal:8086".into(),
            database: "metrics".into(),
        })
    }
}

struct MissingMeta;

#[async_trait]
impl MetaLookup for MissingMeta {
    async fn dashboard_by_id(&self, id: i64, _org_id: i64) -> Result<Dashboard, NotifyError> {
        Err(NotifyError::NotFound {
            entity: "dashboard",
            id,
        })
    }

    async fn dashboard_slug_by_id(&self, id: i64) -> Result<String, NotifyError> {
        Err(NotifyError::NotFound {
            entity: "dashboard",
            id,
        })
    }

    async fn data_source_by_id(&self, id: i64, _org_id: i64) -> Result<DataSource, NotifyError> {
        Err(NotifyError::NotFound {
            entity: "data source",
            id,
        })
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<WebhookPayload>>,
}

impl RecordingSender {
    fn payloads(&self) -> Vec<WebhookPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(
        &self,
        payload: &WebhookPayload,
        _cancel: &CancellationToken,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Context for a cycle that just transitioned OK → Alerting.
fn alerting_context(meta: Arc<dyn MetaLookup>) -> EvalContext {
    let mut ctx = EvalContext::new(CancellationToken::new(), make_rule(AlertState::Ok), meta, APP_URL);
    ctx.firing = true;
    ctx.rule.state = AlertState::Alerting;
    ctx
}

fn builtin_registry() -> NotifierRegistry {
    let mut registry = NotifierRegistry::new();
    register_builtin(&mut registry);
    registry
}

// ── Registration & settings validation ──

#[test]
fn builtin_registration_covers_all_kinds() {
    let registry = builtin_registry();
    let mut kinds = registry.kinds();
    kinds.sort();
    assert_eq!(kinds, vec!["dingtalk", "webhook"]);
    assert!(registry.has("webhook"));
    assert!(!registry.has("pagerduty"));
}

#[test]
fn webhook_settings_require_url() {
    let registry = builtin_registry();
    let sender = Arc::new(RecordingSender::default());

    let missing = make_config("webhook", serde_json::json!({}));
    let err = registry
        .instantiate(&missing, sender.clone())
        .err()
        .expect("must fail without url");
    assert!(matches!(err, NotifyError::InvalidConfig(_)), "error was: {err}");

    let valid = make_config(
        "webhook",
        serde_json::json!({"url": "https://hooks.example.com/notify"}),
    );
    assert!(registry.instantiate(&valid, sender).is_ok());
}

#[test]
fn dingtalk_settings_secret_is_optional() {
    let registry = builtin_registry();
    let sender = Arc::new(RecordingSender::default());

    let with_secret = make_config(
        "dingtalk",
        serde_json::json!({
            "url": "https://oapi.dingtalk.com/robot/send?access_token=test",
            "secret": "SEC_test"
        }),
    );
    assert!(registry.instantiate(&with_secret, sender.clone()).is_ok());

    let without_secret = make_config(
        "dingtalk",
        serde_json::json!({
            "url": "https://oapi.dingtalk.com/robot/send?access_token=test"
        }),
    );
    assert!(registry.instantiate(&without_secret, sender.clone()).is_ok());

    let missing_url = make_config("dingtalk", serde_json::json!({}));
    assert!(registry.instantiate(&missing_url, sender).is_err());
}

// ── Webhook notifier ──

#[tokio::test]
async fn webhook_posts_payload_to_configured_url() {
    let registry = builtin_registry();
    let sender = Arc::new(RecordingSender::default());
    let cfg = make_config(
        "webhook",
        serde_json::json!({"url": "https://hooks.example.com/notify"}),
    );
    let notifier = registry.instantiate(&cfg, sender.clone()).unwrap();

    let ctx = alerting_context(Arc::new(FakeMeta));
    assert!(notifier.should_notify(&ctx));
    notifier.notify(&ctx).await.unwrap();

    let payloads = sender.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].url, "https://hooks.example.com/notify");

    let body: serde_json::Value = serde_json::from_str(&payloads[0].body).unwrap();
    assert_eq!(body["title"], "[Alerting] High CPU");
    assert_eq!(body["state"], "alerting");
    assert_eq!(body["rule_id"], 42);
    assert!(body["rule_url"]
        .as_str()
        .unwrap()
        .contains("dashboard/db/service-health"));
    assert_eq!(body["eval_matches"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn webhook_degrades_rule_url_on_lookup_failure() {
    let registry = builtin_registry();
    let sender = Arc::new(RecordingSender::default());
    let cfg = make_config(
        "webhook",
        serde_json::json!({"url": "https://hooks.example.com/notify"}),
    );
    let notifier = registry.instantiate(&cfg, sender.clone()).unwrap();

    let ctx = alerting_context(Arc::new(MissingMeta));
    notifier.notify(&ctx).await.unwrap();

    let payloads = sender.payloads();
    assert_eq!(payloads.len(), 1);
    let body: serde_json::Value = serde_json::from_str(&payloads[0].body).unwrap();
    assert_eq!(body["rule_url"], "");
}

// ── DingTalk notifier ──

#[tokio::test]
async fn dingtalk_sends_markdown_card() {
    let registry = builtin_registry();
    let sender = Arc::new(RecordingSender::default());
    let cfg = make_config(
        "dingtalk",
        serde_json::json!({
            "url": "https://oapi.dingtalk.com/robot/send?access_token=test"
        }),
    );
    let notifier = registry.instantiate(&cfg, sender.clone()).unwrap();

    let ctx = alerting_context(Arc::new(FakeMeta));
    notifier.notify(&ctx).await.unwrap();

    let payloads = sender.payloads();
    assert_eq!(payloads.len(), 1);
    let body: serde_json::Value = serde_json::from_str(&payloads[0].body).unwrap();
    assert_eq!(body["msgtype"], "markdown");
    assert_eq!(body["markdown"]["title"], "[Alerting] High CPU");
    let text = body["markdown"]["text"].as_str().unwrap();
    assert!(text.contains("Service Health"));
    assert!(text.contains("prod-metrics"));
    assert!(text.contains("avg(cpu.usage) > 90"));
}

#[tokio::test]
async fn dingtalk_enrichment_failure_is_fatal_to_the_send() {
    let registry = builtin_registry();
    let sender = Arc::new(RecordingSender::default());
    let cfg = make_config(
        "dingtalk",
        serde_json::json!({
            "url": "https://oapi.dingtalk.com/robot/send?access_token=test"
        }),
    );
    let notifier = registry.instantiate(&cfg, sender.clone()).unwrap();

    let ctx = alerting_context(Arc::new(MissingMeta));
    let err = notifier.notify(&ctx).await.err().expect("send must fail");
    assert!(matches!(err, NotifyError::NotFound { .. }));
    assert!(sender.payloads().is_empty());
}

#[tokio::test]
async fn notifiers_skip_steady_state() {
    let registry = builtin_registry();
    let sender = Arc::new(RecordingSender::default());
    let cfg = make_config(
        "webhook",
        serde_json::json!({"url": "https://hooks.example.com/notify"}),
    );
    let notifier = registry.instantiate(&cfg, sender.clone()).unwrap();

    // Already alerting, still alerting: no transition, no send.
    let mut ctx = EvalContext::new(
        CancellationToken::new(),
        make_rule(AlertState::Alerting),
        Arc::new(FakeMeta),
        APP_URL,
    );
    ctx.firing = true;
    ctx.rule.state = AlertState::Alerting;
    assert!(!notifier.should_notify(&ctx));
}
