//! Boundary contracts consumed by the evaluation core.
//!
//! Implementations live outside this workspace's core (query backends,
//! metadata storage, rule persistence, HTTP delivery). Every call that may
//! block takes the cycle's cancellation token so that a stuck downstream
//! endpoint cannot stall the cycle indefinitely.

use async_trait::async_trait;
use klaxon_common::types::{Dashboard, DataSource, EvalMatch, ResultLogEntry, Rule};
use tokio_util::sync::CancellationToken;

use crate::error::{AlertError, NotifyError};

/// Outcome of running a rule's condition against its backend.
#[derive(Debug, Clone, Default)]
pub struct ConditionResult {
    /// Raw condition outcome for this cycle.
    pub firing: bool,
    /// The backend returned no evaluable series — distinct from both firing
    /// and not firing.
    pub no_data_found: bool,
    /// Series/values that satisfied the condition, in evaluation order.
    pub matches: Vec<EvalMatch>,
    /// Diagnostic trail collected during evaluation.
    pub logs: Vec<ResultLogEntry>,
    /// Per-condition firing summary, e.g. `"[true, false]"`.
    pub condition_evals: String,
}

/// Evaluates a rule's condition against its time-series backend.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// Runs the condition. Must return promptly with an error once `cancel`
    /// fires; partial results from a cancelled run are discarded.
    async fn evaluate(
        &self,
        rule: &Rule,
        cancel: &CancellationToken,
    ) -> Result<ConditionResult, AlertError>;
}

/// Dashboard and data source metadata lookups used for payload enrichment.
#[async_trait]
pub trait MetaLookup: Send + Sync {
    async fn dashboard_by_id(&self, id: i64, org_id: i64) -> Result<Dashboard, NotifyError>;

    async fn dashboard_slug_by_id(&self, id: i64) -> Result<String, NotifyError>;

    async fn data_source_by_id(&self, id: i64, org_id: i64) -> Result<DataSource, NotifyError>;
}

/// Durable persistence of a rule's updated alert state.
#[async_trait]
pub trait RuleStateStore: Send + Sync {
    /// Records `rule.state`. Failures surface as cycle-level errors, never
    /// swallowed.
    async fn save_state(&self, rule: &Rule) -> Result<(), AlertError>;
}

/// Outbound webhook request submitted by a notifier.
#[derive(Debug, Clone)]
pub struct WebhookPayload {
    pub url: String,
    /// JSON body, already serialized in the notifier's own wire format.
    pub body: String,
}

/// Delivery collaborator for outbound notification sends.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Delivers `payload`, aborting promptly when `cancel` fires so that
    /// cancelling the evaluation cycle also aborts in-flight sends.
    async fn send(
        &self,
        payload: &WebhookPayload,
        cancel: &CancellationToken,
    ) -> Result<(), NotifyError>;
}
