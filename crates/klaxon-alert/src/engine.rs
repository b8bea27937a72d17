use std::sync::Arc;

use chrono::Utc;
use klaxon_common::types::{AlertState, Rule};
use tokio_util::sync::CancellationToken;

use crate::bus::{ConditionEvaluator, MetaLookup, RuleStateStore};
use crate::context::EvalContext;
use crate::error::{AlertError, NotifyError};
use crate::Notifier;

/// Delivery failure of a single notifier, aggregated into [`CycleResult`].
#[derive(Debug)]
pub struct NotifierFailure {
    pub notifier_id: i64,
    pub notifier_name: String,
    pub error: NotifyError,
}

/// Outcome of one completed evaluation cycle.
///
/// Every configured channel's result is visible here — operators never see
/// a single opaque "something failed".
#[derive(Debug)]
pub struct CycleResult {
    pub state: AlertState,
    pub transitioned: bool,
    /// Number of notifiers whose `should_notify` returned true and whose
    /// `notify` was therefore invoked.
    pub notified: usize,
    pub failures: Vec<NotifierFailure>,
    pub duration_ms: f64,
}

/// Drives rule evaluation cycles to completion: condition evaluation, state
/// transition decision, notifier fan-out, and state persistence — strictly
/// in that order within a cycle.
///
/// Cycles for distinct rules may run concurrently on separate tasks. The
/// external scheduler must guarantee that cycles for the *same* rule never
/// overlap; the previous-state comparison is meaningless otherwise.
pub struct Dispatcher {
    evaluator: Arc<dyn ConditionEvaluator>,
    meta: Arc<dyn MetaLookup>,
    store: Arc<dyn RuleStateStore>,
    app_url: String,
}

impl Dispatcher {
    pub fn new(
        evaluator: Arc<dyn ConditionEvaluator>,
        meta: Arc<dyn MetaLookup>,
        store: Arc<dyn RuleStateStore>,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            evaluator,
            meta,
            store,
            app_url: app_url.into(),
        }
    }

    /// Runs one evaluation cycle for `rule`, fanning the outcome out to
    /// `notifiers` in their configured order.
    ///
    /// # Errors
    ///
    /// [`AlertError::Evaluation`] leaves the rule's recorded state
    /// unchanged and invokes no notifier; the scheduler retries on its next
    /// tick. [`AlertError::Cancelled`] discards partial results: no
    /// transition, no notification. [`AlertError::Persistence`] surfaces a
    /// failed state write after the notifiers have already been attempted.
    pub async fn run_cycle(
        &self,
        rule: Rule,
        notifiers: &[Box<dyn Notifier>],
        cancel: CancellationToken,
    ) -> Result<CycleResult, AlertError> {
        self.cycle(rule, notifiers, cancel, false).await
    }

    /// Synthetic evaluation of a rule that is not deployed: URL resolution
    /// and state persistence are suppressed, everything else runs as in
    /// [`Dispatcher::run_cycle`].
    pub async fn run_test_cycle(
        &self,
        rule: Rule,
        notifiers: &[Box<dyn Notifier>],
        cancel: CancellationToken,
    ) -> Result<CycleResult, AlertError> {
        self.cycle(rule, notifiers, cancel, true).await
    }

    async fn cycle(
        &self,
        rule: Rule,
        notifiers: &[Box<dyn Notifier>],
        cancel: CancellationToken,
        is_test_run: bool,
    ) -> Result<CycleResult, AlertError> {
        let rule_id = rule.id;
        let mut ctx = EvalContext::new(cancel.clone(), rule, self.meta.clone(), &self.app_url);
        ctx.is_test_run = is_test_run;

        tracing::debug!(rule_id, "evaluating rule condition");
        match self.evaluator.evaluate(&ctx.rule, &cancel).await {
            Ok(result) => {
                ctx.firing = result.firing;
                ctx.no_data_found = result.no_data_found;
                ctx.matches = result.matches;
                ctx.logs.extend(result.logs);
                ctx.condition_evals = result.condition_evals;
            }
            Err(err) => {
                ctx.end_time = Some(Utc::now());
                tracing::error!(
                    rule_id,
                    error = %err,
                    "condition evaluation failed, rule state left unchanged"
                );
                ctx.error = Some(err);
            }
        }
        if let Some(err) = ctx.error.take() {
            return Err(err);
        }

        if cancel.is_cancelled() {
            tracing::warn!(rule_id, "evaluation cycle cancelled, discarding partial results");
            return Err(AlertError::Cancelled);
        }

        // No-data is a distinct outcome from "not firing".
        let new_state = if ctx.no_data_found {
            AlertState::NoData
        } else if ctx.firing {
            AlertState::Alerting
        } else {
            AlertState::Ok
        };
        ctx.rule.state = new_state;
        ctx.end_time = Some(Utc::now());

        let transitioned = ctx.should_update_state();
        tracing::info!(
            rule_id,
            state = %new_state,
            prev_state = %ctx.prev_state(),
            transitioned,
            duration_ms = ctx.duration_ms(),
            "evaluation cycle decided"
        );

        // Every attached notifier is attempted in configured order; one
        // failure is recorded and never blocks the remaining notifiers.
        let mut failures = Vec::new();
        let mut notified = 0usize;
        for notifier in notifiers {
            if cancel.is_cancelled() {
                tracing::warn!(
                    rule_id,
                    "evaluation cycle cancelled mid-dispatch, discarding partial results"
                );
                return Err(AlertError::Cancelled);
            }
            if !notifier.should_notify(&ctx) {
                continue;
            }
            notified += 1;
            if let Err(err) = notifier.notify(&ctx).await {
                tracing::error!(
                    rule_id,
                    notifier = notifier.name(),
                    kind = notifier.kind(),
                    error = %err,
                    "notification delivery failed"
                );
                failures.push(NotifierFailure {
                    notifier_id: notifier.id(),
                    notifier_name: notifier.name().to_string(),
                    error: err,
                });
            }
        }

        // A token that fired during the last send must not record the
        // transition either; the next cycle re-evaluates from the old state.
        if cancel.is_cancelled() {
            tracing::warn!(rule_id, "evaluation cycle cancelled, state not persisted");
            return Err(AlertError::Cancelled);
        }

        // Persist only after all notifiers have been attempted, so a crash
        // mid-dispatch cannot record a state ahead of the notifications
        // actually sent.
        if transitioned && !ctx.is_test_run {
            self.store.save_state(&ctx.rule).await?;
        }

        Ok(CycleResult {
            state: new_state,
            transitioned,
            notified,
            failures,
            duration_ms: ctx.duration_ms(),
        })
    }
}
