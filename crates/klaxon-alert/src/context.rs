use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use klaxon_common::types::{AlertState, Dashboard, DataSource, EvalMatch, ResultLogEntry, Rule};
use tokio_util::sync::CancellationToken;

use crate::bus::MetaLookup;
use crate::error::{AlertError, NotifyError};

/// Presentation triple for a rule state.
///
/// Used uniformly by all notifiers for title/color fields so every channel
/// presents consistent framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDescription {
    pub color: &'static str,
    pub text: &'static str,
}

/// Per-cycle state container.
///
/// Created fresh at cycle start, filled during condition evaluation,
/// consumed by the transition decision and by every notifier during
/// dispatch, then discarded. Nothing is retained across cycles beyond what
/// the dispatcher copies back into the persisted rule state.
pub struct EvalContext {
    /// Cancellation scope threaded from the scheduler into every
    /// collaborator call made during this cycle.
    pub cancel: CancellationToken,
    /// Raw condition outcome for this cycle.
    pub firing: bool,
    /// The backend returned no evaluable series.
    pub no_data_found: bool,
    /// Suppresses side effects (URL resolution, persistence) that require a
    /// real deployed rule.
    pub is_test_run: bool,
    /// Evidence in evaluation order, never reordered.
    pub matches: Vec<EvalMatch>,
    /// Append-only diagnostic trail.
    pub logs: Vec<ResultLogEntry>,
    /// Set when evaluation itself failed — distinct from "no data" and from
    /// "not firing".
    pub error: Option<AlertError>,
    /// Per-condition firing summary, e.g. `"[true, false]"`.
    pub condition_evals: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// The rule under evaluation, owned for the duration of the cycle. The
    /// dispatcher writes the new state through it.
    pub rule: Rule,
    prev_state: AlertState,
    app_url: String,
    meta: Arc<dyn MetaLookup>,
    // Resolved at most once per cycle.
    dashboard_slug: Mutex<Option<String>>,
}

impl EvalContext {
    /// Snapshots `rule.state` as the previous state for transition
    /// detection; all other fields start empty.
    pub fn new(
        cancel: CancellationToken,
        rule: Rule,
        meta: Arc<dyn MetaLookup>,
        app_url: impl Into<String>,
    ) -> Self {
        let prev_state = rule.state;
        Self {
            cancel,
            firing: false,
            no_data_found: false,
            is_test_run: false,
            matches: Vec::new(),
            logs: Vec::new(),
            error: None,
            condition_evals: String::new(),
            start_time: Utc::now(),
            end_time: None,
            rule,
            prev_state,
            app_url: app_url.into(),
            meta,
            dashboard_slug: Mutex::new(None),
        }
    }

    /// State recorded at context creation. Never mutated afterwards.
    pub fn prev_state(&self) -> AlertState {
        self.prev_state
    }

    /// The single source of truth for "did anything change this cycle".
    pub fn should_update_state(&self) -> bool {
        self.rule.state != self.prev_state
    }

    /// Maps the current rule state to its presentation triple.
    ///
    /// # Panics
    ///
    /// Panics for a state outside the evaluation set (`Paused`): an
    /// unrecognized state here signals data corruption or version skew, not
    /// an expected runtime condition, and must not be silently swallowed.
    pub fn state_description(&self) -> StateDescription {
        match self.rule.state {
            AlertState::Ok => StateDescription {
                color: "#36a64f",
                text: "OK",
            },
            AlertState::NoData => StateDescription {
                color: "#888888",
                text: "No Data",
            },
            AlertState::Alerting => StateDescription {
                color: "#D63232",
                text: "Alerting",
            },
            other => panic!("unknown rule state {other}"),
        }
    }

    /// Title/subject line shared by every notification channel.
    pub fn notification_title(&self) -> String {
        format!("[{}] {}", self.state_description().text, self.rule.name)
    }

    /// Slug of the rule's dashboard, resolved lazily through the metadata
    /// lookup and memoized for the rest of the cycle.
    pub async fn dashboard_slug(&self) -> Result<String, NotifyError> {
        if let Some(slug) = self.dashboard_slug.lock().unwrap().clone() {
            return Ok(slug);
        }
        let slug = self.meta.dashboard_slug_by_id(self.rule.dashboard_id).await?;
        *self.dashboard_slug.lock().unwrap() = Some(slug.clone());
        Ok(slug)
    }

    /// Deep link to the rule's panel in the dashboard UI.
    ///
    /// Test runs have no persisted dashboard, so the base URL is returned
    /// instead of resolving a slug.
    pub async fn rule_url(&self) -> Result<String, NotifyError> {
        if self.is_test_run {
            return Ok(self.app_url.clone());
        }

        let slug = self.dashboard_slug().await?;
        Ok(format!(
            "{}dashboard/db/{}?fullscreen&edit&tab=alert&panelId={}&orgId={}",
            self.app_url, slug, self.rule.panel_id, self.rule.org_id
        ))
    }

    pub async fn get_dashboard(&self) -> Result<Dashboard, NotifyError> {
        self.meta
            .dashboard_by_id(self.rule.dashboard_id, self.rule.org_id)
            .await
    }

    pub async fn get_data_source(&self) -> Result<DataSource, NotifyError> {
        self.meta
            .data_source_by_id(self.rule.data_source_id, self.rule.org_id)
            .await
    }

    /// Elapsed wall-clock milliseconds between the start and end markers.
    ///
    /// Computed from the full timestamp difference; subtracting sub-second
    /// components would wrap at second boundaries and feed negative or
    /// truncated values into reported telemetry.
    pub fn duration_ms(&self) -> f64 {
        let Some(end) = self.end_time else {
            return 0.0;
        };
        match (end - self.start_time).num_microseconds() {
            Some(us) => us as f64 / 1000.0,
            None => (end - self.start_time).num_milliseconds() as f64,
        }
    }
}
