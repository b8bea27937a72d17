use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use klaxon_common::types::NotificationConfig;

use crate::context::EvalContext;

/// Default notification policy: notify on a state transition, never on
/// repeated evaluations of a rule that stays in the same state. This is the
/// core anti-spam invariant — a rule that keeps firing produces one send on
/// the transition into `Alerting`, not a storm on every poll.
pub fn default_should_notify(ctx: &EvalContext) -> bool {
    ctx.should_update_state()
}

/// Shared identity and throttle bookkeeping composed into every notifier
/// instance. A composition unit, not a governing supertype: concrete
/// notifiers embed it and delegate.
pub struct NotifierBase {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub is_default: bool,
    /// Optional cool-down window, applied in addition to the transition
    /// check, never instead of it.
    pub cooldown: Option<Duration>,
    // Read by should_notify, written by record_notified. The scheduler
    // guarantees cycles for one rule never overlap, but auxiliary
    // test/administrative invocations may race, so the field stays guarded.
    last_notified: Mutex<Option<DateTime<Utc>>>,
}

impl NotifierBase {
    pub fn new(cfg: &NotificationConfig) -> Self {
        Self {
            id: cfg.id,
            name: cfg.name.clone(),
            kind: cfg.kind.clone(),
            is_default: cfg.is_default,
            cooldown: cfg.cooldown_secs.map(|secs| {
                // Clamp instead of wrapping; chrono durations cap at
                // i64::MAX milliseconds.
                Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000))
            }),
            last_notified: Mutex::new(None),
        }
    }

    /// Transition check plus, when configured, the cool-down window.
    pub fn should_notify(&self, ctx: &EvalContext) -> bool {
        if !default_should_notify(ctx) {
            return false;
        }
        match (self.cooldown, *self.last_notified.lock().unwrap()) {
            (Some(cooldown), Some(last)) => Utc::now() - last >= cooldown,
            _ => true,
        }
    }

    /// Records the time of a successful send for cool-down bookkeeping.
    pub fn record_notified(&self) {
        *self.last_notified.lock().unwrap() = Some(Utc::now());
    }

    pub fn last_notified(&self) -> Option<DateTime<Utc>> {
        *self.last_notified.lock().unwrap()
    }
}
