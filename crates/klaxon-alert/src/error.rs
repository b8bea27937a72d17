/// Errors raised while driving an evaluation cycle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AlertError {
    /// The condition could not be computed (backend unreachable, malformed
    /// query). The cycle aborts before any state transition and is retried
    /// by the external scheduler on its next tick.
    #[error("Alert: condition evaluation failed: {0}")]
    Evaluation(String),

    /// The cycle's cancellation token fired. A cancelled cycle produces no
    /// state transition and no notification.
    #[error("Alert: evaluation cycle cancelled")]
    Cancelled,

    /// Persisting the updated rule state failed.
    #[error("Alert: failed to persist rule state: {0}")]
    Persistence(String),
}

/// Errors raised by the notifier registry and by individual notifiers.
///
/// Lookup, validation and delivery failures are recovered locally (isolated
/// per notifier) and reported in aggregate by the dispatcher — one
/// notifier's failure never blocks its siblings.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Notifier configuration is missing a required field or contains a
    /// malformed value. Raised at instantiation time, before any I/O.
    #[error("Notify: invalid notifier configuration: {0}")]
    InvalidConfig(String),

    /// The notifier type key is not present in the registry, e.g. a rule
    /// references a type whose plugin was removed.
    #[error("Notify: unknown notifier type '{0}'")]
    UnknownNotifierType(String),

    /// A dashboard or data source needed for payload enrichment was not
    /// found. Fatal to the specific send that needed it.
    #[error("Notify: {entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The outbound delivery call failed.
    #[error("Notify: delivery failed: {0}")]
    Delivery(String),

    /// The cycle was cancelled while the send was in flight.
    #[error("Notify: send cancelled")]
    Cancelled,
}
