//! Rule evaluation context and notifier dispatch.
//!
//! One evaluation cycle runs a rule's condition, decides the alert state
//! transition, fans the result out to every notifier attached to the rule,
//! and persists the updated state. Notifier types are registered in a
//! [`plugin::NotifierRegistry`] at process start and instantiated from
//! stored settings; the built-in types live in the `klaxon-notify` crate.

pub mod base;
pub mod bus;
pub mod context;
pub mod engine;
pub mod error;
pub mod plugin;


use async_trait::async_trait;

use crate::context::EvalContext;
use crate::error::NotifyError;

/// A configured notifier instance attached to one or more rules.
///
/// Instances are created by the corresponding [`plugin::NotifierPlugin`]
/// factory from persisted settings. Shared identity and throttle
/// bookkeeping is composed in via [`base::NotifierBase`].
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Decides whether this cycle's outcome warrants a send.
    ///
    /// The default policy ([`base::default_should_notify`]) notifies on
    /// state transitions only, never on repeated evaluations of a rule that
    /// stays in the same state.
    fn should_notify(&self, ctx: &EvalContext) -> bool;

    /// Performs the side-effecting send through the delivery collaborator,
    /// using the cycle's cancellation token.
    ///
    /// # Errors
    ///
    /// Returns the collaborator's error unchanged; the dispatcher records
    /// it per notifier and continues with the remaining notifiers.
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError>;

    /// Database id of this notifier instance.
    fn id(&self) -> i64;

    /// Display name of this notifier instance.
    fn name(&self) -> &str;

    /// Notifier type key (e.g. `"webhook"`, `"dingtalk"`).
    fn kind(&self) -> &str;

    /// Whether this instance is attached to every rule by default.
    fn is_default(&self) -> bool;
}
