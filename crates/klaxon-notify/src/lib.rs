//! Built-in notifier implementations for the klaxon alerting core.
//!
//! Each notifier type ships a [`klaxon_alert::plugin::NotifierPlugin`]
//! descriptor; [`register_builtin`] is the registration entry point a
//! deployment calls once during startup, before the registry is handed to
//! the dispatcher. Registration is the only way notifier types become
//! available.

pub mod dingtalk;
pub mod http;
pub mod webhook;

#[cfg(test)]
mod tests;

use klaxon_alert::plugin::NotifierRegistry;

/// Registers every built-in notifier type.
pub fn register_builtin(registry: &mut NotifierRegistry) {
    registry.register(webhook::plugin());
    registry.register(dingtalk::plugin());
}
