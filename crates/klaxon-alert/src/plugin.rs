use std::collections::HashMap;
use std::sync::Arc;

use klaxon_common::types::NotificationConfig;
use serde_json::Value;

use crate::bus::WebhookSender;
use crate::error::NotifyError;
use crate::Notifier;

/// Factory producing a configured [`Notifier`] from persisted settings.
///
/// Factories are pure configuration parsing: they validate the settings bag
/// and fail with [`NotifyError::InvalidConfig`] naming the offending field.
/// No network or persistence I/O happens here — all I/O happens later,
/// inside [`Notifier::notify`].
pub type NotifierFactory =
    fn(&NotificationConfig, Arc<dyn WebhookSender>) -> Result<Box<dyn Notifier>, NotifyError>;

/// Descriptor registered for each notifier type at process start.
/// Immutable once registered.
pub struct NotifierPlugin {
    /// Type key, unique within the registry (e.g. `"dingtalk"`).
    pub kind: &'static str,
    /// Display name (e.g. `"DingTalk"`).
    pub name: &'static str,
    pub description: &'static str,
    pub factory: NotifierFactory,
    /// Declarative settings schema consumed by an external form renderer.
    /// Opaque to the core.
    pub options_schema: Value,
}

/// Catalog of available notifier types.
///
/// Populated by explicit registration calls during startup (see
/// `klaxon_notify::register_builtin`) and then handed to the dispatcher's
/// owner as shared read-only state: lookups are O(1) and safe for
/// concurrent reads from simultaneous evaluation cycles, with no locking.
///
/// # Examples
///
/// ```
/// use klaxon_alert::plugin::NotifierRegistry;
///
/// let registry = NotifierRegistry::new();
/// assert!(registry.lookup("nonexistent").is_err());
/// ```
pub struct NotifierRegistry {
    plugins: HashMap<&'static str, NotifierPlugin>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Registers a notifier type.
    ///
    /// Duplicate registration for a kind is a startup-time programming
    /// error; it is reported loudly and the last registration wins.
    pub fn register(&mut self, plugin: NotifierPlugin) {
        if self.plugins.contains_key(plugin.kind) {
            tracing::error!(
                kind = plugin.kind,
                "duplicate notifier registration, last one wins"
            );
        }
        self.plugins.insert(plugin.kind, plugin);
    }

    /// Looks up the descriptor for a type key.
    ///
    /// # Errors
    ///
    /// [`NotifyError::UnknownNotifierType`] when the key is unknown —
    /// callers surface this as a configuration error to the operator, e.g.
    /// a rule referencing a notifier type whose plugin was removed.
    pub fn lookup(&self, kind: &str) -> Result<&NotifierPlugin, NotifyError> {
        self.plugins
            .get(kind)
            .ok_or_else(|| NotifyError::UnknownNotifierType(kind.to_string()))
    }

    /// Instantiates a configured notifier through its registered factory.
    ///
    /// # Errors
    ///
    /// [`NotifyError::UnknownNotifierType`] for an unregistered kind, or
    /// the factory's [`NotifyError::InvalidConfig`] when a required setting
    /// is absent or malformed.
    pub fn instantiate(
        &self,
        cfg: &NotificationConfig,
        sender: Arc<dyn WebhookSender>,
    ) -> Result<Box<dyn Notifier>, NotifyError> {
        let plugin = self.lookup(&cfg.kind)?;
        (plugin.factory)(cfg, sender)
    }

    pub fn has(&self, kind: &str) -> bool {
        self.plugins.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.plugins.keys().copied().collect()
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}
