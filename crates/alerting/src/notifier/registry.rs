use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use super::{discord, email, googlechat, opsgenie, pagerduty, sensu, slack, teams, threema, webhook};
use super::Notifier;
use crate::error::ValidationError;
use crate::notify::{DisabledTransport, Transport};
use crate::store::NotificationConfig;

pub type NotifierFactory = Arc<
    dyn Fn(&NotificationConfig, Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError>
        + Send
        + Sync,
>;

/// Registered notifier type with its display metadata.
#[derive(Clone)]
pub struct NotifierDescriptor {
    pub type_name: &'static str,
    pub name: &'static str,
    pub heading: &'static str,
    pub description: &'static str,
    pub factory: NotifierFactory,
}

impl std::fmt::Debug for NotifierDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierDescriptor")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct NotifierRegistry {
    descriptors: BTreeMap<&'static str, NotifierDescriptor>,
}

static GLOBAL: OnceLock<Arc<NotifierRegistry>> = OnceLock::new();

/// Process-wide registry holding every built-in notifier. Initialised on
/// first use and read-only afterwards.
pub fn global() -> Arc<NotifierRegistry> {
    GLOBAL
        .get_or_init(|| Arc::new(NotifierRegistry::builtin()))
        .clone()
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in [
            email::descriptor(),
            slack::descriptor(),
            pagerduty::descriptor(),
            teams::descriptor(),
            sensu::descriptor(),
            threema::descriptor(),
            opsgenie::descriptor(),
            googlechat::descriptor(),
            webhook::descriptor(),
            discord::descriptor(),
        ] {
            registry.register(descriptor);
        }
        registry
    }

    /// Later registrations replace earlier ones with the same type name.
    pub fn register(&mut self, descriptor: NotifierDescriptor) {
        self.descriptors.insert(descriptor.type_name, descriptor);
    }

    pub fn get(&self, type_name: &str) -> Option<&NotifierDescriptor> {
        self.descriptors.get(type_name)
    }

    pub fn build(
        &self,
        config: &NotificationConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Box<dyn Notifier>, ValidationError> {
        let descriptor = self
            .get(&config.notifier_type)
            .ok_or_else(|| ValidationError::UnknownNotifier(config.notifier_type.clone()))?;
        (descriptor.factory)(config, transport)
    }

    /// Builds the notifier without the ability to deliver, to check a
    /// configuration before it is saved.
    pub fn validate(&self, config: &NotificationConfig) -> Result<(), ValidationError> {
        self.build(config, Arc::new(DisabledTransport)).map(|_| ())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &NotifierDescriptor> {
        self.descriptors.values()
    }
}
