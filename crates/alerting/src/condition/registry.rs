use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::{Condition, QueryCondition};
use crate::alert::ConditionConfig;
use crate::datasource::DataSources;
use crate::error::ValidationError;

pub type ConditionFactory = Arc<
    dyn Fn(&ConditionConfig, &DataSources) -> Result<Arc<dyn Condition>, ValidationError> + Send + Sync,
>;

/// Condition constructors keyed by the stored `type` string.
#[derive(Clone, Default)]
pub struct ConditionRegistry {
    factories: HashMap<String, ConditionFactory>,
}

static GLOBAL: OnceLock<Arc<ConditionRegistry>> = OnceLock::new();

/// Process-wide registry of the built-in condition kinds. Initialised on
/// first use and read-only afterwards.
pub fn global() -> Arc<ConditionRegistry> {
    GLOBAL
        .get_or_init(|| Arc::new(ConditionRegistry::builtin()))
        .clone()
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let query: ConditionFactory = Arc::new(QueryCondition::from_config);
        registry.register("query", query);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: ConditionFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn build(
        &self,
        config: &ConditionConfig,
        sources: &DataSources,
    ) -> Result<Arc<dyn Condition>, ValidationError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| ValidationError::UnknownCondition(config.kind.clone()))?;
        factory(config, sources)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
