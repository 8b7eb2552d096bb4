use std::sync::Arc;

use crate::alert::Rule;
use crate::condition::ConditionRegistry;
use crate::datasource::DataSources;
use crate::store::AlertStore;

/// Loads rule definitions from the store and builds their runtime form.
pub struct RuleReader {
    store: Arc<dyn AlertStore>,
    conditions: Arc<ConditionRegistry>,
    sources: DataSources,
}

impl RuleReader {
    pub fn new(store: Arc<dyn AlertStore>, conditions: Arc<ConditionRegistry>, sources: DataSources) -> Self {
        Self {
            store,
            conditions,
            sources,
        }
    }

    /// Rules that fail to build are logged and left out. A store failure
    /// yields `None` so the caller keeps its current schedule.
    pub async fn fetch(&self) -> Option<Vec<Rule>> {
        let definitions = match self.store.list_rules().await {
            Ok(defs) => defs,
            Err(e) => {
                tracing::error!(error = %e, "failed to load alert rules");
                return None;
            }
        };

        let rules = definitions
            .iter()
            .filter_map(|def| match Rule::from_definition(def, &self.conditions, &self.sources) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::error!(rule_id = def.id, error = %e, "could not build alert rule");
                    None
                }
            })
            .collect();
        Some(rules)
    }
}
