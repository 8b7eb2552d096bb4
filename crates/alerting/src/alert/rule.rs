use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{AlertState, ExecutionErrorOption, NoDataOption, StatePolicy};
use crate::condition::{Condition, ConditionRegistry};
use crate::datasource::DataSources;
use crate::error::ValidationError;

/// Stored condition configuration; `type` selects the registered factory and
/// the remaining keys are handed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

/// Alert rule as kept by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: i64,
    pub org_id: i64,
    #[serde(default)]
    pub dashboard_id: i64,
    #[serde(default)]
    pub dashboard_uid: String,
    #[serde(default)]
    pub panel_id: i64,
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(with = "humantime_serde")]
    pub frequency: Duration,
    #[serde(default, rename = "for", with = "humantime_serde")]
    pub for_duration: Duration,
    pub conditions: Vec<ConditionConfig>,
    #[serde(default)]
    pub notifications: Vec<String>,
    #[serde(default)]
    pub no_data_state: NoDataOption,
    #[serde(default)]
    pub execution_error_state: ExecutionErrorOption,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub state: AlertState,
    #[serde(default)]
    pub state_changes: i64,
    #[serde(default)]
    pub new_state_date: DateTime<Utc>,
}

/// Runtime form of a rule with its conditions built.
#[derive(Clone, Default)]
pub struct Rule {
    pub id: i64,
    pub org_id: i64,
    pub dashboard_id: i64,
    pub dashboard_uid: String,
    pub panel_id: i64,
    pub name: String,
    pub message: String,
    pub frequency: Duration,
    pub for_duration: Duration,
    pub no_data_state: NoDataOption,
    pub execution_error_state: ExecutionErrorOption,
    pub notifications: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub state: AlertState,
    pub state_changes: i64,
    pub last_state_change: DateTime<Utc>,
    pub conditions: Vec<Arc<dyn Condition>>,
}

impl Rule {
    pub fn from_definition(
        def: &RuleDefinition,
        registry: &ConditionRegistry,
        sources: &DataSources,
    ) -> Result<Self, ValidationError> {
        if def.name.trim().is_empty() {
            return Err(ValidationError::Rule(format!("rule {} has no name", def.id)));
        }
        if def.frequency < Duration::from_secs(1) {
            return Err(ValidationError::Rule(format!(
                "rule {} frequency must be at least 1s",
                def.id
            )));
        }
        if def.conditions.is_empty() {
            return Err(ValidationError::Rule(format!("rule {} has no conditions", def.id)));
        }

        let conditions = def
            .conditions
            .iter()
            .enumerate()
            .map(|(i, c)| {
                registry.build(c, sources).map_err(|e| {
                    ValidationError::Rule(format!("rule {} condition {}: {e}", def.id, i + 1))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: def.id,
            org_id: def.org_id,
            dashboard_id: def.dashboard_id,
            dashboard_uid: def.dashboard_uid.clone(),
            panel_id: def.panel_id,
            name: def.name.clone(),
            message: def.message.clone(),
            frequency: def.frequency,
            for_duration: def.for_duration,
            no_data_state: def.no_data_state,
            execution_error_state: def.execution_error_state,
            notifications: def.notifications.clone(),
            tags: def.tags.clone(),
            state: def.state,
            state_changes: def.state_changes,
            last_state_change: def.new_state_date,
            conditions,
        })
    }

    pub fn state_policy(&self) -> StatePolicy {
        StatePolicy {
            no_data: self.no_data_state,
            execution_error: self.execution_error_state,
            for_duration: self.for_duration,
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("org_id", &self.org_id)
            .field("name", &self.name)
            .field("frequency", &self.frequency)
            .field("for_duration", &self.for_duration)
            .field("state", &self.state)
            .field("conditions", &self.conditions.len())
            .finish_non_exhaustive()
    }
}
