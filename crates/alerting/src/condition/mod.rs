//! Pluggable rule conditions.
//!
//! A condition is built from its stored configuration through the
//! [`ConditionRegistry`] and evaluated once per attempt against the
//! attempt's [`EvalContext`]. Errors are returned as-is; retrying is the
//! dispatcher's job.

mod evaluator;
mod query;
mod range;
mod reducer;
pub mod registry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::alert::EvalContext;
use crate::error::EvalError;

pub use evaluator::Evaluator;
pub use query::QueryCondition;
pub use range::RelativeRange;
pub use reducer::Reducer;
pub use registry::{ConditionFactory, ConditionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    And,
    Or,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// A series (or the absence of one) that a condition looked at.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalMatch {
    pub metric: String,
    pub value: Option<f64>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionResult {
    pub firing: bool,
    pub no_data_found: bool,
    pub operator: Operator,
    pub eval_matches: Vec<EvalMatch>,
    pub all_matches: Vec<EvalMatch>,
}

#[async_trait::async_trait]
pub trait Condition: Send + Sync {
    async fn eval(&self, ctx: &EvalContext) -> Result<ConditionResult, EvalError>;
}
