mod context;
mod handler;
mod rule;
mod state;

pub use context::{EvalContext, StateModel};
pub use handler::{ConditionEvalHandler, EvalHandler};
pub use rule::{ConditionConfig, Rule, RuleDefinition};
pub use state::{AlertState, ExecutionErrorOption, NoDataOption, Outcome, StatePolicy};
