use std::sync::Arc;

use chrono::Utc;

use super::context::EvalContext;
use crate::metrics::AlertingMetrics;

/// Runs a rule's conditions and records the verdict on the context.
#[async_trait::async_trait]
pub trait EvalHandler: Send + Sync {
    async fn eval(&self, ctx: &mut EvalContext);
}

/// Folds condition results left to right with each condition's own
/// operator. The first error ends the pass.
pub struct ConditionEvalHandler {
    metrics: Arc<AlertingMetrics>,
}

impl ConditionEvalHandler {
    pub fn new(metrics: Arc<AlertingMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait::async_trait]
impl EvalHandler for ConditionEvalHandler {
    async fn eval(&self, ctx: &mut EvalContext) {
        let conditions = ctx.rule.conditions.clone();
        let mut firing = true;
        let mut no_data_found = true;
        let mut evals = String::new();

        for (i, condition) in conditions.iter().enumerate() {
            let cr = match condition.eval(ctx).await {
                Ok(cr) => cr,
                Err(e) => {
                    tracing::debug!(rule_id = ctx.rule.id, condition = i + 1, error = %e, "condition failed");
                    ctx.error = Some(e);
                    break;
                }
            };

            if i == 0 {
                firing = cr.firing;
                no_data_found = cr.no_data_found;
                evals = cr.firing.to_string();
            } else {
                match cr.operator {
                    crate::condition::Operator::Or => {
                        firing = firing || cr.firing;
                        no_data_found = no_data_found || cr.no_data_found;
                    }
                    crate::condition::Operator::And => {
                        firing = firing && cr.firing;
                        no_data_found = no_data_found && cr.no_data_found;
                    }
                }
                evals = format!("[{evals} {} {}]", cr.operator.as_str(), cr.firing);
            }

            ctx.eval_matches.extend(cr.eval_matches);
            ctx.all_matches.extend(cr.all_matches);
        }

        if ctx.error.is_none() {
            ctx.firing = firing;
            ctx.no_data_found = no_data_found;
            ctx.condition_evals = format!("{evals} = {firing}");
        }

        let end = Utc::now();
        ctx.end_time = Some(end);
        self.metrics.record_execution_latency(ctx.start_time, end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Rule;
    use crate::condition::{Condition, ConditionResult, Operator};
    use crate::error::EvalError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_util::sync::CancellationToken;

    struct Fixed {
        result: Result<ConditionResult, EvalError>,
        calls: AtomicU32,
    }

    impl Fixed {
        fn new(firing: bool, no_data: bool, operator: Operator) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(ConditionResult {
                    firing,
                    no_data_found: no_data,
                    operator,
                    ..Default::default()
                }),
                calls: AtomicU32::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                result: Err(EvalError::Query("datasource down".into())),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Condition for Fixed {
        async fn eval(&self, _ctx: &EvalContext) -> Result<ConditionResult, EvalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    async fn run(conditions: Vec<Arc<dyn Condition>>) -> EvalContext {
        let rule = Rule {
            id: 1,
            conditions,
            ..Default::default()
        };
        let mut ctx = EvalContext::new(rule, CancellationToken::new(), "http://localhost/");
        ConditionEvalHandler::new(AlertingMetrics::new()).eval(&mut ctx).await;
        ctx
    }

    #[tokio::test]
    async fn single_firing_condition() {
        let ctx = run(vec![Fixed::new(true, false, Operator::And)]).await;
        assert!(ctx.firing);
        assert!(!ctx.no_data_found);
        assert_eq!(ctx.condition_evals, "true = true");
        assert!(ctx.end_time.is_some());
    }

    #[tokio::test]
    async fn and_requires_all() {
        let ctx = run(vec![
            Fixed::new(true, false, Operator::And),
            Fixed::new(false, false, Operator::And),
        ])
        .await;
        assert!(!ctx.firing);
        assert_eq!(ctx.condition_evals, "[true AND false] = false");
    }

    #[tokio::test]
    async fn or_requires_any() {
        let ctx = run(vec![
            Fixed::new(false, false, Operator::And),
            Fixed::new(true, false, Operator::Or),
        ])
        .await;
        assert!(ctx.firing);
    }

    #[tokio::test]
    async fn no_data_combines_with_operator() {
        let ctx = run(vec![
            Fixed::new(false, true, Operator::And),
            Fixed::new(false, false, Operator::And),
        ])
        .await;
        assert!(!ctx.no_data_found);

        let ctx = run(vec![
            Fixed::new(false, true, Operator::And),
            Fixed::new(false, false, Operator::Or),
        ])
        .await;
        assert!(ctx.no_data_found);
    }

    #[tokio::test]
    async fn first_error_stops_evaluation() {
        let after = Fixed::new(true, false, Operator::Or);
        let ctx = run(vec![
            Fixed::new(true, false, Operator::And),
            Fixed::failing(),
            after.clone(),
        ])
        .await;
        assert_eq!(ctx.error, Some(EvalError::Query("datasource down".into())));
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
        assert!(!ctx.firing);
    }
}
