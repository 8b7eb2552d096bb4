use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{Condition, ConditionResult, EvalMatch, Evaluator, Operator, Reducer, RelativeRange};
use crate::alert::{ConditionConfig, EvalContext};
use crate::datasource::{DataSource, DataSources, SeriesQuery};
use crate::error::{EvalError, ValidationError};

#[derive(Deserialize)]
struct QueryConditionModel {
    query: QueryModel,
    reducer: ReducerModel,
    evaluator: EvaluatorModel,
    #[serde(default)]
    operator: Operator,
}

#[derive(Deserialize)]
struct QueryModel {
    #[serde(default)]
    datasource: Option<String>,
    #[serde(flatten)]
    series: SeriesQuery,
    #[serde(default = "default_from")]
    from: String,
    #[serde(default = "default_to")]
    to: String,
}

#[derive(Deserialize)]
struct ReducerModel {
    #[serde(rename = "type")]
    kind: Reducer,
}

#[derive(Deserialize)]
struct EvaluatorModel {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: Vec<f64>,
}

fn default_from() -> String {
    "5m".to_string()
}

fn default_to() -> String {
    "now".to_string()
}

/// Queries a data source, reduces every returned series to one value and
/// matches it against an evaluator.
pub struct QueryCondition {
    source: Arc<dyn DataSource>,
    series: SeriesQuery,
    range: RelativeRange,
    reducer: Reducer,
    evaluator: Evaluator,
    operator: Operator,
}

impl QueryCondition {
    pub fn from_config(
        config: &ConditionConfig,
        sources: &DataSources,
    ) -> Result<Arc<dyn Condition>, ValidationError> {
        let model: QueryConditionModel = serde_json::from_value(Value::Object(config.settings.clone()))
            .map_err(|e| ValidationError::Condition(e.to_string()))?;

        if model.query.series.metric.trim().is_empty() {
            return Err(ValidationError::Condition("query metric must not be empty".into()));
        }

        let source = sources
            .resolve(model.query.datasource.as_deref())
            .map_err(|e| ValidationError::Condition(e.to_string()))?;

        Ok(Arc::new(Self {
            source,
            series: model.query.series,
            range: RelativeRange::parse(&model.query.from, &model.query.to)?,
            reducer: model.reducer.kind,
            evaluator: Evaluator::from_model(&model.evaluator.kind, &model.evaluator.params)?,
            operator: model.operator,
        }))
    }
}

#[async_trait::async_trait]
impl Condition for QueryCondition {
    async fn eval(&self, ctx: &EvalContext) -> Result<ConditionResult, EvalError> {
        let range = self.range.resolve(ctx.start_time);

        let series = tokio::select! {
            biased;
            _ = ctx.scope.cancelled() => return Err(EvalError::Cancelled),
            r = self.source.query(&self.series, &range) => r?,
        };

        let mut result = ConditionResult {
            operator: self.operator,
            ..Default::default()
        };
        let mut empty_series = 0;

        for s in &series {
            let reduced = self.reducer.reduce(s);
            if reduced.is_none() {
                empty_series += 1;
            }
            let m = EvalMatch {
                metric: s.name.clone(),
                value: reduced,
                tags: s.tags.clone(),
            };
            if self.evaluator.eval(reduced) {
                result.eval_matches.push(m.clone());
            }
            result.all_matches.push(m);
        }

        if series.is_empty() && self.evaluator.eval(None) {
            result.eval_matches.push(EvalMatch {
                metric: "NoData".into(),
                value: None,
                tags: Default::default(),
            });
        }

        result.firing = !result.eval_matches.is_empty();
        result.no_data_found = empty_series == series.len();

        tracing::debug!(
            rule_id = ctx.rule.id,
            metric = %self.series.metric,
            series = series.len(),
            matches = result.eval_matches.len(),
            "query condition evaluated"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Rule;
    use crate::datasource::MemoryDataSource;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Arc<MemoryDataSource>, DataSources) {
        let mem = Arc::new(MemoryDataSource::new("mem", Duration::from_secs(3600)));
        let mut sources = DataSources::new();
        sources.insert(mem.clone(), true);
        (mem, sources)
    }

    fn config(v: Value) -> ConditionConfig {
        serde_json::from_value(v).unwrap()
    }

    fn cpu_gt_80() -> ConditionConfig {
        config(serde_json::json!({
            "type": "query",
            "query": { "metric": "cpu", "from": "5m", "to": "now" },
            "reducer": { "type": "avg" },
            "evaluator": { "type": "gt", "params": [80.0] }
        }))
    }

    fn ctx() -> EvalContext {
        EvalContext::new(Rule::default(), CancellationToken::new(), "http://localhost/")
    }

    fn host(h: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("host".to_string(), h.to_string())])
    }

    #[tokio::test]
    async fn fires_on_matching_series_only() {
        let (mem, sources) = setup();
        let now = Utc::now().timestamp_millis();
        mem.ingest("cpu", host("a"), now - 1000, Some(95.0));
        mem.ingest("cpu", host("b"), now - 1000, Some(20.0));

        let cond = QueryCondition::from_config(&cpu_gt_80(), &sources).unwrap();
        let r = cond.eval(&ctx()).await.unwrap();
        assert!(r.firing);
        assert!(!r.no_data_found);
        assert_eq!(r.eval_matches.len(), 1);
        assert_eq!(r.eval_matches[0].tags.get("host").map(String::as_str), Some("a"));
        assert_eq!(r.all_matches.len(), 2);
    }

    #[tokio::test]
    async fn no_series_is_no_data() {
        let (_mem, sources) = setup();
        let cond = QueryCondition::from_config(&cpu_gt_80(), &sources).unwrap();
        let r = cond.eval(&ctx()).await.unwrap();
        assert!(!r.firing);
        assert!(r.no_data_found);
    }

    #[tokio::test]
    async fn no_value_evaluator_fires_without_series() {
        let (_mem, sources) = setup();
        let cfg = config(serde_json::json!({
            "type": "query",
            "query": { "metric": "heartbeat" },
            "reducer": { "type": "count_non_null" },
            "evaluator": { "type": "no_value" },
            "operator": "or"
        }));
        let cond = QueryCondition::from_config(&cfg, &sources).unwrap();
        let r = cond.eval(&ctx()).await.unwrap();
        assert!(r.firing);
        assert_eq!(r.operator, Operator::Or);
        assert_eq!(r.eval_matches[0].metric, "NoData");
    }

    #[tokio::test]
    async fn cancelled_scope_aborts() {
        let (_mem, sources) = setup();
        let cond = QueryCondition::from_config(&cpu_gt_80(), &sources).unwrap();
        let c = ctx();
        c.scope.cancel();
        assert_eq!(cond.eval(&c).await.err(), Some(EvalError::Cancelled));
    }

    #[test]
    fn rejects_unknown_datasource() {
        let (_mem, sources) = setup();
        let cfg = config(serde_json::json!({
            "type": "query",
            "query": { "metric": "cpu", "datasource": "elsewhere" },
            "reducer": { "type": "avg" },
            "evaluator": { "type": "gt", "params": [1.0] }
        }));
        assert!(QueryCondition::from_config(&cfg, &sources).is_err());
    }

    #[test]
    fn rejects_missing_reducer() {
        let (_mem, sources) = setup();
        let cfg = config(serde_json::json!({
            "type": "query",
            "query": { "metric": "cpu" },
            "evaluator": { "type": "gt", "params": [1.0] }
        }));
        assert!(QueryCondition::from_config(&cfg, &sources).is_err());
    }
}
