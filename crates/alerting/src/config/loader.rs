use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use super::schema::AlertingConfig;
use crate::alert::Rule;
use crate::condition::registry as conditions;
use crate::notifier::registry as notifiers;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("validation: {0}")]
    Validation(String),
}

pub fn load_from_file(path: &Path) -> Result<AlertingConfig, LoadError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

pub fn load_from_str(yaml: &str) -> Result<AlertingConfig, LoadError> {
    let cfg: AlertingConfig = serde_yaml::from_str(yaml)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &AlertingConfig) -> Result<(), LoadError> {
    let a = &cfg.alerting;
    if a.max_attempts == 0 {
        return Err(LoadError::Validation("alerting.max_attempts must be >= 1".into()));
    }
    if a.evaluation_timeout.is_zero() {
        return Err(LoadError::Validation("alerting.evaluation_timeout must be > 0".into()));
    }
    if a.notification_timeout.is_zero() {
        return Err(LoadError::Validation("alerting.notification_timeout must be > 0".into()));
    }
    if a.tick_interval.is_zero() {
        return Err(LoadError::Validation("alerting.tick_interval must be > 0".into()));
    }
    if a.rule_reload_ticks == 0 {
        return Err(LoadError::Validation("alerting.rule_reload_ticks must be > 0".into()));
    }
    if a.exec_queue_capacity == 0 {
        return Err(LoadError::Validation("alerting.exec_queue_capacity must be > 0".into()));
    }

    let mut names = HashSet::new();
    for ds in &cfg.datasources {
        if ds.kind != "memory" {
            return Err(LoadError::Validation(format!(
                "datasource '{}': unsupported type '{}'",
                ds.name, ds.kind
            )));
        }
        if !names.insert(ds.name.as_str()) {
            return Err(LoadError::Validation(format!("duplicate datasource '{}'", ds.name)));
        }
    }

    let registry = notifiers::global();
    let mut uids = HashSet::new();
    for n in &cfg.notifications {
        if !uids.insert(n.uid.as_str()) {
            return Err(LoadError::Validation(format!("duplicate notification uid '{}'", n.uid)));
        }
        registry
            .validate(n)
            .map_err(|e| LoadError::Validation(format!("notification '{}': {e}", n.uid)))?;
    }

    let (sources, _) = cfg.data_sources();
    let conditions = conditions::global();
    let mut ids = HashSet::new();
    for r in &cfg.rules {
        if !ids.insert(r.id) {
            return Err(LoadError::Validation(format!("duplicate rule id {}", r.id)));
        }
        Rule::from_definition(r, &conditions, &sources).map_err(|e| LoadError::Validation(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FULL: &str = r#"
app_url: https://sentinel.example.com
alerting:
  evaluation_timeout: 10s
  max_attempts: 5
datasources:
  - name: mem
    is_default: true
    retention: 30m
notifications:
  - id: 1
    uid: ops-slack
    name: Ops
    type: slack
    settings:
      url: https://hooks.slack.com/services/x
  - id: 2
    uid: oncall
    name: On call
    type: email
    is_default: true
    send_reminder: true
    frequency: 15m
    settings:
      addresses: "a@b.com;c@d.com"
rules:
  - id: 1
    org_id: 1
    name: High CPU
    frequency: 30s
    notifications: [ops-slack]
    conditions:
      - type: query
        query: { metric: cpu, from: 5m, to: now }
        reducer: { type: avg }
        evaluator: { type: gt, params: [90] }
"#;

    #[test]
    fn full_config() {
        let cfg = load_from_str(FULL).unwrap();
        assert_eq!(cfg.app_url, "https://sentinel.example.com");
        assert_eq!(cfg.alerting.evaluation_timeout, Duration::from_secs(10));
        assert_eq!(cfg.alerting.max_attempts, 5);
        assert_eq!(cfg.alerting.notification_timeout, Duration::from_secs(30));
        assert_eq!(cfg.datasources[0].retention, Duration::from_secs(1800));
        assert_eq!(cfg.notifications[1].frequency, Duration::from_secs(900));
        assert_eq!(cfg.rules[0].frequency, Duration::from_secs(30));
    }

    #[test]
    fn defaults_when_empty() {
        let cfg = load_from_str("{}").unwrap();
        assert_eq!(cfg.alerting, Default::default());
        assert!(cfg.rules.is_empty());
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = load_from_str("alerting:\n  max_attempts: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn invalid_notification_rejected() {
        let yaml = r#"
notifications:
  - id: 1
    uid: mail
    name: Mail
    type: email
    settings: {}
"#;
        let err = load_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("addresses"));
    }

    #[test]
    fn duplicate_rule_ids_rejected() {
        let yaml = FULL.replace("rules:\n", "rules:\n  - id: 1\n    org_id: 1\n    name: dup\n    frequency: 1m\n    conditions: [{ type: query, query: { metric: m }, reducer: { type: avg }, evaluator: { type: gt, params: [1] } }]\n");
        let err = load_from_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate rule id 1"));
    }

    #[test]
    fn rule_with_unknown_datasource_rejected() {
        let yaml = FULL.replace("query: { metric: cpu", "query: { datasource: nope, metric: cpu");
        assert!(matches!(load_from_str(&yaml), Err(LoadError::Validation(_))));
    }

    #[test]
    fn load_from_file_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerting.yml");
        std::fs::write(&path, FULL).unwrap();
        let cfg = load_from_file(&path).unwrap();
        assert_eq!(cfg.rules.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_from_file(Path::new("/nonexistent/alerting.yml")).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }
}
