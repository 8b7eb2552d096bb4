use serde_json::Value;
use url::Url;

use crate::error::ValidationError;

/// Read-only view over a channel's free-form `settings` object.
#[derive(Debug, Clone, Copy)]
pub struct Settings<'a>(&'a Value);

impl<'a> Settings<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self(value)
    }

    /// Trimmed string value; empty strings count as absent.
    pub fn str(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.str(key).unwrap_or_else(|| default.to_string())
    }

    pub fn required_str(&self, key: &str) -> Result<String, ValidationError> {
        self.str(key)
            .ok_or_else(|| ValidationError::MissingSetting(key.to_string()))
    }

    /// Accepts JSON booleans as well as `"true"`/`"false"` strings.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Required absolute http(s) URL.
    pub fn url(&self, key: &str) -> Result<String, ValidationError> {
        let raw = self.required_str(key)?;
        let parsed = Url::parse(&raw).map_err(|e| ValidationError::invalid(key, e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(raw),
            other => Err(ValidationError::invalid(key, format!("unsupported scheme '{other}'"))),
        }
    }

    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(|c| c == ',' || c == ';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_str_rejects_blank() {
        let v = json!({ "url": "   " });
        let err = Settings::new(&v).required_str("url").unwrap_err();
        assert_eq!(err, ValidationError::MissingSetting("url".into()));
    }

    #[test]
    fn bool_from_string() {
        let v = json!({ "a": "true", "b": false, "c": "nope" });
        let s = Settings::new(&v);
        assert!(s.bool_or("a", false));
        assert!(!s.bool_or("b", true));
        assert!(s.bool_or("c", true));
        assert!(!s.bool_or("missing", false));
    }

    #[test]
    fn url_must_be_http() {
        let v = json!({ "ok": "https://hooks.example.com/x", "bad": "ftp://x", "rel": "/hook" });
        let s = Settings::new(&v);
        assert!(s.url("ok").is_ok());
        assert!(s.url("bad").is_err());
        assert!(s.url("rel").is_err());
    }

    #[test]
    fn string_list_from_array_or_csv() {
        let v = json!({ "a": ["x", "y"], "b": "x, y;z" });
        let s = Settings::new(&v);
        assert_eq!(s.string_list("a"), vec!["x", "y"]);
        assert_eq!(s.string_list("b"), vec!["x", "y", "z"]);
    }
}
