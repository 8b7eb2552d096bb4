use crate::error::ValidationError;

/// Decides whether a reduced value counts as a match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluator {
    GreaterThan(f64),
    LessThan(f64),
    WithinRange { lower: f64, upper: f64 },
    OutsideRange { lower: f64, upper: f64 },
    NoValue,
}

impl Evaluator {
    pub fn from_model(kind: &str, params: &[f64]) -> Result<Self, ValidationError> {
        let need = |n: usize| -> Result<(), ValidationError> {
            if params.len() < n {
                return Err(ValidationError::Condition(format!(
                    "evaluator '{kind}' needs {n} parameter(s), got {}",
                    params.len()
                )));
            }
            Ok(())
        };

        match kind {
            "gt" => {
                need(1)?;
                Ok(Self::GreaterThan(params[0]))
            }
            "lt" => {
                need(1)?;
                Ok(Self::LessThan(params[0]))
            }
            "within_range" | "outside_range" => {
                need(2)?;
                let lower = params[0].min(params[1]);
                let upper = params[0].max(params[1]);
                if kind == "within_range" {
                    Ok(Self::WithinRange { lower, upper })
                } else {
                    Ok(Self::OutsideRange { lower, upper })
                }
            }
            "no_value" => Ok(Self::NoValue),
            other => Err(ValidationError::Condition(format!(
                "unknown evaluator type '{other}'"
            ))),
        }
    }

    pub fn eval(&self, value: Option<f64>) -> bool {
        let Some(v) = value else {
            return matches!(self, Self::NoValue);
        };
        match *self {
            Self::GreaterThan(t) => v > t,
            Self::LessThan(t) => v < t,
            Self::WithinRange { lower, upper } => v > lower && v < upper,
            Self::OutsideRange { lower, upper } => v < lower || v > upper,
            Self::NoValue => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds() {
        let gt = Evaluator::from_model("gt", &[80.0]).unwrap();
        assert!(gt.eval(Some(81.0)));
        assert!(!gt.eval(Some(80.0)));
        assert!(!gt.eval(None));

        let lt = Evaluator::from_model("lt", &[10.0]).unwrap();
        assert!(lt.eval(Some(9.0)));
        assert!(!lt.eval(Some(10.0)));
    }

    #[test]
    fn ranges_normalise_bounds() {
        let within = Evaluator::from_model("within_range", &[100.0, 10.0]).unwrap();
        assert!(within.eval(Some(50.0)));
        assert!(!within.eval(Some(100.0)));

        let outside = Evaluator::from_model("outside_range", &[10.0, 100.0]).unwrap();
        assert!(outside.eval(Some(5.0)));
        assert!(outside.eval(Some(101.0)));
        assert!(!outside.eval(Some(50.0)));
    }

    #[test]
    fn no_value_matches_only_null() {
        let e = Evaluator::from_model("no_value", &[]).unwrap();
        assert!(e.eval(None));
        assert!(!e.eval(Some(0.0)));
    }

    #[test]
    fn bad_models_rejected() {
        assert!(Evaluator::from_model("gt", &[]).is_err());
        assert!(Evaluator::from_model("within_range", &[1.0]).is_err());
        assert!(Evaluator::from_model("between", &[1.0, 2.0]).is_err());
    }
}
