use serde::{Deserialize, Serialize};

use crate::datasource::TimeSeries;

/// Collapses a series into one value. `None` means no usable data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Avg,
    Min,
    Max,
    Sum,
    Count,
    CountNonNull,
    Last,
    Median,
    Diff,
    PercentDiff,
}

impl Reducer {
    pub fn reduce(&self, series: &TimeSeries) -> Option<f64> {
        let values: Vec<f64> = series.points.iter().filter_map(|p| p.value).collect();

        match self {
            Self::Count => Some(series.points.len() as f64),
            Self::CountNonNull => (!values.is_empty()).then_some(values.len() as f64),
            Self::Avg => {
                (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
            }
            Self::Sum => (!values.is_empty()).then(|| values.iter().sum()),
            Self::Min => values.iter().copied().reduce(f64::min),
            Self::Max => values.iter().copied().reduce(f64::max),
            Self::Last => values.last().copied(),
            Self::Median => median(values),
            Self::Diff => {
                let (first, last) = (values.first()?, values.last()?);
                Some(last - first)
            }
            Self::PercentDiff => {
                let (first, last) = (values.first()?, values.last()?);
                if *first == 0.0 {
                    return None;
                }
                Some((last - first) / first.abs() * 100.0)
            }
        }
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::DataPoint;

    fn series(values: &[Option<f64>]) -> TimeSeries {
        TimeSeries {
            name: "s".into(),
            tags: Default::default(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, v)| DataPoint { timestamp_ms: i as i64, value: *v })
                .collect(),
        }
    }

    #[test]
    fn aggregates_ignore_nulls() {
        let s = series(&[Some(1.0), None, Some(3.0), Some(8.0)]);
        assert_eq!(Reducer::Avg.reduce(&s), Some(4.0));
        assert_eq!(Reducer::Sum.reduce(&s), Some(12.0));
        assert_eq!(Reducer::Min.reduce(&s), Some(1.0));
        assert_eq!(Reducer::Max.reduce(&s), Some(8.0));
        assert_eq!(Reducer::Last.reduce(&s), Some(8.0));
        assert_eq!(Reducer::Count.reduce(&s), Some(4.0));
        assert_eq!(Reducer::CountNonNull.reduce(&s), Some(3.0));
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(Reducer::Median.reduce(&series(&[Some(5.0), Some(1.0), Some(3.0)])), Some(3.0));
        assert_eq!(
            Reducer::Median.reduce(&series(&[Some(4.0), Some(1.0), Some(3.0), Some(2.0)])),
            Some(2.5)
        );
    }

    #[test]
    fn diff_and_percent_diff() {
        let s = series(&[Some(50.0), Some(60.0), Some(75.0)]);
        assert_eq!(Reducer::Diff.reduce(&s), Some(25.0));
        assert_eq!(Reducer::PercentDiff.reduce(&s), Some(50.0));
        assert_eq!(Reducer::PercentDiff.reduce(&series(&[Some(0.0), Some(1.0)])), None);
    }

    #[test]
    fn empty_series_is_null_except_count() {
        let s = series(&[None, None]);
        assert_eq!(Reducer::Avg.reduce(&s), None);
        assert_eq!(Reducer::Last.reduce(&s), None);
        assert_eq!(Reducer::CountNonNull.reduce(&s), None);
        assert_eq!(Reducer::Count.reduce(&s), Some(2.0));
    }
}
