use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How a UI should render the input field for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Boolean,
    Decimal,
    Select,
    Text,
}

/// Input schema for a metric: value constraints plus rendering hints.
#[derive(Debug, Clone, Serialize)]
pub struct InputSchema {
    pub kind: InputKind,
    pub label: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

/// The value domain of a metric. Determines validation and which statistic
/// "mean" resolves to during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueDomain {
    /// Bounded numeric scale, inclusive on both ends.
    Scale { min: f64, max: f64 },
    /// Unbounded numeric reading.
    Numeric,
    /// Hours per day, capped at `max`.
    DurationHours { max: f64 },
    Boolean,
    /// Fixed set of named categories.
    Categorical { options: Vec<String> },
    /// Free-form note text.
    Text,
}

/// Identity and typing for a registered metric.
/// Immutable for the process lifetime once registered; redefining a metric
/// requires a new name.
#[derive(Debug, Clone, Serialize)]
pub struct MetricDefinition {
    pub name: String,
    pub label: String,
    pub description: String,
    pub domain: ValueDomain,
    pub enabled: bool,
}

/// A validated, typed metric value as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Storage discriminator for the value column set.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricValue::Bool(_) => "boolean",
            MetricValue::Number(_) => "decimal",
            MetricValue::Text(_) => "text",
        }
    }

    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether this value's type is usable under the given domain.
    /// Legacy rows can disagree with the current domain; the engine skips
    /// (and counts) those instead of failing the whole computation.
    pub fn matches(&self, domain: &ValueDomain) -> bool {
        matches!(
            (self, domain),
            (MetricValue::Number(_), ValueDomain::Scale { .. })
                | (MetricValue::Number(_), ValueDomain::Numeric)
                | (MetricValue::Number(_), ValueDomain::DurationHours { .. })
                | (MetricValue::Bool(_), ValueDomain::Boolean)
                | (MetricValue::Text(_), ValueDomain::Categorical { .. })
                | (MetricValue::Text(_), ValueDomain::Text)
        )
    }
}

/// One recorded data point. Append-only: corrections are new entries for the
/// same day, never mutations of history.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub id: i64,
    pub user_id: i64,
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    /// Calendar day in the configured timezone, fixed at record time.
    pub date: NaiveDate,
    pub value: MetricValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The combined value of one day bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    Number(f64),
    Flag(bool),
    Label(String),
}

/// One time-bucketed point in a trend series. Days without entries are kept
/// as explicit absent buckets (`value: None, count: 0`), never interpolated.
#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: Option<PointValue>,
    pub count: u32,
}

/// Ordered daily series over an inclusive window: exactly one point per day.
#[derive(Debug, Clone, Serialize)]
pub struct TrendSeries {
    pub metric_name: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub points: Vec<TrendPoint>,
    /// Entries whose stored value no longer matches the metric's domain.
    pub skipped: u32,
}

/// Domain-appropriate statistics for a window.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryStats {
    Numeric {
        mean: f64,
        min: f64,
        max: f64,
        latest: f64,
        change: f64,
    },
    Completion {
        yes: u32,
        no: u32,
        yes_rate: f64,
    },
    Categorical {
        mode: String,
        mode_count: u32,
        frequencies: BTreeMap<String, u32>,
    },
    Notes {
        total_words: u64,
        avg_words: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        latest_preview: Option<String>,
    },
}

/// Window-level scalar statistics for one metric. Derived, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateSummary {
    pub metric_name: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
    /// Valid raw entries in the window.
    pub count: u32,
    pub days_in_window: u32,
    pub days_with_entries: u32,
    /// days_with_entries / days_in_window; None for an empty window.
    pub completion_rate: Option<f64>,
    /// None when no valid entries fell inside the window.
    pub stats: Option<SummaryStats>,
    /// Entries skipped because their stored type mismatched the domain.
    pub skipped: u32,
    /// Human-readable one-line digest for UI and insight prompts.
    pub summary: String,
}

/// Context handed to `Metric::llm_prompt` so a variant can scope its
/// contribution to the window the insight layer is describing.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext {
    pub date: NaiveDate,
    pub window_days: u32,
}

impl PromptContext {
    /// First day of the trailing window ending at `date`.
    pub fn since(&self) -> NaiveDate {
        self.date - chrono::Duration::days(self.window_days.saturating_sub(1) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_matches_domain() {
        let scale = ValueDomain::Scale { min: 1.0, max: 10.0 };
        assert!(MetricValue::Number(5.0).matches(&scale));
        assert!(!MetricValue::Text("5".into()).matches(&scale));
        assert!(!MetricValue::Bool(true).matches(&scale));

        let cat = ValueDomain::Categorical {
            options: vec!["Good".into(), "Bad".into()],
        };
        assert!(MetricValue::Text("Good".into()).matches(&cat));
        assert!(!MetricValue::Number(1.0).matches(&cat));

        assert!(MetricValue::Bool(false).matches(&ValueDomain::Boolean));
        assert!(!MetricValue::Bool(false).matches(&ValueDomain::Text));
    }

    #[test]
    fn test_prompt_context_since() {
        let ctx = PromptContext {
            date: NaiveDate::from_ymd_opt(2025, 6, 7).unwrap(),
            window_days: 7,
        };
        assert_eq!(ctx.since(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());

        let one = PromptContext {
            date: ctx.date,
            window_days: 1,
        };
        assert_eq!(one.since(), ctx.date);
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(MetricValue::Bool(true).kind(), "boolean");
        assert_eq!(MetricValue::Number(1.5).kind(), "decimal");
        assert_eq!(MetricValue::Text("x".into()).kind(), "text");
    }
}
