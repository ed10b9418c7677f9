//! Concrete metric variants and the builtin registration table.
//!
//! Each variant owns its input schema and validation; recording and
//! trend/aggregate computation come from the trait's default implementations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use serde_json::Value as RawValue;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::metrics::types::{
    InputKind, InputSchema, MetricDefinition, MetricValue, PromptContext, ValueDomain,
};
use crate::metrics::{fetch_entries, Metric};
use crate::storage::Database;

pub const MOOD_OPTIONS: [&str; 5] = ["Great", "Good", "Okay", "Poor", "Bad"];

/// The builtin metric table. Static and explicit: adding a metric means
/// adding a line here, not dropping a file in a directory.
pub fn builtins(db: &Database, config: &AppConfig) -> Vec<Arc<dyn Metric>> {
    let tz = config.timezone;
    vec![
        Arc::new(ScaleMetric::new(
            db.clone(),
            tz,
            "weight",
            "Weight",
            "What did the scale read today?",
            0.0,
            1000.0,
            config.is_enabled("weight"),
        )),
        Arc::new(ChoiceMetric::new(
            db.clone(),
            tz,
            "mood",
            "Mood",
            "How would you describe your mood today?",
            MOOD_OPTIONS.iter().map(|s| s.to_string()).collect(),
            config.is_enabled("mood"),
        )),
        Arc::new(CompletionMetric::new(
            db.clone(),
            tz,
            "exercise",
            "Exercise",
            "Did you exercise today?",
            config.is_enabled("exercise"),
        )),
        Arc::new(DurationMetric::new(
            db.clone(),
            tz,
            "sleep",
            "Sleep",
            "How many hours did you sleep last night?",
            24.0,
            config.is_enabled("sleep"),
        )),
        Arc::new(DurationMetric::new(
            db.clone(),
            tz,
            "alone_time",
            "Alone Time",
            "How many hours of alone time did you have today?",
            24.0,
            config.is_enabled("alone_time"),
        )),
        Arc::new(NotesMetric::new(
            db.clone(),
            tz,
            "notes",
            "Notes",
            "Any additional notes or observations?",
            config.is_enabled("notes"),
        )),
    ]
}

fn definition(
    name: &str,
    label: &str,
    description: &str,
    domain: ValueDomain,
    enabled: bool,
) -> MetricDefinition {
    MetricDefinition {
        name: name.to_string(),
        label: label.to_string(),
        description: description.to_string(),
        domain,
        enabled,
    }
}

/// Accept a JSON number or a numeric form string.
fn number_from(raw: &RawValue) -> Option<f64> {
    match raw {
        RawValue::Number(n) => n.as_f64(),
        RawValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Accept a JSON bool or a yes/no form string.
fn bool_from(raw: &RawValue) -> Option<bool> {
    match raw {
        RawValue::Bool(b) => Some(*b),
        RawValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "y" => Some(true),
            "no" | "false" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Values are stored to one decimal place, matching what the UI displays.
fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ── Bounded numeric scale ──────────────────────────────────────────

pub struct ScaleMetric {
    def: MetricDefinition,
    db: Database,
    tz: Tz,
    min: f64,
    max: f64,
}

impl ScaleMetric {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        tz: Tz,
        name: &str,
        label: &str,
        description: &str,
        min: f64,
        max: f64,
        enabled: bool,
    ) -> Self {
        Self {
            def: definition(name, label, description, ValueDomain::Scale { min, max }, enabled),
            db,
            tz,
            min,
            max,
        }
    }
}

#[async_trait]
impl Metric for ScaleMetric {
    fn definition(&self) -> &MetricDefinition {
        &self.def
    }

    fn store(&self) -> &Database {
        &self.db
    }

    fn timezone(&self) -> Tz {
        self.tz
    }

    fn describe_input(&self) -> InputSchema {
        InputSchema {
            kind: InputKind::Decimal,
            label: self.def.description.clone(),
            required: false,
            options: None,
            placeholder: None,
            min_value: Some(self.min),
            max_value: Some(self.max),
        }
    }

    fn validate(&self, raw: &RawValue) -> Result<MetricValue> {
        let v = number_from(raw)
            .ok_or_else(|| Error::validation(&self.def.name, "expected a number"))?;
        if !v.is_finite() {
            return Err(Error::validation(&self.def.name, "expected a finite number"));
        }
        if v < self.min || v > self.max {
            return Err(Error::validation(
                &self.def.name,
                format!("out of range: {v} is not within [{}, {}]", self.min, self.max),
            ));
        }
        Ok(MetricValue::Number(round_tenth(v)))
    }
}

// ── Unbounded numeric ──────────────────────────────────────────────

pub struct NumericMetric {
    def: MetricDefinition,
    db: Database,
    tz: Tz,
}

impl NumericMetric {
    pub fn new(
        db: Database,
        tz: Tz,
        name: &str,
        label: &str,
        description: &str,
        enabled: bool,
    ) -> Self {
        Self {
            def: definition(name, label, description, ValueDomain::Numeric, enabled),
            db,
            tz,
        }
    }
}

#[async_trait]
impl Metric for NumericMetric {
    fn definition(&self) -> &MetricDefinition {
        &self.def
    }

    fn store(&self) -> &Database {
        &self.db
    }

    fn timezone(&self) -> Tz {
        self.tz
    }

    fn describe_input(&self) -> InputSchema {
        InputSchema {
            kind: InputKind::Decimal,
            label: self.def.description.clone(),
            required: false,
            options: None,
            placeholder: None,
            min_value: None,
            max_value: None,
        }
    }

    fn validate(&self, raw: &RawValue) -> Result<MetricValue> {
        let v = number_from(raw)
            .ok_or_else(|| Error::validation(&self.def.name, "expected a number"))?;
        if !v.is_finite() {
            return Err(Error::validation(&self.def.name, "expected a finite number"));
        }
        Ok(MetricValue::Number(round_tenth(v)))
    }
}

// ── Hours per day ──────────────────────────────────────────────────

pub struct DurationMetric {
    def: MetricDefinition,
    db: Database,
    tz: Tz,
    max: f64,
}

impl DurationMetric {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        tz: Tz,
        name: &str,
        label: &str,
        description: &str,
        max: f64,
        enabled: bool,
    ) -> Self {
        Self {
            def: definition(
                name,
                label,
                description,
                ValueDomain::DurationHours { max },
                enabled,
            ),
            db,
            tz,
            max,
        }
    }
}

#[async_trait]
impl Metric for DurationMetric {
    fn definition(&self) -> &MetricDefinition {
        &self.def
    }

    fn store(&self) -> &Database {
        &self.db
    }

    fn timezone(&self) -> Tz {
        self.tz
    }

    fn describe_input(&self) -> InputSchema {
        InputSchema {
            kind: InputKind::Decimal,
            label: self.def.description.clone(),
            required: false,
            options: None,
            placeholder: None,
            min_value: Some(0.0),
            max_value: Some(self.max),
        }
    }

    fn validate(&self, raw: &RawValue) -> Result<MetricValue> {
        let v = number_from(raw)
            .ok_or_else(|| Error::validation(&self.def.name, "expected a number of hours"))?;
        if !v.is_finite() || v < 0.0 || v > self.max {
            return Err(Error::validation(
                &self.def.name,
                format!("out of range: expected 0 to {} hours, got {v}", self.max),
            ));
        }
        Ok(MetricValue::Number(round_tenth(v)))
    }
}

// ── Boolean completion ─────────────────────────────────────────────

pub struct CompletionMetric {
    def: MetricDefinition,
    db: Database,
    tz: Tz,
}

impl CompletionMetric {
    pub fn new(
        db: Database,
        tz: Tz,
        name: &str,
        label: &str,
        description: &str,
        enabled: bool,
    ) -> Self {
        Self {
            def: definition(name, label, description, ValueDomain::Boolean, enabled),
            db,
            tz,
        }
    }
}

#[async_trait]
impl Metric for CompletionMetric {
    fn definition(&self) -> &MetricDefinition {
        &self.def
    }

    fn store(&self) -> &Database {
        &self.db
    }

    fn timezone(&self) -> Tz {
        self.tz
    }

    fn describe_input(&self) -> InputSchema {
        InputSchema {
            kind: InputKind::Boolean,
            label: self.def.description.clone(),
            required: false,
            options: None,
            placeholder: None,
            min_value: None,
            max_value: None,
        }
    }

    fn validate(&self, raw: &RawValue) -> Result<MetricValue> {
        bool_from(raw)
            .map(MetricValue::Bool)
            .ok_or_else(|| Error::validation(&self.def.name, "expected yes/no or true/false"))
    }
}

// ── Fixed categorical set ──────────────────────────────────────────

pub struct ChoiceMetric {
    def: MetricDefinition,
    db: Database,
    tz: Tz,
    options: Vec<String>,
}

impl ChoiceMetric {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        tz: Tz,
        name: &str,
        label: &str,
        description: &str,
        options: Vec<String>,
        enabled: bool,
    ) -> Self {
        Self {
            def: definition(
                name,
                label,
                description,
                ValueDomain::Categorical {
                    options: options.clone(),
                },
                enabled,
            ),
            db,
            tz,
            options,
        }
    }
}

#[async_trait]
impl Metric for ChoiceMetric {
    fn definition(&self) -> &MetricDefinition {
        &self.def
    }

    fn store(&self) -> &Database {
        &self.db
    }

    fn timezone(&self) -> Tz {
        self.tz
    }

    fn describe_input(&self) -> InputSchema {
        InputSchema {
            kind: InputKind::Select,
            label: self.def.description.clone(),
            required: false,
            options: Some(self.options.clone()),
            placeholder: None,
            min_value: None,
            max_value: None,
        }
    }

    fn validate(&self, raw: &RawValue) -> Result<MetricValue> {
        let RawValue::String(s) = raw else {
            return Err(Error::validation(&self.def.name, "expected a category name"));
        };
        let s = s.trim();
        match self.options.iter().find(|o| o.as_str() == s) {
            Some(option) => Ok(MetricValue::Text(option.clone())),
            None => Err(Error::validation(
                &self.def.name,
                format!("unknown category: {s} (expected one of {})", self.options.join(", ")),
            )),
        }
    }
}

// ── Free-form notes ────────────────────────────────────────────────

pub struct NotesMetric {
    def: MetricDefinition,
    db: Database,
    tz: Tz,
}

impl NotesMetric {
    pub fn new(
        db: Database,
        tz: Tz,
        name: &str,
        label: &str,
        description: &str,
        enabled: bool,
    ) -> Self {
        Self {
            def: definition(name, label, description, ValueDomain::Text, enabled),
            db,
            tz,
        }
    }
}

#[async_trait]
impl Metric for NotesMetric {
    fn definition(&self) -> &MetricDefinition {
        &self.def
    }

    fn store(&self) -> &Database {
        &self.db
    }

    fn timezone(&self) -> Tz {
        self.tz
    }

    fn describe_input(&self) -> InputSchema {
        InputSchema {
            kind: InputKind::Text,
            label: "Any extra notes?".to_string(),
            required: false,
            options: None,
            placeholder: Some("How are you feeling? Any observations?".to_string()),
            min_value: None,
            max_value: None,
        }
    }

    /// Notes are always valid, including empty ones.
    fn validate(&self, raw: &RawValue) -> Result<MetricValue> {
        match raw {
            RawValue::String(s) => Ok(MetricValue::Text(s.trim().to_string())),
            RawValue::Null => Ok(MetricValue::Text(String::new())),
            _ => Err(Error::validation(&self.def.name, "expected text")),
        }
    }

    /// Recent notes are the richest signal the insight layer gets; surface
    /// the last few verbatim.
    async fn llm_prompt(&self, user_id: i64, ctx: &PromptContext) -> Result<Option<String>> {
        let entries =
            fetch_entries(&self.db, user_id, &self.def.name, ctx.since(), ctx.date).await?;
        let recent: Vec<String> = entries
            .iter()
            .filter_map(|e| match &e.value {
                MetricValue::Text(t) if !t.trim().is_empty() => {
                    Some(format!("- {}: {}", e.date.format("%Y-%m-%d"), t.trim()))
                }
                _ => None,
            })
            .collect();
        if recent.is_empty() {
            return Ok(None);
        }
        let tail = recent.len().saturating_sub(5);
        let prompt = format!(
            "Based on recent daily notes:\n{}\n\nIdentify any patterns or themes in these notes (1-2 sentences).",
            recent[tail..].join("\n")
        );
        Ok(Some(prompt))
    }
}
