//! Bridge between aggregate/trend output and the LLM capability.
//!
//! Everything here is advisory: output never gates validation, storage, or
//! aggregate correctness. Any backend failure surfaces as
//! `InsightUnavailable`, which callers render as an absent-insight state.

use chrono::NaiveDate;

use crate::date_util::strip_code_fences;
use crate::error::{Error, Result};
use crate::llm::LlmBackend;
use crate::metrics::types::{PointValue, PromptContext, TrendSeries};
use crate::metrics::MetricRegistry;
use crate::storage::{repository, Database};

const PROMPT_VERSION: &str = "daily-v1";

/// Trailing window the daily summary describes.
const CONTEXT_WINDOW_DAYS: u32 = 7;

/// One enabled metric's contribution to an insight prompt.
#[derive(Debug, Clone)]
pub struct MetricDigest {
    pub name: String,
    pub label: String,
    /// The aggregate's human-readable one-liner.
    pub summary: String,
    /// Extra prompt text the variant opted to contribute.
    pub extra: Option<String>,
}

/// Snapshot of recent state across all enabled metrics, ready to be rendered
/// into a prompt.
#[derive(Debug, Clone)]
pub struct InsightContext {
    pub date: NaiveDate,
    pub window_days: u32,
    pub sections: Vec<MetricDigest>,
}

impl InsightContext {
    /// Gather aggregates and prompt contributions for every enabled metric
    /// over the trailing window ending at `date`.
    pub async fn gather(
        registry: &MetricRegistry,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Self> {
        let ctx = PromptContext {
            date,
            window_days: CONTEXT_WINDOW_DAYS,
        };
        let mut sections = Vec::new();
        for metric in registry.list_enabled() {
            let def = metric.definition();
            let aggregate = metric.get_aggregates(user_id, ctx.since(), date).await?;
            let extra = metric.llm_prompt(user_id, &ctx).await?;
            sections.push(MetricDigest {
                name: def.name.clone(),
                label: def.label.clone(),
                summary: aggregate.summary,
                extra,
            });
        }
        Ok(Self {
            date,
            window_days: CONTEXT_WINDOW_DAYS,
            sections,
        })
    }

    fn render(&self) -> String {
        if self.sections.is_empty() {
            return "No recent data available.".to_string();
        }
        self.sections
            .iter()
            .map(|s| format!("- {}:\n  {}", s.label, s.summary))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_extras(&self) -> Option<String> {
        let extras: Vec<&str> = self
            .sections
            .iter()
            .filter_map(|s| s.extra.as_deref())
            .collect();
        if extras.is_empty() {
            None
        } else {
            Some(extras.join("\n\n"))
        }
    }
}

/// Adapter exposing the insight operations over an `LlmBackend`.
pub struct InsightAdapter {
    db: Database,
    backend: Box<dyn LlmBackend>,
}

impl InsightAdapter {
    pub fn new(db: Database, backend: Box<dyn LlmBackend>) -> Self {
        Self { db, backend }
    }

    /// Whether generation calls can be made at all. Check before calling any
    /// of the generation methods and fall back to raw stats when false.
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Generate (or fetch the cached) daily summary for the context's date.
    pub async fn generate_daily_summary(
        &self,
        user_id: i64,
        ctx: &InsightContext,
        force: bool,
    ) -> Result<String> {
        self.require_available()?;

        if !force {
            let date = ctx.date;
            let cached = self
                .db
                .reader()
                .call(move |conn| {
                    repository::get_cached_summary(conn, user_id, date, PROMPT_VERSION)
                })
                .await?;
            if let Some(content) = cached {
                return Ok(content);
            }
        }

        let prompt = format!(
            "You're a supportive health tracking assistant. Provide brief, encouraging \
             insights based on user data. Keep responses to 1-2 friendly sentences. \
             No lectures, just positive observations.\n\n\
             Based on my tracking data from the last {} days:\n{}{}\n\n\
             Give me a brief, encouraging message for today (1-2 sentences).",
            ctx.window_days,
            ctx.render(),
            ctx.render_extras()
                .map(|e| format!("\n\nAdditional context:\n{e}"))
                .unwrap_or_default(),
        );

        let content = self.generate(&prompt).await?;

        let date = ctx.date;
        let stored = content.clone();
        self.db
            .writer()
            .call(move |conn| {
                repository::store_cached_summary(conn, user_id, date, PROMPT_VERSION, &stored)
            })
            .await?;
        Ok(content)
    }

    /// Analyze one metric's trend series.
    pub async fn analyze_trend(&self, label: &str, series: &TrendSeries) -> Result<String> {
        self.require_available()?;

        let prompt = format!(
            "You are a data analysis assistant focused on health metrics. Provide \
             objective, actionable insights without being preachy. Focus on patterns \
             and observations.\n\n\
             Analyze this {}-day trend for {label}:\n{}\n\n\
             What patterns do you notice? Keep it brief (1-3 sentences).",
            series.points.len(),
            render_series(series),
        );
        self.generate(&prompt).await
    }

    /// Answer a free-form question against the gathered context.
    pub async fn custom_prompt(&self, question: &str, ctx: &InsightContext) -> Result<String> {
        self.require_available()?;

        let prompt = format!(
            "You're a supportive health tracking assistant. Answer the question using \
             the tracking data below. Be concise and concrete.\n\n\
             Tracking data from the last {} days:\n{}\n\nQuestion: {question}",
            ctx.window_days,
            ctx.render(),
        );
        self.generate(&prompt).await
    }

    fn require_available(&self) -> Result<()> {
        if self.backend.is_available() {
            Ok(())
        } else {
            Err(Error::InsightUnavailable("LLM backend is not available".into()))
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let raw = self.backend.complete(prompt).await?;
        let content = strip_code_fences(&raw).trim().to_string();
        if content.is_empty() {
            return Err(Error::InsightUnavailable("empty LLM response".into()));
        }
        Ok(content)
    }
}

fn render_series(series: &TrendSeries) -> String {
    series
        .points
        .iter()
        .map(|p| {
            let value = match &p.value {
                None => "(no entry)".to_string(),
                Some(PointValue::Number(n)) => format!("{n:.1}"),
                Some(PointValue::Flag(true)) => "yes".to_string(),
                Some(PointValue::Flag(false)) => "no".to_string(),
                Some(PointValue::Label(label)) => label.clone(),
            };
            format!("{}: {value}", p.date.format("%Y-%m-%d"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
