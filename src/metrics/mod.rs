pub mod engine;
pub mod registry;
pub mod types;
pub mod variants;

pub use registry::MetricRegistry;
pub use types::*;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::Value as RawValue;

use crate::date_util;
use crate::error::Result;
use crate::storage::repository::{self, NewEntry};
use crate::storage::Database;

/// The contract every metric variant implements so the rest of the system can
/// treat metrics polymorphically.
///
/// Variants differ in `validate` and in which statistic "mean" resolves to;
/// recording and computation are shared default implementations driven by the
/// definition's `ValueDomain`. `llm_prompt` defaults to no contribution, so a
/// variant that wants to feed the insight layer must opt in explicitly.
#[async_trait]
pub trait Metric: Send + Sync {
    fn definition(&self) -> &MetricDefinition;

    fn store(&self) -> &Database;

    /// Zone used to resolve timestamps to calendar-day buckets.
    fn timezone(&self) -> Tz;

    /// Input schema for this metric: value constraints plus UI hints.
    /// Pure, no side effects.
    fn describe_input(&self) -> InputSchema;

    /// Check a raw submitted value against this metric's domain, returning
    /// the normalized typed value. Must be called before any write.
    fn validate(&self, raw: &RawValue) -> Result<MetricValue>;

    /// Validate and persist one entry. Duplicate calls create duplicate
    /// entries: the log is append-only and corrections are new entries.
    async fn record(
        &self,
        user_id: i64,
        raw: &RawValue,
        timestamp: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<i64> {
        let value = self.validate(raw)?;
        let entry = NewEntry {
            user_id,
            metric_name: self.definition().name.clone(),
            timestamp,
            date: date_util::local_date(timestamp, self.timezone()),
            value,
            note: note.map(str::to_string),
        };
        let id = self
            .store()
            .writer()
            .call(move |conn| repository::append_entry(conn, &entry))
            .await?;
        Ok(id)
    }

    /// Daily trend series over the inclusive window. Days without entries are
    /// explicit absent buckets, never interpolated.
    async fn get_trends(&self, user_id: i64, since: NaiveDate, until: NaiveDate) -> Result<TrendSeries> {
        let def = self.definition();
        let entries = fetch_entries(self.store(), user_id, &def.name, since, until).await?;
        Ok(engine::daily_series(&def.name, &entries, &def.domain, since, until))
    }

    /// Window-level aggregate summary. Zero entries yields count 0 and null
    /// statistics, not an error.
    async fn get_aggregates(
        &self,
        user_id: i64,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<AggregateSummary> {
        let def = self.definition();
        let entries = fetch_entries(self.store(), user_id, &def.name, since, until).await?;
        Ok(engine::aggregate(&def.name, &entries, &def.domain, since, until))
    }

    /// Optional contribution to the insight layer's prompt. The default is an
    /// explicit opt-out.
    async fn llm_prompt(&self, _user_id: i64, _ctx: &PromptContext) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Read a metric's entries for the window, ascending by timestamp.
pub(crate) async fn fetch_entries(
    db: &Database,
    user_id: i64,
    metric_name: &str,
    since: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<Entry>> {
    let metric_name = metric_name.to_string();
    let entries = db
        .reader()
        .call(move |conn| repository::query_entries(conn, user_id, &metric_name, since, until))
        .await?;
    Ok(entries)
}
