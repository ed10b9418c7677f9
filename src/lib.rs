pub mod config;
pub mod date_util;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod storage;

pub use config::{AppConfig, LlmConfig};
pub use error::{Error, Result};
pub use llm::{InsightAdapter, InsightContext};
pub use metrics::{
    AggregateSummary, InputSchema, Metric, MetricDefinition, MetricRegistry, TrendSeries,
};
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::UserRow;

use chrono::{NaiveDate, Utc};
use serde_json::Value as RawValue;

use storage::repository;

/// Main entry point for the metrics tracker.
///
/// Owns the database, the loaded configuration, and the metric registry.
/// The registry is built once here and is read-only afterwards; enabling a
/// new metric means changing configuration and restarting.
pub struct Compass {
    db: Database,
    config: AppConfig,
    registry: MetricRegistry,
}

impl Compass {
    /// Load configuration and build the registry over an opened database.
    pub async fn open(db: Database) -> Result<Self> {
        let config = AppConfig::load(&db).await?;
        let registry = MetricRegistry::from_config(&db, &config)?;
        Ok(Self {
            db,
            config,
            registry,
        })
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Today's date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        date_util::today_in(self.config.timezone)
    }

    // ── Users ──────────────────────────────────────────────────────

    /// Resolve a user name to an id, creating the user on first use.
    pub async fn ensure_user(&self, name: &str) -> Result<i64> {
        let name = name.to_string();
        let id = self
            .db
            .writer()
            .call(move |conn| repository::ensure_user(conn, &name))
            .await?;
        Ok(id)
    }

    pub async fn list_users(&self) -> Result<Vec<UserRow>> {
        self.db
            .reader()
            .call(|conn| repository::list_users(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Logging and views ──────────────────────────────────────────

    /// Validate and record one value for a named metric. With `date` given
    /// the entry lands on that local day; otherwise on today.
    pub async fn log_value(
        &self,
        user_id: i64,
        metric_name: &str,
        raw: &RawValue,
        date: Option<NaiveDate>,
        note: Option<&str>,
    ) -> Result<i64> {
        let metric = self.registry.get(metric_name)?;
        let timestamp = match date {
            Some(d) => date_util::midday_utc(d, self.config.timezone),
            None => Utc::now(),
        };
        metric.record(user_id, raw, timestamp, note).await
    }

    pub async fn trends(
        &self,
        user_id: i64,
        metric_name: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<TrendSeries> {
        self.registry
            .get(metric_name)?
            .get_trends(user_id, since, until)
            .await
    }

    pub async fn aggregates(
        &self,
        user_id: i64,
        metric_name: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<AggregateSummary> {
        self.registry
            .get(metric_name)?
            .get_aggregates(user_id, since, until)
            .await
    }

    /// Aggregate summaries for every enabled metric, in dashboard order.
    pub async fn dashboard(
        &self,
        user_id: i64,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<AggregateSummary>> {
        let mut summaries = Vec::new();
        for metric in self.registry.list_enabled() {
            summaries.push(metric.get_aggregates(user_id, since, until).await?);
        }
        Ok(summaries)
    }

    // ── Insight ────────────────────────────────────────────────────

    /// Build the insight adapter for this process's LLM configuration.
    /// Always succeeds; when no backend can be constructed the adapter
    /// reports unavailable and callers show raw stats instead.
    pub async fn insight_adapter(&self) -> InsightAdapter {
        let backend = llm::create_backend(&self.config.llm).await;
        InsightAdapter::new(self.db.clone(), backend)
    }

    /// Gather the per-metric context the insight prompts are built from.
    pub async fn gather_insight_context(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<InsightContext> {
        InsightContext::gather(&self.registry, user_id, date).await
    }

    // ── Maintenance ────────────────────────────────────────────────

    /// Entry counts per metric for the user.
    pub async fn entry_counts(&self, user_id: i64) -> Result<Vec<(String, i64)>> {
        self.db
            .reader()
            .call(move |conn| repository::entry_counts(conn, user_id))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Metric names present in the entry log that no registered metric
    /// claims. A non-empty result is a data-integrity problem: those entries
    /// exist but nothing can read them.
    pub async fn integrity_report(&self, user_id: i64) -> Result<Vec<String>> {
        let names = self
            .db
            .reader()
            .call(move |conn| repository::distinct_metric_names(conn, user_id))
            .await?;
        let unknown: Vec<String> = names
            .into_iter()
            .filter(|name| !self.registry.is_known(name))
            .collect();
        for name in &unknown {
            log::error!("entries recorded under unknown metric: {name}");
        }
        Ok(unknown)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
