use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::metrics::{variants, Metric};
use crate::storage::Database;

/// Catalog mapping metric name to implementation.
///
/// Built once at startup from the static builtin table plus the configured
/// enabled list, then read-only: adding a metric requires a process restart.
/// Construct it explicitly and pass it where lookup is needed; there is no
/// ambient global.
pub struct MetricRegistry {
    by_name: HashMap<String, Arc<dyn Metric>>,
    /// Enabled names in configuration order, which is dashboard order.
    order: Vec<String>,
}

impl MetricRegistry {
    /// Build the registry from the builtin metric table, honoring the
    /// configured enabled list and its order. A configured name with no
    /// matching builtin is logged and skipped so a stale enabled list cannot
    /// prevent startup.
    pub fn from_config(db: &Database, config: &AppConfig) -> Result<Self> {
        let mut registry = Self {
            by_name: HashMap::new(),
            order: Vec::new(),
        };
        for metric in variants::builtins(db, config) {
            registry.register(metric)?;
        }
        // Dashboard order follows configuration, not the builtin table.
        registry.order = config
            .enabled_metrics
            .iter()
            .filter(|name| match registry.by_name.get(name.as_str()) {
                Some(metric) => metric.definition().enabled,
                None => {
                    log::warn!("enabled metric {name} has no implementation, skipping");
                    false
                }
            })
            .cloned()
            .collect();
        Ok(registry)
    }

    /// Register one metric. Names are stable keys and may never be reused, so
    /// a second registration under the same name is an error.
    pub fn register(&mut self, metric: Arc<dyn Metric>) -> Result<()> {
        let def = metric.definition();
        let name = def.name.clone();
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateMetric(name));
        }
        if def.enabled {
            self.order.push(name.clone());
        }
        self.by_name.insert(name, metric);
        Ok(())
    }

    /// Look up an enabled metric by name. Absent and disabled names are both
    /// unknown to callers.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Metric>> {
        match self.by_name.get(name) {
            Some(metric) if metric.definition().enabled => Ok(Arc::clone(metric)),
            _ => Err(Error::UnknownMetric(name.to_string())),
        }
    }

    /// Whether a name is registered at all, enabled or not. Entries recorded
    /// under names that fail this check are data-integrity errors.
    pub fn is_known(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Enabled metrics in configuration order, for dashboard rendering.
    pub fn list_enabled(&self) -> Vec<Arc<dyn Metric>> {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name))
            .map(Arc::clone)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::variants::CompletionMetric;
    use chrono_tz::Tz;

    async fn test_registry(enabled: &[&str]) -> (Database, MetricRegistry) {
        let db = Database::open_memory().await.unwrap();
        let config = AppConfig {
            enabled_metrics: enabled.iter().map(|s| s.to_string()).collect(),
            ..AppConfig::default()
        };
        let registry = MetricRegistry::from_config(&db, &config).unwrap();
        (db, registry)
    }

    #[tokio::test]
    async fn test_get_enabled_metric() {
        let (_db, registry) = test_registry(&["mood", "exercise"]).await;
        let mood = registry.get("mood").unwrap();
        assert_eq!(mood.definition().name, "mood");
    }

    #[tokio::test]
    async fn test_get_unknown_metric_fails() {
        let (_db, registry) = test_registry(&["mood"]).await;
        assert!(matches!(
            registry.get("steps"),
            Err(Error::UnknownMetric(_))
        ));
    }

    #[tokio::test]
    async fn test_get_disabled_metric_fails_but_is_known() {
        let (_db, registry) = test_registry(&["mood"]).await;
        assert!(matches!(
            registry.get("exercise"),
            Err(Error::UnknownMetric(_))
        ));
        assert!(registry.is_known("exercise"));
        assert!(!registry.is_known("steps"));
    }

    #[tokio::test]
    async fn test_list_enabled_follows_config_order() {
        let (_db, registry) = test_registry(&["notes", "mood", "weight"]).await;
        let names: Vec<String> = registry
            .list_enabled()
            .iter()
            .map(|m| m.definition().name.clone())
            .collect();
        assert_eq!(names, vec!["notes", "mood", "weight"]);
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails() {
        let (db, mut registry) = test_registry(&["mood"]).await;
        let dupe = Arc::new(CompletionMetric::new(
            db.clone(),
            Tz::UTC,
            "mood",
            "Mood again",
            "conflicting registration",
            true,
        ));
        assert!(matches!(
            registry.register(dupe),
            Err(Error::DuplicateMetric(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_enabled_name_is_skipped() {
        let (_db, registry) = test_registry(&["mood", "does_not_exist"]).await;
        let names: Vec<String> = registry
            .list_enabled()
            .iter()
            .map(|m| m.definition().name.clone())
            .collect();
        assert_eq!(names, vec!["mood"]);
    }
}
