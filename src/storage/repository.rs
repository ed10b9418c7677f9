use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::metrics::types::{Entry, MetricValue};

/// A metric entry ready to be appended. The caller has already validated the
/// value against the metric's domain and resolved the local date key.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub user_id: i64,
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub value: MetricValue,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

// ── Users ──────────────────────────────────────────────────────────

/// Look up a user by name, creating the row on first use.
pub fn ensure_user(conn: &Connection, name: &str) -> Result<i64, rusqlite::Error> {
    if let Some(id) = get_user_id(conn, name)? {
        return Ok(id);
    }
    conn.execute("INSERT INTO users (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user_id(conn: &Connection, name: &str) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT id FROM users WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
}

pub fn list_users(conn: &Connection) -> Result<Vec<UserRow>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM users ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Entries ────────────────────────────────────────────────────────

/// Append one entry. Duplicate appends create duplicate rows: the log is
/// append-only and corrections are new entries, never upserts.
pub fn append_entry(conn: &Connection, entry: &NewEntry) -> Result<i64, rusqlite::Error> {
    let (value_boolean, value_decimal, value_text) = match &entry.value {
        MetricValue::Bool(b) => (Some(*b as i64), None, None),
        MetricValue::Number(n) => (None, Some(*n), None),
        MetricValue::Text(t) => (None, None, Some(t.as_str())),
    };
    conn.execute(
        "INSERT INTO metric_entries
            (user_id, metric_name, timestamp, date_key, value_kind,
             value_boolean, value_decimal, value_text, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.user_id,
            entry.metric_name,
            entry.timestamp.to_rfc3339(),
            entry.date.format("%Y-%m-%d").to_string(),
            entry.value.kind(),
            value_boolean,
            value_decimal,
            value_text,
            entry.note,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Entries for one user and metric whose date key falls in [since, until],
/// ordered ascending by timestamp. Rows whose stored value cannot be
/// reconstructed are dropped with a warning; they indicate corruption, not a
/// domain mismatch (mismatches are the engine's concern).
pub fn query_entries(
    conn: &Connection,
    user_id: i64,
    metric_name: &str,
    since: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<Entry>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, metric_name, timestamp, date_key, value_kind,
                value_boolean, value_decimal, value_text, note
         FROM metric_entries
         WHERE user_id = ?1 AND metric_name = ?2
           AND date_key >= ?3 AND date_key <= ?4
         ORDER BY timestamp, id",
    )?;
    let rows = stmt.query_map(
        params![
            user_id,
            metric_name,
            since.format("%Y-%m-%d").to_string(),
            until.format("%Y-%m-%d").to_string(),
        ],
        map_entry_row,
    )?;
    Ok(rows.filter_map(|r| r.ok()).flatten().collect())
}

type EntryRowParts = (
    i64,
    i64,
    String,
    String,
    String,
    String,
    Option<i64>,
    Option<f64>,
    Option<String>,
    Option<String>,
);

fn map_entry_row(row: &rusqlite::Row<'_>) -> Result<Option<Entry>, rusqlite::Error> {
    let (id, user_id, metric_name, timestamp, date_key, value_kind, vb, vd, vt, note): EntryRowParts = (
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    );

    let value = match (value_kind.as_str(), vb, vd, vt) {
        ("boolean", Some(b), _, _) => MetricValue::Bool(b != 0),
        ("decimal", _, Some(n), _) => MetricValue::Number(n),
        ("text", _, _, Some(t)) => MetricValue::Text(t),
        _ => {
            log::warn!("entry {id} has unreadable value (kind={value_kind}), dropping");
            return Ok(None);
        }
    };
    let timestamp = match DateTime::parse_from_rfc3339(&timestamp) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            log::warn!("entry {id} has unreadable timestamp: {e}, dropping");
            return Ok(None);
        }
    };
    let date = match NaiveDate::parse_from_str(&date_key, "%Y-%m-%d") {
        Ok(d) => d,
        Err(e) => {
            log::warn!("entry {id} has unreadable date key: {e}, dropping");
            return Ok(None);
        }
    };

    Ok(Some(Entry {
        id,
        user_id,
        metric_name,
        timestamp,
        date,
        value,
        note,
    }))
}

/// Distinct metric names with at least one entry for the user.
pub fn distinct_metric_names(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT metric_name FROM metric_entries WHERE user_id = ?1 ORDER BY metric_name",
    )?;
    let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Entry counts per metric for the user, ordered by metric name.
pub fn entry_counts(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<(String, i64)>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT metric_name, COUNT(*) FROM metric_entries
         WHERE user_id = ?1 GROUP BY metric_name ORDER BY metric_name",
    )?;
    let rows = stmt.query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Daily summary cache ────────────────────────────────────────────

pub fn get_cached_summary(
    conn: &Connection,
    user_id: i64,
    date: NaiveDate,
    prompt_version: &str,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT content FROM daily_summary_cache
         WHERE user_id = ?1 AND cache_date = ?2 AND prompt_version = ?3",
        params![user_id, date.format("%Y-%m-%d").to_string(), prompt_version],
        |row| row.get(0),
    )
    .optional()
}

pub fn store_cached_summary(
    conn: &Connection,
    user_id: i64,
    date: NaiveDate,
    prompt_version: &str,
    content: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO daily_summary_cache
            (user_id, cache_date, prompt_version, content, generated_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![
            user_id,
            date.format("%Y-%m-%d").to_string(),
            prompt_version,
            content
        ],
    )?;
    Ok(())
}

// ── App config ─────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::TimeZone;

    fn new_entry(user_id: i64, metric: &str, day: u32, value: MetricValue) -> NewEntry {
        NewEntry {
            user_id,
            metric_name: metric.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, day, 9, 30, 0).unwrap(),
            date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            value,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_ensure_user_is_idempotent() {
        let db = Database::open_memory().await.unwrap();
        let (first, second) = db
            .writer()
            .call(|conn| {
                let first = ensure_user(conn, "alice")?;
                let second = ensure_user(conn, "alice")?;
                Ok::<(i64, i64), rusqlite::Error>((first, second))
            })
            .await
            .unwrap();
        assert_eq!(first, second);

        let users = db
            .reader()
            .call(|conn| list_users(conn))
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "alice");
    }

    #[tokio::test]
    async fn test_append_and_query_round_trip() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                let uid = ensure_user(conn, "alice")?;
                let mut entry = new_entry(uid, "weight", 2, MetricValue::Number(71.5));
                entry.note = Some("after run".to_string());
                append_entry(conn, &entry)?;

                let since = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
                let until = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
                let got = query_entries(conn, uid, "weight", since, until)?;
                assert_eq!(got.len(), 1);
                assert_eq!(got[0].value, MetricValue::Number(71.5));
                assert_eq!(got[0].note.as_deref(), Some("after run"));
                assert_eq!(got[0].date, NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_query_window_is_inclusive_and_ordered() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                let uid = ensure_user(conn, "alice")?;
                for day in [5u32, 1, 3] {
                    append_entry(conn, &new_entry(uid, "m", day, MetricValue::Number(day as f64)))?;
                }
                let since = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
                let until = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
                let got = query_entries(conn, uid, "m", since, until)?;
                let days: Vec<u32> = got.iter().map(|e| e.date.format("%d").to_string().parse().unwrap()).collect();
                assert_eq!(days, vec![1, 3]);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_appends_both_persist() {
        let db = Database::open_memory().await.unwrap();

        let uid = db
            .writer()
            .call(|conn| ensure_user(conn, "alice"))
            .await
            .unwrap();

        // Two concurrent appends with identical payloads: no dedup, no upsert.
        let entry = new_entry(uid, "meditated", 1, MetricValue::Bool(true));
        let (a, b) = tokio::join!(
            db.writer().call({
                let entry = entry.clone();
                move |conn| append_entry(conn, &entry)
            }),
            db.writer().call({
                let entry = entry.clone();
                move |conn| append_entry(conn, &entry)
            }),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b);

        let got = db
            .reader()
            .call(move |conn| {
                query_entries(
                    conn,
                    uid,
                    "meditated",
                    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                )
            })
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn test_entries_are_isolated_per_user_and_metric() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                let alice = ensure_user(conn, "alice")?;
                let bob = ensure_user(conn, "bob")?;
                append_entry(conn, &new_entry(alice, "weight", 1, MetricValue::Number(70.0)))?;
                append_entry(conn, &new_entry(alice, "mood", 1, MetricValue::Text("Good".into())))?;
                append_entry(conn, &new_entry(bob, "weight", 1, MetricValue::Number(85.0)))?;

                let since = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
                let got = query_entries(conn, alice, "weight", since, since)?;
                assert_eq!(got.len(), 1);
                assert_eq!(got[0].value, MetricValue::Number(70.0));

                assert_eq!(distinct_metric_names(conn, alice)?, vec!["mood", "weight"]);
                assert_eq!(entry_counts(conn, bob)?, vec![("weight".to_string(), 1)]);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_summary_cache_keyed_by_prompt_version() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                let uid = ensure_user(conn, "alice")?;
                let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
                store_cached_summary(conn, uid, date, "daily-v1", "looking good")?;
                assert_eq!(
                    get_cached_summary(conn, uid, date, "daily-v1")?.as_deref(),
                    Some("looking good")
                );
                // Stale prompt version misses.
                assert!(get_cached_summary(conn, uid, date, "daily-v2")?.is_none());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                assert!(get_config(conn, "timezone")?.is_none());
                set_config(conn, "timezone", "America/New_York")?;
                set_config(conn, "timezone", "Europe/Berlin")?;
                assert_eq!(
                    get_config(conn, "timezone")?.as_deref(),
                    Some("Europe/Berlin")
                );
                assert_eq!(list_config(conn)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
