//! Pure trend and aggregate computation over raw entries.
//!
//! Everything here is side-effect free: entries in, series/summaries out.
//! Buckets are calendar days keyed by each entry's stored local date, one
//! bucket per day of the inclusive window regardless of data presence.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::date_util::days_in_window;
use crate::metrics::types::{
    AggregateSummary, Entry, MetricValue, PointValue, SummaryStats, TrendPoint, TrendSeries,
    ValueDomain,
};

/// Compute the daily trend series for one metric over [since, until].
///
/// Same-day entries combine by domain: arithmetic mean (numeric, scale,
/// duration), OR (boolean), most-frequent tally (categorical), latest note
/// (text). Days with no entries yield `value: None, count: 0`. Entries whose
/// stored value mismatches the domain are skipped and counted.
pub fn daily_series(
    metric_name: &str,
    entries: &[Entry],
    domain: &ValueDomain,
    since: NaiveDate,
    until: NaiveDate,
) -> TrendSeries {
    let (by_day, skipped) = partition_by_day(entries, domain, since, until);

    let mut points = Vec::with_capacity(days_in_window(since, until) as usize);
    let mut day = since;
    while day <= until {
        let point = match by_day.get(&day) {
            None => TrendPoint {
                date: day,
                value: None,
                count: 0,
            },
            Some(day_entries) => TrendPoint {
                date: day,
                value: combine_day(day_entries, domain),
                count: day_entries.len() as u32,
            },
        };
        points.push(point);
        day += Duration::days(1);
    }

    TrendSeries {
        metric_name: metric_name.to_string(),
        since,
        until,
        points,
        skipped,
    }
}

/// Compute the window-level aggregate summary for one metric.
///
/// Zero entries is not an error: the summary carries `count: 0` and no stats.
/// A zero-length window (until before since) has a null completion rate.
pub fn aggregate(
    metric_name: &str,
    entries: &[Entry],
    domain: &ValueDomain,
    since: NaiveDate,
    until: NaiveDate,
) -> AggregateSummary {
    let window = days_in_window(since, until);
    let (by_day, skipped) = partition_by_day(entries, domain, since, until);

    let valid: Vec<&Entry> = by_day.values().flatten().copied().collect();
    let count = valid.len() as u32;
    let days_with_entries = by_day.len() as u32;
    let completion_rate = if window == 0 {
        None
    } else {
        Some(days_with_entries as f64 / window as f64)
    };

    let stats = if valid.is_empty() {
        None
    } else {
        Some(compute_stats(&valid, domain))
    };

    let summary = summary_line(domain, stats.as_ref(), days_with_entries, window);

    AggregateSummary {
        metric_name: metric_name.to_string(),
        since,
        until,
        count,
        days_in_window: window,
        days_with_entries,
        completion_rate,
        stats,
        skipped,
        summary,
    }
}

/// Group in-window, domain-valid entries by day. Returns the grouping and the
/// number of in-window entries skipped for a domain mismatch.
fn partition_by_day<'a>(
    entries: &'a [Entry],
    domain: &ValueDomain,
    since: NaiveDate,
    until: NaiveDate,
) -> (BTreeMap<NaiveDate, Vec<&'a Entry>>, u32) {
    let mut by_day: BTreeMap<NaiveDate, Vec<&Entry>> = BTreeMap::new();
    let mut skipped = 0u32;
    for entry in entries {
        if entry.date < since || entry.date > until {
            continue;
        }
        if !entry.value.matches(domain) {
            skipped += 1;
            continue;
        }
        by_day.entry(entry.date).or_default().push(entry);
    }
    (by_day, skipped)
}

fn combine_day(day_entries: &[&Entry], domain: &ValueDomain) -> Option<PointValue> {
    match domain {
        ValueDomain::Scale { .. } | ValueDomain::Numeric | ValueDomain::DurationHours { .. } => {
            let values: Vec<f64> = day_entries.iter().filter_map(|e| e.value.as_number()).collect();
            if values.is_empty() {
                return None;
            }
            Some(PointValue::Number(mean(&values)))
        }
        ValueDomain::Boolean => {
            let any_true = day_entries
                .iter()
                .any(|e| matches!(e.value, MetricValue::Bool(true)));
            Some(PointValue::Flag(any_true))
        }
        ValueDomain::Categorical { options } => {
            let mut tally: BTreeMap<&str, u32> = BTreeMap::new();
            for entry in day_entries {
                if let MetricValue::Text(label) = &entry.value {
                    *tally.entry(label.as_str()).or_default() += 1;
                }
            }
            modal_category(&tally, options).map(|label| PointValue::Label(label.to_string()))
        }
        ValueDomain::Text => day_entries
            .iter()
            .rev()
            .find_map(|e| match &e.value {
                MetricValue::Text(text) if !text.trim().is_empty() => {
                    Some(PointValue::Label(preview(text, 100)))
                }
                _ => None,
            }),
    }
}

fn compute_stats(valid: &[&Entry], domain: &ValueDomain) -> SummaryStats {
    match domain {
        ValueDomain::Scale { .. } | ValueDomain::Numeric | ValueDomain::DurationHours { .. } => {
            // Chronological: the store returns entries ordered by timestamp.
            let values: Vec<f64> = valid.iter().filter_map(|e| e.value.as_number()).collect();
            let latest = *values.last().unwrap_or(&0.0);
            let oldest = *values.first().unwrap_or(&0.0);
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            SummaryStats::Numeric {
                mean: mean(&values),
                min,
                max,
                latest,
                change: latest - oldest,
            }
        }
        ValueDomain::Boolean => {
            let yes = valid
                .iter()
                .filter(|e| matches!(e.value, MetricValue::Bool(true)))
                .count() as u32;
            let no = valid.len() as u32 - yes;
            SummaryStats::Completion {
                yes,
                no,
                yes_rate: yes as f64 / valid.len() as f64,
            }
        }
        ValueDomain::Categorical { options } => {
            let mut frequencies: BTreeMap<String, u32> = BTreeMap::new();
            for entry in valid {
                if let MetricValue::Text(label) = &entry.value {
                    *frequencies.entry(label.clone()).or_default() += 1;
                }
            }
            let tally: BTreeMap<&str, u32> =
                frequencies.iter().map(|(k, v)| (k.as_str(), *v)).collect();
            let mode = modal_category(&tally, options).unwrap_or_default().to_string();
            let mode_count = frequencies.get(&mode).copied().unwrap_or(0);
            SummaryStats::Categorical {
                mode,
                mode_count,
                frequencies,
            }
        }
        ValueDomain::Text => {
            let texts: Vec<&str> = valid
                .iter()
                .filter_map(|e| match &e.value {
                    MetricValue::Text(t) if !t.trim().is_empty() => Some(t.as_str()),
                    _ => None,
                })
                .collect();
            let total_words: u64 = texts.iter().map(|t| t.split_whitespace().count() as u64).sum();
            let avg_words = if texts.is_empty() {
                0.0
            } else {
                total_words as f64 / texts.len() as f64
            };
            SummaryStats::Notes {
                total_words,
                avg_words,
                latest_preview: texts.last().map(|t| preview(t, 50)),
            }
        }
    }
}

fn summary_line(
    domain: &ValueDomain,
    stats: Option<&SummaryStats>,
    days_with_entries: u32,
    window: u32,
) -> String {
    let logged = format!("Logged {days_with_entries}/{window} days");
    let Some(stats) = stats else {
        return if window == 0 {
            "Empty window.".to_string()
        } else {
            format!("No data recorded. {logged}")
        };
    };
    match (domain, stats) {
        (ValueDomain::DurationHours { .. }, SummaryStats::Numeric { mean, min, max, .. }) => {
            format!("Avg: {mean:.1} hrs/day. Range: {min:.1}-{max:.1}. {logged}")
        }
        (_, SummaryStats::Numeric { mean, min, max, latest, change }) => {
            let sign = if *change >= 0.0 { "+" } else { "" };
            format!(
                "Latest: {latest:.1} ({sign}{change:.1}). Avg: {mean:.1}. Range: {min:.1}-{max:.1}. {logged}"
            )
        }
        (_, SummaryStats::Completion { yes, no, yes_rate }) => {
            format!("{yes}/{} days yes ({:.0}%). {logged}", yes + no, yes_rate * 100.0)
        }
        (_, SummaryStats::Categorical { mode, mode_count, .. }) => {
            format!("Most common: {mode} ({mode_count}x). {logged}")
        }
        (_, SummaryStats::Notes { total_words, avg_words, .. }) => {
            format!("{total_words} words, ~{avg_words:.0} per note. {logged}")
        }
    }
}

/// Most frequent category; ties break by the configured option order, then
/// alphabetically for values no longer in the option set.
fn modal_category<'a>(tally: &BTreeMap<&'a str, u32>, options: &[String]) -> Option<&'a str> {
    let rank = |label: &str| {
        options
            .iter()
            .position(|o| o == label)
            .unwrap_or(usize::MAX)
    };
    tally
        .iter()
        .max_by(|(a_label, a_count), (b_label, b_count)| {
            a_count
                .cmp(b_count)
                .then_with(|| rank(b_label).cmp(&rank(a_label)))
                .then_with(|| b_label.cmp(a_label))
        })
        .map(|(label, _)| *label)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn preview(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn entry(d: u32, value: MetricValue) -> Entry {
        Entry {
            id: 0,
            user_id: 1,
            metric_name: "m".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, d, 12, 0, 0).unwrap(),
            date: day(d),
            value,
            note: None,
        }
    }

    #[test]
    fn test_boolean_three_day_scenario() {
        // true on day 1, nothing on day 2, true on day 3
        let entries = vec![
            entry(1, MetricValue::Bool(true)),
            entry(3, MetricValue::Bool(true)),
        ];
        let series = daily_series("meditated", &entries, &ValueDomain::Boolean, day(1), day(3));
        assert_eq!(series.points.len(), 3);
        assert_eq!(series.points[0].value, Some(PointValue::Flag(true)));
        assert_eq!(series.points[0].count, 1);
        assert_eq!(series.points[1].value, None);
        assert_eq!(series.points[1].count, 0);
        assert_eq!(series.points[2].value, Some(PointValue::Flag(true)));

        let agg = aggregate("meditated", &entries, &ValueDomain::Boolean, day(1), day(3));
        assert_eq!(agg.count, 2);
        assert_eq!(agg.days_with_entries, 2);
        let rate = agg.completion_rate.unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_series_has_one_point_per_day_regardless_of_sparsity() {
        let series = daily_series("m", &[], &ValueDomain::Numeric, day(1), day(14));
        assert_eq!(series.points.len(), 14);
        assert!(series.points.iter().all(|p| p.value.is_none() && p.count == 0));
        // Points ascend by date.
        for pair in series.points.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
    }

    #[test]
    fn test_empty_window_aggregate_is_not_an_error() {
        let agg = aggregate("m", &[], &ValueDomain::Numeric, day(1), day(7));
        assert_eq!(agg.count, 0);
        assert!(agg.stats.is_none());
        assert_eq!(agg.completion_rate, Some(0.0));
    }

    #[test]
    fn test_zero_length_window_has_null_completion_rate() {
        let agg = aggregate("m", &[], &ValueDomain::Numeric, day(7), day(1));
        assert_eq!(agg.days_in_window, 0);
        assert!(agg.completion_rate.is_none());
        let series = daily_series("m", &[], &ValueDomain::Numeric, day(7), day(1));
        assert!(series.points.is_empty());
    }

    #[test]
    fn test_completion_rate_bounds() {
        let entries: Vec<Entry> = (1..=7).map(|d| entry(d, MetricValue::Number(1.0))).collect();
        let agg = aggregate("m", &entries, &ValueDomain::Numeric, day(1), day(7));
        assert_eq!(agg.completion_rate, Some(1.0));

        // Duplicate entries on one day never push the rate above 1.
        let dupes = vec![
            entry(1, MetricValue::Number(1.0)),
            entry(1, MetricValue::Number(2.0)),
        ];
        let agg = aggregate("m", &dupes, &ValueDomain::Numeric, day(1), day(1));
        assert_eq!(agg.completion_rate, Some(1.0));
        assert_eq!(agg.count, 2);
    }

    #[test]
    fn test_same_day_numeric_entries_average() {
        let entries = vec![
            entry(1, MetricValue::Number(2.0)),
            entry(1, MetricValue::Number(4.0)),
        ];
        let series = daily_series("m", &entries, &ValueDomain::Numeric, day(1), day(1));
        assert_eq!(series.points[0].value, Some(PointValue::Number(3.0)));
        assert_eq!(series.points[0].count, 2);
    }

    #[test]
    fn test_same_day_booleans_or_combine() {
        let entries = vec![
            entry(1, MetricValue::Bool(false)),
            entry(1, MetricValue::Bool(true)),
        ];
        let series = daily_series("m", &entries, &ValueDomain::Boolean, day(1), day(1));
        assert_eq!(series.points[0].value, Some(PointValue::Flag(true)));
    }

    #[test]
    fn test_categorical_mode_and_frequencies() {
        let domain = ValueDomain::Categorical {
            options: vec!["Great".into(), "Good".into(), "Okay".into()],
        };
        let entries = vec![
            entry(1, MetricValue::Text("Good".into())),
            entry(2, MetricValue::Text("Good".into())),
            entry(3, MetricValue::Text("Okay".into())),
        ];
        let agg = aggregate("mood", &entries, &domain, day(1), day(3));
        match agg.stats.unwrap() {
            SummaryStats::Categorical { mode, mode_count, frequencies } => {
                assert_eq!(mode, "Good");
                assert_eq!(mode_count, 2);
                assert_eq!(frequencies.get("Okay"), Some(&1));
            }
            other => panic!("expected categorical stats, got {other:?}"),
        }
    }

    #[test]
    fn test_categorical_tie_breaks_by_option_order() {
        let domain = ValueDomain::Categorical {
            options: vec!["Great".into(), "Good".into()],
        };
        let entries = vec![
            entry(1, MetricValue::Text("Good".into())),
            entry(2, MetricValue::Text("Great".into())),
        ];
        let agg = aggregate("mood", &entries, &domain, day(1), day(2));
        match agg.stats.unwrap() {
            SummaryStats::Categorical { mode, .. } => assert_eq!(mode, "Great"),
            other => panic!("expected categorical stats, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_values_are_skipped_and_counted() {
        let entries = vec![
            entry(1, MetricValue::Number(7.0)),
            entry(2, MetricValue::Text("legacy".into())),
            entry(3, MetricValue::Bool(true)),
        ];
        let series = daily_series("m", &entries, &ValueDomain::Numeric, day(1), day(3));
        assert_eq!(series.skipped, 2);
        assert_eq!(series.points[0].value, Some(PointValue::Number(7.0)));
        assert_eq!(series.points[1].value, None);

        let agg = aggregate("m", &entries, &ValueDomain::Numeric, day(1), day(3));
        assert_eq!(agg.skipped, 2);
        assert_eq!(agg.count, 1);
        assert_eq!(agg.days_with_entries, 1);
    }

    #[test]
    fn test_entries_outside_window_are_ignored() {
        let entries = vec![
            entry(1, MetricValue::Number(1.0)),
            entry(15, MetricValue::Number(9.0)),
        ];
        let agg = aggregate("m", &entries, &ValueDomain::Numeric, day(10), day(20));
        assert_eq!(agg.count, 1);
        let series = daily_series("m", &entries, &ValueDomain::Numeric, day(10), day(20));
        assert_eq!(series.skipped, 0);
    }

    #[test]
    fn test_numeric_stats_track_latest_and_change() {
        let entries = vec![
            entry(1, MetricValue::Number(70.0)),
            entry(2, MetricValue::Number(71.0)),
            entry(3, MetricValue::Number(70.5)),
        ];
        let agg = aggregate("weight", &entries, &ValueDomain::Numeric, day(1), day(3));
        match agg.stats.unwrap() {
            SummaryStats::Numeric { mean, min, max, latest, change } => {
                assert!((mean - 70.5).abs() < 1e-9);
                assert_eq!(min, 70.0);
                assert_eq!(max, 71.0);
                assert_eq!(latest, 70.5);
                assert!((change - 0.5).abs() < 1e-9);
            }
            other => panic!("expected numeric stats, got {other:?}"),
        }
    }

    #[test]
    fn test_boolean_stats_split_yes_no() {
        let entries = vec![
            entry(1, MetricValue::Bool(true)),
            entry(2, MetricValue::Bool(false)),
            entry(3, MetricValue::Bool(true)),
            entry(4, MetricValue::Bool(true)),
        ];
        let agg = aggregate("exercise", &entries, &ValueDomain::Boolean, day(1), day(4));
        match agg.stats.unwrap() {
            SummaryStats::Completion { yes, no, yes_rate } => {
                assert_eq!((yes, no), (3, 1));
                assert!((yes_rate - 0.75).abs() < 1e-9);
            }
            other => panic!("expected completion stats, got {other:?}"),
        }
    }

    #[test]
    fn test_notes_stats_and_day_preview() {
        let entries = vec![
            entry(1, MetricValue::Text("slept badly".into())),
            entry(1, MetricValue::Text("long walk helped a lot".into())),
            entry(2, MetricValue::Text("   ".into())),
        ];
        let series = daily_series("notes", &entries, &ValueDomain::Text, day(1), day(2));
        assert_eq!(
            series.points[0].value,
            Some(PointValue::Label("long walk helped a lot".into()))
        );
        // Whitespace-only note counts as an entry but produces no point value.
        assert_eq!(series.points[1].value, None);
        assert_eq!(series.points[1].count, 1);

        let agg = aggregate("notes", &entries, &ValueDomain::Text, day(1), day(2));
        match agg.stats.unwrap() {
            SummaryStats::Notes { total_words, avg_words, latest_preview } => {
                assert_eq!(total_words, 7);
                assert!((avg_words - 3.5).abs() < 1e-9);
                assert_eq!(latest_preview.as_deref(), Some("long walk helped a lot"));
            }
            other => panic!("expected notes stats, got {other:?}"),
        }
    }

    #[test]
    fn test_summary_lines() {
        let entries = vec![entry(1, MetricValue::Bool(true))];
        let agg = aggregate("exercise", &entries, &ValueDomain::Boolean, day(1), day(2));
        assert_eq!(agg.summary, "1/1 days yes (100%). Logged 1/2 days");

        let agg = aggregate("m", &[], &ValueDomain::Numeric, day(1), day(2));
        assert_eq!(agg.summary, "No data recorded. Logged 0/2 days");
    }
}
