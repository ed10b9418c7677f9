use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};

use compass::date_util::parse_date;
use compass::metrics::types::{PointValue, TrendPoint};
use compass::{Compass, Database};

#[derive(Parser)]
#[command(name = "compass", about = "Personal daily metrics tracker")]
struct Cli {
    /// Database path (default: ~/.compass/compass.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Act as this user (default: the configured default_user)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// List available metrics and how they are logged
    Metrics {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a value for a metric
    Log {
        /// Metric name (see `compass metrics`)
        metric: String,
        /// Value: a number, true/false, a category, or note text
        value: String,
        /// Log for this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        date: Option<String>,
        /// Attach a free-text note to the entry
        #[arg(long)]
        note: Option<String>,
    },
    /// Show the daily trend series for a metric
    Trends {
        metric: String,
        /// Trailing window in days (ignored when --since is given)
        #[arg(long, default_value = "30")]
        days: u32,
        /// Window start (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
        /// Window end (YYYY-MM-DD, default today)
        #[arg(long)]
        until: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show aggregate statistics for a metric
    Stats {
        metric: String,
        #[arg(long, default_value = "30")]
        days: u32,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Aggregate statistics for every enabled metric
    Dashboard {
        #[arg(long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// LLM-generated daily summary (shows stats only when no LLM is available)
    Summary {
        /// Summarize this date (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
        /// Regenerate even if a cached summary exists
        #[arg(long)]
        force: bool,
    },
    /// LLM trend analysis for a metric
    Analyze {
        metric: String,
        #[arg(long, default_value = "30")]
        days: u32,
    },
    /// Ask a free-form question against recent data
    Ask { question: String },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show tracker status
    Status,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user
    Add { name: String },
    /// List users
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };
    let app = Compass::open(db).await?;

    match cli.command {
        Commands::User { action } => match action {
            UserAction::Add { name } => {
                app.ensure_user(&name).await?;
                println!("Created user {name}");
            }
            UserAction::List => {
                for user in app.list_users().await? {
                    println!("{}  (since {})", user.name, user.created_at);
                }
            }
        },

        Commands::Metrics { json } => {
            let metrics = app.registry().list_enabled();
            if json {
                let schemas: Vec<serde_json::Value> = metrics
                    .iter()
                    .map(|m| {
                        serde_json::json!({
                            "definition": m.definition(),
                            "input": m.describe_input(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&schemas)?);
            } else {
                for metric in metrics {
                    let def = metric.definition();
                    let input = metric.describe_input();
                    let constraints = match (input.min_value, input.max_value, &input.options) {
                        (_, _, Some(options)) => format!(" [{}]", options.join(", ")),
                        (Some(min), Some(max), _) => format!(" [{min}-{max}]"),
                        _ => String::new(),
                    };
                    println!("{:<12} {}{}", def.name, def.description, constraints);
                }
            }
        }

        Commands::Log {
            metric,
            value,
            date,
            note,
        } => {
            let user_id = resolve_user(&app, &cli.user).await?;
            let date = date.as_deref().map(parse_date).transpose()?;
            // Numbers and booleans parse as themselves; anything else is text.
            let raw: serde_json::Value =
                serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value.clone()));
            app.log_value(user_id, &metric, &raw, date, note.as_deref())
                .await?;
            println!("Logged {metric} = {value}");
        }

        Commands::Trends {
            metric,
            days,
            since,
            until,
            json,
        } => {
            let user_id = resolve_user(&app, &cli.user).await?;
            let (since, until) = resolve_window(&app, days, since, until)?;
            let series = app.trends(user_id, &metric, since, until).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else {
                for point in &series.points {
                    println!("{}", format_point(point));
                }
                if series.skipped > 0 {
                    eprintln!("({} entries skipped: stored type no longer matches)", series.skipped);
                }
            }
        }

        Commands::Stats {
            metric,
            days,
            since,
            until,
            json,
        } => {
            let user_id = resolve_user(&app, &cli.user).await?;
            let (since, until) = resolve_window(&app, days, since, until)?;
            let agg = app.aggregates(user_id, &metric, since, until).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&agg)?);
            } else {
                println!("{}: {}", agg.metric_name, agg.summary);
            }
        }

        Commands::Dashboard { days, json } => {
            let user_id = resolve_user(&app, &cli.user).await?;
            let (since, until) = resolve_window(&app, days, None, None)?;
            let summaries = app.dashboard(user_id, since, until).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print_dashboard(&summaries);
            }
        }

        Commands::Summary { date, force } => {
            let user_id = resolve_user(&app, &cli.user).await?;
            let date = match date.as_deref() {
                Some(d) => parse_date(d)?,
                None => app.today(),
            };
            let ctx = app.gather_insight_context(user_id, date).await?;
            let adapter = app.insight_adapter().await;
            if !adapter.is_available() {
                eprintln!("No LLM backend available; showing stats only.\n");
                print_digests(&ctx);
                return Ok(());
            }
            match adapter.generate_daily_summary(user_id, &ctx, force).await {
                Ok(summary) => println!("{summary}"),
                Err(e) => {
                    log::warn!("daily summary failed: {e}");
                    eprintln!("Insight unavailable; showing stats only.\n");
                    print_digests(&ctx);
                }
            }
        }

        Commands::Analyze { metric, days } => {
            let user_id = resolve_user(&app, &cli.user).await?;
            let (since, until) = resolve_window(&app, days, None, None)?;
            let series = app.trends(user_id, &metric, since, until).await?;
            let label = app.registry().get(&metric)?.definition().label.clone();
            let adapter = app.insight_adapter().await;
            if !adapter.is_available() {
                eprintln!("No LLM backend available; showing the raw series.\n");
                for point in &series.points {
                    println!("{}", format_point(point));
                }
                return Ok(());
            }
            match adapter.analyze_trend(&label, &series).await {
                Ok(analysis) => println!("{analysis}"),
                Err(e) => {
                    log::warn!("trend analysis failed: {e}");
                    eprintln!("Insight unavailable; showing the raw series.\n");
                    for point in &series.points {
                        println!("{}", format_point(point));
                    }
                }
            }
        }

        Commands::Ask { question } => {
            let user_id = resolve_user(&app, &cli.user).await?;
            let ctx = app.gather_insight_context(user_id, app.today()).await?;
            let adapter = app.insight_adapter().await;
            if !adapter.is_available() {
                anyhow::bail!("No LLM backend available. Configure llm_provider first.");
            }
            let answer = adapter.custom_prompt(&question, &ctx).await?;
            println!("{answer}");
        }

        Commands::Config { action } => match action {
            ConfigAction::Get { key } => match app.config_get(&key).await? {
                Some(value) => println!("{value}"),
                None => println!("(not set)"),
            },
            ConfigAction::Set { key, value } => {
                app.config_set(&key, &value).await?;
                println!("Set {key} (takes effect on next start for metrics/timezone)");
            }
            ConfigAction::List => {
                for (key, value) in app.config_list().await? {
                    println!("{key} = {value}");
                }
            }
        },

        Commands::Status => {
            let user_id = resolve_user(&app, &cli.user).await?;
            let config = app.config();
            println!("Timezone: {}", config.timezone);
            println!("Enabled metrics: {}", config.enabled_metrics.join(", "));
            println!("LLM: {} / {}", config.llm.provider, config.llm.model);

            let counts = app.entry_counts(user_id).await?;
            if counts.is_empty() {
                println!("\nNo entries yet.");
            } else {
                println!("\nEntries:");
                for (name, count) in &counts {
                    println!("  {name:<12} {count}");
                }
            }

            let unknown = app.integrity_report(user_id).await?;
            if !unknown.is_empty() {
                eprintln!(
                    "\nWARNING: entries exist for unregistered metrics: {}",
                    unknown.join(", ")
                );
            }
        }
    }

    Ok(())
}

async fn resolve_user(app: &Compass, cli_user: &Option<String>) -> compass::Result<i64> {
    let name = cli_user
        .clone()
        .unwrap_or_else(|| app.config().default_user.clone());
    app.ensure_user(&name).await
}

/// Resolve `--days`/`--since`/`--until` into an inclusive window.
fn resolve_window(
    app: &Compass,
    days: u32,
    since: Option<String>,
    until: Option<String>,
) -> compass::Result<(NaiveDate, NaiveDate)> {
    let until = match until.as_deref() {
        Some(u) => parse_date(u)?,
        None => app.today(),
    };
    let since = match since.as_deref() {
        Some(s) => parse_date(s)?,
        None => until - Duration::days(days.max(1) as i64 - 1),
    };
    Ok((since, until))
}

fn format_point(point: &TrendPoint) -> String {
    let value = match &point.value {
        None => "-".to_string(),
        Some(PointValue::Number(n)) => format!("{n:.1}"),
        Some(PointValue::Flag(true)) => "yes".to_string(),
        Some(PointValue::Flag(false)) => "no".to_string(),
        Some(PointValue::Label(label)) => label.clone(),
    };
    match point.count {
        0 => format!("{}  {value}", point.date.format("%Y-%m-%d")),
        n => format!("{}  {value}  ({n})", point.date.format("%Y-%m-%d")),
    }
}

fn print_dashboard(summaries: &[compass::AggregateSummary]) {
    for agg in summaries {
        println!("{:<12} {}", agg.metric_name, agg.summary);
        if agg.skipped > 0 {
            eprintln!("  ({} entries skipped)", agg.skipped);
        }
    }
}

fn print_digests(ctx: &compass::InsightContext) {
    for section in &ctx.sections {
        println!("{:<12} {}", section.label, section.summary);
    }
}
