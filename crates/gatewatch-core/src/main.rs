//! Gatewatch CLI
//!
//! Command-line interface for the Gatewatch error-rate monitor.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use gatewatch::alerting::{build_notifier, LogNotifier, Monitor, MonitorSettings, Notifier};
use gatewatch::api::HttpServer;
use gatewatch::engine::{breakdown, Aggregator};
use gatewatch::models::{
    AlertDecision, DateRange, Granularity, NotificationRecord, ProjectFilter, RawEvent,
    ServiceType,
};
use gatewatch::source::{build_source, FetchRequest, MetricsSource};
use gatewatch::{logging, report, Config};

/// Gatewatch - error-rate alerts for gate logs
#[derive(Parser)]
#[command(name = "gatewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "GATEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor loop and the read-only API
    Watch {
        /// Do not start the HTTP API
        #[arg(long)]
        no_api: bool,
    },

    /// Evaluate every scope once and exit
    Check {
        /// Log alerts instead of delivering them
        #[arg(long)]
        dry_run: bool,

        /// Only evaluate this scope
        #[arg(long, value_enum)]
        service: Option<ServiceType>,
    },

    /// Per-project error metrics
    Metrics {
        #[command(flatten)]
        window: WindowArgs,

        /// Project alias, or * for every project
        #[arg(long, default_value = "*")]
        project: String,

        /// Bucket width
        #[arg(long, value_enum, default_value = "day")]
        granularity: Granularity,
    },

    /// Top projects by successful opens, with a per-type heatmap
    Rank {
        #[command(flatten)]
        window: WindowArgs,

        /// Number of projects to show (defaults to ranking.top_n)
        #[arg(long)]
        top: Option<usize>,
    },

    /// Reading-type counts for one project
    Breakdown {
        #[command(flatten)]
        window: WindowArgs,

        /// Project alias
        #[arg(long)]
        project: String,
    },

    /// Counts of one reading type over time
    Series {
        #[command(flatten)]
        window: WindowArgs,

        /// Project alias
        #[arg(long)]
        project: String,

        /// Reading type, e.g. open_error_500
        #[arg(long)]
        reading_type: String,

        /// Bucket width
        #[arg(long, value_enum, default_value = "hour")]
        granularity: Granularity,
    },
}

/// Scope and date window shared by the query commands
#[derive(Args)]
struct WindowArgs {
    /// Which gate log to read
    #[arg(long, value_enum, default_value = "access_control")]
    service: ServiceType,

    /// First local day (defaults to today)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last local day, inclusive (defaults to --from)
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let _guard = match logging::init(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Watch { no_api } => run_watch(config, no_api).await,
        Commands::Check { dry_run, service } => run_check(config, dry_run, service, cli.format).await,
        Commands::Metrics {
            window,
            project,
            granularity,
        } => run_metrics(config, window, &project, granularity, cli.format).await,
        Commands::Rank { window, top } => run_rank(config, window, top, cli.format).await,
        Commands::Breakdown { window, project } => {
            run_breakdown(config, window, &project, cli.format).await
        }
        Commands::Series {
            window,
            project,
            reading_type,
            granularity,
        } => run_series(config, window, &project, &reading_type, granularity, cli.format).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn upstream_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.monitor.upstream_timeout_seconds)
}

fn source_for(config: &Config) -> anyhow::Result<Arc<dyn MetricsSource>> {
    let offset = config.monitor.utc_offset()?;
    Ok(build_source(&config.source, upstream_timeout(config), offset)?)
}

fn build_monitor(config: &Config, notifier: Arc<dyn Notifier>) -> anyhow::Result<Monitor> {
    let settings = MonitorSettings::from_config(config)?;
    Ok(Monitor::new(source_for(config)?, notifier, settings))
}

async fn run_watch(config: Config, no_api: bool) -> anyhow::Result<()> {
    logging::init_metrics(&config.metrics)?;

    let notifier = build_notifier(&config.notifier, upstream_timeout(&config))?;
    let monitor = Arc::new(build_monitor(&config, notifier)?);

    let mut api = if no_api {
        None
    } else {
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let server = HttpServer::new(monitor.clone()).bind(&addr).await?;
        Some(tokio::spawn(server.serve()))
    };

    let watcher = monitor.clone();
    tokio::select! {
        () = watcher.start() => {}
        served = async {
            match api.as_mut() {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            served.context("API server task failed")?.context("API server failed")?;
            anyhow::bail!("API server stopped unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    if let Some(api) = api {
        api.abort();
    }
    Ok(())
}

#[derive(Serialize)]
struct CheckReport {
    service: ServiceType,
    decision: &'static str,
    rejected: usize,
    violations: usize,
    message: Option<String>,
    notification: Option<NotificationRecord>,
}

async fn run_check(
    config: Config,
    dry_run: bool,
    service: Option<ServiceType>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let notifier: Arc<dyn Notifier> = if dry_run {
        Arc::new(LogNotifier)
    } else {
        build_notifier(&config.notifier, upstream_timeout(&config))?
    };
    let monitor = build_monitor(&config, notifier)?;
    let services = service.map_or_else(|| monitor.settings().services.clone(), |s| vec![s]);

    let now = Utc::now();
    let mut reports = Vec::with_capacity(services.len());
    for service in services {
        let outcome = monitor
            .run_cycle(service, now)
            .await
            .with_context(|| format!("checking {service}"))?;
        let message = match &outcome.decision {
            AlertDecision::Fire(alert) => Some(alert.message.clone()),
            AlertDecision::NoAlert | AlertDecision::Suppressed(_) => None,
        };
        reports.push(CheckReport {
            service,
            decision: outcome.decision.label(),
            rejected: outcome.rejected,
            violations: outcome.decision.violations().len(),
            message,
            notification: outcome.notification,
        });
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for r in &reports {
        println!(
            "{}: {} ({} violation(s), {} rejected row(s))",
            r.service, r.decision, r.violations, r.rejected
        );
        if let Some(message) = &r.message {
            println!("{message}\n");
        }
        if let Some(n) = r.notification.as_ref().filter(|n| !n.success) {
            println!(
                "  delivery via {} failed: {}",
                n.channel_type,
                n.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}

async fn fetch_window(
    config: &Config,
    window: &WindowArgs,
    project: ProjectFilter,
    group_by: Granularity,
) -> anyhow::Result<Vec<RawEvent>> {
    let offset = config.monitor.utc_offset()?;
    let range = match (window.from, window.to) {
        (None, None) => DateRange::today(Utc::now(), offset),
        (Some(from), None) => DateRange::day(from),
        (None, Some(to)) => DateRange::day(to),
        (Some(from), Some(to)) => DateRange::new(from, to)?,
    };

    let request = FetchRequest {
        service: window.service,
        project,
        range,
        group_by,
    };
    let source = source_for(config)?;
    let rows = tokio::time::timeout(upstream_timeout(config), source.fetch(&request))
        .await
        .context("metrics source timed out")??;
    Ok(rows)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_metrics(
    config: Config,
    window: WindowArgs,
    project: &str,
    granularity: Granularity,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let rows = fetch_window(&config, &window, ProjectFilter::parse(project), granularity).await?;
    let report = Aggregator::new(granularity, config.monitor.utc_offset()?).aggregate(&rows);

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print!("{}", report::render_metrics(&report.metrics));
            if report.rejected > 0 {
                println!("({} malformed row(s) skipped)", report.rejected);
            }
            Ok(())
        }
    }
}

async fn run_rank(
    config: Config,
    window: WindowArgs,
    top: Option<usize>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let rows = fetch_window(&config, &window, ProjectFilter::All, config.monitor.granularity).await?;
    let ranker = gatewatch::engine::Ranker::new(
        config.ranking.open_marker.clone(),
        top.unwrap_or(config.ranking.top_n),
    )?;
    let matrix = ranker.rank(&rows)?;

    match format {
        OutputFormat::Json => print_json(&matrix),
        OutputFormat::Text => {
            print!("{}", report::render_matrix(&matrix));
            Ok(())
        }
    }
}

async fn run_breakdown(
    config: Config,
    window: WindowArgs,
    project: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let rows = fetch_window(
        &config,
        &window,
        ProjectFilter::parse(project),
        config.monitor.granularity,
    )
    .await?;
    let counts = breakdown(&rows, project);

    match format {
        OutputFormat::Json => print_json(&counts),
        OutputFormat::Text => {
            print!("{}", report::render_breakdown(&counts));
            Ok(())
        }
    }
}

async fn run_series(
    config: Config,
    window: WindowArgs,
    project: &str,
    reading_type: &str,
    granularity: Granularity,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let rows = fetch_window(&config, &window, ProjectFilter::parse(project), granularity).await?;
    let points = Aggregator::new(granularity, config.monitor.utc_offset()?).series(
        &rows,
        project,
        reading_type,
    );

    match format {
        OutputFormat::Json => print_json(&points),
        OutputFormat::Text => {
            print!("{}", report::render_series(&points));
            Ok(())
        }
    }
}
