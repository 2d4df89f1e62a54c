//! `qguard` - CLI for qualityguard
//!
//! This binary provides the command-line interface for inspecting
//! measurement batches, control charts and alerts, online or offline.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use qualityguard::alerts::{DesktopNotifier, SilentNotifier};
use qualityguard::cli::{
    parse_batch, parse_series, AnalyzeCommand, ChartCommand, Cli, Command, ConfigCommand,
    HistoricalCommand, QueueCommand, SaveCommand,
};
use qualityguard::sync::{DataSource, HistoricalQuery, HttpMeasurementService};
use qualityguard::{
    init_logging, local_analysis, process_capability, Alert, AlertFeed, AlertId, Config,
    ControlChart, Dashboard, Storage, SyncClient,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// How often `watch` checks the feed for new alerts.
const WATCH_POLL: Duration = Duration::from_millis(500);

#[tokio::main(flavor = "current_thread")]
async fn main() -> CliResult {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Validation loads the file itself, so a broken config is reported
    // rather than aborting startup.
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        handle_validate(file.clone().or_else(|| cli.config.clone()));
        return Ok(());
    }

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json).await,
        Command::Chart(chart_cmd) => handle_chart(&chart_cmd),
        Command::Analyze(analyze_cmd) => handle_analyze(&config, &analyze_cmd).await,
        Command::Historical(historical_cmd) => handle_historical(&config, historical_cmd).await,
        Command::Save(save_cmd) => handle_save(&config, &save_cmd).await,
        Command::Queue(queue_cmd) => handle_queue(&config, &queue_cmd).await,
        Command::Watch => handle_watch(&config).await,
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

/// Client for one-shot commands: no push channel.
fn open_client(config: &Config) -> Result<SyncClient, Box<dyn std::error::Error>> {
    let service = HttpMeasurementService::from_config(config)?;
    let store = Storage::open(config.database_path())?;
    Ok(SyncClient::new(Arc::new(service), store))
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_alert(alert: &Alert) {
    println!(
        "[{:<8}] #{} {}: {}",
        alert.severity.to_string(),
        alert.id,
        alert.title,
        alert.message
    );
    for action in &alert.suggested_actions {
        println!("           - {action}");
    }
}

async fn handle_status(config: &Config, json: bool) -> CliResult {
    let client = open_client(config)?;
    // Connect first so the queue counts reflect any replay
    let replay = client.connect_and_drain().await;
    let status = client.status()?;

    if json {
        let status = serde_json::json!({
            "serviceUrl": config.service.base_url,
            "databasePath": config.database_path(),
            "sync": status,
            "replay": replay,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("qguard status");
        println!("-------------");
        println!("Service:         {}", config.service.base_url);
        println!("Connection:      {}", status.state);
        println!("Database:        {}", config.database_path().display());
        println!("Cached entries:  {}", status.storage.cached_entries);
        println!("Queued writes:   {}", status.storage.queued_writes);
        if let Some(oldest) = status.storage.oldest_queued {
            println!("Oldest queued:   {}", oldest.to_rfc3339());
        }
        println!(
            "Local batches:   {} ({} unsynced)",
            status.storage.local_batches, status.storage.unsynced_batches
        );
        if let Some(report) = replay.filter(|r| r.attempted > 0) {
            println!();
            println!(
                "Replayed {} of {} queued writes.",
                report.delivered, report.attempted
            );
        }
    }
    Ok(())
}

fn handle_chart(cmd: &ChartCommand) -> CliResult {
    let values = parse_series(&read_input(&cmd.file)?)?;
    let chart = ControlChart::compute(&values);
    let cpk = cmd
        .lower
        .zip(cmd.upper)
        .and_then(|(lower, upper)| process_capability(&values, lower, upper));

    if cmd.json {
        let out = serde_json::json!({
            "chart": chart,
            "outOfControl": chart.as_ref().map(ControlChart::out_of_control),
            "cpk": cpk,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let Some(chart) = chart else {
        println!("No data.");
        return Ok(());
    };

    let limits = chart.limits;
    let (low, high) = chart.value_range();
    println!("Control chart ({} points)", limits.n);
    println!("  Mean:    {:.4}", limits.mean);
    println!("  Std dev: {:.4}", limits.stddev);
    println!("  UCL:     {:.4}", limits.ucl);
    println!("  LCL:     {:.4}", limits.lcl);
    println!("  Range:   {low:.4} .. {high:.4}");
    if let Some(cpk) = cpk {
        println!("  Cpk:     {cpk:.2}");
    }
    println!();
    for point in &chart.points {
        let marker = if point.out_of_control { "*" } else { " " };
        println!("{marker} {:>4}  {:.4}", point.index, point.value);
    }

    let violations = chart.out_of_control();
    if !violations.is_empty() {
        println!();
        println!("{} point(s) out of control.", violations.len());
    }
    Ok(())
}

async fn handle_analyze(config: &Config, cmd: &AnalyzeCommand) -> CliResult {
    let batch = parse_batch(&read_input(&cmd.file)?)?;

    let analysis = if cmd.offline {
        local_analysis(&batch.measurements)
    } else {
        let client = open_client(config)?;
        client.connect().await;
        client.run_analysis(&batch.measurements).await
    };

    let mut feed = AlertFeed::from_config(&config.alerts, Arc::new(SilentNotifier));
    feed.ingest_analysis(&analysis);

    if cmd.json {
        let out = serde_json::json!({
            "analysis": analysis,
            "alerts": feed.iter().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{:<8} {:<28} {:>10} {:>6}  Status", "ID", "Parameter", "Value", "Cpk");
    for m in &batch.measurements {
        println!(
            "{:<8} {:<28} {:>10.3} {:>6.2}  {}",
            m.id,
            m.parameter,
            m.value,
            m.cpk,
            m.status()
        );
    }
    println!();
    if feed.is_empty() {
        println!("No alerts.");
    } else {
        for alert in feed.iter() {
            print_alert(alert);
        }
    }
    Ok(())
}

async fn handle_historical(config: &Config, cmd: HistoricalCommand) -> CliResult {
    let client = open_client(config)?;
    client.connect().await;

    let range = cmd
        .range
        .unwrap_or_else(|| config.dashboard.date_range.clone());
    let product = cmd.product.or_else(|| config.dashboard.product_type.clone());
    let query = HistoricalQuery::new(range, product);

    let Some(historical) = client.fetch_historical(&query).await else {
        println!("No historical data available (offline and nothing cached).");
        return Ok(());
    };

    if cmd.json {
        println!("{}", historical.raw);
        return Ok(());
    }

    let data = &historical.data;
    match (historical.source, historical.cached_at) {
        (DataSource::Cache, Some(at)) => println!("Source:        cache ({})", at.to_rfc3339()),
        (DataSource::Cache, None) => println!("Source:        cache"),
        (DataSource::Remote, _) => println!("Source:        service"),
    }
    if let Some(total) = data.total_measurements {
        println!("Measurements:  {total}");
    }
    if let Some(avg) = data.avg_cpk {
        println!("Average Cpk:   {avg:.2}");
    }
    println!("Anomalies:     {}", data.anomalies.len());
    println!("Predictions:   {}", data.predictions.len());
    if let Some(chart) = ControlChart::compute(&data.chart_values()) {
        println!(
            "Control chart: {} points, mean {:.4}, UCL {:.4}, LCL {:.4}, {} out of control",
            chart.limits.n,
            chart.limits.mean,
            chart.limits.ucl,
            chart.limits.lcl,
            chart.out_of_control().len()
        );
    }
    Ok(())
}

async fn handle_save(config: &Config, cmd: &SaveCommand) -> CliResult {
    let batch = parse_batch(&read_input(&cmd.file)?)?;
    let client = open_client(config)?;
    client.connect().await;

    let ack = client.persist(&batch).await;
    if !ack.success {
        return Err("measurement service rejected the batch".into());
    }
    if ack.offline {
        println!(
            "Service unreachable; {} measurements queued for replay.",
            batch.measurements.len()
        );
    } else {
        println!("Saved {} measurements.", batch.measurements.len());
    }
    Ok(())
}

async fn handle_queue(config: &Config, cmd: &QueueCommand) -> CliResult {
    let client = open_client(config)?;
    match cmd {
        QueueCommand::List { json } => {
            let entries = client.queued()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("Offline queue is empty.");
            } else {
                for entry in &entries {
                    println!(
                        "{:>5}  {:<5} {}  {} bytes",
                        entry.id,
                        entry.kind.to_string(),
                        entry.enqueued_at.to_rfc3339(),
                        entry.payload.len()
                    );
                }
            }
        }
        QueueCommand::Drain => match client.connect_and_drain().await {
            Some(report) => {
                println!(
                    "Delivered {} of {} queued writes ({} retained, {} discarded).",
                    report.delivered, report.attempted, report.retained, report.discarded
                );
            }
            None => {
                let remaining = client.queued()?.len();
                println!("Service unreachable; {remaining} writes remain queued.");
            }
        },
    }
    Ok(())
}

async fn handle_watch(config: &Config) -> CliResult {
    let client = Arc::new(SyncClient::from_config(config)?);
    let notifier = Arc::new(DesktopNotifier::from_config(&config.alerts));
    let feed = AlertFeed::from_config(&config.alerts, notifier);
    let dashboard = Arc::new(Dashboard::new(client, feed, config.dashboard.clone()));

    // Start the session and the periodic refresh
    dashboard.start().await;
    println!(
        "Watching ({}). Press Ctrl-C to stop.",
        dashboard.connection()
    );

    let scheduler = config
        .refresh
        .enabled
        .then(|| dashboard.spawn_refresh(config.refresh_interval()));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_seen: Option<AlertId> = None;
    loop {
        for alert in dashboard.alerts_since(last_seen) {
            print_alert(&alert);
            last_seen = Some(alert.id);
        }
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            () = tokio::time::sleep(WATCH_POLL) => {}
        }
    }

    // Shut down
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    dashboard.stop();
    println!("Stopped.");
    Ok(())
}

fn handle_validate(file: Option<PathBuf>) {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> CliResult {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Service]");
                println!("  Base URL:           {}", config.service.base_url);
                println!("  Push URL:           {}", config.service.push_url);
                println!("  Push enabled:       {}", config.service.push_enabled);
                println!("  Request timeout:    {:?}", config.request_timeout());
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Refresh]");
                println!("  Enabled:            {}", config.refresh.enabled);
                println!("  Interval:           {:?}", config.refresh_interval());
                println!();
                println!("[Alerts]");
                println!("  Capacity:           {}", config.alerts.capacity);
                println!(
                    "  Prediction cutoff:  {}",
                    config.alerts.prediction_confidence_threshold
                );
                println!("  Sound:              {}", config.alerts.sound_enabled);
                println!(
                    "  Desktop notices:    {}",
                    config.alerts.desktop_notifications
                );
                println!();
                println!("[Dashboard]");
                println!("  Date range:         {}", config.dashboard.date_range);
                println!(
                    "  Product type:       {}",
                    config.dashboard.product_type.as_deref().unwrap_or("(any)")
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => handle_validate(file),
    }
    Ok(())
}
