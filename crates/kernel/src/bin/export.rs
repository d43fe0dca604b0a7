//! Bulk CSV export from a running listing server.
//!
//! Usage:
//!   beta-export leads --base-url http://localhost:3000 --param funnel_id=4 --output leads.csv

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use beta_kernel::export::{
    AcceptPartial, BulkExporter, DEFAULT_PAGE_SIZE, ExportJob, ExportPhase, ExportSettings,
    HttpPageSource, PartialExportPolicy,
};
use beta_kernel::listing::{QueryParams, Resource};
use beta_kernel::view::ViewConfig;

/// Export configuration.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Resource to export (events, leads, users, professions, surveys).
    resource: Resource,

    /// Base URL of the listing server.
    #[arg(long, env = "BETA_BASE_URL", default_value = "http://localhost:3000")]
    base_url: String,

    /// Bearer token for protected resources.
    #[arg(long, env = "BETA_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Output CSV path (default: <resource>.csv).
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Saved view configuration whose filters are used.
    #[arg(long)]
    view_config: Option<PathBuf>,

    /// Extra filter parameter, `key=value`. Repeatable; wins over the view config.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Rows per paginated request.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Delay between requests in milliseconds.
    #[arg(long, default_value = "250")]
    delay_ms: u64,

    /// Retries per failed page.
    #[arg(long, default_value = "2")]
    retries: u32,

    /// Keep a short export without asking.
    #[arg(long)]
    allow_partial: bool,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

/// Asks on the terminal whether to keep a short export.
struct PromptPartial;

#[async_trait]
impl PartialExportPolicy for PromptPartial {
    async fn confirm(&self, received: usize, expected: u64) -> bool {
        let answer = tokio::task::spawn_blocking(move || {
            eprint!("Only {received} of {expected} rows were retrieved. Export anyway? [y/N] ");
            std::io::stderr().flush().ok();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        matches!(answer, Ok(Ok(line)) if line.trim().eq_ignore_ascii_case("y"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let mut params = match &args.view_config {
        Some(path) => ViewConfig::load(path)
            .with_context(|| format!("failed to load view config {}", path.display()))?
            .filters,
        None => QueryParams::new(),
    };
    for (key, value) in &args.params {
        params.set(key.clone(), value.clone());
    }

    let source = HttpPageSource::new(&args.base_url, args.token.clone())
        .context("invalid base URL")?;
    let settings = ExportSettings {
        page_size: args.page_size.max(1),
        request_delay: Duration::from_millis(args.delay_ms),
        max_retries: args.retries,
    };
    let policy: Arc<dyn PartialExportPolicy> = if args.allow_partial {
        Arc::new(AcceptPartial)
    } else {
        Arc::new(PromptPartial)
    };

    let cancel = CancellationToken::new();
    let exporter = BulkExporter::new(Arc::new(source), settings)
        .with_policy(policy)
        .with_cancellation(cancel.clone());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling export");
                cancel.cancel();
            }
        }
    });

    let mut progress = exporter.subscribe();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            match current.phase {
                ExportPhase::Fetching => eprint!("\rFetching   {:>3}%", current.percent),
                ExportPhase::Processing => eprint!("\rProcessing {:>3}%", current.percent),
                ExportPhase::Idle => {}
            }
        }
    });

    let mut job = ExportJob::new(args.resource, &params);
    info!(job_id = %job.id, resource = %args.resource, "starting export");
    let result = exporter.run(&mut job).await;

    drop(exporter);
    reporter.await.ok();
    eprintln!();

    let outcome = result.context("export failed")?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}.csv", args.resource)));
    std::fs::write(&output, &outcome.csv)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Wrote {} of {} rows to {} ({:?} strategy)",
        outcome.records.len(),
        outcome.expected_total,
        output.display(),
        outcome.strategy
    );
    if outcome.is_partial() {
        warn!(
            received = outcome.records.len(),
            expected = outcome.expected_total,
            "export is partial"
        );
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
