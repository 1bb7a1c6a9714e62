//! taxcat - command-line front end for the tax catalog
//!
//! Bulk import of delimited order files, manual single-record entry, and
//! filtered catalog queries against the catalog service.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use taxcat_client::catalog::{CatalogService, HttpCatalogClient};
use taxcat_client::normalizer::normalize_file;
use taxcat_client::query::{suggest_counties, QueryController};
use taxcat_client::session::SessionContext;
use taxcat_client::uploader::ChunkedUploader;
use taxcat_client::{submit_manual_record, QueryView};
use taxcat_common::config::{self, TomlConfig};
use taxcat_common::events::EventBus;
use taxcat_common::time::{format_eta, now, parse_timestamp, to_wire};
use taxcat_common::{NormalizedRecord, QueryFilter};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for taxcat
#[derive(Parser, Debug)]
#[command(name = "taxcat")]
#[command(about = "Tax catalog client: bulk import and live queries")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog service base URL (overrides config and TAXCAT_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token (overrides config and TAXCAT_AUTH_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize a delimited file and upload it in chunks
    Import {
        file: PathBuf,
    },
    /// Create a single record
    Create {
        #[arg(long, allow_negative_numbers = true)]
        latitude: f64,
        #[arg(long, allow_negative_numbers = true)]
        longitude: f64,
        #[arg(long)]
        subtotal: f64,
        /// RFC 3339 or "YYYY-MM-DD HH:MM:SS" (UTC); defaults to now
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Query one page of the catalog
    Query(QueryArgs),
    /// Print global catalog stats
    Stats,
    /// Suggest county names for a prefix
    Counties {
        prefix: String,
    },
    /// Write a config file with the default settings
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// County name prefix
    #[arg(long)]
    county: Option<String>,
    #[arg(long)]
    min_subtotal: Option<f64>,
    #[arg(long)]
    min_tax: Option<f64>,
    /// Minimum composite rate in percent (8.875 means 8.875 %)
    #[arg(long)]
    min_rate: Option<f64>,
    /// Include rows whose rate could not be determined
    #[arg(long)]
    include_errors: bool,
    #[arg(long, default_value_t = 1)]
    page: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // local commands need neither the service nor a loaded config
    match &cli.command {
        Command::Counties { prefix } => {
            for name in suggest_counties(prefix) {
                println!("{}", name);
            }
            return Ok(());
        }
        Command::InitConfig { force } => return init_config(cli.config.clone(), *force),
        _ => {}
    }

    let loaded = config::resolve_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let mut config = loaded.config.clone();
    config
        .apply_cli_overrides(cli.base_url, cli.token)
        .context("Invalid command-line override")?;

    init_tracing(&config)?;
    loaded.log();

    let client = HttpCatalogClient::from_config(&config.service).context("Failed to build catalog client")?;
    info!("Catalog service: {}", client.base_url());
    let catalog: Arc<dyn CatalogService> = Arc::new(client);
    // the authentication gate is external; reaching this point means it passed
    let session = SessionContext::authenticated(config.service.auth_token.clone());
    let event_bus = EventBus::new(256);

    match cli.command {
        Command::Import { file } => import(&config, session, catalog, event_bus, file).await,
        Command::Create {
            latitude,
            longitude,
            subtotal,
            timestamp,
        } => {
            let timestamp = match timestamp {
                Some(text) => parse_timestamp(&text)
                    .with_context(|| format!("Unrecognized timestamp: {}", text))?,
                None => now(),
            };
            let record = NormalizedRecord {
                latitude,
                longitude,
                subtotal,
                timestamp: to_wire(&timestamp),
            };
            let computed = submit_manual_record(catalog.as_ref(), &event_bus, &record)
                .await
                .context("Record was not created")?;
            println!("{}", serde_json::to_string_pretty(&computed)?);
            Ok(())
        }
        Command::Query(args) => query(&config, &session, catalog, args).await,
        Command::Stats => {
            let stats = session
                .refresh_stats(catalog.as_ref())
                .await
                .context("Failed to fetch stats")?;
            println!("Orders:        {}", stats.count);
            println!("Total tax:     {:.2}", stats.total_tax);
            println!("Total revenue: {:.2}", stats.total_revenue);
            Ok(())
        }
        Command::Counties { .. } | Command::InitConfig { .. } => Ok(()),
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => config::default_config_path().context("Could not determine config directory")?,
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config::write_toml_config(&TomlConfig::default(), &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Initialize tracing: RUST_LOG wins over the configured level
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (stderr_layer, file_layer) = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file));
            (None, Some(layer))
        }
        None => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn import(
    config: &TomlConfig,
    session: Arc<SessionContext>,
    catalog: Arc<dyn CatalogService>,
    event_bus: EventBus,
    file: PathBuf,
) -> Result<()> {
    let normalized = normalize_file(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    if normalized.dropped > 0 {
        warn!("Dropped {} invalid rows", normalized.dropped);
    }

    let uploader = ChunkedUploader::new(&session, catalog, config.upload.chunk_size, event_bus)?;
    let summary = uploader
        .upload_with_progress(normalized.records, |progress| {
            println!(
                "Uploaded {}/{} ({:.0}%), ETA {}",
                progress.uploaded_count,
                progress.total_count,
                progress.percentage(),
                format_eta(progress.eta_seconds)
            );
        })
        .await?;

    println!(
        "Imported {} records in {} chunks ({:.1}s)",
        summary.committed,
        summary.chunk_count,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

async fn query(
    config: &TomlConfig,
    session: &SessionContext,
    catalog: Arc<dyn CatalogService>,
    args: QueryArgs,
) -> Result<()> {
    let controller = QueryController::new(session, catalog, &config.query)?;

    let filter = QueryFilter {
        county_prefix: args.county.filter(|c| !c.trim().is_empty()),
        min_subtotal: args.min_subtotal,
        min_tax: args.min_tax,
        min_rate_fraction: args.min_rate.map(taxcat_client::query::controller::percent_to_fraction),
        include_error_rows: args.include_errors,
    };
    controller.set_filter(filter);
    controller.set_page(args.page);
    controller.refresh();

    let view = controller.wait_idle().await;
    print_view(&view)
}

fn print_view(view: &QueryView) -> Result<()> {
    if let Some(failure) = &view.failure {
        bail!("Query failed: {}", failure.message);
    }
    let Some(result) = &view.result else {
        bail!("Query produced no result");
    };

    println!(
        "{:>8}  {:>10}  {:>11}  {:>10}  {:>8}  {:>9}  {:>10}  jurisdictions",
        "id", "latitude", "longitude", "subtotal", "rate %", "tax", "total"
    );
    for record in &result.records {
        println!(
            "{:>8}  {:>10.5}  {:>11.5}  {:>10.2}  {:>8.4}  {:>9.2}  {:>10.2}  {}{}",
            record.id,
            record.latitude,
            record.longitude,
            record.subtotal,
            record.composite_tax_rate * 100.0,
            record.tax_amount,
            record.total_amount,
            record.jurisdictions.as_deref().unwrap_or("-"),
            if record.rate_defective() { " (rate unavailable)" } else { "" }
        );
    }
    println!(
        "Page {}/{} | {} matching | tax {:.2} | revenue {:.2}",
        result.page, result.total_pages, result.total_count, result.aggregate_tax, result.aggregate_revenue
    );
    Ok(())
}
