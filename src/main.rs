//! CLI entry point for the neighborhood pipeline.
//!
//! Provides subcommands for downloading the raw extracts, running the
//! cleaning and aggregation pipeline, printing read-only views over the
//! processed outputs, and uploading those outputs to S3.

mod infra;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use neighborhood_pipeline::fetch::{BasicClient, download_sources};
use neighborhood_pipeline::output::print_json;
use neighborhood_pipeline::query::{ListingFilter, ProcessedData, SearchFilter};
use neighborhood_pipeline::{Pipeline, PipelineConfig};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "neighborhood_pipeline")]
#[command(about = "Attribute Boston open data to neighborhoods and summarize it", long_about = None)]
struct Cli {
    /// JSON configuration file; defaults apply when omitted
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every configured source into the raw directory
    Download {
        /// Re-download files that already exist
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Clean every dataset, aggregate, and write the processed outputs
    Process,
    /// Print the profile of one neighborhood
    Profile {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Median price and count per neighborhood over matching properties
    Search {
        #[arg(long)]
        neighborhood: Option<String>,

        #[arg(long)]
        min_price: Option<f64>,

        #[arg(long)]
        max_price: Option<f64>,

        #[arg(long)]
        bedrooms: Option<u32>,

        /// Full baths plus 0.5 per half bath (e.g. 1.5)
        #[arg(long)]
        bathrooms: Option<f64>,
    },
    /// City medians and price-to-income ratio per neighborhood
    Affordability,
    /// Side-by-side income, property value and crime rate per neighborhood
    Compare,
    /// Incident counts per neighborhood per month
    CrimeTrends,
    /// Property count and median value per neighborhood
    Distribution,
    /// Highest assessed total value
    MaxPrice,
    /// Neighborhoods with demographics
    Neighborhoods,
    /// Located crime incidents
    Crimes(ListingArgs),
    /// Located schools
    Schools(ListingArgs),
    /// Transit stops
    TransitStops(ListingArgs),
    /// Located restaurants
    Restaurants(ListingArgs),
    /// Upload the processed outputs to S3
    Publish {
        /// S3 bucket name to upload to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: String,

        /// Gzip compress files before uploading
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[derive(Args)]
struct ListingArgs {
    #[arg(long)]
    neighborhood: Option<String>,

    /// Maximum number of rows to print
    #[arg(long)]
    limit: Option<usize>,
}

impl From<ListingArgs> for ListingFilter {
    fn from(args: ListingArgs) -> Self {
        ListingFilter {
            neighborhood: args.neighborhood,
            limit: args.limit,
        }
    }
}

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/neighborhood_pipeline.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"))
        .to_path_buf();
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("neighborhood_pipeline.log"))
        .to_os_string();

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", "info"));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("RUST_LOG_JSON", "debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

/// Reads the filter from `var`, falling back to `default` when it is unset or invalid.
fn env_filter(var: &str, default: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(default))
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(config.with_env_overrides())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file
    let _log_guard = init_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Download { force } => {
            let client = BasicClient::new(DOWNLOAD_TIMEOUT)?;
            let summary = download_sources(&client, &config, force).await?;
            info!(
                downloaded = summary.downloaded.len(),
                skipped = summary.skipped.len(),
                failed = summary.failed.len(),
                "Download finished"
            );
            for (path, error) in &summary.failed {
                warn!(path = %path.display(), error = %error, "Not downloaded");
            }
        }
        Commands::Process => {
            let pipeline = Pipeline::new(config);
            let report = tokio::task::spawn_blocking(move || pipeline.run()).await??;
            print_json(&report)?;
        }
        Commands::Profile { name } => {
            let data = ProcessedData::load(&config)?;
            print_json(&data.profile(&name)?)?;
        }
        Commands::Search {
            neighborhood,
            min_price,
            max_price,
            bedrooms,
            bathrooms,
        } => {
            let filter = SearchFilter {
                neighborhood,
                min_price,
                max_price,
                bedrooms,
                bathrooms,
            };
            let data = ProcessedData::load(&config)?;
            print_json(&data.search(&filter)?)?;
        }
        Commands::Affordability => {
            print_json(&ProcessedData::load(&config)?.affordability())?;
        }
        Commands::Compare => {
            print_json(&ProcessedData::load(&config)?.comparison())?;
        }
        Commands::CrimeTrends => {
            print_json(&ProcessedData::load(&config)?.crime_trends())?;
        }
        Commands::Distribution => {
            print_json(&ProcessedData::load(&config)?.property_distribution())?;
        }
        Commands::MaxPrice => {
            print_json(&ProcessedData::load(&config)?.max_price())?;
        }
        Commands::Neighborhoods => {
            print_json(&ProcessedData::load(&config)?.neighborhoods())?;
        }
        Commands::Crimes(args) => {
            print_json(&ProcessedData::load(&config)?.crime_points(&args.into())?)?;
        }
        Commands::Schools(args) => {
            print_json(&ProcessedData::load(&config)?.school_points(&args.into())?)?;
        }
        Commands::TransitStops(args) => {
            print_json(&ProcessedData::load(&config)?.transit_points(&args.into())?)?;
        }
        Commands::Restaurants(args) => {
            print_json(&ProcessedData::load(&config)?.restaurant_points(&args.into())?)?;
        }
        Commands::Publish { s3_bucket, gzip } => {
            let aws_config = aws_config::load_from_env().await;
            let s3 = aws_sdk_s3::Client::new(&aws_config);
            info!(bucket = %s3_bucket, gzip, "S3 upload enabled");
            infra::publish::publish_outputs(&s3, &s3_bucket, &config.processed_dir, Utc::now().date_naive(), gzip)
                .await?;
        }
    }

    Ok(())
}
