//! Pageviews ETL - hourly Wikipedia pageviews pipeline

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pageviews_common::logging::{init_logging, LogConfig, LogLevel, LogOutput, DEFAULT_LOG_FILE_PREFIX};
use pageviews_common::TargetHour;
use pageviews_etl::config::{DEFAULT_BASE_URL, DEFAULT_MIN_EXTRACTED_BYTES};
use pageviews_etl::{
    connect_store, extract, fetch, transform, DatabaseConfig, DumpLayout, PipelineConfig,
    PipelineRunner, RetryConfig, RunPaths, SourceConfig, StagingConfig, WatchList,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "pageviews-etl")]
#[command(author, version, about = "Hourly Wikipedia pageviews ETL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the hourly dump
    Fetch(HourArgs),
    /// Decompress a downloaded dump
    Extract(HourArgs),
    /// Filter the dump to watched English titles
    Transform(HourArgs),
    /// Load transformed rows into the database
    Load(HourArgs),
    /// Report the most viewed title of the hour
    Analyze(HourArgs),
    /// Run all stages with retries and print the run record
    Run(HourArgs),
}

#[derive(Args, Debug)]
struct HourArgs {
    /// Target hour, e.g. 20251210-16 or 2025-12-10T16:00
    #[arg(long, env = "PAGEVIEWS_TARGET_HOUR")]
    hour: TargetHour,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Base URL of the dump server
    #[arg(long, global = true, env = "PAGEVIEWS_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Dump layout under the base URL: dated or flat
    #[arg(long, global = true, env = "PAGEVIEWS_DUMP_LAYOUT", default_value = "dated")]
    layout: DumpLayout,

    #[arg(long, global = true, env = "PAGEVIEWS_HTTP_TIMEOUT_SECS", default_value_t = 600)]
    http_timeout_secs: u64,

    /// Root directory for downloads, staging files, reports and logs
    #[arg(long, global = true, env = "PAGEVIEWS_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    #[arg(long, global = true)]
    raw_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    staging_dir: Option<PathBuf>,

    /// Append-only report file
    #[arg(long, global = true, env = "PAGEVIEWS_REPORT_FILE")]
    report_file: Option<PathBuf>,

    /// Extracted dumps smaller than this are rejected as truncated
    #[arg(long, global = true, env = "PAGEVIEWS_MIN_EXTRACTED_BYTES", default_value_t = DEFAULT_MIN_EXTRACTED_BYTES)]
    min_extracted_bytes: u64,

    /// Keep staging files after a successful run
    #[arg(long, global = true)]
    keep_staging: bool,

    /// Also delete the raw dump after a successful run
    #[arg(long, global = true)]
    clean_raw: bool,

    /// Full connection URL (postgres:// or sqlite:); overrides the PG* settings
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, global = true, env = "PGHOST", default_value = "localhost")]
    db_host: String,

    #[arg(long, global = true, env = "PGPORT", default_value_t = 5432)]
    db_port: u16,

    #[arg(long, global = true, env = "PGDATABASE", default_value = "pageviews")]
    db_name: String,

    #[arg(long, global = true, env = "PGUSER", default_value = "postgres")]
    db_user: String,

    #[arg(long, global = true, env = "PGPASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    #[arg(long, global = true, env = "PAGEVIEWS_DB_MAX_CONNECTIONS", default_value_t = 5)]
    db_max_connections: u32,

    /// Comma-separated titles to track (default: Amazon,Apple,Facebook,Google,Microsoft)
    #[arg(long, global = true, env = "PAGEVIEWS_WATCH_LIST")]
    watch_list: Option<WatchList>,

    /// Rows per insert transaction
    #[arg(long, global = true, env = "PAGEVIEWS_BATCH_SIZE", default_value_t = 500)]
    batch_size: usize,

    /// Attempts per stage for the run command
    #[arg(long, global = true, env = "PAGEVIEWS_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, global = true, env = "PAGEVIEWS_RETRY_DELAY_SECS", default_value_t = 30)]
    retry_delay_secs: u64,
}

impl PipelineArgs {
    fn into_config(self) -> PipelineConfig {
        PipelineConfig {
            source: SourceConfig {
                base_url: self.base_url,
                layout: self.layout,
                timeout_secs: self.http_timeout_secs,
                ..SourceConfig::default()
            },
            database: DatabaseConfig {
                url: self.database_url,
                host: self.db_host,
                port: self.db_port,
                name: self.db_name,
                user: self.db_user,
                password: self.db_password,
                max_connections: self.db_max_connections,
                ..DatabaseConfig::default()
            },
            staging: StagingConfig {
                data_dir: self.data_dir,
                raw_dir: self.raw_dir,
                staging_dir: self.staging_dir,
                report_file: self.report_file,
                min_extracted_bytes: self.min_extracted_bytes,
                keep_staging: self.keep_staging,
                clean_raw: self.clean_raw,
            },
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                delay_secs: self.retry_delay_secs,
            },
            batch_size: self.batch_size,
            watch_list: self.watch_list.unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Both)
        .log_dir(cli.pipeline.data_dir.join("logs"))
        .log_file_prefix(DEFAULT_LOG_FILE_PREFIX)
        .filter_directives("sqlx=warn,hyper=info,reqwest=info")
        .build()
        .merge_env()
        .context("Invalid LOG_* environment variables")?;

    let _guard = init_logging(&log_config)?;

    let config = cli.pipeline.into_config();
    config.validate().context("Invalid pipeline configuration")?;
    debug!(?config, "Resolved configuration");

    match cli.command {
        Command::Fetch(HourArgs { hour }) => {
            let paths = run_paths(&config, &hour);
            let client = fetch::build_client(&config.source)?;
            let path = fetch::fetch(&client, &config.source, &hour, &paths.raw_dump).await?;
            print_json(&serde_json::json!({ "path": path }))?;
        },
        Command::Extract(HourArgs { hour }) => {
            let paths = run_paths(&config, &hour);
            let min_output_bytes = config.staging.min_extracted_bytes;
            let path = tokio::task::spawn_blocking(move || {
                extract::extract(&paths.raw_dump, &paths.extracted, min_output_bytes)
            })
            .await??;
            print_json(&serde_json::json!({ "path": path }))?;
        },
        Command::Transform(HourArgs { hour }) => {
            let paths = run_paths(&config, &hour);
            let watch_list = config.watch_list.clone();
            let output = tokio::task::spawn_blocking(move || {
                transform::transform(&paths.extracted, &paths.transformed, &watch_list, &hour)
            })
            .await??;
            print_json(&output)?;
        },
        Command::Load(HourArgs { hour }) => {
            let runner = connect_runner(config).await?;
            let stats = runner.load(&hour).await?;
            print_json(&stats)?;
        },
        Command::Analyze(HourArgs { hour }) => {
            let runner = connect_runner(config).await?;
            let result = runner.analyze(&hour).await?;
            print_json(&result)?;
        },
        Command::Run(HourArgs { hour }) => {
            let runner = connect_runner(config).await?;
            let record = runner.run(&hour).await;
            print_json(&record)?;

            if !record.succeeded() {
                return Ok(ExitCode::FAILURE);
            }
        },
    }

    info!("Done");
    Ok(ExitCode::SUCCESS)
}

fn run_paths(config: &PipelineConfig, hour: &TargetHour) -> RunPaths {
    RunPaths::new(&config.staging.raw_dir(), &config.staging.staging_dir(), hour)
}

async fn connect_runner(config: PipelineConfig) -> Result<PipelineRunner> {
    let store = connect_store(&config.database)
        .await
        .context("Failed to connect to the pageviews database")?;
    PipelineRunner::new(config, store).context("Failed to build HTTP client")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
