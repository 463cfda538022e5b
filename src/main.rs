mod config;
mod data;
mod error;
mod pipeline;
mod sink;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenv::dotenv;
use sqlx::postgres::PgPool;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::PipelineConfig;
use data::{SparkApiSource, WikipediaSource};
use pipeline::EtlPipeline;
use sink::{CsvSink, SchemaMap, SqlSink, TableSink};

const LOG_FILE: &str = "etl_process.log";

/// Per-request timeout so a hung provider call becomes a stage failure
/// instead of blocking the run indefinitely.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends events to the console and to an append-only log file.
///
/// The file layer keeps ANSI colors off so the log stays grep-friendly;
/// both layers carry timestamps and severity.
fn init_logging(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))
        .with_context(|| format!("failed to open log file in {}", log_dir.display()))?;

    tracing_subscriber::registry()
        .with(LevelFilter::INFO)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false),
        )
        .init();

    Ok(())
}

/// Entry point: load configuration, wire the sources and sinks, run the
/// pipeline once, and map the outcome to the process exit code.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = PipelineConfig::from_env()?;
    init_logging(&config.log_dir)?;

    info!(
        source = %config.source_url,
        start = %config.start,
        end = %config.end,
        "starting ETL run"
    );

    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let reference = WikipediaSource::new(config.source_url.clone(), client.clone());
    let prices = SparkApiSource::new(client);

    let file_sink: Box<dyn TableSink> = Box::new(CsvSink::new(&config.data_dir));
    let db_pool = match &config.database {
        Some(db) => Some(
            PgPool::connect_lazy(&db.connection_url())
                .context("invalid database connection URL")?,
        ),
        None => {
            warn!("no database configuration; relational load disabled");
            None
        }
    };
    let db_sink: Option<Box<dyn TableSink>> = db_pool.clone().map(|pool| {
        Box::new(SqlSink::new(pool, SchemaMap::destination_defaults())) as Box<dyn TableSink>
    });

    let etl = EtlPipeline::new(
        reference,
        prices,
        file_sink,
        db_sink,
        config.start,
        config.end,
    );

    match etl.run().await {
        Ok(records) => {
            if let Some(pool) = &db_pool {
                report_loaded_rows(pool).await;
            }
            info!(rows = records.len(), "run finished");
            Ok(())
        }
        // The failing stage already logged the cause; the exit code is the
        // only signal left to emit.
        Err(_) => std::process::exit(1),
    }
}

/// Reads back the destination tables after a successful run and logs
/// their row counts. A read-back failure is only worth a warning: the
/// load itself already succeeded.
async fn report_loaded_rows(pool: &PgPool) {
    for table in [pipeline::PROFILES_TABLE, pipeline::PRICES_TABLE] {
        let statement = format!("SELECT COUNT(*) FROM \"{table}\"");
        match sqlx::query_scalar::<_, i64>(&statement).fetch_one(pool).await {
            Ok(count) => info!(table, rows = count, "destination table row count"),
            Err(e) => warn!(table, error = %e, "failed to read back destination table"),
        }
    }
}
