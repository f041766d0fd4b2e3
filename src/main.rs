use anyhow::Context;
use clap::Parser;
use pg_parquet_ingest::runner::{
    DatabaseTarget, IngestConfig, IngestConfigBuilder, IngestSummary, PROGRESS_TARGET, run_ingest,
};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "pg_parquet_ingest=info,sqlx=warn";

/// Ingest Parquet data into Postgres
#[derive(Parser, Clone, Debug)]
#[command(version, about)]
struct Args {
    /// User name for postgres
    #[arg(long)]
    user: String,

    /// Password for postgres
    #[arg(long)]
    password: String,

    /// Host for postgres
    #[arg(long)]
    host: String,

    /// Port for postgres
    #[arg(long)]
    port: u16,

    /// Database name for postgres
    #[arg(long)]
    db: String,

    /// Name of the table where we will write the results to
    #[arg(long = "table_name")]
    table_name: String,

    /// URL of the Parquet file
    #[arg(long)]
    url: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = log_filter(std::env::var("RUST_LOG").ok());
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let config = match build_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    println!("Parquet Ingest");
    println!("==============");
    println!("Source: {}", config.url);
    println!("Target: {}", config.target.redacted_uri());
    println!("Table: {}", config.target.table);
    println!();

    match run_ingest(config).await {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = err.exit_code();
            eprintln!("Error: {:#}", anyhow::Error::from(err));
            ExitCode::from(code)
        }
    }
}

/// `RUST_LOG` (or the default) plus the progress target at `info`
///
/// The per-batch "Inserted N rows" lines stay visible even when `RUST_LOG`
/// quiets everything else.
fn log_filter(rust_log: Option<String>) -> EnvFilter {
    let base = rust_log
        .filter(|directives| !directives.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    EnvFilter::new(format!("{},{}=info", base, PROGRESS_TARGET))
}

fn build_config(args: Args) -> anyhow::Result<IngestConfig> {
    if args.table_name.trim().is_empty() {
        anyhow::bail!("--table_name must not be empty");
    }
    if args.host.trim().is_empty() {
        anyhow::bail!("--host must not be empty");
    }

    let target = DatabaseTarget {
        user: args.user,
        password: args.password,
        host: args.host,
        port: args.port,
        database: args.db,
        table: args.table_name,
    };

    IngestConfigBuilder::default()
        .url(args.url)
        .target(target)
        .build()
        .context("Failed to build ingest configuration")
}

fn print_summary(summary: &IngestSummary) {
    println!();
    println!("Ingest Summary");
    println!("==============");
    println!("Run ID: {}", summary.run_id);
    println!(
        "Table: {}{}",
        summary.table,
        if summary.table_created { " (created)" } else { "" }
    );
    println!("Bytes downloaded: {}", summary.bytes_downloaded);
    println!("Batches loaded: {}", summary.batches);
    println!("Rows loaded: {}", summary.rows_loaded);
    println!("Datetime values nulled: {}", summary.coerced_nulls);
    println!("Duration: {:.2}s", summary.duration.as_secs_f64());
    if let (Some(p50), Some(p90), Some(p99)) =
        (summary.batch_p50_ms, summary.batch_p90_ms, summary.batch_p99_ms)
    {
        println!("Batch latency: p50={}ms p90={}ms p99={}ms", p50, p90, p99);
    }
    println!(
        "Throughput: {:.2} rows/sec",
        summary.rows_loaded as f64 / summary.duration.as_secs_f64().max(f64::EPSILON)
    );
}
