use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use kline_service::{
    config::{apply_env_overrides, load_config_path, normalize_config},
    db::migrate,
    service::KlineService,
    timestamp::parse_timestamp_millis,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Kline ingest and query CLI")]
struct Cli {
    /// Service configuration file.
    #[arg(long, value_name = "FILE", default_value = "configs/kline_sync.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    /// List the symbols an exchange currently trades.
    Symbols {
        #[arg(long)]
        exchange: Option<String>,
    },
    /// Fetch a range from an exchange into the store.
    Load {
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long)]
        symbol: String,
        /// Epoch ms, RFC 3339 or YYYY-MM-DD.
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Read a range back at a given interval.
    Query {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "1h")]
        interval: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON output only
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = load_config_path(&cli.config)?;
    apply_env_overrides(&mut cfg)?;
    normalize_config(&mut cfg).context("config invalid after environment overrides")?;

    match cli.cmd {
        Cmd::Migrate => {
            let applied = migrate::run_sqlite(&cfg.database_url)?;
            println!("{}", json!({ "applied": applied }));
        }
        Cmd::Symbols { exchange } => {
            let service = KlineService::from_config(&cfg).await?;
            let name = exchange.unwrap_or_else(|| cfg.default_exchange.clone());
            let entry = service
                .registry()
                .get(&name)
                .with_context(|| format!("unknown exchange {name}"))?;
            let symbols = entry.symbols.refresh().await?;
            println!("{}", serde_json::to_string(&*symbols)?);
        }
        Cmd::Load {
            exchange,
            symbol,
            start,
            end,
        } => {
            let service = KlineService::from_config(&cfg).await?;
            let exchange = exchange.unwrap_or_else(|| cfg.default_exchange.clone());
            let start = parse_timestamp_millis(&start)?;
            let end = parse_timestamp_millis(&end)?;

            let report = service.load_data(&symbol, start, end, &exchange).await?;
            let failed: Vec<_> = report
                .failed()
                .map(|o| {
                    json!({
                        "start": o.range.start,
                        "end": o.range.end,
                        "error": o.result.as_ref().err().map(|e| e.to_string()),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "exchange": report.exchange,
                    "symbol": report.symbol,
                    "start": report.range.start,
                    "end": report.range.end,
                    "sub_ranges": report.outcomes.len(),
                    "fetched": report.records_fetched(),
                    "written": report.records_written(),
                    "failed": failed,
                }))?
            );
            if !report.is_complete() {
                bail!("{} of {} sub-ranges failed", failed.len(), report.outcomes.len());
            }
        }
        Cmd::Query {
            symbol,
            start,
            end,
            interval,
        } => {
            let service = KlineService::from_config(&cfg).await?;
            let start = parse_timestamp_millis(&start)?;
            let end = parse_timestamp_millis(&end)?;

            let klines = service
                .retrieve_and_aggregate(&symbol, start, end, &interval)
                .await?;
            println!("{}", serde_json::to_string_pretty(&klines)?);
        }
    }

    Ok(())
}
