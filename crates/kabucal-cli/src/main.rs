mod cache;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kabucal_core::SystemClock;
use kabucal_engine::Resolver;
use tracing_subscriber::EnvFilter;

use crate::cache::CacheCommands;

#[derive(Debug, Parser)]
#[command(name = "kabucal")]
#[command(about = "Resolve earnings announcement datetimes for Japanese listed companies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve announcement datetimes for one date and print them as JSON
    Resolve {
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Comma-separated source names in priority order (default: all)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        /// Skip historical inference
        #[arg(long)]
        no_inference: bool,
        /// Skip IR page discovery
        #[arg(long)]
        no_ir: bool,
        /// Ignore cached IR results and rediscover every page
        #[arg(long)]
        eager: bool,
        /// Also print which sources failed
        #[arg(long)]
        report: bool,
    },
    /// Health-check every registered source
    CheckSources,
    /// Inspect or edit the IR discovery cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = kabucal_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve {
            date,
            sources,
            no_inference,
            no_ir,
            eager,
            report,
        } => {
            let resolver = Resolver::from_app_config(&config, Arc::new(SystemClock))?;
            let report_value = resolver
                .resolve_report(&date, &sources, !no_inference, !no_ir, eager)
                .await?;
            if report {
                print_json(&report_value)?;
            } else {
                print_json(&report_value.records)?;
            }
        }
        Commands::CheckSources => {
            let resolver = Resolver::from_app_config(&config, Arc::new(SystemClock))?;
            let health = resolver.check_sources().await;
            let unhealthy = health.iter().filter(|h| !h.ok).count();
            print_json(&health)?;
            if unhealthy > 0 {
                tracing::warn!(unhealthy, total = health.len(), "some sources are unhealthy");
            }
        }
        Commands::Cache { command } => cache::run(&config, &command)?,
    }

    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
