use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use dc_campaign_finance::config::Config;
use dc_campaign_finance::logging;
use dc_campaign_finance::pipeline::rejections::LogErrorStream;
use dc_campaign_finance::pipeline::RunSummary;
use dc_campaign_finance::tasks::{self, GeocodeMode};

#[derive(Parser)]
#[command(name = "dc_campaign_finance")]
#[command(about = "Geocodes DC campaign contributions and splits them by candidate")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print run summaries as JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the committee registration search into the committee→candidate file
    ScrapeCommittees,
    /// Clean, attribute and geocode the raw contributions export
    Geocode {
        /// Use random coordinates instead of calling the geocoder
        #[arg(long)]
        fake: bool,
    },
    /// Write one file per special-election candidate
    Split,
    /// Rebuild the geocache file from the geocoded output
    ExtractGeocache,
    /// Run geocode, split and extract-geocache in order
    Run {
        /// Use random coordinates instead of calling the geocoder
        #[arg(long)]
        fake: bool,
    },
}

fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        match serde_json::to_string(summary) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
        return;
    }
    println!("\n📊 Results for {}:", summary.name);
    println!("   Total records: {}", summary.total_records);
    println!("   Emitted: {}", summary.emitted_records);
    println!("   Skipped: {}", summary.skipped_records);
    println!("   Errors: {}", summary.failed_records);
    if summary.geocoder_calls > 0 {
        println!("   Geocoder calls: {}", summary.geocoder_calls);
    }
}

fn geocode_mode(config: &mut Config, fake: bool) -> anyhow::Result<GeocodeMode> {
    if fake {
        config.geocoder.fake = true;
    }
    Ok(GeocodeMode::from_config(config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    let _log_guard = logging::init_logging(&config.logging);
    let json = cli.json;
    let mut errors = LogErrorStream::new();

    let result = match cli.command {
        Commands::ScrapeCommittees => {
            println!("🕷️  Scraping committee registrations...");
            tasks::scrape_committees(&config).await.map(|written| {
                println!("✅ Wrote {} committees to {}", written, config.paths.committees.display());
            })
        }
        Commands::Geocode { fake } => {
            let mode = geocode_mode(&mut config, fake)?;
            tasks::geocode_contributions(&config, mode, &mut errors)
                .await
                .map(|s| print_summary(&s, json))
        }
        Commands::Split => tasks::split_by_candidate(&config, &mut errors)
            .await
            .map(|s| print_summary(&s, json)),
        Commands::ExtractGeocache => tasks::extract_geocache(&config, &mut errors)
            .await
            .map(|s| print_summary(&s, json)),
        Commands::Run { fake } => {
            let mode = geocode_mode(&mut config, fake)?;
            tasks::run_all(&config, mode, &mut errors)
                .await
                .map(|summaries| summaries.iter().for_each(|s| print_summary(s, json)))
        }
    };

    if let Err(e) = &result {
        error!("Run failed: {}", e);
        println!("❌ Run failed: {}", e);
    }
    result?;
    Ok(())
}
