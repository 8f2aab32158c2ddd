use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;
use scrape::testing::{MemoryAppender, PROMETHEUS_CONTENT_TYPE, TextParserFactory};
use scrape::{Ingester, ScrapeCache, TargetLabelMutator};

#[derive(Parser)]
#[command(name = "scrapedb")]
#[command(about = "ScrapeDB - scrape ingestion pipeline for Prometheus and OpenMetrics payloads")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: ScrapeDbCommands,
}

#[derive(Subcommand)]
enum ScrapeDbCommands {
    /// Ingest an exposition file as repeated scrapes of one target
    Ingest {
        /// Exposition payload, re-read on every scrape
        file: PathBuf,

        #[arg(long, default_value = PROMETHEUS_CONTENT_TYPE, help = "Content type of the payload")]
        content_type: String,

        #[arg(long, default_value_t = 1, help = "Number of scrapes to run")]
        scrapes: u32,
    },
    #[command(flatten)]
    Common(CommonCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    match cli.command {
        ScrapeDbCommands::Common(command) => utils::handle_common_command(&command, &config),
        ScrapeDbCommands::Ingest {
            file,
            content_type,
            scrapes,
        } => {
            utils::validate_config(&config)?;
            ingest(&config, &file, &content_type, scrapes).await
        }
    }
}

async fn ingest(config: &Configuration, file: &Path, content_type: &str, scrapes: u32) -> Result<()> {
    let ingester = Ingester::new(
        TextParserFactory,
        TargetLabelMutator::from_config(config),
        config.scrape.clone(),
    );
    let mut cache = ScrapeCache::new();
    let mut app = MemoryAppender::new();
    let mut interval = tokio::time::interval(config.scrape.interval);

    log::info!(
        "Ingesting {} every {:?} ({} scrapes)",
        file.display(),
        config.scrape.interval,
        scrapes
    );

    for scrape in 1..=scrapes {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping after {} scrapes", scrape - 1);
                break;
            }
        }

        let payload = match tokio::time::timeout(config.scrape.timeout, tokio::fs::read(file)).await
        {
            Ok(read) => read.with_context(|| format!("Failed to read {}", file.display()))?,
            Err(_) => {
                log::warn!(
                    "Scrape {scrape} timed out after {:?}",
                    config.scrape.timeout
                );
                continue;
            }
        };

        match ingester.ingest(&mut app, &mut cache, &payload, content_type, Utc::now()) {
            Ok(()) => {}
            Err(e) if e.is_sample_limit() || e.is_bucket_limit() => {
                log::warn!("Scrape {scrape} exceeded a limit: {e}")
            }
            Err(e) => log::error!("Scrape {scrape} failed: {e}"),
        }

        let stale = app.stale_markers().count();
        log::info!(
            "Scrape {scrape}: {} samples, {} stale markers, {} histograms, {} exemplars, {} cached series, {} dropped",
            app.samples().len() - stale,
            stale,
            app.histograms().len(),
            app.exemplars().len(),
            cache.series_len(),
            cache.dropped_len(),
        );
        app.clear();
    }

    log::info!(
        "Metadata: {} families, {} bytes",
        cache.metadata_len(),
        cache.metadata_size()
    );
    let mut metadata = cache.list_metadata();
    metadata.sort_by(|a, b| a.metric.cmp(&b.metric));
    for m in metadata {
        println!("{} {} {:?} {:?}", m.metric, m.metric_type, m.unit, m.help);
    }

    Ok(())
}
