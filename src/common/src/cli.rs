use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Common subcommands that never touch a target
#[derive(Subcommand, Debug, Clone)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("ScrapeDB Configuration:");
            println!("=======================");
            println!("Sample limit: {}", limit_display(config.scrape.sample_limit));
            println!("Bucket limit: {}", limit_display(config.scrape.bucket_limit));
            println!("Honor timestamps: {}", config.scrape.honor_timestamps);
            println!("Honor labels: {}", config.scrape.honor_labels);
            println!(
                "Metadata storage: {}",
                config.scrape.enable_metadata_storage
            );
            println!("Scrape interval: {:?}", config.scrape.interval);
            println!("Scrape timeout: {:?}", config.scrape.timeout);

            for (name, value) in &config.target.labels {
                println!("Target label: {name}={value}");
            }
            if !config.target.drop_metrics.is_empty() {
                println!("Dropped metrics: {}", config.target.drop_metrics.join(", "));
            }
        }
        Ok(())
    }

    fn limit_display(limit: usize) -> String {
        if limit == 0 {
            "unlimited".to_string()
        } else {
            limit.to_string()
        }
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        config.validate()?;

        for name in config.target.labels.keys() {
            if !crate::model::labels::is_valid_label_name(name) {
                anyhow::bail!("Invalid target label name: {name}");
            }
        }

        log::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Handle common CLI commands that don't require ingesting anything
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<()> {
        match command {
            CommonCommands::Config { json } => display_config(config, *json),
            CommonCommands::Validate => validate_config(config),
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(())
            }
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
