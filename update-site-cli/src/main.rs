//! update-site - generates signed plugin update site catalogs
//!
//! Reads every plugin and core release from an Artifactory repository,
//! resolves release histories and compatibility tiers, and writes the
//! update center documents.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use update_site_core::catalog::CatalogWriter;
use update_site_core::pipeline;
use update_site_core::tiers::TierResolver;

mod site_args;

use site_args::{OutputArgs, SiteArgs};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "update-site",
    about = "Generates signed update site catalogs from an artifact repository",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[clap(long, global = true)]
    log_json: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Resolve the repository and write the signed catalog
    Generate {
        #[clap(flatten)]
        site: SiteArgs,

        #[clap(flatten)]
        output: OutputArgs,
    },

    /// Print the compatibility tiers as JSON without writing anything
    Tiers {
        #[clap(flatten)]
        site: SiteArgs,
    },
}

fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr) // stdout is reserved for command output
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr) // stdout is reserved for command output
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.log_json);

    let result = match cli.command {
        Command::Generate { site, output } => generate_command(site, output).await,
        Command::Tiers { site } => tiers_command(site).await,
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

async fn generate_command(site: SiteArgs, output: OutputArgs) -> Result<()> {
    let mut config = site.load()?;
    output.apply(&mut config);

    let repository = pipeline::artifactory_repository(&config)?;
    let generated = pipeline::generate(&config, repository, &TierResolver::new()).await?;

    let writer = CatalogWriter::new(config.output_dir());
    let written = writer.write(&generated.update_center, &generated.tiers)?;

    info!(
        plugins = generated.update_center.plugins.len(),
        signed = generated.update_center.signature.is_some(),
        files = written.len(),
        "Update site written to {}",
        writer.dir().display()
    );
    Ok(())
}

async fn tiers_command(site: SiteArgs) -> Result<()> {
    let config = site.load()?;

    let repository = pipeline::artifactory_repository(&config)?;
    let resolved = pipeline::resolve(&config, repository, &TierResolver::new()).await?;

    println!("{}", serde_json::to_string_pretty(&resolved.tiers)?);
    Ok(())
}
