use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod analyzer;
mod api;
mod config;
mod crawler;
mod error;
mod fetcher;
mod funnel;
mod models;
mod renderer;
mod report;
mod robots;
mod scorer;
mod sitemap;
mod url_policy;

use analyzer::FunnelScout;
use config::{ConfigOverrides, build_config};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a website and print the funnel report
    Analyze {
        /// Website URL or bare domain
        url: String,

        /// Also write the full result as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Print the final URL, title and screenshot of a single page as JSON
    Preview {
        /// Page URL
        url: String,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the report on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            url,
            output,
            overrides,
        } => {
            let mut config = build_config(&overrides)?;
            config.show_progress = true;
            let scout = FunnelScout::new(config)?;

            let result = scout.analyze(&url).await?;
            println!("{}", result.report);

            if let Some(output) = output {
                let output_data = serde_json::to_string_pretty(&result)?;
                std::fs::write(&output, output_data)
                    .with_context(|| format!("Failed to write results to {}", output.display()))?;
                info!("Wrote results to {}", output.display());
            }
        }
        Commands::Preview { url, overrides } => {
            let scout = FunnelScout::new(build_config(&overrides)?)?;
            let preview = scout.preview(&url).await?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        Commands::Serve { port, overrides } => {
            let scout = FunnelScout::new(build_config(&overrides)?)?;
            api::start_api_server(scout, port).await?;
        }
    }

    Ok(())
}
