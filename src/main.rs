use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use scheme_report::application::TimeWindow;
use scheme_report::config::Settings;
use scheme_report::infrastructure::log_messages::application;
use scheme_report::Application;

/// Compare congestion-control and ABR schemes by video quality and stalls
///
/// Both commands read `video_acked` and `client_buffer` from InfluxDB over
/// `[--from, --to)` and map each session's experiment id to its scheme.
///
/// Example usage:
///   scheme_report scatter settings.yml --from 2019-01-26T11:00:00Z --to 2019-01-27T11:00:00Z -o ssim_rebuf.svg
///   scheme_report cdf settings.yml --from 2019-01-26T11:00:00Z --to 2019-01-27T11:00:00Z --expt expt.json
#[derive(Parser)]
#[command(name = "scheme_report")]
#[command(version, about = "SSIM and rebuffering per congestion-control/ABR scheme", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scatter plot of average SSIM against rebuffer rate per (abr, cc) scheme
    Scatter {
        #[command(flatten)]
        common: CommonArgs,

        /// Output SVG file
        #[arg(short = 'o', long, required = true)]
        output: PathBuf,
    },

    /// CDFs of chunk SSIM, SSIM variation and session rebuffer rate per cc
    Cdf {
        #[command(flatten)]
        common: CommonArgs,

        /// Directory the three SVG files are written to
        #[arg(short = 'd', long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[derive(clap::Args)]
struct CommonArgs {
    /// YAML settings file with Postgres and InfluxDB connections
    settings: PathBuf,

    /// Start of the queried range (RFC 3339, inclusive)
    #[arg(long = "from", value_name = "TIME")]
    from: String,

    /// End of the queried range (RFC 3339, exclusive)
    #[arg(long = "to", value_name = "TIME")]
    to: String,

    /// JSON file of preloaded experiment configs; skips Postgres
    #[arg(long, value_name = "FILE")]
    expt: Option<PathBuf>,
}

impl CommonArgs {
    fn load(&self) -> Result<(Settings, TimeWindow)> {
        let settings = Settings::load(&self.settings)
            .with_context(|| format!("loading settings from {}", self.settings.display()))?;
        let range = TimeWindow::parse(&self.from, &self.to)?;
        Ok((settings, range))
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn start(common: &CommonArgs) -> Result<(Application, TimeWindow)> {
    let (settings, range) = common.load()?;
    init_tracing(&settings.logging.level);
    info!(range = %range, "{}", application::STARTING);

    let app = Application::new(settings, common.expt.as_deref()).await?;
    Ok((app, range))
}

async fn scatter(common: &CommonArgs, output: &Path) -> Result<()> {
    let (mut app, range) = start(common).await?;
    let rows = app.scatter(range, output).await?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn cdf(common: &CommonArgs, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let (mut app, range) = start(common).await?;
    for path in app.cdf(range, output_dir).await? {
        println!("{}", path.display());
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Scatter { common, output } => scatter(common, output).await,
        Commands::Cdf { common, output_dir } => cdf(common, output_dir).await,
    }
}
