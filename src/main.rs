use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use soymap::config::Config;
use soymap::error::PipelineError;
use soymap::logging;
use soymap::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "soymap")]
#[command(about = "County-level soybean production maps correlated with election, demographic and income data")]
#[command(version)]
struct Cli {
    /// Directory for the rendered images (overrides the config file)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load().map_err(PipelineError::from)?;
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    Ok(config)
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = logging::init_logging(config.logging.dir.as_deref());

    match Pipeline::run(&config) {
        Ok(result) => {
            info!("Rendered {} images for {} counties", result.images.len(), result.counties);
            for source in &result.matches {
                info!(
                    "{}: {} of {} counties matched ({} source rows)",
                    source.dataset, source.matched, result.counties, source.rows
                );
            }
            for image in &result.images {
                println!("{}", image.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(stage = %e.stage(), "{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
