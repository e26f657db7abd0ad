use clap::Parser;

use log::{error, info};
use std::path::Path;

use infraod_prep::io::write_summary_json;
use infraod_prep::{process_datasets, Args};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    if !config.data_root.exists() {
        error!(
            "The specified data_root does not exist: {}",
            config.data_root.display()
        );
        std::process::exit(2);
    }

    info!("Starting the conversion process...");
    match process_datasets(&config, args.dataset, args.clean) {
        Ok(summaries) => {
            if let Some(path) = &args.summary_json {
                if let Err(e) = write_summary_json(Path::new(path), &summaries) {
                    error!("Failed to write summary: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!("Failed to process dataset: {}", e);
            std::process::exit(1);
        }
    }
}
