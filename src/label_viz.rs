use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;

use infraod_prep::pipeline::ALL_LABELS_FILE;
use infraod_prep::visualize::{
    class_distribution, render_bounding_boxes, render_class_histogram, render_class_samples,
    DEFAULT_SAMPLES,
};
use infraod_prep::{load_labels, PrepConfig, PrepResult};

/// Render debugging images from the saved Camel label table.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct VizArgs {
    /// Directory that every relative path in the configuration is resolved against
    #[arg(short = 'd', long = "data_root", default_value = ".")]
    data_root: String,

    /// Optional YAML file overriding the default configuration
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// Output image path
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    #[command(subcommand)]
    command: VizCommand,
}

#[derive(Subcommand, Debug)]
enum VizCommand {
    /// Bar chart of rows per class
    Histogram,
    /// One image with its bounding boxes
    Boxes {
        #[arg(long = "image_id")]
        image_id: u32,
    },
    /// A sheet of images containing one class
    Samples {
        #[arg(long = "class_id")]
        class_id: u32,
        #[arg(long = "num_samples", default_value_t = DEFAULT_SAMPLES)]
        num_samples: usize,
    },
}

fn run(args: &VizArgs) -> PrepResult<()> {
    let mut config = match &args.config {
        Some(path) => PrepConfig::from_yaml_file(std::path::Path::new(path))?,
        None => PrepConfig::default(),
    };
    config.data_root = PathBuf::from(&args.data_root);

    let table = load_labels(&config.camel_labels().join(ALL_LABELS_FILE))?;
    info!("Loaded {} label rows", table.len());

    match &args.command {
        VizCommand::Histogram => {
            let counts = class_distribution(&table);
            render_class_histogram(&counts, &args.output)
        }
        VizCommand::Boxes { image_id } => {
            render_bounding_boxes(&table, *image_id, &config.pool(), &args.output).map(|_| ())
        }
        VizCommand::Samples {
            class_id,
            num_samples,
        } => render_class_samples(&table, *class_id, &config.pool(), *num_samples, &args.output)
            .map(|_| ()),
    }
}

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = VizArgs::parse();

    if let Err(e) = run(&args) {
        error!("Visualization failed: {}", e);
        std::process::exit(1);
    }
}
