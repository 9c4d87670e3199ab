use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use cli::SegmentationBatch;
use color_eyre::eyre::{Result, eyre};
use segmentation::{
    CommandOutput, Frame, InpaintStrategy, MorphologyOperation, Neighborhood, Pipeline, PixelContour,
    SegmentationCommand, SegmentationConfig, SegmentationManager, SegmentationOutcome, Worker,
};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Worker threads for row-parallel kernels (single-threaded when omitted)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the contour of the object inside a rough outline
    Segment {
        /// Input image
        #[arg(short, long)]
        image: PathBuf,
        /// JSON file holding the rough outline as a list of {x, y} points
        #[arg(short, long)]
        rough: PathBuf,
        /// Optional TOML or JSON configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output file; `.geojson` writes GeoJSON, anything else plain JSON
        #[arg(short, long)]
        output: PathBuf,
        /// Also write the object mask as an image
        #[arg(long)]
        mask: Option<PathBuf>,
        /// Close single-pixel gaps of the object before tracing
        #[arg(long)]
        close_holes: bool,
    },
    /// Segment every object of a batch definition file
    Batch {
        /// Path to the TOML or JSON batch file
        #[arg(short, long)]
        batch: PathBuf,
    },
    /// Apply a morphology operation to a mask image
    Morph {
        #[arg(short, long)]
        mask: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// erode, dilate, open or close
        #[arg(long, default_value = "open")]
        operation: MorphologyOperation,
        /// four or eight
        #[arg(long, default_value = "eight")]
        neighborhood: Neighborhood,
        #[arg(long, default_value_t = 1)]
        iterations: u32,
        /// Mask value the operation acts on
        #[arg(long, default_value_t = 0)]
        value: u8,
    },
    /// Fill the black pixels of a mask in an image
    Inpaint {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        mask: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// scanline or frontier
        #[arg(long, default_value = "scanline")]
        strategy: InpaintStrategy,
        #[arg(long, default_value = "eight")]
        neighborhood: Neighborhood,
        #[arg(long, default_value_t = 0)]
        noise: u8,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Execute a JSON command file against an image and an optional mask
    Run {
        #[arg(short, long)]
        command: PathBuf,
        #[arg(short, long)]
        image: Option<PathBuf>,
        #[arg(short, long)]
        mask: Option<PathBuf>,
        /// Output file for the produced contour or image
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print a JSON schema
    Schema {
        #[arg(value_enum, default_value_t = SchemaKind::Commands)]
        kind: SchemaKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaKind {
    Commands,
    Config,
    Batch,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let worker = cli.threads.map(Worker::new).transpose()?;
    let worker = worker.as_ref();

    match cli.command {
        Commands::Segment {
            image,
            rough,
            config,
            output,
            mask,
            close_holes,
        } => {
            let config = match config {
                Some(path) => SegmentationConfig::from_file(path)?,
                None => SegmentationConfig::default(),
            };
            let rough: PixelContour = serde_json::from_str(&std::fs::read_to_string(&rough)?)?;
            let frame = Frame::from_dynamic_image(&image::open(&image)?);

            let mut builder = Pipeline::builder().with_config(config);
            if close_holes {
                builder = builder.with_hole_closing();
            }
            let outcome = builder.build().process(&frame, &rough, worker)?;
            report(&outcome);

            write_outcome(&outcome, &output)?;
            if let Some(mask_path) = mask {
                outcome.to_mask()?.to_gray_image().save(&mask_path)?;
                info!("Mask written to {}", mask_path.display());
            }
        }
        Commands::Batch { batch } => run_batch(&batch, worker)?,
        Commands::Morph {
            mask,
            output,
            operation,
            neighborhood,
            iterations,
            value,
        } => {
            let mut manager = manager(cli.threads)?;
            manager.load_mask(&mask)?;
            let result = manager.execute(SegmentationCommand::Morphology {
                operation,
                neighborhood,
                mask_value: value,
                iterations,
            })?;
            write_output(result, &output)?;
        }
        Commands::Inpaint {
            image,
            mask,
            output,
            strategy,
            neighborhood,
            noise,
            seed,
        } => {
            let mut manager = SegmentationManager::new(SegmentationConfig {
                seed,
                ..Default::default()
            });
            manager.load_image(&image)?;
            manager.load_mask(&mask)?;
            let result = manager.execute(SegmentationCommand::Inpaint {
                strategy,
                neighborhood,
                noise,
            })?;
            write_output(result, &output)?;
        }
        Commands::Run {
            command,
            image,
            mask,
            output,
        } => {
            let command: SegmentationCommand = serde_json::from_str(&std::fs::read_to_string(&command)?)?;
            info!("Running '{}': {}", command, command.description());

            let mut manager = manager(cli.threads)?;
            if let Some(image) = image {
                manager.load_image(image)?;
            }
            if let Some(mask) = mask {
                manager.load_mask(mask)?;
            }
            write_output(manager.execute(command)?, &output)?;
        }
        Commands::Schema { kind } => {
            let schema = match kind {
                SchemaKind::Commands => SegmentationCommand::schema(),
                SchemaKind::Config => schemars::schema_for!(SegmentationConfig),
                SchemaKind::Batch => schemars::schema_for!(SegmentationBatch),
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

fn manager(threads: Option<usize>) -> Result<SegmentationManager> {
    let manager = SegmentationManager::default();
    Ok(match threads {
        Some(threads) => manager.with_worker(Worker::new(threads)?),
        None => manager,
    })
}

fn run_batch(path: &Path, worker: Option<&Worker>) -> Result<()> {
    let batch = SegmentationBatch::from_file(path)?;
    info!("Batch of {} objects on {}", batch.objects.len(), batch.image);

    std::fs::create_dir_all(&batch.output_dir)?;
    let frame = Frame::from_dynamic_image(&image::open(&batch.image)?);
    let pipeline = Pipeline::builder().with_config(batch.config.clone()).build();

    for object in &batch.objects {
        let outcome = pipeline.process(&frame, &object.rough, worker)?;
        if !outcome.is_available() {
            warn!(
                "No contour found for object '{}': {}",
                object.name,
                object.description.clone().unwrap_or_default()
            );
            continue;
        }
        let output = batch.output_path(object);
        outcome.save_geojson(&output)?;
        info!("Object '{}' -> {}", object.name, output.display());
    }

    info!("Batch completed");
    Ok(())
}

fn report(outcome: &SegmentationOutcome) {
    if !outcome.is_available() {
        warn!("Segmentation unavailable for this frame");
        return;
    }
    info!(
        "Contour of {} points, area {:.1}, perimeter {:.1}",
        outcome.contour.len(),
        outcome.area(),
        outcome.perimeter()
    );
}

fn write_outcome(outcome: &SegmentationOutcome, output: &Path) -> Result<()> {
    match output.extension().and_then(|ext| ext.to_str()) {
        Some("geojson") => outcome.save_geojson(output)?,
        _ => std::fs::write(output, serde_json::to_string_pretty(outcome)?)?,
    }
    info!("Contour written to {}", output.display());
    Ok(())
}

fn write_output(output: CommandOutput, path: &Path) -> Result<()> {
    match output {
        CommandOutput::Contour(outcome) => {
            report(&outcome);
            write_outcome(&outcome, path)
        }
        CommandOutput::Mask(mask) => {
            mask.to_gray_image().save(path)?;
            info!("Mask written to {}", path.display());
            Ok(())
        }
        CommandOutput::Inpainted { frame, stats } => {
            info!(
                "Inpainted {} pixels in {} passes, {} unreachable",
                stats.resolved, stats.passes, stats.remaining
            );
            match frame.channels() {
                1 => frame.to_gray_image().save(path)?,
                3 => frame.to_rgb_image().save(path)?,
                channels => return Err(eyre!("cannot save a {channels}-channel frame")),
            }
            info!("Image written to {}", path.display());
            Ok(())
        }
    }
}
