//! wsi-hed - inspect and render the RGB and stain-mask pyramids of a slide.

use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_hed::{
    config::{Cli, Command, ReaderConfig, RenderArgs, SlideArgs},
    plugin::{LayerOptions, SvsHedReader},
    slide::{DeepZoomGenerator, SlideReader, SlideSource, WholeSlide},
    tile::{tile_to_image, MASK_POSITIVE},
    Executor, PyramidAssembler,
};

type CliResult = Result<(), Box<dyn Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let args = cli.command.slide_args();
    init_logging(args.verbose);

    let config = args.reader_config();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Command::Inspect(args) => run_inspect(args, config).await,
        Command::Render(args) => run_render(args, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_hed=debug"
    } else {
        "wsi_hed=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(args: &SlideArgs, config: ReaderConfig) -> CliResult {
    let slide = WholeSlide::open(&args.path, &config).await?;

    println!("Slide: {}", args.path.display());
    let metadata = slide.slide().metadata();
    if let Some(mpp) = metadata.mpp {
        println!("  MPP: {mpp}");
    }
    if let Some(mag) = metadata.magnification {
        println!("  Magnification: {mag}x");
    }
    for level in 0..slide.slide().level_count() {
        if let Some(info) = slide.slide().level_info(level) {
            println!(
                "  slide level {level}: {}x{} px, {}x{} tiles, downsample {:.3}",
                info.width, info.height, info.tiles_x, info.tiles_y, info.downsample
            );
        }
    }

    let deepzoom = DeepZoomGenerator::new(
        Arc::new(slide),
        config.tile_size,
        config.overlap,
        config.limit_bounds,
    )?;

    println!();
    println!("Deep Zoom levels (tile size {}):", deepzoom.tile_size());
    for level in 0..deepzoom.level_count() {
        let (width, height) = deepzoom.level_dimensions(level).unwrap_or_default();
        let (tiles_x, tiles_y) = deepzoom.level_tiles(level).unwrap_or_default();
        let status = if tiles_x > 1 && tiles_y > 1 {
            "included"
        } else {
            "skipped"
        };
        println!("  {level:>3}: {width}x{height} px, {tiles_x}x{tiles_y} tiles, {status}");
    }

    let executor =
        Executor::with_cache_capacity(config.concurrency, config.result_cache_bytes);
    let source: Arc<dyn SlideSource> = Arc::new(deepzoom);
    let pyramids = PyramidAssembler::new(source, &config)
        .assemble(&executor)
        .await?;

    println!();
    println!("Output pyramids ({:?}):", config.level_order);
    for (index, (array, level)) in pyramids.raw.iter().zip(&pyramids.levels).enumerate() {
        let [w, h, c] = array.shape();
        let (bx, by) = array.num_blocks();
        println!("  [{index}] level {level}: {w}x{h}x{c}, {bx}x{by} blocks");
    }

    println!();
    let options = serde_json::json!({
        "raw": LayerOptions::raw(),
        "mask": LayerOptions::mask(),
    });
    println!("{}", serde_json::to_string_pretty(&options)?);

    Ok(())
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(args: &RenderArgs, config: ReaderConfig) -> CliResult {
    let reader = SvsHedReader::new(config);
    let layers = reader.read(&args.slide.path).await?;

    let count = layers[0].data.len();
    let Some(index) = args.level_index(count) else {
        return Err(match args.index {
            Some(index) => format!("index {index} out of range: the pyramids have {count} levels"),
            None => "the slide has no level more than one tile wide and tall".to_string(),
        }
        .into());
    };
    let (raw, mask) = (&layers[0].data[index], &layers[1].data[index]);

    let [width, height, _] = raw.shape();
    let (x, y) = match args.region {
        Some(r) => (r.x..r.x + r.width, r.y..r.y + r.height),
        None => (0..width, 0..height),
    };
    info!(index, ?x, ?y, "Computing region");

    let executor = reader.executor();
    let raw_pixels = raw.compute_region(x.clone(), y.clone(), executor).await?;
    let mask_pixels = mask.compute_region(x, y, executor).await?;

    let positive = mask_pixels
        .slice(ndarray::s![.., .., 0])
        .iter()
        .filter(|&&v| v == MASK_POSITIVE)
        .count();
    let total = mask_pixels.len() / 3;
    info!(
        positive,
        total,
        fraction = positive as f64 / total.max(1) as f64,
        operations = executor.ops_run(),
        "Mask computed"
    );

    std::fs::create_dir_all(&args.output)?;
    save_png(&tile_to_image(&raw_pixels)?, &args.output.join("raw.png"))?;
    save_png(&tile_to_image(&mask_pixels)?, &args.output.join("mask.png"))?;
    info!(output = %args.output.display(), "Wrote raw.png and mask.png");

    Ok(())
}

fn save_png(image: &image::RgbImage, path: &Path) -> CliResult {
    image.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}
