// Import the clap Parser derive macro for CLI argument parsing
use clap::{ArgAction, Parser};

use anyhow::{bail, Context, Result};

// Import our library types
use primitive_art::{
    average_color, export, Alpha, Color, CommittedShape, Model, ModelParams, ShapeKind,
};

use image::imageops::FilterType;
use image::DynamicImage;

// Import indicatif for progress bars
use indicatif::{ProgressBar, ProgressStyle};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use std::fs;
use std::path::{Path, PathBuf};

/// Primitive Art - Recreate images with geometric shapes
///
/// Shapes are added one at a time. For each one, parallel workers hill-climb over shape
/// positions and sizes and keep whichever placement lowers the error against the target most.
#[derive(Parser)]
#[command(name = "primitive-art")]
#[command(about = "Approximate images with geometric primitives", long_about = None)]
#[command(version)]
struct Args {
    /// Path to target image (PNG, JPEG, etc.)
    #[arg(short, long)]
    input: PathBuf,

    /// Output file; repeat for several. The extension picks the format:
    /// .png, .jpg, .svg or .json
    #[arg(short, long, required = true)]
    output: Vec<PathBuf>,

    /// Number of shapes to add
    #[arg(short = 'n', long, default_value_t = 100)]
    shapes: usize,

    /// Shape kinds, comma separated, or "any"
    ///
    /// triangle, rectangle, rotated-rectangle, ellipse, circle, rotated-ellipse
    #[arg(short, long, default_value = "triangle")]
    mode: String,

    /// Shape alpha (1-255); 0 lets the search pick alpha per shape
    #[arg(short, long, default_value_t = 128)]
    alpha: u8,

    /// Parallel searchers per round (default: one per thread)
    ///
    /// Results are reproducible for a fixed seed and worker count.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Random restarts per worker per round
    #[arg(long, default_value_t = 16)]
    trials: usize,

    /// Hill-climbing iterations per restart
    #[arg(long, default_value_t = 100)]
    iterations: usize,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Stop early once the score drops below this value (0.0-1.0)
    #[arg(long)]
    threshold: Option<f64>,

    /// Shrink the target so its longer side is at most this many pixels before fitting
    ///
    /// Smaller is much faster. 0 keeps the original size.
    #[arg(short, long, default_value_t = 256)]
    resize: u32,

    /// Longer side, in pixels, of raster outputs (0 = same as the fitted image)
    #[arg(short = 's', long, default_value_t = 1024)]
    output_size: u32,

    /// Number of threads for parallel processing
    ///
    /// Limits Rayon's thread pool size. By default, uses all available CPU cores.
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Output formats, chosen by file extension
#[derive(Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
    Png,
    Jpeg,
    Svg,
    Json,
}

impl OutputFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "svg" => Ok(OutputFormat::Svg),
            "json" => Ok(OutputFormat::Json),
            _ => bail!(
                "unsupported output format for {} (use .png, .jpg, .svg or .json)",
                path.display()
            ),
        }
    }
}

/// Everything needed to redraw the result, written for `.json` outputs
#[derive(Serialize)]
struct Saved<'a> {
    width: u32,
    height: u32,
    background: Color,
    score: f64,
    params: &'a ModelParams,
    shapes: &'a [CommittedShape],
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse `--mode`: "any" or a comma-separated list of kinds
fn parse_kinds(mode: &str) -> Result<Vec<ShapeKind>> {
    if mode.trim().eq_ignore_ascii_case("any") {
        return Ok(ShapeKind::ALL.to_vec());
    }
    let mut kinds = Vec::new();
    for part in mode.split(',').filter(|p| !p.trim().is_empty()) {
        let kind: ShapeKind = part.parse().map_err(anyhow::Error::msg)?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

fn run(args: Args) -> Result<()> {
    // Step 0: Configure Rayon thread pool if thread limit is specified
    if let Some(num_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .context("failed to configure thread pool")?;
        println!("Using {} thread(s) for parallel processing", num_threads);
    }

    // Check outputs before spending time on the fit
    let outputs = args
        .output
        .iter()
        .map(|path| Ok((path.as_path(), OutputFormat::from_path(path)?)))
        .collect::<Result<Vec<_>>>()?;

    let kinds = parse_kinds(&args.mode)?;

    // Step 1: Load target image
    println!("Loading target image: {}", args.input.display());
    let img = image::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let img = if args.resize > 0 && img.width().max(img.height()) > args.resize {
        img.resize(args.resize, args.resize, FilterType::Triangle)
    } else {
        img
    };
    let target = img.to_rgba8();
    let (width, height) = target.dimensions();
    println!("Fitting at {}x{}", width, height);

    // Step 2: Build the model on the average color
    let background = average_color(&target);
    let mut params = ModelParams {
        shape_count: args.shapes,
        shape_kinds: kinds,
        alpha: if args.alpha == 0 {
            Alpha::Random
        } else {
            Alpha::Fixed(args.alpha)
        },
        trials_per_worker: args.trials,
        iterations_per_trial: args.iterations,
        rng_seed: args.seed,
        score_threshold: args.threshold,
        ..ModelParams::default()
    };
    if let Some(workers) = args.workers {
        params.worker_count = workers;
    }

    println!("  Shapes: {}", params.shape_count);
    println!(
        "  Kinds: {}",
        params
            .shape_kinds
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Workers: {}", params.worker_count);

    let mut model = Model::with_background(target, background, params)?;

    // Step 3: Fit, with a progress bar
    let pb = ProgressBar::new(model.params().shape_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} (ETA: {eta}) | {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message(format!("score {:.6}", model.score()));

    model.run_with(|count, committed| {
        pb.set_position(count as u64);
        pb.set_message(format!("score {:.6}", committed.score));
    });
    pb.finish_with_message(format!("score {:.6}", model.score()));

    // Step 4: Write every requested output
    let scale = if args.output_size == 0 {
        1.0
    } else {
        args.output_size as f64 / width.max(height) as f64
    };
    for (path, format) in outputs {
        save(&model, background, path, format, scale)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    println!("\nResults:");
    println!("  Shapes committed: {}", model.shapes().len());
    println!("  Final score: {:.6}", model.score());
    println!("  Evaluations: {}", model.evaluations());

    Ok(())
}

fn save(
    model: &Model,
    background: Color,
    path: &Path,
    format: OutputFormat,
    scale: f64,
) -> Result<()> {
    let (width, height) = model.canvas().dimensions();
    match format {
        OutputFormat::Png => {
            export::render(width, height, background, model.shapes(), scale).save(path)?;
        }
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let img = export::render(width, height, background, model.shapes(), scale);
            DynamicImage::ImageRgba8(img).to_rgb8().save(path)?;
        }
        OutputFormat::Svg => {
            fs::write(
                path,
                export::svg(width, height, background, model.shapes(), scale),
            )?;
        }
        OutputFormat::Json => {
            let saved = Saved {
                width,
                height,
                background,
                score: model.score(),
                params: model.params(),
                shapes: model.shapes(),
            };
            fs::write(path, serde_json::to_string_pretty(&saved)?)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(parse_kinds("any").unwrap(), ShapeKind::ALL.to_vec());
        assert_eq!(
            parse_kinds("circle, ellipse,circle").unwrap(),
            vec![ShapeKind::Circle, ShapeKind::Ellipse]
        );
        assert!(parse_kinds("triangle,star").is_err());
    }

    #[test]
    fn test_output_format_from_extension() {
        assert_eq!(
            OutputFormat::from_path(Path::new("out.PNG")).unwrap(),
            OutputFormat::Png
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("a/b.jpeg")).unwrap(),
            OutputFormat::Jpeg
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("x.svg")).unwrap(),
            OutputFormat::Svg
        );
        assert!(OutputFormat::from_path(Path::new("x.gif")).is_err());
        assert!(OutputFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "primitive-art",
            "-i",
            "in.png",
            "-o",
            "a.png",
            "-o",
            "a.svg",
            "-n",
            "50",
            "-a",
            "0",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.output.len(), 2);
        assert_eq!(args.shapes, 50);
        assert_eq!(args.alpha, 0);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.mode, "triangle");
    }
}
