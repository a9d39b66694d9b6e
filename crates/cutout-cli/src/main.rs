//! cutout: command-line front end for the matte pipeline and layer stack.
//!
//! Reads images and layer documents from disk, runs them through
//! `cutout-pipeline` or `cutout-layers`, and writes the result back.
//! Useful for:
//!
//! - Keying flat backdrops out of product shots
//! - Compositing a segmentation mask exported by a model
//! - Cleaning the fringe of an existing cutout
//! - Repairing the stacking order of a layer document
//!
//! # Usage
//!
//! ```text
//! cutout key photo.jpg -o photo-cutout.png
//! cutout mask photo.jpg --mask labels.png --feather 4 -o cutout.png
//! cutout refine cutout.png -o cutout-clean.png
//! cutout layers scene.json --z-index
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cutout_layers::LayerStack;
use cutout_pipeline::{
    CategoryMask, CutoutConfig, KeyerConfig, MaskConfig, MaskMode, MatteSource, RefineConfig,
};
use tracing_subscriber::EnvFilter;

/// Background keying, mask compositing, edge refinement and layer sorting.
#[derive(Parser)]
#[command(name = "cutout", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all individual pipeline parameter flags are ignored.
    /// The JSON must be a valid `CutoutConfig` serialization; missing
    /// sections take their defaults.
    #[arg(long, global = true, conflicts_with = "config")]
    config_json: Option<String>,

    /// Read the pipeline config from a JSON file instead.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Key out a flat background sampled from the image corners.
    Key {
        #[command(flatten)]
        io: ImageIo,

        /// Euclidean RGB distance below which a pixel is keyed.
        #[arg(long, default_value_t = KeyerConfig::DEFAULT_TOLERANCE)]
        tolerance: f64,

        /// Side length of each corner sample square.
        #[arg(long, default_value_t = KeyerConfig::DEFAULT_SAMPLE_SIZE)]
        sample_size: u32,

        /// Skip edge refinement.
        #[arg(long)]
        no_refine: bool,

        #[command(flatten)]
        refine: RefineArgs,
    },

    /// Composite a category mask (label 0 = object) onto the image.
    Mask {
        #[command(flatten)]
        io: ImageIo,

        /// Grayscale PNG whose luma values are category labels.
        #[arg(long)]
        mask: PathBuf,

        /// Dilation passes applied to the object region.
        #[arg(long, default_value_t = 0)]
        dilate: u32,

        /// Feather radius in mask cells.
        #[arg(long)]
        feather: Option<u32>,

        /// Keep the object or erase it.
        #[arg(long, value_enum, default_value_t = Mode::Keep)]
        mode: Mode,

        /// Skip edge refinement.
        #[arg(long)]
        no_refine: bool,

        #[command(flatten)]
        refine: RefineArgs,
    },

    /// Clean the edges of an image that already has an alpha channel.
    Refine {
        #[command(flatten)]
        io: ImageIo,

        #[command(flatten)]
        refine: RefineArgs,
    },

    /// Resort a JSON layer document into band order.
    Layers {
        /// JSON array of layer objects.
        document: PathBuf,

        /// Write the sorted document here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the derived z-index of every layer instead.
        #[arg(long)]
        z_index: bool,
    },
}

#[derive(Args)]
struct ImageIo {
    /// Input image (PNG, JPEG, BMP, WebP).
    input: PathBuf,

    /// Output PNG path.
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args)]
struct RefineArgs {
    /// Alpha threshold for edge detection and clearing.
    #[arg(long, default_value_t = RefineConfig::DEFAULT_THRESHOLD)]
    threshold: u8,

    /// Smoothing radius for translucent pixels.
    #[arg(long, default_value_t = RefineConfig::DEFAULT_SMOOTH_RADIUS)]
    smooth_radius: u32,

    /// Color tolerance for fringe recoloring.
    #[arg(long, default_value_t = RefineConfig::DEFAULT_COLOR_TOLERANCE)]
    color_tolerance: u32,

    /// Feather width in pixels (0 disables).
    #[arg(long, default_value_t = RefineConfig::DEFAULT_FEATHER_WIDTH)]
    feather_width: u32,
}

impl RefineArgs {
    const fn config(&self) -> RefineConfig {
        RefineConfig {
            threshold: self.threshold,
            smooth_radius: self.smooth_radius,
            color_tolerance: self.color_tolerance,
            feather_width: self.feather_width,
        }
    }
}

/// Mask compositing mode.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Keep the object, drop the background.
    Keep,
    /// Erase the object, keep the background.
    Erase,
}

/// Load the config from `--config-json` / `--config`, if either is given.
fn config_override(cli: &Cli) -> Result<Option<CutoutConfig>> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json)
            .map(Some)
            .context("parsing --config-json");
    }
    if let Some(ref path) = cli.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        return serde_json::from_str(&text)
            .map(Some)
            .with_context(|| format!("parsing config {}", path.display()));
    }
    Ok(None)
}

/// Build a [`CutoutConfig`] from the subcommand flags.
fn config_from_flags(command: &Command) -> CutoutConfig {
    let mut config = CutoutConfig::default();
    match command {
        Command::Key {
            tolerance,
            sample_size,
            no_refine,
            refine,
            ..
        } => {
            config.keyer = KeyerConfig {
                tolerance: *tolerance,
                sample_size: *sample_size,
            };
            config.refine = refine.config();
            config.refine_edges = !no_refine;
        }
        Command::Mask {
            dilate,
            feather,
            mode,
            no_refine,
            refine,
            ..
        } => {
            config.mask = MaskConfig {
                dilation: *dilate,
                feather: *feather,
                mode: match mode {
                    Mode::Keep => MaskMode::KeepObject,
                    Mode::Erase => MaskMode::EraseObject,
                },
            };
            config.refine = refine.config();
            config.refine_edges = !no_refine;
        }
        Command::Refine { refine, .. } => {
            config.refine = refine.config();
            config.refine_edges = true;
        }
        Command::Layers { .. } => {}
    }
    config
}

fn read_mask(path: &Path) -> Result<CategoryMask> {
    let gray = image::open(path)
        .with_context(|| format!("opening mask {}", path.display()))?
        .to_luma8();
    CategoryMask::from_gray(&gray).with_context(|| format!("invalid mask {}", path.display()))
}

fn run_image(io: &ImageIo, source: MatteSource<'_>, config: &CutoutConfig) -> Result<()> {
    let bytes =
        std::fs::read(&io.input).with_context(|| format!("reading {}", io.input.display()))?;
    tracing::info!(input = %io.input.display(), bytes = bytes.len(), "loaded image");

    let cutout = cutout_pipeline::process(&bytes, source, config)
        .with_context(|| format!("processing {}", io.input.display()))?;
    let png = cutout_pipeline::decode::encode_png(&cutout)?;
    std::fs::write(&io.output, &png)
        .with_context(|| format!("writing {}", io.output.display()))?;

    eprintln!(
        "Wrote {} ({}x{}, {} bytes)",
        io.output.display(),
        cutout.width(),
        cutout.height(),
        png.len(),
    );
    Ok(())
}

fn run_layers(document: &Path, output: Option<&Path>, z_index: bool) -> Result<()> {
    let text = std::fs::read_to_string(document)
        .with_context(|| format!("reading {}", document.display()))?;
    let mut stack: LayerStack = serde_json::from_str(&text)
        .with_context(|| format!("parsing layer document {}", document.display()))?;

    if !stack.is_sorted() {
        tracing::info!(layers = stack.len(), "document out of band order, resorting");
    }
    stack.resort_all();

    if z_index {
        if let Some(frame) = stack.frame() {
            println!("{:<24} {:>6}", frame.id, "frame");
        }
        for (id, z) in stack.z_indices() {
            println!("{id:<24} {z:>6}");
        }
        return Ok(());
    }

    let json = serde_json::to_string_pretty(&stack)?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let config = match config_override(cli)? {
        Some(config) => config,
        None => config_from_flags(&cli.command),
    };
    tracing::debug!(?config, "resolved config");

    match &cli.command {
        Command::Key { io, .. } => run_image(io, MatteSource::Keyed, &config),
        Command::Mask { io, mask, .. } => {
            let mask = read_mask(mask)?;
            run_image(io, MatteSource::Mask(&mask), &config)
        }
        Command::Refine { io, .. } => {
            let config = CutoutConfig {
                refine_edges: true,
                ..config
            };
            run_image(io, MatteSource::Existing, &config)
        }
        Command::Layers {
            document,
            output,
            z_index,
        } => run_layers(document, output.as_deref(), *z_index),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn mask_flags_build_config() {
        let cli = Cli::try_parse_from([
            "cutout", "mask", "in.png", "-o", "out.png", "--mask", "m.png", "--dilate", "2",
            "--feather", "5", "--mode", "erase", "--no-refine",
        ])
        .unwrap();
        let config = config_from_flags(&cli.command);
        assert_eq!(config.mask.dilation, 2);
        assert_eq!(config.mask.feather, Some(5));
        assert_eq!(config.mask.mode, MaskMode::EraseObject);
        assert!(!config.refine_edges);
        assert_eq!(config.keyer, KeyerConfig::default());
    }

    #[test]
    fn key_defaults_match_pipeline_defaults() {
        let cli = Cli::try_parse_from(["cutout", "key", "in.png", "-o", "out.png"]).unwrap();
        assert_eq!(config_from_flags(&cli.command), CutoutConfig::default());
    }

    #[test]
    fn refine_subcommand_always_refines() {
        let rejected = Cli::try_parse_from([
            "cutout", "refine", "in.png", "-o", "out.png", "--no-refine",
        ]);
        assert!(rejected.is_err(), "--no-refine makes no sense for refine");

        let cli = Cli::try_parse_from([
            "cutout", "refine", "in.png", "-o", "out.png", "--feather-width", "5",
        ])
        .unwrap();
        let config = config_from_flags(&cli.command);
        assert!(config.refine_edges);
        assert_eq!(config.refine.feather_width, 5);
    }

    #[test]
    fn config_json_replaces_flags() {
        let cli = Cli::try_parse_from([
            "cutout",
            "--config-json",
            r#"{"keyer": {"tolerance": 12.5}, "refine_edges": false}"#,
            "key",
            "in.png",
            "-o",
            "out.png",
            "--tolerance",
            "99",
        ])
        .unwrap();
        let config = config_override(&cli).unwrap().unwrap();
        assert!((config.keyer.tolerance - 12.5).abs() < f64::EPSILON);
        assert_eq!(config.keyer.sample_size, KeyerConfig::DEFAULT_SAMPLE_SIZE);
        assert!(!config.refine_edges);
    }

    #[test]
    fn invalid_config_json_is_an_error() {
        let cli = Cli::try_parse_from([
            "cutout", "--config-json", "{not json", "refine", "in.png", "-o", "out.png",
        ])
        .unwrap();
        assert!(config_override(&cli).is_err());
    }
}
