//! Command-line interface for the lab utilities.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{AlignmentMode, AnalysisConfig, DeflectionModel, PipetteRest};

#[derive(Parser)]
#[command(name = "phd-utils")]
#[command(about = "Bead-tracking analysis and TIFF housekeeping for tribology experiments", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlignmentArg {
    /// Outer join on time, then mean-resample
    Resampled,
    /// Inner join on frame number
    FrameInner,
}

impl From<AlignmentArg> for AlignmentMode {
    fn from(arg: AlignmentArg) -> Self {
        match arg {
            AlignmentArg::Resampled => AlignmentMode::Resampled,
            AlignmentArg::FrameInner => AlignmentMode::FrameInner,
        }
    }
}

#[derive(clap::Args)]
struct AnalyseArgs {
    /// Folder holding the reference, substrate and pipette CSVs
    #[arg(short, long, default_value = ".")]
    folder: PathBuf,
    /// Only use CSVs whose filenames also contain this text
    #[arg(short = 'n', long)]
    filename_contains: Option<String>,
    /// Duration of the experiment in seconds
    #[arg(short, long)]
    experiment_duration: Option<f64>,
    /// Seconds covered by each row after resampling
    #[arg(short, long)]
    resample_to: Option<f64>,
    /// How the three series are aligned
    #[arg(long, value_enum)]
    alignment: Option<AlignmentArg>,
    #[arg(short = 'x', long)]
    initial_x_displacement: Option<f64>,
    #[arg(short = 't', long)]
    substrate_tip_position: Option<f64>,
    #[arg(short = 'L', long)]
    substrate_length: Option<f64>,
    #[arg(short = 'k', long)]
    substrate_stiffness: Option<f64>,
    #[arg(short = 'j', long)]
    pipette_stiffness: Option<f64>,
    /// Pipette holder angle in radians
    #[arg(short = 'a', long)]
    angle_alpha: Option<f64>,
    /// Sliding plane angle in radians
    #[arg(short = 'b', long)]
    angle_beta: Option<f64>,
    /// Substrate sliding speed; switches to the ramped tip model
    #[arg(short, long)]
    speed: Option<f64>,
    /// Seconds the tip stays still before sliding starts (with --speed)
    #[arg(long)]
    stationary_for: Option<f64>,
    #[arg(long)]
    flexural_rigidity: Option<f64>,
    #[arg(short = 'd', long)]
    reverse_sliding_direction: bool,
    /// Pipette Y position at rest, measured separately
    #[arg(long, conflicts_with = "estimate_pipette_rest")]
    pipette_rest: Option<f64>,
    /// Estimate the pipette rest position from the mean of the opening seconds
    #[arg(long)]
    estimate_pipette_rest: bool,
    /// Output CSV path (defaults to processed[_<contains>].csv in the folder)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Also write a JSON copy of the output
    #[arg(long)]
    json: bool,
    /// Replace existing output files
    #[arg(short = 'O', long)]
    overwrite: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive deflection, normal force and friction coefficient for one experiment
    Analyse(AnalyseArgs),

    /// Move Experiment-*.tif frames into numbered subfolders
    SortImages {
        /// Folder containing Experiment-* folders
        source: PathBuf,
        /// Number of TIFFs per subfolder
        #[arg(short = 'n', long)]
        per_subfolder: Option<usize>,
        /// Preview changes without moving files
        #[arg(long)]
        dry_run: bool,
    },

    /// Combine TIFF frames into multi-page stacks with ImageMagick
    Stack {
        /// Folders to stack, searched recursively
        #[arg(required = true)]
        folders: Vec<PathBuf>,
        /// Number of frames per stack
        #[arg(short, long)]
        frames_per_stack: Option<usize>,
        /// Keep the source frames after stacking
        #[arg(long)]
        keep_originals: bool,
        /// Preview stacks without running the tool
        #[arg(long)]
        dry_run: bool,
    },

    /// Plot a processed CSV as a PNG
    Plot {
        /// Processed CSV file
        input: PathBuf,
        /// Output PNG file path (defaults to the input with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            let head: String = value.chars().take(36).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match AnalysisConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                AnalysisConfig::default()
            }
        },
        None => AnalysisConfig::default(),
    };

    // Dispatch to subcommands
    let result = match cli.command {
        Commands::Analyse(args) => cmd_analyse(args, config),
        Commands::SortImages { source, per_subfolder, dry_run } => {
            cmd_sort_images(&source, per_subfolder, dry_run, &config)
        }
        Commands::Stack { folders, frames_per_stack, keep_originals, dry_run } => {
            cmd_stack(&folders, frames_per_stack, keep_originals, dry_run, &config)
        }
        Commands::Plot { input, output } => cmd_plot(&input, output),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Fold command-line overrides into the loaded config.
fn apply_overrides(args: &AnalyseArgs, config: &mut AnalysisConfig) {
    let alignment = &mut config.alignment;
    if let Some(duration) = args.experiment_duration {
        alignment.experiment_duration_s = duration;
    }
    if let Some(width) = args.resample_to {
        alignment.resample_width_s = width;
    }
    if let Some(mode) = args.alignment {
        alignment.mode = mode.into();
    }

    let physics = &mut config.physics;
    let overrides = [
        (&mut physics.initial_x_displacement, args.initial_x_displacement),
        (&mut physics.substrate_tip_position, args.substrate_tip_position),
        (&mut physics.substrate_length, args.substrate_length),
        (&mut physics.substrate_stiffness, args.substrate_stiffness),
        (&mut physics.pipette_stiffness, args.pipette_stiffness),
        (&mut physics.angle_alpha, args.angle_alpha),
        (&mut physics.angle_beta, args.angle_beta),
        (&mut physics.flexural_rigidity, args.flexural_rigidity),
    ];
    for (field, value) in overrides {
        if value.is_some() {
            *field = value;
        }
    }

    if args.reverse_sliding_direction {
        physics.reverse_sliding_direction = true;
    }

    if let Some(velocity) = args.speed {
        let stationary_s = match (args.stationary_for, physics.deflection_model) {
            (Some(s), _) => s,
            (None, DeflectionModel::RampedTip { stationary_s, .. }) => stationary_s,
            (None, DeflectionModel::StationaryTip) => crate::config::default_stationary_s(),
        };
        physics.deflection_model = DeflectionModel::RampedTip { velocity, stationary_s };
    }

    if let Some(value) = args.pipette_rest {
        physics.pipette_rest = PipetteRest::Fixed { value };
    } else if args.estimate_pipette_rest {
        physics.pipette_rest = PipetteRest::OpeningMeanHeuristic {
            window_s: crate::config::default_rest_window(),
        };
    }
}

fn cmd_analyse(args: AnalyseArgs, mut config: AnalysisConfig) -> Result<()> {
    use crate::processors::analysis::{analyse_experiment, AnalysisRequest};

    let start = Instant::now();
    apply_overrides(&args, &mut config);

    let mut request = AnalysisRequest::new(&args.folder, config);
    request.contains = args.filename_contains;
    request.output = args.output;
    request.json = args.json;
    request.overwrite = args.overwrite;

    println!("Analysing experiment in {}", request.folder.display());

    let spinner = create_spinner("Aligning and deriving forces...");
    let result = analyse_experiment(&request);
    spinner.finish_and_clear();

    let outcome = result.context("Analysis failed")?;

    for warning in &outcome.report.degenerate {
        warn!("Degenerate friction coefficient: {}", warning);
    }

    print_summary(
        "Analysis Complete",
        &[
            ("Reference", outcome.inputs.reference.display().to_string()),
            ("Substrate", outcome.inputs.substrate.display().to_string()),
            ("Pipette", outcome.inputs.pipette.display().to_string()),
            ("Output CSV", outcome.csv_path.display().to_string()),
            (
                "Output JSON",
                outcome
                    .json_path
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
            ),
            ("Rows", outcome.rows.to_string()),
            ("Columns", outcome.columns.to_string()),
            ("Pipette rest", outcome.report.pipette_rest.to_string()),
            ("Degenerate rows", outcome.report.degenerate.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_sort_images(
    source: &Path,
    per_subfolder: Option<usize>,
    dry_run: bool,
    config: &AnalysisConfig,
) -> Result<()> {
    use crate::processors::sorting;

    let start = Instant::now();
    let per_subfolder = per_subfolder.unwrap_or(config.imaging.files_per_subfolder);

    if dry_run {
        println!("DRY RUN: No files will be moved");
    }

    let spinner = create_spinner("Sorting experiment images...");
    let result = sorting::sort_experiments(source, per_subfolder, dry_run);
    spinner.finish_and_clear();

    let sorted = result.with_context(|| format!("Sorting images in {} failed", source.display()))?;
    let total_images: usize = sorted.iter().map(|(_, moves)| moves.len()).sum();

    print_summary(
        "Image Sort Complete",
        &[
            ("Source", source.display().to_string()),
            ("Experiments", sorted.len().to_string()),
            ("Images", total_images.to_string()),
            ("Per subfolder", per_subfolder.to_string()),
            ("Dry run", dry_run.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_stack(
    folders: &[PathBuf],
    frames_per_stack: Option<usize>,
    keep_originals: bool,
    dry_run: bool,
    config: &AnalysisConfig,
) -> Result<()> {
    use crate::processors::stacking::{stack_in_folders, StackConfig};

    let start = Instant::now();

    let mut stack_config = StackConfig::from(&config.imaging);
    if let Some(n) = frames_per_stack {
        stack_config.frames_per_stack = n;
    }
    stack_config.keep_originals |= keep_originals;
    stack_config.dry_run = dry_run;

    if dry_run {
        println!("DRY RUN: No stacks will be written");
    }

    let spinner = create_spinner(&format!("Stacking with {}...", stack_config.program));
    let result = stack_in_folders(folders, &stack_config);
    spinner.finish_and_clear();

    let outputs = result.context("Stacking failed")?;
    let frames: usize = outputs.iter().map(|o| o.sources.len()).sum();

    print_summary(
        "Stacking Complete",
        &[
            ("Folders", folders.len().to_string()),
            ("Stacks", outputs.len().to_string()),
            ("Frames", frames.to_string()),
            ("Frames per stack", stack_config.frames_per_stack.to_string()),
            ("Originals kept", stack_config.keep_originals.to_string()),
            ("Dry run", dry_run.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_plot(input: &Path, output: Option<PathBuf>) -> Result<()> {
    use crate::core::loaders;
    use crate::visualization;

    let start = Instant::now();

    // Determine output path (default to same name as input with .png extension)
    let output_path = output.unwrap_or_else(|| input.with_extension("png"));

    println!("Plotting {}", input.display());

    let spinner = create_spinner("Loading CSV file...");

    let table = match loaders::load_table_csv(input) {
        Ok(t) => t,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e).with_context(|| format!("Failed to load {}", input.display()));
        }
    };

    spinner.set_message("Generating plot...");
    let result = visualization::plot_measurements(&output_path, &table);
    spinner.finish_and_clear();
    result.context("Plotting failed")?;

    print_summary(
        "Plot Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Output PNG", output_path.display().to_string()),
            ("Rows", table.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}
