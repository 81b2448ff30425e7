mod audio;
mod progress;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use specnmf_core::listener::DebugListener;
use specnmf_core::{Matrix, NmfOptions, NmfPipeline, WindowKind};

use crate::progress::CliListener;

#[derive(Parser)]
#[command(
    name = "specnmf",
    about = "Decompose audio into NMF components and resynthesize them"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log every pipeline stage and the per-iteration divergence
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Factor an audio file and save the model as JSON
    Decompose(DecomposeArgs),
    /// Rebuild one component of an audio file from a saved model
    Resynth(ResynthArgs),
}

#[derive(Args)]
struct DecomposeArgs {
    /// Input audio file (any channel count; averaged to mono)
    input: PathBuf,

    /// Model output file
    #[arg(short, long, default_value = "model.json")]
    output: PathBuf,

    /// Number of components (factorization rank)
    #[arg(short = 'k', long, default_value_t = 1)]
    components: usize,

    /// Multiplicative update passes
    #[arg(short = 'i', long, default_value_t = 100)]
    iterations: usize,

    /// FFT size (power of two)
    #[arg(long, default_value_t = 1024)]
    fft_size: usize,

    /// Analysis window length (default: FFT size)
    #[arg(long)]
    window_size: Option<usize>,

    /// Frame advance (default: half the FFT size)
    #[arg(long)]
    hop_size: Option<usize>,

    /// Initialization seed; negative draws from system entropy
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    seed: i64,

    /// Stop early once the relative divergence decrease falls below this
    #[arg(long)]
    tolerance: Option<f64>,

    /// Analysis window
    #[arg(long, default_value = "hann",
          value_parser = ["hann", "hamming", "rectangular", "rect"])]
    window: String,

    /// Also write one WAV per component into this directory
    #[arg(long)]
    components_dir: Option<PathBuf>,
}

#[derive(Args)]
struct ResynthArgs {
    /// The audio file the model was computed from
    input: PathBuf,

    /// Model file written by `decompose`
    #[arg(short, long)]
    model: PathBuf,

    /// Component index, starting at 0
    #[arg(short, long)]
    component: usize,

    /// Output WAV file (default: component_<index>.wav)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// On-disk factorization, tied to the signal it was computed from.
#[derive(Serialize, Deserialize)]
struct ModelFile {
    options: NmfOptions,
    sample_rate: u32,
    n_samples: usize,
    iterations: usize,
    converged: bool,
    bases: Matrix<f64>,
    activations: Matrix<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Decompose(args) => decompose(args, cli.debug),
        Command::Resynth(args) => resynth(args),
    }
}

fn decompose(args: DecomposeArgs, debug: bool) -> Result<()> {
    let window = WindowKind::parse(&args.window)
        .with_context(|| format!("Unknown window: {}", args.window))?;
    let options = NmfOptions {
        components: args.components,
        iterations: args.iterations,
        fft_size: args.fft_size,
        window_size: args.window_size,
        hop_size: args.hop_size,
        seed: u64::try_from(args.seed).ok(),
        window,
        tolerance: args.tolerance,
    };
    let pipeline =
        NmfPipeline::<f64>::from_options(&options).context("Invalid decomposition options")?;

    let (signal, sample_rate) = read_signal(&args.input)?;

    log::info!("Decomposing into {} component(s)...", args.components);
    let decomposition = if debug {
        pipeline.decompose_with_listener(&signal, &mut DebugListener)?
    } else {
        let mut listener = CliListener::new(args.iterations);
        pipeline.decompose_with_listener(&signal, &mut listener)?
    };
    log::info!(
        "  {} iterations, converged: {}",
        decomposition.iterations,
        decomposition.converged
    );

    if let Some(dir) = &args.components_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        let components = pipeline.resynthesize_all(
            &signal,
            &decomposition.bases,
            &decomposition.activations,
        )?;
        for (k, component) in components.iter().enumerate() {
            let path = dir.join(format!("component_{k}.wav"));
            audio::write_wav(&path, component, sample_rate)?;
            log::info!("  Wrote {}", path.display());
        }
    }

    let model = ModelFile {
        options: pipeline.config().options(),
        sample_rate,
        n_samples: signal.len(),
        iterations: decomposition.iterations,
        converged: decomposition.converged,
        bases: decomposition.bases,
        activations: decomposition.activations,
    };
    let file = std::fs::File::create(&args.output)
        .with_context(|| format!("Failed to create model file: {}", args.output.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), &model)
        .with_context(|| format!("Failed to write model file: {}", args.output.display()))?;
    log::info!("  Wrote {}", args.output.display());

    Ok(())
}

fn resynth(args: ResynthArgs) -> Result<()> {
    let file = std::fs::File::open(&args.model)
        .with_context(|| format!("Failed to open model file: {}", args.model.display()))?;
    let model: ModelFile = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse model file: {}", args.model.display()))?;

    let pipeline = NmfPipeline::<f64>::from_options(&model.options)
        .context("Model file holds invalid options")?;

    let (signal, sample_rate) = read_signal(&args.input)?;
    if signal.len() != model.n_samples {
        bail!(
            "Model was computed from {} samples but {} has {}",
            model.n_samples,
            args.input.display(),
            signal.len()
        );
    }
    if sample_rate != model.sample_rate {
        log::warn!(
            "Sample rate {} differs from the model's {}",
            sample_rate,
            model.sample_rate
        );
    }

    let output = pipeline
        .resynthesize_component(&signal, &model.bases, &model.activations, args.component)
        .with_context(|| format!("Failed to resynthesize component {}", args.component))?;

    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("component_{}.wav", args.component)));
    audio::write_wav(&path, &output, sample_rate)?;
    log::info!("  Wrote {}", path.display());
    Ok(())
}

fn read_signal(path: &Path) -> Result<(Vec<f64>, u32)> {
    log::info!("Reading {}", path.display());
    let (signal, sample_rate) = audio::read_audio(path)?;
    log::info!(
        "  {} samples, {:.1}s, {} Hz, mono",
        signal.len(),
        signal.len() as f64 / sample_rate as f64,
        sample_rate
    );
    Ok((signal, sample_rate))
}
