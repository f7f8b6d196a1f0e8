//! rgap Command Line Interface
//!
//! Assembles GAP kernels, fits models and makes predictions from
//! representation vectors stored as JSON and structures stored as extended
//! XYZ.

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info, warn};
use rgap::core::{
    BaselineTable, GapError, KernelConfig, Regularizer, RepresentationSet, Result, SparsePoints,
};
use rgap::persistence::SerializableModel;
use rgap::sink::{
    read_json, read_kernel_config, read_matrix, DirectorySink, ENERGY_KERNEL, GRADIENT_KERNEL,
    SPARSE_KERNEL,
};
use rgap::{compute_kernels, AssemblyOptions, ExtXyzReader, FitProblem, GapModel};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "rgap")]
#[command(about = "Sparse kernel-ridge fitting of Gaussian Approximation Potentials")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "rgap contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the kernel matrices needed for a fit
    Kernels(KernelsArgs),
    /// Fit a model from precomputed kernels
    Fit(FitArgs),
    /// Predict energies (and forces) with a fitted model
    Predict(PredictArgs),
    /// Display model information
    Info(InfoArgs),
}

#[derive(Args)]
struct KernelsArgs {
    /// Representation of the training structures (JSON)
    #[arg(long)]
    features: PathBuf,

    /// Sparse points (JSON)
    #[arg(long)]
    sparse_points: PathBuf,

    /// Directory receiving K_MM, K_NM_E and K_NM_F
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Kernel exponent
    #[arg(short = 'z', long, default_value = "2")]
    exponent: u32,

    /// Do not compute the gradient kernel
    #[arg(long)]
    no_gradients: bool,

    /// Do not compute the sparse-sparse kernel
    #[arg(long)]
    skip_sparse_kernel: bool,
}

#[derive(Args)]
struct FitArgs {
    /// Training structures with energies (extended XYZ)
    #[arg(long)]
    structures: PathBuf,

    /// Directory holding the kernels written by `kernels`
    #[arg(short, long)]
    kernels: PathBuf,

    /// Sparse points the kernels were computed with (JSON)
    #[arg(long)]
    sparse_points: PathBuf,

    /// Energy regularizer per sqrt(atom)
    #[arg(short, long)]
    energy_regularizer: f64,

    /// Force regularizer; enables force fitting
    #[arg(short, long)]
    force_regularizer: Option<f64>,

    /// Per-species energy baseline (JSON object of atomic number to energy)
    #[arg(short, long)]
    baseline: Option<PathBuf>,

    /// Relative singular value cutoff of the solve
    #[arg(long)]
    rcond: Option<f64>,

    /// Kernel exponent; defaults to the one recorded by `kernels`
    #[arg(short = 'z', long)]
    exponent: Option<u32>,

    /// Key of the total energy in the XYZ comment line
    #[arg(long, default_value = "energy")]
    energy_key: String,

    /// Output model file
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args)]
struct PredictArgs {
    /// Fitted model file
    #[arg(short, long)]
    model: PathBuf,

    /// Structures to predict (extended XYZ)
    #[arg(long)]
    structures: PathBuf,

    /// Representation of the structures (JSON)
    #[arg(long)]
    features: PathBuf,

    /// Output predictions file (optional, prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct InfoArgs {
    /// Model file
    model: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Kernels(args) => kernels_command(args),
        Commands::Fit(args) => fit_command(args),
        Commands::Predict(args) => predict_command(args),
        Commands::Info(args) => info_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn kernels_command(args: KernelsArgs) -> Result<()> {
    info!("Loading representation from: {:?}", args.features);
    let set: RepresentationSet = read_json(&args.features)?;
    set.validate()?;
    let sparse_points: SparsePoints = read_json(&args.sparse_points)?;
    sparse_points.validate()?;

    let mut do_gradients = !args.no_gradients;
    if do_gradients && !set.has_gradients() {
        warn!("Representation has no gradients; skipping the gradient kernel");
        do_gradients = false;
    }
    let options = AssemblyOptions {
        compute_sparse_kernel: !args.skip_sparse_kernel,
        do_gradients,
    };

    let config = KernelConfig::with_exponent(args.exponent);
    let mut sink = DirectorySink::new(&args.output_dir)?;
    let kernels = compute_kernels(config, &set, &sparse_points, options, &mut sink)?;
    sink.write_kernel_config(&config)?;

    info!(
        "Kernels written to {:?}: energy {:?}{}",
        args.output_dir,
        kernels.energy.dim(),
        match &kernels.gradient {
            Some(gradient) => format!(", gradient {:?}", gradient.dim()),
            None => String::new(),
        }
    );
    Ok(())
}

fn fit_command(args: FitArgs) -> Result<()> {
    let training = ExtXyzReader::new()
        .with_energy_key(args.energy_key.as_str())
        .read_file(&args.structures)?;
    info!("Loaded {} structures", training.len());

    let sparse_points: SparsePoints = read_json(&args.sparse_points)?;
    sparse_points.validate()?;
    let baseline = match &args.baseline {
        Some(path) => read_json(path)?,
        None => BaselineTable::new(),
    };

    let kernel = fit_kernel_config(&args)?;
    let k_mm = read_matrix(&args.kernels, SPARSE_KERNEL)?;
    let k_nm_energy = read_matrix(&args.kernels, ENERGY_KERNEL)?;
    if k_nm_energy.ncols() != sparse_points.len() {
        return Err(GapError::InvalidParameter(format!(
            "kernels in {:?} were computed for {} sparse points, but {:?} holds {}",
            args.kernels,
            k_nm_energy.ncols(),
            args.sparse_points,
            sparse_points.len()
        )));
    }

    let (forces, k_nm_gradient) = match args.force_regularizer {
        Some(_) => {
            let forces = training.stacked_forces()?.ok_or_else(|| {
                GapError::MissingForceInput(format!("forces in {:?}", args.structures))
            })?;
            (Some(forces), Some(read_matrix(&args.kernels, GRADIENT_KERNEL)?))
        }
        None => (None, None),
    };

    let mut problem = FitProblem::new(
        training.structures(),
        k_mm.view(),
        training.energies().view(),
        k_nm_energy.view(),
        args.energy_regularizer,
    )
    .with_baseline(&baseline);
    if let (Some(forces), Some(k_nm_gradient), Some(force_regularizer)) =
        (&forces, &k_nm_gradient, args.force_regularizer)
    {
        problem = problem
            .with_forces(forces.view())
            .with_gradient_kernel(k_nm_gradient.view())
            .with_force_regularizer(force_regularizer);
    }
    if let Some(rcond) = args.rcond {
        problem = problem.with_rcond(rcond);
    }
    let weights = problem.fit()?;
    info!("Fit completed successfully");

    let mut regularizer = Regularizer::new(args.energy_regularizer);
    if let Some(force) = args.force_regularizer {
        regularizer = regularizer.with_force(force);
    }
    let model = GapModel::new(
        kernel,
        sparse_points,
        weights,
        baseline,
        regularizer,
    )?;

    let training_energies = training.energies();
    let predicted = &k_nm_energy.dot(model.weights())
        + &rgap::energy_baselines(training.structures(), model.baseline());
    let rmse = (predicted - training_energies).mapv(|d| d * d).mean().unwrap_or(0.0).sqrt();
    info!("Training energy RMSE: {rmse:.6}");

    SerializableModel::from_model(&model).save_to_file(&args.output)?;
    info!("Model saved to: {:?}", args.output);
    Ok(())
}

/// The kernel recorded with the kernels wins; `--exponent` may only confirm it
fn fit_kernel_config(args: &FitArgs) -> Result<KernelConfig> {
    match (read_kernel_config(&args.kernels)?, args.exponent) {
        (Some(recorded), Some(exponent)) if recorded.exponent != exponent => {
            Err(GapError::InvalidParameter(format!(
                "kernels in {:?} were computed with exponent {}, but --exponent is {}",
                args.kernels, recorded.exponent, exponent
            )))
        }
        (Some(recorded), _) => Ok(recorded),
        (None, Some(exponent)) => Ok(KernelConfig::with_exponent(exponent)),
        (None, None) => {
            let config = KernelConfig::default();
            warn!(
                "No kernel configuration found in {:?}; assuming exponent {}",
                args.kernels, config.exponent
            );
            Ok(config)
        }
    }
}

fn predict_command(args: PredictArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model = SerializableModel::load_from_file(&args.model)?.to_model()?;

    let structures = ExtXyzReader::new().read_structures_file(&args.structures)?;
    let set: RepresentationSet = read_json(&args.features)?;
    set.validate()?;

    info!(
        "Making predictions using model with {} sparse points",
        model.n_sparse()
    );
    let energies = model.predict_energies(&set, &structures)?;
    let forces = if set.has_gradients() {
        Some(model.predict_forces(&set)?)
    } else {
        None
    };

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(GapError::IoError)?)),
        None => Box::new(io::stdout().lock()),
    };

    writeln!(writer, "# Predicted energies for {} structures", energies.len())?;
    writeln!(writer, "# Format: structure_index energy")?;
    for (i, energy) in energies.iter().enumerate() {
        writeln!(writer, "{i} {energy:.10}")?;
    }
    if let Some(forces) = forces {
        writeln!(writer, "# Predicted forces for {} atoms", forces.nrows())?;
        writeln!(writer, "# Format: atom_index fx fy fz")?;
        for (a, row) in forces.rows().into_iter().enumerate() {
            writeln!(writer, "{a} {:.10} {:.10} {:.10}", row[0], row[1], row[2])?;
        }
    }
    writer.flush()?;

    if let Some(path) = &args.output {
        info!("Predictions written to: {path:?}");
    }
    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    let model = SerializableModel::load_from_file(&args.model)?;
    model.to_model()?;
    model.print_summary();
    Ok(())
}
