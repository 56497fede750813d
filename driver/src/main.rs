use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use generator::phantom::{write_phantom, PhantomConfig};
use log::info;
use qmricore::diffusion::DtiOutputs;
use qmricore::io::MapFormat;
use qmricore::workspace::Retention;
use std::path::PathBuf;
use workflow::config::{MtsatJob, WorkflowConfig};
use workflow::report::RunReport;
use workflow::runner::{retention_from_flags, Runner};

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Quantitative MRI parameter maps from weighted acquisitions")]
struct Cli {
    /// Worker threads for voxel-parallel arithmetic (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Magnetization-transfer saturation map from T1-, PD- and MT-weighted scans
    Mtsat(MtsatArgs),
    /// FA, RD and ADC maps plus a mean B0 image from a diffusion scan
    Dti(DtiArgs),
    /// Write synthetic t1/pd/mt phantoms for smoke runs
    Phantom(PhantomArgs),
}

#[derive(Args)]
struct MtsatArgs {
    /// T1-weighted scan (NIfTI, or vendor data for the converter)
    t1_file: PathBuf,
    /// PD-weighted scan
    pd_file: PathBuf,
    /// MT-weighted scan
    mt_file: PathBuf,
    /// Output map; the extension picks the format unless --format is given
    save_file: PathBuf,
    /// Single-echo scans, no echo averaging
    #[arg(long)]
    singleecho: bool,
    /// Keep the scratch directory (same as --retain always)
    #[arg(long)]
    nocleanup: bool,
    /// Scratch retention: discard, on-failure or always
    #[arg(long)]
    retain: Option<Retention>,
    /// Gaussian smoothing kernel extent in voxels (0 = no smoothing)
    #[arg(long, default_value_t = 0)]
    gauss: usize,
    /// T1 scan flip angle
    #[arg(long, default_value_t = 20.0)]
    at1: f64,
    /// PD scan flip angle
    #[arg(long, default_value_t = 6.0)]
    apd: f64,
    /// MT scan flip angle
    #[arg(long, default_value_t = 6.0)]
    amt: f64,
    /// T1 scan TR in ms
    #[arg(long = "TRt1", default_value_t = 18.0)]
    tr_t1: f64,
    /// PD scan TR in ms
    #[arg(long = "TRpd", default_value_t = 25.0)]
    tr_pd: f64,
    /// MT scan TR in ms
    #[arg(long = "TRmt", default_value_t = 25.0)]
    tr_mt: f64,
    /// Load protocol and options from YAML instead of the flags above
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Output format: nifti, nifti-gz or raw
    #[arg(long)]
    format: Option<MapFormat>,
    /// Executable converting vendor data to NIfTI
    #[arg(long)]
    converter: Option<String>,
    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct DtiArgs {
    /// Raw diffusion scan (not the reconstruction)
    scan_file: PathBuf,
    #[arg(long, default_value = "fa_map.nii")]
    fa_file: PathBuf,
    #[arg(long, default_value = "rd_map.nii")]
    rd_file: PathBuf,
    #[arg(long, default_value = "adc_map.nii")]
    adc_file: PathBuf,
    #[arg(long, default_value = "b0_image.nii")]
    b0_file: PathBuf,
    #[arg(long)]
    converter: Option<String>,
    #[arg(long)]
    nocleanup: bool,
}

#[derive(Args)]
struct PhantomArgs {
    /// Directory receiving t1.nii, pd.nii and mt.nii
    dir: PathBuf,
    #[arg(long, num_args = 3, value_names = ["NX", "NY", "NZ"], default_values_t = [32, 32, 16])]
    shape: Vec<usize>,
    #[arg(long, default_value_t = 3)]
    echoes: usize,
    #[arg(long, default_value_t = 100.0)]
    t1: f64,
    #[arg(long, default_value_t = 80.0)]
    pd: f64,
    #[arg(long, default_value_t = 50.0)]
    mt: f64,
    /// Relative noise amplitude
    #[arg(long, default_value_t = 0.02)]
    noise: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.threads {
        Some(n_threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .context("building thread pool")?;
            pool.install(|| dispatch(cli.command))
        }
        None => dispatch(cli.command),
    }
}

fn dispatch(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Mtsat(args) => run_mtsat(args),
        Command::Dti(args) => run_dti(args),
        Command::Phantom(args) => run_phantom(args),
    }
}

fn run_mtsat(args: MtsatArgs) -> anyhow::Result<()> {
    let mut config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(
            args.singleecho,
            args.gauss,
            [args.at1, args.apd, args.amt],
            [args.tr_t1, args.tr_pd, args.tr_mt],
        )?
    };
    if let Some(retention) = retention_from_flags(args.nocleanup, args.retain) {
        config.retention = retention;
    }
    if args.format.is_some() {
        config.format = args.format;
    }
    if let Some(converter) = args.converter {
        config.converter = converter;
    }

    let job = MtsatJob {
        t1: args.t1_file,
        pd: args.pd_file,
        mt: args.mt_file,
        output: args.save_file,
    };
    let runner = Runner::new(config);
    let result = runner.execute(&job)?;
    println!(
        "MTsat map written to {} ({} stages, {} degenerate voxels)",
        result.written.display(),
        result.metrics.stages_completed,
        result.metrics.degenerate_voxels
    );

    if let Some(path) = &args.report {
        RunReport::new(runner.config(), &result).write(path)?;
        info!("run report written to {}", path.display());
    }
    Ok(())
}

fn run_dti(args: DtiArgs) -> anyhow::Result<()> {
    let mut config = WorkflowConfig::default();
    if let Some(retention) = retention_from_flags(args.nocleanup, None) {
        config.retention = retention;
    }
    if let Some(converter) = args.converter {
        config.converter = converter;
    }
    let outputs = DtiOutputs {
        fa: args.fa_file,
        rd: args.rd_file,
        adc: args.adc_file,
        b0: args.b0_file,
    };
    let summary = Runner::new(config).execute_dti(&args.scan_file, &outputs)?;
    println!(
        "DTI metrics written ({} of {} b-values zeroed): {}, {}, {}, {}",
        summary.zeroed,
        summary.bvalues,
        outputs.fa.display(),
        outputs.rd.display(),
        outputs.adc.display(),
        outputs.b0.display()
    );
    Ok(())
}

fn run_phantom(args: PhantomArgs) -> anyhow::Result<()> {
    let shape: [usize; 3] = args
        .shape
        .as_slice()
        .try_into()
        .context("--shape takes exactly three sizes")?;
    let config = PhantomConfig {
        shape,
        echoes: args.echoes,
        t1: args.t1,
        pd: args.pd,
        mt: args.mt,
        noise: args.noise,
        seed: args.seed,
        ..PhantomConfig::default()
    };
    let paths = write_phantom(&config, &args.dir)?;
    println!(
        "Phantom written: {}, {}, {}",
        paths.t1.display(),
        paths.pd.display(),
        paths.mt.display()
    );
    Ok(())
}
