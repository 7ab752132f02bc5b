//! Match-sweep command line entry point: select simulations, load the
//! reconstruction data, run the sweep, persist the result bundle.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use simplelog::{ColorChoice, Config as LogConfig, LevelFilter, TermLogger, TerminalMode};

use nrmatch::io::draw_sample_indices;
use nrmatch::{
    Algorithm, Catalog, Configuration, DetectorData, Error, MatchSweep, NrFileSource,
    ParameterBounds, Result,
};

#[derive(Parser, Debug)]
#[command(
    name = "nrmatch",
    version,
    about = "Fitting factors between burst reconstructions and an NR waveform catalog"
)]
struct Args {
    /// Analysis configuration file.
    config: PathBuf,

    /// Tag prefixed to the output file name.
    #[arg(short = 't', long, default_value = "TEST")]
    user_tag: String,

    /// Directory the result bundle is written to.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Override the configuration's reconstruction algorithm (BW, CWB, HWINJ).
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Restrict the sweep to one simulation, by index into the selection.
    #[arg(short = 's', long)]
    simulation_number: Option<usize>,

    /// Restrict the sweep to one simulation, by wave-file name.
    #[arg(short = 'w', long)]
    wave_file: Option<String>,

    /// First posterior sample to analyse (inclusive).
    #[arg(long, default_value_t = 0)]
    min_sample: usize,

    /// Last posterior sample to analyse (inclusive).
    #[arg(long)]
    max_sample: Option<usize>,

    /// Seed for the randomized optimizer starts and sample draws.
    #[arg(long)]
    seed: Option<u64>,

    /// Independent optimizer starts per (simulation, sample) cell.
    #[arg(long, default_value_t = 1)]
    restarts: usize,
}

fn main() -> ExitCode {
    let _ = TermLogger::init(
        LevelFilter::Info,
        LogConfig::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    let args = Args::parse();
    match run(&args) {
        Ok(path) => {
            info!("done; results in {}", path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(args: &Args) -> Result<PathBuf> {
    let algorithm_override = args
        .algorithm
        .as_deref()
        .map(Algorithm::from_str)
        .transpose()?;
    let config = Configuration::load(&args.config, algorithm_override)?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!("loading data");
    let mut h1 = DetectorData::load(
        &config.h1_reconstruction,
        &config.h1_spectral_estimate,
        &config,
    )?;
    let mut l1 = DetectorData::load(
        &config.l1_reconstruction,
        &config.l1_spectral_estimate,
        &config,
    )?;

    // For posterior reconstructions, thin to the requested sample count or
    // index range; both detectors must keep identical sample indices.
    if config.algorithm == Algorithm::Bw {
        if let Some(count) = config.nsampls {
            info!("reducing sample size to {count} random draws");
            let indices = draw_sample_indices(&mut rng, h1.samples.len(), count);
            h1.select_samples(&indices);
            l1.select_samples(&indices);
        } else if let Some(max_sample) = args.max_sample {
            if max_sample < args.min_sample || max_sample >= h1.samples.len() {
                return Err(Error::Config(format!(
                    "sample range {}..={} is invalid for {} samples",
                    args.min_sample,
                    max_sample,
                    h1.samples.len()
                )));
            }
            info!("selecting samples {}:{}", args.min_sample, max_sample);
            let indices: Vec<usize> = (args.min_sample..=max_sample).collect();
            h1.select_samples(&indices);
            l1.select_samples(&indices);
        } else {
            info!("using all {} posterior samples", h1.samples.len());
        }
    }

    info!("selecting simulations");
    let catalog = Catalog::load(&config.catalog)?;
    // Only simulations whose chirp-mass floor reaches the bottom of the
    // search interval can cover the whole band.
    let bounds = ParameterBounds::new().with(
        "Mchirpmin30Hz",
        f64::NEG_INFINITY,
        config.min_chirp_mass,
    );
    let mut selected = catalog.select(&bounds);

    let mut selection_tag = None;
    if let Some(index) = args.simulation_number {
        if index >= selected.len() {
            return Err(Error::Config(format!(
                "simulation index {index} out of range for {} selected simulations",
                selected.len()
            )));
        }
        info!("analysis restricted to simulation {index}");
        selected.simulations = vec![selected.simulations[index].clone()];
        selection_tag = Some(index.to_string());
    } else if let Some(name) = &args.wave_file {
        let index = selected.position_of_wave_file(name).ok_or_else(|| {
            Error::Config(format!("wave file {name:?} is not in the selection"))
        })?;
        info!("analysis restricted to {name}");
        selected.simulations = vec![selected.simulations[index].clone()];
        selection_tag = Some(
            PathBuf::from(name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone()),
        );
    }

    let sweep = MatchSweep::new(&selected, &h1, &l1, &config, &NrFileSource)
        .with_restarts(args.restarts);
    #[cfg(feature = "parallel")]
    let bundle = sweep.run_par(&mut rng)?;
    #[cfg(not(feature = "parallel"))]
    let bundle = sweep.run(&mut rng)?;

    let path = output_path(args, &config, selection_tag.as_deref());
    bundle.save(&path)?;
    Ok(path)
}

/// `<tag>_<ALGORITHM>[_nrsim-<selection>][-minsamp_M-maxsamp_N].json`,
/// placed in the output directory.
fn output_path(args: &Args, config: &Configuration, selection: Option<&str>) -> PathBuf {
    let mut name = format!("{}_{}", args.user_tag, config.algorithm);
    if let Some(selection) = selection {
        name.push_str(&format!("_nrsim-{selection}"));
    }
    if let Some(max_sample) = args.max_sample {
        name.push_str(&format!(
            "-minsamp_{}-maxsamp_{}",
            args.min_sample, max_sample
        ));
    }
    name.push_str(".json");

    match &args.output_dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
