use std::path::PathBuf;

use anyhow::{Context, Result};

use workflow::Config;

use crate::args::Args;

const PARTICIPANT: &str = "participant";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unsupported analysis level \"{0}\" (only \"participant\" is supported)")]
    UnsupportedAnalysisLevel(String),
    #[error("Settings file {0:?} does not exist")]
    MissingSettingsFile(PathBuf),
    #[error("BIDS dir {0:?} does not exist")]
    MissingBidsDir(PathBuf),
    #[error("Invalid --n-procs 0; must be at least 1")]
    ZeroProcs,
    #[error("Invalid --memory-gb {0}; must be positive")]
    InvalidMemory(f64),
}

/// How a workflow is executed.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// worker threads; 0 means one per cpu
    pub n_procs: usize,
    /// budget for the sum of running tasks' memory estimates
    pub memory_gb: Option<f64>,
    /// -y setting
    pub yes: bool,
    /// -n setting
    pub dry_run: bool,
    /// -v count
    pub verbose: u8,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            n_procs: 0,
            memory_gb: None,
            yes: true,
            dry_run: false,
            verbose: 0,
        }
    }
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. defaults are added in.
#[derive(Debug)]
pub struct Settings {
    pub bids_dir: PathBuf,
    pub output_dir: PathBuf,
    pub working_dir: PathBuf,
    pub participants: Vec<String>,
    /// settings file contents, or empty
    pub config: Config,
    pub frac: Option<f64>,
    pub vertical_gradient: Option<f64>,
    pub run: RunOptions,
}

impl Settings {
    pub fn verbose(&self) -> u8 {
        self.run.verbose
    }
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.analysis_level != PARTICIPANT {
            return Err(Error::UnsupportedAnalysisLevel(args.analysis_level).into());
        }

        let bids_dir = PathBuf::from(&args.bids_dir);
        if !bids_dir.is_dir() {
            return Err(Error::MissingBidsDir(bids_dir).into());
        }

        let config = match args.config {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(Error::MissingSettingsFile(path).into());
                }
                Config::load(&path)?
            }
            None => Config::default(),
        };

        let n_procs = match args.n_procs {
            Some(0) => return Err(Error::ZeroProcs.into()),
            Some(n) => n,
            None => 0,
        };
        if let Some(gb) = args.memory_gb {
            if gb <= 0.0 || !gb.is_finite() {
                return Err(Error::InvalidMemory(gb).into());
            }
        }

        let output_dir = std::path::absolute(&args.output_dir)
            .with_context(|| format!("while resolving output dir {:?}", args.output_dir))?;

        Ok(Self {
            bids_dir,
            output_dir,
            working_dir: PathBuf::from(&args.working_dir),
            participants: args.participant_label,
            config,
            frac: args.frac,
            vertical_gradient: args.vertical_gradient,
            run: RunOptions {
                n_procs,
                memory_gb: args.memory_gb,
                yes: args.yes,
                dry_run: args.dry_run,
                verbose: args.verbose,
            },
        })
    }
}
