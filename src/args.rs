use clap::Parser;

const CMD_NAME: &str = "pumi";
const DEFAULT_WORKING_DIR: &str = ".";

/// Stores our command-line args format.
#[derive(Parser, Debug)]
#[command(
    name = CMD_NAME,
    version,
    about = "Skull-strip the T1w images of a BIDS dataset",
    long_about = None
)]
pub struct Args {
    /// Root directory of the BIDS dataset
    #[arg(value_name = "BIDS_DIR")]
    pub bids_dir: String,

    /// Directory where the derivatives are stored
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: String,

    /// Level of the analysis; only "participant" is supported
    #[arg(value_name = "LEVEL", default_value = "participant")]
    pub analysis_level: String,

    /// Only process these subjects (with or without "sub-" prefix)
    #[arg(long = "participant-label", value_name = "LABEL", num_args = 1..)]
    pub participant_label: Vec<String>,

    /// Directory holding intermediate results
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_WORKING_DIR)]
    #[arg(env = "PUMI_WORKING_DIR")]
    pub working_dir: String,

    /// Number of tasks to run in parallel [default: number of cpus]
    #[arg(short = 'j', long, value_name = "N")]
    pub n_procs: Option<usize>,

    /// Memory budget shared by running tasks, in GB
    #[arg(short, long, value_name = "GB")]
    pub memory_gb: Option<f64>,

    /// Settings file
    #[arg(short, long, value_name = "FILE")]
    #[arg(env = "PUMI_SETTINGS")]
    pub config: Option<String>,

    /// Fractional intensity threshold of bet
    #[arg(long, value_name = "FRAC")]
    pub frac: Option<f64>,

    /// Vertical gradient in fractional intensity threshold of bet
    #[arg(long, value_name = "GRAD", allow_hyphen_values = true)]
    pub vertical_gradient: Option<f64>,

    /// Bypass user confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print additional info; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Dry run; print info but don't modify anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}
