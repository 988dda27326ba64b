//! Nestable neuroimaging pipelines: task graphs with passthrough boundaries,
//! cached parallel execution, result sinking, and BIDS subject iteration.

/// High-level command line app
mod app;
/// Definition of command-line args
mod args;
/// Workflow execution
mod exec;
/// Filesystem operations
mod fs;
/// Structs for preparing a workflow to run
mod prep;
/// Combined command-line and config file run settings
mod settings;
/// Text UI
mod ui;

/// BIDS dataset discovery and the per-subject top-level pipeline
pub mod bids;
/// `dataset_description.json` provenance record
pub mod description;
/// Pipeline builders
pub mod pipeline;
/// Sink destination rewriting
pub mod sink;
/// FSL anatomical stages
pub mod stages;

pub use app::{run_workflow, App};
pub use args::Args;
pub use bids::{BidsLayout, BidsPipeline, FileQuery};
pub use exec::{Report, ReportEntry};
pub use pipeline::{PipelineBuilder, PipelineKind};
pub use settings::{RunOptions, Settings};

pub use atlas;
pub use workflow;

/// Run the command-line app.
pub fn run() -> Result<(), anyhow::Error> {
    use clap::Parser;
    let args = Args::parse();

    // INTERPRET SETTINGS ///////////////
    let settings: Settings = args.try_into()?;

    let log_level = match settings.verbose() {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simple_logging::log_to_stderr(log_level);

    // RUN THE THING /////////////////
    let app = App::new(settings);
    let report = app.run()?;
    log::info!("finished {} task instances", report.len());

    Ok(())
}
