use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use traverse::Traversal;
use workflow::{Payload, Workflow};

use crate::bids::{BidsPipeline, FileQuery, SUBJECT};
use crate::exec::{Report, WorkflowRunner};
use crate::fs::Fs;
use crate::prep::PreRunner;
use crate::settings::{RunOptions, Settings};
use crate::stages::{self, BetParams};
use crate::ui::{RunPlan, Ui};

const PIPELINE_NAME: &str = "skullstrip";

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
}

impl App {
    /// Create a new `App`.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Build the skull-stripping pipeline over the BIDS dataset and run it.
    pub fn run(self) -> Result<Report> {
        let settings = &self.settings;
        if settings.verbose() > 0 {
            eprintln!("Using output directory {:?}", settings.output_dir);
        }
        let params = BetParams::resolve(
            &settings.config,
            settings.frac,
            settings.vertical_gradient,
        )?;
        log::info!(
            "bet frac={} vertical_gradient={}",
            params.frac,
            params.vertical_gradient
        );

        let mut pipeline = BidsPipeline::new(vec![("T1w".to_owned(), FileQuery::t1w())])
            .base_dir(&settings.working_dir)
            .sink_dir(&settings.output_dir);
        if !settings.participants.is_empty() {
            pipeline = pipeline.subjects(&settings.participants);
        }

        pipeline.run(
            PIPELINE_NAME,
            &settings.bids_dir,
            &settings.config,
            &settings.run,
            |wf, _bids_dir| stages::skullstrip(wf, params),
        )
    }
}

/// Run `wf`: resolve which task instances are complete, confirm with the
/// user, then execute the rest.
///
/// With `dry_run`, only the run plan and the summary of actions are printed.
pub fn run_workflow(wf: &Workflow, options: &RunOptions) -> Result<Report> {
    let ui = Ui::new(options.verbose, options.yes);

    let traversal = ui.phase("Expanding task graph", || {
        Traversal::create(wf)
            .with_context(|| format!("while creating traversal of workflow \"{}\"", wf.name()))
    })?;
    log::debug!("Traversal has {} task instances.", traversal.len());

    let mut fs = sink_dirs(&traversal)
        .into_iter()
        .fold(Fs::new(traversal.base_dir(), options.dry_run), Fs::with_sink);
    fs.prepare_roots(ui.verbose)?;

    let pre_runner = PreRunner::new(&fs, &traversal, ui.verbose);
    let actions = pre_runner.resolve_actions()?;
    log::debug!(
        "{} instances complete, {} to delete, {} to run",
        actions.completed().len(),
        actions.to_delete().len(),
        actions.to_run().len(),
    );
    pre_runner.print_actions(&actions)?;

    let sinks = fs.sink_dirs();
    let plan = RunPlan {
        pipeline: wf.name(),
        subjects: count_subjects(&traversal),
        work_dir: traversal.base_dir(),
        sink_dirs: &sinks,
        to_run: actions.to_run().len(),
        to_delete: actions.to_delete().len(),
    };
    ui.print_plan(&plan);

    if options.dry_run {
        return Ok(Report::default());
    }
    if !actions.has_tasks_to_run() && actions.to_delete().is_empty() {
        eprintln!("{}", "No tasks to run; reusing previous results.".green());
    } else if !ui.confirm_run(&plan)? {
        return Ok(Report::default());
    }

    // delete old incomplete tasks:
    pre_runner
        .do_pre_run_actions(&actions)
        .context("while preparing working directory for workflow run")?;

    eprintln!("\n{}.\n", "Starting workflow execution".magenta());

    let mut runner = WorkflowRunner::new(&traversal, &fs, ui, options.n_procs, options.memory_gb);
    runner.run().context("while running workflow")
}

/// Base dir of every sink in the traversal, without repeats.
fn sink_dirs(traversal: &Traversal) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for id in traversal.ids() {
        if let Payload::Sink(spec) = &traversal.get(id).task.payload {
            if !dirs.contains(&spec.base_dir) {
                dirs.push(spec.base_dir.clone());
            }
        }
    }
    dirs
}

/// Number of distinct subjects the traversal iterates over.
fn count_subjects(traversal: &Traversal) -> usize {
    traversal
        .ids()
        .filter_map(|id| traversal.get(id).params.get(SUBJECT))
        .map(|subject| subject.to_string())
        .collect::<BTreeSet<_>>()
        .len()
}
