use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;

use util::Timer;

/// What a pipeline run covers, shown before anything is deleted or started.
#[derive(Debug)]
pub struct RunPlan<'a> {
    pub pipeline: &'a str,
    /// distinct subjects iterated over; 0 for graphs without subject iteration
    pub subjects: usize,
    pub work_dir: &'a Path,
    pub sink_dirs: &'a [PathBuf],
    pub to_run: usize,
    pub to_delete: usize,
}

impl RunPlan<'_> {
    fn headline(&self) -> String {
        match self.subjects {
            0 => format!("Pipeline {}", self.pipeline.magenta()),
            1 => format!("Pipeline {} for 1 subject", self.pipeline.magenta()),
            n => format!("Pipeline {} for {n} subjects", self.pipeline.magenta()),
        }
    }

    fn question(&self) -> String {
        let mut q = format!("Run {} tasks", self.to_run);
        if self.to_delete > 0 {
            q.push_str(&format!(
                " after deleting {} incomplete task dirs",
                self.to_delete
            ));
        }
        q.push('?');
        q
    }
}

/// Terminal side of a pipeline run: the run plan, the go-ahead prompt and timings.
/// Per-task status lines are printed by the pre-runner and the runner.
pub struct Ui {
    /// -v: phase timings and directory details
    pub verbose: bool,
    /// -y: never prompt
    assume_yes: bool,
    /// started when the run is set up
    run_timer: Timer,
}

impl Ui {
    pub fn new(verbose: u8, assume_yes: bool) -> Self {
        Self {
            verbose: verbose > 0,
            assume_yes,
            run_timer: Timer::now(),
        }
    }

    /// Run one setup phase; in verbose mode its name and duration are printed.
    pub fn phase<T>(&self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if !self.verbose {
            return f();
        }
        eprint!("{}... ", name.magenta());
        let timer = Timer::now();
        let out = f()?;
        eprintln!("{} ({:?})", "done".green(), timer.elapsed()?);
        Ok(out)
    }

    pub fn print_plan(&self, plan: &RunPlan) {
        eprintln!("{}", plan.headline());
        if self.verbose {
            eprintln!("  working dir {:?}", plan.work_dir);
        }
        for dir in plan.sink_dirs {
            eprintln!("  sinking results to {:?}", dir);
        }
    }

    /// Ask for the go-ahead on `plan`, reading the answer from stdin.
    pub fn confirm_run(&self, plan: &RunPlan) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        eprint!("{} (y/N) ", plan.question());
        read_yes(std::io::stdin().lock())
    }

    /// Total time since the run was set up, in verbose mode.
    pub fn run_finished(&self) -> Result<()> {
        if self.verbose {
            self.run_timer.print_elapsed("Pipeline run")?;
        }
        Ok(())
    }
}

fn read_yes(mut input: impl BufRead) -> Result<bool> {
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
