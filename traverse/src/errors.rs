use colored::Colorize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{label} failed due to {} errors (in {})", .failed.len(), .failed.join(", "))]
    AggregatedErrors { label: String, failed: Vec<String> },
}

/// Task failures of one run. Other subjects keep running after a failure,
/// so every failure is kept and reported together at the end.
#[derive(Debug, Default)]
pub struct Errors {
    failures: Vec<(String, anyhow::Error)>,
}

impl Errors {
    /// Record that the instance printed as `task` failed with `e`.
    pub fn task_failed(&mut self, task: String, e: anyhow::Error) {
        log::debug!("{task} failed: {e:?}");
        self.failures.push((task, e));
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Print each failure with its cause chain, then fail with an error
    /// naming the failed tasks.
    pub fn print_recap(&self, label: &str) -> Result<(), Error> {
        if self.failures.is_empty() {
            return Ok(());
        }
        eprintln!("\n{} while {label}:\n", "Tasks failed".red());
        for (task, e) in &self.failures {
            eprintln!("{} {task}: {e:?}\n", "FAILED".red());
        }
        Err(Error::AggregatedErrors {
            label: label.to_owned(),
            failed: self.failures.iter().map(|(task, _)| task.clone()).collect(),
        })
    }
}
