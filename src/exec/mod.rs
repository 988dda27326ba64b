use workflow::{Parameterization, Values};

/// Schedules instances onto a thread pool
mod workflow_runner;
pub use workflow_runner::WorkflowRunner;

/// Runs a single instance, whatever its payload
mod instance;

/// Run a subprocess
mod run_cmd;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Expected file not found: {0}")]
    ExpectedFileNotFound(String),
    #[error("Task {task} failed:\n{stderr}")]
    SubprocessFailed { task: String, stderr: String },
    #[error("Task {0} did not produce output \"{1}\"")]
    MissingOutput(String, String),
}

/// Outputs of one instance after a run.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    /// dotted path of the task, e.g. "wf.anat.bet"
    pub path: String,
    pub params: Parameterization,
    pub outputs: Values,
    /// true if a previous run's outputs were reused
    pub cached: bool,
}

/// Outputs of every instance of a successful run, in dependency order.
#[derive(Debug, Clone, Default)]
pub struct Report {
    entries: Vec<ReportEntry>,
}

impl Report {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReportEntry> {
        self.entries.iter()
    }

    /// All instances of the task at `path`.
    pub fn outputs<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ReportEntry> {
        self.entries.iter().filter(move |e| e.path == path)
    }

    /// The instance of the task at `path` run under `params`.
    pub fn get(&self, path: &str, params: &Parameterization) -> Option<&ReportEntry> {
        self.entries
            .iter()
            .find(|e| e.path == path && &e.params == params)
    }

    fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }
}
