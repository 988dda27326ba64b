/// Clean up old runs before executing the traversal.
mod pre_runner;
pub use pre_runner::{Actions, PreRunner};

/// All the information needed to actually execute a command task.
mod task_runner;
pub use task_runner::TaskRunner;

/// Creates common paths in a task directory.
mod task_dir_paths;
pub use task_dir_paths::TaskDirPaths;

/// Utility for generating the `task.sh` file record.
mod task_script_builder;
use task_script_builder::TaskScriptBuilder;
