use anyhow::{Context, Result};
use colored::Colorize;

use traverse::{InstanceId, Traversal};
use workflow::Payload;

use crate::fs::Fs;

use super::TaskDirPaths;

/// Sorts a traversal's instances into completed/delete/run actions,
/// and cleans up old run dirs in preparation for executing it.
pub struct PreRunner<'t, 'a> {
    /// for filesystem operations
    fs: &'t Fs,
    /// instances to prepare
    traversal: &'t Traversal<'a>,
    /// print out more ui messages
    verbose: bool,
}

impl<'t, 'a> PreRunner<'t, 'a> {
    pub fn new(fs: &'t Fs, traversal: &'t Traversal<'a>, verbose: bool) -> Self {
        Self {
            fs,
            traversal,
            verbose,
        }
    }

    /// Decide what happens to each command and sink instance.
    /// Identity and function instances run in memory and are not listed.
    ///
    /// A command instance with a successful `exit_code` is listed as complete;
    /// its inputs are checked again right before it would run.
    pub fn resolve_actions(&self) -> Result<Actions> {
        let mut actions = Actions::new(self.traversal.len());

        for id in self.traversal.ids() {
            match &self.traversal.get(id).task.payload {
                Payload::Command { .. } => {
                    let dir = self.traversal.output_dir(id)?;
                    let mut paths = TaskDirPaths::new(dir);
                    if paths.exit_code_success(self.fs)? {
                        actions.completed.push(id);
                    } else {
                        if self.fs.exists(dir) {
                            actions.to_delete.push(id);
                        }
                        actions.to_run.push(id);
                    }
                }
                Payload::Sink(_) => actions.to_run.push(id),
                Payload::Identity | Payload::Function(_) => actions.in_memory += 1,
            }
        }
        Ok(actions)
    }

    /// print list of instances in a traversal that are:
    /// - already complete
    /// - to be deleted, directories recreated, and re-run
    /// - new, directories will be created and run for the first time
    pub fn print_actions(&self, actions: &Actions) -> Result<()> {
        if !actions.completed.is_empty() {
            eprintln!(
                "\nThe following tasks are {} and will not run:",
                "already complete".green()
            );
            for id in &actions.completed {
                eprintln!("{} {}", "COMPLETED".green(), self.traversal.get(*id).print_id());
            }
        }

        if !actions.to_delete.is_empty() {
            eprintln!(
                "\nThe following tasks are {} and will be deleted:",
                "incomplete".red()
            );
            for id in &actions.to_delete {
                eprintln!("{} {}", "DELETE".red(), self.traversal.get(*id).print_id());
                if self.verbose {
                    eprintln!("  in {:?}", self.traversal.output_dir(*id)?);
                }
            }
        }

        if !actions.to_run.is_empty() {
            eprintln!("\nThe following tasks {}:", "will run".green());
            for id in &actions.to_run {
                eprintln!("{} {}", "RUN".green(), self.traversal.get(*id).print_id());
            }
        }

        if self.verbose && actions.in_memory > 0 {
            eprintln!(
                "\n{} passthrough and function tasks will run in memory.",
                actions.in_memory.to_string().magenta()
            );
        }

        eprintln!();
        Ok(())
    }

    /// Delete the output dirs of incomplete instances.
    pub fn do_pre_run_actions(&self, actions: &Actions) -> Result<()> {
        // Failed runs are kept until now so they can be inspected.
        for id in &actions.to_delete {
            let dir = self.traversal.output_dir(*id)?;
            eprintln!("{} {:?}", "Deleting".red(), dir);
            self.fs
                .delete_dir(dir)
                .with_context(|| format!("while deleting old task dir {:?}", dir))?;
        }
        Ok(())
    }
}

/// Contains the information needed to prepare the working directory for a run.
#[derive(Debug)]
pub struct Actions {
    completed: Vec<InstanceId>,
    to_delete: Vec<InstanceId>,
    to_run: Vec<InstanceId>,
    in_memory: usize,
}

impl Actions {
    pub fn new(len: usize) -> Self {
        Self {
            completed: Vec::with_capacity(len),
            to_delete: Vec::with_capacity(len),
            to_run: Vec::with_capacity(len),
            in_memory: 0,
        }
    }

    pub fn has_tasks_to_run(&self) -> bool {
        !self.to_run.is_empty()
    }

    pub fn completed(&self) -> &[InstanceId] {
        &self.completed
    }

    pub fn to_delete(&self) -> &[InstanceId] {
        &self.to_delete
    }

    pub fn to_run(&self) -> &[InstanceId] {
        &self.to_run
    }
}
