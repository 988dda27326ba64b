use std::collections::VecDeque;
use std::sync::mpsc;

use anyhow::{Context, Result};
use colored::Colorize;

use traverse::{Errors, InstanceId, Traversal};
use util::IdVec;
use workflow::Values;

use crate::fs::Fs;
use crate::ui::Ui;

use super::instance::{run_instance, Outcome, RunContext};
use super::{Report, ReportEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Waiting,
    Running,
    Done,
    Failed,
    Skipped,
}

/// `WorkflowRunner` is the struct that actually runs a workflow.
///
/// Instances are started on a thread pool as soon as all of their dependencies
/// have finished, as long as the memory estimates of running instances fit the
/// budget. Results come back to the calling thread over a channel, which
/// releases dependents. When an instance fails, its transitive dependents are
/// skipped, but independent instances (e.g. other subjects) keep running.
/// All failures are reported together at the end.
pub struct WorkflowRunner<'t, 'a> {
    traversal: &'t Traversal<'a>,
    fs: &'t Fs,
    /// User interface
    ui: Ui,
    /// worker threads; 0 means one per cpu
    n_procs: usize,
    /// budget for the sum of running instances' `mem_gb`
    memory_gb: Option<f64>,
}

impl<'t, 'a> WorkflowRunner<'t, 'a> {
    /// Create a new `WorkflowRunner`.
    pub fn new(
        traversal: &'t Traversal<'a>,
        fs: &'t Fs,
        ui: Ui,
        n_procs: usize,
        memory_gb: Option<f64>,
    ) -> Self {
        Self {
            traversal,
            fs,
            ui,
            n_procs,
            memory_gb,
        }
    }

    pub fn run(&mut self) -> Result<Report> {
        let traversal = self.traversal;
        let n = traversal.len();

        let mut states: IdVec<InstanceId, State> = IdVec::fill(State::Waiting, n);
        let mut outputs: IdVec<InstanceId, Option<Outcome>> = IdVec::with_capacity(n);
        let mut pending: IdVec<InstanceId, usize> = IdVec::with_capacity(n);
        let mut ready = VecDeque::with_capacity(n);
        for id in traversal.ids() {
            outputs.push(None);
            let count = traversal.get(id).dependencies.len();
            pending.push(count);
            if count == 0 {
                ready.push_back(id);
            }
        }

        let mut errors = Errors::default();
        let mut running = 0usize;
        let mut running_mem = 0.0;
        let budget = self.memory_gb.unwrap_or(f64::INFINITY);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_procs)
            .thread_name(|i| format!("pumi-worker-{i}"))
            .build()
            .context("while creating thread pool")?;

        let ctx = RunContext {
            traversal,
            fs: self.fs,
            verbose: self.ui.verbose,
        };
        let (sender, receiver) = mpsc::channel::<(InstanceId, Result<Outcome>)>();

        pool.in_place_scope(|s| -> Result<()> {
            loop {
                // start everything that is ready and fits the memory budget:
                while let Some(&id) = ready.front() {
                    let mem_gb = traversal.get(id).task.mem_gb;
                    if running > 0 && running_mem + mem_gb > budget {
                        log::debug!("{running} tasks use {running_mem:.1} GB; waiting");
                        break;
                    }
                    ready.pop_front();
                    let inputs = gather_inputs(traversal, id, &outputs);
                    *states.get_mut(id) = State::Running;
                    running += 1;
                    running_mem += mem_gb;

                    let sender = sender.clone();
                    let ctx = &ctx;
                    s.spawn(move |_| {
                        let result = run_instance(ctx, id, inputs);
                        // receiver outlives the scope:
                        let _ = sender.send((id, result));
                    });
                }

                if running == 0 {
                    break;
                }

                let (id, result) = receiver.recv().context("while waiting for a task")?;
                let instance = traversal.get(id);
                running -= 1;
                running_mem -= instance.task.mem_gb;

                match result {
                    Ok(outcome) => {
                        if instance.task.is_command() {
                            let status = if outcome.cached {
                                "CACHED".green()
                            } else {
                                "COMPLETED".green()
                            };
                            eprintln!("{status} {}", instance.print_id());
                        } else {
                            log::debug!("finished {}", instance.print_id());
                        }
                        *states.get_mut(id) = State::Done;
                        *outputs.get_mut(id) = Some(outcome);
                        for &dependent in traversal.dependents(id) {
                            let count = pending.get_mut(dependent);
                            *count -= 1;
                            if *count == 0 && *states.get(dependent) == State::Waiting {
                                ready.push_back(dependent);
                            }
                        }
                    }
                    Err(e) => {
                        eprintln!("{} {}", "FAILED".red(), instance.print_id());
                        *states.get_mut(id) = State::Failed;
                        errors.task_failed(instance.print_id(), e);
                        skip_dependents(traversal, id, &mut states);
                    }
                }
            }
            Ok(())
        })?;
        self.ui.run_finished()?;

        let skipped = states.iter().filter(|s| **s == State::Skipped).count();
        if skipped > 0 {
            eprintln!(
                "\n{} {skipped} tasks downstream of failed tasks.",
                "SKIPPED".yellow()
            );
        }
        errors.print_recap("running workflow")?;

        let mut report = Report::default();
        for (id, outcome) in outputs.into_enumerate() {
            if let Some(outcome) = outcome {
                let instance = traversal.get(id);
                report.push(ReportEntry {
                    path: instance.path.clone(),
                    params: instance.params.clone(),
                    outputs: outcome.outputs,
                    cached: outcome.cached,
                });
            }
        }
        eprintln!("{}\n", "Completed workflow.".green());
        Ok(report)
    }
}

/// Static values, then connected upstream outputs, then the iterable's own value.
fn gather_inputs(
    traversal: &Traversal,
    id: InstanceId,
    outputs: &IdVec<InstanceId, Option<Outcome>>,
) -> Values {
    let instance = traversal.get(id);
    let mut inputs = instance.task.values.clone();
    for input in &instance.inputs {
        let value = outputs
            .get(input.src)
            .as_ref()
            .and_then(|o| o.outputs.get(&input.src_slot))
            .cloned()
            .unwrap_or_default();
        inputs.insert(input.slot.clone(), value);
    }
    if let Some(iterable) = &instance.task.iterable {
        if let Some(value) = instance.params.get(&iterable.slot) {
            inputs.insert(iterable.slot.clone(), value.clone());
        }
    }
    inputs
}

fn skip_dependents(
    traversal: &Traversal,
    failed: InstanceId,
    states: &mut IdVec<InstanceId, State>,
) {
    let mut queue: VecDeque<InstanceId> = traversal.dependents(failed).iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        if *states.get(id) == State::Waiting {
            *states.get_mut(id) = State::Skipped;
            log::info!("skipping {}", traversal.get(id).print_id());
            queue.extend(traversal.dependents(id));
        }
    }
}
