use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use traverse::{Instance, InstanceId, Traversal};
use workflow::{Payload, SinkSpec, Task, Value, Values};

use crate::fs::Fs;
use crate::prep::{TaskDirPaths, TaskRunner};
use crate::sink::{self, Substitutions};

use super::{run_cmd::run_cmd, Error};

/// number of stderr lines reported when a command fails
const STDERR_TAIL: usize = 20;

/// Shared, read-only state for running instances on worker threads.
pub struct RunContext<'t, 'a> {
    pub traversal: &'t Traversal<'a>,
    pub fs: &'t Fs,
    pub verbose: bool,
}

/// Result of running one instance.
#[derive(Debug)]
pub struct Outcome {
    pub outputs: Values,
    pub cached: bool,
}

impl Outcome {
    fn ran(outputs: Values) -> Self {
        Self {
            outputs,
            cached: false,
        }
    }
}

/// Run instance `id` with the given `inputs`.
pub fn run_instance(ctx: &RunContext, id: InstanceId, inputs: Values) -> Result<Outcome> {
    let instance = ctx.traversal.get(id);
    match &instance.task.payload {
        Payload::Identity => Ok(Outcome::ran(passthrough(instance.task, inputs))),
        Payload::Function(f) => {
            let outputs = f(&inputs)
                .with_context(|| format!("while running function task {}", instance.print_id()))?;
            check_declared_outputs(instance, &outputs)?;
            Ok(Outcome::ran(outputs))
        }
        Payload::Command { code } => run_command(ctx, id, code, &inputs),
        Payload::Sink(spec) => run_sink(ctx, instance, spec, inputs).map(Outcome::ran),
    }
}

fn passthrough(task: &Task, mut inputs: Values) -> Values {
    inputs.retain(|slot, _| task.has_output(slot));
    for slot in task.outputs() {
        inputs.entry(slot.clone()).or_default();
    }
    inputs
}

fn check_declared_outputs(instance: &Instance, outputs: &Values) -> Result<(), Error> {
    for slot in instance.task.outputs() {
        if !outputs.contains_key(slot) {
            return Err(Error::MissingOutput(instance.print_id(), slot.clone()));
        }
    }
    Ok(())
}

fn run_command(ctx: &RunContext, id: InstanceId, code: &str, inputs: &Values) -> Result<Outcome> {
    let instance = ctx.traversal.get(id);
    let print_id = instance.print_id();
    let dir = ctx.traversal.output_dir(id)?;
    let mut runner = TaskRunner::new(
        print_id.clone(),
        code,
        dir,
        inputs,
        instance.task.output_files(),
    )?;

    check_files_exist(&runner.inputs).context("while checking for input files")?;

    let mut paths = TaskDirPaths::new(dir);
    if let Some(outputs) = paths.cached_outputs(ctx.fs, &runner.inputs_hash)? {
        if check_files_exist(output_paths(&outputs)).is_ok() {
            return Ok(Outcome {
                outputs,
                cached: true,
            });
        }
    }

    if ctx.fs.exists(dir) {
        log::info!("clearing stale task dir {:?}", dir);
        ctx.fs.delete_dir(dir)?;
    }
    ctx.fs.create_dir(dir).context("creating task dir")?;

    eprintln!("{} {print_id}\nin {}\n", "RUN".green(), dir.display());

    let mut task_sh = PathBuf::with_capacity(256);
    ctx.fs
        .write_file(ctx.fs.task_sh(dir, &mut task_sh), &runner.script)
        .context("writing task.sh file")?;

    let success = run_cmd(&mut runner.cmd, dir, ctx.fs, ctx.verbose)?;
    if !success {
        return Err(Error::SubprocessFailed {
            task: print_id,
            stderr: paths.stderr_tail(ctx.fs, STDERR_TAIL),
        }
        .into());
    }

    check_files_exist(output_paths(&runner.outputs)).context("while checking for output files")?;

    paths.write_completion(ctx.fs, &runner.inputs_hash, &runner.outputs)?;
    Ok(Outcome::ran(runner.outputs))
}

fn output_paths(outputs: &Values) -> Vec<PathBuf> {
    outputs
        .values()
        .flat_map(|v| v.paths())
        .map(|p| p.to_path_buf())
        .collect()
}

fn check_files_exist<I, P>(files: I) -> Result<(), Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    for file in files {
        let file = file.as_ref();
        if !(file.exists() || file.is_symlink()) {
            return Err(Error::ExpectedFileNotFound(file.display().to_string()));
        }
    }
    Ok(())
}

/// Copy every connected input to `<base>/<params>/<container>/<file>`,
/// rewritten by the sink's substitutions.
fn run_sink(
    ctx: &RunContext,
    instance: &Instance,
    spec: &SinkSpec,
    inputs: Values,
) -> Result<Values> {
    let substitutions = Substitutions::new(&spec.substitutions)?;
    let segments = sink::segments(&instance.params, ctx.traversal.parameterize_dirs());

    let mut outputs = Values::new();
    let mut dest = PathBuf::with_capacity(256);
    for (slot, value) in inputs {
        let Some(sources) = sinkable_paths(instance, &slot, &value) else {
            continue;
        };
        let container = sink::container(&slot);

        let mut persisted = Vec::with_capacity(sources.len());
        for src in sources {
            let file_name = src
                .file_name()
                .ok_or_else(|| Error::ExpectedFileNotFound(src.display().to_string()))?;
            let raw = ctx.fs.sink_destination(
                &spec.base_dir,
                &segments,
                &container,
                Path::new(file_name),
                &mut dest,
            );
            let target = substitutions.apply(raw);

            ctx.fs
                .persist(src, &target)
                .with_context(|| format!("while sinking {slot} of {}", instance.print_id()))?;
            log::info!("sinked {:?}", target);
            persisted.push(Value::Path(target));
        }

        let value = match persisted.len() {
            0 => continue,
            1 => persisted.remove(0),
            _ => Value::List(persisted),
        };
        outputs.insert(slot, value);
    }
    Ok(outputs)
}

/// Files held by a value sent to a sink, or `None` if there is nothing to copy.
/// Values without any path are reported, since they usually mean a miswired sink.
fn sinkable_paths<'v>(instance: &Instance, slot: &str, value: &'v Value) -> Option<Vec<&'v Path>> {
    if value.is_undefined() {
        log::debug!("{}: nothing connected to {slot}", instance.print_id());
        return None;
    }
    let paths = value.paths();
    if paths.is_empty() {
        log::warn!(
            "{}: {slot} holds {value:?}, which has no file to sink; skipping it",
            instance.print_id()
        );
        return None;
    }
    Some(paths)
}
