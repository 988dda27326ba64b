use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::UNIX_EPOCH;

use anyhow::Result;

use util::PathEncodingError;
use workflow::{Value, Values};

use super::TaskScriptBuilder;

/// Contains all information required to run a single command task instance.
#[derive(Debug)]
pub struct TaskRunner {
    /// String that uniquely identifies this task instance (used for logging):
    pub print_id: String,
    /// The command to run
    pub cmd: Command,
    /// Contents of `task.sh`, reproducing `cmd`
    pub script: String,
    /// Directory in which the command runs and artifacts
    /// (`stdout.txt`, `task.sh`, `exit_code` etc.) live.
    pub dir: PathBuf,
    /// Input files, so we can verify they exist before execution.
    pub inputs: Vec<PathBuf>,
    /// Output slots and their files, so we can verify they exist after execution.
    pub outputs: Values,
    /// Digest of everything that determines this task's result.
    pub inputs_hash: String,
}

impl TaskRunner {
    /// Prepare `code` to run in `dir`, with each input and output slot
    /// exposed as an environment variable.
    pub fn new(
        print_id: String,
        code: &str,
        dir: &Path,
        inputs: &Values,
        output_files: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let dir_str = dir.to_str().ok_or(PathEncodingError)?;

        let mut cmd = Command::new("/usr/bin/env");
        cmd.arg("bash").arg("-xeuo").arg("pipefail");
        cmd.current_dir(dir);

        let mut script = String::with_capacity(1024);
        let mut builder = TaskScriptBuilder::new(&mut script);
        builder.write_prefix();

        // add inputs to cmd and task.sh /////////////
        let mut input_files = Vec::with_capacity(inputs.len());
        for (slot, value) in inputs {
            input_files.extend(value.paths().into_iter().map(Path::to_path_buf));
            let rendered = value.to_string();
            cmd.env(slot, &rendered);
            builder.write_assignment_line(slot, &rendered);
        }

        // add outputs to cmd and task.sh ///////////
        let mut outputs = Values::new();
        for (slot, file) in output_files {
            let path = dir.join(file);
            let path_str = path.to_str().ok_or(PathEncodingError)?;
            cmd.env(slot, path_str);
            builder.write_assignment_line(slot, path_str);
            outputs.insert(slot.clone(), Value::Path(path));
        }

        // write actual code + suffix to cmd and task.sh ///
        builder.write_normal_task_suffix(dir_str, code);
        cmd.arg("-c").arg(code);

        let inputs_hash = inputs_hash(code, inputs, &input_files, output_files)?;

        Ok(Self {
            print_id,
            cmd,
            script,
            dir: dir.to_path_buf(),
            inputs: input_files,
            outputs,
            inputs_hash,
        })
    }
}

/// blake3 digest of a command's code, its inputs, and its output file names.
/// Input files also contribute their size and modification time, so a rerun
/// upstream invalidates this task even when the paths stay the same.
fn inputs_hash(
    code: &str,
    inputs: &Values,
    input_files: &[PathBuf],
    output_files: &BTreeMap<String, String>,
) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(code.as_bytes());
    hasher.update(&serde_json::to_vec(inputs)?);
    hasher.update(&serde_json::to_vec(output_files)?);
    for file in input_files {
        // missing files are reported by the input check instead
        if let Ok(meta) = std::fs::metadata(file) {
            hasher.update(&meta.len().to_le_bytes());
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_nanos());
            hasher.update(&mtime.to_le_bytes());
        }
    }
    Ok(hasher.finalize().to_hex().to_string())
}
