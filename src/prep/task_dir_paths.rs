use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use workflow::Values;

use crate::fs::Fs;

/// Reusable container for common paths in a task's output directory.
pub struct TaskDirPaths {
    /// used for constructing other paths
    scratch: PathBuf,
    /// absolute path to the task output dir
    dir: PathBuf,
}

impl TaskDirPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            scratch: PathBuf::with_capacity(512),
            dir: dir.to_path_buf(),
        }
    }

    /// return true if `exit_code` file exists and contains just the string "0".
    pub fn exit_code_success(&mut self, fs: &Fs) -> Result<bool> {
        let exit_code = fs.read_if_exists(fs.exit_code(&self.dir, &mut self.scratch))?;
        Ok(exit_code.is_some_and(|code| code.trim() == "0"))
    }

    /// Outputs recorded by a previous successful run, if its inputs hash matches `hash`.
    pub fn cached_outputs(&mut self, fs: &Fs, hash: &str) -> Result<Option<Values>> {
        if !self.exit_code_success(fs)? {
            return Ok(None);
        }

        match fs.read_if_exists(fs.inputs_hash(&self.dir, &mut self.scratch))? {
            Some(recorded) if recorded.trim() == hash => (),
            Some(_) => {
                log::debug!("inputs of {:?} changed since last run", self.dir);
                return Ok(None);
            }
            None => return Ok(None),
        }

        let outputs_file = fs.outputs_json(&self.dir, &mut self.scratch);
        let Some(json) = fs.read_if_exists(outputs_file)? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(outputs) => Ok(Some(outputs)),
            Err(e) => {
                log::warn!("ignoring unreadable {:?}: {e}", outputs_file);
                Ok(None)
            }
        }
    }

    /// Record a successful run: inputs hash, outputs, and finally the exit code.
    pub fn write_completion(&mut self, fs: &Fs, hash: &str, outputs: &Values) -> Result<()> {
        let json = serde_json::to_string_pretty(outputs)?;
        fs.write_file(fs.outputs_json(&self.dir, &mut self.scratch), &json)
            .context("while writing outputs.json")?;
        fs.write_file(fs.inputs_hash(&self.dir, &mut self.scratch), hash)
            .context("while writing .inputs_hash")?;
        fs.write_file(fs.exit_code(&self.dir, &mut self.scratch), "0")
            .context("while writing exit_code file for successful task")?;
        Ok(())
    }

    /// Last `n` lines of `stderr.txt`, or an empty string if it can't be read.
    pub fn stderr_tail(&mut self, fs: &Fs, n: usize) -> String {
        match fs.read_if_exists(fs.stderr(&self.dir, &mut self.scratch)) {
            Ok(Some(text)) => {
                let lines: Vec<&str> = text.lines().collect();
                lines[lines.len().saturating_sub(n)..].join("\n")
            }
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;
    use workflow::Value;

    #[test]
    fn test_completion_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let mut fs = Fs::new(dir.path(), false);
        fs.prepare_roots(false)?;
        let mut paths = TaskDirPaths::new(dir.path());

        assert!(!paths.exit_code_success(&fs)?);
        assert_eq!(None, paths.cached_outputs(&fs, "abc")?);

        let mut outputs = Values::new();
        outputs.insert("out_file".to_owned(), Value::Path(dir.path().join("brain.nii.gz")));
        paths.write_completion(&fs, "abc", &outputs)?;

        assert!(paths.exit_code_success(&fs)?);
        assert_eq!(Some(outputs), paths.cached_outputs(&fs, "abc")?);
        assert_eq!(None, paths.cached_outputs(&fs, "def")?);
        Ok(())
    }
}
