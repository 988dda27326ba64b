use std::path::{Path, PathBuf};

use super::Fs;

/// Utility fns for making common paths inside a task's output dir.
impl Fs {
    /// $DIR/exit_code
    pub fn exit_code<'a>(&self, task_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(task_dir, "exit_code", buf)
    }

    /// $DIR/.inputs_hash
    pub fn inputs_hash<'a>(&self, task_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(task_dir, ".inputs_hash", buf)
    }

    /// $DIR/outputs.json
    pub fn outputs_json<'a>(&self, task_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(task_dir, "outputs.json", buf)
    }

    /// $DIR/stdout.txt
    pub fn stdout<'a>(&self, task_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(task_dir, "stdout.txt", buf)
    }

    /// $DIR/stderr.txt
    pub fn stderr<'a>(&self, task_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(task_dir, "stderr.txt", buf)
    }

    /// $DIR/task.sh
    pub fn task_sh<'a>(&self, task_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(task_dir, "task.sh", buf)
    }

    /// $SINK/dataset_description.json
    pub fn dataset_description<'a>(&self, sink_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(sink_dir, "dataset_description.json", buf)
    }

    /// $SINK/$PARAMS/$CONTAINER/$FILE, before substitutions
    pub fn sink_destination<'a>(
        &self,
        sink_base: &Path,
        segments: &[String],
        container: &Path,
        file_name: &Path,
        buf: &'a mut PathBuf,
    ) -> &'a Path {
        buf.clear();
        buf.push(sink_base);
        buf.extend(segments);
        if !container.as_os_str().is_empty() {
            buf.push(container);
        }
        buf.push(file_name);
        &*buf
    }

    fn parts2<'a, T, U>(&self, p1: T, p2: U, buf: &'a mut PathBuf) -> &'a Path
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        buf.clear();
        buf.push(p1);
        buf.push(p2);
        &*buf
    }
}
