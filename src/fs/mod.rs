use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Copying outputs into sinks
mod ops;

/// Defines fns for creating common paths in task output directories
mod paths;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Sink source is neither a file nor a dir: {0}")]
    NotPersistable(String),
    #[error("{0} \"{1}\" is not a directory")]
    NotDirectory(RootKind, String),
    #[error("Can't write \"{0}\": it is outside the working dir and the sink dirs")]
    NotWhitelisted(String),
    #[error("Can't sink to \"{0}\": it is not inside a sink dir")]
    NotInSink(String),
    #[error("Dry run: refusing to write \"{0}\"")]
    DryRun(String),
}

/// The two kinds of directory a pipeline run may write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// task working dirs, deleted and recreated freely
    Work,
    /// persisted results
    Sink,
}

impl std::fmt::Display for RootKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Work => f.write_str("Working dir"),
            Self::Sink => f.write_str("Sink dir"),
        }
    }
}

/// All file operations of a pipeline run go through this struct.
///
/// Writes are only allowed below the run's working dir and its sink dirs,
/// and results are only copied into sink dirs. Command tasks can still write
/// anywhere; what they do is up to the pipeline author.
#[derive(Debug, Clone)]
pub struct Fs {
    roots: Vec<(RootKind, PathBuf)>,
    /// if true, nothing is written at all
    dry_run: bool,
}

impl Fs {
    /// Filesystem for a run whose task dirs live under `work_dir`.
    pub fn new(work_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            roots: vec![(RootKind::Work, work_dir.into())],
            dry_run,
        }
    }

    /// Filesystem that only writes into `sink_dir`.
    pub fn sink_only(sink_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            roots: vec![(RootKind::Sink, sink_dir.into())],
            dry_run,
        }
    }

    /// Also allow results to be sunk into `dir`.
    pub fn with_sink(mut self, dir: impl Into<PathBuf>) -> Self {
        let root = (RootKind::Sink, dir.into());
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Sink dirs of this run, as given.
    pub fn sink_dirs(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .filter(|(kind, _)| *kind == RootKind::Sink)
            .map(|(_, dir)| dir.clone())
            .collect()
    }

    /// Create missing roots. Their canonical forms are allowed as well,
    /// since task dirs are resolved through symlinks.
    pub fn prepare_roots(&mut self, verbose: bool) -> Result<()> {
        let mut canonical = Vec::new();
        for (kind, dir) in &self.roots {
            if !dir.exists() {
                if self.dry_run {
                    eprintln!("Dry run. {kind} {:?} would be created", dir);
                    continue;
                }
                if verbose {
                    eprintln!("Creating {} {:?}", kind.to_string().to_lowercase(), dir);
                }
                fs::create_dir_all(dir).with_context(|| format!("creating {kind} {:?}", dir))?;
            } else if !dir.is_dir() {
                return Err(Error::NotDirectory(*kind, dir.display().to_string()).into());
            }
            canonical.push((*kind, dir.canonicalize()?));
        }
        for root in canonical {
            if !self.roots.contains(&root) {
                self.roots.push(root);
            }
        }
        Ok(())
    }

    /// Check if path exists on disk, counting dangling links.
    pub fn exists<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        path.exists() || path.is_symlink()
    }

    /// Contents of `path`, or `None` if there is no such file.
    pub fn read_if_exists<T: AsRef<Path>>(&self, path: T) -> Result<Option<String>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        Ok(Some(text))
    }

    /// Create a directory and any missing parents.
    pub fn create_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_writable(path, None)?;
        fs::create_dir_all(path).context("creating dir")?;
        Ok(())
    }

    /// Create a file, and return a writable `File` handle.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_writable(path, None)?;
        let f = fs::File::create(path).context("creating file")?;
        Ok(f)
    }

    /// Write entire str to a file.
    pub fn write_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_writable(path, None)?;
        fs::write(path, text).context("writing file")?;
        Ok(())
    }

    /// Recursively delete a directory.
    pub fn delete_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_writable(path, None)?;
        fs::remove_dir_all(path).context("deleting dir")?;
        Ok(())
    }

    /// Copy the output `src` to `tgt` inside a sink dir, creating parent dirs.
    pub fn persist<T: AsRef<Path>, U: AsRef<Path>>(&self, src: T, tgt: U) -> Result<()> {
        let (src, tgt) = (src.as_ref(), tgt.as_ref());
        self.check_writable(tgt, Some(RootKind::Sink))?;
        if let Some(parent) = tgt.parent() {
            fs::create_dir_all(parent).context("creating sink dir")?;
        }
        ops::persist(src, tgt).with_context(|| format!("copying {:?} to {:?}", src, tgt))
    }

    fn check_writable(&self, path: &Path, kind: Option<RootKind>) -> Result<(), Error> {
        let shown = || path.display().to_string();
        if self.dry_run {
            return Err(Error::DryRun(shown()));
        }
        let inside = |want: Option<RootKind>| {
            self.roots
                .iter()
                .any(|(k, dir)| path.starts_with(dir) && want.map_or(true, |w| *k == w))
        };
        match kind {
            None if inside(None) => Ok(()),
            None => Err(Error::NotWhitelisted(shown())),
            Some(k) if inside(Some(k)) => Ok(()),
            Some(_) => Err(Error::NotInSink(shown())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_writes_stay_in_roots() -> Result<()> {
        let dir = tempdir()?;
        let work = dir.path().join("work");
        let sink = dir.path().join("derivatives");
        let mut fs = Fs::new(&work, false).with_sink(&sink);
        fs.prepare_roots(false)?;
        assert_eq!(vec![sink.clone()], fs.sink_dirs());

        fs.write_file(work.join("a.txt"), "a")?;
        fs.create_dir(sink.join("anat"))?;
        assert!(fs.write_file(dir.path().join("outside.txt"), "x").is_err());

        // results only go to sinks:
        fs.persist(work.join("a.txt"), sink.join("anat/a.txt"))?;
        assert_eq!("a", std::fs::read_to_string(sink.join("anat/a.txt"))?);
        let err = fs.persist(work.join("a.txt"), work.join("copy.txt")).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(Error::NotInSink(_))));
        Ok(())
    }

    #[test]
    fn test_dry_run_writes_nothing() -> Result<()> {
        let dir = tempdir()?;
        let work = dir.path().join("work");
        let sink = dir.path().join("derivatives");
        let mut fs = Fs::new(&work, true).with_sink(&sink);
        fs.prepare_roots(false)?;
        assert!(!work.exists());
        assert!(!sink.exists());

        let err = fs.write_file(work.join("b.txt"), "b").unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(Error::DryRun(_))));
        Ok(())
    }

    #[test]
    fn test_read_if_exists() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path(), false);
        assert_eq!(None, fs.read_if_exists(dir.path().join("exit_code"))?);
        std::fs::write(dir.path().join("exit_code"), "0\n")?;
        assert_eq!(Some("0\n".to_owned()), fs.read_if_exists(dir.path().join("exit_code"))?);
        Ok(())
    }

    #[test]
    fn test_sink_root_must_be_a_dir() -> Result<()> {
        let dir = tempdir()?;
        let sink = dir.path().join("out");
        std::fs::write(&sink, "not a dir")?;
        let mut fs = Fs::sink_only(&sink, false);
        let err = fs.prepare_roots(false).unwrap_err();
        assert!(err.to_string().starts_with("Sink dir"), "{err}");
        Ok(())
    }
}
