use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::Error;

const SUBJECT_PREFIX: &str = "sub-";
const SESSION_GLOB: &str = "ses-*";

/// Which files of a subject make up one data category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    pub datatype: String,
    pub suffix: String,
    pub extensions: Vec<String>,
}

impl FileQuery {
    pub fn new(datatype: &str, suffix: &str, extensions: &[&str]) -> Self {
        Self {
            datatype: datatype.to_owned(),
            suffix: suffix.to_owned(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Anatomical T1-weighted images.
    pub fn t1w() -> Self {
        Self::new("anat", "T1w", &["nii", "nii.gz"])
    }

    /// Functional BOLD series.
    pub fn bold() -> Self {
        Self::new("func", "bold", &["nii", "nii.gz"])
    }

    fn matches(&self, subject: &str, file_name: &str) -> bool {
        let prefix = format!("{SUBJECT_PREFIX}{subject}");
        if !file_name.starts_with(&prefix) {
            return false;
        }
        let rest = &file_name[prefix.len()..];
        self.extensions.iter().any(|ext| {
            let tail = format!("_{}.{}", self.suffix, ext);
            // either sub-01_T1w.nii or sub-01_<entities>_T1w.nii
            rest == tail || (rest.starts_with('_') && rest.ends_with(&tail))
        })
    }
}

/// Subjects and files of a BIDS dataset.
#[derive(Debug, Clone)]
pub struct BidsLayout {
    root: PathBuf,
    subjects: Vec<String>,
}

impl BidsLayout {
    /// Discover the subjects under `root`, i.e. its `sub-*` directories.
    pub fn new(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::NotADirectory(root.to_path_buf()).into());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("while resolving BIDS root {:?}", root))?;

        let pattern = root
            .join(format!("{SUBJECT_PREFIX}*"))
            .to_string_lossy()
            .into_owned();
        let mut subjects = Vec::new();
        for entry in glob::glob(&escape_prefix(&root, &pattern))? {
            let path = entry?;
            if !path.is_dir() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str());
            if let Some(id) = name.and_then(|n| n.strip_prefix(SUBJECT_PREFIX)) {
                subjects.push(id.to_owned());
            }
        }
        subjects.sort();
        log::info!("found {} subjects in {:?}", subjects.len(), root);

        Ok(Self { root, subjects })
    }

    /// Restrict the layout to the given subjects, with or without the `sub-` prefix.
    pub fn with_subjects<S: AsRef<str>>(mut self, subjects: &[S]) -> Result<Self, Error> {
        let mut selected = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let subject = subject.as_ref();
            let id = subject.strip_prefix(SUBJECT_PREFIX).unwrap_or(subject);
            if !self.subjects.iter().any(|s| s == id) {
                return Err(Error::UnknownSubject(id.to_owned()));
            }
            if !selected.iter().any(|s| s == id) {
                selected.push(id.to_owned());
            }
        }
        self.subjects = selected;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subject identifiers, without the `sub-` prefix.
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// Files of `subject` matching `query`, in sessions or not, sorted.
    pub fn query(&self, subject: &str, query: &FileQuery) -> Result<Vec<PathBuf>> {
        let subject_dir = self.root.join(format!("{SUBJECT_PREFIX}{subject}"));
        let dirs = [
            subject_dir.join(&query.datatype),
            subject_dir.join(SESSION_GLOB).join(&query.datatype),
        ];

        let mut files = Vec::new();
        for dir in &dirs {
            let pattern = dir.join("*").to_string_lossy().into_owned();
            let pattern = escape_prefix(&self.root, &pattern);
            for entry in glob::glob(&pattern)? {
                let path = entry?;
                let matches = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| query.matches(subject, name));
                if matches && path.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        files.dedup();
        log::debug!(
            "sub-{subject}: {} files for {}/{}",
            files.len(),
            query.datatype,
            query.suffix
        );
        Ok(files)
    }
}

/// Escape glob metacharacters in the dataset root, keeping the rest of `pattern` live.
fn escape_prefix(root: &Path, pattern: &str) -> String {
    let root = root.to_string_lossy();
    match pattern.strip_prefix(root.as_ref()) {
        Some(rest) => format!("{}{}", glob::Pattern::escape(&root), rest),
        None => pattern.to_owned(),
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;

    fn touch(path: PathBuf) -> Result<()> {
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(path, "")?;
        Ok(())
    }

    fn dataset(root: &Path) -> Result<()> {
        touch(root.join("sub-02/anat/sub-02_T1w.nii.gz"))?;
        touch(root.join("sub-01/anat/sub-01_T1w.nii.gz"))?;
        touch(root.join("sub-01/anat/sub-01_T1w.json"))?;
        touch(root.join("sub-01/func/sub-01_task-rest_bold.nii.gz"))?;
        touch(root.join("sub-03/ses-1/anat/sub-03_ses-1_T1w.nii"))?;
        touch(root.join("sub-03/ses-2/anat/sub-03_ses-2_T1w.nii"))?;
        touch(root.join("dataset_description.json"))?;
        touch(root.join("sub-notadir"))?;
        Ok(())
    }

    #[test]
    fn test_discover_subjects() -> Result<()> {
        let dir = tempdir()?;
        dataset(dir.path())?;
        let layout = BidsLayout::new(dir.path())?;
        assert_eq!(&["01", "02", "03"], layout.subjects());
        Ok(())
    }

    #[test]
    fn test_explicit_subjects() -> Result<()> {
        let dir = tempdir()?;
        dataset(dir.path())?;
        let layout = BidsLayout::new(dir.path())?.with_subjects(&["sub-03", "01"])?;
        assert_eq!(&["03", "01"], layout.subjects());

        let err = BidsLayout::new(dir.path())?.with_subjects(&["04"]).unwrap_err();
        assert!(matches!(err, Error::UnknownSubject(s) if s == "04"));
        Ok(())
    }

    #[test]
    fn test_query() -> Result<()> {
        let dir = tempdir()?;
        dataset(dir.path())?;
        let layout = BidsLayout::new(dir.path())?;

        let t1w = layout.query("01", &FileQuery::t1w())?;
        assert_eq!(vec![layout.root().join("sub-01/anat/sub-01_T1w.nii.gz")], t1w);

        let bold = layout.query("01", &FileQuery::bold())?;
        assert_eq!(1, bold.len());
        assert!(layout.query("02", &FileQuery::bold())?.is_empty());

        let sessions = layout.query("03", &FileQuery::t1w())?;
        assert_eq!(
            vec![
                layout.root().join("sub-03/ses-1/anat/sub-03_ses-1_T1w.nii"),
                layout.root().join("sub-03/ses-2/anat/sub-03_ses-2_T1w.nii"),
            ],
            sessions
        );
        Ok(())
    }

    #[test]
    fn test_query_matches_whole_entities() {
        let q = FileQuery::t1w();
        assert!(q.matches("01", "sub-01_T1w.nii.gz"));
        assert!(q.matches("01", "sub-01_run-1_T1w.nii"));
        assert!(!q.matches("01", "sub-010_T1w.nii"));
        assert!(!q.matches("01", "sub-01_acq-xT1w.nii"));
        assert!(!q.matches("01", "sub-01_T1w.json"));
    }

    #[test]
    fn test_missing_root() {
        assert!(BidsLayout::new(Path::new("/definitely/not/here")).is_err());
    }
}
