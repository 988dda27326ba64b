use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use workflow::{Config, SinkSpec, Task, Value, Values, Workflow, INPUTSPEC, SINKER};

use super::{BidsLayout, Error, FileQuery};
use crate::app::run_workflow;
use crate::description::DatasetDescription;
use crate::exec::Report;
use crate::pipeline::new_graph;
use crate::settings::RunOptions;
use crate::sink::Substitutions;

pub const SUBJECT_ITERATOR: &str = "subject_iterator";
pub const BIDS_GRABBER: &str = "bids_grabber";
pub const PATH_EXTRACTOR: &str = "path_extractor";
/// Slot holding the subject id; also the parameterization key of every
/// per-subject instance.
pub const SUBJECT: &str = "subject";

/// Top-level pipeline reading its inputs from a BIDS dataset.
///
/// Every subject becomes one iteration of the graph: a `subject_iterator`
/// fans out into `bids_grabber`, whose list-valued results are unpacked by
/// one `path_extractor_<category>` per category and fed into `inputspec`.
/// The graph has no `outputspec`, so it is not meant to be nested.
#[derive(Debug, Clone)]
pub struct BidsPipeline {
    queries: Vec<(String, FileQuery)>,
    subjects: Option<Vec<String>>,
    substitutions: Vec<(String, String)>,
    base_dir: PathBuf,
    sink_dir: Option<PathBuf>,
    qc_dir: Option<PathBuf>,
}

impl Default for BidsPipeline {
    fn default() -> Self {
        Self::new(vec![
            ("T1w".to_owned(), FileQuery::t1w()),
            ("bold".to_owned(), FileQuery::bold()),
        ])
    }
}

impl BidsPipeline {
    /// Pipeline with the given data categories, in `inputspec` slot order.
    pub fn new(queries: Vec<(String, FileQuery)>) -> Self {
        Self {
            queries,
            subjects: None,
            substitutions: Vec::new(),
            base_dir: PathBuf::from("."),
            sink_dir: None,
            qc_dir: None,
        }
    }

    pub fn queries(&self) -> &[(String, FileQuery)] {
        &self.queries
    }

    /// Only process these subjects instead of every `sub-*` in the dataset.
    pub fn subjects<S: AsRef<str>>(mut self, subjects: &[S]) -> Self {
        self.subjects = Some(subjects.iter().map(|s| s.as_ref().to_owned()).collect());
        self
    }

    pub fn regexp_sub(mut self, pattern: &str, replacement: &str) -> Self {
        self.substitutions
            .push((pattern.to_owned(), replacement.to_owned()));
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn sink_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sink_dir = Some(dir.into());
        self
    }

    pub fn qc_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.qc_dir = Some(dir.into());
        self
    }

    /// Discover subjects in `bids_dir`, honoring an explicit subject list.
    pub fn layout(&self, bids_dir: &Path) -> Result<BidsLayout> {
        let layout = BidsLayout::new(bids_dir)?;
        let layout = match &self.subjects {
            Some(subjects) => layout.with_subjects(subjects)?,
            None => layout,
        };
        if layout.subjects().is_empty() {
            return Err(Error::NoSubjects(layout.root().to_path_buf()).into());
        }
        Ok(layout)
    }

    /// Wire the per-subject data retrieval, then let `construct` add the stages,
    /// starting from `inputspec`.
    pub fn build<F>(
        &self,
        name: &str,
        layout: &BidsLayout,
        config: &Config,
        construct: F,
    ) -> Result<Workflow>
    where
        F: FnOnce(&mut Workflow, &Path) -> Result<()>,
    {
        Substitutions::new(&self.substitutions)
            .with_context(|| format!("while configuring sink of pipeline \"{name}\""))?;

        let mut wf = new_graph(
            name,
            config,
            Some(&self.base_dir),
            self.sink_dir.as_deref(),
            self.qc_dir.as_deref(),
        )?;

        let subjects: Vec<Value> = layout.subjects().iter().map(|s| s.as_str().into()).collect();
        wf.add_task(Task::identity(SUBJECT_ITERATOR, &[SUBJECT]).iterate(SUBJECT, subjects))?;

        let categories: Vec<&str> = self.queries.iter().map(|(c, _)| c.as_str()).collect();
        wf.add_task(grabber(layout.clone(), self.queries.clone(), &categories))?;
        wf.connect(SUBJECT_ITERATOR, SUBJECT, BIDS_GRABBER, SUBJECT)?;

        wf.set_inputspec(&categories)?;
        for category in &categories {
            let extractor = format!("{PATH_EXTRACTOR}_{category}");
            wf.add_task(path_extractor(&extractor, category))?;
            wf.connect(BIDS_GRABBER, category, &extractor, "filelist")?;
            wf.connect(&extractor, category, INPUTSPEC, category)?;
        }

        let base_dir = wf.sink_dir.clone().unwrap_or_default();
        wf.set_sink(Task::sink(
            SINKER,
            SinkSpec {
                base_dir,
                substitutions: self.substitutions.clone(),
            },
        ))?;

        construct(&mut wf, layout.root())
            .with_context(|| format!("while building pipeline \"{name}\""))?;
        Ok(wf)
    }

    /// Build the pipeline over `bids_dir`, record the dataset description in
    /// the sink dir, and run every subject.
    pub fn run<F>(
        &self,
        name: &str,
        bids_dir: &Path,
        config: &Config,
        options: &RunOptions,
        construct: F,
    ) -> Result<Report>
    where
        F: FnOnce(&mut Workflow, &Path) -> Result<()>,
    {
        let layout = self.layout(bids_dir)?;
        let wf = self.build(name, &layout, config, construct)?;

        let description = DatasetDescription::new(name, &wf, &layout, &self.queries)?;
        if let Some(sink_dir) = &wf.sink_dir {
            description
                .write(sink_dir, options.dry_run)
                .context("while writing dataset description")?;
        }

        run_workflow(&wf, options).with_context(|| format!("while running pipeline \"{name}\""))
    }
}

/// Function task returning, for the subject it receives, the list of files of
/// every category.
fn grabber(layout: BidsLayout, queries: Vec<(String, FileQuery)>, categories: &[&str]) -> Task {
    Task::function(BIDS_GRABBER, &[SUBJECT], categories, move |inputs| {
        let subject = inputs
            .get(SUBJECT)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("{BIDS_GRABBER} received no subject"))?;
        let mut outputs = Values::new();
        for (category, query) in &queries {
            let files = layout
                .query(subject, query)
                .with_context(|| format!("while querying {category} files of sub-{subject}"))?;
            if files.is_empty() {
                log::warn!("sub-{subject}: no {category} files found");
            }
            outputs.insert(category.clone(), files.into());
        }
        Ok(outputs)
    })
    .mem_gb(0.1)
}

/// Function task turning a one-element list into its element.
fn path_extractor(name: &str, category: &str) -> Task {
    let slot = category.to_owned();
    Task::function(name, &["filelist"], &[category], move |inputs| {
        let value = match inputs.get("filelist").cloned().unwrap_or_default() {
            Value::List(items) if items.is_empty() => Value::Undefined,
            other => other.unpack_single(),
        };
        Ok(Values::from([(slot.clone(), value)]))
    })
    .mem_gb(0.1)
}
