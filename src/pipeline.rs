//! Builders that wrap a graph-construction function with the conventional
//! `inputspec`/`outputspec` passthroughs and a result sink.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use workflow::{Config, SinkSpec, Task, Workflow, SINKER};

use crate::sink::Substitutions;

pub const SINKING: &str = "SINKING";
const DEFAULT_SINK_DIR: &str = "derivatives";
const DEFAULT_QC_DIR: &str = "qc";

/// Which kind of stage a pipeline is; decides where its sink writes and
/// how destination paths are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Anat,
    Func,
    Qc,
    Group,
}

impl PipelineKind {
    /// `(pattern, replacement)` rewrites applied to `<base>/<params>/<container>/<file>`.
    ///
    /// Param segments after the subject (e.g. `_run_2`) are kept as dirs
    /// below the subject dir, or below the qc dir for qc images.
    pub fn default_substitutions(self) -> Vec<(String, String)> {
        let (pattern, replacement) = match self {
            Self::Anat | Self::Func => (
                r"^(.*/)_subject_([^/]+)/((?:_[^/]+/)*)([^/]+)/([^/]+)$",
                "${1}${4}/sub-${2}/${3}${5}",
            ),
            Self::Qc => (
                r"^(.*/)_subject_([^/]+)/((?:_[^/]+/)*)([^/]+)/[^/]+$",
                "${1}${3}${4}-${2}.png",
            ),
            Self::Group => (r"^(.*/)([^/]+)/([^/]+)$", "${1}group/${2}/${3}"),
        };
        vec![(pattern.to_owned(), replacement.to_owned())]
    }
}

/// Sink and qc dirs, resolved from explicit argument > config > fallback.
/// A relative qc dir lives inside the sink dir.
pub fn resolve_sink_dirs(
    config: &Config,
    sink_dir: Option<&Path>,
    qc_dir: Option<&Path>,
) -> Result<(PathBuf, PathBuf)> {
    let sink_dir = match sink_dir {
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::from(config.get_or(SINKING, "sink_dir", DEFAULT_SINK_DIR)),
    };
    let sink_dir = std::path::absolute(&sink_dir)
        .with_context(|| format!("while resolving sink dir {:?}", sink_dir))?;

    let qc_dir = match qc_dir {
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::from(config.get_or(SINKING, "qc_dir", DEFAULT_QC_DIR)),
    };
    let qc_dir = if qc_dir.is_absolute() {
        qc_dir
    } else {
        sink_dir.join(qc_dir)
    };
    Ok((sink_dir, qc_dir))
}

/// Creates a named `Workflow` with passthroughs and a sink, then hands it
/// to a construction function.
///
/// ```
/// use pumi::{PipelineBuilder, workflow::{Config, Task, INPUTSPEC, OUTPUTSPEC}};
///
/// let wf = PipelineBuilder::anat(&["in_file"], &["out_file"])
///     .sink_dir("/tmp/derivatives")
///     .build("copy", &Config::default(), |wf| {
///         wf.add_task(
///             Task::command("cp", "cp \"$in_file\" \"$out_file\"")
///                 .input("in_file")
///                 .output("out_file", "out.txt"),
///         )?;
///         wf.connect(INPUTSPEC, "in_file", "cp", "in_file")?;
///         wf.connect("cp", "out_file", OUTPUTSPEC, "out_file")?;
///         Ok(())
///     })
///     .unwrap();
/// assert!(wf.sink().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    kind: PipelineKind,
    inputs: Vec<String>,
    outputs: Vec<String>,
    substitutions: Vec<(String, String)>,
    default_substitutions: bool,
    base_dir: Option<PathBuf>,
    sink_dir: Option<PathBuf>,
    qc_dir: Option<PathBuf>,
}

impl PipelineBuilder {
    pub fn new(kind: PipelineKind, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            kind,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            substitutions: Vec::new(),
            default_substitutions: true,
            base_dir: None,
            sink_dir: None,
            qc_dir: None,
        }
    }

    pub fn anat(inputs: &[&str], outputs: &[&str]) -> Self {
        Self::new(PipelineKind::Anat, inputs, outputs)
    }

    pub fn func(inputs: &[&str], outputs: &[&str]) -> Self {
        Self::new(PipelineKind::Func, inputs, outputs)
    }

    pub fn qc(inputs: &[&str], outputs: &[&str]) -> Self {
        Self::new(PipelineKind::Qc, inputs, outputs)
    }

    pub fn group(inputs: &[&str], outputs: &[&str]) -> Self {
        Self::new(PipelineKind::Group, inputs, outputs)
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Add a rewrite applied after the defaults.
    pub fn regexp_sub(mut self, pattern: &str, replacement: &str) -> Self {
        self.substitutions
            .push((pattern.to_owned(), replacement.to_owned()));
        self
    }

    /// Turn the kind's default rewrites on or off.
    pub fn default_substitutions(mut self, enabled: bool) -> Self {
        self.default_substitutions = enabled;
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
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

    /// All rewrites the sink will apply, in order.
    pub fn substitutions(&self) -> Vec<(String, String)> {
        let mut subs = if self.default_substitutions {
            self.kind.default_substitutions()
        } else {
            Vec::new()
        };
        subs.extend(self.substitutions.iter().cloned());
        subs
    }

    /// Create the graph and populate it with `construct`.
    pub fn build<F>(&self, name: &str, config: &Config, construct: F) -> Result<Workflow>
    where
        F: FnOnce(&mut Workflow) -> Result<()>,
    {
        let substitutions = self.substitutions();
        Substitutions::new(&substitutions)
            .with_context(|| format!("while configuring sink of pipeline \"{name}\""))?;

        let mut wf = new_graph(
            name,
            config,
            self.base_dir.as_deref(),
            self.sink_dir.as_deref(),
            self.qc_dir.as_deref(),
        )?;
        if !self.inputs.is_empty() {
            let inputs: Vec<&str> = self.inputs.iter().map(String::as_str).collect();
            wf.set_inputspec(&inputs)?;
        }
        if !self.outputs.is_empty() {
            let outputs: Vec<&str> = self.outputs.iter().map(String::as_str).collect();
            wf.set_outputspec(&outputs)?;
        }

        let base_dir = match (self.kind, &wf.qc_dir, &wf.sink_dir) {
            (PipelineKind::Qc, Some(qc_dir), _) => qc_dir.clone(),
            (_, _, Some(sink_dir)) => sink_dir.clone(),
            _ => PathBuf::from(DEFAULT_SINK_DIR),
        };
        log::debug!("pipeline {name}: sinking to {:?}", base_dir);
        wf.set_sink(Task::sink(
            SINKER,
            SinkSpec {
                base_dir,
                substitutions,
            },
        ))?;

        construct(&mut wf).with_context(|| format!("while building pipeline \"{name}\""))?;
        Ok(wf)
    }
}

/// Empty graph with resolved sink dirs, recorded in its own config copy
/// so that nested pipelines built from it inherit them.
pub(crate) fn new_graph(
    name: &str,
    config: &Config,
    base_dir: Option<&Path>,
    sink_dir: Option<&Path>,
    qc_dir: Option<&Path>,
) -> Result<Workflow> {
    let (sink_dir, qc_dir) = resolve_sink_dirs(config, sink_dir, qc_dir)?;
    let mut wf = Workflow::new(name, config.clone());
    wf.config_mut()
        .set(SINKING, "sink_dir", sink_dir.to_string_lossy());
    wf.config_mut()
        .set(SINKING, "qc_dir", qc_dir.to_string_lossy());
    wf.base_dir = match base_dir {
        Some(dir) => Some(
            std::path::absolute(dir)
                .with_context(|| format!("while resolving working dir {:?}", dir))?,
        ),
        None => None,
    };
    wf.sink_dir = Some(sink_dir);
    wf.qc_dir = Some(qc_dir);
    Ok(wf)
}
