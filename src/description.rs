//! Provenance record written next to the derivatives of a BIDS pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use workflow::{Node, Section, Workflow};

use crate::bids::{BidsLayout, FileQuery};
use crate::fs::Fs;

const DATASET_NAME: &str = "Derivatives created by PUMI";
const BIDS_VERSION: &str = "1.9.0";
const UNKNOWN_VERSION: &str = "Unknown";

/// Contents of `dataset_description.json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetDescription {
    pub name: String,
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    pub pipeline_description: PipelineDescription,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineDescription {
    pub name: String,
    pub version: String,
    #[serde(rename = "DataGrabber Hash")]
    pub data_grabber_hash: String,
    pub software: Vec<Software>,
    pub settings: BTreeMap<String, Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Software {
    pub name: String,
    pub version: String,
}

impl DatasetDescription {
    pub fn new(
        pipeline: &str,
        wf: &Workflow,
        layout: &BidsLayout,
        queries: &[(String, FileQuery)],
    ) -> Result<Self> {
        Ok(Self {
            name: DATASET_NAME.to_owned(),
            bids_version: BIDS_VERSION.to_owned(),
            pipeline_description: PipelineDescription {
                name: pipeline.to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                data_grabber_hash: dataset_hash(layout, queries)?,
                software: software(wf),
                settings: wf.config().sections().clone(),
            },
        })
    }

    /// Write `<sink_dir>/dataset_description.json`.
    pub fn write(&self, sink_dir: &Path, dry_run: bool) -> Result<()> {
        let mut fs = Fs::sink_only(sink_dir, dry_run);
        fs.prepare_roots(false)?;

        let mut path = PathBuf::with_capacity(sink_dir.as_os_str().len() + 32);
        let path = fs.dataset_description(sink_dir, &mut path);
        if fs.is_dry_run() {
            eprintln!("Dry run. Not writing {:?}", path);
            return Ok(());
        }
        let text = serde_json::to_string_pretty(self)?;
        fs.write_file(path, &text)
            .with_context(|| format!("while writing {:?}", path))?;
        log::info!("wrote dataset description to {:?}", path);
        Ok(())
    }
}

/// Fingerprint of the input data: every file the queries return, in sorted
/// subject order, hashed by content.
pub fn dataset_hash(layout: &BidsLayout, queries: &[(String, FileQuery)]) -> Result<String> {
    let mut subjects: Vec<&String> = layout.subjects().iter().collect();
    subjects.sort();

    let mut hasher = blake3::Hasher::new();
    for subject in subjects {
        let mut files = Vec::new();
        for (_, query) in queries {
            files.extend(layout.query(subject, query)?);
        }
        files.sort();
        for file in files {
            match std::fs::File::open(&file) {
                Ok(f) => {
                    hasher
                        .update_reader(f)
                        .with_context(|| format!("while hashing {:?}", file))?;
                }
                Err(e) => log::warn!("skipping unreadable file {:?}: {e}", file),
            }
        }
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Distinct external tools declared by the tasks of `wf` and its nested graphs.
pub fn software(wf: &Workflow) -> Vec<Software> {
    let mut tools = BTreeMap::new();
    collect_tools(wf, &mut tools);
    tools
        .into_iter()
        .map(|(name, version)| Software { name, version })
        .collect()
}

fn collect_tools(wf: &Workflow, tools: &mut BTreeMap<String, String>) {
    for (_, node) in wf.nodes() {
        match node {
            Node::Task(task) => {
                if let Some(tool) = &task.tool {
                    let version = tool.version.as_deref().unwrap_or(UNKNOWN_VERSION);
                    // a known version beats "Unknown" from another task
                    let entry = tools.entry(tool.name.clone()).or_default();
                    if entry.is_empty() || entry.as_str() == UNKNOWN_VERSION {
                        *entry = version.to_owned();
                    }
                }
            }
            Node::Graph(child) => collect_tools(child, tools),
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use anyhow::Result;
    use tempfile::tempdir;
    use workflow::{Config, Task};

    use super::*;

    fn workflow() -> Result<Workflow> {
        let mut child = Workflow::new("child", Config::default());
        child.add_task(Task::command("bet", "bet").tool("fsl", None))?;
        child.add_task(Task::command("reorient", "fslreorient2std").tool("fsl", Some("6.0.7")))?;

        let mut wf = Workflow::new("top", Config::parse("[FSL]\nbet_frac = 0.4\n")?);
        wf.add_task(Task::command("slicer", "slicer").tool("afni", None))?;
        wf.add_task(Task::identity("noop", &["x"]))?;
        wf.add_graph(child)?;
        Ok(wf)
    }

    #[test]
    fn test_software() -> Result<()> {
        let software = software(&workflow()?);
        assert_eq!(
            vec![
                Software {
                    name: "afni".to_owned(),
                    version: "Unknown".to_owned()
                },
                Software {
                    name: "fsl".to_owned(),
                    version: "6.0.7".to_owned()
                },
            ],
            software
        );
        Ok(())
    }

    #[test]
    fn test_write_description() -> Result<()> {
        let bids = tempdir()?;
        let anat = bids.path().join("sub-01/anat");
        fs::create_dir_all(&anat)?;
        fs::write(anat.join("sub-01_T1w.nii.gz"), "image")?;
        let layout = BidsLayout::new(bids.path())?;
        let queries = vec![("T1w".to_owned(), FileQuery::t1w())];

        let out = tempdir()?;
        let description = DatasetDescription::new("skullstrip", &workflow()?, &layout, &queries)?;
        description.write(out.path(), false)?;

        let text = fs::read_to_string(out.path().join("dataset_description.json"))?;
        let json: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!("Derivatives created by PUMI", json["Name"]);
        assert_eq!("1.9.0", json["BIDSVersion"]);
        assert_eq!("skullstrip", json["PipelineDescription"]["Name"]);
        assert_eq!("0.4", json["PipelineDescription"]["Settings"]["FSL"]["bet_frac"]);
        assert_eq!(64, json["PipelineDescription"]["DataGrabber Hash"].as_str().unwrap().len());
        Ok(())
    }

    #[test]
    fn test_dataset_hash_follows_content() -> Result<()> {
        let bids = tempdir()?;
        let anat = bids.path().join("sub-01/anat");
        fs::create_dir_all(&anat)?;
        let image = anat.join("sub-01_T1w.nii.gz");
        let queries = vec![("T1w".to_owned(), FileQuery::t1w())];

        fs::write(&image, "a")?;
        let first = dataset_hash(&BidsLayout::new(bids.path())?, &queries)?;
        assert_eq!(first, dataset_hash(&BidsLayout::new(bids.path())?, &queries)?);

        fs::write(&image, "b")?;
        assert_ne!(first, dataset_hash(&BidsLayout::new(bids.path())?, &queries)?);
        Ok(())
    }

    #[test]
    fn test_dry_run_writes_nothing() -> Result<()> {
        let bids = tempdir()?;
        fs::create_dir_all(bids.path().join("sub-01"))?;
        let layout = BidsLayout::new(bids.path())?;
        let out = tempdir()?;
        let description = DatasetDescription::new("p", &workflow()?, &layout, &[])?;
        description.write(out.path(), true)?;
        assert!(!out.path().join("dataset_description.json").exists());
        Ok(())
    }
}
