//! FSL-based anatomical stages used by the `pumi` binary.
//!
//! Each stage is a nestable pipeline; external tools run as bash commands.

use anyhow::Result;

use workflow::{Config, Task, Workflow, INPUTSPEC, OUTPUTSPEC, SINKER};

use crate::pipeline::PipelineBuilder;

const FSL: &str = "FSL";
const FSL_TOOL: &str = "fsl";

/// Bet parameters, from explicit argument > settings file > fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetParams {
    pub frac: f64,
    pub vertical_gradient: f64,
}

impl BetParams {
    pub fn resolve(
        config: &Config,
        frac: Option<f64>,
        vertical_gradient: Option<f64>,
    ) -> Result<Self> {
        let frac = match frac {
            Some(frac) => frac,
            None => config.get_float(FSL, "bet_frac", 0.5)?,
        };
        let vertical_gradient = match vertical_gradient {
            Some(grad) => grad,
            None => config.get_float(FSL, "bet_vertical_gradient", 0.0)?,
        };
        Ok(Self {
            frac,
            vertical_gradient,
        })
    }
}

/// Sink slot persisting `file` under the stage's own directory.
fn sink_slot(stage: &str, file: &str) -> String {
    format!("{stage}.@{file}")
}

/// Reorient an image to the standard orientation.
pub fn reorient(name: &str, config: &Config) -> Result<Workflow> {
    PipelineBuilder::anat(&["in_file"], &["out_file"]).build(name, config, |wf| {
        wf.add_task(
            Task::command("fslreorient2std", r#"fslreorient2std "$in_file" "$out_file""#)
                .input("in_file")
                .output("out_file", "reoriented.nii.gz")
                .tool(FSL_TOOL, None),
        )?;
        wf.connect(INPUTSPEC, "in_file", "fslreorient2std", "in_file")?;
        wf.connect("fslreorient2std", "out_file", OUTPUTSPEC, "out_file")?;
        wf.connect("fslreorient2std", "out_file", SINKER, &sink_slot(name, "out_file"))?;
        Ok(())
    })
}

/// Brain extraction with FSL bet, with a quality check image of the result.
pub fn bet_fsl(name: &str, config: &Config, params: BetParams) -> Result<Workflow> {
    PipelineBuilder::anat(&["in_file"], &["out_file", "brain_mask"]).build(name, config, |wf| {
        wf.add_task(
            Task::command(
                "bet",
                r#"bet "$in_file" "$out_file" -f "$frac" -g "$vertical_gradient" -m -R"#,
            )
            .input("in_file")
            .input("frac")
            .input("vertical_gradient")
            .with_value("frac", params.frac)
            .with_value("vertical_gradient", params.vertical_gradient)
            .output("out_file", "brain.nii.gz")
            .output("mask_file", "brain_mask.nii.gz")
            .mem_gb(1.0)
            .tool(FSL_TOOL, None),
        )?;
        wf.connect(INPUTSPEC, "in_file", "bet", "in_file")?;
        wf.connect("bet", "out_file", SINKER, &sink_slot(name, "out_file"))?;
        wf.connect("bet", "mask_file", SINKER, &sink_slot(name, "mask_file"))?;

        let qc = bet_qc("qc_bet", wf.config())?;
        wf.add_graph(qc)?;
        wf.connect(INPUTSPEC, "in_file", "qc_bet", "background")?;
        wf.connect("bet", "out_file", "qc_bet", "overlay")?;

        wf.connect_many(
            "bet",
            OUTPUTSPEC,
            &[("out_file", "out_file"), ("mask_file", "brain_mask")],
        )?;
        Ok(())
    })
}

/// Outline of a brain mask drawn over the head image, as a png in the qc dir.
pub fn bet_qc(name: &str, config: &Config) -> Result<Workflow> {
    PipelineBuilder::qc(&["background", "overlay"], &["out_file"]).build(name, config, |wf| {
        wf.add_task(
            Task::command("slicer", r#"slicer "$background" "$overlay" -a "$out_file""#)
                .input("background")
                .input("overlay")
                .output("out_file", "qc.png")
                .tool(FSL_TOOL, None),
        )?;
        wf.connect_groups(&[
            (INPUTSPEC, "slicer", &[("background", "background"), ("overlay", "overlay")]),
            ("slicer", OUTPUTSPEC, &[("out_file", "out_file")]),
        ])?;
        wf.connect("slicer", "out_file", SINKER, &sink_slot(name, "out_file"))?;
        Ok(())
    })
}

/// Reorientation followed by brain extraction, fed from a BIDS `T1w` category.
pub fn skullstrip(wf: &mut Workflow, params: BetParams) -> Result<()> {
    let config = wf.config().clone();
    wf.add_graph(reorient("reorient", &config)?)?;
    wf.add_graph(bet_fsl("bet", &config, params)?)?;
    wf.connect(INPUTSPEC, "T1w", "reorient", "in_file")?;
    wf.connect("reorient", "out_file", "bet", "in_file")?;
    Ok(())
}
