use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{Parameterization, Task, PATH_DELIM};

/// Rendered parameterization segments longer than this are replaced by their digest.
pub const MAX_SEGMENT_LEN: usize = 32;

const SUBJECT_SEGMENT: &str = "_subject_";
const SUBJECT_DIR: &str = "sub-";

/// Directory name for one rendered parameterization segment:
/// the segment itself, or its blake3 hex digest if longer than `MAX_SEGMENT_LEN`.
///
/// The digest only keeps paths short; it is not meant to be collision-resistant.
pub fn parameterization_dir(segment: &str) -> String {
    if segment.len() > MAX_SEGMENT_LEN {
        blake3::hash(segment.as_bytes()).to_hex().to_string()
    } else {
        segment.to_owned()
    }
}

/// Working directory for `task`:
/// `<base>/<top graph>/<params..>/<nested graphs..>/<task name>`.
///
/// `hierarchy` is the dotted list of enclosing graph names, outermost first.
/// Without parameterization it is simply `<base>/<graphs..>/<task name>`.
/// Sinks get one more level, joining their parameterization with '-'
/// (and writing `_subject_` as `sub-`), so each iteration gets its own flat dir.
/// If `base_dir` is `None`, a new temp dir is created and used.
pub fn resolve_output_dir(
    task: &Task,
    hierarchy: &str,
    params: &Parameterization,
    base_dir: Option<&Path>,
    parameterize_dirs: bool,
) -> Result<PathBuf> {
    let render = |segment: String| {
        if parameterize_dirs {
            segment
        } else {
            parameterization_dir(&segment)
        }
    };

    let mut dir = match base_dir {
        Some(base) => base.to_path_buf(),
        None => temp_base_dir()?,
    };

    let mut levels = hierarchy.split(PATH_DELIM).filter(|s| !s.is_empty());
    if !params.is_empty() {
        // top level stays outside the parameterization, nested graphs go inside:
        if let Some(top) = levels.next() {
            dir.push(top);
        }
        dir.extend(params.segments().map(render));
    }
    dir.extend(levels);
    dir.push(&task.name);

    let mut dir = normalize(&dir).with_context(|| format!("while normalizing {:?}", dir))?;

    if task.is_sink() && !params.is_empty() {
        let flat: Vec<String> = params
            .segments()
            .map(|s| match s.strip_prefix(SUBJECT_SEGMENT) {
                Some(rest) => format!("{SUBJECT_DIR}{rest}"),
                None => s,
            })
            .map(render)
            .collect();
        dir.push(flat.join("-"));
    }

    Ok(dir)
}

/// Create a fresh temp dir to hold task working dirs. It is not removed afterwards.
pub fn temp_base_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix("pumi-")
        .tempdir()
        .context("while creating temporary base dir")?
        .into_path();
    log::info!("no base dir set, using {:?}", dir);
    Ok(dir)
}

/// Make `path` absolute and resolve symlinks in the part of it that exists.
fn normalize(path: &Path) -> std::io::Result<PathBuf> {
    let path = std::path::absolute(path)?;
    let mut existing = path.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return Ok(path.clone()),
        }
    }
    let mut resolved = existing.canonicalize()?;
    resolved.extend(missing.iter().rev());
    Ok(resolved)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{SinkSpec, Value};
    use tempfile::tempdir;

    fn task() -> Task {
        Task::command("bet", "true")
    }

    fn subject(id: &str) -> Parameterization {
        Parameterization::new().with("subject", id)
    }

    #[test]
    fn test_layout() -> Result<()> {
        let base = tempdir()?;
        let root = base.path().canonicalize()?;

        let resolve = |hierarchy: &str, params: &Parameterization| {
            resolve_output_dir(&task(), hierarchy, params, Some(base.path()), false)
        };

        let dir = resolve("bids_wf.anat.bet_wf", &subject("001"))?;
        assert_eq!(root.join("bids_wf/_subject_001/anat/bet_wf/bet"), dir);

        let dir = resolve("bids_wf.anat", &Parameterization::new())?;
        assert_eq!(root.join("bids_wf/anat/bet"), dir);

        let dir = resolve("", &Parameterization::new())?;
        assert_eq!(root.join("bet"), dir);
        Ok(())
    }

    #[test]
    fn test_distinct_params_distinct_dirs() -> Result<()> {
        let base = tempdir()?;
        let params = [
            subject("001"),
            subject("002"),
            subject("001").with("run", 1i64),
            subject("001").with("run", 2i64),
            subject("x".repeat(40).as_str()),
            subject("y".repeat(40).as_str()),
        ];
        let mut dirs = Vec::new();
        for p in &params {
            dirs.push(resolve_output_dir(&task(), "wf", p, Some(base.path()), false)?);
        }
        for (i, a) in dirs.iter().enumerate() {
            for b in &dirs[i + 1..] {
                assert_ne!(a, b);
            }
        }
        Ok(())
    }

    #[test]
    fn test_segment_hashing() {
        let short = "_subject_0123456789abcdefghijklm";
        assert_eq!(32, short.len());
        assert_eq!(short, parameterization_dir(short));

        let long = "_subject_0123456789abcdefghijklmn";
        assert_eq!(33, long.len());
        let hashed = parameterization_dir(long);
        assert_eq!(64, hashed.len());
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hashed, parameterization_dir(long));
        assert_ne!(hashed, parameterization_dir("_subject_0123456789abcdefghijklmo"));
    }

    #[test]
    fn test_parameterize_dirs_keeps_long_segments() -> Result<()> {
        let base = tempdir()?;
        let long = subject("a_rather_long_subject_identifier_value");
        let hashed = resolve_output_dir(&task(), "wf", &long, Some(base.path()), false)?;
        let verbatim = resolve_output_dir(&task(), "wf", &long, Some(base.path()), true)?;
        assert!(verbatim.ends_with("wf/_subject_a_rather_long_subject_identifier_value/bet"));
        assert_ne!(hashed, verbatim);
        Ok(())
    }

    #[test]
    fn test_sink_gets_flat_param_dir() -> Result<()> {
        let base = tempdir()?;
        let sink = Task::sink("sinker", SinkSpec::default());
        let params = subject("001").with("run", Value::Int(2));
        let dir = resolve_output_dir(&sink, "wf", &params, Some(base.path()), false)?;
        assert!(dir.ends_with("wf/_subject_001/_run_2/sinker/sub-001-_run_2"), "{dir:?}");
        Ok(())
    }

    #[test]
    fn test_unset_base_dir_uses_temp_dir() -> Result<()> {
        let dir = resolve_output_dir(&task(), "wf", &Parameterization::new(), None, false)?;
        assert!(dir.is_absolute());
        assert!(dir.ends_with("wf/bet"));
        let base = dir.parent().and_then(Path::parent).map(Path::to_path_buf);
        if let Some(base) = base {
            std::fs::remove_dir_all(base)?;
        }
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_normalize_resolves_existing_symlinks() -> Result<()> {
        let base = tempdir()?;
        let real = base.path().join("real");
        std::fs::create_dir(&real)?;
        let link = base.path().join("link");
        std::os::unix::fs::symlink(&real, &link)?;
        let dir = normalize(&link.join("missing/child"))?;
        assert_eq!(real.canonicalize()?.join("missing/child"), dir);
        Ok(())
    }
}
