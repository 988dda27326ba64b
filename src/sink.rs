//! Destination paths of persisted results.

use std::path::{Path, PathBuf};

use regex::Regex;

use workflow::{parameterization_dir, Parameterization};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid substitution pattern \"{0}\": {1}")]
    InvalidSubstitution(String, regex::Error),
}

/// Ordered regular-expression rewrites applied to sink destinations.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    rules: Vec<(Regex, String)>,
}

impl Substitutions {
    /// Compile `(pattern, replacement)` pairs. Replacements use `${1}` style groups.
    pub fn new(pairs: &[(String, String)]) -> Result<Self, Error> {
        let rules = pairs
            .iter()
            .map(|(pattern, replacement)| {
                Regex::new(pattern)
                    .map(|re| (re, replacement.clone()))
                    .map_err(|e| Error::InvalidSubstitution(pattern.clone(), e))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order, each to the result of the previous one.
    pub fn apply(&self, path: &Path) -> PathBuf {
        let mut s = path.to_string_lossy().into_owned();
        for (re, replacement) in &self.rules {
            let replaced = re.replace_all(&s, replacement.as_str()).into_owned();
            if replaced != s {
                log::trace!("substituted {s} -> {replaced}");
                s = replaced;
            }
        }
        PathBuf::from(s)
    }
}

/// Directory a slot's files are persisted under: `container.@name` maps to `container`,
/// `a.b` maps to `a/b`.
pub fn container(slot: &str) -> PathBuf {
    slot.split(workflow::PATH_DELIM)
        .filter(|part| !part.is_empty() && !part.starts_with('@'))
        .collect()
}

/// Parameterization segments as sink directory names.
///
/// Long segments are hashed, except the subject segment: the default
/// substitutions read the subject id from it.
pub fn segments(params: &Parameterization, parameterize_dirs: bool) -> Vec<String> {
    params
        .segments()
        .map(|s| {
            if parameterize_dirs || s.starts_with(SUBJECT_SEGMENT) {
                s
            } else {
                parameterization_dir(&s)
            }
        })
        .collect()
}

const SUBJECT_SEGMENT: &str = "_subject_";

#[cfg(test)]
mod test {
    use super::*;
    use crate::pipeline::PipelineKind;

    fn defaults(kind: PipelineKind) -> Substitutions {
        Substitutions::new(&kind.default_substitutions()).unwrap()
    }

    #[test]
    fn test_qc_rewrite() {
        let subs = defaults(PipelineKind::Qc);
        assert_eq!(
            PathBuf::from("/tmp/wf/stage-001.png"),
            subs.apply(Path::new("/tmp/wf/_subject_001/stage/file.nii.gz"))
        );
    }

    #[test]
    fn test_anat_rewrite() {
        let subs = defaults(PipelineKind::Anat);
        assert_eq!(
            PathBuf::from("/out/derivatives/bet/sub-001/brain.nii.gz"),
            subs.apply(Path::new("/out/derivatives/_subject_001/bet/brain.nii.gz"))
        );
        // nothing to rewrite without a subject segment:
        assert_eq!(
            PathBuf::from("/out/derivatives/bet/brain.nii.gz"),
            subs.apply(Path::new("/out/derivatives/bet/brain.nii.gz"))
        );
    }

    #[test]
    fn test_group_rewrite() {
        let subs = defaults(PipelineKind::Group);
        assert_eq!(
            PathBuf::from("/out/group/fc/matrix.tsv"),
            subs.apply(Path::new("/out/fc/matrix.tsv"))
        );
    }

    #[test]
    fn test_rules_apply_in_order() -> anyhow::Result<()> {
        let subs = Substitutions::new(&[
            ("brain".to_owned(), "head".to_owned()),
            ("head".to_owned(), "skull".to_owned()),
        ])?;
        assert_eq!(PathBuf::from("/a/skull.nii"), subs.apply(Path::new("/a/brain.nii")));
        Ok(())
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Substitutions::new(&[("(".to_owned(), "".to_owned())]).unwrap_err();
        assert!(matches!(err, Error::InvalidSubstitution(..)));
    }

    #[test]
    fn test_container() {
        assert_eq!(PathBuf::from("anat"), container("anat.@brain"));
        assert_eq!(PathBuf::from("qc/bet"), container("qc.bet"));
        assert_eq!(PathBuf::from(""), container("@out"));
    }

    #[test]
    fn test_segments() {
        let params = Parameterization::new().with("subject", "001");
        assert_eq!(vec!["_subject_001".to_owned()], segments(&params, false));
        let long = Parameterization::new().with("session", "x".repeat(40));
        assert_eq!(64, segments(&long, false)[0].len());
        assert_eq!(49, segments(&long, true)[0].len());
    }

    #[test]
    fn test_long_subject_ids_reach_the_rewrite() {
        let id = "NDARINV".to_owned() + &"0".repeat(30);
        let params = Parameterization::new().with("subject", id.as_str());
        let segs = segments(&params, false);
        assert_eq!(vec![format!("_subject_{id}")], segs);

        let path = PathBuf::from("/out").join(&segs[0]).join("bet/brain.nii.gz");
        assert_eq!(
            PathBuf::from(format!("/out/bet/sub-{id}/brain.nii.gz")),
            defaults(PipelineKind::Anat).apply(&path)
        );
    }

    #[test]
    fn test_extra_param_segments() {
        let path = Path::new("/out/_subject_001/_run_2/bet/brain.nii.gz");
        assert_eq!(
            PathBuf::from("/out/bet/sub-001/_run_2/brain.nii.gz"),
            defaults(PipelineKind::Anat).apply(path)
        );
        assert_eq!(
            PathBuf::from("/out/_run_2/bet-001.png"),
            defaults(PipelineKind::Qc).apply(path)
        );
    }
}
