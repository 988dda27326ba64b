//! Reconcile a region atlas with a second, independently labeled module atlas.
//!
//! Label volumes are integer 3-D arrays where 0 is background.
//! Name lists do not include background: `names[k]` names label `k + 1`.
//!
//! ```
//! use ndarray::Array3;
//! use pumi_atlas::relabel_by_modules;
//!
//! let volume = Array3::from_shape_vec((1, 1, 3), vec![0, 1, 2]).unwrap();
//! let labels = vec!["left".to_owned(), "right".to_owned()];
//! let modules = vec!["visual".to_owned(), "motor".to_owned()];
//! let out = relabel_by_modules(&labels, &modules, &volume).unwrap();
//! assert_eq!(out.labels, ["right", "left"]);
//! assert_eq!(out.volume.as_slice().unwrap(), &[0, 2, 1]);
//! ```

/// Similarity scores and module assignment
mod similarity;
pub use similarity::{assign_module, overlap_scores, similarity};

/// Reordering labels by module and renumbering the volume
mod relabel;
pub use relabel::{dummy_modules, relabel, relabel_by_modules, Relabeled};

/// Writing `newlabels.tsv`
mod label_table;
pub use label_table::{write_label_table, LABEL_TABLE};

/// Module name given to regions that match no module.
pub const NA: &str = "NA";

/// Label volumes as read from a parcellation image.
pub type Volume = ndarray::Array3<i32>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Region volume has shape {0:?} but module volume has shape {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),
    #[error("Label {0} found in volume, but only {1} names were given")]
    LabelOutOfRange(i32, usize),
    #[error("Got {0} labels but {1} modules")]
    LengthMismatch(usize, usize),
}
