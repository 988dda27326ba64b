use ndarray::Array2;

use crate::{Error, Volume};

/// Overlap similarity of two voxel sets inside a volume of `total` voxels:
/// `1 - |A xor B| / total`. Symmetric, in `[0, 1]`, and 1.0 only for identical sets.
pub fn similarity(size_a: u64, size_b: u64, intersection: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    let symmetric_difference = size_a + size_b - 2 * intersection;
    1.0 - symmetric_difference as f64 / total as f64
}

/// Similarity of every region `1..=n_regions` (rows, row `r` is label `r + 1`)
/// with every module `0..=n_modules` (columns, column 0 is background).
///
/// All scores come from one joint histogram pass over the two volumes.
pub fn overlap_scores(
    regions: &Volume,
    n_regions: usize,
    modules: &Volume,
    n_modules: usize,
) -> Result<Array2<f64>, Error> {
    if regions.shape() != modules.shape() {
        return Err(Error::ShapeMismatch(
            regions.shape().to_vec(),
            modules.shape().to_vec(),
        ));
    }

    let mut joint = Array2::<u64>::zeros((n_regions + 1, n_modules + 1));
    for (&r, &m) in regions.iter().zip(modules.iter()) {
        let r = checked_index(r, n_regions)?;
        let m = checked_index(m, n_modules)?;
        joint[[r, m]] += 1;
    }

    let region_sizes = joint.sum_axis(ndarray::Axis(1));
    let module_sizes = joint.sum_axis(ndarray::Axis(0));
    let total = regions.len() as u64;

    let mut scores = Array2::<f64>::zeros((n_regions, n_modules + 1));
    for r in 1..=n_regions {
        for m in 0..=n_modules {
            scores[[r - 1, m]] = similarity(region_sizes[r], module_sizes[m], joint[[r, m]], total);
        }
    }
    Ok(scores)
}

/// Choose a module for one region from its row of scores (index 0 is background).
///
/// The best score wins, ties going to the lower index.
/// If the best match is background and its score is strictly below `threshold`,
/// the second best is used instead. Otherwise a background match is unassigned.
/// Returns the module index (>= 1), or `None` when unassigned.
pub fn assign_module(scores: &[f64], threshold: f64) -> Option<usize> {
    let mut ranked: Vec<usize> = (0..scores.len()).collect();
    // stable, so equal scores keep index order:
    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    match ranked.as_slice() {
        [] => None,
        [best, ..] if *best != 0 => Some(*best),
        [_, second, ..] if scores[0] < threshold => Some(*second),
        _ => None,
    }
}

fn checked_index(label: i32, n_names: usize) -> Result<usize, Error> {
    match usize::try_from(label) {
        Ok(i) if i <= n_names => Ok(i),
        _ => Err(Error::LabelOutOfRange(label, n_names)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(1.0, similarity(4, 4, 4, 10));
        assert!((similarity(4, 4, 0, 10) - 0.2).abs() < 1e-12);
        assert_eq!(similarity(3, 5, 2, 10), similarity(5, 3, 2, 10));
    }

    #[test]
    fn test_best_non_background_wins() {
        assert_eq!(Some(2), assign_module(&[0.1, 0.3, 0.8], 0.95));
    }

    #[test]
    fn test_ties_go_to_lower_index() {
        assert_eq!(Some(1), assign_module(&[0.1, 0.7, 0.7], 0.95));
        // background ties with a module: background ranks first
        assert_eq!(Some(2), assign_module(&[0.7, 0.1, 0.7], 0.95));
        assert_eq!(None, assign_module(&[0.7, 0.1, 0.7], 0.5));
    }

    #[test]
    fn test_background_threshold_boundary() {
        // below threshold: fall back to second best
        assert_eq!(Some(1), assign_module(&[0.94, 0.5, 0.1], 0.95));
        // above threshold: unassigned
        assert_eq!(None, assign_module(&[0.96, 0.5, 0.1], 0.95));
        // exactly at threshold: unassigned
        assert_eq!(None, assign_module(&[0.95, 0.5, 0.1], 0.95));
    }

    #[test]
    fn test_background_only_overlap() {
        assert_eq!(Some(2), assign_module(&[0.9, 0.2, 0.4], 0.95));
        assert_eq!(None, assign_module(&[0.9, 0.2, 0.4], 0.5));
        // no module besides background to fall back to
        assert_eq!(None, assign_module(&[0.9], 0.95));
    }

    #[test]
    fn test_overlap_scores_identical_mask() -> anyhow::Result<()> {
        let regions = Array3::from_shape_vec((1, 2, 3), vec![1, 1, 0, 2, 3, 3])?;
        let modules = Array3::from_shape_vec((1, 2, 3), vec![1, 1, 0, 0, 2, 2])?;
        let scores = overlap_scores(&regions, 3, &modules, 2)?;
        assert_eq!((3, 3), scores.dim());
        assert_eq!(1.0, scores[[0, 1]]);
        assert_eq!(1.0, scores[[2, 2]]);
        assert!(scores[[1, 0]] > scores[[1, 1]]);
        Ok(())
    }

    #[test]
    fn test_overlap_scores_errors() -> anyhow::Result<()> {
        let a = Array3::from_shape_vec((1, 1, 2), vec![0, 1])?;
        let b = Array3::from_shape_vec((1, 2, 1), vec![0, 1])?;
        assert!(matches!(overlap_scores(&a, 1, &b, 1), Err(Error::ShapeMismatch(..))));

        let c = Array3::from_shape_vec((1, 1, 2), vec![0, 5])?;
        assert!(matches!(overlap_scores(&c, 1, &a, 1), Err(Error::LabelOutOfRange(5, 1))));
        Ok(())
    }
}
