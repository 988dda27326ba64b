use ndarray::Array2;

use crate::similarity::{assign_module, overlap_scores};
use crate::{Error, Volume, NA};

/// Labels reordered so that regions of the same module are contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct Relabeled {
    /// region names in their new order; `labels[k]` is new label `k + 1`
    pub labels: Vec<String>,
    /// module of each region in `labels`, or `NA`
    pub modules: Vec<String>,
    /// the input volume with every label replaced through `lut`
    pub volume: Volume,
    /// `lut[old label] == new label`; `lut[0] == 0`
    pub lut: Vec<i32>,
    /// region/module similarity, if modules were computed from overlap
    pub scores: Option<Array2<f64>>,
}

/// Assign each region of `region_volume` to its best matching module of `module_volume`,
/// then reorder and renumber the regions by module.
///
/// Regions left unassigned get module `NA` and sort after all assigned ones.
pub fn relabel(
    region_labels: &[String],
    region_volume: &Volume,
    module_labels: &[String],
    module_volume: &Volume,
    overlap_threshold: f64,
) -> Result<Relabeled, Error> {
    let scores = overlap_scores(
        region_volume,
        region_labels.len(),
        module_volume,
        module_labels.len(),
    )?;

    let assigned: Vec<Option<&str>> = scores
        .rows()
        .into_iter()
        .map(|row| {
            let row = row.to_vec();
            assign_module(&row, overlap_threshold).map(|m| module_labels[m - 1].as_str())
        })
        .collect();

    let n_na = assigned.iter().filter(|m| m.is_none()).count();
    if n_na > 0 {
        log::info!("{n_na} of {} regions match no module", region_labels.len());
    }

    let mut out = reorder(region_labels, &assigned, region_volume)?;
    out.scores = Some(scores);
    Ok(out)
}

/// Reorder `labels` by the given `modules` (stable within a module) and renumber `volume`.
pub fn relabel_by_modules(
    labels: &[String],
    modules: &[String],
    volume: &Volume,
) -> Result<Relabeled, Error> {
    if labels.len() != modules.len() {
        return Err(Error::LengthMismatch(labels.len(), modules.len()));
    }
    let assigned: Vec<Option<&str>> = modules.iter().map(|m| Some(m.as_str())).collect();
    reorder(labels, &assigned, volume)
}

/// Every region is its own module. Performs no overlap computation,
/// so the result has the same shape as that of `relabel`.
pub fn dummy_modules(labels: &[String], volume: &Volume) -> Result<Relabeled, Error> {
    relabel_by_modules(labels, labels, volume)
}

fn reorder(
    labels: &[String],
    modules: &[Option<&str>],
    volume: &Volume,
) -> Result<Relabeled, Error> {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by_key(|&i| (modules[i].is_none(), modules[i]));

    let mut lut = vec![0; labels.len() + 1];
    for (pos, &i) in order.iter().enumerate() {
        lut[i + 1] = pos as i32 + 1;
    }

    let mut relabeled = volume.clone();
    for v in relabeled.iter_mut() {
        *v = match usize::try_from(*v) {
            Ok(i) if i < lut.len() => lut[i],
            _ => return Err(Error::LabelOutOfRange(*v, labels.len())),
        };
    }

    Ok(Relabeled {
        labels: order.iter().map(|&i| labels[i].clone()).collect(),
        modules: order
            .iter()
            .map(|&i| modules[i].unwrap_or(NA).to_owned())
            .collect(),
        volume: relabeled,
        lut,
        scores: None,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use ndarray::Array3;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_region_identical_to_module() -> Result<()> {
        // regions 1 and 2 are disjoint; region 3 is exactly module 2
        let regions = Array3::from_shape_vec((2, 2, 2), vec![1, 1, 2, 2, 3, 3, 0, 0])?;
        let modules = Array3::from_shape_vec((2, 2, 2), vec![1, 1, 1, 0, 2, 2, 0, 0])?;
        let out = relabel(
            &names(&["a", "b", "c"]),
            &regions,
            &names(&["vis", "smn"]),
            &modules,
            0.5,
        )?;

        let scores = out.scores.as_ref().unwrap();
        assert_eq!(1.0, scores[[2, 2]]);

        let c = out.labels.iter().position(|l| l == "c").unwrap();
        assert_eq!("smn", out.modules[c]);
        let a = out.labels.iter().position(|l| l == "a").unwrap();
        assert_eq!("vis", out.modules[a]);
        Ok(())
    }

    #[test]
    fn test_unassigned_regions_sort_last() -> Result<()> {
        let regions = Array3::from_shape_vec((1, 1, 6), vec![1, 1, 1, 2, 3, 0])?;
        let modules = Array3::from_shape_vec((1, 1, 6), vec![0, 0, 0, 2, 1, 0])?;
        // region 1 lies inside background and matches it best
        let out = relabel(
            &names(&["bg_only", "motor_roi", "visual_roi"]),
            &regions,
            &names(&["visual", "motor"]),
            &modules,
            0.1,
        )?;
        assert_eq!(names(&["motor_roi", "visual_roi", "bg_only"]), out.labels);
        assert_eq!(names(&["motor", "visual", NA]), out.modules);
        assert_eq!(vec![0, 3, 1, 2], out.lut);
        assert_eq!(&[3, 3, 3, 1, 2, 0], out.volume.as_slice().unwrap());
        Ok(())
    }

    #[test]
    fn test_background_stays_zero() -> Result<()> {
        let volume = Array3::from_shape_vec((1, 2, 2), vec![0, 3, 2, 1])?;
        for modules in [["z", "y", "x"], ["a", "a", "a"], ["c", "a", "b"]] {
            let out = relabel_by_modules(&names(&["r1", "r2", "r3"]), &names(&modules), &volume)?;
            assert_eq!(0, out.lut[0]);
            assert_eq!(0, out.volume[[0, 0, 0]]);
            assert!(out.volume.iter().skip(1).all(|&v| v > 0));
        }
        Ok(())
    }

    #[test]
    fn test_sort_is_stable_within_module() -> Result<()> {
        let volume = Array3::from_shape_vec((1, 1, 4), vec![1, 2, 3, 4])?;
        let out = relabel_by_modules(
            &names(&["r1", "r2", "r3", "r4"]),
            &names(&["b", "a", "b", "a"]),
            &volume,
        )?;
        assert_eq!(names(&["r2", "r4", "r1", "r3"]), out.labels);
        assert_eq!(names(&["a", "a", "b", "b"]), out.modules);
        assert_eq!(&[3, 1, 4, 2], out.volume.as_slice().unwrap());
        Ok(())
    }

    #[test]
    fn test_dummy_modules() -> Result<()> {
        let volume = Array3::from_shape_vec((1, 1, 3), vec![0, 2, 1])?;
        let out = dummy_modules(&names(&["b", "a"]), &volume)?;
        assert_eq!(out.labels, out.modules);
        assert!(out.scores.is_none());
        Ok(())
    }

    #[test]
    fn test_errors() -> Result<()> {
        let volume = Array3::from_shape_vec((1, 1, 2), vec![0, 7])?;
        let err = relabel_by_modules(&names(&["a"]), &names(&["m"]), &volume).unwrap_err();
        assert!(matches!(err, Error::LabelOutOfRange(7, 1)));

        let err = relabel_by_modules(&names(&["a", "b"]), &names(&["m"]), &volume).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch(2, 1)));
        Ok(())
    }
}
