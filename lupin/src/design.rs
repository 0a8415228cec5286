use crate::common::*;
use crate::error::LupinError;

/// Samples with exactly one active group in the design, in design
/// row order, and the groups they belong to. Group levels keep the
/// design's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAssignment {
    samples: Vec<Box<str>>,
    levels: Vec<Box<str>>,
    membership: Vec<usize>,
}

impl GroupAssignment {
    /// * `membership` - level index of each sample
    pub fn new(
        samples: Vec<Box<str>>,
        levels: Vec<Box<str>>,
        membership: Vec<usize>,
    ) -> anyhow::Result<Self> {
        if samples.len() != membership.len() {
            return Err(LupinError::type_mismatch(format!(
                "{} samples, but {} group labels",
                samples.len(),
                membership.len()
            )));
        }
        if samples.is_empty() {
            return Err(LupinError::design_shape("no sample is assigned to any group"));
        }
        if let Some(&k) = membership.iter().find(|&&k| k >= levels.len()) {
            return Err(LupinError::type_mismatch(format!(
                "group index {} out of {} levels",
                k,
                levels.len()
            )));
        }
        for (k, level) in levels.iter().enumerate() {
            if !membership.contains(&k) {
                return Err(LupinError::design_shape(format!(
                    "group `{}` has no samples",
                    level
                )));
            }
        }
        Ok(Self {
            samples,
            levels,
            membership,
        })
    }

    /// Derive the assignment from a one-hot design (samples x groups).
    ///
    /// Entries must be 0 or 1, every row sums to 0 or 1 and at least
    /// one row sums to 1. Rows summing to 0 are excluded; groups left
    /// without samples are dropped.
    pub fn from_design(design: &NamedMat) -> anyhow::Result<Self> {
        check_design(design)?;

        let mut samples = vec![];
        let mut assigned = vec![];
        for (i, row) in design.mat.row_iter().enumerate() {
            if let Some(k) = row.iter().position(|&v| v == 1.0) {
                samples.push(design.rows[i].clone());
                assigned.push(k);
            }
        }

        if samples.is_empty() {
            return Err(LupinError::design_shape("no sample is assigned to any group"));
        }

        // remap to the levels actually used, keeping column order
        let mut remap = vec![None; design.ncols()];
        let mut levels = vec![];
        for (k, group) in design.cols.iter().enumerate() {
            if assigned.contains(&k) {
                remap[k] = Some(levels.len());
                levels.push(group.clone());
            } else {
                warn!("group `{}` has no assigned samples; dropped", group);
            }
        }
        let membership = assigned
            .iter()
            .map(|&k| remap[k].ok_or(anyhow::anyhow!("unmapped group {}", k)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let excluded = design.nrows() - samples.len();
        if excluded > 0 {
            info!("{} sample(s) without a group are excluded", excluded);
        }

        Self::new(samples, levels, membership)
    }

    pub fn samples(&self) -> &[Box<str>] {
        &self.samples
    }

    pub fn levels(&self) -> &[Box<str>] {
        &self.levels
    }

    pub fn membership(&self) -> &[usize] {
        &self.membership
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_groups(&self) -> usize {
        self.levels.len()
    }

    pub fn group_of(&self, i: usize) -> &str {
        &self.levels[self.membership[i]]
    }

    /// Sample indexes of the `k`-th group
    pub fn members(&self, k: usize) -> Vec<usize> {
        self.membership
            .iter()
            .enumerate()
            .filter(|(_, &g)| g == k)
            .map(|(i, _)| i)
            .collect()
    }
}

fn check_design(design: &NamedMat) -> anyhow::Result<()> {
    if design.ncols() == 0 {
        return Err(LupinError::type_mismatch("design matrix has no group columns"));
    }

    if let Some(v) = design.mat.iter().find(|&&v| v != 0.0 && v != 1.0) {
        return Err(LupinError::type_mismatch(format!(
            "design entries must be 0 or 1, found {}",
            v
        )));
    }

    for (i, name) in design.rows.iter().enumerate() {
        if design.rows[..i].contains(name) {
            return Err(LupinError::type_mismatch(format!(
                "sample `{}` appears twice in the design",
                name
            )));
        }
    }

    for (i, row) in design.mat.row_iter().enumerate() {
        let total = row.sum();
        if total > 1.0 {
            let groups: Vec<&str> = design
                .cols
                .iter()
                .zip(row.iter())
                .filter(|(_, &v)| v == 1.0)
                .map(|(g, _)| g.as_ref())
                .collect();
            return Err(LupinError::design_shape(format!(
                "sample `{}` is assigned to {} groups ({})",
                design.rows[i],
                total,
                groups.join(", ")
            )));
        }
    }

    if design.mat.iter().all(|&v| v == 0.0) {
        return Err(LupinError::design_shape("no sample is assigned to any group"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design(rows: &[&str], cols: &[&str], values: &[f64]) -> NamedMat {
        MatWithNames {
            rows: rows.iter().map(|&r| r.into()).collect(),
            cols: cols.iter().map(|&c| c.into()).collect(),
            mat: Mat::from_row_slice(rows.len(), cols.len(), values),
        }
    }

    fn names(v: &[&str]) -> Vec<Box<str>> {
        v.iter().map(|&x| x.into()).collect()
    }

    fn kind(err: &anyhow::Error) -> &LupinError {
        crate::error::error_kind(err).expect("pipeline error")
    }

    #[test]
    fn keeps_assigned_samples_in_row_order() -> anyhow::Result<()> {
        let d = design(
            &["s1", "s2", "s3", "s4"],
            &["late", "early"],
            &[
                0., 1., //
                0., 0., //
                1., 0., //
                0., 1., //
            ],
        );
        let ga = GroupAssignment::from_design(&d)?;
        assert_eq!(ga.samples().to_vec(), names(&["s1", "s3", "s4"]));
        // declared order, not alphabetical
        assert_eq!(ga.levels().to_vec(), names(&["late", "early"]));
        assert_eq!(ga.membership(), &[1, 0, 1]);
        assert_eq!(ga.group_of(0), "early");
        assert_eq!(ga.members(1), vec![0, 2]);
        Ok(())
    }

    #[test]
    fn drops_empty_groups() -> anyhow::Result<()> {
        let d = design(&["s1", "s2"], &["a", "b", "c"], &[1., 0., 0., 0., 0., 1.]);
        let ga = GroupAssignment::from_design(&d)?;
        assert_eq!(ga.levels().to_vec(), names(&["a", "c"]));
        assert_eq!(ga.membership(), &[0, 1]);
        Ok(())
    }

    #[test]
    fn row_assigned_to_two_groups() {
        let d = design(&["s1", "s2"], &["a", "b"], &[1., 1., 0., 1.]);
        let err = GroupAssignment::from_design(&d).unwrap_err();
        assert!(matches!(kind(&err), LupinError::DesignShapeViolation(_)));
        assert!(err.to_string().contains("s1"));
    }

    #[test]
    fn nothing_assigned() {
        let d = design(&["s1", "s2"], &["a", "b"], &[0., 0., 0., 0.]);
        let err = GroupAssignment::from_design(&d).unwrap_err();
        assert!(matches!(kind(&err), LupinError::DesignShapeViolation(_)));
    }

    #[test]
    fn non_binary_entries() {
        let d = design(&["s1", "s2"], &["a", "b"], &[0.5, 0., 0., 1.]);
        let err = GroupAssignment::from_design(&d).unwrap_err();
        assert!(matches!(kind(&err), LupinError::TypeMismatch(_)));
    }

    #[test]
    fn duplicated_samples() {
        let d = design(&["s1", "s1"], &["a"], &[1., 1.]);
        let err = GroupAssignment::from_design(&d).unwrap_err();
        assert!(matches!(kind(&err), LupinError::TypeMismatch(_)));
    }

    #[test]
    fn explicit_construction_checks_levels() {
        let err = GroupAssignment::new(
            vec!["s1".into(), "s2".into()],
            vec!["a".into(), "b".into()],
            vec![0, 0],
        )
        .unwrap_err();
        assert!(matches!(kind(&err), LupinError::DesignShapeViolation(_)));

        let err = GroupAssignment::new(vec!["s1".into()], vec!["a".into()], vec![0, 0]).unwrap_err();
        assert!(matches!(kind(&err), LupinError::TypeMismatch(_)));
    }
}
