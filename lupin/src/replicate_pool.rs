use crate::common::*;
use crate::design::GroupAssignment;
use crate::error::LupinError;
use crate::pvalue_combine::fisher_combine;
use crate::ridge_significance::SignificanceTable;

/// Group-level statistics of one signature; every matrix is
/// predictors x groups with groups in assignment level order
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPooling {
    /// inverse-variance weighted mean coefficient
    pub coefficient: NamedMat,
    /// weighted mean divided by its pooled standard error
    pub zscore: NamedMat,
    /// Fisher-combined p-value of the replicates (NaN for groups
    /// with a single sample)
    pub pvalue: NamedMat,
}

/// Pool per-sample coefficient tables of one signature into group
/// statistics.
///
/// For each group and predictor, with `w = 1 / se²`:
///
/// ```text
/// mean = Σ coef·w / Σ w,   se = sqrt(1 / Σ w),   z = mean / se
/// ```
///
/// A group of one sample reports that sample's own coefficient and
/// Z-score.
///
/// * `tables` - one table per sample, in assignment sample order
pub fn pool_group_statistics(
    tables: &[SignificanceTable],
    assignment: &GroupAssignment,
) -> anyhow::Result<GroupPooling> {
    if tables.len() != assignment.len() {
        return Err(LupinError::type_mismatch(format!(
            "{} tables for {} assigned samples",
            tables.len(),
            assignment.len()
        )));
    }

    let predictors = match tables.first() {
        Some(t) => t.predictors.clone(),
        None => return Err(LupinError::design_shape("no sample to pool")),
    };

    for (i, t) in tables.iter().enumerate() {
        if t.predictors != predictors {
            return Err(LupinError::type_mismatch(format!(
                "predictors of sample `{}` differ from those of sample `{}`",
                assignment.samples()[i],
                assignment.samples()[0]
            )));
        }
    }

    let npred = predictors.len();
    let ngroups = assignment.num_groups();

    let mut coefficient = Mat::zeros(npred, ngroups);
    let mut zscore = Mat::zeros(npred, ngroups);
    let mut pvalue = Mat::from_element(npred, ngroups, f64::NAN);

    for k in 0..ngroups {
        let members = assignment.members(k);

        if members.is_empty() {
            return Err(LupinError::design_shape(format!(
                "group `{}` has no samples",
                assignment.levels()[k]
            )));
        }

        for i in 0..npred {
            let (mean, se) = if let [only] = members.as_slice() {
                let t = &tables[*only];
                (t.coefficient[i], t.standard_error[i])
            } else {
                let (swc, sw) = members.iter().fold((0.0, 0.0), |(swc, sw), &m| {
                    let t = &tables[m];
                    let w = 1.0 / t.standard_error[i].powi(2);
                    (swc + t.coefficient[i] * w, sw + w)
                });
                (swc / sw, (1.0 / sw).sqrt())
            };

            coefficient[(i, k)] = mean;
            zscore[(i, k)] = mean / se;

            if members.len() > 1 {
                let pv: Vec<f64> = members.iter().map(|&m| tables[m].p_value[i]).collect();
                match fisher_combine(&pv, false, false) {
                    Ok(p) => pvalue[(i, k)] = p,
                    Err(e) => warn!(
                        "group `{}`, predictor `{}`: no combined p-value ({})",
                        assignment.levels()[k],
                        predictors[i],
                        e
                    ),
                }
            }
        }
    }

    let named = |mat: Mat| MatWithNames {
        rows: predictors.clone(),
        cols: assignment.levels().to_vec(),
        mat,
    };

    Ok(GroupPooling {
        coefficient: named(coefficient),
        zscore: named(zscore),
        pvalue: named(pvalue),
    })
}
