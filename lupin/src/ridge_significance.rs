use crate::common::*;
use crate::error::LupinError;

use special::Error;

/// Singular value decomposition `x = U diag(d) Vᵗ` of a predictor
/// matrix, shared by all samples regressed on the same signature
#[derive(Debug, Clone)]
pub struct SharedSvd {
    pub u: Mat,
    pub d: DVec,
    pub v: Mat,
}

impl SharedSvd {
    /// * `standardize` - centre and scale columns (sample sd) first
    pub fn new(x: &Mat, standardize: bool) -> anyhow::Result<Self> {
        let xs = if standardize {
            x.scale_columns()
        } else {
            x.clone()
        };
        let svd = xs.svd(true, true);
        let u = svd.u.ok_or(anyhow::anyhow!("SVD failed to produce U"))?;
        let v_t = svd.v_t.ok_or(anyhow::anyhow!("SVD failed to produce V"))?;
        Ok(Self {
            u,
            d: svd.singular_values,
            v: v_t.transpose(),
        })
    }

    pub fn nobs(&self) -> usize {
        self.u.nrows()
    }

    pub fn npred(&self) -> usize {
        self.v.nrows()
    }
}

/// One predictor's row of a [`SignificanceTable`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignificanceRow {
    pub coefficient: f64,
    pub standard_error: f64,
    pub t_statistic: f64,
    pub p_value: f64,
}

/// Coefficient test results for one (signature, sample) pair
#[derive(Debug, Clone, PartialEq)]
pub struct SignificanceTable {
    pub predictors: Vec<Box<str>>,
    pub coefficient: Vec<f64>,
    pub standard_error: Vec<f64>,
    pub t_statistic: Vec<f64>,
    pub p_value: Vec<f64>,
}

impl SignificanceTable {
    pub const COLUMNS: [&'static str; 4] =
        ["coefficient", "standard_error", "t_statistic", "p_value"];

    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }

    pub fn position(&self, predictor: &str) -> Option<usize> {
        self.predictors.iter().position(|p| p.as_ref() == predictor)
    }

    pub fn row_at(&self, i: usize) -> SignificanceRow {
        SignificanceRow {
            coefficient: self.coefficient[i],
            standard_error: self.standard_error[i],
            t_statistic: self.t_statistic[i],
            p_value: self.p_value[i],
        }
    }

    pub fn row(&self, predictor: &str) -> Option<SignificanceRow> {
        self.position(predictor).map(|i| self.row_at(i))
    }

    /// Signed Z-score `coefficient / standard_error`
    pub fn z_score(&self, i: usize) -> f64 {
        self.coefficient[i] / self.standard_error[i]
    }

    /// predictors x {coefficient, standard_error, t_statistic, p_value}
    pub fn to_named_mat(&self) -> NamedMat {
        let nn = self.len();
        let mut mat = Mat::zeros(nn, 4);
        for (k, col) in [
            &self.coefficient,
            &self.standard_error,
            &self.t_statistic,
            &self.p_value,
        ]
        .into_iter()
        .enumerate()
        {
            mat.set_column(k, &DVec::from_column_slice(col));
        }
        MatWithNames {
            rows: self.predictors.clone(),
            cols: Self::COLUMNS.iter().map(|&c| c.into()).collect(),
            mat,
        }
    }
}

/// Closed-form standard errors, t-statistics and p-values of ridge
/// coefficients.
///
/// With `x = U diag(d) Vᵗ`, `d2 = d²` and `div = d2 + λ`:
///
/// ```text
/// σ² = ‖y − U diag(d2/div) Uᵗ y‖² / (n − Σ d2 (d2 + 2λ) / div²)
/// Var(β) = σ² V diag(d2/div²) Vᵗ
/// t = |β| / se,   p = 2 (1 − Φ(t))
/// ```
///
/// The p-value uses the normal approximation, not a t distribution.
///
/// * `x` - observations x predictors; column names name the rows of
///   the result
/// * `y` - offset-adjusted response
/// * `beta` - fitted coefficients without the intercept
/// * `lambda` - penalty at which `beta` was estimated
/// * `standardize` - standardize `x` before decomposing it
/// * `svd` - decomposition of the (standardized) `x`, computed here if
///   missing
pub fn compute_significance(
    x: &NamedMat,
    y: &DVec,
    beta: &DVec,
    lambda: f64,
    standardize: bool,
    svd: Option<&SharedSvd>,
) -> anyhow::Result<SignificanceTable> {
    let nn = x.nrows();
    let pp = x.ncols();

    if y.len() != nn {
        return Err(LupinError::type_mismatch(format!(
            "response has {} values for {} observations",
            y.len(),
            nn
        )));
    }
    if beta.len() != pp {
        return Err(LupinError::type_mismatch(format!(
            "{} coefficients for {} predictors",
            beta.len(),
            pp
        )));
    }

    let owned;
    let svd = match svd {
        Some(svd) => svd,
        None => {
            owned = SharedSvd::new(&x.mat, standardize)?;
            &owned
        }
    };

    if svd.nobs() != nn || svd.npred() != pp {
        return Err(LupinError::type_mismatch(format!(
            "decomposition is {} x {}, predictors are {} x {}",
            svd.nobs(),
            svd.npred(),
            nn,
            pp
        )));
    }

    let d2 = svd.d.map(|d| d * d);
    let div = d2.add_scalar(lambda);

    let shrink = d2.component_div(&div);
    let fitted = &svd.u * svd.u.tr_mul(y).component_mul(&shrink);
    let rss = (y - fitted).norm_squared();

    let edf: f64 = d2
        .iter()
        .zip(div.iter())
        .map(|(&a, &b)| a * (a + 2.0 * lambda) / (b * b))
        .sum();
    let sigma2 = rss / (nn as f64 - edf);

    let w = d2.component_div(&div.component_mul(&div));

    // diag(V diag(w) Vᵗ)
    let standard_error: Vec<f64> = svd
        .v
        .row_iter()
        .map(|v_j| {
            let var = v_j
                .iter()
                .zip(w.iter())
                .map(|(&v, &w)| v * v * w)
                .sum::<f64>();
            (sigma2 * var).sqrt()
        })
        .collect();

    let t_statistic: Vec<f64> = beta
        .iter()
        .zip(standard_error.iter())
        .map(|(b, se)| b.abs() / se)
        .collect();

    let p_value = t_statistic
        .iter()
        .map(|t| (t / std::f64::consts::SQRT_2).compl_error())
        .collect();

    Ok(SignificanceTable {
        predictors: x.cols.clone(),
        coefficient: beta.iter().copied().collect(),
        standard_error,
        t_statistic,
        p_value,
    })
}
