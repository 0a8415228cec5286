use crate::common::*;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// What the activity pipeline needs from a fitted ridge regression
pub trait RidgeModel {
    /// Regularization strength with the smallest cross-validation error
    fn lambda_min(&self) -> f64;

    /// Coefficients at `lambda` with the intercept at index 0
    fn coef(&self, lambda: f64) -> DVec;

    /// Names of the predictors, in coefficient order (intercept excluded)
    fn predictor_names(&self) -> &[Box<str>];
}

/// A ridge regression solver that picks its own penalty
pub trait RidgeFitter: Sync {
    type Model: RidgeModel + Send + Sync;

    /// Regress `y` on the columns of `x` with a fixed per-observation
    /// `offset` (not a predictor) and an L2-only penalty.
    fn fit(
        &self,
        x: &Mat,
        predictor_names: &[Box<str>],
        y: &DVec,
        offset: &DVec,
        standardize: bool,
    ) -> anyhow::Result<Self::Model>;
}

/// K-fold cross-validated ridge regression over a log-spaced
/// penalty path.
///
/// The objective follows the usual scaling
///
/// $$\frac{1}{2n}\|r - b_0 - Xb\|^2 + \frac{\lambda}{2}\|b\|^2,\quad r = y - \textrm{offset}$$
///
/// so every penalty has a closed-form solution through one SVD of
/// the centred (optionally scaled) predictors.
#[derive(Debug, Clone)]
pub struct CvRidge {
    pub nfolds: usize,
    pub nlambda: usize,
    /// smallest penalty as a fraction of the largest one; defaults to
    /// `1e-4` if there are more observations than predictors, `1e-2`
    /// otherwise
    pub lambda_min_ratio: Option<f64>,
    /// seed for fold assignment; every fit reuses it
    pub seed: u64,
}

impl Default for CvRidge {
    fn default() -> Self {
        Self {
            nfolds: 10,
            nlambda: 100,
            lambda_min_ratio: None,
            seed: 42,
        }
    }
}

/// Closed-form ridge solutions for one data set, valid at any penalty
#[derive(Debug, Clone)]
struct RidgeSolution {
    x_mean: DVec,
    x_scale: DVec,
    r_mean: f64,
    v: Mat,
    d: DVec,
    uty: DVec,
    nobs: usize,
}

impl RidgeSolution {
    fn new(x: &Mat, r: &DVec, standardize: bool) -> anyhow::Result<Self> {
        let nn = x.nrows();
        let pp = x.ncols();

        let x_mean = DVec::from_iterator(pp, x.column_iter().map(|x_j| x_j.mean()));

        let mut xs = x.clone();
        xs.centre_columns_inplace();

        let x_scale = if standardize {
            // population standard deviation
            DVec::from_iterator(
                pp,
                xs.column_iter().map(|x_j| {
                    let sd = (x_j.norm_squared() / nn as f64).sqrt();
                    if sd > 0.0 {
                        sd
                    } else {
                        1.0
                    }
                }),
            )
        } else {
            DVec::from_element(pp, 1.0)
        };

        for (mut x_j, &sd) in xs.column_iter_mut().zip(x_scale.iter()) {
            x_j /= sd;
        }

        let r_mean = r.mean();
        let rc = r.add_scalar(-r_mean);

        let svd = xs.svd(true, true);
        let u = svd.u.ok_or(anyhow::anyhow!("SVD failed to produce U"))?;
        let v_t = svd.v_t.ok_or(anyhow::anyhow!("SVD failed to produce V"))?;

        Ok(Self {
            x_mean,
            x_scale,
            r_mean,
            v: v_t.transpose(),
            d: svd.singular_values,
            uty: u.tr_mul(&rc),
            nobs: nn,
        })
    }

    fn npred(&self) -> usize {
        self.x_mean.len()
    }

    /// λ at which the coefficients are (almost) all shrunk away
    fn lambda_max(&self) -> f64 {
        let xty = &self.v * self.d.component_mul(&self.uty);
        xty.amax() / (self.nobs as f64 * 1e-3)
    }

    fn coef(&self, lambda: f64) -> DVec {
        let nl = lambda * self.nobs as f64;
        let shrunk = DVec::from_iterator(
            self.d.len(),
            self.d
                .iter()
                .zip(self.uty.iter())
                .map(|(&d, &u)| d * u / (d * d + nl)),
        );
        let b = (&self.v * shrunk).component_div(&self.x_scale);
        let b0 = self.r_mean - self.x_mean.dot(&b);

        let pp = self.npred();
        let mut ret = DVec::zeros(pp + 1);
        ret[0] = b0;
        ret.rows_mut(1, pp).copy_from(&b);
        ret
    }

    fn predict(coef: &DVec, x: &Mat) -> DVec {
        let pp = x.ncols();
        (x * coef.rows(1, pp)).add_scalar(coef[0])
    }
}

/// A cross-validated ridge fit
#[derive(Debug, Clone)]
pub struct CvRidgeFit {
    predictor_names: Vec<Box<str>>,
    /// penalty path in decreasing order
    pub lambda: Vec<f64>,
    /// mean held-out squared error along the path
    pub cvm: Vec<f64>,
    /// standard error of `cvm`
    pub cvsd: Vec<f64>,
    pub lambda_min: f64,
    /// largest penalty within one standard error of the minimum
    pub lambda_1se: f64,
    solution: RidgeSolution,
}

impl RidgeModel for CvRidgeFit {
    fn lambda_min(&self) -> f64 {
        self.lambda_min
    }

    fn coef(&self, lambda: f64) -> DVec {
        self.solution.coef(lambda)
    }

    fn predictor_names(&self) -> &[Box<str>] {
        &self.predictor_names
    }
}

impl CvRidge {
    fn lambda_path(&self, full: &RidgeSolution) -> Vec<f64> {
        let ratio = self.lambda_min_ratio.unwrap_or(if full.nobs > full.npred() {
            1e-4
        } else {
            1e-2
        });

        let mut lmax = full.lambda_max();
        if !(lmax.is_finite() && lmax > 0.0) {
            // constant response: every penalty gives zero slopes
            lmax = 1.0;
        }

        if self.nlambda == 1 {
            return vec![lmax];
        }

        let step = ratio.ln() / (self.nlambda - 1) as f64;
        (0..self.nlambda)
            .map(|l| lmax * (step * l as f64).exp())
            .collect()
    }

    fn fold_ids(&self, nn: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..nn).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);

        let mut folds = vec![0; nn];
        for (pos, &i) in order.iter().enumerate() {
            folds[i] = pos % self.nfolds;
        }
        folds
    }
}

impl RidgeFitter for CvRidge {
    type Model = CvRidgeFit;

    fn fit(
        &self,
        x: &Mat,
        predictor_names: &[Box<str>],
        y: &DVec,
        offset: &DVec,
        standardize: bool,
    ) -> anyhow::Result<CvRidgeFit> {
        let nn = x.nrows();

        if y.len() != nn || offset.len() != nn {
            anyhow::bail!(
                "{} observations in x, but y has {} and offset {}",
                nn,
                y.len(),
                offset.len()
            );
        }
        if predictor_names.len() != x.ncols() {
            anyhow::bail!("{} names for {} predictors", predictor_names.len(), x.ncols());
        }
        if self.nfolds < 3 {
            anyhow::bail!("nfolds must be at least 3, got {}", self.nfolds);
        }
        if self.nfolds > nn {
            anyhow::bail!("nfolds ({}) exceeds the number of observations ({})", self.nfolds, nn);
        }
        if self.nlambda == 0 {
            anyhow::bail!("empty lambda path");
        }

        let r = y - offset;
        let full = RidgeSolution::new(x, &r, standardize)?;
        let lambda = self.lambda_path(&full);
        let nlambda = lambda.len();

        let folds = self.fold_ids(nn);
        let mut cvraw = Mat::zeros(self.nfolds, nlambda);
        let mut weights = vec![0.0; self.nfolds];

        for (k, w_k) in weights.iter_mut().enumerate() {
            let train: Vec<usize> = (0..nn).filter(|&i| folds[i] != k).collect();
            let test: Vec<usize> = (0..nn).filter(|&i| folds[i] == k).collect();

            let sol = RidgeSolution::new(
                &x.select_rows(train.iter()),
                &r.select_rows(train.iter()),
                standardize,
            )?;
            let x_test = x.select_rows(test.iter());
            let r_test = r.select_rows(test.iter());

            for (l, &lam) in lambda.iter().enumerate() {
                let pred = RidgeSolution::predict(&sol.coef(lam), &x_test);
                cvraw[(k, l)] = (&r_test - pred).norm_squared() / test.len() as f64;
            }
            *w_k = test.len() as f64;
        }

        let wsum: f64 = weights.iter().sum();
        let mut cvm = vec![0.0; nlambda];
        let mut cvsd = vec![0.0; nlambda];
        for l in 0..nlambda {
            let mu = (0..self.nfolds)
                .map(|k| weights[k] * cvraw[(k, l)])
                .sum::<f64>()
                / wsum;
            let var = (0..self.nfolds)
                .map(|k| weights[k] * (cvraw[(k, l)] - mu).powi(2))
                .sum::<f64>()
                / wsum;
            cvm[l] = mu;
            cvsd[l] = (var / (self.nfolds - 1) as f64).sqrt();
        }

        // the path is decreasing, so the first minimum is the largest λ
        let mut imin = 0;
        for l in 1..nlambda {
            if cvm[l] < cvm[imin] {
                imin = l;
            }
        }
        let cutoff = cvm[imin] + cvsd[imin];
        let i1se = (0..=imin).find(|&l| cvm[l] <= cutoff).unwrap_or(imin);

        Ok(CvRidgeFit {
            predictor_names: predictor_names.to_vec(),
            lambda_min: lambda[imin],
            lambda_1se: lambda[i1se],
            lambda,
            cvm,
            cvsd,
            solution: full,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn toy_data() -> (Mat, DVec, DVec) {
        let nn = 40;
        let x = Mat::from_fn(nn, 3, |i, j| (((i * 7 + j * 13) % 11) as f64) / 5.0 - 1.0);
        let offset = DVec::from_fn(nn, |i, _| (i % 4) as f64 * 0.5);
        let noise = DVec::from_fn(nn, |i, _| ((i * 37 % 17) as f64 - 8.0) * 0.01);
        let y = &x * DVec::from_vec(vec![1.5, -2.0, 0.5]) + &offset + noise;
        (x, y.add_scalar(0.3), offset)
    }

    fn names(pp: usize) -> Vec<Box<str>> {
        (0..pp).map(|j| format!("p{}", j).into_boxed_str()).collect()
    }

    #[test]
    fn vanishing_penalty_reproduces_least_squares() -> anyhow::Result<()> {
        let (x, y, offset) = toy_data();
        let fit = CvRidge::default().fit(&x, &names(3), &y, &offset, false)?;

        // least squares with an intercept on the offset-adjusted response
        let mut xa = Mat::from_element(x.nrows(), 4, 1.0);
        xa.columns_mut(1, 3).copy_from(&x);
        let r = &y - &offset;
        let ols = (xa.transpose() * &xa)
            .try_inverse()
            .ok_or(anyhow::anyhow!("singular"))?
            * xa.transpose()
            * r;

        let coef = fit.coef(1e-12);
        assert_abs_diff_eq!(coef, ols, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn standardization_keeps_coefficients_on_the_original_scale() -> anyhow::Result<()> {
        let (x, y, offset) = toy_data();
        let ridge = CvRidge::default();
        let raw = ridge.fit(&x, &names(3), &y, &offset, false)?;
        let std = ridge.fit(&x, &names(3), &y, &offset, true)?;

        // both converge to the same unpenalized solution
        assert_abs_diff_eq!(raw.coef(1e-12), std.coef(1e-12), epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn standardization_uses_population_sd() -> anyhow::Result<()> {
        let (x, y, offset) = toy_data();
        let mut x = x;
        x.column_mut(2).fill(2.5);
        let r = &y - &offset;

        let sol = RidgeSolution::new(&x, &r, true)?;
        for j in 0..2 {
            let x_j = x.column(j);
            let mu = x_j.mean();
            let sd = (x_j.iter().map(|&v| (v - mu) * (v - mu)).sum::<f64>() / 40.0).sqrt();
            assert_abs_diff_eq!(sol.x_mean[j], mu, epsilon = 1e-14);
            assert_abs_diff_eq!(sol.x_scale[j], sd, epsilon = 1e-12);
        }

        // a constant column is only centred and never enters the fit
        assert_eq!(sol.x_scale[2], 1.0);
        assert_abs_diff_eq!(sol.coef(0.1)[3], 0.0, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn penalty_path_and_selection() -> anyhow::Result<()> {
        let (x, y, offset) = toy_data();
        let fit = CvRidge::default().fit(&x, &names(3), &y, &offset, true)?;

        assert_eq!(fit.lambda.len(), 100);
        assert!(fit.lambda.windows(2).all(|w| w[0] > w[1]));
        assert!(fit.lambda_1se >= fit.lambda_min);
        assert!(fit.lambda.contains(&fit.lambda_min));

        let imin = fit
            .lambda
            .iter()
            .position(|&l| l == fit.lambda_min)
            .ok_or(anyhow::anyhow!("missing"))?;
        assert!(fit.cvm.iter().all(|&m| m >= fit.cvm[imin]));
        Ok(())
    }

    #[test]
    fn fixed_seed_is_reproducible() -> anyhow::Result<()> {
        let (x, y, offset) = toy_data();
        let ridge = CvRidge {
            nfolds: 5,
            ..Default::default()
        };
        let a = ridge.fit(&x, &names(3), &y, &offset, true)?;
        let b = ridge.fit(&x, &names(3), &y, &offset, true)?;
        assert_eq!(a.cvm, b.cvm);
        assert_eq!(a.lambda_min, b.lambda_min);
        assert_eq!(a.coef(a.lambda_min), b.coef(b.lambda_min));
        Ok(())
    }

    #[test]
    fn rejects_bad_fold_numbers() {
        let (x, y, offset) = toy_data();
        let too_few = CvRidge {
            nfolds: 2,
            ..Default::default()
        };
        assert!(too_few.fit(&x, &names(3), &y, &offset, true).is_err());

        let too_many = CvRidge {
            nfolds: 41,
            ..Default::default()
        };
        assert!(too_many.fit(&x, &names(3), &y, &offset, true).is_err());
    }
}
