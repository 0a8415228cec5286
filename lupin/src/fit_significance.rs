use crate::common::*;
use crate::error::LupinError;
use crate::fit_regression::collect_grid;
use crate::grid::PairGrid;
use crate::input::GridInputs;
use crate::ridge_cv::RidgeModel;
use crate::ridge_significance::{compute_significance, SharedSvd, SignificanceTable};

use indicatif::{ParallelProgressIterator, ProgressIterator};
use rayon::prelude::*;

/// Test the coefficients of every fitted (signature, sample) pair.
///
/// Each signature is decomposed once. A pair's coefficients are taken
/// at the model's own `lambda_min`, the response is expression minus
/// offset, and the intercept is not tested.
pub fn test_all<M>(
    inputs: &GridInputs,
    models: &PairGrid<M>,
    parallel: bool,
) -> anyhow::Result<PairGrid<SignificanceTable>>
where
    M: RidgeModel + Sync,
{
    let signatures = inputs.signature_names();
    let samples = inputs.assignment.samples().to_vec();

    if models.signatures() != signatures.as_slice() || models.samples() != samples.as_slice() {
        return Err(LupinError::type_mismatch(
            "fitted models don't cover the signature x sample grid of this run",
        ));
    }

    let svds = inputs
        .signatures
        .iter()
        .map(|&(_, x)| SharedSvd::new(&x.mat, inputs.standardize))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let jobs = PairGrid::<SignificanceTable>::pair_indices(signatures.len(), samples.len());
    let njobs = jobs.len() as u64;
    info!("testing {} fitted model(s)", njobs);

    let test_pair = |&(s, j): &(usize, usize)| -> anyhow::Result<SignificanceTable> {
        let (_, x) = inputs.signatures[s];
        let model = models.at(s, j);

        let (y, offset) = inputs.response(j)?;
        let lambda = model.lambda_min();
        let coef = model.coef(lambda);
        if coef.len() != x.ncols() + 1 {
            return Err(LupinError::type_mismatch(format!(
                "{} coefficients with intercept for {} predictors",
                coef.len(),
                x.ncols()
            )));
        }
        let beta = coef.rows(1, x.ncols()).into_owned();

        compute_significance(
            x,
            &(y - offset),
            &beta,
            lambda,
            inputs.standardize,
            Some(&svds[s]),
        )
    };

    let results: Vec<anyhow::Result<SignificanceTable>> = if parallel {
        jobs.par_iter().progress_count(njobs).map(test_pair).collect()
    } else {
        jobs.iter().progress_count(njobs).map(test_pair).collect()
    };

    collect_grid(signatures, samples, results)
}
