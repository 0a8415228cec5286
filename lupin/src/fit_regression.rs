use crate::common::*;
use crate::error::LupinError;
use crate::grid::PairGrid;
use crate::input::GridInputs;
use crate::ridge_cv::{RidgeFitter, RidgeModel};

use indicatif::{ParallelProgressIterator, ProgressIterator};
use rayon::prelude::*;

/// signature -> sample -> fitted model
pub type PrecomputedModels<M> = HashMap<Box<str>, HashMap<Box<str>, M>>;

/// Precomputed models must belong to a known signature and regress on
/// exactly its predictors, in the same order
pub fn check_precomputed<M: RidgeModel>(
    precomputed: &PrecomputedModels<M>,
    inputs: &GridInputs,
) -> anyhow::Result<()> {
    for (signature, models) in precomputed.iter() {
        let x = match inputs.signatures.iter().find(|&&(s, _)| s == signature.as_ref()) {
            Some(&(_, x)) => x,
            None => {
                return Err(LupinError::incompatible_model(
                    signature,
                    "not a signature of this run",
                ))
            }
        };

        for (sample, model) in models.iter() {
            if !inputs.assignment.samples().contains(sample) {
                warn!(
                    "precomputed model of `{}` for unassigned sample `{}` is ignored",
                    signature, sample
                );
                continue;
            }
            if model.predictor_names() != x.cols.as_slice() {
                return Err(LupinError::incompatible_model(
                    signature,
                    format!(
                        "model for sample `{}` has predictors [{}], expected [{}]",
                        sample,
                        model.predictor_names().join(", "),
                        x.cols.join(", ")
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Fit one ridge regression per (signature, sample) pair.
///
/// The response of a sample is its expression column and the fixed
/// offset its offset column. Models found in `precomputed` are used
/// as they are. With `parallel`, pairs are fitted on the current rayon
/// pool; the grid is assembled in pair order either way.
///
/// A failed pair is logged; the first failure in pair order is
/// returned as [`LupinError::PairFitFailed`].
pub fn fit_all<F>(
    fitter: &F,
    inputs: &GridInputs,
    precomputed: Option<PrecomputedModels<F::Model>>,
    parallel: bool,
) -> anyhow::Result<PairGrid<F::Model>>
where
    F: RidgeFitter,
{
    let signatures = inputs.signature_names();
    let samples = inputs.assignment.samples().to_vec();

    let mut precomputed = precomputed.unwrap_or_default();

    let jobs: Vec<(usize, usize, Option<F::Model>)> =
        PairGrid::<F::Model>::pair_indices(signatures.len(), samples.len())
            .into_iter()
            .map(|(s, j)| {
                let model = precomputed
                    .get_mut(&signatures[s])
                    .and_then(|models| models.remove(&samples[j]));
                (s, j, model)
            })
            .collect();

    let num_reused = jobs.iter().filter(|(_, _, m)| m.is_some()).count();
    if num_reused > 0 {
        info!("reusing {} precomputed model(s)", num_reused);
    }
    info!(
        "fitting {} regression(s): {} signature(s) x {} sample(s)",
        jobs.len() - num_reused,
        signatures.len(),
        samples.len()
    );

    let njobs = jobs.len() as u64;

    let fit_pair = |(s, j, model): (usize, usize, Option<F::Model>)| -> anyhow::Result<F::Model> {
        if let Some(model) = model {
            return Ok(model);
        }
        let (_, x) = inputs.signatures[s];
        let (y, offset) = inputs.response(j)?;
        fitter.fit(&x.mat, &x.cols, &y, &offset, inputs.standardize)
    };

    let results: Vec<anyhow::Result<F::Model>> = if parallel {
        jobs.into_par_iter()
            .progress_count(njobs)
            .map(fit_pair)
            .collect()
    } else {
        jobs.into_iter().progress_count(njobs).map(fit_pair).collect()
    };

    collect_grid(signatures, samples, results)
}

/// Keep the cells in pair order, or report the first failed pair
pub(crate) fn collect_grid<T>(
    signatures: Vec<Box<str>>,
    samples: Vec<Box<str>>,
    results: Vec<anyhow::Result<T>>,
) -> anyhow::Result<PairGrid<T>> {
    let nn = samples.len();
    let mut cells = Vec::with_capacity(results.len());
    let mut first_failure = None;

    for (idx, result) in results.into_iter().enumerate() {
        match result {
            Ok(cell) => cells.push(cell),
            Err(e) => {
                let (signature, sample) = (&signatures[idx / nn], &samples[idx % nn]);
                warn!("signature `{}`, sample `{}` failed: {}", signature, sample, e);
                if first_failure.is_none() {
                    first_failure = Some(LupinError::PairFitFailed {
                        signature: signature.to_string(),
                        sample: sample.to_string(),
                        message: format!("{:#}", e),
                    });
                }
            }
        }
    }

    if let Some(err) = first_failure {
        return Err(err.into());
    }

    PairGrid::from_cells(signatures, samples, cells)
}
