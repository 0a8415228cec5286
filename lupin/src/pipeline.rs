use crate::common::*;
use crate::design::GroupAssignment;
use crate::error::LupinError;
use crate::fit_regression::{check_precomputed, fit_all, PrecomputedModels};
use crate::fit_significance::test_all;
use crate::grid::PairGrid;
use crate::input::{AssayBundle, GridInputs};
use crate::pvalue_combine::stouffer_combine;
use crate::replicate_pool::{pool_group_statistics, GroupPooling};
use crate::ridge_cv::{RidgeFitter, RidgeModel};
use crate::ridge_significance::SignificanceTable;

use std::cmp::Ordering;

/// What to run on an [`AssayBundle`]
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// assay holding expression (features x samples)
    pub expression: Box<str>,
    /// assay holding the baseline offset (features x samples)
    pub offset: Box<str>,
    /// signature assays (features x predictors)
    pub signatures: Vec<Box<str>>,
    /// samples x groups; the bundle's design if `None`
    pub design: Option<NamedMat>,
    pub standardize: bool,
    pub parallel: bool,
    /// threads of the pool used when `parallel`; all cores if `None`
    pub num_jobs: Option<usize>,
    pub compute_significance: bool,
}

impl RunArgs {
    pub fn new(expression: &str, offset: &str, signatures: &[&str]) -> Self {
        Self {
            expression: expression.into(),
            offset: offset.into(),
            signatures: signatures.iter().map(|&s| s.into()).collect(),
            design: None,
            standardize: true,
            parallel: false,
            num_jobs: None,
            compute_significance: true,
        }
    }
}

/// Final per-signature table: pooled coefficient of every group and
/// the combined Z-score of each predictor
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityTable {
    pub predictors: Vec<Box<str>>,
    pub groups: Vec<Box<str>>,
    /// predictors x groups
    pub coefficient: Mat,
    pub combined_z: Vec<f64>,
}

impl ActivityTable {
    pub const COMBINED_Z: &'static str = "combined_z";

    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }

    pub fn position(&self, predictor: &str) -> Option<usize> {
        self.predictors.iter().position(|p| p.as_ref() == predictor)
    }

    /// Stable sort by decreasing `|combined_z|`, missing values last
    pub fn sort_by_combined_z(&mut self) {
        let z = &self.combined_z;
        let mut order: Vec<usize> = (0..z.len()).collect();
        order.sort_by(|&a, &b| {
            let (za, zb) = (z[a].abs(), z[b].abs());
            match (za.is_nan(), zb.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => zb.partial_cmp(&za).unwrap_or(Ordering::Equal),
            }
        });

        self.predictors = order.iter().map(|&i| self.predictors[i].clone()).collect();
        self.coefficient = self.coefficient.select_rows(order.iter());
        self.combined_z = order.iter().map(|&i| self.combined_z[i]).collect();
    }

    /// predictors x (groups..., `combined_z`)
    pub fn to_named_mat(&self) -> NamedMat {
        let mut cols = self.groups.clone();
        cols.push(Self::COMBINED_Z.into());

        let ngroups = self.groups.len();
        let mut mat = self.coefficient.clone().insert_column(ngroups, 0.0);
        mat.set_column(ngroups, &DVec::from_column_slice(&self.combined_z));

        MatWithNames {
            rows: self.predictors.clone(),
            cols,
            mat,
        }
    }
}

/// Everything computed for one signature
#[derive(Debug, Clone)]
pub struct SignatureActivity {
    pub name: Box<str>,
    /// group statistics; `None` when significance was not computed
    pub pooled: Option<GroupPooling>,
    pub table: ActivityTable,
}

pub struct PipelineResult<M> {
    pub assignment: GroupAssignment,
    /// fitted model of every (signature, sample)
    pub models: PairGrid<M>,
    /// coefficient tests of every (signature, sample)
    pub significance: Option<PairGrid<SignificanceTable>>,
    /// in the order of the run's signatures
    pub activities: Vec<SignatureActivity>,
}

impl<M> PipelineResult<M> {
    pub fn activity(&self, signature: &str) -> Option<&SignatureActivity> {
        self.activities.iter().find(|a| a.name.as_ref() == signature)
    }
}

/// Estimate regulator activities of every signature in `args`.
///
/// 1. validate assays, design and precomputed models
/// 2. fit one ridge regression per (signature, sample)
/// 3. test coefficients and pool replicates per group (unless
///    `compute_significance` is off)
/// 4. combine groups into one Z-score per predictor and rank
///
/// When `parallel`, a thread pool of `num_jobs` threads runs both the
/// fitting and the testing.
pub fn run<F>(
    bundle: &AssayBundle,
    fitter: &F,
    args: &RunArgs,
    precomputed: Option<PrecomputedModels<F::Model>>,
) -> anyhow::Result<PipelineResult<F::Model>>
where
    F: RidgeFitter,
{
    check_identifiers(bundle, args)?;

    let (expression, offset, signatures) = resolve_assays(bundle, args)?;
    check_alignment(expression, offset, &signatures)?;
    check_signature_variance(&signatures)?;

    let design = args
        .design
        .as_ref()
        .or(bundle.design())
        .ok_or_else(|| LupinError::type_mismatch("no design matrix given"))?;
    let assignment = assign_samples(design, expression, offset)?;

    let inputs = GridInputs {
        signatures,
        expression,
        offset,
        assignment: &assignment,
        standardize: args.standardize,
    };

    if let Some(precomputed) = precomputed.as_ref() {
        check_precomputed(precomputed, &inputs)?;
    }

    info!(
        "{} sample(s) in {} group(s): {}",
        assignment.len(),
        assignment.num_groups(),
        assignment.levels().join(", ")
    );

    let run_grid = || -> anyhow::Result<_> {
        let models = fit_all(fitter, &inputs, precomputed, args.parallel)?;
        let significance = if args.compute_significance {
            Some(test_all(&inputs, &models, args.parallel)?)
        } else {
            None
        };
        Ok((models, significance))
    };

    let (models, significance) = if args.parallel {
        let num_jobs = args.num_jobs.unwrap_or_else(num_cpus::get).max(1);
        info!("running on {} thread(s)", num_jobs);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_jobs)
            .build()?;
        pool.install(run_grid)?
    } else {
        run_grid()?
    };

    let mut activities = Vec::with_capacity(inputs.signatures.len());

    for (s, &(name, x)) in inputs.signatures.iter().enumerate() {
        let activity = match significance.as_ref() {
            Some(tables) => {
                let tables = tables
                    .row(name)
                    .ok_or_else(|| anyhow::anyhow!("no tables for signature `{}`", name))?;
                let pooled = pool_group_statistics(tables, &assignment)?;
                let mut table = combine_groups(&pooled);
                table.sort_by_combined_z();
                SignatureActivity {
                    name: name.into(),
                    pooled: Some(pooled),
                    table,
                }
            }
            None => SignatureActivity {
                name: name.into(),
                pooled: None,
                table: mean_coefficients(&x.cols, &models, s, &assignment),
            },
        };

        if let (Some(top), Some(z)) = (
            activity.table.predictors.first(),
            activity.table.combined_z.first(),
        ) {
            info!("{}: top predictor {} (combined z = {:.3})", name, top, z);
        }
        activities.push(activity);
    }

    Ok(PipelineResult {
        assignment,
        models,
        significance,
        activities,
    })
}

/// Stouffer across groups, or the group's own Z-score if there is
/// only one
fn combine_groups(pooled: &GroupPooling) -> ActivityTable {
    let z = &pooled.zscore.mat;
    let combined_z = if z.ncols() > 1 {
        z.row_iter()
            .map(|row| stouffer_combine(&row.iter().copied().collect::<Vec<_>>()))
            .collect()
    } else {
        z.column(0).iter().copied().collect()
    };

    ActivityTable {
        predictors: pooled.coefficient.rows.clone(),
        groups: pooled.coefficient.cols.clone(),
        coefficient: pooled.coefficient.mat.clone(),
        combined_z,
    }
}

/// Plain group means of the coefficients at `lambda_min`, without
/// combined Z-scores
fn mean_coefficients<M: RidgeModel>(
    predictors: &[Box<str>],
    models: &PairGrid<M>,
    s: usize,
    assignment: &GroupAssignment,
) -> ActivityTable {
    let npred = predictors.len();
    let mut coefficient = Mat::zeros(npred, assignment.num_groups());

    for k in 0..assignment.num_groups() {
        let members = assignment.members(k);
        for &j in members.iter() {
            let model = models.at(s, j);
            let coef = model.coef(model.lambda_min());
            for i in 0..npred {
                coefficient[(i, k)] += coef[i + 1];
            }
        }
        coefficient.column_mut(k).unscale_mut(members.len() as f64);
    }

    ActivityTable {
        predictors: predictors.to_vec(),
        groups: assignment.levels().to_vec(),
        coefficient,
        combined_z: vec![f64::NAN; npred],
    }
}

////////////////////////////////
// validation, in the order   //
// errors are reported        //
////////////////////////////////

fn check_identifiers(bundle: &AssayBundle, args: &RunArgs) -> anyhow::Result<()> {
    if args.signatures.is_empty() {
        return Err(LupinError::type_mismatch("no signature to regress on"));
    }

    if args.expression == args.offset {
        return Err(LupinError::identifier_conflict(format!(
            "`{}` names both the expression and the offset",
            args.expression
        )));
    }

    for (i, sig) in args.signatures.iter().enumerate() {
        if *sig == args.expression || *sig == args.offset {
            return Err(LupinError::identifier_conflict(format!(
                "signature `{}` is also the expression or the offset",
                sig
            )));
        }
        if args.signatures[..i].contains(sig) {
            return Err(LupinError::identifier_conflict(format!(
                "signature `{}` is listed twice",
                sig
            )));
        }
    }

    let names = std::iter::once(&args.expression)
        .chain(std::iter::once(&args.offset))
        .chain(args.signatures.iter());

    for name in names {
        if bundle.assay(name).is_none() {
            return Err(LupinError::identifier_conflict(format!(
                "no assay named `{}`; available: {}",
                name,
                bundle.assay_names().join(", ")
            )));
        }
    }

    for sig in args.signatures.iter() {
        if let Some(x) = bundle.assay(sig) {
            if let Some(dup) = first_duplicate(&x.cols) {
                return Err(LupinError::identifier_conflict(format!(
                    "predictor `{}` appears twice in signature `{}`",
                    dup, sig
                )));
            }
        }
    }

    Ok(())
}

type ResolvedAssays<'a> = (&'a NamedMat, &'a NamedMat, Vec<(&'a str, &'a NamedMat)>);

fn resolve_assays<'a>(bundle: &'a AssayBundle, args: &'a RunArgs) -> anyhow::Result<ResolvedAssays<'a>> {
    let get = |name: &str| {
        bundle
            .assay(name)
            .ok_or_else(|| LupinError::identifier_conflict(format!("no assay named `{}`", name)))
    };

    let expression = get(&args.expression)?;
    let offset = get(&args.offset)?;
    let signatures = args
        .signatures
        .iter()
        .map(|s| Ok((s.as_ref(), get(s)?)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok((expression, offset, signatures))
}

fn check_alignment(
    expression: &NamedMat,
    offset: &NamedMat,
    signatures: &[(&str, &NamedMat)],
) -> anyhow::Result<()> {
    if expression.nrows() == 0 || expression.ncols() == 0 {
        return Err(LupinError::type_mismatch("expression matrix is empty"));
    }

    if let Some(dup) = first_duplicate(&expression.cols) {
        return Err(LupinError::type_mismatch(format!(
            "sample `{}` appears twice in the expression matrix",
            dup
        )));
    }

    if offset.rows != expression.rows {
        return Err(LupinError::type_mismatch(
            "offset rows don't match the expression rows",
        ));
    }

    for &(name, x) in signatures.iter() {
        if x.rows != expression.rows {
            return Err(LupinError::type_mismatch(format!(
                "rows of signature `{}` don't match the expression rows",
                name
            )));
        }
        if x.ncols() == 0 {
            return Err(LupinError::type_mismatch(format!(
                "signature `{}` has no predictors",
                name
            )));
        }
    }

    let named = [("expression", expression), ("offset", offset)]
        .into_iter()
        .chain(signatures.iter().copied());

    for (name, a) in named {
        if a.mat.iter().any(|v| !v.is_finite()) {
            return Err(LupinError::type_mismatch(format!(
                "assay `{}` has missing or infinite values",
                name
            )));
        }
    }

    Ok(())
}

fn check_signature_variance(signatures: &[(&str, &NamedMat)]) -> anyhow::Result<()> {
    for &(name, x) in signatures.iter() {
        let variances = x.mat.column_variances();
        if let Some(j) = variances.iter().position(|&v| v <= 0.0) {
            return Err(LupinError::DegenerateSignature {
                signature: name.to_string(),
                column: x.cols[j].to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn assign_samples(
    design: &NamedMat,
    expression: &NamedMat,
    offset: &NamedMat,
) -> anyhow::Result<GroupAssignment> {
    let assignment = GroupAssignment::from_design(design)?;

    if let Some(sample) = design.rows.iter().find(|s| expression.col_index(s).is_none()) {
        return Err(LupinError::design_shape(format!(
            "design sample `{}` is not in the expression matrix",
            sample
        )));
    }

    if let Some(sample) = assignment
        .samples()
        .iter()
        .find(|s| offset.col_index(s).is_none())
    {
        return Err(LupinError::type_mismatch(format!(
            "no offset column for sample `{}`",
            sample
        )));
    }

    Ok(assignment)
}

fn first_duplicate(names: &[Box<str>]) -> Option<&str> {
    names
        .iter()
        .enumerate()
        .find(|&(i, n)| names[..i].contains(n))
        .map(|(_, n)| n.as_ref())
}
