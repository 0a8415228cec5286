use lupin::common::*;
use lupin::error::{error_kind, LupinError};
use lupin::fit_regression::PrecomputedModels;
use lupin::input::AssayBundle;
use lupin::pipeline::{run, RunArgs};
use lupin::ridge_cv::{CvRidge, RidgeFitter, RidgeModel};
use lupin::simulate::*;

fn small_config() -> SimConfig {
    SimConfig {
        n_features: 120,
        n_predictors: 6,
        ..Default::default()
    }
}

fn fitter() -> CvRidge {
    CvRidge {
        nfolds: 5,
        nlambda: 40,
        ..Default::default()
    }
}

fn args() -> RunArgs {
    RunArgs::new(EXPRESSION, OFFSET, &[SIGNATURE])
}

/// Copy the simulated assays into a new bundle
fn rebuild(sim: &SimOut, design: Option<NamedMat>) -> anyhow::Result<AssayBundle> {
    let mut bundle = AssayBundle::new();
    for name in [EXPRESSION, OFFSET, SIGNATURE] {
        let assay = sim.bundle.assay(name).cloned().expect("simulated assay");
        bundle.add_assay(name, assay)?;
    }
    if let Some(design) = design {
        bundle.set_design(design);
    }
    Ok(bundle)
}

fn design_of(sim: &SimOut) -> NamedMat {
    sim.bundle.design().cloned().expect("simulated design")
}

fn kind(err: &anyhow::Error) -> &LupinError {
    error_kind(err).expect("pipeline error")
}

#[test]
fn end_to_end_three_groups() -> anyhow::Result<()> {
    let sim = generate_activity_data(&SimConfig::default())?;
    let result = run(&sim.bundle, &fitter(), &args(), None)?;

    assert_eq!(result.assignment.len(), 9);
    assert_eq!(result.models.len(), 9);
    assert_eq!(result.significance.as_ref().map(|s| s.len()), Some(9));

    let activity = result.activity(SIGNATURE).expect("signature result");
    let table = &activity.table;
    let groups: Vec<&str> = table.groups.iter().map(|g| g.as_ref()).collect();
    assert_eq!(groups, vec!["00hr", "12hr", "24hr"]);
    assert_eq!(table.len(), 10);

    let abs_z: Vec<f64> = table.combined_z.iter().map(|z| z.abs()).collect();
    assert!(abs_z.iter().all(|z| z.is_finite()));
    assert!(abs_z.windows(2).all(|w| w[0] >= w[1]));

    let named = table.to_named_mat();
    assert_eq!(named.cols.last().map(|c| c.as_ref()), Some("combined_z"));
    assert_eq!(named.ncols(), 4);
    Ok(())
}

#[test]
fn pooled_coefficients_track_true_activities() -> anyhow::Result<()> {
    let sim = generate_activity_data(&SimConfig::default())?;
    let result = run(&sim.bundle, &fitter(), &args(), None)?;
    let pooled = result
        .activity(SIGNATURE)
        .and_then(|a| a.pooled.as_ref())
        .expect("pooled statistics");

    let truth = &sim.activity;
    assert_eq!(pooled.coefficient.rows, truth.rows);
    assert_eq!(pooled.coefficient.cols, truth.cols);

    let a: Vec<f64> = pooled.coefficient.mat.iter().copied().collect();
    let b: Vec<f64> = truth.mat.iter().copied().collect();
    let (ma, mb) = (
        a.iter().sum::<f64>() / a.len() as f64,
        b.iter().sum::<f64>() / b.len() as f64,
    );
    let cov: f64 = a.iter().zip(&b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
    let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();
    let corr = cov / (va * vb).sqrt();
    assert!(corr > 0.8, "correlation {}", corr);
    Ok(())
}

#[test]
fn runs_are_reproducible_and_parallel_matches_sequential() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;

    let first = run(&sim.bundle, &fitter(), &args(), None)?;
    let second = run(&sim.bundle, &fitter(), &args(), None)?;

    let mut par_args = args();
    par_args.parallel = true;
    par_args.num_jobs = Some(3);
    let parallel = run(&sim.bundle, &fitter(), &par_args, None)?;

    for other in [&second, &parallel] {
        assert_eq!(first.activities[0].table, other.activities[0].table);
        assert_eq!(first.activities[0].pooled, other.activities[0].pooled);
        assert_eq!(first.significance, other.significance);
    }
    Ok(())
}

#[test]
fn single_replicate_group_reports_its_own_sample() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;
    let mut design = design_of(&sim);
    // 24hr keeps only its first replicate
    for sample in ["24hr_2", "24hr_3"] {
        let i = design.row_index(sample).expect("sample");
        design.mat.row_mut(i).fill(0.0);
    }
    let bundle = rebuild(&sim, Some(design))?;
    let result = run(&bundle, &fitter(), &args(), None)?;

    assert_eq!(result.assignment.len(), 7);
    let own = result
        .significance
        .as_ref()
        .and_then(|s| s.get(SIGNATURE, "24hr_1"))
        .expect("table of 24hr_1");

    let activity = result.activity(SIGNATURE).expect("signature result");
    let pooled = activity.pooled.as_ref().expect("pooled");
    let k = pooled.zscore.col_index("24hr").expect("24hr column");

    for (i, predictor) in own.predictors.iter().enumerate() {
        let r = pooled.zscore.row_index(predictor).expect("predictor");
        assert_eq!(pooled.coefficient.mat[(r, k)], own.coefficient[i]);
        assert_eq!(pooled.zscore.mat[(r, k)], own.z_score(i));
        assert!(pooled.pvalue.mat[(r, k)].is_nan());
    }
    Ok(())
}

#[test]
fn one_group_uses_its_own_z() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;
    let design = design_of(&sim);
    let only_first = MatWithNames {
        rows: design.rows.clone(),
        cols: vec!["00hr".into()],
        mat: design.mat.columns(0, 1).into_owned(),
    };
    let bundle = rebuild(&sim, Some(only_first))?;
    let result = run(&bundle, &fitter(), &args(), None)?;

    let activity = result.activity(SIGNATURE).expect("signature result");
    let pooled = activity.pooled.as_ref().expect("pooled");
    for (i, predictor) in activity.table.predictors.iter().enumerate() {
        let r = pooled.zscore.row_index(predictor).expect("predictor");
        assert_eq!(activity.table.combined_z[i], pooled.zscore.mat[(r, 0)]);
    }
    Ok(())
}

#[test]
fn without_significance_combined_z_is_missing() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;
    let mut no_test = args();
    no_test.compute_significance = false;
    let result = run(&sim.bundle, &fitter(), &no_test, None)?;

    assert!(result.significance.is_none());
    let activity = result.activity(SIGNATURE).expect("signature result");
    assert!(activity.pooled.is_none());
    assert!(activity.table.combined_z.iter().all(|z| z.is_nan()));

    // predictors keep their signature order
    let x = sim.bundle.assay(SIGNATURE).expect("signature");
    assert_eq!(activity.table.predictors, x.cols);

    // plain mean of the 00hr replicates at lambda_min
    let mut expected = DVec::zeros(x.ncols());
    for sample in ["00hr_1", "00hr_2", "00hr_3"] {
        let model = result.models.get(SIGNATURE, sample).expect("model");
        expected += model.coef(model.lambda_min()).rows(1, x.ncols());
    }
    expected /= 3.0;
    for i in 0..x.ncols() {
        approx::assert_abs_diff_eq!(activity.table.coefficient[(i, 0)], expected[i], epsilon = 1e-12);
    }
    Ok(())
}

#[test]
fn unassigned_samples_are_left_out() -> anyhow::Result<()> {
    let config = SimConfig {
        n_unassigned: 2,
        ..small_config()
    };
    let sim = generate_activity_data(&config)?;
    let result = run(&sim.bundle, &fitter(), &args(), None)?;
    assert_eq!(result.assignment.len(), 9);
    assert!(result.models.get(SIGNATURE, "unassigned_1").is_none());
    Ok(())
}

#[test]
fn precomputed_models_are_kept() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;
    let x = sim.bundle.assay(SIGNATURE).expect("signature");
    let expr = sim.bundle.assay(EXPRESSION).expect("expression");
    let offset = sim.bundle.assay(OFFSET).expect("offset");

    // fitted with a different seed than the run's fitter
    let other = CvRidge {
        seed: 7,
        ..fitter()
    };
    let model = other.fit(
        &x.mat,
        &x.cols,
        &expr.column_by_name("12hr_2").expect("sample"),
        &offset.column_by_name("12hr_2").expect("sample"),
        true,
    )?;
    let kept = model.coef(model.lambda_min());

    let mut precomputed = PrecomputedModels::default();
    precomputed
        .entry(SIGNATURE.into())
        .or_insert_with(HashMap::default)
        .insert("12hr_2".into(), model);

    let result = run(&sim.bundle, &fitter(), &args(), Some(precomputed))?;
    let reused = result.models.get(SIGNATURE, "12hr_2").expect("model");
    assert_eq!(reused.coef(reused.lambda_min()), kept);
    Ok(())
}

#[test]
fn incompatible_precomputed_model() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;
    let x = sim.bundle.assay(SIGNATURE).expect("signature");
    let expr = sim.bundle.assay(EXPRESSION).expect("expression");
    let offset = sim.bundle.assay(OFFSET).expect("offset");

    // one predictor short
    let fewer = x.select_columns(&x.cols[1..])?;
    let model = fitter().fit(
        &fewer.mat,
        &fewer.cols,
        &expr.column_by_name("00hr_1").expect("sample"),
        &offset.column_by_name("00hr_1").expect("sample"),
        true,
    )?;

    let mut precomputed = PrecomputedModels::default();
    precomputed
        .entry(SIGNATURE.into())
        .or_insert_with(HashMap::default)
        .insert("00hr_1".into(), model);

    let err = run(&sim.bundle, &fitter(), &args(), Some(precomputed))
        .err()
        .expect("incompatible model");
    assert!(matches!(
        kind(&err),
        LupinError::IncompatiblePrecomputedModel { .. }
    ));
    Ok(())
}

#[test]
fn design_violations() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;

    // a sample in two groups
    let mut design = design_of(&sim);
    design.mat[(0, 1)] = 1.0;
    let err = run(&rebuild(&sim, Some(design))?, &fitter(), &args(), None)
        .err()
        .expect("row sums to 2");
    assert!(matches!(kind(&err), LupinError::DesignShapeViolation(_)));
    assert!(err.to_string().contains("00hr_1"));

    // nobody assigned
    let mut design = design_of(&sim);
    design.mat.fill(0.0);
    let err = run(&rebuild(&sim, Some(design))?, &fitter(), &args(), None)
        .err()
        .expect("empty design");
    assert!(matches!(kind(&err), LupinError::DesignShapeViolation(_)));

    // a sample the expression doesn't have
    let mut design = design_of(&sim);
    design.rows[0] = "ghost".into();
    let err = run(&rebuild(&sim, Some(design))?, &fitter(), &args(), None)
        .err()
        .expect("unknown sample");
    assert!(matches!(kind(&err), LupinError::DesignShapeViolation(_)));

    // no design at all
    let err = run(&rebuild(&sim, None)?, &fitter(), &args(), None)
        .err()
        .expect("missing design");
    assert!(matches!(kind(&err), LupinError::TypeMismatch(_)));

    // a design given with the run wins over the bundle's
    let mut run_args = args();
    let mut fine = design_of(&sim);
    fine.mat.row_mut(8).fill(0.0);
    run_args.design = Some(fine);
    let result = run(&sim.bundle, &fitter(), &run_args, None)?;
    assert_eq!(result.assignment.len(), 8);
    Ok(())
}

#[test]
fn degenerate_signature() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;
    let mut x = sim.bundle.assay(SIGNATURE).cloned().expect("signature");
    x.mat.column_mut(2).fill(1.0);

    let mut bundle = rebuild(&sim, Some(design_of(&sim)))?;
    bundle.add_assay("flat", x)?;

    let err = run(
        &bundle,
        &fitter(),
        &RunArgs::new(EXPRESSION, OFFSET, &[SIGNATURE, "flat"]),
        None,
    )
    .err()
    .expect("constant column");
    match kind(&err) {
        LupinError::DegenerateSignature { signature, column } => {
            assert_eq!(signature, "flat");
            assert_eq!(column, "regulator_3");
        }
        other => panic!("unexpected error: {}", other),
    }
    Ok(())
}

#[test]
fn identifier_conflicts() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;

    for bad in [
        RunArgs::new(EXPRESSION, EXPRESSION, &[SIGNATURE]),
        RunArgs::new(EXPRESSION, OFFSET, &[OFFSET]),
        RunArgs::new(EXPRESSION, OFFSET, &[SIGNATURE, SIGNATURE]),
        RunArgs::new(EXPRESSION, OFFSET, &["missing"]),
    ] {
        let err = run(&sim.bundle, &fitter(), &bad, None)
            .err()
            .expect("name conflict");
        assert!(matches!(kind(&err), LupinError::IdentifierConflict(_)));
    }
    Ok(())
}

#[test]
fn misaligned_or_missing_values() -> anyhow::Result<()> {
    let sim = generate_activity_data(&small_config())?;

    // offset features in another order
    let mut bundle = AssayBundle::new().with_design(design_of(&sim));
    let mut offset = sim.bundle.assay(OFFSET).cloned().expect("offset");
    offset.rows.swap(0, 1);
    bundle.add_assay(EXPRESSION, sim.bundle.assay(EXPRESSION).cloned().expect("expression"))?;
    bundle.add_assay(OFFSET, offset)?;
    bundle.add_assay(SIGNATURE, sim.bundle.assay(SIGNATURE).cloned().expect("signature"))?;
    let err = run(&bundle, &fitter(), &args(), None)
        .err()
        .expect("misaligned offset");
    assert!(matches!(kind(&err), LupinError::TypeMismatch(_)));

    // a missing expression value
    let mut bundle = AssayBundle::new().with_design(design_of(&sim));
    let mut expr = sim.bundle.assay(EXPRESSION).cloned().expect("expression");
    expr.mat[(3, 4)] = f64::NAN;
    bundle.add_assay(EXPRESSION, expr)?;
    bundle.add_assay(OFFSET, sim.bundle.assay(OFFSET).cloned().expect("offset"))?;
    bundle.add_assay(SIGNATURE, sim.bundle.assay(SIGNATURE).cloned().expect("signature"))?;
    let err = run(&bundle, &fitter(), &args(), None)
        .err()
        .expect("missing value");
    assert!(matches!(kind(&err), LupinError::TypeMismatch(_)));
    Ok(())
}
