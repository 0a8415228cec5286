use crate::write_parameters;

use lupin::common::*;
use lupin::input::AssayBundle;
use lupin::pipeline::{run, RunArgs};
use lupin::ridge_cv::CvRidge;

use clap::Args;
use matrix_util::common_io::{basename, mkdir};
use matrix_util::traits::NamedIoOps;
use serde::Serialize;

const EXPRESSION: &str = "expression";
const OFFSET: &str = "offset";

#[derive(Args, Debug, Clone, Serialize)]
pub struct ActivityArgs {
    /// expression table (features x samples; `.tsv`, `.csv`, `.gz`)
    #[arg(short, long, required = true)]
    expression: Box<str>,

    /// baseline offset table, same features as the expression
    #[arg(short = 'f', long, required = true)]
    offset: Box<str>,

    /// signature table (features x predictors) as `NAME=FILE`, or
    /// `FILE` to name it after the file; repeat for more
    #[arg(short, long, required = true)]
    signature: Vec<Box<str>>,

    /// design table (samples x groups, 0/1)
    #[arg(short, long, required = true)]
    design: Box<str>,

    /// output header
    #[arg(short, long, required = true)]
    out: Box<str>,

    /// keep predictors on their original scale
    #[arg(long, default_value_t = false)]
    no_standardize: bool,

    /// skip coefficient tests and replicate pooling
    #[arg(long, default_value_t = false)]
    no_significance: bool,

    /// fit (signature, sample) pairs in parallel
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// number of threads with `--parallel` (default: all cores)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// cross-validation folds
    #[arg(long, default_value_t = 10)]
    nfolds: usize,

    /// length of the penalty path
    #[arg(long, default_value_t = 100)]
    nlambda: usize,

    /// smallest penalty relative to the largest
    #[arg(long)]
    lambda_min_ratio: Option<f64>,

    /// random seed of the fold assignment
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// also write the coefficient test of every sample
    #[arg(long, default_value_t = false)]
    sample_tables: bool,
}

fn parse_signature(arg: &str) -> anyhow::Result<(Box<str>, Box<str>)> {
    match arg.split_once('=') {
        Some((name, file)) if !name.is_empty() && !file.is_empty() => {
            Ok((name.into(), file.into()))
        }
        Some(_) => anyhow::bail!("expected NAME=FILE, got `{}`", arg),
        None => Ok((basename(arg)?, arg.into())),
    }
}

pub fn run_activity(args: &ActivityArgs) -> anyhow::Result<()> {
    let signatures = args
        .signature
        .iter()
        .map(|s| parse_signature(s))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut bundle = AssayBundle::new();
    bundle.read_assay(EXPRESSION, &args.expression)?;
    bundle.read_assay(OFFSET, &args.offset)?;
    for (name, file) in signatures.iter() {
        bundle.read_assay(name, file)?;
    }
    bundle.set_design(Mat::read_named(&args.design)?);

    let signature_names: Vec<&str> = signatures.iter().map(|(n, _)| n.as_ref()).collect();
    let mut run_args = RunArgs::new(EXPRESSION, OFFSET, &signature_names);
    run_args.standardize = !args.no_standardize;
    run_args.parallel = args.parallel;
    run_args.num_jobs = args.jobs;
    run_args.compute_significance = !args.no_significance;

    let fitter = CvRidge {
        nfolds: args.nfolds,
        nlambda: args.nlambda,
        lambda_min_ratio: args.lambda_min_ratio,
        seed: args.seed,
    };

    let result = run(&bundle, &fitter, &run_args, None)?;

    let out = args.out.as_ref();
    mkdir(out)?;

    for activity in result.activities.iter() {
        let name = activity.name.as_ref();
        let header = format!("{}.{}", out, name);

        activity
            .table
            .to_named_mat()
            .write_named(&format!("{}.activity.tsv.gz", header), "predictor")?;

        match activity.pooled.as_ref() {
            Some(pooled) => {
                pooled
                    .coefficient
                    .write_named(&format!("{}.coef.tsv.gz", header), "predictor")?;
                pooled
                    .zscore
                    .write_named(&format!("{}.zscore.tsv.gz", header), "predictor")?;
                pooled
                    .pvalue
                    .write_named(&format!("{}.pvalue.tsv.gz", header), "predictor")?;
            }
            None => {
                let coef = MatWithNames {
                    rows: activity.table.predictors.clone(),
                    cols: activity.table.groups.clone(),
                    mat: activity.table.coefficient.clone(),
                };
                coef.write_named(&format!("{}.coef.tsv.gz", header), "predictor")?;
            }
        }

        if args.sample_tables {
            if let Some(tables) = result.significance.as_ref() {
                for (sample, table) in result
                    .assignment
                    .samples()
                    .iter()
                    .zip(tables.row(name).unwrap_or_default())
                {
                    table
                        .to_named_mat()
                        .write_named(&format!("{}.{}.tsv.gz", header, sample), "predictor")?;
                }
            }
        }
        info!("wrote results of signature `{}`", name);
    }

    let params = serde_json::json!({
        "command": "run",
        "args": args,
        "num_samples": result.assignment.len(),
        "samples": result.assignment.samples(),
        "groups": result.assignment.levels(),
        "signatures": signature_names,
    });
    write_parameters(&format!("{}.params.json", out), &params)?;

    info!("done");
    Ok(())
}
