use crate::write_parameters;

use lupin::common::*;
use lupin::simulate::*;

use clap::Args;
use matrix_util::common_io::mkdir;
use serde::Serialize;

#[derive(Args, Debug, Clone, Serialize)]
pub struct SimArgs {
    /// number of features (rows)
    #[arg(short = 'r', long, default_value_t = 500)]
    n_features: usize,

    /// number of predictors per signature
    #[arg(short = 'p', long, default_value_t = 20)]
    n_predictors: usize,

    /// fraction of features hit by each predictor
    #[arg(long, default_value_t = 0.2)]
    density: f64,

    /// group names
    #[arg(short, long, value_delimiter = ',', default_values_t = vec!["00hr".to_string(), "12hr".to_string(), "24hr".to_string()])]
    groups: Vec<String>,

    /// replicate samples per group
    #[arg(long, default_value_t = 3)]
    n_replicates: usize,

    /// samples not assigned to any group
    #[arg(long, default_value_t = 0)]
    n_unassigned: usize,

    /// sd of group activities
    #[arg(long, default_value_t = 1.0)]
    activity_sd: f64,

    /// sd of expression noise
    #[arg(long, default_value_t = 0.5)]
    noise_sd: f64,

    /// random seed
    #[arg(long, default_value_t = 42)]
    rseed: u64,

    /// output header
    #[arg(short, long, required = true)]
    out: Box<str>,
}

pub fn run_sim_activity_data(args: &SimArgs) -> anyhow::Result<()> {
    let config = SimConfig {
        n_features: args.n_features,
        n_predictors: args.n_predictors,
        density: args.density,
        groups: args.groups.iter().map(|g| g.as_str().into()).collect(),
        n_replicates: args.n_replicates,
        n_unassigned: args.n_unassigned,
        activity_sd: args.activity_sd,
        noise_sd: args.noise_sd,
        rseed: args.rseed,
    };

    info!("simulating...");
    let sim = generate_activity_data(&config)?;

    let out = args.out.as_ref();
    mkdir(out)?;

    for name in [EXPRESSION, OFFSET, SIGNATURE] {
        let assay = sim
            .bundle
            .assay(name)
            .ok_or(anyhow::anyhow!("missing simulated assay {}", name))?;
        assay.write_named(&format!("{}.{}.tsv.gz", out, name), "feature")?;
    }

    if let Some(design) = sim.bundle.design() {
        design.write_named(&format!("{}.design.tsv.gz", out), "sample")?;
    }
    sim.activity
        .write_named(&format!("{}.activity.tsv.gz", out), "predictor")?;

    let params = serde_json::json!({
        "command": "simulate",
        "args": args,
        "files": {
            "expression": format!("{}.{}.tsv.gz", out, EXPRESSION),
            "offset": format!("{}.{}.tsv.gz", out, OFFSET),
            "signature": format!("{}.{}.tsv.gz", out, SIGNATURE),
            "design": format!("{}.design.tsv.gz", out),
            "activity": format!("{}.activity.tsv.gz", out),
        },
    });
    write_parameters(&format!("{}.params.json", out), &params)?;

    info!("done");
    Ok(())
}
