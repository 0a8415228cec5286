use crate::common::*;
use crate::input::AssayBundle;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

pub const EXPRESSION: &str = "expression";
pub const OFFSET: &str = "offset";
pub const SIGNATURE: &str = "signature";

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub n_features: usize,
    pub n_predictors: usize,
    /// chance that a feature carries a predictor's motif
    pub density: f64,
    pub groups: Vec<Box<str>>,
    pub n_replicates: usize,
    /// samples left out of every group
    pub n_unassigned: usize,
    /// sd of the group-specific activities
    pub activity_sd: f64,
    pub noise_sd: f64,
    pub rseed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            n_features: 200,
            n_predictors: 10,
            density: 0.2,
            groups: vec!["00hr".into(), "12hr".into(), "24hr".into()],
            n_replicates: 3,
            n_unassigned: 0,
            activity_sd: 1.0,
            noise_sd: 0.5,
            rseed: 42,
        }
    }
}

pub struct SimOut {
    /// `expression`, `offset` and `signature` assays plus the design
    pub bundle: AssayBundle,
    /// predictors x groups
    pub activity: NamedMat,
}

/// Generate
///
/// ```text
/// Y(g,j) = O(g) + sum_k X(g,k) * A(k,S(j)) + eps,   eps ~ N(0, noise²)
/// ```
///
/// with binary `X(g,k) ~ Bernoulli(density)` (every column keeps at
/// least one 0 and one 1), baseline `O(g) ~ N(5, 1)` shared by all
/// samples and activities `A(k,s) ~ N(0, activity_sd²)` per group.
pub fn generate_activity_data(config: &SimConfig) -> anyhow::Result<SimOut> {
    let nn = config.n_features;
    let pp = config.n_predictors;
    let ngroups = config.groups.len();

    if nn < 2 || pp == 0 || ngroups == 0 || config.n_replicates == 0 {
        anyhow::bail!("need at least 2 features, 1 predictor, 1 group and 1 replicate");
    }
    if !(config.density > 0.0 && config.density < 1.0) {
        anyhow::bail!("density must be in (0, 1), got {}", config.density);
    }

    let mut rng = StdRng::seed_from_u64(config.rseed);

    let mut x = Mat::from_fn(nn, pp, |_, _| {
        if rng.random_bool(config.density) {
            1.0
        } else {
            0.0
        }
    });
    for mut x_k in x.column_iter_mut() {
        let ones = x_k.sum();
        if ones == 0.0 {
            x_k[rng.random_range(0..nn)] = 1.0;
        } else if ones == nn as f64 {
            x_k[rng.random_range(0..nn)] = 0.0;
        }
    }

    let activity_dist = Normal::new(0.0, config.activity_sd)?;
    let activity = Mat::from_fn(pp, ngroups, |_, _| activity_dist.sample(&mut rng));

    let baseline_dist = Normal::new(5.0, 1.0)?;
    let baseline = DVec::from_fn(nn, |_, _| baseline_dist.sample(&mut rng));

    let mut samples: Vec<Box<str>> = vec![];
    let mut membership: Vec<Option<usize>> = vec![];
    for (s, group) in config.groups.iter().enumerate() {
        for r in 1..=config.n_replicates {
            samples.push(format!("{}_{}", group, r).into());
            membership.push(Some(s));
        }
    }
    for r in 1..=config.n_unassigned {
        samples.push(format!("unassigned_{}", r).into());
        membership.push(None);
    }
    let nsamples = samples.len();

    let noise_dist = Normal::new(0.0, config.noise_sd)?;
    let mut y = Mat::zeros(nn, nsamples);
    for (j, group) in membership.iter().enumerate() {
        let shift = match group {
            Some(s) => &x * activity.column(*s),
            None => DVec::zeros(nn),
        };
        for g in 0..nn {
            y[(g, j)] = baseline[g] + shift[g] + noise_dist.sample(&mut rng);
        }
    }

    let offset = Mat::from_fn(nn, nsamples, |g, _| baseline[g]);

    let design = Mat::from_fn(nsamples, ngroups, |j, s| {
        if membership[j] == Some(s) {
            1.0
        } else {
            0.0
        }
    });

    let features: Vec<Box<str>> = (1..=nn).map(|g| format!("feature_{}", g).into()).collect();
    let predictors: Vec<Box<str>> = (1..=pp).map(|k| format!("regulator_{}", k).into()).collect();

    let mut bundle = AssayBundle::new();
    bundle.add_assay(
        EXPRESSION,
        MatWithNames::new(features.clone(), samples.clone(), y)?,
    )?;
    bundle.add_assay(
        OFFSET,
        MatWithNames::new(features.clone(), samples.clone(), offset)?,
    )?;
    bundle.add_assay(
        SIGNATURE,
        MatWithNames::new(features, predictors.clone(), x)?,
    )?;
    bundle.set_design(MatWithNames::new(samples, config.groups.clone(), design)?);

    info!(
        "simulated {} features, {} predictors, {} samples",
        nn, pp, nsamples
    );

    Ok(SimOut {
        bundle,
        activity: MatWithNames::new(predictors, config.groups.clone(), activity)?,
    })
}
