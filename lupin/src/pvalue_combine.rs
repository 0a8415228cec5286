use crate::error::LupinError;

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Fisher's method.
///
/// `X = -2 Σ ln p` is chi-squared with `2k` degrees of freedom under
/// the null. The result is its upper tail probability (or the lower
/// one if `lower_tail`), on log scale if `log_scale`.
///
/// Tails come from `statrs`. When the upper tail underflows to zero,
/// its log is taken from the closed-form even-df series instead, so
/// `log_scale` stays finite for very small p-values.
///
/// Fails with fewer than two p-values or with values outside `[0, 1]`.
pub fn fisher_combine(pvalues: &[f64], lower_tail: bool, log_scale: bool) -> anyhow::Result<f64> {
    if pvalues.len() < 2 {
        return Err(LupinError::InsufficientInput(format!(
            "Fisher's method needs at least 2 p-values, got {}",
            pvalues.len()
        ))
        .into());
    }

    if let Some(bad) = pvalues.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(LupinError::type_mismatch(format!(
            "{} is not a probability",
            bad
        )));
    }

    let stat = -2.0 * pvalues.iter().map(|p| p.ln()).sum::<f64>();
    let chisq = ChiSquared::new(2.0 * pvalues.len() as f64)?;

    if lower_tail {
        let p = chisq.cdf(stat);
        return Ok(if log_scale { p.ln() } else { p });
    }

    let p = chisq.sf(stat);
    if !log_scale {
        Ok(p)
    } else if p > 0.0 {
        Ok(p.ln())
    } else {
        Ok(chisq_even_df_log_sf(stat, pvalues.len()))
    }
}

/// log P(X > x) for X ~ χ²(2m), from the closed form
/// `e^{-x/2} Σ_{k<m} (x/2)^k / k!`
fn chisq_even_df_log_sf(x: f64, m: usize) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x.is_infinite() {
        return f64::NEG_INFINITY;
    }

    let h = x / 2.0;
    let log_h = h.ln();

    let mut log_terms = Vec::with_capacity(m);
    let mut log_term = 0.0;
    for k in 0..m {
        if k > 0 {
            log_term += log_h - (k as f64).ln();
        }
        log_terms.push(log_term);
    }

    let mx = log_terms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_sum = mx + log_terms.iter().map(|t| (t - mx).exp()).sum::<f64>().ln();
    (log_sum - h).min(0.0)
}

/// Stouffer's method on absolute Z-scores.
///
/// `Σ|z| / sqrt(k)` over the `k` non-missing values; NaN when every
/// value is missing. Signs are dropped, so the combined score
/// measures evidence strength regardless of direction.
pub fn stouffer_combine(zscores: &[f64]) -> f64 {
    let (sum, count) = zscores
        .iter()
        .filter(|z| !z.is_nan())
        .fold((0.0, 0usize), |(s, n), z| (s + z.abs(), n + 1));

    if count == 0 {
        return f64::NAN;
    }
    sum / (count as f64).sqrt()
}
