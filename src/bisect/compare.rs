// src/bisect/compare.rs

//! Two-sample comparison of performance measurements.
//!
//! The p-value is the larger of a Kolmogorov-Smirnov and a Mann-Whitney U
//! test, so both must agree before two samples are called different.
//! Samples are called the same once the p-value rises above a "high"
//! threshold that depends on the requested magnitude and the sample size.
//! Anything in between is inconclusive.

use crate::graph::Verdict;

/// p-values at or below this are significant.
pub const LOW_THRESHOLD: f64 = 0.01;

/// Floor for the IQR used to normalize the magnitude, so constant samples
/// do not divide by zero.
pub const MIN_IQR: f64 = 0.001;

/// Ratio between the IQR and the standard deviation of a normal distribution.
const IQR_TO_SIGMA: f64 = 1.349;

/// z-score of the one-sided 99th percentile.
const Z_99: f64 = 2.326;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub verdict: Verdict,
    pub p_value: f64,
    pub high_threshold: f64,
}

/// Compare samples `a` and `b`, looking for a shift of at least `magnitude`
/// (in the samples' own units).
pub fn compare(a: &[f64], b: &[f64], magnitude: f64) -> Comparison {
    if a.is_empty() || b.is_empty() {
        return Comparison {
            verdict: Verdict::Pending,
            p_value: 1.0,
            high_threshold: 1.0,
        };
    }

    let max_iqr = iqr(a).max(iqr(b)).max(MIN_IQR);
    let normalized = magnitude / max_iqr;
    let attempts = (a.len() + b.len()) / 2;

    let p_value = kolmogorov_smirnov(a, b).max(mann_whitney_u(a, b));
    let high = high_threshold(normalized, attempts);

    let verdict = if p_value <= LOW_THRESHOLD {
        if (median(a) - median(b)).abs() < magnitude {
            Verdict::Same
        } else {
            Verdict::Different
        }
    } else if p_value <= high {
        Verdict::Unknown
    } else {
        Verdict::Same
    };

    Comparison {
        verdict,
        p_value,
        high_threshold: high,
    }
}

/// p-value above which a difference of `normalized_magnitude` IQRs would
/// have been detected with `attempts` samples per side.
pub fn high_threshold(normalized_magnitude: f64, attempts: usize) -> f64 {
    if attempts == 0 {
        return 1.0;
    }
    let n = attempts as f64;
    let d = normalized_magnitude * IQR_TO_SIGMA;
    // Probability that a sample from the shifted distribution exceeds one
    // from the unshifted one; the U statistic's effect size.
    let p = normal_cdf(d / std::f64::consts::SQRT_2);
    let sd = ((2.0 * n + 1.0) / (12.0 * n * n)).sqrt();
    let z = (p - 0.5) / sd - Z_99;
    if z <= 0.0 {
        return 1.0;
    }
    (2.0 * (1.0 - normal_cdf(z))).max(LOW_THRESHOLD)
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// Linear-interpolated percentile of sorted data, `q` in `[0, 1]`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

pub fn iqr(values: &[f64]) -> f64 {
    let s = sorted(values);
    percentile(&s, 0.75) - percentile(&s, 0.25)
}

pub fn median(values: &[f64]) -> f64 {
    percentile(&sorted(values), 0.5)
}

/// Two-sided Mann-Whitney U test, normal approximation with tie and
/// continuity corrections.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> f64 {
    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }

    let mut all: Vec<(f64, bool)> = a
        .iter()
        .map(|&v| (v, true))
        .chain(b.iter().map(|&v| (v, false)))
        .collect();
    all.sort_by(|x, y| x.0.total_cmp(&y.0));

    let n = all.len();
    let mut rank_sum_a = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && all[j + 1].0 == all[i].0 {
            j += 1;
        }
        // Ranks are 1-based; ties share the average rank.
        let rank = (i + j) as f64 / 2.0 + 1.0;
        let t = (j - i + 1) as f64;
        tie_term += t * t * t - t;
        rank_sum_a += all[i..=j].iter().filter(|(_, in_a)| *in_a).count() as f64 * rank;
        i = j + 1;
    }

    let u1 = rank_sum_a - n1 * (n1 + 1.0) / 2.0;
    let u = u1.max(n1 * n2 - u1);
    let mu = n1 * n2 / 2.0;
    let total = n1 + n2;
    let variance = n1 * n2 / 12.0 * ((total + 1.0) - tie_term / (total * (total - 1.0)));
    if variance <= 0.0 {
        return 1.0;
    }

    let z = (u - mu - 0.5) / variance.sqrt();
    (2.0 * (1.0 - normal_cdf(z))).clamp(0.0, 1.0)
}

/// Two-sided Kolmogorov-Smirnov test with the asymptotic distribution.
pub fn kolmogorov_smirnov(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }
    let a = sorted(a);
    let b = sorted(b);
    let (n1, n2) = (a.len(), b.len());

    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < n1 && j < n2 {
        let x = a[i].min(b[j]);
        while i < n1 && a[i] <= x {
            i += 1;
        }
        while j < n2 && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 as f64 - j as f64 / n2 as f64).abs());
    }

    let en = ((n1 * n2) as f64 / (n1 + n2) as f64).sqrt();
    ks_survival((en + 0.12 + 0.11 / en) * d)
}

/// Survival function of the Kolmogorov distribution. Returns 1 when the
/// series does not converge (small `lambda`).
fn ks_survival(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous: f64 = 0.0;
    for j in 1..=100 {
        let jf = j as f64;
        let term = sign * (a2 * jf * jf).exp();
        sum += term;
        if term.abs() <= 0.001 * previous || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous = term.abs();
    }
    1.0
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

// Abramowitz & Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}
