//! Statistical helpers shared across the fitting stages

use std::cmp::Ordering;

pub use statrs::function::gamma::{digamma, ln_gamma};

/// Two-sided 97.5% standard normal quantile
const QNORM_0975: f64 = 1.959963984540054;

/// Scale constant making the MAD consistent for normal data
const MAD_CONSTANT: f64 = 1.4826;

/// Order floats with NaN last
pub fn cmp_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Median of the finite values; NaN when there are none
pub fn median(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let n = v.len();
    if n % 2 == 0 {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    } else {
        v[n / 2]
    }
}

/// Median absolute deviation, scaled for consistency with the normal SD
pub fn mad(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - center).abs())
        .collect();
    median(&deviations) * MAD_CONSTANT
}

/// Sample variance with `n - 1` denominator
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Trigamma function (second derivative of `ln_gamma`)
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }
    let mut acc = 0.0;
    let mut z = x;
    while z < 8.0 {
        acc += 1.0 / (z * z);
        z += 1.0;
    }
    let z2 = z * z;
    acc + 1.0 / z + 0.5 / z2 + 1.0 / (6.0 * z2 * z) - 1.0 / (30.0 * z2 * z2 * z)
        + 1.0 / (42.0 * z2 * z2 * z2 * z)
}

/// Linear-interpolation quantile ("type 7") of an ascending slice
pub fn quantile_type7(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    match n {
        0 => f64::NAN,
        1 => sorted[0],
        _ => {
            let h = (n as f64 - 1.0) * p.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = h.ceil() as usize;
            sorted[lo] + (h - lo as f64) * (sorted[hi.min(n - 1)] - sorted[lo])
        }
    }
}

/// Weighted quantile with weights normalised to sum to the number of
/// observations; duplicated values pool their weight.
pub fn weighted_quantile(x: &[f64], weights: &[f64], prob: f64) -> f64 {
    let mut pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(weights)
        .filter(|(xi, wi)| xi.is_finite() && wi.is_finite() && **wi > 0.0)
        .map(|(&xi, &wi)| (xi, wi))
        .collect();
    if pairs.is_empty() {
        return 0.0;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n_raw = pairs.len() as f64;
    let scale = n_raw / pairs.iter().map(|(_, w)| w).sum::<f64>();

    let mut values: Vec<f64> = Vec::new();
    let mut cumulative: Vec<f64> = Vec::new();
    let mut running = 0.0;
    for (xi, wi) in pairs {
        running += wi * scale;
        if values.last() == Some(&xi) {
            if let Some(last) = cumulative.last_mut() {
                *last = running;
            }
        } else {
            values.push(xi);
            cumulative.push(running);
        }
    }

    let total = running;
    let order = 1.0 + (total - 1.0) * prob;
    let low = order.floor().max(1.0);
    let high = (low + 1.0).min(total);
    let frac = order - order.floor();

    // right-continuous step lookup on the cumulative weights
    let at = |target: f64| -> f64 {
        let idx = cumulative.iter().position(|&c| c >= target).unwrap_or(values.len() - 1);
        values[idx]
    };

    (1.0 - frac) * at(low) + frac * at(high)
}

/// Variance of a zero-centred normal whose upper `upper_quantile` tail matches
/// the weighted distribution of `|x|`.
pub fn match_weighted_upper_quantile_for_variance(x: &[f64], weights: &[f64], upper_quantile: f64) -> f64 {
    let abs_x: Vec<f64> = x.iter().map(|v| v.abs()).collect();
    let q = weighted_quantile(&abs_x, weights, 1.0 - upper_quantile);
    let sd = q / QNORM_0975;
    let var = sd * sd;
    if var > 0.0 && var.is_finite() {
        var
    } else {
        1e-6
    }
}
