//! P-values from test statistics

use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::erf::erfc;

/// Two-sided normal p-value `2 * P(Z > |z|)`
pub fn calculate_pvalue(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    erfc(z.abs() / std::f64::consts::SQRT_2)
}

/// Upper tail of a chi-squared distribution with `df` degrees of freedom
pub fn chi_squared_pvalue(stat: f64, df: f64) -> f64 {
    if !stat.is_finite() {
        return f64::NAN;
    }
    match ChiSquared::new(df) {
        Ok(dist) => dist.sf(stat.max(0.0)),
        Err(_) => f64::NAN,
    }
}
