//! Negative binomial mean-dispersion parameterisation

use crate::stats::ln_gamma;

/// Lower bound on fitted means during IRLS
pub const MIN_MU: f64 = 0.5;

/// Coefficients beyond this magnitude (natural log scale) stop the fit
pub const MAX_BETA: f64 = 30.0;

/// Clamp on the linear predictor to keep `exp` finite
pub const MAX_ETA: f64 = 700.0;

/// Expected count `size_factor * exp(eta)`
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// `Var(Y) = mu + alpha * mu^2`
pub fn nb_variance(mu: f64, alpha: f64) -> f64 {
    mu + alpha * mu * mu
}

/// Log probability of count `y` with mean `mu` and dispersion `alpha`
pub fn nb_log_likelihood(y: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 || !alpha.is_finite() {
        return f64::NEG_INFINITY;
    }
    let size = 1.0 / alpha;
    ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0)
        + size * (size / (size + mu)).ln()
        + y * (mu / (size + mu)).ln()
}

/// IRLS working weight `mu / (1 + alpha * mu)`
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}
