//! SCDM mu/sigma auto-tuning.
//!
//! The projectability-vs-energy curve of a metal decays roughly like a
//! complementary error function. Fitting `0.5 * erfc((E - mu) / sigma)` to
//! the projwfc data gives the `scdm_mu`/`scdm_sigma` parameters for the
//! matrix-generation stage, with mu shifted down by `sigma_factor` sigmas so
//! the density-matrix columns are selected below the decay region.

use super::DeriveError;
use crate::core::{Bands, ParameterBundle, Projections};

/// Thresholds controlling the SCDM fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScdmThresholds {
    /// States with projectability above this value anchor the plateau.
    pub max_projectability: f64,
    /// Number of sigmas subtracted from the fitted mu.
    pub sigma_factor: f64,
}

impl Default for ScdmThresholds {
    fn default() -> Self {
        Self {
            max_projectability: 0.95,
            sigma_factor: 3.0,
        }
    }
}

const MAX_ITERATIONS: usize = 200;
const MU_BOUND: f64 = 50.0;
const SIGMA_MIN: f64 = 1e-3;
const SIGMA_MAX: f64 = 50.0;

fn erfc_model(energy: f64, mu: f64, sigma: f64) -> f64 {
    0.5 * libm::erfc((energy - mu) / sigma)
}

/// Fits `0.5 * erfc((E - mu) / sigma)` to the flattened, energy-sorted
/// projectability data and returns `(mu_fit - sigma_factor * sigma_fit,
/// sigma_fit)`.
pub fn fit_scdm_mu_sigma(
    bands: &Bands,
    projections: &Projections,
    thresholds: &ScdmThresholds,
) -> Result<(f64, f64), DeriveError> {
    if bands.num_kpoints() != projections.projectability.len() {
        return Err(DeriveError::ShapeMismatch);
    }
    let mut data: Vec<(f64, f64)> = bands.zip_flat(&projections.projectability).collect();
    if data.len() < 2 {
        return Err(DeriveError::EmptyBands);
    }
    data.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Initial guess: mu at the half-projectability point, sigma from the
    // energy span of the decay region.
    let mut mu = data
        .iter()
        .min_by(|a, b| (a.1 - 0.5).abs().total_cmp(&(b.1 - 0.5).abs()))
        .map_or(0.0, |(energy, _)| *energy);
    let mut sigma = 1.0;

    let sqrt_pi = std::f64::consts::PI.sqrt();
    let cost = |mu: f64, sigma: f64| -> f64 {
        data.iter()
            .map(|(e, p)| {
                let r = p - erfc_model(*e, mu, sigma);
                r * r
            })
            .sum()
    };

    // Levenberg-Marquardt on the two-parameter model; the normal equations
    // are a 2x2 system solved in closed form.
    let mut lambda = 1e-3;
    let mut current_cost = cost(mu, sigma);
    for _ in 0..MAX_ITERATIONS {
        let mut jtj = [[0.0_f64; 2]; 2];
        let mut jtr = [0.0_f64; 2];
        for (energy, projectability) in &data {
            let x = (energy - mu) / sigma;
            let gauss = (-x * x).exp();
            let d_mu = gauss / (sigma * sqrt_pi);
            let d_sigma = x * gauss / (sigma * sqrt_pi);
            let residual = projectability - erfc_model(*energy, mu, sigma);
            jtj[0][0] += d_mu * d_mu;
            jtj[0][1] += d_mu * d_sigma;
            jtj[1][1] += d_sigma * d_sigma;
            jtr[0] += d_mu * residual;
            jtr[1] += d_sigma * residual;
        }
        jtj[1][0] = jtj[0][1];

        let a = jtj[0][0] * (1.0 + lambda);
        let d = jtj[1][1] * (1.0 + lambda);
        let det = a * d - jtj[0][1] * jtj[1][0];
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return Err(DeriveError::FitDiverged);
        }
        let delta_mu = (d * jtr[0] - jtj[0][1] * jtr[1]) / det;
        let delta_sigma = (a * jtr[1] - jtj[1][0] * jtr[0]) / det;

        let new_mu = (mu + delta_mu).clamp(-MU_BOUND, MU_BOUND);
        let new_sigma = (sigma + delta_sigma).clamp(SIGMA_MIN, SIGMA_MAX);
        let new_cost = cost(new_mu, new_sigma);

        if new_cost < current_cost {
            mu = new_mu;
            sigma = new_sigma;
            current_cost = new_cost;
            lambda = (lambda * 0.5).max(1e-12);
            if delta_mu.abs() < 1e-10 && delta_sigma.abs() < 1e-10 {
                break;
            }
        } else {
            lambda *= 4.0;
            if lambda > 1e12 {
                break;
            }
        }
    }

    if !mu.is_finite() || !sigma.is_finite() || sigma <= 0.0 {
        return Err(DeriveError::FitDiverged);
    }

    Ok((mu - thresholds.sigma_factor * sigma, sigma))
}

/// Fills `inputpp.scdm_mu` / `inputpp.scdm_sigma` from the fit, touching only
/// keys absent from the bundle. Explicit user values always win.
pub fn update_scdm_mu_sigma(
    parameters: &mut ParameterBundle,
    bands: &Bands,
    projections: &Projections,
    thresholds: &ScdmThresholds,
) -> Result<(), DeriveError> {
    let (mu, sigma) = fit_scdm_mu_sigma(bands, projections, thresholds)?;
    parameters.set_default("inputpp.scdm_mu", mu);
    parameters.set_default("inputpp.scdm_sigma", sigma);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(mu: f64, sigma: f64) -> (Bands, Projections) {
        let energies: Vec<f64> = (0..200).map(|i| -10.0 + 0.15 * f64::from(i)).collect();
        let projectabilities: Vec<f64> = energies
            .iter()
            .map(|&e| erfc_model(e, mu, sigma))
            .collect();
        (
            Bands::new(vec![energies]),
            Projections::new(vec![projectabilities], 10),
        )
    }

    #[test]
    fn test_fit_recovers_parameters() {
        let (bands, projections) = synthetic(5.0, 2.0);
        let thresholds = ScdmThresholds::default();
        let (mu, sigma) = fit_scdm_mu_sigma(&bands, &projections, &thresholds).unwrap();
        assert!((sigma - 2.0).abs() < 0.05, "sigma = {sigma}");
        // Returned mu is shifted down by sigma_factor sigmas.
        assert!((mu - (5.0 - 3.0 * sigma)).abs() < 0.1, "mu = {mu}");
    }

    #[test]
    fn test_fit_with_custom_sigma_factor() {
        let (bands, projections) = synthetic(0.0, 1.0);
        let thresholds = ScdmThresholds {
            max_projectability: 0.95,
            sigma_factor: 0.0,
        };
        let (mu, sigma) = fit_scdm_mu_sigma(&bands, &projections, &thresholds).unwrap();
        assert!(mu.abs() < 0.1, "mu = {mu}");
        assert!((sigma - 1.0).abs() < 0.05, "sigma = {sigma}");
    }

    #[test]
    fn test_fit_rejects_empty_data() {
        let err = fit_scdm_mu_sigma(
            &Bands::default(),
            &Projections::default(),
            &ScdmThresholds::default(),
        )
        .unwrap_err();
        assert_eq!(err, DeriveError::EmptyBands);
    }

    #[test]
    fn test_update_only_fills_missing_keys() {
        let (bands, projections) = synthetic(5.0, 2.0);
        let mut parameters = ParameterBundle::new();
        parameters.set("inputpp.scdm_mu", -123.0);
        update_scdm_mu_sigma(
            &mut parameters,
            &bands,
            &projections,
            &ScdmThresholds::default(),
        )
        .unwrap();
        // User-provided mu wins, sigma is filled in by the fit.
        assert_eq!(parameters.get_f64("inputpp.scdm_mu"), Some(-123.0));
        let sigma = parameters.get_f64("inputpp.scdm_sigma").unwrap();
        assert!((sigma - 2.0).abs() < 0.05);
    }
}
