//! Pure parameter-derivation functions.
//!
//! These derive per-stage numeric parameters from prior job outputs: Fermi
//! energy extraction, projectability threshold energies, the SCDM erfc fit,
//! semicore band indices and band-count estimation. No side effects beyond
//! reading their arguments.

mod electrons;
mod fermi;
mod projectability;
mod scdm;
mod semicore;

pub use electrons::{num_electrons, num_projections, required_band_count};
pub use fermi::fermi_energy;
pub use projectability::{energy_of_projectability, DEFAULT_PROJECTABILITY_THRESHOLD};
pub use scdm::{fit_scdm_mu_sigma, update_scdm_mu_sigma, ScdmThresholds};
pub use semicore::semicore_band_indices;

use thiserror::Error;

/// Errors raised by parameter derivation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeriveError {
    /// Band and projectability matrices have different shapes.
    #[error("bands and projections have mismatched shapes")]
    ShapeMismatch,

    /// No data points were available for a fit or lookup.
    #[error("no band data available")]
    EmptyBands,

    /// The projectability never drops below the requested threshold.
    #[error("projectability never drops below threshold {0}")]
    NoThresholdCrossing(f64),

    /// The erfc fit did not converge to a physical sigma.
    #[error("scdm erfc fit failed to converge")]
    FitDiverged,

    /// A site finished with semicore labels not present in its orbital list.
    #[error("error when processing pseudo {element}: unconsumed semicore orbitals {labels:?}")]
    UnconsumedSemicore {
        /// The offending element.
        element: String,
        /// Semicore labels never matched against the declared orbitals.
        labels: Vec<String>,
    },

    /// Orbital metadata problems surfaced during derivation.
    #[error("{0}")]
    Config(#[from] crate::errors::ConfigError),
}
