//! Run-time choice enums and automatic disentanglement resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ConfigError;

/// Initial projection scheme for the Wannier functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionType {
    /// Hydrogen-like analytic orbitals centred on the atoms.
    Hydrogen,
    /// Numeric pseudo-atomic orbitals read from the pseudopotentials.
    Numeric,
    /// Selected columns of the density matrix (automatic initial guess).
    Scdm,
    /// Random initial projections.
    Random,
}

impl fmt::Display for ProjectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hydrogen => write!(f, "hydrogen"),
            Self::Numeric => write!(f, "numeric"),
            Self::Scdm => write!(f, "scdm"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Disentanglement scheme for entangled bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisentanglementType {
    /// No disentanglement.
    None,
    /// Fixed frozen window, by default Fermi energy + 2 eV.
    WindowFixed,
    /// Frozen-window ceiling derived from band projectability at run time.
    WindowAuto,
    /// Per-k-point disentanglement from projectability thresholds.
    Projectability,
    /// Fixed window combined with projectability thresholds.
    WindowAndProjectability,
    /// Choose automatically from the projection scheme and electronic type.
    Auto,
}

impl fmt::Display for DisentanglementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::WindowFixed => write!(f, "window_fixed"),
            Self::WindowAuto => write!(f, "window_auto"),
            Self::Projectability => write!(f, "projectability"),
            Self::WindowAndProjectability => write!(f, "window_and_projectability"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Electronic character of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectronicType {
    /// Metallic occupations.
    Metal,
    /// Insulating occupations.
    Insulator,
    /// Determine automatically. Declared but not supported.
    Automatic,
}

impl fmt::Display for ElectronicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metal => write!(f, "metal"),
            Self::Insulator => write!(f, "insulator"),
            Self::Automatic => write!(f, "automatic"),
        }
    }
}

/// Spin polarization treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinType {
    /// No spin polarization.
    NonPolarized,
    /// Collinear magnetism. Declared but not supported.
    Collinear,
    /// Non-collinear magnetism. Declared but not supported.
    NonCollinear,
    /// Spin-orbit coupling. Declared but not supported.
    SpinOrbit,
}

impl fmt::Display for SpinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPolarized => write!(f, "non_polarized"),
            Self::Collinear => write!(f, "collinear"),
            Self::NonCollinear => write!(f, "non_collinear"),
            Self::SpinOrbit => write!(f, "spin_orbit"),
        }
    }
}

/// Resolves [`DisentanglementType::Auto`] from the electronic character and
/// projection scheme; any explicit choice passes through unchanged.
///
/// Insulators need no disentanglement. For metals, hydrogen and random
/// projections use a fixed window, numeric orbitals add projectability
/// thresholds, and SCDM uses none at all since disentanglement corrupts the
/// SCDM-interpolated bands.
pub fn resolve_disentanglement(
    disentanglement: DisentanglementType,
    electronic: ElectronicType,
    projection: ProjectionType,
) -> Result<DisentanglementType, ConfigError> {
    if disentanglement != DisentanglementType::Auto {
        return Ok(disentanglement);
    }
    if electronic == ElectronicType::Insulator {
        return Ok(DisentanglementType::None);
    }
    Ok(match projection {
        ProjectionType::Hydrogen | ProjectionType::Random => DisentanglementType::WindowFixed,
        ProjectionType::Numeric => DisentanglementType::WindowAndProjectability,
        ProjectionType::Scdm => DisentanglementType::None,
    })
}
