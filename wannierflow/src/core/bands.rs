//! Band energies and projectability data, as reported by the external codes.

use serde::{Deserialize, Serialize};

/// Band energies on a k-point grid, in eV.
///
/// Stored as `energies[kpoint][band]`; every k-point carries the same number
/// of bands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    /// Energy matrix, one row per k-point.
    pub energies: Vec<Vec<f64>>,
}

impl Bands {
    /// Creates bands from an energy matrix.
    #[must_use]
    pub fn new(energies: Vec<Vec<f64>>) -> Self {
        Self { energies }
    }

    /// Number of k-points.
    #[must_use]
    pub fn num_kpoints(&self) -> usize {
        self.energies.len()
    }

    /// Number of bands per k-point, zero when empty.
    #[must_use]
    pub fn num_bands(&self) -> usize {
        self.energies.first().map_or(0, Vec::len)
    }

    /// Minimum over all k-points of the energy of the 1-based `band`-th band.
    #[must_use]
    pub fn min_energy_of_band(&self, band: usize) -> Option<f64> {
        if band == 0 {
            return None;
        }
        self.energies
            .iter()
            .map(|kpoint| kpoint.get(band - 1).copied())
            .try_fold(f64::INFINITY, |acc, energy| energy.map(|e| acc.min(e)))
            .filter(|min| min.is_finite())
    }

    /// Flattens all (energy, paired value) states across k-points and bands.
    pub(crate) fn zip_flat<'a>(
        &'a self,
        other: &'a [Vec<f64>],
    ) -> impl Iterator<Item = (f64, f64)> + 'a {
        self.energies
            .iter()
            .zip(other.iter())
            .flat_map(|(energies, values)| {
                energies.iter().copied().zip(values.iter().copied())
            })
    }
}

/// Per-band, per-k-point projectability onto atomic orbitals, together with
/// the number of projection orbitals the analysis used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projections {
    /// Projectability matrix, same shape as the band energies.
    pub projectability: Vec<Vec<f64>>,
    /// Number of atomic-orbital projections.
    pub num_orbitals: usize,
}

impl Projections {
    /// Creates projections from a projectability matrix.
    #[must_use]
    pub fn new(projectability: Vec<Vec<f64>>, num_orbitals: usize) -> Self {
        Self {
            projectability,
            num_orbitals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_energy_of_band() {
        let bands = Bands::new(vec![
            vec![-2.0, 1.0, 5.0],
            vec![-1.5, 0.5, 4.0],
            vec![-2.5, 2.0, 6.0],
        ]);
        assert_eq!(bands.min_energy_of_band(1), Some(-2.5));
        assert_eq!(bands.min_energy_of_band(2), Some(0.5));
        assert_eq!(bands.min_energy_of_band(3), Some(4.0));
        assert_eq!(bands.min_energy_of_band(4), None);
        assert_eq!(bands.min_energy_of_band(0), None);
    }

    #[test]
    fn test_shape_accessors() {
        let bands = Bands::new(vec![vec![0.0, 1.0], vec![0.5, 1.5]]);
        assert_eq!(bands.num_kpoints(), 2);
        assert_eq!(bands.num_bands(), 2);
        assert_eq!(Bands::default().num_bands(), 0);
    }
}
