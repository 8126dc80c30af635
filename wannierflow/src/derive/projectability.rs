//! Frozen-window ceiling from band projectability.

use super::DeriveError;
use crate::core::{Bands, Projections};

/// Default projectability threshold for the automatic frozen-window ceiling.
pub const DEFAULT_PROJECTABILITY_THRESHOLD: f64 = 0.9;

/// Returns the energy above which bands stop being well represented by
/// atomic-orbital projections.
///
/// All (energy, projectability) states are flattened across k-points and
/// sorted by ascending energy; the result is the energy of the first state
/// whose projectability falls below `threshold`. Used as an automatic
/// `dis_froz_max`.
pub fn energy_of_projectability(
    bands: &Bands,
    projections: &Projections,
    threshold: f64,
) -> Result<f64, DeriveError> {
    if bands.num_kpoints() != projections.projectability.len() {
        return Err(DeriveError::ShapeMismatch);
    }
    for (energies, projectabilities) in
        bands.energies.iter().zip(&projections.projectability)
    {
        if energies.len() != projectabilities.len() {
            return Err(DeriveError::ShapeMismatch);
        }
    }

    let mut states: Vec<(f64, f64)> = bands.zip_flat(&projections.projectability).collect();
    if states.is_empty() {
        return Err(DeriveError::EmptyBands);
    }
    states.sort_by(|a, b| a.0.total_cmp(&b.0));

    states
        .iter()
        .find(|(_, projectability)| *projectability < threshold)
        .map(|(energy, _)| *energy)
        .ok_or(DeriveError::NoThresholdCrossing(threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_low_projectability_energy() {
        let bands = Bands::new(vec![vec![-5.0, 1.0, 8.0], vec![-4.0, 2.0, 9.0]]);
        let projections = Projections::new(vec![vec![0.99, 0.95, 0.3], vec![0.98, 0.5, 0.2]], 3);
        // Sorted states: (-5, .99) (-4, .98) (1, .95) (2, .5) (8, .3) (9, .2)
        let energy = energy_of_projectability(&bands, &projections, 0.9).unwrap();
        assert!((energy - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_crossing_is_an_error() {
        let bands = Bands::new(vec![vec![0.0, 1.0]]);
        let projections = Projections::new(vec![vec![0.99, 0.95]], 2);
        let err = energy_of_projectability(&bands, &projections, 0.9).unwrap_err();
        assert_eq!(err, DeriveError::NoThresholdCrossing(0.9));
    }

    #[test]
    fn test_shape_mismatch() {
        let bands = Bands::new(vec![vec![0.0, 1.0]]);
        let projections = Projections::new(vec![vec![0.5]], 1);
        assert_eq!(
            energy_of_projectability(&bands, &projections, 0.9),
            Err(DeriveError::ShapeMismatch)
        );
    }

    #[test]
    fn test_empty_bands() {
        assert_eq!(
            energy_of_projectability(&Bands::default(), &Projections::default(), 0.9),
            Err(DeriveError::EmptyBands)
        );
    }
}
