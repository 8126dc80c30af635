//! Electron, projection and band counting.

use std::collections::HashMap;

use super::DeriveError;
use crate::core::{orbital_multiplicity, Pseudo, PseudoOrbitalTable, Structure};
use crate::errors::ConfigError;

/// Total number of valence electrons: the sum of the pseudopotential valence
/// charges over all sites.
pub fn num_electrons(
    structure: &Structure,
    pseudos: &HashMap<String, Pseudo>,
) -> Result<f64, DeriveError> {
    let mut total = 0.0;
    for site in &structure.sites {
        let pseudo = pseudos
            .get(&site.kind)
            .ok_or_else(|| ConfigError::MissingPseudo(site.kind.clone()))?;
        total += pseudo.z_valence;
    }
    Ok(total)
}

/// Total number of atomic-orbital projections: the sum of orbital
/// multiplicities over all sites' declared pseudo-wavefunctions.
pub fn num_projections(
    structure: &Structure,
    table: &PseudoOrbitalTable,
) -> Result<usize, DeriveError> {
    let mut total = 0_usize;
    for site in &structure.sites {
        let entry = table.entry(&site.kind)?;
        for orbital in &entry.pswfcs {
            total += orbital_multiplicity(orbital)? as usize;
        }
    }
    Ok(total)
}

/// Number of bands for the nscf solve.
///
/// For insulators (`only_valence`) this is exactly the number of occupied
/// bands; otherwise enough conduction headroom is added so that both the
/// electron count scaled by `factor` and the projection count are covered,
/// with a flat minimum of four extra bands.
pub fn required_band_count(
    structure: &Structure,
    pseudos: &HashMap<String, Pseudo>,
    table: &PseudoOrbitalTable,
    factor: f64,
    only_valence: bool,
    spin_polarized: bool,
) -> Result<u32, DeriveError> {
    let nspin = if spin_polarized { 2.0 } else { 1.0 };
    let nelec = num_electrons(structure, pseudos)?;
    let occupied = (0.5 * nelec * nspin).floor();

    let nbands = if only_valence {
        occupied
    } else {
        let nproj = num_projections(structure, table)? as f64;
        (0.5 * nelec * nspin * factor)
            .floor()
            .max(occupied + 4.0 * nspin)
            .max((nproj * factor).floor())
            .max(nproj + 4.0)
    };

    // counts fit comfortably in u32
    Ok(nbands as u32)
}
