//! Semicore band index computation.
//!
//! The external codes store pseudo-wavefunctions in the same order as the
//! atomic positions in the plane-wave input, and within one site in the order
//! the pseudopotential declares them. Semicore states are therefore located
//! by walking sites and orbitals in exactly that order while accumulating a
//! running orbital-count offset.

use super::DeriveError;
use crate::core::{orbital_multiplicity, PseudoOrbitalTable, Structure};

/// Returns the 1-based band indices occupied by semicore states, in
/// ascending order.
///
/// Per site, orbitals are visited in declared pseudopotential order; each
/// semicore orbital contributes its contiguous index range and is removed
/// from a per-site working copy of the semicore set. A site ending with
/// unconsumed semicore labels means the orbital metadata is inconsistent with
/// itself, which is a structural error and aborts bundle construction.
pub fn semicore_band_indices(
    structure: &Structure,
    table: &PseudoOrbitalTable,
) -> Result<Vec<usize>, DeriveError> {
    let mut semicore_list = Vec::new();
    let mut offset = 0_usize;

    for site in &structure.sites {
        let entry = table.entry(&site.kind)?;
        let mut remaining: Vec<&str> = entry.semicores.iter().map(String::as_str).collect();

        for orbital in &entry.pswfcs {
            let multiplicity = orbital_multiplicity(orbital)? as usize;
            if let Some(position) = remaining.iter().position(|label| label == orbital) {
                remaining.remove(position);
                semicore_list.extend(offset + 1..=offset + multiplicity);
            }
            offset += multiplicity;
        }

        if !remaining.is_empty() {
            return Err(DeriveError::UnconsumedSemicore {
                element: site.kind.clone(),
                labels: remaining.iter().map(ToString::to_string).collect(),
            });
        }
    }

    Ok(semicore_list)
}
