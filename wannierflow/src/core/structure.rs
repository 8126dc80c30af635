//! Crystal structure: lattice, atomic sites and derived quantities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An atomic site inside a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Chemical kind (element symbol).
    pub kind: String,
    /// Cartesian position in angstrom.
    pub position: [f64; 3],
}

impl Site {
    /// Creates a new site.
    #[must_use]
    pub fn new(kind: impl Into<String>, position: [f64; 3]) -> Self {
        Self {
            kind: kind.into(),
            position,
        }
    }
}

/// A periodic crystal structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// Row-major lattice vectors in angstrom.
    pub lattice: [[f64; 3]; 3],
    /// Atomic sites; the order matters, since external codes consume the
    /// sites in exactly this order.
    pub sites: Vec<Site>,
}

impl Structure {
    /// Creates a new structure.
    #[must_use]
    pub fn new(lattice: [[f64; 3]; 3], sites: Vec<Site>) -> Self {
        Self { lattice, sites }
    }

    /// Number of atoms.
    #[must_use]
    pub fn num_atoms(&self) -> usize {
        self.sites.len()
    }

    /// Distinct element kinds in order of first appearance.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for site in &self.sites {
            if !seen.contains(&site.kind.as_str()) {
                seen.push(site.kind.as_str());
            }
        }
        seen
    }

    /// Chemical formula with alphabetically sorted element counts, e.g. `GaAs`
    /// or `Si2`.
    #[must_use]
    pub fn formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for site in &self.sites {
            *counts.entry(site.kind.as_str()).or_default() += 1;
        }
        let mut formula = String::new();
        for (kind, count) in counts {
            formula.push_str(kind);
            if count > 1 {
                formula.push_str(&count.to_string());
            }
        }
        formula
    }

    /// Reciprocal lattice vectors, including the 2*pi factor.
    #[must_use]
    pub fn reciprocal_lattice(&self) -> [[f64; 3]; 3] {
        let a = &self.lattice;
        let cross = |u: &[f64; 3], v: &[f64; 3]| {
            [
                u[1] * v[2] - u[2] * v[1],
                u[2] * v[0] - u[0] * v[2],
                u[0] * v[1] - u[1] * v[0],
            ]
        };
        let bc = cross(&a[1], &a[2]);
        let volume = a[0][0] * bc[0] + a[0][1] * bc[1] + a[0][2] * bc[2];
        let factor = 2.0 * std::f64::consts::PI / volume;
        let ca = cross(&a[2], &a[0]);
        let ab = cross(&a[0], &a[1]);
        [
            [bc[0] * factor, bc[1] * factor, bc[2] * factor],
            [ca[0] * factor, ca[1] * factor, ca[2] * factor],
            [ab[0] * factor, ab[1] * factor, ab[2] * factor],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic(a: f64) -> [[f64; 3]; 3] {
        [[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]]
    }

    #[test]
    fn test_formula() {
        let structure = Structure::new(
            cubic(5.43),
            vec![
                Site::new("Si", [0.0, 0.0, 0.0]),
                Site::new("Si", [1.36, 1.36, 1.36]),
            ],
        );
        assert_eq!(structure.formula(), "Si2");

        let gaas = Structure::new(
            cubic(5.65),
            vec![
                Site::new("Ga", [0.0, 0.0, 0.0]),
                Site::new("As", [1.41, 1.41, 1.41]),
            ],
        );
        assert_eq!(gaas.formula(), "AsGa");
    }

    #[test]
    fn test_kinds_order_of_appearance() {
        let structure = Structure::new(
            cubic(5.65),
            vec![
                Site::new("Ga", [0.0; 3]),
                Site::new("As", [1.41; 3]),
                Site::new("Ga", [2.82; 3]),
            ],
        );
        assert_eq!(structure.kinds(), vec!["Ga", "As"]);
    }

    #[test]
    fn test_reciprocal_lattice_cubic() {
        let structure = Structure::new(cubic(2.0), vec![Site::new("X", [0.0; 3])]);
        let b = structure.reciprocal_lattice();
        let expected = std::f64::consts::PI; // 2*pi / 2.0
        assert!((b[0][0] - expected).abs() < 1e-12);
        assert!(b[0][1].abs() < 1e-12);
        assert!((b[1][1] - expected).abs() < 1e-12);
        assert!((b[2][2] - expected).abs() < 1e-12);
    }
}
