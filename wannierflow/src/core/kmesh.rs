//! K-point mesh generation.
//!
//! The nscf and wannier90 stages must see the exact same k-points, so meshes
//! are always expanded into an explicit list instead of letting each external
//! code generate its own grid.

use serde::{Deserialize, Serialize};

use super::structure::Structure;

/// An explicit list of fractional k-points, optionally remembering the
/// Monkhorst-Pack grid it was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpointList {
    /// Fractional k-point coordinates.
    pub points: Vec<[f64; 3]>,
    /// Originating mesh dimensions, when generated from a grid.
    pub mesh: Option<[u32; 3]>,
}

impl KpointList {
    /// Number of k-points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A labelled high-symmetry path for band-structure plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpointPath {
    /// Labelled points along the path, e.g. `("GAMMA", [0, 0, 0])`.
    pub points: Vec<(String, [f64; 3])>,
}

impl KpointPath {
    /// Creates a path from labelled points.
    #[must_use]
    pub fn new(points: Vec<(String, [f64; 3])>) -> Self {
        Self { points }
    }
}

/// Computes a Monkhorst-Pack mesh so that the spacing along each reciprocal
/// axis does not exceed `distance` (inverse angstrom).
#[must_use]
pub fn mesh_from_distance(structure: &Structure, distance: f64) -> [u32; 3] {
    let reciprocal = structure.reciprocal_lattice();
    let mut mesh = [1_u32; 3];
    for (axis, b) in reciprocal.iter().enumerate() {
        let norm = (b[0] * b[0] + b[1] * b[1] + b[2] * b[2]).sqrt();
        let divisions = (norm / distance).ceil();
        if divisions.is_finite() && divisions >= 1.0 {
            // mesh dimensions are small integers, the cast is safe
            mesh[axis] = divisions as u32;
        }
    }
    mesh
}

/// Expands a mesh into the explicit list of fractional k-points, in the row
/// ordering the external codes expect (first axis slowest).
#[must_use]
pub fn explicit_kpoints(mesh: [u32; 3]) -> KpointList {
    let mut points =
        Vec::with_capacity((mesh[0] as usize) * (mesh[1] as usize) * (mesh[2] as usize));
    for i in 0..mesh[0] {
        for j in 0..mesh[1] {
            for k in 0..mesh[2] {
                points.push([
                    f64::from(i) / f64::from(mesh[0]),
                    f64::from(j) / f64::from(mesh[1]),
                    f64::from(k) / f64::from(mesh[2]),
                ]);
            }
        }
    }
    KpointList {
        points,
        mesh: Some(mesh),
    }
}
