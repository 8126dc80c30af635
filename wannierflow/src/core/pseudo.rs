//! Pseudopotential metadata: valence charges and the orbital table used for
//! semicore band exclusion.
//!
//! The orbital table is load-bearing input: it declares, per element, the
//! pseudo-wavefunction labels in the order the external codes emit them, and
//! which of those are semicore states. Each entry carries the md5 of the
//! pseudopotential file it was derived from; a checksum mismatch with the
//! actual pseudo is fatal.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::ConfigError;

/// Hex-encoded md5 digest of a byte string.
#[must_use]
pub fn md5_hex(content: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// A pseudopotential attached to one element of the structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pseudo {
    /// Chemical element.
    pub element: String,
    /// File name of the pseudopotential.
    pub filename: String,
    /// Hex-encoded md5 of the file content.
    pub md5: String,
    /// Valence charge.
    pub z_valence: f64,
}

impl Pseudo {
    /// Creates a pseudo with an explicit checksum.
    #[must_use]
    pub fn new(
        element: impl Into<String>,
        filename: impl Into<String>,
        md5: impl Into<String>,
        z_valence: f64,
    ) -> Self {
        Self {
            element: element.into(),
            filename: filename.into(),
            md5: md5.into(),
            z_valence,
        }
    }

    /// Creates a pseudo computing the checksum from the file content.
    #[must_use]
    pub fn from_content(
        element: impl Into<String>,
        filename: impl Into<String>,
        content: &[u8],
        z_valence: f64,
    ) -> Self {
        Self::new(element, filename, md5_hex(content), z_valence)
    }
}

/// Number of orbitals a pseudo-wavefunction label occupies, from its angular
/// momentum character (the last character of labels like `5S` or `3D`).
pub fn orbital_multiplicity(label: &str) -> Result<u32, ConfigError> {
    match label.chars().last() {
        Some('S' | 's') => Ok(1),
        Some('P' | 'p') => Ok(3),
        Some('D' | 'd') => Ok(5),
        Some('F' | 'f') => Ok(7),
        _ => Err(ConfigError::MalformedOrbitalTable(format!(
            "unknown orbital label `{label}`"
        ))),
    }
}

/// One element's entry in the orbital metadata table.
///
/// `pswfcs` lists the pseudo-wavefunction labels in the order the external
/// codes write them, which is not necessarily semicore-first; `semicores`
/// must be a subset of `pswfcs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoOrbitalEntry {
    /// File name of the pseudopotential the entry describes.
    pub filename: String,
    /// Hex-encoded md5 of that file.
    pub md5: String,
    /// Ordered pseudo-wavefunction labels, e.g. `["5S", "6S", "5P"]`.
    pub pswfcs: Vec<String>,
    /// The subset of labels that are semicore states.
    pub semicores: Vec<String>,
}

/// Orbital metadata table keyed by chemical element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PseudoOrbitalTable(HashMap<String, PseudoOrbitalEntry>);

/// Orbital table for the SSSP efficiency pseudopotential set, bundled with
/// the crate.
const BUNDLED_TABLE: &str = include_str!("../../data/semicore_sssp_efficiency.json");

impl PseudoOrbitalTable {
    /// Parses a table from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json)
            .map(Self)
            .map_err(|err| ConfigError::MalformedOrbitalTable(err.to_string()))
    }

    /// Loads the bundled SSSP efficiency table.
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_json_str(BUNDLED_TABLE)
    }

    /// Looks up the entry for an element.
    #[must_use]
    pub fn get(&self, element: &str) -> Option<&PseudoOrbitalEntry> {
        self.0.get(element)
    }

    /// Inserts or replaces an entry. Used by tests and custom tables.
    pub fn insert(&mut self, element: impl Into<String>, entry: PseudoOrbitalEntry) {
        self.0.insert(element.into(), entry);
    }

    /// Returns the entry for an element, failing if none exists.
    pub fn entry(&self, element: &str) -> Result<&PseudoOrbitalEntry, ConfigError> {
        self.get(element)
            .ok_or_else(|| ConfigError::MissingOrbitalMetadata(element.to_string()))
    }

    /// Validates that every pseudo's checksum matches the table entry for its
    /// element. A mismatch means the table describes a different file and any
    /// semicore exclusion derived from it would be wrong.
    pub fn validate(&self, pseudos: &HashMap<String, Pseudo>) -> Result<(), ConfigError> {
        for (element, pseudo) in pseudos {
            let entry = self.entry(element)?;
            if entry.md5 != pseudo.md5 {
                return Err(ConfigError::PseudoChecksumMismatch {
                    element: element.clone(),
                    expected: entry.md5.clone(),
                });
            }
        }
        Ok(())
    }
}
