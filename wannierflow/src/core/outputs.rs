//! Opaque job output maps with typed accessors.

use serde_json::Value;
use std::collections::HashMap;

use super::bands::{Bands, Projections};
use super::job::{JobId, RemoteFolder};
use super::structure::Structure;

/// Outputs of a finished job: an opaque key -> value mapping, populated by
/// the substrate only on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOutputs(HashMap<String, Value>);

impl JobOutputs {
    /// Creates an empty output map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a raw value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Looks up a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true if no outputs are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `output_parameters` mapping, when present.
    #[must_use]
    pub fn output_parameters(&self) -> Option<&Value> {
        self.get("output_parameters")
    }

    /// A scalar field inside `output_parameters`.
    #[must_use]
    pub fn output_parameter_f64(&self, key: &str) -> Option<f64> {
        self.output_parameters()?.get(key)?.as_f64()
    }

    /// A string field inside `output_parameters`.
    #[must_use]
    pub fn output_parameter_str(&self, key: &str) -> Option<&str> {
        self.output_parameters()?.get(key)?.as_str()
    }

    /// Deserialized band energies, when present under `bands`.
    #[must_use]
    pub fn bands(&self) -> Option<Bands> {
        serde_json::from_value(self.get("bands")?.clone()).ok()
    }

    /// Deserialized projectability data, when present under `projections`.
    #[must_use]
    pub fn projections(&self) -> Option<Projections> {
        serde_json::from_value(self.get("projections")?.clone()).ok()
    }

    /// The remote working folder, when present under `remote_folder`.
    #[must_use]
    pub fn remote_folder(&self) -> Option<RemoteFolder> {
        serde_json::from_value(self.get("remote_folder")?.clone()).ok()
    }

    /// The relaxed output structure, when present under `output_structure`.
    #[must_use]
    pub fn output_structure(&self) -> Option<Structure> {
        serde_json::from_value(self.get("output_structure")?.clone()).ok()
    }

    /// Content of the generated nnkp file, when present under `nnkp_file`.
    #[must_use]
    pub fn nnkp_file(&self) -> Option<String> {
        self.get("nnkp_file")?.as_str().map(str::to_string)
    }

    /// Stores a remote folder under the conventional key.
    pub fn set_remote_folder(&mut self, path: impl Into<String>, owner: JobId) {
        if let Ok(value) = serde_json::to_value(RemoteFolder::new(path, owner)) {
            self.insert("remote_folder", value);
        }
    }

    /// Iterates over the raw entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}
