//! Parameter bundles and job input assembly.
//!
//! A [`ParameterBundle`] is the namelist-style control-knob mapping handed to
//! an external code: for the plane-wave codes keys are nested objects
//! (`SYSTEM.nbnd`), for wannier90 they are flat. Bundles are built fresh per
//! stage and immutable once submitted; only the restart runner mutates its own
//! working copy between attempts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::job::{RemoteFolder, ResourceRequest};
use super::kmesh::{KpointList, KpointPath};
use super::structure::Structure;

/// A nested mapping of control parameters, JSON-valued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterBundle(Map<String, Value>);

impl ParameterBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the bundle holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up a value by dotted path (`SYSTEM.nbnd`) or flat key.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.0;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let value = current.get(segment)?;
            if segments.peek().is_none() {
                return Some(value);
            }
            current = value.as_object()?;
        }
        None
    }

    /// Looks up an `f64` by path, accepting any JSON number.
    #[must_use]
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    /// Looks up a `u64` by path.
    #[must_use]
    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    /// Looks up a boolean by path, defaulting to false when absent.
    #[must_use]
    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Returns true if a key exists at the path.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Sets a value at a dotted path, creating intermediate objects.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let mut current = &mut self.0;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                current.insert(segment.to_string(), value.into());
                return;
            }
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            match entry.as_object_mut() {
                Some(map) => current = map,
                // unreachable: the entry was just forced to an object
                None => return,
            }
        }
    }

    /// Sets a value only if the path is currently absent. Explicit user
    /// values always win over derived ones.
    pub fn set_default(&mut self, path: &str, value: impl Into<Value>) {
        if !self.contains(path) {
            self.set(path, value);
        }
    }

    /// Removes a key at a dotted path, returning the previous value.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let (parent, key) = match path.rsplit_once('.') {
            Some((parent, key)) => (Some(parent), key),
            None => (None, path),
        };
        match parent {
            None => self.0.remove(key),
            Some(parent_path) => {
                let mut current = &mut self.0;
                for segment in parent_path.split('.') {
                    current = current.get_mut(segment)?.as_object_mut()?;
                }
                current.remove(key)
            }
        }
    }

    /// Merges another bundle into this one; later values win, and nested
    /// objects are merged recursively.
    pub fn merge(&mut self, other: &Self) {
        merge_objects(&mut self.0, &other.0);
    }

    /// Iterates over the top-level keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl From<Value> for ParameterBundle {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

fn merge_objects(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_objects(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Per-job settings that are not namelist parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Extra command-line tokens, e.g. `["-nk", "16"]`.
    #[serde(default)]
    pub cmdline: Vec<String>,
    /// Run wannier90 in post-processing setup mode.
    #[serde(default)]
    pub postproc_setup: bool,
    /// Use random initial projections.
    #[serde(default)]
    pub random_projections: bool,
    /// Extra files to retrieve from the working directory.
    #[serde(default)]
    pub additional_retrieve_list: Vec<String>,
}

/// The full input bundle for one job.
///
/// Immutable once submitted; the restart runner owns a working copy that it
/// may adjust between attempts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobInputs {
    /// Identifier of the configured external code to run.
    pub code: Option<String>,
    /// Namelist-style control parameters.
    pub parameters: ParameterBundle,
    /// Non-namelist settings.
    pub settings: Settings,
    /// Resource request.
    pub resources: ResourceRequest,
    /// Parent working directory to read from (scf -> nscf chaining).
    pub parent_folder: Option<RemoteFolder>,
    /// Remote input folder (wannier90 final run).
    pub remote_input_folder: Option<RemoteFolder>,
    /// Explicit k-point list.
    pub kpoints: Option<KpointList>,
    /// High-symmetry k-point path for band plotting.
    pub kpoint_path: Option<KpointPath>,
    /// Input structure, for codes that consume one.
    pub structure: Option<Structure>,
    /// Explicit orbital projections (hydrogen-like guesses).
    pub projections: Option<Vec<String>>,
    /// Content of the nnkp file produced by the postproc setup run.
    pub nnkp_file: Option<String>,
}

impl JobInputs {
    /// Creates inputs holding only a parameter bundle.
    #[must_use]
    pub fn with_parameters(parameters: ParameterBundle) -> Self {
        Self {
            parameters,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_flat_get_set() {
        let mut bundle = ParameterBundle::new();
        bundle.set("num_wann", 8);
        assert_eq!(bundle.get_u64("num_wann"), Some(8));
        assert!(bundle.contains("num_wann"));
        assert!(!bundle.contains("num_bands"));
    }

    #[test]
    fn test_nested_get_set() {
        let mut bundle = ParameterBundle::new();
        bundle.set("SYSTEM.nbnd", 12);
        bundle.set("SYSTEM.nosym", true);
        assert_eq!(bundle.get_u64("SYSTEM.nbnd"), Some(12));
        assert!(bundle.get_bool("SYSTEM.nosym"));
        assert_eq!(bundle.get("SYSTEM").and_then(Value::as_object).map(Map::len), Some(2));
    }

    #[test]
    fn test_set_default_does_not_overwrite() {
        let mut bundle = ParameterBundle::new();
        bundle.set("inputpp.scdm_mu", -1.5);
        bundle.set_default("inputpp.scdm_mu", 99.0);
        bundle.set_default("inputpp.scdm_sigma", 0.2);
        assert_eq!(bundle.get_f64("inputpp.scdm_mu"), Some(-1.5));
        assert_eq!(bundle.get_f64("inputpp.scdm_sigma"), Some(0.2));
    }

    #[test]
    fn test_merge_later_wins_recursively() {
        let mut base = ParameterBundle::from(json!({
            "SYSTEM": {"nbnd": 10, "nosym": true},
            "CONTROL": {"calculation": "scf"}
        }));
        let overlay = ParameterBundle::from(json!({
            "SYSTEM": {"nbnd": 14},
            "ELECTRONS": {"diagonalization": "cg"}
        }));
        base.merge(&overlay);
        assert_eq!(base.get_u64("SYSTEM.nbnd"), Some(14));
        assert!(base.get_bool("SYSTEM.nosym"));
        assert_eq!(
            base.get("ELECTRONS.diagonalization"),
            Some(&json!("cg"))
        );
    }

    #[test]
    fn test_remove_nested() {
        let mut bundle = ParameterBundle::from(json!({"inputpp": {"scdm_mu": 1.0}}));
        assert_eq!(bundle.remove("inputpp.scdm_mu"), Some(json!(1.0)));
        assert!(!bundle.contains("inputpp.scdm_mu"));
    }
}
