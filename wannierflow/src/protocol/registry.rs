//! The named protocol registry: bundles of numeric defaults resolved once at
//! build time and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::ConfigError;

/// Per-stage enable flags of a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    /// Run the relax stage.
    pub relax: bool,
    /// Run the scf stage.
    pub scf: bool,
    /// Run the nscf stage.
    pub nscf: bool,
    /// Run the projwfc stage.
    pub projwfc: bool,
    /// Run the pw2wannier90 stage.
    pub pw2wannier90: bool,
    /// Run the wannier90 stages.
    pub wannier90: bool,
}

/// A named bundle of numeric defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Maximum k-point spacing in inverse angstrom.
    pub kpoints_distance: f64,
    /// Headroom factor for the nscf band count.
    pub nbands_factor: f64,
    /// Clean remote working directories at workflow termination.
    pub clean_workdir: bool,
    /// Which stages the protocol enables.
    pub stages: StageFlags,
}

/// User overrides applied on top of a named protocol; `None` keeps the
/// protocol value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProtocolOverrides {
    /// Override the k-point spacing.
    pub kpoints_distance: Option<f64>,
    /// Override the band headroom factor.
    pub nbands_factor: Option<f64>,
    /// Override the cleanup flag.
    pub clean_workdir: Option<bool>,
    /// Force the relax stage on or off.
    pub relax: Option<bool>,
    /// Force the projwfc stage on or off.
    pub projwfc: Option<bool>,
}

impl ProtocolOverrides {
    /// Applies the overrides to a resolved protocol.
    pub fn apply(&self, protocol: &mut Protocol) {
        if let Some(distance) = self.kpoints_distance {
            protocol.kpoints_distance = distance;
        }
        if let Some(factor) = self.nbands_factor {
            protocol.nbands_factor = factor;
        }
        if let Some(clean) = self.clean_workdir {
            protocol.clean_workdir = clean;
        }
        if let Some(relax) = self.relax {
            protocol.stages.relax = relax;
        }
        if let Some(projwfc) = self.projwfc {
            protocol.stages.projwfc = projwfc;
        }
    }
}

/// The registry of named protocols, loaded from a YAML resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRegistry {
    default_protocol: String,
    protocols: HashMap<String, Protocol>,
}

const BUNDLED_PROTOCOLS: &str = include_str!("../../data/protocols.yaml");

impl ProtocolRegistry {
    /// Parses a registry from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml)
            .map_err(|err| ConfigError::MalformedProtocolRegistry(err.to_string()))
    }

    /// Loads the bundled registry.
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_yaml_str(BUNDLED_PROTOCOLS)
    }

    /// Name of the default protocol.
    #[must_use]
    pub fn default_name(&self) -> &str {
        &self.default_protocol
    }

    /// Resolves a protocol by name; `None` resolves the default.
    pub fn resolve(&self, name: Option<&str>) -> Result<Protocol, ConfigError> {
        let name = name.unwrap_or(&self.default_protocol);
        self.protocols
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProtocol(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_registry_parses() {
        let registry = ProtocolRegistry::bundled().unwrap();
        assert_eq!(registry.default_name(), "moderate");

        let moderate = registry.resolve(None).unwrap();
        assert!((moderate.kpoints_distance - 0.2).abs() < 1e-12);
        assert!((moderate.nbands_factor - 1.2).abs() < 1e-12);
        assert!(moderate.stages.scf);
        assert!(!moderate.stages.relax);

        let precise = registry.resolve(Some("precise")).unwrap();
        assert!((precise.kpoints_distance - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_protocol() {
        let registry = ProtocolRegistry::bundled().unwrap();
        let err = registry.resolve(Some("extreme")).unwrap_err();
        assert_eq!(err, ConfigError::UnknownProtocol("extreme".to_string()));
    }

    #[test]
    fn test_override_precedence() {
        // defaults < named protocol < user overrides
        let registry = ProtocolRegistry::bundled().unwrap();
        let mut protocol = registry.resolve(Some("fast")).unwrap();
        assert!((protocol.kpoints_distance - 0.3).abs() < 1e-12);
        assert!(protocol.clean_workdir);

        let overrides = ProtocolOverrides {
            kpoints_distance: Some(0.25),
            clean_workdir: Some(false),
            relax: Some(true),
            ..ProtocolOverrides::default()
        };
        overrides.apply(&mut protocol);
        assert!((protocol.kpoints_distance - 0.25).abs() < 1e-12);
        assert!(!protocol.clean_workdir);
        assert!(protocol.stages.relax);
        // Untouched fields keep the protocol value.
        assert!((protocol.nbands_factor - 1.2).abs() < 1e-12);
    }
}
