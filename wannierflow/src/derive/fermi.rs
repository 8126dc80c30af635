//! Fermi energy extraction from scf output parameters.

use crate::core::JobOutputs;

/// Returns the Fermi energy from scf output parameters, in eV.
///
/// The value is returned only if its declared unit is exactly `eV`; any other
/// unit (or a missing unit field) yields `None` rather than a silent
/// conversion.
#[must_use]
pub fn fermi_energy(scf_outputs: &JobOutputs) -> Option<f64> {
    let units = scf_outputs.output_parameter_str("fermi_energy_units")?;
    if units != "eV" {
        return None;
    }
    scf_outputs.output_parameter_f64("fermi_energy")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs(parameters: serde_json::Value) -> JobOutputs {
        let mut outputs = JobOutputs::new();
        outputs.insert("output_parameters", parameters);
        outputs
    }

    #[test]
    fn test_fermi_energy_ev() {
        let scf = outputs(json!({"fermi_energy": 6.63, "fermi_energy_units": "eV"}));
        assert_eq!(fermi_energy(&scf), Some(6.63));
    }

    #[test]
    fn test_fermi_energy_wrong_units() {
        let scf = outputs(json!({"fermi_energy": 0.487, "fermi_energy_units": "Ry"}));
        assert_eq!(fermi_energy(&scf), None);
    }

    #[test]
    fn test_fermi_energy_missing_units() {
        let scf = outputs(json!({"fermi_energy": 6.63}));
        assert_eq!(fermi_energy(&scf), None);
    }

    #[test]
    fn test_fermi_energy_missing_value() {
        let scf = outputs(json!({"fermi_energy_units": "eV"}));
        assert_eq!(fermi_energy(&scf), None);
    }

    #[test]
    fn test_fermi_energy_no_parameters() {
        assert_eq!(fermi_energy(&JobOutputs::new()), None);
    }
}
