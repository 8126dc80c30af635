//! Canned structures, pseudopotentials and job outputs for tests.

use serde_json::json;
use std::collections::HashMap;

use crate::core::{Bands, JobOutputs, Projections, Pseudo, Site, Structure};

/// Diamond-cubic silicon, two atoms in the conventional frame.
#[must_use]
pub fn silicon_structure() -> Structure {
    Structure::new(
        [[5.43, 0.0, 0.0], [0.0, 5.43, 0.0], [0.0, 0.0, 5.43]],
        vec![
            Site::new("Si", [0.0, 0.0, 0.0]),
            Site::new("Si", [1.3575, 1.3575, 1.3575]),
        ],
    )
}

/// Silicon pseudos whose checksum matches the bundled orbital table.
#[must_use]
pub fn silicon_pseudos() -> HashMap<String, Pseudo> {
    let mut pseudos = HashMap::new();
    pseudos.insert(
        "Si".to_string(),
        Pseudo::new(
            "Si",
            "Si.pbe-n-rrkjus_psl.1.0.0.UPF",
            "0b0bb1205258b0d07b9f9672cf965d4b",
            4.0,
        ),
    );
    pseudos
}

/// Zincblende GaAs; the Ga pseudo carries a 3D semicore shell.
#[must_use]
pub fn gaas_structure() -> Structure {
    Structure::new(
        [[5.65, 0.0, 0.0], [0.0, 5.65, 0.0], [0.0, 0.0, 5.65]],
        vec![
            Site::new("Ga", [0.0, 0.0, 0.0]),
            Site::new("As", [1.4125, 1.4125, 1.4125]),
        ],
    )
}

/// GaAs pseudos whose checksums match the bundled orbital table.
#[must_use]
pub fn gaas_pseudos() -> HashMap<String, Pseudo> {
    let mut pseudos = HashMap::new();
    pseudos.insert(
        "Ga".to_string(),
        Pseudo::new(
            "Ga",
            "Ga.pbe-dn-kjpaw_psl.1.0.0.UPF",
            "a27b4342b1af7e5f338de752e13ca4bf",
            13.0,
        ),
    );
    pseudos.insert(
        "As".to_string(),
        Pseudo::new(
            "As",
            "As.pbe-n-rrkjus_psl.0.2.UPF",
            "767d9025a8a1d9495a5a9bc93c9a86a4",
            5.0,
        ),
    );
    pseudos
}

/// Scf outputs with a Fermi energy in eV and an electron count.
#[must_use]
pub fn scf_outputs(fermi_energy: f64, number_of_electrons: f64) -> JobOutputs {
    let mut outputs = JobOutputs::new();
    outputs.insert(
        "output_parameters",
        json!({
            "fermi_energy": fermi_energy,
            "fermi_energy_units": "eV",
            "number_of_electrons": number_of_electrons,
        }),
    );
    outputs
}

/// Nscf outputs with a band count.
#[must_use]
pub fn nscf_outputs(number_of_bands: u32) -> JobOutputs {
    let mut outputs = JobOutputs::new();
    outputs.insert(
        "output_parameters",
        json!({"number_of_bands": number_of_bands}),
    );
    outputs
}

/// Projwfc outputs carrying band energies and projectability data.
#[must_use]
pub fn projwfc_outputs(bands: &Bands, projections: &Projections) -> JobOutputs {
    let mut outputs = JobOutputs::new();
    if let Ok(value) = serde_json::to_value(bands) {
        outputs.insert("bands", value);
    }
    if let Ok(value) = serde_json::to_value(projections) {
        outputs.insert("projections", value);
    }
    outputs
}

/// Postproc-setup outputs carrying the generated nnkp file.
#[must_use]
pub fn wannier90_pp_outputs() -> JobOutputs {
    let mut outputs = JobOutputs::new();
    outputs.insert("nnkp_file", json!("begin nnkpts\nend nnkpts\n"));
    outputs
}

/// Final wannier90 outputs with localisation results.
#[must_use]
pub fn wannier90_outputs() -> JobOutputs {
    let mut outputs = JobOutputs::new();
    outputs.insert(
        "output_parameters",
        json!({"Omega_total": 12.4, "wannier_functions": 4}),
    );
    outputs
}
