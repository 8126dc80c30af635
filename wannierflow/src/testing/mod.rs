//! Test doubles: a scripted in-memory substrate and workflow fixtures.

mod fixtures;
mod mocks;

pub use fixtures::{
    gaas_pseudos, gaas_structure, nscf_outputs, projwfc_outputs, scf_outputs, silicon_pseudos,
    silicon_structure, wannier90_outputs, wannier90_pp_outputs,
};
pub use mocks::{ScriptedResponse, ScriptedSubmitter};
