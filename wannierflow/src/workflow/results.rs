//! Namespaced outputs of a completed workflow.

use crate::core::JobOutputs;

/// Per-stage outputs of a successful workflow run.
///
/// Optional namespaces are absent when the corresponding stage was skipped;
/// the wannier90 outputs are always present since the final localisation is
/// the point of the whole exercise.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOutputs {
    /// Relax stage outputs.
    pub relax: Option<JobOutputs>,
    /// Scf stage outputs.
    pub scf: Option<JobOutputs>,
    /// Nscf stage outputs.
    pub nscf: Option<JobOutputs>,
    /// Projwfc stage outputs.
    pub projwfc: Option<JobOutputs>,
    /// Postproc setup outputs.
    pub wannier90_pp: Option<JobOutputs>,
    /// Pw2wannier90 stage outputs.
    pub pw2wannier90: Option<JobOutputs>,
    /// Final wannier90 outputs.
    pub wannier90: JobOutputs,
    /// Fermi energy in eV, when an scf stage provided one.
    pub fermi_energy: Option<f64>,
}
