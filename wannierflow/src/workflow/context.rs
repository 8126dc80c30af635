//! Mutable state threaded through a running workflow.

use crate::core::{Bands, Job, JobInputs, Projections, RemoteFolder, Structure};

/// Everything a later stage may need from an earlier one.
///
/// The context is owned by the controller and mutated only between stages;
/// nothing in it is shared across workflows.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// The structure fed to the plane-wave stages; replaced by the relaxed
    /// structure when a relax stage runs.
    pub current_structure: Structure,
    /// Fermi energy in eV extracted from the scf outputs, when available.
    pub fermi_energy: Option<f64>,
    /// Band energies from the projwfc stage.
    pub bands: Option<Bands>,
    /// Projectability data from the projwfc stage.
    pub projections: Option<Projections>,
    /// Remote folder of the scf job, chained into nscf.
    pub scf_folder: Option<RemoteFolder>,
    /// Remote folder of the nscf job, chained into projwfc and pw2wannier90.
    pub nscf_folder: Option<RemoteFolder>,
    /// Remote folder of the pw2wannier90 job, chained into the final
    /// wannier90 run.
    pub pw2wannier90_folder: Option<RemoteFolder>,
    /// Content of the nnkp file generated by the postproc setup run.
    pub nnkp_file: Option<String>,
    /// Wannier90 inputs with window shifts and derived parameters applied.
    pub prepared_wannier90: Option<JobInputs>,
    /// Wannier90 inputs of the newest postproc attempt, carrying every
    /// handler correction. The final run inherits these.
    pub corrected_wannier90: Option<JobInputs>,
    /// Terminal per-stage jobs, populated as stages finish.
    pub relax: Option<Job>,
    /// The scf job.
    pub scf: Option<Job>,
    /// The nscf job.
    pub nscf: Option<Job>,
    /// The projwfc job.
    pub projwfc: Option<Job>,
    /// The postproc setup job.
    pub wannier90_pp: Option<Job>,
    /// The pw2wannier90 job.
    pub pw2wannier90: Option<Job>,
    /// The final wannier90 job.
    pub wannier90: Option<Job>,
    /// Every job launched by this workflow, failed attempts included, for
    /// terminal cleanup.
    pub launched: Vec<Job>,
}

impl WorkflowContext {
    /// Creates a fresh context for the given input structure.
    #[must_use]
    pub fn new(structure: Structure) -> Self {
        Self {
            current_structure: structure,
            fermi_energy: None,
            bands: None,
            projections: None,
            scf_folder: None,
            nscf_folder: None,
            pw2wannier90_folder: None,
            nnkp_file: None,
            prepared_wannier90: None,
            corrected_wannier90: None,
            relax: None,
            scf: None,
            nscf: None,
            projwfc: None,
            wannier90_pp: None,
            pw2wannier90: None,
            wannier90: None,
            launched: Vec::new(),
        }
    }

    /// Records every attempt of a finished process for later cleanup.
    pub fn record_attempts(&mut self, attempts: &[Job]) {
        self.launched.extend_from_slice(attempts);
    }
}
