//! Error types and the stable exit-code contract for wannierflow workflows.
//!
//! Exit codes are a numeric contract shared with callers: validation failures
//! are in the 40x range, per-stage failures in the 410-470 range, and the
//! restart wrapper surfaces 311 for an incomplete stdout that could not be
//! recovered. The numbers never change once published.

use thiserror::Error;

use crate::core::{ExitStatus, JobId};

/// Stable exit codes produced by the workflow.
///
/// Each code carries a documented, human-readable message. Callers branch on
/// the numeric value via [`ExitCode::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCode {
    /// The stdout output file was incomplete and could not be recovered.
    OutputStdoutIncomplete,
    /// `bands_plot` is true but no kpoint path was provided.
    InvalidInputKpointPath,
    /// `relative_dis_windows` is true but no Fermi energy is available.
    InvalidInputRelativeDisWindows,
    /// Invalid pseudopotentials.
    InvalidInputPseudopotential,
    /// The relax sub-process failed.
    RelaxFailed,
    /// The scf sub-process failed.
    ScfFailed,
    /// The nscf sub-process failed.
    NscfFailed,
    /// The projwfc sub-process failed.
    ProjwfcFailed,
    /// The wannier90 post-processing sub-process failed.
    Wannier90PpFailed,
    /// The pw2wannier90 sub-process failed.
    Pw2wannier90Failed,
    /// The wannier90 sub-process failed.
    Wannier90Failed,
}

impl ExitCode {
    /// Returns the stable numeric value of the exit code.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::OutputStdoutIncomplete => 311,
            Self::InvalidInputKpointPath => 401,
            Self::InvalidInputRelativeDisWindows => 402,
            Self::InvalidInputPseudopotential => 403,
            Self::RelaxFailed => 410,
            Self::ScfFailed => 420,
            Self::NscfFailed => 430,
            Self::ProjwfcFailed => 440,
            Self::Wannier90PpFailed => 450,
            Self::Pw2wannier90Failed => 460,
            Self::Wannier90Failed => 470,
        }
    }

    /// Returns the documented message for the exit code.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::OutputStdoutIncomplete => {
                "the stdout output file was incomplete, probably because the calculation got interrupted"
            }
            Self::InvalidInputKpointPath => "bands_plot is true but no kpoint_path provided",
            Self::InvalidInputRelativeDisWindows => {
                "relative_dis_windows is true but no fermi_energy provided"
            }
            Self::InvalidInputPseudopotential => "invalid pseudopotentials",
            Self::RelaxFailed => "the relax sub-process failed",
            Self::ScfFailed => "the scf sub-process failed",
            Self::NscfFailed => "the nscf sub-process failed",
            Self::ProjwfcFailed => "the projwfc sub-process failed",
            Self::Wannier90PpFailed => "the postproc wannier90 sub-process failed",
            Self::Pw2wannier90Failed => "the pw2wannier90 sub-process failed",
            Self::Wannier90Failed => "the wannier90 sub-process failed",
        }
    }

    /// Converts the exit code into a terminal [`ExitStatus`].
    #[must_use]
    pub fn status(&self) -> ExitStatus {
        ExitStatus::new(self.code(), self.message())
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

/// Configuration errors: bad input combinations detected at build or setup
/// time. Always fatal, never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// The requested protocol name is not registered.
    #[error("unknown protocol `{0}`")]
    UnknownProtocol(String),

    /// A required code entry is missing from the code bundle.
    #[error("`codes` does not contain the required key: {0}")]
    MissingCode(&'static str),

    /// The electronic type is declared unsupported.
    #[error("electronic type `{0}` is not supported")]
    UnsupportedElectronicType(String),

    /// The spin type is declared unsupported.
    #[error("spin type `{0}` is not supported")]
    UnsupportedSpinType(String),

    /// Magnetic moments were given for an incompatible spin type.
    #[error("`initial_magnetic_moments` is specified but spin type `{0}` is incompatible")]
    IncompatibleMagneticMoments(String),

    /// The disentanglement type is not supported by input generation.
    #[error("not supported disentanglement type: {0}")]
    UnsupportedDisentanglement(String),

    /// All exclusions left a non-positive Wannier function count.
    #[error("wrong num_wann {0}")]
    InvalidWannierCount(i64),

    /// A pseudopotential is missing for an element of the structure.
    #[error("no pseudopotential provided for element {0}")]
    MissingPseudo(String),

    /// The pseudopotential checksum does not match the orbital table.
    #[error("cannot find pseudopotential {element} with md5 {expected}")]
    PseudoChecksumMismatch {
        /// The chemical element.
        element: String,
        /// The md5 declared by the orbital table.
        expected: String,
    },

    /// No orbital metadata entry exists for an element.
    #[error("no orbital metadata for element {0}")]
    MissingOrbitalMetadata(String),

    /// `scdm_entanglement = gaussian` requires explicit mu and sigma.
    #[error("scdm_entanglement = gaussian but scdm_mu or scdm_sigma is empty")]
    GaussianMissingMuSigma,

    /// The SCDM mu/sigma fit needs projectability data.
    #[error("needs to run projwfc before auto-generating scdm_mu/sigma")]
    ProjwfcRequiredForScdm,

    /// `relative_dis_windows` requires an scf stage.
    #[error("relative_dis_windows = true but no scf calculation was run")]
    RelativeWindowsWithoutScf,

    /// The protocol registry file could not be parsed.
    #[error("malformed protocol registry: {0}")]
    MalformedProtocolRegistry(String),

    /// The orbital metadata table could not be parsed.
    #[error("malformed orbital metadata table: {0}")]
    MalformedOrbitalTable(String),
}

/// Post-hoc consistency violations detected in the results stage.
///
/// These indicate a physics or metadata inconsistency, not a job failure,
/// and are deliberately distinct from the stage exit codes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConsistencyError {
    /// The computed projection count disagrees with the projwfc output.
    #[error("number of projections {computed} != projwfc output {reported}")]
    ProjectionCount {
        /// Count derived from the structure and orbital metadata.
        computed: usize,
        /// Count reported by the projwfc job.
        reported: usize,
    },

    /// The computed electron count disagrees with the scf output.
    #[error("number of electrons {computed} != scf output {reported}")]
    ElectronCount {
        /// Count derived from the pseudopotential valences.
        computed: f64,
        /// Count reported by the scf job.
        reported: f64,
    },
}

/// Errors raised by the execution substrate while submitting or cleaning jobs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubstrateError {
    /// The submission itself failed before the job reached a terminal state.
    #[error("job submission failed: {0}")]
    Submission(String),

    /// The remote working storage could not be released.
    #[error("failed to clean remote folder of job {0}: {1}")]
    Cleanup(JobId, String),

    /// The job has no remote working storage attached.
    #[error("job {0} has no remote folder")]
    MissingWorkdir(JobId),
}

/// The top-level error type for wannierflow operations.
#[derive(Debug, Error)]
pub enum WannierflowError {
    /// A fatal configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A stage failed terminally with a stable exit code.
    #[error("stage `{stage}` failed: {exit}")]
    Stage {
        /// The stage that failed.
        stage: String,
        /// The stable exit code for the failure.
        exit: ExitCode,
    },

    /// A job failed and no recovery handler could fix it.
    #[error("{label}<{id}> failed with exit status {exit}")]
    UnrecoverableJob {
        /// The job label.
        label: String,
        /// The job id.
        id: JobId,
        /// The job's terminal exit status.
        exit: ExitStatus,
    },

    /// A post-hoc consistency check failed.
    #[error("{0}")]
    Consistency(#[from] ConsistencyError),

    /// An error from the execution substrate.
    #[error("{0}")]
    Substrate(#[from] SubstrateError),

    /// A parameter derivation failed.
    #[error("{0}")]
    Derive(#[from] crate::derive::DeriveError),

    /// A required output was missing from a finished job.
    #[error("job output `{key}` missing for stage `{stage}`")]
    MissingOutput {
        /// The stage whose output was expected.
        stage: String,
        /// The missing output key.
        key: String,
    },
}

impl WannierflowError {
    /// Builds a stage failure error for the given stage name and exit code.
    #[must_use]
    pub fn stage(stage: impl Into<String>, exit: ExitCode) -> Self {
        Self::Stage {
            stage: stage.into(),
            exit,
        }
    }

    /// Returns the stable exit code if this error carries one.
    #[must_use]
    pub fn exit_code(&self) -> Option<u32> {
        match self {
            Self::Stage { exit, .. } => Some(exit.code()),
            Self::UnrecoverableJob { exit, .. } => Some(exit.code),
            _ => None,
        }
    }
}

/// Convenience alias for results with a [`WannierflowError`].
pub type Result<T, E = WannierflowError> = std::result::Result<T, E>;
