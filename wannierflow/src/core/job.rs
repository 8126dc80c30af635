//! Job types: the unit of external computation handed to the substrate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::outputs::JobOutputs;
use super::params::JobInputs;

/// The kind of external process a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// Variable-cell relaxation with pw.x.
    PwRelax,
    /// Self-consistent field solve with pw.x.
    PwScf,
    /// Non-self-consistent field solve with pw.x.
    PwNscf,
    /// Projectability analysis with projwfc.x.
    Projwfc,
    /// Wannier90 post-processing setup run (nnkp generation).
    Wannier90Pp,
    /// Overlap/projection matrix generation with pw2wannier90.x.
    Pw2wannier90,
    /// Wannier function localisation with wannier90.x.
    Wannier90,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PwRelax => write!(f, "pw_relax"),
            Self::PwScf => write!(f, "pw_scf"),
            Self::PwNscf => write!(f, "pw_nscf"),
            Self::Projwfc => write!(f, "projwfc"),
            Self::Wannier90Pp => write!(f, "wannier90_pp"),
            Self::Pw2wannier90 => write!(f, "pw2wannier90"),
            Self::Wannier90 => write!(f, "wannier90"),
        }
    }
}

/// Substrate-assigned job identity. Ids increase monotonically, so the
/// numerically largest id among sibling jobs is the most recently created.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The execution status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created but not yet running.
    #[default]
    Pending,
    /// Job running on the substrate.
    Running,
    /// Job finished successfully; outputs are populated.
    FinishedOk,
    /// Job finished with a failure; an exit status is attached.
    FinishedFailed,
}

impl JobStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinishedOk | Self::FinishedFailed)
    }
}

/// Terminal exit status of a failed (or handled) job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Numeric exit code reported by the process.
    pub code: u32,
    /// Human-readable exit message.
    pub message: String,
}

impl ExitStatus {
    /// Creates a new exit status.
    #[must_use]
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Resource request attached to a job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Number of machines to allocate.
    pub num_machines: u32,
    /// MPI processes per machine; the substrate default applies when unset.
    pub num_mpiprocs_per_machine: Option<u32>,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            num_machines: 1,
            num_mpiprocs_per_machine: None,
        }
    }
}

impl ResourceRequest {
    /// Creates a request for a number of machines with default process count.
    #[must_use]
    pub fn machines(num_machines: u32) -> Self {
        Self {
            num_machines,
            num_mpiprocs_per_machine: None,
        }
    }

    /// Sets the MPI processes per machine.
    #[must_use]
    pub fn with_mpiprocs_per_machine(mut self, procs: u32) -> Self {
        self.num_mpiprocs_per_machine = Some(procs);
        self
    }
}

/// Remote working storage handle of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    /// Path of the working directory on the remote machine.
    pub path: String,
    /// Job that owns the folder.
    pub owner: JobId,
}

impl RemoteFolder {
    /// Creates a remote folder handle.
    #[must_use]
    pub fn new(path: impl Into<String>, owner: JobId) -> Self {
        Self {
            path: path.into(),
            owner,
        }
    }
}

/// A submission request: everything the substrate needs to launch a job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// The kind of process to run.
    pub kind: ProcessKind,
    /// Call-link label for reporting and provenance.
    pub label: String,
    /// The full input bundle.
    pub inputs: JobInputs,
}

impl JobRequest {
    /// Creates a new job request.
    #[must_use]
    pub fn new(kind: ProcessKind, label: impl Into<String>, inputs: JobInputs) -> Self {
        Self {
            kind,
            label: label.into(),
            inputs,
        }
    }
}

/// A terminal job as reported back by the substrate.
#[derive(Debug, Clone)]
pub struct Job {
    /// Substrate-assigned id.
    pub id: JobId,
    /// The process kind.
    pub kind: ProcessKind,
    /// The call-link label used at submission.
    pub label: String,
    /// Terminal status.
    pub status: JobStatus,
    /// Exit status; present when the job finished failed, or when the
    /// substrate reports an explicit zero status on success.
    pub exit: Option<ExitStatus>,
    /// Outputs; populated only on [`JobStatus::FinishedOk`].
    pub outputs: JobOutputs,
    /// Raw scheduler stderr, inspected by recovery handlers.
    pub scheduler_stderr: String,
    /// Remote working storage, if any was allocated.
    pub workdir: Option<RemoteFolder>,
    /// Echo of the inputs the job was submitted with.
    pub inputs: JobInputs,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Termination timestamp.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Returns true if the job finished successfully.
    #[must_use]
    pub fn is_finished_ok(&self) -> bool {
        self.status == JobStatus::FinishedOk
    }

    /// Returns the exit status, substituting an unknown failure when the
    /// substrate reported none.
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        self.exit
            .clone()
            .unwrap_or_else(|| ExitStatus::new(1, "unknown failure"))
    }
}
