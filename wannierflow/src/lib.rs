//! # Wannierflow
//!
//! A workflow engine for maximally-localised Wannier function calculations.
//!
//! Wannierflow drives the full multi-stage pipeline from a crystal structure
//! to localised Wannier functions:
//!
//! - **Protocol-driven inputs**: named accuracy protocols resolved into
//!   complete per-stage parameter trees
//! - **Staged execution**: relax, scf, nscf, projwfc, wannier90 postproc,
//!   pw2wannier90 and the final wannier90 localisation, chained in order
//! - **Run-time derivation**: Fermi-relative window shifts, SCDM mu/sigma
//!   fitting, semicore exclusion and band-count estimation
//! - **Automatic recovery**: out-of-memory and b-vector failures handled by
//!   resubmission with corrected inputs
//! - **Stable exit codes**: every terminal failure maps to a published
//!   numeric code
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wannierflow::prelude::*;
//!
//! let codes = Codes::new("pw@hpc", "pw2wannier90@hpc", "wannier90@hpc")
//!     .with_projwfc("projwfc@hpc");
//! let (inputs, summary) =
//!     WorkflowBuilder::from_protocol(&codes, structure, pseudos, &BuilderOptions::default())?;
//!
//! let outputs = Wannier90Workflow::new(&submitter, &reporter, inputs)
//!     .run()
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod core;
pub mod derive;
pub mod engine;
pub mod errors;
pub mod protocol;
pub mod reporting;
pub mod restart;
pub mod testing;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        Bands, ExitStatus, Job, JobId, JobInputs, JobOutputs, JobRequest, JobStatus, KpointList,
        KpointPath, ParameterBundle, ProcessKind, Projections, Pseudo, PseudoOrbitalTable,
        RemoteFolder, ResourceRequest, Settings, Site, Structure,
    };
    pub use crate::engine::JobSubmitter;
    pub use crate::errors::{
        ConfigError, ConsistencyError, ExitCode, Result, SubstrateError, WannierflowError,
    };
    pub use crate::protocol::{
        BuilderOptions, BuilderSummary, Codes, DisentanglementType, ElectronicType,
        ProjectionType, ProtocolOverrides, ProtocolRegistry, SpinType, WorkflowBuilder,
        WorkflowInputs,
    };
    pub use crate::reporting::{CollectingReporter, LoggingReporter, NoOpReporter, Reporter};
    pub use crate::restart::{RecoveryHandler, RestartOutcome, RestartRunner};
    pub use crate::workflow::{Wannier90Workflow, WorkflowOutputs, WorkflowStage};
}
