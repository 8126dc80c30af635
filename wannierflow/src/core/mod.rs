//! Core data model: jobs, parameter bundles, structures, pseudopotentials,
//! bands and k-point meshes.

mod bands;
mod job;
mod kmesh;
mod outputs;
mod params;
mod pseudo;
mod structure;

pub use bands::{Bands, Projections};
pub use job::{
    ExitStatus, Job, JobId, JobRequest, JobStatus, ProcessKind, RemoteFolder, ResourceRequest,
};
pub use kmesh::{explicit_kpoints, mesh_from_distance, KpointList, KpointPath};
pub use outputs::JobOutputs;
pub use params::{JobInputs, ParameterBundle, Settings};
pub use pseudo::{md5_hex, orbital_multiplicity, Pseudo, PseudoOrbitalEntry, PseudoOrbitalTable};
pub use structure::{Site, Structure};
