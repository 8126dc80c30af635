//! Protocols and protocol-driven input generation.
//!
//! A protocol is a named bundle of numeric defaults (k-point spacing, band
//! headroom, cleanup policy, stage flags). [`WorkflowBuilder`] resolves a
//! protocol plus run-time choices into the full per-stage input tree consumed
//! by the workflow controller.

mod builder;
mod registry;
mod types;

pub use builder::{BuilderOptions, BuilderSummary, Codes, WorkflowBuilder, WorkflowInputs};
pub use registry::{Protocol, ProtocolOverrides, ProtocolRegistry, StageFlags};
pub use types::{
    resolve_disentanglement, DisentanglementType, ElectronicType, ProjectionType, SpinType,
};
