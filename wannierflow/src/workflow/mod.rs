//! The Wannierisation workflow: stage ordering, run-time state and the
//! controller that drives jobs through the execution substrate.

mod context;
mod controller;
mod results;
mod stage;

#[cfg(test)]
mod integration_tests;

pub use context::WorkflowContext;
pub use controller::Wannier90Workflow;
pub use results::WorkflowOutputs;
pub use stage::WorkflowStage;
