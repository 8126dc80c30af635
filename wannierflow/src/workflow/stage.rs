//! The fixed stage order of the workflow.

use std::fmt;

use crate::protocol::WorkflowInputs;

/// One stage of the workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStage {
    /// Variable-cell relaxation.
    Relax,
    /// Self-consistent ground state.
    Scf,
    /// Non-self-consistent solve on the Wannier k-point grid.
    Nscf,
    /// Projectability analysis.
    Projwfc,
    /// Wannier90 postproc setup (nnkp generation).
    Wannier90Pp,
    /// Overlap and projection matrix generation.
    Pw2wannier90,
    /// Final Wannier function localisation.
    Wannier90,
}

impl WorkflowStage {
    /// Every stage, in execution order.
    pub const ORDER: [Self; 7] = [
        Self::Relax,
        Self::Scf,
        Self::Nscf,
        Self::Projwfc,
        Self::Wannier90Pp,
        Self::Pw2wannier90,
        Self::Wannier90,
    ];

    /// Returns true if the inputs enable this stage. The last three stages
    /// always run.
    #[must_use]
    pub fn is_enabled(self, inputs: &WorkflowInputs) -> bool {
        match self {
            Self::Relax => inputs.relax.is_some(),
            Self::Scf => inputs.scf.is_some(),
            Self::Nscf => inputs.nscf.is_some(),
            Self::Projwfc => inputs.projwfc.is_some(),
            Self::Wannier90Pp | Self::Pw2wannier90 | Self::Wannier90 => true,
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relax => write!(f, "relax"),
            Self::Scf => write!(f, "scf"),
            Self::Nscf => write!(f, "nscf"),
            Self::Projwfc => write!(f, "projwfc"),
            Self::Wannier90Pp => write!(f, "wannier90_pp"),
            Self::Pw2wannier90 => write!(f, "pw2wannier90"),
            Self::Wannier90 => write!(f, "wannier90"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(WorkflowStage::ORDER.first(), Some(&WorkflowStage::Relax));
        assert_eq!(WorkflowStage::ORDER.last(), Some(&WorkflowStage::Wannier90));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(WorkflowStage::Wannier90Pp.to_string(), "wannier90_pp");
        assert_eq!(WorkflowStage::Pw2wannier90.to_string(), "pw2wannier90");
    }
}
