//! Recovery handlers: predicate-guarded fixes for known transient failures.
//!
//! Handlers form a closed enum iterated in registration order; each one
//! matches a specific exit code, inspects the failed job, and either adjusts
//! the working inputs for a resubmission, aborts with a terminal exit code,
//! or declines to handle the failure.

use regex::Regex;
use std::sync::OnceLock;

use crate::core::{Job, JobInputs};
use crate::errors::ExitCode;

/// Exit code of the external codes for an incomplete stdout, most often an
/// out-of-memory kill.
pub const ERROR_OUTPUT_STDOUT_INCOMPLETE: u32 = 311;

/// Exit code of wannier90 for an unsatisfiable b-vector shell search.
pub const ERROR_BVECTORS: u32 = 330;

/// Divisor applied to per-machine process counts on out-of-memory recovery.
const MPI_PROC_REDUCE_FACTOR: u32 = 2;

/// `kmesh_tol` values to try, in order, when the b-vector search fails.
const KMESH_TOL_CANDIDATES: [f64; 3] = [1e-6, 1e-8, 1e-4];

/// Default `kmesh_tol` assumed when the parameter is unset.
const KMESH_TOL_DEFAULT: f64 = 1e-6;

fn oom_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // the pattern is a literal
        Regex::new(r"Detected \d+ oom-kill event\(s\) in step").unwrap()
    })
}

/// Verdict of a handler inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerVerdict {
    /// The handler does not apply; fall through to the next one.
    NotHandled,
    /// The working inputs were adjusted; resubmit.
    Resubmit {
        /// Human-readable description of the corrective action.
        action: String,
    },
    /// The failure is unrecoverable; surface `exit` as terminal.
    Abort {
        /// Terminal exit code to surface.
        exit: ExitCode,
        /// Human-readable description of why recovery stopped.
        action: String,
    },
}

/// A registered recovery handler.
#[derive(Debug, Clone)]
pub enum RecoveryHandler {
    /// Halves MPI parallelism after an out-of-memory kill.
    OutOfMemory,
    /// Retunes `kmesh_tol` after a failed b-vector shell search.
    BvectorKmeshTol {
        /// Tolerances already attempted, including the initial value.
        tried: Vec<f64>,
    },
}

impl RecoveryHandler {
    /// Creates the b-vector handler with an empty retry history.
    #[must_use]
    pub fn bvector() -> Self {
        Self::BvectorKmeshTol { tried: Vec::new() }
    }

    /// Returns true if the handler is registered for this exit code.
    #[must_use]
    pub fn matches(&self, exit_code: u32) -> bool {
        match self {
            Self::OutOfMemory => exit_code == ERROR_OUTPUT_STDOUT_INCOMPLETE,
            Self::BvectorKmeshTol { .. } => exit_code == ERROR_BVECTORS,
        }
    }

    /// Inspects a failed job and decides how to proceed. `inputs` is the
    /// restart runner's working copy for the next attempt; no other job's
    /// inputs are ever touched.
    pub fn inspect(&mut self, job: &Job, inputs: &mut JobInputs) -> HandlerVerdict {
        match self {
            Self::OutOfMemory => handle_out_of_memory(job, inputs),
            Self::BvectorKmeshTol { tried } => handle_bvectors(tried, inputs),
        }
    }
}

/// Out-of-memory recovery: halve `num_mpiprocs_per_machine` (and any `-nk` /
/// `-npools` cmdline value) until the floor of one process is reached.
fn handle_out_of_memory(job: &Job, inputs: &mut JobInputs) -> HandlerVerdict {
    let oom_detected = job
        .scheduler_stderr
        .lines()
        .any(|line| oom_regex().is_match(line) || line.contains("Out Of Memory"));

    if !oom_detected {
        return HandlerVerdict::Abort {
            exit: ExitCode::OutputStdoutIncomplete,
            action: "Unrecoverable incomplete stdout error".to_string(),
        };
    }

    let current = inputs.resources.num_mpiprocs_per_machine.unwrap_or(1);
    if current == 1 {
        return HandlerVerdict::Abort {
            exit: ExitCode::OutputStdoutIncomplete,
            action: "Unrecoverable out-of-memory error after setting num_mpiprocs_per_machine to 1"
                .to_string(),
        };
    }

    let reduced = current / MPI_PROC_REDUCE_FACTOR;
    inputs.resources.num_mpiprocs_per_machine = Some(reduced);
    halve_pool_flags(&mut inputs.settings.cmdline);

    HandlerVerdict::Resubmit {
        action: format!(
            "Out-of-memory error, current num_mpiprocs_per_machine = {current}, \
             new num_mpiprocs_per_machine = {reduced}"
        ),
    }
}

/// Halves the value following a `-nk` or `-npools` flag. A missing or
/// non-numeric following token is left untouched.
fn halve_pool_flags(cmdline: &mut [String]) {
    for flag in ["-nk", "-npools"] {
        let Some(index) = cmdline.iter().position(|token| token == flag) else {
            continue;
        };
        if index + 1 >= cmdline.len() {
            continue;
        }
        if let Ok(pools) = cmdline[index + 1].parse::<u32>() {
            cmdline[index + 1] = (pools / 2).to_string();
        }
    }
}

/// B-vector recovery: walk the candidate `kmesh_tol` values, skipping any
/// already tried, and abort once the candidates are exhausted.
fn handle_bvectors(tried: &mut Vec<f64>, inputs: &mut JobInputs) -> HandlerVerdict {
    let current = inputs
        .parameters
        .get_f64("kmesh_tol")
        .unwrap_or(KMESH_TOL_DEFAULT);
    if !tried.iter().any(|t| (t - current).abs() < f64::EPSILON) {
        tried.push(current);
    }

    let next = KMESH_TOL_CANDIDATES
        .iter()
        .find(|candidate| !tried.iter().any(|t| (*t - **candidate).abs() < f64::EPSILON));

    match next {
        Some(&tolerance) => {
            tried.push(tolerance);
            inputs.parameters.set("kmesh_tol", tolerance);
            HandlerVerdict::Resubmit {
                action: format!("b-vector search failed, retrying with kmesh_tol = {tolerance}"),
            }
        }
        None => HandlerVerdict::Abort {
            exit: ExitCode::Wannier90PpFailed,
            action: format!(
                "b-vector search failed for all kmesh_tol candidates {KMESH_TOL_CANDIDATES:?}"
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        ExitStatus, JobId, JobOutputs, JobStatus, ProcessKind, ResourceRequest,
    };
    use chrono::Utc;

    fn failed_job(stderr: &str) -> Job {
        Job {
            id: JobId(1),
            kind: ProcessKind::PwScf,
            label: "scf".to_string(),
            status: JobStatus::FinishedFailed,
            exit: Some(ExitStatus::new(
                ERROR_OUTPUT_STDOUT_INCOMPLETE,
                "stdout incomplete",
            )),
            outputs: JobOutputs::new(),
            scheduler_stderr: stderr.to_string(),
            workdir: None,
            inputs: JobInputs::default(),
            created_at: Utc::now(),
            finished_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_oom_halves_procs() {
        let job = failed_job("slurmstepd: Detected 3 oom-kill event(s) in step 42.0");
        let mut inputs = JobInputs {
            resources: ResourceRequest::machines(1).with_mpiprocs_per_machine(16),
            ..JobInputs::default()
        };
        let verdict = RecoveryHandler::OutOfMemory.inspect(&job, &mut inputs);
        assert!(matches!(verdict, HandlerVerdict::Resubmit { .. }));
        assert_eq!(inputs.resources.num_mpiprocs_per_machine, Some(8));
    }

    #[test]
    fn test_oom_halving_floors_at_one() {
        let job = failed_job("Out Of Memory");
        for procs in [2_u32, 3, 5] {
            let mut inputs = JobInputs {
                resources: ResourceRequest::machines(1).with_mpiprocs_per_machine(procs),
                ..JobInputs::default()
            };
            let verdict = RecoveryHandler::OutOfMemory.inspect(&job, &mut inputs);
            assert!(matches!(verdict, HandlerVerdict::Resubmit { .. }));
            assert_eq!(inputs.resources.num_mpiprocs_per_machine, Some(procs / 2));
        }
    }

    #[test]
    fn test_oom_at_floor_is_unrecoverable() {
        let job = failed_job("Out Of Memory");
        let mut inputs = JobInputs {
            resources: ResourceRequest::machines(1).with_mpiprocs_per_machine(1),
            ..JobInputs::default()
        };
        let verdict = RecoveryHandler::OutOfMemory.inspect(&job, &mut inputs);
        assert!(matches!(
            verdict,
            HandlerVerdict::Abort {
                exit: ExitCode::OutputStdoutIncomplete,
                ..
            }
        ));
    }

    #[test]
    fn test_oom_unset_procs_defaults_to_one() {
        let job = failed_job("Out Of Memory");
        let mut inputs = JobInputs::default();
        let verdict = RecoveryHandler::OutOfMemory.inspect(&job, &mut inputs);
        assert!(matches!(verdict, HandlerVerdict::Abort { .. }));
    }

    #[test]
    fn test_no_oom_signature_aborts() {
        let job = failed_job("segmentation fault");
        let mut inputs = JobInputs {
            resources: ResourceRequest::machines(1).with_mpiprocs_per_machine(8),
            ..JobInputs::default()
        };
        let verdict = RecoveryHandler::OutOfMemory.inspect(&job, &mut inputs);
        assert!(matches!(verdict, HandlerVerdict::Abort { .. }));
        // Resources untouched when recovery is not attempted.
        assert_eq!(inputs.resources.num_mpiprocs_per_machine, Some(8));
    }

    #[test]
    fn test_cmdline_pools_halved() {
        let job = failed_job("Out Of Memory");
        let mut inputs = JobInputs {
            resources: ResourceRequest::machines(1).with_mpiprocs_per_machine(8),
            ..JobInputs::default()
        };
        inputs.settings.cmdline = vec!["-nk".to_string(), "16".to_string()];
        RecoveryHandler::OutOfMemory.inspect(&job, &mut inputs);
        assert_eq!(inputs.settings.cmdline, vec!["-nk", "8"]);
    }

    #[test]
    fn test_cmdline_non_numeric_left_untouched() {
        let job = failed_job("Out Of Memory");
        let mut inputs = JobInputs {
            resources: ResourceRequest::machines(1).with_mpiprocs_per_machine(8),
            ..JobInputs::default()
        };
        inputs.settings.cmdline =
            vec!["-npools".to_string(), "auto".to_string(), "-nk".to_string()];
        let verdict = RecoveryHandler::OutOfMemory.inspect(&job, &mut inputs);
        // Malformed tokens never fail the handler.
        assert!(matches!(verdict, HandlerVerdict::Resubmit { .. }));
        assert_eq!(inputs.settings.cmdline, vec!["-npools", "auto", "-nk"]);
    }

    #[test]
    fn test_handler_matching() {
        assert!(RecoveryHandler::OutOfMemory.matches(ERROR_OUTPUT_STDOUT_INCOMPLETE));
        assert!(!RecoveryHandler::OutOfMemory.matches(ERROR_BVECTORS));
        assert!(RecoveryHandler::bvector().matches(ERROR_BVECTORS));
        assert!(!RecoveryHandler::bvector().matches(500));
    }

    #[test]
    fn test_bvector_walks_candidates_then_aborts() {
        let job = failed_job("");
        let mut handler = RecoveryHandler::bvector();
        let mut inputs = JobInputs::default();

        // Default 1e-6 counts as tried, first retry uses 1e-8.
        let verdict = handler.inspect(&job, &mut inputs);
        assert!(matches!(verdict, HandlerVerdict::Resubmit { .. }));
        assert_eq!(inputs.parameters.get_f64("kmesh_tol"), Some(1e-8));

        let verdict = handler.inspect(&job, &mut inputs);
        assert!(matches!(verdict, HandlerVerdict::Resubmit { .. }));
        assert_eq!(inputs.parameters.get_f64("kmesh_tol"), Some(1e-4));

        let verdict = handler.inspect(&job, &mut inputs);
        assert!(matches!(
            verdict,
            HandlerVerdict::Abort {
                exit: ExitCode::Wannier90PpFailed,
                ..
            }
        ));
    }

    #[test]
    fn test_bvector_skips_user_supplied_tolerance() {
        let job = failed_job("");
        let mut handler = RecoveryHandler::bvector();
        let mut inputs = JobInputs::default();
        inputs.parameters.set("kmesh_tol", 1e-8);

        let verdict = handler.inspect(&job, &mut inputs);
        assert!(matches!(verdict, HandlerVerdict::Resubmit { .. }));
        assert_eq!(inputs.parameters.get_f64("kmesh_tol"), Some(1e-6));
    }
}
