//! The error-recovery wrapper around a single logical process.
//!
//! [`RestartRunner::run`] submits a job, awaits its terminal status and, on
//! failure, walks an ordered list of [`RecoveryHandler`]s. A matching handler
//! may adjust the working inputs and ask for a resubmission; otherwise the
//! failure is surfaced unchanged. At most one job is in flight per runner at
//! any time.

mod handlers;

pub use handlers::{
    HandlerVerdict, RecoveryHandler, ERROR_BVECTORS, ERROR_OUTPUT_STDOUT_INCOMPLETE,
};

use crate::core::{Job, JobInputs, JobRequest, ProcessKind};
use crate::engine::JobSubmitter;
use crate::errors::{Result, WannierflowError};
use crate::reporting::Reporter;

/// Default bound on resubmissions of one logical process.
pub const DEFAULT_MAX_RESTARTS: usize = 5;

/// Per-process retry bookkeeping, owned by a single `run` call and discarded
/// when it returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryLedger {
    /// Number of submissions, including the first.
    pub iterations: usize,
    /// Number of handler invocations that led to a resubmission.
    pub handler_invocations: usize,
}

/// Successful outcome of a restarted process.
#[derive(Debug, Clone)]
pub struct RestartOutcome {
    /// The job that finished ok.
    pub job: Job,
    /// Every job submitted for this process, in submission order; the last
    /// entry is the successful one.
    pub attempts: Vec<Job>,
    /// Retry bookkeeping.
    pub ledger: RetryLedger,
}

impl RestartOutcome {
    /// The attempt with the numerically largest job id, i.e. the most
    /// recently created job. Its inputs carry every handler correction.
    #[must_use]
    pub fn latest_attempt(&self) -> &Job {
        // attempts is never empty: the successful job is always present
        self.attempts
            .iter()
            .max_by_key(|job| job.id)
            .unwrap_or(&self.job)
    }
}

/// Runs a single logical process with automatic failure recovery.
pub struct RestartRunner<'a> {
    submitter: &'a dyn JobSubmitter,
    reporter: &'a dyn Reporter,
    handlers: Vec<RecoveryHandler>,
    max_restarts: usize,
}

impl<'a> RestartRunner<'a> {
    /// Creates a runner with the given ordered handler list.
    #[must_use]
    pub fn new(
        submitter: &'a dyn JobSubmitter,
        reporter: &'a dyn Reporter,
        handlers: Vec<RecoveryHandler>,
    ) -> Self {
        Self {
            submitter,
            reporter,
            handlers,
            max_restarts: DEFAULT_MAX_RESTARTS,
        }
    }

    /// Sets the resubmission bound.
    #[must_use]
    pub fn with_max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Submits the process, recovering failures until it finishes ok, a
    /// handler aborts, no handler matches, or the restart bound is hit.
    pub async fn run(
        &mut self,
        kind: ProcessKind,
        label: &str,
        inputs: JobInputs,
    ) -> Result<RestartOutcome> {
        let mut working_inputs = inputs;
        let mut attempts: Vec<Job> = Vec::new();
        let mut ledger = RetryLedger::default();

        loop {
            ledger.iterations += 1;
            let request = JobRequest::new(kind, label, working_inputs.clone());
            let job = self.submitter.submit(request).await?;
            self.reporter
                .report(&format!("launched {}<{}>", job.label, job.id));
            attempts.push(job.clone());

            if job.is_finished_ok() {
                return Ok(RestartOutcome {
                    job,
                    attempts,
                    ledger,
                });
            }

            let exit = job.exit_status();
            let verdict = self.consult_handlers(&job, &mut working_inputs);

            match verdict {
                Some(HandlerVerdict::Resubmit { action }) => {
                    self.report_error_handled(&job, &action);
                    ledger.handler_invocations += 1;
                    if ledger.iterations > self.max_restarts {
                        self.reporter.report(&format!(
                            "reached the maximum number of restarts {} for {}<{}>, giving up",
                            self.max_restarts, job.label, job.id
                        ));
                        return Err(WannierflowError::UnrecoverableJob {
                            label: job.label,
                            id: job.id,
                            exit,
                        });
                    }
                }
                Some(HandlerVerdict::Abort {
                    exit: exit_code,
                    action,
                }) => {
                    self.report_error_handled(&job, &action);
                    return Err(WannierflowError::UnrecoverableJob {
                        label: job.label,
                        id: job.id,
                        exit: exit_code.status(),
                    });
                }
                // No handler matched: surface the job's own exit status.
                Some(HandlerVerdict::NotHandled) | None => {
                    return Err(WannierflowError::UnrecoverableJob {
                        label: job.label,
                        id: job.id,
                        exit,
                    });
                }
            }
        }
    }

    /// Walks the handlers in registration order; the first one whose exit
    /// code predicate matches decides the verdict.
    fn consult_handlers(
        &mut self,
        job: &Job,
        working_inputs: &mut JobInputs,
    ) -> Option<HandlerVerdict> {
        let exit_code = job.exit_status().code;
        for handler in &mut self.handlers {
            if !handler.matches(exit_code) {
                continue;
            }
            match handler.inspect(job, working_inputs) {
                HandlerVerdict::NotHandled => continue,
                verdict => return Some(verdict),
            }
        }
        None
    }

    /// The mandatory audit report: names the failed job, its exit status and
    /// message, and the corrective action taken.
    fn report_error_handled(&self, job: &Job, action: &str) {
        let exit = job.exit_status();
        self.reporter.report(&format!(
            "{}<{}> failed with exit status {}: {}",
            job.label, job.id, exit.code, exit.message
        ));
        self.reporter.report(&format!("Action taken: {action}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResourceRequest;
    use crate::errors::ExitCode;
    use crate::reporting::CollectingReporter;
    use crate::testing::{ScriptedResponse, ScriptedSubmitter};

    fn oom_inputs(procs: u32) -> JobInputs {
        JobInputs {
            resources: ResourceRequest::machines(1).with_mpiprocs_per_machine(procs),
            ..JobInputs::default()
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let submitter = ScriptedSubmitter::new(vec![ScriptedResponse::ok()]);
        let reporter = CollectingReporter::new();
        let mut runner =
            RestartRunner::new(&submitter, &reporter, vec![RecoveryHandler::OutOfMemory]);
        let outcome = runner
            .run(ProcessKind::PwScf, "scf", oom_inputs(16))
            .await
            .unwrap();
        assert_eq!(outcome.ledger.iterations, 1);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.job.is_finished_ok());
    }

    #[tokio::test]
    async fn test_oom_recovery_then_success() {
        let submitter = ScriptedSubmitter::new(vec![
            ScriptedResponse::failed(311, "stdout incomplete").with_stderr("Out Of Memory"),
            ScriptedResponse::ok(),
        ]);
        let reporter = CollectingReporter::new();
        let mut runner =
            RestartRunner::new(&submitter, &reporter, vec![RecoveryHandler::OutOfMemory]);
        let outcome = runner
            .run(ProcessKind::PwScf, "scf", oom_inputs(8))
            .await
            .unwrap();

        assert_eq!(outcome.ledger.iterations, 2);
        assert_eq!(outcome.ledger.handler_invocations, 1);
        // The resubmitted request carries the halved process count.
        let requests = submitter.requests();
        assert_eq!(requests[0].inputs.resources.num_mpiprocs_per_machine, Some(8));
        assert_eq!(requests[1].inputs.resources.num_mpiprocs_per_machine, Some(4));
        // Audit report present.
        assert!(reporter.contains("failed with exit status 311"));
        assert!(reporter.contains("Action taken"));
    }

    #[tokio::test]
    async fn test_unmatched_failure_surfaces_unchanged() {
        let submitter =
            ScriptedSubmitter::new(vec![ScriptedResponse::failed(500, "mystery failure")]);
        let reporter = CollectingReporter::new();
        let mut runner =
            RestartRunner::new(&submitter, &reporter, vec![RecoveryHandler::OutOfMemory]);
        let err = runner
            .run(ProcessKind::PwScf, "scf", oom_inputs(8))
            .await
            .unwrap_err();
        match err {
            WannierflowError::UnrecoverableJob { exit, .. } => {
                assert_eq!(exit.code, 500);
                assert_eq!(exit.message, "mystery failure");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_abort_surfaces_handler_exit() {
        // 311 without the OOM signature is classified unrecoverable.
        let submitter = ScriptedSubmitter::new(vec![
            ScriptedResponse::failed(311, "stdout incomplete").with_stderr("disk quota exceeded"),
        ]);
        let reporter = CollectingReporter::new();
        let mut runner =
            RestartRunner::new(&submitter, &reporter, vec![RecoveryHandler::OutOfMemory]);
        let err = runner
            .run(ProcessKind::PwScf, "scf", oom_inputs(8))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(311));
        assert!(reporter.contains("Unrecoverable incomplete stdout error"));
    }

    #[tokio::test]
    async fn test_max_restarts_exhaustion() {
        let responses: Vec<_> = (0..4)
            .map(|_| ScriptedResponse::failed(311, "stdout incomplete").with_stderr("Out Of Memory"))
            .collect();
        let submitter = ScriptedSubmitter::new(responses);
        let reporter = CollectingReporter::new();
        let mut runner =
            RestartRunner::new(&submitter, &reporter, vec![RecoveryHandler::OutOfMemory])
                .with_max_restarts(2);
        let err = runner
            .run(ProcessKind::PwScf, "scf", oom_inputs(64))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(311));
        assert_eq!(submitter.requests().len(), 3);
        assert!(reporter.contains("maximum number of restarts"));
    }

    #[tokio::test]
    async fn test_bvector_retune_then_success() {
        let submitter = ScriptedSubmitter::new(vec![
            ScriptedResponse::failed(ERROR_BVECTORS, "could not satisfy B1"),
            ScriptedResponse::ok(),
        ]);
        let reporter = CollectingReporter::new();
        let mut runner = RestartRunner::new(
            &submitter,
            &reporter,
            vec![RecoveryHandler::OutOfMemory, RecoveryHandler::bvector()],
        );
        let outcome = runner
            .run(ProcessKind::Wannier90Pp, "wannier90_pp", JobInputs::default())
            .await
            .unwrap();
        let latest = outcome.latest_attempt();
        assert_eq!(latest.inputs.parameters.get_f64("kmesh_tol"), Some(1e-8));
        assert!(reporter.contains("kmesh_tol"));
    }

    #[tokio::test]
    async fn test_bvector_exhaustion_aborts_with_stage_code() {
        let responses: Vec<_> = (0..4)
            .map(|_| ScriptedResponse::failed(ERROR_BVECTORS, "could not satisfy B1"))
            .collect();
        let submitter = ScriptedSubmitter::new(responses);
        let reporter = CollectingReporter::new();
        let mut runner =
            RestartRunner::new(&submitter, &reporter, vec![RecoveryHandler::bvector()]);
        let err = runner
            .run(ProcessKind::Wannier90Pp, "wannier90_pp", JobInputs::default())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(ExitCode::Wannier90PpFailed.code()));
    }

    #[tokio::test]
    async fn test_latest_attempt_is_largest_id() {
        let submitter = ScriptedSubmitter::new(vec![
            ScriptedResponse::failed(311, "stdout incomplete").with_stderr("Out Of Memory"),
            ScriptedResponse::ok(),
        ]);
        let reporter = CollectingReporter::new();
        let mut runner =
            RestartRunner::new(&submitter, &reporter, vec![RecoveryHandler::OutOfMemory]);
        let outcome = runner
            .run(ProcessKind::PwScf, "scf", oom_inputs(4))
            .await
            .unwrap();
        assert_eq!(outcome.latest_attempt().id, outcome.job.id);
        assert!(outcome.attempts[0].id < outcome.job.id);
    }
}
