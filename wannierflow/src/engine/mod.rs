//! The job-execution substrate interface.
//!
//! The workflow never runs computation itself: it hands a [`JobRequest`] to a
//! [`JobSubmitter`] and suspends until the substrate reports a terminal job.
//! Scheduling, queueing and job-level timeouts all live behind this trait.

use async_trait::async_trait;

use crate::core::{Job, JobId, JobRequest};
use crate::errors::SubstrateError;

/// Submits jobs to an external execution substrate.
///
/// `submit` returns only once the job has reached a terminal status; the
/// returned [`Job`] carries outputs on success and an exit status plus the
/// scheduler stderr on failure.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Submits a job and awaits its terminal state.
    async fn submit(&self, request: JobRequest) -> Result<Job, SubstrateError>;

    /// Releases the remote working storage of a finished job.
    async fn clean_workdir(&self, job: JobId) -> Result<(), SubstrateError>;
}
