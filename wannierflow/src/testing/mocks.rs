//! A scripted in-memory execution substrate.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

use crate::core::{
    ExitStatus, Job, JobId, JobOutputs, JobRequest, JobStatus, RemoteFolder,
};
use crate::engine::JobSubmitter;
use crate::errors::SubstrateError;

/// One scripted terminal job, consumed per submission in order.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    ok: bool,
    exit: Option<ExitStatus>,
    outputs: JobOutputs,
    scheduler_stderr: String,
}

impl ScriptedResponse {
    /// A successful job with empty outputs.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            ok: true,
            exit: None,
            outputs: JobOutputs::new(),
            scheduler_stderr: String::new(),
        }
    }

    /// A successful job with the given outputs.
    #[must_use]
    pub fn ok_with(outputs: JobOutputs) -> Self {
        Self {
            ok: true,
            exit: None,
            outputs,
            scheduler_stderr: String::new(),
        }
    }

    /// A failed job with the given exit status.
    #[must_use]
    pub fn failed(code: u32, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            exit: Some(ExitStatus::new(code, message)),
            outputs: JobOutputs::new(),
            scheduler_stderr: String::new(),
        }
    }

    /// Attaches scheduler stderr content.
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.scheduler_stderr = stderr.into();
        self
    }
}

/// A substrate that replays scripted responses and records every request.
///
/// Job ids are assigned monotonically starting at 1; every job receives a
/// remote working folder, and successful jobs expose it as a `remote_folder`
/// output unless the script already provided one.
#[derive(Debug, Default)]
pub struct ScriptedSubmitter {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<JobRequest>>,
    next_id: Mutex<u64>,
    failing_cleanups: Mutex<HashSet<JobId>>,
    cleaned: Mutex<Vec<JobId>>,
}

impl ScriptedSubmitter {
    /// Creates a submitter that replays the given responses in order.
    #[must_use]
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Appends a response to the script.
    pub fn push(&self, response: ScriptedResponse) {
        self.responses.lock().push_back(response);
    }

    /// Returns every request submitted so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<JobRequest> {
        self.requests.lock().clone()
    }

    /// Marks a job's cleanup as failing.
    pub fn fail_cleanup(&self, job: JobId) {
        self.failing_cleanups.lock().insert(job);
    }

    /// Job ids whose workdirs were successfully cleaned.
    #[must_use]
    pub fn cleaned(&self) -> Vec<JobId> {
        self.cleaned.lock().clone()
    }
}

#[async_trait]
impl JobSubmitter for ScriptedSubmitter {
    async fn submit(&self, request: JobRequest) -> Result<Job, SubstrateError> {
        let response = self
            .responses
            .lock()
            .pop_front()
            .ok_or_else(|| SubstrateError::Submission("scripted responses exhausted".into()))?;

        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            JobId(*next)
        };

        let workdir = RemoteFolder::new(format!("/scratch/job-{id}"), id);
        let mut outputs = response.outputs;
        if response.ok && outputs.remote_folder().is_none() {
            outputs.set_remote_folder(workdir.path.clone(), id);
        }

        let job = Job {
            id,
            kind: request.kind,
            label: request.label.clone(),
            status: if response.ok {
                JobStatus::FinishedOk
            } else {
                JobStatus::FinishedFailed
            },
            exit: response.exit,
            outputs: if response.ok { outputs } else { JobOutputs::new() },
            scheduler_stderr: response.scheduler_stderr,
            workdir: Some(workdir),
            inputs: request.inputs.clone(),
            created_at: Utc::now(),
            finished_at: Some(Utc::now()),
        };

        self.requests.lock().push(request);
        Ok(job)
    }

    async fn clean_workdir(&self, job: JobId) -> Result<(), SubstrateError> {
        if self.failing_cleanups.lock().contains(&job) {
            return Err(SubstrateError::Cleanup(job, "permission denied".into()));
        }
        self.cleaned.lock().push(job);
        Ok(())
    }
}
