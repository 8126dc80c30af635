//! The workflow controller: runs the stages in order, chains their outputs
//! and derives run-time parameters between them.

use futures::future::join_all;

use crate::core::{Job, JobInputs, JobRequest, ProcessKind};
use crate::derive::{
    energy_of_projectability, fermi_energy, num_electrons, num_projections, update_scdm_mu_sigma,
    ScdmThresholds,
};
use crate::engine::JobSubmitter;
use crate::errors::{ConfigError, ConsistencyError, ExitCode, Result, WannierflowError};
use crate::protocol::WorkflowInputs;
use crate::reporting::Reporter;
use crate::restart::{RecoveryHandler, RestartOutcome, RestartRunner};

use super::context::WorkflowContext;
use super::results::WorkflowOutputs;
use super::stage::WorkflowStage;

/// Window parameters declared relative to the Fermi energy.
const RELATIVE_WINDOW_KEYS: [&str; 4] =
    ["dis_froz_min", "dis_froz_max", "dis_win_min", "dis_win_max"];

/// Orchestrates one Wannierisation workflow from validation to cleanup.
///
/// Stages run strictly in [`WorkflowStage::ORDER`]; disabled stages are
/// skipped. Every stage failure maps to a stable exit code, and remote
/// working directories are cleaned at termination when requested, whatever
/// the outcome.
pub struct Wannier90Workflow<'a> {
    submitter: &'a dyn JobSubmitter,
    reporter: &'a dyn Reporter,
    inputs: WorkflowInputs,
    ctx: WorkflowContext,
}

impl<'a> Wannier90Workflow<'a> {
    /// Creates a workflow over the given substrate and inputs.
    #[must_use]
    pub fn new(
        submitter: &'a dyn JobSubmitter,
        reporter: &'a dyn Reporter,
        inputs: WorkflowInputs,
    ) -> Self {
        let ctx = WorkflowContext::new(inputs.structure.clone());
        Self {
            submitter,
            reporter,
            inputs,
            ctx,
        }
    }

    /// Runs the workflow to completion. Cleanup always runs, also on error.
    pub async fn run(mut self) -> Result<WorkflowOutputs> {
        let result = self.execute().await;
        self.on_terminated().await;
        result
    }

    async fn execute(&mut self) -> Result<WorkflowOutputs> {
        self.validate_inputs()?;
        for stage in WorkflowStage::ORDER {
            if !stage.is_enabled(&self.inputs) {
                continue;
            }
            match stage {
                WorkflowStage::Relax => self.run_relax().await?,
                WorkflowStage::Scf => self.run_scf().await?,
                WorkflowStage::Nscf => self.run_nscf().await?,
                WorkflowStage::Projwfc => self.run_projwfc().await?,
                WorkflowStage::Wannier90Pp => self.run_wannier90_pp().await?,
                WorkflowStage::Pw2wannier90 => self.run_pw2wannier90().await?,
                WorkflowStage::Wannier90 => self.run_wannier90().await?,
            }
        }
        self.results()
    }

    /// Input checks that must fail before any job is submitted.
    fn validate_inputs(&self) -> Result<()> {
        if self.inputs.wannier90.parameters.get_bool("bands_plot")
            && self.inputs.wannier90.kpoint_path.is_none()
        {
            return Err(WannierflowError::stage(
                WorkflowStage::Wannier90.to_string(),
                ExitCode::InvalidInputKpointPath,
            ));
        }
        if self
            .inputs
            .orbital_table
            .validate(&self.inputs.pseudos)
            .is_err()
        {
            return Err(WannierflowError::stage(
                WorkflowStage::Wannier90.to_string(),
                ExitCode::InvalidInputPseudopotential,
            ));
        }
        Ok(())
    }

    async fn run_relax(&mut self) -> Result<()> {
        let mut inputs = match self.inputs.relax.clone() {
            Some(inputs) => inputs,
            None => return Ok(()),
        };
        inputs.structure = Some(self.ctx.current_structure.clone());
        let outcome = self
            .run_restarted(ProcessKind::PwRelax, WorkflowStage::Relax, inputs)
            .await
            .map_err(|err| self.stage_failure(err, WorkflowStage::Relax, ExitCode::RelaxFailed))?;

        if let Some(structure) = outcome.job.outputs.output_structure() {
            self.ctx.current_structure = structure;
        }
        self.ctx.relax = Some(outcome.job);
        Ok(())
    }

    async fn run_scf(&mut self) -> Result<()> {
        let mut inputs = match self.inputs.scf.clone() {
            Some(inputs) => inputs,
            None => return Ok(()),
        };
        inputs.structure = Some(self.ctx.current_structure.clone());
        let outcome = self
            .run_restarted(ProcessKind::PwScf, WorkflowStage::Scf, inputs)
            .await
            .map_err(|err| self.stage_failure(err, WorkflowStage::Scf, ExitCode::ScfFailed))?;

        self.ctx.fermi_energy = fermi_energy(&outcome.job.outputs);
        self.ctx.scf_folder = outcome.job.outputs.remote_folder();
        self.ctx.scf = Some(outcome.job);
        Ok(())
    }

    async fn run_nscf(&mut self) -> Result<()> {
        let mut inputs = match self.inputs.nscf.clone() {
            Some(inputs) => inputs,
            None => return Ok(()),
        };
        inputs.structure = Some(self.ctx.current_structure.clone());
        inputs.parent_folder = self.ctx.scf_folder.clone();
        let outcome = self
            .run_restarted(ProcessKind::PwNscf, WorkflowStage::Nscf, inputs)
            .await
            .map_err(|err| self.stage_failure(err, WorkflowStage::Nscf, ExitCode::NscfFailed))?;

        self.ctx.nscf_folder = outcome.job.outputs.remote_folder();
        self.ctx.nscf = Some(outcome.job);
        Ok(())
    }

    async fn run_projwfc(&mut self) -> Result<()> {
        let mut inputs = match self.inputs.projwfc.clone() {
            Some(inputs) => inputs,
            None => return Ok(()),
        };
        inputs.parent_folder = self.ctx.nscf_folder.clone().or_else(|| self.ctx.scf_folder.clone());
        let job = self
            .submit_once(ProcessKind::Projwfc, WorkflowStage::Projwfc, inputs)
            .await
            .map_err(|err| {
                self.stage_failure(err, WorkflowStage::Projwfc, ExitCode::ProjwfcFailed)
            })?;

        self.ctx.bands = job.outputs.bands();
        self.ctx.projections = job.outputs.projections();
        self.ctx.projwfc = Some(job);
        Ok(())
    }

    async fn run_wannier90_pp(&mut self) -> Result<()> {
        let mut inputs = self.prepare_wannier90_inputs()?;
        inputs.settings.postproc_setup = true;
        self.ctx.prepared_wannier90 = Some(inputs.clone());

        let mut runner = RestartRunner::new(
            self.submitter,
            self.reporter,
            vec![RecoveryHandler::OutOfMemory, RecoveryHandler::bvector()],
        );
        let outcome = runner
            .run(
                ProcessKind::Wannier90Pp,
                &WorkflowStage::Wannier90Pp.to_string(),
                inputs,
            )
            .await;
        let outcome = self.record_outcome(outcome).map_err(|err| {
            self.stage_failure(err, WorkflowStage::Wannier90Pp, ExitCode::Wannier90PpFailed)
        })?;

        self.ctx.nnkp_file = outcome.job.outputs.nnkp_file();
        // The newest attempt carries every handler correction (kmesh_tol
        // retunes in particular); the final run must inherit them.
        self.ctx.corrected_wannier90 = Some(outcome.latest_attempt().inputs.clone());
        self.ctx.wannier90_pp = Some(outcome.job);
        Ok(())
    }

    async fn run_pw2wannier90(&mut self) -> Result<()> {
        let mut inputs = self.inputs.pw2wannier90.clone();
        inputs.parent_folder = self.ctx.nscf_folder.clone().or_else(|| self.ctx.scf_folder.clone());
        inputs.nnkp_file = self.ctx.nnkp_file.clone();

        if inputs.parameters.get_bool("inputpp.scdm_proj") {
            self.fill_scdm_parameters(&mut inputs)?;
        }

        let outcome = self
            .run_restarted(ProcessKind::Pw2wannier90, WorkflowStage::Pw2wannier90, inputs)
            .await
            .map_err(|err| {
                self.stage_failure(err, WorkflowStage::Pw2wannier90, ExitCode::Pw2wannier90Failed)
            })?;

        self.ctx.pw2wannier90_folder = outcome.job.outputs.remote_folder();
        self.ctx.pw2wannier90 = Some(outcome.job);
        Ok(())
    }

    async fn run_wannier90(&mut self) -> Result<()> {
        // Start from the corrected postproc inputs so handler retunes carry
        // over, then drop the setup flag and chain the matrix files in.
        let mut inputs = match self.ctx.corrected_wannier90.clone() {
            Some(inputs) => inputs,
            None => self.prepare_wannier90_inputs()?,
        };
        inputs.settings.postproc_setup = false;
        inputs.remote_input_folder = self.ctx.pw2wannier90_folder.clone();

        let job = self
            .submit_once(ProcessKind::Wannier90, WorkflowStage::Wannier90, inputs)
            .await
            .map_err(|err| {
                self.stage_failure(err, WorkflowStage::Wannier90, ExitCode::Wannier90Failed)
            })?;

        self.ctx.wannier90 = Some(job);
        Ok(())
    }

    /// Applies run-time derivations to the declared wannier90 inputs:
    /// Fermi-relative window shifts, the automatic frozen-window ceiling and
    /// its band-energy cap.
    fn prepare_wannier90_inputs(&self) -> Result<JobInputs> {
        let mut inputs = self.inputs.wannier90.clone();
        let parameters = &mut inputs.parameters;

        if self.inputs.relative_dis_windows {
            if self.inputs.scf.is_none() && self.ctx.scf.is_none() {
                return Err(ConfigError::RelativeWindowsWithoutScf.into());
            }
            let fermi = self.ctx.fermi_energy.ok_or_else(|| {
                WannierflowError::stage(
                    WorkflowStage::Wannier90.to_string(),
                    ExitCode::InvalidInputRelativeDisWindows,
                )
            })?;
            for key in RELATIVE_WINDOW_KEYS {
                if let Some(value) = parameters.get_f64(key) {
                    parameters.set(key, value + fermi);
                }
            }
        }

        if self.inputs.auto_froz_max {
            let (bands, projections) = match (&self.ctx.bands, &self.ctx.projections) {
                (Some(bands), Some(projections)) => (bands, projections),
                _ => return Err(ConfigError::ProjwfcRequiredForScdm.into()),
            };
            let ceiling = energy_of_projectability(
                bands,
                projections,
                self.inputs.auto_froz_max_threshold,
            )?;
            parameters.set("dis_froz_max", ceiling);
        }

        // A frozen window reaching above the highest fully available band
        // cannot be satisfied; cap it at the band minimum, never raise it.
        if let (Some(froz_max), Some(bands)) =
            (parameters.get_f64("dis_froz_max"), &self.ctx.bands)
        {
            let num_wann = parameters.get_u64("num_wann").unwrap_or(0) as usize;
            if let Some(cap) = bands.min_energy_of_band(num_wann) {
                if cap < froz_max {
                    parameters.set("dis_froz_max", cap);
                    self.reporter.report(&format!(
                        "dis_froz_max lowered from {froz_max} to {cap} to stay within the computed bands"
                    ));
                }
            }
        }

        Ok(inputs)
    }

    /// Fills `scdm_mu`/`scdm_sigma` according to the entanglement mode.
    fn fill_scdm_parameters(&self, inputs: &mut JobInputs) -> Result<()> {
        let entanglement = inputs
            .parameters
            .get("inputpp.scdm_entanglement")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("erfc")
            .to_string();
        let have_mu = inputs.parameters.contains("inputpp.scdm_mu");
        let have_sigma = inputs.parameters.contains("inputpp.scdm_sigma");

        match entanglement.as_str() {
            "isolated" => Ok(()),
            "gaussian" => {
                if have_mu && have_sigma {
                    Ok(())
                } else {
                    Err(ConfigError::GaussianMissingMuSigma.into())
                }
            }
            _ => {
                if have_mu && have_sigma {
                    return Ok(());
                }
                let (bands, projections) = match (&self.ctx.bands, &self.ctx.projections) {
                    (Some(bands), Some(projections)) => (bands, projections),
                    _ => return Err(ConfigError::ProjwfcRequiredForScdm.into()),
                };
                update_scdm_mu_sigma(
                    &mut inputs.parameters,
                    bands,
                    projections,
                    &ScdmThresholds::default(),
                )?;
                Ok(())
            }
        }
    }

    /// Submits a stage exactly once, with no recovery handlers.
    async fn submit_once(
        &mut self,
        kind: ProcessKind,
        stage: WorkflowStage,
        inputs: JobInputs,
    ) -> Result<Job> {
        let request = JobRequest::new(kind, stage.to_string(), inputs);
        let job = self.submitter.submit(request).await?;
        self.reporter
            .report(&format!("launched {}<{}>", job.label, job.id));
        self.ctx.record_attempts(std::slice::from_ref(&job));

        if job.is_finished_ok() {
            return Ok(job);
        }
        let exit = job.exit_status();
        self.reporter.report(&format!(
            "{}<{}> failed with exit status {}: {}",
            job.label, job.id, exit.code, exit.message
        ));
        Err(WannierflowError::UnrecoverableJob {
            label: job.label,
            id: job.id,
            exit,
        })
    }

    /// Runs a stage under the OOM recovery handler and records its attempts.
    async fn run_restarted(
        &mut self,
        kind: ProcessKind,
        stage: WorkflowStage,
        inputs: JobInputs,
    ) -> Result<RestartOutcome> {
        let mut runner = RestartRunner::new(
            self.submitter,
            self.reporter,
            vec![RecoveryHandler::OutOfMemory],
        );
        let outcome = runner.run(kind, &stage.to_string(), inputs).await;
        self.record_outcome(outcome)
    }

    fn record_outcome(&mut self, outcome: Result<RestartOutcome>) -> Result<RestartOutcome> {
        if let Ok(outcome) = &outcome {
            self.ctx.record_attempts(&outcome.attempts);
        }
        outcome
    }

    /// Maps an unrecoverable job failure to the stage's stable exit code;
    /// anything else passes through unchanged.
    fn stage_failure(
        &self,
        err: WannierflowError,
        stage: WorkflowStage,
        exit: ExitCode,
    ) -> WannierflowError {
        match err {
            WannierflowError::UnrecoverableJob { label, id, .. } => {
                self.reporter
                    .report(&format!("{label}<{id}> failed, aborting: {exit}"));
                WannierflowError::stage(stage.to_string(), exit)
            }
            other => other,
        }
    }

    /// Collects per-stage outputs and runs the post-hoc consistency checks.
    fn results(&self) -> Result<WorkflowOutputs> {
        self.check_consistency()?;

        let wannier90 = self.ctx.wannier90.as_ref().ok_or_else(|| {
            WannierflowError::MissingOutput {
                stage: WorkflowStage::Wannier90.to_string(),
                key: "output_parameters".to_string(),
            }
        })?;

        Ok(WorkflowOutputs {
            relax: self.ctx.relax.as_ref().map(|job| job.outputs.clone()),
            scf: self.ctx.scf.as_ref().map(|job| job.outputs.clone()),
            nscf: self.ctx.nscf.as_ref().map(|job| job.outputs.clone()),
            projwfc: self.ctx.projwfc.as_ref().map(|job| job.outputs.clone()),
            wannier90_pp: self.ctx.wannier90_pp.as_ref().map(|job| job.outputs.clone()),
            pw2wannier90: self.ctx.pw2wannier90.as_ref().map(|job| job.outputs.clone()),
            wannier90: wannier90.outputs.clone(),
            fermi_energy: self.ctx.fermi_energy,
        })
    }

    /// Cross-checks derived counts against what the codes actually reported.
    fn check_consistency(&self) -> Result<()> {
        if let Some(projections) = &self.ctx.projections {
            let computed = num_projections(&self.ctx.current_structure, &self.inputs.orbital_table)?;
            if computed != projections.num_orbitals {
                return Err(ConsistencyError::ProjectionCount {
                    computed,
                    reported: projections.num_orbitals,
                }
                .into());
            }
        }
        if let Some(scf) = &self.ctx.scf {
            if let Some(reported) = scf.outputs.output_parameter_f64("number_of_electrons") {
                let computed =
                    num_electrons(&self.ctx.current_structure, &self.inputs.pseudos)?;
                if (computed - reported).abs() > 1e-6 {
                    return Err(ConsistencyError::ElectronCount { computed, reported }.into());
                }
            }
        }
        Ok(())
    }

    /// Terminal cleanup: releases remote working directories when requested.
    /// Cleanup failures are reported and swallowed, never fatal.
    async fn on_terminated(&self) {
        if !self.inputs.clean_workdir {
            self.reporter
                .report("remote folders will not be cleaned");
            return;
        }
        let targets: Vec<_> = self
            .ctx
            .launched
            .iter()
            .filter(|job| job.workdir.is_some())
            .map(|job| job.id)
            .collect();
        let results = join_all(
            targets
                .iter()
                .map(|&id| async move { (id, self.submitter.clean_workdir(id).await) }),
        )
        .await;

        let mut cleaned = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => cleaned.push(id.to_string()),
                Err(err) => self
                    .reporter
                    .report(&format!("cleanup of job {id} failed: {err}")),
            }
        }
        if !cleaned.is_empty() {
            self.reporter.report(&format!(
                "cleaned remote folders of calculations: {}",
                cleaned.join(" ")
            ));
        }
    }
}
