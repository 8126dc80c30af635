//! End-to-end workflow tests over the scripted substrate.

use serde_json::json;

use crate::core::{Bands, JobId, JobOutputs, Projections, ResourceRequest};
use crate::errors::WannierflowError;
use crate::protocol::{
    BuilderOptions, Codes, DisentanglementType, ProjectionType, WorkflowBuilder, WorkflowInputs,
};
use crate::reporting::CollectingReporter;
use crate::testing::{
    nscf_outputs, projwfc_outputs, scf_outputs, silicon_pseudos, silicon_structure,
    wannier90_outputs, wannier90_pp_outputs, ScriptedResponse, ScriptedSubmitter,
};
use crate::workflow::Wannier90Workflow;

fn codes() -> Codes {
    Codes::new("pw@hpc", "pw2wannier90@hpc", "wannier90@hpc").with_projwfc("projwfc@hpc")
}

fn silicon_inputs(options: &BuilderOptions) -> WorkflowInputs {
    let (inputs, _) =
        WorkflowBuilder::from_protocol(&codes(), silicon_structure(), silicon_pseudos(), options)
            .unwrap();
    inputs
}

fn quiet_options() -> BuilderOptions {
    BuilderOptions {
        print_summary: false,
        ..BuilderOptions::default()
    }
}

/// Band/projectability data shaped like a metal: full projectability in the
/// valence region decaying towards the conduction bands. Eight orbitals to
/// match the silicon projection count.
fn silicon_projwfc_data() -> (Bands, Projections) {
    let energies: Vec<f64> = (0..20).map(|i| -6.0 + f64::from(i)).collect();
    let projectability: Vec<f64> = energies
        .iter()
        .map(|&e| 0.5 * libm::erfc((e - 5.0) / 2.0))
        .collect();
    (
        Bands::new(vec![energies]),
        Projections::new(vec![projectability], 8),
    )
}

fn scdm_happy_path_responses() -> Vec<ScriptedResponse> {
    let (bands, projections) = silicon_projwfc_data();
    vec![
        ScriptedResponse::ok_with(scf_outputs(6.0, 8.0)),
        ScriptedResponse::ok_with(nscf_outputs(12)),
        ScriptedResponse::ok_with(projwfc_outputs(&bands, &projections)),
        ScriptedResponse::ok_with(wannier90_pp_outputs()),
        ScriptedResponse::ok(),
        ScriptedResponse::ok_with(wannier90_outputs()),
    ]
}

#[tokio::test]
async fn test_scdm_metal_end_to_end() {
    let submitter = ScriptedSubmitter::new(scdm_happy_path_responses());
    let reporter = CollectingReporter::new();
    let inputs = silicon_inputs(&quiet_options());

    let outputs = Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap();

    assert_eq!(outputs.fermi_energy, Some(6.0));
    assert!(outputs.scf.is_some());
    assert!(outputs.projwfc.is_some());
    assert!(outputs.wannier90.output_parameter_f64("Omega_total").is_some());

    let requests = submitter.requests();
    assert_eq!(requests.len(), 6);
    assert_eq!(requests[0].label, "scf");
    assert_eq!(requests[5].label, "wannier90");

    // SCDM mu/sigma fitted from the projwfc data before matrix generation.
    let pw2wan = &requests[4].inputs;
    assert!(pw2wan.parameters.contains("inputpp.scdm_mu"));
    assert!(pw2wan.parameters.contains("inputpp.scdm_sigma"));
    assert!(pw2wan.nnkp_file.is_some());
    assert!(pw2wan.parent_folder.is_some());

    // Postproc setup runs with the flag, the final localisation without.
    assert!(requests[3].inputs.settings.postproc_setup);
    assert!(!requests[5].inputs.settings.postproc_setup);
    assert!(requests[5].inputs.remote_input_folder.is_some());

    // SCDM + metal resolves to no disentanglement.
    assert_eq!(requests[5].inputs.parameters.get_u64("dis_num_iter"), Some(0));
    assert_eq!(requests[5].inputs.parameters.get_u64("num_wann"), Some(8));
}

#[tokio::test]
async fn test_fermi_in_rydberg_aborts_with_402() {
    let (bands, projections) = silicon_projwfc_data();
    let mut scf = JobOutputs::new();
    scf.insert(
        "output_parameters",
        json!({
            "fermi_energy": 0.44,
            "fermi_energy_units": "Ry",
            "number_of_electrons": 8.0,
        }),
    );
    let submitter = ScriptedSubmitter::new(vec![
        ScriptedResponse::ok_with(scf),
        ScriptedResponse::ok_with(nscf_outputs(12)),
        ScriptedResponse::ok_with(projwfc_outputs(&bands, &projections)),
    ]);
    let reporter = CollectingReporter::new();
    let inputs = silicon_inputs(&quiet_options());

    let err = Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(402));
    // Aborted before the postproc setup was submitted.
    assert_eq!(submitter.requests().len(), 3);
}

#[tokio::test]
async fn test_bands_plot_without_kpoint_path_submits_nothing() {
    let submitter = ScriptedSubmitter::new(vec![]);
    let reporter = CollectingReporter::new();
    let mut inputs = silicon_inputs(&quiet_options());
    inputs.wannier90.parameters.set("bands_plot", true);

    let err = Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(401));
    assert!(submitter.requests().is_empty());
}

#[tokio::test]
async fn test_oom_recovery_during_scf() {
    let mut responses = scdm_happy_path_responses();
    responses.insert(
        0,
        ScriptedResponse::failed(311, "stdout incomplete").with_stderr("Out Of Memory"),
    );
    let submitter = ScriptedSubmitter::new(responses);
    let reporter = CollectingReporter::new();
    let mut inputs = silicon_inputs(&quiet_options());
    if let Some(scf) = inputs.scf.as_mut() {
        scf.resources = ResourceRequest::machines(1).with_mpiprocs_per_machine(16);
    }

    let outputs = Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap();

    assert!(outputs.wannier90.output_parameter_f64("Omega_total").is_some());
    // One extra submission for the recovered scf attempt.
    let requests = submitter.requests();
    assert_eq!(requests.len(), 7);
    assert_eq!(requests[1].inputs.resources.num_mpiprocs_per_machine, Some(8));
    assert!(reporter.contains("failed with exit status 311"));
    assert!(reporter.contains("Action taken"));
}

#[tokio::test]
async fn test_kmesh_tol_correction_inherited_by_final_run() {
    let (bands, projections) = silicon_projwfc_data();
    let submitter = ScriptedSubmitter::new(vec![
        ScriptedResponse::ok_with(scf_outputs(6.0, 8.0)),
        ScriptedResponse::ok_with(nscf_outputs(12)),
        ScriptedResponse::ok_with(projwfc_outputs(&bands, &projections)),
        ScriptedResponse::failed(330, "could not satisfy B1"),
        ScriptedResponse::ok_with(wannier90_pp_outputs()),
        ScriptedResponse::ok(),
        ScriptedResponse::ok_with(wannier90_outputs()),
    ]);
    let reporter = CollectingReporter::new();
    let inputs = silicon_inputs(&quiet_options());

    Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap();

    let requests = submitter.requests();
    assert_eq!(requests.len(), 7);
    // The retuned tolerance appears in the resubmitted setup run and is
    // carried into the final localisation.
    assert_eq!(requests[4].inputs.parameters.get_f64("kmesh_tol"), Some(1e-8));
    assert_eq!(requests[6].inputs.parameters.get_f64("kmesh_tol"), Some(1e-8));
    assert!(!requests[6].inputs.settings.postproc_setup);
}

#[tokio::test]
async fn test_window_shift_by_fermi_energy() {
    // Hydrogen projections on a metal use a fixed frozen window declared
    // relative to the Fermi energy.
    let mut options = quiet_options();
    options.projection_type = ProjectionType::Hydrogen;
    let inputs = silicon_inputs(&options);
    assert!(inputs.projwfc.is_none());

    let submitter = ScriptedSubmitter::new(vec![
        ScriptedResponse::ok_with(scf_outputs(6.25, 8.0)),
        ScriptedResponse::ok_with(nscf_outputs(12)),
        ScriptedResponse::ok_with(wannier90_pp_outputs()),
        ScriptedResponse::ok(),
        ScriptedResponse::ok_with(wannier90_outputs()),
    ]);
    let reporter = CollectingReporter::new();

    Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap();

    let requests = submitter.requests();
    assert_eq!(requests.len(), 5);
    // dis_froz_max declared as +2.0 relative, shifted to 6.25 + 2.0.
    let shifted = requests[2].inputs.parameters.get_f64("dis_froz_max").unwrap();
    assert!((shifted - 8.25).abs() < 1e-12);
}

#[tokio::test]
async fn test_auto_froz_max_ceiling_capped_by_band_energy() {
    let mut options = quiet_options();
    options.projection_type = ProjectionType::Hydrogen;
    options.disentanglement_type = DisentanglementType::WindowAuto;
    let inputs = silicon_inputs(&options);
    assert!(inputs.auto_froz_max);

    // Projectability drops below 0.9 at 4.0 eV, but the eighth band tops out
    // at 3.0 eV, so the ceiling is capped there.
    let bands = Bands::new(vec![vec![-4.0, -3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0]]);
    let projections = Projections::new(
        vec![vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.95, 0.5, 0.2]],
        8,
    );
    let submitter = ScriptedSubmitter::new(vec![
        ScriptedResponse::ok_with(scf_outputs(1.0, 8.0)),
        ScriptedResponse::ok_with(nscf_outputs(12)),
        ScriptedResponse::ok_with(projwfc_outputs(&bands, &projections)),
        ScriptedResponse::ok_with(wannier90_pp_outputs()),
        ScriptedResponse::ok(),
        ScriptedResponse::ok_with(wannier90_outputs()),
    ]);
    let reporter = CollectingReporter::new();

    Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap();

    let requests = submitter.requests();
    let froz_max = requests[3].inputs.parameters.get_f64("dis_froz_max").unwrap();
    assert!((froz_max - 3.0).abs() < 1e-12);
    assert!(reporter.contains("dis_froz_max lowered"));
}

#[tokio::test]
async fn test_cleanup_failures_are_swallowed() {
    let submitter = ScriptedSubmitter::new(scdm_happy_path_responses());
    submitter.fail_cleanup(JobId(1));
    let reporter = CollectingReporter::new();
    let mut inputs = silicon_inputs(&quiet_options());
    inputs.clean_workdir = true;

    let outputs = Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap();

    assert!(outputs.wannier90.output_parameter_f64("Omega_total").is_some());
    let cleaned = submitter.cleaned();
    assert!(!cleaned.contains(&JobId(1)));
    assert_eq!(cleaned.len(), 5);
    assert!(reporter.contains("cleanup of job 1 failed"));
    assert!(reporter.contains("cleaned remote folders of calculations"));
}

#[tokio::test]
async fn test_no_cleanup_when_disabled() {
    let submitter = ScriptedSubmitter::new(scdm_happy_path_responses());
    let reporter = CollectingReporter::new();
    let inputs = silicon_inputs(&quiet_options());
    assert!(!inputs.clean_workdir);

    Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap();

    assert!(submitter.cleaned().is_empty());
    assert!(reporter.contains("remote folders will not be cleaned"));
}

#[tokio::test]
async fn test_electron_count_mismatch_is_fatal() {
    let (bands, projections) = silicon_projwfc_data();
    let submitter = ScriptedSubmitter::new(vec![
        // Reported electron count disagrees with the pseudo valences.
        ScriptedResponse::ok_with(scf_outputs(6.0, 9.0)),
        ScriptedResponse::ok_with(nscf_outputs(12)),
        ScriptedResponse::ok_with(projwfc_outputs(&bands, &projections)),
        ScriptedResponse::ok_with(wannier90_pp_outputs()),
        ScriptedResponse::ok(),
        ScriptedResponse::ok_with(wannier90_outputs()),
    ]);
    let reporter = CollectingReporter::new();
    let inputs = silicon_inputs(&quiet_options());

    let err = Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, WannierflowError::Consistency(_)));
}

#[tokio::test]
async fn test_projection_count_mismatch_is_fatal() {
    let (bands, mut projections) = silicon_projwfc_data();
    projections.num_orbitals = 9;
    let submitter = ScriptedSubmitter::new(vec![
        ScriptedResponse::ok_with(scf_outputs(6.0, 8.0)),
        ScriptedResponse::ok_with(nscf_outputs(12)),
        ScriptedResponse::ok_with(projwfc_outputs(&bands, &projections)),
        ScriptedResponse::ok_with(wannier90_pp_outputs()),
        ScriptedResponse::ok(),
        ScriptedResponse::ok_with(wannier90_outputs()),
    ]);
    let reporter = CollectingReporter::new();
    let inputs = silicon_inputs(&quiet_options());

    let err = Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap_err();

    match err {
        WannierflowError::Consistency(inner) => {
            assert_eq!(inner.to_string(), "number of projections 8 != projwfc output 9");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_stage_failure_maps_to_stable_exit_code() {
    let submitter = ScriptedSubmitter::new(vec![
        ScriptedResponse::failed(312, "convergence not achieved"),
    ]);
    let reporter = CollectingReporter::new();
    let inputs = silicon_inputs(&quiet_options());

    let err = Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap_err();

    // An unrecoverable scf failure surfaces as the scf stage exit code.
    assert_eq!(err.exit_code(), Some(420));
}

#[tokio::test]
async fn test_checksum_mismatch_maps_to_403() {
    let submitter = ScriptedSubmitter::new(vec![]);
    let reporter = CollectingReporter::new();
    let mut inputs = silicon_inputs(&quiet_options());
    let mut tampered = silicon_pseudos();
    if let Some(pseudo) = tampered.get_mut("Si") {
        pseudo.md5 = "00000000000000000000000000000000".to_string();
    }
    inputs.pseudos = tampered;

    let err = Wannier90Workflow::new(&submitter, &reporter, inputs)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(403));
    assert!(submitter.requests().is_empty());
}
