//! Protocol-driven input generation.
//!
//! [`WorkflowBuilder::from_protocol`] resolves a named protocol plus run-time
//! choices into the full per-stage parameter tree: plane-wave bundles for
//! relax/scf/nscf, the projwfc and pw2wannier90 namelists, and the wannier90
//! parameter set with semicore exclusion, projection blocks and
//! disentanglement knobs already applied.

use serde_json::json;
use std::collections::HashMap;
use std::fmt;

use crate::core::{
    explicit_kpoints, mesh_from_distance, JobInputs, ParameterBundle, Pseudo, PseudoOrbitalTable,
    Structure,
};
use crate::derive::{num_projections, required_band_count, semicore_band_indices, DeriveError};
use crate::errors::ConfigError;

use super::registry::{ProtocolOverrides, ProtocolRegistry};
use super::types::{
    resolve_disentanglement, DisentanglementType, ElectronicType, ProjectionType, SpinType,
};

/// Configured external codes. `projwfc` is required only when the projwfc
/// stage ends up enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codes {
    /// Identifier of the pw.x code.
    pub pw: String,
    /// Identifier of the pw2wannier90.x code.
    pub pw2wannier90: String,
    /// Identifier of the wannier90.x code.
    pub wannier90: String,
    /// Identifier of the projwfc.x code, if configured.
    pub projwfc: Option<String>,
}

impl Codes {
    /// Creates the required code bundle.
    #[must_use]
    pub fn new(
        pw: impl Into<String>,
        pw2wannier90: impl Into<String>,
        wannier90: impl Into<String>,
    ) -> Self {
        Self {
            pw: pw.into(),
            pw2wannier90: pw2wannier90.into(),
            wannier90: wannier90.into(),
            projwfc: None,
        }
    }

    /// Adds a projwfc code.
    #[must_use]
    pub fn with_projwfc(mut self, projwfc: impl Into<String>) -> Self {
        self.projwfc = Some(projwfc.into());
        self
    }
}

/// Run-time choices for the builder.
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Protocol name; `None` uses the registry default.
    pub protocol: Option<String>,
    /// Overrides applied on top of the named protocol.
    pub overrides: ProtocolOverrides,
    /// Initial projection scheme.
    pub projection_type: ProjectionType,
    /// Disentanglement scheme, resolved when [`DisentanglementType::Auto`].
    pub disentanglement_type: DisentanglementType,
    /// Electronic character of the system.
    pub electronic_type: ElectronicType,
    /// Spin polarization treatment.
    pub spin_type: SpinType,
    /// Per-kind initial magnetic moments; only valid with collinear spin.
    pub initial_magnetic_moments: Option<HashMap<String, f64>>,
    /// Maximally localise the Wannier functions.
    pub maximal_localisation: bool,
    /// Exclude semicore states from Wannierisation.
    pub exclude_semicores: bool,
    /// Plot Wannier functions as xsf files.
    pub plot_wannier_functions: bool,
    /// Retrieve the Wannier Hamiltonian files.
    pub retrieve_hamiltonian: bool,
    /// Retrieve the chk/eig/amn/mmn/spn matrices.
    pub retrieve_matrices: bool,
    /// Log a summary of the key input parameters.
    pub print_summary: bool,
    /// Orbital metadata table; `None` loads the bundled SSSP table.
    pub orbital_table: Option<PseudoOrbitalTable>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            protocol: None,
            overrides: ProtocolOverrides::default(),
            projection_type: ProjectionType::Scdm,
            disentanglement_type: DisentanglementType::Auto,
            electronic_type: ElectronicType::Metal,
            spin_type: SpinType::NonPolarized,
            initial_magnetic_moments: None,
            maximal_localisation: true,
            exclude_semicores: true,
            plot_wannier_functions: false,
            retrieve_hamiltonian: false,
            retrieve_matrices: false,
            print_summary: true,
            orbital_table: None,
        }
    }
}

/// The fully parameterized input set for every stage of one workflow.
#[derive(Debug, Clone)]
pub struct WorkflowInputs {
    /// The input structure.
    pub structure: Structure,
    /// Pseudopotentials keyed by element.
    pub pseudos: HashMap<String, Pseudo>,
    /// Orbital metadata table validated against the pseudos.
    pub orbital_table: PseudoOrbitalTable,
    /// Clean remote working directories at termination.
    pub clean_workdir: bool,
    /// Shift disentanglement windows by the scf Fermi energy.
    pub relative_dis_windows: bool,
    /// Derive the frozen-window ceiling from projectability at run time.
    pub auto_froz_max: bool,
    /// Projectability threshold for the automatic ceiling.
    pub auto_froz_max_threshold: f64,
    /// Relax stage inputs; the stage is skipped when absent.
    pub relax: Option<JobInputs>,
    /// Scf stage inputs; the stage is skipped when absent.
    pub scf: Option<JobInputs>,
    /// Nscf stage inputs; the stage is skipped when absent.
    pub nscf: Option<JobInputs>,
    /// Projwfc stage inputs; the stage is skipped when absent.
    pub projwfc: Option<JobInputs>,
    /// Pw2wannier90 stage inputs.
    pub pw2wannier90: JobInputs,
    /// Wannier90 stage inputs, shared by the postproc and final runs.
    pub wannier90: JobInputs,
}

/// Key input parameters, rendered human-readable on request.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderSummary {
    /// Chemical formula.
    pub formula: String,
    /// Electronic character.
    pub electronic_type: ElectronicType,
    /// Spin treatment.
    pub spin_type: SpinType,
    /// Projection scheme.
    pub projection_type: ProjectionType,
    /// Resolved disentanglement scheme.
    pub disentanglement_type: DisentanglementType,
    /// Bands carried through Wannierisation.
    pub num_bands: u32,
    /// Target Wannier function count.
    pub num_wann: u32,
    /// Excluded semicore band indices.
    pub exclude_bands: Vec<usize>,
    /// Monkhorst-Pack grid shared by nscf and wannier90.
    pub mp_grid: [u32; 3],
}

impl fmt::Display for BuilderSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary of key input parameters:")?;
        writeln!(f, "  Formula: {}", self.formula)?;
        writeln!(f, "  ElectronicType: {}", self.electronic_type)?;
        writeln!(f, "  SpinType: {}", self.spin_type)?;
        writeln!(f, "  WannierProjectionType: {}", self.projection_type)?;
        writeln!(
            f,
            "  WannierDisentanglementType: {}",
            self.disentanglement_type
        )?;
        writeln!(f, "  num_bands: {}", self.num_bands)?;
        writeln!(f, "  num_wann: {}", self.num_wann)?;
        writeln!(f, "  exclude_bands: {:?}", self.exclude_bands)?;
        write!(
            f,
            "  mp_grid: {} {} {}",
            self.mp_grid[0], self.mp_grid[1], self.mp_grid[2]
        )
    }
}

/// Resolves protocols and run-time choices into [`WorkflowInputs`].
pub struct WorkflowBuilder;

impl WorkflowBuilder {
    /// Builds the full per-stage input tree from a named protocol.
    pub fn from_protocol(
        codes: &Codes,
        structure: Structure,
        pseudos: HashMap<String, Pseudo>,
        options: &BuilderOptions,
    ) -> Result<(WorkflowInputs, BuilderSummary), ConfigError> {
        match options.electronic_type {
            ElectronicType::Metal | ElectronicType::Insulator => {}
            other => return Err(ConfigError::UnsupportedElectronicType(other.to_string())),
        }
        if options.spin_type != SpinType::NonPolarized {
            return Err(ConfigError::UnsupportedSpinType(options.spin_type.to_string()));
        }
        if options.initial_magnetic_moments.is_some()
            && options.spin_type != SpinType::Collinear
        {
            return Err(ConfigError::IncompatibleMagneticMoments(
                options.spin_type.to_string(),
            ));
        }

        let orbital_table = match &options.orbital_table {
            Some(table) => table.clone(),
            None => PseudoOrbitalTable::bundled()?,
        };
        orbital_table.validate(&pseudos)?;

        let registry = ProtocolRegistry::bundled()?;
        let mut protocol = registry.resolve(options.protocol.as_deref())?;
        options.overrides.apply(&mut protocol);

        let disentanglement = resolve_disentanglement(
            options.disentanglement_type,
            options.electronic_type,
            options.projection_type,
        )?;

        // Projectability data is needed whenever SCDM picks mu/sigma or the
        // frozen window is derived automatically.
        let run_projwfc = protocol.stages.projwfc
            || options.projection_type == ProjectionType::Scdm
            || disentanglement == DisentanglementType::WindowAuto;
        if run_projwfc && codes.projwfc.is_none() {
            return Err(ConfigError::MissingCode("projwfc"));
        }

        let only_valence = options.electronic_type == ElectronicType::Insulator;
        let spin_polarized = options.spin_type == SpinType::Collinear;
        let nbnd = required_band_count(
            &structure,
            &pseudos,
            &orbital_table,
            protocol.nbands_factor,
            only_valence,
            spin_polarized,
        )
        .map_err(flatten_derive)?;

        // The nscf and wannier90 stages must see the exact same k-points.
        let mesh = mesh_from_distance(&structure, protocol.kpoints_distance);
        let kpoints = explicit_kpoints(mesh);

        let semicore_indices = if options.exclude_semicores {
            semicore_band_indices(&structure, &orbital_table).map_err(flatten_derive)?
        } else {
            Vec::new()
        };

        let relax = protocol
            .stages
            .relax
            .then(|| pw_inputs(codes, options, "vc-relax", &kpoints));
        let scf = protocol
            .stages
            .scf
            .then(|| pw_inputs(codes, options, "scf", &kpoints));
        let nscf = protocol
            .stages
            .nscf
            .then(|| nscf_inputs(codes, options, nbnd, &kpoints));
        let projwfc = run_projwfc.then(|| projwfc_inputs(codes));

        let pw2wannier90 = pw2wannier90_inputs(codes, options, &semicore_indices);
        let (wannier90, num_bands, num_wann) = wannier90_inputs(
            codes,
            options,
            &structure,
            &orbital_table,
            disentanglement,
            nbnd,
            &semicore_indices,
            &kpoints,
            mesh,
        )?;

        let summary = BuilderSummary {
            formula: structure.formula(),
            electronic_type: options.electronic_type,
            spin_type: options.spin_type,
            projection_type: options.projection_type,
            disentanglement_type: disentanglement,
            num_bands,
            num_wann,
            exclude_bands: semicore_indices,
            mp_grid: mesh,
        };
        if options.print_summary {
            tracing::info!("{summary}");
        }

        let inputs = WorkflowInputs {
            structure,
            pseudos,
            orbital_table,
            clean_workdir: protocol.clean_workdir,
            // Window parameters are declared relative to the Fermi energy
            // and shifted once the scf output is known.
            relative_dis_windows: true,
            auto_froz_max: disentanglement == DisentanglementType::WindowAuto,
            auto_froz_max_threshold: crate::derive::DEFAULT_PROJECTABILITY_THRESHOLD,
            relax,
            scf,
            nscf,
            projwfc,
            pw2wannier90,
            wannier90,
        };

        Ok((inputs, summary))
    }
}

fn flatten_derive(err: DeriveError) -> ConfigError {
    match err {
        DeriveError::Config(config) => config,
        other => ConfigError::MalformedOrbitalTable(other.to_string()),
    }
}

/// Plane-wave bundle shared by relax and scf.
fn pw_inputs(
    codes: &Codes,
    options: &BuilderOptions,
    calculation: &str,
    kpoints: &crate::core::KpointList,
) -> JobInputs {
    let mut parameters = ParameterBundle::new();
    parameters.set("CONTROL.calculation", calculation);
    set_occupations(&mut parameters, options.electronic_type);
    JobInputs {
        code: Some(codes.pw.clone()),
        parameters,
        kpoints: Some(kpoints.clone()),
        ..JobInputs::default()
    }
}

fn nscf_inputs(
    codes: &Codes,
    options: &BuilderOptions,
    nbnd: u32,
    kpoints: &crate::core::KpointList,
) -> JobInputs {
    let mut parameters = ParameterBundle::new();
    parameters.set("CONTROL.calculation", "nscf");
    parameters.set("CONTROL.restart_mode", "restart");
    set_occupations(&mut parameters, options.electronic_type);
    parameters.set("SYSTEM.nbnd", nbnd);
    // Symmetry reduction would desynchronize the k-point lists between the
    // plane-wave code and wannier90.
    parameters.set("SYSTEM.nosym", true);
    parameters.set("SYSTEM.noinv", true);
    parameters.set("ELECTRONS.diagonalization", "cg");
    parameters.set("ELECTRONS.diago_full_acc", true);
    JobInputs {
        code: Some(codes.pw.clone()),
        parameters,
        kpoints: Some(kpoints.clone()),
        ..JobInputs::default()
    }
}

fn projwfc_inputs(codes: &Codes) -> JobInputs {
    let mut parameters = ParameterBundle::new();
    parameters.set("PROJWFC.DeltaE", 0.2);
    JobInputs {
        code: codes.projwfc.clone(),
        parameters,
        ..JobInputs::default()
    }
}

fn pw2wannier90_inputs(
    codes: &Codes,
    options: &BuilderOptions,
    semicore_indices: &[usize],
) -> JobInputs {
    let mut parameters = ParameterBundle::new();
    parameters.set("inputpp.write_mmn", true);
    parameters.set("inputpp.write_amn", true);
    if options.plot_wannier_functions {
        parameters.set("inputpp.write_unk", true);
    }
    match options.projection_type {
        ProjectionType::Scdm => {
            parameters.set("inputpp.scdm_proj", true);
            if options.electronic_type == ElectronicType::Insulator {
                parameters.set("inputpp.scdm_entanglement", "isolated");
            } else {
                // scdm_mu/scdm_sigma are fitted from projectability once the
                // projwfc stage has run.
                parameters.set("inputpp.scdm_entanglement", "erfc");
            }
        }
        ProjectionType::Numeric => {
            parameters.set("inputpp.use_pao", true);
            parameters.set("inputpp.ortho_paos", true);
            if !semicore_indices.is_empty() {
                parameters.set("inputpp.exclude_paos", json!(semicore_indices));
            }
        }
        ProjectionType::Hydrogen | ProjectionType::Random => {}
    }
    JobInputs {
        code: Some(codes.pw2wannier90.clone()),
        parameters,
        ..JobInputs::default()
    }
}

#[allow(clippy::too_many_arguments)]
fn wannier90_inputs(
    codes: &Codes,
    options: &BuilderOptions,
    structure: &Structure,
    orbital_table: &PseudoOrbitalTable,
    disentanglement: DisentanglementType,
    nbnd: u32,
    semicore_indices: &[usize],
    kpoints: &crate::core::KpointList,
    mesh: [u32; 3],
) -> Result<(JobInputs, u32, u32), ConfigError> {
    let mut inputs = JobInputs {
        code: Some(codes.wannier90.clone()),
        kpoints: Some(kpoints.clone()),
        ..JobInputs::default()
    };
    let parameters = &mut inputs.parameters;
    parameters.set("use_ws_distance", true);

    let num_projs = num_projections(structure, orbital_table).map_err(flatten_derive)? as i64;
    let mut num_bands = i64::from(nbnd);
    let mut num_wann = if options.electronic_type == ElectronicType::Insulator {
        num_bands
    } else {
        num_projs
    };

    let num_excludes = semicore_indices.len() as i64;
    if num_excludes != 0 {
        parameters.set("exclude_bands", json!(semicore_indices));
        num_wann -= num_excludes;
        num_bands -= num_excludes;
    }
    if num_wann <= 0 {
        return Err(ConfigError::InvalidWannierCount(num_wann));
    }
    parameters.set("num_bands", num_bands);
    parameters.set("num_wann", num_wann);

    match options.projection_type {
        ProjectionType::Scdm | ProjectionType::Numeric => {
            parameters.set("auto_projections", true);
        }
        ProjectionType::Hydrogen => {
            let mut projections = Vec::new();
            for site in &structure.sites {
                let entry = orbital_table.entry(&site.kind)?;
                for orbital in &entry.pswfcs {
                    if options.exclude_semicores && entry.semicores.contains(orbital) {
                        continue;
                    }
                    let character = orbital
                        .chars()
                        .last()
                        .map(|c| c.to_ascii_lowercase())
                        .unwrap_or('s');
                    projections.push(format!("{}:{}", site.kind, character));
                }
            }
            inputs.projections = Some(projections);
        }
        ProjectionType::Random => {
            inputs.settings.random_projections = true;
        }
    }

    if options.plot_wannier_functions {
        parameters.set("wannier_plot", true);
    }

    // Localisation and disentanglement share the convergence tolerance.
    let conv_tol = 1e-7 * structure.num_atoms() as f64;
    let default_num_iter = 4000;
    if options.maximal_localisation {
        parameters.set("num_iter", default_num_iter);
        parameters.set("conv_tol", conv_tol);
        parameters.set("conv_window", 3);
    } else {
        parameters.set("num_iter", 0);
    }

    match disentanglement {
        DisentanglementType::None => {
            parameters.set("dis_num_iter", 0);
        }
        DisentanglementType::WindowFixed => {
            parameters.set("dis_num_iter", default_num_iter);
            parameters.set("dis_conv_tol", conv_tol);
            // Relative to the Fermi energy, shifted at run time.
            parameters.set("dis_froz_max", 2.0);
        }
        DisentanglementType::WindowAuto => {
            parameters.set("dis_num_iter", default_num_iter);
            parameters.set("dis_conv_tol", conv_tol);
        }
        DisentanglementType::Projectability => {
            parameters.set("dis_num_iter", default_num_iter);
            parameters.set("dis_conv_tol", conv_tol);
            parameters.set("dis_proj_min", 0.01);
            parameters.set("dis_proj_max", 0.95);
        }
        DisentanglementType::WindowAndProjectability => {
            parameters.set("dis_num_iter", default_num_iter);
            parameters.set("dis_conv_tol", conv_tol);
            parameters.set("dis_proj_min", 0.01);
            parameters.set("dis_proj_max", 0.95);
            parameters.set("dis_froz_max", 2.0);
        }
        DisentanglementType::Auto => {
            return Err(ConfigError::UnsupportedDisentanglement(
                disentanglement.to_string(),
            ));
        }
    }

    if options.retrieve_hamiltonian {
        parameters.set("write_tb", true);
        parameters.set("write_hr", true);
        parameters.set("write_xyz", true);
        inputs
            .settings
            .additional_retrieve_list
            .push("*.win".to_string());
    }
    if options.retrieve_matrices {
        for ext in ["chk", "eig", "amn", "mmn", "spn"] {
            inputs
                .settings
                .additional_retrieve_list
                .push(format!("aiida.{ext}"));
        }
    }

    parameters.set("mp_grid", json!(mesh));

    // counts are small and positive here
    Ok((inputs, num_bands as u32, num_wann as u32))
}

fn set_occupations(parameters: &mut ParameterBundle, electronic_type: ElectronicType) {
    match electronic_type {
        ElectronicType::Insulator => {
            parameters.set("SYSTEM.occupations", "fixed");
        }
        ElectronicType::Metal | ElectronicType::Automatic => {
            parameters.set("SYSTEM.occupations", "smearing");
            parameters.set("SYSTEM.smearing", "cold");
            parameters.set("SYSTEM.degauss", 0.01);
        }
    }
}
