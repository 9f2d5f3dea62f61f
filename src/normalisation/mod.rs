//! Normalisation of calculation results into a canonical array layout.
//!
//! Engines return their arrays in ranks that depend on the spin treatment and on the boundary
//! conditions of the calculation. The functions in this module classify a calculation result into
//! one of the six [`CalculationLayout`]s and extract every quantity needed downstream with an
//! explicit spin axis of length two.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use log;
use ndarray::{stack, Array2, ArrayD, ArrayView2, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

use crate::engine::{Boundary, Calculation, KPointSampling};
use crate::errors::XcFeatError;
use crate::features::ContractionPrecision;
use crate::grid::Grid;
use crate::io::format::{nice_bool, xcfeat_warn};
use crate::records::KPointInfo;

mod derivatives;
mod eri;
mod layout;

pub use layout::CalculationLayout;


/// Largest imaginary part of $`k`$-resolved engine data that may be discarded.
const IMAGINARY_THRESHOLD: f64 = 1e-10;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for the normalisation of calculation results and
/// the generation of features.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalisationParams {
    /// The highest order of basis-function derivatives to evaluate. Orders two and above are kept
    /// as pure-direction derivatives only.
    #[builder(default = "2")]
    pub grad_order: usize,

    /// The self-consistent-field iteration whose density matrix is to be used. The value `0`
    /// selects the initial-guess density; any other value selects the converged density.
    #[builder(default = "50")]
    pub scf_iteration: i64,

    /// The range-separation parameters for which the exchange feature tensor is to be computed.
    /// If `None`, no feature tensor is computed.
    #[builder(setter(custom), default = "None")]
    pub omegas: Option<Vec<f64>>,

    /// The maximum number of grid points per chunk in the feature contraction.
    #[builder(default = "1024")]
    pub chunk_size: usize,

    /// The floating-point precision of the feature contraction.
    #[builder(default = "ContractionPrecision::Highest")]
    pub precision: ContractionPrecision,

    /// Boolean indicating if chunks of the feature contraction are to be processed in parallel.
    #[builder(default = "false")]
    pub parallel: bool,
}

impl NormalisationParams {
    /// Returns a builder to construct a [`NormalisationParams`] structure.
    pub fn builder() -> NormalisationParamsBuilder {
        NormalisationParamsBuilder::default()
    }
}

impl NormalisationParamsBuilder {
    /// Sets the range-separation parameters of the feature tensor.
    pub fn omegas(&mut self, omegas: Option<&[f64]>) -> &mut Self {
        self.omegas = Some(omegas.map(|ws| ws.to_vec()));
        self
    }
}

impl Default for NormalisationParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `NormalisationParams`.")
    }
}

impl fmt::Display for NormalisationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Maximum derivative order: {}", self.grad_order)?;
        writeln!(
            f,
            "Density matrix: {}",
            if self.scf_iteration == 0 {
                "initial guess".to_string()
            } else {
                format!("converged (iteration {})", self.scf_iteration)
            }
        )?;
        writeln!(
            f,
            "Range-separation parameters: {}",
            self.omegas
                .as_ref()
                .map(|ws| ws.iter().map(|w| format!("{w:.3}")).join(", "))
                .unwrap_or_else(|| nice_bool(false))
        )?;
        writeln!(f, "Grid chunk size: {}", self.chunk_size)?;
        writeln!(f, "Contraction precision: {}", self.precision)?;
        writeln!(f, "Parallel contraction: {}", nice_bool(self.parallel))?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure holding the arrays of a calculation result in canonical layout.
///
/// Spin-resolved arrays have a leading spin axis of length two. Full Brillouin-zone layouts keep
/// an explicit $`k`$-point axis (after the spin axis, if any); gamma-point layouts have it
/// removed.
#[derive(Clone, Debug)]
pub struct CanonicalArrays {
    /// The layout of the original calculation result.
    pub layout: CalculationLayout,

    /// Basis-function values, `([nk,] grid, nao)`.
    pub ao: ArrayD<f64>,

    /// First derivatives of the basis functions, `([nk,] grid, nao, 3)`.
    pub grad_ao: ArrayD<f64>,

    /// Pure-direction higher derivatives of the basis functions keyed by order, each
    /// `([nk,] grid, nao, 3)`.
    pub grad_n_ao: BTreeMap<usize, ArrayD<f64>>,

    /// Spin-resolved density matrix, `(2, [nk,] nao, nao)`.
    pub rdm1: ArrayD<f64>,

    /// Nuclear repulsion energy.
    pub energy_nuc: f64,

    /// Core Hamiltonian, `([nk,] nao, nao)`.
    pub h1e: ArrayD<f64>,

    /// Coulomb matrix, `(2, [nk,] nao, nao)`.
    pub vj: ArrayD<f64>,

    /// Molecular-orbital coefficients, `(2, [nk,] nao, nmo)`.
    pub mo_coeff: ArrayD<f64>,

    /// Molecular-orbital energies, `(2, [nk,] nmo)`.
    pub mo_energy: ArrayD<f64>,

    /// Molecular-orbital occupation numbers, `(2, [nk,] nmo)`.
    pub mo_occ: ArrayD<f64>,

    /// Total energy of the calculation.
    pub mf_e_tot: f64,

    /// Overlap matrix, `([nk,] nao, nao)`.
    pub s1e: ArrayD<f64>,

    /// Fock matrix built from the converged density, `(2, [nk,] nao, nao)`.
    pub fock: ArrayD<f64>,

    /// Two-electron repulsion tensor, `(nao, nao, nao, nao)` or
    /// `(nk, nk, nao, nao, nao, nao)`.
    pub rep_tensor: ArrayD<f64>,

    /// Lattice vectors of periodic systems.
    pub lattice_vectors: Option<Array2<f64>>,

    /// $`k`$-point information of full Brillouin-zone layouts.
    pub kpt_info: Option<KPointInfo>,
}

// =========
// Functions
// =========

/// Duplicates an array along a new leading spin axis.
pub(crate) fn stack_spin(arr: ArrayViewD<f64>) -> Result<ArrayD<f64>, anyhow::Error> {
    stack(Axis(0), &[arr.view(), arr.view()]).map_err(|err| format_err!(err))
}

/// Removes an axis of length one.
pub(crate) fn squeeze_axis(arr: ArrayD<f64>, axis: usize) -> Result<ArrayD<f64>, anyhow::Error> {
    ensure!(
        arr.ndim() > axis && arr.len_of(Axis(axis)) == 1,
        "Cannot squeeze axis {axis} of an array with shape {:?}.",
        arr.shape()
    );
    Ok(arr.index_axis_move(Axis(axis), 0))
}

/// Gives a potential an explicit spin axis, duplicating spin-less potentials.
///
/// # Arguments
///
/// * `veff` - The potential returned by the engine.
/// * `spinless_ndim` - The rank of the spin-less counterpart (*e.g.* of the core Hamiltonian).
fn spin_broadcast(veff: ArrayD<f64>, spinless_ndim: usize) -> Result<ArrayD<f64>, anyhow::Error> {
    if veff.ndim() == spinless_ndim {
        stack_spin(veff.view())
    } else {
        ensure!(
            veff.ndim() == spinless_ndim + 1 && veff.len_of(Axis(0)) == 2,
            "Effective potential of shape {:?} cannot be spin-resolved.",
            veff.shape()
        );
        Ok(veff)
    }
}

/// Normalises a calculation result into the canonical layout.
///
/// # Arguments
///
/// * `calc` - The engine calculation.
/// * `grid` - The quadrature grid on which basis functions are to be evaluated.
/// * `params` - The normalisation parameters.
///
/// # Returns
///
/// The canonical arrays of the calculation.
///
/// # Errors
///
/// Errors with [`XcFeatError::UnsupportedLayout`] if the calculation uses symmetry-adapted
/// $`k`$-points, if its density matrix matches none of the six recognised layouts, if a single
/// sampled $`k`$-point is not the gamma point, or if a full Brillouin-zone calculation does not
/// provide density-fitting factors or reports complex Bloch-function data. Engine failures are
/// propagated.
pub fn normalise<C: Calculation + ?Sized>(
    calc: &C,
    grid: &Grid,
    params: &NormalisationParams,
) -> Result<CanonicalArrays, anyhow::Error> {
    let (lattice_vectors, kpts_abs) = match calc.boundary() {
        Boundary::Open => (None, None),
        Boundary::Periodic {
            kpoints: KPointSampling::SymmetryAdapted { .. },
            ..
        } => {
            return Err(XcFeatError::UnsupportedLayout(
                "symmetry-adapted k-point sampling is not supported".to_string(),
            )
            .into())
        }
        Boundary::Periodic {
            lattice_vectors,
            kpoints: KPointSampling::Explicit(kpts),
        } => (Some(lattice_vectors.clone()), Some(kpts.clone())),
    };

    let dm_converged = calc.density_matrix();
    let dm = if params.scf_iteration == 0 {
        xcfeat_warn!("Normalising the initial-guess density matrix instead of the converged one.");
        calc.initial_guess_density()
    } else {
        dm_converged.clone()
    };
    let layout = CalculationLayout::classify(dm.shape(), calc.boundary().is_periodic())?;
    log::debug!("Calculation layout: {layout}.");

    let nk = dm.ndim().checked_sub(3).map(|axis| dm.shape()[axis]);
    let kpts = kpts_abs.as_ref();
    let plan = match layout {
        CalculationLayout::RestrictedOpen => Extraction {
            spin: SpinTreatment::Restricted,
            bz_kpts: None,
            squeeze_gamma: false,
        },
        CalculationLayout::UnrestrictedOpen => Extraction {
            spin: SpinTreatment::Unrestricted,
            bz_kpts: None,
            squeeze_gamma: false,
        },
        CalculationLayout::RestrictedGamma => {
            ensure_gamma_point(kpts)?;
            Extraction {
                spin: SpinTreatment::Restricted,
                bz_kpts: None,
                squeeze_gamma: true,
            }
        }
        CalculationLayout::UnrestrictedGamma => {
            ensure_gamma_point(kpts)?;
            Extraction {
                spin: SpinTreatment::Unrestricted,
                bz_kpts: None,
                squeeze_gamma: true,
            }
        }
        CalculationLayout::RestrictedFullBz => Extraction {
            spin: SpinTreatment::Restricted,
            bz_kpts: Some(full_bz_kpoints(calc, kpts, nk)?),
            squeeze_gamma: false,
        },
        CalculationLayout::UnrestrictedFullBz => Extraction {
            spin: SpinTreatment::Unrestricted,
            bz_kpts: Some(full_bz_kpoints(calc, kpts, nk)?),
            squeeze_gamma: false,
        },
    };
    let bz_kpts = plan.bz_kpts;

    // Basis functions
    let comp_axis = layout.component_axis();
    let coords = grid.coords().view();
    let ao_all = calc.eval_ao(coords, 1, bz_kpts)?;
    let (ao, grad_ao) = derivatives::split_value_and_gradient(ao_all, comp_axis)?;
    let grad_n_ao = derivatives::ao_grads(calc, coords, params.grad_order, bz_kpts, comp_axis)?;

    // Spin resolution
    let (rdm1, mo_coeff, mo_energy, mo_occ) = match plan.spin {
        SpinTreatment::Restricted => (
            stack_spin(dm.mapv(|x| 0.5 * x).view())?,
            stack_spin(calc.mo_coefficients().view())?,
            stack_spin(calc.mo_energies().view())?,
            stack_spin(calc.mo_occupations().mapv(|x| 0.5 * x).view())?,
        ),
        SpinTreatment::Unrestricted => (
            dm,
            calc.mo_coefficients(),
            calc.mo_energies(),
            calc.mo_occupations(),
        ),
    };
    let vj = calc.coulomb(rdm1.view())?.mapv(|x| 2.0 * x);

    let h1e = calc.core_hamiltonian();
    let veff = spin_broadcast(calc.effective_potential(dm_converged.view())?, h1e.ndim())?;
    let fock = &stack_spin(h1e.view())? + &veff;

    let rep_tensor = eri::two_electron_tensor(calc, layout, bz_kpts)?;
    let s1e = calc.overlap();

    let kpt_info = match (bz_kpts, lattice_vectors.as_ref()) {
        (Some(kpts), Some(lattice)) => Some(KPointInfo::from_explicit(kpts, lattice.view())?),
        _ => None,
    };

    let canonical = CanonicalArrays {
        layout,
        ao,
        grad_ao,
        grad_n_ao,
        rdm1,
        energy_nuc: calc.nuclear_repulsion_energy(),
        h1e,
        vj,
        mo_coeff,
        mo_energy,
        mo_occ,
        mf_e_tot: calc.total_energy(),
        s1e,
        fock,
        rep_tensor,
        lattice_vectors,
        kpt_info,
    };
    if plan.squeeze_gamma {
        squeeze_gamma(canonical)
    } else {
        Ok(canonical)
    }
}

/// Spin treatment of the engine arrays of a layout.
enum SpinTreatment {
    /// Arrays without a spin axis, holding the sum over both spins where applicable.
    Restricted,

    /// Arrays with a leading spin axis of length two.
    Unrestricted,
}

/// The per-layout recipe to extract canonical arrays.
struct Extraction<'a> {
    spin: SpinTreatment,

    /// The $`k`$-points at which Bloch functions are evaluated, for full Brillouin-zone layouts.
    bz_kpts: Option<ArrayView2<'a, f64>>,

    /// Boolean indicating if the unit $`k`$-point axis is to be removed.
    squeeze_gamma: bool,
}

/// Checks that a single-$`k`$-point calculation samples exactly the gamma point.
fn ensure_gamma_point(kpts_abs: Option<&Array2<f64>>) -> Result<(), anyhow::Error> {
    match kpts_abs {
        Some(kpts) if kpts.nrows() == 1 && kpts.iter().all(|&x| x == 0.0) => Ok(()),
        Some(kpts) => Err(XcFeatError::UnsupportedLayout(format!(
            "a single k-point calculation must sample the gamma point, but {} was sampled",
            kpts.row(0)
        ))
        .into()),
        None => Err(XcFeatError::UnsupportedLayout(
            "gamma-point density matrix without k-points".to_string(),
        )
        .into()),
    }
}

/// Returns the $`k`$-points of a full Brillouin-zone calculation after checking that they match
/// the $`k`$-point axis of the density matrix, and that the engine data are real.
fn full_bz_kpoints<'a, C: Calculation + ?Sized>(
    calc: &C,
    kpts_abs: Option<&'a Array2<f64>>,
    nk: Option<usize>,
) -> Result<ArrayView2<'a, f64>, anyhow::Error> {
    let kpts = kpts_abs.ok_or_else(|| {
        XcFeatError::UnsupportedLayout(
            "full Brillouin-zone density matrix without k-points".to_string(),
        )
    })?;
    ensure!(
        nk == Some(kpts.nrows()),
        "Density matrix spans {nk:?} k-points, but {} k-points are sampled.",
        kpts.nrows()
    );
    let imaginary = calc.discarded_imaginary_part();
    if imaginary > IMAGINARY_THRESHOLD {
        return Err(XcFeatError::UnsupportedLayout(format!(
            "k-resolved engine data carry imaginary parts up to {imaginary:.3e}, \
            but only real Bloch representations can be stored"
        ))
        .into());
    }
    Ok(kpts.view())
}

/// Removes the unit $`k`$-point axis of gamma-point arrays.
fn squeeze_gamma(canonical: CanonicalArrays) -> Result<CanonicalArrays, anyhow::Error> {
    log::debug!("Squeezing the gamma-point axis.");
    let spinful = |arr: ArrayD<f64>| squeeze_axis(arr, 1);
    let spinless = |arr: ArrayD<f64>| squeeze_axis(arr, 0);
    Ok(CanonicalArrays {
        ao: spinless(canonical.ao)?,
        grad_ao: spinless(canonical.grad_ao)?,
        grad_n_ao: canonical
            .grad_n_ao
            .into_iter()
            .map(|(order, arr)| Ok((order, spinless(arr)?)))
            .collect::<Result<BTreeMap<_, _>, anyhow::Error>>()?,
        rdm1: spinful(canonical.rdm1)?,
        h1e: spinless(canonical.h1e)?,
        vj: spinful(canonical.vj)?,
        mo_coeff: spinful(canonical.mo_coeff)?,
        mo_energy: spinful(canonical.mo_energy)?,
        mo_occ: spinful(canonical.mo_occ)?,
        s1e: spinless(canonical.s1e)?,
        fock: spinful(canonical.fock)?,
        ..canonical
    })
}
