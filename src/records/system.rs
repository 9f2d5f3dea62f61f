//! Data common to molecular and periodic records.

use std::collections::{BTreeMap, HashMap};

use anyhow::{self, format_err};
use derive_builder::Builder;
use ndarray::{Array1, Array2, ArrayD, Axis};
use periodic_table::periodic_table;

use crate::engine::Calculation;
use crate::grid::Grid;
use crate::normalisation::{CanonicalArrays, NormalisationParams};

/// Structure holding every quantity of a normalised calculation result.
///
/// The leading axis of all spin-resolved arrays has length two. Whether the remaining axes carry
/// a $`k`$-point dimension is decided by the record wrapping this structure.
#[derive(Builder, Clone, Debug, PartialEq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SystemData {
    /// The quadrature grid.
    grid: Grid,

    /// The atomic numbers of the atoms.
    atom_index: Array1<i64>,

    /// The nuclear positions in Bohr, shape `(n_atoms, 3)`.
    nuclear_pos: Array2<f64>,

    /// Basis-function values on the grid.
    ao: ArrayD<f64>,

    /// First derivatives of the basis functions with the Cartesian axis last.
    grad_ao: ArrayD<f64>,

    /// Pure-direction higher derivatives of the basis functions keyed by order.
    #[builder(default = "BTreeMap::new()")]
    grad_n_ao: BTreeMap<usize, ArrayD<f64>>,

    /// The spin-resolved density matrix.
    rdm1: ArrayD<f64>,

    /// The nuclear repulsion energy.
    nuclear_repulsion: f64,

    /// The core Hamiltonian.
    h1e: ArrayD<f64>,

    /// The spin-resolved Coulomb matrix.
    vj: ArrayD<f64>,

    /// The spin-resolved molecular-orbital coefficients.
    mo_coeff: ArrayD<f64>,

    /// The spin-resolved molecular-orbital occupation numbers.
    mo_occ: ArrayD<f64>,

    /// The spin-resolved molecular-orbital energies.
    mo_energy: ArrayD<f64>,

    /// The total energy of the calculation.
    mf_energy: f64,

    /// The overlap matrix.
    s1e: ArrayD<f64>,

    /// The range-separation parameters of [`Self::chi`].
    #[builder(default = "None")]
    omegas: Option<Vec<f64>>,

    /// The exchange feature tensor, shape `(n_grid, n_omega, 2, nao)` for molecules and
    /// `(n_grid, n_omega, 2, nk, nao)` for solids.
    #[builder(default = "None")]
    chi: Option<ArrayD<f64>>,

    /// The two-electron repulsion tensor.
    rep_tensor: ArrayD<f64>,

    /// The reference energy of the system, if known.
    #[builder(default = "None")]
    energy: Option<f64>,

    /// The name of the basis set.
    basis: String,

    /// An optional name for the system.
    #[builder(default = "None")]
    name: Option<String>,

    /// The spin ($`2S`$) of the system.
    #[builder(default = "0")]
    spin: i64,

    /// The total charge of the system.
    #[builder(default = "0")]
    charge: i64,

    /// Boolean indicating if the geometry was specified in Ångström.
    #[builder(default = "true")]
    unit_angstrom: bool,

    /// The level of the quadrature grid, or `None` for grids without a level.
    #[builder(default = "None")]
    grid_level: Option<i64>,

    /// The self-consistent-field iteration of the density matrix.
    #[builder(default = "50")]
    scf_iteration: i64,

    /// The spin-resolved Fock matrix.
    fock: ArrayD<f64>,
}

impl SystemDataBuilder {
    fn validate(&self) -> Result<(), String> {
        let spinful = [
            ("rdm1", self.rdm1.as_ref()),
            ("vj", self.vj.as_ref()),
            ("fock", self.fock.as_ref()),
            ("mo_coeff", self.mo_coeff.as_ref()),
            ("mo_occ", self.mo_occ.as_ref()),
            ("mo_energy", self.mo_energy.as_ref()),
        ];
        for (name, arr) in spinful {
            let arr = arr.ok_or(format!("No `{name}` found."))?;
            if arr.ndim() < 2 || arr.len_of(Axis(0)) != 2 {
                return Err(format!(
                    "`{name}` must have a leading spin axis of length 2, but has shape {:?}.",
                    arr.shape()
                ));
            }
        }

        let grid = self.grid.as_ref().ok_or("No grid found.".to_string())?;
        let n_grid = grid.n_points();
        let omegas = self.omegas.clone().flatten();
        if let Some(chi) = self.chi.as_ref().and_then(|chi| chi.as_ref()) {
            let n_omega = omegas
                .as_ref()
                .ok_or("A feature tensor is present without its omegas.".to_string())?
                .len();
            let shape = chi.shape();
            if !(4..=5).contains(&shape.len())
                || shape[0] != n_grid
                || shape[1] != n_omega
                || shape[2] != 2
            {
                return Err(format!(
                    "Feature tensor of shape {:?} inconsistent with {n_grid} grid points \
                    and {n_omega} omega(s).",
                    chi.shape()
                ));
            }
        }

        let atom_index = self
            .atom_index
            .as_ref()
            .ok_or("No atomic numbers found.".to_string())?;
        let nuclear_pos = self
            .nuclear_pos
            .as_ref()
            .ok_or("No nuclear positions found.".to_string())?;
        if nuclear_pos.dim() != (atom_index.len(), 3) {
            return Err(format!(
                "{} atoms but nuclear positions of shape {:?}.",
                atom_index.len(),
                nuclear_pos.dim()
            ));
        }
        Ok(())
    }
}

impl SystemData {
    /// Returns a builder to construct a new [`SystemData`].
    pub fn builder() -> SystemDataBuilder {
        SystemDataBuilder::default()
    }

    /// Assembles the data of a normalised calculation result.
    ///
    /// # Arguments
    ///
    /// * `calc` - The engine calculation, for the identity of the system.
    /// * `grid` - The grid on which `canonical` was evaluated.
    /// * `grid_level` - The level of the grid.
    /// * `canonical` - The canonical arrays.
    /// * `params` - The normalisation parameters.
    /// * `energy` - The reference energy.
    /// * `name` - The name of the system.
    pub(crate) fn from_canonical<C: Calculation + ?Sized>(
        calc: &C,
        grid: Grid,
        grid_level: Option<i64>,
        canonical: CanonicalArrays,
        params: &NormalisationParams,
        energy: Option<f64>,
        name: Option<&str>,
    ) -> Result<Self, anyhow::Error> {
        Self::builder()
            .grid(grid)
            .atom_index(atomic_numbers(&calc.element_symbols())?)
            .nuclear_pos(calc.nuclear_positions())
            .ao(canonical.ao)
            .grad_ao(canonical.grad_ao)
            .grad_n_ao(canonical.grad_n_ao)
            .rdm1(canonical.rdm1)
            .nuclear_repulsion(canonical.energy_nuc)
            .h1e(canonical.h1e)
            .vj(canonical.vj)
            .mo_coeff(canonical.mo_coeff)
            .mo_occ(canonical.mo_occ)
            .mo_energy(canonical.mo_energy)
            .mf_energy(canonical.mf_e_tot)
            .s1e(canonical.s1e)
            .rep_tensor(canonical.rep_tensor)
            .energy(energy)
            .basis(calc.basis_name())
            .name(name.map(|n| n.to_string()))
            .spin(calc.spin())
            .charge(calc.charge())
            .grid_level(grid_level)
            .scf_iteration(params.scf_iteration)
            .fock(canonical.fock)
            .build()
            .map_err(|err| format_err!(err))
    }

    /// Returns a copy of the data carrying a different feature tensor.
    pub(crate) fn with_chi(&self, omegas: Option<Vec<f64>>, chi: Option<ArrayD<f64>>) -> Self {
        Self {
            omegas,
            chi,
            ..self.clone()
        }
    }

    /// Returns the quadrature grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Returns the atomic numbers.
    pub fn atom_index(&self) -> &Array1<i64> {
        &self.atom_index
    }

    /// Returns the nuclear positions in Bohr.
    pub fn nuclear_pos(&self) -> &Array2<f64> {
        &self.nuclear_pos
    }

    /// Returns the basis-function values on the grid.
    pub fn ao(&self) -> &ArrayD<f64> {
        &self.ao
    }

    /// Returns the first derivatives of the basis functions on the grid.
    pub fn grad_ao(&self) -> &ArrayD<f64> {
        &self.grad_ao
    }

    /// Returns the higher basis-function derivatives, keyed by derivative order.
    pub fn grad_n_ao(&self) -> &BTreeMap<usize, ArrayD<f64>> {
        &self.grad_n_ao
    }

    /// Returns the spin-resolved density matrix.
    pub fn rdm1(&self) -> &ArrayD<f64> {
        &self.rdm1
    }

    /// Returns the nuclear repulsion energy.
    pub fn nuclear_repulsion(&self) -> f64 {
        self.nuclear_repulsion
    }

    /// Returns the core Hamiltonian.
    pub fn h1e(&self) -> &ArrayD<f64> {
        &self.h1e
    }

    /// Returns the spin-resolved Coulomb potential.
    pub fn vj(&self) -> &ArrayD<f64> {
        &self.vj
    }

    /// Returns the spin-resolved molecular-orbital coefficients.
    pub fn mo_coeff(&self) -> &ArrayD<f64> {
        &self.mo_coeff
    }

    /// Returns the spin-resolved molecular-orbital occupation numbers.
    pub fn mo_occ(&self) -> &ArrayD<f64> {
        &self.mo_occ
    }

    /// Returns the spin-resolved molecular-orbital energies.
    pub fn mo_energy(&self) -> &ArrayD<f64> {
        &self.mo_energy
    }

    /// Returns the total energy of the calculation.
    pub fn mf_energy(&self) -> f64 {
        self.mf_energy
    }

    /// Returns the overlap matrix.
    pub fn s1e(&self) -> &ArrayD<f64> {
        &self.s1e
    }

    /// Returns the range-separation parameters of the feature tensor, if any.
    pub fn omegas(&self) -> Option<&[f64]> {
        self.omegas.as_deref()
    }

    /// Returns the exchange feature tensor, if any.
    pub fn chi(&self) -> Option<&ArrayD<f64>> {
        self.chi.as_ref()
    }

    /// Returns the two-electron repulsion tensor.
    pub fn rep_tensor(&self) -> &ArrayD<f64> {
        &self.rep_tensor
    }

    /// Returns the reference energy, if known.
    pub fn energy(&self) -> Option<f64> {
        self.energy
    }

    /// Returns the name of the basis set.
    pub fn basis(&self) -> &str {
        &self.basis
    }

    /// Returns the name of the system, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the number of unpaired electrons.
    pub fn spin(&self) -> i64 {
        self.spin
    }

    /// Returns the total charge.
    pub fn charge(&self) -> i64 {
        self.charge
    }

    /// Returns `true` if the input geometry was given in Ångström.
    pub fn unit_angstrom(&self) -> bool {
        self.unit_angstrom
    }

    /// Returns the quadrature grid level, if known.
    pub fn grid_level(&self) -> Option<i64> {
        self.grid_level
    }

    /// Returns the SCF iteration the density matrix was taken from.
    pub fn scf_iteration(&self) -> i64 {
        self.scf_iteration
    }

    /// Returns the spin-resolved Fock matrix.
    pub fn fock(&self) -> &ArrayD<f64> {
        &self.fock
    }

    /// Returns the number of basis functions.
    pub fn nao(&self) -> usize {
        self.rdm1.shape()[self.rdm1.ndim() - 1]
    }

    /// Returns the number of grid points.
    pub fn n_grid(&self) -> usize {
        self.grid.n_points()
    }
}

/// Maps element symbols to atomic numbers.
pub(crate) fn atomic_numbers(symbols: &[String]) -> Result<Array1<i64>, anyhow::Error> {
    let table = periodic_table()
        .into_iter()
        .map(|element| (element.symbol, i64::from(element.atomic_number)))
        .collect::<HashMap<_, _>>();
    symbols
        .iter()
        .map(|symbol| {
            table
                .get(symbol.as_str())
                .copied()
                .ok_or_else(|| format_err!("Unknown element symbol `{symbol}`."))
        })
        .collect::<Result<Array1<_>, _>>()
}
