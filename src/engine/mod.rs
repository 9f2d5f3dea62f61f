//! Interface to the external electronic-structure engine.
//!
//! The engine performs the self-consistent-field calculation and owns all integral code. This
//! crate only consumes the converged (or partially converged) result through the traits defined
//! here. Arrays are returned in the engine's own, layout-dependent ranks; reconciling these is
//! the job of [`crate::normalisation`].

use anyhow;
use ndarray::{Array1, Array2, Array3, Array4, ArrayD, ArrayView1, ArrayView2, ArrayViewD};

#[cfg(test)]
pub(crate) mod mock;

// =================
// Enum definitions
// =================

/// Enumerated type for the $`k`$-point sampling of a periodic calculation.
#[derive(Clone, Debug)]
pub enum KPointSampling {
    /// Variant for an explicit list of absolute $`k`$-points (shape `(nk, 3)`) without any
    /// symmetry reduction.
    Explicit(Array2<f64>),

    /// Variant for a symmetry-adapted sampling of the Brillouin zone.
    SymmetryAdapted {
        /// All $`k`$-points in the first Brillouin zone.
        kpts_abs: Array2<f64>,

        /// The $`k`$-points in the irreducible wedge.
        kpts_ir_abs: Array2<f64>,

        /// The integration weights of the irreducible $`k`$-points.
        weights_ir: Array1<f64>,

        /// Map from every Brillouin-zone $`k`$-point to its irreducible image.
        bz2ibz: Array1<usize>,

        /// Map from every irreducible $`k`$-point to a representative in the full zone.
        ibz2bz: Array1<usize>,
    },
}

impl KPointSampling {
    /// Returns the number of $`k`$-points in the full Brillouin zone.
    pub fn n_kpoints(&self) -> usize {
        match self {
            Self::Explicit(kpts) => kpts.nrows(),
            Self::SymmetryAdapted { kpts_abs, .. } => kpts_abs.nrows(),
        }
    }
}

/// Enumerated type for the boundary conditions of a calculation.
#[derive(Clone, Debug)]
pub enum Boundary {
    /// Variant for an isolated system with open boundary conditions.
    Open,

    /// Variant for a periodic system.
    Periodic {
        /// The lattice vectors as rows of a $`3 \times 3`$ matrix, in Bohr.
        lattice_vectors: Array2<f64>,

        /// The Brillouin-zone sampling.
        kpoints: KPointSampling,
    },
}

impl Boundary {
    /// Returns `true` if the boundary is periodic.
    pub fn is_periodic(&self) -> bool {
        matches!(self, Self::Periodic { .. })
    }
}

// =================
// Trait definitions
// =================

/// Trait for quadrature grids owned by the engine.
///
/// A grid may not have been materialised yet, in which case [`Self::coords`] and
/// [`Self::weights`] return `None` until [`Self::build`] has been called.
pub trait QuadratureGrid {
    /// Returns the grid points, shape `(n_grid, 3)`, if built.
    fn coords(&self) -> Option<ArrayView2<'_, f64>>;

    /// Returns the integration weights, shape `(n_grid,)`, if built.
    fn weights(&self) -> Option<ArrayView1<'_, f64>>;

    /// Builds the grid points and weights.
    fn build(&mut self) -> Result<(), anyhow::Error>;

    /// Returns the resolution level of the grid, or `None` for grids without a level (*e.g.*
    /// uniform grids of periodic calculations).
    fn level(&self) -> Option<i64>;
}

/// Trait for engines able to evaluate range-separated Coulomb potential integrals on a set of
/// points.
pub trait RangeSeparatedIntegrals {
    /// Evaluates, for every point $`\mathbf{r}`$ in `points`,
    ///
    /// ```math
    /// \nu_{da}(\mathbf{r}) = \int \mathrm{d}\mathbf{r}'\,
    ///     \phi_d(\mathbf{r}') \frac{\operatorname{erf}(\omega |\mathbf{r} - \mathbf{r}'|)}
    ///     {|\mathbf{r} - \mathbf{r}'|} \phi_a(\mathbf{r}'),
    /// ```
    ///
    /// where $`\omega = 0`$ denotes the unmodified Coulomb kernel.
    ///
    /// # Arguments
    ///
    /// * `points` - The points, shape `(n_points, 3)`.
    /// * `omega` - The range-separation parameter.
    ///
    /// # Returns
    ///
    /// The integrals with shape `(n_points, nao, nao)`.
    fn range_separated_integrals(
        &self,
        points: ArrayView2<f64>,
        omega: f64,
    ) -> Result<Array3<f64>, anyhow::Error>;
}

/// Trait for the result object of an electronic-structure calculation.
///
/// Ranks of the returned arrays depend on the calculation layout:
///
/// | Quantity             | open, restricted | open, unrestricted | periodic, restricted | periodic, unrestricted |
/// |----------------------|------------------|--------------------|----------------------|------------------------|
/// | density matrix       | `(nao, nao)`     | `(2, nao, nao)`    | `(nk, nao, nao)`     | `(2, nk, nao, nao)`    |
/// | MO coefficients      | `(nao, nmo)`     | `(2, nao, nmo)`    | `(nk, nao, nmo)`     | `(2, nk, nao, nmo)`    |
/// | MO energies/occs     | `(nmo,)`         | `(2, nmo)`         | `(nk, nmo)`          | `(2, nk, nmo)`         |
/// | overlap, core Ham.   | `(nao, nao)`     | `(nao, nao)`       | `(nk, nao, nao)`     | `(nk, nao, nao)`       |
///
/// All arrays are real. Periodic engines must therefore work in a real Bloch representation
/// (*e.g.* a gamma-point-only calculation, or $`k`$-point sets closed under time reversal with
/// Bloch functions combined into real pairs). Engines that can only produce complex
/// $`k`$-resolved data report the size of the imaginary parts they drop through
/// [`Self::discarded_imaginary_part`], and such calculations are rejected during normalisation.
pub trait Calculation: RangeSeparatedIntegrals {
    /// The type of the quadrature grid of the calculation.
    type Grid: QuadratureGrid;

    /// Returns a mutable reference to the quadrature grid of the calculation.
    fn grid_mut(&mut self) -> &mut Self::Grid;

    /// Returns the boundary conditions of the calculation.
    fn boundary(&self) -> &Boundary;

    /// Returns the density matrix built from the current orbitals and occupations.
    fn density_matrix(&self) -> ArrayD<f64>;

    /// Returns the initial-guess density matrix.
    fn initial_guess_density(&self) -> ArrayD<f64>;

    /// Returns the molecular-orbital coefficients.
    fn mo_coefficients(&self) -> ArrayD<f64>;

    /// Returns the molecular-orbital energies.
    fn mo_energies(&self) -> ArrayD<f64>;

    /// Returns the molecular-orbital occupation numbers.
    fn mo_occupations(&self) -> ArrayD<f64>;

    /// Returns the atomic-orbital overlap matrix.
    fn overlap(&self) -> ArrayD<f64>;

    /// Returns the core Hamiltonian matrix.
    fn core_hamiltonian(&self) -> ArrayD<f64>;

    /// Returns the Coulomb matrix built from the density matrix `dm`, with the same shape as
    /// `dm`.
    fn coulomb(&self, dm: ArrayViewD<f64>) -> Result<ArrayD<f64>, anyhow::Error>;

    /// Returns the effective (Coulomb plus exchange-correlation) potential built from the density
    /// matrix `dm`. Restricted engines may return a potential without a spin axis.
    fn effective_potential(&self, dm: ArrayViewD<f64>) -> Result<ArrayD<f64>, anyhow::Error>;

    /// Evaluates the basis functions and their Cartesian derivatives on a set of points.
    ///
    /// # Arguments
    ///
    /// * `coords` - The points, shape `(n_grid, 3)`.
    /// * `deriv` - The maximum derivative order.
    /// * `kpoints` - The absolute $`k`$-points for Bloch functions, or `None` for an isolated
    /// system or a gamma-point-only periodic system.
    ///
    /// # Returns
    ///
    /// Values of shape `(n_comp, n_grid, nao)` for isolated systems or
    /// `(nk, n_comp, n_grid, nao)` for periodic systems (`nk = 1` when `kpoints` is `None`). The
    /// components are ordered by derivative order, and within an order by combinations with
    /// replacement of `x`, `y`, `z` (`1; x, y, z; xx, xy, xz, yy, yz, zz; ...`).
    fn eval_ao(
        &self,
        coords: ArrayView2<f64>,
        deriv: usize,
        kpoints: Option<ArrayView2<f64>>,
    ) -> Result<ArrayD<f64>, anyhow::Error>;

    /// Evaluates the full four-index electron repulsion integrals with the engine's native
    /// integral routine.
    fn native_eri(&self) -> Result<Array4<f64>, anyhow::Error>;

    /// Returns the three-index density-fitting factors $`B_{P,ab}`$ (shape `(naux, nao, nao)`)
    /// at the given $`k`$-point such that $`(ab|cd) = \sum_P B_{P,ab} B_{P,cd}`$, or `None` if
    /// the calculation does not use density fitting.
    fn density_fitting_factors(
        &self,
        kpoint: Option<ArrayView1<f64>>,
    ) -> Result<Option<Array3<f64>>, anyhow::Error>;

    /// Returns the nuclear repulsion energy.
    fn nuclear_repulsion_energy(&self) -> f64;

    /// Returns the total energy of the calculation.
    fn total_energy(&self) -> f64;

    /// Returns the name of the basis set.
    fn basis_name(&self) -> String;

    /// Returns the spin ($`2S`$) of the system.
    fn spin(&self) -> i64;

    /// Returns the total charge of the system.
    fn charge(&self) -> i64;

    /// Returns the element symbols of the atoms.
    fn element_symbols(&self) -> Vec<String>;

    /// Returns the nuclear positions in Bohr, shape `(n_atoms, 3)`.
    fn nuclear_positions(&self) -> Array2<f64>;

    /// Returns the largest magnitude of the imaginary parts dropped when returning
    /// $`k`$-resolved quantities as real arrays. Engines with a real Bloch representation
    /// return zero.
    fn discarded_imaginary_part(&self) -> f64 {
        0.0
    }
}
