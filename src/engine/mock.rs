//! Deterministic stand-in engine used by unit tests.

use anyhow;
use ndarray::{
    Array, Array1, Array2, Array3, Array4, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Dimension,
    IxDyn,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::{Boundary, Calculation, KPointSampling, QuadratureGrid, RangeSeparatedIntegrals};

pub(crate) struct MockGrid {
    coords: Option<Array2<f64>>,
    weights: Option<Array1<f64>>,
    pending: (Array2<f64>, Array1<f64>),
    level: Option<i64>,
    pub(crate) n_builds: usize,
}

impl MockGrid {
    pub(crate) fn new(n_grid: usize, prebuilt: bool, level: Option<i64>) -> Self {
        let coords = Array2::from_shape_fn((n_grid, 3), |(g, x)| {
            0.3 * (g as f64) - 0.2 * (x as f64) + 0.05 * ((g * x) as f64)
        });
        let weights = Array1::from_shape_fn(n_grid, |g| 0.5 + 0.01 * (g as f64));
        let (built_coords, built_weights) = if prebuilt {
            (Some(coords.clone()), Some(weights.clone()))
        } else {
            (None, None)
        };
        Self {
            coords: built_coords,
            weights: built_weights,
            pending: (coords, weights),
            level,
            n_builds: 0,
        }
    }
}

impl QuadratureGrid for MockGrid {
    fn coords(&self) -> Option<ArrayView2<'_, f64>> {
        self.coords.as_ref().map(|c| c.view())
    }

    fn weights(&self) -> Option<ArrayView1<'_, f64>> {
        self.weights.as_ref().map(|w| w.view())
    }

    fn build(&mut self) -> Result<(), anyhow::Error> {
        self.coords = Some(self.pending.0.clone());
        self.weights = Some(self.pending.1.clone());
        self.n_builds += 1;
        Ok(())
    }

    fn level(&self) -> Option<i64> {
        self.level
    }
}

pub(crate) struct MockCalculation {
    pub(crate) grid: MockGrid,
    boundary: Boundary,
    dm: ArrayD<f64>,
    guess: ArrayD<f64>,
    mo_coeff: ArrayD<f64>,
    mo_energy: ArrayD<f64>,
    mo_occ: ArrayD<f64>,
    s1e: ArrayD<f64>,
    h1e: ArrayD<f64>,
    nao: usize,
    density_fitted: bool,
    imaginary_part: f64,
}

fn random_array(shape: &[usize], rng: &mut StdRng) -> ArrayD<f64> {
    ArrayD::from_shape_fn(IxDyn(shape), |_| rng.gen_range(-1.0..1.0))
}

impl MockCalculation {
    /// Builds a mock calculation.
    ///
    /// `nk = None` gives an isolated system; `nk = Some(1)` a gamma-point-only periodic system.
    pub(crate) fn new(restricted: bool, nk: Option<usize>, nao: usize, n_grid: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(7);
        let nmo = nao;
        let (boundary, lead) = match nk {
            None => (Boundary::Open, vec![]),
            Some(nk) => {
                let kpts = Array2::from_shape_fn((nk, 3), |(k, x)| {
                    if x == 0 {
                        0.25 * k as f64
                    } else {
                        0.0
                    }
                });
                (
                    Boundary::Periodic {
                        lattice_vectors: Array2::from_diag(&Array1::from_elem(3, 4.0)),
                        kpoints: KPointSampling::Explicit(kpts),
                    },
                    vec![nk],
                )
            }
        };
        let spin = if restricted { vec![] } else { vec![2] };
        let shape = |tail: &[usize]| {
            spin.iter()
                .chain(lead.iter())
                .chain(tail.iter())
                .cloned()
                .collect::<Vec<_>>()
        };
        let spinless = |tail: &[usize]| lead.iter().chain(tail.iter()).cloned().collect::<Vec<_>>();

        let dm = random_array(&shape(&[nao, nao]), &mut rng);
        let guess = random_array(&shape(&[nao, nao]), &mut rng);
        let mo_coeff = random_array(&shape(&[nao, nmo]), &mut rng);
        let mo_energy = random_array(&shape(&[nmo]), &mut rng);
        let mo_occ = ArrayD::from_shape_fn(IxDyn(&shape(&[nmo])), |idx| {
            if idx[idx.ndim() - 1] == 0 {
                if restricted {
                    2.0
                } else {
                    1.0
                }
            } else {
                0.0
            }
        });
        let s1e = random_array(&spinless(&[nao, nao]), &mut rng);
        let h1e = random_array(&spinless(&[nao, nao]), &mut rng);
        Self {
            grid: MockGrid::new(n_grid, false, Some(2)),
            boundary,
            dm,
            guess,
            mo_coeff,
            mo_energy,
            mo_occ,
            s1e,
            h1e,
            nao,
            density_fitted: nk.is_some(),
            imaginary_part: 0.0,
        }
    }

    pub(crate) fn with_density_matrix(mut self, dm: ArrayD<f64>) -> Self {
        self.dm = dm;
        self
    }

    pub(crate) fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub(crate) fn with_density_fitting(mut self, density_fitted: bool) -> Self {
        self.density_fitted = density_fitted;
        self
    }

    pub(crate) fn with_discarded_imaginary_part(mut self, imaginary_part: f64) -> Self {
        self.imaginary_part = imaginary_part;
        self
    }

    /// The effective potential used by the mock: an affine map of the density matrix, so that
    /// the Fock matrix can be reproduced in tests from its two inputs alone.
    pub(crate) fn mock_veff(dm: ArrayViewD<f64>) -> ArrayD<f64> {
        dm.mapv(|x| 0.25 * x + 0.1)
    }
}

impl RangeSeparatedIntegrals for MockCalculation {
    fn range_separated_integrals(
        &self,
        points: ArrayView2<f64>,
        omega: f64,
    ) -> Result<Array3<f64>, anyhow::Error> {
        Ok(mock_nu(points, omega, self.nao))
    }
}

/// Smooth point-dependent stand-in for range-separated potential integrals.
pub(crate) fn mock_nu(points: ArrayView2<f64>, omega: f64, nao: usize) -> Array3<f64> {
    Array3::from_shape_fn((points.nrows(), nao, nao), |(g, d, a)| {
        let r2 = points.row(g).dot(&points.row(g));
        let diag = if d == a { 0.01 * points[(g, 0)] } else { 0.0 };
        (-omega * r2).exp() / (1.0 + (d + a) as f64) + diag
    })
}

impl Calculation for MockCalculation {
    type Grid = MockGrid;

    fn grid_mut(&mut self) -> &mut Self::Grid {
        &mut self.grid
    }

    fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    fn density_matrix(&self) -> ArrayD<f64> {
        self.dm.clone()
    }

    fn initial_guess_density(&self) -> ArrayD<f64> {
        self.guess.clone()
    }

    fn mo_coefficients(&self) -> ArrayD<f64> {
        self.mo_coeff.clone()
    }

    fn mo_energies(&self) -> ArrayD<f64> {
        self.mo_energy.clone()
    }

    fn mo_occupations(&self) -> ArrayD<f64> {
        self.mo_occ.clone()
    }

    fn overlap(&self) -> ArrayD<f64> {
        self.s1e.clone()
    }

    fn core_hamiltonian(&self) -> ArrayD<f64> {
        self.h1e.clone()
    }

    fn coulomb(&self, dm: ArrayViewD<f64>) -> Result<ArrayD<f64>, anyhow::Error> {
        Ok(dm.mapv(|x| 0.5 * x))
    }

    fn effective_potential(&self, dm: ArrayViewD<f64>) -> Result<ArrayD<f64>, anyhow::Error> {
        Ok(Self::mock_veff(dm))
    }

    fn eval_ao(
        &self,
        coords: ArrayView2<f64>,
        deriv: usize,
        kpoints: Option<ArrayView2<f64>>,
    ) -> Result<ArrayD<f64>, anyhow::Error> {
        let ncomp = (0..=deriv).map(|n| (n + 1) * (n + 2) / 2).sum::<usize>();
        let n_grid = coords.nrows();
        let nao = self.nao;
        let value = |k: usize, c: usize, g: usize, a: usize| {
            (1.0 + k as f64) * (c as f64 + 1.0) * (a as f64 + 1.0) * (1.0 + coords[(g, 0)])
                + coords[(g, 1)]
        };
        let arr = if self.boundary.is_periodic() {
            let nk = kpoints.map(|kpts| kpts.nrows()).unwrap_or(1);
            Array::from_shape_fn((nk, ncomp, n_grid, nao), |(k, c, g, a)| value(k, c, g, a))
                .into_dyn()
        } else {
            Array::from_shape_fn((ncomp, n_grid, nao), |(c, g, a)| value(0, c, g, a)).into_dyn()
        };
        Ok(arr)
    }

    fn native_eri(&self) -> Result<Array4<f64>, anyhow::Error> {
        let nao = self.nao;
        Ok(Array4::from_shape_fn((nao, nao, nao, nao), |(a, b, c, d)| {
            1.0 / (1.0 + (a + b + c + d) as f64)
        }))
    }

    fn density_fitting_factors(
        &self,
        kpoint: Option<ArrayView1<f64>>,
    ) -> Result<Option<Array3<f64>>, anyhow::Error> {
        if !self.density_fitted {
            return Ok(None);
        }
        let shift = kpoint.map(|k| k[0]).unwrap_or(0.0);
        let nao = self.nao;
        Ok(Some(Array3::from_shape_fn((3, nao, nao), |(p, a, b)| {
            0.1 * (p as f64 + 1.0) * ((a + b) as f64 + 1.0) + shift
        })))
    }

    fn nuclear_repulsion_energy(&self) -> f64 {
        0.7
    }

    fn total_energy(&self) -> f64 {
        -1.1
    }

    fn basis_name(&self) -> String {
        "sto-3g".to_string()
    }

    fn spin(&self) -> i64 {
        0
    }

    fn charge(&self) -> i64 {
        0
    }

    fn element_symbols(&self) -> Vec<String> {
        vec!["H".to_string(), "H".to_string()]
    }

    fn nuclear_positions(&self) -> Array2<f64> {
        ndarray::array![[0.0, 0.0, 0.0], [0.0, 0.0, 1.4]]
    }

    fn discarded_imaginary_part(&self) -> f64 {
        self.imaginary_part
    }
}
