//! Range-separated exact-exchange feature tensors.
//!
//! For a density matrix $`\mathbf{D}^{\sigma}`$, basis functions $`\phi_b`$ and a range-separation
//! parameter $`\omega`$, the feature tensor is
//!
//! ```math
//! \chi^{\sigma}_{a}(\mathbf{r}; \omega) = \sum_{bd} D^{\sigma}_{bd}\, \phi_b(\mathbf{r})\,
//!     \nu_{da}(\mathbf{r}; \omega),
//! ```
//!
//! where $`\nu_{da}`$ are the range-separated potential integrals provided by the engine. The
//! grid is processed in contiguous chunks to bound the memory taken up by $`\nu`$.
//!
//! For records with an explicit $`k`$-point axis, the contraction is carried out separately at
//! every $`k`$-point with the same $`\nu`$, giving an extra $`k`$-point axis after the spin axis.

use std::fmt;
use std::ops::Range;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use log;
use ndarray::{
    concatenate, s, stack, Array3, Array4, Array5, ArrayD, ArrayView2, ArrayView3, ArrayView4,
    Axis, Ix4, Ix5, LinalgScalar,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::RangeSeparatedIntegrals;
use crate::io::format::nice_bool;
use crate::normalisation::NormalisationParams;

#[cfg(test)]
#[path = "features_tests.rs"]
mod features_tests;

// ================
// Enum definitions
// ================

/// Enumerated type for the floating-point precision of the feature contraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractionPrecision {
    /// Variant for double-precision contraction.
    #[default]
    Highest,

    /// Variant for single-precision contraction. Inputs are rounded to `f32` before contraction
    /// and the result is widened back to `f64`.
    Reduced,
}

impl fmt::Display for ContractionPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Highest => write!(f, "highest (f64)"),
            Self::Reduced => write!(f, "reduced (f32)"),
        }
    }
}

// ==================
// Struct definitions
// ==================

/// Structure to generate exchange feature tensors in chunks of grid points.
#[derive(Builder, Clone, Debug)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct FeatureTensorGenerator {
    /// The maximum number of grid points per chunk.
    #[builder(default = "1024")]
    chunk_size: usize,

    /// The floating-point precision of the contraction.
    #[builder(default = "ContractionPrecision::Highest")]
    precision: ContractionPrecision,

    /// Boolean indicating if chunks are to be contracted in parallel.
    #[builder(default = "false")]
    parallel: bool,
}

impl FeatureTensorGeneratorBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.chunk_size {
            Some(0) => Err("Chunk size must be positive.".to_string()),
            _ => Ok(()),
        }
    }
}

impl FeatureTensorGenerator {
    /// Returns a builder to construct a new [`FeatureTensorGenerator`].
    pub fn builder() -> FeatureTensorGeneratorBuilder {
        FeatureTensorGeneratorBuilder::default()
    }

    /// Constructs a generator.
    ///
    /// # Errors
    ///
    /// Errors if `chunk_size` is zero.
    pub fn new(
        chunk_size: usize,
        precision: ContractionPrecision,
        parallel: bool,
    ) -> Result<Self, anyhow::Error> {
        Self::builder()
            .chunk_size(chunk_size)
            .precision(precision)
            .parallel(parallel)
            .build()
            .map_err(|err| format_err!(err))
    }

    /// Constructs a generator with the chunking settings of a set of normalisation parameters.
    pub fn from_params(params: &NormalisationParams) -> Result<Self, anyhow::Error> {
        Self::new(params.chunk_size, params.precision, params.parallel)
    }

    /// Returns the maximum number of grid points per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the contraction precision.
    pub fn precision(&self) -> ContractionPrecision {
        self.precision
    }

    /// Returns `true` if chunks are contracted in parallel.
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    /// Computes the exchange feature tensor.
    ///
    /// # Arguments
    ///
    /// * `rdm1` - The spin-resolved density matrix, shape `(n_spin, nao, nao)`.
    /// * `ao` - The basis-function values on the grid, shape `(n_grid, nao)`.
    /// * `coords` - The grid points, shape `(n_grid, 3)`.
    /// * `kernel` - The provider of range-separated potential integrals.
    /// * `omegas` - The range-separation parameters.
    ///
    /// # Returns
    ///
    /// The feature tensor with shape `(n_grid, n_omega, n_spin, nao)`. The ordering along the
    /// second axis follows `omegas`; an empty `omegas` gives an empty second axis.
    ///
    /// # Errors
    ///
    /// Errors if the shapes of the inputs are inconsistent, or if the kernel fails or returns
    /// integrals of an unexpected shape.
    pub fn generate<K>(
        &self,
        rdm1: ArrayView3<f64>,
        ao: ArrayView2<f64>,
        coords: ArrayView2<f64>,
        kernel: &K,
        omegas: &[f64],
    ) -> Result<Array4<f64>, anyhow::Error>
    where
        K: RangeSeparatedIntegrals + Sync + ?Sized,
    {
        let (n_spin, nao, nao_2) = rdm1.dim();
        let n_grid = ao.nrows();
        ensure!(
            nao == nao_2 && ao.ncols() == nao,
            "Inconsistent basis sizes: density matrix {:?}, basis-function values {:?}.",
            rdm1.shape(),
            ao.shape()
        );
        ensure!(
            coords.nrows() == n_grid && coords.ncols() == 3,
            "Grid points of shape {:?} do not match basis-function values on {n_grid} points.",
            coords.shape()
        );

        if omegas.is_empty() || n_grid == 0 {
            return Ok(Array4::zeros((n_grid, omegas.len(), n_spin, nao)));
        }

        let chi = self.generate_chunked(n_grid, nao, coords, kernel, omegas, |nu, range| {
            let ao_chunk = ao.slice(s![range, ..]);
            Ok(self.contract(rdm1, ao_chunk, nu).into_dyn())
        })?;
        chi.into_dimensionality::<Ix4>().map_err(|err| format_err!(err))
    }

    /// Computes the exchange feature tensor of a record with an explicit $`k`$-point axis.
    ///
    /// The contraction of [`Self::generate`] is applied to the density matrix and basis-function
    /// values of every $`k`$-point, with range-separated integrals shared by all $`k`$-points.
    ///
    /// # Arguments
    ///
    /// * `rdm1` - The spin-resolved density matrix, shape `(n_spin, nk, nao, nao)`.
    /// * `ao` - The basis-function values on the grid, shape `(nk, n_grid, nao)`.
    /// * `coords` - The grid points, shape `(n_grid, 3)`.
    /// * `kernel` - The provider of range-separated potential integrals.
    /// * `omegas` - The range-separation parameters.
    ///
    /// # Returns
    ///
    /// The feature tensor with shape `(n_grid, n_omega, n_spin, nk, nao)`.
    ///
    /// # Errors
    ///
    /// Errors if the shapes of the inputs are inconsistent, or if the kernel fails or returns
    /// integrals of an unexpected shape.
    pub fn generate_kresolved<K>(
        &self,
        rdm1: ArrayView4<f64>,
        ao: ArrayView3<f64>,
        coords: ArrayView2<f64>,
        kernel: &K,
        omegas: &[f64],
    ) -> Result<Array5<f64>, anyhow::Error>
    where
        K: RangeSeparatedIntegrals + Sync + ?Sized,
    {
        let (n_spin, nk, nao, nao_2) = rdm1.dim();
        let (nk_ao, n_grid, nao_ao) = ao.dim();
        ensure!(
            nao == nao_2 && nao_ao == nao && nk_ao == nk,
            "Inconsistent k-resolved shapes: density matrix {:?}, basis-function values {:?}.",
            rdm1.shape(),
            ao.shape()
        );
        ensure!(
            coords.nrows() == n_grid && coords.ncols() == 3,
            "Grid points of shape {:?} do not match basis-function values on {n_grid} points.",
            coords.shape()
        );

        if omegas.is_empty() || n_grid == 0 || nk == 0 {
            return Ok(Array5::zeros((n_grid, omegas.len(), n_spin, nk, nao)));
        }

        let chi = self.generate_chunked(n_grid, nao, coords, kernel, omegas, |nu, range| {
            let per_k = (0..nk)
                .map(|k| {
                    let ao_chunk = ao.slice(s![k, range.clone(), ..]);
                    self.contract(rdm1.index_axis(Axis(1), k), ao_chunk, nu)
                })
                .collect::<Vec<_>>();
            let views = per_k.iter().map(|chi_k| chi_k.view()).collect::<Vec<_>>();
            stack(Axis(2), &views)
                .map(|chi| chi.into_dyn())
                .map_err(|err| format_err!(err))
        })?;
        chi.into_dimensionality::<Ix5>().map_err(|err| format_err!(err))
    }

    /// Runs a chunk contraction over the grid for every range-separation parameter.
    ///
    /// `contract` maps the integrals of one chunk and its range of grid points to a tensor whose
    /// leading axis runs over the points of the chunk. Chunk results are concatenated along the
    /// grid axis, and the results of the different parameters are stacked along a new axis 1.
    fn generate_chunked<K, F>(
        &self,
        n_grid: usize,
        nao: usize,
        coords: ArrayView2<f64>,
        kernel: &K,
        omegas: &[f64],
        contract: F,
    ) -> Result<ArrayD<f64>, anyhow::Error>
    where
        K: RangeSeparatedIntegrals + Sync + ?Sized,
        F: Fn(ArrayView3<f64>, Range<usize>) -> Result<ArrayD<f64>, anyhow::Error> + Sync,
    {
        let ranges = (0..n_grid)
            .step_by(self.chunk_size)
            .map(|start| start..(start + self.chunk_size).min(n_grid))
            .collect::<Vec<_>>();
        log::debug!(
            "Contracting exchange features over {} chunk(s) of at most {} grid points.",
            ranges.len(),
            self.chunk_size
        );

        let chis = omegas
            .iter()
            .map(|&omega| {
                let run = |range: Range<usize>| -> Result<ArrayD<f64>, anyhow::Error> {
                    let nu = self.chunk_integrals(coords, kernel, omega, nao, range.clone())?;
                    contract(nu.view(), range)
                };
                let chunks = if self.parallel {
                    ranges
                        .par_iter()
                        .cloned()
                        .map(run)
                        .collect::<Result<Vec<_>, _>>()?
                } else {
                    ranges
                        .iter()
                        .cloned()
                        .map(run)
                        .collect::<Result<Vec<_>, _>>()?
                };
                let views = chunks.iter().map(|chunk| chunk.view()).collect::<Vec<_>>();
                concatenate(Axis(0), &views).map_err(|err| format_err!(err))
            })
            .collect::<Result<Vec<_>, anyhow::Error>>()?;
        let views = chis.iter().map(|chi| chi.view()).collect::<Vec<_>>();
        stack(Axis(1), &views).map_err(|err| format_err!(err))
    }

    /// Evaluates the range-separated integrals of one chunk of grid points.
    fn chunk_integrals<K>(
        &self,
        coords: ArrayView2<f64>,
        kernel: &K,
        omega: f64,
        nao: usize,
        range: Range<usize>,
    ) -> Result<Array3<f64>, anyhow::Error>
    where
        K: RangeSeparatedIntegrals + ?Sized,
    {
        let n_points = range.len();
        log::debug!("ω = {omega:.4}: grid points {}..{}", range.start, range.end);
        let nu = kernel.range_separated_integrals(coords.slice(s![range, ..]), omega)?;
        ensure!(
            nu.dim() == (n_points, nao, nao),
            "Range-separated integrals have shape {:?}, but {:?} expected.",
            nu.shape(),
            (n_points, nao, nao)
        );
        Ok(nu)
    }

    /// Contracts one chunk at the configured precision.
    fn contract(
        &self,
        rdm1: ArrayView3<f64>,
        ao_chunk: ArrayView2<f64>,
        nu: ArrayView3<f64>,
    ) -> Array3<f64> {
        match self.precision {
            ContractionPrecision::Highest => contract_chunk(rdm1, ao_chunk, nu),
            ContractionPrecision::Reduced => contract_chunk(
                rdm1.mapv(|x| x as f32).view(),
                ao_chunk.mapv(|x| x as f32).view(),
                nu.mapv(|x| x as f32).view(),
            )
            .mapv(f64::from),
        }
    }
}

impl fmt::Display for FeatureTensorGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FeatureTensorGenerator (chunk size {}, precision {}, parallel: {})",
            self.chunk_size,
            self.precision,
            nice_bool(self.parallel)
        )
    }
}

// =========
// Functions
// =========

/// Evaluates $`\chi_{gsa} = \sum_{bd} D_{sbd}\, \phi_{gb}\, \nu_{gda}`$ for one chunk.
fn contract_chunk<A: LinalgScalar>(
    rdm1: ArrayView3<A>,
    ao: ArrayView2<A>,
    nu: ArrayView3<A>,
) -> Array3<A> {
    let (n_points, _, nao) = nu.dim();
    let mut chi = Array3::zeros((n_points, rdm1.len_of(Axis(0)), nao));
    for (ispin, dm) in rdm1.outer_iter().enumerate() {
        // Density matrix applied to the basis functions at each point.
        let ao_dm = ao.dot(&dm);
        for (g, (ao_dm_g, nu_g)) in ao_dm.outer_iter().zip(nu.outer_iter()).enumerate() {
            chi.slice_mut(s![g, ispin, ..]).assign(&ao_dm_g.dot(&nu_g));
        }
    }
    chi
}
