//! Records of periodic systems sampling the full Brillouin zone.

use std::fmt;
use std::ops::Deref;

use anyhow::{self, ensure, format_err};
use log;
use ndarray::{Array2, Axis, Ix3, Ix4};

use crate::engine::{Calculation, QuadratureGrid, RangeSeparatedIntegrals};
use crate::errors::XcFeatError;
use crate::features::FeatureTensorGenerator;
use crate::grid::Grid;
use crate::io::format::{
    log_macsec_begin, log_macsec_end, log_subtitle, xcfeat_output, XcFeatOutput,
};
use crate::normalisation::{normalise, NormalisationParams};
use crate::records::kpoints::KPointInfo;
use crate::records::system::SystemData;

/// Structure for the record of a periodic system with an explicit $`k`$-point axis.
///
/// Shapes: `ao` `(nk, n_grid, nao)`; `grad_ao` and every `grad_n_ao` entry
/// `(nk, n_grid, nao, 3)`; `rdm1`, `vj`, `fock` `(2, nk, nao, nao)`; `h1e`, `s1e`
/// `(nk, nao, nao)`; `mo_coeff` `(2, nk, nao, nmo)`; `mo_energy`, `mo_occ` `(2, nk, nmo)`;
/// `rep_tensor` `(nk, nk, nao, nao, nao, nao)`; `chi` `(n_grid, n_omega, 2, nk, nao)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Solid {
    data: SystemData,

    /// The lattice vectors as rows, in Bohr.
    lattice_vectors: Array2<f64>,

    /// The Brillouin-zone sampling.
    kpt_info: KPointInfo,
}

impl Solid {
    /// Assembles a solid record.
    ///
    /// # Errors
    ///
    /// Errors if the arrays of `data` do not carry a $`k`$-point axis consistent with `kpt_info`,
    /// or if the lattice vectors do not form a $`3 \times 3`$ matrix.
    pub fn new(
        data: SystemData,
        lattice_vectors: Array2<f64>,
        kpt_info: KPointInfo,
    ) -> Result<Self, anyhow::Error> {
        let nk = kpt_info.n_kpoints();
        ensure!(
            lattice_vectors.dim() == (3, 3),
            "Lattice vectors must form a 3 × 3 matrix, but {:?} found.",
            lattice_vectors.dim()
        );
        ensure!(
            data.ao().ndim() == 3 && data.ao().len_of(Axis(0)) == nk,
            "Basis-function values of shape {:?} do not span {nk} k-point(s).",
            data.ao().shape()
        );
        ensure!(
            data.rdm1().ndim() == 4 && data.rdm1().len_of(Axis(1)) == nk,
            "Periodic density matrix must have shape (2, {nk}, nao, nao), but {:?} found.",
            data.rdm1().shape()
        );
        ensure!(
            data.rep_tensor().ndim() == 6,
            "Periodic repulsion tensor must have six indices, but {:?} found.",
            data.rep_tensor().shape()
        );
        if let Some(chi) = data.chi() {
            ensure!(
                chi.ndim() == 5 && chi.len_of(Axis(3)) == nk,
                "Periodic feature tensor must have shape (n_grid, n_omega, 2, {nk}, nao), \
                but {:?} found.",
                chi.shape()
            );
        }
        Ok(Self {
            data,
            lattice_vectors,
            kpt_info,
        })
    }

    /// Builds a solid record from an engine calculation sampling the full Brillouin zone.
    ///
    /// When `params.omegas` is set, the exchange feature tensor is computed at every
    /// $`k`$-point.
    ///
    /// # Arguments
    ///
    /// * `calc` - The engine calculation.
    /// * `params` - The normalisation parameters.
    /// * `energy` - The reference energy of the system, if known.
    /// * `name` - An optional name for the system.
    ///
    /// # Errors
    ///
    /// Errors with [`XcFeatError::UnsupportedLayout`] for isolated or gamma-point-only
    /// calculations. Normalisation and engine failures are propagated.
    pub fn from_calculation<C>(
        calc: &mut C,
        params: &NormalisationParams,
        energy: Option<f64>,
        name: Option<&str>,
    ) -> Result<Self, anyhow::Error>
    where
        C: Calculation + Sync + ?Sized,
    {
        log_macsec_begin("Solid record");
        xcfeat_output!("");
        log_subtitle("Normalisation parameters");
        xcfeat_output!("");
        params.log_output_display();
        xcfeat_output!("");
        let grid = Grid::from_engine(calc.grid_mut())?;
        let grid_level = calc.grid_mut().level();
        let mut canonical = normalise(&*calc, &grid, params)?;
        if !canonical.layout.is_full_bz() {
            return Err(XcFeatError::UnsupportedLayout(format!(
                "{} results must be stored as molecule records",
                canonical.layout
            ))
            .into());
        }
        let lattice_vectors = canonical
            .lattice_vectors
            .take()
            .ok_or_else(|| format_err!("Periodic calculation without lattice vectors."))?;
        let kpt_info = canonical
            .kpt_info
            .take()
            .ok_or_else(|| format_err!("Full Brillouin-zone calculation without k-points."))?;
        xcfeat_output!("Layout: {}", canonical.layout);
        xcfeat_output!("k-points: {}", kpt_info.n_kpoints());
        xcfeat_output!("Grid points: {}", grid.n_points());

        let data =
            SystemData::from_canonical(&*calc, grid, grid_level, canonical, params, energy, name)?;
        let solid = Self::new(data, lattice_vectors, kpt_info)?;
        let solid = match params.omegas.as_ref() {
            Some(omegas) => {
                let generator = FeatureTensorGenerator::from_params(params)?;
                solid.with_features(&*calc, &generator, omegas)?
            }
            None => solid,
        };
        xcfeat_output!("");
        log_macsec_end("Solid record");
        xcfeat_output!("");
        Ok(solid)
    }

    /// Returns a new record carrying freshly computed $`k`$-resolved exchange features.
    ///
    /// # Arguments
    ///
    /// * `kernel` - The provider of range-separated potential integrals for this system.
    /// * `generator` - The feature tensor generator.
    /// * `omegas` - The range-separation parameters.
    pub fn with_features<K>(
        &self,
        kernel: &K,
        generator: &FeatureTensorGenerator,
        omegas: &[f64],
    ) -> Result<Self, anyhow::Error>
    where
        K: RangeSeparatedIntegrals + Sync + ?Sized,
    {
        log::debug!(
            "Computing exchange features for {} omega(s) at {} k-point(s).",
            omegas.len(),
            self.kpt_info.n_kpoints()
        );
        let rdm1 = self.rdm1().view().into_dimensionality::<Ix4>()?;
        let ao = self.ao().view().into_dimensionality::<Ix3>()?;
        let chi =
            generator.generate_kresolved(rdm1, ao, self.grid().coords().view(), kernel, omegas)?;
        Ok(Self {
            data: self
                .data
                .with_chi(Some(omegas.to_vec()), Some(chi.into_dyn())),
            lattice_vectors: self.lattice_vectors.clone(),
            kpt_info: self.kpt_info.clone(),
        })
    }

    /// Returns the system data of the record.
    pub fn data(&self) -> &SystemData {
        &self.data
    }

    /// Returns the lattice vectors.
    pub fn lattice_vectors(&self) -> &Array2<f64> {
        &self.lattice_vectors
    }

    /// Returns the Brillouin-zone sampling.
    pub fn kpt_info(&self) -> &KPointInfo {
        &self.kpt_info
    }

    /// Returns the number of electrons per unit cell, averaging occupations over $`k`$-points
    /// with their weights.
    pub fn n_electrons(&self) -> f64 {
        let weights = self.kpt_info.weights();
        self.mo_occ()
            .axis_iter(Axis(0))
            .map(|occ_spin| {
                occ_spin
                    .axis_iter(Axis(0))
                    .zip(weights.iter())
                    .map(|(occ_k, w)| w * occ_k.sum())
                    .sum::<f64>()
            })
            .sum()
    }
}

impl Deref for Solid {
    type Target = SystemData;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl fmt::Display for Solid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Solid{} ({} atom(s), basis {}, {} k-point(s), {} grid point(s))",
            self.name().map(|n| format!(" `{n}`")).unwrap_or_default(),
            self.atom_index().len(),
            self.basis(),
            self.kpt_info.n_kpoints(),
            self.n_grid()
        )
    }
}
