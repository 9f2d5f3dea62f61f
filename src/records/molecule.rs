//! Records of isolated and gamma-point-only systems.

use std::fmt;
use std::ops::Deref;

use anyhow::{self, ensure, format_err};
use log;
use ndarray::{Array2, Axis, Ix2, Ix3};

use crate::engine::{Calculation, QuadratureGrid, RangeSeparatedIntegrals};
use crate::errors::XcFeatError;
use crate::features::FeatureTensorGenerator;
use crate::grid::Grid;
use crate::io::format::{
    log_macsec_begin, log_macsec_end, log_subtitle, xcfeat_output, XcFeatOutput,
};
use crate::normalisation::{normalise, NormalisationParams};
use crate::records::system::SystemData;

/// Structure for the record of a system without explicit $`k`$-point sampling.
///
/// Shapes: `ao` `(n_grid, nao)`; `grad_ao` and every `grad_n_ao` entry `(n_grid, nao, 3)`;
/// `rdm1`, `vj`, `fock` `(2, nao, nao)`; `h1e`, `s1e` `(nao, nao)`; `mo_coeff`
/// `(2, nao, nmo)`; `mo_energy`, `mo_occ` `(2, nmo)`; `rep_tensor` `(nao, nao, nao, nao)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Molecule {
    data: SystemData,
}

impl Molecule {
    /// Wraps system data as a molecule record.
    ///
    /// # Errors
    ///
    /// Errors if any array carries a $`k`$-point axis.
    pub fn new(data: SystemData) -> Result<Self, anyhow::Error> {
        let n_grid = data.n_grid();
        ensure!(
            data.ao().ndim() == 2 && data.ao().len_of(Axis(0)) == n_grid,
            "Basis-function values of shape {:?} do not match a molecular grid of {n_grid} points.",
            data.ao().shape()
        );
        ensure!(
            data.rdm1().ndim() == 3,
            "Molecular density matrix must have shape (2, nao, nao), but {:?} found.",
            data.rdm1().shape()
        );
        ensure!(
            data.rep_tensor().ndim() == 4,
            "Molecular repulsion tensor must have four indices, but {:?} found.",
            data.rep_tensor().shape()
        );
        if let Some(chi) = data.chi() {
            ensure!(
                chi.ndim() == 4,
                "Molecular feature tensor must have shape (n_grid, n_omega, 2, nao), but {:?} found.",
                chi.shape()
            );
        }
        Ok(Self { data })
    }

    /// Builds a molecule record from an engine calculation.
    ///
    /// The calculation grid is built if necessary. When `params.omegas` is set, the exchange
    /// feature tensor is computed as well.
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
    /// Errors with [`XcFeatError::UnsupportedLayout`] for calculations sampling more than the
    /// gamma point. Normalisation and engine failures are propagated.
    pub fn from_calculation<C>(
        calc: &mut C,
        params: &NormalisationParams,
        energy: Option<f64>,
        name: Option<&str>,
    ) -> Result<Self, anyhow::Error>
    where
        C: Calculation + Sync + ?Sized,
    {
        log_macsec_begin("Molecule record");
        xcfeat_output!("");
        log_subtitle("Normalisation parameters");
        xcfeat_output!("");
        params.log_output_display();
        xcfeat_output!("");
        let grid = Grid::from_engine(calc.grid_mut())?;
        let grid_level = calc.grid_mut().level();
        let canonical = normalise(&*calc, &grid, params)?;
        if canonical.layout.is_full_bz() {
            return Err(XcFeatError::UnsupportedLayout(
                "k-point sampling beyond the gamma point requires a solid record".to_string(),
            )
            .into());
        }
        xcfeat_output!("Layout: {}", canonical.layout);
        xcfeat_output!("Grid points: {}", grid.n_points());

        let data =
            SystemData::from_canonical(&*calc, grid, grid_level, canonical, params, energy, name)?;
        let molecule = Self::new(data)?;
        let molecule = match params.omegas.as_ref() {
            Some(omegas) => {
                let generator = FeatureTensorGenerator::from_params(params)?;
                molecule.with_features(&*calc, &generator, omegas)?
            }
            None => molecule,
        };
        xcfeat_output!("");
        log_macsec_end("Molecule record");
        xcfeat_output!("");
        Ok(molecule)
    }

    /// Returns a new record carrying freshly computed exchange features.
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
        log::debug!("Computing exchange features for {} omega(s).", omegas.len());
        let rdm1 = self.rdm1().view().into_dimensionality::<Ix3>()?;
        let ao = self.ao().view().into_dimensionality::<Ix2>()?;
        let chi = generator.generate(rdm1, ao, self.grid().coords().view(), kernel, omegas)?;
        Ok(Self {
            data: self
                .data
                .with_chi(Some(omegas.to_vec()), Some(chi.into_dyn())),
        })
    }

    /// Returns the system data of the record.
    pub fn data(&self) -> &SystemData {
        &self.data
    }

    /// Returns the total number of electrons.
    pub fn n_electrons(&self) -> f64 {
        self.mo_occ().sum()
    }

    /// Returns the numbers of alpha and beta electrons.
    pub fn n_electrons_by_spin(&self) -> (f64, f64) {
        let occ = self.mo_occ();
        (
            occ.index_axis(Axis(0), 0).sum(),
            occ.index_axis(Axis(0), 1).sum(),
        )
    }

    /// Returns the spin densities on the grid,
    /// $`\rho_\sigma(\mathbf{r}) = \sum_{ab} \phi_a(\mathbf{r}) D^\sigma_{ab} \phi_b(\mathbf{r})`$,
    /// with shape `(n_grid, 2)`.
    pub fn density(&self) -> Result<Array2<f64>, anyhow::Error> {
        let rdm1 = self.rdm1().view().into_dimensionality::<Ix3>()?;
        let ao = self.ao().view().into_dimensionality::<Ix2>()?;
        let mut rho = Array2::zeros((ao.nrows(), 2));
        for (ispin, dm) in rdm1.outer_iter().enumerate() {
            let ao_dm = ao.dot(&dm);
            rho.column_mut(ispin)
                .assign(&(&ao_dm * &ao).sum_axis(Axis(1)));
        }
        Ok(rho)
    }

    /// Integrates the spin densities over the grid.
    pub fn integrated_density(&self) -> Result<f64, anyhow::Error> {
        let rho = self.density()?.sum_axis(Axis(1));
        Ok(self.grid().integrate(&rho))
    }
}

impl Deref for Molecule {
    type Target = SystemData;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl TryFrom<SystemData> for Molecule {
    type Error = anyhow::Error;

    fn try_from(data: SystemData) -> Result<Self, Self::Error> {
        Self::new(data).map_err(|err| format_err!("Invalid molecule record: {err}"))
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Molecule{} ({} atom(s), basis {}, {} basis function(s), {} grid point(s))",
            self.name().map(|n| format!(" `{n}`")).unwrap_or_default(),
            self.atom_index().len(),
            self.basis(),
            self.nao(),
            self.n_grid()
        )
    }
}
