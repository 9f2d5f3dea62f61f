//! Brillouin-zone sampling information of periodic records.

use std::f64::consts::PI;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use ndarray::{Array1, Array2, ArrayView2};

/// Structure holding the $`k`$-points of a periodic calculation.
///
/// Scaled $`k`$-points are fractional coordinates with respect to the reciprocal lattice,
/// $`\mathbf{k}_{\mathrm{scaled}} = \mathbf{k}_{\mathrm{abs}} \mathbf{A}^{\mathsf{T}} / 2\pi`$,
/// where the rows of $`\mathbf{A}`$ are the lattice vectors.
#[derive(Builder, Clone, Debug, PartialEq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct KPointInfo {
    /// Absolute $`k`$-points in the full Brillouin zone, shape `(nk, 3)`.
    kpts_abs: Array2<f64>,

    /// Scaled $`k`$-points in the full Brillouin zone, shape `(nk, 3)`.
    kpts_scaled: Array2<f64>,

    /// Integration weights of the $`k`$-points.
    weights: Array1<f64>,

    /// Map from the full Brillouin zone to the irreducible wedge.
    #[builder(default = "None")]
    bz2ibz_map: Option<Array1<i64>>,

    /// Map from the irreducible wedge to the full Brillouin zone.
    #[builder(default = "None")]
    ibz2bz_map: Option<Array1<i64>>,

    /// Absolute $`k`$-points in the irreducible wedge.
    #[builder(default = "None")]
    kpts_ir_abs: Option<Array2<f64>>,

    /// Scaled $`k`$-points in the irreducible wedge.
    #[builder(default = "None")]
    kpts_ir_scaled: Option<Array2<f64>>,
}

impl KPointInfoBuilder {
    fn validate(&self) -> Result<(), String> {
        let kpts_abs = self
            .kpts_abs
            .as_ref()
            .ok_or("No absolute k-points found.".to_string())?;
        let kpts_scaled = self
            .kpts_scaled
            .as_ref()
            .ok_or("No scaled k-points found.".to_string())?;
        let weights = self
            .weights
            .as_ref()
            .ok_or("No k-point weights found.".to_string())?;
        if kpts_abs.ncols() != 3 || kpts_abs.dim() != kpts_scaled.dim() {
            return Err(format!(
                "Mismatched k-points: absolute {:?}, scaled {:?}.",
                kpts_abs.dim(),
                kpts_scaled.dim()
            ));
        }
        let n_ir = self
            .kpts_ir_abs
            .as_ref()
            .and_then(|kpts| kpts.as_ref().map(|k| k.nrows()));
        let n_expected_weights = n_ir.unwrap_or(kpts_abs.nrows());
        if weights.len() != n_expected_weights {
            return Err(format!(
                "{} k-point weights expected, but {} found.",
                n_expected_weights,
                weights.len()
            ));
        }
        Ok(())
    }
}

impl KPointInfo {
    /// Returns a builder to construct a new [`KPointInfo`].
    pub fn builder() -> KPointInfoBuilder {
        KPointInfoBuilder::default()
    }

    /// Constructs the $`k`$-point information of an unreduced sampling with uniform weights.
    ///
    /// # Arguments
    ///
    /// * `kpts_abs` - The absolute $`k`$-points, shape `(nk, 3)`.
    /// * `lattice_vectors` - The lattice vectors as rows.
    pub fn from_explicit(
        kpts_abs: ArrayView2<f64>,
        lattice_vectors: ArrayView2<f64>,
    ) -> Result<Self, anyhow::Error> {
        let nk = kpts_abs.nrows();
        ensure!(nk > 0, "At least one k-point is required.");
        Self::builder()
            .kpts_abs(kpts_abs.to_owned())
            .kpts_scaled(scale_kpoints(kpts_abs, lattice_vectors)?)
            .weights(Array1::from_elem(nk, 1.0 / nk as f64))
            .build()
            .map_err(|err| format_err!(err))
    }

    /// Returns the absolute $`k`$-points.
    pub fn kpts_abs(&self) -> &Array2<f64> {
        &self.kpts_abs
    }

    /// Returns the scaled $`k`$-points.
    pub fn kpts_scaled(&self) -> &Array2<f64> {
        &self.kpts_scaled
    }

    /// Returns the $`k`$-point weights.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Returns the map from the full Brillouin zone to the irreducible wedge, if reduced.
    pub fn bz2ibz_map(&self) -> Option<&Array1<i64>> {
        self.bz2ibz_map.as_ref()
    }

    /// Returns the map from the irreducible wedge to the full Brillouin zone, if reduced.
    pub fn ibz2bz_map(&self) -> Option<&Array1<i64>> {
        self.ibz2bz_map.as_ref()
    }

    /// Returns the absolute irreducible $`k`$-points, if reduced.
    pub fn kpts_ir_abs(&self) -> Option<&Array2<f64>> {
        self.kpts_ir_abs.as_ref()
    }

    /// Returns the scaled irreducible $`k`$-points, if reduced.
    pub fn kpts_ir_scaled(&self) -> Option<&Array2<f64>> {
        self.kpts_ir_scaled.as_ref()
    }

    /// Returns the number of $`k`$-points in the full Brillouin zone.
    pub fn n_kpoints(&self) -> usize {
        self.kpts_abs.nrows()
    }
}

/// Converts absolute $`k`$-points into fractional coordinates of the reciprocal lattice.
fn scale_kpoints(
    kpts_abs: ArrayView2<f64>,
    lattice_vectors: ArrayView2<f64>,
) -> Result<Array2<f64>, anyhow::Error> {
    ensure!(
        lattice_vectors.dim() == (3, 3),
        "Lattice vectors must form a 3 × 3 matrix, but {:?} found.",
        lattice_vectors.dim()
    );
    Ok(kpts_abs.dot(&lattice_vectors.t()) / (2.0 * PI))
}
