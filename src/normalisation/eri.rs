//! Two-electron repulsion tensors.

use anyhow::{self, format_err};
use log;
use ndarray::{s, Array, Array1, Array2, Array3, Array4, ArrayD, ArrayView1, ArrayView2};

use crate::engine::Calculation;
use crate::errors::XcFeatError;
use crate::normalisation::layout::CalculationLayout;

/// Assembles the four-index block $`(ab|cd) = \sum_P B_{P,ab} C_{P,cd}`$ from two sets of
/// density-fitting factors.
pub(crate) fn eri_from_factors(
    bra: &Array3<f64>,
    ket: &Array3<f64>,
) -> Result<Array4<f64>, anyhow::Error> {
    let (naux, nao, _) = bra.dim();
    if ket.dim() != bra.dim() {
        return Err(format_err!(
            "Mismatched density-fitting factors: {:?} and {:?}.",
            bra.dim(),
            ket.dim()
        ));
    }
    let lhs = Array2::from_shape_vec((naux, nao * nao), bra.iter().cloned().collect())?;
    let rhs = Array2::from_shape_vec((naux, nao * nao), ket.iter().cloned().collect())?;
    let eri = lhs.t().dot(&rhs).into_shape((nao, nao, nao, nao))?;
    Ok(eri)
}

/// Builds the two-electron repulsion tensor of a calculation.
///
/// Density fitting is used whenever the engine provides factors, otherwise the native
/// four-index routine. For full Brillouin-zone sampling the result is the dense
/// `(nk, nk, nao, nao, nao, nao)` tensor over all $`k`$-point pairs, for which density fitting is
/// required.
///
/// # Arguments
///
/// * `calc` - The engine calculation.
/// * `layout` - The calculation layout.
/// * `kpoints` - The absolute $`k`$-points for full Brillouin-zone layouts.
pub(crate) fn two_electron_tensor<C: Calculation + ?Sized>(
    calc: &C,
    layout: CalculationLayout,
    kpoints: Option<ArrayView2<f64>>,
) -> Result<ArrayD<f64>, anyhow::Error> {
    match layout {
        CalculationLayout::RestrictedFullBz | CalculationLayout::UnrestrictedFullBz => {
            let kpts = kpoints.ok_or_else(|| {
                XcFeatError::UnsupportedLayout(
                    "full Brillouin-zone layout without explicit k-points".to_string(),
                )
            })?;
            full_bz_tensor(calc, kpts)
        }
        CalculationLayout::RestrictedGamma | CalculationLayout::UnrestrictedGamma => {
            let gamma = Array1::<f64>::zeros(3);
            single_kpoint_tensor(calc, Some(gamma.view()))
        }
        CalculationLayout::RestrictedOpen | CalculationLayout::UnrestrictedOpen => {
            single_kpoint_tensor(calc, None)
        }
    }
}

/// Builds the `(nk, nk, nao, nao, nao, nao)` tensor over all pairs of sampled $`k`$-points.
fn full_bz_tensor<C: Calculation + ?Sized>(
    calc: &C,
    kpts: ArrayView2<f64>,
) -> Result<ArrayD<f64>, anyhow::Error> {
    let factors = kpts
        .rows()
        .into_iter()
        .map(|kpt| {
            calc.density_fitting_factors(Some(kpt))?.ok_or_else(|| {
                XcFeatError::UnsupportedLayout(
                    "full Brillouin-zone repulsion tensors require density fitting".to_string(),
                )
                .into()
            })
        })
        .collect::<Result<Vec<_>, anyhow::Error>>()?;
    let nk = factors.len();
    let nao = factors.first().map(|b| b.dim().1).unwrap_or(0);
    log::debug!("Assembling repulsion tensor over {} k-point pairs.", nk * nk);
    let mut eri = Array::zeros((nk, nk, nao, nao, nao, nao));
    for (ik, bra) in factors.iter().enumerate() {
        for (jk, ket) in factors.iter().enumerate() {
            eri.slice_mut(s![ik, jk, .., .., .., ..])
                .assign(&eri_from_factors(bra, ket)?);
        }
    }
    Ok(eri.into_dyn())
}

/// Builds the four-index tensor of an isolated or gamma-point-only calculation.
fn single_kpoint_tensor<C: Calculation + ?Sized>(
    calc: &C,
    kpoint: Option<ArrayView1<f64>>,
) -> Result<ArrayD<f64>, anyhow::Error> {
    match calc.density_fitting_factors(kpoint)? {
        Some(factors) => {
            log::debug!("Assembling repulsion tensor from density-fitting factors.");
            Ok(eri_from_factors(&factors, &factors)?.into_dyn())
        }
        None => {
            log::debug!("Using native four-index repulsion integrals.");
            Ok(calc.native_eri()?.into_dyn())
        }
    }
}
