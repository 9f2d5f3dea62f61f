//! Basis-function derivatives on grids.

use std::collections::BTreeMap;

use anyhow::{self, ensure};
use itertools::Itertools;
use ndarray::{ArrayD, ArrayView2, Axis, Slice};

use crate::engine::Calculation;

/// Returns the number of derivative components up to and including order `deriv`.
pub(crate) fn n_components(deriv: usize) -> usize {
    (0..=deriv).map(|n| (n + 1) * (n + 2) / 2).sum()
}

/// Moves an axis of an array to the last position.
pub(crate) fn move_axis_last(arr: ArrayD<f64>, axis: usize) -> ArrayD<f64> {
    let perm = (0..arr.ndim())
        .filter(|&i| i != axis)
        .chain(std::iter::once(axis))
        .collect::<Vec<_>>();
    arr.permuted_axes(perm).as_standard_layout().into_owned()
}

/// Splits basis-function values and first derivatives evaluated by the engine.
///
/// # Arguments
///
/// * `ao_all` - Engine output containing at least four components (value, $`x`$, $`y`$, $`z`$)
/// along `comp_axis`.
/// * `comp_axis` - The component axis.
///
/// # Returns
///
/// The basis-function values with the component axis removed, and the first derivatives with
/// the Cartesian axis moved to the end.
pub(crate) fn split_value_and_gradient(
    ao_all: ArrayD<f64>,
    comp_axis: usize,
) -> Result<(ArrayD<f64>, ArrayD<f64>), anyhow::Error> {
    ensure!(
        ao_all.ndim() > comp_axis && ao_all.len_of(Axis(comp_axis)) >= 4,
        "Basis-function evaluation of shape {:?} lacks first derivatives along axis {comp_axis}.",
        ao_all.shape()
    );
    let ao = ao_all.index_axis(Axis(comp_axis), 0).to_owned();
    let grad = ao_all
        .slice_axis(Axis(comp_axis), Slice::from(1..4))
        .to_owned();
    Ok((ao, move_axis_last(grad, comp_axis)))
}

/// Computes pure-direction basis-function derivatives of orders two and above.
///
/// For each order $`n \ge 2`$ up to `order`, the result holds
/// $`\partial^n \phi / \partial x_i^n`$ for $`x_i \in \{x, y, z\}`$, stacked along the last
/// axis. Mixed derivatives are discarded. Orders below two give an empty map.
///
/// # Arguments
///
/// * `calc` - The engine calculation used to evaluate the derivatives.
/// * `coords` - The grid points.
/// * `order` - The maximum derivative order.
/// * `kpoints` - The $`k`$-points for periodic systems with full Brillouin-zone sampling.
/// * `comp_axis` - The component axis of the engine output.
pub(crate) fn ao_grads<C: Calculation + ?Sized>(
    calc: &C,
    coords: ArrayView2<f64>,
    order: usize,
    kpoints: Option<ArrayView2<f64>>,
    comp_axis: usize,
) -> Result<BTreeMap<usize, ArrayD<f64>>, anyhow::Error> {
    let mut result = BTreeMap::new();
    if order < 2 {
        return Ok(result);
    }
    let ao_n = calc.eval_ao(coords, order, kpoints)?;
    ensure!(
        ao_n.ndim() > comp_axis && ao_n.len_of(Axis(comp_axis)) >= n_components(order),
        "Basis-function evaluation of shape {:?} has too few derivative components for order \
        {order}.",
        ao_n.shape()
    );

    // Components of orders zero and one occupy the first four slots.
    let mut i = 4;
    for n in 2..=order {
        let indices = (0..3)
            .combinations_with_replacement(n)
            .filter_map(|c| {
                let index = i;
                i += 1;
                c.iter().all_equal().then_some(index)
            })
            .collect::<Vec<_>>();
        let derivs = ao_n.select(Axis(comp_axis), &indices);
        result.insert(n, move_axis_last(derivs, comp_axis));
    }
    Ok(result)
}
