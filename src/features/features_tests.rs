use anyhow;
use approx::{assert_abs_diff_eq, AbsDiffEq};
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use proptest::prelude::*;

use crate::engine::mock::mock_nu;
use crate::engine::RangeSeparatedIntegrals;
use crate::features::{ContractionPrecision, FeatureTensorGenerator};
use crate::normalisation::NormalisationParams;

struct SmoothKernel {
    nao: usize,
}

impl RangeSeparatedIntegrals for SmoothKernel {
    fn range_separated_integrals(
        &self,
        points: ArrayView2<f64>,
        omega: f64,
    ) -> Result<Array3<f64>, anyhow::Error> {
        Ok(mock_nu(points, omega, self.nao))
    }
}

fn inputs(n_grid: usize, nao: usize) -> (Array3<f64>, Array2<f64>, Array2<f64>) {
    let rdm1 = Array3::from_shape_fn((2, nao, nao), |(s, b, d)| {
        0.1 * (s as f64 + 1.0) + 0.05 * ((b * d) as f64) - 0.02 * (b as f64)
    });
    let ao = Array2::from_shape_fn((n_grid, nao), |(g, b)| {
        ((g as f64) * 0.37 + (b as f64)).sin()
    });
    let coords = Array2::from_shape_fn((n_grid, 3), |(g, x)| {
        0.1 * (g as f64) - 0.3 * (x as f64)
    });
    (rdm1, ao, coords)
}

#[test]
fn test_features_match_explicit_sum() {
    let (n_grid, nao) = (5, 3);
    let (rdm1, ao, coords) = inputs(n_grid, nao);
    let kernel = SmoothKernel { nao };
    let generator = FeatureTensorGenerator::new(2, ContractionPrecision::Highest, false).unwrap();
    let chi = generator
        .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.0, 0.4])
        .unwrap();
    assert_eq!(chi.shape(), &[n_grid, 2, 2, nao]);

    for (iw, &omega) in [0.0, 0.4].iter().enumerate() {
        let nu = mock_nu(coords.view(), omega, nao);
        for g in 0..n_grid {
            for s in 0..2 {
                for a in 0..nao {
                    let mut expected = 0.0;
                    for b in 0..nao {
                        for d in 0..nao {
                            expected += rdm1[(s, b, d)] * ao[(g, b)] * nu[(g, d, a)];
                        }
                    }
                    assert_abs_diff_eq!(chi[(g, iw, s, a)], expected, epsilon = 1e-12);
                }
            }
        }
    }
}

#[test]
fn test_features_empty_omegas() {
    let (rdm1, ao, coords) = inputs(7, 4);
    let kernel = SmoothKernel { nao: 4 };
    let generator = FeatureTensorGenerator::builder().build().unwrap();
    assert_eq!(generator.chunk_size(), 1024);
    let chi = generator
        .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[])
        .unwrap();
    assert_eq!(chi.shape(), &[7, 0, 2, 4]);
}

#[test]
fn test_features_zero_chunk_size() {
    assert!(FeatureTensorGenerator::new(0, ContractionPrecision::Highest, false).is_err());
    let params = NormalisationParams::builder().chunk_size(0).build().unwrap();
    assert!(FeatureTensorGenerator::from_params(&params).is_err());
}

#[test]
fn test_features_mismatched_shapes() {
    let (rdm1, ao, coords) = inputs(6, 3);
    let kernel = SmoothKernel { nao: 3 };
    let generator = FeatureTensorGenerator::new(4, ContractionPrecision::Highest, false).unwrap();
    assert!(generator
        .generate(
            rdm1.view(),
            ao.view(),
            coords.slice(s![..5, ..]),
            &kernel,
            &[0.1]
        )
        .is_err());

    // The kernel disagrees with the density matrix on the basis size.
    let wrong_kernel = SmoothKernel { nao: 2 };
    assert!(generator
        .generate(rdm1.view(), ao.view(), coords.view(), &wrong_kernel, &[0.1])
        .is_err());
}

#[test]
fn test_features_reduced_precision() {
    let (rdm1, ao, coords) = inputs(9, 3);
    let kernel = SmoothKernel { nao: 3 };
    let highest = FeatureTensorGenerator::new(4, ContractionPrecision::Highest, false)
        .unwrap()
        .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.2])
        .unwrap();
    let reduced = FeatureTensorGenerator::new(4, ContractionPrecision::Reduced, false)
        .unwrap()
        .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.2])
        .unwrap();
    assert_abs_diff_eq!(highest, reduced, epsilon = 1e-4);
}

#[test]
fn test_features_parallel_identical() {
    let (rdm1, ao, coords) = inputs(23, 4);
    let kernel = SmoothKernel { nao: 4 };
    let serial = FeatureTensorGenerator::new(5, ContractionPrecision::Highest, false)
        .unwrap()
        .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.0, 0.3, 1.0])
        .unwrap();
    let parallel = FeatureTensorGenerator::new(5, ContractionPrecision::Highest, true)
        .unwrap()
        .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.0, 0.3, 1.0])
        .unwrap();
    assert_eq!(serial, parallel);
}

#[test]
fn test_features_omega_order() {
    let (rdm1, ao, coords) = inputs(4, 2);
    let kernel = SmoothKernel { nao: 2 };
    let generator = FeatureTensorGenerator::new(3, ContractionPrecision::Highest, false).unwrap();
    let forward = generator
        .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.1, 0.7])
        .unwrap();
    let backward = generator
        .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.7, 0.1])
        .unwrap();
    assert_eq!(forward.index_axis(Axis(1), 0), backward.index_axis(Axis(1), 1));
    assert_eq!(forward.index_axis(Axis(1), 1), backward.index_axis(Axis(1), 0));
}

proptest! {
    #[test]
    fn test_features_chunking_invariance(n_grid in 1usize..40, chunk_size in 1usize..50) {
        let nao = 3;
        let (rdm1, ao, coords) = inputs(n_grid, nao);
        let kernel = SmoothKernel { nao };
        let whole = FeatureTensorGenerator::new(n_grid, ContractionPrecision::Highest, false)
            .unwrap()
            .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.0, 0.4])
            .unwrap();
        let single = FeatureTensorGenerator::new(1, ContractionPrecision::Highest, false)
            .unwrap()
            .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.0, 0.4])
            .unwrap();
        let chunked = FeatureTensorGenerator::new(chunk_size, ContractionPrecision::Highest, false)
            .unwrap()
            .generate(rdm1.view(), ao.view(), coords.view(), &kernel, &[0.0, 0.4])
            .unwrap();
        prop_assert!(whole.abs_diff_eq(&single, 1e-12));
        prop_assert!(whole.abs_diff_eq(&chunked, 1e-12));
    }
}

#[test]
fn test_kresolved_features_match_per_kpoint_contraction() {
    let (n_grid, nao, nk) = (5, 3, 2);
    let (rdm1_k0, ao_k0, coords) = inputs(n_grid, nao);
    let rdm1 = ndarray::stack(Axis(1), &[rdm1_k0.view(), (&rdm1_k0 * 0.5).view()]).unwrap();
    let ao = ndarray::stack(Axis(0), &[ao_k0.view(), ao_k0.mapv(|x| x.cos()).view()]).unwrap();
    let kernel = SmoothKernel { nao };
    let omegas = [0.0, 0.4];

    let generator = FeatureTensorGenerator::new(2, ContractionPrecision::Highest, true).unwrap();
    let chi = generator
        .generate_kresolved(rdm1.view(), ao.view(), coords.view(), &kernel, &omegas)
        .unwrap();
    assert_eq!(chi.shape(), &[n_grid, 2, 2, nk, nao]);

    for k in 0..nk {
        let chi_k = generator
            .generate(
                rdm1.index_axis(Axis(1), k),
                ao.index_axis(Axis(0), k),
                coords.view(),
                &kernel,
                &omegas,
            )
            .unwrap();
        assert!(chi.slice(s![.., .., .., k, ..]).abs_diff_eq(&chi_k, 1e-12));
    }
    // Distinct k-point inputs give distinct features.
    assert!(!chi
        .slice(s![.., .., .., 0, ..])
        .abs_diff_eq(&chi.slice(s![.., .., .., 1, ..]), 1e-6));
}

#[test]
fn test_kresolved_features_shape_mismatch() {
    let (rdm1, ao, coords) = inputs(4, 3);
    let rdm1 = rdm1.insert_axis(Axis(1));
    // Two k-points of basis-function values against one k-point of density matrix.
    let ao = ndarray::stack(Axis(0), &[ao.view(), ao.view()]).unwrap();
    let generator = FeatureTensorGenerator::builder().build().unwrap();
    assert!(generator
        .generate_kresolved(
            rdm1.view(),
            ao.view(),
            coords.view(),
            &SmoothKernel { nao: 3 },
            &[0.1]
        )
        .is_err());
}
