use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2};

use crate::engine::mock::MockGrid;
use crate::engine::QuadratureGrid;
use crate::grid::Grid;

#[test]
fn test_grid_from_unbuilt_engine_grid() {
    let mut engine_grid = MockGrid::new(6, false, Some(3));
    assert!(engine_grid.coords().is_none());
    let grid = Grid::from_engine(&mut engine_grid).unwrap();
    assert_eq!(engine_grid.n_builds, 1);
    assert_eq!(grid.n_points(), 6);
    assert_eq!(grid.coords().dim(), (6, 3));
}

#[test]
fn test_grid_from_prebuilt_engine_grid() {
    let mut engine_grid = MockGrid::new(4, true, None);
    let grid = Grid::from_engine(&mut engine_grid).unwrap();
    assert_eq!(engine_grid.n_builds, 0);
    assert_eq!(grid.n_points(), 4);
    assert_eq!(engine_grid.level(), None);

    // Extracting twice never triggers a rebuild.
    let again = Grid::from_engine(&mut engine_grid).unwrap();
    assert_eq!(engine_grid.n_builds, 0);
    assert_eq!(grid, again);
}

#[test]
fn test_grid_validation() {
    assert!(Grid::new(Array2::zeros((3, 3)), Array1::ones(2)).is_err());
    assert!(Grid::new(Array2::zeros((3, 2)), Array1::ones(3)).is_err());
    assert!(Grid::builder().coords(Array2::zeros((3, 3))).build().is_err());
}

#[test]
fn test_grid_integrate() {
    let grid = Grid::new(
        array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        array![0.5, 0.25, 0.25],
    )
    .unwrap();
    assert_abs_diff_eq!(grid.integrate(&array![2.0, 4.0, 8.0]), 4.0);
}
