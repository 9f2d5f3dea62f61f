//! Quadrature grids.

use anyhow::{self, format_err};
use derive_builder::Builder;
use log;
use ndarray::{Array1, Array2};

use crate::engine::QuadratureGrid;

#[cfg(test)]
#[path = "grid_tests.rs"]
mod grid_tests;

// ==================
// Struct definitions
// ==================

/// Structure holding the points and integration weights of a quadrature grid.
#[derive(Builder, Clone, Debug, PartialEq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Grid {
    /// The grid points, shape `(n_grid, 3)`.
    coords: Array2<f64>,

    /// The integration weights, shape `(n_grid,)`.
    weights: Array1<f64>,
}

impl GridBuilder {
    fn validate(&self) -> Result<(), String> {
        let coords = self.coords.as_ref().ok_or("No grid points found.".to_string())?;
        let weights = self
            .weights
            .as_ref()
            .ok_or("No grid weights found.".to_string())?;
        if coords.ncols() != 3 {
            Err(format!(
                "Grid points must have three Cartesian components, but {} found.",
                coords.ncols()
            ))
        } else if coords.nrows() != weights.len() {
            Err(format!(
                "Mismatched grid: {} points but {} weights.",
                coords.nrows(),
                weights.len()
            ))
        } else {
            Ok(())
        }
    }
}

impl Grid {
    /// Returns a builder to construct a new [`Grid`].
    pub fn builder() -> GridBuilder {
        GridBuilder::default()
    }

    /// Constructs a grid from points and weights.
    ///
    /// # Errors
    ///
    /// Errors if the number of points and weights differ.
    pub fn new(coords: Array2<f64>, weights: Array1<f64>) -> Result<Self, anyhow::Error> {
        Self::builder()
            .coords(coords)
            .weights(weights)
            .build()
            .map_err(|err| format_err!(err))
    }

    /// Extracts the points and weights of an engine quadrature grid.
    ///
    /// The engine grid is built first if it has not been materialised yet; an already built grid
    /// is reused as is. Building is expected to produce points and weights together.
    ///
    /// # Arguments
    ///
    /// * `grid` - The engine grid.
    pub fn from_engine<G: QuadratureGrid + ?Sized>(grid: &mut G) -> Result<Self, anyhow::Error> {
        if grid.coords().is_none() {
            log::debug!("Engine grid not built yet. Building now.");
            grid.build()?;
        } else {
            log::debug!("Reusing already built engine grid.");
        }
        let coords = grid
            .coords()
            .ok_or_else(|| format_err!("Engine grid has no points after building."))?
            .to_owned();
        let weights = grid
            .weights()
            .ok_or_else(|| format_err!("Engine grid has points but no weights."))?
            .to_owned();
        Self::new(coords, weights)
    }

    /// Returns the grid points.
    pub fn coords(&self) -> &Array2<f64> {
        &self.coords
    }

    /// Returns the integration weights.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Returns the number of grid points.
    pub fn n_points(&self) -> usize {
        self.weights.len()
    }

    /// Integrates a function tabulated on the grid.
    pub fn integrate(&self, values: &Array1<f64>) -> f64 {
        self.weights.dot(values)
    }
}
