//! # xcfeat: Training Records for Machine-Learned Density Functionals
//!
//! `xcfeat` turns the results of self-consistent-field calculations into canonical training
//! records for machine-learned exchange-correlation functionals. It provides:
//! - normalisation of calculation results from six array layouts (restricted or unrestricted,
//!   isolated, gamma-point-only, or with full Brillouin-zone sampling) into one canonical,
//!   spin-resolved layout,
//! - generation of the range-separated exact-exchange feature tensor
//!   $`\chi^{\omega}_{g\sigma c} = \sum_{bd} D^{\sigma}_{bd}\, \phi_b(\mathbf{r}_g)\,
//!   \nu^{\omega}_{gdc}`$ in chunks of grid points, and
//! - persistence of molecules, solids and reactions in HDF5 containers, with selective
//!   reloading of precomputed feature tensors.
//!
//! The electronic-structure engine itself is not part of this crate. Calculations are accessed
//! through the traits in [`engine`].
//!
//! ## Getting started
//!
//! To use `xcfeat` in your Rust project, simply add this crate to your project's `Cargo.toml`.
//! The available features defined by this crate are:
//!
//! ### HDF5 linking
//!
//! - `hdf5-static`: Downloads and builds the HDF5 library, and links statically. Without this
//!   feature, an existing HDF5 installation is located and linked dynamically.
//!
//! ## Logging
//!
//! Diagnostic messages are emitted through the [`log`](https://docs.rs/log) facade. Section
//! banners and parameter summaries are sent to the `xcfeat-output` target, which can be routed to
//! a file with [`io::logging::init_file_logger`].

pub mod engine;
pub mod errors;
pub mod features;
pub mod grid;
pub mod io;
pub mod normalisation;
pub mod records;
