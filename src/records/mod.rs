//! Immutable records of normalised calculation results.
//!
//! A [`Molecule`] holds an isolated or gamma-point-only system, a [`Solid`] a periodic system
//! with full Brillouin-zone sampling, and a [`Reaction`] a set of molecules with stoichiometric
//! numbers and a reaction energy. The quantities shared by molecules and solids live in
//! [`SystemData`], to which both records dereference.

mod kpoints;
mod molecule;
mod reaction;
mod solid;
mod system;

pub use kpoints::{KPointInfo, KPointInfoBuilder};
pub use molecule::Molecule;
pub use reaction::{make_reaction, Reaction, ReactionBuilder};
pub use solid::Solid;
pub use system::{SystemData, SystemDataBuilder};
