//! Reactions between molecular records.

use std::fmt;

use anyhow::{self, format_err};
use derive_builder::Builder;
use itertools::Itertools;

use crate::records::molecule::Molecule;

/// Structure for a reaction with stoichiometric numbers and a reaction energy.
#[derive(Builder, Clone, Debug, PartialEq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Reaction {
    /// The reactants.
    reactants: Vec<Molecule>,

    /// The products.
    products: Vec<Molecule>,

    /// The stoichiometric numbers of the reactants.
    reactant_numbers: Vec<i64>,

    /// The stoichiometric numbers of the products.
    product_numbers: Vec<i64>,

    /// The reaction energy.
    energy: f64,

    /// An optional name for the reaction.
    #[builder(default = "None")]
    name: Option<String>,
}

impl ReactionBuilder {
    fn validate(&self) -> Result<(), String> {
        let reactants = self
            .reactants
            .as_ref()
            .ok_or("No reactants found.".to_string())?;
        let products = self
            .products
            .as_ref()
            .ok_or("No products found.".to_string())?;
        let reactant_numbers = self
            .reactant_numbers
            .as_ref()
            .ok_or("No reactant numbers found.".to_string())?;
        let product_numbers = self
            .product_numbers
            .as_ref()
            .ok_or("No product numbers found.".to_string())?;
        if reactants.len() != reactant_numbers.len() {
            Err(format!(
                "{} reactant(s) but {} reactant number(s).",
                reactants.len(),
                reactant_numbers.len()
            ))
        } else if products.len() != product_numbers.len() {
            Err(format!(
                "{} product(s) but {} product number(s).",
                products.len(),
                product_numbers.len()
            ))
        } else {
            Ok(())
        }
    }
}

impl Reaction {
    /// Returns a builder to construct a new [`Reaction`].
    pub fn builder() -> ReactionBuilder {
        ReactionBuilder::default()
    }

    /// Returns the reactants.
    pub fn reactants(&self) -> &[Molecule] {
        &self.reactants
    }

    /// Returns the products.
    pub fn products(&self) -> &[Molecule] {
        &self.products
    }

    /// Returns the stoichiometric numbers of the reactants.
    pub fn reactant_numbers(&self) -> &[i64] {
        &self.reactant_numbers
    }

    /// Returns the stoichiometric numbers of the products.
    pub fn product_numbers(&self) -> &[i64] {
        &self.product_numbers
    }

    /// Returns the reaction energy.
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Returns the name of the reaction, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Iterates over the constituents, reactants first, with a flag indicating if each is a
    /// reactant, and its stoichiometric number.
    pub fn constituents(&self) -> impl Iterator<Item = (&Molecule, bool, i64)> + '_ {
        self.reactants
            .iter()
            .zip(self.reactant_numbers.iter())
            .map(|(mol, &n)| (mol, true, n))
            .chain(
                self.products
                    .iter()
                    .zip(self.product_numbers.iter())
                    .map(|(mol, &n)| (mol, false, n)),
            )
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |mols: &[Molecule], numbers: &[i64]| {
            mols.iter()
                .zip(numbers.iter())
                .map(|(mol, n)| format!("{n} {}", mol.name().unwrap_or("?")))
                .join(" + ")
        };
        write!(
            f,
            "Reaction{}: {} → {} (ΔE = {:+.6})",
            self.name.as_ref().map(|n| format!(" `{n}`")).unwrap_or_default(),
            side(&self.reactants, &self.reactant_numbers),
            side(&self.products, &self.product_numbers),
            self.energy
        )
    }
}

/// Constructs a reaction.
///
/// # Errors
///
/// Errors if the numbers of reactants or products do not match their stoichiometric numbers.
pub fn make_reaction(
    reactants: Vec<Molecule>,
    products: Vec<Molecule>,
    reactant_numbers: Vec<i64>,
    product_numbers: Vec<i64>,
    energy: f64,
    name: Option<&str>,
) -> Result<Reaction, anyhow::Error> {
    Reaction::builder()
        .reactants(reactants)
        .products(products)
        .reactant_numbers(reactant_numbers)
        .product_numbers(product_numbers)
        .energy(energy)
        .name(name.map(|n| n.to_string()))
        .build()
        .map_err(|err| format_err!(err))
}
