//! HDF5 containers of molecule, solid and reaction records.
//!
//! A container holds one top-level group per record:
//!
//! * `reaction_[{name}_]{i}` for reactions, with an `energy` and a `name` dataset and one
//! `molecule_[{name}_]{j}` sub-group per constituent, tagged by a `type` attribute of
//! `reactant` or `product` and holding a `reactant_numbers` or `product_numbers` dataset;
//! * `molecule_[{name}_]{j}` for molecules;
//! * `solid_[{name}_]{j}` for solids.
//!
//! Every record group holds one dataset per field. Absent optional values are stored as
//! one-element placeholder datasets tagged with a `placeholder` attribute.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{self, format_err};
use derive_builder::Builder;
use hdf5::types::VarLenUnicode;
use hdf5::Group;
use itertools::Itertools;
use lazy_static::lazy_static;
use log;
use ndarray::{arr0, Array1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::XcFeatError;
use crate::io::format::nice_bool;
use crate::records::{make_reaction, Molecule, Reaction, Solid, SystemData};

mod schema;

use schema::{
    periodic_from_fields, periodic_to_fields, reaction_from_fields, reaction_to_fields,
    read_fields, stoichiometry_from_fields, stoichiometry_to_fields, system_from_fields,
    system_to_fields, write_fields, FieldMap, FieldValue, PRODUCT_FIELDS, REACTANT_FIELDS,
    REACTION_FIELDS, SOLID_FIELDS, SYSTEM_FIELDS,
};

#[cfg(test)]
#[path = "container_tests.rs"]
mod container_tests;

lazy_static! {
    static ref GROUP_NAME_RE: Regex = Regex::new(r"^(molecule|solid|reaction)_(?:(.*)_)?(\d+)$")
        .expect("Regex pattern invalid.");
}

/// Attribute of constituent sub-groups distinguishing reactants from products.
const CONSTITUENT_TYPE_ATTR: &str = "type";

// ============
// Record kinds
// ============

/// Enumerated type for the kinds of records in a container, in the order in which they are
/// stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    Reaction,
    Molecule,
    Solid,
}

impl RecordKind {
    /// Returns the group-name prefix of the record kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reaction => "reaction",
            Self::Molecule => "molecule",
            Self::Solid => "solid",
        }
    }
}

impl FromStr for RecordKind {
    type Err = XcFeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reaction" => Ok(Self::Reaction),
            "molecule" => Ok(Self::Molecule),
            "solid" => Ok(Self::Solid),
            _ => Err(XcFeatError::RecordTypeError(s.to_string())),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed record group name.
#[derive(Clone, Debug, PartialEq, Eq)]
struct GroupEntry {
    path: String,
    kind: RecordKind,
    index: u64,
}

impl GroupEntry {
    fn parse(path: &str) -> Result<Self, XcFeatError> {
        let caps = GROUP_NAME_RE
            .captures(path)
            .ok_or_else(|| XcFeatError::RecordTypeError(format!("group `{path}`")))?;
        let kind = caps[1].parse::<RecordKind>()?;
        let index = caps[3]
            .parse::<u64>()
            .map_err(|_| XcFeatError::RecordTypeError(format!("group `{path}`")))?;
        Ok(Self {
            path: path.to_string(),
            kind,
            index,
        })
    }
}

/// Constructs the name of a record group.
///
/// Path separators in `name` are replaced by underscores so that every record maps to a single
/// group. The unaltered name is kept in the `name` dataset of the group.
fn group_name(kind: RecordKind, name: Option<&str>, index: usize) -> String {
    match name {
        Some(name) => format!("{}_{}_{index}", kind.as_str(), name.replace('/', "_")),
        None => format!("{}_{index}", kind.as_str()),
    }
}

// ======
// Saving
// ======

/// Enumerated type for borrowed records to be saved.
#[derive(Clone, Copy, Debug)]
pub enum RecordRef<'a> {
    Molecule(&'a Molecule),
    Solid(&'a Solid),
    Reaction(&'a Reaction),
}

impl<'a> From<&'a Molecule> for RecordRef<'a> {
    fn from(molecule: &'a Molecule) -> Self {
        Self::Molecule(molecule)
    }
}

impl<'a> From<&'a Solid> for RecordRef<'a> {
    fn from(solid: &'a Solid) -> Self {
        Self::Solid(solid)
    }
}

impl<'a> From<&'a Reaction> for RecordRef<'a> {
    fn from(reaction: &'a Reaction) -> Self {
        Self::Reaction(reaction)
    }
}

/// Saves records into an HDF5 container, creating the container if it does not exist.
///
/// Reactions are written first, then molecules, then solids. Within each kind, records are
/// indexed by their position amongst the records of that kind in `records`.
///
/// # Errors
///
/// Errors with [`XcFeatError::DuplicateGroup`] if a group of the same name already exists in
/// the container. Groups written before the failure remain in the container.
pub fn save<P: AsRef<Path>>(path: P, records: &[RecordRef]) -> Result<(), anyhow::Error> {
    let file = hdf5::File::append(path.as_ref())?;
    log::debug!(
        "Saving {} record(s) into `{}`.",
        records.len(),
        path.as_ref().display()
    );

    let reactions = records.iter().filter_map(|record| match record {
        RecordRef::Reaction(reaction) => Some(*reaction),
        _ => None,
    });
    for (i, reaction) in reactions.enumerate() {
        let group =
            create_new_group(&file, &group_name(RecordKind::Reaction, reaction.name(), i))?;
        write_reaction(&group, reaction)?;
    }

    let molecules = records.iter().filter_map(|record| match record {
        RecordRef::Molecule(molecule) => Some(*molecule),
        _ => None,
    });
    for (j, molecule) in molecules.enumerate() {
        let group =
            create_new_group(&file, &group_name(RecordKind::Molecule, molecule.name(), j))?;
        write_fields(&group, SYSTEM_FIELDS, &system_to_fields(molecule.data()))?;
    }

    let solids = records.iter().filter_map(|record| match record {
        RecordRef::Solid(solid) => Some(*solid),
        _ => None,
    });
    for (j, solid) in solids.enumerate() {
        let group = create_new_group(&file, &group_name(RecordKind::Solid, solid.name(), j))?;
        write_fields(&group, SYSTEM_FIELDS, &system_to_fields(solid.data()))?;
        write_fields(
            &group,
            SOLID_FIELDS,
            &periodic_to_fields(solid.lattice_vectors(), solid.kpt_info()),
        )?;
    }
    Ok(())
}

/// Creates a sub-group, refusing to reuse an existing name.
fn create_new_group(parent: &Group, name: &str) -> Result<Group, anyhow::Error> {
    if parent.link_exists(name) {
        return Err(XcFeatError::DuplicateGroup(name.to_string()).into());
    }
    log::debug!("Creating group `{name}` in `{}`.", parent.name());
    Ok(parent.create_group(name)?)
}

fn write_reaction(group: &Group, reaction: &Reaction) -> Result<(), anyhow::Error> {
    write_fields(
        group,
        REACTION_FIELDS,
        &reaction_to_fields(reaction.energy(), reaction.name()),
    )?;
    for (j, (molecule, is_reactant, number)) in reaction.constituents().enumerate() {
        let subgroup =
            create_new_group(group, &group_name(RecordKind::Molecule, molecule.name(), j))?;
        write_fields(&subgroup, SYSTEM_FIELDS, &system_to_fields(molecule.data()))?;
        let (constituent_type, specs) = if is_reactant {
            ("reactant", REACTANT_FIELDS)
        } else {
            ("product", PRODUCT_FIELDS)
        };
        let constituent_type = VarLenUnicode::from_str(constituent_type)
            .map_err(|err| format_err!("Unable to encode constituent type: {err}"))?;
        subgroup
            .new_attr_builder()
            .with_data(&arr0(constituent_type))
            .create(CONSTITUENT_TYPE_ATTR)?;
        write_fields(
            &subgroup,
            specs,
            &stoichiometry_to_fields(is_reactant, number),
        )?;
    }
    Ok(())
}

// =======
// Loading
// =======

// ----------
// Parameters
// ----------

/// A structure containing control parameters for loading records from a container.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadParams {
    /// Boolean indicating if the order of the records is to be randomised. Randomisation only
    /// takes place when [`Self::training`] is also set.
    #[builder(default = "true")]
    pub randomise: bool,

    /// Boolean indicating if the records are loaded for training.
    #[builder(default = "true")]
    pub training: bool,

    /// The range-separation parameters whose feature tensor slices are to be loaded. If `None`,
    /// stored feature tensors are loaded as they are. If empty, no feature tensors are loaded.
    #[builder(setter(custom), default = "None")]
    pub omegas: Option<Vec<f64>>,

    /// An optional seed for the randomisation.
    #[builder(default = "None")]
    pub seed: Option<u64>,
}

impl LoadParams {
    /// Returns a builder to construct a [`LoadParams`] structure.
    pub fn builder() -> LoadParamsBuilder {
        LoadParamsBuilder::default()
    }
}

impl LoadParamsBuilder {
    /// Sets the range-separation parameters whose features are to be loaded.
    pub fn omegas(&mut self, omegas: Option<&[f64]>) -> &mut Self {
        self.omegas = Some(omegas.map(|ws| ws.to_vec()));
        self
    }
}

impl Default for LoadParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `LoadParams`.")
    }
}

impl fmt::Display for LoadParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Randomised order: {}", nice_bool(self.randomise && self.training))?;
        writeln!(f, "Training: {}", nice_bool(self.training))?;
        writeln!(
            f,
            "Feature omegas: {}",
            self.omegas
                .as_ref()
                .map(|ws| format!("[{}]", ws.iter().map(|w| format!("{w:.3}")).join(", ")))
                .unwrap_or_else(|| "as stored".to_string())
        )?;
        if let Some(seed) = self.seed {
            writeln!(f, "Seed: {seed}")?;
        }
        Ok(())
    }
}

// -------
// Records
// -------

/// Enumerated type for the records read from a container.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadedRecord {
    Molecule(Molecule),
    Solid(Solid),
    Reaction(Reaction),
}

impl LoadedRecord {
    /// Returns the kind of the record.
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Molecule(_) => RecordKind::Molecule,
            Self::Solid(_) => RecordKind::Solid,
            Self::Reaction(_) => RecordKind::Reaction,
        }
    }
}

// ------
// Reader
// ------

/// An iterator over the records of a container.
///
/// The list of record groups is fixed when the reader is created. Each record is only read
/// from the file when the iterator reaches it.
pub struct ContainerReader {
    file: hdf5::File,
    entries: std::vec::IntoIter<GroupEntry>,
    omegas: Option<Vec<f64>>,
}

/// Opens a container for reading.
///
/// # Errors
///
/// Errors with [`XcFeatError::RecordTypeError`] if the container holds a top-level group that
/// is not a record group.
pub fn load<P: AsRef<Path>>(
    path: P,
    params: &LoadParams,
) -> Result<ContainerReader, anyhow::Error> {
    let file = hdf5::File::open(path.as_ref())?;
    let mut entries = file
        .member_names()?
        .iter()
        .map(|name| GroupEntry::parse(name))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by(|a, b| (a.kind, a.index, &a.path).cmp(&(b.kind, b.index, &b.path)));
    if params.randomise && params.training {
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        entries.shuffle(&mut rng);
    }
    log::debug!(
        "Loading {} record(s) from `{}`: {}.",
        entries.len(),
        path.as_ref().display(),
        entries.iter().map(|entry| entry.path.as_str()).join(", ")
    );
    Ok(ContainerReader {
        file,
        entries: entries.into_iter(),
        omegas: params.omegas.clone(),
    })
}

impl ContainerReader {
    fn read_entry(&self, entry: &GroupEntry) -> Result<LoadedRecord, anyhow::Error> {
        let group = self.file.group(&entry.path)?;
        let omegas = self.omegas.as_deref();
        match entry.kind {
            RecordKind::Molecule => Ok(LoadedRecord::Molecule(read_molecule(&group, omegas)?)),
            RecordKind::Solid => Ok(LoadedRecord::Solid(read_solid(&group, omegas)?)),
            RecordKind::Reaction => Ok(LoadedRecord::Reaction(read_reaction(&group, omegas)?)),
        }
    }
}

impl Iterator for ContainerReader {
    type Item = Result<LoadedRecord, anyhow::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.next()?;
        log::debug!("Reading record group `{}`.", entry.path);
        Some(self.read_entry(&entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for ContainerReader {}

fn read_system(group: &Group, omegas: Option<&[f64]>) -> Result<SystemData, anyhow::Error> {
    let location = group.name();
    let mut fields = read_fields(group, SYSTEM_FIELDS)?;
    select_features(&location, &mut fields, omegas)?;
    system_from_fields(&location, fields)
}

fn read_molecule(group: &Group, omegas: Option<&[f64]>) -> Result<Molecule, anyhow::Error> {
    Molecule::new(read_system(group, omegas)?).map_err(|err| {
        XcFeatError::MalformedContainer(format!("`{}`: {err}", group.name())).into()
    })
}

fn read_solid(group: &Group, omegas: Option<&[f64]>) -> Result<Solid, anyhow::Error> {
    let data = read_system(group, omegas)?;
    let (lattice_vectors, kpt_info) =
        periodic_from_fields(&group.name(), read_fields(group, SOLID_FIELDS)?)?;
    Solid::new(data, lattice_vectors, kpt_info).map_err(|err| {
        XcFeatError::MalformedContainer(format!("`{}`: {err}", group.name())).into()
    })
}

fn read_reaction(group: &Group, omegas: Option<&[f64]>) -> Result<Reaction, anyhow::Error> {
    let location = group.name();
    let (energy, name) = reaction_from_fields(&location, read_fields(group, REACTION_FIELDS)?)?;

    let mut constituents = group
        .member_names()?
        .iter()
        .filter(|member| !REACTION_FIELDS.iter().any(|spec| spec.name == member.as_str()))
        .map(|member| {
            let entry = GroupEntry::parse(member)?;
            if entry.kind != RecordKind::Molecule {
                return Err(XcFeatError::RecordTypeError(format!(
                    "constituent `{member}` of `{location}` is not a molecule"
                )));
            }
            Ok(entry)
        })
        .collect::<Result<Vec<_>, _>>()?;
    constituents.sort_by(|a, b| (a.index, &a.path).cmp(&(b.index, &b.path)));

    let mut reactants = vec![];
    let mut products = vec![];
    let mut reactant_numbers = vec![];
    let mut product_numbers = vec![];
    for entry in constituents {
        let subgroup = group.group(&entry.path)?;
        let sublocation = subgroup.name();
        let constituent_type = subgroup
            .attr(CONSTITUENT_TYPE_ATTR)
            .map_err(|_| {
                XcFeatError::MalformedContainer(format!(
                    "constituent `{sublocation}` has no `{CONSTITUENT_TYPE_ATTR}` attribute"
                ))
            })?
            .read_scalar::<VarLenUnicode>()?;
        let is_reactant = match constituent_type.as_str() {
            "reactant" => true,
            "product" => false,
            other => {
                return Err(XcFeatError::RecordTypeError(format!(
                    "constituent `{sublocation}` of type `{other}`"
                ))
                .into())
            }
        };
        let specs = if is_reactant {
            REACTANT_FIELDS
        } else {
            PRODUCT_FIELDS
        };
        let number =
            stoichiometry_from_fields(&sublocation, is_reactant, read_fields(&subgroup, specs)?)?;
        let molecule = read_molecule(&subgroup, omegas)?;
        if is_reactant {
            reactants.push(molecule);
            reactant_numbers.push(number);
        } else {
            products.push(molecule);
            product_numbers.push(number);
        }
    }

    make_reaction(
        reactants,
        products,
        reactant_numbers,
        product_numbers,
        energy,
        name.as_deref(),
    )
    .map_err(|err| XcFeatError::MalformedContainer(format!("`{location}`: {err}")).into())
}

/// Replaces the stored feature tensor by the slices of the requested range-separation
/// parameters, in the requested order.
///
/// # Errors
///
/// Errors with [`XcFeatError::MissingPrecomputedFeature`] if any requested parameter has no
/// stored slice.
fn select_features(
    location: &str,
    fields: &mut FieldMap,
    requested: Option<&[f64]>,
) -> Result<(), anyhow::Error> {
    let Some(requested) = requested else {
        return Ok(());
    };
    if requested.is_empty() {
        fields.insert("omegas", FieldValue::Absent);
        fields.insert("chi", FieldValue::Absent);
        return Ok(());
    }

    let available = match fields.get("omegas") {
        Some(FieldValue::Tensor(omegas)) => omegas.iter().copied().collect::<Vec<_>>(),
        _ => vec![],
    };
    let indices = requested
        .iter()
        .map(|omega| available.iter().position(|stored| stored == omega))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| XcFeatError::MissingPrecomputedFeature {
            requested: requested.to_vec(),
            available: available.clone(),
        })?;
    let selected = match fields.get("chi") {
        Some(FieldValue::Tensor(chi)) if chi.ndim() >= 4 && chi.shape()[1] == available.len() => {
            chi.select(Axis(1), &indices)
        }
        _ => {
            return Err(XcFeatError::MalformedContainer(format!(
                "`{location}` lists omegas without a matching feature tensor"
            ))
            .into())
        }
    };
    fields.insert("chi", FieldValue::Tensor(selected));
    fields.insert(
        "omegas",
        FieldValue::Tensor(Array1::from_vec(requested.to_vec()).into_dyn()),
    );
    Ok(())
}
