//! Field schemas of the records stored in HDF5 containers.
//!
//! Each record type declares an ordered list of [`FieldSpec`]s. Records are flattened into a
//! [`FieldMap`] keyed by field name, which is written and read back field by field by
//! [`write_fields`] and [`read_fields`].

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{self, format_err};
use hdf5::types::VarLenUnicode;
use hdf5::Group;
use indexmap::IndexMap;
use log;
use ndarray::{arr0, Array1, ArrayD, Dimension, Ix1, Ix2, IxDyn};

use crate::errors::XcFeatError;
use crate::grid::Grid;
use crate::records::{KPointInfo, SystemData};

/// Attribute tagging a dataset that stands in for an absent optional value.
const PLACEHOLDER_ATTR: &str = "placeholder";

// =====================
// Field kinds and specs
// =====================

/// Enumerated type for the kinds of scalar fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScalarKind {
    Float,
    Integer,
    Boolean,
}

/// Enumerated type for the kinds of stored fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldKind {
    /// A scalar dataset.
    Scalar(ScalarKind),

    /// A variable-length UTF-8 scalar dataset.
    Text,

    /// A floating-point dataset of any rank.
    Tensor,

    /// An integer dataset of any rank.
    IndexTensor,

    /// A sub-group of floating-point datasets keyed by a non-negative integer.
    TensorMap,
}

/// Structure describing one stored field of a record.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldSpec {
    pub(crate) name: &'static str,
    pub(crate) kind: FieldKind,
    pub(crate) optional: bool,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        optional: false,
    }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        optional: true,
    }
}

const FLOAT: FieldKind = FieldKind::Scalar(ScalarKind::Float);
const INTEGER: FieldKind = FieldKind::Scalar(ScalarKind::Integer);
const BOOLEAN: FieldKind = FieldKind::Scalar(ScalarKind::Boolean);

/// The fields shared by molecule and solid records, in storage order.
pub(crate) const SYSTEM_FIELDS: &[FieldSpec] = &[
    required("coords", FieldKind::Tensor),
    required("weights", FieldKind::Tensor),
    required("atom_index", FieldKind::IndexTensor),
    required("nuclear_pos", FieldKind::Tensor),
    required("ao", FieldKind::Tensor),
    required("grad_ao", FieldKind::Tensor),
    required("grad_n_ao", FieldKind::TensorMap),
    required("rdm1", FieldKind::Tensor),
    required("nuclear_repulsion", FLOAT),
    required("h1e", FieldKind::Tensor),
    required("vj", FieldKind::Tensor),
    required("mo_coeff", FieldKind::Tensor),
    required("mo_occ", FieldKind::Tensor),
    required("mo_energy", FieldKind::Tensor),
    required("mf_energy", FLOAT),
    required("s1e", FieldKind::Tensor),
    optional("omegas", FieldKind::Tensor),
    optional("chi", FieldKind::Tensor),
    required("rep_tensor", FieldKind::Tensor),
    optional("energy", FLOAT),
    required("basis", FieldKind::Text),
    optional("name", FieldKind::Text),
    required("spin", INTEGER),
    required("charge", INTEGER),
    required("unit_angstrom", BOOLEAN),
    optional("grid_level", INTEGER),
    required("scf_iteration", INTEGER),
    required("fock", FieldKind::Tensor),
];

/// The fields specific to solid records, in storage order.
pub(crate) const SOLID_FIELDS: &[FieldSpec] = &[
    required("lattice_vectors", FieldKind::Tensor),
    required("kpts_abs", FieldKind::Tensor),
    required("kpts_scaled", FieldKind::Tensor),
    required("kpt_weights", FieldKind::Tensor),
    optional("bz2ibz_map", FieldKind::IndexTensor),
    optional("ibz2bz_map", FieldKind::IndexTensor),
    optional("kpts_ir_abs", FieldKind::Tensor),
    optional("kpts_ir_scaled", FieldKind::Tensor),
];

/// The fields of reaction groups, besides their constituent sub-groups.
pub(crate) const REACTION_FIELDS: &[FieldSpec] =
    &[required("energy", FLOAT), optional("name", FieldKind::Text)];

/// The stoichiometric number stored alongside a reactant.
pub(crate) const REACTANT_FIELDS: &[FieldSpec] = &[required("reactant_numbers", INTEGER)];

/// The stoichiometric number stored alongside a product.
pub(crate) const PRODUCT_FIELDS: &[FieldSpec] = &[required("product_numbers", INTEGER)];

// ============
// Field values
// ============

/// Enumerated type for the value of a stored field.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
    Tensor(ArrayD<f64>),
    IndexTensor(ArrayD<i64>),
    TensorMap(BTreeMap<usize, ArrayD<f64>>),

    /// An optional value that is not present.
    Absent,
}

/// Field values keyed by field name, in storage order.
pub(crate) type FieldMap = IndexMap<&'static str, FieldValue>;

impl FieldValue {
    fn from_option<T>(value: Option<T>, f: impl FnOnce(T) -> Self) -> Self {
        value.map(f).unwrap_or(Self::Absent)
    }

    fn tensor<D: Dimension>(arr: &ndarray::Array<f64, D>) -> Self {
        Self::Tensor(arr.clone().into_dyn())
    }

    fn index_tensor<D: Dimension>(arr: &ndarray::Array<i64, D>) -> Self {
        Self::IndexTensor(arr.clone().into_dyn())
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::Text(_) => "text",
            Self::Tensor(_) => "tensor",
            Self::IndexTensor(_) => "index tensor",
            Self::TensorMap(_) => "tensor map",
            Self::Absent => "absent",
        }
    }

    fn mismatch(&self, field: &str, expected: &str) -> anyhow::Error {
        XcFeatError::MalformedContainer(format!(
            "field `{field}` holds a {} value where a {expected} is expected",
            self.kind_name()
        ))
        .into()
    }

    fn into_float(self, field: &str) -> Result<f64, anyhow::Error> {
        match self {
            Self::Float(v) => Ok(v),
            other => Err(other.mismatch(field, "float")),
        }
    }

    fn into_integer(self, field: &str) -> Result<i64, anyhow::Error> {
        match self {
            Self::Integer(v) => Ok(v),
            other => Err(other.mismatch(field, "integer")),
        }
    }

    fn into_boolean(self, field: &str) -> Result<bool, anyhow::Error> {
        match self {
            Self::Boolean(v) => Ok(v),
            other => Err(other.mismatch(field, "boolean")),
        }
    }

    fn into_text(self, field: &str) -> Result<String, anyhow::Error> {
        match self {
            Self::Text(v) => Ok(v),
            other => Err(other.mismatch(field, "text")),
        }
    }

    fn into_tensor<D: Dimension>(
        self,
        field: &str,
    ) -> Result<ndarray::Array<f64, D>, anyhow::Error> {
        match self {
            Self::Tensor(arr) => arr.into_dimensionality::<D>().map_err(|err| {
                XcFeatError::MalformedContainer(format!("field `{field}`: {err}")).into()
            }),
            other => Err(other.mismatch(field, "tensor")),
        }
    }

    fn into_index_tensor<D: Dimension>(
        self,
        field: &str,
    ) -> Result<ndarray::Array<i64, D>, anyhow::Error> {
        match self {
            Self::IndexTensor(arr) => arr.into_dimensionality::<D>().map_err(|err| {
                XcFeatError::MalformedContainer(format!("field `{field}`: {err}")).into()
            }),
            other => Err(other.mismatch(field, "index tensor")),
        }
    }

    fn into_tensor_map(self, field: &str) -> Result<BTreeMap<usize, ArrayD<f64>>, anyhow::Error> {
        match self {
            Self::TensorMap(map) => Ok(map),
            other => Err(other.mismatch(field, "tensor map")),
        }
    }
}

/// Takes fields out of a [`FieldMap`] read from a group.
struct FieldTaker<'a> {
    location: &'a str,
    fields: FieldMap,
}

impl<'a> FieldTaker<'a> {
    fn new(location: &'a str, fields: FieldMap) -> Self {
        Self { location, fields }
    }

    fn required(&mut self, name: &str) -> Result<FieldValue, anyhow::Error> {
        match self.fields.shift_remove(name) {
            Some(FieldValue::Absent) | None => Err(XcFeatError::MalformedContainer(format!(
                "required field `{name}` missing from `{}`",
                self.location
            ))
            .into()),
            Some(value) => Ok(value),
        }
    }

    fn optional(&mut self, name: &str) -> Option<FieldValue> {
        match self.fields.shift_remove(name) {
            Some(FieldValue::Absent) | None => None,
            Some(value) => Some(value),
        }
    }
}

// ==================
// Record conversions
// ==================

/// Flattens the system data of a molecule or solid record.
pub(crate) fn system_to_fields(data: &SystemData) -> FieldMap {
    [
        ("coords", FieldValue::tensor(data.grid().coords())),
        ("weights", FieldValue::tensor(data.grid().weights())),
        ("atom_index", FieldValue::index_tensor(data.atom_index())),
        ("nuclear_pos", FieldValue::tensor(data.nuclear_pos())),
        ("ao", FieldValue::tensor(data.ao())),
        ("grad_ao", FieldValue::tensor(data.grad_ao())),
        ("grad_n_ao", FieldValue::TensorMap(data.grad_n_ao().clone())),
        ("rdm1", FieldValue::tensor(data.rdm1())),
        ("nuclear_repulsion", FieldValue::Float(data.nuclear_repulsion())),
        ("h1e", FieldValue::tensor(data.h1e())),
        ("vj", FieldValue::tensor(data.vj())),
        ("mo_coeff", FieldValue::tensor(data.mo_coeff())),
        ("mo_occ", FieldValue::tensor(data.mo_occ())),
        ("mo_energy", FieldValue::tensor(data.mo_energy())),
        ("mf_energy", FieldValue::Float(data.mf_energy())),
        ("s1e", FieldValue::tensor(data.s1e())),
        (
            "omegas",
            FieldValue::from_option(data.omegas(), |omegas| {
                FieldValue::tensor(&Array1::from_vec(omegas.to_vec()))
            }),
        ),
        ("chi", FieldValue::from_option(data.chi(), FieldValue::tensor)),
        ("rep_tensor", FieldValue::tensor(data.rep_tensor())),
        ("energy", FieldValue::from_option(data.energy(), FieldValue::Float)),
        ("basis", FieldValue::Text(data.basis().to_string())),
        (
            "name",
            FieldValue::from_option(data.name(), |name| FieldValue::Text(name.to_string())),
        ),
        ("spin", FieldValue::Integer(data.spin())),
        ("charge", FieldValue::Integer(data.charge())),
        ("unit_angstrom", FieldValue::Boolean(data.unit_angstrom())),
        (
            "grid_level",
            FieldValue::from_option(data.grid_level(), FieldValue::Integer),
        ),
        ("scf_iteration", FieldValue::Integer(data.scf_iteration())),
        ("fock", FieldValue::tensor(data.fock())),
    ]
    .into_iter()
    .collect()
}

/// Rebuilds system data from its fields.
///
/// # Arguments
///
/// * `location` - The path of the group the fields were read from, for error messages.
/// * `fields` - The fields.
pub(crate) fn system_from_fields(
    location: &str,
    fields: FieldMap,
) -> Result<SystemData, anyhow::Error> {
    let mut taker = FieldTaker::new(location, fields);
    let grid = Grid::new(
        taker.required("coords")?.into_tensor::<Ix2>("coords")?,
        taker.required("weights")?.into_tensor::<Ix1>("weights")?,
    )?;
    let omegas = taker
        .optional("omegas")
        .map(|v| v.into_tensor::<Ix1>("omegas").map(|arr| arr.to_vec()))
        .transpose()?;
    let chi = taker
        .optional("chi")
        .map(|v| v.into_tensor::<IxDyn>("chi"))
        .transpose()?;
    SystemData::builder()
        .grid(grid)
        .atom_index(
            taker
                .required("atom_index")?
                .into_index_tensor::<Ix1>("atom_index")?,
        )
        .nuclear_pos(
            taker
                .required("nuclear_pos")?
                .into_tensor::<Ix2>("nuclear_pos")?,
        )
        .ao(taker.required("ao")?.into_tensor("ao")?)
        .grad_ao(taker.required("grad_ao")?.into_tensor("grad_ao")?)
        .grad_n_ao(taker.required("grad_n_ao")?.into_tensor_map("grad_n_ao")?)
        .rdm1(taker.required("rdm1")?.into_tensor("rdm1")?)
        .nuclear_repulsion(
            taker
                .required("nuclear_repulsion")?
                .into_float("nuclear_repulsion")?,
        )
        .h1e(taker.required("h1e")?.into_tensor("h1e")?)
        .vj(taker.required("vj")?.into_tensor("vj")?)
        .mo_coeff(taker.required("mo_coeff")?.into_tensor("mo_coeff")?)
        .mo_occ(taker.required("mo_occ")?.into_tensor("mo_occ")?)
        .mo_energy(taker.required("mo_energy")?.into_tensor("mo_energy")?)
        .mf_energy(taker.required("mf_energy")?.into_float("mf_energy")?)
        .s1e(taker.required("s1e")?.into_tensor("s1e")?)
        .omegas(omegas)
        .chi(chi)
        .rep_tensor(taker.required("rep_tensor")?.into_tensor("rep_tensor")?)
        .energy(
            taker
                .optional("energy")
                .map(|v| v.into_float("energy"))
                .transpose()?,
        )
        .basis(taker.required("basis")?.into_text("basis")?)
        .name(
            taker
                .optional("name")
                .map(|v| v.into_text("name"))
                .transpose()?,
        )
        .spin(taker.required("spin")?.into_integer("spin")?)
        .charge(taker.required("charge")?.into_integer("charge")?)
        .unit_angstrom(
            taker
                .required("unit_angstrom")?
                .into_boolean("unit_angstrom")?,
        )
        .grid_level(
            taker
                .optional("grid_level")
                .map(|v| v.into_integer("grid_level"))
                .transpose()?,
        )
        .scf_iteration(
            taker
                .required("scf_iteration")?
                .into_integer("scf_iteration")?,
        )
        .fock(taker.required("fock")?.into_tensor("fock")?)
        .build()
        .map_err(|err| {
            XcFeatError::MalformedContainer(format!("invalid system data in `{location}`: {err}"))
                .into()
        })
}

/// Flattens the periodic information of a solid record.
pub(crate) fn periodic_to_fields(
    lattice_vectors: &ndarray::Array2<f64>,
    kpt_info: &KPointInfo,
) -> FieldMap {
    [
        ("lattice_vectors", FieldValue::tensor(lattice_vectors)),
        ("kpts_abs", FieldValue::tensor(kpt_info.kpts_abs())),
        ("kpts_scaled", FieldValue::tensor(kpt_info.kpts_scaled())),
        ("kpt_weights", FieldValue::tensor(kpt_info.weights())),
        (
            "bz2ibz_map",
            FieldValue::from_option(kpt_info.bz2ibz_map(), FieldValue::index_tensor),
        ),
        (
            "ibz2bz_map",
            FieldValue::from_option(kpt_info.ibz2bz_map(), FieldValue::index_tensor),
        ),
        (
            "kpts_ir_abs",
            FieldValue::from_option(kpt_info.kpts_ir_abs(), FieldValue::tensor),
        ),
        (
            "kpts_ir_scaled",
            FieldValue::from_option(kpt_info.kpts_ir_scaled(), FieldValue::tensor),
        ),
    ]
    .into_iter()
    .collect()
}

/// Rebuilds the lattice vectors and Brillouin-zone sampling of a solid record.
pub(crate) fn periodic_from_fields(
    location: &str,
    fields: FieldMap,
) -> Result<(ndarray::Array2<f64>, KPointInfo), anyhow::Error> {
    let mut taker = FieldTaker::new(location, fields);
    let lattice_vectors = taker
        .required("lattice_vectors")?
        .into_tensor::<Ix2>("lattice_vectors")?;
    let kpt_info = KPointInfo::builder()
        .kpts_abs(taker.required("kpts_abs")?.into_tensor::<Ix2>("kpts_abs")?)
        .kpts_scaled(
            taker
                .required("kpts_scaled")?
                .into_tensor::<Ix2>("kpts_scaled")?,
        )
        .weights(
            taker
                .required("kpt_weights")?
                .into_tensor::<Ix1>("kpt_weights")?,
        )
        .bz2ibz_map(
            taker
                .optional("bz2ibz_map")
                .map(|v| v.into_index_tensor::<Ix1>("bz2ibz_map"))
                .transpose()?,
        )
        .ibz2bz_map(
            taker
                .optional("ibz2bz_map")
                .map(|v| v.into_index_tensor::<Ix1>("ibz2bz_map"))
                .transpose()?,
        )
        .kpts_ir_abs(
            taker
                .optional("kpts_ir_abs")
                .map(|v| v.into_tensor::<Ix2>("kpts_ir_abs"))
                .transpose()?,
        )
        .kpts_ir_scaled(
            taker
                .optional("kpts_ir_scaled")
                .map(|v| v.into_tensor::<Ix2>("kpts_ir_scaled"))
                .transpose()?,
        )
        .build()
        .map_err(|err| {
            XcFeatError::MalformedContainer(format!("invalid k-points in `{location}`: {err}"))
        })?;
    Ok((lattice_vectors, kpt_info))
}

/// Flattens the scalar fields of a reaction.
pub(crate) fn reaction_to_fields(energy: f64, name: Option<&str>) -> FieldMap {
    [
        ("energy", FieldValue::Float(energy)),
        (
            "name",
            FieldValue::from_option(name, |name| FieldValue::Text(name.to_string())),
        ),
    ]
    .into_iter()
    .collect()
}

/// Rebuilds the energy and name of a reaction.
pub(crate) fn reaction_from_fields(
    location: &str,
    fields: FieldMap,
) -> Result<(f64, Option<String>), anyhow::Error> {
    let mut taker = FieldTaker::new(location, fields);
    let energy = taker.required("energy")?.into_float("energy")?;
    let name = taker
        .optional("name")
        .map(|v| v.into_text("name"))
        .transpose()?;
    Ok((energy, name))
}

/// Flattens the stoichiometric number of a reaction constituent.
pub(crate) fn stoichiometry_to_fields(is_reactant: bool, number: i64) -> FieldMap {
    let key = if is_reactant {
        "reactant_numbers"
    } else {
        "product_numbers"
    };
    [(key, FieldValue::Integer(number))].into_iter().collect()
}

/// Recovers the stoichiometric number of a reaction constituent.
pub(crate) fn stoichiometry_from_fields(
    location: &str,
    is_reactant: bool,
    fields: FieldMap,
) -> Result<i64, anyhow::Error> {
    let key = if is_reactant {
        "reactant_numbers"
    } else {
        "product_numbers"
    };
    FieldTaker::new(location, fields)
        .required(key)?
        .into_integer(key)
}

// ===================
// Reading and writing
// ===================

/// Writes the fields of `fields` described by `specs` into `group`.
///
/// # Errors
///
/// Errors if a required field is absent, or if HDF5 fails to write a field.
pub(crate) fn write_fields(
    group: &Group,
    specs: &[FieldSpec],
    fields: &FieldMap,
) -> Result<(), anyhow::Error> {
    for spec in specs {
        let value = fields
            .get(spec.name)
            .ok_or_else(|| format_err!("No value supplied for field `{}`.", spec.name))?;
        if matches!(value, FieldValue::Absent) && !spec.optional {
            return Err(format_err!("Required field `{}` has no value.", spec.name));
        }
        write_field(group, spec.name, value)?;
    }
    Ok(())
}

/// Writes one field into `group`.
fn write_field(group: &Group, name: &str, value: &FieldValue) -> Result<(), anyhow::Error> {
    match value {
        FieldValue::Float(v) => {
            group.new_dataset_builder().with_data(&arr0(*v)).create(name)?;
        }
        FieldValue::Integer(v) => {
            group.new_dataset_builder().with_data(&arr0(*v)).create(name)?;
        }
        FieldValue::Boolean(v) => {
            group.new_dataset_builder().with_data(&arr0(*v)).create(name)?;
        }
        FieldValue::Text(s) => {
            let text = VarLenUnicode::from_str(s)
                .map_err(|err| format_err!("Unable to store `{name}` as UTF-8 text: {err}"))?;
            group.new_dataset_builder().with_data(&arr0(text)).create(name)?;
        }
        FieldValue::Tensor(arr) => {
            group.new_dataset_builder().with_data(arr).create(name)?;
        }
        FieldValue::IndexTensor(arr) => {
            group.new_dataset_builder().with_data(arr).create(name)?;
        }
        FieldValue::TensorMap(map) => {
            let subgroup = group.create_group(name)?;
            for (order, arr) in map.iter() {
                subgroup
                    .new_dataset_builder()
                    .with_data(arr)
                    .create(order.to_string().as_str())?;
            }
        }
        FieldValue::Absent => {
            log::debug!("Writing placeholder for absent field `{name}`.");
            let dataset = group
                .new_dataset_builder()
                .with_data(&Array1::from_elem(1, f64::NAN))
                .create(name)?;
            dataset
                .new_attr_builder()
                .with_data(&arr0(true))
                .create(PLACEHOLDER_ATTR)?;
        }
    }
    Ok(())
}

/// Reads the fields described by `specs` from `group`.
///
/// Absent optional fields, either missing or stored as placeholders, are read as
/// [`FieldValue::Absent`].
///
/// # Errors
///
/// Errors with [`XcFeatError::MalformedContainer`] if a required field is missing.
pub(crate) fn read_fields(group: &Group, specs: &[FieldSpec]) -> Result<FieldMap, anyhow::Error> {
    specs
        .iter()
        .map(|spec| read_field(group, spec).map(|value| (spec.name, value)))
        .collect()
}

/// Reads one field from `group`.
fn read_field(group: &Group, spec: &FieldSpec) -> Result<FieldValue, anyhow::Error> {
    let name = spec.name;
    if !group.link_exists(name) {
        if spec.optional {
            return Ok(FieldValue::Absent);
        }
        return Err(XcFeatError::MalformedContainer(format!(
            "required field `{name}` missing from `{}`",
            group.name()
        ))
        .into());
    }

    if spec.kind == FieldKind::TensorMap {
        return read_tensor_map(&group.group(name)?);
    }

    let dataset = group.dataset(name)?;
    let is_placeholder = dataset
        .attr_names()?
        .iter()
        .any(|attr| attr == PLACEHOLDER_ATTR)
        && dataset.attr(PLACEHOLDER_ATTR)?.read_scalar::<bool>()?;
    if is_placeholder {
        if spec.optional {
            return Ok(FieldValue::Absent);
        }
        return Err(XcFeatError::MalformedContainer(format!(
            "required field `{name}` of `{}` is a placeholder",
            group.name()
        ))
        .into());
    }

    let value = match spec.kind {
        FieldKind::Scalar(ScalarKind::Float) => FieldValue::Float(dataset.read_scalar::<f64>()?),
        FieldKind::Scalar(ScalarKind::Integer) => {
            FieldValue::Integer(dataset.read_scalar::<i64>()?)
        }
        FieldKind::Scalar(ScalarKind::Boolean) => {
            FieldValue::Boolean(dataset.read_scalar::<bool>()?)
        }
        FieldKind::Text => {
            FieldValue::Text(dataset.read_scalar::<VarLenUnicode>()?.as_str().to_string())
        }
        FieldKind::Tensor => FieldValue::Tensor(dataset.read_dyn::<f64>()?),
        FieldKind::IndexTensor => FieldValue::IndexTensor(dataset.read_dyn::<i64>()?),
        FieldKind::TensorMap => {
            return Err(XcFeatError::MalformedContainer(format!(
                "field `{name}` of `{}` is a dataset where a group is expected",
                group.name()
            ))
            .into())
        }
    };
    Ok(value)
}

/// Reads a sub-group of datasets keyed by non-negative integers.
fn read_tensor_map(subgroup: &Group) -> Result<FieldValue, anyhow::Error> {
    let map = subgroup
        .member_names()?
        .into_iter()
        .map(|key| {
            let order = key.parse::<usize>().map_err(|_| {
                XcFeatError::MalformedContainer(format!(
                    "non-integer key `{key}` in `{}`",
                    subgroup.name()
                ))
            })?;
            let arr = subgroup.dataset(&key)?.read_dyn::<f64>()?;
            Ok((order, arr))
        })
        .collect::<Result<BTreeMap<_, _>, anyhow::Error>>()?;
    Ok(FieldValue::TensorMap(map))
}
