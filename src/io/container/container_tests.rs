use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use ndarray::Axis;
use serial_test::serial;

use crate::engine::mock::MockCalculation;
use crate::errors::XcFeatError;
use crate::io::container::{load, save, LoadParams, LoadedRecord, RecordKind, RecordRef};
use crate::normalisation::NormalisationParams;
use crate::records::{make_reaction, Molecule, Solid};

fn container_path(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("xcfeat_{tag}_{}.h5", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn molecule(name: Option<&str>, omegas: Option<&[f64]>) -> Molecule {
    let mut calc = MockCalculation::new(false, None, 3, 5);
    let params = NormalisationParams::builder()
        .omegas(omegas)
        .chunk_size(2)
        .build()
        .unwrap();
    Molecule::from_calculation(&mut calc, &params, Some(-1.17), name).unwrap()
}

fn solid(name: Option<&str>) -> Solid {
    let mut calc = MockCalculation::new(true, Some(3), 2, 4);
    Solid::from_calculation(&mut calc, &NormalisationParams::default(), None, name).unwrap()
}

fn ordered() -> LoadParams {
    LoadParams::builder().randomise(false).build().unwrap()
}

fn with_omegas(omegas: &[f64]) -> LoadParams {
    LoadParams::builder()
        .randomise(false)
        .omegas(Some(omegas))
        .build()
        .unwrap()
}

fn load_molecules(path: &PathBuf, params: &LoadParams) -> Vec<Molecule> {
    load(path, params)
        .unwrap()
        .map(|record| match record.unwrap() {
            LoadedRecord::Molecule(mol) => mol,
            other => panic!("Unexpected record kind `{}`.", other.kind()),
        })
        .collect()
}

#[test]
#[serial]
fn test_molecule_round_trip() {
    let path = container_path("molecule_round_trip");
    let mol = molecule(Some("H2"), Some([0.0, 0.4].as_slice()));
    assert_eq!(mol.chi().unwrap().shape(), &[5, 2, 2, 3]);
    save(&path, &[RecordRef::from(&mol)]).unwrap();

    let loaded = load_molecules(&path, &ordered());
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0], mol);
    assert_eq!(loaded[0].grad_n_ao().keys().copied().collect::<Vec<_>>(), vec![2]);

    let file = hdf5::File::open(&path).unwrap();
    assert!(file.link_exists("molecule_H2_0"));
}

#[test]
#[serial]
fn test_absent_values_round_trip() {
    let path = container_path("absent_values");
    let mut calc = MockCalculation::new(true, None, 2, 3);
    let mol =
        Molecule::from_calculation(&mut calc, &NormalisationParams::default(), None, None).unwrap();
    save(&path, &[RecordRef::from(&mol)]).unwrap();

    let loaded = load_molecules(&path, &ordered());
    assert_eq!(loaded[0], mol);
    assert!(loaded[0].energy().is_none());
    assert!(loaded[0].name().is_none());
    assert!(loaded[0].chi().is_none());

    let file = hdf5::File::open(&path).unwrap();
    let group = file.group("molecule_0").unwrap();
    let chi = group.dataset("chi").unwrap();
    assert!(chi.attr("placeholder").unwrap().read_scalar::<bool>().unwrap());
}

#[test]
#[serial]
fn test_selective_feature_reload() {
    let path = container_path("selective_reload");
    let mol = molecule(Some("H2"), Some([0.0, 0.4].as_slice()));
    let chi = mol.chi().unwrap();
    save(&path, &[RecordRef::from(&mol)]).unwrap();

    let single = load_molecules(&path, &with_omegas(&[0.4])).remove(0);
    assert_eq!(single.omegas(), Some([0.4].as_slice()));
    let single_chi = single.chi().unwrap();
    assert_eq!(single_chi.shape(), &[5, 1, 2, 3]);
    assert_abs_diff_eq!(
        single_chi.index_axis(Axis(1), 0),
        chi.index_axis(Axis(1), 1)
    );

    let swapped = load_molecules(&path, &with_omegas(&[0.4, 0.0])).remove(0);
    let swapped_chi = swapped.chi().unwrap();
    assert_abs_diff_eq!(swapped_chi.index_axis(Axis(1), 0), chi.index_axis(Axis(1), 1));
    assert_abs_diff_eq!(swapped_chi.index_axis(Axis(1), 1), chi.index_axis(Axis(1), 0));

    let none = load_molecules(&path, &with_omegas(&[])).remove(0);
    assert!(none.chi().is_none());
    assert!(none.omegas().is_none());

    let err = load(&path, &with_omegas(&[0.9]))
        .unwrap()
        .next()
        .unwrap()
        .unwrap_err();
    match err.downcast_ref::<XcFeatError>() {
        Some(XcFeatError::MissingPrecomputedFeature {
            requested,
            available,
        }) => {
            assert_eq!(requested, &vec![0.9]);
            assert_eq!(available, &vec![0.0, 0.4]);
        }
        other => panic!("Unexpected error: {other:?}"),
    }
}

#[test]
#[serial]
fn test_feature_reload_without_stored_features() {
    let path = container_path("reload_without_features");
    let mol = molecule(None, None);
    save(&path, &[RecordRef::from(&mol)]).unwrap();
    let err = load(&path, &with_omegas(&[0.0]))
        .unwrap()
        .next()
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<XcFeatError>(),
        Some(XcFeatError::MissingPrecomputedFeature { .. })
    ));
}

#[test]
#[serial]
fn test_reaction_round_trip() {
    let path = container_path("reaction_round_trip");
    let h = molecule(Some("H"), Some([0.0].as_slice()));
    let h2 = molecule(Some("H2"), Some([0.0].as_slice()));
    let reaction = make_reaction(
        vec![h.clone(), h],
        vec![h2],
        vec![1, 1],
        vec![1],
        -0.17,
        Some("atomisation"),
    )
    .unwrap();
    save(&path, &[RecordRef::from(&reaction)]).unwrap();

    let file = hdf5::File::open(&path).unwrap();
    let group = file.group("reaction_atomisation_0").unwrap();
    assert_eq!(
        group.member_names().unwrap().len(),
        5,
        "Expected `energy`, `name` and three constituents."
    );
    drop(group);
    drop(file);

    let mut records = load(&path, &ordered()).unwrap();
    assert_eq!(records.len(), 1);
    match records.next().unwrap().unwrap() {
        LoadedRecord::Reaction(loaded) => {
            assert_eq!(loaded.reactants().len(), 2);
            assert_eq!(loaded.products().len(), 1);
            assert_abs_diff_eq!(loaded.energy(), -0.17);
            assert_eq!(loaded, reaction);
        }
        other => panic!("Unexpected record kind `{}`.", other.kind()),
    }
    assert!(records.next().is_none());
}

#[test]
#[serial]
fn test_solid_round_trip() {
    let path = container_path("solid_round_trip");
    let lih = solid(Some("LiH"));
    save(&path, &[RecordRef::from(&lih)]).unwrap();

    let mut records = load(&path, &ordered()).unwrap();
    match records.next().unwrap().unwrap() {
        LoadedRecord::Solid(loaded) => {
            assert_eq!(loaded.kpt_info().n_kpoints(), 3);
            assert_eq!(loaded, lih);
        }
        other => panic!("Unexpected record kind `{}`.", other.kind()),
    }
}

#[test]
#[serial]
fn test_record_ordering() {
    let path = container_path("record_ordering");
    let a = molecule(Some("A"), None);
    let b = molecule(Some("B"), None);
    let lih = solid(None);
    let reaction = make_reaction(
        vec![a.clone()],
        vec![b.clone()],
        vec![1],
        vec![1],
        0.5,
        None,
    )
    .unwrap();
    save(
        &path,
        &[
            RecordRef::from(&lih),
            RecordRef::from(&a),
            RecordRef::from(&reaction),
            RecordRef::from(&b),
        ],
    )
    .unwrap();

    let records = load(&path, &ordered())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(
        records.iter().map(LoadedRecord::kind).collect::<Vec<_>>(),
        vec![
            RecordKind::Reaction,
            RecordKind::Molecule,
            RecordKind::Molecule,
            RecordKind::Solid
        ]
    );
    let names = records
        .iter()
        .filter_map(|record| match record {
            LoadedRecord::Molecule(mol) => mol.name().map(|n| n.to_string()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(records[0].kind().to_string(), "reaction");
}

#[test]
#[serial]
fn test_seeded_shuffle() {
    let path = container_path("seeded_shuffle");
    let mols = ["A", "B", "C", "D", "E", "F"]
        .map(|name| molecule(Some(name), None))
        .to_vec();
    let refs = mols.iter().map(RecordRef::from).collect::<Vec<_>>();
    save(&path, &refs).unwrap();

    let names = |params: &LoadParams| {
        load_molecules(&path, params)
            .iter()
            .map(|mol| mol.name().unwrap_or_default().to_string())
            .collect::<Vec<_>>()
    };
    let seeded = LoadParams::builder().seed(Some(7)).build().unwrap();
    let first = names(&seeded);
    let second = names(&seeded);
    assert_eq!(first, second);
    let mut sorted = first.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["A", "B", "C", "D", "E", "F"]);

    // Records are never shuffled outside training.
    let evaluation = LoadParams::builder()
        .training(false)
        .seed(Some(7))
        .build()
        .unwrap();
    assert_eq!(names(&evaluation), vec!["A", "B", "C", "D", "E", "F"]);
}

#[test]
#[serial]
fn test_solid_features_round_trip() {
    let path = container_path("solid_features_round_trip");
    let mut calc = MockCalculation::new(false, Some(2), 2, 4);
    let params = NormalisationParams::builder()
        .omegas(Some([0.0, 0.4].as_slice()))
        .build()
        .unwrap();
    let lih = Solid::from_calculation(&mut calc, &params, None, Some("LiH")).unwrap();
    let chi = lih.chi().unwrap();
    assert_eq!(chi.shape(), &[4, 2, 2, 2, 2]);
    save(&path, &[RecordRef::from(&lih)]).unwrap();

    let mut records = load(&path, &ordered()).unwrap();
    match records.next().unwrap().unwrap() {
        LoadedRecord::Solid(loaded) => assert_eq!(loaded, lih),
        other => panic!("Unexpected record kind `{}`.", other.kind()),
    }

    let mut records = load(&path, &with_omegas(&[0.4])).unwrap();
    match records.next().unwrap().unwrap() {
        LoadedRecord::Solid(loaded) => {
            let loaded_chi = loaded.chi().unwrap();
            assert_eq!(loaded_chi.shape(), &[4, 1, 2, 2, 2]);
            assert_abs_diff_eq!(
                loaded_chi.index_axis(Axis(1), 0),
                chi.index_axis(Axis(1), 1)
            );
        }
        other => panic!("Unexpected record kind `{}`.", other.kind()),
    }
}

#[test]
#[serial]
fn test_names_with_path_separators() {
    let path = container_path("names_with_path_separators");
    let mol = molecule(Some("ethane/ethene"), None);
    let reaction = make_reaction(
        vec![molecule(Some("C2H6"), None)],
        vec![molecule(Some("C2H4/H2"), None)],
        vec![1],
        vec![1],
        0.05,
        Some("dehydrogenation/ethane"),
    )
    .unwrap();
    save(
        &path,
        &[RecordRef::from(&mol), RecordRef::from(&reaction)],
    )
    .unwrap();

    {
        let file = hdf5::File::open(&path).unwrap();
        assert!(file.group("molecule_ethane_ethene_0").is_ok());
        let group = file.group("reaction_dehydrogenation_ethane_0").unwrap();
        assert!(group.group("molecule_C2H4_H2_1").is_ok());
        assert!(file.group("molecule_ethane").is_err());
    }

    let loaded = load(&path, &ordered())
        .unwrap()
        .map(|record| record.unwrap())
        .collect::<Vec<_>>();
    assert_eq!(loaded.len(), 2);
    for record in loaded {
        match record {
            LoadedRecord::Molecule(loaded) => {
                assert_eq!(loaded.name(), Some("ethane/ethene"));
                assert_eq!(loaded, mol);
            }
            LoadedRecord::Reaction(loaded) => {
                assert_eq!(loaded.name(), Some("dehydrogenation/ethane"));
                assert_eq!(loaded.products()[0].name(), Some("C2H4/H2"));
                assert_eq!(loaded, reaction);
            }
            other => panic!("Unexpected record kind `{}`.", other.kind()),
        }
    }
}

#[test]
#[serial]
fn test_duplicate_group() {
    let path = container_path("duplicate_group");
    let mol = molecule(Some("H2"), None);
    save(&path, &[RecordRef::from(&mol)]).unwrap();
    let err = save(&path, &[RecordRef::from(&mol)]).unwrap_err();
    assert_eq!(
        err.downcast_ref::<XcFeatError>(),
        Some(&XcFeatError::DuplicateGroup("molecule_H2_0".to_string()))
    );
}

#[test]
#[serial]
fn test_unrecognised_groups() {
    let path = container_path("unrecognised_groups");
    {
        let file = hdf5::File::create(&path).unwrap();
        file.create_group("trajectory_0").unwrap();
    }
    let err = load(&path, &ordered()).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<XcFeatError>(),
        Some(XcFeatError::RecordTypeError(_))
    ));

    let path = container_path("malformed_group");
    {
        let file = hdf5::File::create(&path).unwrap();
        file.create_group("molecule_0").unwrap();
    }
    let err = load(&path, &ordered())
        .unwrap()
        .next()
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<XcFeatError>(),
        Some(XcFeatError::MalformedContainer(_))
    ));
}

#[test]
fn test_load_params() {
    let params = LoadParams::default();
    assert!(params.randomise);
    assert!(params.training);
    assert!(params.omegas.is_none());
    assert!(params.seed.is_none());

    let params: LoadParams = serde_yaml::from_str("omegas: [0.0, 0.4]\nrandomise: false\n").unwrap();
    assert_eq!(params.omegas, Some(vec![0.0, 0.4]));
    assert!(!params.randomise);
    assert!(params.training);
}
