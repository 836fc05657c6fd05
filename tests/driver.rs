use crate::common::write_files;
use seagraph::compile_unit_info::{CompileUnitInfo, OptLevel};
use seagraph::driver::config::{Config, ConfigError, DEFAULT_CONFIG_FILE};
use seagraph::driver::unit_file::UnitFileError;
use seagraph::driver::{DriverError, compile_file, compile_files};
use seagraph::platform::BarrierSetKind;

mod common;

const ARITH: &str = include_str!("../demos/arith.toml");
const COPY_INTS: &str = include_str!("../demos/copy_ints.toml");
const STORE_AND_HASH: &str = include_str!("../demos/store_and_hash.toml");

#[test]
fn compile_files_keeps_input_order() {
    let dir = write_files(&[
        ("arith.toml", ARITH),
        ("copy_ints.toml", COPY_INTS),
        ("store_and_hash.toml", STORE_AND_HASH),
    ])
    .unwrap();
    let infos: Vec<_> = ["store_and_hash.toml", "missing.toml", "arith.toml", "copy_ints.toml"]
        .iter()
        .map(|name| CompileUnitInfo::new(dir.path().join(name)))
        .collect();

    let results = compile_files(&infos, &Config::default());
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].as_ref().unwrap().name, "store_and_hash");
    assert!(matches!(
        &results[1],
        Err(DriverError::UnitFile(UnitFileError::Io { path, .. })) if path.ends_with("missing.toml")
    ));
    assert_eq!(results[2].as_ref().unwrap().name, "arith");
    assert_eq!(results[3].as_ref().unwrap().name, "copy_ints");
}

#[test]
fn a_bad_unit_does_not_stop_the_batch() {
    let dir = write_files(&[
        ("arith.toml", ARITH),
        (
            "wide.toml",
            "name = \"wide\"\nvalues = [{ kind = \"const\", name = \"z\", bits = 65, value = 1 }]\nbody = [{ kind = \"return\", value = \"z\" }]\n",
        ),
    ])
    .unwrap();
    let infos = [
        CompileUnitInfo::new(dir.path().join("wide.toml")),
        CompileUnitInfo::new(dir.path().join("arith.toml")),
    ];

    let results = compile_files(&infos, &Config::default());
    assert!(matches!(
        &results[0],
        Err(DriverError::UnitFile(UnitFileError::InvalidWidth(65)))
    ));
    assert_eq!(results[1].as_ref().unwrap().name, "arith");
}

#[test]
fn compile_file_honors_the_opt_level() {
    let dir = write_files(&[("arith.toml", ARITH)]).unwrap();
    let info = CompileUnitInfo {
        optlevel: OptLevel::None,
        ..CompileUnitInfo::new(dir.path().join("arith.toml"))
    };
    let unit = compile_file(&info, &Config::default()).unwrap();
    assert!(unit.canonicalization.is_none());
    assert!(unit.listing.contains("sub v5, v5"));

    let unit = compile_file(&CompileUnitInfo::new(info.file_path.clone()), &Config::default()).unwrap();
    assert!(unit.canonicalization.is_some());
    assert!(!unit.listing.contains("sub"));
}

#[test]
fn missing_config_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_file(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn config_file_is_read() {
    let dir = write_files(&[(
        DEFAULT_CONFIG_FILE,
        "[platform]\nbarrier_set = \"g1\"\n\n[canonicalizer]\nmax_node_iterations = 3\n",
    )])
    .unwrap();
    let config = Config::from_file(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
    assert_eq!(config.platform.barrier_set, BarrierSetKind::G1);
    assert_eq!(config.canonicalizer.max_node_iterations, 3);
    assert_eq!(
        config.canonicalizer.max_global_iterations,
        Config::default().canonicalizer.max_global_iterations
    );
}

#[test]
fn invalid_config_file_is_reported_with_its_path() {
    let dir = write_files(&[(DEFAULT_CONFIG_FILE, "[platform]\nbarrier_set = \"zgc\"\n")]).unwrap();
    let path = dir.path().join(DEFAULT_CONFIG_FILE);
    let error = Config::from_file(&path).unwrap_err();
    assert!(
        matches!(&error, ConfigError::Parse { path: reported, .. } if *reported == path),
        "{:#?}",
        error
    );
}
