use std::path::Path;

use seagraph::compile_unit_info::{CompileUnitInfo, DumpGraph, OptLevel};
use seagraph::driver::config::Config;
use seagraph::driver::unit_file::UnitFile;
use seagraph::driver::{CompiledUnit, DriverError, compile_unit};
use tempfile::TempDir;

#[allow(unused)]
pub fn compile_source_with(
    source: &str,
    optlevel: OptLevel,
    dump_graph: Option<DumpGraph>,
    config: &Config,
) -> Result<CompiledUnit, DriverError> {
    let unit = UnitFile::from_toml(source)?;
    tracing::debug!("compiling unit {}", unit.name);
    let info = CompileUnitInfo {
        optlevel,
        dump_graph,
        ..CompileUnitInfo::new(Path::new(&unit.name).with_extension("toml"))
    };
    compile_unit(&unit, &info, config)
}

#[allow(unused)]
pub fn compile_source(source: &str, optlevel: OptLevel) -> Result<CompiledUnit, DriverError> {
    compile_source_with(source, optlevel, None, &Config::default())
}

/// The lowered listing of `source`, one entry per line.
#[allow(unused)]
pub fn compile_listing(source: &str, optlevel: OptLevel) -> Vec<String> {
    let unit = compile_source(source, optlevel).expect("unit should compile");
    unit.listing.lines().map(str::to_string).collect()
}

/// Writes `files` into a fresh directory.
#[allow(unused)]
pub fn write_files(files: &[(&str, &str)]) -> std::io::Result<TempDir> {
    let dir = tempfile::tempdir()?;
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents)?;
    }
    Ok(dir)
}
