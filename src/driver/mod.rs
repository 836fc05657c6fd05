use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use thiserror::Error;
use tracing::{debug, instrument};
use tracing_subscriber::EnvFilter;

use crate::{
    check::verify_graph,
    compile_unit_info::{CompileUnitInfo, DumpGraph, OptLevel},
    ir::{
        canonicalizer::{CanonicalizationError, CanonicalizationStats, Canonicalizer},
        errors::GraphError,
        lowering::{LoweringError, TextBackend, lower_graph},
        memory::assign_memory_edges,
    },
    profdiff::CompilationTrees,
};

use self::{
    config::{Config, ConfigError, DEFAULT_CONFIG_FILE},
    unit_file::{UnitFile, UnitFileError},
};

pub mod config;
pub mod unit_file;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    UnitFile(#[from] UnitFileError),
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Lowering(#[from] LoweringError),
}

/// The result of compiling one unit.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub name: String,
    /// Graph dumps requested by the unit's options, in pipeline order.
    pub dumps: Vec<String>,
    /// `None` when canonicalization was skipped.
    pub canonicalization: Option<CanonicalizationStats>,
    pub memory_edges: usize,
    pub listing: String,
}

/// Builds, optimizes, checks, and lowers `unit`.
#[instrument(level = "debug", skip_all, fields(unit = %unit.name))]
pub fn compile_unit(
    unit: &UnitFile,
    info: &CompileUnitInfo,
    config: &Config,
) -> Result<CompiledUnit, DriverError> {
    let platform = config.platform.build();
    let mut graph = unit.build_graph(&platform)?;
    let mut dumps = Vec::new();
    if info.dumps_before() {
        dumps.push(graph.to_string());
    }

    let canonicalization = match info.optlevel {
        OptLevel::None => None,
        OptLevel::Default => {
            let stats = Canonicalizer::new(config.canonicalizer).apply(&mut graph)?;
            debug!(?stats, "canonicalized");
            Some(stats)
        }
    };
    let memory_edges = assign_memory_edges(&mut graph)?;
    verify_graph(&graph)?;
    if info.dumps_after() {
        dumps.push(graph.to_string());
    }

    let mut backend = TextBackend::default();
    lower_graph(&graph, &platform, &mut backend)?;

    Ok(CompiledUnit {
        name: unit.name.clone(),
        dumps,
        canonicalization,
        memory_edges,
        listing: backend.listing(),
    })
}

/// Reads and compiles one unit file.
pub fn compile_file(info: &CompileUnitInfo, config: &Config) -> Result<CompiledUnit, DriverError> {
    let unit = UnitFile::from_file(&info.file_path)?;
    compile_unit(&unit, info, config)
}

/// Compiles every unit on its own thread. Results keep the input order.
pub fn compile_files(
    units: &[CompileUnitInfo],
    config: &Config,
) -> Vec<Result<CompiledUnit, DriverError>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = units
            .iter()
            .map(|info| scope.spawn(move || compile_file(info, config)))
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CompilerArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile unit files and print their lowered listings.
    Compile {
        /// The unit description files.
        #[arg(required = true)]
        units: Vec<PathBuf>,

        /// The config file. Defaults to seagraph.toml if it exists.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Lower the graphs without canonicalizing them.
        #[arg(long, default_value_t = false)]
        no_opt: bool,

        /// Print the graph before or after optimization.
        #[arg(long, value_enum)]
        dump_graph: Option<DumpGraph>,
    },
    /// Attribute recorded optimizations to the inlining tree.
    Attribute {
        /// A TOML file with the inlining and optimization trees.
        trees: PathBuf,
    },
}

pub fn main() -> anyhow::Result<()> {
    let start_time = Instant::now();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = CompilerArgs::parse();
    match args.command {
        Command::Compile {
            units,
            config,
            no_opt,
            dump_graph,
        } => {
            let config_path = config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            let config = Config::from_file(&config_path)
                .with_context(|| format!("loading {}", config_path.display()))?;
            tracing::debug!("Compiling with config: {:#?}", config);
            let infos: Vec<CompileUnitInfo> = units
                .into_iter()
                .map(|path| CompileUnitInfo {
                    optlevel: if no_opt { OptLevel::None } else { OptLevel::Default },
                    dump_graph,
                    ..CompileUnitInfo::new(path)
                })
                .collect();
            run_compile(&infos, &config)?;
        }
        Command::Attribute { trees } => run_attribute(&trees)?,
    }

    let elapsed = start_time.elapsed();
    tracing::debug!("Done in {:?}", elapsed);

    Ok(())
}

fn run_compile(infos: &[CompileUnitInfo], config: &Config) -> anyhow::Result<()> {
    let results = compile_files(infos, config);
    let mut failed = 0;
    for (info, result) in infos.iter().zip(results) {
        match result {
            Ok(unit) => {
                for dump in &unit.dumps {
                    println!("{dump}");
                }
                println!("{}", unit.listing);
            }
            Err(err) => {
                failed += 1;
                let err = anyhow::Error::new(err)
                    .context(format!("compiling {}", info.file_path.display()));
                eprintln!("{}: {err:#}", "error".red().bold());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} units failed to compile", infos.len());
    }
    Ok(())
}

fn run_attribute(path: &Path) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let trees = CompilationTrees::from_toml(&source)
        .with_context(|| format!("parsing {}", path.display()))?;
    let tree = trees.context_tree();
    let warnings = tree.root().count_duplicate_path_warnings();
    if warnings > 0 {
        eprintln!(
            "{}: {warnings} inlining paths of {} are ambiguous",
            "warning".yellow().bold(),
            trees.method
        );
    }
    print!("{tree}");
    Ok(())
}
