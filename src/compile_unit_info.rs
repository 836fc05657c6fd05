use std::path::PathBuf;

/// This struct holds the information needed to compile one unit file,
/// like the optimization level and which graph dumps to produce.
#[derive(Debug, Clone)]
pub struct CompileUnitInfo {
    /// The unit description file.
    pub file_path: PathBuf,
    /// The optimization level to use with this compilation unit.
    pub optlevel: OptLevel,
    /// When to print the graph, if at all.
    pub dump_graph: Option<DumpGraph>,
}

impl CompileUnitInfo {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            optlevel: OptLevel::Default,
            dump_graph: None,
        }
    }

    pub fn dumps_before(&self) -> bool {
        matches!(self.dump_graph, Some(DumpGraph::Before | DumpGraph::Both))
    }

    pub fn dumps_after(&self) -> bool {
        matches!(self.dump_graph, Some(DumpGraph::After | DumpGraph::Both))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptLevel {
    None,    // lower the graph as built
    Default, // canonicalize before lowering
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DumpGraph {
    /// The graph as built from the unit file.
    Before,
    /// The graph that gets lowered.
    After,
    Both,
}
