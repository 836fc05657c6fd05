//! Compilation units described as TOML.
//!
//! A unit lists named floating `values` (parameters, constants, arithmetic,
//! frame states), a `body` of fixed nodes executed in order from the start,
//! and exception `handlers`. Values are built when first referenced, so they
//! may be listed in any order. A fixed node can only be referenced after it
//! appears in a body.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    foreign::runtime_calls,
    ir::{
        NodeIndex,
        errors::GraphError,
        graph::Graph,
        location::LocationIdentity,
        nodes::{
            ArrayCopyNode, BinaryArithmeticNode, BinaryOp, ExceptionObjectNode, ForeignCallNode,
            FrameStateNode, ParameterNode, ReturnNode, ShuffleBitsNode, ShuffleMode, UnwindNode,
            WriteNode,
        },
        stamp::Stamp,
        types::{ElementKind, TypeRef},
    },
    platform::PlatformConfiguration,
};

/// Marks a dead slot in the locals or stack of a frame state.
pub const DEAD_SLOT: &str = "-";

#[derive(Debug, Error)]
pub enum UnitFileError {
    #[error("failed to read unit file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("{name:?} is defined more than once")]
    DuplicateName { name: String },
    #[error("{name:?} is not defined at this point")]
    Undefined { name: String },
    #[error("{name:?} depends on itself")]
    Cycle { name: String },
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("unknown operation {0:?}")]
    UnknownOperation(String),
    #[error("integer width {0} is not between 1 and 64")]
    InvalidWidth(u32),
    #[error("unknown location {0:?}")]
    UnknownLocation(String),
    #[error("unknown runtime call {0:?}")]
    UnknownCall(String),
    #[error("unknown exception handler {0:?}")]
    UnknownHandler(String),
    #[error("block {block:?} continues after its terminator")]
    AfterTerminator { block: String },
    #[error("block {block:?} does not end in a return or unwind")]
    MissingTerminator { block: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitFile {
    /// The unit's name, also the name of its graph.
    pub name: String,
    /// The frame state of the method entry.
    pub state: Option<String>,
    #[serde(default)]
    pub values: Vec<ValueDecl>,
    #[serde(default)]
    pub body: Vec<FixedDecl>,
    #[serde(default)]
    pub handlers: Vec<HandlerDecl>,
}

fn default_bits() -> u32 {
    32
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValueDecl {
    /// Parameters are numbered in declaration order.
    Param {
        name: String,
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        non_null: bool,
    },
    Const {
        name: String,
        #[serde(default = "default_bits")]
        bits: u32,
        value: i64,
    },
    /// `op` is an arithmetic operation or `compress`/`expand`.
    Binary {
        name: String,
        op: String,
        x: String,
        y: String,
    },
    State {
        name: String,
        bci: i32,
        #[serde(default)]
        locals: Vec<String>,
        #[serde(default)]
        stack: Vec<String>,
        #[serde(default)]
        monitors: Vec<String>,
        outer: Option<String>,
        #[serde(default)]
        rethrow: bool,
        #[serde(default)]
        during_call: bool,
    },
}

impl ValueDecl {
    pub fn name(&self) -> &str {
        match self {
            ValueDecl::Param { name, .. }
            | ValueDecl::Const { name, .. }
            | ValueDecl::Binary { name, .. }
            | ValueDecl::State { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FixedDecl {
    Write {
        object: String,
        offset: String,
        value: String,
        location: String,
        state: Option<String>,
    },
    #[serde(rename = "arraycopy")]
    ArrayCopy {
        #[serde(default)]
        bci: i32,
        /// `[src, src_pos, dest, dest_pos, length]`
        args: [String; 5],
        state_during: Option<String>,
        state_after: Option<String>,
        handler: String,
    },
    Call {
        /// Names the call's result.
        name: Option<String>,
        target: String,
        #[serde(default)]
        bci: i32,
        #[serde(default)]
        args: Vec<String>,
        state: Option<String>,
    },
    Return {
        value: Option<String>,
    },
    Unwind {
        exception: String,
    },
}

impl FixedDecl {
    fn is_terminator(&self) -> bool {
        matches!(self, FixedDecl::Return { .. } | FixedDecl::Unwind { .. })
    }
}

/// An exception handler. Its name refers to the caught exception.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerDecl {
    pub name: String,
    pub state: Option<String>,
    #[serde(default)]
    pub body: Vec<FixedDecl>,
}

/// Parses `any`, `init`, `int[]`, `final Name.field` or `Name.field`.
pub fn parse_location(text: &str) -> Option<LocationIdentity> {
    match text.trim() {
        "any" => Some(LocationIdentity::Any),
        "init" => Some(LocationIdentity::Init),
        text => {
            if let Some(kind) = text.strip_suffix("[]") {
                let kind = match kind {
                    "object" => ElementKind::Object,
                    kind => ElementKind::from_name(kind)?,
                };
                return Some(LocationIdentity::array_location(kind));
            }
            let (name, immutable) = match text.strip_prefix("final ") {
                Some(name) => (name.trim(), true),
                None => (text, false),
            };
            if name.is_empty() || name.contains(char::is_whitespace) {
                return None;
            }
            Some(LocationIdentity::Field {
                name: name.into(),
                immutable,
            })
        }
    }
}

fn shuffle_mode(op: &str) -> Option<ShuffleMode> {
    match op {
        "compress" => Some(ShuffleMode::Compress),
        "expand" => Some(ShuffleMode::Expand),
        _ => None,
    }
}

impl UnitFile {
    pub fn from_toml(source: &str) -> Result<Self, UnitFileError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, UnitFileError> {
        let source = std::fs::read_to_string(path).map_err(|source| UnitFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&source)
    }

    /// Builds the unit's graph. Write barriers are chosen by `platform`.
    #[instrument(level = "debug", skip_all, fields(unit = %self.name))]
    pub fn build_graph(&self, platform: &dyn PlatformConfiguration) -> Result<Graph, UnitFileError> {
        let mut builder = GraphBuilder::new(self, platform)?;

        let start = builder.graph.start();
        if let Some(state) = &self.state {
            let state = builder.resolve(state)?;
            builder.graph.set_state_after(start, Some(state))?;
        }
        builder.build_block(&self.name, start, &self.body)?;

        let mut handlers = HashMap::new();
        for handler in &self.handlers {
            let exception = builder.graph.add(ExceptionObjectNode::build())?;
            builder.define(&handler.name, exception);
            handlers.insert(handler.name.as_str(), exception);
            if let Some(state) = &handler.state {
                let state = builder.resolve(state)?;
                builder.graph.set_state_after(exception, Some(state))?;
            }
            builder.build_block(&handler.name, exception, &handler.body)?;
        }

        for (node, handler) in std::mem::take(&mut builder.exception_edges) {
            let target = *handlers
                .get(handler)
                .ok_or_else(|| UnitFileError::UnknownHandler(handler.to_string()))?;
            let index = builder.graph[node]
                .kind()
                .as_with_exception_edge()
                .map(|with_exception| with_exception.exception_successor())
                .ok_or_else(|| UnitFileError::UnknownHandler(handler.to_string()))?;
            builder.graph.set_successor(node, index, Some(target))?;
        }

        debug!(nodes = builder.graph.len(), "built graph");
        Ok(builder.graph)
    }
}

struct GraphBuilder<'u> {
    graph: Graph,
    platform: &'u dyn PlatformConfiguration,
    values: HashMap<&'u str, &'u ValueDecl>,
    parameters: HashMap<&'u str, u32>,
    defined: HashMap<&'u str, NodeIndex>,
    visiting: HashSet<&'u str>,
    exception_edges: Vec<(NodeIndex, &'u str)>,
}

impl<'u> GraphBuilder<'u> {
    fn new(unit: &'u UnitFile, platform: &'u dyn PlatformConfiguration) -> Result<Self, UnitFileError> {
        let call_names = unit
            .body
            .iter()
            .chain(unit.handlers.iter().flat_map(|handler| &handler.body))
            .filter_map(|decl| match decl {
                FixedDecl::Call { name, .. } => name.as_deref(),
                _ => None,
            });
        let names = unit
            .values
            .iter()
            .map(ValueDecl::name)
            .chain(unit.handlers.iter().map(|handler| handler.name.as_str()))
            .chain(call_names);
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(UnitFileError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }

        let parameters = unit
            .values
            .iter()
            .filter(|decl| matches!(decl, ValueDecl::Param { .. }))
            .zip(0..)
            .map(|(decl, index)| (decl.name(), index))
            .collect();

        Ok(Self {
            graph: Graph::new(unit.name.clone()),
            platform,
            values: unit.values.iter().map(|decl| (decl.name(), decl)).collect(),
            parameters,
            defined: HashMap::new(),
            visiting: HashSet::new(),
            exception_edges: Vec::new(),
        })
    }

    fn define(&mut self, name: &'u str, node: NodeIndex) {
        self.defined.insert(name, node);
    }

    /// The node named `name`, building it first if it is a value.
    fn resolve(&mut self, name: &'u str) -> Result<NodeIndex, UnitFileError> {
        if let Some(&node) = self.defined.get(name) {
            return Ok(node);
        }
        let Some(&decl) = self.values.get(name) else {
            return Err(UnitFileError::Undefined {
                name: name.to_string(),
            });
        };
        if !self.visiting.insert(name) {
            return Err(UnitFileError::Cycle {
                name: name.to_string(),
            });
        }
        let node = self.build_value(decl)?;
        self.visiting.remove(name);
        self.define(name, node);
        Ok(node)
    }

    fn resolve_all(&mut self, names: &'u [String]) -> Result<Vec<NodeIndex>, UnitFileError> {
        names.iter().map(|name| self.resolve(name)).collect()
    }

    fn resolve_slots(&mut self, names: &'u [String]) -> Result<Vec<Option<NodeIndex>>, UnitFileError> {
        names
            .iter()
            .map(|name| match name.as_str() {
                DEAD_SLOT => Ok(None),
                name => self.resolve(name).map(Some),
            })
            .collect()
    }

    fn resolve_optional(&mut self, name: &'u Option<String>) -> Result<Option<NodeIndex>, UnitFileError> {
        name.as_deref().map(|name| self.resolve(name)).transpose()
    }

    fn build_value(&mut self, decl: &'u ValueDecl) -> Result<NodeIndex, UnitFileError> {
        match decl {
            ValueDecl::Param { name, ty, non_null } => {
                let ty = TypeRef::parse(ty).ok_or_else(|| UnitFileError::UnknownType(ty.clone()))?;
                let index = self.parameters[name.as_str()];
                Ok(self
                    .graph
                    .add(ParameterNode::build(index, Stamp::for_type(&ty, *non_null)))?)
            }
            ValueDecl::Const { bits, value, .. } => {
                if !(1..=64).contains(bits) {
                    return Err(UnitFileError::InvalidWidth(*bits));
                }
                Ok(self.graph.constant(*bits, *value))
            }
            ValueDecl::Binary { op, x, y, .. } => {
                let x = self.resolve(x)?;
                let y = self.resolve(y)?;
                let builder = match (BinaryOp::from_name(op), shuffle_mode(op)) {
                    (Some(op), _) => BinaryArithmeticNode::build(&mut self.graph, op, x, y)?,
                    (None, Some(mode)) => ShuffleBitsNode::build(&mut self.graph, mode, x, y)?,
                    (None, None) => return Err(UnitFileError::UnknownOperation(op.clone())),
                };
                Ok(self.graph.add_or_unique(builder)?)
            }
            ValueDecl::State {
                bci,
                locals,
                stack,
                monitors,
                outer,
                rethrow,
                during_call,
                ..
            } => {
                let locals = self.resolve_slots(locals)?;
                let stack = self.resolve_slots(stack)?;
                let monitors = self.resolve_all(monitors)?;
                let outer = self.resolve_optional(outer)?;
                let mut state = FrameStateNode::new(*bci);
                state.rethrow_exception = *rethrow;
                state.during_call = *during_call;
                Ok(self.graph.add(state.build(locals, stack, monitors, outer))?)
            }
        }
    }

    /// Builds `body` after `entry`, linking each node to the next.
    fn build_block(
        &mut self,
        block: &str,
        entry: NodeIndex,
        body: &'u [FixedDecl],
    ) -> Result<(), UnitFileError> {
        let mut last = entry;
        let mut terminated = false;
        for decl in body {
            if terminated {
                return Err(UnitFileError::AfterTerminator {
                    block: block.to_string(),
                });
            }
            let node = self.build_fixed(decl)?;
            self.graph.set_next(last, node)?;
            last = node;
            terminated = decl.is_terminator();
        }
        if !terminated {
            return Err(UnitFileError::MissingTerminator {
                block: block.to_string(),
            });
        }
        Ok(())
    }

    fn attach_state_after(
        &mut self,
        node: NodeIndex,
        state: &'u Option<String>,
    ) -> Result<(), UnitFileError> {
        if let Some(state) = self.resolve_optional(state)? {
            self.graph.set_state_after(node, Some(state))?;
        }
        Ok(())
    }

    fn build_fixed(&mut self, decl: &'u FixedDecl) -> Result<NodeIndex, UnitFileError> {
        match decl {
            FixedDecl::Write {
                object,
                offset,
                value,
                location,
                state,
            } => {
                let location = parse_location(location)
                    .ok_or_else(|| UnitFileError::UnknownLocation(location.clone()))?;
                let object = self.resolve(object)?;
                let offset = self.resolve(offset)?;
                let value = self.resolve(value)?;
                let builder =
                    WriteNode::build(&self.graph, self.platform, object, offset, value, location)?;
                let node = self.graph.add(builder)?;
                self.attach_state_after(node, state)?;
                Ok(node)
            }
            FixedDecl::ArrayCopy {
                bci,
                args,
                state_during,
                state_after,
                handler,
            } => {
                let [src, src_pos, dest, dest_pos, length] = args;
                let args = [
                    self.resolve(src)?,
                    self.resolve(src_pos)?,
                    self.resolve(dest)?,
                    self.resolve(dest_pos)?,
                    self.resolve(length)?,
                ];
                let builder = ArrayCopyNode::build(&self.graph, *bci, args)?;
                let node = self.graph.add(builder)?;
                if let Some(state) = self.resolve_optional(state_during)? {
                    self.graph.set_state_during(node, Some(state))?;
                }
                self.attach_state_after(node, state_after)?;
                self.exception_edges.push((node, handler.as_str()));
                Ok(node)
            }
            FixedDecl::Call {
                name,
                target,
                bci,
                args,
                state,
            } => {
                let descriptor = runtime_calls()
                    .get(target)
                    .cloned()
                    .ok_or_else(|| UnitFileError::UnknownCall(target.clone()))?;
                let args = self.resolve_all(args)?;
                let builder = ForeignCallNode::build(&self.graph, descriptor, *bci, &args)?;
                let node = self.graph.add(builder)?;
                self.attach_state_after(node, state)?;
                if let Some(name) = name {
                    self.define(name, node);
                }
                Ok(node)
            }
            FixedDecl::Return { value } => {
                let value = self.resolve_optional(value)?;
                Ok(self.graph.add(ReturnNode::build(value))?)
            }
            FixedDecl::Unwind { exception } => {
                let exception = self.resolve(exception)?;
                Ok(self.graph.add(UnwindNode::build(exception))?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StaticPlatformConfiguration;
    use test_case::test_case;

    fn build(source: &str) -> Result<Graph, UnitFileError> {
        UnitFile::from_toml(source)?.build_graph(&StaticPlatformConfiguration::default())
    }

    #[test_case("any", Some(LocationIdentity::Any) ; "any")]
    #[test_case("init", Some(LocationIdentity::Init) ; "init")]
    #[test_case("long[]", Some(LocationIdentity::ArrayElements(ElementKind::Long)) ; "array")]
    #[test_case("object[]", Some(LocationIdentity::ArrayElements(ElementKind::Object)) ; "object array")]
    #[test_case("Point.x", Some(LocationIdentity::field("Point.x")) ; "field")]
    #[test_case("final Point.y", Some(LocationIdentity::Field { name: "Point.y".into(), immutable: true }) ; "final field")]
    #[test_case("Point x", None ; "whitespace")]
    #[test_case("wide[]", None ; "unknown array kind")]
    fn locations(text: &str, expected: Option<LocationIdentity>) {
        assert_eq!(parse_location(text), expected);
    }

    #[test]
    fn values_are_built_on_first_use() {
        let graph = build(
            r#"
name = "lazy"
values = [
    { kind = "binary", name = "sum", op = "add", x = "a", y = "one" },
    { kind = "const", name = "one", value = 1 },
    { kind = "param", name = "a", type = "int" },
    { kind = "param", name = "unused", type = "long" },
]
body = [{ kind = "return", value = "sum" }]
"#,
        )
        .unwrap();
        assert_eq!(graph.name(), "lazy");
        // start, sum, a, one, return
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn cycles_are_reported() {
        let err = build(
            r#"
name = "cycle"
values = [
    { kind = "binary", name = "a", op = "add", x = "b", y = "b" },
    { kind = "binary", name = "b", op = "add", x = "a", y = "a" },
]
body = [{ kind = "return", value = "a" }]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, UnitFileError::Cycle { ref name } if name == "a"), "{err:?}");
    }

    #[test]
    fn calls_must_come_before_their_uses() {
        let err = build(
            r#"
name = "early"
values = [{ kind = "param", name = "o", type = "Object" }]
body = [
    { kind = "return", value = "hash" },
    { kind = "call", name = "hash", target = "identity_hash_code", args = ["o"] },
]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, UnitFileError::Undefined { ref name } if name == "hash"), "{err:?}");
    }

    #[test_case(
        "name = \"dup\"\nvalues = [{ kind = \"const\", name = \"a\", value = 1 }, { kind = \"const\", name = \"a\", value = 2 }]",
        "\"a\" is defined more than once" ; "duplicate"
    )]
    #[test_case(
        "name = \"open\"\nbody = []",
        "block \"open\" does not end in a return or unwind" ; "missing terminator"
    )]
    #[test_case(
        "name = \"tail\"\nbody = [{ kind = \"return\" }, { kind = \"return\" }]",
        "block \"tail\" continues after its terminator" ; "after terminator"
    )]
    #[test_case(
        "name = \"op\"\nvalues = [{ kind = \"const\", name = \"a\", value = 1 }, { kind = \"binary\", name = \"b\", op = \"div\", x = \"a\", y = \"a\" }]\nbody = [{ kind = \"return\", value = \"b\" }]",
        "unknown operation \"div\"" ; "unknown operation"
    )]
    #[test_case(
        "name = \"call\"\nbody = [{ kind = \"call\", target = \"nope\" }, { kind = \"return\" }]",
        "unknown runtime call \"nope\"" ; "unknown call"
    )]
    #[test_case(
        "name = \"wide\"\nvalues = [{ kind = \"const\", name = \"a\", bits = 65, value = 1 }]\nbody = [{ kind = \"return\", value = \"a\" }]",
        "integer width 65 is not between 1 and 64" ; "constant too wide"
    )]
    fn invalid_units(source: &str, message: &str) {
        assert_eq!(build(source).unwrap_err().to_string(), message);
    }
}
