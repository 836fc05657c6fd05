use std::fmt;

use itertools::Itertools;

use crate::{
    foreign::CallDescriptor,
    ir::{location::LocationIdentity, stamp::Stamp, types::ElementKind},
    platform::BarrierType,
};

/// An opaque value handle handed out by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Operand(pub u32);

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The entry of a block: the start of the graph or an exception handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayCopyOperands {
    pub src: Operand,
    pub src_pos: Operand,
    pub dest: Operand,
    pub dest_pos: Operand,
    pub length: Operand,
}

/// A frame state translated to operands, attached to operations that may
/// deoptimize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugState {
    pub bci: i32,
    /// Locals followed by the expression stack. `None` marks a dead slot.
    pub values: Vec<Option<Operand>>,
    pub monitors: Vec<Operand>,
    pub outer: Option<Box<DebugState>>,
    pub rethrow_exception: bool,
}

impl fmt::Display for DebugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self
            .values
            .iter()
            .map(|value| match value {
                Some(operand) => operand.to_string(),
                None => "-".to_string(),
            })
            .join(" ");
        write!(f, "@{} [{values}]", self.bci)?;
        if !self.monitors.is_empty() {
            write!(f, " locks [{}]", self.monitors.iter().join(" "))?;
        }
        if self.rethrow_exception {
            write!(f, " rethrow")?;
        }
        if let Some(outer) = &self.outer {
            write!(f, " <- {outer}")?;
        }
        Ok(())
    }
}

/// Integer operations of the target.
pub trait ArithmeticLirGenerator {
    fn emit_add(&mut self, x: Operand, y: Operand) -> Operand;
    fn emit_sub(&mut self, x: Operand, y: Operand) -> Operand;
    fn emit_mul(&mut self, x: Operand, y: Operand) -> Operand;
    fn emit_and(&mut self, x: Operand, y: Operand) -> Operand;
    fn emit_or(&mut self, x: Operand, y: Operand) -> Operand;
    fn emit_xor(&mut self, x: Operand, y: Operand) -> Operand;

    /// Gathers the bits of `value` selected by `mask` into the low bits.
    fn emit_integer_compress(&mut self, value: Operand, mask: Operand) -> Operand;

    /// Scatters the low bits of `value` to the positions selected by `mask`.
    fn emit_integer_expand(&mut self, value: Operand, mask: Operand) -> Operand;
}

/// The backend interface nodes lower themselves through.
pub trait LirGeneratorTool {
    fn arithmetic(&mut self) -> &mut dyn ArithmeticLirGenerator;

    fn emit_incoming_parameter(&mut self, index: u32, stamp: &Stamp) -> Operand;

    fn emit_constant(&mut self, bits: u32, value: i64) -> Operand;

    fn emit_label(&mut self, label: Label);

    /// Copies a range of elements of a known kind. On failure control
    /// continues at `exception`.
    fn emit_array_copy(
        &mut self,
        kind: ElementKind,
        operands: &ArrayCopyOperands,
        barrier: BarrierType,
        state: Option<&DebugState>,
        exception: Label,
    );

    /// Calls a runtime function; returns the result operand unless the
    /// descriptor's result type is void.
    fn emit_foreign_call(
        &mut self,
        descriptor: &CallDescriptor,
        arguments: &[Operand],
        state: Option<&DebugState>,
        exception: Option<Label>,
    ) -> Option<Operand>;

    fn emit_store(
        &mut self,
        object: Operand,
        offset: Operand,
        value: Operand,
        location: &LocationIdentity,
        barrier: BarrierType,
        state: Option<&DebugState>,
    );

    fn emit_exception_object(&mut self) -> Operand;

    fn emit_return(&mut self, result: Option<Operand>);

    fn emit_unwind(&mut self, exception: Operand);
}
