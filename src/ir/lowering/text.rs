use itertools::Itertools;

use crate::{
    foreign::CallDescriptor,
    ir::{location::LocationIdentity, stamp::Stamp, types::ElementKind},
    platform::BarrierType,
};

use super::generator::{
    ArithmeticLirGenerator, ArrayCopyOperands, DebugState, Label, LirGeneratorTool, Operand,
};

/// A backend that records one line of text per emitted operation.
#[derive(Debug, Clone, Default)]
pub struct TextBackend {
    lines: Vec<String>,
    next_operand: u32,
}

impl TextBackend {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn listing(&self) -> String {
        self.lines.join("\n")
    }

    fn new_operand(&mut self) -> Operand {
        let operand = Operand(self.next_operand);
        self.next_operand += 1;
        operand
    }

    fn push(&mut self, line: String) {
        self.lines.push(format!("  {line}"));
    }

    fn binary(&mut self, name: &str, x: Operand, y: Operand) -> Operand {
        let result = self.new_operand();
        self.push(format!("{result} = {name} {x}, {y}"));
        result
    }
}

fn suffix(state: Option<&DebugState>, exception: Option<Label>) -> String {
    let mut suffix = String::new();
    if let Some(state) = state {
        suffix.push_str(&format!(" state {state}"));
    }
    if let Some(exception) = exception {
        suffix.push_str(&format!(" except {exception}"));
    }
    suffix
}

impl ArithmeticLirGenerator for TextBackend {
    fn emit_add(&mut self, x: Operand, y: Operand) -> Operand {
        self.binary("add", x, y)
    }

    fn emit_sub(&mut self, x: Operand, y: Operand) -> Operand {
        self.binary("sub", x, y)
    }

    fn emit_mul(&mut self, x: Operand, y: Operand) -> Operand {
        self.binary("mul", x, y)
    }

    fn emit_and(&mut self, x: Operand, y: Operand) -> Operand {
        self.binary("and", x, y)
    }

    fn emit_or(&mut self, x: Operand, y: Operand) -> Operand {
        self.binary("or", x, y)
    }

    fn emit_xor(&mut self, x: Operand, y: Operand) -> Operand {
        self.binary("xor", x, y)
    }

    fn emit_integer_compress(&mut self, value: Operand, mask: Operand) -> Operand {
        self.binary("compress", value, mask)
    }

    fn emit_integer_expand(&mut self, value: Operand, mask: Operand) -> Operand {
        self.binary("expand", value, mask)
    }
}

impl LirGeneratorTool for TextBackend {
    fn arithmetic(&mut self) -> &mut dyn ArithmeticLirGenerator {
        self
    }

    fn emit_incoming_parameter(&mut self, index: u32, stamp: &Stamp) -> Operand {
        let result = self.new_operand();
        self.push(format!("{result} = param {index} : {stamp}"));
        result
    }

    fn emit_constant(&mut self, bits: u32, value: i64) -> Operand {
        let result = self.new_operand();
        self.push(format!("{result} = const i{bits} {value}"));
        result
    }

    fn emit_label(&mut self, label: Label) {
        self.lines.push(format!("{label}:"));
    }

    fn emit_array_copy(
        &mut self,
        kind: ElementKind,
        operands: &ArrayCopyOperands,
        barrier: BarrierType,
        state: Option<&DebugState>,
        exception: Label,
    ) {
        let ArrayCopyOperands {
            src,
            src_pos,
            dest,
            dest_pos,
            length,
        } = operands;
        self.push(format!(
            "arraycopy {kind} {src}[{src_pos}] -> {dest}[{dest_pos}] length {length} barrier {barrier}{}",
            suffix(state, Some(exception))
        ));
    }

    fn emit_foreign_call(
        &mut self,
        descriptor: &CallDescriptor,
        arguments: &[Operand],
        state: Option<&DebugState>,
        exception: Option<Label>,
    ) -> Option<Operand> {
        let call = format!(
            "call {}({}){}",
            descriptor.name(),
            arguments.iter().join(", "),
            suffix(state, exception)
        );
        if descriptor.result_type().stamp() == Stamp::Void {
            self.push(call);
            None
        } else {
            let result = self.new_operand();
            self.push(format!("{result} = {call}"));
            Some(result)
        }
    }

    fn emit_store(
        &mut self,
        object: Operand,
        offset: Operand,
        value: Operand,
        location: &LocationIdentity,
        barrier: BarrierType,
        state: Option<&DebugState>,
    ) {
        self.push(format!(
            "store {object}+{offset} <- {value} location {location} barrier {barrier}{}",
            suffix(state, None)
        ));
    }

    fn emit_exception_object(&mut self) -> Operand {
        let result = self.new_operand();
        self.push(format!("{result} = exception"));
        result
    }

    fn emit_return(&mut self, result: Option<Operand>) {
        match result {
            Some(result) => self.push(format!("return {result}")),
            None => self.push("return".to_string()),
        }
    }

    fn emit_unwind(&mut self, exception: Operand) {
        self.push(format!("unwind {exception}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::runtime_calls;

    #[test]
    fn void_calls_produce_no_operand() {
        let mut backend = TextBackend::default();
        let exception = backend.emit_exception_object();
        let unwind = runtime_calls().get(crate::foreign::UNWIND_EXCEPTION).unwrap();
        assert_eq!(backend.emit_foreign_call(unwind, &[exception], None, None), None);
        let copy = runtime_calls().generic_array_copy();
        let args = [exception; 5];
        assert_eq!(
            backend.emit_foreign_call(copy, &args, None, Some(Label(1))),
            Some(Operand(1))
        );
        assert_eq!(
            backend.listing(),
            "  v0 = exception\n  call unwind_exception(v0)\n  v1 = call arraycopy_generic(v0, v0, v0, v0, v0) except L1"
        );
    }
}
