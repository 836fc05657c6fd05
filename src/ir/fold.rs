//! Stamp folding for binary operations.
//!
//! Every function here is a pure function of its input stamps, which is
//! what allows [`FoldCache`] to memoize results per graph.

use std::{collections::HashMap, fmt};

use super::stamp::{IntegerStamp, Stamp, mask, max_value, min_value, wrap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FoldOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Compress,
    Expand,
}

impl FoldOp {
    pub fn name(self) -> &'static str {
        match self {
            FoldOp::Add => "add",
            FoldOp::Sub => "sub",
            FoldOp::Mul => "mul",
            FoldOp::And => "and",
            FoldOp::Or => "or",
            FoldOp::Xor => "xor",
            FoldOp::Compress => "compress",
            FoldOp::Expand => "expand",
        }
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            FoldOp::Add | FoldOp::Mul | FoldOp::And | FoldOp::Or | FoldOp::Xor
        )
    }

    /// Evaluates the operation on two concrete values of width `bits`.
    ///
    /// Bit shuffles are not evaluated.
    pub fn evaluate(self, bits: u32, x: i64, y: i64) -> Option<i64> {
        let value = match self {
            FoldOp::Add => x.wrapping_add(y),
            FoldOp::Sub => x.wrapping_sub(y),
            FoldOp::Mul => x.wrapping_mul(y),
            FoldOp::And => x & y,
            FoldOp::Or => x | y,
            FoldOp::Xor => x ^ y,
            FoldOp::Compress | FoldOp::Expand => return None,
        };
        Some(wrap(value, bits))
    }
}

impl fmt::Display for FoldOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Folds the result stamp of `op` applied to `x` and `y`.
///
/// Returns `None` when the operands are not integers of the same width.
pub fn fold(op: FoldOp, x: &Stamp, y: &Stamp) -> Option<Stamp> {
    let (x, y) = (x.integer()?, y.integer()?);
    if x.bits() != y.bits() {
        return None;
    }
    let bits = x.bits();

    if let (Some(a), Some(b)) = (x.as_constant(), y.as_constant()) {
        if let Some(value) = op.evaluate(bits, a, b) {
            return Some(Stamp::constant(bits, value));
        }
    }

    let result = match op {
        FoldOp::Add => fold_add(x, y),
        FoldOp::Sub => fold_sub(x, y),
        FoldOp::Mul => fold_mul(x, y),
        FoldOp::And => bitwise(bits, x.may_be_set() & y.may_be_set(), x.must_be_set() & y.must_be_set()),
        FoldOp::Or => bitwise(bits, x.may_be_set() | y.may_be_set(), x.must_be_set() | y.must_be_set()),
        FoldOp::Xor => fold_xor(x, y),
        FoldOp::Compress | FoldOp::Expand => IntegerStamp::unrestricted(bits),
    };
    Some(Stamp::Integer(result))
}

/// A range result, unrestricted if it may overflow the width.
fn checked_range(bits: u32, lower: i128, upper: i128) -> IntegerStamp {
    if lower >= min_value(bits) as i128 && upper <= max_value(bits) as i128 {
        IntegerStamp::range(bits, lower as i64, upper as i64)
    } else {
        IntegerStamp::unrestricted(bits)
    }
}

fn fold_add(x: &IntegerStamp, y: &IntegerStamp) -> IntegerStamp {
    if y.as_constant() == Some(0) {
        return *x;
    }
    if x.as_constant() == Some(0) {
        return *y;
    }
    checked_range(
        x.bits(),
        x.lower() as i128 + y.lower() as i128,
        x.upper() as i128 + y.upper() as i128,
    )
}

fn fold_sub(x: &IntegerStamp, y: &IntegerStamp) -> IntegerStamp {
    if y.as_constant() == Some(0) {
        return *x;
    }
    checked_range(
        x.bits(),
        x.lower() as i128 - y.upper() as i128,
        x.upper() as i128 - y.lower() as i128,
    )
}

fn fold_mul(x: &IntegerStamp, y: &IntegerStamp) -> IntegerStamp {
    let bits = x.bits();
    match (x.as_constant(), y.as_constant()) {
        (_, Some(1)) => return *x,
        (Some(1), _) => return *y,
        (_, Some(0)) | (Some(0), _) => return IntegerStamp::constant(bits, 0),
        _ => {}
    }
    let products = [
        x.lower() as i128 * y.lower() as i128,
        x.lower() as i128 * y.upper() as i128,
        x.upper() as i128 * y.lower() as i128,
        x.upper() as i128 * y.upper() as i128,
    ];
    let lower = products.iter().copied().min().unwrap_or(i128::MIN);
    let upper = products.iter().copied().max().unwrap_or(i128::MAX);
    checked_range(bits, lower, upper)
}

fn fold_xor(x: &IntegerStamp, y: &IntegerStamp) -> IntegerStamp {
    let known_ones = (x.must_be_set() & !y.may_be_set()) | (!x.may_be_set() & y.must_be_set());
    let known_zeros = (x.must_be_set() & y.must_be_set()) | (!x.may_be_set() & !y.may_be_set());
    bitwise(x.bits(), !known_zeros, known_ones)
}

fn bitwise(bits: u32, may_be_set: u64, must_be_set: u64) -> IntegerStamp {
    IntegerStamp::create(bits, min_value(bits), max_value(bits), may_be_set & mask(bits), must_be_set)
        .unwrap_or_else(|| IntegerStamp::unrestricted(bits))
}

/// Memoizes [`fold`] results for one graph.
#[derive(Debug, Default, Clone)]
pub struct FoldCache {
    entries: HashMap<(FoldOp, Stamp, Stamp), Stamp>,
    hits: usize,
}

impl FoldCache {
    pub fn fold(&mut self, op: FoldOp, x: &Stamp, y: &Stamp) -> Option<Stamp> {
        let key = (op, x.clone(), y.clone());
        if let Some(stamp) = self.entries.get(&key) {
            self.hits += 1;
            return Some(stamp.clone());
        }
        let stamp = fold(op, x, y)?;
        self.entries.insert(key, stamp.clone());
        Some(stamp)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}
