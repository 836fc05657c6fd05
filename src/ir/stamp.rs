//! The abstract-value domain.
//!
//! A [`Stamp`] is a sound over-approximation of the values a node can
//! produce at runtime. Integer stamps combine a signed range with known-bit
//! masks and are always kept normalized: the range is tightened by the masks
//! and the masks by the range until neither changes. Normalization is what
//! makes [`IntegerStamp::is_subset_of`] a field-wise comparison.

use std::fmt;

use super::types::{ElementKind, TypeRef};

/// All bits of a `bits`-wide integer.
pub fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

pub fn min_value(bits: u32) -> i64 {
    if bits >= 64 {
        i64::MIN
    } else {
        -(1i64 << (bits - 1))
    }
}

pub fn max_value(bits: u32) -> i64 {
    if bits >= 64 {
        i64::MAX
    } else {
        (1i64 << (bits - 1)) - 1
    }
}

/// Interprets the low `bits` of `value` as a two's complement number.
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits >= 64 {
        value as i64
    } else {
        let shift = 64 - bits;
        ((value << shift) as i64) >> shift
    }
}

/// Wraps `value` into the signed range of a `bits`-wide integer.
pub fn wrap(value: i64, bits: u32) -> i64 {
    sign_extend(value as u64 & mask(bits), bits)
}

/// The signed range implied by known bits.
fn range_from_masks(bits: u32, may_be_set: u64, must_be_set: u64) -> (i64, i64) {
    let sign = 1u64 << (bits - 1);
    let lower = sign_extend((must_be_set & !sign) | (may_be_set & sign), bits);
    let upper = sign_extend((may_be_set & !sign) | (must_be_set & sign), bits);
    (lower, upper)
}

/// The known bits implied by a signed range: `(may_be_set, must_be_set)`.
fn masks_from_range(bits: u32, lower: i64, upper: i64) -> (u64, u64) {
    let all = mask(bits);
    if (lower < 0) != (upper < 0) {
        return (all, 0);
    }
    let low = lower as u64 & all;
    let high = upper as u64 & all;
    let diff = low ^ high;
    if diff == 0 {
        return (low, low);
    }
    let highest = 63 - diff.leading_zeros();
    let varying = if highest >= 63 {
        u64::MAX
    } else {
        (1u64 << (highest + 1)) - 1
    };
    let common = !varying & all;
    ((low & common) | (varying & all), low & common)
}

/// A range and known-bits summary of an integer of a fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegerStamp {
    bits: u32,
    lower: i64,
    upper: i64,
    may_be_set: u64,
    must_be_set: u64,
}

impl IntegerStamp {
    /// Creates a normalized stamp, or `None` if it describes no value.
    pub fn create(
        bits: u32,
        lower: i64,
        upper: i64,
        may_be_set: u64,
        must_be_set: u64,
    ) -> Option<Self> {
        assert!((1..=64).contains(&bits), "invalid integer width {bits}");
        let all = mask(bits);
        let mut current = (
            lower.max(min_value(bits)),
            upper.min(max_value(bits)),
            may_be_set & all,
            must_be_set & all,
        );

        loop {
            let (lower, upper, may, must) = current;
            if lower > upper || must & !may != 0 {
                return None;
            }
            let (mask_lower, mask_upper) = range_from_masks(bits, may, must);
            let lower = lower.max(mask_lower);
            let upper = upper.min(mask_upper);
            if lower > upper {
                return None;
            }
            let (range_may, range_must) = masks_from_range(bits, lower, upper);
            let next = (lower, upper, may & range_may, must | range_must);
            if next == current {
                break;
            }
            current = next;
        }

        let (lower, upper, may_be_set, must_be_set) = current;
        Some(Self {
            bits,
            lower,
            upper,
            may_be_set,
            must_be_set,
        })
    }

    pub fn unrestricted(bits: u32) -> Self {
        assert!((1..=64).contains(&bits), "invalid integer width {bits}");
        Self {
            bits,
            lower: min_value(bits),
            upper: max_value(bits),
            may_be_set: mask(bits),
            must_be_set: 0,
        }
    }

    /// A stamp containing exactly `value`, wrapped to `bits`.
    pub fn constant(bits: u32, value: i64) -> Self {
        assert!((1..=64).contains(&bits), "invalid integer width {bits}");
        let raw = value as u64 & mask(bits);
        let value = sign_extend(raw, bits);
        Self {
            bits,
            lower: value,
            upper: value,
            may_be_set: raw,
            must_be_set: raw,
        }
    }

    /// A stamp for a signed range, falling back to unrestricted if empty.
    pub fn range(bits: u32, lower: i64, upper: i64) -> Self {
        Self::create(bits, lower, upper, mask(bits), 0).unwrap_or_else(|| Self::unrestricted(bits))
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn lower(&self) -> i64 {
        self.lower
    }

    pub fn upper(&self) -> i64 {
        self.upper
    }

    pub fn may_be_set(&self) -> u64 {
        self.may_be_set
    }

    pub fn must_be_set(&self) -> u64 {
        self.must_be_set
    }

    pub fn as_constant(&self) -> Option<i64> {
        (self.lower == self.upper).then_some(self.lower)
    }

    pub fn is_unrestricted(&self) -> bool {
        *self == Self::unrestricted(self.bits)
    }

    pub fn contains(&self, value: i64) -> bool {
        let raw = value as u64 & mask(self.bits);
        value >= self.lower
            && value <= self.upper
            && raw & !self.may_be_set == 0
            && self.must_be_set & !raw == 0
    }

    pub fn is_subset_of(&self, other: &IntegerStamp) -> bool {
        self.bits == other.bits
            && self.lower >= other.lower
            && self.upper <= other.upper
            && self.may_be_set & !other.may_be_set == 0
            && other.must_be_set & !self.must_be_set == 0
    }

    /// The union of both value sets.
    pub fn meet(&self, other: &IntegerStamp) -> IntegerStamp {
        debug_assert_eq!(self.bits, other.bits);
        Self::create(
            self.bits,
            self.lower.min(other.lower),
            self.upper.max(other.upper),
            self.may_be_set | other.may_be_set,
            self.must_be_set & other.must_be_set,
        )
        .unwrap_or_else(|| Self::unrestricted(self.bits))
    }

    /// The intersection of both value sets, `None` when it is empty.
    pub fn join(&self, other: &IntegerStamp) -> Option<IntegerStamp> {
        debug_assert_eq!(self.bits, other.bits);
        Self::create(
            self.bits,
            self.lower.max(other.lower),
            self.upper.min(other.upper),
            self.may_be_set & other.may_be_set,
            self.must_be_set | other.must_be_set,
        )
    }

    pub fn is_positive(&self) -> bool {
        self.lower >= 0
    }
}

impl fmt::Display for IntegerStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.bits)?;
        if let Some(value) = self.as_constant() {
            write!(f, " {value}")
        } else if self.is_unrestricted() {
            Ok(())
        } else {
            write!(f, " [{}, {}]", self.lower, self.upper)
        }
    }
}

/// What is known about a reference value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ObjectStamp {
    ty: Option<TypeRef>,
    exact: bool,
    non_null: bool,
    always_null: bool,
}

impl ObjectStamp {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn for_type(ty: TypeRef, exact: bool, non_null: bool) -> Self {
        Self {
            ty: Some(ty),
            exact,
            non_null,
            always_null: false,
        }
    }

    pub fn null() -> Self {
        Self {
            always_null: true,
            ..Self::default()
        }
    }

    pub fn ty(&self) -> Option<&TypeRef> {
        self.ty.as_ref()
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }

    pub fn non_null(&self) -> bool {
        self.non_null
    }

    pub fn always_null(&self) -> bool {
        self.always_null
    }

    /// The declared type, but only if it is an array type.
    pub fn array_type(&self) -> Option<&TypeRef> {
        self.ty.as_ref().filter(|ty| ty.is_array())
    }

    pub fn is_subset_of(&self, other: &ObjectStamp) -> bool {
        if self.always_null {
            return !other.non_null;
        }
        let type_ok = match (&other.ty, &self.ty) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(theirs), Some(ours)) => theirs.is_assignable_from(ours),
        };
        type_ok
            && (!other.exact || (self.exact && self.ty == other.ty))
            && (!other.non_null || self.non_null)
            && !other.always_null
    }

    pub fn meet(&self, other: &ObjectStamp) -> ObjectStamp {
        if self.always_null {
            return ObjectStamp {
                non_null: false,
                ..other.clone()
            };
        }
        if other.always_null {
            return ObjectStamp {
                non_null: false,
                ..self.clone()
            };
        }
        let ty = match (&self.ty, &other.ty) {
            (Some(a), Some(b)) if a == b => Some(a.clone()),
            (Some(a), Some(b)) if a.is_assignable_from(b) => Some(a.clone()),
            (Some(a), Some(b)) if b.is_assignable_from(a) => Some(b.clone()),
            _ => None,
        };
        ObjectStamp {
            exact: self.exact && other.exact && self.ty == other.ty,
            ty,
            non_null: self.non_null && other.non_null,
            always_null: false,
        }
    }

    /// The intersection, `None` when it is provably empty.
    pub fn join(&self, other: &ObjectStamp) -> Option<ObjectStamp> {
        let ty = match (&self.ty, &other.ty) {
            (None, ty) | (ty, None) => ty.clone(),
            (Some(a), Some(b)) if b.is_assignable_from(a) => Some(a.clone()),
            (Some(a), Some(b)) if a.is_assignable_from(b) => Some(b.clone()),
            (Some(a), Some(_)) => Some(a.clone()),
        };
        let exact = (self.exact && ty == self.ty) || (other.exact && ty == other.ty);
        let non_null = self.non_null || other.non_null;
        let always_null = self.always_null || other.always_null;
        if non_null && always_null {
            return None;
        }
        Some(ObjectStamp {
            ty,
            exact,
            non_null,
            always_null,
        })
    }
}

impl fmt::Display for ObjectStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.always_null {
            return write!(f, "null");
        }
        match &self.ty {
            Some(ty) => write!(f, "{}{ty}", if self.exact { "=" } else { "" })?,
            None => write!(f, "object")?,
        }
        if self.non_null {
            write!(f, "!")?;
        }
        Ok(())
    }
}

/// The abstract value of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stamp {
    /// The node produces no value.
    Void,
    Integer(IntegerStamp),
    /// Floating point values are not tracked beyond their width.
    Float { bits: u32 },
    Object(ObjectStamp),
    /// No value can reach this point.
    Empty,
}

impl Stamp {
    pub fn int(bits: u32) -> Self {
        Stamp::Integer(IntegerStamp::unrestricted(bits))
    }

    pub fn constant(bits: u32, value: i64) -> Self {
        Stamp::Integer(IntegerStamp::constant(bits, value))
    }

    pub fn object() -> Self {
        Stamp::Object(ObjectStamp::unrestricted())
    }

    /// The most general stamp a value of this kind can have.
    pub fn for_kind(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Boolean => Stamp::Integer(IntegerStamp::range(32, 0, 1)),
            ElementKind::Byte => Stamp::Integer(IntegerStamp::range(32, -128, 127)),
            ElementKind::Short => Stamp::Integer(IntegerStamp::range(32, -32768, 32767)),
            ElementKind::Char => Stamp::Integer(IntegerStamp::range(32, 0, 65535)),
            ElementKind::Int => Stamp::int(32),
            ElementKind::Long => Stamp::int(64),
            ElementKind::Float => Stamp::Float { bits: 32 },
            ElementKind::Double => Stamp::Float { bits: 64 },
            ElementKind::Object => Stamp::object(),
        }
    }

    /// The stamp of a value of the given declared type.
    pub fn for_type(ty: &TypeRef, non_null: bool) -> Self {
        match ty {
            TypeRef::Primitive(kind) => Self::for_kind(*kind),
            _ => Stamp::Object(ObjectStamp::for_type(ty.clone(), false, non_null)),
        }
    }

    /// The most general stamp of the same kind and width.
    pub fn unrestricted(&self) -> Stamp {
        match self {
            Stamp::Void => Stamp::Void,
            Stamp::Integer(stamp) => Stamp::int(stamp.bits()),
            Stamp::Float { bits } => Stamp::Float { bits: *bits },
            Stamp::Object(_) => Stamp::object(),
            Stamp::Empty => Stamp::Empty,
        }
    }

    pub fn integer(&self) -> Option<&IntegerStamp> {
        match self {
            Stamp::Integer(stamp) => Some(stamp),
            _ => None,
        }
    }

    pub fn object_stamp(&self) -> Option<&ObjectStamp> {
        match self {
            Stamp::Object(stamp) => Some(stamp),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<i64> {
        self.integer().and_then(IntegerStamp::as_constant)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Stamp::Empty)
    }

    pub fn is_subset_of(&self, other: &Stamp) -> bool {
        match (self, other) {
            (Stamp::Empty, _) => true,
            (Stamp::Void, Stamp::Void) => true,
            (Stamp::Integer(a), Stamp::Integer(b)) => a.is_subset_of(b),
            (Stamp::Float { bits: a }, Stamp::Float { bits: b }) => a == b,
            (Stamp::Object(a), Stamp::Object(b)) => a.is_subset_of(b),
            _ => false,
        }
    }

    /// The union of both stamps, `None` if they describe different kinds of value.
    pub fn meet(&self, other: &Stamp) -> Option<Stamp> {
        Some(match (self, other) {
            (Stamp::Empty, other) | (other, Stamp::Empty) => other.clone(),
            (Stamp::Void, Stamp::Void) => Stamp::Void,
            (Stamp::Integer(a), Stamp::Integer(b)) if a.bits() == b.bits() => {
                Stamp::Integer(a.meet(b))
            }
            (Stamp::Float { bits: a }, Stamp::Float { bits: b }) if a == b => {
                Stamp::Float { bits: *a }
            }
            (Stamp::Object(a), Stamp::Object(b)) => Stamp::Object(a.meet(b)),
            _ => return None,
        })
    }

    /// The intersection of both stamps; incompatible stamps intersect to empty.
    pub fn join(&self, other: &Stamp) -> Stamp {
        match (self, other) {
            (Stamp::Void, Stamp::Void) => Stamp::Void,
            (Stamp::Integer(a), Stamp::Integer(b)) if a.bits() == b.bits() => {
                a.join(b).map_or(Stamp::Empty, Stamp::Integer)
            }
            (Stamp::Float { bits: a }, Stamp::Float { bits: b }) if a == b => {
                Stamp::Float { bits: *a }
            }
            (Stamp::Object(a), Stamp::Object(b)) => a.join(b).map_or(Stamp::Empty, Stamp::Object),
            _ => Stamp::Empty,
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stamp::Void => write!(f, "void"),
            Stamp::Integer(stamp) => write!(f, "{stamp}"),
            Stamp::Float { bits } => write!(f, "f{bits}"),
            Stamp::Object(stamp) => write!(f, "{stamp}"),
            Stamp::Empty => write!(f, "empty"),
        }
    }
}
