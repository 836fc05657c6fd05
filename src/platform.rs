//! Platform capabilities consulted while building memory-writing nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::{location::LocationIdentity, stamp::Stamp, types::ElementKind};

/// The garbage-collector barrier a heap write needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierType {
    None,
    /// A barrier on a single field store.
    Field,
    /// A barrier on an array element store or a range of elements.
    Array,
}

impl fmt::Display for BarrierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarrierType::None => write!(f, "none"),
            BarrierType::Field => write!(f, "field"),
            BarrierType::Array => write!(f, "array"),
        }
    }
}

/// The barrier strategy of a garbage collector.
pub trait BarrierSet: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// The barrier for storing a value with stamp `value` to `location`.
    fn write_barrier_type(&self, location: &LocationIdentity, value: &Stamp) -> BarrierType;

    /// The barrier for copying a range of elements of the given kind.
    fn array_copy_barrier_type(&self, kind: ElementKind) -> BarrierType;
}

fn reference_barrier(location: &LocationIdentity) -> BarrierType {
    match location {
        LocationIdentity::Init => BarrierType::None,
        LocationIdentity::ArrayElements(_) => BarrierType::Array,
        LocationIdentity::Any | LocationIdentity::Field { .. } => BarrierType::Field,
    }
}

fn element_barrier(kind: ElementKind) -> BarrierType {
    if kind.is_primitive() {
        BarrierType::None
    } else {
        BarrierType::Array
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBarrierSet;

impl BarrierSet for NoBarrierSet {
    fn name(&self) -> &'static str {
        "none"
    }

    fn write_barrier_type(&self, _location: &LocationIdentity, _value: &Stamp) -> BarrierType {
        BarrierType::None
    }

    fn array_copy_barrier_type(&self, _kind: ElementKind) -> BarrierType {
        BarrierType::None
    }
}

/// Post-write card marking. Storing null never dirties a card.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardTableBarrierSet;

impl BarrierSet for CardTableBarrierSet {
    fn name(&self) -> &'static str {
        "card-table"
    }

    fn write_barrier_type(&self, location: &LocationIdentity, value: &Stamp) -> BarrierType {
        match value.object_stamp() {
            Some(stamp) if !stamp.always_null() => reference_barrier(location),
            _ => BarrierType::None,
        }
    }

    fn array_copy_barrier_type(&self, kind: ElementKind) -> BarrierType {
        element_barrier(kind)
    }
}

/// Snapshot-at-the-beginning pre-barrier plus post barrier. The pre-barrier
/// records the overwritten value, so even null stores need it.
#[derive(Debug, Clone, Copy, Default)]
pub struct G1BarrierSet;

impl BarrierSet for G1BarrierSet {
    fn name(&self) -> &'static str {
        "g1"
    }

    fn write_barrier_type(&self, location: &LocationIdentity, value: &Stamp) -> BarrierType {
        match value {
            Stamp::Object(_) => reference_barrier(location),
            _ => BarrierType::None,
        }
    }

    fn array_copy_barrier_type(&self, kind: ElementKind) -> BarrierType {
        element_barrier(kind)
    }
}

/// Selects a barrier set in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BarrierSetKind {
    None,
    #[default]
    CardTable,
    G1,
}

impl BarrierSetKind {
    pub fn build(self) -> Box<dyn BarrierSet> {
        match self {
            BarrierSetKind::None => Box::new(NoBarrierSet),
            BarrierSetKind::CardTable => Box::new(CardTableBarrierSet),
            BarrierSetKind::G1 => Box::new(G1BarrierSet),
        }
    }
}

/// The platform capabilities injected into graph building.
pub trait PlatformConfiguration: Send + Sync {
    fn barrier_set(&self) -> &dyn BarrierSet;

    /// Whether wide accesses to byte arrays may be treated as one opaque unit.
    /// Graph building and lowering never read it; it is carried for escape
    /// analysis passes that run on the graph outside this crate.
    fn can_virtualize_large_byte_array_access(&self) -> bool;
}

#[derive(Debug)]
pub struct StaticPlatformConfiguration {
    barrier_set: Box<dyn BarrierSet>,
    can_virtualize_large_byte_array_access: bool,
}

impl StaticPlatformConfiguration {
    pub fn new(barrier_set: Box<dyn BarrierSet>, can_virtualize_large_byte_array_access: bool) -> Self {
        Self {
            barrier_set,
            can_virtualize_large_byte_array_access,
        }
    }
}

impl Default for StaticPlatformConfiguration {
    fn default() -> Self {
        Self::new(BarrierSetKind::default().build(), true)
    }
}

impl PlatformConfiguration for StaticPlatformConfiguration {
    fn barrier_set(&self) -> &dyn BarrierSet {
        self.barrier_set.as_ref()
    }

    fn can_virtualize_large_byte_array_access(&self) -> bool {
        self.can_virtualize_large_byte_array_access
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrier_set_kinds_parse_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            barrier_set: BarrierSetKind,
        }
        let wrapper: Wrapper = toml::from_str(r#"barrier_set = "card-table""#).unwrap();
        assert_eq!(wrapper.barrier_set, BarrierSetKind::CardTable);
        let wrapper: Wrapper = toml::from_str(r#"barrier_set = "g1""#).unwrap();
        assert_eq!(wrapper.barrier_set.build().name(), "g1");
    }

    #[test]
    fn object_array_copies_need_barriers() {
        for kind in [BarrierSetKind::CardTable, BarrierSetKind::G1] {
            let set = kind.build();
            assert_eq!(set.array_copy_barrier_type(ElementKind::Object), BarrierType::Array);
            assert_eq!(set.array_copy_barrier_type(ElementKind::Int), BarrierType::None);
        }
        assert_eq!(
            NoBarrierSet.array_copy_barrier_type(ElementKind::Object),
            BarrierType::None
        );
    }

    #[test]
    fn initializing_stores_skip_barriers() {
        let set = CardTableBarrierSet;
        assert_eq!(
            set.write_barrier_type(&LocationIdentity::Init, &Stamp::object()),
            BarrierType::None
        );
        assert_eq!(
            set.write_barrier_type(&LocationIdentity::array_location(ElementKind::Object), &Stamp::object()),
            BarrierType::Array
        );
    }
}
