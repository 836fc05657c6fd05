use std::{fmt, sync::Arc};

use super::types::ElementKind;

/// An abstract memory region, used to order memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationIdentity {
    /// May alias every other location.
    Any,
    /// Memory of freshly allocated objects, before they escape.
    Init,
    /// The elements of arrays of the given kind.
    ArrayElements(ElementKind),
    /// A named field. Only its own writes and initializing writes order
    /// accesses to an immutable field.
    Field { name: Arc<str>, immutable: bool },
}

impl LocationIdentity {
    pub fn field(name: &str) -> Self {
        LocationIdentity::Field {
            name: name.into(),
            immutable: false,
        }
    }

    pub fn array_location(kind: ElementKind) -> Self {
        LocationIdentity::ArrayElements(kind)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, LocationIdentity::Any)
    }

    pub fn is_init(&self) -> bool {
        matches!(self, LocationIdentity::Init)
    }

    pub fn is_immutable(&self) -> bool {
        matches!(self, LocationIdentity::Field { immutable: true, .. })
    }

    /// Whether a kill of `self` may affect an access to `other`.
    pub fn overlaps(&self, other: &LocationIdentity) -> bool {
        self.is_any() || other.is_any() || self == other
    }
}

impl fmt::Display for LocationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationIdentity::Any => write!(f, "any"),
            LocationIdentity::Init => write!(f, "init"),
            LocationIdentity::ArrayElements(kind) => write!(f, "{kind}[]"),
            LocationIdentity::Field { name, immutable } => {
                write!(f, "{name}")?;
                if *immutable {
                    write!(f, " (final)")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_overlaps_everything() {
        let ints = LocationIdentity::array_location(ElementKind::Int);
        assert!(LocationIdentity::Any.overlaps(&ints));
        assert!(ints.overlaps(&LocationIdentity::Any));
        assert!(LocationIdentity::Any.overlaps(&LocationIdentity::Init));
    }

    #[test]
    fn distinct_regions_do_not_overlap() {
        let ints = LocationIdentity::array_location(ElementKind::Int);
        let longs = LocationIdentity::array_location(ElementKind::Long);
        assert!(!ints.overlaps(&longs));
        assert!(!ints.overlaps(&LocationIdentity::field("x")));
        assert!(LocationIdentity::field("x").overlaps(&LocationIdentity::field("x")));
    }
}
