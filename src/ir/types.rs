use std::{fmt, sync::Arc};

use educe::Educe;
use serde::{Deserialize, Serialize};

/// The name of the class every reference type is assignable to.
pub const ROOT_CLASS: &str = "Object";

/// The storage kind of an array element or a runtime value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Object,
}

impl ElementKind {
    pub fn is_primitive(self) -> bool {
        !matches!(self, ElementKind::Object)
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Boolean => "boolean",
            ElementKind::Byte => "byte",
            ElementKind::Short => "short",
            ElementKind::Char => "char",
            ElementKind::Int => "int",
            ElementKind::Long => "long",
            ElementKind::Float => "float",
            ElementKind::Double => "double",
            ElementKind::Object => "object",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => ElementKind::Boolean,
            "byte" => ElementKind::Byte,
            "short" => ElementKind::Short,
            "char" => ElementKind::Char,
            "int" => ElementKind::Int,
            "long" => ElementKind::Long,
            "float" => ElementKind::Float,
            "double" => ElementKind::Double,
            _ => return None,
        })
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A statically known type, as carried by object stamps.
///
/// Class identity is the name; the list of supertypes is auxiliary data used
/// for assignability and is ignored by equality and hashing.
#[derive(Debug, Clone, Educe)]
#[educe(PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A primitive type, only meaningful as an array component.
    Primitive(ElementKind),
    Instance {
        name: Arc<str>,
        #[educe(PartialEq(ignore), Hash(ignore))]
        supertypes: Arc<[Arc<str>]>,
    },
    Array(Arc<TypeRef>),
}

impl TypeRef {
    pub fn root() -> Self {
        Self::class(ROOT_CLASS, &[])
    }

    pub fn class(name: &str, supertypes: &[&str]) -> Self {
        TypeRef::Instance {
            name: name.into(),
            supertypes: supertypes.iter().map(|s| Arc::from(*s)).collect(),
        }
    }

    pub fn array_of(component: TypeRef) -> Self {
        TypeRef::Array(Arc::new(component))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeRef::Array(_))
    }

    pub fn component_type(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Array(component) => Some(component),
            _ => None,
        }
    }

    /// The kind of a value of this type.
    pub fn element_kind(&self) -> ElementKind {
        match self {
            TypeRef::Primitive(kind) => *kind,
            TypeRef::Instance { .. } | TypeRef::Array(_) => ElementKind::Object,
        }
    }

    /// Whether a value of type `other` can be stored where `self` is expected.
    pub fn is_assignable_from(&self, other: &TypeRef) -> bool {
        match (self, other) {
            (TypeRef::Primitive(a), TypeRef::Primitive(b)) => a == b,
            (TypeRef::Primitive(_), _) | (_, TypeRef::Primitive(_)) => false,
            (TypeRef::Instance { name, .. }, _) if &**name == ROOT_CLASS => true,
            (
                TypeRef::Instance { name, .. },
                TypeRef::Instance {
                    name: other_name,
                    supertypes,
                },
            ) => name == other_name || supertypes.iter().any(|s| s == name),
            (TypeRef::Instance { .. }, TypeRef::Array(_)) => false,
            (TypeRef::Array(_), TypeRef::Instance { .. }) => false,
            (TypeRef::Array(a), TypeRef::Array(b)) => match (&**a, &**b) {
                // Primitive arrays are invariant.
                (TypeRef::Primitive(x), TypeRef::Primitive(y)) => x == y,
                (a, b) => a.is_assignable_from(b),
            },
        }
    }

    /// Parses the short type syntax used by unit files: `int`, `long[]`,
    /// `Object`, `Foo[][]`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(inner) = text.strip_suffix("[]") {
            return Some(Self::array_of(Self::parse(inner)?));
        }
        if text.is_empty() || text.contains(char::is_whitespace) {
            return None;
        }
        Some(match ElementKind::from_name(text) {
            Some(kind) => TypeRef::Primitive(kind),
            None => Self::class(text, &[]),
        })
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive(kind) => write!(f, "{kind}"),
            TypeRef::Instance { name, .. } => write!(f, "{name}"),
            TypeRef::Array(component) => write!(f, "{component}[]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_arrays_are_invariant() {
        let ints = TypeRef::array_of(TypeRef::Primitive(ElementKind::Int));
        let longs = TypeRef::array_of(TypeRef::Primitive(ElementKind::Long));
        assert!(ints.is_assignable_from(&ints));
        assert!(!ints.is_assignable_from(&longs));
        assert!(TypeRef::root().is_assignable_from(&ints));
    }

    #[test]
    fn subclass_assignability_uses_supertypes() {
        let base = TypeRef::class("Shape", &[]);
        let derived = TypeRef::class("Circle", &["Shape"]);
        assert!(base.is_assignable_from(&derived));
        assert!(!derived.is_assignable_from(&base));
        assert!(
            TypeRef::array_of(base.clone()).is_assignable_from(&TypeRef::array_of(derived))
        );
    }

    #[test]
    fn equality_ignores_supertypes() {
        assert_eq!(TypeRef::class("Shape", &["A"]), TypeRef::class("Shape", &[]));
    }

    #[test]
    fn parse_short_syntax() {
        assert_eq!(
            TypeRef::parse("int[]"),
            Some(TypeRef::array_of(TypeRef::Primitive(ElementKind::Int)))
        );
        assert_eq!(
            TypeRef::parse("Foo[][]").map(|t| t.to_string()),
            Some("Foo[][]".to_string())
        );
        assert_eq!(TypeRef::parse("two words"), None);
        assert_eq!(TypeRef::parse("[]"), None);
    }
}
