//! Descriptors of runtime-resident functions the graph can call.

use std::{fmt, sync::Arc};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::stamp::Stamp;

mod catalog;

pub use catalog::{
    GENERIC_ARRAY_COPY, IDENTITY_HASH_CODE, LOG_PRIMITIVE, NEW_ARRAY, NEW_INSTANCE,
    RuntimeCallCatalog, UNWIND_EXCEPTION, runtime_calls,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallDescriptorError {
    #[error("invalid foreign call name {0:?}: expected one or more non-whitespace characters")]
    InvalidName(String),
}

/// The type of a call argument or result, as seen by the calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Void,
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Object,
    /// A raw machine word.
    Word,
}

impl CallType {
    pub fn stamp(self) -> Stamp {
        use crate::ir::types::ElementKind;
        match self {
            CallType::Void => Stamp::Void,
            CallType::Boolean => Stamp::for_kind(ElementKind::Boolean),
            CallType::Byte => Stamp::for_kind(ElementKind::Byte),
            CallType::Short => Stamp::for_kind(ElementKind::Short),
            CallType::Char => Stamp::for_kind(ElementKind::Char),
            CallType::Int => Stamp::for_kind(ElementKind::Int),
            CallType::Long | CallType::Word => Stamp::int(64),
            CallType::Float => Stamp::for_kind(ElementKind::Float),
            CallType::Double => Stamp::for_kind(ElementKind::Double),
            CallType::Object => Stamp::object(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CallType::Void => "void",
            CallType::Boolean => "boolean",
            CallType::Byte => "byte",
            CallType::Short => "short",
            CallType::Char => "char",
            CallType::Int => "int",
            CallType::Long => "long",
            CallType::Float => "float",
            CallType::Double => "double",
            CallType::Object => "Object",
            CallType::Word => "word",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable name and signature identifying a runtime function.
///
/// Equality and hashing cover all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallDescriptor {
    name: String,
    result_type: CallType,
    argument_types: Vec<CallType>,
}

impl CallDescriptor {
    pub fn new(
        name: impl Into<String>,
        result_type: CallType,
        argument_types: impl Into<Vec<CallType>>,
    ) -> Result<Self, CallDescriptorError> {
        let name = name.into();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(CallDescriptorError::InvalidName(name));
        }
        Ok(Self {
            name,
            result_type,
            argument_types: argument_types.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result_type(&self) -> CallType {
        self.result_type
    }

    pub fn argument_types(&self) -> &[CallType] {
        &self.argument_types
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}){}",
            self.name,
            self.argument_types.iter().join(","),
            self.result_type
        )
    }
}
