//! Conversion of host values into native call arguments.
//!
//! A value is queried through [`InteropValue`]. A query that can't be
//! answered fails with [`UnsupportedMessage`]; [`convert`] turns that into
//! an [`Unsupported`] carrying the rejected value, except for pointers,
//! which try a chain of fallbacks first.

use std::{ffi::CString, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod host;

pub use host::HostValue;

/// The native categories an argument can be passed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    Void,
    Sint8,
    Sint16,
    Sint32,
    Sint64,
    Pointer,
    Float,
    Double,
    /// A NUL-terminated UTF-8 string.
    String,
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgumentType::Void => "void",
            ArgumentType::Sint8 => "sint8",
            ArgumentType::Sint16 => "sint16",
            ArgumentType::Sint32 => "sint32",
            ArgumentType::Sint64 => "sint64",
            ArgumentType::Pointer => "pointer",
            ArgumentType::Float => "float",
            ArgumentType::Double => "double",
            ArgumentType::String => "string",
        };
        f.write_str(name)
    }
}

/// A capability query the value could not answer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unsupported message {message}")]
pub struct UnsupportedMessage {
    pub message: &'static str,
}

impl UnsupportedMessage {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

/// The capability queries of a host value.
pub trait InteropValue {
    fn as_byte(&self) -> Result<i8, UnsupportedMessage>;
    fn as_short(&self) -> Result<i16, UnsupportedMessage>;
    fn as_int(&self) -> Result<i32, UnsupportedMessage>;
    fn as_long(&self) -> Result<i64, UnsupportedMessage>;
    fn as_float(&self) -> Result<f32, UnsupportedMessage>;
    fn as_double(&self) -> Result<f64, UnsupportedMessage>;
    fn as_string(&self) -> Result<String, UnsupportedMessage>;

    fn is_pointer(&self) -> bool;
    fn as_pointer(&self) -> Result<u64, UnsupportedMessage>;
    /// Asks the value to move itself to native memory, after which it may
    /// be a pointer.
    fn to_native(&mut self) -> Result<(), UnsupportedMessage>;

    fn is_null(&self) -> bool;
    fn is_number(&self) -> bool;
}

/// A converted argument, ready to be passed to native code.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeArgument {
    Void,
    Sint8(i8),
    Sint16(i16),
    Sint32(i32),
    Sint64(i64),
    Pointer(u64),
    Float(f32),
    Double(f64),
    String(CString),
}

impl NativeArgument {
    pub fn argument_type(&self) -> ArgumentType {
        match self {
            NativeArgument::Void => ArgumentType::Void,
            NativeArgument::Sint8(_) => ArgumentType::Sint8,
            NativeArgument::Sint16(_) => ArgumentType::Sint16,
            NativeArgument::Sint32(_) => ArgumentType::Sint32,
            NativeArgument::Sint64(_) => ArgumentType::Sint64,
            NativeArgument::Pointer(_) => ArgumentType::Pointer,
            NativeArgument::Float(_) => ArgumentType::Float,
            NativeArgument::Double(_) => ArgumentType::Double,
            NativeArgument::String(_) => ArgumentType::String,
        }
    }
}

/// The value can't be passed as `expected`. The caller gets it back.
#[derive(Debug, Error)]
#[error("value can't be converted to a {expected} argument")]
pub struct Unsupported<V> {
    pub value: V,
    pub expected: ArgumentType,
}

const NULL_POINTER: u64 = 0;

/// Converts `value` to an argument of category `ty`.
pub fn convert<V: InteropValue>(value: V, ty: ArgumentType) -> Result<NativeArgument, Unsupported<V>> {
    let converted = match ty {
        ArgumentType::Void => Ok(NativeArgument::Void),
        ArgumentType::Sint8 => value.as_byte().map(NativeArgument::Sint8),
        ArgumentType::Sint16 => value.as_short().map(NativeArgument::Sint16),
        ArgumentType::Sint32 => value.as_int().map(NativeArgument::Sint32),
        ArgumentType::Sint64 => value.as_long().map(NativeArgument::Sint64),
        ArgumentType::Float => value.as_float().map(NativeArgument::Float),
        ArgumentType::Double => value.as_double().map(NativeArgument::Double),
        ArgumentType::String => value
            .as_string()
            .and_then(|string| {
                CString::new(string).map_err(|_| UnsupportedMessage::new("asString"))
            })
            .map(NativeArgument::String),
        ArgumentType::Pointer => return convert_pointer(value),
    };
    converted.map_err(|_| Unsupported {
        value,
        expected: ty,
    })
}

fn native_pointer<V: InteropValue>(value: &mut V) -> Result<Option<u64>, UnsupportedMessage> {
    if !value.is_pointer() {
        value.to_native()?;
    }
    if value.is_pointer() {
        return value.as_pointer().map(Some);
    }
    Ok(None)
}

/// pointer, then to-native and pointer again, then null, then number.
fn convert_pointer<V: InteropValue>(mut value: V) -> Result<NativeArgument, Unsupported<V>> {
    if let Ok(Some(pointer)) = native_pointer(&mut value) {
        return Ok(NativeArgument::Pointer(pointer));
    }

    if value.is_null() {
        return Ok(NativeArgument::Pointer(NULL_POINTER));
    }
    if value.is_number() {
        if let Ok(number) = value.as_long() {
            return Ok(NativeArgument::Pointer(number as u64));
        }
    }
    Err(Unsupported {
        value,
        expected: ArgumentType::Pointer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(HostValue::Int(-3), ArgumentType::Sint8, NativeArgument::Sint8(-3) ; "byte")]
    #[test_case(HostValue::Int(300), ArgumentType::Sint16, NativeArgument::Sint16(300) ; "short")]
    #[test_case(HostValue::Int(70_000), ArgumentType::Sint32, NativeArgument::Sint32(70_000) ; "int")]
    #[test_case(HostValue::Int(i64::MIN), ArgumentType::Sint64, NativeArgument::Sint64(i64::MIN) ; "long")]
    #[test_case(HostValue::Double(0.5), ArgumentType::Float, NativeArgument::Float(0.5) ; "float")]
    #[test_case(HostValue::Int(2), ArgumentType::Double, NativeArgument::Double(2.0) ; "int as double")]
    #[test_case(HostValue::Bool(true), ArgumentType::Void, NativeArgument::Void ; "void ignores the value")]
    fn supported_conversions(value: HostValue, ty: ArgumentType, expected: NativeArgument) {
        let converted = convert(value, ty).unwrap();
        assert_eq!(converted.argument_type(), ty);
        assert_eq!(converted, expected);
    }

    #[test_case(HostValue::Int(300), ArgumentType::Sint8 ; "byte overflow")]
    #[test_case(HostValue::Double(1.5), ArgumentType::Sint32 ; "fractional int")]
    #[test_case(HostValue::String("x".into()), ArgumentType::Double ; "string as double")]
    #[test_case(HostValue::Int(1), ArgumentType::String ; "int as string")]
    #[test_case(HostValue::String("a\0b".into()), ArgumentType::String ; "interior nul")]
    fn unsupported_conversions_return_the_value(value: HostValue, ty: ArgumentType) {
        let err = convert(value.clone(), ty).unwrap_err();
        assert_eq!(err.value, value);
        assert_eq!(err.expected, ty);
    }

    #[test]
    fn strings_are_nul_terminated() {
        let converted = convert(HostValue::String("héllo".into()), ArgumentType::String).unwrap();
        let NativeArgument::String(string) = converted else {
            panic!("expected a string, got {converted:?}");
        };
        assert_eq!(string.as_bytes_with_nul(), "héllo\0".as_bytes());
    }

    #[test_case(HostValue::Pointer(0x1000), 0x1000 ; "pointer")]
    #[test_case(HostValue::Object { native: Some(0x2000), pointer: None }, 0x2000 ; "moved to native")]
    #[test_case(HostValue::Null, 0 ; "null")]
    #[test_case(HostValue::Int(42), 42 ; "number")]
    fn pointer_fallback_chain(value: HostValue, expected: u64) {
        assert_eq!(
            convert(value, ArgumentType::Pointer).unwrap(),
            NativeArgument::Pointer(expected)
        );
    }

    #[test]
    fn pointers_that_fail_every_fallback_are_unsupported() {
        let object = HostValue::Object {
            native: None,
            pointer: None,
        };
        let err = convert(object.clone(), ArgumentType::Pointer).unwrap_err();
        assert_eq!(err.value, object);
        assert_eq!(err.to_string(), "value can't be converted to a pointer argument");

        let err = convert(HostValue::Double(0.25), ArgumentType::Pointer).unwrap_err();
        assert_eq!(err.value, HostValue::Double(0.25));
    }
}
