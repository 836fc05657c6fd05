use serde::{Deserialize, Serialize};

use super::{InteropValue, UnsupportedMessage};

/// A dynamically typed value of the embedding host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    /// A raw native address.
    Pointer(u64),
    /// A managed object. `native` is the address it gets when moved to
    /// native memory, if it can be; `pointer` is set once it has been.
    Object {
        native: Option<u64>,
        pointer: Option<u64>,
    },
}

impl HostValue {
    fn exact_integer(&self, message: &'static str) -> Result<i64, UnsupportedMessage> {
        match *self {
            HostValue::Int(value) => Ok(value),
            HostValue::Double(value)
                if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 =>
            {
                Ok(value as i64)
            }
            _ => Err(UnsupportedMessage::new(message)),
        }
    }

    fn narrow<T: TryFrom<i64>>(&self, message: &'static str) -> Result<T, UnsupportedMessage> {
        T::try_from(self.exact_integer(message)?).map_err(|_| UnsupportedMessage::new(message))
    }
}

impl InteropValue for HostValue {
    fn as_byte(&self) -> Result<i8, UnsupportedMessage> {
        self.narrow("asByte")
    }

    fn as_short(&self) -> Result<i16, UnsupportedMessage> {
        self.narrow("asShort")
    }

    fn as_int(&self) -> Result<i32, UnsupportedMessage> {
        self.narrow("asInt")
    }

    fn as_long(&self) -> Result<i64, UnsupportedMessage> {
        self.exact_integer("asLong")
    }

    /// Only values that survive the round trip through `f32`.
    fn as_float(&self) -> Result<f32, UnsupportedMessage> {
        let value = self.as_double().map_err(|_| UnsupportedMessage::new("asFloat"))?;
        let narrowed = value as f32;
        if f64::from(narrowed) == value || value.is_nan() {
            Ok(narrowed)
        } else {
            Err(UnsupportedMessage::new("asFloat"))
        }
    }

    fn as_double(&self) -> Result<f64, UnsupportedMessage> {
        match *self {
            HostValue::Double(value) => Ok(value),
            HostValue::Int(value) if (value as f64) as i64 == value => Ok(value as f64),
            _ => Err(UnsupportedMessage::new("asDouble")),
        }
    }

    fn as_string(&self) -> Result<String, UnsupportedMessage> {
        match self {
            HostValue::String(value) => Ok(value.clone()),
            _ => Err(UnsupportedMessage::new("asString")),
        }
    }

    fn is_pointer(&self) -> bool {
        matches!(
            self,
            HostValue::Pointer(_)
                | HostValue::Object {
                    pointer: Some(_),
                    ..
                }
        )
    }

    fn as_pointer(&self) -> Result<u64, UnsupportedMessage> {
        match *self {
            HostValue::Pointer(address)
            | HostValue::Object {
                pointer: Some(address),
                ..
            } => Ok(address),
            _ => Err(UnsupportedMessage::new("asPointer")),
        }
    }

    fn to_native(&mut self) -> Result<(), UnsupportedMessage> {
        match self {
            HostValue::Object {
                native: Some(address),
                pointer,
            } => {
                *pointer = Some(*address);
                Ok(())
            }
            _ => Err(UnsupportedMessage::new("toNative")),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    fn is_number(&self) -> bool {
        matches!(self, HostValue::Int(_) | HostValue::Double(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_to_native_makes_a_pointer() {
        let mut object = HostValue::Object {
            native: Some(0x40),
            pointer: None,
        };
        assert!(!object.is_pointer());
        object.to_native().unwrap();
        assert_eq!(object.as_pointer(), Ok(0x40));
        assert_eq!(
            HostValue::Null.clone().to_native(),
            Err(UnsupportedMessage::new("toNative"))
        );
    }
}
