use std::{fmt, rc::Rc};

use crate::{
    emulation::EmulationError,
    metadata::signatures::TypeSignature,
    Result,
};

/// Handle of an object in the [`crate::emulation::ReferenceTable`].
///
/// A handle is a slot index plus the generation of the slot when the object was allocated.
/// Sweeping an object bumps the generation of its slot, so handles that outlive their object
/// are rejected instead of silently aliasing a newer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl HeapRef {
    /// Slot index in the reference table.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot this handle was issued for.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeapRef({}#{})", self.index, self.generation)
    }
}

/// A value as seen by the interpreter.
///
/// # CIL Type Mapping
///
/// | CIL Type | EmValue Variant |
/// |----------|-----------------|
/// | `bool`, `char`, `int8`..`int32`, `uint8`..`uint32` | [`EmValue::Int32`] (bit pattern preserved) |
/// | `int64`, `uint64`, `native int`, `native uint` | [`EmValue::Int64`] (bit pattern preserved) |
/// | Arrays and other heap objects | [`EmValue::Object`] |
/// | `string` | [`EmValue::String`] |
/// | `null` | [`EmValue::Null`] |
///
/// Floating point values are not represented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmValue {
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Reference to an object of the reference table.
    Object(HeapRef),
    /// An immutable string, shared between copies.
    String(Rc<str>),
    /// The null reference.
    Null,
}

/// The operand class a polymorphic instruction is specialized for.
///
/// Strings and `null` fall into [`ValueKind::Object`]: they only take part in equality tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    /// Both operands are 32-bit integers
    Int32 = 1,
    /// Both operands are 64-bit integers
    Int64 = 2,
    /// Both operands are references
    Object = 3,
}

impl ValueKind {
    /// Decode the byte stored in an operand cache; `0` means unresolved.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<ValueKind> {
        match value {
            1 => Some(ValueKind::Int32),
            2 => Some(ValueKind::Int64),
            3 => Some(ValueKind::Object),
            _ => None,
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::Object => "object",
        }
    }
}

impl EmValue {
    /// Create a string value.
    #[must_use]
    pub fn string(value: &str) -> EmValue {
        EmValue::String(Rc::from(value))
    }

    /// The operand class of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            EmValue::Int32(_) => ValueKind::Int32,
            EmValue::Int64(_) => ValueKind::Int64,
            EmValue::Object(_) | EmValue::String(_) | EmValue::Null => ValueKind::Object,
        }
    }

    /// Name of the variant, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            EmValue::Int32(_) => "int32",
            EmValue::Int64(_) => "int64",
            EmValue::Object(_) => "object",
            EmValue::String(_) => "string",
            EmValue::Null => "null",
        }
    }

    /// The zero value a slot of type `signature` starts with.
    ///
    /// 64-bit and native integers start at `Int64(0)`, all other primitives at `Int32(0)` and
    /// everything else at `Null`.
    #[must_use]
    pub fn zero_for(signature: &TypeSignature) -> EmValue {
        match signature {
            TypeSignature::I8 | TypeSignature::U8 | TypeSignature::I | TypeSignature::U => {
                EmValue::Int64(0)
            }
            TypeSignature::Boolean
            | TypeSignature::Char
            | TypeSignature::I1
            | TypeSignature::U1
            | TypeSignature::I2
            | TypeSignature::U2
            | TypeSignature::I4
            | TypeSignature::U4 => EmValue::Int32(0),
            _ => EmValue::Null,
        }
    }

    /// The value as a 32-bit integer.
    ///
    /// # Errors
    /// Returns [`EmulationError::TypeMismatch`] for anything but [`EmValue::Int32`].
    pub fn as_i32(&self, operation: &'static str) -> Result<i32> {
        match self {
            EmValue::Int32(value) => Ok(*value),
            other => Err(EmulationError::TypeMismatch {
                operation,
                expected: "int32",
                found: other.type_name(),
            }
            .into()),
        }
    }

    /// The value as a 64-bit integer, sign-extending [`EmValue::Int32`].
    ///
    /// # Errors
    /// Returns [`EmulationError::TypeMismatch`] for references.
    pub fn as_i64(&self, operation: &'static str) -> Result<i64> {
        match self {
            EmValue::Int32(value) => Ok(i64::from(*value)),
            EmValue::Int64(value) => Ok(*value),
            other => Err(EmulationError::TypeMismatch {
                operation,
                expected: "integer",
                found: other.type_name(),
            }
            .into()),
        }
    }

    /// The referenced object, `None` for anything but [`EmValue::Object`].
    #[must_use]
    pub fn as_heap_ref(&self) -> Option<HeapRef> {
        match self {
            EmValue::Object(reference) => Some(*reference),
            _ => None,
        }
    }

    /// Truth value as tested by `brtrue` / `brfalse`: non-zero integers and non-null references.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            EmValue::Int32(value) => *value != 0,
            EmValue::Int64(value) => *value != 0,
            EmValue::Object(_) | EmValue::String(_) => true,
            EmValue::Null => false,
        }
    }
}

impl fmt::Display for EmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmValue::Int32(value) => write!(f, "{value}"),
            EmValue::Int64(value) => write!(f, "{value}L"),
            EmValue::Object(reference) => write!(f, "{reference}"),
            EmValue::String(value) => write!(f, "\"{value}\""),
            EmValue::Null => write!(f, "null"),
        }
    }
}

impl From<i32> for EmValue {
    fn from(value: i32) -> Self {
        EmValue::Int32(value)
    }
}

impl From<i64> for EmValue {
    fn from(value: i64) -> Self {
        EmValue::Int64(value)
    }
}

impl From<HeapRef> for EmValue {
    fn from(value: HeapRef) -> Self {
        EmValue::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(EmValue::Int32(1).kind(), ValueKind::Int32);
        assert_eq!(EmValue::Int64(1).kind(), ValueKind::Int64);
        assert_eq!(EmValue::Null.kind(), ValueKind::Object);
        assert_eq!(EmValue::string("a").kind(), ValueKind::Object);

        for kind in [ValueKind::Int32, ValueKind::Int64, ValueKind::Object] {
            assert_eq!(ValueKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(ValueKind::from_u8(0), None);
    }

    #[test]
    fn zero_values() {
        assert_eq!(EmValue::zero_for(&TypeSignature::I8), EmValue::Int64(0));
        assert_eq!(EmValue::zero_for(&TypeSignature::U1), EmValue::Int32(0));
        assert_eq!(EmValue::zero_for(&TypeSignature::String), EmValue::Null);
        assert_eq!(EmValue::zero_for(&TypeSignature::Object), EmValue::Null);
    }

    #[test]
    fn conversions() {
        assert_eq!(EmValue::Int32(-3).as_i64("test").unwrap(), -3);
        assert!(EmValue::Int64(3).as_i32("test").is_err());
        assert!(EmValue::Null.as_i64("test").is_err());
        assert!(!EmValue::Null.is_true());
        assert!(EmValue::Int64(-1).is_true());
        assert!(!EmValue::Int32(0).is_true());
    }

    #[test]
    fn strings_compare_by_value() {
        assert_eq!(EmValue::string("abc"), EmValue::String(Rc::from("abc")));
        assert_ne!(EmValue::string("abc"), EmValue::Null);
    }
}
