//! Runtime values of the emulator.

use std::fmt;

use crate::{
    ir::{Constant, Type},
    Error, Result,
};

/// Reference to an object or array on the emulated heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapRef(pub(crate) usize);

impl HeapRef {
    /// Slot of the referenced object.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Runtime value in locals, fields and array slots.
///
/// | IR type | EmValue variant |
/// |---------|-----------------|
/// | `boolean`, `byte`, `char`, `short`, `int` | [`EmValue::Int`] |
/// | `long` | [`EmValue::Long`] |
/// | `float` | [`EmValue::Float`] |
/// | `double` | [`EmValue::Double`] |
/// | `java.lang.String` constant | [`EmValue::Str`] |
/// | any other reference | [`EmValue::Ref`] or [`EmValue::Null`] |
#[derive(Clone, Debug, PartialEq)]
pub enum EmValue {
    /// No value: the result of a `void` call.
    Void,
    /// 32-bit integer, also used for the sub-word primitives.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// A string literal.
    Str(String),
    /// The null reference.
    Null,
    /// A heap object or array.
    Ref(HeapRef),
}

impl EmValue {
    /// The zero value a field, array slot or local of type `ty` starts with.
    #[must_use]
    pub fn default_for(ty: &Type) -> Self {
        match ty {
            Type::Long => EmValue::Long(0),
            Type::Float => EmValue::Float(0.0),
            Type::Double => EmValue::Double(0.0),
            Type::Void => EmValue::Void,
            ty if ty.is_int_like() => EmValue::Int(0),
            _ => EmValue::Null,
        }
    }

    /// Converts a constant into a runtime value.
    #[must_use]
    pub fn from_constant(constant: &Constant) -> Self {
        match constant {
            Constant::Int(v) => EmValue::Int(*v),
            Constant::Long(v) => EmValue::Long(*v),
            Constant::Float(v) => EmValue::Float(*v),
            Constant::Double(v) => EmValue::Double(*v),
            Constant::Str(s) => EmValue::Str(s.clone()),
            Constant::Null => EmValue::Null,
        }
    }

    /// The integer held by this value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] for non-int values.
    pub fn as_int(&self) -> Result<i32> {
        match self {
            EmValue::Int(v) => Ok(*v),
            other => Err(Error::Emulation(format!("expected int, found {other}"))),
        }
    }

    /// The heap reference held by this value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] for `null` (a null dereference) and non-reference values.
    pub fn as_ref(&self) -> Result<HeapRef> {
        match self {
            EmValue::Ref(r) => Ok(*r),
            EmValue::Null => Err(Error::Emulation("null dereference".to_string())),
            other => Err(Error::Emulation(format!("expected reference, found {other}"))),
        }
    }

    /// Returns `true` for `null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, EmValue::Null)
    }
}

impl fmt::Display for EmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmValue::Void => f.write_str("void"),
            EmValue::Int(v) => write!(f, "{v}"),
            EmValue::Long(v) => write!(f, "{v}"),
            EmValue::Float(v) => write!(f, "{v}"),
            EmValue::Double(v) => write!(f, "{v}"),
            EmValue::Str(s) => f.write_str(s),
            EmValue::Null => f.write_str("null"),
            EmValue::Ref(r) => write!(f, "{r}"),
        }
    }
}
