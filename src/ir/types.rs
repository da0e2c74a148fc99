//! Static types of the IR.
//!
//! Types use the Java source spelling both for display and for serialization:
//! `int`, `java.lang.String`, `int[]`, `java.lang.Object[][]`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Name of the root class every synthesized class extends.
pub const OBJECT_CLASS: &str = "java.lang.Object";

/// Name of the class backing string constants.
pub const STRING_CLASS: &str = "java.lang.String";

/// A static type in the IR.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Type {
    /// No value; only valid as a return type.
    Void,
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// The type of the `null` constant, assignable to every reference type.
    Null,
    /// A class or interface type, by dotted name.
    Class(String),
    /// A single array dimension over the element type.
    Array(Box<Type>),
}

impl Type {
    /// Creates a class type from a dotted name.
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Type::Class(name.into())
    }

    /// Creates a one-dimensional array type over `element`.
    #[must_use]
    pub fn array_of(element: Type) -> Self {
        Type::Array(Box::new(element))
    }

    /// `java.lang.Object`
    #[must_use]
    pub fn object() -> Self {
        Type::Class(OBJECT_CLASS.to_string())
    }

    /// `java.lang.String`
    #[must_use]
    pub fn string() -> Self {
        Type::Class(STRING_CLASS.to_string())
    }

    /// Returns `true` for the eight primitive types.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Boolean
                | Type::Byte
                | Type::Char
                | Type::Short
                | Type::Int
                | Type::Long
                | Type::Float
                | Type::Double
        )
    }

    /// Returns `true` for class, array and null types.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Class(_) | Type::Array(_) | Type::Null)
    }

    /// Returns `true` if this is an array type of any dimension.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    /// Returns `true` for arrays whose element type is itself an array.
    #[must_use]
    pub fn is_multi_dimensional(&self) -> bool {
        matches!(self, Type::Array(inner) if inner.is_array())
    }

    /// Returns the element type of an array type.
    #[must_use]
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(inner) => Some(inner),
            _ => None,
        }
    }

    /// Returns the class name of a class type.
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Number of array dimensions (0 for non-array types).
    #[must_use]
    pub fn dimensions(&self) -> usize {
        match self {
            Type::Array(inner) => 1 + inner.dimensions(),
            _ => 0,
        }
    }

    /// Returns `true` if this type is accepted by the JVM wherever an `int` is expected.
    ///
    /// Sub-word primitives are widened to `int` on the operand stack.
    #[must_use]
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            Type::Boolean | Type::Byte | Type::Char | Type::Short | Type::Int
        )
    }

    fn primitive_from_str(s: &str) -> Option<Type> {
        Some(match s {
            "void" => Type::Void,
            "boolean" => Type::Boolean,
            "byte" => Type::Byte,
            "char" => Type::Char,
            "short" => Type::Short,
            "int" => Type::Int,
            "long" => Type::Long,
            "float" => Type::Float,
            "double" => Type::Double,
            "null" => Type::Null,
            _ => return None,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Boolean => f.write_str("boolean"),
            Type::Byte => f.write_str("byte"),
            Type::Char => f.write_str("char"),
            Type::Short => f.write_str("short"),
            Type::Int => f.write_str("int"),
            Type::Long => f.write_str("long"),
            Type::Float => f.write_str("float"),
            Type::Double => f.write_str("double"),
            Type::Null => f.write_str("null"),
            Type::Class(name) => f.write_str(name),
            Type::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

impl FromStr for Type {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(inner) = s.strip_suffix("[]") {
            let element: Type = inner.parse()?;
            if matches!(element, Type::Void | Type::Null) {
                return Err(Error::TypeParse(s.to_string()));
            }
            return Ok(Type::array_of(element));
        }

        if let Some(primitive) = Type::primitive_from_str(s) {
            return Ok(primitive);
        }

        let valid = !s.is_empty()
            && !s.starts_with('.')
            && !s.ends_with('.')
            && !s.contains("..")
            && s
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '$'));
        if !valid {
            return Err(Error::TypeParse(s.to_string()));
        }

        Ok(Type::Class(s.to_string()))
    }
}

impl TryFrom<String> for Type {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Type> for String {
    fn from(value: Type) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives_and_classes() {
        assert_eq!("int".parse::<Type>().unwrap(), Type::Int);
        assert_eq!(
            "com.example.Foo".parse::<Type>().unwrap(),
            Type::class("com.example.Foo")
        );
        assert_eq!(
            "com.example.Outer$Inner".parse::<Type>().unwrap(),
            Type::class("com.example.Outer$Inner")
        );
    }

    #[test]
    fn test_parse_arrays() {
        let ty: Type = "java.lang.String[][]".parse().unwrap();
        assert_eq!(ty.dimensions(), 2);
        assert!(ty.is_multi_dimensional());
        assert_eq!(ty.to_string(), "java.lang.String[][]");

        let ty: Type = "int[]".parse().unwrap();
        assert!(!ty.is_multi_dimensional());
        assert_eq!(ty.element_type(), Some(&Type::Int));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Type>().is_err());
        assert!("void[]".parse::<Type>().is_err());
        assert!("com..Foo".parse::<Type>().is_err());
        assert!("a b".parse::<Type>().is_err());
    }

    #[test]
    fn test_serde_uses_source_spelling() {
        let json = serde_json::to_string(&Type::array_of(Type::Int)).unwrap();
        assert_eq!(json, "\"int[]\"");
        let back: Type = serde_json::from_str("\"com.example.Foo[]\"").unwrap();
        assert_eq!(back, Type::array_of(Type::class("com.example.Foo")));
    }

    #[test]
    fn test_int_like() {
        assert!(Type::Char.is_int_like());
        assert!(!Type::Long.is_int_like());
        assert!(!Type::object().is_int_like());
    }
}
