//! Class, field and method descriptors.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    ir::{Body, FieldRef, MethodRef, Type, OBJECT_CLASS},
    Error, Result,
};

/// Name of instance constructors.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of static initializers.
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    /// Class-level modifiers
    pub struct ClassFlags: u32 {
        /// The class is an interface
        const INTERFACE = 0x0001;
        /// The class is abstract
        const ABSTRACT = 0x0002;
        /// The class was synthesized by the rewriter
        const SYNTHETIC = 0x0004;
        /// The class is a synthesized array wrapper
        const WRAPPER = 0x0008;
        /// The class is the shared counter class
        const COUNTER = 0x0010;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    /// Method-level modifiers
    pub struct MethodFlags: u32 {
        /// No receiver
        const STATIC = 0x0001;
        /// Declared without a body
        const ABSTRACT = 0x0002;
        /// Implemented outside the program
        const NATIVE = 0x0004;
        /// Synthesized by the rewriter
        const SYNTHETIC = 0x0008;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    /// Field-level modifiers
    pub struct FieldFlags: u32 {
        /// Class-level storage
        const STATIC = 0x0001;
        /// Synthesized by the rewriter
        const SYNTHETIC = 0x0002;
    }
}

/// Whether a class is subject to rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClassKind {
    /// Part of the application; rewritten.
    #[default]
    Application,
    /// Platform or third-party code; read-only.
    Library,
}

/// A field declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Name, unique within the declaring class.
    pub name: String,
    /// Declared type.
    pub ty: Type,
    /// Modifiers.
    #[serde(default)]
    pub flags: FieldFlags,
}

impl Field {
    /// Creates a field declaration.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: Type, flags: FieldFlags) -> Self {
        Self {
            name: name.into(),
            ty,
            flags,
        }
    }

    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }

    /// Builds a reference to this field as declared on `class`.
    #[must_use]
    pub fn reference(&self, class: &str) -> FieldRef {
        FieldRef {
            class: class.to_string(),
            name: self.name.clone(),
            ty: self.ty.clone(),
            is_static: self.is_static(),
        }
    }
}

/// A method declaration with an optional body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    /// Method name (`<init>` for constructors).
    pub name: String,
    /// Declared parameter types, excluding the receiver.
    #[serde(default)]
    pub params: Vec<Type>,
    /// Declared return type.
    pub ret: Type,
    /// Modifiers.
    #[serde(default)]
    pub flags: MethodFlags,
    /// Code, absent for abstract, native and library methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
}

impl Method {
    /// Creates a body-less method declaration.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Vec<Type>, ret: Type, flags: MethodFlags) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            flags,
            body: None,
        }
    }

    /// Attaches a body.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns `true` for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Returns `true` for methods synthesized by the rewriter.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.flags.contains(MethodFlags::SYNTHETIC)
    }

    /// Returns `true` if this method has the given name and parameter list.
    #[must_use]
    pub fn matches(&self, name: &str, params: &[Type]) -> bool {
        self.name == name && self.params == params
    }

    /// Builds a reference to this method as declared on `class`.
    #[must_use]
    pub fn reference(&self, class: &str) -> MethodRef {
        MethodRef::new(class, self.name.clone(), self.params.clone(), self.ret.clone())
    }

    /// Copy of this declaration without its body.
    #[must_use]
    pub fn signature(&self) -> Method {
        Method {
            name: self.name.clone(),
            params: self.params.clone(),
            ret: self.ret.clone(),
            flags: self.flags,
            body: None,
        }
    }
}

/// A class or interface descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    /// Dotted, globally unique name.
    pub name: String,
    /// Superclass name, `None` only for the root class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superclass: Option<String>,
    /// Implemented interfaces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    /// Application or library.
    #[serde(default)]
    pub kind: ClassKind,
    /// Modifiers.
    #[serde(default)]
    pub flags: ClassFlags,
    /// Field declarations, in declaration order.
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Method declarations, in declaration order.
    #[serde(default)]
    pub methods: Vec<Method>,
}

impl Class {
    /// Creates an empty application class extending `java.lang.Object`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: Some(OBJECT_CLASS.to_string()),
            interfaces: Vec::new(),
            kind: ClassKind::Application,
            flags: ClassFlags::empty(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Creates an empty library class extending `java.lang.Object`.
    #[must_use]
    pub fn library(name: impl Into<String>) -> Self {
        Self {
            kind: ClassKind::Library,
            ..Self::new(name)
        }
    }

    /// Returns `true` if the class is subject to rewriting.
    #[must_use]
    pub fn is_application(&self) -> bool {
        self.kind == ClassKind::Application
    }

    /// Returns `true` for interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(ClassFlags::INTERFACE)
    }

    /// Returns `true` for classes synthesized by the rewriter.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.flags
            .intersects(ClassFlags::SYNTHETIC | ClassFlags::WRAPPER | ClassFlags::COUNTER)
    }

    /// The class as a type.
    #[must_use]
    pub fn ty(&self) -> Type {
        Type::class(self.name.clone())
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Adds a field, or returns the existing one with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if a field with this name exists with a different type.
    pub fn add_field(&mut self, field: Field) -> Result<FieldRef> {
        if let Some(existing) = self.field(&field.name) {
            if existing.ty != field.ty {
                return Err(malformed_error!(
                    "field {}.{} already declared as {}, requested {}",
                    self.name,
                    field.name,
                    existing.ty,
                    field.ty
                ));
            }
            return Ok(existing.reference(&self.name));
        }
        let field_ref = field.reference(&self.name);
        self.fields.push(field);
        Ok(field_ref)
    }

    /// Looks up a method by name and exact parameter list.
    #[must_use]
    pub fn method(&self, name: &str, params: &[Type]) -> Option<&Method> {
        self.methods.iter().find(|m| m.matches(name, params))
    }

    /// Looks up the first method with the given name.
    #[must_use]
    pub fn method_by_name(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Adds a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if a method with the same signature already exists.
    pub fn add_method(&mut self, method: Method) -> Result<MethodRef> {
        if self.method(&method.name, &method.params).is_some() {
            return Err(malformed_error!(
                "duplicate method {}",
                method.reference(&self.name)
            ));
        }
        let method_ref = method.reference(&self.name);
        self.methods.push(method);
        Ok(method_ref)
    }

    /// Returns an [`Error::UnknownField`] for `name` on this class.
    #[must_use]
    pub fn unknown_field(&self, name: &str) -> Error {
        Error::UnknownField(format!("{}.{}", self.name, name))
    }
}
