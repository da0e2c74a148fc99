//! Values, operands and references used by IR instructions.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::ir::Type;

/// Index of a local variable within a [`crate::ir::Body`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub u32);

impl LocalId {
    /// Creates a local id from a table index.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        LocalId(u32::try_from(index).unwrap_or(u32::MAX))
    }

    /// Returns the table index of this local.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Constant {
    /// 32-bit integer (also used for boolean, byte, char and short).
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// String literal.
    Str(String),
    /// The null reference.
    Null,
}

impl Constant {
    /// Static type of the constant.
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Constant::Int(_) => Type::Int,
            Constant::Long(_) => Type::Long,
            Constant::Float(_) => Type::Float,
            Constant::Double(_) => Type::Double,
            Constant::Str(_) => Type::string(),
            Constant::Null => Type::Null,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Float(v) => write!(f, "{v}F"),
            Constant::Double(v) => write!(f, "{v}"),
            Constant::Str(s) => write!(f, "{s:?}"),
            Constant::Null => f.write_str("null"),
        }
    }
}

/// An immediate: the only values allowed as call arguments, array indices and sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// A local variable.
    Local(LocalId),
    /// A constant.
    Const(Constant),
}

impl Operand {
    /// Returns the local referenced by this operand, if any.
    #[must_use]
    pub fn as_local(&self) -> Option<LocalId> {
        match self {
            Operand::Local(id) => Some(*id),
            Operand::Const(_) => None,
        }
    }
}

impl From<LocalId> for Operand {
    fn from(value: LocalId) -> Self {
        Operand::Local(value)
    }
}

impl From<Constant> for Operand {
    fn from(value: Constant) -> Self {
        Operand::Const(value)
    }
}

/// Reference to a field by declaring class, name and type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// Dotted name of the declaring class.
    pub class: String,
    /// Field name.
    pub name: String,
    /// Declared field type.
    pub ty: Type,
    /// Whether the field is static.
    #[serde(default)]
    pub is_static: bool,
}

impl FieldRef {
    /// Reference to an instance field.
    #[must_use]
    pub fn instance(class: impl Into<String>, name: impl Into<String>, ty: Type) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            ty,
            is_static: false,
        }
    }

    /// Reference to a static field.
    #[must_use]
    pub fn new_static(class: impl Into<String>, name: impl Into<String>, ty: Type) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            ty,
            is_static: true,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: {} {}>", self.class, self.ty, self.name)
    }
}

/// Reference to a method by declaring class and signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// Dotted name of the declaring class.
    pub class: String,
    /// Method name (`<init>` for constructors).
    pub name: String,
    /// Declared parameter types.
    #[serde(default)]
    pub params: Vec<Type>,
    /// Declared return type.
    pub ret: Type,
}

impl MethodRef {
    /// Creates a method reference.
    #[must_use]
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        params: Vec<Type>,
        ret: Type,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            params,
            ret,
        }
    }

    /// `Class.name` form used for logging and counter naming.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class, self.name)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: {} {}(", self.class, self.ret, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")>")
    }
}

/// How a call is dispatched.
///
/// Resolved once from the static class descriptor of the callee: instrumentation
/// never re-derives it at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CallKind {
    /// No receiver.
    Static,
    /// Dynamic dispatch on a class receiver.
    Virtual,
    /// Dynamic dispatch on an interface receiver.
    Interface,
    /// Exact dispatch: constructors and `super` calls.
    Special,
}

/// A method invocation expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeExpr {
    /// Dispatch kind.
    pub kind: CallKind,
    /// The invoked method.
    pub method: MethodRef,
    /// Receiver local for non-static calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<LocalId>,
    /// Actual arguments.
    #[serde(default)]
    pub args: Vec<Operand>,
}

impl InvokeExpr {
    /// `staticinvoke`
    #[must_use]
    pub fn new_static(method: MethodRef, args: Vec<Operand>) -> Self {
        Self {
            kind: CallKind::Static,
            method,
            receiver: None,
            args,
        }
    }

    /// `virtualinvoke` / `interfaceinvoke` / `specialinvoke` on `receiver`.
    #[must_use]
    pub fn new_instance(
        kind: CallKind,
        receiver: LocalId,
        method: MethodRef,
        args: Vec<Operand>,
    ) -> Self {
        Self {
            kind,
            method,
            receiver: Some(receiver),
            args,
        }
    }

    /// `virtualinvoke`
    #[must_use]
    pub fn new_virtual(receiver: LocalId, method: MethodRef, args: Vec<Operand>) -> Self {
        Self::new_instance(CallKind::Virtual, receiver, method, args)
    }

    /// `specialinvoke`
    #[must_use]
    pub fn new_special(receiver: LocalId, method: MethodRef, args: Vec<Operand>) -> Self {
        Self::new_instance(CallKind::Special, receiver, method, args)
    }
}

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum BinOp {
    /// `+`
    #[strum(to_string = "+")]
    Add,
    /// `-`
    #[strum(to_string = "-")]
    Sub,
    /// `*`
    #[strum(to_string = "*")]
    Mul,
}

/// A value appearing on either side of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value", rename_all = "snake_case")]
pub enum Value {
    /// A local variable.
    Local {
        /// The local.
        local: LocalId,
    },
    /// A constant.
    Constant {
        /// The constant.
        constant: Constant,
    },
    /// `base.field`
    InstanceField {
        /// The object whose field is accessed.
        base: LocalId,
        /// The accessed field.
        field: FieldRef,
    },
    /// `Class.field`
    StaticField {
        /// The accessed field.
        field: FieldRef,
    },
    /// `base[index]`
    ArrayElement {
        /// The array.
        base: LocalId,
        /// The element index.
        index: Operand,
    },
    /// `new Class`
    NewObject {
        /// Class being instantiated.
        class: String,
    },
    /// `newarray (element)[size]`
    NewArray {
        /// Element type of the new array.
        element: Type,
        /// Number of elements.
        size: Operand,
    },
    /// `lengthof base`
    Length {
        /// The array.
        base: LocalId,
    },
    /// `lhs op rhs`
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        lhs: Operand,
        /// Right operand.
        rhs: Operand,
    },
    /// A method call whose result is used.
    Invoke {
        /// The call.
        expr: InvokeExpr,
    },
}

impl Value {
    /// `Value::Local`
    #[must_use]
    pub fn local(local: LocalId) -> Self {
        Value::Local { local }
    }

    /// `Value::Constant`
    #[must_use]
    pub fn constant(constant: Constant) -> Self {
        Value::Constant { constant }
    }

    /// `Value::InstanceField`
    #[must_use]
    pub fn instance_field(base: LocalId, field: FieldRef) -> Self {
        Value::InstanceField { base, field }
    }

    /// `Value::StaticField`
    #[must_use]
    pub fn static_field(field: FieldRef) -> Self {
        Value::StaticField { field }
    }

    /// `Value::Invoke`
    #[must_use]
    pub fn invoke(expr: InvokeExpr) -> Self {
        Value::Invoke { expr }
    }

    /// Returns `true` if the value may appear on the left of an assignment.
    #[must_use]
    pub fn is_place(&self) -> bool {
        matches!(
            self,
            Value::Local { .. }
                | Value::InstanceField { .. }
                | Value::StaticField { .. }
                | Value::ArrayElement { .. }
        )
    }

    /// Converts an immediate value into an [`Operand`].
    #[must_use]
    pub fn as_operand(&self) -> Option<Operand> {
        match self {
            Value::Local { local } => Some(Operand::Local(*local)),
            Value::Constant { constant } => Some(Operand::Const(constant.clone())),
            _ => None,
        }
    }

    /// Collects every local this value reads.
    pub fn uses(&self, out: &mut Vec<LocalId>) {
        let mut operand = |op: &Operand| {
            if let Operand::Local(id) = op {
                out.push(*id);
            }
        };
        match self {
            Value::Local { local } => operand(&Operand::Local(*local)),
            Value::InstanceField { base, .. } | Value::Length { base } => {
                operand(&Operand::Local(*base));
            }
            Value::ArrayElement { base, index } => {
                operand(&Operand::Local(*base));
                operand(index);
            }
            Value::NewArray { size, .. } => operand(size),
            Value::Binary { lhs, rhs, .. } => {
                operand(lhs);
                operand(rhs);
            }
            Value::Invoke { expr } => {
                if let Some(receiver) = expr.receiver {
                    operand(&Operand::Local(receiver));
                }
                for arg in &expr.args {
                    operand(arg);
                }
            }
            Value::Constant { .. } | Value::StaticField { .. } | Value::NewObject { .. } => {}
        }
    }
}

impl From<Operand> for Value {
    fn from(value: Operand) -> Self {
        match value {
            Operand::Local(local) => Value::Local { local },
            Operand::Const(constant) => Value::Constant { constant },
        }
    }
}
