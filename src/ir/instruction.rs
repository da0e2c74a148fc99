//! IR instructions.

use serde::{Deserialize, Serialize};

use crate::ir::{InvokeExpr, LocalId, Operand, Type, Value};

/// The source bound by an identity instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// `@this: T`
    This(Type),
    /// `@parameterN: T`
    Parameter {
        /// Zero-based parameter index.
        index: usize,
        /// Declared parameter type.
        ty: Type,
    },
}

impl IdentitySource {
    /// Type of the bound value.
    #[must_use]
    pub fn ty(&self) -> &Type {
        match self {
            IdentitySource::This(ty) | IdentitySource::Parameter { ty, .. } => ty,
        }
    }
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// `local := @this` or `local := @parameterN`
    Identity {
        /// Local receiving the value.
        local: LocalId,
        /// What is bound.
        source: IdentitySource,
    },
    /// `lhs = rhs`
    Assign {
        /// Destination place.
        lhs: Value,
        /// Source value.
        rhs: Value,
    },
    /// A call whose result is discarded.
    Invoke {
        /// The call.
        expr: InvokeExpr,
    },
    /// `return` / `return value`
    Return {
        /// Returned operand, `None` for void methods.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Operand>,
    },
}

impl Instruction {
    /// `lhs = rhs`
    #[must_use]
    pub fn assign(lhs: Value, rhs: Value) -> Self {
        Instruction::Assign { lhs, rhs }
    }

    /// Call statement.
    #[must_use]
    pub fn invoke(expr: InvokeExpr) -> Self {
        Instruction::Invoke { expr }
    }

    /// `return`
    #[must_use]
    pub fn return_void() -> Self {
        Instruction::Return { value: None }
    }

    /// `return value`
    #[must_use]
    pub fn return_value(value: Operand) -> Self {
        Instruction::Return { value: Some(value) }
    }

    /// `local := @this: ty`
    #[must_use]
    pub fn identity_this(local: LocalId, ty: Type) -> Self {
        Instruction::Identity {
            local,
            source: IdentitySource::This(ty),
        }
    }

    /// `local := @parameterN: ty`
    #[must_use]
    pub fn identity_param(local: LocalId, index: usize, ty: Type) -> Self {
        Instruction::Identity {
            local,
            source: IdentitySource::Parameter { index, ty },
        }
    }

    /// Returns `true` for identity instructions.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(self, Instruction::Identity { .. })
    }

    /// The call performed by this instruction, either as a statement or as the right-hand side
    /// of an assignment.
    #[must_use]
    pub fn invoke_expr(&self) -> Option<&InvokeExpr> {
        match self {
            Instruction::Invoke { expr }
            | Instruction::Assign {
                rhs: Value::Invoke { expr },
                ..
            } => Some(expr),
            _ => None,
        }
    }

    /// Mutable access to the call performed by this instruction.
    pub fn invoke_expr_mut(&mut self) -> Option<&mut InvokeExpr> {
        match self {
            Instruction::Invoke { expr }
            | Instruction::Assign {
                rhs: Value::Invoke { expr },
                ..
            } => Some(expr),
            _ => None,
        }
    }

    /// Collects every local this instruction reads or writes.
    pub fn locals(&self, out: &mut Vec<LocalId>) {
        match self {
            Instruction::Identity { local, .. } => out.push(*local),
            Instruction::Assign { lhs, rhs } => {
                lhs.uses(out);
                rhs.uses(out);
            }
            Instruction::Invoke { expr } => Value::invoke(expr.clone()).uses(out),
            Instruction::Return { value } => {
                if let Some(Operand::Local(id)) = value {
                    out.push(*id);
                }
            }
        }
    }
}
