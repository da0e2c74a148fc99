//! Method bodies: a local variable table plus an instruction sequence.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    ir::{IdentitySource, Instruction, LocalId, Operand, Type, Value},
    Result,
};

/// Declaration of a local variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDecl {
    /// Name, unique within the body.
    pub name: String,
    /// Declared type.
    pub ty: Type,
}

/// The code of a method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    locals: Vec<LocalDecl>,
    instructions: Vec<Instruction>,
}

impl Body {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a named local.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a local with this name already exists.
    pub fn add_local(&mut self, name: impl Into<String>, ty: Type) -> Result<LocalId> {
        let name = name.into();
        if self.locals.iter().any(|l| l.name == name) {
            return Err(malformed_error!("duplicate local '{}'", name));
        }
        self.locals.push(LocalDecl { name, ty });
        Ok(LocalId::from_index(self.locals.len() - 1))
    }

    /// Declares a fresh local whose name starts with `prefix` and does not clash with any
    /// existing local.
    pub fn new_local(&mut self, prefix: &str, ty: Type) -> LocalId {
        let mut n = self.locals.len();
        loop {
            let name = format!("{prefix}{n}");
            if !self.locals.iter().any(|l| l.name == name) {
                self.locals.push(LocalDecl { name, ty });
                return LocalId::from_index(self.locals.len() - 1);
            }
            n += 1;
        }
    }

    /// Returns the declaration of a local.
    #[must_use]
    pub fn local(&self, id: LocalId) -> Option<&LocalDecl> {
        self.locals.get(id.index())
    }

    /// Returns the declared type of a local.
    #[must_use]
    pub fn local_type(&self, id: LocalId) -> Option<&Type> {
        self.locals.get(id.index()).map(|l| &l.ty)
    }

    /// Changes the declared type of a local.
    pub fn set_local_type(&mut self, id: LocalId, ty: Type) {
        if let Some(local) = self.locals.get_mut(id.index()) {
            local.ty = ty;
        }
    }

    /// All local declarations, indexed by [`LocalId`].
    #[must_use]
    pub fn locals(&self) -> &[LocalDecl] {
        &self.locals
    }

    /// Number of locals.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// The instruction sequence.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Mutable access to the instruction sequence.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The local bound to `@this`, if any.
    #[must_use]
    pub fn this_local(&self) -> Option<LocalId> {
        self.instructions.iter().find_map(|instr| match instr {
            Instruction::Identity {
                local,
                source: IdentitySource::This(_),
            } => Some(*local),
            _ => None,
        })
    }

    /// Index of the first instruction after the identity prologue.
    #[must_use]
    pub fn first_non_identity(&self) -> usize {
        self.instructions
            .iter()
            .position(|i| !i.is_identity())
            .unwrap_or(self.instructions.len())
    }

    /// Static type of an operand.
    #[must_use]
    pub fn operand_type(&self, operand: &Operand) -> Option<Type> {
        match operand {
            Operand::Local(id) => self.local_type(*id).cloned(),
            Operand::Const(c) => Some(c.ty()),
        }
    }

    /// Static type of a value, or `None` if it references an unknown local or indexes a
    /// non-array.
    #[must_use]
    pub fn value_type(&self, value: &Value) -> Option<Type> {
        match value {
            Value::Local { local } => self.local_type(*local).cloned(),
            Value::Constant { constant } => Some(constant.ty()),
            Value::InstanceField { field, .. } | Value::StaticField { field } => {
                Some(field.ty.clone())
            }
            Value::ArrayElement { base, .. } => self
                .local_type(*base)
                .and_then(Type::element_type)
                .cloned(),
            Value::NewObject { class } => Some(Type::class(class.clone())),
            Value::NewArray { element, .. } => Some(Type::array_of(element.clone())),
            Value::Length { .. } => Some(Type::Int),
            Value::Binary { lhs, .. } => self.operand_type(lhs),
            Value::Invoke { expr } => Some(expr.method.ret.clone()),
        }
    }

    /// Renders one instruction with local names resolved.
    #[must_use]
    pub fn display_instruction<'a>(&'a self, instruction: &'a Instruction) -> InstructionDisplay<'a> {
        InstructionDisplay {
            body: self,
            instruction,
        }
    }

    fn local_name(&self, id: LocalId) -> &str {
        self.local(id).map_or("<?>", |l| l.name.as_str())
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, operand: &Operand) -> fmt::Result {
        match operand {
            Operand::Local(id) => f.write_str(self.local_name(*id)),
            Operand::Const(c) => write!(f, "{c}"),
        }
    }

    fn fmt_value(&self, f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
        match value {
            Value::Local { local } => f.write_str(self.local_name(*local)),
            Value::Constant { constant } => write!(f, "{constant}"),
            Value::InstanceField { base, field } => {
                write!(f, "{}.{field}", self.local_name(*base))
            }
            Value::StaticField { field } => write!(f, "{field}"),
            Value::ArrayElement { base, index } => {
                write!(f, "{}[", self.local_name(*base))?;
                self.fmt_operand(f, index)?;
                f.write_str("]")
            }
            Value::NewObject { class } => write!(f, "new {class}"),
            Value::NewArray { element, size } => {
                write!(f, "newarray ({element})[")?;
                self.fmt_operand(f, size)?;
                f.write_str("]")
            }
            Value::Length { base } => write!(f, "lengthof {}", self.local_name(*base)),
            Value::Binary { op, lhs, rhs } => {
                self.fmt_operand(f, lhs)?;
                write!(f, " {op} ")?;
                self.fmt_operand(f, rhs)
            }
            Value::Invoke { expr } => {
                write!(f, "{}invoke ", expr.kind)?;
                if let Some(receiver) = expr.receiver {
                    write!(f, "{}.", self.local_name(receiver))?;
                }
                write!(f, "{}(", expr.method)?;
                for (i, arg) in expr.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    self.fmt_operand(f, arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Display adapter returned by [`Body::display_instruction`].
pub struct InstructionDisplay<'a> {
    body: &'a Body,
    instruction: &'a Instruction,
}

impl fmt::Display for InstructionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.body;
        match self.instruction {
            Instruction::Identity { local, source } => match source {
                IdentitySource::This(ty) => {
                    write!(f, "{} := @this: {ty}", body.local_name(*local))
                }
                IdentitySource::Parameter { index, ty } => {
                    write!(f, "{} := @parameter{index}: {ty}", body.local_name(*local))
                }
            },
            Instruction::Assign { lhs, rhs } => {
                body.fmt_value(f, lhs)?;
                f.write_str(" = ")?;
                body.fmt_value(f, rhs)
            }
            Instruction::Invoke { expr } => body.fmt_value(f, &Value::invoke(expr.clone())),
            Instruction::Return { value: None } => f.write_str("return"),
            Instruction::Return { value: Some(op) } => {
                f.write_str("return ")?;
                body.fmt_operand(f, op)
            }
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for local in &self.locals {
            writeln!(f, "    {} {};", local.ty, local.name)?;
        }
        if !self.locals.is_empty() {
            writeln!(f)?;
        }
        for instruction in &self.instructions {
            writeln!(f, "    {};", self.display_instruction(instruction))?;
        }
        Ok(())
    }
}
