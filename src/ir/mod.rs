//! Intermediate representation of the programs being rewritten.
//!
//! The IR is a typed, three-address, Jimple-style representation: every method body is a
//! table of typed locals plus a flat list of [`Instruction`]s whose operands are locals or
//! constants. It is produced by an external loader and written back out by an external
//! serializer; in this crate both sides are the JSON [`ProgramImage`].
//!
//! # Key Components
//!
//! - [`Type`] - primitive, class and array types, in Java source spelling
//! - [`Value`] / [`Operand`] - the right- and left-hand sides of assignments
//! - [`Instruction`] - identity binding, assignment, call, return
//! - [`Body`] - locals plus instructions, with a textual listing via `Display`
//! - [`Class`] / [`Method`] / [`Field`] - declarations with bitflag modifiers
//! - [`Program`] - concurrent class table shared by all rewrite passes

mod body;
mod class;
mod instruction;
mod program;
mod types;
mod value;

pub use body::{Body, InstructionDisplay, LocalDecl};
pub use class::{
    Class, ClassFlags, ClassKind, Field, FieldFlags, Method, MethodFlags, CONSTRUCTOR_NAME,
    STATIC_INITIALIZER_NAME,
};
pub use instruction::{IdentitySource, Instruction};
pub use program::{MethodId, Program, ProgramImage};
pub use types::{Type, OBJECT_CLASS, STRING_CLASS};
pub use value::{BinOp, CallKind, Constant, FieldRef, InvokeExpr, LocalId, MethodRef, Operand, Value};
