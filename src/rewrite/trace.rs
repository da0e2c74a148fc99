//! Construction of diagnostic-sink calls.
//!
//! Every line the instrumented program prints goes through one static sink method
//! ([`TraceSink`]), called as `emit(label, value)`. The labels follow two shapes that the
//! [`crate::report`] parser understands:
//!
//! - `<name> serial id = `
//! - `<name> <operation> counter = `

use crate::{
    ir::{Constant, InvokeExpr, Instruction, Operand},
    rewrite::TraceSink,
};

/// Label for a serial number line.
#[must_use]
pub fn serial_label(name: &str) -> String {
    format!("{name} serial id = ")
}

/// Label for a counter line.
#[must_use]
pub fn counter_label(name: &str, operation: &str) -> String {
    format!("{name} {operation} counter = ")
}

/// `staticinvoke <sink>(label, value)`
#[must_use]
pub fn emit(sink: &TraceSink, label: String, value: Operand) -> Instruction {
    Instruction::invoke(InvokeExpr::new_static(
        sink.method_ref(),
        vec![Operand::Const(Constant::Str(label)), value],
    ))
}
