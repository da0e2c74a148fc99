//! Post-rewrite verification.
//!
//! The verifier re-checks every method body of every application class once a rewrite batch
//! has completed. It accepts a program only if:
//!
//! - both sides of every assignment agree in type, modulo `null`, upcasts along the class
//!   hierarchy and int widening of sub-word primitives
//! - identity bindings agree with the method signature and the bound local's type
//! - every local, field and method an instruction references exists; references into classes
//!   whose hierarchy is not fully part of the program are trusted
//! - call arguments match the callee's parameters in count and type
//! - returned values match the declared return type
//! - field names and method signatures are unique within each class
//!
//! # Usage
//!
//! ```rust,ignore
//! use heapscope::verify;
//!
//! let violations = verify::verify_program(&program, None);
//! for violation in &violations {
//!     eprintln!("{violation}");
//! }
//! ```

mod body;

use std::{collections::HashSet, fmt};

use crate::{
    ir::{MethodId, Program},
    rewrite::RewriteConfig,
    Error, Result,
};

/// One rule broken by a method body or class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Qualified name of the method (or the class, for class-level rules).
    pub method: String,
    /// Instruction index, if the violation is tied to one instruction.
    pub location: Option<usize>,
    /// What is wrong.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(f, "{}@{location}: {}", self.method, self.message),
            None => write!(f, "{}: {}", self.method, self.message),
        }
    }
}

/// Verifies one method body. Methods without a body verify trivially.
#[must_use]
pub fn verify_method(program: &Program, id: &MethodId) -> Vec<Violation> {
    let (Some(method), Some(body)) = (program.method(id), program.body(id)) else {
        return Vec::new();
    };
    body::BodyVerifier::new(program, &id.class, &method, &body).run()
}

/// Verifies the member uniqueness rules of one class.
#[must_use]
pub fn verify_class(program: &Program, class: &str) -> Vec<Violation> {
    program
        .with_class(class, |c| {
            let mut violations = Vec::new();
            let mut fields = HashSet::new();
            for field in &c.fields {
                if !fields.insert(field.name.as_str()) {
                    violations.push(Violation {
                        method: class.to_string(),
                        location: None,
                        message: format!("duplicate field '{}'", field.name),
                    });
                }
            }
            let mut methods = HashSet::new();
            for method in &c.methods {
                if !methods.insert((method.name.as_str(), &method.params)) {
                    violations.push(Violation {
                        method: class.to_string(),
                        location: None,
                        message: format!("duplicate method {}", method.reference(class)),
                    });
                }
            }
            violations
        })
        .unwrap_or_default()
}

/// Verifies every application class, synthesized ones included. Classes in the excluded
/// packages of `config` are skipped.
#[must_use]
pub fn verify_program(program: &Program, config: Option<&RewriteConfig>) -> Vec<Violation> {
    let mut violations = Vec::new();
    for class in program.application_classes() {
        if config.is_some_and(|c| {
            c.excluded_packages
                .iter()
                .any(|prefix| class.starts_with(prefix.as_str()))
        }) {
            continue;
        }
        violations.extend(verify_class(program, &class));
        for id in program.methods_of(&class) {
            violations.extend(verify_method(program, &id));
        }
    }
    violations
}

/// Verifies the program and turns the first violation into an error.
///
/// Every violation is logged at warn level.
///
/// # Errors
///
/// Returns [`Error::Verification`] if at least one violation is found.
pub fn check(program: &Program, config: Option<&RewriteConfig>) -> Result<()> {
    check_violations(verify_program(program, config))
}

/// Turns a list of violations into a result, logging each one.
///
/// # Errors
///
/// Returns [`Error::Verification`] naming the first violation if the list is not empty.
pub fn check_violations(violations: Vec<Violation>) -> Result<()> {
    for violation in &violations {
        log::warn!("verification: {violation}");
    }
    match violations.first() {
        None => Ok(()),
        Some(first) => Err(Error::Verification {
            method: first.method.clone(),
            message: match first.location {
                Some(location) => format!("instruction {location}: {}", first.message),
                None => first.message.clone(),
            },
            count: violations.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Body, Class, Constant, Field, FieldFlags, FieldRef, Instruction, Method, MethodFlags,
        Type, Value,
    };

    fn program_with(body: Body, ret: Type) -> Program {
        let program = Program::new();
        let mut class = Class::new("a.Foo");
        class
            .add_field(Field::new("x", Type::Int, FieldFlags::empty()))
            .unwrap();
        class
            .add_method(Method::new("m", vec![], ret, MethodFlags::STATIC).with_body(body))
            .unwrap();
        program.add_class(class).unwrap();
        program
    }

    #[test]
    fn test_clean_program_passes() {
        let mut body = Body::new();
        let f = body.add_local("r0", Type::class("a.Foo")).unwrap();
        body.push(Instruction::assign(
            Value::local(f),
            Value::NewObject {
                class: "a.Foo".into(),
            },
        ));
        body.push(Instruction::assign(
            Value::instance_field(f, FieldRef::instance("a.Foo", "x", Type::Int)),
            Value::constant(Constant::Int(5)),
        ));
        body.push(Instruction::return_void());
        let program = program_with(body, Type::Void);
        assert!(check(&program, None).is_ok());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut body = Body::new();
        let s = body.add_local("r0", Type::string()).unwrap();
        body.push(Instruction::assign(
            Value::local(s),
            Value::constant(Constant::Int(1)),
        ));
        body.push(Instruction::return_void());
        let program = program_with(body, Type::Void);

        match check(&program, None) {
            Err(Error::Verification { method, count, .. }) => {
                assert_eq!(method, "a.Foo.m");
                assert_eq!(count, 1);
            }
            other => panic!("expected verification error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut body = Body::new();
        let f = body.add_local("r0", Type::class("a.Foo")).unwrap();
        body.push(Instruction::assign(
            Value::instance_field(f, FieldRef::instance("a.Foo", "y", Type::Int)),
            Value::constant(Constant::Int(5)),
        ));
        body.push(Instruction::return_void());
        let program = program_with(body, Type::Void);
        let violations = verify_program(&program, None);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("y"));
    }

    #[test]
    fn test_missing_return_value_rejected() {
        let mut body = Body::new();
        body.push(Instruction::return_void());
        let program = program_with(body, Type::Int);
        assert_eq!(verify_program(&program, None).len(), 1);
    }
}
