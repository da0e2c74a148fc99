//! Per-body verification rules.

use std::collections::{HashSet, VecDeque};

use crate::{
    ir::{
        Body, CallKind, Class, FieldRef, IdentitySource, Instruction, InvokeExpr, LocalId, Method,
        Operand, Program, Type, Value, OBJECT_CLASS,
    },
    verify::Violation,
};

/// Methods every class inherits from `java.lang.Object`, trusted when the program does not
/// carry a descriptor for it.
const OBJECT_METHODS: &[&str] = &[
    "<init>",
    "clone",
    "equals",
    "finalize",
    "getClass",
    "hashCode",
    "notify",
    "notifyAll",
    "toString",
    "wait",
];

/// Outcome of a member lookup through a class hierarchy.
enum Lookup<T> {
    Found(T),
    /// Every class of the hierarchy is application code and none declares the member.
    Missing,
    /// Part of the hierarchy is library code or absent from the program.
    Unknown,
}

pub(super) struct BodyVerifier<'a> {
    program: &'a Program,
    class: &'a str,
    method: &'a Method,
    body: &'a Body,
    name: String,
    violations: Vec<Violation>,
}

impl<'a> BodyVerifier<'a> {
    pub(super) fn new(program: &'a Program, class: &'a str, method: &'a Method, body: &'a Body) -> Self {
        Self {
            program,
            class,
            method,
            body,
            name: format!("{class}.{}", method.name),
            violations: Vec::new(),
        }
    }

    pub(super) fn run(mut self) -> Vec<Violation> {
        for (index, instruction) in self.body.instructions().iter().enumerate() {
            if self.check_locals(index, instruction) {
                self.check_instruction(index, instruction);
            }
        }
        self.violations
    }

    fn report(&mut self, index: usize, message: impl Into<String>) {
        self.violations.push(Violation {
            method: self.name.clone(),
            location: Some(index),
            message: message.into(),
        });
    }

    fn assignable(&self, from: &Type, to: &Type) -> bool {
        self.program.is_assignable(from, to)
    }

    /// Returns `false` if the instruction references an undeclared local.
    fn check_locals(&mut self, index: usize, instruction: &Instruction) -> bool {
        let mut used = Vec::new();
        instruction.locals(&mut used);
        let count = self.body.local_count();
        let unknown: Vec<_> = used.iter().filter(|l| l.index() >= count).collect();
        if unknown.is_empty() {
            return true;
        }
        for local in unknown {
            self.report(index, format!("unknown local #{}", local.0));
        }
        false
    }

    fn check_instruction(&mut self, index: usize, instruction: &Instruction) {
        match instruction {
            Instruction::Identity { local, source } => self.check_identity(index, *local, source),
            Instruction::Assign { lhs, rhs } => {
                if !lhs.is_place() {
                    self.report(index, "assignment to a non-place value");
                }
                self.check_value(index, lhs);
                self.check_value(index, rhs);
                match (self.body.value_type(lhs), self.body.value_type(rhs)) {
                    (Some(lt), Some(rt)) => {
                        if !self.assignable(&rt, &lt) {
                            self.report(index, format!("cannot assign {rt} to {lt}"));
                        }
                    }
                    _ => self.report(index, "assignment of an untyped value"),
                }
            }
            Instruction::Invoke { expr } => self.check_invoke(index, expr),
            Instruction::Return { value } => self.check_return(index, value.as_ref()),
        }
    }

    fn check_identity(&mut self, index: usize, local: LocalId, source: &IdentitySource) {
        match source {
            IdentitySource::This(ty) => {
                if self.method.is_static() {
                    self.report(index, "@this bound in a static method");
                }
                if *ty != Type::class(self.class) {
                    self.report(index, format!("@this bound as {ty} in {}", self.class));
                }
            }
            IdentitySource::Parameter { index: p, ty } => match self.method.params.get(*p) {
                None => self.report(
                    index,
                    format!(
                        "@parameter{p} bound but the method takes {} parameters",
                        self.method.params.len()
                    ),
                ),
                Some(declared) if declared != ty => self.report(
                    index,
                    format!("@parameter{p} bound as {ty} but declared as {declared}"),
                ),
                Some(_) => {}
            },
        }
        if let Some(local_ty) = self.body.local_type(local).cloned() {
            if !self.assignable(source.ty(), &local_ty) {
                self.report(
                    index,
                    format!("{} bound to a local of type {local_ty}", source.ty()),
                );
            }
        }
    }

    fn check_return(&mut self, index: usize, value: Option<&Operand>) {
        let ret = self.method.ret.clone();
        match value {
            None if ret != Type::Void => {
                self.report(index, format!("missing return value of type {ret}"));
            }
            Some(_) if ret == Type::Void => self.report(index, "value returned from void method"),
            Some(operand) => match self.body.operand_type(operand) {
                Some(ty) if !self.assignable(&ty, &ret) => {
                    self.report(index, format!("returns {ty} where {ret} is declared"));
                }
                _ => {}
            },
            None => {}
        }
    }

    fn check_value(&mut self, index: usize, value: &Value) {
        match value {
            Value::InstanceField { base, field } => {
                if field.is_static {
                    self.report(index, format!("static field {field} accessed on an instance"));
                }
                if let Some(base_ty) = self.body.local_type(*base).cloned() {
                    if !self.assignable(&base_ty, &Type::class(field.class.clone())) {
                        self.report(index, format!("{field} accessed on a {base_ty}"));
                    }
                }
                self.check_field(index, field);
            }
            Value::StaticField { field } => {
                if !field.is_static {
                    self.report(index, format!("instance field {field} accessed statically"));
                }
                self.check_field(index, field);
            }
            Value::ArrayElement { base, index: element } => {
                self.require_array(index, *base);
                self.require_int(index, element, "array index");
            }
            Value::Length { base } => self.require_array(index, *base),
            Value::NewArray { element, size } => {
                if *element == Type::Void {
                    self.report(index, "array of void");
                }
                self.require_int(index, size, "array size");
            }
            Value::NewObject { class } => {
                if self.program.is_interface(class) {
                    self.report(index, format!("instantiation of interface {class}"));
                }
            }
            Value::Binary { op, lhs, rhs } => {
                let (Some(lt), Some(rt)) = (self.body.operand_type(lhs), self.body.operand_type(rhs))
                else {
                    return;
                };
                let numeric = lt.is_primitive() && rt.is_primitive();
                if !numeric || !(self.assignable(&lt, &rt) || self.assignable(&rt, &lt)) {
                    self.report(index, format!("operator {op} applied to {lt} and {rt}"));
                }
            }
            Value::Invoke { expr } => self.check_invoke(index, expr),
            Value::Local { .. } | Value::Constant { .. } => {}
        }
    }

    fn require_array(&mut self, index: usize, base: LocalId) {
        match self.body.local_type(base) {
            Some(ty) if ty.is_array() => {}
            Some(ty) => {
                let message = format!("array operation on a {ty}");
                self.report(index, message);
            }
            None => {}
        }
    }

    fn require_int(&mut self, index: usize, operand: &Operand, what: &str) {
        if let Some(ty) = self.body.operand_type(operand) {
            if !ty.is_int_like() {
                self.report(index, format!("{what} of type {ty}"));
            }
        }
    }

    fn check_field(&mut self, index: usize, field: &FieldRef) {
        let name = field.name.clone();
        match self.lookup(&field.class, |c| c.field(&name).map(|f| f.reference(&c.name))) {
            Lookup::Found(declared) => {
                if declared.ty != field.ty {
                    self.report(
                        index,
                        format!("{field} declared as {} {}", declared.ty, declared.name),
                    );
                }
                if declared.is_static != field.is_static {
                    self.report(index, format!("{field} static mismatch"));
                }
            }
            Lookup::Missing => self.report(index, format!("unresolved field {field}")),
            Lookup::Unknown => {}
        }
    }

    fn check_invoke(&mut self, index: usize, expr: &InvokeExpr) {
        let callee = &expr.method;
        if expr.args.len() != callee.params.len() {
            self.report(
                index,
                format!(
                    "{callee} called with {} arguments, expects {}",
                    expr.args.len(),
                    callee.params.len()
                ),
            );
        } else {
            for (position, (arg, param)) in expr.args.iter().zip(&callee.params).enumerate() {
                if let Some(ty) = self.body.operand_type(arg) {
                    if !self.assignable(&ty, param) {
                        self.report(
                            index,
                            format!("argument {position} of {callee}: {ty} is not a {param}"),
                        );
                    }
                }
            }
        }

        match (expr.kind, expr.receiver) {
            (CallKind::Static, Some(_)) => self.report(index, "static call with a receiver"),
            (CallKind::Static, None) => {}
            (_, None) => self.report(index, format!("instance call of {callee} without receiver")),
            (_, Some(receiver)) => {
                if let Some(ty) = self.body.local_type(receiver).cloned() {
                    if !self.assignable(&ty, &Type::class(callee.class.clone())) {
                        self.report(index, format!("{callee} called on a {ty}"));
                    }
                }
            }
        }

        let (name, params) = (callee.name.clone(), callee.params.clone());
        match self.lookup(&callee.class, |c| c.method(&name, &params).map(Method::signature)) {
            Lookup::Found(declared) => {
                if declared.ret != callee.ret {
                    self.report(
                        index,
                        format!("{callee} declared to return {}", declared.ret),
                    );
                }
                if declared.is_static() != (expr.kind == CallKind::Static) {
                    self.report(index, format!("{callee} called with {} dispatch", expr.kind));
                }
            }
            Lookup::Missing => {
                let inherited = OBJECT_METHODS.contains(&callee.name.as_str())
                    && !self.program.contains_class(OBJECT_CLASS);
                if !inherited {
                    self.report(index, format!("unresolved method {callee}"));
                }
            }
            Lookup::Unknown => {}
        }
    }

    /// Searches `class`, its superclasses and its interfaces for a member.
    fn lookup<T>(&self, class: &str, find: impl Fn(&Class) -> Option<T>) -> Lookup<T> {
        let mut seen = HashSet::new();
        let mut pending = VecDeque::from([class.to_string()]);
        let mut complete = true;

        while let Some(current) = pending.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let visited = self.program.with_class(&current, |c| {
                let mut parents = c.interfaces.clone();
                parents.extend(c.superclass.clone());
                (find(c), parents, c.is_application())
            });
            match visited {
                Some((Some(found), _, _)) => return Lookup::Found(found),
                Some((None, parents, application)) => {
                    complete &= application;
                    pending.extend(parents);
                }
                None if current == OBJECT_CLASS => {}
                None => complete = false,
            }
        }

        if complete {
            Lookup::Missing
        } else {
            Lookup::Unknown
        }
    }
}
