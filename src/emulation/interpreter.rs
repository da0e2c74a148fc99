//! The IR interpreter.
//!
//! Bodies are straight-line code, so a frame is just a local table and an instruction cursor.
//! Calls recurse on the host stack, bounded by [`EmulationLimits::max_call_depth`].
//!
//! Dispatch follows the JVM: static and special calls resolve from the class named in the
//! method reference, virtual and interface calls from the runtime class of the receiver. Static
//! initializers run before the first allocation, static field access or static call touching
//! their class. Calls to the configured trace sink are handled natively and captured.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    emulation::{EmValue, EmulationLimits, Heap, StaticStorage, TraceCapture, TraceLine},
    ir::{
        BinOp, Body, CallKind, FieldRef, IdentitySource, Instruction, InvokeExpr, LocalId, MethodId,
        MethodRef, Operand, Program, Type, Value, CONSTRUCTOR_NAME, OBJECT_CLASS,
        STATIC_INITIALIZER_NAME,
    },
    rewrite::TraceSink,
    Error, Result,
};

/// Executes IR methods of a [`Program`].
pub struct Emulator<'p> {
    program: &'p Program,
    sink: TraceSink,
    limits: EmulationLimits,
    heap: Heap,
    statics: StaticStorage,
    capture: TraceCapture,
    initialized: HashSet<String>,
    bodies: HashMap<MethodId, Arc<Body>>,
    executed: u64,
    depth: usize,
}

impl<'p> Emulator<'p> {
    /// Creates an emulator with default limits and the default trace sink.
    #[must_use]
    pub fn new(program: &'p Program) -> Self {
        let limits = EmulationLimits::default();
        Self {
            program,
            sink: TraceSink::default(),
            heap: Heap::new(limits.max_heap_objects),
            limits,
            statics: StaticStorage::new(),
            capture: TraceCapture::new(),
            initialized: HashSet::new(),
            bodies: HashMap::new(),
            executed: 0,
            depth: 0,
        }
    }

    /// Replaces the execution limits. Must be called before anything is allocated.
    #[must_use]
    pub fn with_limits(mut self, limits: EmulationLimits) -> Self {
        self.heap = Heap::new(limits.max_heap_objects);
        self.limits = limits;
        self
    }

    /// Replaces the trace sink handled natively.
    #[must_use]
    pub fn with_trace_sink(mut self, sink: TraceSink) -> Self {
        self.sink = sink;
        self
    }

    /// The heap.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Static field storage.
    #[must_use]
    pub fn statics(&self) -> &StaticStorage {
        &self.statics
    }

    /// Every line emitted through the trace sink so far.
    #[must_use]
    pub fn trace(&self) -> &TraceCapture {
        &self.capture
    }

    /// Number of instructions executed so far.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Runs a static method given as `Class.method`.
    ///
    /// The method must take no parameters or a single array parameter (as `main(String[])`
    /// does), which receives an empty array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the entry does not exist, and any error raised while
    /// executing it.
    pub fn run_entry(&mut self, entry: &str) -> Result<EmValue> {
        let (class, name) = entry
            .rsplit_once('.')
            .ok_or_else(|| Error::UnknownMethod(entry.to_string()))?;
        let id = self
            .program
            .find_method_by_name(class, name)
            .ok_or_else(|| Error::UnknownMethod(entry.to_string()))?;
        let method = self
            .program
            .method_ref(&id)
            .ok_or_else(|| Error::UnknownMethod(entry.to_string()))?;

        let args = match method.params.as_slice() {
            [] => Vec::new(),
            [Type::Array(element)] => vec![EmValue::Ref(self.heap.alloc_array(element, 0)?)],
            _ => {
                return Err(Error::Emulation(format!(
                    "entry {method} takes parameters"
                )))
            }
        };
        log::debug!("emulating {method}");
        self.invoke(CallKind::Static, &method, None, args)
    }

    /// Invokes a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] on runtime faults (null dereference, bad index, missing
    /// implementation) and [`Error::LimitExceeded`] when a limit is hit.
    pub fn invoke(
        &mut self,
        kind: CallKind,
        method: &MethodRef,
        receiver: Option<EmValue>,
        args: Vec<EmValue>,
    ) -> Result<EmValue> {
        if method.class == self.sink.class && method.name == self.sink.method {
            return self.emit(&args);
        }
        if kind != CallKind::Static {
            match &receiver {
                Some(EmValue::Null) | None => {
                    return Err(Error::Emulation(format!("null receiver calling {method}")))
                }
                Some(_) => {}
            }
        }

        match self.dispatch(kind, method, receiver.as_ref())? {
            Some(id) => self.call(&id, method, receiver, args),
            None if method.name == CONSTRUCTOR_NAME && method.class == OBJECT_CLASS => {
                Ok(EmValue::Void)
            }
            None => Err(Error::Emulation(format!("no implementation of {method}"))),
        }
    }

    fn dispatch(
        &mut self,
        kind: CallKind,
        method: &MethodRef,
        receiver: Option<&EmValue>,
    ) -> Result<Option<MethodId>> {
        let start = match (kind, receiver) {
            (CallKind::Virtual | CallKind::Interface, Some(EmValue::Ref(r))) => self
                .heap
                .class_of(*r)?
                .map_or_else(|| method.class.clone(), str::to_string),
            (CallKind::Static, _) => {
                self.ensure_initialized(&method.class)?;
                method.class.clone()
            }
            _ => method.class.clone(),
        };

        let resolved = self
            .program
            .resolve_method(&start, &method.name, &method.params)
            .or_else(|| {
                self.program
                    .resolve_method(&method.class, &method.name, &method.params)
            });
        Ok(resolved.and_then(|(declaring, _)| {
            self.program
                .find_method(&declaring, &method.name, &method.params)
        }))
    }

    fn call(
        &mut self,
        id: &MethodId,
        method: &MethodRef,
        receiver: Option<EmValue>,
        args: Vec<EmValue>,
    ) -> Result<EmValue> {
        let body = match self.bodies.get(id) {
            Some(body) => Arc::clone(body),
            None => {
                let body = self.program.body(id).map(Arc::new).ok_or_else(|| {
                    Error::Emulation(format!("{method} has no body"))
                })?;
                self.bodies.insert(id.clone(), Arc::clone(&body));
                body
            }
        };

        if self.limits.max_call_depth > 0 && self.depth >= self.limits.max_call_depth {
            return Err(Error::LimitExceeded(format!(
                "call depth {} exceeded calling {method}",
                self.limits.max_call_depth
            )));
        }
        self.depth += 1;
        let result = self.execute(&body, receiver, &args);
        self.depth -= 1;
        result
    }

    /// Runs the static initializers of `class` and its superclasses, once each.
    fn ensure_initialized(&mut self, class: &str) -> Result<()> {
        if !self.initialized.insert(class.to_string()) {
            return Ok(());
        }
        if let Some(superclass) = self.program.superclass_of(class) {
            self.ensure_initialized(&superclass)?;
        }
        if let Some(id) = self.program.find_method(class, STATIC_INITIALIZER_NAME, &[]) {
            let method = MethodRef::new(class, STATIC_INITIALIZER_NAME, Vec::new(), Type::Void);
            if self.program.body(&id).is_some() {
                self.call(&id, &method, None, Vec::new())?;
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.executed += 1;
        if self.limits.max_instructions > 0 && self.executed > self.limits.max_instructions {
            return Err(Error::LimitExceeded(format!(
                "instruction limit of {} reached",
                self.limits.max_instructions
            )));
        }
        Ok(())
    }

    fn execute(&mut self, body: &Body, this: Option<EmValue>, args: &[EmValue]) -> Result<EmValue> {
        let mut locals: Vec<EmValue> = body
            .locals()
            .iter()
            .map(|l| EmValue::default_for(&l.ty))
            .collect();

        for instruction in body.instructions() {
            self.tick()?;
            match instruction {
                Instruction::Identity { local, source } => {
                    let value = match source {
                        IdentitySource::This(_) => this.clone().ok_or_else(|| {
                            Error::Emulation("@this bound without a receiver".to_string())
                        })?,
                        IdentitySource::Parameter { index, .. } => {
                            args.get(*index).cloned().ok_or_else(|| {
                                Error::Emulation(format!("missing argument {index}"))
                            })?
                        }
                    };
                    Self::set_local(&mut locals, local.index(), value)?;
                }
                Instruction::Assign { lhs, rhs } => {
                    let value = self.eval(rhs, &locals)?;
                    self.store(lhs, value, &mut locals)?;
                }
                Instruction::Invoke { expr } => {
                    self.eval_invoke(expr, &locals)?;
                }
                Instruction::Return { value } => {
                    return match value {
                        Some(operand) => Self::operand(operand, &locals),
                        None => Ok(EmValue::Void),
                    };
                }
            }
        }
        Ok(EmValue::Void)
    }

    fn set_local(locals: &mut [EmValue], index: usize, value: EmValue) -> Result<()> {
        let slot = locals
            .get_mut(index)
            .ok_or_else(|| Error::Emulation(format!("unknown local #{index}")))?;
        *slot = value;
        Ok(())
    }

    fn operand(operand: &Operand, locals: &[EmValue]) -> Result<EmValue> {
        match operand {
            Operand::Local(id) => locals
                .get(id.index())
                .cloned()
                .ok_or_else(|| Error::Emulation(format!("unknown local #{}", id.0))),
            Operand::Const(constant) => Ok(EmValue::from_constant(constant)),
        }
    }

    fn local(locals: &[EmValue], id: LocalId) -> Result<EmValue> {
        Self::operand(&Operand::Local(id), locals)
    }

    /// The field as declared, so subclass accesses share the declaring class's slot.
    fn declared(&self, field: &FieldRef) -> FieldRef {
        self.program
            .resolve_field(&field.class, &field.name)
            .unwrap_or_else(|| field.clone())
    }

    fn eval(&mut self, value: &Value, locals: &[EmValue]) -> Result<EmValue> {
        match value {
            Value::Local { local } => Self::local(locals, *local),
            Value::Constant { constant } => Ok(EmValue::from_constant(constant)),
            Value::InstanceField { base, field } => {
                let object = Self::local(locals, *base)?.as_ref()?;
                self.heap.get_field(object, &self.declared(field))
            }
            Value::StaticField { field } => {
                let field = self.declared(field);
                self.ensure_initialized(&field.class)?;
                Ok(self.statics.get(&field))
            }
            Value::ArrayElement { base, index } => {
                let array = Self::local(locals, *base)?.as_ref()?;
                let index = Self::operand(index, locals)?.as_int()?;
                self.heap.get_element(array, index)
            }
            Value::NewObject { class } => {
                self.ensure_initialized(class)?;
                Ok(EmValue::Ref(self.heap.alloc_object(class)?))
            }
            Value::NewArray { element, size } => {
                let size = Self::operand(size, locals)?.as_int()?;
                let length = usize::try_from(size)
                    .map_err(|_| Error::Emulation(format!("negative array size {size}")))?;
                Ok(EmValue::Ref(self.heap.alloc_array(element, length)?))
            }
            Value::Length { base } => {
                let array = Self::local(locals, *base)?.as_ref()?;
                let length = self.heap.array_length(array)?;
                Ok(EmValue::Int(i32::try_from(length).unwrap_or(i32::MAX)))
            }
            Value::Binary { op, lhs, rhs } => {
                arithmetic(*op, &Self::operand(lhs, locals)?, &Self::operand(rhs, locals)?)
            }
            Value::Invoke { expr } => self.eval_invoke(expr, locals),
        }
    }

    fn store(&mut self, place: &Value, value: EmValue, locals: &mut [EmValue]) -> Result<()> {
        match place {
            Value::Local { local } => Self::set_local(locals, local.index(), value),
            Value::InstanceField { base, field } => {
                let object = Self::local(locals, *base)?.as_ref()?;
                let field = self.declared(field);
                self.heap.set_field(object, &field, value)
            }
            Value::StaticField { field } => {
                let field = self.declared(field);
                self.ensure_initialized(&field.class)?;
                self.statics.set(&field, value);
                Ok(())
            }
            Value::ArrayElement { base, index } => {
                let array = Self::local(locals, *base)?.as_ref()?;
                let index = Self::operand(index, locals)?.as_int()?;
                self.heap.set_element(array, index, value)
            }
            other => Err(Error::Emulation(format!(
                "assignment to non-place {other:?}"
            ))),
        }
    }

    fn eval_invoke(&mut self, expr: &InvokeExpr, locals: &[EmValue]) -> Result<EmValue> {
        let receiver = expr
            .receiver
            .map(|r| Self::local(locals, r))
            .transpose()?;
        let args = expr
            .args
            .iter()
            .map(|a| Self::operand(a, locals))
            .collect::<Result<Vec<_>>>()?;
        self.invoke(expr.kind, &expr.method, receiver, args)
    }

    fn emit(&mut self, args: &[EmValue]) -> Result<EmValue> {
        let (label, value) = match args {
            [EmValue::Str(label), EmValue::Int(v)] => (label.clone(), i64::from(*v)),
            [EmValue::Str(label), EmValue::Long(v)] => (label.clone(), *v),
            other => {
                return Err(Error::Emulation(format!(
                    "trace sink called with {other:?}"
                )))
            }
        };
        self.capture.push(TraceLine {
            tag: self.sink.tag.clone(),
            label,
            value,
        });
        Ok(EmValue::Void)
    }
}

fn arithmetic(op: BinOp, lhs: &EmValue, rhs: &EmValue) -> Result<EmValue> {
    Ok(match (lhs, rhs) {
        (EmValue::Int(a), EmValue::Int(b)) => EmValue::Int(match op {
            BinOp::Add => a.wrapping_add(*b),
            BinOp::Sub => a.wrapping_sub(*b),
            BinOp::Mul => a.wrapping_mul(*b),
        }),
        (EmValue::Long(a), EmValue::Long(b)) => EmValue::Long(match op {
            BinOp::Add => a.wrapping_add(*b),
            BinOp::Sub => a.wrapping_sub(*b),
            BinOp::Mul => a.wrapping_mul(*b),
        }),
        (EmValue::Float(a), EmValue::Float(b)) => EmValue::Float(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
        }),
        (EmValue::Double(a), EmValue::Double(b)) => EmValue::Double(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
        }),
        (a, b) => {
            return Err(Error::Emulation(format!(
                "operator {op} applied to {a} and {b}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Class, Constant, Field, FieldFlags, Method, MethodFlags},
        rewrite::trace,
    };

    fn counter_program() -> Program {
        let program = Program::new();
        let mut class = Class::new("a.Counter");
        class
            .add_field(Field::new("count", Type::Int, FieldFlags::STATIC))
            .unwrap();
        let count = FieldRef::new_static("a.Counter", "count", Type::Int);

        // static void bump() { count = count + 1; emit("bumped ", count) }
        let mut body = Body::new();
        let c = body.add_local("$c", Type::Int).unwrap();
        body.push(Instruction::assign(Value::local(c), Value::static_field(count.clone())));
        body.push(Instruction::assign(
            Value::local(c),
            Value::Binary {
                op: BinOp::Add,
                lhs: Operand::Local(c),
                rhs: Operand::Const(Constant::Int(1)),
            },
        ));
        body.push(Instruction::assign(Value::static_field(count), Value::local(c)));
        body.push(trace::emit(
            &TraceSink::default(),
            "bumped ".to_string(),
            Operand::Local(c),
        ));
        body.push(Instruction::return_void());
        class
            .add_method(Method::new("bump", vec![], Type::Void, MethodFlags::STATIC).with_body(body))
            .unwrap();

        // static void twice() { bump(); bump() }
        let bump = MethodRef::new("a.Counter", "bump", vec![], Type::Void);
        let mut body = Body::new();
        body.push(Instruction::invoke(InvokeExpr::new_static(bump.clone(), vec![])));
        body.push(Instruction::invoke(InvokeExpr::new_static(bump, vec![])));
        body.push(Instruction::return_void());
        class
            .add_method(Method::new("twice", vec![], Type::Void, MethodFlags::STATIC).with_body(body))
            .unwrap();

        // static void loop() { loop() }
        let mut body = Body::new();
        body.push(Instruction::invoke(InvokeExpr::new_static(
            MethodRef::new("a.Counter", "loop", vec![], Type::Void),
            vec![],
        )));
        body.push(Instruction::return_void());
        class
            .add_method(Method::new("loop", vec![], Type::Void, MethodFlags::STATIC).with_body(body))
            .unwrap();

        program.add_class(class).unwrap();
        program
    }

    #[test]
    fn test_static_calls_and_trace() {
        let program = counter_program();
        let mut emulator = Emulator::new(&program);
        emulator.run_entry("a.Counter.twice").unwrap();

        assert_eq!(
            emulator.trace().render(),
            vec!["HEAPSCOPE: bumped 1", "HEAPSCOPE: bumped 2"]
        );
        let count = FieldRef::new_static("a.Counter", "count", Type::Int);
        assert_eq!(emulator.statics().get(&count), EmValue::Int(2));
    }

    #[test]
    fn test_call_depth_limit() {
        let program = counter_program();
        let mut emulator =
            Emulator::new(&program).with_limits(EmulationLimits::new().with_max_call_depth(16));
        assert!(matches!(
            emulator.run_entry("a.Counter.loop"),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_instruction_limit() {
        let program = counter_program();
        let mut emulator =
            Emulator::new(&program).with_limits(EmulationLimits::new().with_max_instructions(3));
        assert!(matches!(
            emulator.run_entry("a.Counter.twice"),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_virtual_dispatch_uses_runtime_class() {
        let program = Program::new();
        let mut base = Class::new("a.Base");
        let mut body = Body::new();
        let this = body.add_local("r0", Type::class("a.Base")).unwrap();
        body.push(Instruction::identity_this(this, Type::class("a.Base")));
        body.push(Instruction::return_value(Operand::Const(Constant::Int(1))));
        base.add_method(Method::new("id", vec![], Type::Int, MethodFlags::empty()).with_body(body))
            .unwrap();
        program.add_class(base).unwrap();

        let mut derived = Class::new("a.Derived");
        derived.superclass = Some("a.Base".into());
        let mut body = Body::new();
        let this = body.add_local("r0", Type::class("a.Derived")).unwrap();
        body.push(Instruction::identity_this(this, Type::class("a.Derived")));
        body.push(Instruction::return_value(Operand::Const(Constant::Int(2))));
        derived
            .add_method(Method::new("id", vec![], Type::Int, MethodFlags::empty()).with_body(body))
            .unwrap();
        program.add_class(derived).unwrap();

        let mut emulator = Emulator::new(&program);
        let object = emulator.heap.alloc_object("a.Derived").unwrap();
        let id = MethodRef::new("a.Base", "id", vec![], Type::Int);
        let result = emulator
            .invoke(CallKind::Virtual, &id, Some(EmValue::Ref(object)), vec![])
            .unwrap();
        assert_eq!(result, EmValue::Int(2));

        let special = emulator
            .invoke(CallKind::Special, &id, Some(EmValue::Ref(object)), vec![])
            .unwrap();
        assert_eq!(special, EmValue::Int(1));

        let object_init = MethodRef::new(OBJECT_CLASS, CONSTRUCTOR_NAME, vec![], Type::Void);
        assert_eq!(
            emulator
                .invoke(CallKind::Special, &object_init, Some(EmValue::Ref(object)), vec![])
                .unwrap(),
            EmValue::Void
        );
        assert!(emulator
            .invoke(CallKind::Virtual, &id, Some(EmValue::Null), vec![])
            .is_err());
    }
}
