//! Instance instrumentation: serial/reads/writes fields and the incrementor methods.
//!
//! [`instrument`] gives a class everything the other passes need to count accesses to its
//! instances:
//!
//! - a static `<prefix>Counter` on the shared counter class, where `<prefix>` is the class name
//!   with its dots removed
//! - three `int` instance fields, `serial`, `reads` and `writes`
//! - two instance methods, `incReads` and `incWrites`, that bump their counter and emit the
//!   instance's serial and the new count to the trace sink
//!
//! The result is cached per class in the [`RewriteContext`]; requesting it again returns the
//! cached [`ObjectProfile`]. Members that already exist on the class are reused, never
//! duplicated.

use strum::Display;

use crate::{
    ir::{
        BinOp, Body, CallKind, Constant, Field, FieldFlags, FieldRef, Instruction, InvokeExpr,
        LocalId, Method, MethodFlags, MethodId, MethodRef, Operand, Program, Type, Value,
    },
    rewrite::{is_rewritable_class, trace, CounterOwner, EventKind, RewriteContext, RewritePass},
    Error, Result,
};

/// Instance field holding the serial number.
pub const SERIAL_FIELD: &str = "serial";
/// Instance field counting reads.
pub const READS_FIELD: &str = "reads";
/// Instance field counting writes.
pub const WRITES_FIELD: &str = "writes";
/// Read incrementor.
pub const INC_READS: &str = "incReads";
/// Write incrementor.
pub const INC_WRITES: &str = "incWrites";

/// Direction of a counted access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Access {
    /// The value is loaded.
    Read,
    /// The value is stored.
    Write,
}

/// Instrumentation metadata of one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProfile {
    /// Instrumented class.
    pub class: String,
    /// Static "instances created" counter on the counter class.
    pub static_counter: FieldRef,
    /// `serial` instance field.
    pub serial: FieldRef,
    /// `reads` instance field.
    pub reads: FieldRef,
    /// `writes` instance field.
    pub writes: FieldRef,
    /// `incReads()` method.
    pub inc_reads: MethodRef,
    /// `incWrites()` method.
    pub inc_writes: MethodRef,
    /// How incrementors are invoked on instances of this class.
    pub call_kind: CallKind,
}

impl ObjectProfile {
    /// The incrementor for an access direction.
    #[must_use]
    pub fn incrementor(&self, access: Access) -> &MethodRef {
        match access {
            Access::Read => &self.inc_reads,
            Access::Write => &self.inc_writes,
        }
    }

    /// `base.incReads()` / `base.incWrites()`
    #[must_use]
    pub fn incrementor_call(&self, base: LocalId, access: Access) -> Instruction {
        Instruction::invoke(InvokeExpr::new_instance(
            self.call_kind,
            base,
            self.incrementor(access).clone(),
            Vec::new(),
        ))
    }

    /// Returns `true` for the three synthesized instance fields.
    #[must_use]
    pub fn is_instrumentation_field(&self, field: &FieldRef) -> bool {
        field.class == self.class
            && [SERIAL_FIELD, READS_FIELD, WRITES_FIELD].contains(&field.name.as_str())
    }
}

/// Namespacing prefix for a class: the dotted name with the dots removed.
#[must_use]
pub fn flattened_name(class: &str) -> String {
    class.replace('.', "")
}

/// Returns `true` if the field is one of the synthesized `serial`/`reads`/`writes` fields.
#[must_use]
pub fn is_instrumentation_field_name(name: &str) -> bool {
    [SERIAL_FIELD, READS_FIELD, WRITES_FIELD].contains(&name)
}

/// Instruments `class` and returns its profile, or the cached profile if the class was
/// instrumented before.
///
/// # Errors
///
/// Returns [`Error::UnknownClass`] if the class is not registered, [`Error::Malformed`] if it
/// is an interface or one of the synthesized members clashes with an existing member.
pub fn instrument(ctx: &RewriteContext, program: &Program, class: &str) -> Result<ObjectProfile> {
    if let Some(profile) = ctx.profile(class) {
        return Ok(profile);
    }

    let is_interface = program
        .with_class(class, |c| c.is_interface())
        .ok_or_else(|| Error::UnknownClass(class.to_string()))?;
    if is_interface {
        return Err(malformed_error!("cannot instrument interface {}", class));
    }

    match ctx.profiles.entry(class.to_string()) {
        dashmap::mapref::entry::Entry::Occupied(entry) => Ok(entry.get().clone()),
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            let profile = build_profile(ctx, program, class)?;
            slot.insert(profile.clone());
            ctx.events
                .record(EventKind::ClassInstrumented)
                .message(format!("{class} counter {}", profile.static_counter.name));
            log::debug!("instrumented {class}");
            Ok(profile)
        }
    }
}

fn build_profile(ctx: &RewriteContext, program: &Program, class: &str) -> Result<ObjectProfile> {
    let prefix = flattened_name(class);
    let static_counter = ctx
        .counters
        .counter_for(program, CounterOwner::Instances(class), &prefix)?;
    ctx.events
        .record(EventKind::CounterCreated)
        .message(static_counter.to_string());

    let add = |name: &str| {
        program.add_field(class, Field::new(name, Type::Int, FieldFlags::SYNTHETIC))
    };
    let serial = add(SERIAL_FIELD)?;
    let reads = add(READS_FIELD)?;
    let writes = add(WRITES_FIELD)?;

    let inc_reads = create_incrementor(ctx, program, class, INC_READS, &reads, &serial)?;
    let inc_writes = create_incrementor(ctx, program, class, INC_WRITES, &writes, &serial)?;

    Ok(ObjectProfile {
        class: class.to_string(),
        static_counter,
        serial,
        reads,
        writes,
        inc_reads,
        inc_writes,
        call_kind: program.call_kind_for(class),
    })
}

/// Synthesizes `name()` on `class`, incrementing `counter` and emitting the serial and new
/// count. Returns the existing method if one with that name is already declared.
fn create_incrementor(
    ctx: &RewriteContext,
    program: &Program,
    class: &str,
    name: &str,
    counter: &FieldRef,
    serial: &FieldRef,
) -> Result<MethodRef> {
    let existing = program
        .with_class(class, |c| c.method_by_name(name).map(|m| m.reference(class)))
        .flatten();
    if let Some(method) = existing {
        return Ok(method);
    }

    let operation = if counter.name == READS_FIELD { "reads" } else { "writes" };
    let sink = &ctx.config.trace;

    let mut body = Body::new();
    let this = body.add_local("r0", Type::class(class))?;
    let count = body.add_local("$count", Type::Int)?;
    let id = body.add_local("$serial", Type::Int)?;
    body.push(Instruction::identity_this(this, Type::class(class)));
    body.push(Instruction::assign(
        Value::local(count),
        Value::instance_field(this, counter.clone()),
    ));
    body.push(Instruction::assign(
        Value::local(count),
        Value::Binary {
            op: BinOp::Add,
            lhs: Operand::Local(count),
            rhs: Operand::Const(Constant::Int(1)),
        },
    ));
    body.push(Instruction::assign(
        Value::instance_field(this, counter.clone()),
        Value::local(count),
    ));
    body.push(Instruction::assign(
        Value::local(id),
        Value::instance_field(this, serial.clone()),
    ));
    body.push(trace::emit(sink, trace::serial_label(class), Operand::Local(id)));
    body.push(trace::emit(
        sink,
        trace::counter_label(class, operation),
        Operand::Local(count),
    ));
    body.push(Instruction::return_void());

    let method = Method::new(name, Vec::new(), Type::Void, MethodFlags::SYNTHETIC).with_body(body);
    program.add_method(class, method)?;
    let method_ref = MethodRef::new(class, name, Vec::new(), Type::Void);
    ctx.mark_generated(&method_ref);
    ctx.events
        .record(EventKind::IncrementorSynthesized)
        .message(method_ref.to_string());
    Ok(method_ref)
}

/// Instruments every rewritable, non-interface application class.
pub struct InstanceInstrumentationPass;

impl RewritePass for InstanceInstrumentationPass {
    fn name(&self) -> &'static str {
        "InstanceInstrumentation"
    }

    fn is_global(&self) -> bool {
        true
    }

    fn run_on_method(
        &self,
        _method: &MethodId,
        _body: &mut Body,
        _program: &Program,
        _ctx: &RewriteContext,
    ) -> Result<bool> {
        Ok(false)
    }

    fn run_global(&self, program: &Program, ctx: &RewriteContext) -> Result<bool> {
        ctx.counters.ensure_class(program);
        let mut changed = false;
        for class in program.application_classes() {
            if !is_rewritable_class(&class, program, ctx) || program.is_interface(&class) {
                continue;
            }
            instrument(ctx, program, &class)?;
            changed = true;
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Adds serial, reads and writes counters to every application class"
    }
}
