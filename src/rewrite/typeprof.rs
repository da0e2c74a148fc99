//! Per-type access counting.
//!
//! Unlike the per-object counters, these tallies are static: one read and one write counter
//! per accessed type, held on the shared counter class and bumped by synthesized static
//! methods. Every instance field access counts against the field's declaring class, every
//! array element access against the array type (`int[]` counts as `intArray`), and accesses
//! of primitive type additionally count against the primitive (`int`, `double`, ...).
//!
//! For a key such as `com.example.Foo` the counter class receives
//!
//! ```text
//! static int comexampleFooReadCounter
//! static int comexampleFooWriteCounter
//! static void incrementcomexampleFooRead()    // emits "com.example.Foo read counter = n"
//! static void incrementcomexampleFooWrite()   // emits "com.example.Foo write counter = n"
//! ```

use crate::{
    ir::{Body, FieldRef, Instruction, InvokeExpr, MethodId, MethodRef, Program, Type, Value},
    rewrite::{
        counters::{counter_key, static_incrementor, CounterOwner}, profile::is_instrumentation_field_name, qualified_name,
        Access, EventKind, PendingEdits, RewriteContext, RewritePass,
    },
    Result,
};

/// Static read/write counters of one type key.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCounter {
    /// The key (`com.example.Foo`, `intArray`, `int`).
    pub name: String,
    /// `<joined>ReadCounter`
    pub read_field: FieldRef,
    /// `<joined>WriteCounter`
    pub write_field: FieldRef,
    /// `increment<joined>Read()`
    pub read: MethodRef,
    /// `increment<joined>Write()`
    pub write: MethodRef,
}

impl TypeCounter {
    /// `staticinvoke increment<joined>Read()` or `...Write()`.
    #[must_use]
    pub fn call(&self, access: Access) -> Instruction {
        let method = match access {
            Access::Read => &self.read,
            Access::Write => &self.write,
        };
        Instruction::invoke(InvokeExpr::new_static(method.clone(), Vec::new()))
    }
}

/// The counters of `name`, created on first request.
///
/// # Errors
///
/// Returns an error if the counter class cannot receive the members.
pub fn type_counter(ctx: &RewriteContext, program: &Program, name: &str) -> Result<TypeCounter> {
    if let Some(counter) = ctx.type_counters.get(name) {
        return Ok(counter.clone());
    }
    match ctx.type_counters.entry(name.to_string()) {
        dashmap::mapref::entry::Entry::Occupied(entry) => Ok(entry.get().clone()),
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            let joined = name.replace('.', "");
            let read_key = format!("{joined}Read");
            let write_key = format!("{joined}Write");
            let read_field = ctx
                .counters
                .counter_for(program, CounterOwner::TypeReads(name), &read_key)?;
            let write_field = ctx
                .counters
                .counter_for(program, CounterOwner::TypeWrites(name), &write_key)?;
            let read = static_incrementor(
                ctx,
                program,
                counter_key(&read_field),
                &format!("{name} read"),
                &read_field,
            )?;
            let write = static_incrementor(
                ctx,
                program,
                counter_key(&write_field),
                &format!("{name} write"),
                &write_field,
            )?;
            let counter = TypeCounter {
                name: name.to_string(),
                read_field,
                write_field,
                read,
                write,
            };
            slot.insert(counter.clone());
            Ok(counter)
        }
    }
}

fn is_primitive_key(name: &str) -> bool {
    name.parse::<Type>().is_ok_and(|ty| ty.is_primitive())
}

/// Inserts per-type counter calls before field and array element accesses.
pub struct TypeProfilingPass;

impl TypeProfilingPass {
    /// Type keys counted for one accessed value, in insertion order.
    fn keys(value: &Value, body: &Body, program: &Program) -> Vec<String> {
        let mut keys = Vec::new();
        match value {
            Value::InstanceField { field, .. } => {
                if is_instrumentation_field_name(&field.name) {
                    return keys;
                }
                let declaring = program
                    .resolve_field(&field.class, &field.name)
                    .map_or_else(|| field.class.clone(), |f| f.class);
                keys.push(declaring);
                let ty = field.ty.to_string();
                if is_primitive_key(&ty) {
                    keys.push(ty);
                }
            }
            Value::ArrayElement { base, .. } => {
                let Some(ty) = body.local_type(*base) else {
                    return keys;
                };
                let spelled = ty.to_string();
                keys.push(spelled.replace("[]", "Array"));
                let element = spelled.replace("[]", "");
                if is_primitive_key(&element) {
                    keys.push(element);
                }
            }
            _ => {}
        }
        keys
    }
}

impl RewritePass for TypeProfilingPass {
    fn name(&self) -> &'static str {
        "TypeProfiling"
    }

    fn run_on_method(
        &self,
        method: &MethodId,
        body: &mut Body,
        program: &Program,
        ctx: &RewriteContext,
    ) -> Result<bool> {
        let name = qualified_name(method, program);
        let mut edits = PendingEdits::new();
        let mut inserted = 0usize;

        for (index, instruction) in body.instructions().iter().enumerate() {
            let Instruction::Assign { lhs, rhs } = instruction else {
                continue;
            };
            let accesses = [(lhs, Access::Write), (rhs, Access::Read)];
            for (value, access) in accesses {
                for key in Self::keys(value, body, program) {
                    let counter = type_counter(ctx, program, &key)?;
                    edits.insert_before(index, [counter.call(access)]);
                    inserted += 1;
                    ctx.events
                        .record(EventKind::TypeCounterInserted)
                        .at(name.as_str(), index)
                        .message(format!("{key} {access}"))
                        .pass(self.name());
                }
            }
        }

        edits.apply(body)?;
        Ok(inserted > 0)
    }

    fn description(&self) -> &'static str {
        "Counts reads and writes per accessed type on the counter class"
    }
}
