//! Per-method call counting.
//!
//! Each rewritable method starts, right after its identity prologue, with a call to
//! `increment<joined>Call()` on the counter class, where `<joined>` is `Class_method` with dots
//! and angle brackets removed. Overloads share one counter.

use crate::{
    ir::{Body, FieldRef, Instruction, InvokeExpr, MethodId, MethodRef, Program},
    rewrite::{
        counters::{counter_key, static_incrementor, CounterOwner},
        qualified_name, EventKind, PendingEdits, RewriteContext, RewritePass,
    },
    Result,
};

/// Static call counter of one method name.
#[derive(Debug, Clone, PartialEq)]
pub struct CallCounter {
    /// `Class_method`
    pub name: String,
    /// `<joined>CallCounter`
    pub field: FieldRef,
    /// `increment<joined>Call()`
    pub method: MethodRef,
}

impl CallCounter {
    /// `staticinvoke increment<joined>Call()`
    #[must_use]
    pub fn call(&self) -> Instruction {
        Instruction::invoke(InvokeExpr::new_static(self.method.clone(), Vec::new()))
    }
}

/// `Class_method` with the angle brackets of `<init>`/`<clinit>` removed.
#[must_use]
pub fn call_counter_name(class: &str, method: &str) -> String {
    format!("{class}_{}", method.replace(['<', '>'], ""))
}

/// The call counter for `name`, created on first request.
///
/// # Errors
///
/// Returns an error if the counter class cannot receive the members.
pub fn call_counter(ctx: &RewriteContext, program: &Program, name: &str) -> Result<CallCounter> {
    if let Some(counter) = ctx.call_counters.get(name) {
        return Ok(counter.clone());
    }
    match ctx.call_counters.entry(name.to_string()) {
        dashmap::mapref::entry::Entry::Occupied(entry) => Ok(entry.get().clone()),
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            let key = format!("{}Call", name.replace('.', ""));
            let field = ctx
                .counters
                .counter_for(program, CounterOwner::Calls(name), &key)?;
            let method = static_incrementor(
                ctx,
                program,
                counter_key(&field),
                &format!("{name} function call"),
                &field,
            )?;
            let counter = CallCounter {
                name: name.to_string(),
                field,
                method,
            };
            slot.insert(counter.clone());
            Ok(counter)
        }
    }
}

/// Counts calls of every rewritable method.
pub struct CallTrackingPass;

impl RewritePass for CallTrackingPass {
    fn name(&self) -> &'static str {
        "CallTracking"
    }

    fn run_on_method(
        &self,
        method: &MethodId,
        body: &mut Body,
        program: &Program,
        ctx: &RewriteContext,
    ) -> Result<bool> {
        let Some(target) = program.method_ref(method) else {
            return Ok(false);
        };
        let counter = call_counter(ctx, program, &call_counter_name(&target.class, &target.name))?;

        let mut edits = PendingEdits::new();
        let at = body.first_non_identity();
        edits.insert_before(at, [counter.call()]);
        edits.apply(body)?;

        ctx.events
            .record(EventKind::CallCounterInserted)
            .at(qualified_name(method, program), at)
            .message(counter.name)
            .pass(self.name());
        Ok(true)
    }

    fn description(&self) -> &'static str {
        "Counts calls of every application method"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Class, Method, MethodFlags, Type, CONSTRUCTOR_NAME},
        rewrite::RewriteConfig,
    };

    #[test]
    fn test_counter_name() {
        assert_eq!(
            call_counter_name("com.example.Foo", CONSTRUCTOR_NAME),
            "com.example.Foo_init"
        );
        assert_eq!(call_counter_name("a.B", "run"), "a.B_run");
    }

    #[test]
    fn test_call_inserted_after_prologue() {
        let program = Program::new();
        let mut class = Class::new("a.B");
        let mut body = Body::new();
        let this = body.add_local("r0", Type::class("a.B")).unwrap();
        body.push(Instruction::identity_this(this, Type::class("a.B")));
        body.push(Instruction::return_void());
        class
            .add_method(
                Method::new("run", vec![], Type::Void, MethodFlags::empty()).with_body(body),
            )
            .unwrap();
        program.add_class(class).unwrap();

        let ctx = RewriteContext::new(RewriteConfig::default().with_package("gen"));
        let id = program.find_method_by_name("a.B", "run").unwrap();
        let mut body = program.take_body(&id).unwrap();
        assert!(CallTrackingPass
            .run_on_method(&id, &mut body, &program, &ctx)
            .unwrap());

        assert_eq!(body.len(), 3);
        let call = body.instructions()[1].invoke_expr().unwrap();
        assert_eq!(call.method.name, "incrementaB_runCall");
        assert_eq!(call.method.class, "gen.StaticCounter");
        assert!(ctx.counters.get("aB_runCallCounter").is_some());
    }
}
