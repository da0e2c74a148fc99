//! Field access counting.
//!
//! Every assignment touching an instance field gets an incrementor call on the field's base
//! object, placed strictly before the assignment:
//!
//! ```text
//! virtualinvoke r1.<Foo: void incWrites()>()   // left operand is a field
//! virtualinvoke r2.<Bar: void incReads()>()    // right operand is a field
//! r1.<Foo: int x> = r2.<Bar: int y>
//! ```
//!
//! The write call always comes first. Accesses to classes without a profile (library and
//! interface types) are skipped and recorded as [`EventKind::SkippedMissingMetadata`].

use crate::{
    ir::{Body, FieldRef, Instruction, LocalId, MethodId, Program, Value},
    rewrite::{
        profile::{is_instrumentation_field_name, Access},
        qualified_name, EventKind, PendingEdits, RewriteContext, RewritePass,
    },
    Result,
};

/// Inserts `incReads`/`incWrites` calls before instance field accesses.
pub struct FieldAccessPass;

impl FieldAccessPass {
    /// Queues the incrementor call for one field operand. Returns `true` if a call was queued.
    #[allow(clippy::too_many_arguments)]
    fn queue(
        &self,
        edits: &mut PendingEdits,
        index: usize,
        base: LocalId,
        field: &FieldRef,
        access: Access,
        name: &str,
        program: &Program,
        ctx: &RewriteContext,
    ) -> bool {
        if is_instrumentation_field_name(&field.name) {
            return false;
        }
        let declaring = program
            .resolve_field(&field.class, &field.name)
            .map_or_else(|| field.class.clone(), |f| f.class);

        match ctx.profile(&declaring) {
            Some(profile) if !profile.is_instrumentation_field(field) => {
                edits.insert_before(index, [profile.incrementor_call(base, access)]);
                ctx.events
                    .record(EventKind::FieldAccessInstrumented)
                    .at(name, index)
                    .message(format!("{access} {field}"))
                    .pass(self.name());
                true
            }
            Some(_) => false,
            None => {
                log::debug!("{name}@{index}: no instrumentation for {declaring}, {access} of {field} not counted");
                ctx.events
                    .record(EventKind::SkippedMissingMetadata)
                    .at(name, index)
                    .message(format!("{declaring} has no profile ({access} {field})"))
                    .pass(self.name());
                false
            }
        }
    }
}

impl RewritePass for FieldAccessPass {
    fn name(&self) -> &'static str {
        "FieldAccess"
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
        let mut changed = false;

        for (index, instruction) in body.instructions().iter().enumerate() {
            let Instruction::Assign { lhs, rhs } = instruction else {
                continue;
            };
            if let Value::InstanceField { base, field } = lhs {
                changed |= self.queue(
                    &mut edits,
                    index,
                    *base,
                    field,
                    Access::Write,
                    &name,
                    program,
                    ctx,
                );
            }
            if let Value::InstanceField { base, field } = rhs {
                changed |= self.queue(
                    &mut edits,
                    index,
                    *base,
                    field,
                    Access::Read,
                    &name,
                    program,
                    ctx,
                );
            }
        }

        edits.apply(body)?;
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Counts reads and writes of instance fields per object"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Class, Constant, Field, FieldFlags, Type},
        rewrite::{instrument, RewriteConfig},
    };

    fn setup() -> (Program, RewriteContext) {
        let program = Program::new();
        let mut foo = Class::new("a.Foo");
        foo.add_field(Field::new("x", Type::Int, FieldFlags::empty()))
            .unwrap();
        program.add_class(foo).unwrap();
        let mut lib = Class::library("lib.Point");
        lib.add_field(Field::new("y", Type::Int, FieldFlags::empty()))
            .unwrap();
        program.add_class(lib).unwrap();

        let ctx = RewriteContext::new(RewriteConfig::default());
        instrument(&ctx, &program, "a.Foo").unwrap();
        (program, ctx)
    }

    #[test]
    fn test_write_then_read_before_instruction() {
        let (program, ctx) = setup();
        let x = FieldRef::instance("a.Foo", "x", Type::Int);

        let mut body = Body::new();
        let f = body.add_local("r1", Type::class("a.Foo")).unwrap();
        let g = body.add_local("r2", Type::class("a.Foo")).unwrap();
        body.push(Instruction::assign(
            Value::instance_field(f, x.clone()),
            Value::instance_field(g, x),
        ));
        body.push(Instruction::return_void());

        let id = MethodId::new("a.Foo", 0);
        assert!(FieldAccessPass
            .run_on_method(&id, &mut body, &program, &ctx)
            .unwrap());

        let instrs = body.instructions();
        assert_eq!(instrs.len(), 4);
        let first = instrs[0].invoke_expr().unwrap();
        assert_eq!(first.method.name, "incWrites");
        assert_eq!(first.receiver, Some(f));
        let second = instrs[1].invoke_expr().unwrap();
        assert_eq!(second.method.name, "incReads");
        assert_eq!(second.receiver, Some(g));
        assert!(matches!(instrs[2], Instruction::Assign { .. }));
        assert_eq!(ctx.events.count_kind(EventKind::FieldAccessInstrumented), 2);
    }

    #[test]
    fn test_library_field_skipped() {
        let (program, ctx) = setup();
        let mut body = Body::new();
        let p = body.add_local("r1", Type::class("lib.Point")).unwrap();
        body.push(Instruction::assign(
            Value::instance_field(p, FieldRef::instance("lib.Point", "y", Type::Int)),
            Value::constant(Constant::Int(1)),
        ));

        let id = MethodId::new("a.Foo", 0);
        assert!(!FieldAccessPass
            .run_on_method(&id, &mut body, &program, &ctx)
            .unwrap());
        assert_eq!(body.len(), 1);
        assert_eq!(ctx.events.count_kind(EventKind::SkippedMissingMetadata), 1);
    }

    #[test]
    fn test_instrumentation_fields_ignored() {
        let (program, ctx) = setup();
        let profile = ctx.profile("a.Foo").unwrap();
        let mut body = Body::new();
        let f = body.add_local("r1", Type::class("a.Foo")).unwrap();
        body.push(Instruction::assign(
            Value::instance_field(f, profile.serial.clone()),
            Value::constant(Constant::Int(1)),
        ));

        let id = MethodId::new("a.Foo", 0);
        assert!(!FieldAccessPass
            .run_on_method(&id, &mut body, &program, &ctx)
            .unwrap());
        assert_eq!(body.len(), 1);
    }
}
