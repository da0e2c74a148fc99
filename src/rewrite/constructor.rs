//! Serial assignment at construction time.
//!
//! Every constructor of an instrumented class starts, right after its identity prologue, with
//!
//! ```text
//! $c = <StaticCounter: int FooCounter>
//! $c = $c + 1
//! this.<Foo: int serial> = $c
//! <StaticCounter: int FooCounter> = $c
//! staticinvoke <Trace: void emit(java.lang.String,int)>("Foo serial id = ", $c)
//! ```
//!
//! so serials start at 1 and grow by one per instance. Constructors delegating to another
//! constructor of the same class (`this(...)`) are left alone: the delegate assigns the serial,
//! and patching both would consume two serials per instance.

use crate::{
    ir::{BinOp, Body, Constant, Instruction, MethodId, Operand, Program, Type, Value, CONSTRUCTOR_NAME},
    rewrite::{
        is_rewritable, qualified_name, trace, EventKind, ObjectProfile, PendingEdits, RewriteContext,
        RewritePass, TraceSink,
    },
    Result,
};

/// Why a constructor was left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchSkip {
    /// The body already assigns the serial field.
    AlreadyPatched,
    /// The body delegates to another constructor of the same class.
    Delegating,
}

/// Inserts serial assignment into a constructor body.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the body has no `this` binding.
pub fn patch_constructor(
    body: &mut Body,
    profile: &ObjectProfile,
    sink: &TraceSink,
) -> Result<std::result::Result<(), PatchSkip>> {
    let Some(this) = body.this_local() else {
        return Err(malformed_error!(
            "constructor of {} has no this binding",
            profile.class
        ));
    };

    let mut delegating = false;
    for instruction in body.instructions() {
        match instruction {
            Instruction::Assign {
                lhs: Value::InstanceField { field, .. },
                ..
            } if *field == profile.serial => return Ok(Err(PatchSkip::AlreadyPatched)),
            Instruction::Invoke { expr }
                if expr.receiver == Some(this)
                    && expr.method.name == CONSTRUCTOR_NAME
                    && expr.method.class == profile.class =>
            {
                delegating = true;
            }
            _ => {}
        }
    }
    if delegating {
        return Ok(Err(PatchSkip::Delegating));
    }

    let count = body.new_local("$serial", Type::Int);
    let sequence = vec![
        Instruction::assign(
            Value::local(count),
            Value::static_field(profile.static_counter.clone()),
        ),
        Instruction::assign(
            Value::local(count),
            Value::Binary {
                op: BinOp::Add,
                lhs: Operand::Local(count),
                rhs: Operand::Const(Constant::Int(1)),
            },
        ),
        Instruction::assign(
            Value::instance_field(this, profile.serial.clone()),
            Value::local(count),
        ),
        Instruction::assign(
            Value::static_field(profile.static_counter.clone()),
            Value::local(count),
        ),
        trace::emit(sink, trace::serial_label(&profile.class), Operand::Local(count)),
    ];

    let mut edits = PendingEdits::new();
    edits.insert_before(body.first_non_identity(), sequence);
    edits.apply(body)?;
    Ok(Ok(()))
}

/// Patches every constructor of every instrumented class.
pub struct ConstructorPatchPass;

impl RewritePass for ConstructorPatchPass {
    fn name(&self) -> &'static str {
        "ConstructorPatch"
    }

    fn should_run(&self, method: &MethodId, program: &Program, ctx: &RewriteContext) -> bool {
        is_rewritable(method, program, ctx)
            && ctx.profiles.contains_key(&method.class)
            && program
                .method(method)
                .is_some_and(|m| m.is_constructor())
    }

    fn run_on_method(
        &self,
        method: &MethodId,
        body: &mut Body,
        program: &Program,
        ctx: &RewriteContext,
    ) -> Result<bool> {
        let Some(profile) = ctx.profile(&method.class) else {
            return Ok(false);
        };
        let name = qualified_name(method, program);
        match patch_constructor(body, &profile, &ctx.config.trace)? {
            Ok(()) => {
                ctx.events
                    .record(EventKind::ConstructorPatched)
                    .method(name)
                    .pass(self.name());
                Ok(true)
            }
            Err(skip) => {
                log::debug!("{name}: constructor left unchanged ({skip:?})");
                Ok(false)
            }
        }
    }

    fn description(&self) -> &'static str {
        "Assigns a per-class serial number in every constructor"
    }
}
