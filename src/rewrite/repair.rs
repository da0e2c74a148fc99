//! Adaptation between raw arrays and wrappers.
//!
//! After wrapper substitution a value of wrapper type can meet a place that still expects a
//! raw array (a library parameter, an array-typed field, a kept `main(String[])` signature)
//! and vice versa. [`plan`] decides how to bridge one such pair of types and
//! [`adapt_operand`] emits the bridging instructions:
//!
//! | from        | to          | emitted                                        |
//! |-------------|-------------|------------------------------------------------|
//! | `W(T)`      | `S[]`       | `$raw = w.array`                               |
//! | `S[]`       | `W(T)`      | `$wrap = new W; $wrap.<init>(T[])(raw)`        |
//! | `W(S)`      | `W(T)`      | unwrap, then wrap                              |
//!
//! each only when `T[]` is assignable to `S[]` (or `S[]` to `T[]` for wrapping).
//!
//! [`repair`] is the final scan over a rewritten body: it re-checks every assignment and
//! return and inserts the adaptations needed for both sides to agree.

use crate::{
    ir::{Body, Instruction, Operand, Program, Type, Value},
    rewrite::{EventKind, PendingEdits, RewriteContext, WrapperClass},
    Result,
};

/// How to turn a value of one type into another.
#[derive(Debug, Clone, PartialEq)]
pub enum Adaptation {
    /// Load the raw array out of a wrapper.
    Unwrap(WrapperClass),
    /// Wrap a raw array.
    Wrap(WrapperClass),
    /// Unwrap from one wrapper and wrap into another.
    Rewrap {
        /// Wrapper of the source value.
        from: WrapperClass,
        /// Wrapper of the destination.
        to: WrapperClass,
    },
    /// A wrapper is involved but no adaptation preserves the value (for example a
    /// multi-dimensional array on the other side).
    Unsupported,
}

/// The wrapper a type names, if it is a wrapper class type.
#[must_use]
pub fn wrapper_of_type(ctx: &RewriteContext, ty: &Type) -> Option<WrapperClass> {
    ty.class_name().and_then(|name| ctx.wrapper(name))
}

/// Decides how a value of type `from` reaches a place of type `to`.
///
/// Returns `None` when no adaptation is needed, or when neither side involves a wrapper (such
/// mismatches are left to the verifier).
#[must_use]
pub fn plan(ctx: &RewriteContext, program: &Program, from: &Type, to: &Type) -> Option<Adaptation> {
    if program.is_assignable(from, to) {
        return None;
    }
    let source = wrapper_of_type(ctx, from);
    let target = wrapper_of_type(ctx, to);

    let adaptation = match (source, target) {
        (Some(w), None) if to.is_array() => {
            if program.is_assignable(&w.array_type(), to) {
                Adaptation::Unwrap(w)
            } else {
                Adaptation::Unsupported
            }
        }
        (None, Some(v)) if from.is_array() => {
            if program.is_assignable(from, &v.array_type()) {
                Adaptation::Wrap(v)
            } else {
                Adaptation::Unsupported
            }
        }
        (Some(w), Some(v)) => {
            if program.is_assignable(&w.array_type(), &v.array_type()) {
                Adaptation::Rewrap { from: w, to: v }
            } else {
                Adaptation::Unsupported
            }
        }
        (Some(_), None) | (None, Some(_)) => Adaptation::Unsupported,
        (None, None) => return None,
    };
    Some(adaptation)
}

/// Emits the instructions of `adaptation` applied to `operand` into `pre` and returns the
/// adapted operand, or `None` for [`Adaptation::Unsupported`].
pub fn adapt_operand(
    body: &mut Body,
    adaptation: &Adaptation,
    operand: Operand,
    pre: &mut Vec<Instruction>,
) -> Option<Operand> {
    match adaptation {
        Adaptation::Unwrap(w) => Some(unwrap(body, w, operand, pre)),
        Adaptation::Wrap(v) => Some(wrap(body, v, operand, pre)),
        Adaptation::Rewrap { from, to } => {
            let raw = unwrap(body, from, operand, pre);
            Some(wrap(body, to, raw, pre))
        }
        Adaptation::Unsupported => None,
    }
}

fn unwrap(body: &mut Body, wrapper: &WrapperClass, operand: Operand, pre: &mut Vec<Instruction>) -> Operand {
    match operand {
        Operand::Local(local) => {
            let raw = body.new_local("$raw", wrapper.array_type());
            pre.push(wrapper.unwrap_into(raw, local));
            Operand::Local(raw)
        }
        constant @ Operand::Const(_) => constant,
    }
}

fn wrap(body: &mut Body, wrapper: &WrapperClass, operand: Operand, pre: &mut Vec<Instruction>) -> Operand {
    let target = body.new_local("$wrap", wrapper.ty());
    pre.extend(wrapper.wrap_into(target, operand));
    Operand::Local(target)
}

/// Re-checks every assignment and return of `body` and inserts adaptations where one side is
/// a wrapper and the other a raw array.
///
/// `ret` is the (possibly rewritten) return type of the method. Returns the number of
/// adaptations inserted. Mismatches without a feasible adaptation are recorded as
/// [`EventKind::SkippedUnsupported`] and left for the verifier to reject.
///
/// # Errors
///
/// Returns an error if the edit batch cannot be applied.
pub fn repair(
    body: &mut Body,
    ret: &Type,
    method: &str,
    program: &Program,
    ctx: &RewriteContext,
) -> Result<usize> {
    let mut edits = PendingEdits::new();
    let mut inserted = 0;
    let instructions = body.instructions().to_vec();

    for (index, instruction) in instructions.iter().enumerate() {
        match instruction {
            Instruction::Assign { lhs, rhs } => {
                let (Some(lt), Some(rt)) = (body.value_type(lhs), body.value_type(rhs)) else {
                    continue;
                };
                let Some(adaptation) = plan(ctx, program, &rt, &lt) else {
                    continue;
                };
                let mut pre = Vec::new();
                let operand = match rhs.as_operand() {
                    Some(operand) => operand,
                    None => {
                        let tmp = body.new_local("$tmp", rt.clone());
                        pre.push(Instruction::assign(Value::local(tmp), rhs.clone()));
                        Operand::Local(tmp)
                    }
                };
                match adapt_operand(body, &adaptation, operand, &mut pre) {
                    Some(adapted) => {
                        pre.push(Instruction::assign(lhs.clone(), adapted.into()));
                        edits.replace(index, pre)?;
                        inserted += 1;
                        ctx.events
                            .record(EventKind::AdaptationInserted)
                            .at(method, index)
                            .message(format!("{rt} -> {lt}"));
                    }
                    None => unsupported(ctx, method, index, &rt, &lt),
                }
            }
            Instruction::Return {
                value: Some(operand),
            } => {
                let Some(ot) = body.operand_type(operand) else {
                    continue;
                };
                let Some(adaptation) = plan(ctx, program, &ot, ret) else {
                    continue;
                };
                let mut pre = Vec::new();
                match adapt_operand(body, &adaptation, operand.clone(), &mut pre) {
                    Some(adapted) => {
                        pre.push(Instruction::return_value(adapted));
                        edits.replace(index, pre)?;
                        inserted += 1;
                        ctx.events
                            .record(EventKind::AdaptationInserted)
                            .at(method, index)
                            .message(format!("return {ot} -> {ret}"));
                    }
                    None => unsupported(ctx, method, index, &ot, ret),
                }
            }
            _ => {}
        }
    }

    edits.apply(body)?;
    Ok(inserted)
}

fn unsupported(ctx: &RewriteContext, method: &str, index: usize, from: &Type, to: &Type) {
    log::warn!("{method}@{index}: cannot adapt {from} to {to}");
    ctx.events
        .record(EventKind::SkippedUnsupported)
        .at(method, index)
        .message(format!("no adaptation from {from} to {to}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Class, Field, FieldFlags, FieldRef},
        rewrite::{wrapper_for, RewriteConfig},
    };

    fn setup() -> (Program, RewriteContext, WrapperClass) {
        let program = Program::new();
        let mut holder = Class::new("a.Holder");
        holder
            .add_field(Field::new("data", Type::array_of(Type::Int), FieldFlags::empty()))
            .unwrap();
        program.add_class(holder).unwrap();
        let ctx = RewriteContext::new(RewriteConfig::default());
        let wrapper = wrapper_for(&ctx, &program, &Type::Int).unwrap().unwrap();
        (program, ctx, wrapper)
    }

    #[test]
    fn test_plan() {
        let (program, ctx, wrapper) = setup();
        let raw = Type::array_of(Type::Int);
        assert_eq!(
            plan(&ctx, &program, &wrapper.ty(), &raw),
            Some(Adaptation::Unwrap(wrapper.clone()))
        );
        assert_eq!(
            plan(&ctx, &program, &raw, &wrapper.ty()),
            Some(Adaptation::Wrap(wrapper.clone()))
        );
        assert_eq!(plan(&ctx, &program, &wrapper.ty(), &wrapper.ty()), None);
        assert_eq!(plan(&ctx, &program, &wrapper.ty(), &Type::object()), None);
        assert_eq!(
            plan(&ctx, &program, &wrapper.ty(), &Type::array_of(raw)),
            Some(Adaptation::Unsupported)
        );
        assert_eq!(plan(&ctx, &program, &Type::Int, &Type::Long), None);
    }

    #[test]
    fn test_repair_field_store() {
        let (program, ctx, wrapper) = setup();
        let data = FieldRef::instance("a.Holder", "data", Type::array_of(Type::Int));

        let mut body = Body::new();
        let holder = body.add_local("r0", Type::class("a.Holder")).unwrap();
        let w = body.add_local("r1", wrapper.ty()).unwrap();
        body.push(Instruction::assign(
            Value::instance_field(holder, data.clone()),
            Value::local(w),
        ));
        body.push(Instruction::assign(
            Value::local(w),
            Value::instance_field(holder, data),
        ));

        let count = repair(&mut body, &Type::Void, "a.Holder.m", &program, &ctx).unwrap();
        assert_eq!(count, 2);
        // unwrap + store, then tmp load + new + <init> + assign
        assert_eq!(body.len(), 6);
        let text = body.to_string();
        assert!(text.contains(".<heapscope.generated.intArray: int[] array>"));
        assert!(text.contains("new heapscope.generated.intArray"));
    }

    #[test]
    fn test_repair_return() {
        let (program, ctx, wrapper) = setup();
        let mut body = Body::new();
        let w = body.add_local("r1", wrapper.ty()).unwrap();
        body.push(Instruction::return_value(Operand::Local(w)));

        let ret = Type::array_of(Type::Int);
        assert_eq!(repair(&mut body, &ret, "a.Holder.m", &program, &ctx).unwrap(), 1);
        assert_eq!(body.len(), 2);
        assert!(matches!(
            body.instructions()[1],
            Instruction::Return { value: Some(Operand::Local(_)) }
        ));
        assert_eq!(
            body.operand_type(&Operand::Local(crate::ir::LocalId(1))),
            Some(ret)
        );
    }
}
