//! Wrapper type propagation.
//!
//! Two passes replace raw single-dimensional arrays with their wrappers program-wide:
//!
//! 1. [`SignatureRewritePass`] (global) maps every array parameter and return type of every
//!    rewritable method to its wrapper. Signatures that the outside world calls with raw arrays
//!    are kept: `static void main(String[])` and methods overriding a method of a class the
//!    rewriter does not touch.
//! 2. [`ArrayPropagationPass`] (per method) then rewrites bodies against the final signatures:
//!    - every single-dimensional array local is retyped to its wrapper
//!    - parameter bindings follow the signature, or wrap the raw argument after the prologue
//!      when the signature was kept
//!    - call sites are retargeted to rewritten callees; wrappers passed to code that was not
//!      rewritten are unwrapped first
//!    - `newarray` into a wrapper local becomes `new W; <init>(int)`
//!    - `a[i]` and `a[i] = v` become `a.get(i)` and `a.set(i, v)`; `lengthof` reads the raw
//!      array
//!
//!    All of that is queued as one edit batch. A second batch from [`repair`] then adapts
//!    whatever assignments and returns still mix wrappers and raw arrays.

use std::collections::{HashSet, VecDeque};

use crate::{
    ir::{
        Body, IdentitySource, Instruction, InvokeExpr, LocalId, Method, MethodId, MethodRef,
        Operand, Program, Type, Value, STRING_CLASS,
    },
    rewrite::{
        is_rewritable, is_rewritable_class, qualified_name,
        repair::{adapt_operand, plan, repair, wrapper_of_type, Adaptation},
        wrapper_for, EventKind, PendingEdits, RewriteContext, RewritePass, WrapperClass,
    },
    Result,
};

/// Maps a single-dimensional array type to its wrapper type, creating the wrapper if needed.
/// Every other type maps to itself.
///
/// # Errors
///
/// Returns an error if the wrapper cannot be synthesized.
pub fn map_type(ctx: &RewriteContext, program: &Program, ty: &Type) -> Result<Type> {
    if let Type::Array(element) = ty {
        if let Some(wrapper) = wrapper_for(ctx, program, element)? {
            return Ok(wrapper.ty());
        }
    }
    Ok(ty.clone())
}

/// Returns `true` if `method` of `class` must keep its declared signature.
#[must_use]
pub fn keeps_raw_signature(
    program: &Program,
    ctx: &RewriteContext,
    class: &str,
    method: &Method,
) -> bool {
    let is_main = method.is_static()
        && method.name == "main"
        && method.ret == Type::Void
        && method.params == [Type::array_of(Type::class(STRING_CLASS))];
    if is_main {
        return true;
    }
    if method.is_constructor() || method.is_static() {
        return false;
    }
    overrides_foreign_method(program, ctx, class, &method.name, &method.params)
}

/// Walks the supertypes of `class` looking for a non-rewritable class declaring
/// `name(params)`.
fn overrides_foreign_method(
    program: &Program,
    ctx: &RewriteContext,
    class: &str,
    name: &str,
    params: &[Type],
) -> bool {
    let supertypes = |c: &str| {
        program
            .with_class(c, |c| {
                let mut parents = c.interfaces.clone();
                parents.extend(c.superclass.clone());
                parents
            })
            .unwrap_or_default()
    };

    let mut seen = HashSet::new();
    let mut pending: VecDeque<String> = supertypes(class).into();
    while let Some(current) = pending.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        let declares = program
            .with_class(&current, |c| c.method(name, params).is_some())
            .unwrap_or(false);
        if declares && !is_rewritable_class(&current, program, ctx) {
            return true;
        }
        pending.extend(supertypes(current.as_str()));
    }
    false
}

/// Maps array parameter and return types of every rewritable method to wrapper types.
pub struct SignatureRewritePass;

impl RewritePass for SignatureRewritePass {
    fn name(&self) -> &'static str {
        "SignatureRewrite"
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
        let mut changed = false;
        for id in program.application_methods() {
            if !is_rewritable(&id, program, ctx) {
                continue;
            }
            let Some(method) = program.method(&id) else {
                continue;
            };
            let has_arrays = method.ret.is_array() || method.params.iter().any(Type::is_array);
            if !has_arrays {
                continue;
            }
            if keeps_raw_signature(program, ctx, &id.class, &method) {
                log::debug!(
                    "{}.{}: signature kept, it is called with raw arrays",
                    id.class,
                    method.name
                );
                continue;
            }

            let params = method
                .params
                .iter()
                .map(|p| map_type(ctx, program, p))
                .collect::<Result<Vec<_>>>()?;
            let ret = map_type(ctx, program, &method.ret)?;
            if params == method.params && ret == method.ret {
                continue;
            }

            let before = method.reference(&id.class);
            program.set_signature(&id, params, ret)?;
            ctx.events
                .record(EventKind::SignatureRewritten)
                .method(before.qualified_name())
                .message(format!("{before}"))
                .pass(self.name());
            changed = true;
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Replaces array types in method signatures with wrapper types"
    }
}

/// Rewrites method bodies to use wrappers in place of raw arrays.
pub struct ArrayPropagationPass;

impl RewritePass for ArrayPropagationPass {
    fn name(&self) -> &'static str {
        "ArrayPropagation"
    }

    fn run_on_method(
        &self,
        method: &MethodId,
        body: &mut Body,
        program: &Program,
        ctx: &RewriteContext,
    ) -> Result<bool> {
        let Some(signature) = program.method(method) else {
            return Ok(false);
        };
        let mut rewriter = BodyRewriter {
            name: qualified_name(method, program),
            pass: self.name(),
            body,
            program,
            ctx,
            changed: false,
        };
        rewriter.retype_locals()?;
        rewriter.rewrite(&signature)?;

        let adapted = repair(
            rewriter.body,
            &signature.ret,
            &rewriter.name,
            program,
            ctx,
        )?;
        Ok(rewriter.changed || adapted > 0)
    }

    fn description(&self) -> &'static str {
        "Replaces raw arrays in method bodies with counting wrappers"
    }
}

struct BodyRewriter<'a> {
    name: String,
    pass: &'static str,
    body: &'a mut Body,
    program: &'a Program,
    ctx: &'a RewriteContext,
    changed: bool,
}

impl BodyRewriter<'_> {
    fn retype_locals(&mut self) -> Result<()> {
        for index in 0..self.body.local_count() {
            let id = LocalId::from_index(index);
            let Some(Type::Array(element)) = self.body.local_type(id).cloned() else {
                continue;
            };
            if let Some(wrapper) = wrapper_for(self.ctx, self.program, &element)? {
                self.body.set_local_type(id, wrapper.ty());
                self.changed = true;
            }
        }
        Ok(())
    }

    fn wrapper_of_local(&self, local: LocalId) -> Option<WrapperClass> {
        self.body
            .local_type(local)
            .and_then(|ty| wrapper_of_type(self.ctx, ty))
    }

    fn event(&self, kind: EventKind, index: usize, message: String) {
        self.ctx
            .events
            .record(kind)
            .at(self.name.as_str(), index)
            .message(message)
            .pass(self.pass);
    }

    fn rewrite(&mut self, signature: &Method) -> Result<()> {
        let mut edits = PendingEdits::new();
        let prologue_end = self.body.first_non_identity();
        let instructions = self.body.instructions().to_vec();

        for (index, instruction) in instructions.iter().enumerate() {
            if let Instruction::Identity {
                local,
                source: IdentitySource::Parameter { index: param, ty },
            } = instruction
            {
                if !ty.is_array() {
                    continue;
                }
                let Some(wrapper) = self.wrapper_of_local(*local) else {
                    continue;
                };
                if signature.params.get(*param) == Some(&wrapper.ty()) {
                    edits.replace(
                        index,
                        vec![Instruction::identity_param(*local, *param, wrapper.ty())],
                    )?;
                    self.event(EventKind::BindingRetyped, index, format!("@parameter{param}"));
                } else {
                    // Raw signature kept: bind a raw local and wrap it after the prologue.
                    let raw = self.body.new_local("$param", ty.clone());
                    edits.replace(index, vec![Instruction::identity_param(raw, *param, ty.clone())])?;
                    edits.insert_before(prologue_end, wrapper.wrap_into(*local, Operand::Local(raw)));
                    self.event(
                        EventKind::AdaptationInserted,
                        index,
                        format!("@parameter{param} wrapped into {}", wrapper.name),
                    );
                }
                self.changed = true;
                continue;
            }

            if let Some(replacement) = self.rewrite_instruction(index, instruction)? {
                edits.replace(index, replacement)?;
                self.changed = true;
            }
        }

        edits.apply(self.body)
    }

    fn rewrite_instruction(
        &mut self,
        index: usize,
        instruction: &Instruction,
    ) -> Result<Option<Vec<Instruction>>> {
        match instruction {
            Instruction::Assign { lhs, rhs } => {
                if let Value::NewArray { element, size } = rhs {
                    return Ok(self.rewrite_allocation(index, lhs, element, size));
                }

                let mut pre = Vec::new();
                let new_rhs = self.rewrite_rvalue(index, rhs, &mut pre)?;

                if let Value::ArrayElement { base, index: slot } = lhs {
                    if let Some(wrapper) = self.wrapper_of_local(*base) {
                        let value = match new_rhs.as_operand() {
                            Some(operand) => operand,
                            None => {
                                let tmp = self.body.new_local("$elem", wrapper.element.clone());
                                pre.push(Instruction::assign(Value::local(tmp), new_rhs));
                                Operand::Local(tmp)
                            }
                        };
                        pre.push(wrapper.set_call(*base, slot.clone(), value));
                        self.event(
                            EventKind::ElementAccessRewritten,
                            index,
                            format!("store through {}", wrapper.set),
                        );
                        return Ok(Some(pre));
                    }
                }

                if pre.is_empty() && new_rhs == *rhs {
                    return Ok(None);
                }
                pre.push(Instruction::assign(lhs.clone(), new_rhs));
                Ok(Some(pre))
            }
            Instruction::Invoke { expr } => {
                let mut pre = Vec::new();
                let rewritten = self.rewrite_call(index, expr, &mut pre)?;
                if pre.is_empty() && rewritten == *expr {
                    return Ok(None);
                }
                pre.push(Instruction::invoke(rewritten));
                Ok(Some(pre))
            }
            Instruction::Identity { .. } | Instruction::Return { .. } => Ok(None),
        }
    }

    fn rewrite_allocation(
        &self,
        index: usize,
        lhs: &Value,
        element: &Type,
        size: &Operand,
    ) -> Option<Vec<Instruction>> {
        if element.is_array() {
            self.event(
                EventKind::SkippedUnsupported,
                index,
                format!("multi-dimensional allocation of {element}[]"),
            );
            return None;
        }
        let Value::Local { local } = lhs else {
            return None;
        };
        let wrapper = self.wrapper_of_local(*local)?;
        if wrapper.element != *element {
            // Covariant store, adapted by the repair scan.
            return None;
        }
        self.event(
            EventKind::AllocationWrapped,
            index,
            format!("newarray ({element}) -> {}", wrapper.name),
        );
        Some(wrapper.alloc_into(*local, size.clone()).to_vec())
    }

    fn rewrite_rvalue(
        &mut self,
        index: usize,
        rhs: &Value,
        pre: &mut Vec<Instruction>,
    ) -> Result<Value> {
        match rhs {
            Value::ArrayElement { base, index: slot } => {
                if let Some(wrapper) = self.wrapper_of_local(*base) {
                    self.event(
                        EventKind::ElementAccessRewritten,
                        index,
                        format!("load through {}", wrapper.get),
                    );
                    return Ok(wrapper.get_value(*base, slot.clone()));
                }
                Ok(rhs.clone())
            }
            Value::Length { base } => {
                if let Some(wrapper) = self.wrapper_of_local(*base) {
                    let raw = self.body.new_local("$raw", wrapper.array_type());
                    pre.push(wrapper.unwrap_into(raw, *base));
                    self.event(
                        EventKind::AdaptationInserted,
                        index,
                        "lengthof reads the raw array".to_string(),
                    );
                    return Ok(Value::Length { base: raw });
                }
                Ok(rhs.clone())
            }
            Value::Invoke { expr } => Ok(Value::invoke(self.rewrite_call(index, expr, pre)?)),
            _ => Ok(rhs.clone()),
        }
    }

    /// Resolves the callee, first by the declared parameters, then by their wrapper mapping.
    fn resolve_callee(&self, method: &MethodRef) -> Result<Option<(String, Method)>> {
        if let Some(found) = self
            .program
            .resolve_method(&method.class, &method.name, &method.params)
        {
            return Ok(Some(found));
        }
        let mapped = method
            .params
            .iter()
            .map(|p| map_type(self.ctx, self.program, p))
            .collect::<Result<Vec<_>>>()?;
        if mapped == method.params {
            return Ok(None);
        }
        Ok(self
            .program
            .resolve_method(&method.class, &method.name, &mapped))
    }

    fn rewrite_call(
        &mut self,
        index: usize,
        expr: &InvokeExpr,
        pre: &mut Vec<Instruction>,
    ) -> Result<InvokeExpr> {
        let mut expr = expr.clone();
        if expr.method == self.ctx.config.trace.method_ref() {
            return Ok(expr);
        }

        let (params, ret, foreign) = match self.resolve_callee(&expr.method)? {
            Some((declaring, callee)) => {
                let foreign = !is_rewritable_class(&declaring, self.program, self.ctx);
                (callee.params, callee.ret, foreign)
            }
            None => (expr.method.params.clone(), expr.method.ret.clone(), true),
        };
        if params.len() != expr.args.len() {
            return Ok(expr);
        }
        if !foreign {
            expr.method.params.clone_from(&params);
            expr.method.ret = ret;
        }

        if let Some(receiver) = expr.receiver {
            if let Some(wrapper) = self.wrapper_of_local(receiver) {
                if expr.method.class != wrapper.name {
                    let raw = self.body.new_local("$raw", wrapper.array_type());
                    pre.push(wrapper.unwrap_into(raw, receiver));
                    expr.receiver = Some(raw);
                    self.event(
                        EventKind::ArgumentUnwrapped,
                        index,
                        format!("receiver of {}", expr.method),
                    );
                }
            }
        }

        for (position, param) in params.iter().enumerate() {
            let arg = expr.args[position].clone();
            let Some(arg_ty) = self.body.operand_type(&arg) else {
                continue;
            };
            let adaptation = match wrapper_of_type(self.ctx, &arg_ty) {
                // Code that was not rewritten only ever sees raw arrays.
                Some(wrapper) if foreign && param.is_reference() && !param.is_array() => {
                    Some(Adaptation::Unwrap(wrapper))
                }
                _ => plan(self.ctx, self.program, &arg_ty, param),
            };
            let Some(adaptation) = adaptation else {
                continue;
            };

            match adapt_operand(self.body, &adaptation, arg, pre) {
                Some(adapted) => {
                    expr.args[position] = adapted;
                    let kind = match adaptation {
                        Adaptation::Unwrap(_) => EventKind::ArgumentUnwrapped,
                        _ => EventKind::AdaptationInserted,
                    };
                    self.event(
                        kind,
                        index,
                        format!("argument {position} of {}", expr.method),
                    );
                }
                None => self.event(
                    EventKind::SkippedUnsupported,
                    index,
                    format!("argument {position} of {}: {arg_ty} -> {param}", expr.method),
                ),
            }
        }
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Class, Constant, MethodFlags, CONSTRUCTOR_NAME},
        rewrite::{RewriteConfig, GET_METHOD, SET_METHOD},
    };

    fn int_array() -> Type {
        Type::array_of(Type::Int)
    }

    /// `static int sum(int[] a) { int[] b = new int[3]; b[0] = a[1]; return lengthof a; }`
    fn program() -> Program {
        let program = Program::new();
        let mut class = Class::new("a.Util");

        let mut body = Body::new();
        let a = body.add_local("r0", int_array()).unwrap();
        let b = body.add_local("r1", int_array()).unwrap();
        let v = body.add_local("i0", Type::Int).unwrap();
        let n = body.add_local("i1", Type::Int).unwrap();
        body.push(Instruction::identity_param(a, 0, int_array()));
        body.push(Instruction::assign(
            Value::local(b),
            Value::NewArray {
                element: Type::Int,
                size: Operand::Const(Constant::Int(3)),
            },
        ));
        body.push(Instruction::assign(
            Value::local(v),
            Value::ArrayElement {
                base: a,
                index: Operand::Const(Constant::Int(1)),
            },
        ));
        body.push(Instruction::assign(
            Value::ArrayElement {
                base: b,
                index: Operand::Const(Constant::Int(0)),
            },
            Value::local(v),
        ));
        body.push(Instruction::assign(Value::local(n), Value::Length { base: a }));
        body.push(Instruction::return_value(Operand::Local(n)));

        class
            .add_method(
                Method::new("sum", vec![int_array()], Type::Int, MethodFlags::STATIC)
                    .with_body(body),
            )
            .unwrap();
        program.add_class(class).unwrap();
        program
    }

    fn run(program: &Program, ctx: &RewriteContext) -> Body {
        SignatureRewritePass.run_global(program, ctx).unwrap();
        let id = program.find_method_by_name("a.Util", "sum").unwrap();
        let mut body = program.take_body(&id).unwrap();
        ArrayPropagationPass
            .run_on_method(&id, &mut body, program, ctx)
            .unwrap();
        body
    }

    #[test]
    fn test_signature_rewritten() {
        let program = program();
        let ctx = RewriteContext::new(RewriteConfig::default());
        run(&program, &ctx);

        let id = program.find_method_by_name("a.Util", "sum").unwrap();
        let method = program.method(&id).unwrap();
        assert_eq!(
            method.params,
            vec![Type::class("heapscope.generated.intArray")]
        );
        assert_eq!(ctx.events.count_kind(EventKind::SignatureRewritten), 1);
    }

    #[test]
    fn test_body_uses_wrapper() {
        let program = program();
        let ctx = RewriteContext::new(RewriteConfig::default());
        let body = run(&program, &ctx);
        let wrapper = Type::class("heapscope.generated.intArray");

        assert_eq!(body.local_type(LocalId(0)), Some(&wrapper));
        assert_eq!(body.local_type(LocalId(1)), Some(&wrapper));

        let calls: Vec<_> = body
            .instructions()
            .iter()
            .filter_map(|i| match i {
                Instruction::Invoke { expr } => Some(expr.method.name.clone()),
                Instruction::Assign {
                    rhs: Value::Invoke { expr },
                    ..
                } => Some(expr.method.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec![CONSTRUCTOR_NAME, GET_METHOD, SET_METHOD]);
        assert!(!body
            .instructions()
            .iter()
            .any(|i| matches!(i, Instruction::Assign { rhs: Value::NewArray { .. }, .. })));
        assert_eq!(ctx.events.count_kind(EventKind::AllocationWrapped), 1);
        assert_eq!(ctx.events.count_kind(EventKind::ElementAccessRewritten), 2);
        assert_eq!(ctx.events.count_kind(EventKind::BindingRetyped), 1);
    }

    #[test]
    fn test_main_keeps_raw_signature() {
        let program = Program::new();
        let mut class = Class::new("a.App");
        let args_ty = Type::array_of(Type::string());
        let mut body = Body::new();
        let args = body.add_local("r0", args_ty.clone()).unwrap();
        body.push(Instruction::identity_param(args, 0, args_ty.clone()));
        body.push(Instruction::return_void());
        class
            .add_method(
                Method::new("main", vec![args_ty.clone()], Type::Void, MethodFlags::STATIC)
                    .with_body(body),
            )
            .unwrap();
        program.add_class(class).unwrap();

        let ctx = RewriteContext::new(RewriteConfig::default());
        SignatureRewritePass.run_global(&program, &ctx).unwrap();
        let id = program.find_method_by_name("a.App", "main").unwrap();
        assert_eq!(program.method(&id).unwrap().params, vec![args_ty.clone()]);

        let mut body = program.take_body(&id).unwrap();
        ArrayPropagationPass
            .run_on_method(&id, &mut body, &program, &ctx)
            .unwrap();
        // raw binding, then new + <init>(String[]) before the return
        assert_eq!(body.len(), 4);
        assert!(matches!(
            &body.instructions()[0],
            Instruction::Identity { source: IdentitySource::Parameter { ty, .. }, .. } if *ty == args_ty
        ));
    }

    #[test]
    fn test_library_argument_unwrapped() {
        let program = program();
        let mut lib = Class::library("lib.Arrays");
        lib.add_method(Method::new(
            "sort",
            vec![int_array()],
            Type::Void,
            MethodFlags::STATIC,
        ))
        .unwrap();
        program.add_class(lib).unwrap();

        let id = program.find_method_by_name("a.Util", "sum").unwrap();
        let mut body = program.take_body(&id).unwrap();
        let at = body.len() - 1;
        body.instructions_mut().insert(
            at,
            Instruction::invoke(InvokeExpr::new_static(
                MethodRef::new("lib.Arrays", "sort", vec![int_array()], Type::Void),
                vec![Operand::Local(LocalId(0))],
            )),
        );
        program.restore_body(&id, body).unwrap();

        let ctx = RewriteContext::new(RewriteConfig::default());
        let body = run(&program, &ctx);
        let sort = body
            .instructions()
            .iter()
            .find_map(|i| i.invoke_expr().filter(|e| e.method.name == "sort"))
            .unwrap();
        assert_eq!(sort.method.params, vec![int_array()]);
        let arg = sort.args[0].as_local().unwrap();
        assert_eq!(body.local_type(arg), Some(&int_array()));
        assert_eq!(ctx.events.count_kind(EventKind::ArgumentUnwrapped), 1);
    }
}
