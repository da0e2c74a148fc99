//! Array wrapper factory.
//!
//! For each array element type `T` the factory synthesizes one application class that owns a
//! raw `T[]` and counts accesses to it. The class is named after the array type with dots
//! removed and `[]` spelled `Array` (`int[]` becomes `<package>.intArray`, `java.lang.String[]`
//! becomes `<package>.javalangStringArray`) and has:
//!
//! - `T[] array`, the wrapped storage
//! - the instance instrumentation from [`crate::rewrite::instrument`]
//! - `<init>(T[])`, adopting an existing array, and `<init>(int)`, allocating a new one; both
//!   assign the serial like any patched constructor
//! - `T get(int)`, which loads the element and calls `incReads`
//! - `void set(int, T)`, which stores the element and calls `incWrites`
//!
//! Wrappers are memoized per name in [`RewriteContext::wrappers`]: asking twice for the same
//! element type returns the same [`WrapperClass`]. Multi-dimensional arrays have no wrapper.

use crate::{
    ir::{
        Body, Class, ClassFlags, Field, FieldFlags, FieldRef, Instruction, InvokeExpr,
        LocalId, Method, MethodFlags, MethodRef, Operand, Program, Type, Value, CONSTRUCTOR_NAME,
        OBJECT_CLASS,
    },
    rewrite::{
        constructor::patch_constructor, instrument, Access, EventKind, ObjectProfile,
        RewriteConfig, RewriteContext,
    },
    Result,
};

/// Field holding the wrapped array.
pub const ARRAY_FIELD: &str = "array";
/// Counted element read.
pub const GET_METHOD: &str = "get";
/// Counted element write.
pub const SET_METHOD: &str = "set";

/// A synthesized array wrapper class.
#[derive(Debug, Clone, PartialEq)]
pub struct WrapperClass {
    /// Fully qualified class name.
    pub name: String,
    /// Element type of the wrapped array.
    pub element: Type,
    /// The `array` field.
    pub array_field: FieldRef,
    /// `<init>(T[])`
    pub from_array: MethodRef,
    /// `<init>(int)`
    pub with_length: MethodRef,
    /// `T get(int)`
    pub get: MethodRef,
    /// `void set(int, T)`
    pub set: MethodRef,
    /// Instance instrumentation of the wrapper class.
    pub profile: ObjectProfile,
}

impl WrapperClass {
    /// The wrapper as a class type.
    #[must_use]
    pub fn ty(&self) -> Type {
        Type::class(self.name.clone())
    }

    /// The wrapped raw array type.
    #[must_use]
    pub fn array_type(&self) -> Type {
        Type::array_of(self.element.clone())
    }

    /// `target = wrapper.array`
    #[must_use]
    pub fn unwrap_into(&self, target: LocalId, wrapper: LocalId) -> Instruction {
        Instruction::assign(
            Value::local(target),
            Value::instance_field(wrapper, self.array_field.clone()),
        )
    }

    /// `target = new W; specialinvoke target.<init>(T[])(raw)`
    #[must_use]
    pub fn wrap_into(&self, target: LocalId, raw: Operand) -> [Instruction; 2] {
        [
            Instruction::assign(
                Value::local(target),
                Value::NewObject {
                    class: self.name.clone(),
                },
            ),
            Instruction::invoke(InvokeExpr::new_special(
                target,
                self.from_array.clone(),
                vec![raw],
            )),
        ]
    }

    /// `target = new W; specialinvoke target.<init>(int)(size)`
    #[must_use]
    pub fn alloc_into(&self, target: LocalId, size: Operand) -> [Instruction; 2] {
        [
            Instruction::assign(
                Value::local(target),
                Value::NewObject {
                    class: self.name.clone(),
                },
            ),
            Instruction::invoke(InvokeExpr::new_special(
                target,
                self.with_length.clone(),
                vec![size],
            )),
        ]
    }

    /// `virtualinvoke wrapper.get(index)` as a value.
    #[must_use]
    pub fn get_value(&self, wrapper: LocalId, index: Operand) -> Value {
        Value::invoke(InvokeExpr::new_virtual(
            wrapper,
            self.get.clone(),
            vec![index],
        ))
    }

    /// `virtualinvoke wrapper.set(index, value)`
    #[must_use]
    pub fn set_call(&self, wrapper: LocalId, index: Operand, value: Operand) -> Instruction {
        Instruction::invoke(InvokeExpr::new_virtual(
            wrapper,
            self.set.clone(),
            vec![index, value],
        ))
    }
}

/// Name of the wrapper for arrays of `element`, or `None` if such arrays cannot be wrapped.
#[must_use]
pub fn wrapper_name(config: &RewriteConfig, element: &Type) -> Option<String> {
    if element.is_array() || matches!(element, Type::Void | Type::Null) {
        return None;
    }
    let simple = Type::array_of(element.clone())
        .to_string()
        .replace('.', "")
        .replace("[]", "Array");
    Some(config.qualify(&simple))
}

/// The wrapper for arrays of `element`, created on first request.
///
/// Returns `Ok(None)` for element types that cannot be wrapped (arrays, `void`, `null`).
///
/// # Errors
///
/// Returns an error if a synthesized member clashes with an existing member of the wrapper
/// class.
pub fn wrapper_for(
    ctx: &RewriteContext,
    program: &Program,
    element: &Type,
) -> Result<Option<WrapperClass>> {
    let Some(name) = wrapper_name(&ctx.config, element) else {
        return Ok(None);
    };
    if let Some(wrapper) = ctx.wrapper(&name) {
        return Ok(Some(wrapper));
    }

    match ctx.wrappers.entry(name.clone()) {
        dashmap::mapref::entry::Entry::Occupied(entry) => Ok(Some(entry.get().clone())),
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            let created = program.ensure_class(&name, || {
                let mut class = Class::new(name.clone());
                class.flags = ClassFlags::SYNTHETIC | ClassFlags::WRAPPER;
                class
            });
            let wrapper = build_wrapper(ctx, program, &name, element)?;
            slot.insert(wrapper.clone());
            if created {
                ctx.events
                    .record(EventKind::WrapperSynthesized)
                    .message(format!("{name} wraps {}", wrapper.array_type()));
                log::debug!("synthesized wrapper {name}");
            }
            Ok(Some(wrapper))
        }
    }
}

fn build_wrapper(
    ctx: &RewriteContext,
    program: &Program,
    name: &str,
    element: &Type,
) -> Result<WrapperClass> {
    let class_ty = Type::class(name);
    let array_ty = Type::array_of(element.clone());
    let array_field = program.add_field(
        name,
        Field::new(ARRAY_FIELD, array_ty.clone(), FieldFlags::SYNTHETIC),
    )?;
    let profile = instrument(ctx, program, name)?;

    let super_init = MethodRef::new(OBJECT_CLASS, CONSTRUCTOR_NAME, Vec::new(), Type::Void);

    // <init>(T[])
    let mut body = Body::new();
    let this = body.add_local("r0", class_ty.clone())?;
    let raw = body.add_local("r1", array_ty.clone())?;
    body.push(Instruction::identity_this(this, class_ty.clone()));
    body.push(Instruction::identity_param(raw, 0, array_ty.clone()));
    body.push(Instruction::invoke(InvokeExpr::new_special(
        this,
        super_init.clone(),
        Vec::new(),
    )));
    body.push(Instruction::assign(
        Value::instance_field(this, array_field.clone()),
        Value::local(raw),
    ));
    body.push(Instruction::return_void());
    let from_array = add_member(
        ctx,
        program,
        name,
        &profile,
        CONSTRUCTOR_NAME,
        vec![array_ty.clone()],
        Type::Void,
        body,
    )?;

    // <init>(int)
    let mut body = Body::new();
    let this = body.add_local("r0", class_ty.clone())?;
    let length = body.add_local("i0", Type::Int)?;
    let storage = body.add_local("$array", array_ty.clone())?;
    body.push(Instruction::identity_this(this, class_ty.clone()));
    body.push(Instruction::identity_param(length, 0, Type::Int));
    body.push(Instruction::invoke(InvokeExpr::new_special(
        this,
        super_init,
        Vec::new(),
    )));
    body.push(Instruction::assign(
        Value::local(storage),
        Value::NewArray {
            element: element.clone(),
            size: Operand::Local(length),
        },
    ));
    body.push(Instruction::assign(
        Value::instance_field(this, array_field.clone()),
        Value::local(storage),
    ));
    body.push(Instruction::return_void());
    let with_length = add_member(
        ctx,
        program,
        name,
        &profile,
        CONSTRUCTOR_NAME,
        vec![Type::Int],
        Type::Void,
        body,
    )?;

    // T get(int)
    let mut body = Body::new();
    let this = body.add_local("r0", class_ty.clone())?;
    let index = body.add_local("i0", Type::Int)?;
    let storage = body.add_local("$array", array_ty.clone())?;
    let value = body.add_local("$value", element.clone())?;
    body.push(Instruction::identity_this(this, class_ty.clone()));
    body.push(Instruction::identity_param(index, 0, Type::Int));
    body.push(Instruction::assign(
        Value::local(storage),
        Value::instance_field(this, array_field.clone()),
    ));
    body.push(Instruction::assign(
        Value::local(value),
        Value::ArrayElement {
            base: storage,
            index: Operand::Local(index),
        },
    ));
    body.push(profile.incrementor_call(this, Access::Read));
    body.push(Instruction::return_value(Operand::Local(value)));
    let get = add_member(
        ctx,
        program,
        name,
        &profile,
        GET_METHOD,
        vec![Type::Int],
        element.clone(),
        body,
    )?;

    // void set(int, T)
    let mut body = Body::new();
    let this = body.add_local("r0", class_ty.clone())?;
    let index = body.add_local("i0", Type::Int)?;
    let value = body.add_local("$value", element.clone())?;
    let storage = body.add_local("$array", array_ty)?;
    body.push(Instruction::identity_this(this, class_ty));
    body.push(Instruction::identity_param(index, 0, Type::Int));
    body.push(Instruction::identity_param(value, 1, element.clone()));
    body.push(Instruction::assign(
        Value::local(storage),
        Value::instance_field(this, array_field.clone()),
    ));
    body.push(Instruction::assign(
        Value::ArrayElement {
            base: storage,
            index: Operand::Local(index),
        },
        Value::local(value),
    ));
    body.push(profile.incrementor_call(this, Access::Write));
    body.push(Instruction::return_void());
    let set = add_member(
        ctx,
        program,
        name,
        &profile,
        SET_METHOD,
        vec![Type::Int, element.clone()],
        Type::Void,
        body,
    )?;

    Ok(WrapperClass {
        name: name.to_string(),
        element: element.clone(),
        array_field,
        from_array,
        with_length,
        get,
        set,
        profile,
    })
}

/// Adds a synthesized method unless one with the same signature already exists.
#[allow(clippy::too_many_arguments)]
fn add_member(
    ctx: &RewriteContext,
    program: &Program,
    class: &str,
    profile: &ObjectProfile,
    name: &str,
    params: Vec<Type>,
    ret: Type,
    mut body: Body,
) -> Result<MethodRef> {
    let method_ref = MethodRef::new(class, name, params.clone(), ret.clone());
    let exists = program
        .with_class(class, |c| c.method(name, &params).is_some())
        .unwrap_or(false);
    if exists {
        return Ok(method_ref);
    }

    if name == CONSTRUCTOR_NAME {
        if let Err(skip) = patch_constructor(&mut body, profile, &ctx.config.trace)? {
            log::debug!("{class}.{name}({params:?}): constructor left unchanged ({skip:?})");
        }
    }
    program.add_method(
        class,
        Method::new(name, params, ret, MethodFlags::SYNTHETIC).with_body(body),
    )?;
    ctx.mark_generated(&method_ref);
    Ok(method_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::PatchSkip;

    fn ctx() -> RewriteContext {
        RewriteContext::new(RewriteConfig::default().with_package("gen"))
    }

    #[test]
    fn test_wrapper_names() {
        let config = RewriteConfig::default().with_package("gen");
        assert_eq!(
            wrapper_name(&config, &Type::Int).as_deref(),
            Some("gen.intArray")
        );
        assert_eq!(
            wrapper_name(&config, &Type::string()).as_deref(),
            Some("gen.javalangStringArray")
        );
        assert_eq!(wrapper_name(&config, &Type::array_of(Type::Int)), None);
        assert_eq!(wrapper_name(&config, &Type::Void), None);
    }

    #[test]
    fn test_wrapper_members() {
        let program = Program::new();
        let ctx = ctx();
        let wrapper = wrapper_for(&ctx, &program, &Type::Int).unwrap().unwrap();

        assert_eq!(wrapper.name, "gen.intArray");
        assert_eq!(wrapper.array_field.ty, Type::array_of(Type::Int));
        assert_eq!(wrapper.get.ret, Type::Int);
        assert_eq!(wrapper.set.params, vec![Type::Int, Type::Int]);

        let class = program.class("gen.intArray").unwrap();
        assert!(class.is_synthetic());
        assert!(class.flags.contains(ClassFlags::WRAPPER));
        let fields: Vec<_> = class.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["array", "serial", "reads", "writes"]);
        // incReads, incWrites, two constructors, get, set
        assert_eq!(class.methods.len(), 6);

        let ctor = class
            .method(CONSTRUCTOR_NAME, &[Type::array_of(Type::Int)])
            .unwrap();
        let text = ctor.body.as_ref().unwrap().to_string();
        assert!(text.contains("serial"));
    }

    #[test]
    fn test_cache_hit() {
        let program = Program::new();
        let ctx = ctx();
        let first = wrapper_for(&ctx, &program, &Type::string()).unwrap().unwrap();
        let classes = program.len();
        let second = wrapper_for(&ctx, &program, &Type::string()).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(program.len(), classes);
        assert_eq!(ctx.events.count_kind(EventKind::WrapperSynthesized), 1);
    }

    #[test]
    fn test_multi_dimensional_rejected() {
        let program = Program::new();
        let ctx = ctx();
        let none = wrapper_for(&ctx, &program, &Type::array_of(Type::Int)).unwrap();
        assert!(none.is_none());
        assert!(program.is_empty());
    }

    #[test]
    fn test_both_constructors_assign_serial_once() {
        let program = Program::new();
        let ctx = ctx();
        let wrapper = wrapper_for(&ctx, &program, &Type::Int).unwrap().unwrap();
        let class = program.class(&wrapper.name).unwrap();

        for params in [vec![Type::array_of(Type::Int)], vec![Type::Int]] {
            let mut body = class
                .method(CONSTRUCTOR_NAME, &params)
                .and_then(|m| m.body.clone())
                .unwrap();
            let stores = body
                .instructions()
                .iter()
                .filter(|i| {
                    matches!(
                        i,
                        Instruction::Assign {
                            lhs: Value::InstanceField { field, .. },
                            ..
                        } if *field == wrapper.profile.serial
                    )
                })
                .count();
            assert_eq!(stores, 1, "{params:?}");

            let again = patch_constructor(&mut body, &wrapper.profile, &ctx.config.trace).unwrap();
            assert_eq!(again, Err(PatchSkip::AlreadyPatched));
        }
    }
}
