//! Shared builders and fixture programs for unit tests.


use crate::ir::{
    BinOp, Body, Class, ClassFlags, Constant, Field, FieldFlags, FieldRef, Instruction, InvokeExpr,
    LocalId, Method, MethodFlags, MethodRef, Operand, Program, Type, Value, CONSTRUCTOR_NAME,
    OBJECT_CLASS,
};

/// Builds a method body one instruction at a time.
pub struct BodyBuilder {
    body: Body,
    params: usize,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self {
            body: Body::new(),
            params: 0,
        }
    }

    /// Declares `r0` and binds `@this` to it.
    pub fn this(&mut self, class: &str) -> LocalId {
        let ty = Type::class(class);
        let local = self.body.add_local("r0", ty.clone()).unwrap();
        self.body.push(Instruction::identity_this(local, ty));
        local
    }

    /// Declares a local and binds the next parameter to it.
    pub fn param(&mut self, ty: Type) -> LocalId {
        let local = self.body.new_local("p", ty.clone());
        self.body
            .push(Instruction::identity_param(local, self.params, ty));
        self.params += 1;
        local
    }

    pub fn local(&mut self, name: &str, ty: Type) -> LocalId {
        self.body.add_local(name, ty).unwrap()
    }

    pub fn assign(&mut self, lhs: Value, rhs: Value) -> &mut Self {
        self.body.push(Instruction::assign(lhs, rhs));
        self
    }

    pub fn set_int(&mut self, local: LocalId, value: i32) -> &mut Self {
        self.assign(Value::local(local), Value::constant(Constant::Int(value)))
    }

    /// `local = local + delta`
    pub fn add_int(&mut self, local: LocalId, delta: i32) -> &mut Self {
        self.assign(
            Value::local(local),
            Value::Binary {
                op: BinOp::Add,
                lhs: Operand::Local(local),
                rhs: Operand::Const(Constant::Int(delta)),
            },
        )
    }

    pub fn new_object(&mut self, local: LocalId, class: &str, params: Vec<Type>, args: Vec<Operand>) -> &mut Self {
        self.assign(
            Value::local(local),
            Value::NewObject {
                class: class.to_string(),
            },
        );
        self.invoke(InvokeExpr::new_special(local, constructor(class, params), args))
    }

    pub fn new_array(&mut self, local: LocalId, element: Type, size: i32) -> &mut Self {
        self.assign(
            Value::local(local),
            Value::NewArray {
                element,
                size: Operand::Const(Constant::Int(size)),
            },
        )
    }

    pub fn invoke(&mut self, expr: InvokeExpr) -> &mut Self {
        self.body.push(Instruction::invoke(expr));
        self
    }

    /// `specialinvoke this.<java.lang.Object: void <init>()>()`
    pub fn super_init(&mut self, this: LocalId) -> &mut Self {
        self.invoke(InvokeExpr::new_special(this, constructor(OBJECT_CLASS, vec![]), vec![]))
    }

    pub fn ret(&mut self) -> &mut Self {
        self.body.push(Instruction::return_void());
        self
    }

    pub fn ret_value(&mut self, value: Operand) -> &mut Self {
        self.body.push(Instruction::return_value(value));
        self
    }

    pub fn build(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }
}

/// Builds one class.
pub struct ClassBuilder {
    class: Class,
}

impl ClassBuilder {
    pub fn extends(mut self, superclass: &str) -> Self {
        self.class.superclass = Some(superclass.to_string());
        self
    }

    pub fn interface(mut self) -> Self {
        self.class.flags |= ClassFlags::INTERFACE | ClassFlags::ABSTRACT;
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.class.interfaces.push(interface.to_string());
        self
    }

    pub fn field(mut self, name: &str, ty: Type) -> Self {
        self.class
            .add_field(Field::new(name, ty, FieldFlags::empty()))
            .unwrap();
        self
    }

    pub fn static_field(mut self, name: &str, ty: Type) -> Self {
        self.class
            .add_field(Field::new(name, ty, FieldFlags::STATIC))
            .unwrap();
        self
    }

    pub fn method(mut self, name: &str, params: Vec<Type>, ret: Type, body: Body) -> Self {
        self.class
            .add_method(Method::new(name, params, ret, MethodFlags::empty()).with_body(body))
            .unwrap();
        self
    }

    pub fn static_method(mut self, name: &str, params: Vec<Type>, ret: Type, body: Body) -> Self {
        self.class
            .add_method(Method::new(name, params, ret, MethodFlags::STATIC).with_body(body))
            .unwrap();
        self
    }

    pub fn abstract_method(mut self, name: &str, params: Vec<Type>, ret: Type) -> Self {
        self.class
            .add_method(Method::new(name, params, ret, MethodFlags::ABSTRACT))
            .unwrap();
        self
    }

    /// Adds `<init>(params)` with `body`.
    pub fn constructor(self, params: Vec<Type>, body: Body) -> Self {
        self.method(CONSTRUCTOR_NAME, params, Type::Void, body)
    }

    /// Adds `<init>()` that only calls `java.lang.Object.<init>`.
    pub fn default_constructor(self) -> Self {
        let name = self.class.name.clone();
        let mut b = BodyBuilder::new();
        let this = b.this(&name);
        b.super_init(this).ret();
        self.constructor(vec![], b.build())
    }

    pub fn build(self) -> Class {
        self.class
    }
}

/// Builds a [`Program`] from classes.
#[derive(Default)]
pub struct ProgramBuilder {
    classes: Vec<Class>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, name: &str, f: impl FnOnce(ClassBuilder) -> ClassBuilder) -> Self {
        let builder = ClassBuilder {
            class: Class::new(name),
        };
        self.classes.push(f(builder).build());
        self
    }

    pub fn library(mut self, name: &str, f: impl FnOnce(ClassBuilder) -> ClassBuilder) -> Self {
        let builder = ClassBuilder {
            class: Class::library(name),
        };
        self.classes.push(f(builder).build());
        self
    }

    pub fn build(self) -> Program {
        let program = Program::new();
        for class in self.classes {
            program.add_class(class).unwrap();
        }
        program
    }
}

pub fn constructor(class: &str, params: Vec<Type>) -> MethodRef {
    MethodRef::new(class, CONSTRUCTOR_NAME, params, Type::Void)
}

pub fn field(class: &str, name: &str, ty: Type) -> FieldRef {
    FieldRef::instance(class, name, ty)
}

/// `a.Foo { int x; Foo() { x = 1 } }` plus `a.Main.main()` allocating one `Foo`.
pub fn foo_program() -> Program {
    ProgramBuilder::new()
        .class("a.Foo", |c| {
            let mut b = BodyBuilder::new();
            let this = b.this("a.Foo");
            b.super_init(this)
                .assign(
                    Value::instance_field(this, field("a.Foo", "x", Type::Int)),
                    Value::constant(Constant::Int(1)),
                )
                .ret();
            c.field("x", Type::Int).constructor(vec![], b.build())
        })
        .class("a.Main", |c| {
            let mut b = BodyBuilder::new();
            let foo = b.local("r1", Type::class("a.Foo"));
            b.new_object(foo, "a.Foo", vec![], vec![]).ret();
            c.static_method("main", vec![], Type::Void, b.build())
        })
        .build()
}

/// `a.Buf` holding an `int[]`, filled and summed by `a.Main.main()`.
pub fn array_program() -> Program {
    let data = field("a.Buf", "data", Type::array_of(Type::Int));
    ProgramBuilder::new()
        .class("a.Buf", |c| {
            let mut b = BodyBuilder::new();
            let this = b.this("a.Buf");
            let arr = b.local("r1", Type::array_of(Type::Int));
            b.super_init(this)
                .new_array(arr, Type::Int, 4)
                .assign(Value::instance_field(this, data.clone()), Value::local(arr))
                .ret();
            let init = b.build();

            // int sum() { int[] a = this.data; return a[0] + a[1]; }
            let mut b = BodyBuilder::new();
            let this = b.this("a.Buf");
            let arr = b.local("r1", Type::array_of(Type::Int));
            let x = b.local("i0", Type::Int);
            let y = b.local("i1", Type::Int);
            b.assign(Value::local(arr), Value::instance_field(this, data.clone()))
                .assign(
                    Value::local(x),
                    Value::ArrayElement {
                        base: arr,
                        index: Operand::Const(Constant::Int(0)),
                    },
                )
                .assign(
                    Value::local(y),
                    Value::ArrayElement {
                        base: arr,
                        index: Operand::Const(Constant::Int(1)),
                    },
                )
                .assign(
                    Value::local(x),
                    Value::Binary {
                        op: BinOp::Add,
                        lhs: Operand::Local(x),
                        rhs: Operand::Local(y),
                    },
                )
                .ret_value(Operand::Local(x));
            let sum = b.build();

            // void fill() { int[] a = this.data; a[0] = 2; a[1] = 3; }
            let mut b = BodyBuilder::new();
            let this = b.this("a.Buf");
            let arr = b.local("r1", Type::array_of(Type::Int));
            b.assign(Value::local(arr), Value::instance_field(this, data.clone()))
                .assign(
                    Value::ArrayElement {
                        base: arr,
                        index: Operand::Const(Constant::Int(0)),
                    },
                    Value::constant(Constant::Int(2)),
                )
                .assign(
                    Value::ArrayElement {
                        base: arr,
                        index: Operand::Const(Constant::Int(1)),
                    },
                    Value::constant(Constant::Int(3)),
                )
                .ret();
            let fill = b.build();

            c.field("data", Type::array_of(Type::Int))
                .constructor(vec![], init)
                .method("sum", vec![], Type::Int, sum)
                .method("fill", vec![], Type::Void, fill)
        })
        .class("a.Main", |c| {
            let mut b = BodyBuilder::new();
            let buf = b.local("r1", Type::class("a.Buf"));
            let total = b.local("i0", Type::Int);
            b.new_object(buf, "a.Buf", vec![], vec![])
                .invoke(InvokeExpr::new_virtual(
                    buf,
                    MethodRef::new("a.Buf", "fill", vec![], Type::Void),
                    vec![],
                ))
                .assign(
                    Value::local(total),
                    Value::invoke(InvokeExpr::new_virtual(
                        buf,
                        MethodRef::new("a.Buf", "sum", vec![], Type::Int),
                        vec![],
                    )),
                )
                .ret_value(Operand::Local(total));
            c.static_method("main", vec![], Type::Int, b.build())
        })
        .build()
}

/// Element types allocated by [`mixed_arrays_program`].
pub fn mixed_element_types() -> Vec<Type> {
    vec![
        Type::Int,
        Type::Long,
        Type::Double,
        Type::Boolean,
        Type::string(),
        Type::class("a.Item"),
    ]
}

/// Three classes with one static method per element type of [`mixed_element_types`], each
/// allocating and filling an array of that type.
pub fn mixed_arrays_program() -> Program {
    let mut builder = ProgramBuilder::new().class("a.Item", ClassBuilder::default_constructor);
    for owner in ["a.First", "a.Second", "a.Third"] {
        builder = builder.class(owner, |mut c| {
            for (i, element) in mixed_element_types().into_iter().enumerate() {
                let mut b = BodyBuilder::new();
                let arr = b.local("r0", Type::array_of(element.clone()));
                let len = b.local("i0", Type::Int);
                b.new_array(arr, element, 2)
                    .assign(Value::local(len), Value::Length { base: arr })
                    .ret_value(Operand::Local(len));
                c = c.static_method(&format!("make{i}"), vec![], Type::Int, b.build());
            }
            c
        });
    }
    builder.build()
}
