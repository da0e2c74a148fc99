//! Program fixtures shared by the integration tests.

#![allow(dead_code)]

use heapscope::prelude::*;

/// Body under construction with automatic local naming.
pub struct Code {
    pub body: Body,
    params: usize,
}

impl Code {
    pub fn new() -> Self {
        Self {
            body: Body::new(),
            params: 0,
        }
    }

    pub fn this(&mut self, class: &str) -> LocalId {
        let ty = Type::class(class);
        let local = self.body.new_local("r", ty.clone());
        self.body.push(Instruction::identity_this(local, ty));
        local
    }

    pub fn param(&mut self, ty: Type) -> LocalId {
        let local = self.body.new_local("p", ty.clone());
        self.body
            .push(Instruction::identity_param(local, self.params, ty));
        self.params += 1;
        local
    }

    pub fn local(&mut self, ty: Type) -> LocalId {
        self.body.new_local("l", ty)
    }

    pub fn assign(&mut self, lhs: Value, rhs: Value) {
        self.body.push(Instruction::assign(lhs, rhs));
    }

    pub fn new_object(&mut self, class: &str) -> LocalId {
        let local = self.local(Type::class(class));
        self.assign(
            Value::local(local),
            Value::NewObject {
                class: class.to_string(),
            },
        );
        self.body.push(Instruction::invoke(InvokeExpr::new_special(
            local,
            MethodRef::new(class, CONSTRUCTOR_NAME, vec![], Type::Void),
            vec![],
        )));
        local
    }

    pub fn new_int_array(&mut self, size: i32) -> LocalId {
        let local = self.local(Type::array_of(Type::Int));
        self.assign(
            Value::local(local),
            Value::NewArray {
                element: Type::Int,
                size: Operand::Const(Constant::Int(size)),
            },
        );
        local
    }

    pub fn store_element(&mut self, array: LocalId, index: i32, value: i32) {
        self.assign(
            Value::ArrayElement {
                base: array,
                index: Operand::Const(Constant::Int(index)),
            },
            Value::constant(Constant::Int(value)),
        );
    }

    pub fn load_element(&mut self, array: LocalId, index: i32) -> LocalId {
        let local = self.local(Type::Int);
        self.assign(
            Value::local(local),
            Value::ArrayElement {
                base: array,
                index: Operand::Const(Constant::Int(index)),
            },
        );
        local
    }

    pub fn add(&mut self, lhs: LocalId, rhs: LocalId) -> LocalId {
        let local = self.local(Type::Int);
        self.assign(
            Value::local(local),
            Value::Binary {
                op: BinOp::Add,
                lhs: Operand::Local(lhs),
                rhs: Operand::Local(rhs),
            },
        );
        local
    }

    pub fn call_static(&mut self, method: MethodRef, args: Vec<Operand>) {
        self.body
            .push(Instruction::invoke(InvokeExpr::new_static(method, args)));
    }

    pub fn call_virtual(&mut self, receiver: LocalId, method: MethodRef) {
        self.body.push(Instruction::invoke(InvokeExpr::new_virtual(
            receiver,
            method,
            vec![],
        )));
    }

    pub fn super_init(&mut self, this: LocalId) {
        self.body.push(Instruction::invoke(InvokeExpr::new_special(
            this,
            MethodRef::new("java.lang.Object", CONSTRUCTOR_NAME, vec![], Type::Void),
            vec![],
        )));
    }

    pub fn ret(mut self) -> Body {
        self.body.push(Instruction::return_void());
        self.body
    }

    pub fn ret_value(mut self, value: LocalId) -> Body {
        self.body.push(Instruction::return_value(Operand::Local(value)));
        self.body
    }
}

pub fn static_method(name: &str, params: Vec<Type>, ret: Type, body: Body) -> Method {
    Method::new(name, params, ret, MethodFlags::STATIC).with_body(body)
}

pub fn instance_method(name: &str, ret: Type, body: Body) -> Method {
    Method::new(name, vec![], ret, MethodFlags::empty()).with_body(body)
}

/// `<init>()` calling `java.lang.Object.<init>` and then `extra`.
pub fn constructor(class: &str, extra: impl FnOnce(&mut Code, LocalId)) -> Method {
    let mut code = Code::new();
    let this = code.this(class);
    code.super_init(this);
    extra(&mut code, this);
    Method::new(CONSTRUCTOR_NAME, vec![], Type::Void, MethodFlags::empty()).with_body(code.ret())
}

/// `package.Foo { int x; Foo() { this.x = 1; } void touch() { int t = this.x; } }`
pub fn foo_class() -> Class {
    let x = FieldRef::instance("a.Foo", "x", Type::Int);
    let mut class = Class::new("a.Foo");
    class
        .add_field(Field::new("x", Type::Int, FieldFlags::empty()))
        .unwrap();

    let init_x = x.clone();
    class
        .add_method(constructor("a.Foo", move |code, this| {
            code.assign(
                Value::instance_field(this, init_x),
                Value::constant(Constant::Int(1)),
            );
        }))
        .unwrap();

    let mut code = Code::new();
    let this = code.this("a.Foo");
    let t = code.local(Type::Int);
    code.assign(Value::local(t), Value::instance_field(this, x));
    class
        .add_method(instance_method("touch", Type::Void, code.ret()))
        .unwrap();
    class
}

/// Adds `a.Main.main()` with `body` to a program holding `classes`.
pub fn program_with_main(classes: Vec<Class>, main: Body, ret: Type) -> Program {
    let program = Program::new();
    for class in classes {
        program.add_class(class).unwrap();
    }
    let mut entry = Class::new("a.Main");
    entry
        .add_method(static_method("main", vec![], ret, main))
        .unwrap();
    program.add_class(entry).unwrap();
    program
}

pub fn run(program: &Program) -> (EmValue, Emulator<'_>) {
    let mut emulator = Emulator::new(program);
    let result = emulator.run_entry("a.Main.main").unwrap();
    (result, emulator)
}
