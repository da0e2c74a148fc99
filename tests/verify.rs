//! Verifier behavior on hand-broken programs and on rewrite output.

mod common;

use common::*;
use heapscope::{prelude::*, verify};

#[test]
fn test_rewritten_program_verifies() -> Result<()> {
    let mut main = Code::new();
    let foo = main.new_object("a.Foo");
    main.call_virtual(foo, MethodRef::new("a.Foo", "touch", vec![], Type::Void));
    let array = main.new_int_array(2);
    main.store_element(array, 1, 3);
    let program = program_with_main(vec![foo_class()], main.ret(), Type::Void);

    rewrite_program(&program, RewriteConfig::full())?;
    let violations = verify_program(&program, Some(&RewriteConfig::full()));
    assert!(violations.is_empty(), "{violations:?}");
    Ok(())
}

#[test]
fn test_type_mismatch_is_reported() {
    // String s = 1;
    let mut main = Code::new();
    let s = main.local(Type::string());
    main.assign(Value::local(s), Value::constant(Constant::Int(1)));
    let program = program_with_main(vec![], main.ret(), Type::Void);

    let violations = verify_program(&program, None);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].method, "a.Main.main");
    assert_eq!(violations[0].location, Some(0));

    match verify::check(&program, None) {
        Err(Error::Verification { method, count, .. }) => {
            assert_eq!(method, "a.Main.main");
            assert_eq!(count, 1);
        }
        other => panic!("expected a verification error, got {other:?}"),
    }
}

#[test]
fn test_unresolved_members_are_reported() {
    let mut main = Code::new();
    let foo = main.new_object("a.Foo");
    let t = main.local(Type::Int);
    main.assign(
        Value::local(t),
        Value::instance_field(foo, FieldRef::instance("a.Foo", "missing", Type::Int)),
    );
    main.call_virtual(foo, MethodRef::new("a.Foo", "nothing", vec![], Type::Void));
    let program = program_with_main(vec![foo_class()], main.ret(), Type::Void);

    let violations = verify_program(&program, None);
    assert_eq!(violations.len(), 2, "{violations:?}");
    assert!(violations.iter().all(|v| v.method == "a.Main.main"));
}

#[test]
fn test_duplicate_members_are_reported() {
    let mut class = foo_class();
    // Bypass the duplicate check of `add_field` to model a corrupt input image.
    class
        .fields
        .push(Field::new("x", Type::Int, FieldFlags::empty()));
    let program = program_with_main(vec![class], Code::new().ret(), Type::Void);

    let violations = verify::verify_class(&program, "a.Foo");
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message.contains('x'));
}

#[test]
fn test_excluded_packages_are_not_checked() {
    let mut code = Code::new();
    let s = code.local(Type::string());
    code.assign(Value::local(s), Value::constant(Constant::Int(1)));
    let mut class = Class::new("android.app.Broken");
    class
        .add_method(static_method("run", vec![], Type::Void, code.ret()))
        .unwrap();
    let program = program_with_main(vec![class], Code::new().ret(), Type::Void);

    assert!(verify_program(&program, Some(&RewriteConfig::default())).is_empty());
    assert_eq!(verify_program(&program, None).len(), 1);
}
