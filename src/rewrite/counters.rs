//! The shared counter class and its registry of per-name static counters.
//!
//! One synthetic class (`<package>.StaticCounter` by default) holds every static tally the
//! rewriter needs: the per-class "instances created" counters used for serial numbers, and
//! the per-type read/write counters of the type profiler. The registry memoizes the field
//! for each key so concurrent requests for the same key resolve to one field.

use std::fmt;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    ir::{
        BinOp, Body, Class, ClassFlags, Constant, Field, FieldFlags, FieldRef, Instruction,
        Method, MethodFlags, MethodRef, Operand, Program, Type, Value,
    },
    rewrite::{trace, EventKind, RewriteContext},
    Result,
};

/// Suffix of every counter field.
pub const COUNTER_SUFFIX: &str = "Counter";

/// What a static counter tallies.
///
/// Two owners may flatten to the same field name (`a.b.C` and `ab.C` both give `abC`), so the
/// registry keys fields by owner and only derives the field name from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterOwner<'a> {
    /// Instances created of a class, source of its serial numbers.
    Instances(&'a str),
    /// Reads of a type key.
    TypeReads(&'a str),
    /// Writes of a type key.
    TypeWrites(&'a str),
    /// Calls of a `Class_method`.
    Calls(&'a str),
}

impl fmt::Display for CounterOwner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterOwner::Instances(name) => write!(f, "instances of {name}"),
            CounterOwner::TypeReads(name) => write!(f, "reads of {name}"),
            CounterOwner::TypeWrites(name) => write!(f, "writes of {name}"),
            CounterOwner::Calls(name) => write!(f, "calls of {name}"),
        }
    }
}

/// Registry of static counter fields on the shared counter class.
#[derive(Debug)]
pub struct CounterRegistry {
    class_name: String,
    /// Counter field per owner.
    fields: DashMap<String, FieldRef>,
    /// Owner per claimed field name.
    names: DashMap<String, String>,
}

impl CounterRegistry {
    /// Creates a registry for the counter class `class_name`.
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: DashMap::new(),
            names: DashMap::new(),
        }
    }

    /// Fully qualified name of the counter class.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Registers the counter class in `program` if it is not there yet.
    ///
    /// Returns `true` if the class was created by this call.
    pub fn ensure_class(&self, program: &Program) -> bool {
        program.ensure_class(&self.class_name, || {
            let mut class = Class::new(self.class_name.clone());
            class.flags = ClassFlags::SYNTHETIC | ClassFlags::COUNTER;
            class
        })
    }

    /// The static `int` counter of `owner`, created on first request.
    ///
    /// The field is named `<key>Counter`. If another owner already holds that name, the first
    /// free `<key><n>Counter` (n = 2, 3, ...) is used instead. Use [`counter_key`] to recover
    /// the key actually chosen.
    ///
    /// # Errors
    ///
    /// Returns an error if the field clashes with an existing field of another type.
    pub fn counter_for(
        &self,
        program: &Program,
        owner: CounterOwner<'_>,
        key: &str,
    ) -> Result<FieldRef> {
        let owner = owner.to_string();
        if let Some(existing) = self.fields.get(&owner) {
            return Ok(existing.clone());
        }
        match self.fields.entry(owner) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(slot) => {
                let name = self.claim_name(slot.key(), key);
                self.ensure_class(program);
                let field_ref = program.add_field(
                    &self.class_name,
                    Field::new(name, Type::Int, FieldFlags::STATIC | FieldFlags::SYNTHETIC),
                )?;
                slot.insert(field_ref.clone());
                Ok(field_ref)
            }
        }
    }

    fn claim_name(&self, owner: &str, key: &str) -> String {
        let mut attempt = 1usize;
        loop {
            let name = if attempt == 1 {
                format!("{key}{COUNTER_SUFFIX}")
            } else {
                format!("{key}{attempt}{COUNTER_SUFFIX}")
            };
            match self.names.entry(name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(owner.to_string());
                    return name;
                }
                Entry::Occupied(entry) if entry.get() == owner => return name,
                Entry::Occupied(entry) => {
                    log::debug!("counter {name} taken by {}, renaming for {owner}", entry.get());
                    attempt += 1;
                }
            }
        }
    }

    /// Looks up a counter field by its full name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<FieldRef> {
        let owner = self.names.get(name)?.clone();
        self.fields.get(&owner).map(|f| f.clone())
    }

    /// Number of registered counters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no counters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns `true` if `class` is the counter class.
    #[must_use]
    pub fn is_counter_class(&self, class: &str) -> bool {
        class == self.class_name
    }
}

/// The key a counter field was created for: its name without [`COUNTER_SUFFIX`].
#[must_use]
pub fn counter_key(field: &FieldRef) -> &str {
    field
        .name
        .strip_suffix(COUNTER_SUFFIX)
        .unwrap_or(field.name.as_str())
}

/// Synthesizes `static void increment<suffix>()` on the counter class: it bumps `counter` and
/// emits `<label> counter = <n>`. Returns the existing method if it is already declared.
///
/// # Errors
///
/// Returns an error if the counter class cannot receive the method.
pub fn static_incrementor(
    ctx: &RewriteContext,
    program: &Program,
    suffix: &str,
    label: &str,
    counter: &FieldRef,
) -> Result<MethodRef> {
    let class = ctx.counters.class_name();
    let name = format!("increment{suffix}");
    let method_ref = MethodRef::new(class, name.clone(), Vec::new(), Type::Void);
    let exists = program
        .with_class(class, |c| c.method(&name, &[]).is_some())
        .unwrap_or(false);
    if exists {
        return Ok(method_ref);
    }

    let mut body = Body::new();
    let count = body.add_local("$count", Type::Int)?;
    body.push(Instruction::assign(
        Value::local(count),
        Value::static_field(counter.clone()),
    ));
    body.push(Instruction::assign(
        Value::local(count),
        Value::Binary {
            op: BinOp::Add,
            lhs: Operand::Local(count),
            rhs: Operand::Const(Constant::Int(1)),
        },
    ));
    body.push(Instruction::assign(
        Value::static_field(counter.clone()),
        Value::local(count),
    ));
    body.push(trace::emit(
        &ctx.config.trace,
        format!("{label} counter = "),
        Operand::Local(count),
    ));
    body.push(Instruction::return_void());

    program.add_method(
        class,
        Method::new(
            name,
            Vec::new(),
            Type::Void,
            MethodFlags::STATIC | MethodFlags::SYNTHETIC,
        )
        .with_body(body),
    )?;
    ctx.mark_generated(&method_ref);
    ctx.events
        .record(EventKind::IncrementorSynthesized)
        .message(method_ref.to_string());
    Ok(method_ref)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_reuse() {
        let program = Program::new();
        let registry = CounterRegistry::new("gen.StaticCounter");

        let owner = CounterOwner::Instances("com.example.Foo");
        let a = registry.counter_for(&program, owner, "comexampleFoo").unwrap();
        let b = registry.counter_for(&program, owner, "comexampleFoo").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "comexampleFooCounter");
        assert!(a.is_static);
        assert_eq!(registry.len(), 1);

        let fields = program
            .with_class("gen.StaticCounter", |c| c.fields.len())
            .unwrap();
        assert_eq!(fields, 1);
        assert!(program
            .with_class("gen.StaticCounter", Class::is_synthetic)
            .unwrap());
    }

    #[test]
    fn test_static_incrementor() {
        let program = Program::new();
        let ctx = RewriteContext::new(crate::rewrite::RewriteConfig::default().with_package("gen"));
        let field = ctx
            .counters
            .counter_for(&program, CounterOwner::TypeReads("int"), "intRead")
            .unwrap();
        let method =
            static_incrementor(&ctx, &program, "intRead", "int read", &field).unwrap();
        assert_eq!(method.name, "incrementintRead");
        assert_eq!(method.class, "gen.StaticCounter");

        let again = static_incrementor(&ctx, &program, "intRead", "int read", &field).unwrap();
        assert_eq!(method, again);
        let id = program
            .find_method("gen.StaticCounter", "incrementintRead", &[])
            .unwrap();
        let text = program.body(&id).unwrap().to_string();
        assert!(text.contains("\"int read counter = \""));
        assert!(ctx.is_generated("gen.StaticCounter.incrementintRead"));
    }

    #[test]
    fn test_existing_field_is_adopted() {
        let program = Program::new();
        let registry = CounterRegistry::new("gen.StaticCounter");
        registry.ensure_class(&program);
        program
            .add_field(
                "gen.StaticCounter",
                Field::new("xCounter", Type::Int, FieldFlags::STATIC),
            )
            .unwrap();
        let field = registry
            .counter_for(&program, CounterOwner::Instances("x"), "x")
            .unwrap();
        assert_eq!(field.name, "xCounter");
        assert_eq!(
            program
                .with_class("gen.StaticCounter", |c| c.fields.len())
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_clashing_owners_get_distinct_counters() {
        let program = Program::new();
        let registry = CounterRegistry::new("gen.StaticCounter");

        let nested = registry
            .counter_for(&program, CounterOwner::Instances("a.b.C"), "abC")
            .unwrap();
        let flat = registry
            .counter_for(&program, CounterOwner::Instances("ab.C"), "abC")
            .unwrap();
        assert_eq!(nested.name, "abCCounter");
        assert_eq!(flat.name, "abC2Counter");
        assert_eq!(counter_key(&flat), "abC2");

        // A class literally named `FooRead` next to the read counter of type `Foo`.
        let type_reads = registry
            .counter_for(&program, CounterOwner::TypeReads("Foo"), "FooRead")
            .unwrap();
        let instances = registry
            .counter_for(&program, CounterOwner::Instances("FooRead"), "FooRead")
            .unwrap();
        assert_ne!(type_reads.name, instances.name);

        assert_eq!(
            registry
                .counter_for(&program, CounterOwner::Instances("ab.C"), "abC")
                .unwrap(),
            flat
        );
        assert_eq!(registry.get("abC2Counter"), Some(flat));
        assert_eq!(registry.len(), 4);
        assert_eq!(
            program
                .with_class("gen.StaticCounter", |c| c.fields.len())
                .unwrap(),
            4
        );
    }
}
