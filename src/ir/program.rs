//! The whole-program class table.
//!
//! [`Program`] is shared by reference between all rewrite passes, which run on many threads at
//! once. Classes live in a [`DashMap`], so lookups and insertions only lock one shard. Method
//! bodies are moved out with [`Program::take_body`] while a pass works on them and moved back
//! with [`Program::restore_body`], so no class lock is held during a transformation.
//!
//! None of the closures passed to [`Program::with_class`] or [`Program::with_class_mut`] may call
//! back into the same program: the shard lock is held for the duration of the closure.

use std::{
    collections::{HashSet, VecDeque},
    fmt,
};

use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};

use crate::{
    ir::{
        Body, CallKind, Class, ClassFlags, Field, FieldRef, Method, MethodRef, Type, OBJECT_CLASS,
    },
    Error, Result,
};

/// Names a method by its declaring class and position in the class's method list.
///
/// Method lists are append-only during a rewrite run, so ids stay valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId {
    /// Declaring class.
    pub class: String,
    /// Index into [`Class::methods`].
    pub index: usize,
}

impl MethodId {
    /// Creates a method id.
    #[must_use]
    pub fn new(class: impl Into<String>, index: usize) -> Self {
        Self {
            class: class.into(),
            index,
        }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.index)
    }
}

/// Serialized form of a [`Program`]: every class, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramImage {
    /// All classes, application and library.
    pub classes: Vec<Class>,
}

impl ProgramImage {
    fn canonical(mut classes: Vec<Class>) -> Self {
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        for class in classes
            .iter_mut()
            .filter(|c| c.flags.contains(ClassFlags::COUNTER))
        {
            class.fields.sort_by(|a, b| a.name.cmp(&b.name));
            class.methods.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Self { classes }
    }
}

/// The class table.
#[derive(Debug, Default)]
pub struct Program {
    classes: DashMap<String, Class>,
}

impl Program {
    /// Creates an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a program from a serialized image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateClass`] if the image names a class twice.
    pub fn from_image(image: ProgramImage) -> Result<Self> {
        let program = Self::new();
        for class in image.classes {
            program.add_class(class)?;
        }
        Ok(program)
    }

    /// Snapshot of every class, sorted by name.
    ///
    /// Members of the shared counter class are sorted by name as well: parallel passes append
    /// to it in whatever order their workers finish.
    #[must_use]
    pub fn to_image(&self) -> ProgramImage {
        ProgramImage::canonical(self.classes.iter().map(|c| c.value().clone()).collect())
    }

    /// Consumes the program into its serialized form, ordered as [`Program::to_image`].
    #[must_use]
    pub fn into_image(self) -> ProgramImage {
        ProgramImage::canonical(self.classes.into_iter().map(|(_, c)| c).collect())
    }

    /// Registers a class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateClass`] if a class with the same name is registered.
    pub fn add_class(&self, class: Class) -> Result<()> {
        match self.classes.entry(class.name.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateClass(class.name)),
            Entry::Vacant(slot) => {
                slot.insert(class);
                Ok(())
            }
        }
    }

    /// Registers the class produced by `init` unless one named `name` exists.
    ///
    /// Returns `true` if the class was created by this call.
    pub fn ensure_class(&self, name: &str, init: impl FnOnce() -> Class) -> bool {
        match self.classes.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(init());
                true
            }
        }
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if the program has no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Returns `true` if a class with this name is registered.
    #[must_use]
    pub fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Runs `f` on a shared view of a class.
    pub fn with_class<R>(&self, name: &str, f: impl FnOnce(&Class) -> R) -> Option<R> {
        self.classes.get(name).map(|c| f(c.value()))
    }

    /// Runs `f` on an exclusive view of a class.
    pub fn with_class_mut<R>(&self, name: &str, f: impl FnOnce(&mut Class) -> R) -> Option<R> {
        self.classes.get_mut(name).map(|mut c| f(c.value_mut()))
    }

    /// Clone of a class descriptor.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<Class> {
        self.with_class(name, Clone::clone)
    }

    /// All class names, sorted.
    #[must_use]
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    /// Names of all application classes, sorted.
    #[must_use]
    pub fn application_classes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .classes
            .iter()
            .filter(|c| c.is_application())
            .map(|c| c.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Returns `true` if `name` is a registered application class.
    #[must_use]
    pub fn is_application(&self, name: &str) -> bool {
        self.with_class(name, Class::is_application).unwrap_or(false)
    }

    /// Returns `true` if `name` is a registered interface.
    #[must_use]
    pub fn is_interface(&self, name: &str) -> bool {
        self.with_class(name, Class::is_interface).unwrap_or(false)
    }

    /// Dispatch kind for instance calls on receivers of class `name`.
    #[must_use]
    pub fn call_kind_for(&self, name: &str) -> CallKind {
        if self.is_interface(name) {
            CallKind::Interface
        } else {
            CallKind::Virtual
        }
    }

    /// Superclass of `name`, if both are known.
    #[must_use]
    pub fn superclass_of(&self, name: &str) -> Option<String> {
        self.with_class(name, |c| c.superclass.clone()).flatten()
    }

    /// Returns `true` if class `sub` is `sup` or inherits from it through superclasses or
    /// interfaces. Every class is a subtype of `java.lang.Object`.
    #[must_use]
    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == OBJECT_CLASS {
            return true;
        }
        let mut seen = HashSet::new();
        let mut pending = vec![sub.to_string()];
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let parents = self
                .with_class(&current, |c| {
                    let mut parents = c.interfaces.clone();
                    parents.extend(c.superclass.clone());
                    parents
                })
                .unwrap_or_default();
            if parents.iter().any(|p| p == sup) {
                return true;
            }
            pending.extend(parents);
        }
        false
    }

    /// Returns `true` if a value of type `from` may be stored where `to` is expected.
    ///
    /// Accepts identical types, `null` into any reference, upcasts along the class hierarchy,
    /// covariant reference arrays, and the JVM's implicit int widening of sub-word primitives.
    #[must_use]
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (Type::Null, to) => to.is_reference() && *to != Type::Null,
            (f, t) if f.is_int_like() && t.is_int_like() => true,
            (Type::Class(_) | Type::Array(_), Type::Class(t)) if t == OBJECT_CLASS => true,
            (Type::Array(_), Type::Class(t)) => {
                t == "java.lang.Cloneable" || t == "java.io.Serializable"
            }
            (Type::Class(f), Type::Class(t)) => self.is_subclass(f, t),
            (Type::Array(f), Type::Array(t)) => {
                f.is_reference() && t.is_reference() && self.is_assignable(f, t)
            }
            _ => false,
        }
    }

    /// Resolves a field by name on `class` or one of its superclasses.
    #[must_use]
    pub fn resolve_field(&self, class: &str, name: &str) -> Option<FieldRef> {
        let mut current = Some(class.to_string());
        let mut depth = 0;
        while let Some(name_of_class) = current {
            if let Some(found) = self
                .with_class(&name_of_class, |c| c.field(name).map(|f| f.reference(&c.name)))
                .flatten()
            {
                return Some(found);
            }
            depth += 1;
            if depth > 256 {
                return None;
            }
            current = self.superclass_of(&name_of_class);
        }
        None
    }

    /// Resolves a method by name and parameters on `class`, its superclasses, or any interface
    /// they implement.
    ///
    /// The superclass chain is searched first, so a concrete declaration wins over an
    /// interface declaration of the same signature. Returns the declaring class and a body-less
    /// copy of the method.
    #[must_use]
    pub fn resolve_method(&self, class: &str, name: &str, params: &[Type]) -> Option<(String, Method)> {
        let mut interfaces = VecDeque::new();
        let mut current = Some(class.to_string());
        let mut depth = 0;
        while let Some(name_of_class) = current {
            let visited = self.with_class(&name_of_class, |c| {
                (c.method(name, params).map(Method::signature), c.interfaces.clone())
            });
            match visited {
                Some((Some(found), _)) => return Some((name_of_class, found)),
                Some((None, implemented)) => interfaces.extend(implemented),
                None => {}
            }
            depth += 1;
            if depth > 256 {
                return None;
            }
            current = self.superclass_of(&name_of_class);
        }

        let mut seen = HashSet::new();
        while let Some(interface) = interfaces.pop_front() {
            if !seen.insert(interface.clone()) {
                continue;
            }
            let visited = self.with_class(&interface, |c| {
                (c.method(name, params).map(Method::signature), c.interfaces.clone())
            });
            match visited {
                Some((Some(found), _)) => return Some((interface, found)),
                Some((None, parents)) => interfaces.extend(parents),
                None => {}
            }
        }
        None
    }

    /// Finds the position of a method declared directly on `class`.
    #[must_use]
    pub fn find_method(&self, class: &str, name: &str, params: &[Type]) -> Option<MethodId> {
        self.with_class(class, |c| {
            c.methods
                .iter()
                .position(|m| m.matches(name, params))
                .map(|index| MethodId::new(class, index))
        })
        .flatten()
    }

    /// Finds the position of the first method called `name` declared directly on `class`.
    #[must_use]
    pub fn find_method_by_name(&self, class: &str, name: &str) -> Option<MethodId> {
        self.with_class(class, |c| {
            c.methods
                .iter()
                .position(|m| m.name == name)
                .map(|index| MethodId::new(class, index))
        })
        .flatten()
    }

    /// Ids of every method declared on `class`.
    #[must_use]
    pub fn methods_of(&self, class: &str) -> Vec<MethodId> {
        self.with_class(class, |c| {
            (0..c.methods.len())
                .map(|index| MethodId::new(class, index))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Ids of every method of every application class, in class-name order.
    #[must_use]
    pub fn application_methods(&self) -> Vec<MethodId> {
        self.application_classes()
            .iter()
            .flat_map(|class| self.methods_of(class))
            .collect()
    }

    /// Body-less copy of a method declaration.
    #[must_use]
    pub fn method(&self, id: &MethodId) -> Option<Method> {
        self.with_class(&id.class, |c| c.methods.get(id.index).map(Method::signature))
            .flatten()
    }

    /// Reference to a method by id.
    #[must_use]
    pub fn method_ref(&self, id: &MethodId) -> Option<MethodRef> {
        self.with_class(&id.class, |c| {
            c.methods.get(id.index).map(|m| m.reference(&c.name))
        })
        .flatten()
    }

    /// Moves a method body out of the program.
    pub fn take_body(&self, id: &MethodId) -> Option<Body> {
        self.with_class_mut(&id.class, |c| {
            c.methods.get_mut(id.index).and_then(|m| m.body.take())
        })
        .flatten()
    }

    /// Clone of a method body.
    #[must_use]
    pub fn body(&self, id: &MethodId) -> Option<Body> {
        self.with_class(&id.class, |c| {
            c.methods.get(id.index).and_then(|m| m.body.clone())
        })
        .flatten()
    }

    /// Moves a method body back into the program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the id does not name a method.
    pub fn restore_body(&self, id: &MethodId, body: Body) -> Result<()> {
        self.with_class_mut(&id.class, |c| {
            c.methods.get_mut(id.index).map(|m| m.body = Some(body))
        })
        .flatten()
        .ok_or_else(|| Error::UnknownMethod(id.to_string()))
    }

    /// Replaces the parameter and return types of a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the id does not name a method.
    pub fn set_signature(&self, id: &MethodId, params: Vec<Type>, ret: Type) -> Result<()> {
        self.with_class_mut(&id.class, |c| {
            c.methods.get_mut(id.index).map(|m| {
                m.params = params;
                m.ret = ret;
            })
        })
        .flatten()
        .ok_or_else(|| Error::UnknownMethod(id.to_string()))
    }

    /// Adds a field to a class, reusing an existing field of the same name and type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] if the class is not registered, or
    /// [`Error::Malformed`] on a type clash with an existing field.
    pub fn add_field(&self, class: &str, field: Field) -> Result<FieldRef> {
        self.with_class_mut(class, |c| c.add_field(field))
            .ok_or_else(|| Error::UnknownClass(class.to_string()))?
    }

    /// Adds a method to a class and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] if the class is not registered, or
    /// [`Error::Malformed`] if the signature is already taken.
    pub fn add_method(&self, class: &str, method: Method) -> Result<MethodId> {
        self.with_class_mut(class, |c| {
            c.add_method(method)
                .map(|_| MethodId::new(class, c.methods.len() - 1))
        })
        .ok_or_else(|| Error::UnknownClass(class.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ClassFlags, MethodFlags};

    fn hierarchy() -> Program {
        let program = Program::new();
        let mut iface = Class::library("a.Shape");
        iface.flags = ClassFlags::INTERFACE;
        program.add_class(iface).unwrap();

        let mut base = Class::new("a.Base");
        base.interfaces.push("a.Shape".into());
        base.add_method(Method::new("area", vec![], Type::Int, MethodFlags::empty()))
            .unwrap();
        program.add_class(base).unwrap();

        let mut derived = Class::new("a.Derived");
        derived.superclass = Some("a.Base".into());
        program.add_class(derived).unwrap();
        program
    }

    #[test]
    fn test_subclass_through_interfaces() {
        let program = hierarchy();
        assert!(program.is_subclass("a.Derived", "a.Base"));
        assert!(program.is_subclass("a.Derived", "a.Shape"));
        assert!(program.is_subclass("a.Derived", OBJECT_CLASS));
        assert!(!program.is_subclass("a.Base", "a.Derived"));
        assert_eq!(program.call_kind_for("a.Shape"), CallKind::Interface);
        assert_eq!(program.call_kind_for("a.Base"), CallKind::Virtual);
    }

    #[test]
    fn test_assignability() {
        let program = hierarchy();
        let derived = Type::class("a.Derived");
        let base = Type::class("a.Base");
        assert!(program.is_assignable(&derived, &base));
        assert!(!program.is_assignable(&base, &derived));
        assert!(program.is_assignable(&Type::Null, &Type::array_of(Type::Int)));
        assert!(program.is_assignable(&Type::array_of(Type::Int), &Type::object()));
        assert!(program.is_assignable(
            &Type::array_of(derived.clone()),
            &Type::array_of(base.clone())
        ));
        assert!(!program.is_assignable(&Type::array_of(Type::Int), &Type::array_of(Type::Long)));
        assert!(!program.is_assignable(&Type::array_of(Type::Int), &base));
    }

    #[test]
    fn test_resolve_method_walks_superclasses() {
        let program = hierarchy();
        let (declaring, method) = program.resolve_method("a.Derived", "area", &[]).unwrap();
        assert_eq!(declaring, "a.Base");
        assert_eq!(method.ret, Type::Int);
        assert!(program.resolve_method("a.Derived", "volume", &[]).is_none());
    }

    #[test]
    fn test_resolve_method_searches_interfaces() {
        let program = hierarchy();
        program
            .add_method(
                "a.Shape",
                Method::new("perimeter", vec![], Type::Int, MethodFlags::ABSTRACT),
            )
            .unwrap();

        let (declaring, _) = program
            .resolve_method("a.Derived", "perimeter", &[])
            .unwrap();
        assert_eq!(declaring, "a.Shape");

        // A concrete declaration on the class chain wins over the interface one.
        program
            .add_method("a.Shape", Method::new("area", vec![], Type::Int, MethodFlags::ABSTRACT))
            .unwrap();
        let (declaring, _) = program.resolve_method("a.Derived", "area", &[]).unwrap();
        assert_eq!(declaring, "a.Base");
    }

    #[test]
    fn test_take_and_restore_body() {
        let program = hierarchy();
        let id = program.find_method("a.Base", "area", &[]).unwrap();
        assert!(program.take_body(&id).is_none());
        program.restore_body(&id, Body::new()).unwrap();
        assert!(program.take_body(&id).is_some());
        assert!(program.take_body(&id).is_none());
    }

    #[test]
    fn test_image_round_trip() {
        let program = hierarchy();
        assert!(matches!(
            program.add_class(Class::new("a.Base")),
            Err(Error::DuplicateClass(_))
        ));
        let json = serde_json::to_string(&program.to_image()).unwrap();
        let image: ProgramImage = serde_json::from_str(&json).unwrap();
        let names: Vec<_> = image.classes.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["a.Base", "a.Derived", "a.Shape"]);
        let back = Program::from_image(image).unwrap();
        assert_eq!(back.len(), 3);
    }
}
