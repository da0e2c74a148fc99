//! Heap and static field storage.
//!
//! Objects keep their fields keyed by declaring class and name, so a subclass field never
//! shadows a superclass field of the same name. Fields and array slots that were never written
//! read as the zero value of their declared type.

use std::collections::HashMap;

use crate::{
    emulation::{EmValue, HeapRef},
    ir::{FieldRef, Type},
    Error, Result,
};

/// An object on the emulated heap.
#[derive(Clone, Debug, PartialEq)]
pub enum HeapObject {
    /// An instance of a class.
    Instance {
        /// Runtime class.
        class: String,
        /// Written fields by (declaring class, name).
        fields: HashMap<(String, String), EmValue>,
    },
    /// A single-dimensional array.
    Array {
        /// Element type.
        element: Type,
        /// Elements.
        values: Vec<EmValue>,
    },
}

impl HeapObject {
    /// Short description of the object kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HeapObject::Instance { .. } => "instance",
            HeapObject::Array { .. } => "array",
        }
    }
}

/// The emulated heap.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
    max_objects: usize,
}

impl Heap {
    /// Creates a heap holding at most `max_objects` objects (0 for unlimited).
    #[must_use]
    pub fn new(max_objects: usize) -> Self {
        Self {
            objects: Vec::new(),
            max_objects,
        }
    }

    /// Number of allocated objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if nothing was allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn alloc(&mut self, object: HeapObject) -> Result<HeapRef> {
        if self.max_objects > 0 && self.objects.len() >= self.max_objects {
            return Err(Error::LimitExceeded(format!(
                "heap object limit of {} reached",
                self.max_objects
            )));
        }
        self.objects.push(object);
        Ok(HeapRef(self.objects.len() - 1))
    }

    /// Allocates an instance of `class` with every field at its zero value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LimitExceeded`] when the object limit is reached.
    pub fn alloc_object(&mut self, class: &str) -> Result<HeapRef> {
        self.alloc(HeapObject::Instance {
            class: class.to_string(),
            fields: HashMap::new(),
        })
    }

    /// Allocates an array of `length` zero-valued elements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LimitExceeded`] when the object limit is reached.
    pub fn alloc_array(&mut self, element: &Type, length: usize) -> Result<HeapRef> {
        self.alloc(HeapObject::Array {
            element: element.clone(),
            values: vec![EmValue::default_for(element); length],
        })
    }

    /// The object behind a reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] for a dangling reference.
    pub fn get(&self, heap_ref: HeapRef) -> Result<&HeapObject> {
        self.objects
            .get(heap_ref.0)
            .ok_or_else(|| Error::Emulation(format!("dangling reference {heap_ref}")))
    }

    fn get_mut(&mut self, heap_ref: HeapRef) -> Result<&mut HeapObject> {
        self.objects
            .get_mut(heap_ref.0)
            .ok_or_else(|| Error::Emulation(format!("dangling reference {heap_ref}")))
    }

    /// Runtime class of an instance. Arrays report `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] for a dangling reference.
    pub fn class_of(&self, heap_ref: HeapRef) -> Result<Option<&str>> {
        Ok(match self.get(heap_ref)? {
            HeapObject::Instance { class, .. } => Some(class.as_str()),
            HeapObject::Array { .. } => None,
        })
    }

    /// Reads an instance field declared on `field.class`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] if the reference names an array.
    pub fn get_field(&self, heap_ref: HeapRef, field: &FieldRef) -> Result<EmValue> {
        match self.get(heap_ref)? {
            HeapObject::Instance { fields, .. } => Ok(fields
                .get(&(field.class.clone(), field.name.clone()))
                .cloned()
                .unwrap_or_else(|| EmValue::default_for(&field.ty))),
            HeapObject::Array { .. } => Err(Error::Emulation(format!(
                "field {field} read from an array"
            ))),
        }
    }

    /// Writes an instance field declared on `field.class`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] if the reference names an array.
    pub fn set_field(&mut self, heap_ref: HeapRef, field: &FieldRef, value: EmValue) -> Result<()> {
        match self.get_mut(heap_ref)? {
            HeapObject::Instance { fields, .. } => {
                fields.insert((field.class.clone(), field.name.clone()), value);
                Ok(())
            }
            HeapObject::Array { .. } => Err(Error::Emulation(format!(
                "field {field} written to an array"
            ))),
        }
    }

    fn array(&self, heap_ref: HeapRef) -> Result<&Vec<EmValue>> {
        match self.get(heap_ref)? {
            HeapObject::Array { values, .. } => Ok(values),
            HeapObject::Instance { class, .. } => Err(Error::Emulation(format!(
                "array operation on an instance of {class}"
            ))),
        }
    }

    fn slot(values_len: usize, index: i32) -> Result<usize> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < values_len)
            .ok_or_else(|| {
                Error::Emulation(format!(
                    "array index {index} out of bounds for length {values_len}"
                ))
            })
    }

    /// Reads an array element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] for out-of-bounds indices and non-arrays.
    pub fn get_element(&self, heap_ref: HeapRef, index: i32) -> Result<EmValue> {
        let values = self.array(heap_ref)?;
        let slot = Self::slot(values.len(), index)?;
        Ok(values[slot].clone())
    }

    /// Writes an array element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] for out-of-bounds indices and non-arrays.
    pub fn set_element(&mut self, heap_ref: HeapRef, index: i32, value: EmValue) -> Result<()> {
        match self.get_mut(heap_ref)? {
            HeapObject::Array { values, .. } => {
                let slot = Self::slot(values.len(), index)?;
                values[slot] = value;
                Ok(())
            }
            HeapObject::Instance { class, .. } => Err(Error::Emulation(format!(
                "array operation on an instance of {class}"
            ))),
        }
    }

    /// Length of an array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] for non-arrays.
    pub fn array_length(&self, heap_ref: HeapRef) -> Result<usize> {
        Ok(self.array(heap_ref)?.len())
    }

    /// Every instance of `class`, in allocation order.
    #[must_use]
    pub fn instances_of(&self, class: &str) -> Vec<HeapRef> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, o)| matches!(o, HeapObject::Instance { class: c, .. } if c == class))
            .map(|(i, _)| HeapRef(i))
            .collect()
    }
}

/// Storage for static fields, keyed by declaring class and name.
#[derive(Debug, Default)]
pub struct StaticStorage {
    fields: HashMap<(String, String), EmValue>,
}

impl StaticStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a static field, or its zero value if it was never written.
    #[must_use]
    pub fn get(&self, field: &FieldRef) -> EmValue {
        self.fields
            .get(&(field.class.clone(), field.name.clone()))
            .cloned()
            .unwrap_or_else(|| EmValue::default_for(&field.ty))
    }

    /// Writes a static field.
    pub fn set(&mut self, field: &FieldRef, value: EmValue) {
        self.fields
            .insert((field.class.clone(), field.name.clone()), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_default_and_store() {
        let mut heap = Heap::new(0);
        let obj = heap.alloc_object("a.Foo").unwrap();
        let x = FieldRef::instance("a.Foo", "x", Type::Int);
        assert_eq!(heap.get_field(obj, &x).unwrap(), EmValue::Int(0));
        heap.set_field(obj, &x, EmValue::Int(7)).unwrap();
        assert_eq!(heap.get_field(obj, &x).unwrap(), EmValue::Int(7));
        assert_eq!(heap.class_of(obj).unwrap(), Some("a.Foo"));
    }

    #[test]
    fn test_array_bounds() {
        let mut heap = Heap::new(0);
        let arr = heap.alloc_array(&Type::Int, 2).unwrap();
        heap.set_element(arr, 1, EmValue::Int(5)).unwrap();
        assert_eq!(heap.get_element(arr, 1).unwrap(), EmValue::Int(5));
        assert!(heap.get_element(arr, 2).is_err());
        assert!(heap.get_element(arr, -1).is_err());
        assert_eq!(heap.array_length(arr).unwrap(), 2);
    }

    #[test]
    fn test_object_limit() {
        let mut heap = Heap::new(1);
        heap.alloc_object("a.Foo").unwrap();
        assert!(matches!(
            heap.alloc_object("a.Foo"),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_statics() {
        let mut statics = StaticStorage::new();
        let counter = FieldRef::new_static("gen.StaticCounter", "aFooCounter", Type::Int);
        assert_eq!(statics.get(&counter), EmValue::Int(0));
        statics.set(&counter, EmValue::Int(2));
        assert_eq!(statics.get(&counter), EmValue::Int(2));
    }
}
