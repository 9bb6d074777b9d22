use std::any::{Any, TypeId};
use std::fmt;

use crate::capability::{CapabilityKind, CapabilityMut};
use crate::error::BindError;
use crate::scalar::ScalarSetter;
use crate::tag;
use crate::value::Value;

/// Primitive family of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    UInt,
    Float,
    String,
    Bool,
    Bytes,
    DateTime,
    NaiveDateTime,
}

/// Coarse classification of a field type, resolved at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    /// A type with a field table (`#[derive(Bind)]`).
    Struct,
    Sequence,
    Mapping,
    /// Holds any value as-is (`Value`, `serde_json::Value`).
    Dynamic,
    /// Leaf type bound through a capability.
    Other,
}

/// Recursion point for nested values.
///
/// Collections and optional wrappers call back into the binder for each
/// element so that custom converters, capabilities and nested structs are
/// honoured at every depth.
pub trait BindContext {
    /// Bind `value` into a slot that has no field descriptor of its own.
    fn bind_slot(&self, value: &Value, slot: &mut dyn Bindable) -> Result<(), BindError>;

    /// Bind `value` into a struct by field matching.
    fn bind_struct(&self, value: &Value, dest: &mut dyn Bindable) -> Result<(), BindError>;
}

/// A value that can act as a binding source and destination.
///
/// Implemented for primitives, `chrono` times, `Option`, `Box`, sequences,
/// string-keyed maps, `Value` and every `#[derive(Bind)]` struct.
pub trait Bindable: Any + Send + Sync {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Innermost value behind `Option`/`Box` wrappers, `None` while unallocated.
    fn inner_any_mut(&mut self) -> Option<&mut dyn Any>;

    /// Type identity custom converters are keyed by: wrappers report their
    /// innermost type.
    fn target_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// Dynamic view used when this value is a binding source.
    fn to_value(&self) -> Value;

    /// Reset to the zero value (`None`, empty, `Default`).
    fn set_zero(&mut self);

    /// Clone `source` into `self` when it has the same concrete type.
    fn copy_from(&mut self, source: &dyn Any) -> bool;

    /// Generic dynamic conversion of `value` into `self`.
    fn assign(&mut self, value: &Value, cx: &dyn BindContext) -> Result<(), BindError>;

    fn capability(&mut self) -> Option<CapabilityMut<'_>> {
        None
    }

    /// Field table of the struct this value is, or points to.
    fn shape(&self) -> Option<Shape> {
        None
    }

    fn record(&self) -> Option<&dyn Record> {
        None
    }

    fn record_mut(&mut self) -> Option<&mut dyn Record> {
        None
    }

    /// Allocate missing `Option`/`Box` levels down to the innermost value.
    ///
    /// Returns `true` when anything was allocated; `set_zero` undoes it.
    fn vivify(&mut self) -> bool {
        false
    }
}

/// A struct with a field table. Fields are addressed by declaration index.
pub trait Record: Bindable {
    fn field(&self, index: usize) -> Option<&dyn Bindable>;

    fn field_mut(&mut self, index: usize) -> Option<&mut dyn Bindable>;
}

/// Static description of a field type.
pub trait FieldType: Bindable + Clone + Default {
    fn kind() -> FieldKind;

    fn capability_kind() -> Option<CapabilityKind> {
        None
    }

    /// Setter used when the field is exactly this type.
    fn scalar_setter() -> Option<ScalarSetter> {
        None
    }

    /// Setter used when the field is `Option` of this type.
    fn option_scalar_setter() -> Option<ScalarSetter> {
        None
    }

    fn static_shape() -> Option<Shape> {
        None
    }

    fn target_type_id() -> TypeId {
        TypeId::of::<Self>()
    }
}

/// Clone `source` into `dest` if it is a `T`.
pub fn copy_clone<T: Clone + 'static>(dest: &mut T, source: &dyn Any) -> bool {
    match source.downcast_ref::<T>() {
        Some(src) => {
            dest.clone_from(src);
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Field tables
// ---------------------------------------------------------------------------

/// Handle to a struct's field table.
///
/// Function pointers keep `Shape` `Copy` and let self-referential types
/// describe themselves without recursing at construction.
#[derive(Clone, Copy)]
pub struct Shape {
    pub type_name: &'static str,
    pub type_id: fn() -> TypeId,
    pub fields: fn() -> Vec<FieldDef>,
}

impl Shape {
    pub fn id(&self) -> TypeId {
        (self.type_id)()
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape").field("type_name", &self.type_name).finish()
    }
}

/// One declared (public, non-skipped) field of a struct.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    /// Position in the struct declaration.
    pub index: usize,
    pub tags: &'static [(&'static str, &'static str)],
    pub embedded: bool,
    pub type_name: &'static str,
    pub target_type: TypeId,
    pub kind: FieldKind,
    pub capability: Option<CapabilityKind>,
    pub scalar: Option<ScalarSetter>,
    pub shape: Option<Shape>,
}

impl FieldDef {
    pub fn of<T: FieldType>(
        name: &'static str,
        index: usize,
        tags: &'static [(&'static str, &'static str)],
        embedded: bool,
    ) -> Self {
        Self {
            name,
            index,
            tags,
            embedded,
            type_name: std::any::type_name::<T>(),
            target_type: T::target_type_id(),
            kind: T::kind(),
            capability: T::capability_kind(),
            scalar: T::scalar_setter(),
            shape: T::static_shape(),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&'static str> {
        tag::lookup(self.tags, key)
    }
}
