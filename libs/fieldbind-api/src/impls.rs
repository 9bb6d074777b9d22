//! `Bindable` and `FieldType` for standard library and `chrono` types.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;

use crate::bindable::{BindContext, Bindable, FieldKind, FieldType, Record, ScalarKind, Shape, copy_clone};
use crate::capability::{CapabilityKind, CapabilityMut};
use crate::error::{BindError, ConvertError};
use crate::scalar::{self, ScalarSetter, ScalarTarget, set_option_scalar, set_scalar};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

macro_rules! scalar_bindable {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl Bindable for $ty {
            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }

            fn inner_any_mut(&mut self) -> Option<&mut dyn Any> {
                Some(self)
            }

            fn to_value(&self) -> Value {
                Value::from(self.clone())
            }

            fn set_zero(&mut self) {
                *self = <$ty>::default();
            }

            fn copy_from(&mut self, source: &dyn Any) -> bool {
                copy_clone(self, source)
            }

            fn assign(&mut self, value: &Value, _cx: &dyn BindContext) -> Result<(), BindError> {
                *self = <$ty as ScalarTarget>::from_value(value)?;
                Ok(())
            }
        }

        impl FieldType for $ty {
            fn kind() -> FieldKind {
                FieldKind::Scalar(ScalarKind::$kind)
            }

            fn scalar_setter() -> Option<ScalarSetter> {
                Some(set_scalar::<$ty> as ScalarSetter)
            }

            fn option_scalar_setter() -> Option<ScalarSetter> {
                Some(set_option_scalar::<$ty> as ScalarSetter)
            }
        }
    )*};
}

scalar_bindable! {
    i8 => Int, i16 => Int, i32 => Int, i64 => Int, isize => Int,
    u8 => UInt, u16 => UInt, u32 => UInt, u64 => UInt, usize => UInt,
    f32 => Float, f64 => Float,
    bool => Bool,
    String => String,
    DateTime<Utc> => DateTime,
    NaiveDateTime => NaiveDateTime,
}

// ---------------------------------------------------------------------------
// Dynamic values
// ---------------------------------------------------------------------------

impl Bindable for Value {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn inner_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn set_zero(&mut self) {
        *self = Value::Null;
    }

    fn copy_from(&mut self, source: &dyn Any) -> bool {
        copy_clone(self, source)
    }

    fn assign(&mut self, value: &Value, _cx: &dyn BindContext) -> Result<(), BindError> {
        self.clone_from(value);
        Ok(())
    }
}

impl FieldType for Value {
    fn kind() -> FieldKind {
        FieldKind::Dynamic
    }
}

impl Bindable for serde_json::Value {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn inner_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn to_value(&self) -> Value {
        Value::from(self.clone())
    }

    fn set_zero(&mut self) {
        *self = serde_json::Value::Null;
    }

    fn copy_from(&mut self, source: &dyn Any) -> bool {
        copy_clone(self, source)
    }

    fn assign(&mut self, value: &Value, _cx: &dyn BindContext) -> Result<(), BindError> {
        *self = value.to_json();
        Ok(())
    }
}

impl FieldType for serde_json::Value {
    fn kind() -> FieldKind {
        FieldKind::Dynamic
    }
}

// ---------------------------------------------------------------------------
// Option / Box
// ---------------------------------------------------------------------------

impl<T: FieldType> Bindable for Option<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn inner_any_mut(&mut self) -> Option<&mut dyn Any> {
        self.as_mut()?.inner_any_mut()
    }

    fn target_type(&self) -> TypeId {
        T::target_type_id()
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, Bindable::to_value)
    }

    fn set_zero(&mut self) {
        *self = None;
    }

    fn copy_from(&mut self, source: &dyn Any) -> bool {
        if let Some(src) = source.downcast_ref::<Option<T>>() {
            self.clone_from(src);
            return true;
        }
        if let Some(src) = source.downcast_ref::<T>() {
            *self = Some(src.clone());
            return true;
        }
        false
    }

    fn assign(&mut self, value: &Value, cx: &dyn BindContext) -> Result<(), BindError> {
        if value.is_null() {
            *self = None;
            return Ok(());
        }
        match self {
            Some(inner) => cx.bind_slot(value, inner),
            None => {
                // Only publish the new value once it converted cleanly.
                let mut fresh = T::default();
                cx.bind_slot(value, &mut fresh)?;
                *self = Some(fresh);
                Ok(())
            }
        }
    }

    fn capability(&mut self) -> Option<CapabilityMut<'_>> {
        self.as_mut()?.capability()
    }

    fn shape(&self) -> Option<Shape> {
        T::static_shape()
    }

    fn record(&self) -> Option<&dyn Record> {
        self.as_ref()?.record()
    }

    fn record_mut(&mut self) -> Option<&mut dyn Record> {
        self.as_mut()?.record_mut()
    }

    fn vivify(&mut self) -> bool {
        match self {
            Some(inner) => inner.vivify(),
            None => {
                self.insert(T::default()).vivify();
                true
            }
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn capability_kind() -> Option<CapabilityKind> {
        T::capability_kind()
    }

    fn scalar_setter() -> Option<ScalarSetter> {
        T::option_scalar_setter()
    }

    fn static_shape() -> Option<Shape> {
        T::static_shape()
    }

    fn target_type_id() -> TypeId {
        T::target_type_id()
    }
}

impl<T: FieldType> Bindable for Box<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn inner_any_mut(&mut self) -> Option<&mut dyn Any> {
        (**self).inner_any_mut()
    }

    fn target_type(&self) -> TypeId {
        T::target_type_id()
    }

    fn to_value(&self) -> Value {
        (**self).to_value()
    }

    fn set_zero(&mut self) {
        (**self).set_zero();
    }

    fn copy_from(&mut self, source: &dyn Any) -> bool {
        if let Some(src) = source.downcast_ref::<Box<T>>() {
            self.clone_from(src);
            return true;
        }
        (**self).copy_from(source)
    }

    fn assign(&mut self, value: &Value, cx: &dyn BindContext) -> Result<(), BindError> {
        (**self).assign(value, cx)
    }

    fn capability(&mut self) -> Option<CapabilityMut<'_>> {
        (**self).capability()
    }

    fn shape(&self) -> Option<Shape> {
        T::static_shape()
    }

    fn record(&self) -> Option<&dyn Record> {
        (**self).record()
    }

    fn record_mut(&mut self) -> Option<&mut dyn Record> {
        (**self).record_mut()
    }

    fn vivify(&mut self) -> bool {
        (**self).vivify()
    }
}

impl<T: FieldType> FieldType for Box<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn capability_kind() -> Option<CapabilityKind> {
        T::capability_kind()
    }

    fn static_shape() -> Option<Shape> {
        T::static_shape()
    }

    fn target_type_id() -> TypeId {
        T::target_type_id()
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

fn is_byte<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<u8>()
}

impl<T: FieldType> Bindable for Vec<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn inner_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn to_value(&self) -> Value {
        if let Some(bytes) = self.as_any().downcast_ref::<Vec<u8>>() {
            return Value::Bytes(bytes.clone());
        }
        Value::Array(self.iter().map(Bindable::to_value).collect())
    }

    fn set_zero(&mut self) {
        self.clear();
    }

    fn copy_from(&mut self, source: &dyn Any) -> bool {
        copy_clone(self, source)
    }

    /// Arrays bind element-wise, JSON array text is decoded first, an empty
    /// string clears, and any other single value becomes a one-element vector.
    fn assign(&mut self, value: &Value, cx: &dyn BindContext) -> Result<(), BindError> {
        if let Some(bytes) = self.as_any_mut().downcast_mut::<Vec<u8>>() {
            *bytes = scalar::to_bytes(value)?;
            return Ok(());
        }
        match value {
            Value::Null => self.clear(),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let mut elem = T::default();
                    cx.bind_slot(item, &mut elem)?;
                    out.push(elem);
                }
                *self = out;
            }
            Value::String(text) if text.trim().is_empty() => self.clear(),
            Value::String(text) if text.trim_start().starts_with('[') => match value.decode_json() {
                Some(decoded @ Value::Array(_)) => return self.assign(&decoded, cx),
                _ => return Err(ConvertError::parse(format!("invalid JSON array '{text}'")).into()),
            },
            single => {
                let mut elem = T::default();
                cx.bind_slot(single, &mut elem)?;
                *self = vec![elem];
            }
        }
        Ok(())
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    fn kind() -> FieldKind {
        if is_byte::<T>() {
            FieldKind::Scalar(ScalarKind::Bytes)
        } else {
            FieldKind::Sequence
        }
    }

    fn scalar_setter() -> Option<ScalarSetter> {
        is_byte::<T>().then_some(set_scalar::<Vec<u8>> as ScalarSetter)
    }

    fn option_scalar_setter() -> Option<ScalarSetter> {
        is_byte::<T>().then_some(set_option_scalar::<Vec<u8>> as ScalarSetter)
    }
}

// ---------------------------------------------------------------------------
// String-keyed maps
// ---------------------------------------------------------------------------

fn bind_entries<V: FieldType, M: FromIterator<(String, V)>>(
    value: &Value,
    cx: &dyn BindContext,
) -> Result<Option<M>, BindError> {
    let decoded;
    let entries = match value {
        Value::Null => return Ok(None),
        Value::Map(map) => map,
        Value::String(_) | Value::Bytes(_) => {
            decoded = value.decode_json();
            match &decoded {
                Some(Value::Map(map)) => map,
                _ => return Err(ConvertError::parse("expected a JSON object").into()),
            }
        }
        other => {
            return Err(ConvertError::type_mismatch(format!("cannot convert {} to a map", other.kind_name())).into());
        }
    };
    let mut out = Vec::with_capacity(entries.len());
    for (key, item) in entries {
        let mut elem = V::default();
        cx.bind_slot(item, &mut elem)?;
        out.push((key.clone(), elem));
    }
    Ok(Some(out.into_iter().collect()))
}

macro_rules! map_bindable {
    ($($map:ident => $sorted:literal),* $(,)?) => {$(
        impl<V: FieldType> Bindable for $map<String, V> {
            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }

            fn inner_any_mut(&mut self) -> Option<&mut dyn Any> {
                Some(self)
            }

            fn to_value(&self) -> Value {
                let mut entries: Vec<(&String, &V)> = self.iter().collect();
                if $sorted {
                    entries.sort_by(|a, b| a.0.cmp(b.0));
                }
                Value::Map(entries.into_iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
            }

            fn set_zero(&mut self) {
                self.clear();
            }

            fn copy_from(&mut self, source: &dyn Any) -> bool {
                copy_clone(self, source)
            }

            fn assign(&mut self, value: &Value, cx: &dyn BindContext) -> Result<(), BindError> {
                match bind_entries::<V, Self>(value, cx)? {
                    Some(map) => *self = map,
                    None => self.clear(),
                }
                Ok(())
            }
        }

        impl<V: FieldType> FieldType for $map<String, V> {
            fn kind() -> FieldKind {
                FieldKind::Mapping
            }
        }
    )*};
}

map_bindable! {
    HashMap => true,
    BTreeMap => false,
    IndexMap => false,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Binds slots with plain `assign`, enough for leaf element types.
    struct Direct;

    impl BindContext for Direct {
        fn bind_slot(&self, value: &Value, slot: &mut dyn Bindable) -> Result<(), BindError> {
            slot.assign(value, self)
        }

        fn bind_struct(&self, value: &Value, dest: &mut dyn Bindable) -> Result<(), BindError> {
            dest.assign(value, self)
        }
    }

    #[test]
    fn option_stays_none_on_failure() {
        let mut port: Option<u16> = None;
        assert!(port.assign(&Value::from("http"), &Direct).is_err());
        assert_eq!(port, None);
        port.assign(&Value::from("80"), &Direct).unwrap();
        assert_eq!(port, Some(80));
    }

    #[test]
    fn vec_accepts_single_values_and_json_text() {
        let mut ids: Vec<i32> = Vec::new();
        ids.assign(&Value::Int(5), &Direct).unwrap();
        assert_eq!(ids, [5]);
        ids.assign(&Value::from("[1, 2, 3]"), &Direct).unwrap();
        assert_eq!(ids, [1, 2, 3]);
        ids.assign(&Value::from(""), &Direct).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn byte_vectors_are_scalars() {
        assert_eq!(<Vec<u8>>::kind(), FieldKind::Scalar(ScalarKind::Bytes));
        assert_eq!(<Vec<u16>>::kind(), FieldKind::Sequence);
        let mut bytes: Vec<u8> = Vec::new();
        bytes.assign(&Value::from("hi"), &Direct).unwrap();
        assert_eq!(bytes, b"hi");
        assert_eq!(bytes.to_value(), Value::Bytes(b"hi".to_vec()));
    }

    #[test]
    fn hash_map_source_view_is_sorted() {
        let scores = HashMap::from([("b".to_string(), 2u8), ("a".to_string(), 1u8)]);
        let keys: Vec<String> = scores.to_value().as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn maps_decode_json_objects() {
        let mut limits: BTreeMap<String, u32> = BTreeMap::new();
        limits.assign(&Value::from(r#"{"cpu": 2, "mem": "512"}"#), &Direct).unwrap();
        assert_eq!(limits["mem"], 512);
        assert!(limits.assign(&Value::Int(3), &Direct).is_err());
    }

    #[test]
    fn wrappers_report_inner_target_type() {
        assert_eq!(<Option<Box<i64>>>::target_type_id(), TypeId::of::<i64>());
        let mut slot: Option<Box<i64>> = None;
        assert!(slot.vivify());
        assert_eq!(slot.as_deref(), Some(&0));
    }
}
