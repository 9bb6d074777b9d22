//! Construction capabilities a destination type can opt into.
//!
//! A type with a capability takes over its own conversion: the binder hands
//! it the raw value (or text, or JSON bytes) instead of converting on its
//! behalf.

use std::any::Any;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bindable::{BindContext, Bindable, FieldKind, FieldType};
use crate::error::{BindError, BoxError, ConvertError};
use crate::value::Value;

/// Build the value from any dynamic value.
pub trait UnmarshalValue {
    fn unmarshal_value(&mut self, value: &Value) -> Result<(), BoxError>;
}

/// Build the value from text. Only offered string or byte values.
pub trait UnmarshalText {
    fn unmarshal_text(&mut self, text: &[u8]) -> Result<(), BoxError>;
}

/// Build the value from JSON bytes.
pub trait UnmarshalJson {
    fn unmarshal_json(&mut self, json: &[u8]) -> Result<(), BoxError>;
}

/// Accept any value unconditionally.
pub trait Settable {
    fn set(&mut self, value: &Value);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Value,
    Text,
    Json,
    Set,
}

/// Borrowed capability of a destination.
pub enum CapabilityMut<'a> {
    Value(&'a mut dyn UnmarshalValue),
    Text(&'a mut dyn UnmarshalText),
    Json(&'a mut dyn UnmarshalJson),
    Set(&'a mut dyn Settable),
}

impl CapabilityMut<'_> {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            CapabilityMut::Value(_) => CapabilityKind::Value,
            CapabilityMut::Text(_) => CapabilityKind::Text,
            CapabilityMut::Json(_) => CapabilityKind::Json,
            CapabilityMut::Set(_) => CapabilityKind::Set,
        }
    }

    /// Delegate `value` to the capability.
    ///
    /// Returns `None` when the capability does not accept this kind of value
    /// (text capabilities only see strings and bytes), so the caller can fall
    /// through to the next conversion strategy.
    pub fn apply(self, value: &Value) -> Option<Result<(), BoxError>> {
        match self {
            CapabilityMut::Value(target) => Some(target.unmarshal_value(value)),
            CapabilityMut::Text(target) => {
                let text = value.text_bytes()?;
                Some(target.unmarshal_text(text))
            }
            CapabilityMut::Json(target) => {
                let json = json_bytes(value)?;
                Some(target.unmarshal_json(&json))
            }
            CapabilityMut::Set(target) => {
                target.set(value);
                Some(Ok(()))
            }
        }
    }
}

/// JSON text for a value: strings and bytes as-is when they are valid JSON,
/// otherwise quoted; maps and arrays encoded.
fn json_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(_) | Value::Bytes(_) => {
            let bytes = value.text_bytes()?;
            if serde_json::from_slice::<serde::de::IgnoredAny>(bytes).is_ok() {
                Some(bytes.to_vec())
            } else {
                serde_json::to_vec(&String::from_utf8_lossy(bytes)).ok()
            }
        }
        Value::Map(_) | Value::Array(_) => serde_json::to_vec(&value.to_json()).ok(),
        _ => None,
    }
}

/// Assign through a capability, failing when it declines the value.
pub fn assign_via(
    capability: Option<CapabilityMut<'_>>,
    value: &Value,
    type_name: &str,
) -> Result<(), BindError> {
    let declined = || {
        BindError::Convert(ConvertError::type_mismatch(format!(
            "cannot convert {} to {type_name}",
            value.kind_name()
        )))
    };
    match capability.and_then(|capability| capability.apply(value)) {
        Some(result) => result.map_err(|e| BindError::Convert(ConvertError::from(e))),
        None => Err(declined()),
    }
}

// ---------------------------------------------------------------------------
// Json<T>
// ---------------------------------------------------------------------------

/// Field wrapper decoding its content from JSON text (or a map/array value)
/// with serde.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> UnmarshalJson for Json<T> {
    fn unmarshal_json(&mut self, json: &[u8]) -> Result<(), BoxError> {
        self.0 = serde_json::from_slice(json)?;
        Ok(())
    }
}

impl<T> Bindable for Json<T>
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
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
        serde_json::to_value(&self.0).map(Value::from).unwrap_or_default()
    }

    fn set_zero(&mut self) {
        self.0 = T::default();
    }

    fn copy_from(&mut self, source: &dyn Any) -> bool {
        crate::bindable::copy_clone(self, source)
    }

    fn assign(&mut self, value: &Value, _cx: &dyn BindContext) -> Result<(), BindError> {
        assign_via(self.capability(), value, std::any::type_name::<T>())
    }

    fn capability(&mut self) -> Option<CapabilityMut<'_>> {
        Some(CapabilityMut::Json(self))
    }
}

impl<T> FieldType for Json<T>
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    fn kind() -> FieldKind {
        FieldKind::Other
    }

    fn capability_kind() -> Option<CapabilityKind> {
        Some(CapabilityKind::Json)
    }
}

/// Implement `Bindable` and `FieldType` for a leaf type, optionally through
/// one of its capabilities: `Value`, `Text`, `Json` or `Set`.
///
/// The type must implement `Clone`, `Default`, `Display` (its source view)
/// and the named capability trait. Without a capability the type can only be
/// filled by a custom converter.
///
/// ```ignore
/// impl UnmarshalText for Email { /* ... */ }
/// fieldbind_api::bindable_leaf!(Email, Text);
///
/// fieldbind_api::bindable_leaf!(Cents);
/// ```
#[macro_export]
macro_rules! bindable_leaf {
    (@impl $ty:ty; $($capability:ident)?) => {
        impl $crate::Bindable for $ty {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn inner_any_mut(&mut self) -> ::std::option::Option<&mut dyn ::std::any::Any> {
                ::std::option::Option::Some(self)
            }

            fn to_value(&self) -> $crate::Value {
                $crate::Value::String(::std::string::ToString::to_string(self))
            }

            fn set_zero(&mut self) {
                *self = <Self as ::std::default::Default>::default();
            }

            fn copy_from(&mut self, source: &dyn ::std::any::Any) -> bool {
                $crate::bindable::copy_clone(self, source)
            }

            fn assign(
                &mut self,
                value: &$crate::Value,
                _cx: &dyn $crate::BindContext,
            ) -> ::std::result::Result<(), $crate::BindError> {
                $crate::capability::assign_via(
                    $crate::Bindable::capability(self),
                    value,
                    ::std::any::type_name::<Self>(),
                )
            }

            $(
            fn capability(&mut self) -> ::std::option::Option<$crate::CapabilityMut<'_>> {
                ::std::option::Option::Some($crate::CapabilityMut::$capability(self))
            }
            )?
        }

        impl $crate::FieldType for $ty {
            fn kind() -> $crate::FieldKind {
                $crate::FieldKind::Other
            }

            $(
            fn capability_kind() -> ::std::option::Option<$crate::CapabilityKind> {
                ::std::option::Option::Some($crate::CapabilityKind::$capability)
            }
            )?
        }
    };
    ($ty:ty) => {
        $crate::bindable_leaf!(@impl $ty;);
    };
    ($ty:ty, $capability:ident) => {
        $crate::bindable_leaf!(@impl $ty; $capability);
    };
}
