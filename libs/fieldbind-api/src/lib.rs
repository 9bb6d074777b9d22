// Lets `#[derive(Bind)]` output (which names `fieldbind_api::...`) compile inside this crate.
extern crate self as fieldbind_api;

pub mod bindable;
pub mod capability;
pub mod error;
mod impls;
pub mod scalar;
pub mod tag;
pub mod value;

pub use bindable::{BindContext, Bindable, FieldDef, FieldKind, FieldType, Record, ScalarKind, Shape};
pub use capability::{CapabilityKind, CapabilityMut, Json, Settable, UnmarshalJson, UnmarshalText, UnmarshalValue};
pub use error::{BindError, BoxError, ConvertError, ErrorKind};
pub use fieldbind_derive::Bind;
pub use scalar::{ScalarSetter, ScalarTarget};
pub use value::{Map, Value};
