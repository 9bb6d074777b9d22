//! Binds dynamic key/value sources into typed structs.
//!
//! ```ignore
//! use fieldbind_api::{Bind, map};
//! use fieldbind_engine::Binder;
//!
//! #[derive(Bind, Clone, Default)]
//! pub struct User {
//!     #[tag(json = "user_name")]
//!     pub name: String,
//!     pub age: u8,
//! }
//!
//! let binder = Binder::default();
//! let mut user = User::default();
//! binder.bind(&map! { "user_name" => "ann", "AGE" => "31" }, &mut user)?;
//! ```

pub mod binder;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod flatten;
pub mod registry;

pub use binder::{BindOptions, Binder, BinderBuilder};
pub use cache::MetadataCache;
pub use config::BindConfig;
pub use descriptor::{FieldDescriptor, FieldSlot, StructMetadata};
pub use error::EngineError;
pub use fieldbind_api::BindError;
pub use registry::{ConverterRegistry, CustomConverter};
