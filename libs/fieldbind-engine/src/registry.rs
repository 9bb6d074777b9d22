use std::any::{Any, TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use fieldbind_api::{BindError, BoxError, Value};
use serde::de::DeserializeOwned;

type PairFn = dyn Fn(&dyn Any, &mut dyn Any) -> Result<(), BoxError> + Send + Sync;
type TargetFn = dyn Fn(&Value, &mut dyn Any) -> Result<(), BoxError> + Send + Sync;

enum ConvertFn {
    /// Exact source type → destination type.
    Pair(Arc<PairFn>),
    /// Any source value → destination type.
    Target(Arc<TargetFn>),
}

/// A registered custom conversion.
pub struct CustomConverter {
    from: &'static str,
    to: &'static str,
    func: ConvertFn,
}

impl CustomConverter {
    /// Run the conversion.
    ///
    /// `from` is the typed source (for pair converters), `value` its dynamic
    /// view (for target converters), `dest` the innermost destination value.
    pub fn convert(&self, from: &dyn Any, value: &Value, dest: &mut dyn Any) -> Result<(), BindError> {
        let result = match &self.func {
            ConvertFn::Pair(f) => f(from, dest),
            ConvertFn::Target(f) => f(value, dest),
        };
        result.map_err(|source| BindError::CustomConverter {
            from: self.from,
            to: self.to,
            source,
        })
    }
}

impl fmt::Debug for CustomConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomConverter")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// Custom converters, keyed by (source type, destination type).
///
/// Filled while building a `Binder` and read-only afterwards.
#[derive(Default)]
pub struct ConverterRegistry {
    pairs: HashMap<(TypeId, TypeId), CustomConverter>,
    targets: HashMap<TypeId, CustomConverter>,
    /// Every destination type with at least one converter.
    destinations: HashSet<TypeId>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter for the exact `S` → `D` pair.
    ///
    /// Replaces an earlier converter for the same pair.
    pub fn register<S, D, E, F>(&mut self, f: F)
    where
        S: Any,
        D: Any,
        E: Into<BoxError>,
        F: Fn(&S, &mut D) -> Result<(), E> + Send + Sync + 'static,
    {
        let func = move |from: &dyn Any, dest: &mut dyn Any| -> Result<(), BoxError> {
            let from = from
                .downcast_ref::<S>()
                .ok_or_else(|| format!("source is not {}", type_name::<S>()))?;
            let dest = dest
                .downcast_mut::<D>()
                .ok_or_else(|| format!("destination is not {}", type_name::<D>()))?;
            f(from, dest).map_err(Into::into)
        };
        let key = (TypeId::of::<S>(), TypeId::of::<D>());
        self.pairs.insert(
            key,
            CustomConverter {
                from: type_name::<S>(),
                to: type_name::<D>(),
                func: ConvertFn::Pair(Arc::new(func)),
            },
        );
        self.destinations.insert(key.1);
    }

    /// Register a converter producing `D` from any source value.
    ///
    /// Exact pair converters take precedence.
    pub fn register_target<D, E, F>(&mut self, f: F)
    where
        D: Any,
        E: Into<BoxError>,
        F: Fn(&Value, &mut D) -> Result<(), E> + Send + Sync + 'static,
    {
        let func = move |value: &Value, dest: &mut dyn Any| -> Result<(), BoxError> {
            let dest = dest
                .downcast_mut::<D>()
                .ok_or_else(|| format!("destination is not {}", type_name::<D>()))?;
            f(value, dest).map_err(Into::into)
        };
        self.targets.insert(
            TypeId::of::<D>(),
            CustomConverter {
                from: "any",
                to: type_name::<D>(),
                func: ConvertFn::Target(Arc::new(func)),
            },
        );
        self.destinations.insert(TypeId::of::<D>());
    }

    /// Decode `D` from JSON text, or from a map/array value, with serde.
    pub fn register_json<D: DeserializeOwned + Any>(&mut self) {
        self.register_target::<D, BoxError, _>(|value, dest| {
            *dest = match value.text_bytes() {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => serde_json::from_value(value.to_json())?,
            };
            Ok(())
        });
    }

    pub fn find(&self, from: TypeId, to: TypeId) -> Option<&CustomConverter> {
        self.pairs.get(&(from, to)).or_else(|| self.targets.get(&to))
    }

    /// Whether any converter produces `to`.
    pub fn is_destination(&self, to: TypeId) -> bool {
        self.destinations.contains(&to)
    }

    pub fn len(&self) -> usize {
        self.pairs.len() + self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("pairs", &self.pairs.len())
            .field("targets", &self.targets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Cents(i64);

    #[test]
    fn pair_wins_over_target() {
        let mut registry = ConverterRegistry::new();
        registry.register_target::<Cents, BoxError, _>(|_, dest| {
            dest.0 = -1;
            Ok(())
        });
        registry.register::<String, Cents, BoxError, _>(|from, dest| {
            dest.0 = from.parse::<i64>()? * 100;
            Ok(())
        });

        let source = "12".to_string();
        let mut dest = Cents::default();
        registry
            .find(TypeId::of::<String>(), TypeId::of::<Cents>())
            .unwrap()
            .convert(&source, &Value::from("12"), &mut dest)
            .unwrap();
        assert_eq!(dest, Cents(1200));

        registry
            .find(TypeId::of::<bool>(), TypeId::of::<Cents>())
            .unwrap()
            .convert(&true, &Value::Bool(true), &mut dest)
            .unwrap();
        assert_eq!(dest, Cents(-1));
        assert!(registry.is_destination(TypeId::of::<Cents>()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn failures_name_both_types() {
        let mut registry = ConverterRegistry::new();
        registry.register::<i64, Cents, BoxError, _>(|_, _| Err("negative".into()));
        let err = registry
            .find(TypeId::of::<i64>(), TypeId::of::<Cents>())
            .unwrap()
            .convert(&-5i64, &Value::Int(-5), &mut Cents::default())
            .unwrap_err();
        assert!(matches!(err, BindError::CustomConverter { from: "i64", .. }));
    }

    #[test]
    fn json_target_decodes_text_and_arrays() {
        let mut registry = ConverterRegistry::new();
        registry.register_json::<Vec<String>>();
        let converter = registry
            .find(TypeId::of::<String>(), TypeId::of::<Vec<String>>())
            .unwrap();

        let mut dest: Vec<String> = Vec::new();
        converter.convert(&(), &Value::from(r#"["a","b"]"#), &mut dest).unwrap();
        assert_eq!(dest, ["a", "b"]);

        converter
            .convert(&(), &Value::Array(vec!["c".into()]), &mut dest)
            .unwrap();
        assert_eq!(dest, ["c"]);
    }
}
