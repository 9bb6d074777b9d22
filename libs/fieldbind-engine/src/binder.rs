use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use fieldbind_api::tag;
use fieldbind_api::{BindContext, BindError, Bindable, BoxError, ConvertError, FieldKind, Map, Record, Shape, Value};
use serde::de::DeserializeOwned;

use crate::cache::MetadataCache;
use crate::config::BindConfig;
use crate::descriptor::{FieldDescriptor, FieldSlot, StructMetadata};
use crate::flatten::StructFlattener;
use crate::registry::{ConverterRegistry, CustomConverter};

/// Per-call binding options.
#[derive(Debug, Clone, Default)]
pub struct BindOptions {
    overrides: BTreeMap<String, String>,
    tags: Vec<String>,
}

impl BindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind source key `key` to the field declared as `field`, ahead of any
    /// tag or name matching. Applies to the outermost struct only.
    pub fn with_override(mut self, key: impl Into<String>, field: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), field.into());
        self
    }

    /// Tags consulted before the configured ones. Accepts `"orm,json"`.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in tags {
            self.tags.extend(tag::split_tags(raw.as_ref()));
        }
        self
    }
}

/// Binds dynamic sources into `#[derive(Bind)]` structs.
///
/// Owns its metadata cache and converter registry; share one binder (behind
/// an `Arc` or a `static`) between threads so tables are built once.
#[derive(Debug)]
pub struct Binder {
    config: BindConfig,
    cache: MetadataCache,
    converters: ConverterRegistry,
}

impl Default for Binder {
    fn default() -> Self {
        Self::new(BindConfig::default())
    }
}

impl Binder {
    pub fn new(config: BindConfig) -> Self {
        Self {
            config,
            cache: MetadataCache::new(),
            converters: ConverterRegistry::new(),
        }
    }

    pub fn builder() -> BinderBuilder {
        BinderBuilder::default()
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Bind with default options.
    pub fn bind(&self, source: &dyn Bindable, dest: &mut dyn Bindable) -> Result<(), BindError> {
        self.convert(source, dest, &BindOptions::default())
    }

    /// Bind `source` into `dest`.
    ///
    /// `dest` is a struct, or an `Option`/`Box` chain ending in one. On
    /// failure, any part of that chain this call allocated is reset to `None`.
    pub fn convert(
        &self,
        source: &dyn Bindable,
        dest: &mut dyn Bindable,
        options: &BindOptions,
    ) -> Result<(), BindError> {
        let tags = self.config.effective_tags(&options.tags);
        let call = Call {
            binder: self,
            tags: &tags,
            overrides: Some(&options.overrides),
        };
        call.convert(source, dest)
    }

    /// Descriptor table of `shape` under the effective tag list `tags`.
    pub fn metadata(&self, shape: Shape, tags: &[String]) -> Arc<StructMetadata> {
        self.cache.get_or_build(shape, tags, || {
            StructFlattener::new(tags, &self.converters).flatten(shape)
        })
    }
}

/// Collects configuration and custom converters for a [`Binder`].
#[derive(Debug, Default)]
pub struct BinderBuilder {
    config: BindConfig,
    converters: ConverterRegistry,
}

impl BinderBuilder {
    pub fn config(mut self, config: BindConfig) -> Self {
        self.config = config;
        self
    }

    /// See [`ConverterRegistry::register`].
    pub fn converter<S, D, E, F>(mut self, f: F) -> Self
    where
        S: Any,
        D: Any,
        E: Into<BoxError>,
        F: Fn(&S, &mut D) -> Result<(), E> + Send + Sync + 'static,
    {
        self.converters.register(f);
        self
    }

    /// See [`ConverterRegistry::register_target`].
    pub fn target_converter<D, E, F>(mut self, f: F) -> Self
    where
        D: Any,
        E: Into<BoxError>,
        F: Fn(&Value, &mut D) -> Result<(), E> + Send + Sync + 'static,
    {
        self.converters.register_target(f);
        self
    }

    /// See [`ConverterRegistry::register_json`].
    pub fn json_target<D: DeserializeOwned + Any>(mut self) -> Self {
        self.converters.register_json::<D>();
        self
    }

    pub fn build(self) -> Binder {
        tracing::debug!(
            name = %self.config.name,
            converters = self.converters.len(),
            "binder ready"
        );
        Binder {
            config: self.config,
            cache: MetadataCache::new(),
            converters: self.converters,
        }
    }
}

// ---------------------------------------------------------------------------
// One binding call
// ---------------------------------------------------------------------------

/// Call-local state. Never shared between calls.
#[derive(Clone, Copy)]
struct Call<'a> {
    binder: &'a Binder,
    tags: &'a [String],
    /// Only the outermost struct of a call honours overrides.
    overrides: Option<&'a BTreeMap<String, String>>,
}

impl Call<'_> {
    fn nested(&self) -> Self {
        Self { overrides: None, ..*self }
    }

    fn convert(&self, source: &dyn Bindable, dest: &mut dyn Bindable) -> Result<(), BindError> {
        if source.as_any().downcast_ref::<Value>().is_some_and(Value::is_null) {
            return Ok(());
        }

        if dest.copy_from(source.as_any()) {
            return Ok(());
        }

        if let Some(converter) = self.binder.converters.find(source.as_any().type_id(), dest.target_type()) {
            return run_custom(converter, source.as_any(), &source.to_value(), dest);
        }

        let type_name = dest.type_name();
        if let Some(capability) = dest.capability() {
            let value = source.to_value();
            if let Some(result) = capability.apply(&value) {
                return result.map_err(|e| BindError::field(type_name, ConvertError::from(e)));
            }
        }

        let Some(shape) = dest.shape() else {
            return Err(BindError::InvalidDestination(format!("'{type_name}' is not a struct")));
        };

        let allocated = dest.vivify();
        let result = self.convert_struct(source, dest, shape);
        if result.is_err() && allocated {
            dest.set_zero();
            tracing::debug!(type_name = shape.type_name, "conversion failed, reset allocated destination");
        }
        result
    }

    fn convert_struct(&self, source: &dyn Bindable, dest: &mut dyn Bindable, shape: Shape) -> Result<(), BindError> {
        let record = dest
            .record_mut()
            .ok_or_else(|| BindError::InvalidDestination(format!("'{}' is not reachable", shape.type_name)))?;

        // `Option<T>`/`Box<T>` destinations with a `T` source.
        if record.copy_from(source.as_any()) {
            return Ok(());
        }

        let params = self.normalize(source)?;
        if params.is_empty() {
            return Ok(());
        }

        let metadata = self.binder.metadata(shape, self.tags);
        if metadata.is_empty() {
            return Err(BindError::EmptyStructFields(shape.type_name));
        }

        self.bind_fields(&metadata, &params, record)
    }

    // -----------------------------------------------------------------------
    // Source normalization
    // -----------------------------------------------------------------------

    fn normalize<'s>(&self, source: &'s dyn Bindable) -> Result<Cow<'s, Map>, BindError> {
        if let Some(record) = source.record() {
            return Ok(Cow::Owned(self.record_params(record)));
        }
        if let Some(value) = source.as_any().downcast_ref::<Value>() {
            return self.normalize_value(value);
        }
        let value = source.to_value();
        self.normalize_value(&value).map(|params| Cow::Owned(params.into_owned()))
    }

    fn normalize_value<'v>(&self, value: &'v Value) -> Result<Cow<'v, Map>, BindError> {
        match value {
            Value::Map(map) => Ok(Cow::Borrowed(map)),
            Value::Null => Ok(Cow::Owned(Map::new())),
            Value::String(_) | Value::Bytes(_) if self.binder.config.json_sources => {
                match value.decode_json() {
                    Some(Value::Map(map)) => Ok(Cow::Owned(map)),
                    _ => Err(BindError::UnnormalizableSource(value.kind_name())),
                }
            }
            other => Err(BindError::UnnormalizableSource(other.kind_name())),
        }
    }

    /// A struct source, keyed by each field's primary match key.
    fn record_params(&self, record: &dyn Record) -> Map {
        let Some(shape) = record.shape() else {
            return Map::new();
        };
        let metadata = self.binder.metadata(shape, self.tags);
        let mut params = Map::with_capacity(metadata.len());
        for descriptor in metadata.fields() {
            if let Some(field) = field_ref(record, &descriptor.slot().index_path) {
                params.insert(descriptor.primary_key().to_string(), field.to_value());
            }
        }
        params
    }

    // -----------------------------------------------------------------------
    // Matching
    // -----------------------------------------------------------------------

    fn bind_fields(&self, metadata: &StructMetadata, params: &Map, record: &mut dyn Record) -> Result<(), BindError> {
        let fields = metadata.fields();
        let mut consumed: HashSet<&str> = HashSet::with_capacity(params.len());
        let mut resolved: Vec<Option<&Value>> = vec![None; fields.len()];

        if let Some(overrides) = self.overrides {
            for (key, field) in overrides {
                let (Some((key, value)), Some(position)) = (params.get_key_value(key.as_str()), metadata.position_of(field))
                else {
                    continue;
                };
                if resolved[position].is_none() {
                    resolved[position] = Some(value);
                    consumed.insert(key.as_str());
                }
            }
        }

        for (position, descriptor) in fields.iter().enumerate() {
            if resolved[position].is_some() {
                continue;
            }
            let hit = descriptor
                .match_keys()
                .iter()
                .find_map(|key| params.get_key_value(key.as_str()));
            if let Some((key, value)) = hit {
                resolved[position] = Some(value);
                consumed.insert(key.as_str());
            }
        }

        if self.binder.config.fuzzy_match {
            let mut normalized: Option<Vec<String>> = None;
            for (position, descriptor) in fields.iter().enumerate() {
                if resolved[position].is_some() {
                    continue;
                }
                if let Some((key, value)) = fuzzy_match(descriptor, params, &consumed, &mut normalized) {
                    tracing::trace!(field = descriptor.name(), key, "fuzzy matched");
                    resolved[position] = Some(value);
                    consumed.insert(key);
                }
            }
        }

        let mut allocated = Vec::new();
        let mut first_error = None;
        for (descriptor, value) in fields.iter().zip(resolved) {
            let Some(value) = value else { continue };
            for slot in descriptor.slots() {
                if let Err(e) = self.assign(descriptor.name(), slot, value, record, &mut allocated) {
                    tracing::debug!(field = descriptor.name(), error = %e, "field binding failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                reset_allocated(record, &allocated);
                Err(e)
            }
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    fn assign(
        &self,
        name: &str,
        info: &FieldSlot,
        value: &Value,
        record: &mut dyn Record,
        allocated: &mut Vec<Vec<usize>>,
    ) -> Result<(), BindError> {
        let slot = field_mut(record, &info.index_path, allocated).ok_or_else(|| {
            BindError::field(name, ConvertError::type_mismatch("field path is not reachable"))
        })?;

        if value.is_null() {
            slot.set_zero();
            return Ok(());
        }

        let nested = self.nested();

        if info.custom_target {
            if let Some(converter) = self.binder.converters.find(value.payload().type_id(), info.target_type) {
                return run_custom(converter, value.payload(), value, slot);
            }
        }

        if let Some(setter) = info.scalar {
            return setter(slot.as_any_mut(), value).map_err(|e| BindError::field(name, e));
        }

        if info.capability.is_some() {
            if let Some(capability) = slot.capability() {
                if let Some(result) = capability.apply(value) {
                    return result.map_err(|e| BindError::field(name, ConvertError::from(e)));
                }
            }
        }

        if info.kind == FieldKind::Struct {
            return nested.convert(value, slot);
        }

        slot.assign(value, &nested).map_err(|e| e.in_field(name))
    }
}

impl BindContext for Call<'_> {
    fn bind_slot(&self, value: &Value, slot: &mut dyn Bindable) -> Result<(), BindError> {
        if value.is_null() {
            slot.set_zero();
            return Ok(());
        }

        if let Some(converter) = self.binder.converters.find(value.payload().type_id(), slot.target_type()) {
            return run_custom(converter, value.payload(), value, slot);
        }

        if let Some(capability) = slot.capability() {
            if let Some(result) = capability.apply(value) {
                return result.map_err(|e| BindError::Convert(ConvertError::from(e)));
            }
        }

        if slot.shape().is_some() {
            return self.nested().convert(value, slot);
        }

        slot.assign(value, &self.nested())
    }

    fn bind_struct(&self, value: &Value, dest: &mut dyn Bindable) -> Result<(), BindError> {
        self.nested().convert(value, dest)
    }
}

/// Run a custom converter into the innermost value of `dest`, allocating
/// `Option`/`Box` levels as needed and undoing that allocation on failure.
fn run_custom(
    converter: &CustomConverter,
    from: &dyn Any,
    value: &Value,
    dest: &mut dyn Bindable,
) -> Result<(), BindError> {
    let type_name = dest.type_name();
    let allocated = dest.vivify();
    let result = match dest.inner_any_mut() {
        Some(target) => converter.convert(from, value, target),
        None => Err(BindError::InvalidDestination(format!(
            "'{type_name}' has no value to convert into"
        ))),
    };
    if result.is_err() && allocated {
        dest.set_zero();
    }
    result
}

/// Fuzzy match: the field's hint first, re-validated, then every unconsumed
/// key in source order.
fn fuzzy_match<'p>(
    descriptor: &FieldDescriptor,
    params: &'p Map,
    consumed: &HashSet<&str>,
    normalized: &mut Option<Vec<String>>,
) -> Option<(&'p str, &'p Value)> {
    let target = descriptor.normalized_name();

    if let Some(hint) = descriptor.last_fuzzy_key() {
        if let Some((key, value)) = params.get_key_value(hint.as_str()) {
            if !consumed.contains(key.as_str()) && tag::fuzzy_key(key) == target {
                return Some((key.as_str(), value));
            }
        }
    }

    let keys = normalized.get_or_insert_with(|| params.keys().map(|k| tag::fuzzy_key(k)).collect());
    for ((key, value), fuzzy) in params.iter().zip(keys.iter()) {
        if fuzzy == target && !consumed.contains(key.as_str()) {
            descriptor.remember_fuzzy_key(key);
            return Some((key.as_str(), value));
        }
    }
    None
}

/// Walk `path` through embedded structs, read-only. `None` stops at an
/// unallocated `Option`.
fn field_ref<'r>(record: &'r dyn Record, path: &[usize]) -> Option<&'r dyn Bindable> {
    let (&last, parents) = path.split_last()?;
    let mut current = record;
    for &index in parents {
        current = current.field(index)?.record()?;
    }
    current.field(last)
}

/// Walk `path` through embedded structs, allocating `Option`/`Box` levels.
/// The path of every level allocated here is pushed to `allocated`.
fn field_mut<'r>(
    record: &'r mut dyn Record,
    path: &[usize],
    allocated: &mut Vec<Vec<usize>>,
) -> Option<&'r mut dyn Bindable> {
    let (&last, parents) = path.split_last()?;
    let mut current = record;
    for (depth, &index) in parents.iter().enumerate() {
        let field = current.field_mut(index)?;
        if field.vivify() {
            allocated.push(parents[..=depth].to_vec());
        }
        current = field.record_mut()?;
    }
    current.field_mut(last)
}

/// Walk `path` through embedded structs without allocating.
fn existing_field_mut<'r>(record: &'r mut dyn Record, path: &[usize]) -> Option<&'r mut dyn Bindable> {
    let (&last, parents) = path.split_last()?;
    let mut current = record;
    for &index in parents {
        current = current.field_mut(index)?.record_mut()?;
    }
    current.field_mut(last)
}

/// Reset embedded levels a failed call allocated, outermost first.
fn reset_allocated(record: &mut dyn Record, allocated: &[Vec<usize>]) {
    for path in allocated {
        if let Some(level) = existing_field_mut(record, path) {
            level.set_zero();
            tracing::debug!(path = ?path, "reset allocated embedded struct");
        }
    }
}
