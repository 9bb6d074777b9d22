use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use fieldbind_api::{CapabilityKind, FieldKind, ScalarSetter};

/// One physical destination slot and how to write it.
#[derive(Debug, Clone)]
pub struct FieldSlot {
    /// Declaration indices from the destination root, through embedded structs.
    pub index_path: Vec<usize>,
    pub type_name: &'static str,
    /// Type custom converters are looked up by (wrappers stripped).
    pub target_type: TypeId,
    pub kind: FieldKind,
    pub capability: Option<CapabilityKind>,
    /// A custom converter produces `target_type`.
    pub custom_target: bool,
    pub scalar: Option<ScalarSetter>,
}

/// One logical destination field.
///
/// Every occurrence of the same declared name across embedded branches
/// shares this descriptor; later occurrences live in `duplicates` and receive
/// the same source value.
#[derive(Debug)]
pub struct FieldDescriptor {
    name: &'static str,
    match_keys: Vec<String>,
    normalized_name: String,
    slot: FieldSlot,
    duplicates: Vec<FieldSlot>,
    last_fuzzy_key: ArcSwapOption<String>,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, match_keys: Vec<String>, slot: FieldSlot) -> Self {
        Self {
            name,
            match_keys,
            normalized_name: fieldbind_api::tag::fuzzy_key(name),
            slot,
            duplicates: Vec::new(),
            last_fuzzy_key: ArcSwapOption::empty(),
        }
    }

    /// Declared field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Candidate source keys, tag-derived first; the declared name is last.
    pub fn match_keys(&self) -> &[String] {
        &self.match_keys
    }

    /// Key this field is published under when its struct is a source.
    pub fn primary_key(&self) -> &str {
        self.match_keys.first().map_or(self.name, String::as_str)
    }

    pub fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    pub fn slot(&self) -> &FieldSlot {
        &self.slot
    }

    pub fn duplicates(&self) -> &[FieldSlot] {
        &self.duplicates
    }

    /// Primary slot followed by every duplicate.
    pub fn slots(&self) -> impl Iterator<Item = &FieldSlot> {
        std::iter::once(&self.slot).chain(&self.duplicates)
    }

    /// Source key that last fuzzy-matched this field. Advisory only.
    pub fn last_fuzzy_key(&self) -> Option<Arc<String>> {
        self.last_fuzzy_key.load_full()
    }

    pub fn remember_fuzzy_key(&self, key: &str) {
        if self.last_fuzzy_key.load().as_deref().is_some_and(|k| k == key) {
            return;
        }
        self.last_fuzzy_key.store(Some(Arc::new(key.to_string())));
    }
}

/// Flattened field table of one destination type.
#[derive(Debug)]
pub struct StructMetadata {
    type_name: &'static str,
    fields: Vec<FieldDescriptor>,
    by_key: HashMap<String, usize>,
    by_name: HashMap<&'static str, usize>,
}

impl StructMetadata {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Primary descriptors in construction order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Descriptor owning match key `key` (exact, case-sensitive).
    pub fn by_key(&self, key: &str) -> Option<&FieldDescriptor> {
        self.by_key.get(key).map(|&i| &self.fields[i])
    }

    /// Position of the descriptor for declared name `name`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

/// Accumulates descriptors while a struct is being flattened.
#[derive(Debug)]
pub struct MetadataBuilder {
    type_name: &'static str,
    fields: Vec<FieldDescriptor>,
    by_key: HashMap<String, usize>,
    by_name: HashMap<&'static str, usize>,
}

impl MetadataBuilder {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            fields: Vec::new(),
            by_key: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Add a field occurrence.
    ///
    /// A declared name seen before only contributes its slot to the first
    /// descriptor. Match keys already owned by another field stay with it.
    pub fn add(&mut self, name: &'static str, match_keys: Vec<String>, slot: FieldSlot) {
        if let Some(&existing) = self.by_name.get(name) {
            self.fields[existing].duplicates.push(slot);
            return;
        }
        let position = self.fields.len();
        for key in &match_keys {
            self.by_key.entry(key.clone()).or_insert(position);
        }
        self.by_name.insert(name, position);
        self.fields.push(FieldDescriptor::new(name, match_keys, slot));
    }

    pub fn finish(self) -> StructMetadata {
        StructMetadata {
            type_name: self.type_name,
            fields: self.fields,
            by_key: self.by_key,
            by_name: self.by_name,
        }
    }
}
