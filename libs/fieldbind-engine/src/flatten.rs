use std::any::TypeId;

use fieldbind_api::tag;
use fieldbind_api::{FieldDef, Shape};

use crate::descriptor::{FieldSlot, MetadataBuilder, StructMetadata};
use crate::registry::ConverterRegistry;

/// Builds the flat descriptor table of a destination type.
pub struct StructFlattener<'a> {
    tags: &'a [String],
    converters: &'a ConverterRegistry,
}

impl<'a> StructFlattener<'a> {
    pub fn new(tags: &'a [String], converters: &'a ConverterRegistry) -> Self {
        Self { tags, converters }
    }

    pub fn flatten(&self, shape: Shape) -> StructMetadata {
        let mut builder = MetadataBuilder::new(shape.type_name);
        let mut stack = vec![shape.id()];
        self.walk(shape, &[], &mut stack, &mut builder);
        builder.finish()
    }

    /// Match keys of a field: the first tag present in priority order, then
    /// the declared name.
    pub fn match_keys(&self, def: &FieldDef) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(name) = self.tagged_name(def) {
            if name != def.name {
                keys.push(name.to_string());
            }
        }
        keys.push(def.name.to_string());
        keys
    }

    /// Name part of the first priority tag the field carries. A present tag
    /// with an empty name (`",omitempty"`) still ends the search.
    fn tagged_name(&self, def: &FieldDef) -> Option<&'static str> {
        self.tags
            .iter()
            .find_map(|t| def.tag(t))
            .and_then(tag::primary_name)
    }

    fn walk(&self, shape: Shape, parent: &[usize], stack: &mut Vec<TypeId>, builder: &mut MetadataBuilder) {
        for def in (shape.fields)() {
            let mut path = Vec::with_capacity(parent.len() + 1);
            path.extend_from_slice(parent);
            path.push(def.index);

            let Some(inner) = def.shape.filter(|_| def.embedded) else {
                builder.add(def.name, self.match_keys(&def), self.slot(&def, path));
                continue;
            };

            // Embedded structs bind as a whole only when explicitly tagged.
            if self.tagged_name(&def).is_some() {
                builder.add(def.name, self.match_keys(&def), self.slot(&def, path.clone()));
            }
            if stack.contains(&inner.id()) {
                tracing::warn!(
                    type_name = shape.type_name,
                    field = def.name,
                    "skipping recursive embedding"
                );
                continue;
            }
            stack.push(inner.id());
            self.walk(inner, &path, stack, builder);
            stack.pop();
        }
    }

    fn slot(&self, def: &FieldDef, index_path: Vec<usize>) -> FieldSlot {
        FieldSlot {
            index_path,
            type_name: def.type_name,
            target_type: def.target_type,
            kind: def.kind,
            capability: def.capability,
            custom_target: self.converters.is_destination(def.target_type),
            scalar: def.scalar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbind_api::{Bind, FieldKind, FieldType};

    #[derive(Bind, Clone, Default)]
    pub struct Audit {
        pub id: i64,
        #[tag(json = "created")]
        pub created_at: String,
    }

    #[derive(Bind, Clone, Default)]
    pub struct Account {
        pub id: i64,
        #[tag(json = "user_name,omitempty", orm = "name")]
        pub user_name: String,
        #[bind(embed)]
        pub audit: Audit,
        #[tag(json = "owner")]
        #[bind(embed)]
        pub owner: Option<Audit>,
    }

    #[derive(Bind, Clone, Default)]
    pub struct Node {
        pub label: String,
        #[bind(embed)]
        pub next: Option<Box<Node>>,
    }

    #[derive(Bind, Clone, Default)]
    pub struct Flagged {
        #[tag(json = ",omitempty", orm = "alias")]
        pub label: String,
    }

    fn flatten<T: FieldType>(tags: &[&str]) -> StructMetadata {
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let converters = ConverterRegistry::new();
        StructFlattener::new(&tags, &converters).flatten(T::static_shape().unwrap())
    }

    #[test]
    fn promotes_embedded_fields_and_collects_duplicates() {
        let metadata = flatten::<Account>(&["json"]);
        let names: Vec<&str> = metadata.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["id", "user_name", "created_at", "owner"]);

        let id = metadata.by_key("id").unwrap();
        assert_eq!(id.slot().index_path, [0]);
        let duplicate_paths: Vec<&[usize]> = id.duplicates().iter().map(|s| s.index_path.as_slice()).collect();
        assert_eq!(duplicate_paths, [&[2, 0][..], &[3, 0][..]]);

        let created = metadata.by_key("created").unwrap();
        assert_eq!(created.match_keys(), ["created", "created_at"]);
        assert_eq!(created.duplicates().len(), 1);
    }

    #[test]
    fn tag_priority_picks_first_present_tag() {
        let metadata = flatten::<Account>(&["orm", "json"]);
        assert_eq!(metadata.fields()[1].match_keys(), ["name", "user_name"]);

        let metadata = flatten::<Account>(&["json"]);
        assert_eq!(metadata.fields()[1].match_keys(), ["user_name"]);
    }

    #[test]
    fn empty_tag_name_stops_the_priority_search() {
        let metadata = flatten::<Account>(&["json", "orm"]);
        assert_eq!(metadata.fields()[1].match_keys(), ["user_name"]);

        let metadata = flatten::<Flagged>(&["json", "orm"]);
        assert_eq!(metadata.fields()[0].match_keys(), ["label"]);
    }

    #[test]
    fn tagged_embedded_struct_is_also_a_field() {
        let metadata = flatten::<Account>(&["json"]);
        let owner = metadata.by_key("owner").unwrap();
        assert_eq!(owner.slot().kind, FieldKind::Struct);
        assert_eq!(owner.slot().index_path, [3]);
        assert!(metadata.by_key("audit").is_none());
    }

    #[test]
    fn recursive_embedding_stops() {
        let metadata = flatten::<Node>(&[]);
        assert_eq!(metadata.len(), 1);
        assert!(metadata.fields()[0].duplicates().is_empty());
    }
}
