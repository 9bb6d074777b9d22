use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use fieldbind_api::Shape;

use crate::descriptor::StructMetadata;

/// Tag list a table was built for, and the table.
type Entry = (Vec<String>, Arc<StructMetadata>);

/// Per-type descriptor tables, keyed by (type, tag priority list).
///
/// Tables are built outside the lock. Concurrent first uses may each build
/// one; the first stored wins and the rest are dropped. Nothing is evicted.
#[derive(Default)]
pub struct MetadataCache {
    entries: RwLock<HashMap<TypeId, Vec<Entry>>>,
    builds: AtomicUsize,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("len", &self.len())
            .field("builds", &self.builds())
            .finish()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_id: TypeId, tags: &[String]) -> Option<Arc<StructMetadata>> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("metadata cache read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        entries
            .get(&type_id)?
            .iter()
            .find(|(t, _)| t.as_slice() == tags)
            .map(|(_, metadata)| Arc::clone(metadata))
    }

    /// Cached table for `shape` under `tags`, building it with `build` on a miss.
    pub fn get_or_build(
        &self,
        shape: Shape,
        tags: &[String],
        build: impl FnOnce() -> StructMetadata,
    ) -> Arc<StructMetadata> {
        let type_id = shape.id();
        if let Some(metadata) = self.get(type_id, tags) {
            return metadata;
        }

        let built = Arc::new(build());
        self.builds.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            type_name = shape.type_name,
            tags = ?tags,
            fields = built.len(),
            "built struct metadata"
        );

        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("metadata cache write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let slot = entries.entry(type_id).or_default();
        if let Some((_, existing)) = slot.iter().find(|(t, _)| t.as_slice() == tags) {
            return Arc::clone(existing);
        }
        slot.push((tags.to_vec(), Arc::clone(&built)));
        built
    }

    /// Number of tables built so far, including ones lost to a racing build.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("metadata cache read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
