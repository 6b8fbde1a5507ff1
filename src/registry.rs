//! Weak, type-indexed registry of every live instance.
//!
//! There is no heap scanner to ask for "all objects of type T", so every
//! instance registers itself here when it is constructed. Entries are weak:
//! the registry never keeps an instance alive, and entries whose instance
//! was dropped are pruned whenever a bucket is scanned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::namespace::NameHasher;
use crate::types::{Instance, TypeDef};

struct Bucket {
    class: Weak<TypeDef>,
    instances: Vec<Weak<Instance>>,
}

#[derive(Default)]
pub struct InstanceRegistry {
    // keyed by the id of the type an instance was filed under
    buckets: Mutex<HashMap<u64, Bucket, NameHasher>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Bucket, NameHasher>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Constructs a new instance of `class` and registers it.
    pub fn instantiate(&self, class: &Arc<TypeDef>) -> Arc<Instance> {
        let instance = Instance::new(Arc::clone(class));
        self.file(class, &instance);
        instance
    }

    fn file(&self, class: &Arc<TypeDef>, instance: &Arc<Instance>) {
        self.lock()
            .entry(class.id())
            .or_insert_with(|| Bucket {
                class: Arc::downgrade(class),
                instances: Vec::new(),
            })
            .instances
            .push(Arc::downgrade(instance));
    }

    /// Live instances whose current type is `class` or descends from it.
    ///
    /// The result is a snapshot: instances constructed after the scan took
    /// the lock are not part of it.
    pub fn instances_of(&self, class: &TypeDef) -> Vec<Arc<Instance>> {
        let mut found = Vec::new();
        let mut buckets = self.lock();
        buckets.retain(|_, bucket| {
            bucket.instances.retain(|weak| weak.strong_count() > 0);
            !bucket.instances.is_empty()
        });
        for bucket in buckets.values() {
            let relevant = bucket
                .class
                .upgrade()
                .is_none_or(|filed| filed.descends_from(class));
            if !relevant {
                continue;
            }
            for instance in bucket.instances.iter().filter_map(Weak::upgrade) {
                // the bucket is only a hint, the type cell is authoritative
                if instance.class().descends_from(class) {
                    found.push(instance);
                }
            }
        }
        found
    }

    /// Moves every entry into the bucket of its instance's current type.
    /// Called after migration so later scans look in the right place.
    pub fn reindex(&self) {
        let mut buckets = self.lock();
        let mut regrouped: HashMap<u64, Bucket, NameHasher> = HashMap::default();
        for bucket in buckets.drain().map(|(_, bucket)| bucket) {
            for instance in bucket.instances.iter().filter_map(Weak::upgrade) {
                let class = instance.class();
                regrouped
                    .entry(class.id())
                    .or_insert_with(|| Bucket {
                        class: Arc::downgrade(&class),
                        instances: Vec::new(),
                    })
                    .instances
                    .push(Arc::downgrade(&instance));
            }
        }
        debug!(types = regrouped.len(), "instance registry reindexed");
        *buckets = regrouped;
    }

    /// Number of registered instances that are still alive.
    pub fn live_count(&self) -> usize {
        self.lock()
            .values()
            .map(|bucket| bucket.instances.iter().filter(|w| w.strong_count() > 0).count())
            .sum()
    }
}
