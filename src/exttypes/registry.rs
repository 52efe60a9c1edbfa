//! Process-wide registry of compiled extension types
//!
//! The extension compiler never touches this registry; callers that want
//! later compilations to find a type as a base register it explicitly.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::exttypes::extension::ExtensionType;

static REGISTRY: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::new);

/// Thread-safe name -> compiled type map
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: DashMap<String, Arc<ExtensionType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self { types: DashMap::new() }
    }

    /// The registry shared by the whole process, created on first use.
    pub fn global() -> &'static TypeRegistry {
        &REGISTRY
    }

    /// Insert unless a type of the same name is already registered.
    ///
    /// Returns the registered type, which is the existing one on conflict.
    pub fn register(&self, ty: Arc<ExtensionType>) -> Arc<ExtensionType> {
        match self.types.entry(ty.name().to_string()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                slot.insert(ty.clone());
                ty
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ExtensionType>> {
        self.types.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn clear(&self) {
        self.types.clear();
    }
}
