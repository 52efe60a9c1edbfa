//! Ordered, finalizable tables
//!
//! Attribute tables and vtab types share one representation: an ordered map
//! whose iteration order fixes storage offsets (attributes) or dispatch slots
//! (methods). Tables are built through a [`TableBuilder`], which is consumed
//! by [`TableBuilder::finalize`] into an immutable [`Table`]. After that point
//! no entry can be added, removed or reordered.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::Type;
use crate::exttypes::signatures::ExtMethodType;

/// Insertion-ordered map with index-stable entries.
///
/// Re-inserting an existing key replaces the value in place, so positions
/// only ever grow at the end.
#[derive(Debug, Clone)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert or replace; returns the previous value when the key existed.
    pub fn insert(&mut self, name: impl Into<String>, value: V) -> Option<V> {
        let name = name.into();
        match self.index.get(&name) {
            Some(&idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.index.get(name).map(|&idx| &self.entries[idx].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        match self.index.get(name) {
            Some(&idx) => Some(&mut self.entries[idx].1),
            None => None,
        }
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// Where a table entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Declared or inferred by the class being compiled
    Own,
    /// Copied from the named direct base
    Inherited { base: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry<V> {
    pub value: V,
    pub origin: Origin,
}

impl<V> TableEntry<V> {
    pub fn is_inherited(&self) -> bool {
        matches!(self.origin, Origin::Inherited { .. })
    }
}

/// Table under construction, parameterized by its direct parent tables.
#[derive(Debug, Clone)]
pub struct TableBuilder<V> {
    parents: Vec<Arc<Table<V>>>,
    entries: OrderedMap<TableEntry<V>>,
}

impl<V: Clone> TableBuilder<V> {
    pub fn new(parents: Vec<Arc<Table<V>>>) -> Self {
        Self {
            parents,
            entries: OrderedMap::new(),
        }
    }

    pub fn parents(&self) -> &[Arc<Table<V>>] {
        &self.parents
    }

    /// Merge every entry of `parent` into this table.
    ///
    /// Existing names keep their position and take the parent's value, so
    /// calling this once per base in declaration order gives last-writer-wins.
    pub fn inherit_from(&mut self, base: &str, parent: &Table<V>) {
        for (name, entry) in parent.iter() {
            self.entries.insert(
                name,
                TableEntry {
                    value: entry.value.clone(),
                    origin: Origin::Inherited { base: base.to_string() },
                },
            );
        }
    }

    /// Add or override an entry owned by the class being compiled.
    pub fn insert_own(&mut self, name: &str, value: V) -> Option<V> {
        self.entries
            .insert(name, TableEntry { value, origin: Origin::Own })
            .map(|previous| previous.value)
    }

    pub fn entries(&self) -> &OrderedMap<TableEntry<V>> {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(name).map(|entry| &entry.value)
    }

    /// Fix the order and contents. Parent references are dropped here.
    pub fn finalize(self) -> Table<V> {
        Table { entries: self.entries }
    }
}

/// Finalized, immutable table. Positions are offsets/slots.
#[derive(Debug, Clone)]
pub struct Table<V> {
    entries: OrderedMap<TableEntry<V>>,
}

impl<V> Table<V> {
    pub fn empty() -> Self {
        Self { entries: OrderedMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(name).map(|entry| &entry.value)
    }

    pub fn entry(&self, name: &str) -> Option<&TableEntry<V>> {
        self.entries.get(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.index_of(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableEntry<V>)> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type AttributeTable = Table<Type>;
pub type VTabType = Table<ExtMethodType>;

/// A table slot on an [`crate::exttypes::ExtType`]: still building, or locked.
#[derive(Debug, Clone)]
pub enum TableState<V> {
    Building(TableBuilder<V>),
    Finalized(Arc<Table<V>>),
}

impl<V: Clone> TableState<V> {
    pub fn empty() -> Self {
        TableState::Building(TableBuilder::new(Vec::new()))
    }

    pub fn entries(&self) -> &OrderedMap<TableEntry<V>> {
        match self {
            TableState::Building(builder) => builder.entries(),
            TableState::Finalized(table) => &table.entries,
        }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries().get(name).map(|entry| &entry.value)
    }

    pub fn entry(&self, name: &str) -> Option<&TableEntry<V>> {
        self.entries().get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, TableState::Finalized(_))
    }

    pub fn builder_mut(&mut self) -> Option<&mut TableBuilder<V>> {
        match self {
            TableState::Building(builder) => Some(builder),
            TableState::Finalized(_) => None,
        }
    }

    pub fn finalized(&self) -> Option<&Arc<Table<V>>> {
        match self {
            TableState::Finalized(table) => Some(table),
            TableState::Building(_) => None,
        }
    }

    /// Lock the table. Finalizing an already finalized table returns it unchanged.
    pub fn finalize(&mut self) -> Arc<Table<V>> {
        let state = std::mem::replace(self, TableState::Finalized(Arc::new(Table::empty())));
        let table = match state {
            TableState::Building(builder) => Arc::new(builder.finalize()),
            TableState::Finalized(table) => table,
        };
        *self = TableState::Finalized(table.clone());
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, Type)]) -> Arc<Table<Type>> {
        let mut builder = TableBuilder::new(Vec::new());
        for (name, ty) in pairs {
            builder.insert_own(name, ty.clone());
        }
        Arc::new(builder.finalize())
    }

    #[test]
    fn test_reinsert_keeps_position() {
        let mut map = OrderedMap::new();
        map.insert("x", 1);
        map.insert("y", 2);
        assert_eq!(map.insert("x", 3), Some(1));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(map.get("x"), Some(&3));
        assert_eq!(map.index_of("y"), Some(1));
    }

    #[test]
    fn test_merge_is_last_writer_wins() {
        let a = table(&[("x", Type::Int), ("a", Type::Str)]);
        let b = table(&[("b", Type::Bool), ("x", Type::Float)]);

        let mut builder = TableBuilder::new(vec![a.clone(), b.clone()]);
        builder.inherit_from("A", &a);
        builder.inherit_from("B", &b);
        builder.insert_own("c", Type::Int);

        let merged = builder.finalize();
        assert_eq!(merged.names(), vec!["x", "a", "b", "c"]);
        assert_eq!(merged.get("x"), Some(&Type::Float));
        assert_eq!(
            merged.entry("x").map(|e| e.origin.clone()),
            Some(Origin::Inherited { base: "B".to_string() })
        );
        assert_eq!(merged.entry("c").map(|e| e.origin.clone()), Some(Origin::Own));
    }

    #[test]
    fn test_own_override_keeps_inherited_slot() {
        let base = table(&[("x", Type::Int), ("y", Type::Int)]);
        let mut builder = TableBuilder::new(vec![base.clone()]);
        builder.inherit_from("Base", &base);
        assert_eq!(builder.insert_own("x", Type::Float), Some(Type::Int));
        let merged = builder.finalize();
        assert_eq!(merged.index_of("x"), Some(0));
        assert!(!merged.entry("x").map(|e| e.is_inherited()).unwrap_or(true));
    }

    #[test]
    fn test_state_finalize_is_idempotent() {
        let mut state: TableState<Type> = TableState::empty();
        if let Some(builder) = state.builder_mut() {
            builder.insert_own("x", Type::Float);
        }
        let first = state.finalize();
        let second = state.finalize();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(state.builder_mut().is_none());
        assert_eq!(state.len(), 1);
    }
}
