//! Virtual method tables
//!
//! Slot order follows the finalized [`VTabType`]: inherited slots first in
//! inherited order, new methods appended. An override replaces the value of
//! an inherited slot without moving it, so a call through a base-typed
//! reference at slot `i` reaches the overriding implementation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::errors::{CompileError, LayoutErrorKind, Result, TableKind};
use crate::exttypes::exttype::ExtType;
use crate::exttypes::pipeline::NativeFnPtr;
use crate::exttypes::signatures::ExtMethodType;
use crate::exttypes::tables::VTabType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VTabSlot {
    pub name: String,
    pub pointer: NativeFnPtr,
    pub signature: ExtMethodType,
}

/// Populated dispatch table. Owned by the extension type it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VTable {
    id: u64,
    slots: Box<[VTabSlot]>,
}

impl VTable {
    pub fn slots(&self) -> &[VTabSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&VTabSlot> {
        self.slots.get(index)
    }

    pub fn get(&self, name: &str) -> Option<&VTabSlot> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    pub fn pointer(&self, name: &str) -> Option<NativeFnPtr> {
        self.get(name).map(|slot| slot.pointer)
    }

    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Identity stored in each instance's vtab pointer field.
    ///
    /// Derived from the owning class name and the populated slots, so types
    /// without methods still get distinct ids. Never 0.
    pub fn id(&self) -> u64 {
        self.id
    }
}

fn vtab_id(class: &str, slots: &[VTabSlot]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(class.as_bytes());
    for slot in slots {
        hasher.update(&[0]);
        hasher.update(slot.name.as_bytes());
        hasher.update(&slot.pointer.0.to_le_bytes());
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
    u64::from_le_bytes(bytes).max(1)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VTabBuilder;

impl VTabBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Merge this class's method signatures into the vtab type.
    ///
    /// Constructors never get a slot.
    #[instrument(skip(self, ext_type), fields(class = %ext_type.name))]
    pub fn build_vtab_type(&self, ext_type: &mut ExtType) -> Result<()> {
        let own: Vec<(String, ExtMethodType)> = ext_type
            .methods
            .iter()
            .filter(|(_, sig)| !sig.is_constructor)
            .map(|(name, sig)| (name.to_string(), sig.clone()))
            .collect();

        let class = ext_type.name.clone();
        let builder = ext_type.vtab_type.builder_mut().ok_or_else(|| {
            CompileError::frozen(&class, TableKind::Methods, own.first().map_or("<methods>", |(n, _)| n.as_str()))
        })?;

        for (name, sig) in own {
            builder.insert_own(&name, sig);
        }

        debug!(slots = builder.entries().len(), "Built vtab type");
        Ok(())
    }

    /// Freeze the vtab type; slot indices are fixed from here on.
    pub fn finalize(&self, ext_type: &mut ExtType) -> Arc<VTabType> {
        ext_type.vtab_type.finalize()
    }

    /// Pointers for every slot: inherited implementations from the base
    /// vtables (merged like the tables, later bases win), then this class's
    /// own compiled methods.
    pub fn resolve_pointers(
        &self,
        ext_type: &ExtType,
        own: impl IntoIterator<Item = (String, NativeFnPtr)>,
    ) -> HashMap<String, NativeFnPtr> {
        let mut pointers = HashMap::new();
        for base in &ext_type.bases {
            for slot in base.vtable().slots() {
                pointers.insert(slot.name.clone(), slot.pointer);
            }
        }
        pointers.extend(own);
        pointers
    }

    /// Populate the finalized vtab type with compiled entry points.
    #[instrument(skip_all, fields(class = %ext_type.name))]
    pub fn build_vtab(
        &self,
        ext_type: &ExtType,
        method_pointers: &HashMap<String, NativeFnPtr>,
    ) -> Result<VTable> {
        let vtab_type = ext_type.vtab_type.finalized().ok_or_else(|| CompileError::Layout {
            class: ext_type.name.clone(),
            kind: LayoutErrorKind::NotFinalized { table: TableKind::Methods },
        })?;

        let mut slots = Vec::with_capacity(vtab_type.len());
        for (index, (name, entry)) in vtab_type.iter().enumerate() {
            let pointer = method_pointers.get(name).copied().ok_or_else(|| CompileError::CodeGen {
                class: ext_type.name.clone(),
                method: name.to_string(),
                message: format!("no compiled entry point for vtab slot {}", index),
            })?;
            slots.push(VTabSlot {
                name: name.to_string(),
                pointer,
                signature: entry.value.clone(),
            });
        }

        debug!(slots = slots.len(), "Populated vtab");
        Ok(VTable {
            id: vtab_id(&ext_type.name, &slots),
            slots: slots.into_boxed_slice(),
        })
    }
}
