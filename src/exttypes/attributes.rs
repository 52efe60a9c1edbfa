//! Native attribute layout and Python-level accessors
//!
//! Instances are laid out as
//!
//! ```text
//! +0   object header (type info, refcount)   16 bytes
//! +16  vtab pointer                           8 bytes
//! +24  attributes in finalized table order, each aligned to its type
//! ```
//!
//! Once the attribute table is finalized the offsets below are referenced by
//! compiled method code and by the descriptors installed in the class dict,
//! so they never change.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::Type;
use crate::errors::{CompileError, LayoutErrorKind, Result, TableKind};
use crate::exttypes::exttype::{ExtType, VariableOrigin};
use crate::exttypes::pyclass::{ClassDict, ClassMember};
use crate::exttypes::tables::AttributeTable;

/// Object header size, matching the runtime's `ObjectHeader`.
pub const HEADER_SIZE: usize = 16;
pub const VTAB_POINTER_OFFSET: usize = HEADER_SIZE;
pub const ATTRIBUTES_OFFSET: usize = VTAB_POINTER_OFFSET + 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSlot {
    pub name: String,
    pub ty: Type,
    pub index: usize,
    pub offset: usize,
    pub size: usize,
}

/// Offsets for every attribute of a finalized table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeLayout {
    pub slots: Vec<AttributeSlot>,
    pub instance_size: usize,
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

impl AttributeLayout {
    pub fn compute(table: &AttributeTable) -> Self {
        let mut offset = ATTRIBUTES_OFFSET;
        let mut slots = Vec::with_capacity(table.len());

        for (index, (name, entry)) in table.iter().enumerate() {
            let ty = entry.value.clone();
            offset = align_up(offset, ty.native_align());
            let size = ty.native_size();
            slots.push(AttributeSlot { name: name.to_string(), ty, index, offset, size });
            offset += size;
        }

        Self { slots, instance_size: align_up(offset, 8) }
    }

    pub fn slot(&self, name: &str) -> Option<&AttributeSlot> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    pub fn offsets(&self) -> Vec<(&str, usize)> {
        self.slots.iter().map(|slot| (slot.name.as_str(), slot.offset)).collect()
    }
}

/// Runtime value crossing the native/Python boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Opaque object handle; 0 is reserved for `None`
    Object(u64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Object(_) => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccessError {
    #[error("attribute '{attribute}' of type {expected} cannot hold a value of type {found}")]
    TypeMismatch {
        attribute: String,
        expected: Type,
        found: &'static str,
    },

    #[error("attribute '{attribute}' at offset {offset} lies outside a {size}-byte instance")]
    OutOfBounds {
        attribute: String,
        offset: usize,
        size: usize,
    },
}

/// Instance storage for an extension type.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtInstance {
    pub class: String,
    data: Vec<u8>,
}

impl ExtInstance {
    pub fn zeroed(class: impl Into<String>, size: usize, vtab_id: u64) -> Self {
        let mut data = vec![0u8; size.max(ATTRIBUTES_OFFSET)];
        // refcount
        data[8..16].copy_from_slice(&1u64.to_le_bytes());
        data[VTAB_POINTER_OFFSET..ATTRIBUTES_OFFSET].copy_from_slice(&vtab_id.to_le_bytes());
        Self { class: class.into(), data }
    }

    pub fn vtab_id(&self) -> u64 {
        read_u64(&self.data, VTAB_POINTER_OFFSET)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Accessor bound to one native attribute slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub ty: Type,
    pub index: usize,
    pub offset: usize,
}

impl AttributeDescriptor {
    fn check_bounds(&self, instance: &ExtInstance) -> std::result::Result<(), AccessError> {
        if self.offset + self.ty.native_size() > instance.size() {
            return Err(AccessError::OutOfBounds {
                attribute: self.name.clone(),
                offset: self.offset,
                size: instance.size(),
            });
        }
        Ok(())
    }

    pub fn get(&self, instance: &ExtInstance) -> std::result::Result<Value, AccessError> {
        self.check_bounds(instance)?;
        let data = instance.bytes();
        let value = match self.ty {
            Type::Bool => Value::Bool(data[self.offset] != 0),
            Type::Int => Value::Int(read_u64(data, self.offset) as i64),
            Type::Float => Value::Float(f64::from_bits(read_u64(data, self.offset))),
            _ => match read_u64(data, self.offset) {
                0 => Value::None,
                handle => Value::Object(handle),
            },
        };
        Ok(value)
    }

    /// Store `value`, widening `int`/`bool` into `float` slots.
    pub fn set(&self, instance: &mut ExtInstance, value: Value) -> std::result::Result<(), AccessError> {
        self.check_bounds(instance)?;
        let mismatch = || AccessError::TypeMismatch {
            attribute: self.name.clone(),
            expected: self.ty.clone(),
            found: value.type_name(),
        };

        let bytes: Vec<u8> = match (&self.ty, value) {
            (Type::Bool, Value::Bool(b)) => vec![b as u8],
            (Type::Int, Value::Int(i)) => i.to_le_bytes().to_vec(),
            (Type::Int, Value::Bool(b)) => (b as i64).to_le_bytes().to_vec(),
            (Type::Float, Value::Float(f)) => f.to_bits().to_le_bytes().to_vec(),
            (Type::Float, Value::Int(i)) => (i as f64).to_bits().to_le_bytes().to_vec(),
            (Type::Float, Value::Bool(b)) => (b as u8 as f64).to_bits().to_le_bytes().to_vec(),
            (Type::Bool | Type::Int | Type::Float, _) => return Err(mismatch()),
            (_, Value::None) => 0u64.to_le_bytes().to_vec(),
            (_, Value::Object(handle)) => handle.to_le_bytes().to_vec(),
            _ => return Err(mismatch()),
        };

        instance.data[self.offset..self.offset + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }
}

/// Builds the attribute table from the symbol table and fixes its layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeBuilder;

impl AttributeBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Add every attribute the class declares or infers to the attribute table.
    ///
    /// Inherited attributes are already present; redeclaring one keeps its
    /// inherited position.
    #[instrument(skip(self, ext_type), fields(class = %ext_type.name))]
    pub fn build_attributes(&self, ext_type: &mut ExtType) -> Result<()> {
        let own: Vec<(String, Type)> = ext_type
            .symtab
            .iter()
            .filter(|(_, var)| var.origin != VariableOrigin::Inherited)
            .map(|(name, var)| (name.to_string(), var.ty.clone()))
            .collect();

        for (name, ty) in own {
            ext_type.add_attribute(&name, ty)?;
        }

        debug!(attributes = ext_type.attribute_table.len(), "Built attribute table");
        Ok(())
    }

    /// Freeze the attribute table and compute the native layout.
    pub fn finalize(&self, ext_type: &mut ExtType) -> Arc<AttributeTable> {
        let table = ext_type.attribute_table.finalize();
        if ext_type.layout.is_none() {
            let layout = AttributeLayout::compute(&table);
            debug!(
                class = %ext_type.name,
                instance_size = layout.instance_size,
                "Fixed attribute layout"
            );
            ext_type.layout = Some(layout);
        }
        table
    }

    pub fn create_descr(&self, layout: &AttributeLayout, attr_name: &str) -> Option<AttributeDescriptor> {
        layout.slot(attr_name).map(|slot| AttributeDescriptor {
            name: slot.name.clone(),
            ty: slot.ty.clone(),
            index: slot.index,
            offset: slot.offset,
        })
    }

    /// Install one descriptor per finalized attribute into the class dict.
    pub fn build_descriptors(
        &self,
        ext_type: &ExtType,
        class_dict: &mut ClassDict,
    ) -> Result<Vec<AttributeDescriptor>> {
        let layout = ext_type.layout.as_ref().ok_or_else(|| CompileError::Layout {
            class: ext_type.name.clone(),
            kind: LayoutErrorKind::NotFinalized { table: TableKind::Attributes },
        })?;

        let descriptors: Vec<AttributeDescriptor> = layout
            .slots
            .iter()
            .filter_map(|slot| self.create_descr(layout, &slot.name))
            .collect();

        for descr in &descriptors {
            class_dict.insert(descr.name.clone(), ClassMember::Descriptor(descr.clone()));
        }

        Ok(descriptors)
    }
}
