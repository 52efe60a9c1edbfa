//! Finished extension types

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::errors::Result;
use crate::exttypes::attributes::{AttributeDescriptor, AttributeLayout, ExtInstance};
use crate::exttypes::exttype::Symtab;
use crate::exttypes::pipeline::{CompiledMethod, NativeTypeFactory, NativeTypeSpec};
use crate::exttypes::pyclass::{BaseClass, ClassDict, PyClass};
use crate::exttypes::signatures::ExtMethodType;
use crate::exttypes::tables::{AttributeTable, OrderedMap, Origin, VTabType};
use crate::exttypes::vtab::VTable;

/// A compiled, native-backed type. Immutable once created.
#[derive(Debug)]
pub struct ExtensionType {
    name: String,
    py_class: Arc<PyClass>,
    bases: Vec<BaseClass>,
    members: ClassDict,
    symtab: Symtab,
    methods: OrderedMap<ExtMethodType>,
    attribute_table: Arc<AttributeTable>,
    vtab_type: Arc<VTabType>,
    layout: AttributeLayout,
    descriptors: Vec<AttributeDescriptor>,
    compiled: Vec<CompiledMethod>,
    vtable: VTable,
}

impl ExtensionType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class this type was compiled from.
    pub fn py_class(&self) -> &Arc<PyClass> {
        &self.py_class
    }

    pub fn bases(&self) -> &[BaseClass] {
        &self.bases
    }

    pub fn members(&self) -> &ClassDict {
        &self.members
    }

    pub fn symtab(&self) -> &Symtab {
        &self.symtab
    }

    pub fn attribute_table(&self) -> &Arc<AttributeTable> {
        &self.attribute_table
    }

    pub fn vtab_type(&self) -> &Arc<VTabType> {
        &self.vtab_type
    }

    pub fn vtable(&self) -> &VTable {
        &self.vtable
    }

    pub fn layout(&self) -> &AttributeLayout {
        &self.layout
    }

    pub fn descriptors(&self) -> &[AttributeDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn compiled_methods(&self) -> &[CompiledMethod] {
        &self.compiled
    }

    /// Signature of a method defined by this class (including `__init__`).
    pub fn method_signature(&self, name: &str) -> Option<&ExtMethodType> {
        self.methods.get(name).or_else(|| self.vtab_type.get(name))
    }

    /// Whether `name` is this type or one of its extension ancestors.
    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.name == name
            || self.bases.iter().any(|base| match base {
                BaseClass::Extension(ty) => ty.is_subclass_of(name),
                BaseClass::Python(base_name) => base_name == name,
            })
    }

    /// Zeroed instance wired to this type's vtab.
    pub fn instantiate(&self) -> ExtInstance {
        ExtInstance::zeroed(self.name.clone(), self.layout.instance_size, self.vtable.id())
    }

    pub fn summary(&self) -> TypeSummary {
        let attributes = self
            .layout
            .slots
            .iter()
            .map(|slot| AttributeSummary {
                name: slot.name.clone(),
                ty: slot.ty.to_string(),
                offset: slot.offset,
                inherited_from: inherited_from(self.attribute_table.entry(&slot.name).map(|e| &e.origin)),
            })
            .collect();

        let vtab = self
            .vtable
            .slots()
            .iter()
            .enumerate()
            .map(|(index, slot)| SlotSummary {
                index,
                name: slot.name.clone(),
                signature: slot.signature.to_string(),
                pointer: slot.pointer.to_string(),
                inherited_from: inherited_from(self.vtab_type.entry(&slot.name).map(|e| &e.origin)),
            })
            .collect();

        TypeSummary {
            name: self.name.clone(),
            bases: self.bases.iter().map(|b| b.name().to_string()).collect(),
            instance_size: self.layout.instance_size,
            attributes,
            vtab,
        }
    }
}

fn inherited_from(origin: Option<&Origin>) -> Option<String> {
    match origin {
        Some(Origin::Inherited { base }) => Some(base.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSummary {
    pub index: usize,
    pub name: String,
    pub signature: String,
    pub pointer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
}

/// Printable description of a compiled type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSummary {
    pub name: String,
    pub bases: Vec<String>,
    pub instance_size: usize,
    pub attributes: Vec<AttributeSummary>,
    pub vtab: Vec<SlotSummary>,
}

impl std::fmt::Display for TypeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "class {}({}) [{} bytes]", self.name, self.bases.join(", "), self.instance_size)?;
        for attr in &self.attributes {
            write!(f, "  +{:<4} {}: {}", attr.offset, attr.name, attr.ty)?;
            match &attr.inherited_from {
                Some(base) => writeln!(f, "  (from {})", base)?,
                None => writeln!(f)?,
            }
        }
        for slot in &self.vtab {
            write!(f, "  [{}] {} {} -> {}", slot.index, slot.name, slot.signature, slot.pointer)?;
            match &slot.inherited_from {
                Some(base) => writeln!(f, "  (from {})", base)?,
                None => writeln!(f)?,
            }
        }
        Ok(())
    }
}

/// Default factory: assembles an [`ExtensionType`] from the compiled parts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutTypeFactory;

impl NativeTypeFactory for LayoutTypeFactory {
    fn create_native_type(&self, spec: NativeTypeSpec) -> Result<ExtensionType> {
        debug!(
            class = %spec.name,
            attributes = spec.attribute_table.len(),
            slots = spec.vtab.len(),
            compiled = spec.compiled.len(),
            "Creating native type"
        );

        Ok(ExtensionType {
            name: spec.name,
            py_class: spec.py_class,
            bases: spec.bases,
            members: spec.members,
            symtab: spec.symtab,
            methods: spec.methods,
            attribute_table: spec.attribute_table,
            vtab_type: spec.vtab_type,
            layout: spec.layout,
            descriptors: spec.descriptors,
            compiled: spec.compiled,
            vtable: spec.vtab,
        })
    }
}
