//! The type under construction

use std::sync::Arc;

use tracing::trace;

use crate::core::Type;
use crate::errors::{CompileError, Result, TableKind};
use crate::exttypes::attributes::AttributeLayout;
use crate::exttypes::extension::ExtensionType;
use crate::exttypes::pyclass::PyClass;
use crate::exttypes::signatures::ExtMethodType;
use crate::exttypes::tables::{AttributeTable, OrderedMap, TableState, VTabType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableOrigin {
    /// Copied from a base class attribute table
    Inherited,
    /// Explicit `name: type` declaration in the class body
    Declared,
    /// Discovered by type inference of `__init__`
    Inferred,
}

/// Symbol-table entry for an instance attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub ty: Type,
    /// Whether later assignments may widen the type (`int` -> `float`)
    pub promotable: bool,
    pub origin: VariableOrigin,
}

impl Variable {
    pub fn declared(ty: Type) -> Self {
        Self { ty, promotable: false, origin: VariableOrigin::Declared }
    }

    pub fn inferred(ty: Type) -> Self {
        Self { ty, promotable: true, origin: VariableOrigin::Inferred }
    }

    pub fn inherited(ty: Type) -> Self {
        Self { ty, promotable: false, origin: VariableOrigin::Inherited }
    }
}

/// Attribute name -> variable, in first-seen order.
pub type Symtab = OrderedMap<Variable>;

/// Extension type being compiled.
///
/// Owned by exactly one [`crate::exttypes::ExtensionCompiler`]. Fields only
/// grow until [`ExtType::finalize_tables`]; afterwards the tables reject
/// every structural change with a `Layout` error.
#[derive(Debug, Clone)]
pub struct ExtType {
    pub name: String,
    pub py_class: Arc<PyClass>,
    /// Compiled direct bases, in declaration order
    pub bases: Vec<Arc<ExtensionType>>,
    pub symtab: Symtab,
    pub attribute_table: TableState<Type>,
    pub vtab_type: TableState<ExtMethodType>,
    /// Signatures of the methods defined by this class
    pub methods: OrderedMap<ExtMethodType>,
    /// Native layout, fixed when the attribute table is finalized
    pub layout: Option<AttributeLayout>,
}

impl ExtType {
    pub fn new(py_class: Arc<PyClass>) -> Self {
        Self {
            name: py_class.name.clone(),
            bases: py_class.extension_bases(),
            py_class,
            symtab: Symtab::new(),
            attribute_table: TableState::empty(),
            vtab_type: TableState::empty(),
            methods: OrderedMap::new(),
            layout: None,
        }
    }

    pub fn attribute_table(&self) -> &TableState<Type> {
        &self.attribute_table
    }

    pub fn vtab_type(&self) -> &TableState<ExtMethodType> {
        &self.vtab_type
    }

    pub fn is_finalized(&self) -> bool {
        self.attribute_table.is_finalized() && self.vtab_type.is_finalized()
    }

    /// Add (or override) an attribute owned by this class.
    pub fn add_attribute(&mut self, name: &str, ty: Type) -> Result<()> {
        let builder = self
            .attribute_table
            .builder_mut()
            .ok_or_else(|| CompileError::frozen(&self.name, TableKind::Attributes, name))?;
        trace!(class = %self.name, attribute = name, ty = %ty, "Adding attribute");
        builder.insert_own(name, ty);
        Ok(())
    }

    /// Record a method signature, checking it against any signature already
    /// known under the same name.
    ///
    /// Known signatures are this class's own earlier declaration, or (for
    /// non-constructors) the inherited vtab entry. Returns the reconciled
    /// signature that was stored.
    pub fn add_method(&mut self, name: &str, signature: ExtMethodType) -> Result<ExtMethodType> {
        if self.vtab_type.is_finalized() {
            return Err(CompileError::frozen(&self.name, TableKind::Methods, name));
        }

        let existing = match self.methods.get(name) {
            Some(own) => Some(own),
            None if !signature.is_constructor => self.vtab_type.get(name),
            None => None,
        };

        let merged = match existing {
            Some(existing) => signature.reconcile(existing).map_err(|message| CompileError::Signature {
                class: self.name.clone(),
                method: name.to_string(),
                message,
            })?,
            None => signature,
        };

        self.methods.insert(name, merged.clone());
        Ok(merged)
    }

    /// Lock both tables. Safe to call more than once.
    pub fn finalize_tables(&mut self) -> (Arc<AttributeTable>, Arc<VTabType>) {
        (self.attribute_table.finalize(), self.vtab_type.finalize())
    }

    /// Names of attributes this class adds or overrides.
    pub fn own_attributes(&self) -> Vec<&str> {
        self.attribute_table
            .entries()
            .iter()
            .filter(|(_, entry)| !entry.is_inherited())
            .map(|(name, _)| name)
            .collect()
    }

    /// Vtab slots whose implementation is still abstract.
    pub fn abstract_methods(&self) -> Vec<&str> {
        self.vtab_type
            .entries()
            .iter()
            .filter(|(_, entry)| entry.value.is_abstract)
            .map(|(name, _)| name)
            .collect()
    }
}
