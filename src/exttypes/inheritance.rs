//! Attribute and method inheritance
//!
//! Bases are merged as a flat dictionary update in declaration order: a
//! later base overwrites an earlier one, and the class's own declarations
//! (added afterwards) overwrite both. There is no C3 linearization, so a
//! diamond whose branches disagree resolves to whichever base is listed last.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::errors::{CompileError, Result, TableKind};
use crate::exttypes::exttype::{ExtType, Variable};
use crate::exttypes::pyclass::{ClassDict, ClassMember};
use crate::exttypes::tables::{TableBuilder, TableState};

#[derive(Debug, Default, Clone, Copy)]
pub struct AttributesInheriter;

impl AttributesInheriter {
    pub fn new() -> Self {
        Self
    }

    /// Give `ext_type` fresh attribute and method tables built from its bases.
    ///
    /// Inherited attributes are also seeded into the symbol table so method
    /// bodies see them like any other attribute.
    #[instrument(skip(self, ext_type), fields(class = %ext_type.name, bases = ext_type.bases.len()))]
    pub fn inherit(&self, ext_type: &mut ExtType) -> Result<()> {
        if ext_type.attribute_table.is_finalized() {
            return Err(CompileError::frozen(&ext_type.name, TableKind::Attributes, "<bases>"));
        }
        if ext_type.vtab_type.is_finalized() {
            return Err(CompileError::frozen(&ext_type.name, TableKind::Methods, "<bases>"));
        }

        let mut seen = HashSet::new();
        for base in &ext_type.bases {
            if !seen.insert(base.name()) {
                return Err(CompileError::Base {
                    class: ext_type.name.clone(),
                    base: base.name().to_string(),
                    message: "duplicate base class".to_string(),
                });
            }
        }

        let mut attributes = TableBuilder::new(
            ext_type.bases.iter().map(|base| base.attribute_table().clone()).collect(),
        );
        let mut methods = TableBuilder::new(
            ext_type.bases.iter().map(|base| base.vtab_type().clone()).collect(),
        );

        for base in &ext_type.bases {
            attributes.inherit_from(base.name(), base.attribute_table());
            methods.inherit_from(base.name(), base.vtab_type());
        }

        for (name, entry) in attributes.entries().iter() {
            ext_type.symtab.insert(name, Variable::inherited(entry.value.clone()));
        }

        debug!(
            attributes = attributes.entries().len(),
            methods = methods.entries().len(),
            "Inherited tables"
        );

        ext_type.attribute_table = TableState::Building(attributes);
        ext_type.vtab_type = TableState::Building(methods);
        Ok(())
    }
}

/// Fold explicit attribute-type declarations (`x: float`) into the symbol table.
///
/// Declarations are not promotable: inference may only store values
/// assignable to the declared type.
pub fn process_class_attribute_types(ext_type: &mut ExtType, class_dict: &ClassDict) {
    for (name, member) in class_dict.iter() {
        if let ClassMember::AttributeType(ty) = member {
            debug!(class = %ext_type.name, attribute = name, ty = %ty, "Declared attribute");
            ext_type.symtab.insert(name, Variable::declared(ty.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Type;
    use crate::exttypes::exttype::VariableOrigin;
    use crate::exttypes::pyclass::PyClass;
    use std::sync::Arc;

    #[test]
    fn test_no_bases_gives_empty_tables() {
        let mut ext_type = ExtType::new(Arc::new(PyClass::new("Point")));
        AttributesInheriter::new().inherit(&mut ext_type).unwrap();
        assert!(ext_type.attribute_table.is_empty());
        assert!(ext_type.vtab_type.is_empty());
        assert!(ext_type.symtab.is_empty());
    }

    #[test]
    fn test_declarations_are_not_promotable() {
        let class = PyClass::new("Point")
            .with_attribute("x", Type::Float)
            .with_attribute("y", Type::Int);
        let mut ext_type = ExtType::new(Arc::new(class.clone()));
        process_class_attribute_types(&mut ext_type, &class.members);

        let x = ext_type.symtab.get("x").unwrap();
        assert_eq!(x.ty, Type::Float);
        assert!(!x.promotable);
        assert_eq!(x.origin, VariableOrigin::Declared);
        assert_eq!(ext_type.symtab.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_type_valued_class_attribute_is_a_declaration() {
        let source = "class Foo(object):\n    attr = double\n    limit = 10\n";
        let module = crate::frontend::parse_module(source, "foo.py").unwrap();
        let class = crate::frontend::read_classes(&module, source).remove(0).into_py_class(Vec::new());
        let mut ext_type = ExtType::new(Arc::new(class.clone()));
        process_class_attribute_types(&mut ext_type, &class.members);

        let attr = ext_type.symtab.get("attr").unwrap();
        assert_eq!(attr.ty, Type::Float);
        assert!(!attr.promotable);
        assert!(ext_type.symtab.get("limit").is_none());
    }
}
