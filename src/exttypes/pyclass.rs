//! Class descriptors handed to the extension compiler
//!
//! A [`PyClass`] is the dynamically-typed class definition: its name, its
//! direct bases and the members of its body. [`ClassDict`] is the working
//! member mapping the compiler rewrites as it goes (raw functions become
//! resolved [`Method`]s, attributes gain descriptors).

use std::sync::Arc;

use rustpython_parser::ast::StmtFunctionDef;

use crate::core::Type;
use crate::errors::SourceLocation;
use crate::exttypes::attributes::AttributeDescriptor;
use crate::exttypes::extension::ExtensionType;
use crate::exttypes::signatures::{Method, MethodKind};
use crate::exttypes::tables::OrderedMap;
use crate::frontend::location::LineIndex;

/// Name under which the compiled type keeps a reference to its origin class.
pub const PY_CLASS_KEY: &str = "__typthon_py_class__";

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Type>,
}

impl Param {
    pub fn new(name: impl Into<String>, annotation: Option<Type>) -> Self {
        Self { name: name.into(), annotation }
    }
}

/// A function defined in a class body.
#[derive(Debug, Clone)]
pub struct PyFunction {
    pub name: String,
    /// All positional parameters, including `self`/`cls`
    pub params: Vec<Param>,
    pub returns: Option<Type>,
    pub kind: MethodKind,
    pub is_abstract: bool,
    /// `*args`, `**kwargs` or keyword-only parameters present
    pub has_variadics: bool,
    pub location: SourceLocation,
    /// Parsed definition, consumed by the type-inference engine
    pub def: Option<Arc<StmtFunctionDef>>,
    /// Line table of the defining file, for locating errors inside the body
    pub lines: Option<Arc<LineIndex>>,
}

impl PyFunction {
    pub fn new(name: impl Into<String>, kind: MethodKind) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
            kind,
            is_abstract: false,
            has_variadics: false,
            location: SourceLocation::unknown(),
            def: None,
            lines: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, annotation: Option<Type>) -> Self {
        self.params.push(Param::new(name, annotation));
        self
    }

    pub fn with_returns(mut self, returns: Type) -> Self {
        self.returns = Some(returns);
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_def(mut self, def: StmtFunctionDef, lines: Arc<LineIndex>) -> Self {
        self.def = Some(Arc::new(def));
        self.lines = Some(lines);
        self
    }

    pub fn abstract_method(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Parameters after the receiver (`self` / `cls`).
    pub fn explicit_params(&self) -> &[Param] {
        match self.kind {
            MethodKind::Static => &self.params,
            MethodKind::Instance | MethodKind::Class => {
                self.params.get(1..).unwrap_or(&[])
            }
        }
    }

    pub fn is_annotated(&self) -> bool {
        self.returns.is_some() || self.explicit_params().iter().any(|p| p.annotation.is_some())
    }
}

#[derive(Debug, Clone)]
pub enum ClassMember {
    /// Function as written in the class body
    Function(Arc<PyFunction>),
    /// Explicit attribute-type declaration (`x: float`)
    AttributeType(Type),
    /// Function after signature processing
    Method(Method),
    /// Accessor bound to a native attribute slot
    Descriptor(AttributeDescriptor),
    /// Back-reference to the class the type was compiled from
    PyClass(Arc<PyClass>),
    /// Plain Python-level member, kept as source text
    PyValue(String),
}

impl ClassMember {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ClassMember::Function(_) => "function",
            ClassMember::AttributeType(_) => "attribute type",
            ClassMember::Method(_) => "method",
            ClassMember::Descriptor(_) => "descriptor",
            ClassMember::PyClass(_) => "class",
            ClassMember::PyValue(_) => "value",
        }
    }
}

pub type ClassDict = OrderedMap<ClassMember>;

/// Direct base of a class.
#[derive(Debug, Clone)]
pub enum BaseClass {
    /// Previously compiled extension type
    Extension(Arc<ExtensionType>),
    /// Ordinary Python class (e.g. `object`); contributes no native layout
    Python(String),
}

impl BaseClass {
    pub fn name(&self) -> &str {
        match self {
            BaseClass::Extension(ty) => ty.name(),
            BaseClass::Python(name) => name,
        }
    }
}

/// Dynamically-typed class definition.
#[derive(Debug, Clone)]
pub struct PyClass {
    pub name: String,
    pub bases: Vec<BaseClass>,
    pub members: ClassDict,
    pub location: SourceLocation,
}

impl PyClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            members: ClassDict::new(),
            location: SourceLocation::unknown(),
        }
    }

    pub fn with_base(mut self, base: BaseClass) -> Self {
        self.bases.push(base);
        self
    }

    pub fn with_attribute(mut self, name: &str, ty: Type) -> Self {
        self.members.insert(name, ClassMember::AttributeType(ty));
        self
    }

    pub fn with_function(mut self, func: PyFunction) -> Self {
        let name = func.name.clone();
        self.members.insert(name, ClassMember::Function(Arc::new(func)));
        self
    }

    /// Bases that are compiled extension types, in declaration order.
    pub fn extension_bases(&self) -> Vec<Arc<ExtensionType>> {
        self.bases
            .iter()
            .filter_map(|base| match base {
                BaseClass::Extension(ty) => Some(ty.clone()),
                BaseClass::Python(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_params_skip_receiver() {
        let method = PyFunction::new("scale", MethodKind::Instance)
            .with_param("self", None)
            .with_param("factor", Some(Type::Float));
        assert_eq!(method.explicit_params().len(), 1);
        assert!(method.is_annotated());

        let stat = PyFunction::new("origin", MethodKind::Static).with_param("x", None);
        assert_eq!(stat.explicit_params().len(), 1);
        assert!(!stat.is_annotated());

        let bare = PyFunction::new("broken", MethodKind::Instance);
        assert!(bare.explicit_params().is_empty());
    }

    #[test]
    fn test_python_bases_are_not_extension_bases() {
        let class = PyClass::new("Point")
            .with_base(BaseClass::Python("object".to_string()))
            .with_attribute("x", Type::Float);
        assert!(class.extension_bases().is_empty());
        assert_eq!(class.bases[0].name(), "object");
        assert_eq!(class.members.len(), 1);
    }
}
