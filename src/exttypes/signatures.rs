//! Method signatures
//!
//! Every function in the class body is resolved to a [`Method`] carrying an
//! [`ExtMethodType`] before any type inference runs. The signature is the
//! declared one (annotations), the inherited one (an un-annotated override)
//! or a permissive default; inference later fills in the return type.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::core::Type;
use crate::errors::{CompileError, Result, SourceLocation, ValidationFailure};
use crate::exttypes::exttype::ExtType;
use crate::exttypes::pyclass::{ClassDict, ClassMember, PyFunction};
use crate::exttypes::validators::MethodValidator;

/// Name of the constructor; type-inferred first because it defines attributes.
pub const INIT: &str = "__init__";
/// Allocator hook; never inferred or compiled.
pub const NEW: &str = "__new__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Instance,
    Class,
    Static,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Instance => write!(f, "instance method"),
            MethodKind::Class => write!(f, "classmethod"),
            MethodKind::Static => write!(f, "staticmethod"),
        }
    }
}

/// Native signature of an extension method. `args` excludes the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtMethodType {
    pub args: SmallVec<[Type; 4]>,
    /// `None` until type inference resolves it
    pub return_type: Option<Type>,
    pub kind: MethodKind,
    pub is_constructor: bool,
    pub is_abstract: bool,
}

impl ExtMethodType {
    pub fn new(args: impl IntoIterator<Item = Type>, return_type: Option<Type>) -> Self {
        Self {
            args: args.into_iter().collect(),
            return_type,
            kind: MethodKind::Instance,
            is_constructor: false,
            is_abstract: false,
        }
    }

    pub fn with_kind(mut self, kind: MethodKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn constructor(mut self) -> Self {
        self.is_constructor = true;
        self
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.return_type.is_some()
    }

    /// Function type as seen through an instance (receiver already bound).
    pub fn function_type(&self) -> Type {
        Type::Function(
            self.args.to_vec(),
            Box::new(self.return_type.clone().unwrap_or(Type::Any)),
        )
    }

    /// Reconcile this signature with an existing one of the same name.
    ///
    /// Argument lists and kinds must match exactly. A missing return type
    /// on either side is taken from the other; two known return types must
    /// be equal. Abstractness follows `self`.
    pub fn reconcile(&self, existing: &ExtMethodType) -> std::result::Result<ExtMethodType, String> {
        if self.kind != existing.kind {
            return Err(format!("cannot override {} with {}", existing.kind, self.kind));
        }
        if self.args != existing.args {
            return Err(format!(
                "argument types ({}) do not match existing signature ({})",
                join_types(&self.args),
                join_types(&existing.args)
            ));
        }
        let return_type = match (&self.return_type, &existing.return_type) {
            (Some(new), Some(old)) if new != old => {
                return Err(format!("return type {} does not match existing return type {}", new, old));
            }
            (Some(new), _) => Some(new.clone()),
            (None, old) => old.clone(),
        };
        Ok(ExtMethodType {
            return_type,
            ..self.clone()
        })
    }
}

fn join_types(types: &[Type]) -> String {
    types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for ExtMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MethodKind::Static => write!(f, "static ")?,
            MethodKind::Class => write!(f, "class ")?,
            MethodKind::Instance => {}
        }
        write!(f, "({}) -> ", join_types(&self.args))?;
        match &self.return_type {
            Some(ret) => write!(f, "{}", ret),
            None => write!(f, "?"),
        }
    }
}

/// A class-body function together with its current signature.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub func: Arc<PyFunction>,
    pub signature: ExtMethodType,
    /// Signature came from annotations rather than inheritance or defaults
    pub declared: bool,
}

impl Method {
    pub fn location(&self) -> &SourceLocation {
        &self.func.location
    }

    pub fn is_constructor(&self) -> bool {
        self.signature.is_constructor
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Method {}

impl std::hash::Hash for Method {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Signature spelled out by the function's annotations, if any.
pub fn declared_signature(func: &PyFunction) -> Option<ExtMethodType> {
    if !func.is_annotated() {
        return None;
    }
    let args = func
        .explicit_params()
        .iter()
        .map(|p| p.annotation.clone().unwrap_or(Type::Any));
    let mut signature = ExtMethodType::new(args, func.returns.clone())
        .with_kind(func.kind)
        .with_abstract(func.is_abstract);
    signature.is_constructor = func.name == INIT;
    Some(signature)
}

/// Resolves class-body functions to [`Method`]s and validates them.
pub struct MethodSignatureProcessor<'a> {
    class_dict: &'a ClassDict,
    ext_type: &'a ExtType,
    validators: &'a [Box<dyn MethodValidator>],
}

impl<'a> MethodSignatureProcessor<'a> {
    pub fn new(
        class_dict: &'a ClassDict,
        ext_type: &'a ExtType,
        validators: &'a [Box<dyn MethodValidator>],
    ) -> Self {
        Self { class_dict, ext_type, validators }
    }

    /// Build one [`Method`] per compiled function, in definition order.
    ///
    /// All validators run over all methods; any failure aborts with a single
    /// `Validation` error listing every failure.
    pub fn get_method_signatures(&self) -> Result<Vec<Method>> {
        let mut methods = Vec::new();
        for (name, member) in self.class_dict.iter() {
            let ClassMember::Function(func) = member else {
                continue;
            };
            if name == NEW {
                debug!(class = %self.ext_type.name, "Leaving allocator hook as a Python-level member");
                continue;
            }
            methods.push(self.make_method(name, func.clone()));
        }

        let mut failures: Vec<ValidationFailure> = Vec::new();
        for method in &methods {
            for validator in self.validators {
                if let Err(failure) = validator.validate(method, self.ext_type) {
                    trace!(validator = validator.name(), method = %method.name, "Method rejected");
                    failures.push(failure);
                }
            }
        }

        if !failures.is_empty() {
            return Err(CompileError::Validation {
                class: self.ext_type.name.clone(),
                failures,
            });
        }

        Ok(methods)
    }

    fn make_method(&self, name: &str, func: Arc<PyFunction>) -> Method {
        if let Some(signature) = declared_signature(&func) {
            return Method { name: name.to_string(), func, signature, declared: true };
        }

        let inherited = self
            .ext_type
            .vtab_type()
            .get(name)
            .filter(|sig| !sig.is_constructor && name != INIT)
            // A different arity cannot adopt; the override check rejects it
            .filter(|sig| sig.args.len() == func.explicit_params().len());

        let signature = match inherited {
            Some(sig) => {
                debug!(class = %self.ext_type.name, method = name, signature = %sig, "Adopting inherited signature");
                ExtMethodType {
                    kind: func.kind,
                    is_abstract: func.is_abstract,
                    ..sig.clone()
                }
            }
            None => {
                let args = func.explicit_params().iter().map(|_| Type::Any);
                let mut sig = ExtMethodType::new(args, None)
                    .with_kind(func.kind)
                    .with_abstract(func.is_abstract);
                sig.is_constructor = name == INIT;
                sig
            }
        };

        Method { name: name.to_string(), func, signature, declared: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_signature_from_annotations() {
        let func = PyFunction::new("scale", MethodKind::Instance)
            .with_param("self", None)
            .with_param("factor", Some(Type::Float))
            .with_param("times", None)
            .with_returns(Type::None);
        let sig = declared_signature(&func).unwrap();
        assert_eq!(sig.args.as_slice(), &[Type::Float, Type::Any]);
        assert_eq!(sig.return_type, Some(Type::None));
        assert!(!sig.is_constructor);
    }

    #[test]
    fn test_unannotated_function_has_no_declaration() {
        let func = PyFunction::new("norm", MethodKind::Instance).with_param("self", None);
        assert!(declared_signature(&func).is_none());
    }

    #[test]
    fn test_reconcile_patches_unknown_return() {
        let inherited = ExtMethodType::new([Type::Int], Some(Type::Float));
        let override_sig = ExtMethodType::new([Type::Int], None);
        let merged = override_sig.reconcile(&inherited).unwrap();
        assert_eq!(merged.return_type, Some(Type::Float));

        let resolved = ExtMethodType::new([Type::Int], Some(Type::Float));
        let declared = ExtMethodType::new([Type::Int], None);
        assert_eq!(resolved.reconcile(&declared).unwrap().return_type, Some(Type::Float));
    }

    #[test]
    fn test_reconcile_rejects_conflicts() {
        let inherited = ExtMethodType::new([Type::Int], Some(Type::Float));
        assert!(ExtMethodType::new([Type::Float], Some(Type::Float)).reconcile(&inherited).is_err());
        assert!(ExtMethodType::new([Type::Int], Some(Type::Int)).reconcile(&inherited).is_err());
        let stat = ExtMethodType::new([Type::Int], Some(Type::Float)).with_kind(MethodKind::Static);
        assert!(stat.reconcile(&inherited).is_err());
    }

    #[test]
    fn test_display() {
        let sig = ExtMethodType::new([Type::Float, Type::Int], None).with_kind(MethodKind::Static);
        assert_eq!(sig.to_string(), "static (float, int) -> ?");
        assert_eq!(ExtMethodType::new([], Some(Type::Float)).to_string(), "() -> float");
    }
}
