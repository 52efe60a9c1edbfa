//! Pluggable checks over methods and extension types
//!
//! Validators never stop at the first problem: the compiler runs every
//! validator in a set and reports all failures together.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::Type;
use crate::errors::{CompileError, Result, ValidationFailure};
use crate::exttypes::exttype::ExtType;
use crate::exttypes::signatures::{Method, MethodKind, INIT};

pub type ValidationResult = std::result::Result<(), ValidationFailure>;

pub trait MethodValidator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, method: &Method, ext_type: &ExtType) -> ValidationResult;
}

pub trait ExtTypeValidator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, ext_type: &ExtType) -> ValidationResult;
}

/// Signature arity must match the function's parameters.
pub struct ArgcountValidator;

impl MethodValidator for ArgcountValidator {
    fn name(&self) -> &'static str {
        "argcount"
    }

    fn validate(&self, method: &Method, _ext_type: &ExtType) -> ValidationResult {
        let func = &method.func;
        if func.has_variadics {
            return Err(ValidationFailure::new(
                self.name(),
                &method.name,
                "variadic and keyword-only parameters are not supported",
            ));
        }

        match func.kind {
            MethodKind::Instance | MethodKind::Class if func.params.is_empty() => {
                let receiver = if func.kind == MethodKind::Instance { "self" } else { "cls" };
                return Err(ValidationFailure::new(
                    self.name(),
                    &method.name,
                    format!("{} takes no '{}' parameter", func.kind, receiver),
                ));
            }
            _ => {}
        }

        let expected = func.explicit_params().len();
        let found = method.signature.args.len();
        if expected != found {
            return Err(ValidationFailure::new(
                self.name(),
                &method.name,
                format!("expected {} argument type(s), got {}", expected, found),
            ));
        }
        Ok(())
    }
}

/// `__init__` must be an instance method returning `None`.
pub struct InitValidator;

impl MethodValidator for InitValidator {
    fn name(&self) -> &'static str {
        "init"
    }

    fn validate(&self, method: &Method, _ext_type: &ExtType) -> ValidationResult {
        if method.name != INIT {
            return Ok(());
        }
        if method.signature.kind != MethodKind::Instance {
            return Err(ValidationFailure::new(
                self.name(),
                &method.name,
                format!("__init__ cannot be a {}", method.signature.kind),
            ));
        }
        match &method.signature.return_type {
            None | Some(Type::None) => Ok(()),
            Some(other) => Err(ValidationFailure::new(
                self.name(),
                &method.name,
                format!("__init__ must return None, not {}", other),
            )),
        }
    }
}

/// Attributes and methods share one namespace.
pub struct NameCollisionValidator;

impl ExtTypeValidator for NameCollisionValidator {
    fn name(&self) -> &'static str {
        "name-collision"
    }

    fn validate(&self, ext_type: &ExtType) -> ValidationResult {
        let methods: HashSet<&str> = ext_type
            .methods
            .keys()
            .chain(ext_type.vtab_type.entries().keys())
            .collect();

        let collisions: Vec<&str> = ext_type
            .attribute_table
            .entries()
            .keys()
            .filter(|name| methods.contains(name))
            .collect();

        if collisions.is_empty() {
            return Ok(());
        }
        Err(ValidationFailure::new(
            self.name(),
            &ext_type.name,
            format!("attribute(s) collide with method names: {}", collisions.join(", ")),
        ))
    }
}

/// A concrete class must override every inherited abstract method.
///
/// Classes that declare abstract methods themselves are abstract and exempt.
pub struct AbstractMethodValidator;

impl ExtTypeValidator for AbstractMethodValidator {
    fn name(&self) -> &'static str {
        "abstract-method"
    }

    fn validate(&self, ext_type: &ExtType) -> ValidationResult {
        if ext_type.methods.values().any(|sig| sig.is_abstract) {
            debug!(class = %ext_type.name, "Abstract class, skipping override check");
            return Ok(());
        }

        let missing = ext_type.abstract_methods();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ValidationFailure::new(
            self.name(),
            &ext_type.name,
            format!("abstract method(s) without a concrete override: {}", missing.join(", ")),
        ))
    }
}

/// Redeclaring an inherited attribute must keep its type.
pub struct AttributeTypeValidator;

impl ExtTypeValidator for AttributeTypeValidator {
    fn name(&self) -> &'static str {
        "attribute-type"
    }

    fn validate(&self, ext_type: &ExtType) -> ValidationResult {
        let mut changed = Vec::new();
        for name in ext_type.own_attributes() {
            let Some(own) = ext_type.attribute_table.get(name) else {
                continue;
            };
            for base in &ext_type.bases {
                if let Some(inherited) = base.attribute_table().get(name) {
                    if inherited != own {
                        changed.push(format!("{} ({} in {}, {} here)", name, inherited, base.name(), own));
                    }
                }
            }
        }

        if changed.is_empty() {
            return Ok(());
        }
        Err(ValidationFailure::new(
            self.name(),
            &ext_type.name,
            format!("inherited attribute type changed: {}", changed.join(", ")),
        ))
    }
}

fn default_true() -> bool {
    true
}

/// Which optional validators run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub name_collisions: bool,

    #[serde(default = "default_true")]
    pub abstract_methods: bool,

    /// Reject attributes that change an inherited attribute's type
    #[serde(default)]
    pub attribute_types: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            name_collisions: true,
            abstract_methods: true,
            attribute_types: false,
        }
    }
}

/// Ordered method and extension-type validators.
pub struct ValidatorSet {
    pub method: Vec<Box<dyn MethodValidator>>,
    pub exttype: Vec<Box<dyn ExtTypeValidator>>,
}

impl ValidatorSet {
    pub fn empty() -> Self {
        Self { method: Vec::new(), exttype: Vec::new() }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        let mut set = Self::empty();
        set.method.push(Box::new(ArgcountValidator));
        set.method.push(Box::new(InitValidator));
        if config.name_collisions {
            set.exttype.push(Box::new(NameCollisionValidator));
        }
        if config.abstract_methods {
            set.exttype.push(Box::new(AbstractMethodValidator));
        }
        if config.attribute_types {
            set.exttype.push(Box::new(AttributeTypeValidator));
        }
        set
    }

    pub fn with_method_validator(mut self, validator: impl MethodValidator + 'static) -> Self {
        self.method.push(Box::new(validator));
        self
    }

    pub fn with_exttype_validator(mut self, validator: impl ExtTypeValidator + 'static) -> Self {
        self.exttype.push(Box::new(validator));
        self
    }

    /// Run every extension-type validator; fail with all collected failures.
    pub fn validate_exttype(&self, ext_type: &ExtType) -> Result<()> {
        let failures: Vec<ValidationFailure> = self
            .exttype
            .iter()
            .filter_map(|validator| validator.validate(ext_type).err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CompileError::Validation {
                class: ext_type.name.clone(),
                failures,
            })
        }
    }
}

impl Default for ValidatorSet {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorSet")
            .field("method", &self.method.iter().map(|v| v.name()).collect::<Vec<_>>())
            .field("exttype", &self.exttype.iter().map(|v| v.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exttypes::pyclass::{PyClass, PyFunction};
    use crate::exttypes::signatures::ExtMethodType;
    use std::sync::Arc;

    fn method(func: PyFunction, signature: ExtMethodType) -> Method {
        Method {
            name: func.name.clone(),
            func: Arc::new(func),
            signature,
            declared: true,
        }
    }

    fn ext_type() -> ExtType {
        ExtType::new(Arc::new(PyClass::new("Point")))
    }

    #[test]
    fn test_argcount_checks_receiver_and_arity() {
        let ty = ext_type();
        let no_self = method(PyFunction::new("norm", MethodKind::Instance), ExtMethodType::new([], None));
        assert!(ArgcountValidator.validate(&no_self, &ty).is_err());

        let arity = method(
            PyFunction::new("scale", MethodKind::Instance).with_param("self", None),
            ExtMethodType::new([Type::Float], None),
        );
        let failure = ArgcountValidator.validate(&arity, &ty).unwrap_err();
        assert!(failure.message.contains("expected 0"));

        let stat = method(
            PyFunction::new("origin", MethodKind::Static),
            ExtMethodType::new([], None).with_kind(MethodKind::Static),
        );
        assert!(ArgcountValidator.validate(&stat, &ty).is_ok());
    }

    #[test]
    fn test_init_must_return_none() {
        let ty = ext_type();
        let init = method(
            PyFunction::new("__init__", MethodKind::Instance).with_param("self", None),
            ExtMethodType::new([], Some(Type::Int)).constructor(),
        );
        assert!(InitValidator.validate(&init, &ty).is_err());

        let ok = method(
            PyFunction::new("__init__", MethodKind::Instance).with_param("self", None),
            ExtMethodType::new([], Some(Type::None)).constructor(),
        );
        assert!(InitValidator.validate(&ok, &ty).is_ok());
    }

    #[test]
    fn test_all_exttype_failures_are_collected() {
        let mut ty = ext_type();
        ty.add_attribute("norm", Type::Float).unwrap();
        ty.add_method("norm", ExtMethodType::new([], Some(Type::Float))).unwrap();
        if let Some(builder) = ty.vtab_type.builder_mut() {
            builder.insert_own("area", ExtMethodType::new([], Some(Type::Float)).with_abstract(true));
        }

        let set = ValidatorSet::from_config(&ValidationConfig::default());
        match set.validate_exttype(&ty) {
            Err(CompileError::Validation { failures, .. }) => {
                let names: Vec<_> = failures.iter().map(|f| f.validator).collect();
                assert_eq!(names, vec!["name-collision", "abstract-method"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_config_toggles_optional_validators() {
        let config = ValidationConfig {
            name_collisions: false,
            abstract_methods: true,
            attribute_types: true,
        };
        let set = ValidatorSet::from_config(&config);
        let names: Vec<_> = set.exttype.iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["abstract-method", "attribute-type"]);
        assert_eq!(set.method.len(), 2);
    }
}
