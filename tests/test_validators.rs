use std::path::Path;

use typthon_ext::errors::CompileError;
use typthon_ext::exttypes::{
    CompilerBackend, ExtTypeValidator, ExtType, TypeRegistry, ValidationConfig, ValidatorSet,
};
use typthon_ext::errors::ValidationFailure;
use typthon_ext::infrastructure::{ModuleCompiler, ModuleReport};

fn compile(source: &str, validators: ValidatorSet) -> ModuleReport {
    let registry = TypeRegistry::new();
    ModuleCompiler::with_registry(CompilerBackend::reference(), &registry)
        .with_validators(validators)
        .with_parallel(false)
        .compile_source(source, Path::new("shapes.py"))
        .unwrap()
}

fn failures(report: &ModuleReport, class: &str) -> Vec<(&'static str, String)> {
    match report.get(class) {
        Some(Err(CompileError::Validation { failures, .. })) => {
            failures.iter().map(|f| (f.validator, f.subject.clone())).collect()
        }
        Some(Err(other)) => panic!("unexpected error: {}", other),
        _ => panic!("{} compiled", class),
    }
}

const SHAPES: &str = r#"
@jit
class Shape:
    @abstractmethod
    def area(self) -> float:
        ...

@jit
class Square(Shape):
    def __init__(self, side: float):
        self.side = side

    def area(self) -> float:
        return self.side * self.side

@jit
class Blob(Shape):
    def __init__(self):
        self.mass = 1.0
"#;

#[test]
fn test_abstract_method_must_be_overridden() {
    let report = compile(SHAPES, ValidatorSet::default());
    assert!(matches!(report.get("Shape"), Some(Ok(_))));
    assert!(matches!(report.get("Square"), Some(Ok(_))));
    assert_eq!(failures(&report, "Blob"), vec![("abstract-method", "Blob".to_string())]);
}

#[test]
fn test_abstract_check_can_be_disabled() {
    let config = ValidationConfig { abstract_methods: false, ..Default::default() };
    let report = compile(SHAPES, ValidatorSet::from_config(&config));
    assert!(report.is_ok());
}

#[test]
fn test_method_failures_are_collected() {
    let source = r#"
@jit
class Broken:
    def __init__(self) -> int:
        return 1

    def spread(self, *args):
        pass

    @staticmethod
    def fine(x: int) -> int:
        return x
"#;
    let report = compile(source, ValidatorSet::default());
    let found = failures(&report, "Broken");
    assert_eq!(
        found,
        vec![("init", "__init__".to_string()), ("argcount", "spread".to_string())]
    );
}

#[test]
fn test_inherited_attribute_collides_with_method() {
    let source = r#"
@jit
class Sized:
    size: int

@jit
class Box(Sized):
    def size(self) -> int:
        return 3
"#;
    let report = compile(source, ValidatorSet::default());
    assert!(matches!(report.get("Sized"), Some(Ok(_))));
    assert_eq!(failures(&report, "Box"), vec![("name-collision", "Box".to_string())]);
}

#[test]
fn test_attribute_type_change_is_opt_in() {
    let source = r#"
@jit
class Base:
    weight: int

@jit
class Heavy(Base):
    weight: float
"#;
    let report = compile(source, ValidatorSet::default());
    assert!(report.is_ok());

    let config = ValidationConfig { attribute_types: true, ..Default::default() };
    let report = compile(source, ValidatorSet::from_config(&config));
    assert_eq!(failures(&report, "Heavy"), vec![("attribute-type", "Heavy".to_string())]);
}

fn signature_error(report: &ModuleReport, class: &str) -> (String, String) {
    match report.get(class) {
        Some(Err(CompileError::Signature { method, message, .. })) => (method.clone(), message.clone()),
        Some(Err(other)) => panic!("unexpected error: {}", other),
        _ => panic!("{} compiled", class),
    }
}

#[test]
fn test_override_with_different_argument_types() {
    let source = r#"
@jit
class A:
    def scale(self, k: float):
        pass

@jit
class B(A):
    def scale(self, k: int):
        pass
"#;
    let report = compile(source, ValidatorSet::default());
    assert!(matches!(report.get("A"), Some(Ok(_))));
    let (method, message) = signature_error(&report, "B");
    assert_eq!(method, "scale");
    assert!(message.contains("argument types (int)"), "{}", message);
}

#[test]
fn test_unannotated_override_with_different_arity() {
    let source = r#"
@jit
class A:
    def scale(self, k: float) -> None:
        pass

@jit
class B(A):
    def scale(self, k, j):
        pass

@jit
class C(A):
    def scale(self, k):
        pass
"#;
    let report = compile(source, ValidatorSet::default());
    let (method, _) = signature_error(&report, "B");
    assert_eq!(method, "scale");
    assert_eq!(report.get("B").and_then(|r| r.as_ref().err()).map(|e| e.kind()), Some("SignatureError"));

    // Same arity adopts the inherited signature
    let Some(Ok(c)) = report.get("C") else { panic!("C failed") };
    assert_eq!(c.method_signature("scale").map(|s| s.args.to_vec()), Some(vec![typthon_ext::Type::Float]));
}

/// Rejects classes with more than `limit` attributes.
struct MaxAttributes {
    limit: usize,
}

impl ExtTypeValidator for MaxAttributes {
    fn name(&self) -> &'static str {
        "max-attributes"
    }

    fn validate(&self, ext_type: &ExtType) -> Result<(), ValidationFailure> {
        let count = ext_type.attribute_table().len();
        if count > self.limit {
            return Err(ValidationFailure::new(
                self.name(),
                &ext_type.name,
                format!("{} attributes, at most {} allowed", count, self.limit),
            ));
        }
        Ok(())
    }
}

#[test]
fn test_custom_validators_run_with_builtin_ones() {
    let source = r#"
@jit
class Sized:
    size: int

@jit
class Crate(Sized):
    def __init__(self):
        self.width = 1.0
        self.height = 2.0

    def size(self) -> int:
        return 1
"#;
    let validators = ValidatorSet::default().with_exttype_validator(MaxAttributes { limit: 2 });
    let report = compile(source, validators);
    assert_eq!(
        failures(&report, "Crate"),
        vec![("name-collision", "Crate".to_string()), ("max-attributes", "Crate".to_string())]
    );
}
