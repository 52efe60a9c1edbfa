use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use typthon_ext::analysis::MethodInferer;
use typthon_ext::backend::SymbolicCodegen;
use typthon_ext::errors::CompileError;
use typthon_ext::exttypes::{
    CodeGenFailure, CompileFlags, CompiledMethod, CompilerBackend, ExtensionCompiler, ExtensionType, FlagValue,
    FuncEnv, InferRequest, InferenceFailure, LayoutTypeFactory, Method, NativeCompiler, NativeTypeFactory,
    NativeTypeSpec, TypeInferer, TypeRegistry,
};
use typthon_ext::frontend::{parse_module, read_classes};
use typthon_ext::infrastructure::ModuleCompiler;

#[derive(Debug, Clone, PartialEq)]
struct Call {
    method: String,
    can_define: bool,
    attributes: Vec<String>,
    flags: CompileFlags,
}

/// Delegates to the reference inferer and records every request.
#[derive(Default)]
struct RecordingInferer {
    calls: Mutex<Vec<Call>>,
}

impl TypeInferer for RecordingInferer {
    fn infer(&self, request: InferRequest<'_>) -> Result<FuncEnv, InferenceFailure> {
        self.calls.lock().push(Call {
            method: request.method.name.clone(),
            can_define: request.attributes.can_define(),
            attributes: request.attributes.names(),
            flags: request.flags.clone(),
        });
        MethodInferer::new().infer(request)
    }
}

fn backend(inferer: Arc<RecordingInferer>) -> CompilerBackend {
    CompilerBackend::new(inferer, Arc::new(SymbolicCodegen::new()), Arc::new(LayoutTypeFactory))
}

const SHAPE: &str = r#"
@jit
class Circle:
    def area(self) -> float:
        return 3.14159 * self.radius * self.radius

    def grow(self, by: float):
        self.radius = self.radius + by

    def __init__(self, radius: float):
        self.radius = radius
        self.hits = 0
"#;

fn circle() -> Arc<typthon_ext::PyClass> {
    let module = parse_module(SHAPE, "shape.py").unwrap();
    let decl = read_classes(&module, SHAPE).remove(0);
    Arc::new(decl.into_py_class(Vec::new()))
}

#[test]
fn test_init_is_inferred_first() {
    let inferer = Arc::new(RecordingInferer::default());
    let ty = ExtensionCompiler::new(circle(), backend(inferer.clone())).run().unwrap();

    let calls = inferer.calls.lock();
    let order: Vec<&str> = calls.iter().map(|c| c.method.as_str()).collect();
    assert_eq!(order, vec!["__init__", "area", "grow"]);

    // Only the constructor may define attributes; the others already see them
    assert!(calls[0].can_define);
    assert!(calls[0].attributes.is_empty());
    for call in &calls[1..] {
        assert!(!call.can_define);
        assert_eq!(call.attributes, vec!["radius".to_string(), "hits".to_string()]);
    }

    assert_eq!(ty.attribute_table().names(), vec!["radius", "hits"]);
    assert_eq!(ty.vtable().names(), vec!["area", "grow"]);
}

#[test]
fn test_flags_forwarded_verbatim() {
    let flags = CompileFlags::new()
        .with("numeric_promotion", FlagValue::Bool(true))
        .with("opt_level", FlagValue::Int(3));
    let inferer = Arc::new(RecordingInferer::default());
    ExtensionCompiler::new(circle(), backend(inferer.clone()))
        .with_flags(flags.clone())
        .run()
        .unwrap();

    assert!(inferer.calls.lock().iter().all(|call| call.flags == flags));
}

#[test]
fn test_inference_failure_carries_location() {
    let source = r#"
@jit
class Circle:
    def __init__(self, radius: float):
        self.radius = radius

    def area(self) -> float:
        return self.radius * self.raduis
"#;
    let registry = TypeRegistry::new();
    let report = ModuleCompiler::with_registry(CompilerBackend::reference(), &registry)
        .compile_source(source, Path::new("circle.py"))
        .unwrap();

    match report.get("Circle") {
        Some(Err(CompileError::TypeInference { method, location, suggestions, .. })) => {
            assert_eq!(method, "area");
            assert_eq!(location.line, 8);
            assert_eq!(suggestions, &vec!["Did you mean 'radius'?".to_string()]);
        }
        other => panic!("unexpected outcome: {:?}", other.map(|r| r.is_ok())),
    }
    assert!(!registry.contains("Circle"));
}

#[test]
fn test_promotion_flag_controls_widening() {
    let source = r#"
@jit
class Meter:
    def __init__(self):
        self.value = 0
        self.value = 0.5
"#;
    let registry = TypeRegistry::new();
    let widened = ModuleCompiler::with_registry(CompilerBackend::reference(), &registry)
        .compile_source(source, Path::new("meter.py"))
        .unwrap();
    let Some(Ok(meter)) = widened.get("Meter") else { panic!("Meter failed") };
    assert_eq!(meter.attribute_table().get("value"), Some(&typthon_ext::Type::Float));

    let registry = TypeRegistry::new();
    let strict = ModuleCompiler::with_registry(CompilerBackend::reference(), &registry)
        .with_flags(CompileFlags::new().with("numeric_promotion", FlagValue::Bool(false)))
        .compile_source(source, Path::new("meter.py"))
        .unwrap();
    let Some(Ok(meter)) = strict.get("Meter") else { panic!("Meter failed") };
    assert_eq!(meter.layout().slot("value").map(|s| s.size), Some(8));
    assert!(matches!(meter.attribute_table().get("value"), Some(typthon_ext::Type::Union(_))));
}

/// Refuses to emit code for one method, delegating the rest.
struct RejectingCodegen {
    method: &'static str,
}

impl NativeCompiler for RejectingCodegen {
    fn compile(&self, class: &str, method: &Method, env: &FuncEnv) -> Result<CompiledMethod, CodeGenFailure> {
        if method.name == self.method {
            return Err(CodeGenFailure::new("unsupported construct"));
        }
        SymbolicCodegen::new().compile(class, method, env)
    }
}

#[derive(Default)]
struct CountingFactory {
    calls: AtomicUsize,
}

impl NativeTypeFactory for CountingFactory {
    fn create_native_type(&self, spec: NativeTypeSpec) -> typthon_ext::Result<ExtensionType> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        LayoutTypeFactory.create_native_type(spec)
    }
}

#[test]
fn test_codegen_failure_never_reaches_factory() {
    let factory = Arc::new(CountingFactory::default());
    let backend = CompilerBackend::new(
        Arc::new(MethodInferer::new()),
        Arc::new(RejectingCodegen { method: "grow" }),
        factory.clone(),
    );

    let mut compiler = ExtensionCompiler::new(circle(), backend);
    compiler.infer().unwrap();
    compiler.validate().unwrap();
    compiler.finalize_tables().unwrap();

    let err = compiler.compile().unwrap_err();
    assert_eq!(err.kind(), "CodeGenError");
    match err {
        CompileError::CodeGen { class, method, message } => {
            assert_eq!(class, "Circle");
            assert_eq!(method, "grow");
            assert!(message.contains("unsupported construct"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(factory.calls.load(Ordering::SeqCst), 0);

    let backend = CompilerBackend::new(
        Arc::new(MethodInferer::new()),
        Arc::new(RejectingCodegen { method: "missing" }),
        factory.clone(),
    );
    ExtensionCompiler::new(circle(), backend).run().unwrap();
    assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
}
