use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use typthon_ext::errors::CompileError;
use typthon_ext::exttypes::{CompilerBackend, TypeRegistry};
use typthon_ext::frontend::config::{Config, CONFIG_FILE};
use typthon_ext::infrastructure::metrics::{CompileMetrics, CLASSES_COMPILED, CLASSES_FAILED};
use typthon_ext::infrastructure::parallel::ReportSummary;
use typthon_ext::infrastructure::ModuleCompiler;

const VEHICLES: &str = r#"
class Helper:
    pass

@jit
class Vehicle:
    def __init__(self, wheels: int):
        self.wheels = wheels
        self.speed = 0.0

    def accelerate(self, dv: float):
        self.speed = self.speed + dv

@jit
class Car(Vehicle):
    def __init__(self):
        self.wheels = 4
        self.speed = 0.0
        self.doors = 4

@jit
class Truck(Vehicle):
    def __init__(self, load: float):
        self.wheels = 6
        self.speed = 0.0
        self.load = load

    def accelerate(self, dv: float):
        self.speed = self.speed + dv / 2
"#;

#[test]
fn test_compile_file_reports_in_source_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vehicles.py");
    fs::write(&path, VEHICLES).unwrap();

    let registry = TypeRegistry::new();
    let metrics = Arc::new(CompileMetrics::new());
    let report = ModuleCompiler::with_registry(CompilerBackend::reference(), &registry)
        .with_metrics(metrics.clone())
        .compile_file(&path)
        .unwrap();

    assert!(report.is_ok());
    let names: Vec<&str> = report.classes.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Vehicle", "Car", "Truck"]);
    assert_eq!(registry.names(), vec!["Car", "Truck", "Vehicle"]);
    assert!(!registry.contains("Helper"));

    assert_eq!(metrics.get_counter(CLASSES_COMPILED), 3);
    assert_eq!(metrics.get_counter(CLASSES_FAILED), 0);
    assert_eq!(metrics.get_timing_stats("infer").map(|s| s.count), Some(3));
    assert_eq!(metrics.get_timing_stats("module").map(|s| s.count), Some(1));
}

#[test]
fn test_parallel_and_sequential_agree() {
    let parallel = ModuleCompiler::with_registry(CompilerBackend::reference(), &TypeRegistry::new())
        .compile_source(VEHICLES, "vehicles.py".as_ref())
        .unwrap()
        .summaries();
    let sequential = ModuleCompiler::with_registry(CompilerBackend::reference(), &TypeRegistry::new())
        .with_parallel(false)
        .compile_source(VEHICLES, "vehicles.py".as_ref())
        .unwrap()
        .summaries();

    assert_eq!(parallel, sequential);
    let truck = &parallel[2];
    assert_eq!(truck.attributes.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(), vec!["wheels", "speed", "load"]);
    assert_eq!(truck.vtab[0].inherited_from, None);
    let car = &parallel[1];
    assert_eq!(car.vtab[0].inherited_from.as_deref(), Some("Vehicle"));
}

#[test]
fn test_parse_errors_fail_the_module() {
    let err = ModuleCompiler::with_registry(CompilerBackend::reference(), &TypeRegistry::new())
        .compile_source("@jit\nclass :\n", "broken.py".as_ref())
        .unwrap_err();
    assert!(matches!(err, CompileError::Parse(_)));
}

#[test]
fn test_json_summary_shape() {
    let report = ModuleCompiler::with_registry(CompilerBackend::reference(), &TypeRegistry::new())
        .compile_source(VEHICLES, "vehicles.py".as_ref())
        .unwrap();
    let json = serde_json::to_value(ReportSummary::from(&report)).unwrap();

    assert_eq!(json["path"], "vehicles.py");
    assert_eq!(json["types"][0]["name"], "Vehicle");
    assert_eq!(json["types"][0]["instance_size"], 40);
    assert_eq!(json["types"][0]["attributes"][1]["type"], "float");
    assert!(json["errors"].as_array().unwrap().is_empty());
}

#[test]
fn test_config_discovered_from_parent_directory() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE),
        "[compile]\nparallel = false\n\n[errors]\nmax_errors = 5\n",
    )
    .unwrap();
    let nested = dir.path().join("pkg").join("sub");
    fs::create_dir_all(&nested).unwrap();

    let found = Config::find(&nested).unwrap();
    assert_eq!(found, dir.path().join(CONFIG_FILE));

    let config = Config::load(&found).unwrap();
    assert!(!config.compile.parallel);
    assert_eq!(config.errors.max_errors, 5);
    assert!(config.validation.abstract_methods);
}

#[test]
fn test_config_round_trips_through_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE);

    let mut config = Config::default();
    config.paths.exclude.push("**/generated/**".to_string());
    config.save(&path).unwrap();

    assert_eq!(Config::load(&path).unwrap(), config);
    assert!(!config.should_compile("src/generated/shapes.py".as_ref()));
}
