//! Module-level compilation driver
//!
//! Compiles every `@jit` class of a module. Classes are ordered by their
//! in-module inheritance edges; each dependency layer is compiled on the
//! rayon pool once all of its bases are done.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::errors::{CompileError, Result};
use crate::exttypes::compiler::ExtensionCompiler;
use crate::exttypes::extension::{ExtensionType, TypeSummary};
use crate::exttypes::pipeline::{CompileFlags, CompilerBackend};
use crate::exttypes::pyclass::BaseClass;
use crate::exttypes::registry::TypeRegistry;
use crate::exttypes::validators::ValidatorSet;
use crate::frontend::classes::{read_classes, ClassDecl};
use crate::frontend::parser::parse_module;
use crate::infrastructure::metrics::{CompileMetrics, CLASSES_COMPILED, CLASSES_FAILED};

type Outcome = Result<Arc<ExtensionType>>;

/// Result of compiling one class.
#[derive(Debug, Clone)]
pub struct ClassOutcome {
    pub name: String,
    pub result: Outcome,
}

/// Per-class outcomes of a module, in source order.
#[derive(Debug, Clone)]
pub struct ModuleReport {
    pub path: PathBuf,
    pub classes: Vec<ClassOutcome>,
    pub duration_ms: u64,
}

impl ModuleReport {
    pub fn compiled(&self) -> impl Iterator<Item = &Arc<ExtensionType>> {
        self.classes.iter().filter_map(|c| c.result.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = &CompileError> {
        self.classes.iter().filter_map(|c| c.result.as_ref().err())
    }

    pub fn get(&self, name: &str) -> Option<&Outcome> {
        self.classes.iter().find(|c| c.name == name).map(|c| &c.result)
    }

    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn summaries(&self) -> Vec<TypeSummary> {
        self.compiled().map(|ty| ty.summary()).collect()
    }
}

/// JSON shape of a report.
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub path: String,
    pub types: Vec<TypeSummary>,
    pub errors: Vec<ErrorSummary>,
}

#[derive(Debug, Serialize)]
pub struct ErrorSummary {
    pub kind: &'static str,
    pub class: Option<String>,
    pub message: String,
}

impl From<&ModuleReport> for ReportSummary {
    fn from(report: &ModuleReport) -> Self {
        Self {
            path: report.path.display().to_string(),
            types: report.summaries(),
            errors: report
                .errors()
                .map(|e| ErrorSummary {
                    kind: e.kind(),
                    class: e.class_name().map(str::to_string),
                    message: e.to_string(),
                })
                .collect(),
        }
    }
}

pub struct ModuleCompiler<'r> {
    backend: CompilerBackend,
    flags: CompileFlags,
    validators: Arc<ValidatorSet>,
    metrics: Arc<CompileMetrics>,
    registry: &'r TypeRegistry,
    parallel: bool,
}

impl ModuleCompiler<'static> {
    /// Reference backend, default validators, process-wide registry.
    pub fn new() -> Self {
        Self::with_registry(CompilerBackend::reference(), TypeRegistry::global())
    }
}

impl<'r> ModuleCompiler<'r> {
    pub fn with_registry(backend: CompilerBackend, registry: &'r TypeRegistry) -> Self {
        Self {
            backend,
            flags: CompileFlags::new(),
            validators: Arc::new(ValidatorSet::default()),
            metrics: Arc::new(CompileMetrics::new()),
            registry,
            parallel: true,
        }
    }

    pub fn with_flags(mut self, flags: CompileFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = Arc::new(validators);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CompileMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn metrics(&self) -> &Arc<CompileMetrics> {
        &self.metrics
    }

    pub fn compile_file(&self, path: &Path) -> Result<ModuleReport> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CompileError::Parse(format!("{}: {}", path.display(), e)))?;
        self.compile_source(&source, path)
    }

    #[instrument(skip(self, source, path), fields(path = %path.display()))]
    pub fn compile_source(&self, source: &str, path: &Path) -> Result<ModuleReport> {
        let start = Instant::now();
        let module = parse_module(source, &path.to_string_lossy())?;
        let decls: Vec<ClassDecl> = read_classes(&module, source)
            .into_iter()
            .filter(|decl| decl.is_jit)
            .collect();

        let results = self.compile_classes(&decls);

        let classes = decls
            .iter()
            .zip(results)
            .map(|(decl, result)| ClassOutcome { name: decl.name.clone(), result })
            .collect();

        let duration = start.elapsed();
        self.metrics.record_timing("module", duration);

        let report = ModuleReport {
            path: path.to_path_buf(),
            classes,
            duration_ms: duration.as_millis() as u64,
        };
        info!(
            compiled = report.compiled().count(),
            failed = report.errors().count(),
            "Compiled module"
        );
        Ok(report)
    }

    /// Compile `decls` in dependency order; results are in `decls` order.
    pub fn compile_classes(&self, decls: &[ClassDecl]) -> Vec<Outcome> {
        let graph = dependency_graph(decls);
        let mut results: Vec<Option<Outcome>> = vec![None; decls.len()];
        let mut depth = vec![0usize; decls.len()];

        // Strongly connected components come out derived-first; reversed,
        // every base precedes its subclasses.
        let mut components = tarjan_scc(&graph);
        components.reverse();

        for component in &components {
            let cyclic = component.len() > 1 || graph.contains_edge(component[0], component[0]);
            for &node in component {
                let index = graph[node];
                if cyclic {
                    results[index] = Some(Err(cycle_error(&decls[index], decls)));
                    continue;
                }
                depth[index] = graph
                    .neighbors_directed(node, Direction::Incoming)
                    .map(|base| depth[graph[base]] + 1)
                    .max()
                    .unwrap_or(0);
            }
        }

        let max_depth = depth.iter().copied().max().unwrap_or(0);
        for layer_depth in 0..=max_depth {
            let layer: Vec<usize> = (0..decls.len())
                .filter(|&i| results[i].is_none() && depth[i] == layer_depth)
                .collect();
            if layer.is_empty() {
                continue;
            }
            debug!(depth = layer_depth, classes = layer.len(), "Compiling layer");

            let done = &results;
            let compile = |&index: &usize| (index, self.compile_one(&decls[index], decls, done));
            let outcomes: Vec<(usize, Outcome)> = if self.parallel {
                layer.par_iter().map(compile).collect()
            } else {
                layer.iter().map(compile).collect()
            };

            for (index, outcome) in outcomes {
                results[index] = Some(outcome);
            }
        }

        results
            .into_iter()
            .zip(decls)
            .map(|(result, decl)| {
                result.unwrap_or_else(|| {
                    Err(CompileError::Base {
                        class: decl.name.clone(),
                        base: decl.base_names.join(", "),
                        message: "bases could not be ordered".to_string(),
                    })
                })
            })
            .collect()
    }

    fn compile_one(&self, decl: &ClassDecl, decls: &[ClassDecl], done: &[Option<Outcome>]) -> Outcome {
        let bases = self.resolve_bases(decl, decls, done)?;
        let class = Arc::new(decl.clone().into_py_class(bases));

        let compiled = ExtensionCompiler::new(class, self.backend.clone())
            .with_flags(self.flags.clone())
            .with_validators(self.validators.clone())
            .with_metrics(self.metrics.clone())
            .run();

        match compiled {
            Ok(ty) => {
                let ty = Arc::new(ty);
                let registered = self.registry.register(ty.clone());
                if !Arc::ptr_eq(&registered, &ty) {
                    warn!(class = %decl.name, "A type of this name is already registered; keeping the existing entry");
                }
                self.metrics.increment(CLASSES_COMPILED);
                Ok(ty)
            }
            Err(e) => {
                warn!(class = %decl.name, error = %e, "Class failed to compile");
                self.metrics.increment(CLASSES_FAILED);
                Err(e)
            }
        }
    }

    /// Same-module class, then registry, then a plain Python base.
    fn resolve_bases(&self, decl: &ClassDecl, decls: &[ClassDecl], done: &[Option<Outcome>]) -> Result<Vec<BaseClass>> {
        decl.base_names
            .iter()
            .map(|name| {
                if let Some(index) = decls.iter().position(|d| &d.name == name) {
                    return match &done[index] {
                        Some(Ok(ty)) => Ok(BaseClass::Extension(ty.clone())),
                        Some(Err(e)) => Err(CompileError::Base {
                            class: decl.name.clone(),
                            base: name.clone(),
                            message: format!("base failed to compile ({})", e.kind()),
                        }),
                        None => Err(CompileError::Base {
                            class: decl.name.clone(),
                            base: name.clone(),
                            message: "base has not been compiled".to_string(),
                        }),
                    };
                }
                Ok(match self.registry.get(name) {
                    Some(ty) => BaseClass::Extension(ty),
                    None => BaseClass::Python(name.clone()),
                })
            })
            .collect()
    }
}

impl Default for ModuleCompiler<'static> {
    fn default() -> Self {
        Self::new()
    }
}

/// Edges run base -> subclass; node weights index into `decls`.
fn dependency_graph(decls: &[ClassDecl]) -> DiGraph<usize, ()> {
    let mut graph = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..decls.len()).map(|i| graph.add_node(i)).collect();

    for (i, decl) in decls.iter().enumerate() {
        for base in &decl.base_names {
            if let Some(j) = decls.iter().position(|d| &d.name == base) {
                graph.update_edge(nodes[j], nodes[i], ());
            }
        }
    }

    graph
}

fn cycle_error(decl: &ClassDecl, decls: &[ClassDecl]) -> CompileError {
    let base = decl
        .base_names
        .iter()
        .find(|name| decls.iter().any(|d| &d.name == *name))
        .cloned()
        .unwrap_or_default();
    CompileError::Base {
        class: decl.name.clone(),
        base,
        message: "inheritance cycle".to_string(),
    }
}
