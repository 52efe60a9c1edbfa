//! Extension type compiler
//!
//! Drives one class through `infer -> validate -> finalize_tables -> compile`.
//! `__init__` is always type-inferred before the attribute table is built and
//! before any other method is inferred: attribute types are discovered from
//! the constructor, and every other method reads them as fixed facts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::errors::{CompileError, LayoutErrorKind, Result, TableKind};
use crate::exttypes::attributes::{AttributeBuilder, AttributeDescriptor};
use crate::exttypes::extension::ExtensionType;
use crate::exttypes::exttype::ExtType;
use crate::exttypes::inheritance::{process_class_attribute_types, AttributesInheriter};
use crate::exttypes::pipeline::{
    AttributeScope, CompileFlags, CompiledMethod, CompilerBackend, FuncEnv, InferRequest, MethodView,
    NativeFnPtr, NativeTypeSpec,
};
use crate::exttypes::pyclass::{ClassDict, ClassMember, PyClass, PY_CLASS_KEY};
use crate::exttypes::signatures::{Method, MethodSignatureProcessor, INIT, NEW};
use crate::exttypes::validators::ValidatorSet;
use crate::exttypes::vtab::{VTabBuilder, VTable};
use crate::infrastructure::metrics::{CompileMetrics, Timer, METHODS_COMPILED};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Created,
    Inferred,
    Validated,
    Finalized,
    /// A stage failed; the partial type was discarded
    Failed,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::Inferred => "inferred",
            Stage::Validated => "validated",
            Stage::Finalized => "finalized",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct ExtensionCompiler {
    py_class: Arc<PyClass>,
    class_dict: ClassDict,
    ext_type: ExtType,
    flags: CompileFlags,
    backend: CompilerBackend,
    validators: Arc<ValidatorSet>,
    metrics: Option<Arc<CompileMetrics>>,

    inheriter: AttributesInheriter,
    attrbuilder: AttributeBuilder,
    vtabbuilder: VTabBuilder,

    methods: Vec<Method>,
    /// Filled as each method is inferred; reused by `compile`
    func_envs: HashMap<Method, FuncEnv>,
    stage: Stage,
}

impl ExtensionCompiler {
    pub fn new(py_class: Arc<PyClass>, backend: CompilerBackend) -> Self {
        Self {
            class_dict: py_class.members.clone(),
            ext_type: ExtType::new(py_class.clone()),
            py_class,
            flags: CompileFlags::new(),
            backend,
            validators: Arc::new(ValidatorSet::default()),
            metrics: None,
            inheriter: AttributesInheriter::new(),
            attrbuilder: AttributeBuilder::new(),
            vtabbuilder: VTabBuilder::new(),
            methods: Vec::new(),
            func_envs: HashMap::new(),
            stage: Stage::Created,
        }
    }

    pub fn with_flags(mut self, flags: CompileFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_validators(mut self, validators: Arc<ValidatorSet>) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CompileMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run every stage and return the finished type.
    pub fn run(mut self) -> Result<ExtensionType> {
        self.infer()?;
        self.validate()?;
        self.finalize_tables()?;
        self.compile()
    }

    pub fn name(&self) -> &str {
        &self.ext_type.name
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn ext_type(&self) -> &ExtType {
        &self.ext_type
    }

    pub(crate) fn ext_type_mut(&mut self) -> &mut ExtType {
        &mut self.ext_type
    }

    pub fn class_dict(&self) -> &ClassDict {
        &self.class_dict
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn func_env(&self, method: &Method) -> Option<&FuncEnv> {
        self.func_envs.get(method)
    }

    /// Drop everything built so far. No later stage can run.
    fn discard(&mut self, error: &CompileError) {
        debug!(class = %self.ext_type.name, stage = %self.stage, error = %error, "Discarding partial type");
        self.ext_type = ExtType::new(self.py_class.clone());
        self.class_dict = self.py_class.members.clone();
        self.methods.clear();
        self.func_envs.clear();
        self.stage = Stage::Failed;
    }

    fn expect_stage(&self, expected: Stage) -> Result<()> {
        if self.stage == expected {
            return Ok(());
        }
        Err(CompileError::Layout {
            class: self.ext_type.name.clone(),
            kind: LayoutErrorKind::OutOfOrder {
                expected: expected.name(),
                found: self.stage.name(),
            },
        })
    }

    //------------------------------------------------------------------------
    // Type inference
    //------------------------------------------------------------------------

    #[instrument(skip(self), fields(class = %self.ext_type.name))]
    pub fn infer(&mut self) -> Result<()> {
        self.expect_stage(Stage::Created)?;
        let metrics = self.metrics.clone();
        let _timer = metrics.as_deref().map(|m| Timer::new(m, "infer"));

        if let Err(e) = self.run_inference() {
            self.discard(&e);
            return Err(e);
        }
        self.stage = Stage::Inferred;
        Ok(())
    }

    fn run_inference(&mut self) -> Result<()> {
        self.infer_attributes()?;
        self.process_method_signatures()?;
        self.type_infer_init_method()?;
        self.attrbuilder.build_attributes(&mut self.ext_type)?;
        self.type_infer_methods()?;
        self.vtabbuilder.build_vtab_type(&mut self.ext_type)?;

        debug!(
            attributes = self.ext_type.attribute_table.len(),
            slots = self.ext_type.vtab_type.len(),
            "Inference complete"
        );
        Ok(())
    }

    fn infer_attributes(&mut self) -> Result<()> {
        self.inheriter.inherit(&mut self.ext_type)?;
        process_class_attribute_types(&mut self.ext_type, &self.class_dict);
        Ok(())
    }

    /// Resolve every function to a [`Method`], record its signature on the
    /// ext type and replace the raw function in the class dict.
    fn process_method_signatures(&mut self) -> Result<()> {
        let methods = MethodSignatureProcessor::new(
            &self.class_dict,
            &self.ext_type,
            &self.validators.method,
        )
        .get_method_signatures()?;

        let mut installed = Vec::with_capacity(methods.len());
        for mut method in methods {
            method.signature = self.ext_type.add_method(&method.name, method.signature.clone())?;
            self.class_dict.insert(method.name.clone(), ClassMember::Method(method.clone()));
            installed.push(method);
        }

        self.methods = installed;
        Ok(())
    }

    fn type_infer_init_method(&mut self) -> Result<()> {
        let Some(init) = self.methods.iter().find(|m| m.name == INIT).cloned() else {
            debug!(class = %self.ext_type.name, "No constructor to infer");
            return Ok(());
        };
        self.type_infer_method(&init)
    }

    fn type_infer_methods(&mut self) -> Result<()> {
        let methods: Vec<Method> = self
            .methods
            .iter()
            .filter(|m| m.name != INIT && m.name != NEW)
            .cloned()
            .collect();

        for method in &methods {
            self.type_infer_method(method)?;
        }
        Ok(())
    }

    fn type_infer_method(&mut self, method: &Method) -> Result<()> {
        let declared = self
            .ext_type
            .methods
            .get(&method.name)
            .cloned()
            .unwrap_or_else(|| method.signature.clone());

        let ExtType { name, symtab, methods, vtab_type, .. } = &mut self.ext_type;
        let attributes = if method.name == INIT {
            AttributeScope::Define(symtab)
        } else {
            AttributeScope::Read(symtab)
        };

        let request = InferRequest {
            class: name.as_str(),
            method,
            declared: &declared,
            flags: &self.flags,
            attributes,
            methods: MethodView { own: methods, inherited: vtab_type },
        };

        let env = self.backend.inferer.infer(request).map_err(|failure| {
            warn!(class = %self.ext_type.name, method = %method.name, "Type inference failed");
            CompileError::TypeInference {
                class: self.ext_type.name.clone(),
                method: method.name.clone(),
                location: failure.location.unwrap_or_else(|| method.location().clone()),
                message: failure.message,
                suggestions: failure.suggestions,
            }
        })?;

        let resolved = self.ext_type.add_method(&method.name, env.signature.clone())?;
        debug!(method = %method.name, signature = %resolved, "Inferred method");

        let mut method = method.clone();
        method.signature = resolved;
        self.class_dict.insert(method.name.clone(), ClassMember::Method(method.clone()));
        if let Some(slot) = self.methods.iter_mut().find(|m| m.name == method.name) {
            *slot = method.clone();
        }
        self.func_envs.insert(method, env);
        Ok(())
    }

    //------------------------------------------------------------------------
    // Validate
    //------------------------------------------------------------------------

    /// Run every extension-type validator over the inferred type.
    #[instrument(skip(self), fields(class = %self.ext_type.name))]
    pub fn validate(&mut self) -> Result<()> {
        self.expect_stage(Stage::Inferred)?;
        let metrics = self.metrics.clone();
        let _timer = metrics.as_deref().map(|m| Timer::new(m, "validate"));
        if let Err(e) = self.validators.validate_exttype(&self.ext_type) {
            self.discard(&e);
            return Err(e);
        }
        self.stage = Stage::Validated;
        Ok(())
    }

    //------------------------------------------------------------------------
    // Finalize tables
    //------------------------------------------------------------------------

    /// Fix attribute offsets and vtab slots. No structural change is
    /// accepted afterwards.
    pub fn finalize_tables(&mut self) -> Result<()> {
        self.expect_stage(Stage::Validated)?;
        self.attrbuilder.finalize(&mut self.ext_type);
        self.vtabbuilder.finalize(&mut self.ext_type);
        debug!(class = %self.ext_type.name, "Tables finalized");
        self.stage = Stage::Finalized;
        Ok(())
    }

    //------------------------------------------------------------------------
    // Compilation
    //------------------------------------------------------------------------

    /// Compile every method from its inference artifact, populate the vtab
    /// and hand everything to the native type factory.
    #[instrument(skip(self), fields(class = %self.ext_type.name))]
    pub fn compile(mut self) -> Result<ExtensionType> {
        self.expect_stage(Stage::Finalized)?;
        let metrics = self.metrics.clone();
        let _timer = metrics.as_deref().map(|m| Timer::new(m, "compile"));

        self.class_dict.insert(PY_CLASS_KEY, ClassMember::PyClass(self.py_class.clone()));

        let compiled = self.compile_methods()?;
        if let Some(metrics) = &metrics {
            metrics.add(METHODS_COMPILED, compiled.len() as u64);
        }

        let method_pointers = self
            .vtabbuilder
            .resolve_pointers(&self.ext_type, compiled.iter().map(|c| (c.name.clone(), c.pointer)));
        let vtab = self.vtabbuilder.build_vtab(&self.ext_type, &method_pointers)?;
        let descriptors = self.attrbuilder.build_descriptors(&self.ext_type, &mut self.class_dict)?;

        self.build_extension_type(compiled, method_pointers, vtab, descriptors)
    }

    fn compile_methods(&self) -> Result<Vec<CompiledMethod>> {
        let mut compiled = Vec::with_capacity(self.methods.len());
        for method in &self.methods {
            let env = self.func_envs.get(method).ok_or_else(|| CompileError::CodeGen {
                class: self.ext_type.name.clone(),
                method: method.name.clone(),
                message: "method was never type-inferred".to_string(),
            })?;

            let result = self
                .backend
                .codegen
                .compile(&self.ext_type.name, method, env)
                .map_err(|failure| CompileError::CodeGen {
                    class: self.ext_type.name.clone(),
                    method: method.name.clone(),
                    message: failure.message,
                })?;

            debug!(method = %method.name, pointer = %result.pointer, "Compiled method");
            compiled.push(result);
        }
        Ok(compiled)
    }

    fn build_extension_type(
        self,
        compiled: Vec<CompiledMethod>,
        method_pointers: HashMap<String, NativeFnPtr>,
        vtab: VTable,
        descriptors: Vec<AttributeDescriptor>,
    ) -> Result<ExtensionType> {
        let ExtType { name, symtab, methods, attribute_table, vtab_type, layout, .. } = self.ext_type;

        let not_finalized = |table| CompileError::Layout {
            class: name.clone(),
            kind: LayoutErrorKind::NotFinalized { table },
        };
        let attribute_table = attribute_table
            .finalized()
            .cloned()
            .ok_or_else(|| not_finalized(TableKind::Attributes))?;
        let vtab_type = vtab_type.finalized().cloned().ok_or_else(|| not_finalized(TableKind::Methods))?;
        let layout = layout.ok_or_else(|| not_finalized(TableKind::Attributes))?;

        let spec = NativeTypeSpec {
            name: name.clone(),
            py_class: self.py_class.clone(),
            bases: self.py_class.bases.clone(),
            members: self.class_dict,
            symtab,
            methods,
            attribute_table,
            vtab_type,
            layout,
            descriptors,
            compiled,
            method_pointers,
            vtab,
        };

        let ty = self.backend.factory.create_native_type(spec)?;
        info!(class = %name, "Compiled extension type");
        Ok(ty)
    }
}

impl fmt::Debug for ExtensionCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionCompiler")
            .field("class", &self.ext_type.name)
            .field("stage", &self.stage)
            .field("methods", &self.methods.iter().map(|m| &m.name).collect::<Vec<_>>())
            .finish()
    }
}
