//! Boundaries to the type-inference engine, native code generator and
//! native type factory
//!
//! The extension compiler only sequences these collaborators. It never looks
//! inside a [`FuncEnv`] and never interprets [`CompileFlags`].

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SourceLocation};
use crate::exttypes::attributes::{AttributeDescriptor, AttributeLayout};
use crate::exttypes::exttype::{Symtab, Variable};
use crate::exttypes::extension::ExtensionType;
use crate::exttypes::pyclass::{BaseClass, ClassDict, PyClass};
use crate::exttypes::signatures::{ExtMethodType, Method};
use crate::exttypes::tables::{AttributeTable, OrderedMap, TableState, VTabType};
use crate::exttypes::vtab::VTable;

/// Entry point of a compiled method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NativeFnPtr(pub u64);

impl fmt::Display for NativeFnPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#014x}", self.0)
    }
}

/// A single compilation flag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Int(i) => write!(f, "{}", i),
            FlagValue::Float(x) => write!(f, "{}", x),
            FlagValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Flat flag set forwarded verbatim to the type-inference engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompileFlags(BTreeMap<String, FlagValue>);

impl CompileFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: FlagValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: FlagValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.0.get(name)
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.0.get(name) {
            Some(FlagValue::Bool(b)) => *b,
            _ => default,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlagValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Opaque per-method artifact produced by type inference.
#[derive(Clone)]
pub struct FuncEnv {
    /// Fully resolved signature
    pub signature: ExtMethodType,
    artifact: Arc<dyn Any + Send + Sync>,
}

impl FuncEnv {
    pub fn new(signature: ExtMethodType, artifact: impl Any + Send + Sync) -> Self {
        Self { signature, artifact: Arc::new(artifact) }
    }

    pub fn artifact<T: Any>(&self) -> Option<&T> {
        self.artifact.downcast_ref::<T>()
    }
}

impl fmt::Debug for FuncEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncEnv").field("signature", &self.signature).finish_non_exhaustive()
    }
}

/// Attribute access granted to a method body during inference.
#[derive(Debug)]
pub enum AttributeScope<'a> {
    /// `__init__` may introduce and widen attributes
    Define(&'a mut Symtab),
    /// Every other method sees a fixed attribute set
    Read(&'a Symtab),
}

impl<'a> AttributeScope<'a> {
    pub fn get(&self, name: &str) -> Option<&Variable> {
        match self {
            AttributeScope::Define(symtab) => symtab.get(name),
            AttributeScope::Read(symtab) => symtab.get(name),
        }
    }

    pub fn can_define(&self) -> bool {
        matches!(self, AttributeScope::Define(_))
    }

    /// Mutable access to the symbol table, only while defining.
    pub fn symtab_mut(&mut self) -> Option<&mut Symtab> {
        match self {
            AttributeScope::Define(symtab) => Some(symtab),
            AttributeScope::Read(_) => None,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let symtab: &Symtab = match self {
            AttributeScope::Define(symtab) => symtab,
            AttributeScope::Read(symtab) => symtab,
        };
        symtab.keys().map(str::to_string).collect()
    }
}

/// Method signatures visible to a method body: own methods, then inherited slots.
#[derive(Debug, Clone, Copy)]
pub struct MethodView<'a> {
    pub own: &'a OrderedMap<ExtMethodType>,
    pub inherited: &'a TableState<ExtMethodType>,
}

impl<'a> MethodView<'a> {
    pub fn get(&self, name: &str) -> Option<&'a ExtMethodType> {
        self.own.get(name).or_else(|| self.inherited.get(name))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.own.keys().map(str::to_string).collect();
        for name in self.inherited.entries().keys() {
            if !self.own.contains_key(name) {
                names.push(name.to_string());
            }
        }
        names
    }
}

pub struct InferRequest<'a> {
    pub class: &'a str,
    pub method: &'a Method,
    /// Declared (or inherited) signature the body is checked against
    pub declared: &'a ExtMethodType,
    pub flags: &'a CompileFlags,
    pub attributes: AttributeScope<'a>,
    pub methods: MethodView<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceFailure {
    pub message: String,
    pub location: Option<SourceLocation>,
    pub suggestions: Vec<String>,
}

impl InferenceFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), location: None, suggestions: Vec::new() }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

pub trait TypeInferer: Send + Sync {
    fn infer(&self, request: InferRequest<'_>) -> std::result::Result<FuncEnv, InferenceFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledMethod {
    pub name: String,
    pub symbol: String,
    pub pointer: NativeFnPtr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGenFailure {
    pub message: String,
}

impl CodeGenFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

pub trait NativeCompiler: Send + Sync {
    fn compile(
        &self,
        class: &str,
        method: &Method,
        env: &FuncEnv,
    ) -> std::result::Result<CompiledMethod, CodeGenFailure>;
}

/// Everything the native type factory needs to assemble the finished type.
#[derive(Debug)]
pub struct NativeTypeSpec {
    pub name: String,
    pub py_class: Arc<PyClass>,
    pub bases: Vec<BaseClass>,
    pub members: ClassDict,
    pub symtab: Symtab,
    pub methods: OrderedMap<ExtMethodType>,
    pub attribute_table: Arc<AttributeTable>,
    pub vtab_type: Arc<VTabType>,
    pub layout: AttributeLayout,
    pub descriptors: Vec<AttributeDescriptor>,
    pub compiled: Vec<CompiledMethod>,
    pub method_pointers: HashMap<String, NativeFnPtr>,
    pub vtab: VTable,
}

pub trait NativeTypeFactory: Send + Sync {
    fn create_native_type(&self, spec: NativeTypeSpec) -> Result<ExtensionType>;
}

/// The three collaborators an extension compiler drives.
#[derive(Clone)]
pub struct CompilerBackend {
    pub inferer: Arc<dyn TypeInferer>,
    pub codegen: Arc<dyn NativeCompiler>,
    pub factory: Arc<dyn NativeTypeFactory>,
}

impl CompilerBackend {
    pub fn new(
        inferer: Arc<dyn TypeInferer>,
        codegen: Arc<dyn NativeCompiler>,
        factory: Arc<dyn NativeTypeFactory>,
    ) -> Self {
        Self { inferer, codegen, factory }
    }

    /// Reference inference engine, symbolic code generator and layout factory.
    pub fn reference() -> Self {
        Self::new(
            Arc::new(crate::analysis::MethodInferer::new()),
            Arc::new(crate::backend::SymbolicCodegen::new()),
            Arc::new(crate::exttypes::extension::LayoutTypeFactory),
        )
    }
}

impl fmt::Debug for CompilerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerBackend").finish_non_exhaustive()
    }
}
