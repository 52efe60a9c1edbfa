//! Extension type compilation
//!
//! Turns a [`PyClass`] into an [`ExtensionType`]: a fixed native attribute
//! layout plus a virtual method table, built on top of previously compiled
//! extension bases.

pub mod attributes;
pub mod compiler;
pub mod extension;
pub mod exttype;
pub mod inheritance;
pub mod pipeline;
pub mod pyclass;
pub mod registry;
pub mod signatures;
pub mod tables;
pub mod validators;
pub mod vtab;

pub use attributes::{AccessError, AttributeBuilder, AttributeDescriptor, AttributeLayout, ExtInstance, Value};
pub use compiler::{ExtensionCompiler, Stage};
pub use extension::{ExtensionType, LayoutTypeFactory, TypeSummary};
pub use exttype::{ExtType, Symtab, Variable, VariableOrigin};
pub use inheritance::{process_class_attribute_types, AttributesInheriter};
pub use pipeline::{
    AttributeScope, CodeGenFailure, CompileFlags, CompiledMethod, CompilerBackend, FlagValue, FuncEnv,
    InferRequest, InferenceFailure, MethodView, NativeCompiler, NativeFnPtr, NativeTypeFactory,
    NativeTypeSpec, TypeInferer,
};
pub use pyclass::{BaseClass, ClassDict, ClassMember, Param, PyClass, PyFunction, PY_CLASS_KEY};
pub use registry::TypeRegistry;
pub use signatures::{ExtMethodType, Method, MethodKind, MethodSignatureProcessor, INIT, NEW};
pub use tables::{AttributeTable, OrderedMap, Origin, Table, TableBuilder, TableState, VTabType};
pub use validators::{
    AbstractMethodValidator, ArgcountValidator, AttributeTypeValidator, ExtTypeValidator, InitValidator,
    MethodValidator, NameCollisionValidator, ValidationConfig, ValidatorSet,
};
pub use vtab::{VTabBuilder, VTabSlot, VTable};
