//! Symbolic code generation
//!
//! Emits no machine code. Each method gets a stable, content-addressed entry
//! point derived from its qualified name and resolved signature, which is
//! enough to assemble and inspect vtables.

use blake3::Hasher;
use tracing::trace;

use crate::exttypes::pipeline::{CodeGenFailure, CompiledMethod, FuncEnv, NativeCompiler, NativeFnPtr};
use crate::exttypes::signatures::Method;

/// Entry points are 16-byte aligned and fit in 48 bits.
const POINTER_MASK: u64 = 0x0000_ffff_ffff_fff0;

#[derive(Debug, Default, Clone, Copy)]
pub struct SymbolicCodegen;

impl SymbolicCodegen {
    pub fn new() -> Self {
        Self
    }

    pub fn symbol(class: &str, method: &str) -> String {
        format!("{}.{}", class, method)
    }

    pub fn entry_point(symbol: &str, signature: &str) -> NativeFnPtr {
        let mut hasher = Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(b":");
        hasher.update(signature.as_bytes());
        let hash = hasher.finalize();

        let mut word = [0u8; 8];
        word.copy_from_slice(&hash.as_bytes()[..8]);
        let pointer = u64::from_le_bytes(word) & POINTER_MASK;
        // Zero is reserved for "no entry"
        NativeFnPtr(if pointer == 0 { 0x10 } else { pointer })
    }
}

impl NativeCompiler for SymbolicCodegen {
    fn compile(&self, class: &str, method: &Method, env: &FuncEnv) -> Result<CompiledMethod, CodeGenFailure> {
        if !env.signature.is_resolved() {
            return Err(CodeGenFailure::new(format!(
                "signature of {}.{} is unresolved: {}",
                class, method.name, env.signature
            )));
        }

        let symbol = Self::symbol(class, &method.name);
        let pointer = Self::entry_point(&symbol, &env.signature.to_string());
        trace!(symbol = %symbol, pointer = %pointer, "Emitted entry point");

        Ok(CompiledMethod { name: method.name.clone(), symbol, pointer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Type;
    use crate::exttypes::pyclass::PyFunction;
    use crate::exttypes::signatures::{ExtMethodType, MethodKind};
    use std::sync::Arc;

    fn method(name: &str, signature: ExtMethodType) -> Method {
        Method {
            name: name.to_string(),
            func: Arc::new(PyFunction::new(name, MethodKind::Instance)),
            signature,
            declared: true,
        }
    }

    #[test]
    fn test_entry_points_are_stable_and_distinct() {
        let sig = ExtMethodType::new([Type::Float], Some(Type::Float));
        let env = FuncEnv::new(sig.clone(), ());
        let codegen = SymbolicCodegen::new();

        let a = codegen.compile("Point", &method("scale", sig.clone()), &env).unwrap();
        let b = codegen.compile("Point", &method("scale", sig.clone()), &env).unwrap();
        let c = codegen.compile("Point3D", &method("scale", sig), &env).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.symbol, "Point.scale");
        assert_ne!(a.pointer, c.pointer);
        assert_ne!(a.pointer.0, 0);
        assert_eq!(a.pointer.0 % 16, 0);
    }

    #[test]
    fn test_unresolved_signature_is_rejected() {
        let sig = ExtMethodType::new([Type::Any], None);
        let env = FuncEnv::new(sig.clone(), ());
        let err = SymbolicCodegen::new()
            .compile("Point", &method("norm", sig), &env)
            .unwrap_err();
        assert!(err.message.contains("Point.norm"));
    }
}
