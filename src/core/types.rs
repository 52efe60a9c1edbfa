use std::fmt;
use serde::{Serialize, Deserialize};

/// Size in bytes of every reference-typed slot (object pointer).
pub const POINTER_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Any,
    Never,
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,

    // Composite types
    List(Box<Type>),
    Tuple(Vec<Type>),
    Dict(Box<Type>, Box<Type>),
    Set(Box<Type>),

    // Function types: (params) -> return
    Function(Vec<Type>, Box<Type>),

    Union(Vec<Type>),

    // Nominal types (extension types and plain Python classes)
    Class(String),
}

impl Type {
    pub fn is_subtype(&self, other: &Type) -> bool {
        use Type::*;

        match (self, other) {
            (_, Any) => true,
            (Never, _) => true,
            (a, b) if a == b => true,

            // Union handling: A <: B | C if A <: B or A <: C
            (a, Union(types)) => types.iter().any(|t| a.is_subtype(t)),
            (Union(types), b) => types.iter().all(|t| t.is_subtype(b)),

            // Structural subtyping for containers
            (List(a), List(b)) => a.is_subtype(b),
            (Set(a), Set(b)) => a.is_subtype(b),
            (Dict(k1, v1), Dict(k2, v2)) => k1.is_subtype(k2) && v1.is_subtype(v2),

            // Tuple covariance
            (Tuple(a), Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_subtype(y))
            }

            // Function contravariance in params, covariance in return
            (Function(p1, r1), Function(p2, r2)) => {
                p1.len() == p2.len()
                    && p2.iter().zip(p1.iter()).all(|(a, b)| a.is_subtype(b))
                    && r1.is_subtype(r2)
            }

            _ => false,
        }
    }

    /// Whether a value of type `value` may be stored into a slot of this type.
    ///
    /// With `promote_numeric`, `int` values widen into `float` slots.
    pub fn is_assignable_from(&self, value: &Type, promote_numeric: bool) -> bool {
        if value.is_subtype(self) {
            return true;
        }
        promote_numeric && matches!((self, value), (Type::Float, Type::Int) | (Type::Float, Type::Bool))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Bool | Type::Int | Type::Float)
    }

    /// Bytes occupied by a native slot holding this type.
    pub fn native_size(&self) -> usize {
        match self {
            Type::Bool => 1,
            Type::Int | Type::Float => 8,
            _ => POINTER_SIZE,
        }
    }

    /// Alignment of a native slot holding this type.
    pub fn native_align(&self) -> usize {
        match self {
            Type::Bool => 1,
            _ => 8,
        }
    }

    pub fn union(types: Vec<Type>) -> Type {
        let mut simplified = Vec::new();

        // Flatten nested unions
        for ty in types {
            if let Type::Union(inner) = ty {
                simplified.extend(inner);
            } else if ty != Type::Never {
                simplified.push(ty);
            }
        }

        // Remove subtypes
        let mut result: Vec<Type> = Vec::new();
        for ty in simplified {
            if !result.iter().any(|t| ty.is_subtype(t)) {
                result.retain(|t| !t.is_subtype(&ty));
                result.push(ty);
            }
        }

        match result.len() {
            0 => Type::Never,
            1 => result.pop().unwrap_or(Type::Never),
            _ => Type::Union(result),
        }
    }

    /// Join two types, widening `int` and `float` to `float` when promotion is allowed.
    pub fn join(a: Type, b: Type, promote_numeric: bool) -> Type {
        match (&a, &b) {
            _ if a == b => a,
            (Type::Int, Type::Float) | (Type::Float, Type::Int) if promote_numeric => Type::Float,
            _ => Type::union(vec![a, b]),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "Any"),
            Type::Never => write!(f, "Never"),
            Type::None => write!(f, "None"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "str"),
            Type::Bytes => write!(f, "bytes"),
            Type::List(t) => write!(f, "list[{}]", t),
            Type::Tuple(ts) => write!(f, "({})", ts.iter().map(|t| format!("{}", t)).collect::<Vec<_>>().join(", ")),
            Type::Dict(k, v) => write!(f, "dict[{}, {}]", k, v),
            Type::Set(t) => write!(f, "set[{}]", t),
            Type::Function(params, ret) => {
                write!(f, "({}) -> {}",
                    params.iter().map(|t| format!("{}", t)).collect::<Vec<_>>().join(", "),
                    ret)
            }
            Type::Union(ts) => write!(f, "{}", ts.iter().map(|t| format!("{}", t)).collect::<Vec<_>>().join(" | ")),
            Type::Class(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_flattens_and_subsumes() {
        let ty = Type::union(vec![
            Type::Int,
            Type::Union(vec![Type::Str, Type::Int]),
            Type::Never,
        ]);
        assert_eq!(ty, Type::Union(vec![Type::Int, Type::Str]));
        assert_eq!(Type::union(vec![Type::Int, Type::Any]), Type::Any);
        assert_eq!(Type::union(vec![]), Type::Never);
    }

    #[test]
    fn test_numeric_promotion() {
        assert!(Type::Float.is_assignable_from(&Type::Int, true));
        assert!(!Type::Float.is_assignable_from(&Type::Int, false));
        assert!(!Type::Int.is_assignable_from(&Type::Float, true));
        assert_eq!(Type::join(Type::Int, Type::Float, true), Type::Float);
        assert_eq!(
            Type::join(Type::Int, Type::Float, false),
            Type::Union(vec![Type::Int, Type::Float])
        );
    }

    #[test]
    fn test_native_slots() {
        assert_eq!(Type::Bool.native_size(), 1);
        assert_eq!(Type::Float.native_size(), 8);
        assert_eq!(Type::Class("Point".to_string()).native_size(), POINTER_SIZE);
        assert_eq!(Type::List(Box::new(Type::Int)).native_align(), 8);
    }

    #[test]
    fn test_display() {
        let ty = Type::Function(vec![Type::Int, Type::Float], Box::new(Type::None));
        assert_eq!(ty.to_string(), "(int, float) -> None");
        assert_eq!(Type::Dict(Box::new(Type::Str), Box::new(Type::Int)).to_string(), "dict[str, int]");
    }
}
