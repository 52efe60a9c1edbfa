use rustpython_parser::ast::{Constant, Expr, Operator};

use crate::core::Type;

/// Convert an annotation expression to a [`Type`].
///
/// Unknown names are treated as nominal class types. Native numeric aliases
/// (`double`, `int64`, ...) map onto the primitive they name.
pub fn type_from_annotation(expr: &Expr) -> Type {
    match expr {
        Expr::Name(name_expr) => type_from_name(name_expr.id.as_str()),

        Expr::Constant(constant) => match &constant.value {
            Constant::None => Type::None,
            Constant::Str(name) => type_from_name(name),
            _ => Type::Any,
        },

        Expr::Attribute(attr) => match (&*attr.value, attr.attr.as_str()) {
            (Expr::Name(module), name) if module.id.as_str() == "typing" => type_from_name(name),
            (_, name) => Type::Class(name.to_string()),
        },

        Expr::Subscript(subscript) => {
            let Expr::Name(name_expr) = &*subscript.value else {
                return Type::Any;
            };
            let slice = &*subscript.slice;
            match name_expr.id.as_str() {
                "list" | "List" => Type::List(Box::new(type_from_annotation(slice))),
                "set" | "Set" => Type::Set(Box::new(type_from_annotation(slice))),
                "dict" | "Dict" => match slice {
                    Expr::Tuple(tuple_expr) if tuple_expr.elts.len() == 2 => Type::Dict(
                        Box::new(type_from_annotation(&tuple_expr.elts[0])),
                        Box::new(type_from_annotation(&tuple_expr.elts[1])),
                    ),
                    _ => Type::Dict(Box::new(Type::Any), Box::new(Type::Any)),
                },
                "tuple" | "Tuple" => match slice {
                    Expr::Tuple(tuple_expr) => {
                        Type::Tuple(tuple_expr.elts.iter().map(type_from_annotation).collect())
                    }
                    other => Type::Tuple(vec![type_from_annotation(other)]),
                },
                "Optional" => Type::union(vec![type_from_annotation(slice), Type::None]),
                "Union" => match slice {
                    Expr::Tuple(tuple_expr) => {
                        Type::union(tuple_expr.elts.iter().map(type_from_annotation).collect())
                    }
                    other => type_from_annotation(other),
                },
                _ => Type::Class(name_expr.id.to_string()),
            }
        }

        Expr::BinOp(binop) if matches!(binop.op, Operator::BitOr) => Type::union(vec![
            type_from_annotation(&binop.left),
            type_from_annotation(&binop.right),
        ]),

        _ => Type::Any,
    }
}

/// The type named by a class-level value such as `attr = double`.
///
/// Only builtin type names, their native aliases and subscripted builtin
/// containers qualify; any other value stays a plain Python member.
pub fn type_from_value(expr: &Expr) -> Option<Type> {
    let name = match expr {
        Expr::Name(name_expr) => name_expr.id.as_str(),
        Expr::Subscript(subscript) => match &*subscript.value {
            Expr::Name(name_expr) => name_expr.id.as_str(),
            _ => return None,
        },
        _ => return None,
    };
    match type_from_name(name) {
        Type::Class(_) | Type::Any | Type::None => None,
        _ => Some(type_from_annotation(expr)),
    }
}

fn type_from_name(name: &str) -> Type {
    match name {
        "int" | "int64" | "long" => Type::Int,
        "float" | "double" | "float64" => Type::Float,
        "str" => Type::Str,
        "bool" => Type::Bool,
        "bytes" => Type::Bytes,
        "None" => Type::None,
        "Any" | "object" => Type::Any,
        "list" | "List" => Type::List(Box::new(Type::Any)),
        "dict" | "Dict" => Type::Dict(Box::new(Type::Any), Box::new(Type::Any)),
        "set" | "Set" => Type::Set(Box::new(Type::Any)),
        _ => Type::Class(name.to_string()),
    }
}
