//! Class declarations read from a parsed module

use std::sync::Arc;

use rustpython_parser::ast::{Expr, Mod, ModModule, Ranged, Stmt, StmtClassDef, StmtFunctionDef};
use tracing::{debug, trace};

use crate::errors::SourceLocation;
use crate::exttypes::pyclass::{BaseClass, ClassDict, ClassMember, Param, PyClass, PyFunction};
use crate::exttypes::signatures::MethodKind;
use crate::frontend::annotations::{type_from_annotation, type_from_value};
use crate::frontend::location::LineIndex;

/// A top-level class statement, before its bases are resolved.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub base_names: Vec<String>,
    pub members: ClassDict,
    pub location: SourceLocation,
    /// Decorated with `@jit`
    pub is_jit: bool,
}

impl ClassDecl {
    pub fn into_py_class(self, bases: Vec<BaseClass>) -> PyClass {
        PyClass {
            name: self.name,
            bases,
            members: self.members,
            location: self.location,
        }
    }
}

/// Last component of a dotted name or call target (`typthon.jit(...)` -> `jit`).
fn decorator_name(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Name(name) => Some(name.id.as_str()),
        Expr::Attribute(attr) => Some(attr.attr.as_str()),
        Expr::Call(call) => decorator_name(&call.func),
        _ => None,
    }
}

fn has_decorator(decorators: &[Expr], name: &str) -> bool {
    decorators.iter().any(|d| decorator_name(d) == Some(name))
}

fn source_text<'s, T: Ranged>(source: &'s str, node: &T) -> &'s str {
    let range = node.range();
    source
        .get(range.start().to_usize()..range.end().to_usize())
        .unwrap_or("")
}

pub fn read_function(def: &StmtFunctionDef, index: &Arc<LineIndex>) -> PyFunction {
    let kind = if has_decorator(&def.decorator_list, "staticmethod") {
        MethodKind::Static
    } else if has_decorator(&def.decorator_list, "classmethod") {
        MethodKind::Class
    } else {
        MethodKind::Instance
    };

    let args = &def.args;
    let params = args
        .posonlyargs
        .iter()
        .chain(args.args.iter())
        .map(|arg| Param::new(arg.def.arg.to_string(), arg.def.annotation.as_deref().map(type_from_annotation)))
        .collect();

    PyFunction {
        name: def.name.to_string(),
        params,
        returns: def.returns.as_deref().map(type_from_annotation),
        kind,
        is_abstract: has_decorator(&def.decorator_list, "abstractmethod"),
        has_variadics: args.vararg.is_some() || args.kwarg.is_some() || !args.kwonlyargs.is_empty(),
        location: index.location(def),
        def: Some(Arc::new(def.clone())),
        lines: Some(index.clone()),
    }
}

fn read_class(class: &StmtClassDef, source: &str, index: &Arc<LineIndex>) -> ClassDecl {
    let mut members = ClassDict::new();

    for stmt in &class.body {
        match stmt {
            Stmt::AnnAssign(ann) => {
                if let Expr::Name(target) = &*ann.target {
                    members.insert(target.id.to_string(), ClassMember::AttributeType(type_from_annotation(&ann.annotation)));
                }
            }
            Stmt::FunctionDef(def) => {
                let func = read_function(def, index);
                members.insert(func.name.clone(), ClassMember::Function(Arc::new(func)));
            }
            Stmt::Assign(assign) => {
                let declared = type_from_value(&assign.value);
                for target in &assign.targets {
                    if let Expr::Name(name) = target {
                        let member = match &declared {
                            Some(ty) => ClassMember::AttributeType(ty.clone()),
                            None => ClassMember::PyValue(source_text(source, &*assign.value).to_string()),
                        };
                        members.insert(name.id.to_string(), member);
                    }
                }
            }
            Stmt::Expr(expr) if members.is_empty() => {
                members.insert("__doc__", ClassMember::PyValue(source_text(source, &*expr.value).to_string()));
            }
            other => {
                trace!(class = %class.name, location = %index.location(other), "Ignoring class body statement");
            }
        }
    }

    let base_names = class
        .bases
        .iter()
        .map(|base| match base {
            Expr::Name(name) => name.id.to_string(),
            Expr::Attribute(attr) => attr.attr.to_string(),
            other => source_text(source, other).to_string(),
        })
        .collect();

    ClassDecl {
        name: class.name.to_string(),
        base_names,
        members,
        location: index.location(class),
        is_jit: has_decorator(&class.decorator_list, "jit"),
    }
}

/// Every top-level class of `module`, in source order.
pub fn read_classes(module: &Mod, source: &str) -> Vec<ClassDecl> {
    let index = Arc::new(LineIndex::new(source));
    let Mod::Module(ModModule { body, .. }) = module else {
        return Vec::new();
    };

    let classes: Vec<ClassDecl> = body
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::ClassDef(class) => Some(read_class(class, source, &index)),
            _ => None,
        })
        .collect();

    debug!(classes = classes.len(), "Read class declarations");
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Type;
    use crate::frontend::parser::parse_module;

    const SOURCE: &str = r#"
import typthon

@typthon.jit
class Point(object):
    """A point."""
    x: float
    y: double
    scale = 2
    weight = float64

    def __init__(self, x: float, y: float) -> None:
        self.x = x
        self.y = y

    @staticmethod
    def origin():
        return Point(0.0, 0.0)

    def bad(self, *args):
        pass

class Plain:
    pass
"#;

    fn classes() -> Vec<ClassDecl> {
        let module = parse_module(SOURCE, "point.py").unwrap();
        read_classes(&module, SOURCE)
    }

    #[test]
    fn test_reads_members_in_order() {
        let classes = classes();
        assert_eq!(classes.len(), 2);
        let point = &classes[0];
        assert!(point.is_jit);
        assert!(!classes[1].is_jit);
        assert_eq!(point.base_names, vec!["object".to_string()]);
        assert_eq!(
            point.members.keys().collect::<Vec<_>>(),
            vec!["__doc__", "x", "y", "scale", "weight", "__init__", "origin", "bad"]
        );
        assert!(matches!(point.members.get("y"), Some(ClassMember::AttributeType(Type::Float))));
        assert!(matches!(point.members.get("scale"), Some(ClassMember::PyValue(v)) if v == "2"));
        assert!(matches!(point.members.get("weight"), Some(ClassMember::AttributeType(Type::Float))));
        assert!(point.location.is_known());
    }

    #[test]
    fn test_reads_function_shape() {
        let classes = classes();
        let Some(ClassMember::Function(init)) = classes[0].members.get("__init__") else {
            panic!("missing __init__");
        };
        assert_eq!(init.params.len(), 3);
        assert_eq!(init.params[1].annotation, Some(Type::Float));
        assert_eq!(init.returns, Some(Type::None));
        assert_eq!(init.kind, MethodKind::Instance);
        assert!(init.def.is_some());

        let Some(ClassMember::Function(origin)) = classes[0].members.get("origin") else {
            panic!("missing origin");
        };
        assert_eq!(origin.kind, MethodKind::Static);

        let Some(ClassMember::Function(bad)) = classes[0].members.get("bad") else {
            panic!("missing bad");
        };
        assert!(bad.has_variadics);
    }
}
