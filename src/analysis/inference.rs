//! Reference type inference for extension methods
//!
//! A flow-insensitive, single-pass inferer over a method body. It resolves
//! locals, `self.attr` reads and writes (subject to the attribute scope the
//! compiler grants), calls through `self`, and a small table of builtins.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rustpython_parser::ast::{
    Constant, Expr, ExprAttribute, ExprCall, Operator, Ranged, Stmt, UnaryOp,
};
use tracing::{debug, instrument, trace};

use crate::core::Type;
use crate::errors::{find_similar_names, SourceLocation};
use crate::exttypes::exttype::Variable;
use crate::exttypes::pipeline::{
    AttributeScope, FuncEnv, InferRequest, InferenceFailure, MethodView, TypeInferer,
};
use crate::exttypes::signatures::{ExtMethodType, MethodKind};
use crate::frontend::annotations::type_from_annotation;
use crate::frontend::location::LineIndex;

/// Flag controlling `int` -> `float` widening of attributes and return types.
pub const NUMERIC_PROMOTION: &str = "numeric_promotion";

type Infer<T> = std::result::Result<T, InferenceFailure>;

/// Artifact stored in the [`FuncEnv`] for the code generator.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredBody {
    pub locals: BTreeMap<String, Type>,
    pub return_type: Type,
    pub statements: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MethodInferer;

impl MethodInferer {
    pub fn new() -> Self {
        Self
    }
}

impl TypeInferer for MethodInferer {
    #[instrument(skip_all, fields(class = request.class, method = %request.method.name))]
    fn infer(&self, request: InferRequest<'_>) -> Infer<FuncEnv> {
        let InferRequest { class, method, declared, flags, mut attributes, methods } = request;
        let promote = flags.get_bool(NUMERIC_PROMOTION, true);
        let func = &method.func;

        let Some(def) = func.def.as_ref() else {
            trace!("No body, keeping declared signature");
            let signature = ExtMethodType {
                return_type: Some(declared.return_type.clone().unwrap_or(Type::None)),
                ..declared.clone()
            };
            let artifact = InferredBody {
                locals: BTreeMap::new(),
                return_type: signature.return_type.clone().unwrap_or(Type::None),
                statements: 0,
            };
            return Ok(FuncEnv::new(signature, artifact));
        };

        let mut body = BodyInferer {
            class,
            methods,
            attributes: &mut attributes,
            locals: HashMap::new(),
            returns: Vec::new(),
            receiver: None,
            promote,
            lines: func.lines.clone(),
            fallback: func.location.clone(),
        };

        if let (Some(first), false) = (func.params.first(), func.kind == MethodKind::Static) {
            let ty = if func.kind == MethodKind::Instance {
                body.receiver = Some(first.name.clone());
                Type::Class(class.to_string())
            } else {
                Type::Any
            };
            body.locals.insert(first.name.clone(), ty);
        }
        for (param, ty) in func.explicit_params().iter().zip(declared.args.iter()) {
            body.locals.insert(param.name.clone(), ty.clone());
        }

        body.infer_block(&def.body)?;
        let falls_through = !block_terminates(&def.body);
        let return_type = body.resolve_return(declared, falls_through, func.is_abstract)?;

        debug!(return_type = %return_type, locals = body.locals.len(), "Inferred body");

        let artifact = InferredBody {
            locals: body.locals.into_iter().collect(),
            return_type: return_type.clone(),
            statements: def.body.len(),
        };
        let signature = ExtMethodType {
            return_type: Some(return_type),
            ..declared.clone()
        };
        Ok(FuncEnv::new(signature, artifact))
    }
}

fn block_terminates(body: &[Stmt]) -> bool {
    match body.last() {
        Some(Stmt::Return(_)) | Some(Stmt::Raise(_)) => true,
        Some(Stmt::If(stmt)) => block_terminates(&stmt.body) && block_terminates(&stmt.orelse),
        _ => false,
    }
}

struct BodyInferer<'r, 'a> {
    class: &'a str,
    methods: MethodView<'a>,
    attributes: &'r mut AttributeScope<'a>,
    locals: HashMap<String, Type>,
    returns: Vec<Type>,
    /// Name bound to the instance (`self`)
    receiver: Option<String>,
    promote: bool,
    lines: Option<Arc<LineIndex>>,
    fallback: SourceLocation,
}

impl<'r, 'a> BodyInferer<'r, 'a> {
    fn location<T: Ranged>(&self, node: &T) -> SourceLocation {
        match &self.lines {
            Some(lines) => lines.location(node),
            None => self.fallback.clone(),
        }
    }

    fn fail<T: Ranged>(&self, node: &T, message: impl Into<String>) -> InferenceFailure {
        InferenceFailure::new(message).at(self.location(node))
    }

    fn is_receiver(&self, expr: &Expr) -> bool {
        match (expr, &self.receiver) {
            (Expr::Name(name), Some(receiver)) => name.id.as_str() == receiver.as_str(),
            _ => false,
        }
    }

    fn resolve_return(&self, declared: &ExtMethodType, falls_through: bool, is_abstract: bool) -> Infer<Type> {
        if is_abstract {
            return Ok(declared.return_type.clone().unwrap_or(Type::None));
        }

        let mut returns = self.returns.clone();
        if falls_through {
            returns.push(Type::None);
        }

        match &declared.return_type {
            Some(expected) => {
                for ty in &returns {
                    if !expected.is_assignable_from(ty, self.promote) {
                        return Err(InferenceFailure::new(format!(
                            "returns {} but the declared return type is {}",
                            ty, expected
                        ))
                        .at(self.fallback.clone()));
                    }
                }
                Ok(expected.clone())
            }
            None => Ok(returns
                .into_iter()
                .reduce(|a, b| Type::join(a, b, self.promote))
                .unwrap_or(Type::None)),
        }
    }

    fn infer_block(&mut self, body: &[Stmt]) -> Infer<()> {
        for stmt in body {
            self.infer_stmt(stmt)?;
        }
        Ok(())
    }

    fn infer_stmt(&mut self, stmt: &Stmt) -> Infer<()> {
        match stmt {
            Stmt::Assign(assign) => {
                let value = self.infer_expr(&assign.value)?;
                for target in &assign.targets {
                    self.assign(target, value.clone(), None)?;
                }
            }

            Stmt::AnnAssign(ann) => {
                let declared = type_from_annotation(&ann.annotation);
                if let Some(value) = &ann.value {
                    let value_ty = self.infer_expr(value)?;
                    if !declared.is_assignable_from(&value_ty, self.promote) {
                        return Err(self.fail(stmt, format!("cannot assign {} to a {} annotation", value_ty, declared)));
                    }
                }
                self.assign(&ann.target, declared.clone(), Some(declared))?;
            }

            Stmt::AugAssign(aug) => {
                let current = self.infer_expr(&aug.target)?;
                let value = self.infer_expr(&aug.value)?;
                let result = self.binop(stmt, &aug.op, current, value)?;
                self.assign(&aug.target, result, None)?;
            }

            Stmt::Return(ret) => {
                let ty = match &ret.value {
                    Some(value) => self.infer_expr(value)?,
                    None => Type::None,
                };
                self.returns.push(ty);
            }

            Stmt::If(stmt) => {
                self.infer_expr(&stmt.test)?;
                self.infer_block(&stmt.body)?;
                self.infer_block(&stmt.orelse)?;
            }

            Stmt::While(stmt) => {
                self.infer_expr(&stmt.test)?;
                self.infer_block(&stmt.body)?;
                self.infer_block(&stmt.orelse)?;
            }

            Stmt::For(stmt) => {
                let iter = self.infer_expr(&stmt.iter)?;
                self.assign(&stmt.target, element_type(&iter), None)?;
                self.infer_block(&stmt.body)?;
                self.infer_block(&stmt.orelse)?;
            }

            Stmt::Expr(expr) => {
                self.infer_expr(&expr.value)?;
            }

            Stmt::Assert(assert) => {
                self.infer_expr(&assert.test)?;
            }

            other => {
                trace!(location = %self.location(other), "Skipping statement");
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, value: Type, annotation: Option<Type>) -> Infer<()> {
        match target {
            Expr::Name(name) => {
                let name = name.id.to_string();
                let ty = match self.locals.remove(&name) {
                    Some(existing) if annotation.is_none() => Type::join(existing, value, self.promote),
                    _ => value,
                };
                self.locals.insert(name, ty);
                Ok(())
            }

            Expr::Attribute(attr) if self.is_receiver(&attr.value) => {
                self.assign_attribute(attr, value, annotation)
            }

            Expr::Tuple(tuple) => {
                let elements = match &value {
                    Type::Tuple(types) if types.len() == tuple.elts.len() => types.clone(),
                    _ => vec![element_type(&value); tuple.elts.len()],
                };
                for (elt, ty) in tuple.elts.iter().zip(elements) {
                    self.assign(elt, ty, None)?;
                }
                Ok(())
            }

            // Subscript stores and attributes of other objects do not affect layout
            other => {
                self.infer_expr(other)?;
                Ok(())
            }
        }
    }

    fn assign_attribute(&mut self, attr: &ExprAttribute, value: Type, annotation: Option<Type>) -> Infer<()> {
        let name = attr.attr.as_str();
        let promote = self.promote;

        if self.methods.get(name).is_some() && self.attributes.get(name).is_none() {
            return Err(self.fail(attr, format!("cannot assign to method '{}'", name)));
        }

        match self.attributes.get(name).cloned() {
            Some(var) => {
                if var.ty.is_assignable_from(&value, promote) {
                    return Ok(());
                }
                match self.attributes.symtab_mut() {
                    Some(symtab) if var.promotable => {
                        let widened = Type::join(var.ty.clone(), value.clone(), promote);
                        trace!(attribute = name, from = %var.ty, to = %widened, "Widening attribute");
                        symtab.insert(name, Variable { ty: widened, ..var });
                        Ok(())
                    }
                    _ => Err(self.fail(
                        attr,
                        format!("cannot assign {} to attribute '{}' of type {}", value, name, var.ty),
                    )),
                }
            }
            None => match self.attributes.symtab_mut() {
                Some(symtab) => {
                    let var = match annotation {
                        Some(ty) => Variable::declared(ty),
                        None => Variable::inferred(value),
                    };
                    debug!(attribute = name, ty = %var.ty, "Discovered attribute");
                    symtab.insert(name, var);
                    Ok(())
                }
                None => {
                    let suggestions = find_similar_names(name, &self.attributes.names(), 2)
                        .into_iter()
                        .map(|s| format!("Did you mean '{}'?", s))
                        .collect();
                    Err(self
                        .fail(attr, format!("cannot introduce attribute '{}' outside __init__", name))
                        .with_suggestions(suggestions))
                }
            },
        }
    }

    fn infer_expr(&mut self, expr: &Expr) -> Infer<Type> {
        let ty = match expr {
            Expr::Constant(constant) => match &constant.value {
                Constant::None => Type::None,
                Constant::Bool(_) => Type::Bool,
                Constant::Int(_) => Type::Int,
                Constant::Float(_) => Type::Float,
                Constant::Str(_) => Type::Str,
                Constant::Bytes(_) => Type::Bytes,
                _ => Type::Any,
            },

            Expr::Name(name) => match self.locals.get(name.id.as_str()) {
                Some(ty) => ty.clone(),
                None => {
                    let candidates: Vec<String> = self.locals.keys().cloned().collect();
                    let similar = find_similar_names(name.id.as_str(), &candidates, 1);
                    if let (true, Some(suggestion)) = (name.id.as_str().len() > 2, similar.first()) {
                        return Err(self
                            .fail(expr, format!("name '{}' is not defined", name.id))
                            .with_suggestions(vec![format!("Did you mean '{}'?", suggestion)]));
                    }
                    // Module-level names are opaque
                    Type::Any
                }
            },

            Expr::Attribute(attr) => self.infer_attribute(attr)?,

            Expr::BinOp(binop) => {
                let left = self.infer_expr(&binop.left)?;
                let right = self.infer_expr(&binop.right)?;
                self.binop(expr, &binop.op, left, right)?
            }

            Expr::UnaryOp(unary) => {
                let operand = self.infer_expr(&unary.operand)?;
                match unary.op {
                    UnaryOp::Not => Type::Bool,
                    UnaryOp::Invert => Type::Int,
                    UnaryOp::UAdd | UnaryOp::USub => match operand {
                        Type::Bool => Type::Int,
                        other => other,
                    },
                }
            }

            Expr::BoolOp(boolop) => {
                let mut types = Vec::with_capacity(boolop.values.len());
                for value in &boolop.values {
                    types.push(self.infer_expr(value)?);
                }
                Type::union(types)
            }

            Expr::Compare(compare) => {
                self.infer_expr(&compare.left)?;
                for comparator in &compare.comparators {
                    self.infer_expr(comparator)?;
                }
                Type::Bool
            }

            Expr::IfExp(ifexp) => {
                self.infer_expr(&ifexp.test)?;
                let body = self.infer_expr(&ifexp.body)?;
                let orelse = self.infer_expr(&ifexp.orelse)?;
                Type::join(body, orelse, self.promote)
            }

            Expr::Call(call) => self.infer_call(call)?,

            Expr::Subscript(subscript) => {
                let value = self.infer_expr(&subscript.value)?;
                self.infer_expr(&subscript.slice)?;
                match value {
                    Type::List(elem) => *elem,
                    Type::Dict(_, value) => *value,
                    Type::Tuple(types) => Type::union(types),
                    Type::Str => Type::Str,
                    Type::Bytes => Type::Int,
                    _ => Type::Any,
                }
            }

            Expr::List(list) => {
                let types = self.infer_all(&list.elts)?;
                Type::List(Box::new(collection_element(types)))
            }

            Expr::Set(set) => {
                let types = self.infer_all(&set.elts)?;
                Type::Set(Box::new(collection_element(types)))
            }

            Expr::Tuple(tuple) => Type::Tuple(self.infer_all(&tuple.elts)?),

            Expr::Dict(dict) => {
                let mut keys = Vec::new();
                for key in dict.keys.iter().flatten() {
                    keys.push(self.infer_expr(key)?);
                }
                let values = self.infer_all(&dict.values)?;
                Type::Dict(Box::new(collection_element(keys)), Box::new(collection_element(values)))
            }

            Expr::JoinedStr(_) | Expr::FormattedValue(_) => Type::Str,
            Expr::ListComp(_) | Expr::GeneratorExp(_) => Type::List(Box::new(Type::Any)),
            Expr::SetComp(_) => Type::Set(Box::new(Type::Any)),
            Expr::DictComp(_) => Type::Dict(Box::new(Type::Any), Box::new(Type::Any)),

            _ => Type::Any,
        };
        Ok(ty)
    }

    fn infer_all(&mut self, exprs: &[Expr]) -> Infer<Vec<Type>> {
        exprs.iter().map(|e| self.infer_expr(e)).collect()
    }

    fn infer_attribute(&mut self, attr: &ExprAttribute) -> Infer<Type> {
        let name = attr.attr.as_str();

        if let Expr::Name(module) = &*attr.value {
            if module.id.as_str() == "math" && !self.locals.contains_key("math") {
                return Ok(match name {
                    "pi" | "e" | "tau" | "inf" | "nan" => Type::Float,
                    _ => Type::Any,
                });
            }
        }

        let value = self.infer_expr(&attr.value)?;
        let own_class = matches!(&value, Type::Class(c) if c == self.class);
        if !own_class {
            return Ok(Type::Any);
        }

        if let Some(var) = self.attributes.get(name) {
            return Ok(var.ty.clone());
        }
        if let Some(sig) = self.methods.get(name) {
            return Ok(sig.function_type());
        }

        let mut candidates = self.attributes.names();
        candidates.extend(self.methods.names());
        let suggestions = find_similar_names(name, &candidates, 2)
            .into_iter()
            .map(|s| format!("Did you mean '{}'?", s))
            .collect();
        Err(self
            .fail(attr, format!("Type {} has no attribute '{}'", self.class, name))
            .with_suggestions(suggestions))
    }

    fn infer_call(&mut self, call: &ExprCall) -> Infer<Type> {
        let mut args = self.infer_all(&call.args)?;
        for keyword in &call.keywords {
            self.infer_expr(&keyword.value)?;
        }

        match &*call.func {
            Expr::Attribute(attr) => {
                if let Expr::Name(module) = &*attr.value {
                    if module.id.as_str() == "math" && !self.locals.contains_key("math") {
                        return Ok(math_function(attr.attr.as_str()));
                    }
                }

                let receiver = self.infer_expr(&attr.value)?;
                let own_class = matches!(&receiver, Type::Class(c) if c == self.class);
                if !own_class {
                    return Ok(Type::Any);
                }

                let name = attr.attr.as_str();
                match self.methods.get(name) {
                    Some(sig) => {
                        self.check_call_args(call, name, &sig.args, &args)?;
                        Ok(sig.return_type.clone().unwrap_or(Type::Any))
                    }
                    None => self.infer_attribute(attr).map(|ty| match ty {
                        Type::Function(_, ret) => *ret,
                        _ => Type::Any,
                    }),
                }
            }

            Expr::Name(name) if !self.locals.contains_key(name.id.as_str()) => {
                let name = name.id.as_str();
                if name == self.class {
                    return Ok(Type::Class(name.to_string()));
                }
                Ok(builtin_call(name, &mut args, self.promote))
            }

            other => match self.infer_expr(other)? {
                Type::Function(_, ret) => Ok(*ret),
                _ => Ok(Type::Any),
            },
        }
    }

    fn check_call_args(&self, call: &ExprCall, name: &str, params: &[Type], args: &[Type]) -> Infer<()> {
        if params.len() != args.len() {
            return Err(self.fail(
                call,
                format!("{}() takes {} argument(s) but {} were given", name, params.len(), args.len()),
            ));
        }
        for (param, arg) in params.iter().zip(args) {
            if !param.is_assignable_from(arg, self.promote) {
                return Err(self.fail(call, format!("{}() expects {}, got {}", name, param, arg)));
            }
        }
        Ok(())
    }

    fn binop<T: Ranged>(&self, node: &T, op: &Operator, left: Type, right: Type) -> Infer<Type> {
        use Type::*;

        let numeric = |t: &Type| matches!(t, Bool | Int | Float);
        let ty = match (&left, &right) {
            (Any, _) | (_, Any) | (Class(_), _) | (_, Class(_)) => Any,

            (a, b) if numeric(a) && numeric(b) => match op {
                Operator::Div => Float,
                Operator::MatMult => {
                    return Err(self.fail(node, format!("unsupported operand types for @: {} and {}", left, right)))
                }
                _ if matches!(a, Float) || matches!(b, Float) => Float,
                _ => Int,
            },

            (Str, Str) if matches!(op, Operator::Add) => Str,
            (Str, Int) | (Int, Str) if matches!(op, Operator::Mult) => Str,
            (Str, _) if matches!(op, Operator::Mod) => Str,
            (List(a), List(b)) if matches!(op, Operator::Add) => {
                List(Box::new(Type::join((**a).clone(), (**b).clone(), self.promote)))
            }
            (List(_), Int) if matches!(op, Operator::Mult) => left.clone(),

            _ => {
                return Err(self.fail(
                    node,
                    format!("unsupported operand types for {}: {} and {}", operator_symbol(op), left, right),
                ))
            }
        };
        Ok(ty)
    }
}

fn collection_element(types: Vec<Type>) -> Type {
    if types.is_empty() {
        Type::Any
    } else {
        Type::union(types)
    }
}

fn element_type(iter: &Type) -> Type {
    match iter {
        Type::List(elem) | Type::Set(elem) => (**elem).clone(),
        Type::Dict(key, _) => (**key).clone(),
        Type::Tuple(types) => Type::union(types.clone()),
        Type::Str => Type::Str,
        Type::Bytes => Type::Int,
        _ => Type::Any,
    }
}

fn operator_symbol(op: &Operator) -> &'static str {
    match op {
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mult => "*",
        Operator::MatMult => "@",
        Operator::Div => "/",
        Operator::Mod => "%",
        Operator::Pow => "**",
        Operator::LShift => "<<",
        Operator::RShift => ">>",
        Operator::BitOr => "|",
        Operator::BitXor => "^",
        Operator::BitAnd => "&",
        Operator::FloorDiv => "//",
    }
}

fn math_function(name: &str) -> Type {
    match name {
        "floor" | "ceil" | "trunc" | "factorial" | "gcd" | "isqrt" => Type::Int,
        "isnan" | "isinf" | "isfinite" | "isclose" => Type::Bool,
        "sqrt" | "exp" | "log" | "log2" | "log10" | "sin" | "cos" | "tan" | "asin" | "acos"
        | "atan" | "atan2" | "hypot" | "pow" | "fabs" | "degrees" | "radians" | "fsum" => Type::Float,
        _ => Type::Any,
    }
}

fn builtin_call(name: &str, args: &mut Vec<Type>, promote: bool) -> Type {
    match name {
        "float" => Type::Float,
        "int" | "len" | "hash" | "ord" => Type::Int,
        "str" | "repr" | "chr" => Type::Str,
        "bool" | "isinstance" | "callable" => Type::Bool,
        "print" => Type::None,
        "abs" => match args.first() {
            Some(Type::Bool) => Type::Int,
            Some(ty) if ty.is_numeric() => ty.clone(),
            _ => Type::Any,
        },
        "round" => {
            if args.len() >= 2 {
                Type::Float
            } else {
                Type::Int
            }
        }
        "min" | "max" => {
            let types = std::mem::take(args);
            match types.as_slice() {
                [Type::List(elem)] => (**elem).clone(),
                _ => types.into_iter().reduce(|a, b| Type::join(a, b, promote)).unwrap_or(Type::Any),
            }
        }
        "sum" => match args.first() {
            Some(Type::List(elem)) if matches!(**elem, Type::Int | Type::Bool) => Type::Int,
            Some(Type::List(elem)) if **elem == Type::Float => Type::Float,
            _ => Type::Any,
        },
        "range" => Type::List(Box::new(Type::Int)),
        "list" => Type::List(Box::new(args.first().map(element_type).unwrap_or(Type::Any))),
        "set" => Type::Set(Box::new(args.first().map(element_type).unwrap_or(Type::Any))),
        "dict" => Type::Dict(Box::new(Type::Any), Box::new(Type::Any)),
        "tuple" => Type::Tuple(Vec::new()),
        other if other.chars().next().is_some_and(|c| c.is_ascii_uppercase()) => Type::Class(other.to_string()),
        _ => Type::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exttypes::exttype::Symtab;
    use crate::exttypes::pipeline::CompileFlags;
    use crate::exttypes::pyclass::{ClassMember, PyFunction};
    use crate::exttypes::signatures::{declared_signature, Method};
    use crate::exttypes::tables::{OrderedMap, TableState};
    use crate::frontend::classes::read_classes;
    use crate::frontend::parser::parse_module;

    fn function(source: &str, name: &str) -> Arc<PyFunction> {
        let module = parse_module(source, "test.py").unwrap();
        let classes = read_classes(&module, source);
        match classes[0].members.get(name) {
            Some(ClassMember::Function(func)) => func.clone(),
            _ => panic!("no function {}", name),
        }
    }

    fn run(
        func: Arc<PyFunction>,
        symtab: &mut Symtab,
        define: bool,
        own: &OrderedMap<ExtMethodType>,
        flags: &CompileFlags,
    ) -> Infer<FuncEnv> {
        let declared = declared_signature(&func).unwrap_or_else(|| {
            ExtMethodType::new(func.explicit_params().iter().map(|_| Type::Any), None).with_kind(func.kind)
        });
        let method = Method { name: func.name.clone(), func, signature: declared.clone(), declared: true };
        let inherited = TableState::empty();
        let attributes = if define { AttributeScope::Define(symtab) } else { AttributeScope::Read(symtab) };
        MethodInferer::new().infer(InferRequest {
            class: "Point",
            method: &method,
            declared: &declared,
            flags,
            attributes,
            methods: MethodView { own, inherited: &inherited },
        })
    }

    const POINT: &str = r#"
class Point:
    def __init__(self, x: float, n):
        self.x = x
        self.count = 0
        self.count = 1.5

    def norm(self):
        return math.sqrt(self.x * self.x)

    def grow(self):
        self.z = 1.0

    def typo(self):
        return self.xx

    def scaled(self, k: int) -> float:
        total = self.x * k
        return total
"#;

    #[test]
    fn test_init_defines_and_widens_attributes() {
        let mut symtab = Symtab::new();
        let env = run(function(POINT, "__init__"), &mut symtab, true, &OrderedMap::new(), &CompileFlags::new())
            .unwrap();
        assert_eq!(env.signature.return_type, Some(Type::None));
        assert_eq!(symtab.get("x").map(|v| v.ty.clone()), Some(Type::Float));
        assert_eq!(symtab.get("count").map(|v| v.ty.clone()), Some(Type::Float));
        assert!(env.artifact::<InferredBody>().is_some());
    }

    #[test]
    fn test_widening_respects_promotion_flag() {
        let mut symtab = Symtab::new();
        let flags = CompileFlags::new().with(NUMERIC_PROMOTION, crate::exttypes::pipeline::FlagValue::Bool(false));
        run(function(POINT, "__init__"), &mut symtab, true, &OrderedMap::new(), &flags).unwrap();
        assert_eq!(
            symtab.get("count").map(|v| v.ty.clone()),
            Some(Type::Union(vec![Type::Int, Type::Float]))
        );
    }

    #[test]
    fn test_methods_read_fixed_attributes() {
        let mut symtab = Symtab::new();
        symtab.insert("x", Variable::inferred(Type::Float));
        let env = run(function(POINT, "norm"), &mut symtab, false, &OrderedMap::new(), &CompileFlags::new())
            .unwrap();
        assert_eq!(env.signature.return_type, Some(Type::Float));

        let env = run(function(POINT, "scaled"), &mut symtab, false, &OrderedMap::new(), &CompileFlags::new())
            .unwrap();
        assert_eq!(env.signature.return_type, Some(Type::Float));
    }

    #[test]
    fn test_methods_cannot_introduce_attributes() {
        let mut symtab = Symtab::new();
        symtab.insert("x", Variable::inferred(Type::Float));
        let failure = run(function(POINT, "grow"), &mut symtab, false, &OrderedMap::new(), &CompileFlags::new())
            .unwrap_err();
        assert!(failure.message.contains("outside __init__"));
        assert_eq!(failure.location.map(|l| l.line), Some(12));
    }

    #[test]
    fn test_unknown_attribute_suggests_names() {
        let mut symtab = Symtab::new();
        symtab.insert("x", Variable::inferred(Type::Float));
        let failure = run(function(POINT, "typo"), &mut symtab, false, &OrderedMap::new(), &CompileFlags::new())
            .unwrap_err();
        assert!(failure.message.contains("no attribute 'xx'"));
        assert_eq!(failure.suggestions, vec!["Did you mean 'x'?".to_string()]);
    }

    #[test]
    fn test_declared_return_is_checked() {
        let source = r#"
class Point:
    def label(self) -> int:
        return "p"
"#;
        let mut symtab = Symtab::new();
        let failure = run(function(source, "label"), &mut symtab, false, &OrderedMap::new(), &CompileFlags::new())
            .unwrap_err();
        assert!(failure.message.contains("declared return type is int"));
    }

    #[test]
    fn test_calls_through_self_use_known_signatures() {
        let source = r#"
class Point:
    def twice(self):
        return self.norm() * 2
"#;
        let mut own = OrderedMap::new();
        own.insert("norm", ExtMethodType::new([], Some(Type::Float)));
        let mut symtab = Symtab::new();
        let env = run(function(source, "twice"), &mut symtab, false, &own, &CompileFlags::new()).unwrap();
        assert_eq!(env.signature.return_type, Some(Type::Float));
    }
}
