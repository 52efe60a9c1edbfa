use rustpython_parser::ast::{Expr, Mod, ModExpression};
use rustpython_parser::{parse, Mode};
use tracing::{debug, error, instrument};

use crate::errors::{CompileError, Result};

#[instrument(skip(source), fields(source_len = source.len()))]
pub fn parse_module(source: &str, path: &str) -> Result<Mod> {
    debug!("Parsing module");
    parse(source, Mode::Module, path).map_err(|e| {
        error!(error = %e, "Failed to parse module");
        CompileError::Parse(format!("{}: {}", path, e))
    })
}

pub fn parse_expression(source: &str) -> Result<Expr> {
    match parse(source, Mode::Expression, "<annotation>") {
        Ok(Mod::Expression(ModExpression { body, .. })) => Ok(*body),
        Ok(_) => Err(CompileError::Parse("expected expression".to_string())),
        Err(e) => Err(CompileError::Parse(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_class() {
        let source = r#"
class Point:
    x: float
    def norm(self) -> float:
        return self.x
"#;
        assert!(parse_module(source, "point.py").is_ok());
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = parse_module("class :", "broken.py").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
        assert!(err.to_string().contains("broken.py"));
    }

    #[test]
    fn test_parse_expression() {
        assert!(parse_expression("list[int]").is_ok());
    }
}
