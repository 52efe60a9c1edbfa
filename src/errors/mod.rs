//! Error types for extension-type compilation
//!
//! Every stage of [`crate::exttypes::ExtensionCompiler`] reports failures as a
//! [`CompileError`]. The variants follow the compilation taxonomy: signature
//! conflicts, inference failures, validator vetoes, table-layout contract
//! violations and native code generation failures.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub line: usize,
    pub col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceLocation {
    pub fn new(line: usize, col: usize, end_line: usize, end_col: usize) -> Self {
        Self { line, col, end_line, end_col }
    }

    pub fn from_range(start: (usize, usize), end: (usize, usize)) -> Self {
        Self::new(start.0, start.1, end.0, end.1)
    }

    /// Location used for members synthesized without source text.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A single validator veto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Name of the validator that rejected the type
    pub validator: &'static str,
    /// Method or attribute the failure is about (class name for type-level checks)
    pub subject: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(validator: &'static str, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            validator,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.validator, self.subject, self.message)
    }
}

/// Which table a layout violation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Attributes,
    Methods,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Attributes => write!(f, "attribute table"),
            TableKind::Methods => write!(f, "vtab type"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutErrorKind {
    /// Structural change requested after the table was finalized
    Frozen { table: TableKind, name: String },
    /// Table accessed in a state it cannot be in at this point
    NotFinalized { table: TableKind },
    /// A compiler stage was invoked out of order
    OutOfOrder { expected: &'static str, found: &'static str },
}

impl fmt::Display for LayoutErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frozen { table, name } => {
                write!(f, "cannot add '{}': {} is finalized", name, table)
            }
            Self::NotFinalized { table } => {
                write!(f, "{} has not been finalized", table)
            }
            Self::OutOfOrder { expected, found } => {
                write!(f, "stage out of order: expected {}, compiler is {}", expected, found)
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("{class}.{method}: signature error: {message}")]
    Signature {
        class: String,
        method: String,
        message: String,
    },

    #[error("{class}.{method} ({location}): type inference failed: {message}{}", format_hints(.suggestions))]
    TypeInference {
        class: String,
        method: String,
        location: SourceLocation,
        message: String,
        suggestions: Vec<String>,
    },

    #[error("{class}: {} validation failure(s):{}", .failures.len(), format_failures(.failures))]
    Validation {
        class: String,
        failures: Vec<ValidationFailure>,
    },

    #[error("{class}: layout error: {kind}")]
    Layout {
        class: String,
        kind: LayoutErrorKind,
    },

    #[error("{class}.{method}: code generation failed: {message}")]
    CodeGen {
        class: String,
        method: String,
        message: String,
    },

    #[error("{class}: base class '{base}': {message}")]
    Base {
        class: String,
        base: String,
        message: String,
    },

    #[error("parse error: {0}")]
    Parse(String),
}

fn format_failures(failures: &[ValidationFailure]) -> String {
    failures.iter().map(|f| format!("\n  {}", f)).collect()
}

fn format_hints(suggestions: &[String]) -> String {
    suggestions.iter().map(|s| format!("\n  hint: {}", s)).collect()
}

impl CompileError {
    /// Stable name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::Signature { .. } => "SignatureError",
            CompileError::TypeInference { .. } => "TypeInferenceError",
            CompileError::Validation { .. } => "ValidationError",
            CompileError::Layout { .. } => "LayoutError",
            CompileError::CodeGen { .. } => "CodeGenError",
            CompileError::Base { .. } => "BaseClassError",
            CompileError::Parse(_) => "ParseError",
        }
    }

    /// Class whose compilation failed, if the error is tied to one.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            CompileError::Signature { class, .. }
            | CompileError::TypeInference { class, .. }
            | CompileError::Validation { class, .. }
            | CompileError::Layout { class, .. }
            | CompileError::CodeGen { class, .. }
            | CompileError::Base { class, .. } => Some(class),
            CompileError::Parse(_) => None,
        }
    }

    pub fn frozen(class: &str, table: TableKind, name: &str) -> Self {
        CompileError::Layout {
            class: class.to_string(),
            kind: LayoutErrorKind::Frozen { table, name: name.to_string() },
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Compute Levenshtein distance for "did you mean" suggestions
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 { return b_len; }
    if b_len == 0 { return a_len; }

    let mut matrix = vec![vec![0; b_len + 1]; a_len + 1];

    for (i, row) in matrix.iter_mut().enumerate() { row[0] = i; }
    for j in 0..=b_len { matrix[0][j] = j; }

    for i in 1..=a_len {
        for j in 1..=b_len {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            matrix[i][j] = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);
        }
    }

    matrix[a_len][b_len]
}

/// Find similar names for "did you mean" suggestions
pub fn find_similar_names(target: &str, candidates: &[String], max_distance: usize) -> Vec<String> {
    let mut results: Vec<(String, usize)> = candidates
        .iter()
        .map(|c| (c.clone(), levenshtein_distance(target, c)))
        .filter(|(_, dist)| *dist <= max_distance && *dist > 0)
        .collect();

    results.sort_by_key(|(_, dist)| *dist);
    results.into_iter().map(|(name, _)| name).collect()
}
