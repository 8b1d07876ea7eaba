//! Shared error utilities used across the compilation pipeline.
//!
//! Every production returns a `CompileResult`; the first fault short-circuits
//! back to the driver, which pairs it with the symbol table as it stood at
//! that moment.

use std::fmt;
use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// User-facing classification of a rejected program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
  ScanError,
  SyntaxError,
  Undefined,
  Redefined,
  TypeMismatch,
  ArityMismatch,
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Category::ScanError => "SCAN_ERROR",
      Category::SyntaxError => "SYNTAX_ERROR",
      Category::Undefined => "UNDEFINED",
      Category::Redefined => "REDEFINED",
      Category::TypeMismatch => "TYPE_MISMATCH",
      Category::ArityMismatch => "ARITY_MISMATCH",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub line: usize,
  pub column: usize,
  pub category: Category,
  pub message: String,
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}: {}: {}", self.line, self.column, self.category, self.message)
  }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("Syntax Error (Scanner): SCAN_ERROR on symbol {lexeme}"))]
  Scan {
    line: usize,
    column: usize,
    lexeme: String,
  },

  #[snafu(display("Syntax Error (Parser):  on symbol {lexeme}"))]
  Syntax {
    line: usize,
    column: usize,
    lexeme: String,
    found: String,
    expected: String,
  },

  #[snafu(display("SEMANTIC ERROR: UNDEFINED_ERROR on symbol {name}"))]
  Undefined {
    line: usize,
    column: usize,
    name: String,
  },

  #[snafu(display("SEMANTIC ERROR: REDEFINED_ERROR on symbol {name}"))]
  Redefined {
    line: usize,
    column: usize,
    name: String,
  },

  #[snafu(display("SEMANTIC ERROR: MISMATCH_ERROR on symbol {name}"))]
  Mismatch {
    line: usize,
    column: usize,
    name: String,
    detail: String,
  },

  #[snafu(display("SEMANTIC ERROR: ARITY_ERROR on symbol {name}"))]
  Arity {
    line: usize,
    column: usize,
    name: String,
    detail: String,
  },

  #[snafu(display("internal error: {pool} register pool exhausted"))]
  RegisterExhausted { pool: &'static str },

  #[snafu(display("internal error: {message}"))]
  Internal { message: String },

  #[snafu(display("cannot read {}: {source}", path.display()))]
  ReadSource {
    path: PathBuf,
    source: std::io::Error,
  },
}

impl CompileError {
  /// Source position of the offending token, if the error has one.
  pub fn location(&self) -> Option<(usize, usize)> {
    match self {
      CompileError::Scan { line, column, .. }
      | CompileError::Syntax { line, column, .. }
      | CompileError::Undefined { line, column, .. }
      | CompileError::Redefined { line, column, .. }
      | CompileError::Mismatch { line, column, .. }
      | CompileError::Arity { line, column, .. } => Some((*line, *column)),
      _ => None,
    }
  }

  pub fn category(&self) -> Option<Category> {
    match self {
      CompileError::Scan { .. } => Some(Category::ScanError),
      CompileError::Syntax { .. } => Some(Category::SyntaxError),
      CompileError::Undefined { .. } => Some(Category::Undefined),
      CompileError::Redefined { .. } => Some(Category::Redefined),
      CompileError::Mismatch { .. } => Some(Category::TypeMismatch),
      CompileError::Arity { .. } => Some(Category::ArityMismatch),
      _ => None,
    }
  }

  /// Secondary explanation printed under the headline.
  pub fn detail(&self) -> Option<String> {
    match self {
      CompileError::Syntax {
        found, expected, ..
      } => Some(format!("Error: found {found} but expected: {expected}")),
      CompileError::Mismatch { detail, .. } | CompileError::Arity { detail, .. } => {
        Some(detail.clone())
      }
      _ => None,
    }
  }

  /// The structured record for user-facing errors; internal and I/O failures
  /// have none.
  pub fn diagnostic(&self) -> Option<Diagnostic> {
    let (line, column) = self.location()?;
    let category = self.category()?;
    let message = match self.detail() {
      Some(detail) => format!("{self}: {detail}"),
      None => self.to_string(),
    };
    Some(Diagnostic {
      line,
      column,
      category,
      message,
    })
  }
}

/// A rejected compilation: the first error plus the symbol table contents at
/// the point of failure.
#[derive(Debug)]
pub struct Failure {
  pub error: CompileError,
  pub symbol_table: String,
}

impl Failure {
  pub fn new(error: CompileError, symbol_table: impl Into<String>) -> Self {
    Self {
      error,
      symbol_table: symbol_table.into(),
    }
  }

  /// At most one entry: compilation stops at the first fault.
  pub fn diagnostics(&self) -> Vec<Diagnostic> {
    self.error.diagnostic().into_iter().collect()
  }

  /// Quote the offending source line with a caret under the error column.
  pub fn caret(&self, source: &str) -> Option<String> {
    let (line, column) = self.error.location()?;
    let text = source.lines().nth(line.checked_sub(1)?).unwrap_or("");
    let expr_line = format!("'{text}'");
    let char_offset = column.min(text.chars().count() + 1); // account for opening quote
    let marker = format!("{}^", " ".repeat(char_offset));
    Some(format!("{expr_line}\n{marker} {}", self.error))
  }
}

impl fmt::Display for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", self.error)?;
    if let Some((line, column)) = self.error.location() {
      if self.error.category() == Some(Category::SyntaxError)
        || self.error.category() == Some(Category::ScanError)
      {
        writeln!(f, "Error Found on Line Number: {line}")?;
      } else {
        writeln!(f, "Error Found on Line Number: {line}, Char Position: {column}")?;
      }
    }
    if let Some(detail) = self.error.detail() {
      writeln!(f, "{detail}")?;
    }
    write!(f, "{}", self.symbol_table)
  }
}

impl std::error::Error for Failure {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.error)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn semantic_errors_carry_a_diagnostic() {
    let err = CompileError::Undefined {
      line: 3,
      column: 7,
      name: "y".into(),
    };
    let diag = err.diagnostic().expect("user-facing");
    assert_eq!(diag.category, Category::Undefined);
    assert_eq!((diag.line, diag.column), (3, 7));
    assert_eq!(diag.message, "SEMANTIC ERROR: UNDEFINED_ERROR on symbol y");
  }

  #[test]
  fn internal_errors_have_no_diagnostic() {
    let err = CompileError::RegisterExhausted { pool: "temporary" };
    assert!(err.diagnostic().is_none());
    assert!(Failure::new(err, "").diagnostics().is_empty());
  }

  #[test]
  fn caret_points_at_column() {
    let failure = Failure::new(
      CompileError::Undefined {
        line: 2,
        column: 3,
        name: "y".into(),
      },
      "",
    );
    let rendered = failure.caret("main(){\n  y = 1;\n}").expect("located");
    let mut lines = rendered.lines();
    assert_eq!(lines.next(), Some("'  y = 1;'"));
    assert_eq!(lines.next(), Some("   ^ SEMANTIC ERROR: UNDEFINED_ERROR on symbol y"));
  }

  #[test]
  fn report_includes_position_and_table() {
    let failure = Failure::new(
      CompileError::Redefined {
        line: 1,
        column: 12,
        name: "x".into(),
      },
      "***** Symbol Table Contents *****\n",
    );
    assert_eq!(
      failure.to_string(),
      "SEMANTIC ERROR: REDEFINED_ERROR on symbol x\n\
       Error Found on Line Number: 1, Char Position: 12\n\
       ***** Symbol Table Contents *****\n"
    );
  }
}
