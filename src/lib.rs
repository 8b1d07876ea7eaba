//! Crate root: wires together the compilation pipeline.
//!
//! Compilation is a single pass. The parser pulls tokens from the lexer on
//! demand, checks types as each construct is recognised and emits SPIM
//! assembly as it goes:
//! - `tokenizer` turns characters into tokens one at a time.
//! - `grammar` holds the FIRST sets the predictive parser decides with.
//! - `parser` owns the productions; `check` the type rules they apply.
//! - `symbol` and `ty` model declarations and their types.
//! - `codegen` accumulates the data and text segments.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod check;
pub mod codegen;
pub mod context;
pub mod error;
pub mod grammar;
pub mod parser;
pub mod symbol;
pub mod tokenizer;
pub mod ty;

use std::fs;
use std::path::Path;

use log::info;
use snafu::ResultExt;

use context::{CompilerContext, internal};
use error::ReadSourceSnafu;
pub use error::{Category, CompileError, CompileResult, Diagnostic, Failure};

/// Knobs that change what the compiler emits without changing what it
/// accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
  /// Interleave `#` comments describing the generated code.
  pub annotate: bool,
}

/// Compile a source string into SPIM assembly.
pub fn compile(source: &str) -> Result<String, Failure> {
  compile_with_options(source, CompileOptions::default())
}

pub fn compile_with_options(source: &str, options: CompileOptions) -> Result<String, Failure> {
  let mut cx = CompilerContext::new(source, options);
  run(&mut cx).map_err(|error| Failure::new(error, cx.symbols.to_string()))
}

/// Read and compile a source file.
pub fn compile_file(path: impl AsRef<Path>) -> Result<String, Failure> {
  compile_file_with_options(path, CompileOptions::default())
}

pub fn compile_file_with_options(
  path: impl AsRef<Path>,
  options: CompileOptions,
) -> Result<String, Failure> {
  let path = path.as_ref();
  let source = fs::read_to_string(path)
    .context(ReadSourceSnafu { path })
    .map_err(|error| Failure::new(error, ""))?;
  info!("compiling {}", path.display());
  compile_with_options(&source, options)
}

fn run(cx: &mut CompilerContext) -> CompileResult<String> {
  parser::parse_program(cx)?;
  let leaked = cx.codegen.registers_in_use();
  if leaked != 0 {
    return Err(internal(format!("{leaked} registers still held after compilation")));
  }
  info!(
    "emitted {} instructions using {} labels",
    cx.codegen.text().len(),
    cx.codegen.labels_allocated()
  );
  cx.codegen.dump()
}

/// One line per token, up to and including the end of input or the first
/// lexical error.
pub fn dump_tokens(source: &str) -> String {
  tokenizer::tokenize(source)
    .iter()
    .map(|token| format!("{}\n", token.describe()))
    .collect()
}

/// The productions entered while parsing, indented by depth. A rejected
/// program yields the trace up to the fault followed by the error report.
pub fn dump_parse_tree(source: &str) -> String {
  let mut cx = CompilerContext::new(source, CompileOptions::default());
  let outcome = parser::parse_program(&mut cx);
  let mut tree = cx.parse_tree().to_string();
  if let Err(error) = outcome {
    tree.push_str(&Failure::new(error, "").to_string());
  }
  tree
}

/// The global scope after a successful parse.
pub fn dump_symbol_table(source: &str) -> Result<String, Failure> {
  let mut cx = CompilerContext::new(source, CompileOptions::default());
  match parser::parse_program(&mut cx) {
    Ok(()) => Ok(cx.symbols.to_string()),
    Err(error) => Err(Failure::new(error, cx.symbols.to_string())),
  }
}
