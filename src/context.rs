//! Per-compilation state threaded through every production.
//!
//! One `CompilerContext` owns the lexer and its single lookahead token, the
//! scope stack, the code generator and the handful of flags the type rules
//! need. Nothing here outlives a compilation.

use log::{debug, trace};

use crate::codegen::CodeGen;
use crate::error::{
  AritySnafu, CompileError, CompileResult, InternalSnafu, MismatchSnafu, RedefinedSnafu, ScanSnafu,
  SyntaxSnafu, UndefinedSnafu,
};
use crate::grammar::{NonTerminal, describe_first_set};
use crate::symbol::{Storage, Symbol, SymbolKind, SymbolRef, SymbolTable};
use crate::tokenizer::{Lexer, Token, TokenKind};
use crate::ty::Type;
use crate::CompileOptions;

pub struct CompilerContext {
  lexer: Lexer,
  /// Current lookahead.
  pub token: Token,
  pub symbols: SymbolTable,
  pub codegen: CodeGen,
  /// Set once a `string` operand appears in `+`/`-`; cleared per statement.
  pub string_present: bool,
  /// Lexical level of the code being emitted: 0 for `main` and globals.
  pub level: usize,
  /// Procedure enclosing the code being parsed; `None` inside `main`.
  pub procedure: Option<SymbolRef>,
  /// Names of the enclosing procedures, used to qualify labels.
  path: Vec<String>,
  parse_tree: String,
  depth: usize,
}

impl CompilerContext {
  /// Prime the lookahead and set up an empty root scope.
  pub fn new(source: &str, options: CompileOptions) -> Self {
    let mut lexer = Lexer::new(source);
    let token = lexer.next_token();
    Self {
      lexer,
      token,
      symbols: SymbolTable::new(),
      codegen: CodeGen::new(options.annotate),
      string_present: false,
      level: 0,
      procedure: None,
      path: Vec::new(),
      parse_tree: String::new(),
      depth: 1,
    }
  }

  // ---------- lookahead ----------

  pub fn kind(&self) -> TokenKind {
    self.token.kind
  }

  pub fn have(&self, kind: TokenKind) -> bool {
    self.token.kind == kind
  }

  pub fn have_nt(&self, nt: NonTerminal) -> bool {
    nt.starts_with(self.token.kind)
  }

  /// Move to the next token, returning the one just consumed.
  fn advance(&mut self) -> Token {
    let next = self.lexer.next_token();
    trace!("token {next}");
    std::mem::replace(&mut self.token, next)
  }

  pub fn accept(&mut self, kind: TokenKind) -> bool {
    if self.have(kind) {
      self.advance();
      return true;
    }
    false
  }

  /// Consume the lookahead if it can start `nt`.
  pub fn accept_nt(&mut self, nt: NonTerminal) -> Option<Token> {
    self.have_nt(nt).then(|| self.advance())
  }

  pub fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
    if self.have(kind) {
      return Ok(self.advance());
    }
    Err(self.syntax_error(kind.name()))
  }

  pub fn expect_nt(&mut self, nt: NonTerminal) -> CompileResult<Token> {
    match self.accept_nt(nt) {
      Some(token) => Ok(token),
      None => Err(self.syntax_error(format!("{nt} with {}", describe_first_set(nt)))),
    }
  }

  /// Report the lookahead as unexpected. A lexical error token is reported
  /// as a scan error instead.
  pub fn syntax_error(&self, expected: impl Into<String>) -> CompileError {
    let Token {
      kind,
      lexeme,
      line,
      column,
    } = &self.token;
    if *kind == TokenKind::Error {
      return ScanSnafu {
        line: *line,
        column: *column,
        lexeme: lexeme.as_str(),
      }
      .build();
    }
    SyntaxSnafu {
      line: *line,
      column: *column,
      lexeme: lexeme.as_str(),
      found: format!("{kind} ({lexeme})"),
      expected,
    }
    .build()
  }

  // ---------- parse tree ----------

  /// Check the lookahead against the production's FIRST set and record the
  /// production in the parse trace.
  pub fn enter_rule(&mut self, nt: NonTerminal) -> CompileResult<()> {
    if !self.have_nt(nt) {
      return Err(self.syntax_error(format!("{nt} with {}", describe_first_set(nt))));
    }
    trace!("enter {nt} at {}", self.token);
    self.parse_tree.push_str(&"   ".repeat(self.depth));
    self.parse_tree.push_str(nt.name());
    self.parse_tree.push('\n');
    self.depth += 1;
    Ok(())
  }

  pub fn exit_rule(&mut self) {
    self.depth = self.depth.saturating_sub(1);
  }

  pub fn parse_tree(&self) -> &str {
    &self.parse_tree
  }

  // ---------- scopes and symbols ----------

  /// Open the scope of a procedure body (or `main`) named `name`.
  pub fn enter_scope(&mut self, name: &str) {
    self.symbols.enter_scope();
    self.path.push(name.to_string());
    debug!("entered scope {} at depth {}", self.path.join("."), self.symbols.depth());
  }

  pub fn exit_scope(&mut self) {
    debug!("leaving scope {}", self.path.join("."));
    self.path.pop();
    self.symbols.exit_scope();
  }

  /// Data-segment label for a static symbol declared in the current scope.
  pub fn static_label(&self, name: &str) -> String {
    let mut parts = self.path.clone();
    parts.push(name.to_string());
    parts.join(".")
  }

  /// Entry label for a procedure declared in the current scope.
  pub fn procedure_label(&self, name: &str) -> String {
    format!("proc.{}", self.static_label(name))
  }

  /// Decide where a new variable of type `ty` lives: in the data segment at
  /// level 0, in the current frame otherwise. A frame that outgrows a signed
  /// offset is reported against `ident`.
  pub fn allocate(&mut self, ident: &Token, ty: &Type) -> CompileResult<Storage> {
    if self.level == 0 {
      return Ok(Storage::Static {
        label: self.static_label(&ident.lexeme),
      });
    }
    match self.codegen.next_local_location(ty.size()) {
      Some(offset) => Ok(Storage::Frame {
        level: self.level,
        offset,
      }),
      None => Err(out_of_range(ident, "locals that fit in one frame")),
    }
  }

  pub fn declare(&mut self, token: &Token, symbol: Symbol) -> CompileResult<SymbolRef> {
    match self.symbols.add_symbol(symbol) {
      Some(symbol) => Ok(symbol),
      None => RedefinedSnafu {
        line: token.line,
        column: token.column,
        name: token.lexeme.as_str(),
      }
      .fail(),
    }
  }

  pub fn resolve(&self, token: &Token, kind: SymbolKind) -> CompileResult<SymbolRef> {
    match self.symbols.get_symbol(&token.lexeme, kind) {
      Some(symbol) => Ok(symbol),
      None => UndefinedSnafu {
        line: token.line,
        column: token.column,
        name: token.lexeme.as_str(),
      }
      .fail(),
    }
  }
}

/// Type mismatch reported against `token`.
pub fn mismatch(token: &Token, detail: impl Into<String>) -> CompileError {
  MismatchSnafu {
    line: token.line,
    column: token.column,
    name: token.lexeme.as_str(),
    detail,
  }
  .build()
}

/// Argument-count mismatch reported against `token`.
pub fn arity(token: &Token, detail: impl Into<String>) -> CompileError {
  AritySnafu {
    line: token.line,
    column: token.column,
    name: token.lexeme.as_str(),
    detail,
  }
  .build()
}

/// A literal or declaration the target cannot represent, reported as a
/// syntax error on `token`.
pub fn out_of_range(token: &Token, expected: impl Into<String>) -> CompileError {
  SyntaxSnafu {
    line: token.line,
    column: token.column,
    lexeme: token.lexeme.as_str(),
    found: format!("{} ({})", token.kind, token.lexeme),
    expected,
  }
  .build()
}

pub fn internal(message: impl Into<String>) -> CompileError {
  InternalSnafu {
    message: message.into(),
  }
  .build()
}
