//! Symbols and the scoped symbol table.
//!
//! Scopes form a stack: the root scope holds the builtin types, globals and
//! top-level procedures, and every procedure body (and `main`) pushes a child
//! for its duration. Procedures live in their own namespace, so a variable and
//! a procedure may share a spelling.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
  Var,
  Const,
  Procedure,
  Type,
}

impl SymbolKind {
  fn namespace(self) -> Namespace {
    match self {
      SymbolKind::Procedure => Namespace::Procedure,
      _ => Namespace::Value,
    }
  }
}

impl fmt::Display for SymbolKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      SymbolKind::Var => "VAR",
      SymbolKind::Const => "CONST",
      SymbolKind::Procedure => "PROCEDURE",
      SymbolKind::Type => "TYPE",
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Namespace {
  Procedure,
  Value,
}

/// Where a symbol lives at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
  None,
  /// A cell in the data segment.
  Static { label: String },
  /// A slot relative to the frame pointer of the procedure at `level`.
  Frame { level: usize, offset: i32 },
  /// Entry label of a procedure whose body runs at `level`.
  Code { label: String, level: usize },
}

#[derive(Debug)]
pub struct Symbol {
  pub name: String,
  pub ty: Option<Type>,
  pub kind: SymbolKind,
  pub value: Option<String>,
  pub storage: Storage,
  parameters: OnceCell<Vec<SymbolRef>>,
}

pub type SymbolRef = Rc<Symbol>;

impl Symbol {
  fn new(
    name: &str,
    ty: Option<Type>,
    kind: SymbolKind,
    value: Option<String>,
    storage: Storage,
  ) -> Self {
    Self {
      name: name.to_string(),
      ty,
      kind,
      value,
      storage,
      parameters: OnceCell::new(),
    }
  }

  pub fn var(name: &str, ty: Type, storage: Storage) -> Self {
    Self::new(name, Some(ty), SymbolKind::Var, None, storage)
  }

  pub fn constant(name: &str, ty: Type, value: &str, storage: Storage) -> Self {
    Self::new(name, Some(ty), SymbolKind::Const, Some(value.to_string()), storage)
  }

  pub fn procedure(name: &str, return_type: Type, storage: Storage) -> Self {
    Self::new(name, Some(return_type), SymbolKind::Procedure, None, storage)
  }

  pub fn type_name(name: &str) -> Self {
    Self::new(name, None, SymbolKind::Type, None, Storage::None)
  }

  /// Declared type; the void type for symbols that carry none.
  pub fn ty(&self) -> Type {
    self.ty.clone().unwrap_or_else(Type::void)
  }

  /// Formal parameters of a procedure, empty until they are recorded.
  pub fn parameters(&self) -> &[SymbolRef] {
    self.parameters.get().map(Vec::as_slice).unwrap_or_default()
  }

  fn key(&self) -> (String, Namespace) {
    (self.name.clone(), self.kind.namespace())
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "N: {}  C: {}  ", self.name, self.kind)?;
    if let Some(ty) = &self.ty {
      write!(f, "T: {ty}  ")?;
    }
    if let Some(value) = &self.value {
      write!(f, "V: {value}  ")?;
    }
    Ok(())
  }
}

type Scope = IndexMap<(String, Namespace), SymbolRef>;

/// Stack of lexical scopes, innermost last.
#[derive(Debug)]
pub struct SymbolTable {
  scopes: Vec<Scope>,
}

impl Default for SymbolTable {
  fn default() -> Self {
    Self::new()
  }
}

impl SymbolTable {
  /// Root scope seeded with the builtin type names.
  pub fn new() -> Self {
    let mut table = Self {
      scopes: vec![Scope::new()],
    };
    for name in ["int", "char", "string", "void"] {
      table.add_symbol(Symbol::type_name(name));
    }
    table
  }

  /// Insert into the innermost scope; `None` when the name is already taken
  /// there in the same namespace.
  pub fn add_symbol(&mut self, symbol: Symbol) -> Option<SymbolRef> {
    let scope = self.scopes.last_mut()?;
    let key = symbol.key();
    if scope.contains_key(&key) {
      return None;
    }
    let symbol = Rc::new(symbol);
    scope.insert(key, Rc::clone(&symbol));
    Some(symbol)
  }

  /// Resolve a name from the innermost scope outward.
  pub fn get_symbol(&self, name: &str, kind: SymbolKind) -> Option<SymbolRef> {
    let key = (name.to_string(), kind.namespace());
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.get(&key))
      .cloned()
  }

  pub fn enter_scope(&mut self) {
    self.scopes.push(Scope::new());
  }

  /// Drop the innermost scope. The root scope is never popped.
  pub fn exit_scope(&mut self) {
    if self.scopes.len() > 1 {
      self.scopes.pop();
    }
  }

  /// Nesting depth; zero at the root.
  pub fn depth(&self) -> usize {
    self.scopes.len() - 1
  }

  /// Record a procedure's formal parameters. Returns false if they were
  /// already set.
  pub fn set_parameters(procedure: &Symbol, parameters: Vec<SymbolRef>) -> bool {
    procedure.parameters.set(parameters).is_ok()
  }
}

impl fmt::Display for SymbolTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "***** Symbol Table Contents *****")?;
    for (depth, scope) in self.scopes.iter().enumerate() {
      let indent = "-->".repeat(depth);
      for symbol in scope.values() {
        writeln!(f, "{indent}{symbol}")?;
      }
    }
    Ok(())
  }
}
