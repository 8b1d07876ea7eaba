//! Types of the source language.
//!
//! Primitive types are interned: every request for `int` hands back the same
//! shared instance, and `Type` equality is pointer identity. Array types are
//! built fresh on every declaration and are therefore only equal to
//! themselves.

use std::fmt;
use std::sync::{Arc, LazyLock};

/// Size in bytes of one storage cell on the target.
pub const WORD_SIZE: usize = 4;

/// Largest object the target can address with a signed 32-bit offset.
pub const MAX_OBJECT_SIZE: usize = i32::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
  Int,
  Char,
  String,
  Void,
}

impl Primitive {
  pub fn name(self) -> &'static str {
    match self {
      Primitive::Int => "int",
      Primitive::Char => "char",
      Primitive::String => "string",
      Primitive::Void => "void",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "int" => Some(Primitive::Int),
      "char" => Some(Primitive::Char),
      "string" => Some(Primitive::String),
      "void" => Some(Primitive::Void),
      _ => None,
    }
  }
}

#[derive(Debug)]
pub enum TypeKind {
  Primitive(Primitive),
  Array { base: Type, dimension: usize },
}

/// Shared handle to a type; compares by identity.
#[derive(Debug, Clone)]
pub struct Type(Arc<TypeKind>);

static INT: LazyLock<Type> = LazyLock::new(|| Type::fresh(TypeKind::Primitive(Primitive::Int)));
static CHAR: LazyLock<Type> = LazyLock::new(|| Type::fresh(TypeKind::Primitive(Primitive::Char)));
static STRING: LazyLock<Type> =
  LazyLock::new(|| Type::fresh(TypeKind::Primitive(Primitive::String)));
static VOID: LazyLock<Type> = LazyLock::new(|| Type::fresh(TypeKind::Primitive(Primitive::Void)));

impl Type {
  fn fresh(kind: TypeKind) -> Self {
    Self(Arc::new(kind))
  }

  /// The canonical instance of a primitive type.
  pub fn primitive(primitive: Primitive) -> Self {
    match primitive {
      Primitive::Int => INT.clone(),
      Primitive::Char => CHAR.clone(),
      Primitive::String => STRING.clone(),
      Primitive::Void => VOID.clone(),
    }
  }

  pub fn int() -> Self {
    Self::primitive(Primitive::Int)
  }

  pub fn string() -> Self {
    Self::primitive(Primitive::String)
  }

  pub fn void() -> Self {
    Self::primitive(Primitive::Void)
  }

  /// Look a primitive up by its source spelling.
  pub fn named(name: &str) -> Option<Self> {
    Primitive::from_name(name).map(Self::primitive)
  }

  pub fn array_of(base: Type, dimension: usize) -> Self {
    Self::fresh(TypeKind::Array { base, dimension })
  }

  pub fn kind(&self) -> &TypeKind {
    &self.0
  }

  pub fn is_array(&self) -> bool {
    matches!(self.kind(), TypeKind::Array { .. })
  }

  pub fn is_primitive(&self, primitive: Primitive) -> bool {
    matches!(self.kind(), TypeKind::Primitive(p) if *p == primitive)
  }

  pub fn is_int(&self) -> bool {
    self.is_primitive(Primitive::Int)
  }

  pub fn is_string(&self) -> bool {
    self.is_primitive(Primitive::String)
  }

  /// Immediate element type of an array.
  pub fn base(&self) -> Option<&Type> {
    match self.kind() {
      TypeKind::Array { base, .. } => Some(base),
      TypeKind::Primitive(_) => None,
    }
  }

  /// Number of index brackets needed to reach the element type.
  pub fn arity(&self) -> usize {
    let mut arity = 0;
    let mut current = self;
    while let Some(base) = current.base() {
      arity += 1;
      current = base;
    }
    arity
  }

  /// The type left after indexing `levels` times, if the array is that deep.
  pub fn peel(&self, levels: usize) -> Option<&Type> {
    let mut current = self;
    for _ in 0..levels {
      current = current.base()?;
    }
    Some(current)
  }

  /// Innermost non-array type.
  pub fn element(&self) -> &Type {
    let mut current = self;
    while let Some(base) = current.base() {
      current = base;
    }
    current
  }

  /// Storage footprint in bytes; every scalar takes one word. Saturates at
  /// `usize::MAX` instead of wrapping.
  pub fn size(&self) -> usize {
    match self.kind() {
      TypeKind::Primitive(_) => WORD_SIZE,
      TypeKind::Array { base, dimension } => base.size().saturating_mul(*dimension),
    }
  }

  /// Whether the target can hold a value of this type.
  pub fn fits_target(&self) -> bool {
    self.size() <= MAX_OBJECT_SIZE
  }
}

impl PartialEq for Type {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl Eq for Type {}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind() {
      TypeKind::Primitive(p) => f.write_str(p.name()),
      TypeKind::Array { base, dimension } => write!(f, "array {dimension} of {base}"),
    }
  }
}
