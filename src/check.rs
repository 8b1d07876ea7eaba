//! Type rules applied while parsing.
//!
//! Each rule inspects the operand types the parser has just seen and either
//! accepts them, producing the type of the combined construct, or reports a
//! mismatch against the token that triggered the check. Types compare by
//! identity: two separately declared arrays never match, even with the same
//! shape.

use crate::context::{arity, mismatch};
use crate::error::{CompileError, CompileResult};
use crate::symbol::Symbol;
use crate::tokenizer::Token;
use crate::ty::Type;

const INVALID_ARGUMENT: &str = "Invalid argument: ";
const INVALID_RETURN: &str = "Invalid return: ";
const INVALID_ASSIGNMENT: &str = "Invalid assignment: ";
const INVALID_OPERATOR: &str = "Invalid operator usage: ";
const INVALID_REFERENCE: &str = "Invalid array reference: ";
const INVALID_CALL: &str = "Invalid call: ";

/// Result of parsing an expression-like construct: its type, and the variable
/// it came from when it is a plain selector.
#[derive(Debug, Clone)]
pub struct Node {
  pub ty: Type,
  pub name: Option<String>,
}

impl Node {
  pub fn new(ty: Type) -> Self {
    Self { ty, name: None }
  }

  pub fn named(ty: Type, name: &str) -> Self {
    Self {
      ty,
      name: Some(name.to_string()),
    }
  }
}

/// An index expression must be an `int`, and the indexed variable an array.
pub fn array_index(declared: &Type, index: &Node, ident: &Token) -> CompileResult<()> {
  if declared.is_array() && index.ty.is_int() {
    return Ok(());
  }
  Err(mismatch(
    ident,
    format!("{INVALID_REFERENCE}base = {declared}, index = {}", index.ty),
  ))
}

/// Type designated by a selector after `brackets` index operations on a
/// variable declared as `declared`. Indexing past the element type falls back
/// to the declared array type.
pub fn selected_type(declared: &Type, brackets: usize) -> Type {
  match declared.peel(brackets) {
    Some(ty) => ty.clone(),
    None => declared.clone(),
  }
}

fn operator_error(lhs: &Node, op: &Token, rhs: &Node) -> CompileError {
  mismatch(
    op,
    format!("{INVALID_OPERATOR}{} {} {}", lhs.ty, op.lexeme, rhs.ty),
  )
}

fn reject_arrays(lhs: &Node, op: &Token, rhs: &Node) -> CompileResult<()> {
  if lhs.ty.is_array() || rhs.ty.is_array() {
    return Err(operator_error(lhs, op, rhs));
  }
  Ok(())
}

fn operands_agree(lhs: &Node, op: &Token, rhs: &Node) -> CompileResult<()> {
  reject_arrays(lhs, op, rhs)?;
  if lhs.ty != rhs.ty {
    return Err(operator_error(lhs, op, rhs));
  }
  Ok(())
}

/// `*` and `/` need two operands of one non-array type.
pub fn term(lhs: Node, op: &Token, rhs: &Node) -> CompileResult<Node> {
  operands_agree(&lhs, op, rhs)?;
  Ok(lhs)
}

/// `+` and `-` need two operands of one non-array type, unless one of them is
/// a `string`: then any scalar goes, the enclosing statement is marked
/// string-bearing and the result is a `string`.
pub fn expression(
  lhs: Node,
  op: &Token,
  rhs: &Node,
  string_present: &mut bool,
) -> CompileResult<Node> {
  reject_arrays(&lhs, op, rhs)?;
  if lhs.ty.is_string() || rhs.ty.is_string() {
    *string_present = true;
    return Ok(Node {
      ty: Type::string(),
      name: lhs.name,
    });
  }
  operands_agree(&lhs, op, rhs)?;
  Ok(lhs)
}

/// Arrays are never compared. In a string-bearing statement only the left
/// side has to be a `string`; otherwise both sides share one type.
pub fn condition(lhs: &Node, op: &Token, rhs: &Node, string_present: bool) -> CompileResult<()> {
  if !string_present {
    return operands_agree(lhs, op, rhs);
  }
  reject_arrays(lhs, op, rhs)?;
  if !lhs.ty.is_string() {
    return Err(operator_error(lhs, op, rhs));
  }
  Ok(())
}

/// Arrays are never assigned whole. Otherwise the types must agree, except
/// that a `string` target accepts any string-bearing expression.
pub fn assignment(lhs: &Node, op: &Token, rhs: &Node, string_present: bool) -> CompileResult<()> {
  let scalars = !lhs.ty.is_array() && !rhs.ty.is_array();
  if scalars && (lhs.ty == rhs.ty || (string_present && lhs.ty.is_string())) {
    return Ok(());
  }
  Err(mismatch(
    op,
    format!("{INVALID_ASSIGNMENT}{} <- {}", lhs.ty, rhs.ty),
  ))
}

/// Only a `string` target accepts a string literal.
pub fn assignment_literal(lhs: &Node, op: &Token) -> CompileResult<()> {
  if lhs.ty.is_string() {
    return Ok(());
  }
  Err(mismatch(
    op,
    format!("{INVALID_ASSIGNMENT}{} <- string literal", lhs.ty),
  ))
}

/// Whole arrays cannot be passed to procedures or I/O statements.
pub fn scalar_argument(argument: &Symbol, owner: &Token) -> CompileResult<()> {
  let ty = argument.ty();
  if ty.is_array() {
    return Err(mismatch(
      owner,
      format!("{INVALID_ARGUMENT}{}, {ty}", argument.name),
    ));
  }
  Ok(())
}

/// Formal parameters are scalars as well.
pub fn formal_parameter(ty: &Type, ident: &Token, procedure: &Token) -> CompileResult<()> {
  if ty.is_array() {
    return Err(mismatch(
      procedure,
      format!("{INVALID_ARGUMENT}{}, {ty}", ident.lexeme),
    ));
  }
  Ok(())
}

/// Match actual arguments against a procedure's formals: a count difference
/// is an arity error, a type difference a mismatch.
pub fn call_arguments(
  procedure: &Symbol,
  callee: &Token,
  arguments: &[impl AsRef<Symbol>],
) -> CompileResult<()> {
  let formals = procedure.parameters();
  let same_count = formals.len() == arguments.len();
  let same_types = formals
    .iter()
    .zip(arguments)
    .all(|(formal, actual)| formal.ty() == actual.as_ref().ty());
  if same_count && same_types {
    return Ok(());
  }

  let expected: Vec<_> = formals.iter().map(|f| f.ty().to_string()).collect();
  let given: Vec<_> = arguments
    .iter()
    .map(|a| a.as_ref().ty().to_string())
    .collect();
  let detail = format!(
    "{INVALID_CALL}{}({}) with ({})",
    procedure.name,
    expected.join(", "),
    given.join(", ")
  );
  if !same_count {
    return Err(arity(callee, detail));
  }
  Err(mismatch(callee, detail))
}

/// A `return` yields the enclosing procedure's declared type; in `main`
/// that is `void`.
pub fn return_value(
  procedure: Option<&Symbol>,
  keyword: &Token,
  value: &Node,
) -> CompileResult<()> {
  let expected = procedure.map_or_else(Type::void, Symbol::ty);
  if expected == value.ty {
    return Ok(());
  }
  Err(mismatch(
    keyword,
    format!("{INVALID_RETURN}expected = {expected}, received = {}", value.ty),
  ))
}
