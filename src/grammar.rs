//! FIRST sets of the grammar's productions.
//!
//! The parser is predictive: it picks a production by checking whether the
//! lookahead is in that production's FIRST set, never by backtracking.

use std::fmt;

use crate::tokenizer::TokenKind;
use crate::tokenizer::TokenKind as T;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonTerminal {
  Relop,
  Op1,
  Op2,
  Selector,
  Parameters,
  Condition,
  ProcedureCall,
  Assignment,
  Input,
  Output,
  IfStatement,
  WhileStatement,
  ReturnStatement,
  ProcedureStatement,
  Statement,
  StatementSequence,
  Factor,
  Term,
  Expression,
  RetType,
  Type,
  Declarations,
  ProcedureFormalParams,
  ProcedureDeclarations,
  Program,
}

const STATEMENT: &[TokenKind] = &[
  T::Ident,
  T::Input,
  T::Print,
  T::If,
  T::While,
  T::Return,
  T::Colon,
];

const FACTOR: &[TokenKind] = &[T::Ident, T::Number, T::Colon, T::LParen];

impl NonTerminal {
  pub fn name(self) -> &'static str {
    match self {
      NonTerminal::Relop => "relop",
      NonTerminal::Op1 => "op1",
      NonTerminal::Op2 => "op2",
      NonTerminal::Selector => "selector",
      NonTerminal::Parameters => "parameters",
      NonTerminal::Condition => "condition",
      NonTerminal::ProcedureCall => "procedureCall",
      NonTerminal::Assignment => "assignment",
      NonTerminal::Input => "input",
      NonTerminal::Output => "output",
      NonTerminal::IfStatement => "ifStatement",
      NonTerminal::WhileStatement => "whileStatement",
      NonTerminal::ReturnStatement => "returnStatement",
      NonTerminal::ProcedureStatement => "procedureStatement",
      NonTerminal::Statement => "statement",
      NonTerminal::StatementSequence => "statementSequence",
      NonTerminal::Factor => "factor",
      NonTerminal::Term => "term",
      NonTerminal::Expression => "expression",
      NonTerminal::RetType => "retType",
      NonTerminal::Type => "type",
      NonTerminal::Declarations => "declarations",
      NonTerminal::ProcedureFormalParams => "procedureFormalParams",
      NonTerminal::ProcedureDeclarations => "procedureDeclarations",
      NonTerminal::Program => "program",
    }
  }

  pub fn first_set(self) -> &'static [TokenKind] {
    match self {
      NonTerminal::Relop => &[
        T::Equal,
        T::NotEqual,
        T::LessThan,
        T::LessEqual,
        T::GreaterThan,
        T::GreaterEqual,
      ],
      NonTerminal::Op1 => &[T::Mult, T::Div],
      NonTerminal::Op2 => &[T::Add, T::Sub],
      NonTerminal::Selector | NonTerminal::Parameters | NonTerminal::Assignment => &[T::Ident],
      NonTerminal::Condition => &[T::LParen],
      NonTerminal::ProcedureCall | NonTerminal::ProcedureStatement => &[T::Colon],
      NonTerminal::Input => &[T::Input],
      NonTerminal::Output => &[T::Print],
      NonTerminal::IfStatement => &[T::If],
      NonTerminal::WhileStatement => &[T::While],
      NonTerminal::ReturnStatement => &[T::Return],
      NonTerminal::Statement | NonTerminal::StatementSequence => STATEMENT,
      NonTerminal::Factor | NonTerminal::Term | NonTerminal::Expression => FACTOR,
      NonTerminal::RetType | NonTerminal::ProcedureDeclarations => {
        &[T::Int, T::String, T::Void, T::Char]
      }
      NonTerminal::Type | NonTerminal::ProcedureFormalParams => {
        &[T::Int, T::Char, T::String, T::Array]
      }
      NonTerminal::Declarations => &[T::Const, T::Var],
      NonTerminal::Program => &[
        T::Const,
        T::Var,
        T::Int,
        T::String,
        T::Void,
        T::Char,
        T::Main,
      ],
    }
  }

  pub fn starts_with(self, kind: TokenKind) -> bool {
    self.first_set().contains(&kind)
  }
}

impl fmt::Display for NonTerminal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Render a FIRST set the way diagnostics quote it: `[IDENT, NUMBER]`.
pub fn describe_first_set(nt: NonTerminal) -> String {
  let names: Vec<_> = nt.first_set().iter().map(|k| k.name()).collect();
  format!("[{}]", names.join(", "))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn statement_covers_every_statement_form() {
    for nt in [
      NonTerminal::Assignment,
      NonTerminal::Input,
      NonTerminal::Output,
      NonTerminal::IfStatement,
      NonTerminal::WhileStatement,
      NonTerminal::ReturnStatement,
      NonTerminal::ProcedureStatement,
    ] {
      for kind in nt.first_set() {
        assert!(NonTerminal::Statement.starts_with(*kind), "{nt} via {kind}");
      }
    }
  }

  #[test]
  fn expression_starts_like_factor() {
    assert!(NonTerminal::Expression.starts_with(T::Number));
    assert!(NonTerminal::Expression.starts_with(T::Colon));
    assert!(!NonTerminal::Expression.starts_with(T::StringLiteral));
    assert_eq!(describe_first_set(NonTerminal::Op2), "[ADD, SUB]");
  }
}
