//! Recursive-descent parser that checks types and emits code in the same pass.
//!
//! Every production is a free function over the shared `CompilerContext`.
//! Expressions leave their value on the runtime stack; selectors leave an
//! address. There is no tree: by the time a production returns, its code is
//! already in the text segment.

use std::str::FromStr;

use crate::check::{self, Node};
use crate::codegen::{CodeGen, FIRST_ARGUMENT_OFFSET, Relop};
use crate::context::{CompilerContext, internal, out_of_range};
use crate::error::CompileResult;
use crate::grammar::NonTerminal;
use crate::symbol::{Storage, Symbol, SymbolKind, SymbolRef, SymbolTable};
use crate::tokenizer::{Token, TokenKind};
use crate::ty::{MAX_OBJECT_SIZE, Type, WORD_SIZE};

/// Epilogue label of `main`; a `return` there ends the program.
pub const MAIN_RETURN: &str = "proc.main.return";

/// Value of a NUMBER token, or a syntax error on it when `T` cannot hold it.
fn literal<T: FromStr>(number: &Token, expected: &str) -> CompileResult<T> {
  number
    .lexeme
    .parse()
    .map_err(|_| out_of_range(number, expected))
}

fn return_label(procedure: &Symbol) -> CompileResult<String> {
  match &procedure.storage {
    Storage::Code { label, .. } => Ok(format!("{label}.return")),
    _ => Err(internal(format!("procedure {} has no code label", procedure.name))),
  }
}

/// program := [declarations] [procedureDeclarations] "main" "(" ")"
///            "{" [declarations] statementSequence "}" EOF
pub fn parse_program(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::Program)?;
  if cx.have_nt(NonTerminal::Declarations) {
    parse_declarations(cx)?;
  }
  if cx.have_nt(NonTerminal::ProcedureDeclarations) {
    parse_procedure_declarations(cx)?;
  }

  cx.expect(TokenKind::Main)?;
  cx.expect(TokenKind::LParen)?;
  cx.expect(TokenKind::RParen)?;
  cx.expect(TokenKind::LBrace)?;
  cx.enter_scope("main");
  let entry = cx.codegen.next_instruction();
  cx.codegen.set_main_entry(entry);
  if cx.have_nt(NonTerminal::Declarations) {
    parse_declarations(cx)?;
  }
  parse_statement_sequence(cx)?;
  cx.expect(TokenKind::RBrace)?;
  cx.codegen.place_label(MAIN_RETURN);
  cx.codegen.insert_exit_sequence();
  cx.exit_scope();

  cx.expect(TokenKind::Eof)?;
  cx.exit_rule();
  Ok(())
}

/// declarations := { "const" IDENT "=" NUMBER ";"
///                 | "var" IDENT {"," IDENT} ":" type ";" }
pub fn parse_declarations(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::Declarations)?;
  while cx.have_nt(NonTerminal::Declarations) {
    if cx.accept(TokenKind::Const) {
      let ident = cx.expect(TokenKind::Ident)?;
      cx.expect(TokenKind::Assign)?;
      let value = cx.expect(TokenKind::Number)?;
      let word: i32 = literal(&value, "32-bit integer")?;
      let label = cx.static_label(&ident.lexeme);
      let storage = Storage::Static {
        label: label.clone(),
      };
      let constant = Symbol::constant(&ident.lexeme, Type::int(), &value.lexeme, storage);
      cx.declare(&ident, constant)?;
      let word = word.to_string();
      cx.codegen.declare_const_or_var(&label, &Type::int(), Some(&word));
      cx.expect(TokenKind::Semicolon)?;
      continue;
    }

    cx.expect(TokenKind::Var)?;
    let mut names = vec![cx.expect(TokenKind::Ident)?];
    while cx.accept(TokenKind::Comma) {
      names.push(cx.expect(TokenKind::Ident)?);
    }
    cx.expect(TokenKind::Colon)?;
    let ty = parse_type(cx)?;
    for ident in &names {
      let storage = cx.allocate(ident, &ty)?;
      if let Storage::Static { label } = &storage {
        cx.codegen.declare_const_or_var(label, &ty, None);
      }
      cx.declare(ident, Symbol::var(&ident.lexeme, ty.clone(), storage))?;
    }
    cx.expect(TokenKind::Semicolon)?;
  }
  cx.exit_rule();
  Ok(())
}

/// type := "int" | "char" | "string" | "array" NUMBER "of" type
pub fn parse_type(cx: &mut CompilerContext) -> CompileResult<Type> {
  cx.enter_rule(NonTerminal::Type)?;
  let ty = match cx.kind() {
    TokenKind::Int | TokenKind::Char | TokenKind::String => {
      let keyword = cx.expect(cx.kind())?;
      Type::named(&keyword.lexeme)
        .ok_or_else(|| internal(format!("{} is not a builtin type", keyword.lexeme)))?
    }
    _ => {
      cx.expect(TokenKind::Array)?;
      let size = cx.expect(TokenKind::Number)?;
      let dimension = literal(&size, "array dimension")?;
      cx.expect(TokenKind::Of)?;
      let array = Type::array_of(parse_type(cx)?, dimension);
      if !array.fits_target() {
        let expected = format!("array of at most {MAX_OBJECT_SIZE} bytes");
        return Err(out_of_range(&size, expected));
      }
      array
    }
  };
  cx.exit_rule();
  Ok(ty)
}

/// retType := "int" | "char" | "string" | "void"
pub fn parse_ret_type(cx: &mut CompilerContext) -> CompileResult<Type> {
  cx.enter_rule(NonTerminal::RetType)?;
  let keyword = cx.expect_nt(NonTerminal::RetType)?;
  cx.exit_rule();
  Type::named(&keyword.lexeme)
    .ok_or_else(|| internal(format!("{} is not a builtin type", keyword.lexeme)))
}

/// procedureDeclarations := { retType IDENT "(" [procedureFormalParams] ")"
///                            "{" [declarations] [procedureDeclarations]
///                            statementSequence "}" }
///
/// Nested procedures are emitted ahead of the enclosing body, so the
/// enclosing prologue is placed only once its own nested declarations are
/// done.
pub fn parse_procedure_declarations(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::ProcedureDeclarations)?;
  while cx.have_nt(NonTerminal::ProcedureDeclarations) {
    let return_type = parse_ret_type(cx)?;
    let ident = cx.expect(TokenKind::Ident)?;
    let level = cx.level + 1;
    let label = cx.procedure_label(&ident.lexeme);
    let storage = Storage::Code {
      label: label.clone(),
      level,
    };
    let procedure = cx.declare(
      &ident,
      Symbol::procedure(&ident.lexeme, return_type, storage),
    )?;

    cx.enter_scope(&ident.lexeme);
    let outer_level = std::mem::replace(&mut cx.level, level);
    let outer_procedure = cx.procedure.replace(SymbolRef::clone(&procedure));
    let outer_locals = cx.codegen.reset_local_location();

    cx.expect(TokenKind::LParen)?;
    let parameters = if cx.have_nt(NonTerminal::ProcedureFormalParams) {
      parse_procedure_formal_params(cx, &ident)?
    } else {
      Vec::new()
    };
    if !SymbolTable::set_parameters(&procedure, parameters) {
      return Err(internal(format!("parameters of {} recorded twice", ident.lexeme)));
    }
    cx.expect(TokenKind::RParen)?;
    cx.expect(TokenKind::LBrace)?;
    if cx.have_nt(NonTerminal::Declarations) {
      parse_declarations(cx)?;
    }
    if cx.have_nt(NonTerminal::ProcedureDeclarations) {
      parse_procedure_declarations(cx)?;
    }

    let frame_size = cx.codegen.local_frame_size();
    cx.codegen.enter_procedure(&label, frame_size);
    parse_statement_sequence(cx)?;
    cx.expect(TokenKind::RBrace)?;
    cx.codegen.leave_procedure(&return_label(&procedure)?);

    cx.codegen.restore_local_location(outer_locals);
    cx.procedure = outer_procedure;
    cx.level = outer_level;
    cx.exit_scope();
  }
  cx.exit_rule();
  Ok(())
}

/// procedureFormalParams := type IDENT {"," type IDENT}
///
/// Arguments are pushed left to right before the static link, so the last
/// one sits nearest the frame pointer.
pub fn parse_procedure_formal_params(
  cx: &mut CompilerContext,
  procedure: &Token,
) -> CompileResult<Vec<SymbolRef>> {
  cx.enter_rule(NonTerminal::ProcedureFormalParams)?;
  let mut formals = Vec::new();
  loop {
    let ty = parse_type(cx)?;
    let ident = cx.expect(TokenKind::Ident)?;
    check::formal_parameter(&ty, &ident, procedure)?;
    formals.push((ident, ty));
    if !cx.accept(TokenKind::Comma) {
      break;
    }
  }

  let count = formals.len();
  let mut parameters = Vec::with_capacity(count);
  for (i, (ident, ty)) in formals.into_iter().enumerate() {
    let offset = WORD_SIZE
      .checked_mul(count - 1 - i)
      .and_then(|above| i32::try_from(above).ok())
      .and_then(|above| FIRST_ARGUMENT_OFFSET.checked_add(above))
      .ok_or_else(|| out_of_range(&ident, "fewer parameters"))?;
    let storage = Storage::Frame {
      level: cx.level,
      offset,
    };
    parameters.push(cx.declare(&ident, Symbol::var(&ident.lexeme, ty, storage))?);
  }
  cx.exit_rule();
  Ok(parameters)
}

/// statementSequence := statement {statement}
pub fn parse_statement_sequence(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::StatementSequence)?;
  loop {
    parse_statement(cx)?;
    if !cx.have_nt(NonTerminal::Statement) {
      break;
    }
  }
  cx.exit_rule();
  Ok(())
}

pub fn parse_statement(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::Statement)?;
  match cx.kind() {
    TokenKind::Ident => parse_assignment(cx)?,
    TokenKind::Input => parse_input(cx)?,
    TokenKind::Print => parse_output(cx)?,
    TokenKind::If => parse_if_statement(cx)?,
    TokenKind::While => parse_while_statement(cx)?,
    TokenKind::Return => parse_return_statement(cx)?,
    _ => parse_procedure_statement(cx)?,
  }
  cx.exit_rule();
  Ok(())
}

/// assignment := selector "=" (expression | STRING_LITERAL) ";"
pub fn parse_assignment(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.string_present = false;
  cx.enter_rule(NonTerminal::Assignment)?;
  cx.codegen.comment("assignment");
  let target = parse_selector(cx)?;
  let op = cx.expect(TokenKind::Assign)?;
  if cx.have_nt(NonTerminal::Expression) {
    let value = parse_expression(cx)?;
    check::assignment(&target, &op, &value, cx.string_present)?;
  } else {
    check::assignment_literal(&target, &op)?;
    let literal = cx.expect(TokenKind::StringLiteral)?;
    let label = cx.codegen.string_literal(&literal.lexeme);
    cx.codegen.push_data_address(&label)?;
  }
  cx.codegen.store_popped()?;
  if let Some(name) = &target.name {
    cx.codegen.annotate_last(format!("{name} ="));
  }
  cx.expect(TokenKind::Semicolon)?;
  cx.exit_rule();
  cx.string_present = false;
  Ok(())
}

/// selector := IDENT {"[" expression "]"}
///
/// Leaves the address of the selected cell on the stack. Every selector
/// clears the string-bearing flag, so only operators seen after the last
/// selector of an expression count.
pub fn parse_selector(cx: &mut CompilerContext) -> CompileResult<Node> {
  cx.enter_rule(NonTerminal::Selector)?;
  let ident = cx.expect(TokenKind::Ident)?;
  let variable = cx.resolve(&ident, SymbolKind::Var)?;
  let declared = variable.ty();
  cx.codegen.push_address(&variable.storage, cx.level)?;
  cx.codegen.annotate_last(format!("&{}", variable.name));

  let mut brackets = 0;
  while cx.accept(TokenKind::LBracket) {
    let index = parse_expression(cx)?;
    check::array_index(&declared, &index, &ident)?;
    brackets += 1;
    let stride = declared.peel(brackets).map_or(WORD_SIZE, Type::size);
    cx.codegen.index_address(stride)?;
    cx.expect(TokenKind::RBracket)?;
  }
  cx.exit_rule();
  cx.string_present = false;
  Ok(Node::named(
    check::selected_type(&declared, brackets),
    &variable.name,
  ))
}

/// parameters := IDENT {"," IDENT}
///
/// Whole arrays are rejected as soon as they are seen, against `owner`.
pub fn parse_parameters(cx: &mut CompilerContext, owner: &Token) -> CompileResult<Vec<SymbolRef>> {
  cx.enter_rule(NonTerminal::Parameters)?;
  let mut arguments = Vec::new();
  loop {
    let ident = cx.expect(TokenKind::Ident)?;
    let argument = cx.resolve(&ident, SymbolKind::Var)?;
    check::scalar_argument(&argument, owner)?;
    arguments.push(argument);
    if !cx.accept(TokenKind::Comma) {
      break;
    }
  }
  cx.exit_rule();
  Ok(arguments)
}

/// input := "input" "(" parameters ")" ";"
pub fn parse_input(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::Input)?;
  let keyword = cx.expect(TokenKind::Input)?;
  cx.expect(TokenKind::LParen)?;
  let arguments = parse_parameters(cx, &keyword)?;
  for argument in &arguments {
    cx.codegen.comment(format!("input {}", argument.name));
    let addr = cx.codegen.temp()?;
    cx.codegen.load_address(addr, &argument.storage, cx.level)?;
    cx.codegen.insert_input_sequence(addr)?;
    cx.codegen.release(addr);
  }
  cx.expect(TokenKind::RParen)?;
  cx.expect(TokenKind::Semicolon)?;
  cx.exit_rule();
  Ok(())
}

/// output := "print" "(" parameters ")" ";"
pub fn parse_output(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::Output)?;
  let keyword = cx.expect(TokenKind::Print)?;
  cx.expect(TokenKind::LParen)?;
  let arguments = parse_parameters(cx, &keyword)?;
  for argument in &arguments {
    cx.codegen.comment(format!("print {}", argument.name));
    let addr = cx.codegen.temp()?;
    cx.codegen.load_address(addr, &argument.storage, cx.level)?;
    cx.codegen.insert_print_sequence(addr, &argument.ty())?;
    cx.codegen.release(addr);
  }
  cx.expect(TokenKind::RParen)?;
  cx.expect(TokenKind::Semicolon)?;
  cx.exit_rule();
  Ok(())
}

/// ifStatement := "if" condition "{" statementSequence "}"
///                ["else" "{" statementSequence "}"]
pub fn parse_if_statement(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::IfStatement)?;
  let else_label = cx.codegen.make_label();
  cx.expect(TokenKind::If)?;
  parse_condition(cx, &else_label)?;
  cx.expect(TokenKind::LBrace)?;
  parse_statement_sequence(cx)?;
  cx.expect(TokenKind::RBrace)?;
  if cx.accept(TokenKind::Else) {
    let end_label = cx.codegen.make_label();
    cx.codegen.jump(&end_label);
    cx.codegen.place_label(&else_label);
    cx.expect(TokenKind::LBrace)?;
    parse_statement_sequence(cx)?;
    cx.expect(TokenKind::RBrace)?;
    cx.codegen.place_label(&end_label);
  } else {
    cx.codegen.place_label(&else_label);
  }
  cx.exit_rule();
  Ok(())
}

/// whileStatement := "while" condition "{" statementSequence "}"
pub fn parse_while_statement(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::WhileStatement)?;
  let top = cx.codegen.make_label();
  let exit = cx.codegen.make_label();
  cx.codegen.place_label(&top);
  cx.expect(TokenKind::While)?;
  parse_condition(cx, &exit)?;
  cx.expect(TokenKind::LBrace)?;
  parse_statement_sequence(cx)?;
  cx.expect(TokenKind::RBrace)?;
  cx.codegen.jump(&top);
  cx.codegen.place_label(&exit);
  cx.exit_rule();
  Ok(())
}

/// returnStatement := "return" expression ";"
pub fn parse_return_statement(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.string_present = false;
  cx.enter_rule(NonTerminal::ReturnStatement)?;
  let keyword = cx.expect(TokenKind::Return)?;
  let value = parse_expression(cx)?;
  check::return_value(cx.procedure.as_deref(), &keyword, &value)?;
  let label = match &cx.procedure {
    Some(procedure) => return_label(procedure)?,
    None => MAIN_RETURN.to_string(),
  };
  cx.codegen.return_value(&label)?;
  cx.expect(TokenKind::Semicolon)?;
  cx.exit_rule();
  cx.string_present = false;
  Ok(())
}

/// procedureStatement := procedureCall ";"
pub fn parse_procedure_statement(cx: &mut CompilerContext) -> CompileResult<()> {
  cx.enter_rule(NonTerminal::ProcedureStatement)?;
  parse_procedure_call(cx, false)?;
  cx.expect(TokenKind::Semicolon)?;
  cx.exit_rule();
  Ok(())
}

/// procedureCall := ":" ":" IDENT "(" [parameters] ")"
///
/// When the call is part of an expression its result is pushed.
pub fn parse_procedure_call(cx: &mut CompilerContext, in_expression: bool) -> CompileResult<Node> {
  cx.enter_rule(NonTerminal::ProcedureCall)?;
  cx.expect(TokenKind::Colon)?;
  cx.expect(TokenKind::Colon)?;
  let ident = cx.expect(TokenKind::Ident)?;
  let procedure = cx.resolve(&ident, SymbolKind::Procedure)?;
  cx.expect(TokenKind::LParen)?;
  let arguments = if cx.have_nt(NonTerminal::Parameters) {
    parse_parameters(cx, &ident)?
  } else {
    Vec::new()
  };
  check::call_arguments(&procedure, &ident, &arguments)?;
  cx.expect(TokenKind::RParen)?;

  let Storage::Code {
    label,
    level: callee_level,
  } = &procedure.storage
  else {
    return Err(internal(format!("procedure {} has no code label", procedure.name)));
  };
  cx.codegen.comment(format!("call {}", procedure.name));
  for argument in &arguments {
    cx.codegen.push_value(&argument.storage, cx.level)?;
  }
  cx.codegen.push_static_link(*callee_level, cx.level)?;
  cx.codegen.call(label, arguments.len());
  if in_expression {
    cx.codegen.push_result()?;
  }
  cx.exit_rule();
  Ok(Node::new(procedure.ty()))
}

/// condition := "(" expression relop expression ")"
///
/// Falls through when the comparison holds and branches to `false_label`
/// otherwise.
pub fn parse_condition(cx: &mut CompilerContext, false_label: &str) -> CompileResult<()> {
  cx.string_present = false;
  cx.enter_rule(NonTerminal::Condition)?;
  cx.expect(TokenKind::LParen)?;
  let lhs = parse_expression(cx)?;
  let op = cx.expect_nt(NonTerminal::Relop)?;
  let rhs = parse_expression(cx)?;
  check::condition(&lhs, &op, &rhs, cx.string_present)?;
  let relop = Relop::from_token(op.kind)
    .ok_or_else(|| internal(format!("{} is not a comparison", op.kind)))?;
  cx.codegen.cond(relop, false_label)?;
  cx.expect(TokenKind::RParen)?;
  cx.exit_rule();
  cx.string_present = false;
  Ok(())
}

/// Pop both operands of a binary operator and push the result.
fn emit_binary(cx: &mut CompilerContext, op: &Token) -> CompileResult<()> {
  let combine = match op.kind {
    TokenKind::Add => CodeGen::add,
    TokenKind::Sub => CodeGen::sub,
    TokenKind::Mult => CodeGen::mul,
    TokenKind::Div => CodeGen::div,
    other => return Err(internal(format!("{other} is not an arithmetic operator"))),
  };
  let right = cx.codegen.pop()?;
  let left = cx.codegen.pop()?;
  combine(&mut cx.codegen, right, left);
  cx.codegen.release(right);
  cx.codegen.release(left);
  Ok(())
}

/// expression := term {("+" | "-") term}
pub fn parse_expression(cx: &mut CompilerContext) -> CompileResult<Node> {
  cx.enter_rule(NonTerminal::Expression)?;
  let mut lhs = parse_term(cx)?;
  while let Some(op) = cx.accept_nt(NonTerminal::Op2) {
    let rhs = parse_term(cx)?;
    lhs = check::expression(lhs, &op, &rhs, &mut cx.string_present)?;
    emit_binary(cx, &op)?;
  }
  cx.exit_rule();
  Ok(lhs)
}

/// term := factor {("*" | "/") factor}
pub fn parse_term(cx: &mut CompilerContext) -> CompileResult<Node> {
  cx.enter_rule(NonTerminal::Term)?;
  let mut lhs = parse_factor(cx)?;
  while let Some(op) = cx.accept_nt(NonTerminal::Op1) {
    let rhs = parse_factor(cx)?;
    lhs = check::term(lhs, &op, &rhs)?;
    emit_binary(cx, &op)?;
  }
  cx.exit_rule();
  Ok(lhs)
}

/// factor := selector | NUMBER | procedureCall | "(" expression ")"
pub fn parse_factor(cx: &mut CompilerContext) -> CompileResult<Node> {
  cx.enter_rule(NonTerminal::Factor)?;
  let node = match cx.kind() {
    TokenKind::Ident => {
      let node = parse_selector(cx)?;
      cx.codegen.deref()?;
      node
    }
    TokenKind::Number => {
      let number = cx.expect(TokenKind::Number)?;
      cx.codegen.push_immediate(literal(&number, "32-bit integer")?)?;
      Node::new(Type::int())
    }
    TokenKind::Colon => parse_procedure_call(cx, true)?,
    _ => {
      cx.expect(TokenKind::LParen)?;
      let node = parse_expression(cx)?;
      cx.expect(TokenKind::RParen)?;
      node
    }
  };
  cx.exit_rule();
  Ok(node)
}
