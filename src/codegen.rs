//! Code generation: accumulate SPIM assembly while the parser walks the input.
//!
//! The emitter uses a simple stack machine: every expression leaves a single
//! word on the runtime stack and consumers pop what they need into scratch
//! registers. Registers come from two fixed pools of eight (`$t0-$t7` and
//! `$s0-$s7`). There is no spilling, so a well-formed program must never need
//! more than eight live registers of one class at a time.

use std::fmt;

use log::{debug, trace};

use crate::error::{CompileResult, InternalSnafu, RegisterExhaustedSnafu};
use crate::symbol::Storage;
use crate::tokenizer::TokenKind;
use crate::ty::{Primitive, Type, TypeKind, WORD_SIZE};

const POOL_SIZE: u8 = 8;

/// Offset of the static link from the frame pointer.
const STATIC_LINK_OFFSET: i32 = 8;

/// Offset of the last argument from the frame pointer; earlier arguments sit
/// one word higher each.
pub const FIRST_ARGUMENT_OFFSET: i32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
  Temp,
  Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
  pub class: RegisterClass,
  pub index: u8,
}

impl fmt::Display for Register {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.class {
      RegisterClass::Temp => write!(f, "$t{}", self.index),
      RegisterClass::Saved => write!(f, "$s{}", self.index),
    }
  }
}

/// Eight-slot allocator; a set bit marks a register in use.
#[derive(Debug, Default, Clone, Copy)]
struct RegisterPool {
  used: u8,
}

impl RegisterPool {
  fn acquire(&mut self) -> Option<u8> {
    let index = (0..POOL_SIZE).find(|i| self.used & (1 << i) == 0)?;
    self.used |= 1 << index;
    Some(index)
  }

  fn release(&mut self, index: u8) {
    debug_assert!(self.used & (1 << index) != 0, "double release of register {index}");
    self.used &= !(1 << index);
  }

  fn in_use(&self) -> u32 {
    self.used.count_ones()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
  Add,
  Sub,
  Mul,
  Div,
}

impl ArithOp {
  fn mnemonic(self) -> &'static str {
    match self {
      ArithOp::Add => "add",
      ArithOp::Sub => "sub",
      ArithOp::Mul => "mul",
      ArithOp::Div => "div",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relop {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

impl Relop {
  pub fn from_token(kind: TokenKind) -> Option<Self> {
    match kind {
      TokenKind::Equal => Some(Relop::Eq),
      TokenKind::NotEqual => Some(Relop::Ne),
      TokenKind::LessThan => Some(Relop::Lt),
      TokenKind::LessEqual => Some(Relop::Le),
      TokenKind::GreaterThan => Some(Relop::Gt),
      TokenKind::GreaterEqual => Some(Relop::Ge),
      _ => None,
    }
  }

  fn mnemonic(self) -> &'static str {
    match self {
      Relop::Eq => "seq",
      Relop::Ne => "sne",
      Relop::Lt => "slt",
      Relop::Le => "sle",
      Relop::Gt => "sgt",
      Relop::Ge => "sge",
    }
  }
}

#[derive(Debug, Default)]
pub struct CodeGen {
  text: Vec<String>,
  data: Vec<String>,
  temps: RegisterPool,
  saved: RegisterPool,
  next_label: usize,
  next_local_offset: usize,
  next_string: usize,
  main_entry: Option<usize>,
  annotate: bool,
}

impl CodeGen {
  pub fn new(annotate: bool) -> Self {
    Self {
      annotate,
      ..Self::default()
    }
  }

  // ---------- segments ----------

  pub fn emit(&mut self, instr: impl AsRef<str>) {
    let line = format!("    {}", instr.as_ref());
    trace!("emit {}", line.trim_start());
    self.text.push(line);
  }

  /// Standalone comment line, only when annotations are enabled.
  pub fn comment(&mut self, text: impl AsRef<str>) {
    if self.annotate {
      self.text.push(format!("    # {}", text.as_ref()));
    }
  }

  /// Append a trailing comment to the most recent instruction.
  pub fn annotate_last(&mut self, text: impl AsRef<str>) {
    if self.annotate
      && let Some(last) = self.text.last_mut()
    {
      last.push_str("\t# ");
      last.push_str(text.as_ref());
    }
  }

  pub fn insert_data(&mut self, line: impl Into<String>) {
    self.data.push(line.into());
  }

  pub fn text(&self) -> &[String] {
    &self.text
  }

  pub fn next_instruction(&self) -> usize {
    self.text.len()
  }

  // ---------- labels ----------

  pub fn make_label(&mut self) -> String {
    let label = format!("label.{}", self.next_label);
    self.next_label += 1;
    debug!("allocated {label}");
    label
  }

  /// How many labels have been handed out so far.
  pub fn labels_allocated(&self) -> usize {
    self.next_label
  }

  pub fn place_label(&mut self, label: &str) {
    self.text.push(format!("{label}:"));
  }

  pub fn jump(&mut self, label: &str) {
    self.emit(format!("j {label}"));
  }

  // ---------- registers ----------

  pub fn acquire_temp(&mut self) -> Option<Register> {
    self.temps.acquire().map(|index| Register {
      class: RegisterClass::Temp,
      index,
    })
  }

  pub fn acquire_saved(&mut self) -> Option<Register> {
    self.saved.acquire().map(|index| Register {
      class: RegisterClass::Saved,
      index,
    })
  }

  /// Like `acquire_temp`, but pool exhaustion is an internal error.
  pub fn temp(&mut self) -> CompileResult<Register> {
    self
      .acquire_temp()
      .ok_or_else(|| RegisterExhaustedSnafu { pool: "temporary" }.build())
  }

  pub fn saved_temp(&mut self) -> CompileResult<Register> {
    self
      .acquire_saved()
      .ok_or_else(|| RegisterExhaustedSnafu { pool: "saved" }.build())
  }

  pub fn release(&mut self, reg: Register) {
    match reg.class {
      RegisterClass::Temp => self.temps.release(reg.index),
      RegisterClass::Saved => self.saved.release(reg.index),
    }
  }

  /// Registers currently held across both pools.
  pub fn registers_in_use(&self) -> u32 {
    self.temps.in_use() + self.saved.in_use()
  }

  // ---------- runtime stack ----------

  pub fn push(&mut self, reg: Register) {
    self.emit(format!("addi $sp, $sp, -{WORD_SIZE}"));
    self.emit(format!("sw {reg}, 0($sp)"));
  }

  /// Pop the top of the runtime stack into a fresh temporary.
  pub fn pop(&mut self) -> CompileResult<Register> {
    let reg = self.temp()?;
    self.emit(format!("lw {reg}, 0($sp)"));
    self.emit(format!("addi $sp, $sp, {WORD_SIZE}"));
    Ok(reg)
  }

  /// Load an immediate and push it.
  pub fn push_immediate(&mut self, value: i32) -> CompileResult<()> {
    let reg = self.temp()?;
    self.emit(format!("li {reg}, {value}"));
    self.push(reg);
    self.release(reg);
    Ok(())
  }

  /// Replace the address on top of the stack with the word it points at.
  pub fn deref(&mut self) -> CompileResult<()> {
    let reg = self.pop()?;
    self.emit(format!("lw {reg}, 0({reg})"));
    self.push(reg);
    self.release(reg);
    Ok(())
  }

  /// Pop a value, then an address, and store the value there.
  pub fn store_popped(&mut self) -> CompileResult<()> {
    let value = self.pop()?;
    let addr = self.pop()?;
    self.emit(format!("sw {value}, 0({addr})"));
    self.release(value);
    self.release(addr);
    Ok(())
  }

  /// Push the value held in `$v0`.
  pub fn push_result(&mut self) -> CompileResult<()> {
    let reg = self.temp()?;
    self.emit(format!("move {reg}, $v0"));
    self.push(reg);
    self.release(reg);
    Ok(())
  }

  // ---------- arithmetic and conditions ----------

  /// `r1` holds the right operand and `r2` the left one (the right is popped
  /// first). Leaves `r2 op r1` on the stack.
  fn arithmetic(&mut self, op: ArithOp, r1: Register, r2: Register) {
    self.emit(format!("{} {r1}, {r2}, {r1}", op.mnemonic()));
    self.push(r1);
  }

  pub fn add(&mut self, r1: Register, r2: Register) {
    self.arithmetic(ArithOp::Add, r1, r2);
  }

  pub fn sub(&mut self, r1: Register, r2: Register) {
    self.arithmetic(ArithOp::Sub, r1, r2);
  }

  pub fn mul(&mut self, r1: Register, r2: Register) {
    self.arithmetic(ArithOp::Mul, r1, r2);
  }

  pub fn div(&mut self, r1: Register, r2: Register) {
    self.arithmetic(ArithOp::Div, r1, r2);
  }

  /// Pop two operands, materialise the comparison as a boolean word, round
  /// trip it through the stack and branch to `target` when it is false.
  pub fn cond(&mut self, op: Relop, target: &str) -> CompileResult<()> {
    self.comment("condition");
    let right = self.pop()?;
    let left = self.pop()?;
    let result = self.temp()?;
    self.emit(format!("{} {result}, {left}, {right}", op.mnemonic()));
    self.push(result);
    self.emit(format!("lw {left}, 0($sp)"));
    self.emit(format!("addi $sp, $sp, {WORD_SIZE}"));
    self.emit(format!("beqz {left}, {target}"));
    self.release(result);
    self.release(left);
    self.release(right);
    Ok(())
  }

  // ---------- storage ----------

  /// Reserve a data-segment cell for a static symbol. Constants are emitted
  /// initialised; everything else is zero-filled.
  pub fn declare_const_or_var(&mut self, label: &str, ty: &Type, value: Option<&str>) {
    match value {
      Some(value) => self.insert_data(format!("userdata.{label}:\t.word\t{value}")),
      None => self.insert_data(format!("userdata.{label}:\t.space\t{}", ty.size())),
    }
  }

  /// Intern a string literal in the data segment and return its label.
  pub fn string_literal(&mut self, text: &str) -> String {
    let label = format!("data.string.{}", self.next_string);
    self.next_string += 1;
    self.insert_data(format!("{label}:\t.asciiz\t\"{text}\""));
    label
  }

  /// Carve `size` bytes out of the current frame; returns the `$fp`-relative
  /// offset of the block's lowest address, or `None` once the frame would
  /// outgrow a signed 32-bit offset. The frame is left untouched then.
  pub fn next_local_location(&mut self, size: usize) -> Option<i32> {
    let end = self.next_local_offset.checked_add(size)?;
    let offset = i32::try_from(end).ok()?;
    self.next_local_offset = end;
    Some(-offset)
  }

  /// Start a fresh frame, returning the counter to restore afterwards.
  pub fn reset_local_location(&mut self) -> usize {
    std::mem::take(&mut self.next_local_offset)
  }

  pub fn restore_local_location(&mut self, saved: usize) {
    self.next_local_offset = saved;
  }

  pub fn local_frame_size(&self) -> usize {
    self.next_local_offset
  }

  /// Load into `reg` the frame pointer of the procedure `hops` lexical levels
  /// out from the current one.
  fn frame_base(&mut self, reg: Register, hops: usize) {
    if hops == 0 {
      self.emit(format!("move {reg}, $fp"));
      return;
    }
    self.emit(format!("lw {reg}, {STATIC_LINK_OFFSET}($fp)"));
    for _ in 1..hops {
      self.emit(format!("lw {reg}, {STATIC_LINK_OFFSET}({reg})"));
    }
  }

  /// Push the address of a variable as seen from code running at `level`.
  pub fn push_address(&mut self, storage: &Storage, level: usize) -> CompileResult<()> {
    let reg = self.temp()?;
    let loaded = self.load_address(reg, storage, level);
    if loaded.is_ok() {
      self.push(reg);
    }
    self.release(reg);
    loaded
  }

  /// Compute the address of a variable into `reg`.
  pub fn load_address(
    &mut self,
    reg: Register,
    storage: &Storage,
    level: usize,
  ) -> CompileResult<()> {
    match storage {
      Storage::Static { label } => {
        self.emit(format!("la {reg}, userdata.{label}"));
        Ok(())
      }
      Storage::Frame {
        level: owner,
        offset,
      } => {
        let hops = level.checked_sub(*owner).ok_or_else(|| {
          InternalSnafu {
            message: format!("frame at level {owner} is not visible from level {level}"),
          }
          .build()
        })?;
        if hops == 0 {
          self.emit(format!("addi {reg}, $fp, {offset}"));
        } else {
          self.frame_base(reg, hops);
          self.emit(format!("addi {reg}, {reg}, {offset}"));
        }
        Ok(())
      }
      Storage::None | Storage::Code { .. } => InternalSnafu {
        message: "symbol has no data address",
      }
      .fail(),
    }
  }

  /// Push the value of a variable as seen from code running at `level`.
  pub fn push_value(&mut self, storage: &Storage, level: usize) -> CompileResult<()> {
    let reg = self.temp()?;
    let loaded = self.load_address(reg, storage, level);
    if loaded.is_ok() {
      self.emit(format!("lw {reg}, 0({reg})"));
      self.push(reg);
    }
    self.release(reg);
    loaded
  }

  /// Push the address of a data-segment label.
  pub fn push_data_address(&mut self, label: &str) -> CompileResult<()> {
    let reg = self.temp()?;
    self.emit(format!("la {reg}, {label}"));
    self.push(reg);
    self.release(reg);
    Ok(())
  }

  /// Pop an index and the base address beneath it, and push
  /// `base + index * stride`.
  pub fn index_address(&mut self, stride: usize) -> CompileResult<()> {
    let index = self.pop()?;
    let base = self.pop()?;
    let scale = self.temp()?;
    self.emit(format!("li {scale}, {stride}"));
    self.emit(format!("mul {index}, {index}, {scale}"));
    self.emit(format!("add {base}, {base}, {index}"));
    self.push(base);
    self.release(scale);
    self.release(base);
    self.release(index);
    Ok(())
  }

  // ---------- procedures ----------

  /// Push the static link for a callee whose body runs at `callee_level`.
  pub fn push_static_link(&mut self, callee_level: usize, level: usize) -> CompileResult<()> {
    let reg = self.temp()?;
    if callee_level <= 1 {
      self.emit(format!("move {reg}, $zero"));
    } else {
      let hops = level + 1 - callee_level;
      self.frame_base(reg, hops);
    }
    self.push(reg);
    self.release(reg);
    Ok(())
  }

  /// Call a procedure and discard its arguments and static link.
  pub fn call(&mut self, label: &str, argc: usize) {
    self.emit(format!("jal {label}"));
    self.emit(format!("addi $sp, $sp, {}", (argc + 1) * WORD_SIZE));
  }

  pub fn enter_procedure(&mut self, label: &str, frame_size: usize) {
    debug!("procedure {label} reserves {frame_size} bytes of locals");
    self.place_label(label);
    self.emit(format!("addi $sp, $sp, -{}", 2 * WORD_SIZE));
    self.emit(format!("sw $ra, {WORD_SIZE}($sp)"));
    self.emit("sw $fp, 0($sp)");
    self.emit("move $fp, $sp");
    if frame_size > 0 {
      self.emit(format!("addi $sp, $sp, -{frame_size}"));
    }
  }

  pub fn leave_procedure(&mut self, return_label: &str) {
    self.place_label(return_label);
    self.emit("move $sp, $fp");
    self.emit(format!("lw $ra, {WORD_SIZE}($sp)"));
    self.emit("lw $fp, 0($sp)");
    self.emit(format!("addi $sp, $sp, {}", 2 * WORD_SIZE));
    self.emit("jr $ra");
  }

  /// Pop the returned value into `$v0` and jump to the epilogue.
  pub fn return_value(&mut self, return_label: &str) -> CompileResult<()> {
    let reg = self.pop()?;
    self.emit(format!("move $v0, {reg}"));
    self.release(reg);
    self.jump(return_label);
    Ok(())
  }

  // ---------- I/O ----------

  /// Print the value stored at the address in `addr`, then a newline.
  pub fn insert_print_sequence(&mut self, addr: Register, ty: &Type) -> CompileResult<()> {
    let service = match ty.kind() {
      TypeKind::Primitive(Primitive::String) => 4,
      TypeKind::Primitive(Primitive::Char) => 11,
      _ => 1,
    };
    let value = self.saved_temp()?;
    self.emit(format!("lw {value}, 0({addr})"));
    self.emit(format!("move $a0, {value}"));
    self.emit(format!("li $v0, {service}"));
    self.emit("syscall");
    self.emit("la $a0, data.newline");
    self.emit("li $v0, 4");
    self.emit("syscall");
    self.release(value);
    Ok(())
  }

  /// Prompt for an integer and store it at the address in `addr`.
  pub fn insert_input_sequence(&mut self, addr: Register) -> CompileResult<()> {
    let value = self.saved_temp()?;
    self.emit("la $a0, data.intquery");
    self.emit("li $v0, 4");
    self.emit("syscall");
    self.emit("li $v0, 5");
    self.emit("syscall");
    self.emit(format!("move {value}, $v0"));
    self.emit(format!("sw {value}, 0({addr})"));
    self.release(value);
    Ok(())
  }

  pub fn insert_exit_sequence(&mut self) {
    self.comment("exit");
    self.emit("li $v0, 10");
    self.emit("syscall");
  }

  // ---------- output ----------

  pub fn set_main_entry(&mut self, index: usize) {
    self.main_entry = Some(index);
  }

  /// Render the data segment followed by the text segment, with `main:`
  /// placed at the recorded entry instruction.
  pub fn dump(&self) -> CompileResult<String> {
    let entry = self.main_entry.ok_or_else(|| {
      InternalSnafu {
        message: "entry point was never recorded",
      }
      .build()
    })?;

    let mut asm = String::new();
    asm.push_str(".data                         # BEGIN Data Segment\n");
    for line in &self.data {
      asm.push_str(line);
      asm.push('\n');
    }
    asm.push_str("data.newline:\t.asciiz\t\"\\n\"\n");
    asm.push_str("data.intquery:\t.asciiz\t\"\"\n");
    asm.push_str("                              # END Data Segment\n");
    asm.push_str(".text                         # BEGIN Code Segment\n");
    asm.push_str(".globl main\n");
    for (i, line) in self.text.iter().enumerate() {
      if i == entry {
        asm.push_str("main:\n");
      }
      asm.push_str(line);
      asm.push('\n');
    }
    if entry >= self.text.len() {
      asm.push_str("main:\n");
    }
    asm.push_str("                              # END Code Segment\n");
    Ok(asm)
  }
}
