//! Common test utilities: a tiny interpreter for the SPIM subset the compiler
//! emits, so end-to-end tests can check what a program prints.

#![allow(dead_code)]

use std::collections::HashMap;

const DATA_BASE: u32 = 0x1001_0000;
const STACK_TOP: u32 = 0x7fff_effc;
const STEP_LIMIT: usize = 1_000_000;

pub fn init_logging() {
  let _ = env_logger::builder().is_test(true).try_init();
}

struct Program {
  memory: HashMap<u32, u8>,
  symbols: HashMap<String, u32>,
  targets: HashMap<String, usize>,
  code: Vec<(String, Vec<String>)>,
}

fn store_word(memory: &mut HashMap<u32, u8>, addr: u32, value: i32) {
  for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
    memory.insert(addr + i as u32, byte);
  }
}

fn load_word(memory: &HashMap<u32, u8>, addr: u32) -> i32 {
  let mut bytes = [0u8; 4];
  for (i, byte) in bytes.iter_mut().enumerate() {
    *byte = memory.get(&(addr + i as u32)).copied().unwrap_or(0);
  }
  i32::from_le_bytes(bytes)
}

fn assemble(asm: &str) -> Program {
  let mut memory = HashMap::new();
  let mut symbols = HashMap::new();
  let mut targets = HashMap::new();
  let mut code = Vec::new();
  let mut in_text = false;
  let mut next = DATA_BASE;

  for raw in asm.lines() {
    let line = raw.trim();
    if line.starts_with(".text") {
      in_text = true;
      continue;
    }
    if line.is_empty() || line.starts_with('.') || line.starts_with('#') {
      continue;
    }

    if !in_text {
      let (label, rest) = line.split_once(':').expect("data label");
      symbols.insert(label.to_string(), next);
      let (directive, arg) = rest.trim().split_once(char::is_whitespace).expect("directive");
      let arg = arg.trim();
      match directive {
        ".space" => next += arg.parse::<u32>().expect("size"),
        ".word" => {
          store_word(&mut memory, next, arg.parse().expect("word"));
          next += 4;
        }
        ".asciiz" => {
          let text = arg.trim_matches('"').replace("\\n", "\n");
          for byte in text.bytes() {
            memory.insert(next, byte);
            next += 1;
          }
          memory.insert(next, 0);
          next += 1;
        }
        other => panic!("unknown directive {other}"),
      }
      next = (next + 3) & !3;
      continue;
    }

    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
      continue;
    }
    if let Some(label) = line.strip_suffix(':') {
      targets.insert(label.to_string(), code.len());
      continue;
    }
    let (op, operands) = line.split_once(' ').unwrap_or((line, ""));
    let operands = operands
      .split(',')
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
      .collect();
    code.push((op.to_string(), operands));
  }

  Program {
    memory,
    symbols,
    targets,
    code,
  }
}

struct Machine {
  program: Program,
  regs: HashMap<String, i32>,
}

impl Machine {
  fn reg(&self, name: &str) -> i32 {
    if name == "$zero" {
      return 0;
    }
    self.regs.get(name).copied().unwrap_or(0)
  }

  fn set(&mut self, name: &str, value: i32) {
    self.regs.insert(name.to_string(), value);
  }

  /// Resolve `off($reg)`.
  fn address(&self, operand: &str) -> u32 {
    let (offset, base) = operand.split_once('(').expect("memory operand");
    let base = base.trim_end_matches(')');
    let offset: i32 = if offset.is_empty() { 0 } else { offset.parse().expect("offset") };
    self.reg(base).wrapping_add(offset) as u32
  }

  fn target(&self, label: &str) -> usize {
    *self
      .program
      .targets
      .get(label)
      .unwrap_or_else(|| panic!("undefined label {label}"))
  }

  fn read_string(&self, mut addr: u32) -> String {
    let mut bytes = Vec::new();
    while let Some(&byte) = self.program.memory.get(&addr) {
      if byte == 0 {
        break;
      }
      bytes.push(byte);
      addr += 1;
    }
    String::from_utf8(bytes).expect("utf-8")
  }
}

/// Run assembly from `main`, feeding `input` to integer reads, and return
/// everything the program printed.
pub fn run(asm: &str, input: &[i32]) -> String {
  let program = assemble(asm);
  let mut pc = *program.targets.get("main").expect("main label");
  let mut machine = Machine {
    program,
    regs: HashMap::from([("$sp".to_string(), STACK_TOP as i32)]),
  };
  let mut input = input.iter();
  let mut out = String::new();

  for _ in 0..STEP_LIMIT {
    let (op, args) = machine.program.code[pc].clone();
    pc += 1;
    let arg = |i: usize| args[i].as_str();
    match op.as_str() {
      "li" => machine.set(arg(0), arg(1).parse().expect("immediate")),
      "la" => {
        let addr = machine.program.symbols[arg(1)];
        machine.set(arg(0), addr as i32);
      }
      "move" => machine.set(arg(0), machine.reg(arg(1))),
      "addi" => {
        let value = machine.reg(arg(1)).wrapping_add(arg(2).parse::<i32>().expect("immediate"));
        machine.set(arg(0), value);
      }
      "add" | "sub" | "mul" | "div" | "seq" | "sne" | "slt" | "sle" | "sgt" | "sge" => {
        let (a, b) = (machine.reg(arg(1)), machine.reg(arg(2)));
        let value = match op.as_str() {
          "add" => a.wrapping_add(b),
          "sub" => a.wrapping_sub(b),
          "mul" => a.wrapping_mul(b),
          "div" => a.wrapping_div(b),
          "seq" => (a == b) as i32,
          "sne" => (a != b) as i32,
          "slt" => (a < b) as i32,
          "sle" => (a <= b) as i32,
          "sgt" => (a > b) as i32,
          _ => (a >= b) as i32,
        };
        machine.set(arg(0), value);
      }
      "lw" => {
        let addr = machine.address(arg(1));
        let value = load_word(&machine.program.memory, addr);
        machine.set(arg(0), value);
      }
      "sw" => {
        let addr = machine.address(arg(1));
        let value = machine.reg(arg(0));
        store_word(&mut machine.program.memory, addr, value);
      }
      "beqz" => {
        if machine.reg(arg(0)) == 0 {
          pc = machine.target(arg(1));
        }
      }
      "j" => pc = machine.target(arg(0)),
      "jal" => {
        machine.set("$ra", pc as i32);
        pc = machine.target(arg(0));
      }
      "jr" => pc = machine.reg(arg(0)) as usize,
      "syscall" => match machine.reg("$v0") {
        1 => out.push_str(&machine.reg("$a0").to_string()),
        4 => out.push_str(&machine.read_string(machine.reg("$a0") as u32)),
        5 => {
          let value = *input.next().expect("program asked for more input");
          machine.set("$v0", value);
        }
        10 => return out,
        11 => out.push(char::from(machine.reg("$a0") as u8)),
        other => panic!("unsupported syscall {other}"),
      },
      other => panic!("unsupported instruction {other}"),
    }
  }
  panic!("program did not halt; output so far: {out:?}");
}
