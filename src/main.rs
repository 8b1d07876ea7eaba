//! rminic: compile a source file to SPIM assembly.
//!
//! Usage:
//!   rminic [OPTIONS] <INPUT>
//!
//! Examples:
//!   rminic prog.mc -o prog.s
//!   rminic prog.mc --emit tokens
//!   cat prog.mc | rminic - --annotate -vv

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, ValueEnum};
use log::{LevelFilter, debug};

use rminic::{
  CompileOptions, Failure, compile_with_options, dump_parse_tree, dump_symbol_table, dump_tokens,
};

/// Single-pass compiler targeting the SPIM simulator
#[derive(Parser, Debug)]
#[command(name = "rminic")]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Input file (use "-" for stdin)
  #[arg(value_name = "INPUT")]
  input: String,

  /// Output file (stdout when omitted)
  #[arg(short, long, value_name = "FILE")]
  output: Option<PathBuf>,

  /// What to produce
  #[arg(long, value_enum, default_value = "asm")]
  emit: Emit,

  /// Comment the generated assembly
  #[arg(long)]
  annotate: bool,

  /// More logging on stderr (-v, -vv, -vvv)
  #[arg(short, long, action = ArgAction::Count)]
  verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
  /// SPIM assembly
  Asm,
  /// One line per token
  Tokens,
  /// Productions entered, indented by depth
  ParseTree,
  /// Global symbols after parsing
  Symbols,
}

fn main() {
  let args = Args::parse();
  env_logger::Builder::new()
    .filter_level(match args.verbose {
      0 => LevelFilter::Warn,
      1 => LevelFilter::Info,
      2 => LevelFilter::Debug,
      _ => LevelFilter::Trace,
    })
    .parse_default_env()
    .init();

  let source = match read_input(&args.input) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("error: cannot read {}: {err}", args.input);
      process::exit(1);
    }
  };
  debug!("read {} bytes from {}", source.len(), args.input);

  let options = CompileOptions {
    annotate: args.annotate,
  };
  let produced = match args.emit {
    Emit::Asm => compile_with_options(&source, options),
    Emit::Tokens => Ok(dump_tokens(&source)),
    Emit::ParseTree => Ok(dump_parse_tree(&source)),
    Emit::Symbols => dump_symbol_table(&source),
  };

  match produced {
    Ok(text) => {
      if let Err(err) = write_output(args.output.as_ref(), &text) {
        eprintln!("error: cannot write output: {err}");
        process::exit(1);
      }
    }
    Err(failure) => {
      report(&failure, &source);
      process::exit(1);
    }
  }
}

fn read_input(input: &str) -> io::Result<String> {
  if input == "-" {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    return Ok(buf);
  }
  fs::read_to_string(input)
}

fn write_output(path: Option<&PathBuf>, content: &str) -> io::Result<()> {
  match path {
    Some(path) => fs::write(path, content),
    None => io::stdout().write_all(content.as_bytes()),
  }
}

fn report(failure: &Failure, source: &str) {
  if let Some(caret) = failure.caret(source) {
    eprintln!("{caret}");
  }
  eprint!("{failure}");
}
