mod common;

use rstest::rstest;

use common::init_logging;
use rminic::{
  Category, CompileError, Diagnostic, compile, dump_parse_tree, dump_symbol_table, dump_tokens,
};

fn diagnostic(source: &str) -> Diagnostic {
  init_logging();
  let failure = compile(source).expect_err("program should be rejected");
  let diagnostics = failure.diagnostics();
  assert_eq!(diagnostics.len(), 1, "{failure}");
  diagnostics.into_iter().next().expect("one diagnostic")
}

#[test]
fn undeclared_variable_is_reported_where_used() {
  let diag = diagnostic("main(){ print(y); }");
  assert_eq!(diag.category, Category::Undefined);
  assert_eq!((diag.line, diag.column), (1, 15));
  assert_eq!(diag.message, "SEMANTIC ERROR: UNDEFINED_ERROR on symbol y");
}

#[test]
fn redeclaration_in_one_scope_is_rejected() {
  let diag = diagnostic("var x: int; var x: int; main() { x = 1; }");
  assert_eq!(diag.category, Category::Redefined);
  assert_eq!((diag.line, diag.column), (1, 17));
}

#[test]
fn variable_and_procedure_may_share_a_name() {
  init_logging();
  let source = "var f: int; int f(int a) { return a; } main() { f = ::f(f); print(f); }";
  assert!(compile(source).is_ok());
}

#[test]
fn locals_are_gone_after_their_procedure() {
  let diag = diagnostic("void p() { var t: int; t = 1; } main() { t = 2; }");
  assert_eq!(diag.category, Category::Undefined);
  assert_eq!(diag.line, 1);
}

#[rstest]
#[case::lexical("var x: int; main() { x = 1 @ 2; }", Category::ScanError)]
#[case::unterminated("var s: string; main() { s = \"open; }", Category::ScanError)]
#[case::missing_semicolon("var x: int; main() { x = 1 }", Category::SyntaxError)]
#[case::empty_body("main() { }", Category::SyntaxError)]
#[case::trailing_input("main() { var x: int; x = 1; } x", Category::SyntaxError)]
fn malformed_input(#[case] source: &str, #[case] category: Category) {
  assert_eq!(diagnostic(source).category, category);
}

#[test]
fn syntax_error_names_what_was_expected() {
  let diag = diagnostic("var x: int; main() { x = 1 }");
  assert_eq!(
    diag.message,
    "Syntax Error (Parser):  on symbol }: Error: found R_BRACE (}) but expected: SEMICOLON"
  );
}

#[rstest]
#[case::int_gets_string("var x: int; var s: string; main() { x = s + s; }")]
#[case::literal_into_int("var x: int; main() { x = \"no\"; }")]
#[case::index_not_int("var a: array 2 of int; var s: string; var x: int; main() { x = a[s]; }")]
#[case::scalar_indexed("var x: int; main() { x = x[0]; }")]
#[case::whole_array("var a: array 2 of int; var x: int; main() { x = a; }")]
#[case::over_indexed("var a: array 2 of int; var x: int; main() { x = a[0][0]; }")]
#[case::array_to_array("var a, b: array 2 of int; main() { a = b; }")]
#[case::array_argument("var a: array 2 of int; void p(int v) { print(v); } main() { ::p(a); }")]
#[case::array_print("var a: array 2 of int; main() { print(a); }")]
#[case::array_formal("void p(array 2 of int v) { print(v); } main() { }")]
#[case::wrong_return("string f(int a) { return a; } main() { }")]
#[case::value_from_main("main() { return 1; }")]
#[case::int_condition_after_string("var x: int; var s: string; main() { if (x < s + s) { } }")]
fn type_errors(#[case] source: &str) {
  assert_eq!(diagnostic(source).category, Category::TypeMismatch);
}

#[test]
fn string_bearing_value_does_not_fit_an_int_target() {
  let diag = diagnostic("var x: int; var s: string; main() { x = x + s; }");
  assert_eq!(diag.category, Category::TypeMismatch);
  assert_eq!(
    diag.message,
    "SEMANTIC ERROR: MISMATCH_ERROR on symbol =: Invalid assignment: int <- string"
  );
}

#[test]
fn string_operand_waives_the_same_type_rule() {
  init_logging();
  assert!(compile("var s: string; var n: int; main() { s = s + n; }").is_ok());
  assert!(compile("var s: string; var n: int; main() { s = n - s; }").is_ok());
}

#[test]
fn mixed_string_expression_is_followed_by_plain_int_rules() {
  init_logging();
  let source = "
    var s: string;
    var n: int;
    main() {
      s = s + n;
      if (n == n) { n = 1; }
    }
  ";
  assert!(compile(source).is_ok());
}

#[test]
fn string_bearing_condition_only_needs_a_string_on_the_left() {
  init_logging();
  let source = "var s: string; var n: int; main() { if (s + n == 1) { n = 1; } }";
  assert!(compile(source).is_ok());
  let diag = diagnostic("var s: string; var n: int; main() { if (n == s + n) { n = 1; } }");
  assert_eq!(diag.category, Category::TypeMismatch);
}

#[test]
fn selector_clears_the_string_flag() {
  let diag = diagnostic("var s: string; var n: int; main() { if (s + n == n) { n = 1; } }");
  assert_eq!(diag.category, Category::TypeMismatch);
  assert!(diag.message.ends_with("Invalid operator usage: string == int"));
}

#[test]
fn string_flag_does_not_leak_into_the_next_statement() {
  init_logging();
  let source = "
    var s: string;
    var n: int;
    main() {
      s = s + s;
      n = n + n;
      if (n < n) { n = 1; }
    }
  ";
  assert!(compile(source).is_ok());
}

#[test]
fn string_target_accepts_string_bearing_expression() {
  init_logging();
  assert!(compile("var s, t: string; main() { s = s + t; }").is_ok());
  assert!(compile("var s: string; main() { s = \"lit\"; }").is_ok());
}

#[test]
fn constants_may_be_reassigned() {
  init_logging();
  assert!(compile("const c = 1; main() { c = 2; print(c); }").is_ok());
}

#[rstest]
#[case::int_literal("var x: int; main() { x = 4294967296; }", "4294967296")]
#[case::constant("const c = 2147483648; main() { print(c); }", "2147483648")]
#[case::dimension("var a: array 99999999999999999999 of int; main() { }", "99999999999999999999")]
#[case::array_bytes("var a: array 1073741824 of int; main() { a[0] = 1; }", "1073741824")]
#[case::nested_bytes(
  "var a: array 4294967296 of array 4294967296 of int; main() { a[0][0] = 1; }",
  "4294967296"
)]
#[case::local_array(
  "void p() { var a: array 1073741824 of int; var b: int; b = 1; } main() { ::p(); }",
  "1073741824"
)]
fn values_the_target_cannot_hold(#[case] source: &str, #[case] lexeme: &str) {
  init_logging();
  let failure = compile(source).expect_err("out of range");
  assert!(
    matches!(failure.error, CompileError::Syntax { lexeme: ref found, .. } if found == lexeme),
    "{failure}"
  );
}

#[test]
fn frame_overflow_is_reported_on_the_local() {
  let diag = diagnostic(
    "void p() { var a: array 536870911 of int; var b: int; b = 1; } main() { ::p(); }",
  );
  assert_eq!(diag.category, Category::SyntaxError);
  assert_eq!((diag.line, diag.column), (1, 47));
  assert!(diag.message.ends_with("but expected: locals that fit in one frame"));
}

#[test]
fn literals_are_bounded_by_a_signed_word() {
  init_logging();
  let diag = diagnostic("var x: int; main() { x = 4294967296; }");
  assert_eq!((diag.line, diag.column), (1, 26));
  let largest = "const c = 2147483647; var x: int; main() { x = 2147483647; }";
  assert!(compile(largest).is_ok());
}

#[rstest]
#[case::too_few("x = ::f(x);", Category::ArityMismatch)]
#[case::too_many("x = ::f(x, y, x);", Category::ArityMismatch)]
#[case::none("x = ::f();", Category::ArityMismatch)]
#[case::swapped("x = ::f(s, x);", Category::TypeMismatch)]
fn call_arguments_are_checked(#[case] call: &str, #[case] category: Category) {
  let source = format!(
    "int f(int a, string b) {{ return a; }} main() {{ var x, y: int; var s: string; {call} }}"
  );
  let diag = diagnostic(&source);
  assert_eq!(diag.category, category);
  assert!(diag.message.contains("Invalid call: f(int, string) with ("));
}

#[test]
fn undefined_procedure_is_reported() {
  let diag = diagnostic("main() { ::nothing(); }");
  assert_eq!(diag.category, Category::Undefined);
  assert_eq!(diag.column, 12);
}

#[test]
fn failure_report_carries_the_symbol_table() {
  init_logging();
  let source = "var g: int; main() { var x: int; x = y; }";
  let failure = compile(source).expect_err("undefined");
  assert!(matches!(failure.error, CompileError::Undefined { ref name, .. } if name == "y"));
  let report = failure.to_string();
  assert!(report.starts_with("SEMANTIC ERROR: UNDEFINED_ERROR on symbol y\n"));
  assert!(report.contains("Error Found on Line Number: 1, Char Position: 38\n"));
  assert!(report.contains("***** Symbol Table Contents *****\n"));
  assert!(report.contains("N: g  C: VAR  T: int  \n"));
  assert!(report.contains("-->N: x  C: VAR  T: int  \n"));
}

#[test]
fn caret_marks_the_offending_column() {
  init_logging();
  let source = "var x: int;\nmain() {\n  x = q;\n}";
  let failure = compile(source).expect_err("undefined");
  let caret = failure.caret(source).expect("located");
  assert!(caret.starts_with("'  x = q;'\n       ^ "));
}

#[test]
fn token_listing_stops_at_end_of_text() {
  assert_eq!(
    dump_tokens("var x: int;"),
    "var\nident:x\n:\nint\n;\n<EOT>\n"
  );
  assert!(dump_tokens("x @ y").ends_with("ERROR\n"));
}

#[test]
fn parse_trace_and_symbol_dump() {
  init_logging();
  let source = "const c = 3; int f() { return c; } main() { var x: int; x = ::f(); }";
  let tree = dump_parse_tree(source);
  assert!(tree.starts_with("   program\n      declarations\n"));
  assert!(tree.contains("procedureCall"));

  let table = dump_symbol_table(source).expect("compiles");
  assert_eq!(
    table,
    "***** Symbol Table Contents *****\n\
     N: int  C: TYPE  \n\
     N: char  C: TYPE  \n\
     N: string  C: TYPE  \n\
     N: void  C: TYPE  \n\
     N: c  C: CONST  T: int  V: 3  \n\
     N: f  C: PROCEDURE  T: int  \n"
  );
}

#[test]
fn parse_trace_ends_with_the_error() {
  let tree = dump_parse_tree("main() { x = 1; }");
  assert!(tree.contains("selector"));
  assert!(tree.ends_with(
    "SEMANTIC ERROR: UNDEFINED_ERROR on symbol x\n\
     Error Found on Line Number: 1, Char Position: 10\n"
  ));
}
