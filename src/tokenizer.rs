//! Lexical analysis: turns the raw source into tokens, one at a time.
//!
//! The parser only ever looks one token ahead, so the lexer hands tokens out
//! on demand instead of materialising the whole stream. Malformed input never
//! aborts here; it surfaces as an `Error` token and the parser decides how to
//! report it.

use std::fmt;

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
  // Keywords
  Array,
  Of,
  Input,
  Print,
  If,
  Else,
  While,
  Var,
  Const,
  Main,
  Int,
  Void,
  String,
  Char,
  Return,

  // Punctuation and operators
  Semicolon,
  Period,
  LParen,
  RParen,
  LBrace,
  RBrace,
  LBracket,
  RBracket,
  Colon,
  Comma,
  Assign,
  Add,
  Sub,
  Mult,
  Div,
  Equal,
  NotEqual,
  GreaterThan,
  GreaterEqual,
  LessThan,
  LessEqual,

  Ident,
  StringLiteral,
  Number,

  Eof,
  Error,
}

impl TokenKind {
  /// Spelling of tokens that always look the same; empty for the kinds whose
  /// lexeme varies.
  pub fn default_lexeme(self) -> &'static str {
    match self {
      TokenKind::Array => "array",
      TokenKind::Of => "of",
      TokenKind::Input => "input",
      TokenKind::Print => "print",
      TokenKind::If => "if",
      TokenKind::Else => "else",
      TokenKind::While => "while",
      TokenKind::Var => "var",
      TokenKind::Const => "const",
      TokenKind::Main => "main",
      TokenKind::Int => "int",
      TokenKind::Void => "void",
      TokenKind::String => "string",
      TokenKind::Char => "char",
      TokenKind::Return => "return",
      TokenKind::Semicolon => ";",
      TokenKind::Period => ".",
      TokenKind::LParen => "(",
      TokenKind::RParen => ")",
      TokenKind::LBrace => "{",
      TokenKind::RBrace => "}",
      TokenKind::LBracket => "[",
      TokenKind::RBracket => "]",
      TokenKind::Colon => ":",
      TokenKind::Comma => ",",
      TokenKind::Assign => "=",
      TokenKind::Add => "+",
      TokenKind::Sub => "-",
      TokenKind::Mult => "*",
      TokenKind::Div => "/",
      TokenKind::Equal => "==",
      TokenKind::NotEqual => "!=",
      TokenKind::GreaterThan => ">",
      TokenKind::GreaterEqual => ">=",
      TokenKind::LessThan => "<",
      TokenKind::LessEqual => "<=",
      TokenKind::Ident | TokenKind::StringLiteral | TokenKind::Number => "",
      TokenKind::Eof => "<EOT>",
      TokenKind::Error => "ERROR",
    }
  }

  /// Upper-case name used in diagnostics, e.g. `L_PAREN`.
  pub fn name(self) -> &'static str {
    match self {
      TokenKind::Array => "ARRAY",
      TokenKind::Of => "OF",
      TokenKind::Input => "INPUT",
      TokenKind::Print => "PRINT",
      TokenKind::If => "IF",
      TokenKind::Else => "ELSE",
      TokenKind::While => "WHILE",
      TokenKind::Var => "VAR",
      TokenKind::Const => "CONST",
      TokenKind::Main => "MAIN",
      TokenKind::Int => "INT",
      TokenKind::Void => "VOID",
      TokenKind::String => "STRING",
      TokenKind::Char => "CHAR",
      TokenKind::Return => "RETURN",
      TokenKind::Semicolon => "SEMICOLON",
      TokenKind::Period => "PERIOD",
      TokenKind::LParen => "L_PAREN",
      TokenKind::RParen => "R_PAREN",
      TokenKind::LBrace => "L_BRACE",
      TokenKind::RBrace => "R_BRACE",
      TokenKind::LBracket => "L_BRACKET",
      TokenKind::RBracket => "R_BRACKET",
      TokenKind::Colon => "COLON",
      TokenKind::Comma => "COMMA",
      TokenKind::Assign => "ASSIGN",
      TokenKind::Add => "ADD",
      TokenKind::Sub => "SUB",
      TokenKind::Mult => "MULT",
      TokenKind::Div => "DIV",
      TokenKind::Equal => "EQUAL",
      TokenKind::NotEqual => "NEQ",
      TokenKind::GreaterThan => "GREATER_THAN",
      TokenKind::GreaterEqual => "GREATER_EQUAL",
      TokenKind::LessThan => "LESS_THAN",
      TokenKind::LessEqual => "LESSER_EQUAL",
      TokenKind::Ident => "IDENT",
      TokenKind::StringLiteral => "STRING_LITERAL",
      TokenKind::Number => "NUMBER",
      TokenKind::Eof => "EOF",
      TokenKind::Error => "ERROR",
    }
  }

  fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
      "array" => TokenKind::Array,
      "of" => TokenKind::Of,
      "input" => TokenKind::Input,
      "print" => TokenKind::Print,
      "if" => TokenKind::If,
      "else" => TokenKind::Else,
      "while" => TokenKind::While,
      "var" => TokenKind::Var,
      "const" => TokenKind::Const,
      "main" => TokenKind::Main,
      "int" => TokenKind::Int,
      "void" => TokenKind::Void,
      "string" => TokenKind::String,
      "char" => TokenKind::Char,
      "return" => TokenKind::Return,
      _ => return None,
    };
    Some(kind)
  }
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// A lexeme together with where it starts in the source (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub lexeme: String,
  pub line: usize,
  pub column: usize,
}

impl Token {
  pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) -> Self {
    Self {
      kind,
      lexeme: lexeme.into(),
      line,
      column,
    }
  }

  /// One-line listing form: `ident:x` for variable lexemes, the fixed spelling
  /// otherwise.
  pub fn describe(&self) -> String {
    match self.kind {
      TokenKind::Ident | TokenKind::StringLiteral | TokenKind::Number => {
        format!("{}:{}", self.kind.name().to_lowercase(), self.lexeme)
      }
      kind => kind.default_lexeme().to_string(),
    }
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "(L{} C{}) {}{}", self.line, self.column, self.kind, self.lexeme)
  }
}

/// Pull-based scanner over the source text.
pub struct Lexer {
  chars: Vec<char>,
  pos: usize,
  line: usize,
  column: usize,
}

impl Lexer {
  pub fn new(source: &str) -> Self {
    Self {
      chars: source.chars().collect(),
      pos: 0,
      line: 1,
      column: 1,
    }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += 1;
    if c == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(c)
  }

  fn skip_trivia(&mut self) {
    while let Some(c) = self.peek() {
      if c == '#' {
        while self.peek().is_some_and(|c| c != '\n') {
          self.bump();
        }
      } else if c.is_whitespace() {
        self.bump();
      } else {
        break;
      }
    }
  }

  /// Produce the next token. Keeps returning `Eof` once the input is drained.
  pub fn next_token(&mut self) -> Token {
    self.skip_trivia();

    let (line, column) = (self.line, self.column);
    let Some(c) = self.bump() else {
      return Token::new(TokenKind::Eof, "", line, column);
    };

    let single = match c {
      ';' => Some(TokenKind::Semicolon),
      '.' => Some(TokenKind::Period),
      '(' => Some(TokenKind::LParen),
      ')' => Some(TokenKind::RParen),
      '{' => Some(TokenKind::LBrace),
      '}' => Some(TokenKind::RBrace),
      '[' => Some(TokenKind::LBracket),
      ']' => Some(TokenKind::RBracket),
      ',' => Some(TokenKind::Comma),
      ':' => Some(TokenKind::Colon),
      '+' => Some(TokenKind::Add),
      '-' => Some(TokenKind::Sub),
      '*' => Some(TokenKind::Mult),
      '/' => Some(TokenKind::Div),
      _ => None,
    };
    if let Some(kind) = single {
      return Token::new(kind, c.to_string(), line, column);
    }

    // Two-character operators share a prefix with a one-character fallback.
    let paired = match c {
      '=' => Some((TokenKind::Equal, TokenKind::Assign)),
      '<' => Some((TokenKind::LessEqual, TokenKind::LessThan)),
      '>' => Some((TokenKind::GreaterEqual, TokenKind::GreaterThan)),
      '!' => Some((TokenKind::NotEqual, TokenKind::Error)),
      _ => None,
    };
    if let Some((double, fallback)) = paired {
      if self.peek() == Some('=') {
        self.bump();
        return Token::new(double, format!("{c}="), line, column);
      }
      return Token::new(fallback, c.to_string(), line, column);
    }

    if c == '"' {
      let mut text = String::new();
      while let Some(next) = self.bump() {
        if next == '"' {
          return Token::new(TokenKind::StringLiteral, text, line, column);
        }
        text.push(next);
      }
      return Token::new(TokenKind::Error, text, line, column);
    }

    if c.is_ascii_digit() {
      let mut text = c.to_string();
      while let Some(d) = self.peek().filter(char::is_ascii_digit) {
        text.push(d);
        self.bump();
      }
      return Token::new(TokenKind::Number, text, line, column);
    }

    if c.is_alphabetic() {
      let mut text = c.to_string();
      while let Some(d) = self.peek().filter(|d| d.is_alphanumeric()) {
        text.push(d);
        self.bump();
      }
      let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Ident);
      return Token::new(kind, text, line, column);
    }

    Token::new(TokenKind::Error, c.to_string(), line, column)
  }
}

/// Drain the source into a vector ending with the first `Eof` or `Error`.
pub fn tokenize(source: &str) -> Vec<Token> {
  let mut lexer = Lexer::new(source);
  let mut tokens = Vec::new();
  loop {
    let token = lexer.next_token();
    let done = matches!(token.kind, TokenKind::Eof | TokenKind::Error);
    tokens.push(token);
    if done {
      return tokens;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source).into_iter().map(|t| t.kind).collect()
  }

  #[rstest]
  #[case("==", TokenKind::Equal)]
  #[case("!=", TokenKind::NotEqual)]
  #[case("<=", TokenKind::LessEqual)]
  #[case(">=", TokenKind::GreaterEqual)]
  #[case("=", TokenKind::Assign)]
  #[case("<", TokenKind::LessThan)]
  #[case(">", TokenKind::GreaterThan)]
  fn operators(#[case] source: &str, #[case] expected: TokenKind) {
    assert_eq!(kinds(source), vec![expected, TokenKind::Eof]);
  }

  #[test]
  fn single_char_fallback_keeps_following_character() {
    assert_eq!(
      kinds("a<b"),
      vec![
        TokenKind::Ident,
        TokenKind::LessThan,
        TokenKind::Ident,
        TokenKind::Eof
      ]
    );
  }

  #[test]
  fn keywords_and_identifiers() {
    let tokens = tokenize("var whilex : array 3 of int;");
    let described: Vec<_> = tokens.iter().map(Token::describe).collect();
    assert_eq!(
      described,
      vec![
        "var",
        "ident:whilex",
        ":",
        "array",
        "number:3",
        "of",
        "int",
        ";",
        "<EOT>"
      ]
    );
  }

  #[test]
  fn comments_and_positions() {
    let tokens = tokenize("# header\n  x = 10; # trailing\nprint");
    assert_eq!(tokens[0].lexeme, "x");
    assert_eq!((tokens[0].line, tokens[0].column), (2, 3));
    assert_eq!((tokens[2].line, tokens[2].column), (2, 7));
    assert_eq!(tokens[4].kind, TokenKind::Print);
    assert_eq!((tokens[4].line, tokens[4].column), (3, 1));
    assert_eq!(tokens[5].kind, TokenKind::Eof);
    assert_eq!(tokens[5].lexeme, "");
  }

  #[test]
  fn string_literal_strips_quotes() {
    let tokens = tokenize("\"hello world\";");
    assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
    assert_eq!(tokens[0].lexeme, "hello world");
    assert_eq!(tokens[1].kind, TokenKind::Semicolon);
  }

  #[rstest]
  #[case("\"never closed", "never closed")]
  #[case("!x", "!")]
  #[case("@", "@")]
  fn malformed_input_is_an_error_token(#[case] source: &str, #[case] lexeme: &str) {
    let tokens = tokenize(source);
    let last = tokens.last().expect("at least one token");
    assert_eq!(last.kind, TokenKind::Error);
    assert_eq!(last.lexeme, lexeme);
  }

  #[test]
  fn eof_repeats() {
    let mut lexer = Lexer::new("  ");
    assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    assert_eq!(lexer.next_token().kind, TokenKind::Eof);
  }
}
