//! Lexer for the textual abstract assembly.
// Note this project relies on logos 0.12.1 see docs [here]
// (https://docs.rs/logos/0.12.1/logos/index.html)

use enum_as_inner::EnumAsInner;
use logos::{Lexer, Logos};
use std::fmt;
use strum_macros::AsRefStr;

fn register<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
  let slice = lex.slice();
  // Skip over the % of a register name
  &slice[1..]
}

fn unquote<'a>(lex: &mut Lexer<'a, Token<'a>>) -> String {
  let slice = lex.slice();
  let mut out = String::with_capacity(slice.len());
  let mut chars = slice[1..slice.len() - 1].chars();
  while let Some(c) = chars.next() {
    match c {
      '\\' => match chars.next() {
        Some('n') => out.push('\n'),
        Some('t') => out.push('\t'),
        Some(other) => out.push(other),
        None => {}
      },
      _ => out.push(c),
    }
  }
  out
}

impl<'a> fmt::Display for Token<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Token::Ident(s) => write!(f, "{}", s),
      Token::Register(s) => write!(f, "%{}", s),
      Token::Str(s) => write!(f, "{:?}", s),
      _ => write!(f, "{}", self.as_ref()),
    }
  }
}

#[derive(Clone, Logos, Debug, PartialEq, AsRefStr, EnumAsInner)]
pub enum Token<'a> {
  #[token("proc")]
  Proc,
  #[token("move")]
  Move,
  #[token("oper")]
  Oper,
  #[token("def")]
  Def,
  #[token("use")]
  Use,
  #[token("jump")]
  Jump,

  #[token("{")]
  LBrace,
  #[token("}")]
  RBrace,
  #[token("(")]
  LParen,
  #[token(")")]
  RParen,
  #[token(":")]
  Colon,
  #[token(",")]
  Comma,
  #[token("<-")]
  Arrow,

  #[regex(r"[A-Za-z_.][A-Za-z0-9_.]*")]
  Ident(&'a str),
  #[regex(r"%[A-Za-z0-9_]+", register)]
  Register(&'a str),
  #[regex(r#""([^"\\\n]|\\.)*""#, unquote)]
  Str(String),

  #[error]
  #[regex(r"[ \t\n\r\f]+", logos::skip)] // Whitespace
  #[regex(r"(//|#)[^\n]*", logos::skip)] // Line comments
  Error,
}
