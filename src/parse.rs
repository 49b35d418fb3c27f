//! Parser
// We rely on [lalrpop](https://github.com/lalrpop/lalrpop) for parsing.
// Lalrpop generates a LR(1) parser, the grammar can be found in assem.lalrpop

pub mod parser {
  use std::fs;

  use anyhow::{anyhow, bail, Context as _, Result};
  use logos::{Logos, Span};

  use crate::assem;
  use crate::ast::Program;
  use crate::lex::Token;

  /// Parse abstract assembly source text into its surface AST.
  pub fn parse_string(input: &str) -> Result<Program> {
    let mut tokens = vec![];
    for (token, span) in Token::lexer(input).spanned() {
      if let Token::Error = token {
        let Span { start, end } = span;
        bail!(
          "Couldn't lex input at byte {}: unexpected {:?}",
          start,
          &input[start..end]
        );
      }
      tokens.push((span.start, token, span.end));
    }

    assem::ProgramParser::new()
      .parse(tokens)
      .map_err(|e| anyhow!("Couldn't parse input. Failed with message {}", e))
  }

  /// Parse a file, or the given string if one is passed in instead.
  pub fn parse(file_name: &str, file_str: Option<String>) -> Result<Program> {
    let str_file = match file_str {
      Some(file) => file,
      None => {
        fs::read_to_string(file_name).with_context(|| format!("Couldn't read file {}", file_name))?
      }
    };

    parse_string(&str_file)
  }
}

#[cfg(test)]
mod tests {
  use super::parser::parse_string;
  use crate::ast::{SurfaceLine, SurfaceOperand};

  #[test]
  fn parse_procedure() {
    let program = parse_string(
      r#"
      proc main {
        move x <- %rdi
      .L0:
        oper "addq $1, `d0" def(x) use(x)
        oper "cmpq $9, `s0; jl `j0" use(x) jump(.L0, .L1)
      .L1:
        move "movq `s0, `d0" %rax <- x
        oper "ret" use(%rax) jump()
      }
      "#,
    )
    .unwrap();

    assert_eq!(program.len(), 1);
    let proc = &program[0];
    assert_eq!(proc.name, "main");
    assert_eq!(proc.lines.len(), 7);
    assert_eq!(
      proc.lines[0],
      SurfaceLine::Move {
        assem: None,
        dst: SurfaceOperand::Temp("x".to_string()),
        src: SurfaceOperand::Reg("rdi".to_string()),
      }
    );
    assert_eq!(proc.lines[1], SurfaceLine::Label(".L0".to_string()));
    assert_eq!(
      proc.lines[3],
      SurfaceLine::Oper {
        assem: "cmpq $9, `s0; jl `j0".to_string(),
        defs: vec![],
        uses: vec![SurfaceOperand::Temp("x".to_string())],
        jumps: Some(vec![".L0".to_string(), ".L1".to_string()]),
      }
    );
    match &proc.lines[6] {
      SurfaceLine::Oper { jumps, .. } => assert_eq!(jumps, &Some(vec![])),
      other => panic!("unexpected line {:?}", other),
    }
  }

  #[test]
  fn parse_several_procedures() {
    let program = parse_string("proc a { } proc b { oper \"nop\" }").unwrap();
    assert_eq!(program.len(), 2);
    assert!(program[0].lines.is_empty());
  }

  #[test]
  fn syntax_errors_are_reported() {
    assert!(parse_string("proc a { move x }").is_err());
    assert!(parse_string("proc a { oper \"x\" @ }").is_err());
  }
}
