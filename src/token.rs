//! Tokens and a tokenizer for instruction lines.

use logos::{Lexer, Logos};

use std::fmt;

/// Enumeration of all tokens of an instruction line.
///
/// Whitespace and commas separate tokens and are skipped, so `MOV EAX, 5` and `MOV EAX 5`
/// produce the same tokens.
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token<'t> {
    /// Errorneous token. Only produced for an unterminated string literal.
    #[error]
    #[regex(r"[ \t\f\r\n,]+", logos::skip)]
    Error,

    /// A double quoted literal. The quotes are not part of the value.
    #[regex(r#""[^"]*""#, text_callback)]
    Text(&'t str),

    /// Any other run of non-separator characters: opcodes, registers, numbers and
    /// bracketed memory references.
    #[regex(r#"[^ \t\f\r\n,"]+"#)]
    Word(&'t str),
}

fn text_callback<'t>(lex: &mut Lexer<'t, Token<'t>>) -> &'t str {
    let slice = lex.slice();
    &slice[1..slice.len() - 1]
}

impl<'t> fmt::Display for Token<'t> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Error => write!(f, "<error>"),
            Token::Text(text) => write!(f, "\"{}\"", text),
            Token::Word(word) => write!(f, "{}", word),
        }
    }
}

/// Splits a line into its words and its first string literal.
///
/// The tokenizer never fails: the remains of an unterminated literal are returned as words.
pub fn split_line(line: &str) -> (Vec<&str>, Option<&str>) {
    let mut words = Vec::new();
    let mut text = None;
    let mut lexer = Token::lexer(line);

    while let Some(token) = lexer.next() {
        match token {
            Token::Word(word) => words.push(word),
            Token::Text(literal) if text.is_none() => text = Some(literal),
            Token::Text(_) => (),
            Token::Error => words.push(lexer.slice()),
        }
    }

    (words, text)
}

#[test]
fn test_split_line() {
    let (words, text) = split_line("  mov eax, [ebx+4]  ");
    assert_eq!(words, vec!["mov", "eax", "[ebx+4]"]);
    assert_eq!(text, None);

    let (words, text) = split_line(r#"SETTEXT 2000 "Hello, world""#);
    assert_eq!(words, vec!["SETTEXT", "2000"]);
    assert_eq!(text, Some("Hello, world"));

    let (words, text) = split_line(r#"SETTEXT 2000 """#);
    assert_eq!(words, vec!["SETTEXT", "2000"]);
    assert_eq!(text, Some(""));
}

#[test]
fn test_unterminated_literal() {
    let (words, text) = split_line(r#"SETTEXT 2000 "oops"#);
    assert_eq!(words[..2], ["SETTEXT", "2000"]);
    assert_eq!(text, None);
}
