//! S-expression parser for the fact-store language.
//!
//! An expression is an atom, an integer, a double-quoted string, or a
//! parenthesized list of expressions. Exactly one expression per submission.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Atom(String),
    Int(i64),
    Str(String),
    List(Vec<Expr>),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty input")]
    Empty,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unknown escape sequence: \\{0}")]
    BadEscape(char),

    #[error("invalid integer literal: {0}")]
    BadInt(String),

    #[error("unbalanced parentheses")]
    Unbalanced,

    #[error("unexpected trailing input after expression")]
    Trailing,
}

enum Token {
    Open,
    Close,
    Atom(String),
    Int(i64),
    Str(String),
}

pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut pos = 0;
    let expr = parse_expr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(ParseError::Trailing);
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(read_string(&mut chars)?));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | '"') {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(classify(word)?);
            }
        }
    }
    Ok(tokens)
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<String, ParseError> {
    let mut s = String::new();
    loop {
        match chars.next() {
            None => return Err(ParseError::UnterminatedString),
            Some('"') => return Ok(s),
            Some('\\') => match chars.next() {
                Some('n') => s.push('\n'),
                Some('t') => s.push('\t'),
                Some('"') => s.push('"'),
                Some('\\') => s.push('\\'),
                Some(other) => return Err(ParseError::BadEscape(other)),
                None => return Err(ParseError::UnterminatedString),
            },
            Some(ch) => s.push(ch),
        }
    }
}

fn classify(word: String) -> Result<Token, ParseError> {
    let numeric = word.starts_with(|c: char| c.is_ascii_digit())
        || (word.len() > 1 && word.starts_with('-') && word[1..].starts_with(|c: char| c.is_ascii_digit()));

    if numeric {
        let n = word.parse().map_err(|_| ParseError::BadInt(word))?;
        Ok(Token::Int(n))
    } else {
        Ok(Token::Atom(word))
    }
}

fn parse_expr(tokens: &[Token], pos: &mut usize) -> Result<Expr, ParseError> {
    match tokens.get(*pos) {
        None | Some(Token::Close) => Err(ParseError::Unbalanced),
        Some(Token::Atom(s)) => {
            *pos += 1;
            Ok(Expr::Atom(s.clone()))
        }
        Some(Token::Int(n)) => {
            *pos += 1;
            Ok(Expr::Int(*n))
        }
        Some(Token::Str(s)) => {
            *pos += 1;
            Ok(Expr::Str(s.clone()))
        }
        Some(Token::Open) => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                match tokens.get(*pos) {
                    None => return Err(ParseError::Unbalanced),
                    Some(Token::Close) => {
                        *pos += 1;
                        return Ok(Expr::List(items));
                    }
                    Some(_) => items.push(parse_expr(tokens, pos)?),
                }
            }
        }
    }
}
