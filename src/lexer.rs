use std::fmt;

use lazy_static::lazy_static;
use log::trace;
use regex::Regex;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "EOF"),
            Token::Def => write!(f, "DEF"),
            Token::Extern => write!(f, "EXTERN"),
            Token::Ident(name) => write!(f, "IDENT({})", name),
            Token::Number(value) => write!(f, "NUM({:.6})", value),
            Token::Char(c) => write!(f, "LITERAL '{}'", c),
        }
    }
}

lazy_static! {
    // longest prefix of a digit/dot run that reads as a decimal number
    static ref NUMBER_PREFIX_RE: Regex = Regex::new(r"^(\d+\.?\d*|\.\d+)").unwrap();
}

/// Reads a run of digits and dots the way C's `atof` does: malformed
/// trailing text is ignored, and a run with no valid prefix is zero.
fn parse_number(text: &str) -> f64 {
    NUMBER_PREFIX_RE
        .find(text)
        .and_then(|prefix| prefix.as_str().parse().ok())
        .unwrap_or(0.0)
}

/// Turns a character stream into tokens, one `next_token` call at a time.
///
/// Only a single character of lookahead is held between calls, so the
/// lexer can sit on top of an interactive stream.
#[derive(Debug, Clone)]
pub struct Lexer<I: Iterator<Item = char>> {
    input: I,
    last_char: Option<char>,
}

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(input: I) -> Self {
        // a blank lookahead is skipped as whitespace on the first call
        Self {
            input,
            last_char: Some(' '),
        }
    }

    fn bump(&mut self) {
        self.last_char = self.input.next();
    }

    fn take_while(&mut self, first: char, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        text.push(first);
        self.bump();
        while let Some(c) = self.last_char.filter(|c| pred(*c)) {
            text.push(c);
            self.bump();
        }
        text
    }

    pub fn next_token(&mut self) -> Token {
        let token = self.lex_token();
        trace!("lexed {}", token);
        token
    }

    fn lex_token(&mut self) -> Token {
        loop {
            while self.last_char.map_or(false, char::is_whitespace) {
                self.bump();
            }

            let c = match self.last_char {
                Some(c) => c,
                None => return Token::Eof,
            };

            if c.is_ascii_alphabetic() {
                let ident = self.take_while(c, |c| c.is_ascii_alphanumeric());
                return match ident.as_str() {
                    "def" => Token::Def,
                    "extern" => Token::Extern,
                    _ => Token::Ident(ident),
                };
            }

            if c.is_ascii_digit() || c == '.' {
                let text = self.take_while(c, |c| c.is_ascii_digit() || c == '.');
                return Token::Number(parse_number(&text));
            }

            if c == '#' {
                while !matches!(self.last_char, None | Some('\n') | Some('\r')) {
                    self.bump();
                }
                continue;
            }

            self.bump();
            return Token::Char(c);
        }
    }
}

impl<'a> Lexer<std::str::Chars<'a>> {
    pub fn from_source(input: &'a str) -> Self {
        Self::new(input.chars())
    }
}

/// Yields every token before the end of input.
impl<I: Iterator<Item = char>> Iterator for Lexer<I> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::Eof => None,
            token => Some(token),
        }
    }
}

/// lex the given input string in source order, without the trailing end token
pub fn lex(input: &str) -> Vec<Token> {
    Lexer::from_source(input).collect()
}
