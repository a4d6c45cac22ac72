use std::fmt;

use log::{debug, warn};

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::lexer::{Lexer, Token};
use crate::precedence::PrecedenceTable;

pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PrototypeDefect {
    MissingName,
    MissingOpenParen,
    MissingCloseParen,
}

impl fmt::Display for PrototypeDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrototypeDefect::MissingName => write!(f, "expected function name in prototype"),
            PrototypeDefect::MissingOpenParen => write!(f, "expected '(' in prototype"),
            PrototypeDefect::MissingCloseParen => write!(f, "expected ')' in prototype"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unknown token when expecting an expression, found {0}")]
    UnexpectedToken(Token),
    #[error("expected ')', found {0}")]
    UnterminatedGroup(Token),
    #[error("expected ')' or ',' in argument list, found {0}")]
    MalformedArgumentList(Token),
    #[error("{0}, found {1}")]
    MalformedPrototype(PrototypeDefect, Token),
    #[error("expression nested deeper than {0} levels")]
    NestingTooDeep(usize),
}

pub type PartialParseResult = Result<Expression, ParserError>;

/// A recursive-descent parser over one token stream.
///
/// All cursor state lives in the parser itself, so independent parsers
/// never interfere with one another.
#[derive(Debug, Clone)]
pub struct Parser<I: Iterator<Item = char>> {
    lexer: Lexer<I>,
    current: Token,
    operator_precedence: PrecedenceTable,
    max_depth: usize,
    depth: usize,
}

impl<'a> Parser<std::str::Chars<'a>> {
    pub fn from_source(source: &'a str, operator_precedence: PrecedenceTable) -> Self {
        Self::new(source.chars(), operator_precedence)
    }

    /// Parses every construct in `source` with the default operators,
    /// stopping at the first error.
    pub fn parse_str(source: &'a str) -> Result<Vec<ASTNode>, ParserError> {
        let mut parser = Self::from_source(source, PrecedenceTable::default());
        let mut ast = Vec::new();
        while let Some(node) = parser.parse_top_level()? {
            ast.push(node);
        }
        Ok(ast)
    }
}

impl<I: Iterator<Item = char>> Parser<I> {
    pub fn new(input: I, operator_precedence: PrecedenceTable) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            operator_precedence,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: 0,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    fn advance(&mut self) -> Token {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn at_char(&self, c: char) -> bool {
        self.current == Token::Char(c)
    }

    fn current_precedence(&self) -> Option<u32> {
        match self.current {
            Token::Char(op) => self.operator_precedence.precedence_of(op),
            _ => None,
        }
    }

    fn parse_number(&mut self) -> PartialParseResult {
        match self.advance() {
            Token::Number(num) => Ok(Expression::Literal(num)),
            token => Err(ParserError::UnexpectedToken(token)),
        }
    }

    fn parse_nested(&mut self) -> PartialParseResult {
        // eat '('
        self.advance();
        let res = self.parse_expr()?;
        if !self.at_char(')') {
            return Err(ParserError::UnterminatedGroup(self.current.clone()));
        }
        self.advance();
        Ok(res)
    }

    fn parse_identifier(&mut self, ident: String) -> PartialParseResult {
        self.advance();
        if !self.at_char('(') {
            return Ok(Expression::Variable(ident));
        }
        self.advance();

        let mut args = Vec::new();
        if !self.at_char(')') {
            loop {
                args.push(self.parse_expr()?);
                if self.at_char(')') {
                    break;
                }
                if !self.at_char(',') {
                    return Err(ParserError::MalformedArgumentList(self.current.clone()));
                }
                self.advance();
            }
        }
        self.advance();

        Ok(Expression::Call(ident, args))
    }

    fn parse_primary(&mut self) -> PartialParseResult {
        match &self.current {
            Token::Number(_) => self.parse_number(),
            Token::Ident(ident) => {
                let ident = ident.clone();
                self.parse_identifier(ident)
            }
            Token::Char('(') => self.parse_nested(),
            token => Err(ParserError::UnexpectedToken(token.clone())),
        }
    }

    /// Precedence climbing: folds `op primary` pairs onto `lhs` for as long
    /// as the next operator binds at least as tightly as `expr_precedence`.
    /// Equal precedences fold left; only a strictly tighter operator
    /// recurses to claim the right-hand side first.
    fn parse_rhs(&mut self, expr_precedence: u32, lhs: Expression) -> PartialParseResult {
        let mut result = lhs;

        loop {
            let (operator, precedence) = match (&self.current, self.current_precedence()) {
                (&Token::Char(op), Some(pr)) if pr >= expr_precedence => (op, pr),
                _ => return Ok(result),
            };
            self.advance();

            let mut rhs = self.parse_primary()?;

            match self.current_precedence() {
                Some(next_precedence) if precedence < next_precedence => {
                    rhs = self.parse_rhs(precedence + 1, rhs)?
                }
                _ => (),
            };

            result = Expression::binary(operator, result, rhs);
        }
    }

    pub fn parse_expr(&mut self) -> PartialParseResult {
        if self.depth >= self.max_depth {
            return Err(ParserError::NestingTooDeep(self.max_depth));
        }
        self.depth += 1;
        let expr = self
            .parse_primary()
            .and_then(|lhs| self.parse_rhs(0, lhs));
        self.depth -= 1;
        expr
    }

    pub fn parse_prototype(&mut self) -> Result<Prototype, ParserError> {
        let malformed = |defect, token: &Token| ParserError::MalformedPrototype(defect, token.clone());

        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            token => return Err(malformed(PrototypeDefect::MissingName, token)),
        };
        self.advance();

        if !self.at_char('(') {
            return Err(malformed(PrototypeDefect::MissingOpenParen, &self.current));
        }
        self.advance();

        let mut args = Vec::new();
        while let Token::Ident(arg) = &self.current {
            args.push(arg.clone());
            self.advance();
        }

        if !self.at_char(')') {
            return Err(malformed(PrototypeDefect::MissingCloseParen, &self.current));
        }
        self.advance();

        Ok(Prototype { name, args })
    }

    pub fn parse_definition(&mut self) -> Result<Function, ParserError> {
        // eat 'def'
        self.advance();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expr()?;
        Ok(Function { prototype, body })
    }

    pub fn parse_extern(&mut self) -> Result<Prototype, ParserError> {
        // eat 'extern'
        self.advance();
        self.parse_prototype()
    }

    pub fn parse_top_level_expr(&mut self) -> Result<Function, ParserError> {
        self.parse_expr().map(Function::anonymous)
    }

    /// Parses the next construct, skipping `;` separators. `Ok(None)` marks
    /// the end of input. A failed construct leaves the parser where the
    /// error was found; see the `Iterator` impl for recovery.
    pub fn parse_top_level(&mut self) -> Result<Option<ASTNode>, ParserError> {
        loop {
            let node = match self.current {
                Token::Eof => return Ok(None),
                Token::Char(';') => {
                    self.advance();
                    continue;
                }
                Token::Def => ASTNode::Function(self.parse_definition()?),
                Token::Extern => ASTNode::Extern(self.parse_extern()?),
                _ => ASTNode::Function(self.parse_top_level_expr()?),
            };
            debug!("parsed {}", node);
            return Ok(Some(node));
        }
    }
}

/// Yields each top-level construct in turn. After a failure exactly one
/// token is discarded before the next construct starts, so every error
/// makes progress towards the end of input.
impl<I: Iterator<Item = char>> Iterator for Parser<I> {
    type Item = Result<ASTNode, ParserError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.parse_top_level() {
            Ok(node) => node.map(Ok),
            Err(err) => {
                let skipped = self.advance();
                warn!("{}; skipping {}", err, skipped);
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn num(value: f64) -> Expression {
        Expression::Literal(value)
    }

    fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    fn bin(op: char, lhs: Expression, rhs: Expression) -> Expression {
        Expression::binary(op, lhs, rhs)
    }

    fn parse_expr(input: &str) -> PartialParseResult {
        Parser::from_source(input, PrecedenceTable::default()).parse_expr()
    }

    #[test]
    fn parse_expr_works() {
        let target = bin(
            '+',
            var("x"),
            bin('*', num(1.0), bin('-', num(2.0), num(3.0))),
        );
        assert_eq!(parse_expr("x + 1 * (2 - 3)"), Ok(target));
    }

    #[test]
    fn higher_precedence_binds_tighter() {
        assert_eq!(
            parse_expr("1+2*3"),
            Ok(bin('+', num(1.0), bin('*', num(2.0), num(3.0))))
        );
        assert_eq!(
            parse_expr("1*2+3"),
            Ok(bin('+', bin('*', num(1.0), num(2.0)), num(3.0)))
        );
        assert_eq!(
            parse_expr("a < b + c * d"),
            Ok(bin('<', var("a"), bin('+', var("b"), bin('*', var("c"), var("d")))))
        );
    }

    #[test]
    fn equal_precedence_is_left_associative() {
        assert_eq!(
            parse_expr("1-2-3"),
            Ok(bin('-', bin('-', num(1.0), num(2.0)), num(3.0)))
        );
        assert_eq!(
            parse_expr("1-2+3"),
            Ok(bin('+', bin('-', num(1.0), num(2.0)), num(3.0)))
        );
    }

    #[test]
    fn tighter_operator_returns_to_looser_one() {
        // 1 + (2 * 3) then - 4 folds back at the outer level
        assert_eq!(
            parse_expr("1+2*3-4"),
            Ok(bin(
                '-',
                bin('+', num(1.0), bin('*', num(2.0), num(3.0))),
                num(4.0)
            ))
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(
            parse_expr("(1+2)*3"),
            Ok(bin('*', bin('+', num(1.0), num(2.0)), num(3.0)))
        );
    }

    #[test]
    fn calls() {
        assert_eq!(
            parse_expr("foo(1, 2+3)"),
            Ok(Expression::Call(
                "foo".to_string(),
                vec![num(1.0), bin('+', num(2.0), num(3.0))]
            ))
        );
        assert_eq!(parse_expr("foo()"), Ok(Expression::Call("foo".to_string(), vec![])));
        assert_eq!(
            parse_expr("f(g(x))"),
            Ok(Expression::Call(
                "f".to_string(),
                vec![Expression::Call("g".to_string(), vec![var("x")])]
            ))
        );
    }

    #[test]
    fn unknown_operator_ends_expression() {
        let mut parser = Parser::from_source("a / b", PrecedenceTable::default());
        assert_eq!(parser.parse_expr(), Ok(var("a")));
        assert_eq!(parser.current(), &Token::Char('/'));
    }

    #[test]
    fn custom_operators() {
        let mut table = PrecedenceTable::default();
        table.register('/', 40).unwrap();
        table.register('^', 60).unwrap();
        let mut parser = Parser::from_source("a / b ^ c", table);
        assert_eq!(
            parser.parse_expr(),
            Ok(bin('/', var("a"), bin('^', var("b"), var("c"))))
        );
    }

    #[test]
    fn expression_errors() {
        assert_eq!(
            parse_expr(")"),
            Err(ParserError::UnexpectedToken(Token::Char(')')))
        );
        assert_eq!(parse_expr("(1+2"), Err(ParserError::UnterminatedGroup(Token::Eof)));
        assert_eq!(
            parse_expr("foo(1 2)"),
            Err(ParserError::MalformedArgumentList(Token::Number(2.0)))
        );
        assert_eq!(parse_expr("1 +"), Err(ParserError::UnexpectedToken(Token::Eof)));
        assert_eq!(
            parse_expr("def").unwrap_err().to_string(),
            "unknown token when expecting an expression, found DEF"
        );
    }

    #[test]
    fn prototype_errors() {
        let parse = |input| Parser::from_source(input, PrecedenceTable::default()).parse_prototype();
        assert_eq!(
            parse("(x)"),
            Err(ParserError::MalformedPrototype(
                PrototypeDefect::MissingName,
                Token::Char('(')
            ))
        );
        assert_eq!(
            parse("f x"),
            Err(ParserError::MalformedPrototype(
                PrototypeDefect::MissingOpenParen,
                Token::Ident("x".to_string())
            ))
        );
        assert_eq!(
            parse("f(x, y)"),
            Err(ParserError::MalformedPrototype(
                PrototypeDefect::MissingCloseParen,
                Token::Char(',')
            ))
        );
        assert_eq!(
            parse("f(x").unwrap_err().to_string(),
            "expected ')' in prototype, found EOF"
        );
    }

    #[test]
    fn prototype_keeps_duplicate_params() {
        let mut parser = Parser::from_source("f(x x)", PrecedenceTable::default());
        assert_eq!(
            parser.parse_prototype(),
            Ok(Prototype {
                name: "f".to_string(),
                args: vec!["x".to_string(), "x".to_string()],
            })
        );
    }

    #[test]
    fn top_level_constructs() {
        let ast = Parser::parse_str("extern sin(x); def sq(x) x*x; 1+1").unwrap();
        assert_eq!(
            ast,
            vec![
                ASTNode::Extern(Prototype {
                    name: "sin".to_string(),
                    args: vec!["x".to_string()],
                }),
                ASTNode::Function(Function {
                    prototype: Prototype {
                        name: "sq".to_string(),
                        args: vec!["x".to_string()],
                    },
                    body: bin('*', var("x"), var("x")),
                }),
                ASTNode::Function(Function::anonymous(bin('+', num(1.0), num(1.0)))),
            ]
        );
    }

    #[test]
    fn empty_and_separator_only_input() {
        assert_eq!(Parser::parse_str(""), Ok(vec![]));
        assert_eq!(Parser::parse_str(";;; # nothing\n;"), Ok(vec![]));
    }

    #[test]
    fn recovery_skips_one_token() {
        let parser = Parser::from_source(") 1+2; def (x) 3; 4", PrecedenceTable::default());
        let results: Vec<_> = parser.collect();
        assert_eq!(
            results,
            vec![
                Err(ParserError::UnexpectedToken(Token::Char(')'))),
                Ok(ASTNode::Function(Function::anonymous(bin('+', num(1.0), num(2.0))))),
                Err(ParserError::MalformedPrototype(
                    PrototypeDefect::MissingName,
                    Token::Char('(')
                )),
                // the '(' is dropped, leaving `x) 3` to be read as expressions
                Ok(ASTNode::Function(Function::anonymous(var("x")))),
                Err(ParserError::UnexpectedToken(Token::Char(')'))),
                Ok(ASTNode::Function(Function::anonymous(num(3.0)))),
                Ok(ASTNode::Function(Function::anonymous(num(4.0)))),
            ]
        );
    }

    #[test]
    fn error_at_end_of_input_terminates() {
        let results: Vec<_> =
            Parser::from_source("def f(", PrecedenceTable::default()).collect();
        assert_eq!(
            results,
            vec![Err(ParserError::MalformedPrototype(
                PrototypeDefect::MissingCloseParen,
                Token::Eof
            ))]
        );
    }

    #[test]
    fn nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        let mut parser = Parser::from_source(&deep, PrecedenceTable::default()).with_max_depth(5);
        assert_eq!(parser.parse_expr(), Err(ParserError::NestingTooDeep(5)));

        let mut parser = Parser::from_source(&deep, PrecedenceTable::default()).with_max_depth(11);
        assert_eq!(parser.parse_expr(), Ok(num(1.0)));
    }
}
