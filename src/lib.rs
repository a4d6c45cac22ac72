//! Front end for the kaleidoscope toy language: a lexer, an
//! operator-precedence parser, and the AST they produce.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod precedence;

pub use ast::{ASTNode, Expression, Function, Prototype};
pub use lexer::{lex, Lexer, Token};
pub use parser::{Parser, ParserError, PrototypeDefect};
pub use precedence::{PrecedenceError, PrecedenceTable};
