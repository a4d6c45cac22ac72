use std::collections::HashMap;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum PrecedenceError {
    #[error("'{0}' cannot be used as a binary operator")]
    ReservedSymbol(char),
    #[error("operator '{0}' needs a precedence above zero")]
    ZeroPrecedence(char),
}

/// Binding power of each binary operator character. Every registered
/// operator is left-associative; a higher precedence binds tighter.
#[derive(Debug, PartialEq, Clone)]
pub struct PrecedenceTable {
    operators: HashMap<char, u32>,
}

impl std::default::Default for PrecedenceTable {
    fn default() -> Self {
        let mut operators = HashMap::new();
        operators.insert('<', 10);
        operators.insert('+', 20);
        operators.insert('-', 20);
        operators.insert('*', 40);
        Self { operators }
    }
}

/// Characters the lexer never hands out as a literal token, or that the
/// grammar already gives a meaning.
fn is_reserved(op: char) -> bool {
    op.is_ascii_alphanumeric()
        || op.is_whitespace()
        || matches!(op, '.' | '#' | '(' | ')' | ',' | ';')
}

impl PrecedenceTable {
    /// A table with no operators at all.
    pub fn empty() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    /// Registers `op`, replacing any precedence it already had.
    pub fn register(&mut self, op: char, precedence: u32) -> Result<(), PrecedenceError> {
        if is_reserved(op) {
            return Err(PrecedenceError::ReservedSymbol(op));
        }
        if precedence == 0 {
            return Err(PrecedenceError::ZeroPrecedence(op));
        }
        self.operators.insert(op, precedence);
        Ok(())
    }

    pub fn remove(&mut self, op: char) -> Option<u32> {
        self.operators.remove(&op)
    }

    /// `None` means `op` is not a binary operator, which orders below every
    /// registered precedence.
    pub fn precedence_of(&self, op: char) -> Option<u32> {
        self.operators.get(&op).copied()
    }

    pub fn is_operator(&self, op: char) -> bool {
        self.operators.contains_key(&op)
    }
}
