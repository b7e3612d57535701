use std::fmt::{self, Display};

/// Error produced while turning tokens into an AST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl ParserError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        ParserError { message: message.into(), position: None }
    }

    pub fn at<S: Into<String>>(message: S, position: usize) -> Self {
        ParserError { message: message.into(), position: Some(position) }
    }
}

impl Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "ParserError at byte {pos}: {}", self.message),
            None => write!(f, "ParserError: {}", self.message),
        }
    }
}

impl std::error::Error for ParserError {}

impl From<crate::tokenizer::TokenizerError> for ParserError {
    fn from(e: crate::tokenizer::TokenizerError) -> Self {
        ParserError { message: e.message, position: Some(e.pos) }
    }
}
