pub mod parser;
pub mod tokenizer;
pub mod types;

pub use parser::{ASTNode, ASTNodeType, Parser, ReferenceType, parse, parse_at, parse_reference};
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError};
pub use types::ParserError;

// Re-export common types
pub use gridcalc_common::{Address, ExcelError, ExcelErrorKind, LiteralValue, RangeAddr, RefCoord};
