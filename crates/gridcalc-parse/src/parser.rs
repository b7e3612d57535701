use crate::tokenizer::{Associativity, Token, TokenSubType, TokenType, Tokenizer};
use crate::types::ParserError;
use gridcalc_common::{Address, ExcelError, LiteralValue, MAX_ROW, RefCoord, letters_to_column};
use std::hash::{Hash, Hasher};

/// Functions whose value can change between otherwise identical evaluations.
static VOLATILE_FUNCTIONS: &[&str] = &["NOW", "TODAY", "RAND", "RANDBETWEEN"];

/// A resolved reference operand. `Name` covers identifiers that are not grid
/// coordinates; whether a name means anything is the evaluator's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReferenceType {
    Cell {
        sheet: Option<String>,
        coord: RefCoord,
    },
    Range {
        sheet: Option<String>,
        start: RefCoord,
        end: RefCoord,
    },
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ASTNodeType {
    Literal(LiteralValue),
    Reference {
        original: String,
        reference: ReferenceType,
    },
    UnaryOp {
        op: String,
        expr: Box<ASTNode>,
    },
    BinaryOp {
        op: String,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },
    Function {
        name: String,
        args: Vec<ASTNode>,
    },
    /// A computed callee applied to arguments: `LAMBDA(x,x+1)(41)`.
    Invoke {
        callee: Box<ASTNode>,
        args: Vec<ASTNode>,
    },
    Array(Vec<Vec<ASTNode>>),
}

#[derive(Debug, Clone, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ASTNode {
    pub node_type: ASTNodeType,
}

impl ASTNode {
    pub fn new(node_type: ASTNodeType) -> Self {
        ASTNode { node_type }
    }

    /// Structural hash used as a subexpression cache key.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Visit every reference operand in source order.
    pub fn walk_refs<'a>(&'a self, f: &mut impl FnMut(&'a str, &'a ReferenceType)) {
        match &self.node_type {
            ASTNodeType::Literal(_) => {}
            ASTNodeType::Reference { original, reference } => f(original, reference),
            ASTNodeType::UnaryOp { expr, .. } => expr.walk_refs(f),
            ASTNodeType::BinaryOp { left, right, .. } => {
                left.walk_refs(f);
                right.walk_refs(f);
            }
            ASTNodeType::Function { args, .. } => {
                for arg in args {
                    arg.walk_refs(f);
                }
            }
            ASTNodeType::Invoke { callee, args } => {
                callee.walk_refs(f);
                for arg in args {
                    arg.walk_refs(f);
                }
            }
            ASTNodeType::Array(rows) => {
                for row in rows {
                    for item in row {
                        item.walk_refs(f);
                    }
                }
            }
        }
    }

    /// All references in source order.
    pub fn get_dependencies(&self) -> Vec<&ReferenceType> {
        let mut out = Vec::new();
        self.walk_refs(&mut |_, r| out.push(r));
        out
    }

    pub fn contains_volatile(&self) -> bool {
        match &self.node_type {
            ASTNodeType::Literal(_) | ASTNodeType::Reference { .. } => false,
            ASTNodeType::UnaryOp { expr, .. } => expr.contains_volatile(),
            ASTNodeType::BinaryOp { left, right, .. } => {
                left.contains_volatile() || right.contains_volatile()
            }
            ASTNodeType::Function { name, args } => {
                VOLATILE_FUNCTIONS.contains(&name.as_str())
                    || args.iter().any(|a| a.contains_volatile())
            }
            ASTNodeType::Invoke { callee, args } => {
                callee.contains_volatile() || args.iter().any(|a| a.contains_volatile())
            }
            ASTNodeType::Array(rows) => rows
                .iter()
                .any(|row| row.iter().any(|item| item.contains_volatile())),
        }
    }
}

/// Parse a formula with no cell context. R1C1 relative references are
/// rejected because there is no origin to anchor them to.
pub fn parse(formula: &str) -> Result<ASTNode, ParserError> {
    parse_at(formula, None)
}

/// Parse a formula written in the given cell. Relative R1C1 axes are
/// materialized against `origin` into ordinary relative coordinates.
pub fn parse_at(formula: &str, origin: Option<Address>) -> Result<ASTNode, ParserError> {
    let tokenizer = Tokenizer::new(formula)?;
    Parser::new(tokenizer.items, origin).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    origin: Option<Address>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, origin: Option<Address>) -> Self {
        let tokens = tokens
            .into_iter()
            .filter(|t| t.token_type != TokenType::Whitespace)
            .collect();
        Parser { tokens, current: 0, origin }
    }

    pub fn parse(mut self) -> Result<ASTNode, ParserError> {
        if self.tokens.is_empty() {
            return Err(ParserError::new("Empty formula"));
        }
        let node = self.parse_expr(0)?;
        if let Some(tok) = self.peek() {
            return Err(ParserError::at(
                format!("Unexpected token '{}'", tok.value),
                tok.start,
            ));
        }
        Ok(node)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.current);
        if tok.is_some() {
            self.current += 1;
        }
        tok
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<ASTNode, ParserError> {
        let mut left = self.parse_unary()?;

        while let Some(tok) = self.peek() {
            if tok.token_type != TokenType::OpInfix {
                break;
            }
            let Some((prec, assoc)) = tok.precedence() else {
                return Err(ParserError::at(
                    format!("Unknown operator '{}'", tok.value),
                    tok.start,
                ));
            };
            if prec < min_prec {
                break;
            }
            let op = tok.value.clone();
            self.current += 1;

            let next_min = match assoc {
                Associativity::Left => prec + 1,
                Associativity::Right => prec,
            };
            let right = self.parse_expr(next_min)?;
            left = ASTNode::new(ASTNodeType::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ASTNode, ParserError> {
        if let Some(tok) = self.peek() {
            if tok.token_type == TokenType::OpPrefix {
                let op = tok.value.clone();
                self.current += 1;
                let expr = self.parse_unary()?;
                return Ok(ASTNode::new(ASTNodeType::UnaryOp { op, expr: Box::new(expr) }));
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<ASTNode, ParserError> {
        let mut node = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(tok) if tok.token_type == TokenType::OpPostfix => {
                    self.current += 1;
                    node = ASTNode::new(ASTNodeType::UnaryOp {
                        op: "%".to_string(),
                        expr: Box::new(node),
                    });
                }
                // An open paren directly after an expression applies it:
                // `LAMBDA(x,x+1)(41)`, or through LET, `LET(f,...,f(2))` once
                // `f` parses as a name.
                Some(tok)
                    if tok.token_type == TokenType::Paren
                        && tok.subtype == TokenSubType::Open =>
                {
                    self.current += 1;
                    let args = self.parse_call_args(TokenType::Paren)?;
                    node = ASTNode::new(ASTNodeType::Invoke {
                        callee: Box::new(node),
                        args,
                    });
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<ASTNode, ParserError> {
        let Some(tok) = self.advance() else {
            return Err(ParserError::new("Unexpected end of formula"));
        };
        let tok = tok.clone();

        match (tok.token_type, tok.subtype) {
            (TokenType::Operand, TokenSubType::Number) => {
                let node = if let Ok(i) = tok.value.parse::<i64>() {
                    ASTNodeType::Literal(LiteralValue::Int(i))
                } else {
                    let n: f64 = tok.value.parse().map_err(|_| {
                        ParserError::at(format!("Invalid number '{}'", tok.value), tok.start)
                    })?;
                    ASTNodeType::Literal(LiteralValue::Number(n))
                };
                Ok(ASTNode::new(node))
            }
            (TokenType::Operand, TokenSubType::Text) => {
                let inner = tok.value[1..tok.value.len() - 1].replace("\"\"", "\"");
                Ok(ASTNode::new(ASTNodeType::Literal(LiteralValue::Text(inner))))
            }
            (TokenType::Operand, TokenSubType::Logical) => {
                let b = tok.value.eq_ignore_ascii_case("TRUE");
                Ok(ASTNode::new(ASTNodeType::Literal(LiteralValue::Boolean(b))))
            }
            (TokenType::Operand, TokenSubType::Error) => Ok(ASTNode::new(ASTNodeType::Literal(
                LiteralValue::Error(ExcelError::from_error_string(&tok.value)),
            ))),
            (TokenType::Operand, TokenSubType::Reference) => {
                let reference = parse_reference(&tok.value, self.origin)
                    .map_err(|msg| ParserError::at(msg, tok.start))?;
                Ok(ASTNode::new(ASTNodeType::Reference {
                    original: tok.value.clone(),
                    reference,
                }))
            }
            (TokenType::Func, TokenSubType::Open) => {
                let name = tok.value[..tok.value.len() - 1].to_ascii_uppercase();
                let args = self.parse_call_args(TokenType::Func)?;
                Ok(ASTNode::new(ASTNodeType::Function { name, args }))
            }
            (TokenType::Paren, TokenSubType::Open) => {
                let inner = self.parse_expr(0)?;
                self.expect_close(TokenType::Paren)?;
                Ok(inner)
            }
            (TokenType::Array, TokenSubType::Open) => self.parse_array(),
            _ => Err(ParserError::at(
                format!("Unexpected token '{}'", tok.value),
                tok.start,
            )),
        }
    }

    /// Argument list after an opener; handles `F()`, and empty positions as
    /// `Empty` literals: `F(a,,b)`, `F(a,)`.
    fn parse_call_args(&mut self, close_type: TokenType) -> Result<Vec<ASTNode>, ParserError> {
        let mut args = Vec::new();

        if self.peek_is_close(close_type) {
            self.current += 1;
            return Ok(args);
        }

        loop {
            if self.peek_is_sep() || self.peek_is_close(close_type) {
                args.push(ASTNode::new(ASTNodeType::Literal(LiteralValue::Empty)));
            } else {
                args.push(self.parse_expr(0)?);
            }

            match self.advance() {
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg => {}
                Some(t) if t.token_type == close_type && t.subtype == TokenSubType::Close => {
                    return Ok(args);
                }
                Some(t) => {
                    return Err(ParserError::at(
                        format!("Unexpected token '{}' in argument list", t.value),
                        t.start,
                    ));
                }
                None => return Err(ParserError::new("Unterminated argument list")),
            }
        }
    }

    /// `{1,2;3,4}`: `,` advances a column, `;` starts a new row. Rows must be
    /// the same width.
    fn parse_array(&mut self) -> Result<ASTNode, ParserError> {
        let mut rows: Vec<Vec<ASTNode>> = Vec::new();
        let mut row: Vec<ASTNode> = Vec::new();

        loop {
            row.push(self.parse_expr(0)?);
            match self.advance() {
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg => {}
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Row => {
                    rows.push(std::mem::take(&mut row));
                }
                Some(t) if t.token_type == TokenType::Array && t.subtype == TokenSubType::Close => {
                    rows.push(row);
                    break;
                }
                Some(t) => {
                    return Err(ParserError::at(
                        format!("Unexpected token '{}' in array literal", t.value),
                        t.start,
                    ));
                }
                None => return Err(ParserError::new("Unterminated array literal")),
            }
        }

        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(ParserError::new("Array rows have unequal lengths"));
        }
        Ok(ASTNode::new(ASTNodeType::Array(rows)))
    }

    fn peek_is_close(&self, close_type: TokenType) -> bool {
        matches!(self.peek(), Some(t) if t.token_type == close_type && t.subtype == TokenSubType::Close)
    }

    fn peek_is_sep(&self) -> bool {
        matches!(self.peek(), Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg)
    }

    fn expect_close(&mut self, close_type: TokenType) -> Result<(), ParserError> {
        match self.advance() {
            Some(t) if t.token_type == close_type && t.subtype == TokenSubType::Close => Ok(()),
            Some(t) => Err(ParserError::at(
                format!("Expected closing delimiter, found '{}'", t.value),
                t.start,
            )),
            None => Err(ParserError::new("Expected closing delimiter")),
        }
    }
}

/* ───────────────────────── reference parsing ───────────────────────── */

/// Split an optional sheet prefix off a reference operand. Quoted names may
/// contain spaces and escape `'` as `''`.
fn split_sheet(text: &str) -> Result<(Option<String>, &str), String> {
    if let Some(rest) = text.strip_prefix('\'') {
        // Find the closing quote, skipping escaped ones.
        let bytes = rest.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                let name = rest[..i].replace("''", "'");
                let after = &rest[i + 1..];
                let Some(tail) = after.strip_prefix('!') else {
                    return Err(format!("Expected '!' after sheet name in '{text}'"));
                };
                return Ok((Some(name), tail));
            }
            i += 1;
        }
        Err(format!("Unterminated sheet name in '{text}'"))
    } else if let Some(bang) = text.find('!') {
        let name = &text[..bang];
        if name.is_empty() {
            return Err(format!("Empty sheet name in '{text}'"));
        }
        Ok((Some(name.to_string()), &text[bang + 1..]))
    } else {
        Ok((None, text))
    }
}

/// One A1 coordinate: optional `$`, letters, optional `$`, digits.
fn parse_a1_coord(text: &str) -> Option<RefCoord> {
    let bytes = text.as_bytes();
    let mut i = 0;

    let col_abs = bytes.first() == Some(&b'$');
    if col_abs {
        i += 1;
    }
    let col_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == col_start {
        return None;
    }
    let col = letters_to_column(&text[col_start..i])?;

    let row_abs = bytes.get(i) == Some(&b'$');
    if row_abs {
        i += 1;
    }
    let row_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == row_start || i != bytes.len() {
        return None;
    }
    let row: u32 = text[row_start..].parse().ok()?;
    if row == 0 || row > MAX_ROW {
        return None;
    }
    Some(RefCoord::new(row, col, row_abs, col_abs))
}

/// One R1C1 axis: `R5` absolute, `R[-2]` relative offset, bare `R` offset 0.
/// Returns (value, absolute) or `None` on malformed input; a relative axis
/// carries its signed offset in `value` relative interpretation.
fn parse_r1c1_axis(text: &str) -> Option<(i64, bool, usize)> {
    let bytes = text.as_bytes();
    if bytes.first() == Some(&b'[') {
        let close = text.find(']')?;
        let offset: i64 = text[1..close].parse().ok()?;
        Some((offset, false, close + 1))
    } else {
        let mut i = 0;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == 0 {
            // Bare axis letter means "same row/column".
            Some((0, false, 0))
        } else {
            let value: i64 = text[..i].parse().ok()?;
            Some((value, true, i))
        }
    }
}

/// Full R1C1 coordinate. Relative axes need `origin` to anchor against.
fn parse_r1c1_coord(text: &str, origin: Option<Address>) -> Option<Result<RefCoord, String>> {
    let bytes = text.as_bytes();
    if bytes.first().map(|b| b.to_ascii_uppercase()) != Some(b'R') {
        return None;
    }
    let (row_val, row_abs, row_len) = parse_r1c1_axis(&text[1..])?;
    let rest = &text[1 + row_len..];
    if rest.as_bytes().first().map(|b| b.to_ascii_uppercase()) != Some(b'C') {
        return None;
    }
    let (col_val, col_abs, col_len) = parse_r1c1_axis(&rest[1..])?;
    if 1 + col_len != rest.len() {
        return None;
    }

    let resolve_axis = |val: i64, abs: bool, base: Option<u32>| -> Result<(u32, bool), String> {
        if abs {
            if val < 1 {
                return Err(format!("R1C1 index out of range in '{text}'"));
            }
            Ok((val as u32, true))
        } else {
            let Some(base) = base else {
                return Err(format!(
                    "Relative R1C1 reference '{text}' requires a cell context"
                ));
            };
            let pos = i64::from(base) + val;
            if pos < 1 {
                return Err(format!("R1C1 offset out of range in '{text}'"));
            }
            Ok((pos as u32, false))
        }
    };

    let result = (|| {
        let (row, row_abs) = resolve_axis(row_val, row_abs, origin.map(|o| o.row))?;
        let (col, col_abs) = resolve_axis(col_val, col_abs, origin.map(|o| o.col))?;
        Ok(RefCoord::new(row, col, row_abs, col_abs))
    })();
    Some(result)
}

fn parse_coord(text: &str, origin: Option<Address>) -> Option<Result<RefCoord, String>> {
    // R1C1 wins for texts that match both shapes ("R1C1" itself would never
    // parse as A1 anyway).
    if let Some(res) = parse_r1c1_coord(text, origin) {
        return Some(res);
    }
    parse_a1_coord(text).map(Ok)
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Classify a reference operand: cell, range, or bare name.
pub fn parse_reference(text: &str, origin: Option<Address>) -> Result<ReferenceType, String> {
    let (sheet, body) = split_sheet(text)?;

    if let Some(colon) = body.find(':') {
        let (lhs, rhs) = (&body[..colon], &body[colon + 1..]);
        let start = parse_coord(lhs, origin)
            .ok_or_else(|| format!("Invalid range start '{lhs}'"))??;
        let end = parse_coord(rhs, origin)
            .ok_or_else(|| format!("Invalid range end '{rhs}'"))??;
        return Ok(ReferenceType::Range { sheet, start, end });
    }

    if let Some(coord) = parse_coord(body, origin) {
        return Ok(ReferenceType::Cell { sheet, coord: coord? });
    }

    if sheet.is_none() && is_identifier(body) {
        return Ok(ReferenceType::Name(body.to_string()));
    }
    Err(format!("Invalid reference '{text}'"))
}
