use std::error::Error;
use std::fmt::{self, Display};

const TOKEN_ENDERS: &str = ",;}) +-*/^&=><%";

const fn build_token_enders() -> [bool; 256] {
    let mut tbl = [false; 256];
    let bytes = TOKEN_ENDERS.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        tbl[bytes[i] as usize] = true;
        i += 1;
    }
    tbl
}
static TOKEN_ENDERS_TABLE: [bool; 256] = build_token_enders();

#[inline(always)]
fn is_token_ender(c: u8) -> bool {
    TOKEN_ENDERS_TABLE[c as usize]
}

/// Error literals, longest-prefix first where codes share a prefix.
static ERROR_CODES: &[&str] = &[
    "#NULL!",
    "#DIV/0!",
    "#VALUE!",
    "#REF!",
    "#NAME?",
    "#NUM!",
    "#N/A",
    "#GETTING_DATA",
    "#SPILL!",
    "#CALC!",
];

#[derive(Debug, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenizerError: {}", self.message)
    }
}

impl Error for TokenizerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Operand,
    Func,
    Array,
    Paren,
    Sep,
    OpPrefix,
    OpInfix,
    OpPostfix,
    Whitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSubType {
    None,
    Text,
    Number,
    Logical,
    Error,
    Reference,
    Open,
    Close,
    Arg,
    Row,
}

/// One lexeme, with its byte span in the source formula.
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Token {
    pub value: String,
    pub token_type: TokenType,
    pub subtype: TokenSubType,
    pub start: usize,
    pub end: usize,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:?} {:?} {}>", self.token_type, self.subtype, self.value)
    }
}

impl Token {
    fn from_slice(
        source: &str,
        token_type: TokenType,
        subtype: TokenSubType,
        start: usize,
        end: usize,
    ) -> Self {
        Token { value: source[start..end].to_string(), token_type, subtype, start, end }
    }

    /// Operand classification happens at save time from the raw text.
    fn make_operand(source: &str, start: usize, end: usize) -> Self {
        let text = &source[start..end];
        let subtype = if text.starts_with('"') {
            TokenSubType::Text
        } else if text.starts_with('#') {
            TokenSubType::Error
        } else if text.eq_ignore_ascii_case("TRUE") || text.eq_ignore_ascii_case("FALSE") {
            TokenSubType::Logical
        } else if text.parse::<f64>().is_ok() {
            TokenSubType::Number
        } else {
            TokenSubType::Reference
        };
        Token::from_slice(source, TokenType::Operand, subtype, start, end)
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self.token_type,
            TokenType::OpPrefix | TokenType::OpInfix | TokenType::OpPostfix
        )
    }

    /// Binding power for the Pratt parser. Prefix sign binds tighter than
    /// every binary operator; comparisons bind loosest.
    pub fn precedence(&self) -> Option<(u8, Associativity)> {
        let op = if self.token_type == TokenType::OpPrefix {
            "u"
        } else {
            self.value.as_str()
        };
        match op {
            "u" => Some((7, Associativity::Right)),
            "%" => Some((6, Associativity::Left)),
            "^" => Some((5, Associativity::Left)),
            "*" | "/" => Some((4, Associativity::Left)),
            "+" | "-" => Some((3, Associativity::Left)),
            "&" => Some((2, Associativity::Left)),
            "=" | "<" | ">" | "<=" | ">=" | "<>" => Some((1, Associativity::Left)),
            _ => None,
        }
    }
}

/// Byte-dispatch tokenizer for the worksheet formula grammar.
///
/// Tracks an accumulating operand span (`token_start..token_end`) and a
/// stack of open parens/braces so separators can be classified as argument
/// vs row separators and mismatched groups rejected.
pub struct Tokenizer {
    formula: String,
    pub items: Vec<Token>,
    token_stack: Vec<(TokenType, usize)>,
    offset: usize,
    token_start: usize,
    token_end: usize,
}

impl Tokenizer {
    /// Tokenize a formula. A leading `=` is accepted and skipped.
    pub fn new(formula: &str) -> Result<Self, TokenizerError> {
        let mut tokenizer = Tokenizer {
            formula: formula.to_string(),
            items: Vec::with_capacity(formula.len() / 2),
            token_stack: Vec::with_capacity(16),
            offset: 0,
            token_start: 0,
            token_end: 0,
        };
        tokenizer.run()?;
        Ok(tokenizer)
    }

    #[inline]
    fn byte_at(&self, pos: usize) -> Option<u8> {
        self.formula.as_bytes().get(pos).copied()
    }

    #[inline]
    fn has_token(&self) -> bool {
        self.token_end > self.token_start
    }

    #[inline]
    fn start_token(&mut self) {
        self.token_start = self.offset;
        self.token_end = self.offset;
    }

    fn run(&mut self) -> Result<(), TokenizerError> {
        if self.formula.is_empty() {
            return Ok(());
        }
        if self.formula.as_bytes()[0] == b'=' {
            self.offset = 1;
        }
        self.start_token();

        while self.offset < self.formula.len() {
            if self.consume_scientific_sign() {
                continue;
            }

            let curr = self.formula.as_bytes()[self.offset];

            // `R[-1]C[1]`: a bracketed offset belongs to the reference
            // operand, so its sign must not reach the operator stream.
            if curr == b'[' && self.has_token() {
                self.offset += 1;
                while let Some(b) = self.byte_at(self.offset) {
                    self.offset += 1;
                    if b == b']' {
                        break;
                    }
                }
                self.token_end = self.offset;
                continue;
            }

            if is_token_ender(curr) && self.has_token() {
                self.save_token();
                self.start_token();
            }

            match curr {
                b'"' | b'\'' => self.lex_string()?,
                b'#' => self.lex_error()?,
                b' ' | b'\n' => self.lex_whitespace(),
                b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'>' | b'<' | b'%' => {
                    self.lex_operator()
                }
                b'{' | b'(' => self.lex_opener(),
                b')' | b'}' => self.lex_closer()?,
                b';' | b',' => self.lex_separator(),
                _ => {
                    if !self.has_token() {
                        self.start_token();
                    }
                    self.offset += 1;
                    self.token_end = self.offset;
                }
            }
        }

        if self.has_token() {
            self.save_token();
        }

        if !self.token_stack.is_empty() {
            return Err(TokenizerError {
                message: "Unmatched opening parenthesis or brace".to_string(),
                pos: self.offset,
            });
        }
        Ok(())
    }

    /// `1.5E+3`: the sign after a numeric-with-exponent span belongs to the
    /// number, not to the operator stream.
    fn consume_scientific_sign(&mut self) -> bool {
        let Some(curr) = self.byte_at(self.offset) else {
            return false;
        };
        if (curr != b'+' && curr != b'-') || !self.has_token() {
            return false;
        }
        let span = &self.formula.as_bytes()[self.token_start..self.token_end];
        if span.len() < 2 {
            return false;
        }
        let last = span[span.len() - 1];
        if last != b'E' && last != b'e' {
            return false;
        }
        if !span[0].is_ascii_digit() {
            return false;
        }
        let mut dot_seen = false;
        for &ch in &span[1..span.len() - 1] {
            match ch {
                b'0'..=b'9' => {}
                b'.' if !dot_seen => dot_seen = true,
                _ => return false,
            }
        }
        self.offset += 1;
        self.token_end = self.offset;
        true
    }

    fn save_token(&mut self) {
        if self.has_token() {
            let token = Token::make_operand(&self.formula, self.token_start, self.token_end);
            self.items.push(token);
        }
    }

    /// Double-quoted text literal or single-quoted sheet name. `""` (resp.
    /// `''`) escapes the delimiter. A quoted sheet name merges into the
    /// accumulating reference span so `'My Sheet'!A1` stays one operand.
    fn lex_string(&mut self) -> Result<(), TokenizerError> {
        let delim = self.formula.as_bytes()[self.offset];

        if delim == b'"' && self.has_token() {
            self.save_token();
            self.start_token();
        }

        let string_start = if delim == b'\'' && self.has_token() {
            self.token_start
        } else {
            self.offset
        };
        if !self.has_token() {
            self.token_start = string_start;
        }
        self.offset += 1;

        while self.offset < self.formula.len() {
            if self.formula.as_bytes()[self.offset] == delim {
                self.offset += 1;
                if self.byte_at(self.offset) == Some(delim) {
                    self.offset += 1;
                    continue;
                }
                if delim == b'"' {
                    self.items.push(Token::make_operand(
                        &self.formula,
                        string_start,
                        self.offset,
                    ));
                    self.start_token();
                } else {
                    // Quoted sheet prefix continues the reference operand.
                    self.token_end = self.offset;
                }
                return Ok(());
            }
            self.offset += 1;
        }

        Err(TokenizerError {
            message: "Reached end of formula while parsing string".to_string(),
            pos: self.offset,
        })
    }

    fn lex_error(&mut self) -> Result<(), TokenizerError> {
        for &code in ERROR_CODES {
            let bytes = code.as_bytes();
            if self.formula.as_bytes()[self.offset..].starts_with(bytes) {
                self.items.push(Token::make_operand(
                    &self.formula,
                    self.offset,
                    self.offset + bytes.len(),
                ));
                self.offset += bytes.len();
                self.start_token();
                return Ok(());
            }
        }
        Err(TokenizerError {
            message: format!("Invalid error code at position {}", self.offset),
            pos: self.offset,
        })
    }

    fn lex_whitespace(&mut self) {
        self.save_token();
        let ws_start = self.offset;
        while matches!(self.byte_at(self.offset), Some(b' ') | Some(b'\n')) {
            self.offset += 1;
        }
        self.items.push(Token::from_slice(
            &self.formula,
            TokenType::Whitespace,
            TokenSubType::None,
            ws_start,
            self.offset,
        ));
        self.start_token();
    }

    fn lex_operator(&mut self) {
        self.save_token();

        if self.offset + 1 < self.formula.len() {
            let two = &self.formula.as_bytes()[self.offset..self.offset + 2];
            if two == b">=" || two == b"<=" || two == b"<>" {
                self.items.push(Token::from_slice(
                    &self.formula,
                    TokenType::OpInfix,
                    TokenSubType::None,
                    self.offset,
                    self.offset + 2,
                ));
                self.offset += 2;
                self.start_token();
                return;
            }
        }

        let curr = self.formula.as_bytes()[self.offset];
        let token_type = match curr {
            b'%' => TokenType::OpPostfix,
            b'+' | b'-' => {
                let prev = self
                    .items
                    .iter()
                    .rev()
                    .find(|t| t.token_type != TokenType::Whitespace);
                match prev {
                    Some(p)
                        if p.subtype == TokenSubType::Close
                            || p.token_type == TokenType::OpPostfix
                            || p.token_type == TokenType::Operand =>
                    {
                        TokenType::OpInfix
                    }
                    _ => TokenType::OpPrefix,
                }
            }
            _ => TokenType::OpInfix,
        };

        self.items.push(Token::from_slice(
            &self.formula,
            token_type,
            TokenSubType::None,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
    }

    fn lex_opener(&mut self) {
        let curr = self.formula.as_bytes()[self.offset];
        let token = if curr == b'{' {
            self.save_token();
            Token::from_slice(
                &self.formula,
                TokenType::Array,
                TokenSubType::Open,
                self.offset,
                self.offset + 1,
            )
        } else if self.has_token() {
            // Name directly followed by `(` is a call.
            let token = Token::from_slice(
                &self.formula,
                TokenType::Func,
                TokenSubType::Open,
                self.token_start,
                self.offset + 1,
            );
            self.token_start = self.offset + 1;
            self.token_end = self.offset + 1;
            token
        } else {
            Token::from_slice(
                &self.formula,
                TokenType::Paren,
                TokenSubType::Open,
                self.offset,
                self.offset + 1,
            )
        };

        self.token_stack.push((token.token_type, self.offset));
        self.items.push(token);
        self.offset += 1;
        self.start_token();
    }

    fn lex_closer(&mut self) -> Result<(), TokenizerError> {
        self.save_token();
        let curr = self.formula.as_bytes()[self.offset];

        let Some((open_type, _)) = self.token_stack.pop() else {
            return Err(TokenizerError {
                message: format!("No matching opener for closer at position {}", self.offset),
                pos: self.offset,
            });
        };
        let want_brace = open_type == TokenType::Array;
        if want_brace != (curr == b'}') {
            return Err(TokenizerError {
                message: "Mismatched ( and { pair".to_string(),
                pos: self.offset,
            });
        }

        self.items.push(Token::from_slice(
            &self.formula,
            open_type,
            TokenSubType::Close,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
        Ok(())
    }

    fn lex_separator(&mut self) {
        self.save_token();
        let curr = self.formula.as_bytes()[self.offset];

        let subtype = if curr == b';' {
            TokenSubType::Row
        } else {
            TokenSubType::Arg
        };
        self.items.push(Token::from_slice(
            &self.formula,
            TokenType::Sep,
            subtype,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
    }

    /// Reassemble the formula text from the token stream.
    pub fn render(&self) -> String {
        let concatenated: String = self.items.iter().map(|t| t.value.as_str()).collect();
        format!("={concatenated}")
    }
}

impl TryFrom<&str> for Tokenizer {
    type Error = TokenizerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Tokenizer::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(formula: &str) -> Vec<(TokenType, TokenSubType, String)> {
        Tokenizer::new(formula)
            .unwrap()
            .items
            .into_iter()
            .map(|t| (t.token_type, t.subtype, t.value))
            .collect()
    }

    #[test]
    fn simple_arithmetic() {
        let toks = kinds("=1+2*3");
        assert_eq!(toks.len(), 5);
        assert_eq!(toks[0].1, TokenSubType::Number);
        assert_eq!(toks[1].0, TokenType::OpInfix);
        assert_eq!(toks[3].2, "*");
    }

    #[test]
    fn leading_minus_is_prefix() {
        let toks = kinds("=-A1+2");
        assert_eq!(toks[0].0, TokenType::OpPrefix);
        assert_eq!(toks[1].1, TokenSubType::Reference);
        assert_eq!(toks[2].0, TokenType::OpInfix);
    }

    #[test]
    fn string_with_escaped_quote() {
        let toks = kinds(r#"="say ""hi"""&B1"#);
        assert_eq!(toks[0].1, TokenSubType::Text);
        assert_eq!(toks[0].2, r#""say ""hi""""#);
        assert_eq!(toks[1].2, "&");
    }

    #[test]
    fn quoted_sheet_name_stays_one_operand() {
        let toks = kinds("='My Sheet'!A1:B2");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].1, TokenSubType::Reference);
        assert_eq!(toks[0].2, "'My Sheet'!A1:B2");
    }

    #[test]
    fn function_call_and_separators() {
        let toks = kinds("=SUM(A1,B2)");
        assert_eq!(toks[0], (TokenType::Func, TokenSubType::Open, "SUM(".to_string()));
        assert_eq!(toks[2], (TokenType::Sep, TokenSubType::Arg, ",".to_string()));
        assert_eq!(toks[4].0, TokenType::Func);
        assert_eq!(toks[4].1, TokenSubType::Close);
    }

    #[test]
    fn array_rows_and_args() {
        let toks = kinds("={1,2;3,4}");
        assert_eq!(toks[0].0, TokenType::Array);
        let semis: Vec<_> = toks.iter().filter(|t| t.1 == TokenSubType::Row).collect();
        assert_eq!(semis.len(), 1);
    }

    #[test]
    fn every_error_code_tokenizes() {
        for code in super::ERROR_CODES {
            let formula = format!("={code}");
            let toks = kinds(&formula);
            assert_eq!(toks.len(), 1, "{code}");
            assert_eq!(toks[0].1, TokenSubType::Error);
            assert_eq!(&toks[0].2, code);
        }
    }

    #[test]
    fn scientific_notation_sign_is_consumed() {
        let toks = kinds("=1.5E+3*2");
        assert_eq!(toks[0].1, TokenSubType::Number);
        assert_eq!(toks[0].2, "1.5E+3");
        assert_eq!(toks[1].2, "*");
    }

    #[test]
    fn percent_is_postfix() {
        let toks = kinds("=50%+1");
        assert_eq!(toks[1].0, TokenType::OpPostfix);
        assert_eq!(toks[2].0, TokenType::OpInfix);
    }

    #[test]
    fn unmatched_paren_is_error() {
        assert!(Tokenizer::new("=SUM(1,2").is_err());
        assert!(Tokenizer::new("=1)").is_err());
        assert!(Tokenizer::new("={1,2)").is_err());
    }

    #[test]
    fn unterminated_string_is_error() {
        assert!(Tokenizer::new("=\"abc").is_err());
    }

    #[test]
    fn invocation_after_close_paren() {
        let toks = kinds("=LAMBDA(x,x+1)(41)");
        // The second `(` has no preceding name span, so it lexes as a plain
        // paren opener; the parser turns it into an invocation.
        let paren_opens: Vec<_> = toks
            .iter()
            .filter(|t| t.0 == TokenType::Paren && t.1 == TokenSubType::Open)
            .collect();
        assert_eq!(paren_opens.len(), 1);
    }

    #[test]
    fn bracketed_offsets_stay_one_operand() {
        for formula in ["=R[-1]C[1]", "=R[1]C[-1]", "=R[-1]C[-1]"] {
            let toks = kinds(formula);
            assert_eq!(toks.len(), 1, "{formula}");
            assert_eq!(toks[0].1, TokenSubType::Reference, "{formula}");
        }
        let toks = kinds("=R[-1]C[-1]+1");
        assert_eq!(toks[0].2, "R[-1]C[-1]");
        assert_eq!(toks[1].0, TokenType::OpInfix);
        assert_eq!(toks[2].1, TokenSubType::Number);
    }

    #[test]
    fn render_round_trips() {
        let t = Tokenizer::new("=SUM(A1:B2, 3)*2").unwrap();
        assert_eq!(t.render(), "=SUM(A1:B2, 3)*2");
    }
}
