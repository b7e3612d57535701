use std::fmt;

/// The error vocabulary a cell can hold. The first eight variants carry the
/// stable numeric ids that `ERROR.TYPE` reports; `Spill` and `Calc` use the
/// extended ids Excel assigned them later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExcelErrorKind {
    Null,
    Div,
    Value,
    Ref,
    Name,
    Num,
    Na,
    GettingData,
    Spill,
    Calc,
}

impl ExcelErrorKind {
    /// Numeric id as reported by `ERROR.TYPE`.
    pub fn error_type(self) -> u8 {
        match self {
            ExcelErrorKind::Null => 1,
            ExcelErrorKind::Div => 2,
            ExcelErrorKind::Value => 3,
            ExcelErrorKind::Ref => 4,
            ExcelErrorKind::Name => 5,
            ExcelErrorKind::Num => 6,
            ExcelErrorKind::Na => 7,
            ExcelErrorKind::GettingData => 8,
            ExcelErrorKind::Spill => 9,
            ExcelErrorKind::Calc => 14,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ExcelErrorKind::Null => "#NULL!",
            ExcelErrorKind::Div => "#DIV/0!",
            ExcelErrorKind::Value => "#VALUE!",
            ExcelErrorKind::Ref => "#REF!",
            ExcelErrorKind::Name => "#NAME?",
            ExcelErrorKind::Num => "#NUM!",
            ExcelErrorKind::Na => "#N/A",
            ExcelErrorKind::GettingData => "#GETTING_DATA",
            ExcelErrorKind::Spill => "#SPILL!",
            ExcelErrorKind::Calc => "#CALC!",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "#NULL!" => Some(ExcelErrorKind::Null),
            "#DIV/0!" => Some(ExcelErrorKind::Div),
            "#VALUE!" => Some(ExcelErrorKind::Value),
            "#REF!" => Some(ExcelErrorKind::Ref),
            "#NAME?" => Some(ExcelErrorKind::Name),
            "#NUM!" => Some(ExcelErrorKind::Num),
            "#N/A" => Some(ExcelErrorKind::Na),
            "#GETTING_DATA" => Some(ExcelErrorKind::GettingData),
            "#SPILL!" => Some(ExcelErrorKind::Spill),
            "#CALC!" => Some(ExcelErrorKind::Calc),
            _ => None,
        }
    }
}

impl fmt::Display for ExcelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Extra payload some error kinds carry. A `#SPILL!` remembers the rectangle
/// it wanted so callers can report or retry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExcelErrorExtra {
    #[default]
    None,
    Spill {
        expected_rows: u32,
        expected_cols: u32,
    },
}

/// An evaluation error. These are first-class values: they flow through
/// expressions rather than unwinding, so an error in one argument surfaces as
/// the result of the whole formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExcelError {
    pub kind: ExcelErrorKind,
    pub message: Option<String>,
    pub extra: ExcelErrorExtra,
}

impl ExcelError {
    pub fn new(kind: ExcelErrorKind) -> Self {
        ExcelError { kind, message: None, extra: ExcelErrorExtra::None }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_extra(mut self, extra: ExcelErrorExtra) -> Self {
        self.extra = extra;
        self
    }

    pub fn new_null() -> Self {
        Self::new(ExcelErrorKind::Null)
    }
    pub fn new_div() -> Self {
        Self::new(ExcelErrorKind::Div)
    }
    pub fn new_value() -> Self {
        Self::new(ExcelErrorKind::Value)
    }
    pub fn new_ref() -> Self {
        Self::new(ExcelErrorKind::Ref)
    }
    pub fn new_name() -> Self {
        Self::new(ExcelErrorKind::Name)
    }
    pub fn new_num() -> Self {
        Self::new(ExcelErrorKind::Num)
    }
    pub fn new_na() -> Self {
        Self::new(ExcelErrorKind::Na)
    }
    pub fn new_calc() -> Self {
        Self::new(ExcelErrorKind::Calc)
    }

    pub fn new_spill(expected_rows: u32, expected_cols: u32) -> Self {
        Self::new(ExcelErrorKind::Spill)
            .with_extra(ExcelErrorExtra::Spill { expected_rows, expected_cols })
    }

    /// Parse an error literal like `#DIV/0!` back into a typed error.
    pub fn from_error_string(s: &str) -> Self {
        match ExcelErrorKind::from_code(s.trim()) {
            Some(kind) => Self::new(kind),
            None => Self::new(ExcelErrorKind::Value).with_message(format!("Unknown error code: {s}")),
        }
    }
}

impl From<ExcelErrorKind> for ExcelError {
    fn from(kind: ExcelErrorKind) -> Self {
        ExcelError::new(kind)
    }
}

impl fmt::Display for ExcelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, " ({msg})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExcelError {}
