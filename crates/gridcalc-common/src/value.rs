use crate::error::{ExcelError, ExcelErrorKind};
use std::hash::{Hash, Hasher};

/// A cell's computed value. Arrays are always rectangular `rows × cols`
/// vectors; vector-producing functions emit n×1 columns.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LiteralValue {
    Int(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(ExcelError),
    Array(Vec<Vec<LiteralValue>>),
    Empty,
}

impl Hash for LiteralValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            LiteralValue::Int(i) => i.hash(state),
            LiteralValue::Number(n) => n.to_bits().hash(state),
            LiteralValue::Text(s) => s.hash(state),
            LiteralValue::Boolean(b) => b.hash(state),
            LiteralValue::Error(e) => e.hash(state),
            LiteralValue::Array(rows) => {
                rows.len().hash(state);
                for row in rows {
                    row.len().hash(state);
                    for v in row {
                        v.hash(state);
                    }
                }
            }
            LiteralValue::Empty => {}
        }
    }
}

impl Default for LiteralValue {
    fn default() -> Self {
        LiteralValue::Empty
    }
}

impl LiteralValue {
    pub fn is_error(&self) -> bool {
        matches!(self, LiteralValue::Error(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, LiteralValue::Empty)
    }

    /// Numeric view without coercion of text. `None` for text, errors and
    /// arrays.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LiteralValue::Int(i) => Some(*i as f64),
            LiteralValue::Number(n) => Some(*n),
            LiteralValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            LiteralValue::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Truthiness under Excel rules: non-zero numbers are TRUE, text must
    /// spell a boolean, blanks are FALSE.
    pub fn is_truthy(&self) -> Result<bool, ExcelError> {
        match self {
            LiteralValue::Boolean(b) => Ok(*b),
            LiteralValue::Int(i) => Ok(*i != 0),
            LiteralValue::Number(n) => Ok(*n != 0.0),
            LiteralValue::Empty => Ok(false),
            LiteralValue::Text(s) => match s.to_ascii_uppercase().as_str() {
                "TRUE" => Ok(true),
                "FALSE" => Ok(false),
                _ => Err(ExcelError::new(ExcelErrorKind::Value)
                    .with_message(format!("Cannot interpret '{s}' as a logical value"))),
            },
            LiteralValue::Error(e) => Err(e.clone()),
            LiteralValue::Array(_) => Err(ExcelError::new(ExcelErrorKind::Value)
                .with_message("Array used where a logical value is required")),
        }
    }

    /// Shape of the value: scalars are 1×1.
    pub fn dims(&self) -> (usize, usize) {
        match self {
            LiteralValue::Array(rows) => {
                let r = rows.len();
                let c = rows.first().map_or(0, |row| row.len());
                (r, c)
            }
            _ => (1, 1),
        }
    }

    /// Build an n×1 column array from a flat vector.
    pub fn column_array(values: Vec<LiteralValue>) -> LiteralValue {
        LiteralValue::Array(values.into_iter().map(|v| vec![v]).collect())
    }

    /// Display form matching the grid surface: booleans upper-case, errors as
    /// their codes, empty as the empty string.
    pub fn to_display_string(&self) -> String {
        match self {
            LiteralValue::Int(i) => i.to_string(),
            LiteralValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            LiteralValue::Text(s) => s.clone(),
            LiteralValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            LiteralValue::Error(e) => e.kind.code().to_string(),
            LiteralValue::Array(_) => "#VALUE!".to_string(),
            LiteralValue::Empty => String::new(),
        }
    }
}

impl From<ExcelError> for LiteralValue {
    fn from(e: ExcelError) -> Self {
        LiteralValue::Error(e)
    }
}

impl From<f64> for LiteralValue {
    fn from(n: f64) -> Self {
        LiteralValue::Number(n)
    }
}

impl From<i64> for LiteralValue {
    fn from(i: i64) -> Self {
        LiteralValue::Int(i)
    }
}

impl From<bool> for LiteralValue {
    fn from(b: bool) -> Self {
        LiteralValue::Boolean(b)
    }
}

impl From<&str> for LiteralValue {
    fn from(s: &str) -> Self {
        LiteralValue::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_excel_rules() {
        assert!(LiteralValue::Number(2.5).is_truthy().unwrap());
        assert!(!LiteralValue::Int(0).is_truthy().unwrap());
        assert!(!LiteralValue::Empty.is_truthy().unwrap());
        assert!(LiteralValue::Text("true".into()).is_truthy().unwrap());
        assert!(LiteralValue::Text("yes".into()).is_truthy().is_err());
    }

    #[test]
    fn error_truthiness_propagates_the_error() {
        let err = LiteralValue::Error(ExcelError::new_div());
        assert_eq!(err.is_truthy().unwrap_err().kind, ExcelErrorKind::Div);
    }

    #[test]
    fn default_is_blank() {
        assert!(LiteralValue::default().is_blank());
    }

    #[test]
    fn column_array_shape() {
        let arr = LiteralValue::column_array(vec![1i64.into(), 2i64.into(), 3i64.into()]);
        assert_eq!(arr.dims(), (3, 1));
    }
}
