use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};

/// Numeric coercion: blanks are 0, booleans are 1/0, numeric text parses.
/// Errors propagate; arrays have no scalar numeric view.
pub fn to_number(v: &LiteralValue) -> Result<f64, ExcelError> {
    match v {
        LiteralValue::Int(i) => Ok(*i as f64),
        LiteralValue::Number(n) => Ok(*n),
        LiteralValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        LiteralValue::Empty => Ok(0.0),
        LiteralValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
            ExcelError::new(ExcelErrorKind::Value)
                .with_message(format!("Cannot convert '{s}' to a number"))
        }),
        LiteralValue::Error(e) => Err(e.clone()),
        LiteralValue::Array(_) => Err(ExcelError::new(ExcelErrorKind::Value)
            .with_message("Array used where a number is required")),
    }
}

/// Integer coercion truncates toward zero, matching DATE/TIME semantics.
pub fn to_int(v: &LiteralValue) -> Result<i64, ExcelError> {
    Ok(to_number(v)?.trunc() as i64)
}

pub fn to_text(v: &LiteralValue) -> Result<String, ExcelError> {
    match v {
        LiteralValue::Error(e) => Err(e.clone()),
        LiteralValue::Array(_) => Err(ExcelError::new(ExcelErrorKind::Value)
            .with_message("Array used where text is required")),
        other => Ok(other.to_display_string()),
    }
}

pub fn to_logical(v: &LiteralValue) -> Result<bool, ExcelError> {
    v.is_truthy()
}
