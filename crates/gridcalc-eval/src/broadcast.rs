use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};

/// Common shape for element-wise combination. A dimension of 1 stretches to
/// match the other operand; anything else must agree exactly.
pub fn broadcast_shape(
    a: (usize, usize),
    b: (usize, usize),
) -> Result<(usize, usize), ExcelError> {
    let rows = broadcast_dim(a.0, b.0)?;
    let cols = broadcast_dim(a.1, b.1)?;
    Ok((rows, cols))
}

fn broadcast_dim(a: usize, b: usize) -> Result<usize, ExcelError> {
    match (a, b) {
        (x, y) if x == y => Ok(x),
        (1, y) => Ok(y),
        (x, 1) => Ok(x),
        _ => Err(ExcelError::new(ExcelErrorKind::Value)
            .with_message(format!("Incompatible array shapes {a}×? and {b}×?"))),
    }
}

/// Element of a value at a broadcast position. Scalars repeat everywhere;
/// single rows/columns stretch along the missing axis.
pub fn element_at(v: &LiteralValue, row: usize, col: usize) -> LiteralValue {
    match v {
        LiteralValue::Array(rows) => {
            let r = if rows.len() == 1 { 0 } else { row };
            let row_vec = match rows.get(r) {
                Some(rv) => rv,
                None => return LiteralValue::Error(ExcelError::new_value()),
            };
            let c = if row_vec.len() == 1 { 0 } else { col };
            row_vec
                .get(c)
                .cloned()
                .unwrap_or(LiteralValue::Error(ExcelError::new_value()))
        }
        scalar => scalar.clone(),
    }
}

/// Combine two values element-wise. Per-element errors stay in their cell of
/// the result rather than poisoning the whole array.
pub fn combine<F>(a: &LiteralValue, b: &LiteralValue, f: F) -> LiteralValue
where
    F: Fn(&LiteralValue, &LiteralValue) -> Result<LiteralValue, ExcelError>,
{
    let apply = |x: &LiteralValue, y: &LiteralValue| -> LiteralValue {
        f(x, y).unwrap_or_else(LiteralValue::Error)
    };

    if !matches!(a, LiteralValue::Array(_)) && !matches!(b, LiteralValue::Array(_)) {
        return apply(a, b);
    }

    let shape = match broadcast_shape(a.dims(), b.dims()) {
        Ok(s) => s,
        Err(e) => return LiteralValue::Error(e),
    };
    let mut out = Vec::with_capacity(shape.0);
    for r in 0..shape.0 {
        let mut row = Vec::with_capacity(shape.1);
        for c in 0..shape.1 {
            row.push(apply(&element_at(a, r, c), &element_at(b, r, c)));
        }
        out.push(row);
    }
    LiteralValue::Array(out)
}

/// Map over one value element-wise.
pub fn map_unary<F>(v: &LiteralValue, f: F) -> LiteralValue
where
    F: Fn(&LiteralValue) -> Result<LiteralValue, ExcelError>,
{
    match v {
        LiteralValue::Array(rows) => LiteralValue::Array(
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|x| f(x).unwrap_or_else(LiteralValue::Error))
                        .collect()
                })
                .collect(),
        ),
        scalar => f(scalar).unwrap_or_else(LiteralValue::Error),
    }
}
