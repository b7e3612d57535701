use super::register;
use crate::coercion::to_logical;
use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub struct TrueFn;
impl Function for TrueFn {
    fn name(&self) -> &'static str {
        "TRUE"
    }
    fn eval(
        &self,
        _args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(LiteralValue::Boolean(true))
    }
}

pub struct FalseFn;
impl Function for FalseFn {
    fn name(&self) -> &'static str {
        "FALSE"
    }
    fn eval(
        &self,
        _args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(LiteralValue::Boolean(false))
    }
}

pub struct NotFn;
impl Function for NotFn {
    fn name(&self) -> &'static str {
        "NOT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(LiteralValue::Boolean(!to_logical(&args[0].value()?)?))
    }
}

/// Fold logical elements of all arguments. Direct scalar arguments coerce
/// strictly; text and blanks inside ranges are ignored the way Excel skips
/// them during aggregation.
fn fold_logicals(
    args: &[ArgumentHandle],
    init: bool,
    combine: impl Fn(bool, bool) -> bool,
) -> Result<LiteralValue, ExcelError> {
    let mut acc = init;
    let mut seen = false;
    for arg in args {
        match arg.value()? {
            LiteralValue::Array(rows) => {
                for el in rows.iter().flatten() {
                    match el {
                        LiteralValue::Error(e) => return Err(e.clone()),
                        LiteralValue::Boolean(b) => {
                            seen = true;
                            acc = combine(acc, *b);
                        }
                        LiteralValue::Int(_) | LiteralValue::Number(_) => {
                            seen = true;
                            acc = combine(acc, el.is_truthy()?);
                        }
                        _ => {}
                    }
                }
            }
            LiteralValue::Error(e) => return Err(e),
            LiteralValue::Empty => {}
            scalar => {
                seen = true;
                acc = combine(acc, to_logical(&scalar)?);
            }
        }
    }
    if !seen {
        return Err(ExcelError::new(ExcelErrorKind::Value)
            .with_message("No logical values in arguments"));
    }
    Ok(LiteralValue::Boolean(acc))
}

pub struct AndFn;
impl Function for AndFn {
    fn name(&self) -> &'static str {
        "AND"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        fold_logicals(args, true, |a, b| a && b)
    }
}

pub struct OrFn;
impl Function for OrFn {
    fn name(&self) -> &'static str {
        "OR"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        fold_logicals(args, false, |a, b| a || b)
    }
}

pub struct IfFn;
impl Function for IfFn {
    fn name(&self) -> &'static str {
        "IF"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let cond = to_logical(&args[0].value()?)?;
        if cond {
            args[1].value()
        } else if let Some(else_arg) = args.get(2) {
            else_arg.value()
        } else {
            Ok(LiteralValue::Boolean(false))
        }
    }
}

pub struct IfErrorFn;
impl Function for IfErrorFn {
    fn name(&self) -> &'static str {
        "IFERROR"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        match args[0].value() {
            Ok(LiteralValue::Error(_)) | Err(_) => args[1].value(),
            other => other,
        }
    }
}

pub struct IsErrorFn;
impl Function for IsErrorFn {
    fn name(&self) -> &'static str {
        "ISERROR"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let is_err = matches!(args[0].value(), Ok(LiteralValue::Error(_)) | Err(_));
        Ok(LiteralValue::Boolean(is_err))
    }
}

pub struct IsBlankFn;
impl Function for IsBlankFn {
    fn name(&self) -> &'static str {
        "ISBLANK"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(LiteralValue::Boolean(args[0].value()?.is_blank()))
    }
}

pub struct ErrorTypeFn;
impl Function for ErrorTypeFn {
    fn name(&self) -> &'static str {
        "ERROR.TYPE"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        match args[0].value() {
            Ok(LiteralValue::Error(e)) => Ok(LiteralValue::Int(i64::from(e.kind.error_type()))),
            Err(e) => Ok(LiteralValue::Int(i64::from(e.kind.error_type()))),
            Ok(_) => Err(ExcelError::new(ExcelErrorKind::Na)),
        }
    }
}

pub(crate) fn register_builtins(map: &mut FxHashMap<&'static str, Arc<dyn Function>>) {
    register!(
        map, TrueFn, FalseFn, NotFn, AndFn, OrFn, IfFn, IfErrorFn, IsErrorFn, IsBlankFn,
        ErrorTypeFn,
    );
}

#[cfg(test)]
mod tests {
    use crate::test_workbook::TestWorkbook;
    use gridcalc_common::{ExcelErrorKind, LiteralValue};

    #[test]
    fn and_or_over_scalars_and_ranges() {
        let wb = TestWorkbook::new()
            .with_cell_a1("A1", LiteralValue::Boolean(true))
            .with_cell_a1("A2", LiteralValue::Int(0))
            .with_cell_a1("A3", LiteralValue::Text("ignored".into()));
        assert_eq!(wb.eval("=AND(TRUE,1)"), LiteralValue::Boolean(true));
        assert_eq!(wb.eval("=AND(A1:A3)"), LiteralValue::Boolean(false));
        assert_eq!(wb.eval("=OR(A1:A3)"), LiteralValue::Boolean(true));
    }

    #[test]
    fn and_with_no_logicals_errors() {
        let wb = TestWorkbook::new().with_cell_a1("B1", LiteralValue::Text("x".into()));
        assert!(matches!(
            wb.eval("=AND(B1:B2)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Value
        ));
    }

    #[test]
    fn if_branches_lazily() {
        let wb = TestWorkbook::new();
        // The untaken branch would divide by zero if it were evaluated.
        assert_eq!(wb.eval("=IF(TRUE,1,1/0)"), LiteralValue::Int(1));
        assert_eq!(wb.eval("=IF(FALSE,1/0,2)"), LiteralValue::Int(2));
        assert_eq!(wb.eval("=IF(FALSE,1)"), LiteralValue::Boolean(false));
    }

    #[test]
    fn iferror_catches_and_passes_through() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=IFERROR(1/0,42)"), LiteralValue::Int(42));
        assert_eq!(wb.eval("=IFERROR(7,42)"), LiteralValue::Int(7));
    }

    #[test]
    fn iserror_and_isblank() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=ISERROR(1/0)"), LiteralValue::Boolean(true));
        assert_eq!(wb.eval("=ISERROR(1)"), LiteralValue::Boolean(false));
        assert_eq!(wb.eval("=ISBLANK(Z99)"), LiteralValue::Boolean(true));
        assert_eq!(wb.eval("=ISBLANK(0)"), LiteralValue::Boolean(false));
    }

    #[test]
    fn error_type_ids() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=ERROR.TYPE(#NULL!)"), LiteralValue::Int(1));
        assert_eq!(wb.eval("=ERROR.TYPE(1/0)"), LiteralValue::Int(2));
        assert_eq!(wb.eval("=ERROR.TYPE(#GETTING_DATA)"), LiteralValue::Int(8));
        assert!(matches!(
            wb.eval("=ERROR.TYPE(5)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Na
        ));
    }
}
