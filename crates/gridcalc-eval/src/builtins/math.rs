use super::register;
use crate::broadcast::map_unary;
use crate::coercion::to_number;
use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Visit the numeric elements of all arguments. Range elements follow
/// aggregation rules: text, logicals and blanks are skipped, errors abort.
/// Direct scalar arguments coerce strictly.
fn fold_numbers(
    args: &[ArgumentHandle],
    mut f: impl FnMut(f64),
) -> Result<(), ExcelError> {
    for arg in args {
        match arg.value()? {
            LiteralValue::Array(rows) => {
                for el in rows.iter().flatten() {
                    match el {
                        LiteralValue::Error(e) => return Err(e.clone()),
                        LiteralValue::Int(i) => f(*i as f64),
                        LiteralValue::Number(n) => f(*n),
                        _ => {}
                    }
                }
            }
            LiteralValue::Error(e) => return Err(e),
            LiteralValue::Empty => {}
            scalar => f(to_number(&scalar)?),
        }
    }
    Ok(())
}

pub struct SumFn;
impl Function for SumFn {
    fn name(&self) -> &'static str {
        "SUM"
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
        let mut total = 0.0;
        fold_numbers(args, |n| total += n)?;
        Ok(LiteralValue::Number(total))
    }
}

pub struct AverageFn;
impl Function for AverageFn {
    fn name(&self) -> &'static str {
        "AVERAGE"
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
        let mut total = 0.0;
        let mut count = 0u64;
        fold_numbers(args, |n| {
            total += n;
            count += 1;
        })?;
        if count == 0 {
            return Err(ExcelError::new(ExcelErrorKind::Div)
                .with_message("AVERAGE of no numeric values"));
        }
        Ok(LiteralValue::Number(total / count as f64))
    }
}

pub struct CountFn;
impl Function for CountFn {
    fn name(&self) -> &'static str {
        "COUNT"
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
        let mut count = 0i64;
        for arg in args {
            match arg.value()? {
                LiteralValue::Array(rows) => {
                    for el in rows.iter().flatten() {
                        if matches!(el, LiteralValue::Int(_) | LiteralValue::Number(_)) {
                            count += 1;
                        }
                    }
                }
                LiteralValue::Error(e) => return Err(e),
                scalar => {
                    if to_number(&scalar).is_ok() && !scalar.is_blank() {
                        count += 1;
                    }
                }
            }
        }
        Ok(LiteralValue::Int(count))
    }
}

pub struct CountAFn;
impl Function for CountAFn {
    fn name(&self) -> &'static str {
        "COUNTA"
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
        let mut count = 0i64;
        for arg in args {
            match arg.value()? {
                LiteralValue::Array(rows) => {
                    count += rows.iter().flatten().filter(|el| !el.is_blank()).count() as i64;
                }
                LiteralValue::Empty => {}
                _ => count += 1,
            }
        }
        Ok(LiteralValue::Int(count))
    }
}

struct Extremum {
    name: &'static str,
    pick_max: bool,
}

impl Function for Extremum {
    fn name(&self) -> &'static str {
        self.name
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
        let mut best: Option<f64> = None;
        fold_numbers(args, |n| {
            best = Some(match best {
                None => n,
                Some(b) if self.pick_max => b.max(n),
                Some(b) => b.min(n),
            });
        })?;
        Ok(LiteralValue::Number(best.unwrap_or(0.0)))
    }
}

fn min_fn() -> Extremum {
    Extremum { name: "MIN", pick_max: false }
}
fn max_fn() -> Extremum {
    Extremum { name: "MAX", pick_max: true }
}

pub struct AbsFn;
impl Function for AbsFn {
    fn name(&self) -> &'static str {
        "ABS"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(map_unary(&args[0].value()?, |v| {
            Ok(LiteralValue::Number(to_number(v)?.abs()))
        }))
    }
}

pub struct IntFn;
impl Function for IntFn {
    fn name(&self) -> &'static str {
        "INT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(map_unary(&args[0].value()?, |v| {
            Ok(LiteralValue::Int(to_number(v)?.floor() as i64))
        }))
    }
}

pub struct SqrtFn;
impl Function for SqrtFn {
    fn name(&self) -> &'static str {
        "SQRT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(map_unary(&args[0].value()?, |v| {
            let n = to_number(v)?;
            if n < 0.0 {
                return Err(ExcelError::new(ExcelErrorKind::Num)
                    .with_message("SQRT of a negative number"));
            }
            Ok(LiteralValue::Number(n.sqrt()))
        }))
    }
}

pub struct RoundFn;
impl Function for RoundFn {
    fn name(&self) -> &'static str {
        "ROUND"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let digits = to_number(&args[1].value()?)?.trunc() as i32;
        let factor = 10f64.powi(digits);
        Ok(map_unary(&args[0].value()?, |v| {
            let n = to_number(v)?;
            // Round half away from zero, like the grid does.
            Ok(LiteralValue::Number((n * factor).round() / factor))
        }))
    }
}

pub struct ModFn;
impl Function for ModFn {
    fn name(&self) -> &'static str {
        "MOD"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let n = to_number(&args[0].value()?)?;
        let d = to_number(&args[1].value()?)?;
        if d == 0.0 {
            return Err(ExcelError::new(ExcelErrorKind::Div));
        }
        // Result takes the sign of the divisor.
        Ok(LiteralValue::Number(n - d * (n / d).floor()))
    }
}

pub struct PowerFn;
impl Function for PowerFn {
    fn name(&self) -> &'static str {
        "POWER"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let x = to_number(&args[0].value()?)?;
        let y = to_number(&args[1].value()?)?;
        if x == 0.0 && y == 0.0 {
            return Err(ExcelError::new(ExcelErrorKind::Num));
        }
        if x < 0.0 && y.fract() != 0.0 {
            return Err(ExcelError::new(ExcelErrorKind::Num));
        }
        let result = x.powf(y);
        if result.is_finite() {
            Ok(LiteralValue::Number(result))
        } else {
            Err(ExcelError::new(ExcelErrorKind::Num))
        }
    }
}

pub(crate) fn register_builtins(map: &mut FxHashMap<&'static str, Arc<dyn Function>>) {
    register!(
        map,
        SumFn,
        AverageFn,
        CountFn,
        CountAFn,
        min_fn(),
        max_fn(),
        AbsFn,
        IntFn,
        SqrtFn,
        RoundFn,
        ModFn,
        PowerFn,
    );
}

#[cfg(test)]
mod tests {
    use crate::test_workbook::TestWorkbook;
    use gridcalc_common::{ExcelErrorKind, LiteralValue};

    fn sample() -> TestWorkbook {
        TestWorkbook::new().with_column(
            "A1",
            &[
                LiteralValue::Int(10),
                LiteralValue::Int(20),
                LiteralValue::Text("skip".into()),
                LiteralValue::Number(30.0),
                LiteralValue::Empty,
            ],
        )
    }

    #[test]
    fn sum_skips_text_and_blanks_in_ranges() {
        assert_eq!(sample().eval("=SUM(A1:A5)"), LiteralValue::Number(60.0));
        assert_eq!(sample().eval("=SUM(1,\"2\",TRUE)"), LiteralValue::Number(4.0));
    }

    #[test]
    fn average_and_counts() {
        let wb = sample();
        assert_eq!(wb.eval("=AVERAGE(A1:A5)"), LiteralValue::Number(20.0));
        assert_eq!(wb.eval("=COUNT(A1:A5)"), LiteralValue::Int(3));
        assert_eq!(wb.eval("=COUNTA(A1:A5)"), LiteralValue::Int(4));
        assert!(matches!(
            wb.eval("=AVERAGE(B1:B3)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Div
        ));
    }

    #[test]
    fn min_max_defaults() {
        let wb = sample();
        assert_eq!(wb.eval("=MIN(A1:A5)"), LiteralValue::Number(10.0));
        assert_eq!(wb.eval("=MAX(A1:A5)"), LiteralValue::Number(30.0));
        assert_eq!(wb.eval("=MAX(B1:B2)"), LiteralValue::Number(0.0));
    }

    #[test]
    fn int_floors_negatives() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=INT(8.9)"), LiteralValue::Int(8));
        assert_eq!(wb.eval("=INT(-8.1)"), LiteralValue::Int(-9));
    }

    #[test]
    fn round_half_away_from_zero() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=ROUND(2.5,0)"), LiteralValue::Number(3.0));
        assert_eq!(wb.eval("=ROUND(-2.5,0)"), LiteralValue::Number(-3.0));
        assert_eq!(wb.eval("=ROUND(1.449,1)"), LiteralValue::Number(1.4));
        assert_eq!(wb.eval("=ROUND(1234.5,-2)"), LiteralValue::Number(1200.0));
    }

    #[test]
    fn mod_follows_divisor_sign() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=MOD(3,2)"), LiteralValue::Number(1.0));
        assert_eq!(wb.eval("=MOD(-3,2)"), LiteralValue::Number(1.0));
        assert_eq!(wb.eval("=MOD(3,-2)"), LiteralValue::Number(-1.0));
        assert!(matches!(
            wb.eval("=MOD(3,0)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Div
        ));
    }

    #[test]
    fn sqrt_and_power_domains() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=SQRT(9)"), LiteralValue::Number(3.0));
        assert!(matches!(
            wb.eval("=SQRT(-1)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
        assert_eq!(wb.eval("=POWER(2,10)"), LiteralValue::Number(1024.0));
        assert!(matches!(
            wb.eval("=POWER(-8,0.5)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
    }

    #[test]
    fn abs_broadcasts_over_ranges() {
        let wb = TestWorkbook::new()
            .with_cell_a1("A1", LiteralValue::Int(-1))
            .with_cell_a1("A2", LiteralValue::Int(2));
        match wb.eval("=ABS(A1:A2)") {
            LiteralValue::Array(rows) => {
                assert_eq!(rows[0][0], LiteralValue::Number(1.0));
                assert_eq!(rows[1][0], LiteralValue::Number(2.0));
            }
            other => panic!("{other:?}"),
        }
    }
}
