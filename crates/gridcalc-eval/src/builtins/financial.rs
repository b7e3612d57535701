use super::register;
use crate::coercion::to_number;
use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};
use rustc_hash::FxHashMap;
use std::sync::Arc;

const MAX_ITER: usize = 100;
const EPS: f64 = 1e-10;

fn num_error(msg: &str) -> ExcelError {
    ExcelError::new(ExcelErrorKind::Num).with_message(msg)
}

/// Cash flows from a value or range argument: numbers count, text, logicals
/// and blanks inside ranges are skipped, errors abort.
fn cash_flows(arg: &ArgumentHandle) -> Result<Vec<f64>, ExcelError> {
    let mut out = Vec::new();
    match arg.value()? {
        LiteralValue::Array(rows) => {
            for el in rows.iter().flatten() {
                match el {
                    LiteralValue::Error(e) => return Err(e.clone()),
                    LiteralValue::Int(i) => out.push(*i as f64),
                    LiteralValue::Number(n) => out.push(*n),
                    _ => {}
                }
            }
        }
        LiteralValue::Error(e) => return Err(e),
        scalar => out.push(to_number(&scalar)?),
    }
    Ok(out)
}

fn optional_number(arg: Option<&ArgumentHandle>, default: f64) -> Result<f64, ExcelError> {
    match arg {
        Some(a) if !a.is_omitted() => to_number(&a.value()?),
        _ => Ok(default),
    }
}

/// Newton-Raphson with a numeric derivative, falling back to bisection over
/// the bracket when the iteration drifts or the derivative flattens out.
fn solve_rate(
    f: impl Fn(f64) -> f64,
    guess: f64,
    lo: f64,
    hi: f64,
) -> Result<f64, ExcelError> {
    let mut rate = guess.clamp(lo, hi);
    for _ in 0..MAX_ITER {
        let y = f(rate);
        if y.abs() < EPS {
            return Ok(rate);
        }
        let h = 1e-7;
        let dy = (f(rate + h) - y) / h;
        if !dy.is_finite() || dy.abs() < 1e-15 {
            break;
        }
        let next = rate - y / dy;
        if !next.is_finite() || next <= lo || next >= hi {
            break;
        }
        if (next - rate).abs() < EPS {
            return Ok(next);
        }
        rate = next;
    }

    let (mut a, mut b) = (lo, hi);
    let (ya, yb) = (f(a), f(b));
    if !(ya.is_finite() && yb.is_finite()) || ya.signum() == yb.signum() {
        return Err(num_error("Iteration did not converge"));
    }
    let mut ya = ya;
    for _ in 0..200 {
        let mid = (a + b) / 2.0;
        let ym = f(mid);
        if ym.abs() < EPS || (b - a) / 2.0 < EPS {
            return Ok(mid);
        }
        if ya.signum() == ym.signum() {
            a = mid;
            ya = ym;
        } else {
            b = mid;
        }
    }
    Err(num_error("Iteration did not converge"))
}

pub struct NpvFn;
impl Function for NpvFn {
    fn name(&self) -> &'static str {
        "NPV"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let rate = to_number(&args[0].value()?)?;
        if (1.0 + rate).abs() < f64::EPSILON {
            return Err(ExcelError::new(ExcelErrorKind::Div)
                .with_message("Discount rate of -100%"));
        }
        let mut total = 0.0;
        let mut period = 0i32;
        for arg in &args[1..] {
            for v in cash_flows(arg)? {
                period += 1;
                total += v / (1.0 + rate).powi(period);
            }
        }
        Ok(LiteralValue::Number(total))
    }
}

pub struct PmtFn;
impl Function for PmtFn {
    fn name(&self) -> &'static str {
        "PMT"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn max_args(&self) -> Option<usize> {
        Some(5)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let rate = to_number(&args[0].value()?)?;
        let nper = to_number(&args[1].value()?)?;
        let pv = to_number(&args[2].value()?)?;
        let fv = optional_number(args.get(3), 0.0)?;
        let due = optional_number(args.get(4), 0.0)? != 0.0;
        if nper == 0.0 {
            return Err(num_error("Zero payment periods"));
        }
        if rate == 0.0 {
            return Ok(LiteralValue::Number(-(pv + fv) / nper));
        }
        let growth = (1.0 + rate).powf(nper);
        let mut pmt = -(pv * growth + fv) * rate / (growth - 1.0);
        if due {
            pmt /= 1.0 + rate;
        }
        if pmt.is_finite() {
            Ok(LiteralValue::Number(pmt))
        } else {
            Err(num_error("Payment diverges"))
        }
    }
}

pub struct NperFn;
impl Function for NperFn {
    fn name(&self) -> &'static str {
        "NPER"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn max_args(&self) -> Option<usize> {
        Some(5)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let rate = to_number(&args[0].value()?)?;
        let pmt = to_number(&args[1].value()?)?;
        let pv = to_number(&args[2].value()?)?;
        let fv = optional_number(args.get(3), 0.0)?;
        let due = optional_number(args.get(4), 0.0)? != 0.0;
        if rate == 0.0 {
            if pmt.abs() < 1e-10 {
                return Err(num_error("No payment and no interest"));
            }
            return Ok(LiteralValue::Number(-(pv + fv) / pmt));
        }
        let adj = pmt * (1.0 + if due { rate } else { 0.0 });
        let numerator = adj - fv * rate;
        let denominator = adj + pv * rate;
        if denominator == 0.0 || numerator / denominator <= 0.0 {
            return Err(num_error("Loan never amortizes"));
        }
        Ok(LiteralValue::Number(
            (numerator / denominator).ln() / (1.0 + rate).ln(),
        ))
    }
}

pub struct RateFn;
impl Function for RateFn {
    fn name(&self) -> &'static str {
        "RATE"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn max_args(&self) -> Option<usize> {
        Some(6)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let nper = to_number(&args[0].value()?)?;
        let pmt = to_number(&args[1].value()?)?;
        let pv = to_number(&args[2].value()?)?;
        let fv = optional_number(args.get(3), 0.0)?;
        let due = optional_number(args.get(4), 0.0)? != 0.0;
        let guess = optional_number(args.get(5), 0.1)?;
        if nper <= 0.0 {
            return Err(num_error("RATE needs a positive period count"));
        }
        let balance = |r: f64| -> f64 {
            if r == 0.0 {
                return pv + pmt * nper + fv;
            }
            let growth = (1.0 + r).powf(nper);
            pv * growth + pmt * (1.0 + if due { r } else { 0.0 }) * (growth - 1.0) / r + fv
        };
        let rate = solve_rate(balance, guess, -0.99, 1e3)?;
        Ok(LiteralValue::Number(rate))
    }
}

fn require_sign_change(flows: &[f64]) -> Result<(), ExcelError> {
    let any_pos = flows.iter().any(|v| *v > 0.0);
    let any_neg = flows.iter().any(|v| *v < 0.0);
    if any_pos && any_neg {
        Ok(())
    } else {
        Err(num_error("Cash flows must change sign"))
    }
}

pub struct IrrFn;
impl Function for IrrFn {
    fn name(&self) -> &'static str {
        "IRR"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let flows = cash_flows(&args[0])?;
        let guess = optional_number(args.get(1), 0.1)?;
        require_sign_change(&flows)?;
        let npv = |r: f64| -> f64 {
            flows
                .iter()
                .enumerate()
                .map(|(i, v)| v / (1.0 + r).powi(i as i32))
                .sum()
        };
        Ok(LiteralValue::Number(solve_rate(npv, guess, -0.999999, 1e3)?))
    }
}

pub struct XirrFn;
impl Function for XirrFn {
    fn name(&self) -> &'static str {
        "XIRR"
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
        let flows = cash_flows(&args[0])?;
        let dates = cash_flows(&args[1])?;
        let guess = optional_number(args.get(2), 0.1)?;
        if flows.len() != dates.len() || flows.is_empty() {
            return Err(num_error("Values and dates must pair up"));
        }
        require_sign_change(&flows)?;
        let d0 = dates[0];
        let npv = |r: f64| -> f64 {
            flows
                .iter()
                .zip(&dates)
                .map(|(v, d)| v / (1.0 + r).powf((d - d0) / 365.0))
                .sum()
        };
        Ok(LiteralValue::Number(solve_rate(npv, guess, -0.999999, 1e3)?))
    }
}

pub(crate) fn register_builtins(map: &mut FxHashMap<&'static str, Arc<dyn Function>>) {
    register!(map, NpvFn, PmtFn, NperFn, RateFn, IrrFn, XirrFn);
}

#[cfg(test)]
mod tests {
    use crate::test_workbook::TestWorkbook;
    use gridcalc_common::{ExcelErrorKind, LiteralValue};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn npv_discounts_from_period_one() {
        let wb = TestWorkbook::new();
        assert_close(wb.eval_number("=NPV(0.1,100)"), 100.0 / 1.1, 1e-9);
        assert_close(
            wb.eval_number("=NPV(0.1,-10000,3000,4200,6800)"),
            1188.4434,
            1e-3,
        );
    }

    #[test]
    fn pmt_matches_known_loan() {
        let wb = TestWorkbook::new();
        // 8% annual over 10 months on 10k.
        assert_close(wb.eval_number("=PMT(0.08/12,10,10000)"), -1037.0320893, 1e-6);
        assert_close(wb.eval_number("=PMT(0,10,1000)"), -100.0, 1e-12);
    }

    #[test]
    fn nper_zero_rate_and_domain() {
        let wb = TestWorkbook::new();
        assert_close(wb.eval_number("=NPER(0,-100,1000)"), 10.0, 1e-12);
        assert_close(wb.eval_number("=NPER(0.01,-100,-1000,10000)"), 60.0820, 1e-3);
        assert!(matches!(
            wb.eval("=NPER(0,0,1000)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
        // A payment too small to cover interest never pays the loan off.
        assert!(matches!(
            wb.eval("=NPER(0.1,-50,1000)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
    }

    #[test]
    fn rate_inverts_pmt() {
        let wb = TestWorkbook::new();
        let rate = wb.eval_number("=RATE(10,-1037.0320893,10000)");
        assert_close(rate, 0.08 / 12.0, 1e-7);
    }

    #[test]
    fn irr_known_value_and_guards() {
        let wb = TestWorkbook::new()
            .with_column(
                "A1",
                &[
                    LiteralValue::Int(-70000),
                    LiteralValue::Int(12000),
                    LiteralValue::Int(15000),
                    LiteralValue::Int(18000),
                    LiteralValue::Int(21000),
                ],
            );
        assert_close(wb.eval_number("=IRR(A1:A5)"), -0.02124485, 1e-6);
        assert!(matches!(
            wb.eval("=IRR({1,2,3})"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
    }

    #[test]
    fn xirr_annualizes_by_actual_days() {
        let wb = TestWorkbook::new();
        // One year apart exactly: -1000 now, 1100 in 365 days is 10%.
        let r = wb.eval_number("=XIRR({-1000,1100},{40000,40365})");
        assert_close(r, 0.1, 1e-7);
        assert!(matches!(
            wb.eval("=XIRR({-1000,1100},{40000})"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
    }
}
