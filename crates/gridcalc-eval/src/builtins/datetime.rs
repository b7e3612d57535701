use super::register;
use crate::coercion::{to_int, to_number};
use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use gridcalc_common::datetime::{
    build_date_normalized, date_to_serial, fraction_to_time, serial_to_date,
};
use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};
use chrono::{Datelike, NaiveDate, Timelike};
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub struct DateFn;
impl Function for DateFn {
    fn name(&self) -> &'static str {
        "DATE"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let year = to_int(&args[0].value()?)?;
        let month = to_int(&args[1].value()?)?;
        let day = to_int(&args[2].value()?)?;
        // Two-digit era shorthand: years below 1900 count from 1900.
        let year = if (0..1900).contains(&year) { year + 1900 } else { year };
        let year: i32 = year.try_into().map_err(|_| num_error("DATE year out of range"))?;
        let date = build_date_normalized(year, month, day)
            .ok_or_else(|| num_error("DATE out of range"))?;
        let serial = date_to_serial(date);
        if serial < 1 {
            return Err(num_error("DATE before the 1900 epoch"));
        }
        Ok(LiteralValue::Int(serial))
    }
}

fn num_error(msg: &str) -> ExcelError {
    ExcelError::new(ExcelErrorKind::Num).with_message(msg)
}

pub struct TimeFn;
impl Function for TimeFn {
    fn name(&self) -> &'static str {
        "TIME"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let hour = to_int(&args[0].value()?)?;
        let minute = to_int(&args[1].value()?)?;
        let second = to_int(&args[2].value()?)?;
        let total = hour * 3600 + minute * 60 + second;
        if total < 0 {
            return Err(num_error("TIME before midnight"));
        }
        // Components overflow into each other and the result wraps the day.
        Ok(LiteralValue::Number((total % 86_400) as f64 / 86_400.0))
    }
}

fn serial_date_arg(arg: &ArgumentHandle) -> Result<NaiveDate, ExcelError> {
    let serial = to_number(&arg.value()?)?;
    if serial < 1.0 {
        return Err(num_error("Serial has no date part"));
    }
    serial_to_date(serial.floor() as i64).ok_or_else(|| num_error("Serial out of range"))
}

struct DatePartFn {
    name: &'static str,
    part: fn(NaiveDate) -> i64,
}

impl Function for DatePartFn {
    fn name(&self) -> &'static str {
        self.name
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(LiteralValue::Int((self.part)(serial_date_arg(&args[0])?)))
    }
}

struct TimePartFn {
    name: &'static str,
    part: fn(chrono::NaiveTime) -> i64,
}

impl Function for TimePartFn {
    fn name(&self) -> &'static str {
        self.name
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let serial = to_number(&args[0].value()?)?;
        if serial < 0.0 {
            return Err(num_error("Negative serial has no time part"));
        }
        let time = fraction_to_time(serial.fract());
        Ok(LiteralValue::Int((self.part)(time)))
    }
}

#[cfg(feature = "system-clock")]
pub struct TodayFn;

#[cfg(feature = "system-clock")]
impl Function for TodayFn {
    fn name(&self) -> &'static str {
        "TODAY"
    }
    fn volatile(&self) -> bool {
        true
    }
    fn eval(
        &self,
        _args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(LiteralValue::Int(date_to_serial(
            chrono::Local::now().date_naive(),
        )))
    }
}

#[cfg(feature = "system-clock")]
pub struct NowFn;

#[cfg(feature = "system-clock")]
impl Function for NowFn {
    fn name(&self) -> &'static str {
        "NOW"
    }
    fn volatile(&self) -> bool {
        true
    }
    fn eval(
        &self,
        _args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        Ok(LiteralValue::Number(
            gridcalc_common::datetime::datetime_to_serial(chrono::Local::now().naive_local()),
        ))
    }
}

pub(crate) fn register_builtins(map: &mut FxHashMap<&'static str, Arc<dyn Function>>) {
    register!(
        map,
        DateFn,
        TimeFn,
        DatePartFn { name: "YEAR", part: |d| i64::from(d.year()) },
        DatePartFn { name: "MONTH", part: |d| i64::from(d.month()) },
        DatePartFn { name: "DAY", part: |d| i64::from(d.day()) },
        TimePartFn { name: "HOUR", part: |t| i64::from(t.hour()) },
        TimePartFn { name: "MINUTE", part: |t| i64::from(t.minute()) },
        TimePartFn { name: "SECOND", part: |t| i64::from(t.second()) },
    );
    #[cfg(feature = "system-clock")]
    register!(map, TodayFn, NowFn);
}

#[cfg(test)]
mod tests {
    use crate::test_workbook::TestWorkbook;
    use gridcalc_common::{ExcelErrorKind, LiteralValue};

    #[test]
    fn date_builds_serials() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=DATE(1900,1,1)"), LiteralValue::Int(1));
        assert_eq!(wb.eval("=DATE(2008,1,1)"), LiteralValue::Int(39448));
    }

    #[test]
    fn date_normalizes_overflow() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=DATE(2020,13,1)"), wb.eval("=DATE(2021,1,1)"));
        assert_eq!(wb.eval("=DATE(2020,2,30)"), wb.eval("=DATE(2020,3,1)"));
        assert_eq!(wb.eval("=DATE(2020,1,0)"), wb.eval("=DATE(2019,12,31)"));
    }

    #[test]
    fn date_era_shift_and_epoch_guard() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=DATE(99,1,1)"), wb.eval("=DATE(1999,1,1)"));
        // Negative years never shift and fall before the epoch.
        assert!(matches!(
            wb.eval("=DATE(-1,1,1)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
    }

    #[test]
    fn time_wraps_and_guards() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=TIME(12,0,0)"), LiteralValue::Number(0.5));
        assert_eq!(wb.eval("=TIME(25,0,0)"), LiteralValue::Number(1.0 / 24.0));
        assert_eq!(wb.eval("=TIME(0,90,0)"), LiteralValue::Number(0.0625));
        assert!(matches!(
            wb.eval("=TIME(-1,0,0)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
    }

    #[test]
    fn date_parts() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=YEAR(DATE(2024,2,29))"), LiteralValue::Int(2024));
        assert_eq!(wb.eval("=MONTH(DATE(2024,2,29))"), LiteralValue::Int(2));
        assert_eq!(wb.eval("=DAY(DATE(2024,2,29))"), LiteralValue::Int(29));
    }

    #[test]
    fn time_parts_ignore_date() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=HOUR(DATE(2024,1,1)+TIME(13,45,30))"), LiteralValue::Int(13));
        assert_eq!(wb.eval("=MINUTE(TIME(13,45,30))"), LiteralValue::Int(45));
        assert_eq!(wb.eval("=SECOND(TIME(13,45,30))"), LiteralValue::Int(30));
    }

    #[cfg(feature = "system-clock")]
    #[test]
    fn today_is_volatile_and_recent() {
        let wb = TestWorkbook::new();
        let serial = wb.eval_number("=TODAY()");
        // 2020-01-01 is serial 43831; any live clock is past that.
        assert!(serial > 43831.0);
        assert!(wb.eval_number("=NOW()") >= serial);
    }
}
