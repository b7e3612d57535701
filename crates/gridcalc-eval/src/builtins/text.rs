use super::register;
use crate::coercion::{to_int, to_text};
use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub struct LenFn;
impl Function for LenFn {
    fn name(&self) -> &'static str {
        "LEN"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let s = to_text(&args[0].value()?)?;
        Ok(LiteralValue::Int(s.chars().count() as i64))
    }
}

fn take_count(arg: Option<&ArgumentHandle>) -> Result<i64, ExcelError> {
    let n = match arg {
        Some(a) if !a.is_omitted() => to_int(&a.value()?)?,
        _ => 1,
    };
    if n < 0 {
        return Err(ExcelError::new(ExcelErrorKind::Value)
            .with_message("Character count must not be negative"));
    }
    Ok(n)
}

pub struct LeftFn;
impl Function for LeftFn {
    fn name(&self) -> &'static str {
        "LEFT"
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
        let s = to_text(&args[0].value()?)?;
        let n = take_count(args.get(1))? as usize;
        Ok(LiteralValue::Text(s.chars().take(n).collect()))
    }
}

pub struct RightFn;
impl Function for RightFn {
    fn name(&self) -> &'static str {
        "RIGHT"
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
        let s = to_text(&args[0].value()?)?;
        let n = take_count(args.get(1))? as usize;
        let len = s.chars().count();
        Ok(LiteralValue::Text(
            s.chars().skip(len.saturating_sub(n)).collect(),
        ))
    }
}

pub struct MidFn;
impl Function for MidFn {
    fn name(&self) -> &'static str {
        "MID"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let s = to_text(&args[0].value()?)?;
        let start = to_int(&args[1].value()?)?;
        let len = to_int(&args[2].value()?)?;
        if start < 1 || len < 0 {
            return Err(ExcelError::new(ExcelErrorKind::Value)
                .with_message("MID start is 1-based and length must not be negative"));
        }
        Ok(LiteralValue::Text(
            s.chars().skip(start as usize - 1).take(len as usize).collect(),
        ))
    }
}

struct CaseFn {
    name: &'static str,
    upper: bool,
}

impl Function for CaseFn {
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
        let s = to_text(&args[0].value()?)?;
        Ok(LiteralValue::Text(if self.upper {
            s.to_uppercase()
        } else {
            s.to_lowercase()
        }))
    }
}

pub struct TrimFn;
impl Function for TrimFn {
    fn name(&self) -> &'static str {
        "TRIM"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let s = to_text(&args[0].value()?)?;
        // Interior runs of spaces collapse to one, ends are stripped.
        let collapsed: Vec<&str> = s.split(' ').filter(|p| !p.is_empty()).collect();
        Ok(LiteralValue::Text(collapsed.join(" ")))
    }
}

pub struct ConcatFn;
impl Function for ConcatFn {
    fn name(&self) -> &'static str {
        "CONCAT"
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
        let mut out = String::new();
        for arg in args {
            match arg.value()? {
                LiteralValue::Array(rows) => {
                    for el in rows.iter().flatten() {
                        out.push_str(&to_text(el)?);
                    }
                }
                scalar => out.push_str(&to_text(&scalar)?),
            }
        }
        Ok(LiteralValue::Text(out))
    }
}

pub(crate) fn register_builtins(map: &mut FxHashMap<&'static str, Arc<dyn Function>>) {
    register!(
        map,
        LenFn,
        LeftFn,
        RightFn,
        MidFn,
        CaseFn { name: "UPPER", upper: true },
        CaseFn { name: "LOWER", upper: false },
        TrimFn,
        ConcatFn,
    );
}
