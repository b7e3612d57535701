use super::register;
use crate::broadcast::{broadcast_shape, element_at};
use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};
use gridcalc_parse::{ASTNodeType, ReferenceType};
use rustc_hash::FxHashMap;
use std::sync::Arc;

fn value_error(msg: &str) -> ExcelError {
    ExcelError::new(ExcelErrorKind::Value).with_message(msg)
}

fn calc_error(msg: &str) -> ExcelError {
    ExcelError::new(ExcelErrorKind::Calc).with_message(msg)
}

fn name_of(node: &gridcalc_parse::ASTNode) -> Option<&str> {
    match &node.node_type {
        ASTNodeType::Reference {
            reference: ReferenceType::Name(n),
            ..
        } => Some(n),
        _ => None,
    }
}

pub struct LambdaFn;
impl Function for LambdaFn {
    fn name(&self) -> &'static str {
        "LAMBDA"
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
        // Reaching here means the lambda sits in a value position rather
        // than being invoked or passed to a higher-order function.
        let (params, _) = args.split_at(args.len() - 1);
        let mut seen: Vec<String> = Vec::new();
        for p in params {
            let Some(n) = name_of(p.ast()) else {
                return Err(value_error("LAMBDA parameters must be names"));
            };
            let upper = n.to_ascii_uppercase();
            if seen.contains(&upper) {
                return Err(value_error("Duplicate LAMBDA parameter"));
            }
            seen.push(upper);
        }
        Err(calc_error("LAMBDA was never invoked"))
    }
}

pub struct LetFn;
impl Function for LetFn {
    fn name(&self) -> &'static str {
        "LET"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        if args.len() % 2 == 0 {
            return Err(value_error("LET takes name/value pairs and a body"));
        }
        let interp = args[0].interpreter();
        let mut env = interp.env().clone();
        for pair in args[..args.len() - 1].chunks(2) {
            let Some(name) = name_of(pair[0].ast()) else {
                return Err(value_error("LET binding names must be identifiers"));
            };
            // Later bindings see earlier ones.
            let scoped = interp.with_env(env.clone());
            let binding = scoped.binding_from_node(pair[1].ast())?;
            env = env.with_binding(name, binding);
        }
        interp
            .with_env(env)
            .evaluate_ast(args[args.len() - 1].ast())
    }
}

pub struct MapFn;
impl Function for MapFn {
    fn name(&self) -> &'static str {
        "MAP"
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
        let (arrays, last) = args.split_at(args.len() - 1);
        let closure = last[0].lambda()?;
        if closure.params.len() != arrays.len() {
            return Err(value_error("MAP lambda arity must match the array count"));
        }
        let interp = args[0].interpreter();

        let mut inputs = Vec::with_capacity(arrays.len());
        let mut shape = (1usize, 1usize);
        for a in arrays {
            let v = a.value()?;
            shape = broadcast_shape(shape, v.dims())?;
            inputs.push(v);
        }

        let mut out = Vec::with_capacity(shape.0);
        for r in 0..shape.0 {
            let mut row = Vec::with_capacity(shape.1);
            for c in 0..shape.1 {
                let elems: Vec<LiteralValue> =
                    inputs.iter().map(|v| element_at(v, r, c)).collect();
                let cell = match interp.invoke_closure(&closure, elems) {
                    Ok(LiteralValue::Array(_)) => {
                        LiteralValue::Error(calc_error("Nested array from MAP lambda"))
                    }
                    Ok(v) => v,
                    Err(e) => LiteralValue::Error(e),
                };
                row.push(cell);
            }
            out.push(row);
        }
        if shape == (1, 1) {
            Ok(out.remove(0).remove(0))
        } else {
            Ok(LiteralValue::Array(out))
        }
    }
}

pub struct ReduceFn;
impl Function for ReduceFn {
    fn name(&self) -> &'static str {
        "REDUCE"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let closure = args[2].lambda()?;
        if closure.params.len() != 2 {
            return Err(value_error("REDUCE lambda takes accumulator and value"));
        }
        let interp = args[0].interpreter();
        let mut acc = args[0].value()?;
        for row in args[1].array()? {
            for v in row {
                acc = interp.invoke_closure(&closure, vec![acc, v])?;
                if let LiteralValue::Error(e) = acc {
                    return Err(e);
                }
            }
        }
        Ok(acc)
    }
}

pub struct ScanFn;
impl Function for ScanFn {
    fn name(&self) -> &'static str {
        "SCAN"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let closure = args[2].lambda()?;
        if closure.params.len() != 2 {
            return Err(value_error("SCAN lambda takes accumulator and value"));
        }
        let interp = args[0].interpreter();
        let mut acc = args[0].value()?;
        let mut out = Vec::new();
        for row in args[1].array()? {
            let mut out_row = Vec::with_capacity(row.len());
            for v in row {
                acc = interp.invoke_closure(&closure, vec![acc, v])?;
                if let LiteralValue::Error(e) = acc {
                    return Err(e);
                }
                out_row.push(acc.clone());
            }
            out.push(out_row);
        }
        Ok(LiteralValue::Array(out))
    }
}

struct ByAxisFn {
    name: &'static str,
    by_row: bool,
}

impl Function for ByAxisFn {
    fn name(&self) -> &'static str {
        self.name
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let closure = args[1].lambda()?;
        if closure.params.len() != 1 {
            return Err(value_error("The lambda must take exactly one parameter"));
        }
        let interp = args[0].interpreter();
        let rows = args[0].array()?;

        let slices: Vec<Vec<Vec<LiteralValue>>> = if self.by_row {
            rows.into_iter().map(|r| vec![r]).collect()
        } else {
            let width = rows.first().map_or(0, |r| r.len());
            (0..width)
                .map(|c| rows.iter().map(|r| vec![r[c].clone()]).collect())
                .collect()
        };

        let mut results = Vec::with_capacity(slices.len());
        for slice in slices {
            let v = match interp.invoke_closure(&closure, vec![LiteralValue::Array(slice)]) {
                Ok(LiteralValue::Array(_)) => {
                    LiteralValue::Error(calc_error("Lambda must reduce its slice to a scalar"))
                }
                Ok(v) => v,
                Err(e) => LiteralValue::Error(e),
            };
            results.push(v);
        }

        if self.by_row {
            Ok(LiteralValue::Array(results.into_iter().map(|v| vec![v]).collect()))
        } else {
            Ok(LiteralValue::Array(vec![results]))
        }
    }
}

pub(crate) fn register_builtins(map: &mut FxHashMap<&'static str, Arc<dyn Function>>) {
    register!(
        map,
        LambdaFn,
        LetFn,
        MapFn,
        ReduceFn,
        ScanFn,
        ByAxisFn { name: "BYROW", by_row: true },
        ByAxisFn { name: "BYCOL", by_row: false },
    );
}
