pub mod broadcast;
pub mod coercion;
pub mod function;
pub mod function_registry;
pub mod interpreter;
pub mod traits;

pub mod builtins;
pub mod engine;

pub mod test_workbook;

pub use function::{Function, LambdaClosure, LocalBinding, LocalEnv};
pub use interpreter::{Interpreter, MAX_RECURSION_DEPTH};
pub use traits::{ArgumentHandle, EvaluationContext, FunctionProvider, ReferenceResolver};

use gridcalc_common::{Address, ExcelError, ExcelErrorKind, LiteralValue};

/// Evaluate a formula string against a context. Syntax errors fold into an
/// error value; this is the single entry point external callers use.
pub fn evaluate_formula(
    formula: &str,
    ctx: &dyn EvaluationContext,
    sheet: &str,
    cell: Option<Address>,
) -> LiteralValue {
    let ast = match gridcalc_parse::parse_at(formula, cell) {
        Ok(ast) => ast,
        Err(e) => {
            return LiteralValue::Error(
                ExcelError::new(ExcelErrorKind::Name).with_message(e.to_string()),
            );
        }
    };
    let mut interp = Interpreter::new(ctx, sheet);
    if let Some(addr) = cell {
        interp = interp.with_cell(addr);
    }
    interp.evaluate(&ast)
}
