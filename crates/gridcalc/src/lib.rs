//! Meta crate that re-exports the gridcalc building blocks under one roof.
//! Depend on this crate for the common case; the underlying crates remain
//! available for deeper integration.
//!
//! ```
//! use gridcalc::engine::Workbook;
//! use gridcalc::{Address, LiteralValue};
//!
//! let mut wb = Workbook::new();
//! let a1 = Address::new(1, 1);
//! let b1 = Address::new(1, 2);
//! wb.sheet_mut("Sheet1").unwrap().set_cell_value(a1, LiteralValue::Int(21));
//! wb.set_formula("Sheet1", b1, "=A1*2").unwrap();
//! assert_eq!(
//!     wb.sheet("Sheet1").unwrap().get_cell_value(b1),
//!     LiteralValue::Number(42.0),
//! );
//! ```

pub use gridcalc_common as common;
pub use gridcalc_eval as eval;
pub use gridcalc_parse as parse;

pub use gridcalc_common::{
    Address, ExcelError, ExcelErrorExtra, ExcelErrorKind, LiteralValue, RangeAddr, RefCoord,
};
pub use gridcalc_eval::engine;
pub use gridcalc_eval::{
    evaluate_formula, EvaluationContext, Function, FunctionProvider, Interpreter,
    ReferenceResolver,
};
pub use gridcalc_parse::{parse as parse_formula, parse_at, ASTNode, Tokenizer};
