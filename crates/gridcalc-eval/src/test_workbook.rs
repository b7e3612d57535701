use crate::function::Function;
use crate::interpreter::Interpreter;
use crate::traits::{FunctionProvider, ReferenceResolver};
use gridcalc_common::{Address, ExcelError, ExcelErrorKind, LiteralValue};
use gridcalc_parse::{ReferenceType, parse, parse_reference};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// In-memory workbook for interpreter tests: seed cells, evaluate formulas,
/// assert on values.
#[derive(Default)]
pub struct TestWorkbook {
    cells: FxHashMap<(String, Address), LiteralValue>,
    functions: FxHashMap<String, Arc<dyn Function>>,
    default_sheet: String,
}

impl TestWorkbook {
    pub fn new() -> Self {
        TestWorkbook {
            cells: FxHashMap::default(),
            functions: FxHashMap::default(),
            default_sheet: "Sheet1".to_string(),
        }
    }

    pub fn with_cell(mut self, sheet: &str, row: u32, col: u32, value: LiteralValue) -> Self {
        self.cells
            .insert((sheet.to_ascii_uppercase(), Address::new(row, col)), value);
        self
    }

    pub fn with_cell_a1(self, a1: &str, value: LiteralValue) -> Self {
        let sheet = self.default_sheet.clone();
        let addr = parse_a1(a1);
        self.with_cell(&sheet, addr.row, addr.col, value)
    }

    /// Fill a column starting at `a1` downward.
    pub fn with_column(mut self, a1: &str, values: &[LiteralValue]) -> Self {
        let start = parse_a1(a1);
        let sheet = self.default_sheet.clone();
        for (i, v) in values.iter().enumerate() {
            self = self.with_cell(&sheet, start.row + i as u32, start.col, v.clone());
        }
        self
    }

    pub fn with_function(mut self, f: Arc<dyn Function>) -> Self {
        self.functions.insert(f.name().to_ascii_uppercase(), f);
        self
    }

    pub fn interpreter(&self) -> Interpreter<'_> {
        Interpreter::new(self, &self.default_sheet)
    }

    /// Parse and evaluate; every failure mode folds into an error value.
    pub fn eval(&self, formula: &str) -> LiteralValue {
        match parse(formula) {
            Ok(ast) => self.interpreter().evaluate(&ast),
            Err(e) => LiteralValue::Error(
                ExcelError::new(ExcelErrorKind::Name).with_message(e.to_string()),
            ),
        }
    }

    pub fn eval_number(&self, formula: &str) -> f64 {
        match self.eval(formula) {
            LiteralValue::Number(n) => n,
            LiteralValue::Int(i) => i as f64,
            other => panic!("expected number from {formula}, got {other:?}"),
        }
    }
}

pub fn parse_a1(a1: &str) -> Address {
    match parse_reference(a1, None) {
        Ok(ReferenceType::Cell { coord, .. }) => Address::new(coord.row, coord.col),
        other => panic!("bad A1 address {a1}: {other:?}"),
    }
}

impl ReferenceResolver for TestWorkbook {
    fn resolve_cell(&self, sheet: &str, addr: Address) -> Result<LiteralValue, ExcelError> {
        Ok(self
            .cells
            .get(&(sheet.to_ascii_uppercase(), addr))
            .cloned()
            .unwrap_or(LiteralValue::Empty))
    }
}

impl FunctionProvider for TestWorkbook {
    fn get_function(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions
            .get(&name.to_ascii_uppercase())
            .cloned()
            .or_else(|| crate::function_registry::get(name))
    }
}
