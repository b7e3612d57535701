use crate::traits::{FunctionProvider, ReferenceResolver};
use gridcalc_common::{Address, ExcelError, ExcelErrorKind, LiteralValue, RangeAddr};
use rustc_hash::FxHashMap;

pub const DEFAULT_COLUMN_WIDTH: f64 = 8.43;

/// Visual formatting attached to a cell or produced by a conditional rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Style {
    pub fill: Option<String>,
    pub font_color: Option<String>,
    pub bold: bool,
    pub italic: bool,
}

impl Style {
    pub fn merged_over(&self, base: &Style) -> Style {
        Style {
            fill: self.fill.clone().or_else(|| base.fill.clone()),
            font_color: self.font_color.clone().or_else(|| base.font_color.clone()),
            bold: self.bold || base.bold,
            italic: self.italic || base.italic,
        }
    }
}

/// One grid cell. A spill anchor carries the spilled rectangle; members of
/// a spill carry only the back-reference to their anchor.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub value: LiteralValue,
    pub formula: Option<String>,
    pub style: Option<Style>,
    pub comment: Option<String>,
    pub spill: Option<RangeAddr>,
    pub spilled_from: Option<Address>,
}

impl Cell {
    pub fn is_unused(&self) -> bool {
        self.value.is_blank()
            && self.formula.is_none()
            && self.style.is_none()
            && self.comment.is_none()
            && self.spill.is_none()
            && self.spilled_from.is_none()
    }
}

/// Sparse cell store plus per-sheet presentation state. This is the only
/// mutation surface the rest of the engine sees.
#[derive(Debug, Default)]
pub struct Worksheet {
    pub name: String,
    cells: FxHashMap<Address, Cell>,
    col_widths: FxHashMap<u32, f64>,
    filter: Option<RangeAddr>,
}

impl Worksheet {
    pub fn new(name: &str) -> Self {
        Worksheet {
            name: name.to_string(),
            cells: FxHashMap::default(),
            col_widths: FxHashMap::default(),
            filter: None,
        }
    }

    pub fn get_cell(&self, addr: Address) -> Option<&Cell> {
        self.cells.get(&addr)
    }

    /// The cell's stored value; blanks read as `Empty`.
    pub fn get_cell_value(&self, addr: Address) -> LiteralValue {
        self.cells
            .get(&addr)
            .map(|c| c.value.clone())
            .unwrap_or(LiteralValue::Empty)
    }

    pub(crate) fn cell_mut(&mut self, addr: Address) -> &mut Cell {
        self.cells.entry(addr).or_default()
    }

    pub fn set_cell_value(&mut self, addr: Address, value: LiteralValue) {
        self.cell_mut(addr).value = value;
        self.prune(addr);
    }

    pub fn set_cell_formula(&mut self, addr: Address, formula: Option<String>) {
        self.cell_mut(addr).formula = formula;
        self.prune(addr);
    }

    pub fn set_cell_style(&mut self, addr: Address, style: Option<Style>) {
        self.cell_mut(addr).style = style;
        self.prune(addr);
    }

    pub fn set_cell_comment(&mut self, addr: Address, comment: Option<String>) {
        self.cell_mut(addr).comment = comment;
        self.prune(addr);
    }

    /// Drop the entry once nothing distinguishes it from an untouched cell,
    /// keeping the store sparse.
    fn prune(&mut self, addr: Address) {
        if self.cells.get(&addr).is_some_and(Cell::is_unused) {
            self.cells.remove(&addr);
        }
    }

    pub fn get_column_width(&self, col: u32) -> f64 {
        self.col_widths.get(&col).copied().unwrap_or(DEFAULT_COLUMN_WIDTH)
    }

    pub fn set_column_width(&mut self, col: u32, width: f64) {
        if (width - DEFAULT_COLUMN_WIDTH).abs() < f64::EPSILON {
            self.col_widths.remove(&col);
        } else {
            self.col_widths.insert(col, width);
        }
    }

    pub fn get_filter(&self) -> Option<RangeAddr> {
        self.filter
    }

    pub fn set_filter(&mut self, range: RangeAddr) {
        self.filter = Some(range);
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    pub fn used_cells(&self) -> impl Iterator<Item = (&Address, &Cell)> {
        self.cells.iter()
    }
}

/// A set of named worksheets behind the evaluation traits, so formulas can
/// read across sheets. Sheet names are case-insensitive.
#[derive(Debug, Default)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
    index: FxHashMap<String, usize>,
}

impl Workbook {
    pub fn new() -> Self {
        let mut wb = Workbook::default();
        wb.add_sheet("Sheet1");
        wb
    }

    pub fn add_sheet(&mut self, name: &str) -> &mut Worksheet {
        let key = name.to_ascii_uppercase();
        let idx = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.sheets.push(Worksheet::new(name));
                self.index.insert(key, self.sheets.len() - 1);
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[idx]
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.index
            .get(&name.to_ascii_uppercase())
            .map(|&i| &self.sheets[i])
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        self.index
            .get(&name.to_ascii_uppercase())
            .map(|&i| &mut self.sheets[i])
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }

    /// Evaluate a formula anchored at `cell` and store the result there,
    /// spilling arrays into the neighborhood. The stored formula text is
    /// kept so the cell can be re-evaluated later.
    pub fn set_formula(
        &mut self,
        sheet: &str,
        cell: Address,
        formula: &str,
    ) -> Result<(), ExcelError> {
        let ws = self
            .sheet_mut(sheet)
            .ok_or_else(|| missing_sheet(sheet))?;
        ws.cell_mut(cell).formula = Some(formula.to_string());
        self.recalculate_cell(sheet, cell)
    }

    /// Re-run the formula stored at `cell`. Scalar results land in the cell;
    /// array results go through the spill engine.
    pub fn recalculate_cell(&mut self, sheet: &str, cell: Address) -> Result<(), ExcelError> {
        let formula = self
            .sheet(sheet)
            .ok_or_else(|| missing_sheet(sheet))?
            .get_cell(cell)
            .and_then(|c| c.formula.clone());
        let Some(formula) = formula else {
            return Ok(());
        };
        let result = crate::evaluate_formula(&formula, self, sheet, Some(cell));
        let ws = self
            .sheet_mut(sheet)
            .ok_or_else(|| missing_sheet(sheet))?;
        match result {
            LiteralValue::Array(rows) => {
                // Collision already wrote #SPILL! into the anchor.
                let _ = super::spill::apply_spill(ws, cell, &rows);
            }
            scalar => {
                super::spill::clear_spill(ws, cell);
                ws.cell_mut(cell).value = scalar;
            }
        }
        Ok(())
    }
}

fn missing_sheet(name: &str) -> ExcelError {
    ExcelError::new(ExcelErrorKind::Ref).with_message(format!("Unknown sheet '{name}'"))
}

impl ReferenceResolver for Workbook {
    fn resolve_cell(&self, sheet: &str, addr: Address) -> Result<LiteralValue, ExcelError> {
        let ws = self.sheet(sheet).ok_or_else(|| missing_sheet(sheet))?;
        Ok(ws.get_cell_value(addr))
    }
}

impl FunctionProvider for Workbook {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_workbook::parse_a1;

    #[test]
    fn cell_store_stays_sparse() {
        let mut ws = Worksheet::new("Sheet1");
        let a1 = parse_a1("A1");
        ws.set_cell_value(a1, LiteralValue::Int(5));
        assert_eq!(ws.used_cells().count(), 1);
        ws.set_cell_value(a1, LiteralValue::Empty);
        assert_eq!(ws.used_cells().count(), 0);
        assert_eq!(ws.get_cell_value(a1), LiteralValue::Empty);
    }

    #[test]
    fn column_widths_default() {
        let mut ws = Worksheet::new("Sheet1");
        assert_eq!(ws.get_column_width(3), DEFAULT_COLUMN_WIDTH);
        ws.set_column_width(3, 20.0);
        assert_eq!(ws.get_column_width(3), 20.0);
        ws.set_column_width(3, DEFAULT_COLUMN_WIDTH);
        assert_eq!(ws.get_column_width(3), DEFAULT_COLUMN_WIDTH);
    }

    #[test]
    fn filter_set_and_clear() {
        let mut ws = Worksheet::new("Sheet1");
        assert!(ws.get_filter().is_none());
        let range = RangeAddr::new(parse_a1("A1"), parse_a1("C10")).unwrap();
        ws.set_filter(range);
        assert_eq!(ws.get_filter(), Some(range));
        ws.clear_filter();
        assert!(ws.get_filter().is_none());
    }

    #[test]
    fn workbook_formula_round_trip() {
        let mut wb = Workbook::new();
        let sheet = "Sheet1";
        wb.sheet_mut(sheet)
            .unwrap()
            .set_cell_value(parse_a1("A1"), LiteralValue::Int(2));
        wb.set_formula(sheet, parse_a1("B1"), "=A1*10").unwrap();
        assert_eq!(
            wb.sheet(sheet).unwrap().get_cell_value(parse_a1("B1")),
            LiteralValue::Number(20.0)
        );
        // Change the input and recalculate.
        wb.sheet_mut(sheet)
            .unwrap()
            .set_cell_value(parse_a1("A1"), LiteralValue::Int(3));
        wb.recalculate_cell(sheet, parse_a1("B1")).unwrap();
        assert_eq!(
            wb.sheet(sheet).unwrap().get_cell_value(parse_a1("B1")),
            LiteralValue::Number(30.0)
        );
    }

    #[test]
    fn cross_sheet_reference() {
        let mut wb = Workbook::new();
        wb.add_sheet("Data")
            .set_cell_value(parse_a1("A1"), LiteralValue::Int(7));
        wb.set_formula("Sheet1", parse_a1("A1"), "=Data!A1+1").unwrap();
        assert_eq!(
            wb.sheet("Sheet1").unwrap().get_cell_value(parse_a1("A1")),
            LiteralValue::Number(8.0)
        );
    }

    #[test]
    fn style_merge_prefers_overlay() {
        let base = Style { fill: Some("red".into()), bold: true, ..Style::default() };
        let over = Style { fill: Some("blue".into()), italic: true, ..Style::default() };
        let merged = over.merged_over(&base);
        assert_eq!(merged.fill.as_deref(), Some("blue"));
        assert!(merged.bold && merged.italic);
    }
}
