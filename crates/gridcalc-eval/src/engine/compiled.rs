use crate::interpreter::Interpreter;
use crate::traits::EvaluationContext;
use gridcalc_common::{Address, ExcelError, ExcelErrorKind, LiteralValue};
use gridcalc_parse::{parse_at, ASTNode, ReferenceType};

/// One reference as it appeared in the source, with its resolved shape.
#[derive(Debug, Clone)]
pub struct ReferenceDescriptor {
    pub original: String,
    pub reference: ReferenceType,
}

/// A formula parsed once at a base cell and replayable at any target:
/// evaluation shifts relative reference axes by the base→target delta while
/// absolute axes stay pinned. No re-parsing, no per-target allocation of
/// the tree.
#[derive(Debug, Clone)]
pub struct CompiledFormula {
    source: String,
    base: Address,
    ast: ASTNode,
    descriptors: Vec<ReferenceDescriptor>,
}

impl CompiledFormula {
    pub fn compile(formula: &str, base: Address) -> Result<Self, ExcelError> {
        let ast = parse_at(formula, Some(base)).map_err(|e| {
            ExcelError::new(ExcelErrorKind::Name).with_message(e.to_string())
        })?;
        let mut descriptors = Vec::new();
        ast.walk_refs(&mut |original, reference| {
            descriptors.push(ReferenceDescriptor {
                original: original.to_string(),
                reference: reference.clone(),
            });
        });
        Ok(CompiledFormula {
            source: formula.to_string(),
            base,
            ast,
            descriptors,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn base(&self) -> Address {
        self.base
    }

    /// References in source order.
    pub fn descriptors(&self) -> &[ReferenceDescriptor] {
        &self.descriptors
    }

    /// Replay at `target`. Relative coordinates rebase; shifting a
    /// reference off the grid yields `#REF!`.
    pub fn evaluate_at(
        &self,
        ctx: &dyn EvaluationContext,
        sheet: &str,
        target: Address,
    ) -> LiteralValue {
        let interp = Interpreter::new(ctx, sheet).with_anchor(self.base, target);
        interp.evaluate(&self.ast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_workbook::{parse_a1, TestWorkbook};
    use gridcalc_common::ExcelErrorKind;

    #[test]
    fn relative_references_shift_with_the_target() {
        let mut wb = TestWorkbook::new();
        // A1..C3 hold 1..9 row-major.
        for r in 1..=3u32 {
            for c in 1..=3u32 {
                wb = wb.with_cell("Sheet1", r, c, LiteralValue::Int(((r - 1) * 3 + c) as i64));
            }
        }
        let compiled = CompiledFormula::compile("=A1>4", parse_a1("B2")).unwrap();
        // Replayed over B2:D4, each target reads its up-left neighbor; D4
        // must land on C3.
        let mut hits = Vec::new();
        for target in ["B2", "C2", "B3", "D4"] {
            let v = compiled.evaluate_at(&wb, "Sheet1", parse_a1(target));
            hits.push((target, v));
        }
        assert_eq!(hits[0].1, LiteralValue::Boolean(false)); // A1 = 1
        assert_eq!(hits[1].1, LiteralValue::Boolean(false)); // B1 = 2
        assert_eq!(hits[2].1, LiteralValue::Boolean(false)); // A2 = 4
        assert_eq!(hits[3].1, LiteralValue::Boolean(true)); // C3 = 9
    }

    #[test]
    fn absolute_axes_stay_pinned() {
        let wb = TestWorkbook::new()
            .with_cell_a1("A1", LiteralValue::Int(100))
            .with_cell_a1("B5", LiteralValue::Int(1));
        let compiled = CompiledFormula::compile("=$A$1+A1", parse_a1("A1")).unwrap();
        // At B5 the relative half follows, the absolute half does not.
        assert_eq!(
            compiled.evaluate_at(&wb, "Sheet1", parse_a1("B5")),
            LiteralValue::Number(101.0)
        );
    }

    #[test]
    fn shifting_off_grid_is_a_ref_error() {
        let wb = TestWorkbook::new();
        let compiled = CompiledFormula::compile("=A1", parse_a1("B2")).unwrap();
        // Replaying at A1 would need the cell up-left of the grid origin.
        match compiled.evaluate_at(&wb, "Sheet1", parse_a1("A1")) {
            LiteralValue::Error(e) => assert_eq!(e.kind, ExcelErrorKind::Ref),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn descriptors_preserve_source_order() {
        let compiled =
            CompiledFormula::compile("=B2+SUM($A$1:A3)*C1", parse_a1("A1")).unwrap();
        let originals: Vec<_> = compiled
            .descriptors()
            .iter()
            .map(|d| d.original.as_str())
            .collect();
        assert_eq!(originals, vec!["B2", "$A$1:A3", "C1"]);
    }

    #[test]
    fn syntax_errors_surface_at_compile_time() {
        let err = CompiledFormula::compile("=1+", parse_a1("A1")).unwrap_err();
        assert_eq!(err.kind, ExcelErrorKind::Name);
    }
}
