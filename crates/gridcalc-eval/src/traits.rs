use crate::function::{Function, LambdaClosure};
use crate::interpreter::Interpreter;
use gridcalc_common::{Address, ExcelError, ExcelErrorKind, LiteralValue, RangeAddr};
use gridcalc_parse::ASTNode;
use std::rc::Rc;
use std::sync::Arc;

/// Supplies cell and range values to the interpreter. The sheet name is
/// always concrete here; the interpreter substitutes the current sheet for
/// unqualified references before calling in.
pub trait ReferenceResolver {
    fn resolve_cell(&self, sheet: &str, addr: Address) -> Result<LiteralValue, ExcelError>;

    fn resolve_range(
        &self,
        sheet: &str,
        range: RangeAddr,
    ) -> Result<Vec<Vec<LiteralValue>>, ExcelError> {
        let mut rows = Vec::with_capacity(range.rows() as usize);
        for r in range.start.row..=range.end.row {
            let mut row = Vec::with_capacity(range.cols() as usize);
            for c in range.start.col..=range.end.col {
                row.push(self.resolve_cell(sheet, Address::new(r, c))?);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Function lookup. Defaults to the global registry; contexts can override
/// to inject or shadow functions.
pub trait FunctionProvider {
    fn get_function(&self, name: &str) -> Option<Arc<dyn Function>> {
        crate::function_registry::get(name)
    }
}

pub trait EvaluationContext: ReferenceResolver + FunctionProvider {}
impl<T: ReferenceResolver + FunctionProvider + ?Sized> EvaluationContext for T {}

/// Lazily evaluated argument: functions decide which arguments to touch, so
/// IF and friends get short-circuit behavior for free.
pub struct ArgumentHandle<'a, 'b> {
    node: &'a ASTNode,
    interp: &'a Interpreter<'b>,
}

impl<'a, 'b> ArgumentHandle<'a, 'b> {
    pub fn new(node: &'a ASTNode, interp: &'a Interpreter<'b>) -> Self {
        ArgumentHandle { node, interp }
    }

    /// Evaluate to a value. Error values arrive as `Ok(LiteralValue::Error)`
    /// when they came from operands, or as `Err` from structural failures;
    /// callers that care (IFERROR) must check both.
    pub fn value(&self) -> Result<LiteralValue, ExcelError> {
        self.interp.evaluate_ast(self.node)
    }

    /// Materialize as a rectangle. Scalars become 1×1.
    pub fn array(&self) -> Result<Vec<Vec<LiteralValue>>, ExcelError> {
        match self.value()? {
            LiteralValue::Array(rows) => Ok(rows),
            LiteralValue::Error(e) => Err(e),
            scalar => Ok(vec![vec![scalar]]),
        }
    }

    /// The argument as a lambda, either written inline or bound to a name.
    pub fn lambda(&self) -> Result<Rc<LambdaClosure>, ExcelError> {
        self.interp.lambda_from_node(self.node)?.ok_or_else(|| {
            ExcelError::new(ExcelErrorKind::Value).with_message("Expected a LAMBDA argument")
        })
    }

    pub fn lambda_opt(&self) -> Result<Option<Rc<LambdaClosure>>, ExcelError> {
        self.interp.lambda_from_node(self.node)
    }

    pub fn ast(&self) -> &ASTNode {
        self.node
    }

    pub fn interpreter(&self) -> &'a Interpreter<'b> {
        self.interp
    }

    /// True for an argument position left blank, `F(a,,b)`.
    pub fn is_omitted(&self) -> bool {
        matches!(
            self.node.node_type,
            gridcalc_parse::ASTNodeType::Literal(LiteralValue::Empty)
        )
    }
}
