use crate::broadcast::{combine, map_unary};
use crate::coercion::{to_number, to_text};
use crate::function::{LambdaClosure, LocalBinding, LocalEnv};
use crate::traits::{ArgumentHandle, EvaluationContext};
use gridcalc_common::{Address, ExcelError, ExcelErrorKind, LiteralValue, RefCoord};
use gridcalc_parse::{ASTNode, ASTNodeType, ReferenceType};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

/// Nested call / lambda invocation ceiling. Breaching it yields `#CALC!`.
pub const MAX_RECURSION_DEPTH: u32 = 64;

struct DepthGuard {
    depth: Rc<Cell<u32>>,
}

impl DepthGuard {
    fn enter(depth: &Rc<Cell<u32>>) -> Result<Self, ExcelError> {
        let next = depth.get() + 1;
        if next > MAX_RECURSION_DEPTH {
            return Err(ExcelError::new(ExcelErrorKind::Calc)
                .with_message("Recursion depth limit exceeded"));
        }
        depth.set(next);
        Ok(DepthGuard { depth: Rc::clone(depth) })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// Tree-walking evaluator. One interpreter serves one evaluation pass; the
/// subexpression cache assumes cell contents do not change underneath it.
pub struct Interpreter<'a> {
    context: &'a dyn EvaluationContext,
    pub current_sheet: String,
    pub current_cell: Option<Address>,
    /// When replaying a compiled formula at a different cell, relative
    /// reference axes shift by the base→target delta.
    anchor: Option<(Address, Address)>,
    env: LocalEnv,
    depth: Rc<Cell<u32>>,
    cache: RefCell<FxHashMap<u64, LiteralValue>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a dyn EvaluationContext, current_sheet: &str) -> Self {
        Interpreter {
            context,
            current_sheet: current_sheet.to_string(),
            current_cell: None,
            anchor: None,
            env: LocalEnv::new(),
            depth: Rc::new(Cell::new(0)),
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn with_cell(mut self, addr: Address) -> Self {
        self.current_cell = Some(addr);
        self
    }

    pub fn with_anchor(mut self, base: Address, target: Address) -> Self {
        self.anchor = Some((base, target));
        self.current_cell = Some(target);
        self
    }

    pub fn context(&self) -> &'a dyn EvaluationContext {
        self.context
    }

    pub fn env(&self) -> &LocalEnv {
        &self.env
    }

    /// Same pass, different bindings. The depth counter is shared so lambda
    /// recursion cannot hide behind fresh scopes; the cache is not, because
    /// names resolve differently per environment.
    pub fn with_env(&self, env: LocalEnv) -> Interpreter<'a> {
        Interpreter {
            context: self.context,
            current_sheet: self.current_sheet.clone(),
            current_cell: self.current_cell,
            anchor: self.anchor,
            env,
            depth: Rc::clone(&self.depth),
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// Evaluate, folding failures into an error value.
    pub fn evaluate(&self, node: &ASTNode) -> LiteralValue {
        self.evaluate_ast(node).unwrap_or_else(LiteralValue::Error)
    }

    pub fn evaluate_ast(&self, node: &ASTNode) -> Result<LiteralValue, ExcelError> {
        let cacheable = self.env.is_empty()
            && matches!(
                node.node_type,
                ASTNodeType::Function { .. } | ASTNodeType::BinaryOp { .. }
            )
            && !node.contains_volatile();

        if cacheable {
            if let Some(hit) = self.cache.borrow().get(&node.fingerprint()) {
                return Ok(hit.clone());
            }
        }

        let result = self.eval_node(node);

        if cacheable {
            if let Ok(value) = &result {
                self.cache
                    .borrow_mut()
                    .insert(node.fingerprint(), value.clone());
            }
        }
        result
    }

    fn eval_node(&self, node: &ASTNode) -> Result<LiteralValue, ExcelError> {
        match &node.node_type {
            ASTNodeType::Literal(v) => Ok(v.clone()),
            ASTNodeType::Reference { reference, .. } => self.resolve_reference(reference),
            ASTNodeType::UnaryOp { op, expr } => {
                let value = self.evaluate_ast(expr)?;
                Ok(self.eval_unary(op, &value))
            }
            ASTNodeType::BinaryOp { op, left, right } => {
                let l = self.evaluate_ast(left)?;
                let r = self.evaluate_ast(right)?;
                self.eval_binary(op, &l, &r)
            }
            ASTNodeType::Function { name, args } => self.eval_function(name, args),
            ASTNodeType::Invoke { callee, args } => self.eval_invoke(callee, args),
            ASTNodeType::Array(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut out_row = Vec::with_capacity(row.len());
                    for item in row {
                        let v = self.evaluate(item);
                        if matches!(v, LiteralValue::Array(_)) {
                            out_row.push(LiteralValue::Error(
                                ExcelError::new(ExcelErrorKind::Value)
                                    .with_message("Nested array in array literal"),
                            ));
                        } else {
                            out_row.push(v);
                        }
                    }
                    out.push(out_row);
                }
                Ok(LiteralValue::Array(out))
            }
        }
    }

    /* ─────────────────────────── references ────────────────────────── */

    fn rebase_coord(&self, coord: &RefCoord) -> Result<Address, ExcelError> {
        match self.anchor {
            Some((base, target)) => coord.rebase(base, target).ok_or_else(|| {
                ExcelError::new(ExcelErrorKind::Ref)
                    .with_message(format!("Reference {coord} shifted off the grid"))
            }),
            None => {
                let addr = Address::new(coord.row, coord.col);
                if addr.in_bounds() {
                    Ok(addr)
                } else {
                    Err(ExcelError::new(ExcelErrorKind::Ref))
                }
            }
        }
    }

    fn resolve_reference(&self, reference: &ReferenceType) -> Result<LiteralValue, ExcelError> {
        match reference {
            ReferenceType::Cell { sheet, coord } => {
                let addr = self.rebase_coord(coord)?;
                let sheet = sheet.as_deref().unwrap_or(&self.current_sheet);
                self.context.resolve_cell(sheet, addr)
            }
            ReferenceType::Range { sheet, start, end } => {
                let start = self.rebase_coord(start)?;
                let end = self.rebase_coord(end)?;
                let range = gridcalc_common::RangeAddr::new(start, end).ok_or_else(|| {
                    ExcelError::new(ExcelErrorKind::Ref)
                        .with_message(format!("Inverted range {start}:{end}"))
                })?;
                let sheet = sheet.as_deref().unwrap_or(&self.current_sheet);
                let rows = self.context.resolve_range(sheet, range)?;
                Ok(LiteralValue::Array(rows))
            }
            ReferenceType::Name(name) => match self.env.lookup(name) {
                Some(LocalBinding::Value(v)) => Ok(v.clone()),
                Some(LocalBinding::Lambda(_)) => Err(ExcelError::new(ExcelErrorKind::Calc)
                    .with_message(format!("'{name}' is a LAMBDA and was not invoked"))),
                None => Err(ExcelError::new(ExcelErrorKind::Name)
                    .with_message(format!("Unknown name '{name}'"))),
            },
        }
    }

    /* ─────────────────────────── operators ─────────────────────────── */

    fn eval_unary(&self, op: &str, value: &LiteralValue) -> LiteralValue {
        match op {
            "-" => map_unary(value, |v| Ok(LiteralValue::Number(-to_number(v)?))),
            "+" => value.clone(),
            "%" => map_unary(value, |v| Ok(LiteralValue::Number(to_number(v)? / 100.0))),
            _ => LiteralValue::Error(
                ExcelError::new(ExcelErrorKind::Name).with_message(format!("Unknown operator '{op}'")),
            ),
        }
    }

    fn eval_binary(
        &self,
        op: &str,
        l: &LiteralValue,
        r: &LiteralValue,
    ) -> Result<LiteralValue, ExcelError> {
        match op {
            "+" | "-" | "*" | "/" | "^" => Ok(combine(l, r, |a, b| numeric_op(op, a, b))),
            "&" => Ok(combine(l, r, |a, b| {
                Ok(LiteralValue::Text(format!("{}{}", to_text(a)?, to_text(b)?)))
            })),
            "=" | "<>" | "<" | ">" | "<=" | ">=" => Ok(combine(l, r, |a, b| compare(op, a, b))),
            _ => Err(ExcelError::new(ExcelErrorKind::Name)
                .with_message(format!("Unknown operator '{op}'"))),
        }
    }

    /* ─────────────────────── calls and lambdas ─────────────────────── */

    fn eval_function(&self, name: &str, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
        let _guard = DepthGuard::enter(&self.depth)?;

        // A name bound to a lambda shadows built-ins inside its scope.
        if let Some(closure) = self.env.lookup_lambda(name) {
            return self.invoke_lambda_nodes(&closure, args);
        }

        let Some(func) = self.context.get_function(name) else {
            return Err(ExcelError::new(ExcelErrorKind::Name)
                .with_message(format!("Unknown function '{name}'")));
        };

        let n = args.len();
        if n < func.min_args() {
            return Err(ExcelError::new(ExcelErrorKind::Value)
                .with_message(format!("{name} expects at least {} arguments", func.min_args())));
        }
        if let Some(max) = func.max_args() {
            if n > max {
                return Err(ExcelError::new(ExcelErrorKind::Value)
                    .with_message(format!("{name} accepts at most {max} arguments")));
            }
        }

        // Most calls take a handful of arguments; keep them off the heap.
        let handles: SmallVec<[ArgumentHandle; 8]> =
            args.iter().map(|a| ArgumentHandle::new(a, self)).collect();
        func.eval(&handles, self.context)
    }

    fn eval_invoke(&self, callee: &ASTNode, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
        let Some(closure) = self.lambda_from_node(callee)? else {
            return Err(ExcelError::new(ExcelErrorKind::Value)
                .with_message("Only LAMBDA values can be invoked"));
        };
        self.invoke_lambda_nodes(&closure, args)
    }

    /// Recognize a lambda-valued expression: an inline `LAMBDA(...)` or a
    /// name bound to one. Anything else is `Ok(None)`.
    pub fn lambda_from_node(
        &self,
        node: &ASTNode,
    ) -> Result<Option<Rc<LambdaClosure>>, ExcelError> {
        match &node.node_type {
            ASTNodeType::Function { name, args } if name == "LAMBDA" => {
                if args.is_empty() {
                    return Err(ExcelError::new(ExcelErrorKind::Value)
                        .with_message("LAMBDA requires a body expression"));
                }
                let (param_nodes, body) = args.split_at(args.len() - 1);
                let mut params: Vec<String> = Vec::with_capacity(param_nodes.len());
                for p in param_nodes {
                    let ASTNodeType::Reference {
                        reference: ReferenceType::Name(n),
                        ..
                    } = &p.node_type
                    else {
                        return Err(ExcelError::new(ExcelErrorKind::Value)
                            .with_message("LAMBDA parameters must be names"));
                    };
                    let upper = n.to_ascii_uppercase();
                    if params.contains(&upper) {
                        return Err(ExcelError::new(ExcelErrorKind::Value)
                            .with_message(format!("Duplicate LAMBDA parameter '{n}'")));
                    }
                    params.push(upper);
                }
                Ok(Some(Rc::new(LambdaClosure {
                    params,
                    body: body[0].clone(),
                    env: self.env.clone(),
                })))
            }
            ASTNodeType::Reference {
                reference: ReferenceType::Name(n),
                ..
            } => Ok(self.env.lookup_lambda(n)),
            _ => Ok(None),
        }
    }

    /// Bind a value-or-lambda expression, for LET and lambda arguments.
    pub fn binding_from_node(&self, node: &ASTNode) -> Result<LocalBinding, ExcelError> {
        match self.lambda_from_node(node)? {
            Some(closure) => Ok(LocalBinding::Lambda(closure)),
            None => Ok(LocalBinding::Value(self.evaluate_ast(node)?)),
        }
    }

    fn invoke_lambda_nodes(
        &self,
        closure: &LambdaClosure,
        args: &[ASTNode],
    ) -> Result<LiteralValue, ExcelError> {
        let mut bindings = Vec::with_capacity(args.len());
        for node in args {
            bindings.push(self.binding_from_node(node)?);
        }
        self.invoke_closure_bindings(closure, bindings)
    }

    /// Invoke with already-evaluated argument values.
    pub fn invoke_closure(
        &self,
        closure: &LambdaClosure,
        args: Vec<LiteralValue>,
    ) -> Result<LiteralValue, ExcelError> {
        self.invoke_closure_bindings(closure, args.into_iter().map(LocalBinding::Value).collect())
    }

    pub fn invoke_closure_bindings(
        &self,
        closure: &LambdaClosure,
        bindings: Vec<LocalBinding>,
    ) -> Result<LiteralValue, ExcelError> {
        let _guard = DepthGuard::enter(&self.depth)?;
        if bindings.len() != closure.params.len() {
            return Err(ExcelError::new(ExcelErrorKind::Value).with_message(format!(
                "LAMBDA expects {} arguments, got {}",
                closure.params.len(),
                bindings.len()
            )));
        }
        let mut env = closure.env.clone();
        for (param, binding) in closure.params.iter().zip(bindings) {
            env = env.with_binding(param, binding);
        }
        let scoped = self.with_env(env);
        scoped.evaluate_ast(&closure.body)
    }
}

/* ───────────────────────── scalar operations ───────────────────────── */

fn numeric_op(op: &str, a: &LiteralValue, b: &LiteralValue) -> Result<LiteralValue, ExcelError> {
    let x = to_number(a)?;
    let y = to_number(b)?;
    let result = match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => {
            if y == 0.0 {
                return Err(ExcelError::new(ExcelErrorKind::Div));
            }
            x / y
        }
        "^" => {
            if x == 0.0 && y == 0.0 {
                return Err(ExcelError::new(ExcelErrorKind::Num).with_message("0^0 is undefined"));
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(ExcelError::new(ExcelErrorKind::Num)
                    .with_message("Negative base with fractional exponent"));
            }
            x.powf(y)
        }
        _ => return Err(ExcelError::new(ExcelErrorKind::Name)),
    };
    if result.is_finite() {
        Ok(LiteralValue::Number(result))
    } else {
        Err(ExcelError::new(ExcelErrorKind::Num))
    }
}

/// Excel's total order for comparison operators: numbers < text < logicals,
/// text case-insensitive, blanks coerce to the other operand's zero value.
pub fn cmp_values(a: &LiteralValue, b: &LiteralValue) -> Ordering {
    use LiteralValue::*;

    fn rank(v: &LiteralValue) -> u8 {
        match v {
            Int(_) | Number(_) | Empty => 0,
            Text(_) => 1,
            Boolean(_) => 2,
            _ => 3,
        }
    }

    match (a, b) {
        (Empty, Empty) => Ordering::Equal,
        (Empty, Text(t)) => "".cmp(&t.to_ascii_lowercase()),
        (Text(t), Empty) => t.to_ascii_lowercase().cmp(&String::new()),
        (Empty, Boolean(bv)) => false.cmp(bv),
        (Boolean(av), Empty) => av.cmp(&false),
        (Text(x), Text(y)) => x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase()),
        (Boolean(x), Boolean(y)) => x.cmp(y),
        _ if rank(a) == 0 && rank(b) == 0 => {
            let x = a.as_number().unwrap_or(0.0);
            let y = b.as_number().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

fn compare(op: &str, a: &LiteralValue, b: &LiteralValue) -> Result<LiteralValue, ExcelError> {
    if let LiteralValue::Error(e) = a {
        return Err(e.clone());
    }
    if let LiteralValue::Error(e) = b {
        return Err(e.clone());
    }
    let ord = cmp_values(a, b);
    let result = match op {
        "=" => ord == Ordering::Equal,
        "<>" => ord != Ordering::Equal,
        "<" => ord == Ordering::Less,
        ">" => ord == Ordering::Greater,
        "<=" => ord != Ordering::Greater,
        ">=" => ord != Ordering::Less,
        _ => return Err(ExcelError::new(ExcelErrorKind::Name)),
    };
    Ok(LiteralValue::Boolean(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_workbook::TestWorkbook;

    #[test]
    fn arithmetic_and_precedence() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=1+2*3"), LiteralValue::Number(7.0));
        assert_eq!(wb.eval("=(1+2)*3"), LiteralValue::Number(9.0));
        assert_eq!(wb.eval("=2^3^1"), LiteralValue::Number(8.0));
    }

    #[test]
    fn division_by_zero() {
        let wb = TestWorkbook::new();
        match wb.eval("=1/0") {
            LiteralValue::Error(e) => assert_eq!(e.kind, ExcelErrorKind::Div),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn power_domain_errors() {
        let wb = TestWorkbook::new();
        assert!(matches!(
            wb.eval("=0^0"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
        assert!(matches!(
            wb.eval("=(-8)^0.5"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Num
        ));
    }

    #[test]
    fn concat_coerces_display_forms() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=\"v=\"&2"), LiteralValue::Text("v=2".into()));
        assert_eq!(wb.eval("=TRUE&\"!\""), LiteralValue::Text("TRUE!".into()));
    }

    #[test]
    fn comparisons_are_case_insensitive_on_text() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=\"ABC\"=\"abc\""), LiteralValue::Boolean(true));
        assert_eq!(wb.eval("=\"a\"<\"B\""), LiteralValue::Boolean(true));
    }

    #[test]
    fn numbers_sort_below_text_and_logicals() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=99<\"a\""), LiteralValue::Boolean(true));
        assert_eq!(wb.eval("=\"z\"<TRUE"), LiteralValue::Boolean(true));
    }

    #[test]
    fn cell_references_resolve() {
        let wb = TestWorkbook::new()
            .with_cell_a1("A1", LiteralValue::Int(4))
            .with_cell_a1("B2", LiteralValue::Int(6));
        assert_eq!(wb.eval("=A1+B2"), LiteralValue::Number(10.0));
    }

    #[test]
    fn empty_cell_is_zero_in_arithmetic() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=Z99+1"), LiteralValue::Number(1.0));
    }

    #[test]
    fn range_evaluates_to_array() {
        let wb = TestWorkbook::new()
            .with_cell_a1("A1", LiteralValue::Int(1))
            .with_cell_a1("A2", LiteralValue::Int(2));
        match wb.eval("=A1:A2") {
            LiteralValue::Array(rows) => assert_eq!(rows.len(), 2),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn array_broadcasting_through_operators() {
        let wb = TestWorkbook::new()
            .with_cell_a1("A1", LiteralValue::Int(1))
            .with_cell_a1("A2", LiteralValue::Int(2));
        match wb.eval("=A1:A2*10") {
            LiteralValue::Array(rows) => {
                assert_eq!(rows[0][0], LiteralValue::Number(10.0));
                assert_eq!(rows[1][0], LiteralValue::Number(20.0));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn unknown_function_is_name_error() {
        let wb = TestWorkbook::new();
        assert!(matches!(
            wb.eval("=NOSUCHFN(1)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Name
        ));
    }

    #[test]
    fn unknown_name_is_name_error() {
        let wb = TestWorkbook::new();
        assert!(matches!(
            wb.eval("=not_a_name"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Name
        ));
    }

    #[test]
    fn error_values_flow_through_operators() {
        let wb = TestWorkbook::new();
        assert!(matches!(
            wb.eval("=#REF!+1"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Ref
        ));
    }

    #[test]
    fn percent_postfix() {
        let wb = TestWorkbook::new();
        assert_eq!(wb.eval("=200*50%"), LiteralValue::Number(100.0));
    }

    #[test]
    fn deep_lambda_recursion_hits_the_ceiling() {
        let wb = TestWorkbook::new();
        // Self-application pump: each invocation burns depth until #CALC!.
        let formula = "=LET(f,LAMBDA(g,n,IF(n<=0,0,g(g,n-1))),f(f,1000))";
        match wb.eval(formula) {
            LiteralValue::Error(e) => assert_eq!(e.kind, ExcelErrorKind::Calc),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn shallow_lambda_recursion_succeeds() {
        let wb = TestWorkbook::new();
        let formula = "=LET(f,LAMBDA(g,n,IF(n<=0,0,g(g,n-1))),f(f,10))";
        assert_eq!(wb.eval(formula), LiteralValue::Int(0));
    }

    #[test]
    fn inverted_range_is_ref_error() {
        let wb = TestWorkbook::new();
        assert!(matches!(
            wb.eval("=SUM(B3:A1)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Ref
        ));
    }
}
