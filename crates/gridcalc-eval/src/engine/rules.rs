use super::compiled::CompiledFormula;
use super::sheet::Style;
use crate::interpreter::cmp_values;
use crate::traits::EvaluationContext;
use gridcalc_common::{Address, LiteralValue};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::cmp::Ordering;

/// Comparison operator for value-based rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Between,
    NotBetween,
}

/// What a conditional-formatting rule tests.
#[derive(Debug, Clone)]
pub enum RuleCondition {
    /// Compare the cell value against one operand (two for the Between
    /// variants).
    CellIs {
        op: CompareOp,
        operands: Vec<LiteralValue>,
    },
    /// Evaluate a formula; a truthy result matches. Without an injected
    /// evaluator these rules never match.
    Formula { expression: String },
    /// Case-insensitive substring test on the displayed value.
    TextContains { fragment: String },
}

#[derive(Debug, Clone)]
pub struct CfRule {
    pub id: String,
    /// Lower numbers evaluate first; ties fall back to declaration order.
    pub priority: i32,
    pub stop_if_true: bool,
    pub condition: RuleCondition,
    pub style: Style,
}

/// Where a rule is being applied. Formula rules anchor their relative
/// references here.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub sheet: String,
    pub cell: Address,
}

/// Injected formula evaluation, keeping the rule engine decoupled from any
/// particular parser or workbook type.
pub trait RuleFormulaEvaluator {
    fn evaluate(&self, expression: &str, ctx: &RuleContext) -> LiteralValue;
}

/// The outcome of one `apply_rules` pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RuleMatch {
    pub style: Option<Style>,
    pub applied_rule_ids: Vec<String>,
}

/// Errors never satisfy a rule: a condition that evaluates to an error
/// value is treated as no-match, not as a truthy string.
fn is_match_value(v: &LiteralValue) -> bool {
    match v {
        LiteralValue::Error(_) => false,
        LiteralValue::Text(s) => !s.is_empty(),
        other => other.is_truthy().unwrap_or(false),
    }
}

fn condition_matches(
    value: &LiteralValue,
    condition: &RuleCondition,
    ctx: &RuleContext,
    evaluator: Option<&dyn RuleFormulaEvaluator>,
) -> bool {
    match condition {
        RuleCondition::CellIs { op, operands } => {
            if value.is_error() {
                return false;
            }
            let Some(first) = operands.first() else {
                return false;
            };
            let ord = cmp_values(value, first);
            match op {
                CompareOp::Equal => ord == Ordering::Equal,
                CompareOp::NotEqual => ord != Ordering::Equal,
                CompareOp::Greater => ord == Ordering::Greater,
                CompareOp::GreaterOrEqual => ord != Ordering::Less,
                CompareOp::Less => ord == Ordering::Less,
                CompareOp::LessOrEqual => ord != Ordering::Greater,
                CompareOp::Between | CompareOp::NotBetween => {
                    let Some(second) = operands.get(1) else {
                        return false;
                    };
                    let (lo, hi) = if cmp_values(first, second) == Ordering::Greater {
                        (second, first)
                    } else {
                        (first, second)
                    };
                    let inside = cmp_values(value, lo) != Ordering::Less
                        && cmp_values(value, hi) != Ordering::Greater;
                    (*op == CompareOp::Between) == inside
                }
            }
        }
        RuleCondition::Formula { expression } => match evaluator {
            Some(ev) => is_match_value(&ev.evaluate(expression, ctx)),
            None => false,
        },
        RuleCondition::TextContains { fragment } => {
            if value.is_error() || value.is_blank() {
                return false;
            }
            value
                .to_display_string()
                .to_lowercase()
                .contains(&fragment.to_lowercase())
        }
    }
}

/// Evaluate every rule against one cell value. Rules run in priority order
/// (ascending, declaration order breaking ties); each match contributes its
/// style, earlier matches winning contested attributes; a matching rule
/// with `stop_if_true` ends the pass.
pub fn apply_rules(
    value: &LiteralValue,
    rules: &[CfRule],
    ctx: &RuleContext,
    evaluator: Option<&dyn RuleFormulaEvaluator>,
) -> RuleMatch {
    let mut ordered: Vec<&CfRule> = rules.iter().collect();
    // Stable sort keeps declaration order within a priority.
    ordered.sort_by_key(|r| r.priority);

    let mut result = RuleMatch::default();
    for rule in ordered {
        if !condition_matches(value, &rule.condition, ctx, evaluator) {
            continue;
        }
        result.applied_rule_ids.push(rule.id.clone());
        result.style = Some(match result.style.take() {
            Some(acc) => acc.merged_over(&rule.style),
            None => rule.style.clone(),
        });
        if rule.stop_if_true {
            break;
        }
    }
    result
}

/// A `RuleFormulaEvaluator` backed by the interpreter: each distinct
/// expression is compiled once at its anchor and replayed per target cell.
pub struct CompiledRuleEvaluator<'a> {
    ctx: &'a dyn EvaluationContext,
    anchor: Address,
    cache: RefCell<FxHashMap<String, CompiledFormula>>,
}

impl<'a> CompiledRuleEvaluator<'a> {
    pub fn new(ctx: &'a dyn EvaluationContext, anchor: Address) -> Self {
        CompiledRuleEvaluator {
            ctx,
            anchor,
            cache: RefCell::new(FxHashMap::default()),
        }
    }
}

impl RuleFormulaEvaluator for CompiledRuleEvaluator<'_> {
    fn evaluate(&self, expression: &str, ctx: &RuleContext) -> LiteralValue {
        use std::collections::hash_map::Entry;
        let mut cache = self.cache.borrow_mut();
        let compiled = match cache.entry(expression.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => match CompiledFormula::compile(expression, self.anchor) {
                Ok(c) => v.insert(c),
                Err(e) => return LiteralValue::Error(e),
            },
        };
        compiled.evaluate_at(self.ctx, &ctx.sheet, ctx.cell)
    }
}
