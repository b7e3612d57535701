//! Worksheet storage and the machinery layered on top of it: spilled
//! arrays, compiled formulas, the dependency graph and conditional
//! formatting rules.

pub mod compiled;
pub mod graph;
pub mod rules;
pub mod sheet;
pub mod spill;

pub use compiled::{CompiledFormula, ReferenceDescriptor};
pub use graph::{cell_key, DependencyGraph};
pub use rules::{
    apply_rules, CfRule, CompareOp, CompiledRuleEvaluator, RuleCondition, RuleContext,
    RuleFormulaEvaluator, RuleMatch,
};
pub use sheet::{Cell, Style, Workbook, Worksheet, DEFAULT_COLUMN_WIDTH};
pub use spill::{apply_spill, clear_spill, spilled_range};
