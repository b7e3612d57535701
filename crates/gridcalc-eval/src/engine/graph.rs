use gridcalc_common::{Address, LiteralValue, RangeAddr};
use rustc_hash::{FxHashMap, FxHashSet};

/// Canonical cell key used for graph edges, `SHEET!A1`.
pub fn cell_key(sheet: &str, addr: Address) -> String {
    format!("{}!{}", sheet.to_ascii_uppercase(), addr.to_a1())
}

#[derive(Debug, Default)]
struct CellNode {
    rules: FxHashSet<String>,
    formulas: FxHashSet<String>,
}

#[derive(Debug, Default)]
struct FormulaNode {
    reads: FxHashSet<String>,
    rules: FxHashSet<String>,
}

#[derive(Debug)]
struct RuleNode {
    cells: FxHashSet<String>,
    formulas: FxHashSet<String>,
    stats: FxHashSet<String>,
    dirty: bool,
    declared: u64,
}

#[derive(Debug)]
struct RangeStatNode {
    sheet: String,
    range: RangeAddr,
    cached: Option<LiteralValue>,
    dirty: bool,
    rules: FxHashSet<String>,
}

/// Id-based dependency arena: cells, formulas, conditional rules and cached
/// range statistics, with dirty tracking driven by cell edits. All edges are
/// string ids; nothing here aliases cell storage.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    cells: FxHashMap<String, CellNode>,
    formulas: FxHashMap<String, FormulaNode>,
    rules: FxHashMap<String, RuleNode>,
    stats: FxHashMap<String, RangeStatNode>,
    declaration_counter: u64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Register a formula node and the cells it reads. Replacing an existing
    /// formula relinks its reads; rules depending on it are kept.
    pub fn add_formula(&mut self, id: &str, reads: &[String]) {
        if let Some(old) = self.formulas.get(id) {
            for key in old.reads.clone() {
                if let Some(cell) = self.cells.get_mut(&key) {
                    cell.formulas.remove(id);
                }
                self.prune_cell(&key);
            }
        }
        let node = self.formulas.entry(id.to_string()).or_default();
        node.reads = reads.iter().cloned().collect();
        for key in reads {
            self.cells
                .entry(key.clone())
                .or_default()
                .formulas
                .insert(id.to_string());
        }
    }

    /// Register a range-statistic node. The cache starts cold.
    pub fn add_range_stat(&mut self, id: &str, sheet: &str, range: RangeAddr) {
        self.stats.insert(
            id.to_string(),
            RangeStatNode {
                sheet: sheet.to_ascii_uppercase(),
                range,
                cached: None,
                dirty: true,
                rules: FxHashSet::default(),
            },
        );
    }

    pub fn set_stat_cache(&mut self, id: &str, value: LiteralValue) {
        if let Some(stat) = self.stats.get_mut(id) {
            stat.cached = Some(value);
            stat.dirty = false;
        }
    }

    pub fn get_stat_cache(&self, id: &str) -> Option<&LiteralValue> {
        let stat = self.stats.get(id)?;
        if stat.dirty { None } else { stat.cached.as_ref() }
    }

    /// Add or replace a rule. The old edges are unlinked first so nothing
    /// stale accumulates, and the rule always starts dirty.
    pub fn add_rule(
        &mut self,
        id: &str,
        cells: &[String],
        formulas: &[String],
        stats: &[String],
    ) {
        let declared = match self.rules.get(id) {
            Some(old) => old.declared,
            None => {
                self.declaration_counter += 1;
                self.declaration_counter
            }
        };
        self.unlink_rule(id);
        for key in cells {
            self.cells
                .entry(key.clone())
                .or_default()
                .rules
                .insert(id.to_string());
        }
        for fid in formulas {
            self.formulas
                .entry(fid.clone())
                .or_default()
                .rules
                .insert(id.to_string());
        }
        for sid in stats {
            if let Some(stat) = self.stats.get_mut(sid) {
                stat.rules.insert(id.to_string());
            }
        }
        self.rules.insert(
            id.to_string(),
            RuleNode {
                cells: cells.iter().cloned().collect(),
                formulas: formulas.iter().cloned().collect(),
                stats: stats.iter().cloned().collect(),
                dirty: true,
                declared,
            },
        );
    }

    /// Remove a rule and garbage-collect range-stat nodes it was the last
    /// reader of.
    pub fn remove_rule(&mut self, id: &str) {
        self.unlink_rule(id);
        self.rules.remove(id);
    }

    fn unlink_rule(&mut self, id: &str) {
        let Some(old) = self.rules.get(id) else {
            return;
        };
        let cells = old.cells.clone();
        let formulas = old.formulas.clone();
        let stats = old.stats.clone();
        for key in cells {
            if let Some(cell) = self.cells.get_mut(&key) {
                cell.rules.remove(id);
            }
            self.prune_cell(&key);
        }
        for fid in formulas {
            if let Some(f) = self.formulas.get_mut(&fid) {
                f.rules.remove(id);
            }
        }
        for sid in stats {
            let unreferenced = match self.stats.get_mut(&sid) {
                Some(stat) => {
                    stat.rules.remove(id);
                    stat.rules.is_empty()
                }
                None => false,
            };
            if unreferenced {
                self.stats.remove(&sid);
            }
        }
    }

    fn prune_cell(&mut self, key: &str) {
        if self
            .cells
            .get(key)
            .is_some_and(|c| c.rules.is_empty() && c.formulas.is_empty())
        {
            self.cells.remove(key);
        }
    }

    /// A cell changed. Directly dependent rules go dirty; range statistics
    /// covering the cell lose their cache and dirty their readers; rules
    /// reached through a dependent formula go dirty too (two-hop).
    pub fn mark_cell_dirty(&mut self, sheet: &str, addr: Address) {
        let key = cell_key(sheet, addr);
        let mut dirty_rules: FxHashSet<String> = FxHashSet::default();

        if let Some(cell) = self.cells.get(&key) {
            dirty_rules.extend(cell.rules.iter().cloned());
            for fid in &cell.formulas {
                if let Some(f) = self.formulas.get(fid) {
                    dirty_rules.extend(f.rules.iter().cloned());
                }
            }
        }

        let sheet_upper = sheet.to_ascii_uppercase();
        for stat in self.stats.values_mut() {
            if stat.sheet == sheet_upper && stat.range.contains(addr) {
                stat.cached = None;
                stat.dirty = true;
                dirty_rules.extend(stat.rules.iter().cloned());
            }
        }

        for rid in &dirty_rules {
            if let Some(rule) = self.rules.get_mut(rid) {
                rule.dirty = true;
                // A dirty rule must not reuse statistics cached before the
                // edit, even ones whose range missed the changed cell.
                for sid in rule.stats.clone() {
                    if let Some(stat) = self.stats.get_mut(&sid) {
                        stat.cached = None;
                        stat.dirty = true;
                    }
                }
            }
        }
    }

    /// Dirty rule ids in declaration order.
    pub fn dirty_rules(&self) -> Vec<String> {
        let mut out: Vec<(&u64, &String)> = self
            .rules
            .iter()
            .filter(|(_, r)| r.dirty)
            .map(|(id, r)| (&r.declared, id))
            .collect();
        out.sort();
        out.into_iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn dirty_range_stats(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .stats
            .iter()
            .filter(|(_, s)| s.dirty)
            .map(|(id, _)| id.clone())
            .collect();
        out.sort();
        out
    }

    pub fn clear_rule_dirty(&mut self, id: &str) {
        if let Some(rule) = self.rules.get_mut(id) {
            rule.dirty = false;
        }
    }

    pub fn clear_range_stat_dirty(&mut self, id: &str) {
        if let Some(stat) = self.stats.get_mut(id) {
            stat.dirty = false;
        }
    }

    pub fn has_rule(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    pub fn has_range_stat(&self, id: &str) -> bool {
        self.stats.contains_key(id)
    }
}
