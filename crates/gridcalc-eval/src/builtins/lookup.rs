use super::register;
use crate::coercion::{to_int, to_logical};
use crate::function::Function;
use crate::interpreter::cmp_values;
use crate::traits::{ArgumentHandle, EvaluationContext};
use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::sync::Arc;

fn value_error(msg: &str) -> ExcelError {
    ExcelError::new(ExcelErrorKind::Value).with_message(msg)
}

fn na_error() -> ExcelError {
    ExcelError::new(ExcelErrorKind::Na)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PatToken {
    Star,
    Any,
    Lit(char),
    Exact(char),
}

/// Excel-style wildcard match: `*` spans any run, `?` one character, `~`
/// escapes the next metacharacter. The pattern is tokenized once and
/// matched with a single backtrack point per `*`, so runs of stars stay
/// linear in the text length instead of exploding combinatorially.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let mut pat = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' if pat.last() == Some(&PatToken::Star) => {}
            '*' => pat.push(PatToken::Star),
            '?' => pat.push(PatToken::Any),
            '~' => match chars.next() {
                Some(escaped) => pat.push(PatToken::Exact(escaped)),
                None => pat.push(PatToken::Lit('~')),
            },
            c => pat.push(PatToken::Lit(c)),
        }
    }
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    // Position after the most recent `*`, and the text index it last ate to.
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        let step = match pat.get(p) {
            Some(PatToken::Star) => {
                backtrack = Some((p + 1, t));
                p += 1;
                continue;
            }
            Some(PatToken::Any) => true,
            Some(PatToken::Exact(c)) => text[t] == *c,
            Some(PatToken::Lit(c)) => text[t].to_lowercase().eq(c.to_lowercase()),
            None => false,
        };
        if step {
            p += 1;
            t += 1;
        } else if let Some((resume, eaten)) = backtrack {
            // Let the star absorb one more character and retry.
            p = resume;
            t = eaten + 1;
            backtrack = Some((resume, eaten + 1));
        } else {
            return false;
        }
    }
    while pat.get(p) == Some(&PatToken::Star) {
        p += 1;
    }
    p == pat.len()
}

fn values_equal(a: &LiteralValue, b: &LiteralValue) -> bool {
    cmp_values(a, b) == Ordering::Equal
}

/// The axis a one-dimensional lookup vector runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Column,
    Row,
}

/// Flatten a value into a lookup vector, remembering its orientation.
/// Anything wider than one row and one column has no vector view.
fn as_vector(v: &LiteralValue) -> Result<(Vec<LiteralValue>, Axis), ExcelError> {
    match v {
        LiteralValue::Array(rows) => {
            if rows.len() == 1 {
                Ok((rows[0].clone(), Axis::Row))
            } else if rows.iter().all(|r| r.len() == 1) {
                Ok((rows.iter().map(|r| r[0].clone()).collect(), Axis::Column))
            } else {
                Err(value_error("Lookup array must be a single row or column"))
            }
        }
        LiteralValue::Error(e) => Err(e.clone()),
        scalar => Ok((vec![scalar.clone()], Axis::Column)),
    }
}

fn as_rows(v: &LiteralValue) -> Result<Vec<Vec<LiteralValue>>, ExcelError> {
    match v {
        LiteralValue::Array(rows) => Ok(rows.clone()),
        LiteralValue::Error(e) => Err(e.clone()),
        scalar => Ok(vec![vec![scalar.clone()]]),
    }
}

/// Shared XMATCH/XLOOKUP search. `match_mode`: 0 exact, -1 exact-or-next-
/// smaller, 1 exact-or-next-larger, 2 wildcard. `search_mode`: 1 forward,
/// -1 reverse, 2 binary over ascending data, -2 binary over descending.
fn find_index(
    needle: &LiteralValue,
    hay: &[LiteralValue],
    match_mode: i64,
    search_mode: i64,
) -> Result<Option<usize>, ExcelError> {
    if !matches!(match_mode, -1 | 0 | 1 | 2) || !matches!(search_mode, -2 | -1 | 1 | 2) {
        return Err(value_error("Unknown match or search mode"));
    }
    if match_mode == 2 {
        if search_mode.abs() == 2 {
            return Err(value_error("Wildcard match cannot use binary search"));
        }
        let pattern = match needle {
            LiteralValue::Text(p) => p,
            other => {
                // A pattern-less needle degrades to an exact scan.
                return find_index(other, hay, 0, search_mode);
            }
        };
        let hit = |v: &LiteralValue| {
            matches!(v, LiteralValue::Text(t) if wildcard_match(pattern, t))
        };
        return Ok(if search_mode == -1 {
            hay.iter().rposition(hit)
        } else {
            hay.iter().position(hit)
        });
    }

    if search_mode.abs() == 2 {
        let descending = search_mode == -2;
        // First index whose element is not before the needle in scan order.
        let start = hay.partition_point(|v| {
            let ord = cmp_values(v, needle);
            if descending { ord == Ordering::Greater } else { ord == Ordering::Less }
        });
        if start < hay.len() && values_equal(&hay[start], needle) {
            return Ok(Some(start));
        }
        return Ok(match (match_mode, descending) {
            (0, _) => None,
            // Largest value below the needle.
            (-1, false) => start.checked_sub(1),
            (-1, true) => (start < hay.len()).then_some(start),
            // Smallest value above the needle.
            (1, false) => (start < hay.len()).then_some(start),
            (1, true) => start.checked_sub(1),
            _ => None,
        });
    }

    let indices: Vec<usize> = if search_mode == -1 {
        (0..hay.len()).rev().collect()
    } else {
        (0..hay.len()).collect()
    };
    let mut best: Option<usize> = None;
    for i in indices {
        let ord = cmp_values(&hay[i], needle);
        if ord == Ordering::Equal {
            return Ok(Some(i));
        }
        let candidate = match match_mode {
            -1 => ord == Ordering::Less,
            1 => ord == Ordering::Greater,
            _ => false,
        };
        if candidate {
            let better = match best {
                None => true,
                Some(b) => {
                    let cur = cmp_values(&hay[i], &hay[b]);
                    if match_mode == -1 { cur == Ordering::Greater } else { cur == Ordering::Less }
                }
            };
            if better {
                best = Some(i);
            }
        }
    }
    Ok(best)
}

fn mode_arg(arg: Option<&ArgumentHandle>, default: i64) -> Result<i64, ExcelError> {
    match arg {
        Some(h) if !h.is_omitted() => to_int(&h.value()?),
        _ => Ok(default),
    }
}

pub struct XMatchFn;
impl Function for XMatchFn {
    fn name(&self) -> &'static str {
        "XMATCH"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(4)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let needle = args[0].value()?;
        let (hay, _) = as_vector(&args[1].value()?)?;
        let match_mode = mode_arg(args.get(2), 0)?;
        let search_mode = mode_arg(args.get(3), 1)?;
        match find_index(&needle, &hay, match_mode, search_mode)? {
            Some(i) => Ok(LiteralValue::Int(i as i64 + 1)),
            None => Err(na_error()),
        }
    }
}

pub struct XLookupFn;
impl Function for XLookupFn {
    fn name(&self) -> &'static str {
        "XLOOKUP"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn max_args(&self) -> Option<usize> {
        Some(6)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let needle = args[0].value()?;
        let (hay, axis) = as_vector(&args[1].value()?)?;
        let returns = as_rows(&args[2].value()?)?;
        let match_mode = mode_arg(args.get(4), 0)?;
        let search_mode = mode_arg(args.get(5), 1)?;

        match axis {
            Axis::Column => {
                if returns.len() != hay.len() {
                    return Err(value_error("Return array height must match lookup array"));
                }
            }
            Axis::Row => {
                if returns.iter().any(|r| r.len() != hay.len()) {
                    return Err(value_error("Return array width must match lookup array"));
                }
            }
        }

        let index = match find_index(&needle, &hay, match_mode, search_mode)? {
            Some(i) => i,
            None => {
                return match args.get(3) {
                    Some(h) if !h.is_omitted() => h.value(),
                    _ => Err(na_error()),
                };
            }
        };

        let slice: Vec<Vec<LiteralValue>> = match axis {
            Axis::Column => vec![returns[index].clone()],
            Axis::Row => returns.iter().map(|r| vec![r[index].clone()]).collect(),
        };
        if slice.len() == 1 && slice[0].len() == 1 {
            Ok(slice[0][0].clone())
        } else {
            Ok(LiteralValue::Array(slice))
        }
    }
}

pub struct FilterFn;
impl Function for FilterFn {
    fn name(&self) -> &'static str {
        "FILTER"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let data = as_rows(&args[0].value()?)?;
        let (include, axis) = as_vector(&args[1].value()?)?;

        let mut mask = Vec::with_capacity(include.len());
        for v in &include {
            mask.push(to_logical(v)?);
        }

        let kept: Vec<Vec<LiteralValue>> = match axis {
            Axis::Column => {
                if data.len() != mask.len() {
                    return Err(value_error("Include height must match the data"));
                }
                data.into_iter()
                    .zip(&mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(row, _)| row)
                    .collect()
            }
            Axis::Row => {
                if data.iter().any(|r| r.len() != mask.len()) {
                    return Err(value_error("Include width must match the data"));
                }
                let rows: Vec<Vec<LiteralValue>> = data
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .zip(&mask)
                            .filter(|(_, keep)| **keep)
                            .map(|(v, _)| v)
                            .collect()
                    })
                    .collect();
                if rows.first().is_some_and(|r| r.is_empty()) {
                    Vec::new()
                } else {
                    rows
                }
            }
        };

        if kept.is_empty() {
            return match args.get(2) {
                Some(h) if !h.is_omitted() => h.value(),
                _ => Err(ExcelError::new(ExcelErrorKind::Calc)
                    .with_message("FILTER produced no rows")),
            };
        }
        Ok(LiteralValue::Array(kept))
    }
}

pub struct SortFn;
impl Function for SortFn {
    fn name(&self) -> &'static str {
        "SORT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(4)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let mut rows = as_rows(&args[0].value()?)?;
        let sort_index = mode_arg(args.get(1), 1)?;
        let sort_order = mode_arg(args.get(2), 1)?;
        let by_col = match args.get(3) {
            Some(h) if !h.is_omitted() => to_logical(&h.value()?)?,
            _ => false,
        };
        if !matches!(sort_order, 1 | -1) {
            return Err(value_error("Sort order must be 1 or -1"));
        }
        if by_col {
            rows = transpose(rows);
        }
        let key = sort_index - 1;
        if key < 0 || rows.iter().any(|r| (r.len() as i64) <= key) {
            return Err(value_error("Sort index outside the array"));
        }
        let key = key as usize;
        rows.sort_by(|a, b| {
            let ord = cmp_values(&a[key], &b[key]);
            if sort_order == -1 { ord.reverse() } else { ord }
        });
        if by_col {
            rows = transpose(rows);
        }
        Ok(LiteralValue::Array(rows))
    }
}

fn transpose(rows: Vec<Vec<LiteralValue>>) -> Vec<Vec<LiteralValue>> {
    let height = rows.len();
    let width = rows.first().map_or(0, |r| r.len());
    let mut out = vec![Vec::with_capacity(height); width];
    for row in rows {
        for (c, v) in row.into_iter().enumerate() {
            out[c].push(v);
        }
    }
    out
}

pub struct UniqueFn;
impl Function for UniqueFn {
    fn name(&self) -> &'static str {
        "UNIQUE"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
    fn eval(
        &self,
        args: &[ArgumentHandle],
        _ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError> {
        let mut rows = as_rows(&args[0].value()?)?;
        let by_col = match args.get(1) {
            Some(h) if !h.is_omitted() => to_logical(&h.value()?)?,
            _ => false,
        };
        let exactly_once = match args.get(2) {
            Some(h) if !h.is_omitted() => to_logical(&h.value()?)?,
            _ => false,
        };
        if by_col {
            rows = transpose(rows);
        }
        let rows_equal = |a: &[LiteralValue], b: &[LiteralValue]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        };
        let mut kept: Vec<Vec<LiteralValue>> = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let count = rows.iter().filter(|r| rows_equal(row, r)).count();
            let first = rows[..i].iter().all(|r| !rows_equal(row, r));
            if first && (!exactly_once || count == 1) {
                kept.push(row.clone());
            }
        }
        if kept.is_empty() {
            return Err(ExcelError::new(ExcelErrorKind::Calc)
                .with_message("UNIQUE produced no rows"));
        }
        if by_col {
            kept = transpose(kept);
        }
        Ok(LiteralValue::Array(kept))
    }
}

pub(crate) fn register_builtins(map: &mut FxHashMap<&'static str, Arc<dyn Function>>) {
    register!(map, XMatchFn, XLookupFn, FilterFn, SortFn, UniqueFn);
}

#[cfg(test)]
mod tests {
    use super::wildcard_match;
    use crate::test_workbook::TestWorkbook;
    use gridcalc_common::{ExcelErrorKind, LiteralValue};

    fn fruit_wb() -> TestWorkbook {
        TestWorkbook::new()
            .with_column(
                "A1",
                &[
                    LiteralValue::Text("apple".into()),
                    LiteralValue::Text("banana".into()),
                    LiteralValue::Text("cherry".into()),
                ],
            )
            .with_column(
                "B1",
                &[
                    LiteralValue::Int(10),
                    LiteralValue::Int(20),
                    LiteralValue::Int(30),
                ],
            )
    }

    #[test]
    fn wildcard_patterns() {
        assert!(wildcard_match("b*na", "banana"));
        assert!(wildcard_match("?at", "cat"));
        assert!(!wildcard_match("?at", "flat"));
        assert!(wildcard_match("100~*", "100*"));
        assert!(!wildcard_match("100~*", "1000"));
        assert!(wildcard_match("CHER*", "cherry"));
        assert!(wildcard_match("a*", "a"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("?", ""));
    }

    #[test]
    fn wildcard_star_runs_do_not_blow_up() {
        // Star-heavy patterns over repetitive text must stay cheap; the
        // backtracking matcher handles this in linear passes.
        let text = "a".repeat(200);
        assert!(!wildcard_match("*a*a*a*a*a*a*a*a*b", &text));
        assert!(wildcard_match("*a*a*a*a*a*a*a*a*", &text));
        assert!(wildcard_match("**a**", "xay"));
        assert!(wildcard_match("*a?a*b", "xxaxab"));
    }

    #[test]
    fn xlookup_exact_and_default() {
        let wb = fruit_wb();
        assert_eq!(wb.eval("=XLOOKUP(\"banana\",A1:A3,B1:B3)"), LiteralValue::Int(20));
        assert!(matches!(
            wb.eval("=XLOOKUP(\"kiwi\",A1:A3,B1:B3)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Na
        ));
        assert_eq!(
            wb.eval("=XLOOKUP(\"kiwi\",A1:A3,B1:B3,\"none\")"),
            LiteralValue::Text("none".into())
        );
    }

    #[test]
    fn xlookup_approximate_modes() {
        let wb = fruit_wb();
        // 25 sits between 20 and 30.
        assert_eq!(wb.eval("=XLOOKUP(25,B1:B3,A1:A3,,-1)"), LiteralValue::Text("banana".into()));
        assert_eq!(wb.eval("=XLOOKUP(25,B1:B3,A1:A3,,1)"), LiteralValue::Text("cherry".into()));
        assert!(matches!(
            wb.eval("=XLOOKUP(5,B1:B3,A1:A3,,-1)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Na
        ));
    }

    #[test]
    fn xlookup_wildcard_and_reverse() {
        let wb = fruit_wb()
            .with_cell_a1("C1", LiteralValue::Text("x".into()))
            .with_cell_a1("C2", LiteralValue::Text("x".into()));
        assert_eq!(wb.eval("=XLOOKUP(\"b*\",A1:A3,B1:B3,,2)"), LiteralValue::Int(20));
        // Reverse search finds the later duplicate.
        assert_eq!(wb.eval("=XMATCH(\"x\",C1:C2,0,-1)"), LiteralValue::Int(2));
        assert_eq!(wb.eval("=XMATCH(\"x\",C1:C2)"), LiteralValue::Int(1));
    }

    #[test]
    fn xmatch_binary_modes() {
        let wb = TestWorkbook::new()
            .with_column(
                "A1",
                &[
                    LiteralValue::Int(10),
                    LiteralValue::Int(20),
                    LiteralValue::Int(30),
                    LiteralValue::Int(40),
                ],
            )
            .with_column(
                "B1",
                &[
                    LiteralValue::Int(40),
                    LiteralValue::Int(30),
                    LiteralValue::Int(20),
                    LiteralValue::Int(10),
                ],
            );
        assert_eq!(wb.eval("=XMATCH(30,A1:A4,0,2)"), LiteralValue::Int(3));
        assert_eq!(wb.eval("=XMATCH(25,A1:A4,-1,2)"), LiteralValue::Int(2));
        assert_eq!(wb.eval("=XMATCH(25,A1:A4,1,2)"), LiteralValue::Int(3));
        assert_eq!(wb.eval("=XMATCH(30,B1:B4,0,-2)"), LiteralValue::Int(2));
        assert_eq!(wb.eval("=XMATCH(25,B1:B4,-1,-2)"), LiteralValue::Int(3));
        assert_eq!(wb.eval("=XMATCH(25,B1:B4,1,-2)"), LiteralValue::Int(2));
    }

    #[test]
    fn xlookup_shape_mismatch() {
        let wb = fruit_wb();
        assert!(matches!(
            wb.eval("=XLOOKUP(\"apple\",A1:A3,B1:B2)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Value
        ));
    }

    #[test]
    fn filter_rows_and_fallback() {
        let wb = fruit_wb();
        match wb.eval("=FILTER(A1:B3,B1:B3>15)") {
            LiteralValue::Array(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0][0], LiteralValue::Text("banana".into()));
                assert_eq!(rows[1][1], LiteralValue::Int(30));
            }
            other => panic!("{other:?}"),
        }
        assert_eq!(
            wb.eval("=FILTER(A1:B3,B1:B3>99,\"empty\")"),
            LiteralValue::Text("empty".into())
        );
        assert!(matches!(
            wb.eval("=FILTER(A1:B3,B1:B3>99)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Calc
        ));
    }

    #[test]
    fn sort_by_column_descending() {
        let wb = fruit_wb();
        match wb.eval("=SORT(A1:B3,2,-1)") {
            LiteralValue::Array(rows) => {
                assert_eq!(rows[0][0], LiteralValue::Text("cherry".into()));
                assert_eq!(rows[2][0], LiteralValue::Text("apple".into()));
            }
            other => panic!("{other:?}"),
        }
        assert!(matches!(
            wb.eval("=SORT(A1:B3,5)"),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Value
        ));
    }

    #[test]
    fn unique_rows() {
        let wb = TestWorkbook::new().with_column(
            "A1",
            &[
                LiteralValue::Int(1),
                LiteralValue::Int(2),
                LiteralValue::Int(1),
                LiteralValue::Int(3),
            ],
        );
        match wb.eval("=UNIQUE(A1:A4)") {
            LiteralValue::Array(rows) => {
                let flat: Vec<_> = rows.iter().map(|r| r[0].clone()).collect();
                assert_eq!(
                    flat,
                    vec![LiteralValue::Int(1), LiteralValue::Int(2), LiteralValue::Int(3)]
                );
            }
            other => panic!("{other:?}"),
        }
        match wb.eval("=UNIQUE(A1:A4,FALSE,TRUE)") {
            LiteralValue::Array(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0][0], LiteralValue::Int(2));
            }
            other => panic!("{other:?}"),
        }
    }
}
