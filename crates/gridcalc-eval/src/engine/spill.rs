use super::sheet::Worksheet;
use gridcalc_common::{Address, ExcelError, LiteralValue, RangeAddr, MAX_COL, MAX_ROW};

/// Write an array result anchored at `anchor`. Any previous spill from the
/// same anchor is cleared first, so re-evaluation is idempotent. A blocking
/// cell anywhere in the target rectangle stores `#SPILL!` in the anchor and
/// writes nothing else.
pub fn apply_spill(
    ws: &mut Worksheet,
    anchor: Address,
    rows: &[Vec<LiteralValue>],
) -> Result<(), ExcelError> {
    clear_spill(ws, anchor);

    let height = rows.len().max(1) as u32;
    let width = rows.first().map_or(1, |r| r.len().max(1)) as u32;
    let end = Address::new(anchor.row + height - 1, anchor.col + width - 1);

    let blocked = if end.row > MAX_ROW || end.col > MAX_COL {
        true
    } else {
        let mut hit = false;
        for r in anchor.row..=end.row {
            for c in anchor.col..=end.col {
                let addr = Address::new(r, c);
                if addr == anchor {
                    continue;
                }
                if let Some(cell) = ws.get_cell(addr) {
                    let foreign_member =
                        cell.spilled_from.is_some_and(|a| a != anchor);
                    if !cell.value.is_blank() || cell.formula.is_some() || foreign_member {
                        hit = true;
                    }
                }
            }
        }
        hit
    };

    if blocked {
        let err = ExcelError::new_spill(height, width);
        ws.cell_mut(anchor).value = LiteralValue::Error(err.clone());
        return Err(err);
    }

    for (dr, row) in rows.iter().enumerate() {
        for (dc, value) in row.iter().enumerate() {
            let addr = Address::new(anchor.row + dr as u32, anchor.col + dc as u32);
            let cell = ws.cell_mut(addr);
            cell.value = value.clone();
            if addr != anchor {
                cell.spilled_from = Some(anchor);
            }
        }
    }
    let range = RangeAddr::new(anchor, end)
        .unwrap_or_else(|| RangeAddr::single(anchor));
    ws.cell_mut(anchor).spill = Some(range);
    Ok(())
}

/// Remove the spill anchored at `anchor`: member values and back-references
/// go, then the anchor's own metadata. Anchors without a spill are a no-op.
pub fn clear_spill(ws: &mut Worksheet, anchor: Address) {
    let Some(range) = ws.get_cell(anchor).and_then(|c| c.spill) else {
        return;
    };
    for addr in range.iter() {
        if addr == anchor {
            continue;
        }
        if ws
            .get_cell(addr)
            .is_some_and(|c| c.spilled_from == Some(anchor))
        {
            ws.cell_mut(addr).spilled_from = None;
            ws.set_cell_value(addr, LiteralValue::Empty);
        }
    }
    ws.cell_mut(anchor).spill = None;
}

/// The spilled rectangle read live from the grid. Members hold no copy of
/// the array, so edits cannot drift out of sync with the anchor.
pub fn spilled_range(ws: &Worksheet, anchor: Address) -> Option<Vec<Vec<LiteralValue>>> {
    let range = ws.get_cell(anchor)?.spill?;
    let mut rows = Vec::with_capacity(range.rows() as usize);
    for r in range.start.row..=range.end.row {
        let mut row = Vec::with_capacity(range.cols() as usize);
        for c in range.start.col..=range.end.col {
            row.push(ws.get_cell_value(Address::new(r, c)));
        }
        rows.push(row);
    }
    Some(rows)
}
