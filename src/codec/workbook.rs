//! Multi-sheet workbook backend (.xlsx)
//!
//! One sheet per class; the sheet grid maps one-to-one onto a [`CellGrid`].
//! Cells are written as text, so the mapping is a plain string bijection;
//! numeric cells in hand-made workbooks are stringified on read.

use std::path::Path;

use calamine::{open_workbook, Data, Reader as CalamineReader, Xlsx};
use rust_xlsxwriter::Workbook;
use tracing::debug;

use super::{CellGrid, TableSet};
use crate::error::Result;

/// Read a workbook into a grid-of-tables
pub fn decode(path: &Path) -> Result<TableSet> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let mut tables = TableSet::default();

    let sheet_names = workbook.sheet_names().to_vec();
    for name in sheet_names {
        let range = workbook.worksheet_range(&name)?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        tables.push(CellGrid { name, rows });
    }
    debug!(grids = tables.grids.len(), path = %path.display(), "workbook decoded");
    Ok(tables)
}

/// Write a grid-of-tables as a workbook
pub fn encode(path: &Path, tables: &TableSet) -> Result<()> {
    let mut workbook = Workbook::new();
    for grid in &tables.grids {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&grid.name)?;
        for (r, row) in grid.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if !cell.is_empty() {
                    worksheet.write_string(r as u32, c as u16, cell)?;
                }
            }
        }
    }
    workbook.save(path)?;
    debug!(grids = tables.grids.len(), path = %path.display(), "workbook encoded");
    Ok(())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // integral floats come back from spreadsheets as "3.0"; render
            // them the way a text cell would hold them
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
