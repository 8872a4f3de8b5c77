//! Delimited backends: directory of one file per class, and a single file
//! holding one block per class
//!
//! Both use the same row layout as every other encoding. In the multi-block
//! form each class block is introduced by a marker row whose first cell is
//! the configured block marker followed by the class name; the marker
//! prefix survives both comma and tab delimiters without quoting.

use std::fs;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use super::{CellGrid, TableSet};
use crate::config::CodecConfig;
use crate::error::Result;

fn extension_for(delimiter: u8) -> &'static str {
    if delimiter == b'\t' {
        "tsv"
    } else {
        "csv"
    }
}

fn read_rows(path: &Path, delimiter: u8) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }
    Ok(rows)
}

fn write_rows(path: &Path, rows: &[Vec<String>], delimiter: u8) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)?;
    for row in rows {
        if row.is_empty() {
            writer.write_record([""])?;
        } else {
            writer.write_record(row)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read a directory of one delimited file per class
pub fn decode_dir(path: &Path, delimiter: u8) -> Result<TableSet> {
    let extension = extension_for(delimiter);
    let mut tables = TableSet::default();

    let mut files: Vec<_> = WalkDir::new(path)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x == extension)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();

    for file in files {
        let name = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let rows = read_rows(&file, delimiter)?;
        tables.push(CellGrid { name, rows });
    }
    debug!(grids = tables.grids.len(), path = %path.display(), "directory decoded");
    Ok(tables)
}

/// Write a directory of one delimited file per class
pub fn encode_dir(path: &Path, tables: &TableSet, delimiter: u8) -> Result<()> {
    fs::create_dir_all(path)?;
    let extension = extension_for(delimiter);
    for grid in &tables.grids {
        let file = path.join(format!("{}.{}", grid.name, extension));
        write_rows(&file, &grid.rows, delimiter)?;
    }
    debug!(grids = tables.grids.len(), path = %path.display(), "directory encoded");
    Ok(())
}

/// Read a single delimited file holding one block per class
pub fn decode_blocks(path: &Path, delimiter: u8, config: &CodecConfig) -> Result<TableSet> {
    let rows = read_rows(path, delimiter)?;
    let marker = config.block_marker.trim_end();

    let mut tables = TableSet::default();
    let mut current: Option<CellGrid> = None;
    for row in rows {
        let first = row.first().map(|c| c.trim()).unwrap_or("");
        if let Some(name) = first.strip_prefix(marker) {
            if let Some(grid) = current.take() {
                tables.push(grid);
            }
            current = Some(CellGrid::new(name.trim()));
            continue;
        }
        if let Some(grid) = current.as_mut() {
            // blank separator rows between blocks carry no data
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            grid.rows.push(row);
        }
    }
    if let Some(grid) = current.take() {
        tables.push(grid);
    }
    debug!(grids = tables.grids.len(), path = %path.display(), "blocks decoded");
    Ok(tables)
}

/// Write a single delimited file holding one block per class
pub fn encode_blocks(
    path: &Path,
    tables: &TableSet,
    delimiter: u8,
    config: &CodecConfig,
) -> Result<()> {
    let marker = config.block_marker.trim_end();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for grid in &tables.grids {
        rows.push(vec![format!("{} {}", marker, grid.name)]);
        rows.extend(grid.rows.iter().cloned());
        rows.push(vec![String::new()]);
    }
    write_rows(path, &rows, delimiter)?;
    debug!(grids = tables.grids.len(), path = %path.display(), "blocks encoded");
    Ok(())
}
