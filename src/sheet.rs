//! Spreadsheet plumbing shared by the loaders, the store and the writer.
//!
//! Everything tabular in the pipeline passes through [`SheetTable`]: a header
//! row plus untyped data rows read via calamine. Writing goes through
//! rust_xlsxwriter with an atomic temp-file + rename discipline so a crashed
//! run never leaves a half-written classification file behind.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

/// A spreadsheet cell reduced to the value kinds the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Text content, trimmed. Numbers are not stringified here.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.trim()),
            _ => None,
        }
    }

    /// Coerce to a non-negative integer. Accepts integral floats and numeric
    /// text; anything else is `None` rather than an error, because partial
    /// result rows are expected input.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Cell::Number(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as u32),
            Cell::Text(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        }
    }

    /// Render the cell the way it should appear in an output sheet.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(f) if f.fract() == 0.0 => format!("{}", *f as i64),
            Cell::Number(f) => format!("{}", f),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Text(b.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// An in-memory sheet: one header row plus data rows.
///
/// Rows may be ragged; [`SheetTable::cell`] treats out-of-range as empty.
#[derive(Debug, Clone, Default)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Index of a column by exact header name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column by normalized (trimmed, lowercased) header name.
    pub fn column_normalized(&self, name: &str) -> Option<usize> {
        let want = normalize_header(name);
        self.headers
            .iter()
            .position(|h| normalize_header(h) == want)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

/// Trim and lowercase a header for case/whitespace-insensitive matching.
pub fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Week-column naming convention per sheet family.
///
/// Individual sheets name week columns by the bare week number (`"3"`);
/// team sheets append a `T` suffix (`"3T"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekStyle {
    Plain,
    TeamSuffix,
}

lazy_static! {
    static ref TEAM_WEEK_RE: Regex = Regex::new(r"^(\d+)T$").unwrap();
}

impl WeekStyle {
    /// Parse a header into a week number, if it names a week column.
    pub fn parse(&self, header: &str) -> Option<u32> {
        let header = header.trim();
        match self {
            WeekStyle::Plain => {
                if !header.is_empty() && header.chars().all(|c| c.is_ascii_digit()) {
                    header.parse().ok()
                } else {
                    None
                }
            }
            WeekStyle::TeamSuffix => TEAM_WEEK_RE
                .captures(header)
                .and_then(|c| c[1].parse().ok()),
        }
    }

    pub fn format(&self, week: u32) -> String {
        match self {
            WeekStyle::Plain => week.to_string(),
            WeekStyle::TeamSuffix => format!("{week}T"),
        }
    }
}

/// Sheet names present in a workbook file.
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    Ok(workbook.sheet_names().to_vec())
}

/// Read one sheet with the first row as header.
pub fn read_sheet(path: &Path, sheet: &str) -> Result<SheetTable> {
    read_sheet_with_header(path, sheet, 0)
}

/// Read one sheet, taking `header_row` (0-based, absolute sheet row) as the
/// header and everything below it as data. Rows above the header are
/// discarded.
pub fn read_sheet_with_header(path: &Path, sheet: &str, header_row: usize) -> Result<SheetTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("Sheet '{}' not found in {}", sheet, path.display()))?;

    // The range starts at the first used cell, so when leading banner rows
    // are entirely blank the iterator begins below sheet row 0. Anchor the
    // skip to absolute rows to keep a fixed header offset meaningful.
    let start_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range.rows().skip(header_row.saturating_sub(start_row));
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|d| Cell::from(d).display()).collect(),
        None => Vec::new(),
    };

    let mut table = SheetTable::new(headers);
    for row in rows {
        let cells: Vec<Cell> = row.iter().map(Cell::from).collect();
        // Fully blank trailing rows carry no information.
        if cells.iter().all(Cell::is_empty) {
            continue;
        }
        table.rows.push(cells);
    }
    Ok(table)
}

/// Read every sheet of a workbook, preserving sheet order.
pub fn read_all_sheets(path: &Path) -> Result<Vec<(String, SheetTable)>> {
    let names = sheet_names(path)?;
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let table = read_sheet(path, &name)?;
        sheets.push((name, table));
    }
    Ok(sheets)
}

/// Save a workbook atomically: write to a temp path in the same directory,
/// then rename over the target only on success.
pub fn atomic_save(workbook: &mut rust_xlsxwriter::Workbook, path: &Path) -> Result<()> {
    let tmp = temp_path(path);
    workbook
        .save(&tmp)
        .with_context(|| format!("Failed to write workbook {}", tmp.display()))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err).with_context(|| format!("Failed to move {} into place", path.display()));
    }
    Ok(())
}

fn temp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook.xlsx".to_string());
    name.push_str(".tmp");
    path.with_file_name(name)
}
