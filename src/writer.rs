//! Styled spreadsheet output.
//!
//! Sheets are written whole-workbook at a time (xlsx cannot be patched in
//! place): replacing one sheet means reading the others back and rewriting
//! the file, atomically. Cell fills follow the house conventions: rows of
//! the anchor category in pink, early week columns green, later ones blue.

use crate::sheet::{self, Cell, SheetTable, WeekStyle};
use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::{Path, PathBuf};

const ANCHOR_ROW_COLOR: &str = "#FFC0CB"; // pink
const EARLY_WEEK_COLOR: &str = "#C6EFCE"; // light green
const LATE_WEEK_COLOR: &str = "#BDD7EE"; // light blue

/// Week columns up to this number get the early-season color.
const EARLY_WEEK_LIMIT: u32 = 4;

/// Fill rules for one sheet.
#[derive(Debug, Clone, Default)]
pub struct SheetStyle {
    /// Rows whose category column equals this value are filled pink.
    pub highlight_category: Option<String>,
    /// Which headers count as week columns for the green/blue fills.
    pub week_columns: Option<WeekStyle>,
}

impl SheetStyle {
    /// House style of the individual classification sheets.
    pub fn individual(anchor_category: &str) -> Self {
        Self {
            highlight_category: Some(anchor_category.to_string()),
            week_columns: Some(WeekStyle::Plain),
        }
    }

    /// Team sheets carry no fills.
    pub fn plain() -> Self {
        Self::default()
    }
}

/// Write `table` as `sheet_name` into the workbook at `path`, replacing the
/// sheet if present and preserving every other sheet. The file is created
/// when missing.
pub fn write_sheet(path: &Path, sheet_name: &str, table: &SheetTable, style: &SheetStyle) -> Result<()> {
    let mut sheets: Vec<(String, SheetTable)> = if path.is_file() {
        sheet::read_all_sheets(path)
            .with_context(|| format!("Failed to re-read {}", path.display()))?
    } else {
        Vec::new()
    };

    match sheets.iter_mut().find(|(name, _)| name == sheet_name) {
        Some((_, existing)) => *existing = table.clone(),
        None => sheets.push((sheet_name.to_string(), table.clone())),
    }

    // Re-written sheets lose their fills on a raw roundtrip; the pipeline
    // rewrites every sheet it owns each run, so the others stay plain.
    let plain = SheetStyle::plain();
    let mut workbook = Workbook::new();
    for (name, sheet_table) in &sheets {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(name)
            .with_context(|| format!("Invalid sheet name '{name}'"))?;
        let sheet_style = if name == sheet_name { style } else { &plain };
        fill_worksheet(worksheet, sheet_table, sheet_style)?;
    }

    sheet::atomic_save(&mut workbook, path)
}

/// Write a set of sheets without any styling (used when a workbook must be
/// rewritten structurally, e.g. to add an empty sheet).
pub fn write_plain_sheets(path: &Path, sheets: &[(String, SheetTable)]) -> Result<()> {
    let mut workbook = Workbook::new();
    for (name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(name)
            .with_context(|| format!("Invalid sheet name '{name}'"))?;
        fill_worksheet(worksheet, table, &SheetStyle::plain())?;
    }
    sheet::atomic_save(&mut workbook, path)
}

/// One source sheet of the combined distribution workbook.
#[derive(Debug, Clone)]
pub struct CombineSource {
    pub path: PathBuf,
    pub sheet: String,
    pub style: SheetStyle,
}

/// Merge per-variant sheets from separate files into one workbook for
/// distribution, reapplying each sheet's fills.
pub fn combine_workbooks(sources: &[CombineSource], output: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    for source in sources {
        let table = sheet::read_sheet(&source.path, &source.sheet).with_context(|| {
            format!(
                "Failed to read sheet '{}' from {}",
                source.sheet,
                source.path.display()
            )
        })?;
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&source.sheet)
            .with_context(|| format!("Invalid sheet name '{}'", source.sheet))?;
        fill_worksheet(worksheet, &table, &source.style)?;
    }
    sheet::atomic_save(&mut workbook, output)?;
    log::info!(
        "combined {} sheets into {}",
        sources.len(),
        output.display()
    );
    Ok(())
}

fn fill_worksheet(worksheet: &mut Worksheet, table: &SheetTable, style: &SheetStyle) -> Result<()> {
    let header_fmt = Format::new().set_bold();
    let anchor_fmt = Format::new().set_background_color(ANCHOR_ROW_COLOR);
    let early_fmt = Format::new().set_background_color(EARLY_WEEK_COLOR);
    let late_fmt = Format::new().set_background_color(LATE_WEEK_COLOR);

    for (col, header) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &header_fmt)?;
    }

    // Column index of the category value driving the row highlight.
    let category_col = style
        .highlight_category
        .as_ref()
        .and_then(|_| ["cat.", "cat", "categorie"].iter().find_map(|c| table.column_normalized(c)));

    // Week fill per column; overrides the row highlight, as the sheets have
    // always been colored.
    let week_fmt_by_col: Vec<Option<&Format>> = table
        .headers
        .iter()
        .map(|header| {
            let week_style = style.week_columns?;
            let week = week_style.parse(header)?;
            Some(if week <= EARLY_WEEK_LIMIT {
                &early_fmt
            } else {
                &late_fmt
            })
        })
        .collect();

    for (i, row) in table.rows.iter().enumerate() {
        let excel_row = i as u32 + 1;
        let is_anchor_row = match (&style.highlight_category, category_col) {
            (Some(wanted), Some(col)) => table.cell(i, col).display().trim() == wanted,
            _ => false,
        };

        for (j, cell) in row.iter().enumerate() {
            let fmt = week_fmt_by_col
                .get(j)
                .copied()
                .flatten()
                .or(if is_anchor_row { Some(&anchor_fmt) } else { None });
            write_cell(worksheet, excel_row, j as u16, cell, fmt)?;
        }
    }

    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    fmt: Option<&Format>,
) -> Result<()> {
    match (cell, fmt) {
        (Cell::Empty, None) => {}
        (Cell::Empty, Some(fmt)) => {
            worksheet.write_blank(row, col, fmt)?;
        }
        (Cell::Text(s), None) => {
            worksheet.write_string(row, col, s)?;
        }
        (Cell::Text(s), Some(fmt)) => {
            worksheet.write_string_with_format(row, col, s, fmt)?;
        }
        (Cell::Number(n), None) => {
            worksheet.write_number(row, col, *n)?;
        }
        (Cell::Number(n), Some(fmt)) => {
            worksheet.write_number_with_format(row, col, *n, fmt)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> SheetTable {
        let mut table = SheetTable::new(vec![
            "Nr.".into(),
            "Naam".into(),
            "Cat.".into(),
            "1".into(),
            "5".into(),
        ]);
        table.rows.push(vec![
            Cell::Number(12.0),
            Cell::Text("ann".into()),
            Cell::Text("DAM".into()),
            Cell::Number(1.0),
            Cell::Number(3.0),
        ]);
        table.rows.push(vec![
            Cell::Number(31.0),
            Cell::Text("bert".into()),
            Cell::Text("SEN".into()),
            Cell::Number(2.0),
            Cell::Number(1.0),
        ]);
        table
    }

    #[test]
    fn write_and_read_back_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("klassement.xlsx");
        let style = SheetStyle::individual("DAM");

        write_sheet(&path, "Klassement", &sample_table(), &style).unwrap();
        assert!(path.exists());
        assert!(!path.with_file_name("klassement.xlsx.tmp").exists());

        let read_back = sheet::read_sheet(&path, "Klassement").unwrap();
        assert_eq!(read_back.headers, sample_table().headers);
        assert_eq!(read_back.rows.len(), 2);
        assert_eq!(*read_back.cell(0, 0), Cell::Number(12.0));
        assert_eq!(read_back.cell(1, 1).as_str(), Some("bert"));
    }

    #[test]
    fn replacing_one_sheet_preserves_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("klassement.xlsx");

        write_sheet(&path, "Klassement", &sample_table(), &SheetStyle::plain()).unwrap();
        let mut other = SheetTable::new(vec!["team".into()]);
        other.rows.push(vec![Cell::Text("x".into())]);
        write_sheet(&path, "TEAMS STA", &other, &SheetStyle::plain()).unwrap();

        // Replace the first sheet; the second must survive.
        let mut updated = sample_table();
        updated.rows.pop();
        write_sheet(&path, "Klassement", &updated, &SheetStyle::plain()).unwrap();

        let names = sheet::sheet_names(&path).unwrap();
        assert_eq!(names, vec!["Klassement".to_string(), "TEAMS STA".to_string()]);
        let klassement = sheet::read_sheet(&path, "Klassement").unwrap();
        assert_eq!(klassement.rows.len(), 1);
        let teams = sheet::read_sheet(&path, "TEAMS STA").unwrap();
        assert_eq!(teams.rows.len(), 1);
    }

    #[test]
    fn combine_merges_sheets_from_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.xlsx");
        let b = dir.path().join("b.xlsx");
        write_sheet(&a, "Klassement", &sample_table(), &SheetStyle::plain()).unwrap();
        let mut teams = SheetTable::new(vec!["team".into()]);
        teams.rows.push(vec![Cell::Text("x".into())]);
        write_sheet(&b, "TEAMS STA", &teams, &SheetStyle::plain()).unwrap();

        let output = dir.path().join("combined.xlsx");
        combine_workbooks(
            &[
                CombineSource {
                    path: a,
                    sheet: "Klassement".into(),
                    style: SheetStyle::individual("DAM"),
                },
                CombineSource {
                    path: b,
                    sheet: "TEAMS STA".into(),
                    style: SheetStyle::plain(),
                },
            ],
            &output,
        )
        .unwrap();

        let names = sheet::sheet_names(&output).unwrap();
        assert_eq!(names, vec!["Klassement".to_string(), "TEAMS STA".to_string()]);
    }
}
