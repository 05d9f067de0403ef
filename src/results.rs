//! Weekly finish-list loading.
//!
//! One file per race week, either `.xlsx` (as the timing crew mails it) or a
//! `.csv` export. Only bib and finishing place matter; rows where either
//! cannot be resolved are dropped, because not every registered rider starts
//! or finishes.

use crate::sheet;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// One finisher: bib crossed the line in `place`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishRecord {
    pub bib: u32,
    pub place: u32,
}

/// Load a week's finish list. Dispatches on the file extension.
pub fn load_results(path: &Path) -> Result<Vec<FinishRecord>> {
    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        load_csv_results(path)
    } else {
        load_xlsx_results(path)
    }
}

fn load_xlsx_results(path: &Path) -> Result<Vec<FinishRecord>> {
    let sheet_name = sheet::sheet_names(path)?
        .into_iter()
        .next()
        .with_context(|| format!("Result file {} has no sheets", path.display()))?;
    let table = sheet::read_sheet(path, &sheet_name)
        .with_context(|| format!("Failed to read results {}", path.display()))?;

    let bib_col = ["bib", "nr.", "nr", "number"]
        .iter()
        .find_map(|name| table.column_normalized(name))
        .with_context(|| format!("Result file {} has no bib column", path.display()))?;
    let place_col = ["pl", "plaats", "place"]
        .iter()
        .find_map(|name| table.column_normalized(name))
        .with_context(|| format!("Result file {} has no place column", path.display()))?;

    let mut records = Vec::new();
    for (i, _) in table.rows.iter().enumerate() {
        match (table.cell(i, bib_col).as_u32(), table.cell(i, place_col).as_u32()) {
            (Some(bib), Some(place)) => records.push(FinishRecord { bib, place }),
            _ => log::debug!("result row {} unresolvable, dropped", i + 1),
        }
    }
    Ok(records)
}

/// One `.csv` finish row. Fields stay text until parsed so that DNF markers
/// and blanks drop the row instead of failing the whole file.
#[derive(Debug, Deserialize)]
struct CsvFinishRow {
    #[serde(
        alias = "Bib",
        alias = "nr.",
        alias = "Nr.",
        alias = "nr",
        alias = "Nr",
        alias = "number",
        alias = "Number",
        default
    )]
    bib: Option<String>,
    #[serde(
        alias = "pl",
        alias = "Pl",
        alias = "plaats",
        alias = "Plaats",
        alias = "Place",
        default
    )]
    place: Option<String>,
}

impl CsvFinishRow {
    fn resolve(&self) -> Option<FinishRecord> {
        let bib = parse_field(self.bib.as_deref())?;
        let place = parse_field(self.place.as_deref())?;
        Some(FinishRecord { bib, place })
    }
}

fn parse_field(value: Option<&str>) -> Option<u32> {
    value?.trim().parse().ok()
}

fn load_csv_results(path: &Path) -> Result<Vec<FinishRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open results {}", path.display()))?;

    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<CsvFinishRow>().enumerate() {
        let row = row.with_context(|| format!("Failed to read results {}", path.display()))?;
        match row.resolve() {
            Some(record) => records.push(record),
            None => log::debug!("result row {} unresolvable, dropped", i + 1),
        }
    }
    Ok(records)
}
