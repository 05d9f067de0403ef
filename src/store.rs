//! Classification table persistence: week counting, sheet⇄standings
//! conversion and backup copies.
//!
//! The running tables live in the output workbooks themselves and are read
//! back at the start of every run, so week numbering is purely a function of
//! accumulated state: the next week index is the number of week columns
//! already present plus one.

use crate::scoring::{self, Standings, StandingsRow};
use crate::sheet::{self, Cell, SheetTable, WeekStyle};
use crate::team::{TeamRow, TeamStandings};
use crate::writer;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Output column names specific to the team sheets.
pub const COL_TEAM: &str = "team";
pub const COL_PLACE: &str = "Plaats";

/// Determine the week index the next run should append.
///
/// Missing file: week 1, nothing is created. Missing sheet: an empty sheet
/// of that name is persisted (atomically, preserving the other sheets) and
/// week 1 is returned. Otherwise: count of week-named columns plus one.
/// Calling this twice against an unmodified file returns the same index.
pub fn next_week(path: &Path, sheet_name: &str, style: WeekStyle) -> Result<u32> {
    if !path.is_file() {
        return Ok(1);
    }

    let names = sheet::sheet_names(path)?;
    if !names.iter().any(|n| n == sheet_name) {
        let mut sheets = sheet::read_all_sheets(path)?;
        sheets.push((sheet_name.to_string(), SheetTable::default()));
        writer::write_plain_sheets(path, &sheets)
            .with_context(|| format!("Failed to add sheet '{}' to {}", sheet_name, path.display()))?;
        return Ok(1);
    }

    let table = sheet::read_sheet(path, sheet_name)?;
    let weeks = table
        .headers
        .iter()
        .filter(|h| style.parse(h).is_some())
        .count() as u32;
    Ok(weeks + 1)
}

/// Load the individual classification from an output workbook.
///
/// A missing file or sheet yields an empty table; the scoring engine seeds
/// it from the roster. Derived columns are ignored here; they are
/// recomputed every run.
pub fn load_standings(path: &Path, sheet_name: &str) -> Result<Standings> {
    let Some(table) = read_optional_sheet(path, sheet_name)? else {
        return Ok(Standings::default());
    };

    let bib_col = find_column(&table, &["nr.", "nr", "bib", "number"]);
    let name_col = find_column(&table, &["naam", "name"]);
    let class_col = find_column(&table, &["klasse", "class"]);
    let cat_col = find_column(&table, &["cat.", "cat", "categorie"]);
    let Some(bib_col) = bib_col else {
        if table.rows.is_empty() {
            return Ok(Standings::default());
        }
        // Recorded rows without a recognizable key would otherwise be
        // rebuilt from the roster with ceiling back-fill, wiping the season.
        bail!(
            "{} sheet '{}' holds data but no bib-number column; refusing to rebuild over it",
            path.display(),
            sheet_name
        );
    };

    let week_cols: Vec<(usize, u32)> = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| WeekStyle::Plain.parse(h).map(|w| (i, w)))
        .collect();

    let mut standings = Standings::default();
    for (i, _) in table.rows.iter().enumerate() {
        let Some(bib) = table.cell(i, bib_col).as_u32() else {
            log::warn!(
                "{} '{}' row {}: unreadable bib, dropped",
                path.display(),
                sheet_name,
                i + 1
            );
            continue;
        };

        let mut weeks = BTreeMap::new();
        for (col, week) in &week_cols {
            if let Some(points) = table.cell(i, *col).as_u32() {
                weeks.insert(*week, points);
            }
        }

        standings.rows.push(StandingsRow {
            bib,
            name: cell_text(&table, i, name_col),
            class: cell_text(&table, i, class_col),
            category: cell_text(&table, i, cat_col),
            weeks,
            total: 0,
            period1: 0,
            period2: 0,
            class_rank: 0,
            category_rank: 0,
        });
    }
    Ok(standings)
}

/// Serialize the individual classification into a sheet with the given
/// column order (see [`scoring::output_columns`]). Template columns the
/// table knows nothing about stay blank.
pub fn standings_to_table(standings: &Standings, columns: &[String]) -> SheetTable {
    let mut table = SheetTable::new(columns.to_vec());
    for row in &standings.rows {
        let cells = columns
            .iter()
            .map(|column| match column.as_str() {
                scoring::COL_BIB => Cell::Number(row.bib as f64),
                scoring::COL_NAME => Cell::Text(row.name.clone()),
                scoring::COL_CLASS => Cell::Text(row.class.clone()),
                scoring::COL_CATEGORY => Cell::Text(row.category.clone()),
                scoring::COL_TOTAL => Cell::Number(row.total as f64),
                scoring::COL_PERIOD1 => Cell::Number(row.period1 as f64),
                scoring::COL_PERIOD2 => Cell::Number(row.period2 as f64),
                scoring::COL_CLASS_RANK => Cell::Number(row.class_rank as f64),
                scoring::COL_CATEGORY_RANK => Cell::Number(row.category_rank as f64),
                other => match WeekStyle::Plain.parse(other) {
                    Some(week) => row
                        .weeks
                        .get(&week)
                        .map(|p| Cell::Number(*p as f64))
                        .unwrap_or(Cell::Empty),
                    None => Cell::Empty,
                },
            })
            .collect();
        table.rows.push(cells);
    }
    table
}

/// Load a team classification from an output workbook.
pub fn load_team_standings(path: &Path, sheet_name: &str) -> Result<TeamStandings> {
    let Some(table) = read_optional_sheet(path, sheet_name)? else {
        return Ok(TeamStandings::default());
    };

    let Some(team_col) = find_column(&table, &[COL_TEAM]) else {
        if table.rows.is_empty() {
            return Ok(TeamStandings::default());
        }
        bail!(
            "{} sheet '{}' holds data but no team column; refusing to rebuild over it",
            path.display(),
            sheet_name
        );
    };
    let week_cols: Vec<(usize, u32)> = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| WeekStyle::TeamSuffix.parse(h).map(|w| (i, w)))
        .collect();

    let mut standings = TeamStandings::default();
    for (i, _) in table.rows.iter().enumerate() {
        let team = table.cell(i, team_col).display();
        let team = team.trim();
        // Blank and placeholder teams never enter the table.
        if team.is_empty() || team == "0" {
            continue;
        }

        let mut weeks = BTreeMap::new();
        for (col, week) in &week_cols {
            if let Some(rank) = table.cell(i, *col).as_u32() {
                weeks.insert(*week, rank);
            }
        }

        standings.rows.push(TeamRow {
            team: team.to_string(),
            weeks,
            total: 0,
            period1: 0,
            period2: 0,
            place: 0,
        });
    }
    Ok(standings)
}

/// Serialize a team classification. Fixed column layout:
/// Plaats | team | 1e Periode | 2e Periode | Totaal | week columns.
pub fn team_to_table(standings: &TeamStandings) -> SheetTable {
    let weeks = standings.week_numbers();
    let mut headers = vec![
        COL_PLACE.to_string(),
        COL_TEAM.to_string(),
        scoring::COL_PERIOD1.to_string(),
        scoring::COL_PERIOD2.to_string(),
        scoring::COL_TOTAL.to_string(),
    ];
    headers.extend(weeks.iter().map(|w| WeekStyle::TeamSuffix.format(*w)));

    let mut table = SheetTable::new(headers);
    for row in &standings.rows {
        let mut cells = vec![
            Cell::Number(row.place as f64),
            Cell::Text(row.team.clone()),
            Cell::Number(row.period1 as f64),
            Cell::Number(row.period2 as f64),
            Cell::Number(row.total as f64),
        ];
        for week in &weeks {
            cells.push(
                row.weeks
                    .get(week)
                    .map(|r| Cell::Number(*r as f64))
                    .unwrap_or(Cell::Empty),
            );
        }
        table.rows.push(cells);
    }
    table
}

/// Canonical output column order from the template workbook's first row.
/// Blank and pandas-era "Unnamed" placeholders are excluded.
pub fn load_template_order(path: &Path) -> Result<Vec<String>> {
    let sheet_name = sheet::sheet_names(path)?
        .into_iter()
        .next()
        .with_context(|| format!("Template {} has no sheets", path.display()))?;
    let table = sheet::read_sheet(path, &sheet_name)
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    Ok(table
        .headers
        .into_iter()
        .filter(|h| !h.trim().is_empty() && !h.starts_with("Unnamed"))
        .collect())
}

/// Timestamp naming each run's backup directory. Lexically sortable so the
/// newest snapshot is the last directory name.
pub fn run_stamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Copy a file under `backup_root/<stamp>/`, creating the directory.
pub fn backup_file(path: &Path, backup_root: &Path, stamp: &str) -> Result<PathBuf> {
    let dir = backup_root.join(stamp);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create backup dir {}", dir.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("Backup source {} has no file name", path.display()))?;
    let target = dir.join(file_name);
    std::fs::copy(path, &target)
        .with_context(|| format!("Failed to back up {}", path.display()))?;
    Ok(target)
}

/// Best-effort backup: a failed copy is a warning, never a run abort.
pub fn backup_best_effort(path: &Path, backup_root: &Path, stamp: &str) {
    if !path.is_file() {
        return;
    }
    match backup_file(path, backup_root, stamp) {
        Ok(target) => log::info!("backed up {} to {}", path.display(), target.display()),
        Err(err) => log::warn!("backup of {} failed: {err:#}", path.display()),
    }
}

/// Most recent backup copy of `file_name`, by descending stamp order.
pub fn latest_backup(backup_root: &Path, file_name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(backup_root).ok()?;
    let mut stamps: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    stamps.sort();
    stamps
        .into_iter()
        .rev()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

fn read_optional_sheet(path: &Path, sheet_name: &str) -> Result<Option<SheetTable>> {
    if !path.is_file() {
        return Ok(None);
    }
    let names = sheet::sheet_names(path)?;
    if !names.iter().any(|n| n == sheet_name) {
        return Ok(None);
    }
    Ok(Some(sheet::read_sheet(path, sheet_name)?))
}

fn find_column(table: &SheetTable, candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|name| table.column_normalized(name))
}

fn cell_text(table: &SheetTable, row: usize, col: Option<usize>) -> String {
    col.map(|c| table.cell(row, c).display().trim().to_string())
        .unwrap_or_default()
}
