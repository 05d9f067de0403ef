//! Participant roster loading and mid-season class-change detection.
//!
//! The roster sheet comes from the club's shared participant list: a few
//! banner rows, then a header row, then one row per rider. Trailing
//! annotation rows are expected and silently dropped.

use crate::sheet::{self, Cell, SheetTable};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Header row index (0-based) of the participant list.
pub const DEFAULT_HEADER_ROW: usize = 4;

/// Anchor category used for row highlighting and team eligibility.
pub const ANCHOR_CATEGORY: &str = "DAM";

/// One registered participant. Identity key is the bib number.
#[derive(Debug, Clone, PartialEq)]
pub struct Rider {
    pub bib: u32,
    /// Trimmed and lowercased for stable matching across files.
    pub name: String,
    pub class: String,
    pub category: String,
    /// `None` when the team cell is blank or the placeholder `"0"`.
    pub team: Option<String>,
}

/// The roster for one run. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub riders: Vec<Rider>,
}

impl Roster {
    pub fn len(&self) -> usize {
        self.riders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.riders.is_empty()
    }

    pub fn get(&self, bib: u32) -> Option<&Rider> {
        self.riders.iter().find(|r| r.bib == bib)
    }

    /// Class labels in first-seen order.
    pub fn classes(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for rider in &self.riders {
            if !seen.contains(&rider.class.as_str()) {
                seen.push(rider.class.as_str());
            }
        }
        seen
    }

    pub fn members_of_class(&self, class: &str) -> Vec<&Rider> {
        self.riders.iter().filter(|r| r.class == class).collect()
    }

    /// Riders with a real team assignment.
    pub fn teamed_riders(&self) -> Vec<&Rider> {
        self.riders.iter().filter(|r| r.team.is_some()).collect()
    }

    /// Keep only riders whose team has at least one rider of `category`.
    pub fn restrict_to_teams_with_category(&self, category: &str) -> Roster {
        let eligible: Vec<&str> = self
            .riders
            .iter()
            .filter(|r| r.category == category)
            .filter_map(|r| r.team.as_deref())
            .collect();
        Roster {
            riders: self
                .riders
                .iter()
                .filter(|r| {
                    r.team
                        .as_deref()
                        .map(|t| eligible.contains(&t))
                        .unwrap_or(false)
                })
                .cloned()
                .collect(),
        }
    }
}

/// Load the participant roster from a spreadsheet.
///
/// Rows lacking bib, name or class are dropped. A surviving row whose bib is
/// not numeric is a fatal error: it means the roster itself is corrupt.
pub fn load_roster(path: &Path, header_row: usize) -> Result<Roster> {
    let table = sheet::read_sheet_with_header(path, first_sheet_name(path)?.as_str(), header_row)
        .with_context(|| format!("Failed to read roster {}", path.display()))?;
    roster_from_table(&table, path)
}

fn first_sheet_name(path: &Path) -> Result<String> {
    sheet::sheet_names(path)?
        .into_iter()
        .next()
        .with_context(|| format!("Roster {} has no sheets", path.display()))
}

fn roster_from_table(table: &SheetTable, path: &Path) -> Result<Roster> {
    let bib_col = find_column(table, &["number", "nr.", "nr", "bib"])
        .with_context(|| format!("Roster {} has no bib-number column", path.display()))?;
    let name_col = find_column(table, &["name", "naam"])
        .with_context(|| format!("Roster {} has no name column", path.display()))?;
    let class_col = find_column(table, &["klasse", "class"])
        .with_context(|| format!("Roster {} has no class column", path.display()))?;
    let cat_col = find_column(table, &["cat", "cat.", "categorie"]);
    let team_col = find_column(table, &["team"]);

    let mut riders = Vec::new();
    for (i, _) in table.rows.iter().enumerate() {
        let bib_cell = table.cell(i, bib_col);
        let name_cell = table.cell(i, name_col);
        let class_cell = table.cell(i, class_col);

        // Annotation / trailer rows: silently dropped.
        if bib_cell.is_empty() || name_cell.is_empty() || class_cell.is_empty() {
            log::debug!("roster row {} incomplete, dropped", i + 1);
            continue;
        }

        let Some(bib) = bib_cell.as_u32() else {
            bail!(
                "Roster {} row {}: non-numeric bib '{}'",
                path.display(),
                i + 1,
                bib_cell.display()
            );
        };

        let name = name_cell.display().trim().to_lowercase();
        let class = class_cell.display().trim().to_string();
        let category = cat_col
            .map(|c| table.cell(i, c).display().trim().to_string())
            .unwrap_or_default();
        let team = team_col.and_then(|c| normalize_team(&table.cell(i, c)));

        riders.push(Rider {
            bib,
            name,
            class,
            category,
            team,
        });
    }

    Ok(Roster { riders })
}

fn find_column(table: &SheetTable, candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|name| table.column_normalized(name))
}

/// Blank or `"0"` team cells mean "no team".
fn normalize_team(cell: &Cell) -> Option<String> {
    let value = cell.display();
    let value = value.trim();
    if value.is_empty() || value == "0" {
        None
    } else {
        Some(value.to_string())
    }
}

/// A detected mid-season class reassignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassChange {
    pub bib: u32,
    pub old_class: String,
    pub new_class: String,
}

/// Diff the current roster against a previous snapshot by bib.
///
/// Riders present only on one side are not changes; a change is strictly a
/// bib whose class label differs between the two rosters.
pub fn class_changes(current: &Roster, previous: &Roster) -> Vec<ClassChange> {
    let old_classes: HashMap<u32, &str> = previous
        .riders
        .iter()
        .map(|r| (r.bib, r.class.as_str()))
        .collect();

    current
        .riders
        .iter()
        .filter_map(|rider| {
            let old = old_classes.get(&rider.bib)?;
            if *old != rider.class {
                Some(ClassChange {
                    bib: rider.bib,
                    old_class: (*old).to_string(),
                    new_class: rider.class.clone(),
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rider(bib: u32, class: &str, category: &str, team: Option<&str>) -> Rider {
        Rider {
            bib,
            name: format!("rider {bib}"),
            class: class.to_string(),
            category: category.to_string(),
            team: team.map(str::to_string),
        }
    }

    #[test]
    fn class_change_diff_only_reports_moved_bibs() {
        let previous = Roster {
            riders: vec![rider(1, "A", "STA", None), rider(2, "A", "SEN", None)],
        };
        let current = Roster {
            riders: vec![
                rider(1, "B", "STA", None),
                rider(2, "A", "SEN", None),
                rider(3, "C", "DAM", None), // new rider: not a change
            ],
        };

        let changes = class_changes(&current, &previous);
        assert_eq!(
            changes,
            vec![ClassChange {
                bib: 1,
                old_class: "A".into(),
                new_class: "B".into(),
            }]
        );
    }

    #[test]
    fn team_normalization() {
        assert_eq!(normalize_team(&Cell::Text("0".into())), None);
        assert_eq!(normalize_team(&Cell::Text("  ".into())), None);
        assert_eq!(normalize_team(&Cell::Empty), None);
        assert_eq!(normalize_team(&Cell::Number(0.0)), None);
        assert_eq!(
            normalize_team(&Cell::Text(" De Spurters ".into())),
            Some("De Spurters".into())
        );
    }

    #[test]
    fn dam_team_restriction() {
        let roster = Roster {
            riders: vec![
                rider(1, "A", "DAM", Some("x")),
                rider(2, "A", "STA", Some("x")),
                rider(3, "A", "STA", Some("y")),
                rider(4, "A", "SEN", None),
            ],
        };
        let restricted = roster.restrict_to_teams_with_category("DAM");
        let bibs: Vec<u32> = restricted.riders.iter().map(|r| r.bib).collect();
        assert_eq!(bibs, vec![1, 2]);
    }

    #[test]
    fn roster_from_table_drops_incomplete_and_rejects_bad_bib() {
        use crate::sheet::SheetTable;

        let mut table = SheetTable::new(vec![
            "Number".into(),
            "Name".into(),
            "Klasse".into(),
            "Cat".into(),
            "Team".into(),
        ]);
        table.rows.push(vec![
            Cell::Number(12.0),
            Cell::Text(" Ann DeWit ".into()),
            Cell::Text("A".into()),
            Cell::Text("DAM".into()),
            Cell::Text("0".into()),
        ]);
        // Trailer note row: no bib.
        table.rows.push(vec![
            Cell::Empty,
            Cell::Text("laatste update juni".into()),
            Cell::Empty,
        ]);

        let roster = roster_from_table(&table, Path::new("roster.xlsx")).unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.riders[0].name, "ann dewit");
        assert_eq!(roster.riders[0].team, None);

        table.rows.insert(
            0,
            vec![
                Cell::Text("12b".into()),
                Cell::Text("x".into()),
                Cell::Text("A".into()),
            ],
        );
        assert!(roster_from_table(&table, Path::new("roster.xlsx")).is_err());
    }
}
