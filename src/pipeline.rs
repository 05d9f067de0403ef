//! Per-variant classification runs.
//!
//! Each run function loads the roster and the weekly finish list, advances
//! one scored week in the variant's workbook, and rewrites that workbook
//! atomically. The functions return a short summary string for the CLI.
//!
//! Every variant keeps its own backup tree: the roster snapshot stored there
//! is what the next run diffs against to detect class changes, so sharing a
//! tree between variants would hide changes from all but the first run.

use crate::results;
use crate::roster::{self, ANCHOR_CATEGORY, DEFAULT_HEADER_ROW};
use crate::scoring::{
    self, Aggregation, RankMethod, COL_BIB, COL_CATEGORY, COL_CLASS, COL_NAME, COL_PERIOD1,
    COL_PERIOD2, COL_TOTAL,
};
use crate::sheet::WeekStyle;
use crate::store;
use crate::team::{self, QuotaRule, TeamRankOrder, TeamSelection};
use crate::writer::{self, CombineSource, SheetStyle};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Points ceiling of the overall classification.
pub const KLASSEMENT_CEILING: u32 = 80;
/// Points ceiling of the regularity criterium.
pub const CRITERIUM_CEILING: u32 = 60;

/// Configuration of one individual classification run.
pub struct KlassementConfig {
    /// Classification workbook, read and rewritten in place
    pub output_file: PathBuf,
    /// Sheet holding this variant's table
    pub sheet: String,
    /// Roster spreadsheet (deelnemerslijst)
    pub roster_file: PathBuf,
    /// Row index of the roster header
    pub header_row: usize,
    /// Weekly finish list (xlsx or csv)
    pub results_file: PathBuf,
    /// Optional workbook whose first header row fixes the column order
    pub template_file: Option<PathBuf>,
    /// Points ceiling; clamped ranks and absentees get this value
    pub ceiling: u32,
    /// Season total policy
    pub aggregation: Aggregation,
    /// Class-rank tie handling
    pub rank_method: RankMethod,
    /// First week counted toward the second period, once announced
    pub period_two_start: Option<u32>,
    /// Backup tree of this variant (outputs and roster snapshots)
    pub backup_root: PathBuf,
}

/// Configuration of one team classification run.
pub struct TeamConfig {
    /// Team workbook, read and rewritten in place
    pub output_file: PathBuf,
    /// Sheet holding this variant's table
    pub sheet: String,
    /// Roster spreadsheet (deelnemerslijst)
    pub roster_file: PathBuf,
    /// Row index of the roster header
    pub header_row: usize,
    /// Weekly finish list (xlsx or csv)
    pub results_file: PathBuf,
    /// Points ceiling for the riders' weekly points and quota padding;
    /// defaults to the roster size when unset
    pub ceiling: Option<u32>,
    /// Which riders count toward a team's weekly sum
    pub selection: TeamSelection,
    /// Direction of the weekly rank transform
    pub rank_order: TeamRankOrder,
    /// Keep only teams fielding at least one rider of this category
    pub required_category: Option<String>,
    /// First week counted toward the second period, once announced
    pub period_two_start: Option<u32>,
    /// Backup tree of this variant
    pub backup_root: PathBuf,
}

/// Configuration of the combined distribution workbook.
pub struct CombineConfig {
    /// Sheets to merge, in workbook order
    pub sources: Vec<CombineSource>,
    /// Combined output path
    pub output_file: PathBuf,
    /// Backup tree for the previous combined file
    pub backup_root: PathBuf,
}

/// Season-level defaults: one data directory, four variants, one combine.
pub struct SeasonConfig {
    /// Directory holding the input and output spreadsheets
    pub data_dir: PathBuf,
    /// First week of the second period, once announced
    pub period_two_start: Option<u32>,
}

impl SeasonConfig {
    pub fn new(data_dir: impl Into<PathBuf>, period_two_start: Option<u32>) -> Self {
        Self {
            data_dir: data_dir.into(),
            period_two_start,
        }
    }

    pub fn roster_file(&self) -> PathBuf {
        self.data_dir.join("Deelnemers").join("deelnemerslijst.xlsx")
    }

    pub fn results_file(&self) -> PathBuf {
        self.data_dir.join("Result").join("finish.xlsx")
    }

    fn backup_root(&self, variant: &str) -> PathBuf {
        self.data_dir.join("backups").join(variant)
    }

    /// Overall classification: ceiling 80, worst week dropped.
    pub fn klassement(&self) -> KlassementConfig {
        KlassementConfig {
            output_file: self.data_dir.join("Klassement.xlsx"),
            sheet: "Klassement".to_string(),
            roster_file: self.roster_file(),
            header_row: DEFAULT_HEADER_ROW,
            results_file: self.results_file(),
            template_file: None,
            ceiling: KLASSEMENT_CEILING,
            aggregation: Aggregation::DropWorst,
            rank_method: RankMethod::Sequential,
            period_two_start: self.period_two_start,
            backup_root: self.backup_root("klassement"),
        }
    }

    /// Regularity criterium: ceiling 60, best half of the weeks counts.
    pub fn criterium(&self) -> KlassementConfig {
        KlassementConfig {
            output_file: self.data_dir.join("Criterium.xlsx"),
            sheet: "Criterium".to_string(),
            roster_file: self.roster_file(),
            header_row: DEFAULT_HEADER_ROW,
            results_file: self.results_file(),
            template_file: None,
            ceiling: CRITERIUM_CEILING,
            aggregation: Aggregation::BestHalf,
            rank_method: RankMethod::Sequential,
            period_two_start: self.period_two_start,
            backup_root: self.backup_root("criterium"),
        }
    }

    /// Open team classification: every teamed rider counts, highest weekly
    /// sum ranks first.
    pub fn teams(&self) -> TeamConfig {
        TeamConfig {
            output_file: self.data_dir.join("Teams.xlsx"),
            sheet: "TEAMS".to_string(),
            roster_file: self.roster_file(),
            header_row: DEFAULT_HEADER_ROW,
            results_file: self.results_file(),
            ceiling: None,
            selection: TeamSelection::AllRiders,
            rank_order: TeamRankOrder::HighestFirst,
            required_category: None,
            period_two_start: self.period_two_start,
            backup_root: self.backup_root("teams"),
        }
    }

    /// Mixed team classification: quota selection, restricted to teams
    /// fielding at least one rider of the anchor category.
    pub fn teams_mixed(&self) -> TeamConfig {
        TeamConfig {
            output_file: self.data_dir.join("Teams Mixed.xlsx"),
            sheet: "TEAMS MIXED".to_string(),
            roster_file: self.roster_file(),
            header_row: DEFAULT_HEADER_ROW,
            results_file: self.results_file(),
            ceiling: None,
            selection: TeamSelection::Quota(QuotaRule::house_default()),
            rank_order: TeamRankOrder::LowestFirst,
            required_category: Some(ANCHOR_CATEGORY.to_string()),
            period_two_start: self.period_two_start,
            backup_root: self.backup_root("teams-mixed"),
        }
    }

    /// Merge all four sheets into one distribution file.
    pub fn combine(&self) -> CombineConfig {
        CombineConfig {
            sources: vec![
                CombineSource {
                    path: self.data_dir.join("Klassement.xlsx"),
                    sheet: "Klassement".to_string(),
                    style: SheetStyle::individual(ANCHOR_CATEGORY),
                },
                CombineSource {
                    path: self.data_dir.join("Criterium.xlsx"),
                    sheet: "Criterium".to_string(),
                    style: SheetStyle::individual(ANCHOR_CATEGORY),
                },
                CombineSource {
                    path: self.data_dir.join("Teams.xlsx"),
                    sheet: "TEAMS".to_string(),
                    style: SheetStyle::plain(),
                },
                CombineSource {
                    path: self.data_dir.join("Teams Mixed.xlsx"),
                    sheet: "TEAMS MIXED".to_string(),
                    style: SheetStyle::plain(),
                },
            ],
            output_file: self.data_dir.join("Uitslagen.xlsx"),
            backup_root: self.backup_root("combined"),
        }
    }
}

/// Score one week of an individual classification and rewrite its sheet.
///
/// Returns a summary string on success.
pub fn run_klassement(config: &KlassementConfig) -> Result<String> {
    let stamp = store::run_stamp();
    let roster = roster::load_roster(&config.roster_file, config.header_row)?;
    let finishes = results::load_results(&config.results_file)?;
    let week = store::next_week(&config.output_file, &config.sheet, WeekStyle::Plain)?;
    let mut standings = store::load_standings(&config.output_file, &config.sheet)?;

    // Diff against the roster snapshot of the previous run before this
    // run's own snapshot is taken.
    let changes = detect_class_changes(&roster, config);

    let points = scoring::week_points(&roster, &finishes, config.ceiling);
    scoring::apply_week(&mut standings, &roster, week, &points, config.ceiling);
    scoring::apply_class_changes(&mut standings, &changes, week);
    scoring::recompute(
        &mut standings,
        config.aggregation,
        config.period_two_start,
        config.rank_method,
    );

    let template = match &config.template_file {
        Some(path) => store::load_template_order(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?,
        None => default_columns(),
    };
    let columns = scoring::output_columns(&template, &standings.week_numbers(), WeekStyle::Plain);
    let table = store::standings_to_table(&standings, &columns);

    store::backup_best_effort(&config.output_file, &config.backup_root, &stamp);
    store::backup_best_effort(&config.roster_file, &config.backup_root, &stamp);
    writer::write_sheet(
        &config.output_file,
        &config.sheet,
        &table,
        &SheetStyle::individual(ANCHOR_CATEGORY),
    )?;

    let summary = format!(
        "{}: week {} scored for {} riders ({} class changes) -> {}",
        config.sheet,
        week,
        roster.len(),
        changes.len(),
        config.output_file.display()
    );
    log::info!("{summary}");
    Ok(summary)
}

/// Score one week of a team classification and rewrite its sheet.
pub fn run_teams(config: &TeamConfig) -> Result<String> {
    let stamp = store::run_stamp();
    let mut roster = roster::load_roster(&config.roster_file, config.header_row)?;
    if let Some(category) = &config.required_category {
        roster = roster.restrict_to_teams_with_category(category);
    }
    let ceiling = config.ceiling.unwrap_or(roster.len() as u32);
    let finishes = results::load_results(&config.results_file)?;
    let week = store::next_week(&config.output_file, &config.sheet, WeekStyle::TeamSuffix)?;
    let mut standings = store::load_team_standings(&config.output_file, &config.sheet)?;

    let points = scoring::week_points(&roster, &finishes, ceiling);
    let scores = team::team_week_scores(&roster, &points, &config.selection, ceiling);
    let ranks = team::rank_teams(&scores, config.rank_order);
    team::apply_team_week(&mut standings, week, &ranks);
    team::recompute_teams(&mut standings, config.period_two_start);

    let table = store::team_to_table(&standings);
    store::backup_best_effort(&config.output_file, &config.backup_root, &stamp);
    writer::write_sheet(&config.output_file, &config.sheet, &table, &SheetStyle::plain())?;

    let summary = format!(
        "{}: week {} ranked for {} teams -> {}",
        config.sheet,
        week,
        standings.rows.len(),
        config.output_file.display()
    );
    log::info!("{summary}");
    Ok(summary)
}

/// Merge the per-variant sheets into the distribution workbook.
pub fn run_combine(config: &CombineConfig) -> Result<String> {
    let stamp = store::run_stamp();
    store::backup_best_effort(&config.output_file, &config.backup_root, &stamp);
    writer::combine_workbooks(&config.sources, &config.output_file)?;
    Ok(format!(
        "combined {} sheets -> {}",
        config.sources.len(),
        config.output_file.display()
    ))
}

/// Run all four variants and the combine step in order, stopping at the
/// first failure.
pub fn run_all(season: &SeasonConfig) -> Result<String> {
    let mut summaries = Vec::with_capacity(5);
    summaries.push(run_klassement(&season.klassement()).context("klassement run failed")?);
    summaries.push(run_klassement(&season.criterium()).context("criterium run failed")?);
    summaries.push(run_teams(&season.teams()).context("teams run failed")?);
    summaries.push(run_teams(&season.teams_mixed()).context("mixed teams run failed")?);
    summaries.push(run_combine(&season.combine()).context("combine step failed")?);
    Ok(summaries.join("\n"))
}

/// Output column order used when no template workbook is configured. The
/// rank and week columns are inserted by `scoring::output_columns`.
fn default_columns() -> Vec<String> {
    [
        COL_BIB,
        COL_NAME,
        COL_CLASS,
        COL_CATEGORY,
        COL_TOTAL,
        COL_PERIOD1,
        COL_PERIOD2,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn detect_class_changes(
    roster: &roster::Roster,
    config: &KlassementConfig,
) -> Vec<roster::ClassChange> {
    let Some(file_name) = config.roster_file.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let Some(previous_path) = store::latest_backup(&config.backup_root, file_name) else {
        log::debug!(
            "no previous roster snapshot under {}",
            config.backup_root.display()
        );
        return Vec::new();
    };
    match roster::load_roster(&previous_path, config.header_row) {
        Ok(previous) => roster::class_changes(roster, &previous),
        Err(err) => {
            // A corrupt old snapshot must not kill the run.
            log::warn!(
                "could not read previous roster {}: {err:#}",
                previous_path.display()
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn season_config_derives_variant_paths() {
        let season = SeasonConfig::new("/data", Some(8));
        let klassement = season.klassement();
        assert_eq!(klassement.output_file, Path::new("/data/Klassement.xlsx"));
        assert_eq!(klassement.ceiling, KLASSEMENT_CEILING);
        assert_eq!(klassement.period_two_start, Some(8));

        let criterium = season.criterium();
        assert_eq!(criterium.ceiling, CRITERIUM_CEILING);
        assert_eq!(criterium.aggregation, Aggregation::BestHalf);

        let mixed = season.teams_mixed();
        assert_eq!(mixed.required_category.as_deref(), Some(ANCHOR_CATEGORY));
        assert_eq!(mixed.rank_order, TeamRankOrder::LowestFirst);
    }

    #[test]
    fn combine_sources_cover_all_four_variants() {
        let season = SeasonConfig::new("/data", None);
        let combine = season.combine();
        let sheets: Vec<&str> = combine.sources.iter().map(|s| s.sheet.as_str()).collect();
        assert_eq!(
            sheets,
            vec!["Klassement", "Criterium", "TEAMS", "TEAMS MIXED"]
        );
        assert_eq!(combine.output_file, Path::new("/data/Uitslagen.xlsx"));
    }

    #[test]
    fn default_columns_match_the_house_layout() {
        let columns = default_columns();
        assert_eq!(columns[0], COL_BIB);
        assert!(columns.contains(&COL_PERIOD1.to_string()));
        assert!(!columns.contains(&"Plaats Klasse".to_string()));
    }
}
