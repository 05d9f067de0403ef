//! Klassement CLI - score one week of the club classifications
//!
//! Each subcommand advances one classification variant by a week: it loads
//! the roster and the finish list, computes the week's points, and rewrites
//! the variant's workbook. `all` runs every variant plus the combine step.

use anyhow::Result;
use clap::{Parser, Subcommand};
use klassement_toolkit::pipeline::{self, SeasonConfig};
use klassement_toolkit::scoring::RankMethod;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "klassement")]
#[command(about = "Weekly scoring for the club competition classifications")]
struct Cli {
    /// Data directory holding the input and output spreadsheets
    #[arg(long, env = "KLASSEMENT_DATA_DIR", default_value = ".", global = true)]
    data_dir: PathBuf,

    /// First week counted toward the second period (all weeks are period 1
    /// until this is set)
    #[arg(long, global = true)]
    period_two_start: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one week of the overall classification
    Klassement {
        /// Roster spreadsheet (defaults to Deelnemers/deelnemerslijst.xlsx)
        #[arg(long)]
        roster: Option<PathBuf>,

        /// Weekly finish list (defaults to Result/finish.xlsx)
        #[arg(long)]
        results: Option<PathBuf>,

        /// Workbook whose first header row fixes the column order
        #[arg(long)]
        template: Option<PathBuf>,

        /// Tied totals share the minimum class rank instead of strict 1..k
        #[arg(long)]
        shared_min: bool,
    },

    /// Score one week of the regularity criterium
    Criterium {
        /// Roster spreadsheet (defaults to Deelnemers/deelnemerslijst.xlsx)
        #[arg(long)]
        roster: Option<PathBuf>,

        /// Weekly finish list (defaults to Result/finish.xlsx)
        #[arg(long)]
        results: Option<PathBuf>,

        /// Workbook whose first header row fixes the column order
        #[arg(long)]
        template: Option<PathBuf>,

        /// Tied totals share the minimum class rank instead of strict 1..k
        #[arg(long)]
        shared_min: bool,
    },

    /// Rank one week of the open team classification
    Teams {
        /// Roster spreadsheet (defaults to Deelnemers/deelnemerslijst.xlsx)
        #[arg(long)]
        roster: Option<PathBuf>,

        /// Weekly finish list (defaults to Result/finish.xlsx)
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// Rank one week of the mixed team classification (quota selection)
    TeamsMixed {
        /// Roster spreadsheet (defaults to Deelnemers/deelnemerslijst.xlsx)
        #[arg(long)]
        roster: Option<PathBuf>,

        /// Weekly finish list (defaults to Result/finish.xlsx)
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// Merge the four variant sheets into the distribution workbook
    Combine,

    /// Run every variant and the combine step in order
    All,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let season = SeasonConfig::new(&cli.data_dir, cli.period_two_start);

    let summary = match cli.command {
        Commands::Klassement {
            roster,
            results,
            template,
            shared_min,
        } => {
            let mut config = season.klassement();
            apply_individual_overrides(&mut config, roster, results, template, shared_min);
            pipeline::run_klassement(&config)?
        }
        Commands::Criterium {
            roster,
            results,
            template,
            shared_min,
        } => {
            let mut config = season.criterium();
            apply_individual_overrides(&mut config, roster, results, template, shared_min);
            pipeline::run_klassement(&config)?
        }
        Commands::Teams { roster, results } => {
            let mut config = season.teams();
            apply_team_overrides(&mut config, roster, results);
            pipeline::run_teams(&config)?
        }
        Commands::TeamsMixed { roster, results } => {
            let mut config = season.teams_mixed();
            apply_team_overrides(&mut config, roster, results);
            pipeline::run_teams(&config)?
        }
        Commands::Combine => pipeline::run_combine(&season.combine())?,
        Commands::All => pipeline::run_all(&season)?,
    };

    println!("{summary}");
    Ok(())
}

fn apply_individual_overrides(
    config: &mut pipeline::KlassementConfig,
    roster: Option<PathBuf>,
    results: Option<PathBuf>,
    template: Option<PathBuf>,
    shared_min: bool,
) {
    if let Some(path) = roster {
        config.roster_file = path;
    }
    if let Some(path) = results {
        config.results_file = path;
    }
    config.template_file = template;
    if shared_min {
        config.rank_method = RankMethod::SharedMin;
    }
}

fn apply_team_overrides(
    config: &mut pipeline::TeamConfig,
    roster: Option<PathBuf>,
    results: Option<PathBuf>,
) {
    if let Some(path) = roster {
        config.roster_file = path;
    }
    if let Some(path) = results {
        config.results_file = path;
    }
}
