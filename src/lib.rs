//! Klassement Toolkit
//!
//! Weekly scoring for a recurring club competition: riders race in classes,
//! earn class-relative points per week, and accumulate season totals across
//! individual and team classifications kept in spreadsheet workbooks.
//!
//! This library provides:
//! - `scoring`: per-week class points, aggregation policies, rank columns
//! - `team`: team member selection and the weekly rank transform
//! - `pipeline`: the per-variant run functions the CLI drives
//!
//! Binary:
//! - `klassement`: one subcommand per classification variant, plus `combine`
//!   and `all`

pub mod pipeline;
pub mod results;
pub mod roster;
pub mod scoring;
pub mod sheet;
pub mod store;
pub mod team;
pub mod writer;

pub use roster::{Rider, Roster};
pub use scoring::{Aggregation, RankMethod, Standings};
pub use team::{TeamRankOrder, TeamSelection, TeamStandings};
