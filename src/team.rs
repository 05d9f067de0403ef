//! Team classification engine.
//!
//! Same shape as the individual engine but keyed by team: each week every
//! team gets a summed score from its riders' individual points, the weekly
//! sums are rank-transformed, and the persisted week column stores the
//! team's rank that week. Cumulative totals are sums of per-week ranks, so
//! lower stays better, mirroring the individual point semantics.

use crate::roster::Roster;
use crate::scoring::Aggregation;
use std::collections::{BTreeMap, HashMap};

/// Which riders' points count toward a team's weekly score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamSelection {
    /// Every team member's points, absentees included.
    AllRiders,
    /// A fixed composition quota per team per week.
    Quota(QuotaRule),
}

/// Composition quota: the best (lowest-points) `2` riders of the double
/// category, the best `1` of the single category, and the best `1` across
/// the combined pair. Missing slots are padded with the ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRule {
    pub double: String,
    pub single: String,
    pub combined: (String, String),
}

impl QuotaRule {
    /// The house composition: 2x STA, 1x SEN, 1x DAM-or-VET.
    pub fn house_default() -> Self {
        Self {
            double: "STA".to_string(),
            single: "SEN".to_string(),
            combined: ("DAM".to_string(), "VET".to_string()),
        }
    }
}

/// Direction of the weekly rank transform.
///
/// The all-riders sheet has always ranked the highest weekly sum first; the
/// quota sheet ranks the lowest first, consistent with its best-rider
/// selection. See DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamRankOrder {
    HighestFirst,
    LowestFirst,
}

/// One row of the running team classification.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamRow {
    pub team: String,
    /// Week number -> team rank that week.
    pub weeks: BTreeMap<u32, u32>,
    pub total: u32,
    pub period1: u32,
    pub period2: u32,
    pub place: u32,
}

impl TeamRow {
    fn new(team: &str) -> Self {
        Self {
            team: team.to_string(),
            weeks: BTreeMap::new(),
            total: 0,
            period1: 0,
            period2: 0,
            place: 0,
        }
    }
}

/// The running team classification table.
#[derive(Debug, Clone, Default)]
pub struct TeamStandings {
    pub rows: Vec<TeamRow>,
}

impl TeamStandings {
    pub fn get(&self, team: &str) -> Option<&TeamRow> {
        self.rows.iter().find(|r| r.team == team)
    }

    pub fn week_numbers(&self) -> Vec<u32> {
        let mut weeks: Vec<u32> = self
            .rows
            .iter()
            .flat_map(|r| r.weeks.keys().copied())
            .collect();
        weeks.sort_unstable();
        weeks.dedup();
        weeks
    }
}

/// Sum each team's weekly score from its riders' individual points.
///
/// Only riders with a real team count; `rider_points` is the full per-bib
/// point map of the week (absent riders already carry the ceiling).
pub fn team_week_scores(
    roster: &Roster,
    rider_points: &HashMap<u32, u32>,
    selection: &TeamSelection,
    ceiling: u32,
) -> HashMap<String, u32> {
    let mut members: HashMap<&str, Vec<(&str, u32)>> = HashMap::new();
    for rider in roster.teamed_riders() {
        if let Some(team) = rider.team.as_deref() {
            let points = rider_points.get(&rider.bib).copied().unwrap_or(ceiling);
            members
                .entry(team)
                .or_default()
                .push((rider.category.as_str(), points));
        }
    }

    members
        .into_iter()
        .map(|(team, riders)| {
            let score = match selection {
                TeamSelection::AllRiders => riders.iter().map(|(_, p)| *p).sum(),
                TeamSelection::Quota(rule) => quota_score(&riders, rule, ceiling),
            };
            (team.to_string(), score)
        })
        .collect()
}

fn quota_score(riders: &[(&str, u32)], rule: &QuotaRule, ceiling: u32) -> u32 {
    let mut selected = Vec::with_capacity(4);
    selected.extend(best_of(riders, |cat| cat == rule.double, 2, ceiling));
    selected.extend(best_of(riders, |cat| cat == rule.single, 1, ceiling));
    selected.extend(best_of(
        riders,
        |cat| cat == rule.combined.0 || cat == rule.combined.1,
        1,
        ceiling,
    ));
    selected.iter().sum()
}

/// The `count` lowest point values among riders matching the category
/// predicate, padded with `ceiling` when fewer qualify.
fn best_of(
    riders: &[(&str, u32)],
    matches: impl Fn(&str) -> bool,
    count: usize,
    ceiling: u32,
) -> Vec<u32> {
    let mut points: Vec<u32> = riders
        .iter()
        .filter(|(cat, _)| matches(cat))
        .map(|(_, p)| *p)
        .collect();
    points.sort_unstable();
    points.truncate(count);
    while points.len() < count {
        points.push(ceiling);
    }
    points
}

/// Rank-transform weekly team sums. Ties share the minimum rank.
pub fn rank_teams(scores: &HashMap<String, u32>, order: TeamRankOrder) -> HashMap<String, u32> {
    scores
        .iter()
        .map(|(team, score)| {
            let better = scores
                .values()
                .filter(|other| match order {
                    TeamRankOrder::HighestFirst => **other > *score,
                    TeamRankOrder::LowestFirst => **other < *score,
                })
                .count() as u32;
            (team.clone(), better + 1)
        })
        .collect()
}

/// Merge one week's team ranks into the standings.
///
/// The row set is the union of known teams and this week's teams; cells a
/// team has no rank for (week missed, team joined late) fill with 0, as the
/// team sheets have always done.
pub fn apply_team_week(standings: &mut TeamStandings, week: u32, ranks: &HashMap<String, u32>) {
    let prior_weeks = standings.week_numbers();

    for (team, rank) in ranks {
        match standings.rows.iter_mut().find(|r| &r.team == team) {
            Some(row) => {
                row.weeks.insert(week, *rank);
            }
            None => {
                let mut row = TeamRow::new(team);
                row.weeks.insert(week, *rank);
                standings.rows.push(row);
            }
        }
    }

    for row in &mut standings.rows {
        for w in prior_weeks.iter().chain(std::iter::once(&week)) {
            row.weeks.entry(*w).or_insert(0);
        }
    }
}

/// Recompute totals, the period split and final places, and sort by total.
pub fn recompute_teams(standings: &mut TeamStandings, period_two_start: Option<u32>) {
    for row in &mut standings.rows {
        let all: Vec<u32> = row.weeks.values().copied().collect();
        row.total = Aggregation::PlainSum.total(&all);

        let mut p1 = Vec::new();
        let mut p2 = Vec::new();
        for (week, value) in &row.weeks {
            match period_two_start {
                Some(start) if *week >= start => p2.push(*value),
                _ => p1.push(*value),
            }
        }
        row.period1 = Aggregation::PlainSum.total(&p1);
        row.period2 = Aggregation::PlainSum.total(&p2);
    }

    standings.rows.sort_by(|a, b| {
        a.total
            .cmp(&b.total)
            .then_with(|| a.team.cmp(&b.team))
    });
    for (i, row) in standings.rows.iter_mut().enumerate() {
        row.place = i as u32 + 1;
    }
}
