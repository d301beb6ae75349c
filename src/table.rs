use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::matches::{Match, Outcome};

pub const POINTS_WIN: u32 = 3;
pub const POINTS_DRAW: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueTableRow {
    pub team: String,
    pub played: u32,
    pub points: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i64,
}

impl LeagueTableRow {
    fn new(team: &str) -> Self {
        Self {
            team: team.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, scored: u32, conceded: u32, result: Ordering) {
        self.played += 1;
        self.goals_for += scored;
        self.goals_against += conceded;
        self.goal_difference += scored as i64 - conceded as i64;
        match result {
            Ordering::Greater => {
                self.wins += 1;
                self.points += POINTS_WIN;
            }
            Ordering::Equal => {
                self.draws += 1;
                self.points += POINTS_DRAW;
            }
            Ordering::Less => self.losses += 1,
        }
    }
}

/// Standings ordering: points, goal difference, goals scored (all descending),
/// then team name ascending. Distinct teams never compare equal.
pub fn ranking_order(a: &LeagueTableRow, b: &LeagueTableRow) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.goal_difference.cmp(&a.goal_difference))
        .then_with(|| b.goals_for.cmp(&a.goals_for))
        .then_with(|| a.team.cmp(&b.team))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableBuilder {
    rows: BTreeMap<String, LeagueTableRow>,
}

impl TableBuilder {
    pub fn with_teams<'a, I>(teams: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = Self::default();
        for team in teams {
            out.ensure(team);
        }
        out
    }

    fn ensure(&mut self, team: &str) -> &mut LeagueTableRow {
        self.rows
            .entry(team.to_string())
            .or_insert_with(|| LeagueTableRow::new(team))
    }

    pub fn apply_score(&mut self, home: &str, away: &str, home_goals: u32, away_goals: u32) {
        let result = home_goals.cmp(&away_goals);
        self.ensure(home).record(home_goals, away_goals, result);
        self.ensure(away).record(away_goals, home_goals, result.reverse());
    }

    /// Applies a decided outcome with a nominal scoreline: the winner is
    /// credited `margin` goals to nil, a draw leaves goals untouched.
    pub fn apply_outcome(&mut self, home: &str, away: &str, outcome: Outcome, margin: u32) {
        let (hg, ag) = match outcome {
            Outcome::HomeWin => (margin, 0),
            Outcome::Draw => (0, 0),
            Outcome::AwayWin => (0, margin),
        };
        let result = match outcome {
            Outcome::HomeWin => Ordering::Greater,
            Outcome::Draw => Ordering::Equal,
            Outcome::AwayWin => Ordering::Less,
        };
        self.ensure(home).record(hg, ag, result);
        self.ensure(away).record(ag, hg, result.reverse());
    }

    pub fn apply_played(&mut self, m: &Match) {
        if let Some((hg, ag)) = m.score() {
            self.apply_score(&m.home, &m.away, hg as u32, ag as u32);
        }
    }

    pub fn finish(self) -> LeagueTable {
        let mut rows: Vec<LeagueTableRow> = self.rows.into_values().collect();
        rows.sort_by(ranking_order);
        LeagueTable { rows }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueTable {
    pub rows: Vec<LeagueTableRow>,
}

impl LeagueTable {
    pub fn from_matches(matches: &[Match]) -> Self {
        let teams = matches
            .iter()
            .flat_map(|m| [m.home.as_str(), m.away.as_str()]);
        let mut builder = TableBuilder::with_teams(teams);
        for m in matches {
            builder.apply_played(m);
        }
        builder.finish()
    }

    pub fn position(&self, team: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.team == team).map(|i| i + 1)
    }

    pub fn row(&self, team: &str) -> Option<&LeagueTableRow> {
        self.rows.iter().find(|r| r.team == team)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_accumulate() {
        let table = LeagueTable::from_matches(&[
            Match::played(None, 1, "A", "B", 2, 0),
            Match::played(None, 2, "B", "A", 1, 1),
            Match::scheduled(None, 3, "A", "C"),
        ]);
        let a = table.row("A").unwrap();
        assert_eq!((a.points, a.wins, a.draws, a.losses), (4, 1, 1, 0));
        assert_eq!((a.goals_for, a.goals_against, a.goal_difference), (3, 1, 2));
        let c = table.row("C").unwrap();
        assert_eq!(c.played, 0);
        assert_eq!(table.position("A"), Some(1));
        assert_eq!(table.position("C"), Some(3));
    }

    #[test]
    fn ties_break_on_gd_then_goals_then_name() {
        let mut b = TableBuilder::default();
        b.apply_score("Zeta", "X", 3, 0);
        b.apply_score("Alpha", "Y", 1, 0);
        b.apply_score("Beta", "W", 1, 0);
        b.apply_score("Gamma", "V", 2, 1);
        let table = b.finish();
        let top: Vec<&str> = table.rows.iter().take(4).map(|r| r.team.as_str()).collect();
        assert_eq!(top, ["Zeta", "Gamma", "Alpha", "Beta"]);
    }

    #[test]
    fn ordering_is_strict_between_distinct_teams() {
        let a = LeagueTableRow::new("A");
        let b = LeagueTableRow::new("B");
        assert_eq!(ranking_order(&a, &b), Ordering::Less);
        assert_eq!(ranking_order(&b, &a), Ordering::Greater);
    }

    #[test]
    fn nominal_outcomes_use_margin() {
        let mut b = TableBuilder::with_teams(["H", "A"]);
        b.apply_outcome("H", "A", Outcome::AwayWin, 1);
        b.apply_outcome("H", "A", Outcome::Draw, 1);
        let table = b.finish();
        let away = table.row("A").unwrap();
        assert_eq!((away.points, away.goals_for, away.goals_against), (4, 1, 0));
        assert_eq!(table.position("A"), Some(1));
    }

    #[test]
    fn serialized_rows_carry_goal_difference() {
        let table = LeagueTable::from_matches(&[Match::played(None, 1, "A", "B", 0, 3)]);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["rows"][0]["team"], "B");
        assert_eq!(json["rows"][0]["goal_difference"], 3);
        assert_eq!(json["rows"][1]["goal_difference"], -3);
    }
}
