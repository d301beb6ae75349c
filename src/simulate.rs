use std::cmp::Ordering;
use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineResult;
use crate::form::TeamStatsTable;
use crate::matches::{DEFAULT_MAX_ROUND, Match, Outcome, sort_chronologically, team_names};
use crate::model::TrainedModel;
use crate::predict::{PredictionResult, predict};
use crate::table::{LeagueTable, TableBuilder};

pub const DEFAULT_RUNS: usize = 1000;
pub const DEFAULT_NOMINAL_MARGIN: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub runs: usize,
    pub seed: Option<u64>,
    pub max_round: u32,
    pub nominal_margin: u32,
    pub parallel: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            runs: DEFAULT_RUNS,
            seed: None,
            max_round: DEFAULT_MAX_ROUND,
            nominal_margin: DEFAULT_NOMINAL_MARGIN,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFixture {
    pub round: u32,
    pub home: String,
    pub away: String,
    pub probs: PredictionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedRow {
    pub team: String,
    pub played: f64,
    pub points: f64,
    pub wins: f64,
    pub draws: f64,
    pub losses: f64,
    pub goals_for: f64,
    pub goals_against: f64,
    pub goal_difference: f64,
    pub expected_position: f64,
    /// `position_probs[i]` is the share of runs finishing in position `i + 1`.
    pub position_probs: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedTable {
    pub target_round: u32,
    pub runs: usize,
    pub simulated_fixtures: usize,
    pub seed: Option<u64>,
    pub rows: Vec<ProjectedRow>,
}

impl ProjectedTable {
    pub fn from_known(table: &LeagueTable, target_round: u32) -> Self {
        let n = table.len();
        let rows = table
            .rows
            .iter()
            .enumerate()
            .map(|(pos, r)| {
                let mut position_probs = vec![0.0; n];
                position_probs[pos] = 1.0;
                ProjectedRow {
                    team: r.team.clone(),
                    played: r.played as f64,
                    points: r.points as f64,
                    wins: r.wins as f64,
                    draws: r.draws as f64,
                    losses: r.losses as f64,
                    goals_for: r.goals_for as f64,
                    goals_against: r.goals_against as f64,
                    goal_difference: r.goal_difference as f64,
                    expected_position: (pos + 1) as f64,
                    position_probs,
                }
            })
            .collect();
        Self {
            target_round,
            runs: 0,
            simulated_fixtures: 0,
            seed: None,
            rows,
        }
    }

    pub fn row(&self, team: &str) -> Option<&ProjectedRow> {
        self.rows.iter().find(|r| r.team == team)
    }

    pub fn position(&self, team: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.team == team).map(|i| i + 1)
    }
}

pub fn draw_outcome<R: Rng + ?Sized>(rng: &mut R, probs: &PredictionResult) -> Outcome {
    let u: f64 = rng.r#gen();
    if u < probs.home_win {
        Outcome::HomeWin
    } else if u < probs.home_win + probs.draw {
        Outcome::Draw
    } else {
        Outcome::AwayWin
    }
}

pub fn schedule_fixtures(
    target_round: u32,
    unplayed: &[Match],
    model: &TrainedModel,
    stats: &TeamStatsTable,
) -> EngineResult<Vec<ScheduledFixture>> {
    let mut pending: Vec<Match> = unplayed
        .iter()
        .filter(|m| !m.is_played() && m.round <= target_round)
        .cloned()
        .collect();
    sort_chronologically(&mut pending);
    pending
        .into_iter()
        .map(|m| {
            let probs = predict(&m.home, &m.away, model, stats)?;
            Ok(ScheduledFixture {
                round: m.round,
                home: m.home,
                away: m.away,
                probs,
            })
        })
        .collect()
}

pub fn simulate_run<R: Rng + ?Sized>(
    base: &TableBuilder,
    fixtures: &[ScheduledFixture],
    nominal_margin: u32,
    rng: &mut R,
) -> LeagueTable {
    let mut table = base.clone();
    for f in fixtures {
        let outcome = draw_outcome(rng, &f.probs);
        table.apply_outcome(&f.home, &f.away, outcome, nominal_margin);
    }
    table.finish()
}

/// Projects standings at `target_round` by Monte Carlo completion of the
/// remaining fixtures.
///
/// Every run starts from the played results and draws each pending fixture
/// once, in round order. Runs are averaged: with `runs == 1` the projection is
/// that single completion. When nothing is pending at or below the (clamped)
/// target round, the known table is returned without sampling.
pub fn simulate(
    target_round: u32,
    unplayed: &[Match],
    played: &[Match],
    model: &TrainedModel,
    stats: &TeamStatsTable,
    cfg: &SimulationConfig,
) -> EngineResult<ProjectedTable> {
    let target_round = target_round.min(cfg.max_round);

    let mut all: Vec<Match> = played.iter().filter(|m| m.is_played()).cloned().collect();
    let teams = {
        let mut names = team_names(&all);
        names.extend(team_names(unplayed));
        names.sort();
        names.dedup();
        names
    };
    sort_chronologically(&mut all);
    let mut base = TableBuilder::with_teams(teams.iter().map(String::as_str));
    for m in &all {
        base.apply_played(m);
    }

    let fixtures = schedule_fixtures(target_round, unplayed, model, stats)?;
    if fixtures.is_empty() {
        debug!(target_round, "no pending fixtures, returning known table");
        return Ok(ProjectedTable::from_known(&base.finish(), target_round));
    }

    let runs = cfg.runs.max(1);
    let seed = cfg.seed.unwrap_or_else(rand::random);
    let index: HashMap<&str, usize> = teams
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let one_run = |mut acc: Tally, run: usize| {
        let mut rng = run_rng(seed, run);
        let table = simulate_run(&base, &fixtures, cfg.nominal_margin, &mut rng);
        acc.add(&table, &index);
        acc
    };
    let tally = if cfg.parallel {
        (0..runs)
            .into_par_iter()
            .fold(|| Tally::new(teams.len()), one_run)
            .reduce(|| Tally::new(teams.len()), Tally::merge)
    } else {
        (0..runs).fold(Tally::new(teams.len()), one_run)
    };

    let rows = tally.into_rows(&teams, runs);
    info!(
        target_round,
        runs,
        fixtures = fixtures.len(),
        seed,
        "simulated remaining fixtures"
    );
    Ok(ProjectedTable {
        target_round,
        runs,
        simulated_fixtures: fixtures.len(),
        seed: Some(seed),
        rows,
    })
}

fn run_rng(seed: u64, run: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(run as u64);
    rng
}

#[derive(Debug, Clone, Copy, Default)]
struct TeamTally {
    played: u64,
    points: u64,
    wins: u64,
    draws: u64,
    losses: u64,
    goals_for: u64,
    goals_against: u64,
}

/// Integer sums over runs; merging in any order gives the same totals.
#[derive(Debug, Clone)]
struct Tally {
    teams: Vec<TeamTally>,
    positions: Vec<Vec<u64>>,
}

impl Tally {
    fn new(n: usize) -> Self {
        Self {
            teams: vec![TeamTally::default(); n],
            positions: vec![vec![0; n]; n],
        }
    }

    fn add(&mut self, table: &LeagueTable, index: &HashMap<&str, usize>) {
        for (pos, row) in table.rows.iter().enumerate() {
            let Some(&i) = index.get(row.team.as_str()) else {
                continue;
            };
            let t = &mut self.teams[i];
            t.played += row.played as u64;
            t.points += row.points as u64;
            t.wins += row.wins as u64;
            t.draws += row.draws as u64;
            t.losses += row.losses as u64;
            t.goals_for += row.goals_for as u64;
            t.goals_against += row.goals_against as u64;
            if let Some(slot) = self.positions[i].get_mut(pos) {
                *slot += 1;
            }
        }
    }

    fn merge(mut self, other: Tally) -> Tally {
        for (a, b) in self.teams.iter_mut().zip(other.teams) {
            a.played += b.played;
            a.points += b.points;
            a.wins += b.wins;
            a.draws += b.draws;
            a.losses += b.losses;
            a.goals_for += b.goals_for;
            a.goals_against += b.goals_against;
        }
        for (a, b) in self.positions.iter_mut().zip(other.positions) {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
        }
        self
    }

    fn into_rows(self, teams: &[String], runs: usize) -> Vec<ProjectedRow> {
        let n = runs as f64;
        let mut rows: Vec<ProjectedRow> = teams
            .iter()
            .zip(self.teams.into_iter().zip(self.positions))
            .map(|(team, (t, positions))| {
                let position_probs: Vec<f64> = positions.iter().map(|c| *c as f64 / n).collect();
                let expected_position = positions
                    .iter()
                    .enumerate()
                    .map(|(pos, c)| (pos + 1) as f64 * *c as f64)
                    .sum::<f64>()
                    / n;
                ProjectedRow {
                    team: team.clone(),
                    played: t.played as f64 / n,
                    points: t.points as f64 / n,
                    wins: t.wins as f64 / n,
                    draws: t.draws as f64 / n,
                    losses: t.losses as f64 / n,
                    goals_for: t.goals_for as f64 / n,
                    goals_against: t.goals_against as f64 / n,
                    goal_difference: (t.goals_for as f64 - t.goals_against as f64) / n,
                    expected_position,
                    position_probs,
                }
            })
            .collect();
        rows.sort_by(projected_order);
        rows
    }
}

fn projected_order(a: &ProjectedRow, b: &ProjectedRow) -> Ordering {
    b.points
        .total_cmp(&a.points)
        .then_with(|| b.goal_difference.total_cmp(&a.goal_difference))
        .then_with(|| b.goals_for.total_cmp(&a.goals_for))
        .then_with(|| a.team.cmp(&b.team))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn certain(outcome: Outcome) -> PredictionResult {
        let mut p = PredictionResult {
            home_win: 0.0,
            draw: 0.0,
            away_win: 0.0,
        };
        match outcome {
            Outcome::HomeWin => p.home_win = 1.0,
            Outcome::Draw => p.draw = 1.0,
            Outcome::AwayWin => p.away_win = 1.0,
        }
        p
    }

    #[test]
    fn certain_probabilities_always_draw_their_outcome() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for outcome in [Outcome::HomeWin, Outcome::Draw, Outcome::AwayWin] {
            for _ in 0..50 {
                assert_eq!(draw_outcome(&mut rng, &certain(outcome)), outcome);
            }
        }
    }

    #[test]
    fn draw_frequencies_follow_probabilities() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let p = PredictionResult {
            home_win: 0.5,
            draw: 0.3,
            away_win: 0.2,
        };
        let mut counts = [0usize; 3];
        for _ in 0..20_000 {
            match draw_outcome(&mut rng, &p) {
                Outcome::HomeWin => counts[0] += 1,
                Outcome::Draw => counts[1] += 1,
                Outcome::AwayWin => counts[2] += 1,
            }
        }
        let home = counts[0] as f64 / 20_000.0;
        let draw = counts[1] as f64 / 20_000.0;
        assert!((home - 0.5).abs() < 0.02);
        assert!((draw - 0.3).abs() < 0.02);
    }

    #[test]
    fn zero_sample_takes_home_branch() {
        let mut rng = StepRng::new(0, 0);
        assert_eq!(draw_outcome(&mut rng, &PredictionResult::uniform()), Outcome::HomeWin);
    }

    #[test]
    fn run_applies_every_fixture_once() {
        let base = TableBuilder::with_teams(["A", "B", "C"]);
        let fixtures = vec![
            ScheduledFixture {
                round: 1,
                home: "A".into(),
                away: "B".into(),
                probs: certain(Outcome::HomeWin),
            },
            ScheduledFixture {
                round: 2,
                home: "C".into(),
                away: "A".into(),
                probs: certain(Outcome::Draw),
            },
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let table = simulate_run(&base, &fixtures, 1, &mut rng);
        let a = table.row("A").unwrap();
        assert_eq!((a.played, a.points, a.goals_for), (2, 4, 1));
        assert_eq!(table.position("A"), Some(1));
        assert_eq!(table.row("B").unwrap().losses, 1);
    }

    #[test]
    fn tally_averages_runs() {
        let teams = vec!["A".to_string(), "B".to_string()];
        let index: HashMap<&str, usize> = [("A", 0), ("B", 1)].into_iter().collect();
        let mut first = TableBuilder::default();
        first.apply_score("A", "B", 1, 0);
        let mut second = TableBuilder::default();
        second.apply_score("A", "B", 0, 2);

        let mut tally = Tally::new(2);
        tally.add(&first.finish(), &index);
        tally.add(&second.finish(), &index);
        let rows = tally.into_rows(&teams, 2);

        let a = rows.iter().find(|r| r.team == "A").unwrap();
        assert_eq!(a.points, 1.5);
        assert_eq!(a.goal_difference, -0.5);
        assert_eq!(a.position_probs, vec![0.5, 0.5]);
        assert_eq!(a.expected_position, 1.5);
        // B edges A on goal difference.
        assert_eq!(rows[0].team, "B");
    }
}
