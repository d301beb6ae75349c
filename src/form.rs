use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::elo::{BASE_RATING, EloBook, EloConfig};
use crate::error::{EngineError, EngineResult};
use crate::matches::{Match, Outcome, classify_outcome, sort_by_kickoff};

pub const DEFAULT_FORM_WINDOW: usize = 5;

/// Fewest played matches a model may be trained on. This is the only place the
/// threshold lives; the trainer relies on [`FeatureSet`] having passed it.
pub const MIN_TRAINING_MATCHES: usize = 10;

// Placeholders used before the league has produced any result.
const DEFAULT_GOALS_PER_TEAM: f64 = 1.30;
const DEFAULT_POINTS_PER_GAME: f64 = 1.35;
// Matches needed before the running league averages fully replace the placeholders.
const LEAGUE_AVG_MIN_N: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormConfig {
    pub window: usize,
    pub min_matches: usize,
    pub elo: EloConfig,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_FORM_WINDOW,
            min_matches: MIN_TRAINING_MATCHES,
            elo: EloConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub matches_played: u32,
    pub form_ppg: f64,
    pub goals_for: f64,
    pub goals_against: f64,
    pub home_goals_for: f64,
    pub home_goals_against: f64,
    pub away_goals_for: f64,
    pub away_goals_against: f64,
    pub elo: f64,
}

impl TeamStats {
    pub fn neutral(league: &LeagueAverages) -> Self {
        let goals = league.goals_per_team();
        Self {
            matches_played: 0,
            form_ppg: league.points_per_game(),
            goals_for: goals,
            goals_against: goals,
            home_goals_for: goals,
            home_goals_against: goals,
            away_goals_for: goals,
            away_goals_against: goals,
            elo: BASE_RATING,
        }
    }

    pub fn venue_goals(&self, venue: Venue) -> (f64, f64) {
        match venue {
            Venue::Home => (self.home_goals_for, self.home_goals_against),
            Venue::Away => (self.away_goals_for, self.away_goals_against),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LeagueAverages {
    matches: usize,
    goals: f64,
    points: f64,
}

impl LeagueAverages {
    fn record(&mut self, home_goals: u8, away_goals: u8) {
        self.matches += 1;
        self.goals += home_goals as f64 + away_goals as f64;
        // Two teams per match: 3 points for a decisive result, 2 for a draw.
        self.points += if home_goals == away_goals { 2.0 } else { 3.0 };
    }

    fn weight(&self) -> f64 {
        (self.matches as f64 / LEAGUE_AVG_MIN_N).clamp(0.0, 1.0)
    }

    pub fn goals_per_team(&self) -> f64 {
        if self.matches == 0 {
            return DEFAULT_GOALS_PER_TEAM;
        }
        let raw = self.goals / (2.0 * self.matches as f64);
        let w = self.weight();
        (1.0 - w) * DEFAULT_GOALS_PER_TEAM + w * raw
    }

    pub fn points_per_game(&self) -> f64 {
        if self.matches == 0 {
            return DEFAULT_POINTS_PER_GAME;
        }
        let raw = self.points / (2.0 * self.matches as f64);
        let w = self.weight();
        (1.0 - w) * DEFAULT_POINTS_PER_GAME + w * raw
    }
}

#[derive(Debug, Clone, Copy)]
struct Appearance {
    scored: u8,
    conceded: u8,
}

impl Appearance {
    fn points(self) -> u32 {
        match classify_outcome(self.scored, self.conceded) {
            Outcome::HomeWin => 3,
            Outcome::Draw => 1,
            Outcome::AwayWin => 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TeamHistory {
    played: u32,
    recent: VecDeque<Appearance>,
    home: VecDeque<Appearance>,
    away: VecDeque<Appearance>,
}

impl TeamHistory {
    fn push(&mut self, venue: Venue, app: Appearance, window: usize) {
        self.played += 1;
        push_bounded(&mut self.recent, app, window);
        match venue {
            Venue::Home => push_bounded(&mut self.home, app, window),
            Venue::Away => push_bounded(&mut self.away, app, window),
        }
    }

    fn snapshot(&self, elo: f64, league: &LeagueAverages) -> TeamStats {
        if self.recent.is_empty() {
            return TeamStats {
                elo,
                ..TeamStats::neutral(league)
            };
        }
        let (goals_for, goals_against) = goal_means(&self.recent);
        let form_ppg =
            self.recent.iter().map(|a| a.points() as f64).sum::<f64>() / self.recent.len() as f64;
        // An empty venue split borrows the overall rolling figures.
        let (home_goals_for, home_goals_against) = if self.home.is_empty() {
            (goals_for, goals_against)
        } else {
            goal_means(&self.home)
        };
        let (away_goals_for, away_goals_against) = if self.away.is_empty() {
            (goals_for, goals_against)
        } else {
            goal_means(&self.away)
        };
        TeamStats {
            matches_played: self.played,
            form_ppg,
            goals_for,
            goals_against,
            home_goals_for,
            home_goals_against,
            away_goals_for,
            away_goals_against,
            elo,
        }
    }
}

fn push_bounded(buf: &mut VecDeque<Appearance>, app: Appearance, window: usize) {
    buf.push_back(app);
    while buf.len() > window {
        buf.pop_front();
    }
}

fn goal_means(apps: &VecDeque<Appearance>) -> (f64, f64) {
    let n = apps.len().max(1) as f64;
    let scored = apps.iter().map(|a| a.scored as f64).sum::<f64>();
    let conceded = apps.iter().map(|a| a.conceded as f64).sum::<f64>();
    (scored / n, conceded / n)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub round: u32,
    pub home: String,
    pub away: String,
    pub home_stats: TeamStats,
    pub away_stats: TeamStats,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStatsTable {
    teams: BTreeMap<String, TeamStats>,
}

impl TeamStatsTable {
    pub fn get(&self, team: &str) -> EngineResult<&TeamStats> {
        self.teams
            .get(team)
            .ok_or_else(|| EngineError::UnknownTeam(team.to_string()))
    }

    pub fn contains(&self, team: &str) -> bool {
        self.teams.contains_key(team)
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TeamStats)> {
        self.teams.iter()
    }
}

/// Output of the feature builder. Only [`build_features`] constructs it, so
/// holding one proves the minimum-data threshold was met.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    rows: Vec<TrainingRow>,
    team_stats: TeamStatsTable,
}

impl FeatureSet {
    pub fn rows(&self) -> &[TrainingRow] {
        &self.rows
    }

    pub fn team_stats(&self) -> &TeamStatsTable {
        &self.team_stats
    }

    pub fn into_parts(self) -> (Vec<TrainingRow>, TeamStatsTable) {
        (self.rows, self.team_stats)
    }
}

/// Unplayed records in `matches` are ignored.
pub fn build_features(matches: &[Match], cfg: &FormConfig) -> EngineResult<FeatureSet> {
    let mut played: Vec<Match> = matches.iter().filter(|m| m.is_played()).cloned().collect();
    let required = cfg.min_matches.max(1);
    if played.len() < required {
        return Err(EngineError::InsufficientData {
            played: played.len(),
            required,
        });
    }
    sort_by_kickoff(&mut played);

    let window = cfg.window.max(1);
    let mut histories: HashMap<String, TeamHistory> = HashMap::new();
    let mut elo = EloBook::new(cfg.elo);
    let mut league = LeagueAverages::default();
    let mut rows = Vec::with_capacity(played.len());

    for m in &played {
        let Some((hg, ag)) = m.score() else {
            continue;
        };
        let home_stats = stats_before(&histories, &m.home, &elo, &league);
        let away_stats = stats_before(&histories, &m.away, &elo, &league);
        rows.push(TrainingRow {
            round: m.round,
            home: m.home.clone(),
            away: m.away.clone(),
            home_stats,
            away_stats,
            outcome: classify_outcome(hg, ag),
        });

        histories.entry(m.home.clone()).or_default().push(
            Venue::Home,
            Appearance {
                scored: hg,
                conceded: ag,
            },
            window,
        );
        histories.entry(m.away.clone()).or_default().push(
            Venue::Away,
            Appearance {
                scored: ag,
                conceded: hg,
            },
            window,
        );
        elo.record(&m.home, &m.away, hg, ag);
        league.record(hg, ag);
    }

    let teams = histories
        .iter()
        .map(|(team, history)| (team.clone(), history.snapshot(elo.rating(team), &league)))
        .collect::<BTreeMap<_, _>>();

    debug!(
        rows = rows.len(),
        teams = teams.len(),
        window,
        "built rolling form features"
    );

    Ok(FeatureSet {
        rows,
        team_stats: TeamStatsTable { teams },
    })
}

fn stats_before(
    histories: &HashMap<String, TeamHistory>,
    team: &str,
    elo: &EloBook,
    league: &LeagueAverages,
) -> TeamStats {
    match histories.get(team) {
        Some(history) => history.snapshot(elo.rating(team), league),
        None => TeamStats {
            elo: elo.rating(team),
            ..TeamStats::neutral(league)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn round_robin() -> Vec<Match> {
        // A beats everyone, D loses to everyone, B and C draw.
        vec![
            Match::played(None, 1, "A", "B", 2, 0),
            Match::played(None, 1, "C", "D", 1, 0),
            Match::played(None, 2, "A", "C", 3, 1),
            Match::played(None, 2, "B", "D", 2, 1),
            Match::played(None, 3, "A", "D", 4, 0),
            Match::played(None, 3, "B", "C", 1, 1),
            Match::played(None, 4, "B", "A", 0, 1),
            Match::played(None, 4, "D", "C", 0, 2),
            Match::played(None, 5, "C", "A", 0, 2),
            Match::played(None, 5, "D", "B", 1, 3),
        ]
    }

    #[test]
    fn too_few_matches_is_insufficient() {
        let mut matches = round_robin();
        matches.pop();
        let err = build_features(&matches, &FormConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData {
                played: 9,
                required: 10
            }
        ));
    }

    #[test]
    fn unplayed_fixtures_do_not_count() {
        let mut matches = round_robin();
        matches.pop();
        matches.push(Match::scheduled(None, 5, "D", "B"));
        assert!(build_features(&matches, &FormConfig::default()).is_err());
    }

    #[test]
    fn first_appearance_gets_neutral_stats() {
        let set = build_features(&round_robin(), &FormConfig::default()).unwrap();
        let first = &set.rows()[0];
        assert_eq!(first.home, "A");
        assert_eq!(first.home_stats.matches_played, 0);
        assert_eq!(first.home_stats.goals_for, DEFAULT_GOALS_PER_TEAM);
        assert_eq!(first.home_stats.form_ppg, DEFAULT_POINTS_PER_GAME);
        assert_eq!(first.home_stats.elo, BASE_RATING);
    }

    #[test]
    fn row_features_exclude_own_result() {
        let set = build_features(&round_robin(), &FormConfig::default()).unwrap();
        // A's second match: only the 2-0 over B is known.
        let row = set
            .rows()
            .iter()
            .find(|r| r.home == "A" && r.away == "C")
            .unwrap();
        assert_eq!(row.home_stats.matches_played, 1);
        assert_eq!(row.home_stats.goals_for, 2.0);
        assert_eq!(row.home_stats.goals_against, 0.0);
        assert_eq!(row.home_stats.form_ppg, 3.0);
        assert_eq!(row.outcome, Outcome::HomeWin);
    }

    #[test]
    fn postponed_result_stays_out_of_earlier_rows() {
        let day = |m, d| NaiveDate::from_ymd_opt(2025, m, d);
        let matches = vec![
            Match::played(day(4, 1), 1, "A", "B", 1, 0),
            Match::played(day(4, 1), 1, "C", "D", 0, 0),
            Match::played(day(4, 8), 2, "C", "A", 0, 2),
            Match::played(day(4, 8), 2, "B", "D", 1, 1),
            // Round 3 was postponed to June.
            Match::played(day(6, 1), 3, "D", "A", 9, 0),
            Match::played(day(6, 1), 3, "B", "C", 1, 0),
            Match::played(day(4, 15), 4, "B", "A", 0, 1),
            Match::played(day(4, 15), 4, "D", "C", 1, 1),
            Match::played(day(4, 22), 5, "A", "C", 1, 0),
            Match::played(day(4, 22), 5, "D", "B", 0, 0),
            Match::played(day(4, 29), 6, "A", "D", 2, 0),
            Match::played(day(4, 29), 6, "C", "B", 1, 1),
        ];
        let set = build_features(&matches, &FormConfig::default()).unwrap();
        let row = set
            .rows()
            .iter()
            .find(|r| r.home == "B" && r.away == "A")
            .unwrap();
        assert_eq!(row.away_stats.matches_played, 2);
        assert_eq!(row.away_stats.goals_against, 0.0);
        // June is the newest result, so it is last in every rolling window.
        assert_eq!(set.rows().last().map(|r| r.round), Some(3));
        let a = set.team_stats().get("A").unwrap();
        assert_eq!(a.matches_played, 6);
        assert_eq!(a.away_goals_against, 3.0);
    }

    #[test]
    fn current_stats_cover_every_team() {
        let set = build_features(&round_robin(), &FormConfig::default()).unwrap();
        let stats = set.team_stats();
        assert_eq!(stats.len(), 4);
        let a = stats.get("A").unwrap();
        let d = stats.get("D").unwrap();
        assert_eq!(a.form_ppg, 3.0);
        assert_eq!(d.form_ppg, 0.0);
        assert!(a.elo > d.elo);
        assert!(matches!(stats.get("Z"), Err(EngineError::UnknownTeam(_))));
    }

    #[test]
    fn window_bounds_rolling_average() {
        let cfg = FormConfig {
            window: 2,
            ..FormConfig::default()
        };
        let set = build_features(&round_robin(), &cfg).unwrap();
        // A's last two: 1-0 away at B, 2-0 away at C.
        let a = set.team_stats().get("A").unwrap();
        assert_eq!(a.goals_for, 1.5);
        assert_eq!(a.away_goals_for, 1.5);
        assert_eq!(a.home_goals_for, 3.5);
        assert_eq!(a.matches_played, 5);
    }
}
