use serde::{Deserialize, Serialize};

use crate::elo::BASE_RATING;
use crate::error::{EngineError, EngineResult};
use crate::form::{TeamStats, Venue};

pub const STAT_FEATURE_NAMES: [&str; 6] = [
    "form_ppg",
    "goals_for",
    "goals_against",
    "venue_goals_for",
    "venue_goals_against",
    "elo",
];

const HOME_TEAM_PREFIX: &str = "home_team=";
const AWAY_TEAM_PREFIX: &str = "away_team=";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamEncoder {
    teams: Vec<String>,
}

impl TeamEncoder {
    pub fn fit<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut teams: Vec<String> = names.into_iter().map(str::to_string).collect();
        teams.sort();
        teams.dedup();
        Self { teams }
    }

    pub fn index(&self, team: &str) -> EngineResult<usize> {
        self.teams
            .binary_search_by(|t| t.as_str().cmp(team))
            .map_err(|_| EngineError::UnknownTeam(team.to_string()))
    }

    pub fn contains(&self, team: &str) -> bool {
        self.index(team).is_ok()
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SideInput<'a> {
    pub team: &'a str,
    pub stats: &'a TeamStats,
}

/// Ordered feature names the classifier was fitted on. Vectors are always
/// assembled by name through this list, never by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumns(Vec<String>);

impl FeatureColumns {
    pub fn for_encoder(encoder: &TeamEncoder) -> Self {
        let mut cols = Vec::with_capacity(2 * STAT_FEATURE_NAMES.len() + 2 * encoder.len());
        for side in ["home", "away"] {
            for name in STAT_FEATURE_NAMES {
                cols.push(format!("{side}.{name}"));
            }
        }
        for team in encoder.teams() {
            cols.push(format!("{HOME_TEAM_PREFIX}{team}"));
        }
        for team in encoder.teams() {
            cols.push(format!("{AWAY_TEAM_PREFIX}{team}"));
        }
        Self(cols)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn assemble(&self, home: SideInput<'_>, away: SideInput<'_>) -> EngineResult<Vec<f64>> {
        self.0
            .iter()
            .map(|col| feature_value(col, home, away))
            .collect()
    }
}

fn feature_value(column: &str, home: SideInput<'_>, away: SideInput<'_>) -> EngineResult<f64> {
    if let Some(team) = column.strip_prefix(HOME_TEAM_PREFIX) {
        return Ok(indicator(home.team == team));
    }
    if let Some(team) = column.strip_prefix(AWAY_TEAM_PREFIX) {
        return Ok(indicator(away.team == team));
    }
    let (side, name) = column
        .split_once('.')
        .ok_or_else(|| EngineError::UnknownFeature(column.to_string()))?;
    let (input, venue) = match side {
        "home" => (home, Venue::Home),
        "away" => (away, Venue::Away),
        _ => return Err(EngineError::UnknownFeature(column.to_string())),
    };
    stat_value(name, input.stats, venue).ok_or_else(|| EngineError::UnknownFeature(column.to_string()))
}

fn stat_value(name: &str, stats: &TeamStats, venue: Venue) -> Option<f64> {
    let (venue_for, venue_against) = stats.venue_goals(venue);
    let v = match name {
        "form_ppg" => stats.form_ppg,
        "goals_for" => stats.goals_for,
        "goals_against" => stats.goals_against,
        "venue_goals_for" => venue_for,
        "venue_goals_against" => venue_against,
        // Hundreds of points above the starting rating.
        "elo" => (stats.elo - BASE_RATING) / 100.0,
        _ => return None,
    };
    Some(v)
}

fn indicator(on: bool) -> f64 {
    if on { 1.0 } else { 0.0 }
}
