use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_MAX_ROUND: u32 = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::HomeWin => "home_win",
            Outcome::Draw => "draw",
            Outcome::AwayWin => "away_win",
        }
    }
}

pub fn classify_outcome(home_goals: u8, away_goals: u8) -> Outcome {
    if home_goals > away_goals {
        Outcome::HomeWin
    } else if home_goals < away_goals {
        Outcome::AwayWin
    } else {
        Outcome::Draw
    }
}

/// Field aliases accept the collector's column names so a raw export can be
/// deserialized without a mapping step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(default, alias = "Date", deserialize_with = "de_date")]
    pub date: Option<NaiveDate>,
    #[serde(alias = "Rodada", deserialize_with = "de_round")]
    pub round: u32,
    #[serde(alias = "HomeTeam")]
    pub home: String,
    #[serde(alias = "AwayTeam")]
    pub away: String,
    #[serde(default, alias = "FTHG", deserialize_with = "de_goals")]
    pub home_goals: Option<u8>,
    #[serde(default, alias = "FTAG", deserialize_with = "de_goals")]
    pub away_goals: Option<u8>,
}

impl Match {
    pub fn played(
        date: Option<NaiveDate>,
        round: u32,
        home: &str,
        away: &str,
        home_goals: u8,
        away_goals: u8,
    ) -> Self {
        Self {
            date,
            round,
            home: home.to_string(),
            away: away.to_string(),
            home_goals: Some(home_goals),
            away_goals: Some(away_goals),
        }
    }

    pub fn scheduled(date: Option<NaiveDate>, round: u32, home: &str, away: &str) -> Self {
        Self {
            date,
            round,
            home: home.to_string(),
            away: away.to_string(),
            home_goals: None,
            away_goals: None,
        }
    }

    pub fn is_played(&self) -> bool {
        self.home_goals.is_some() && self.away_goals.is_some()
    }

    pub fn score(&self) -> Option<(u8, u8)> {
        Some((self.home_goals?, self.away_goals?))
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.score().map(|(h, a)| classify_outcome(h, a))
    }

    pub fn involves(&self, team: &str) -> bool {
        self.home == team || self.away == team
    }
}

pub fn validate_matches(matches: &[Match], max_round: u32) -> EngineResult<()> {
    for (index, m) in matches.iter().enumerate() {
        let reason = if m.home_goals.is_some() != m.away_goals.is_some() {
            Some("only one side has a score".to_string())
        } else if m.round == 0 || m.round > max_round {
            Some(format!("round {} outside 1..={max_round}", m.round))
        } else if m.home.trim().is_empty() || m.away.trim().is_empty() {
            Some("empty team name".to_string())
        } else if m.home == m.away {
            Some(format!("{} cannot play itself", m.home))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(EngineError::InvalidMatch { index, reason });
        }
    }
    Ok(())
}

pub fn split_played(matches: &[Match]) -> (Vec<Match>, Vec<Match>) {
    let (mut played, mut unplayed): (Vec<Match>, Vec<Match>) =
        matches.iter().cloned().partition(Match::is_played);
    sort_chronologically(&mut played);
    sort_chronologically(&mut unplayed);
    (played, unplayed)
}

/// Orders by round, then date, then team names so equal inputs always give
/// equal sequences.
pub fn sort_chronologically(matches: &mut [Match]) {
    matches.sort_by(|a, b| {
        a.round
            .cmp(&b.round)
            .then(a.date.cmp(&b.date))
            .then_with(|| a.home.cmp(&b.home))
            .then_with(|| a.away.cmp(&b.away))
    });
}

/// Order in which results actually happened: by date, then round and names.
/// When any record lacks a date the whole set falls back to round order.
pub fn sort_by_kickoff(matches: &mut [Match]) {
    if matches.iter().any(|m| m.date.is_none()) {
        sort_chronologically(matches);
        return;
    }
    matches.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(a.round.cmp(&b.round))
            .then_with(|| a.home.cmp(&b.home))
            .then_with(|| a.away.cmp(&b.away))
    });
}

pub fn team_names(matches: &[Match]) -> Vec<String> {
    let mut names = BTreeSet::new();
    for m in matches {
        names.insert(m.home.clone());
        names.insert(m.away.clone());
    }
    names.into_iter().collect()
}

/// Highest round with at least one result, 0 before the season starts.
pub fn current_round(matches: &[Match]) -> u32 {
    matches
        .iter()
        .filter(|m| m.is_played())
        .map(|m| m.round)
        .max()
        .unwrap_or(0)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(u64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    fn as_u64(&self) -> Option<u64> {
        match self {
            RawNumber::Int(v) => Some(*v),
            RawNumber::Float(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 => {
                Some(*v as u64)
            }
            RawNumber::Float(_) => None,
            RawNumber::Text(s) => {
                let s = s.trim();
                s.parse::<u64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|v| v.fract() == 0.0 && *v >= 0.0)
                        .map(|v| v as u64)
                })
            }
        }
    }
}

fn de_goals<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawNumber>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        // pandas exports unplayed scores as NaN or empty strings.
        Some(RawNumber::Float(v)) if v.is_nan() => Ok(None),
        Some(RawNumber::Text(s)) if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("nan") => {
            Ok(None)
        }
        Some(n) => n
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("goals must be a small non-negative integer")),
    }
}

fn de_round<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawNumber::deserialize(deserializer)?;
    raw.as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| serde::de::Error::custom("round must be a positive integer"))
}

fn de_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let s = raw.trim();
    if s.is_empty() {
        return Ok(None);
    }
    parse_match_date(s)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised date: {s}")))
}

pub fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    // Timestamps carry a time part we do not need.
    let day = raw.split(['T', ' ']).next().unwrap_or(raw);
    // %Y would read "24" as year 24, so two-digit years get their own format.
    let short_year = day.rsplit('/').next().is_some_and(|y| y.len() == 2);
    let formats: &[&str] = if short_year {
        &["%d/%m/%y"]
    } else {
        &["%Y-%m-%d", "%d/%m/%Y"]
    };
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}
