use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::matches::Match;

/// Record between two teams across played meetings, either venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub first: String,
    pub second: String,
    pub wins_first: u32,
    pub wins_second: u32,
    pub draws: u32,
    pub total: u32,
    /// Most recent meeting first.
    pub matches: Vec<Match>,
}

pub fn head_to_head(matches: &[Match], first: &str, second: &str) -> EngineResult<HeadToHead> {
    if first == second {
        return Err(EngineError::SameTeam(first.to_string()));
    }
    let mut meetings: Vec<Match> = matches
        .iter()
        .filter(|m| m.is_played() && m.involves(first) && m.involves(second))
        .cloned()
        .collect();
    if meetings.is_empty() {
        return Err(EngineError::EmptyHistory {
            first: first.to_string(),
            second: second.to_string(),
        });
    }
    meetings.sort_by(|a, b| b.date.cmp(&a.date).then(b.round.cmp(&a.round)));

    let mut out = HeadToHead {
        first: first.to_string(),
        second: second.to_string(),
        wins_first: 0,
        wins_second: 0,
        draws: 0,
        total: meetings.len() as u32,
        matches: Vec::new(),
    };
    for m in &meetings {
        let Some((hg, ag)) = m.score() else { continue };
        let (first_goals, second_goals) = if m.home == first { (hg, ag) } else { (ag, hg) };
        match first_goals.cmp(&second_goals) {
            std::cmp::Ordering::Greater => out.wins_first += 1,
            std::cmp::Ordering::Less => out.wins_second += 1,
            std::cmp::Ordering::Equal => out.draws += 1,
        }
    }
    out.matches = meetings;
    Ok(out)
}
