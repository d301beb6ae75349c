use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const BASE_RATING: f64 = 1500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EloConfig {
    pub k: f64,
    pub home_adv_pts: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 20.0,
            home_adv_pts: 60.0,
        }
    }
}

/// Running Elo ratings keyed by team name, updated one result at a time.
#[derive(Debug, Clone, Default)]
pub struct EloBook {
    cfg: EloConfig,
    ratings: HashMap<String, f64>,
}

impl EloBook {
    pub fn new(cfg: EloConfig) -> Self {
        Self {
            cfg,
            ratings: HashMap::new(),
        }
    }

    pub fn rating(&self, team: &str) -> f64 {
        self.ratings.get(team).copied().unwrap_or(BASE_RATING)
    }

    pub fn record(&mut self, home: &str, away: &str, home_goals: u8, away_goals: u8) {
        let eh = self.rating(home);
        let ea = self.rating(away);

        let expected_home = expected_score(eh + self.cfg.home_adv_pts, ea);
        let s_home = if home_goals > away_goals {
            1.0
        } else if home_goals < away_goals {
            0.0
        } else {
            0.5
        };

        let delta = self.cfg.k * (s_home - expected_home);
        self.ratings.insert(home.to_string(), eh + delta);
        self.ratings.insert(away.to_string(), ea - delta);
    }
}

fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-(r_a - r_b) / 400.0))
}
