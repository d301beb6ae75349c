use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::features::SideInput;
use crate::form::TeamStatsTable;
use crate::matches::Outcome;
use crate::model::TrainedModel;

/// Probabilities of the three results, non-negative and summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

impl PredictionResult {
    pub fn uniform() -> Self {
        Self {
            home_win: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away_win: 1.0 / 3.0,
        }
    }

    /// Maps classifier output onto outcomes using the model's published label
    /// order, then renormalizes. Output that cannot be normalized is an error.
    pub fn from_ordered(labels: &[Outcome], probs: &[f64]) -> EngineResult<Self> {
        let mut out = Self {
            home_win: 0.0,
            draw: 0.0,
            away_win: 0.0,
        };
        for (label, &p) in labels.iter().zip(probs) {
            let p = if p.is_finite() { p.max(0.0) } else { f64::NAN };
            match label {
                Outcome::HomeWin => out.home_win = p,
                Outcome::Draw => out.draw = p,
                Outcome::AwayWin => out.away_win = p,
            }
        }
        out.normalized()
            .ok_or_else(|| EngineError::DegenerateProbabilities(probs.to_vec()))
    }

    pub fn normalized(self) -> Option<Self> {
        let sum = self.home_win + self.draw + self.away_win;
        if !sum.is_finite() || sum <= 0.0 {
            return None;
        }
        Some(Self {
            home_win: self.home_win / sum,
            draw: self.draw / sum,
            away_win: self.away_win / sum,
        })
    }

    pub fn prob(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::HomeWin => self.home_win,
            Outcome::Draw => self.draw,
            Outcome::AwayWin => self.away_win,
        }
    }

    pub fn most_likely(&self) -> Outcome {
        if self.home_win >= self.draw && self.home_win >= self.away_win {
            Outcome::HomeWin
        } else if self.draw >= self.away_win {
            Outcome::Draw
        } else {
            Outcome::AwayWin
        }
    }
}

/// A self-match is not rejected here; callers decide whether to allow it.
pub fn predict(
    home: &str,
    away: &str,
    model: &TrainedModel,
    stats: &TeamStatsTable,
) -> EngineResult<PredictionResult> {
    model.check_contract()?;
    model.encoder.index(home)?;
    model.encoder.index(away)?;
    let home_stats = stats.get(home)?;
    let away_stats = stats.get(away)?;

    let x = model.feature_columns.assemble(
        SideInput {
            team: home,
            stats: home_stats,
        },
        SideInput {
            team: away,
            stats: away_stats,
        },
    )?;
    let probs = model.classifier.predict_proba(&x)?;
    PredictionResult::from_ordered(&model.labels, &probs)
}
