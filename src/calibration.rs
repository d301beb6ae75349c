use serde::{Deserialize, Serialize};

use crate::matches::Outcome;
use crate::predict::PredictionResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

pub fn empirical_outcome_probs(outcomes: &[Outcome]) -> PredictionResult {
    if outcomes.is_empty() {
        return PredictionResult::uniform();
    }

    let mut home = 0usize;
    let mut draw = 0usize;
    let mut away = 0usize;
    for outcome in outcomes {
        match outcome {
            Outcome::HomeWin => home += 1,
            Outcome::Draw => draw += 1,
            Outcome::AwayWin => away += 1,
        }
    }
    let n = outcomes.len() as f64;
    PredictionResult {
        home_win: home as f64 / n,
        draw: draw as f64 / n,
        away_win: away as f64 / n,
    }
}

pub fn evaluate_probs(predictions: &[PredictionResult], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::default();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = one_hot(*outcome);
        brier_sum += (p.home_win - y.home_win).powi(2)
            + (p.draw - y.draw).powi(2)
            + (p.away_win - y.away_win).powi(2);

        let actual_prob = p.prob(*outcome).clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if p.most_likely() == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

fn one_hot(outcome: Outcome) -> PredictionResult {
    match outcome {
        Outcome::HomeWin => PredictionResult {
            home_win: 1.0,
            draw: 0.0,
            away_win: 0.0,
        },
        Outcome::Draw => PredictionResult {
            home_win: 0.0,
            draw: 1.0,
            away_win: 0.0,
        },
        Outcome::AwayWin => PredictionResult {
            home_win: 0.0,
            draw: 0.0,
            away_win: 1.0,
        },
    }
}
