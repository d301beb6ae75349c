use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calibration::{self, Metrics};
use crate::error::{EngineError, EngineResult};
use crate::features::{FeatureColumns, SideInput, TeamEncoder};
use crate::form::{FeatureSet, TrainingRow};
use crate::matches::Outcome;
use crate::predict::PredictionResult;

/// Bumped whenever label order or feature naming changes meaning.
pub const MODEL_SCHEMA_VERSION: u32 = 1;

/// Class order of the classifier's output, published with every model.
pub const OUTCOME_LABELS: [Outcome; 3] = [Outcome::HomeWin, Outcome::Draw, Outcome::AwayWin];

const LR_DECAY: f64 = 0.003;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub l2: f64,
    pub max_iters: usize,
    pub tolerance: f64,
    /// Mini-batch size; `None` trains full-batch.
    pub batch_size: Option<usize>,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            l2: 0.01,
            max_iters: 500,
            tolerance: 1e-7,
            batch_size: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    // coeffs[class][feature]
    pub coeffs: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl SoftmaxClassifier {
    fn zeros(classes: usize, features: usize) -> Self {
        Self {
            feature_means: vec![0.0; features],
            feature_stds: vec![1.0; features],
            coeffs: vec![vec![0.0; features]; classes],
            intercepts: vec![0.0; classes],
        }
    }

    pub fn n_features(&self) -> usize {
        self.feature_means.len()
    }

    pub fn n_classes(&self) -> usize {
        self.intercepts.len()
    }

    pub fn standardize(&self, raw: &[f64]) -> EngineResult<Vec<f64>> {
        if raw.len() != self.n_features() {
            return Err(EngineError::ModelMismatch {
                expected: self.n_features(),
                found: raw.len(),
            });
        }
        Ok(raw
            .iter()
            .zip(self.feature_means.iter().zip(&self.feature_stds))
            .map(|(x, (mean, std))| (x - mean) / std.max(1e-6))
            .collect())
    }

    pub fn predict_proba(&self, raw: &[f64]) -> EngineResult<Vec<f64>> {
        let x = self.standardize(raw)?;
        Ok(self.proba_standardized(&x))
    }

    fn proba_standardized(&self, x: &[f64]) -> Vec<f64> {
        let logits: Vec<f64> = self
            .coeffs
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| b + dot(w, x))
            .collect();
        softmax(&logits)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub iterations: usize,
    pub train: Metrics,
    pub baseline: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub schema_version: u32,
    pub labels: Vec<Outcome>,
    pub encoder: TeamEncoder,
    pub feature_columns: FeatureColumns,
    pub classifier: SoftmaxClassifier,
    pub report: TrainingReport,
}

impl TrainedModel {
    pub fn check_contract(&self) -> EngineResult<()> {
        if self.schema_version != MODEL_SCHEMA_VERSION {
            return Err(EngineError::UnsupportedModelVersion {
                found: self.schema_version,
                expected: MODEL_SCHEMA_VERSION,
            });
        }
        let is_permutation = self.labels.len() == OUTCOME_LABELS.len()
            && OUTCOME_LABELS.iter().all(|l| self.labels.contains(l));
        if !is_permutation || self.classifier.n_classes() != self.labels.len() {
            return Err(EngineError::ModelMismatch {
                expected: OUTCOME_LABELS.len(),
                found: self.classifier.n_classes(),
            });
        }
        if self.feature_columns.len() != self.classifier.n_features() {
            return Err(EngineError::ModelMismatch {
                expected: self.classifier.n_features(),
                found: self.feature_columns.len(),
            });
        }
        Ok(())
    }
}

/// Fits the outcome classifier on the rows of a [`FeatureSet`].
///
/// The minimum-data precondition is carried by the `FeatureSet` type and is
/// not checked again here.
pub fn train(features: &FeatureSet, cfg: &TrainerConfig) -> EngineResult<TrainedModel> {
    let rows = features.rows();
    let encoder = TeamEncoder::fit(rows.iter().flat_map(|r| [r.home.as_str(), r.away.as_str()]));
    let feature_columns = FeatureColumns::for_encoder(&encoder);

    let raw: Vec<Vec<f64>> = rows
        .iter()
        .map(|r| row_vector(&feature_columns, r))
        .collect::<EngineResult<_>>()?;
    let targets: Vec<usize> = rows.iter().map(|r| label_index(r.outcome)).collect();

    let mut classifier = SoftmaxClassifier::zeros(OUTCOME_LABELS.len(), feature_columns.len());
    let (means, stds) = feature_norm_stats(&raw, feature_columns.len());
    classifier.feature_means = means;
    classifier.feature_stds = stds;
    let xs: Vec<Vec<f64>> = raw
        .iter()
        .map(|x| classifier.standardize(x))
        .collect::<EngineResult<_>>()?;

    let iterations = fit_coeffs(&mut classifier, &xs, &targets, cfg);

    let predictions: Vec<PredictionResult> = xs
        .iter()
        .map(|x| PredictionResult::from_ordered(&OUTCOME_LABELS, &classifier.proba_standardized(x)))
        .collect::<EngineResult<_>>()?;
    let outcomes: Vec<Outcome> = rows.iter().map(|r| r.outcome).collect();
    let empirical = calibration::empirical_outcome_probs(&outcomes);
    let report = TrainingReport {
        iterations,
        train: calibration::evaluate_probs(&predictions, &outcomes),
        baseline: calibration::evaluate_probs(&vec![empirical; outcomes.len()], &outcomes),
    };

    info!(
        rows = rows.len(),
        teams = encoder.len(),
        columns = feature_columns.len(),
        iterations,
        log_loss = report.train.log_loss,
        baseline_log_loss = report.baseline.log_loss,
        accuracy = report.train.accuracy,
        "trained outcome model"
    );

    Ok(TrainedModel {
        schema_version: MODEL_SCHEMA_VERSION,
        labels: OUTCOME_LABELS.to_vec(),
        encoder,
        feature_columns,
        classifier,
        report,
    })
}

fn row_vector(columns: &FeatureColumns, row: &TrainingRow) -> EngineResult<Vec<f64>> {
    columns.assemble(
        SideInput {
            team: &row.home,
            stats: &row.home_stats,
        },
        SideInput {
            team: &row.away,
            stats: &row.away_stats,
        },
    )
}

fn label_index(outcome: Outcome) -> usize {
    OUTCOME_LABELS
        .iter()
        .position(|l| *l == outcome)
        .unwrap_or_default()
}

fn feature_norm_stats(samples: &[Vec<f64>], width: usize) -> (Vec<f64>, Vec<f64>) {
    let mut mean = vec![0.0; width];
    let mut var = vec![0.0; width];
    if samples.is_empty() {
        return (mean, vec![1.0; width]);
    }
    let n = samples.len() as f64;

    for x in samples {
        for (m, v) in mean.iter_mut().zip(x) {
            *m += v / n;
        }
    }
    for x in samples {
        for i in 0..width {
            let d = x[i] - mean[i];
            var[i] += d * d / n;
        }
    }
    // Constant columns keep unit scale so an unseen value cannot explode.
    let stds = var
        .into_iter()
        .map(|v| if v > 1e-12 { v.sqrt() } else { 1.0 })
        .collect();
    (mean, stds)
}

fn fit_coeffs(
    model: &mut SoftmaxClassifier,
    xs: &[Vec<f64>],
    targets: &[usize],
    cfg: &TrainerConfig,
) -> usize {
    let n = xs.len();
    if n == 0 {
        return 0;
    }
    let classes = model.n_classes();
    let width = model.n_features();
    let batch = cfg.batch_size.unwrap_or(n).clamp(1, n);
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let mut prev_loss = log_loss(model, xs, targets);
    let mut step_scale = 1.0;
    let mut epochs = 0;

    for iter in 0..cfg.max_iters {
        epochs = iter + 1;
        if batch < n {
            order.shuffle(&mut rng);
        }
        let lr = step_scale * cfg.learning_rate / (1.0 + iter as f64 * LR_DECAY);
        let before = model.clone();

        for chunk in order.chunks(batch) {
            let mut grad_w = vec![vec![0.0; width]; classes];
            let mut grad_b = vec![0.0; classes];
            for &i in chunk {
                let p = model.proba_standardized(&xs[i]);
                for k in 0..classes {
                    let d = p[k] - if targets[i] == k { 1.0 } else { 0.0 };
                    grad_b[k] += d;
                    for (g, x) in grad_w[k].iter_mut().zip(&xs[i]) {
                        *g += d * x;
                    }
                }
            }
            let m = chunk.len() as f64;
            for k in 0..classes {
                model.intercepts[k] -= lr * grad_b[k] / m;
                for j in 0..width {
                    let g = grad_w[k][j] / m + cfg.l2 * model.coeffs[k][j];
                    model.coeffs[k][j] -= lr * g;
                }
            }
        }

        let loss = log_loss(model, xs, targets);
        if loss > prev_loss {
            // Overshot: undo the epoch and retry with a smaller step.
            *model = before;
            step_scale *= 0.5;
            if step_scale < 1e-6 {
                break;
            }
            continue;
        }
        if prev_loss - loss < cfg.tolerance {
            break;
        }
        prev_loss = loss;
    }
    epochs
}

fn log_loss(model: &SoftmaxClassifier, xs: &[Vec<f64>], targets: &[usize]) -> f64 {
    if xs.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = xs
        .iter()
        .zip(targets)
        .map(|(x, &t)| -model.proba_standardized(x)[t].max(1e-12).ln())
        .sum();
    sum / xs.len() as f64
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let mx = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - mx).exp()).collect();
    let den = exps.iter().sum::<f64>().max(1e-12);
    exps.into_iter().map(|e| e / den).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{FormConfig, build_features};
    use crate::matches::Match;

    fn season() -> Vec<Match> {
        let teams = ["A", "B", "C", "D"];
        let mut out = Vec::new();
        let mut round = 1;
        for _ in 0..3 {
            for (i, h) in teams.iter().enumerate() {
                for (j, a) in teams.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    // Lower index is stronger.
                    let (hg, ag) = if i < j { (2, 0) } else if j + 1 == i { (1, 1) } else { (0, 1) };
                    out.push(Match::played(None, round, h, a, hg, ag));
                }
                round += 1;
            }
        }
        out
    }

    fn fitted() -> TrainedModel {
        let set = build_features(&season(), &FormConfig::default()).unwrap();
        train(&set, &TrainerConfig::default()).unwrap()
    }

    #[test]
    fn softmax_is_normalized() {
        let p = softmax(&[2.0, -1.0, 0.5]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[0] > p[2] && p[2] > p[1]);
    }

    #[test]
    fn model_publishes_its_contract() {
        let model = fitted();
        assert_eq!(model.schema_version, MODEL_SCHEMA_VERSION);
        assert_eq!(model.labels, OUTCOME_LABELS.to_vec());
        assert_eq!(model.feature_columns.len(), model.classifier.n_features());
        assert_eq!(model.encoder.teams(), ["A", "B", "C", "D"]);
        assert!(model.check_contract().is_ok());
    }

    #[test]
    fn training_beats_the_empirical_baseline() {
        let model = fitted();
        assert!(model.report.iterations > 0);
        assert!(model.report.train.log_loss < model.report.baseline.log_loss);
    }

    #[test]
    fn training_is_deterministic() {
        assert_eq!(fitted(), fitted());
    }

    #[test]
    fn minibatch_training_is_seeded() {
        let set = build_features(&season(), &FormConfig::default()).unwrap();
        let cfg = TrainerConfig {
            batch_size: Some(8),
            max_iters: 50,
            ..TrainerConfig::default()
        };
        let a = train(&set, &cfg).unwrap();
        let b = train(&set, &cfg).unwrap();
        assert_eq!(a.classifier, b.classifier);
    }

    #[test]
    fn tampered_label_order_is_rejected() {
        let mut model = fitted();
        model.labels = vec![Outcome::HomeWin, Outcome::HomeWin, Outcome::AwayWin];
        assert!(matches!(
            model.check_contract(),
            Err(EngineError::ModelMismatch { .. })
        ));
        let mut model = fitted();
        model.schema_version = 0;
        assert!(matches!(
            model.check_contract(),
            Err(EngineError::UnsupportedModelVersion { .. })
        ));
    }

    #[test]
    fn wrong_width_vector_is_a_mismatch() {
        let model = fitted();
        let err = model.classifier.predict_proba(&[0.0; 3]).unwrap_err();
        assert!(matches!(err, EngineError::ModelMismatch { found: 3, .. }));
    }
}
