use std::env;

use serde::{Deserialize, Serialize};

use crate::form::FormConfig;
use crate::model::TrainerConfig;
use crate::simulate::SimulationConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub form: FormConfig,
    pub trainer: TrainerConfig,
    pub simulation: SimulationConfig,
}

impl EngineConfig {
    /// Defaults overlaid with whatever the environment sets. Unparseable values
    /// fall back to the default; numeric values are clamped to sane ranges.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.form.window = env_parse("FORM_WINDOW")
            .unwrap_or(cfg.form.window)
            .clamp(1, 38);
        cfg.form.min_matches = env_parse("MIN_TRAINING_MATCHES")
            .unwrap_or(cfg.form.min_matches)
            .max(1);

        cfg.trainer.learning_rate = env_parse::<f64>("TRAIN_LEARNING_RATE")
            .filter(|v| v.is_finite())
            .unwrap_or(cfg.trainer.learning_rate)
            .clamp(1e-4, 10.0);
        cfg.trainer.l2 = env_parse::<f64>("TRAIN_L2")
            .filter(|v| v.is_finite())
            .unwrap_or(cfg.trainer.l2)
            .clamp(0.0, 10.0);
        cfg.trainer.max_iters = env_parse("TRAIN_MAX_ITERS")
            .unwrap_or(cfg.trainer.max_iters)
            .clamp(1, 100_000);

        cfg.simulation.max_round = env_parse("MAX_ROUND")
            .unwrap_or(cfg.simulation.max_round)
            .max(1);
        cfg.simulation.runs = env_parse("SIM_RUNS")
            .unwrap_or(cfg.simulation.runs)
            .clamp(1, 1_000_000);
        cfg.simulation.seed = env_parse("SIM_SEED").or(cfg.simulation.seed);
        cfg.simulation.nominal_margin = env_parse("SIM_NOMINAL_MARGIN")
            .unwrap_or(cfg.simulation.nominal_margin)
            .clamp(1, 10);
        cfg.simulation.parallel = env_bool("SIM_PARALLEL", cfg.simulation.parallel);

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}
