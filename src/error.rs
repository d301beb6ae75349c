use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("not enough played matches to train a model ({played} played, {required} required)")]
    InsufficientData { played: usize, required: usize },

    #[error("unknown team: {0}")]
    UnknownTeam(String),

    #[error("home and away team must differ (got {0} twice)")]
    SameTeam(String),

    #[error("no matches recorded between {first} and {second}")]
    EmptyHistory { first: String, second: String },

    #[error("match data retrieval failed for season {season}")]
    DataRetrieval {
        season: i32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("invalid match record #{index}: {reason}")]
    InvalidMatch { index: usize, reason: String },

    #[error("model expects {expected} feature columns, got {found}")]
    ModelMismatch { expected: usize, found: usize },

    /// Classifier output with no usable mass (all zero or non-finite).
    #[error("model produced degenerate probabilities {0:?}")]
    DegenerateProbabilities(Vec<f64>),

    #[error("unknown feature column: {0}")]
    UnknownFeature(String),

    #[error("unsupported model schema version {found} (expected {expected})")]
    UnsupportedModelVersion { found: u32, expected: u32 },
}

impl EngineError {
    pub fn data_retrieval(season: i32, err: anyhow::Error) -> Self {
        Self::DataRetrieval {
            season,
            source: err.into(),
        }
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_reads_as_not_ready() {
        let err = EngineError::InsufficientData {
            played: 9,
            required: 10,
        };
        assert!(err.is_not_ready());
        assert!(err.to_string().contains("9 played"));
        assert!(!EngineError::UnknownTeam("X".into()).is_not_ready());
    }

    #[test]
    fn data_retrieval_keeps_cause_chain() {
        let err = EngineError::data_retrieval(2025, anyhow::anyhow!("connection reset"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection reset"));
    }
}
