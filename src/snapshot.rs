use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::form::{TeamStatsTable, build_features};
use crate::h2h::{HeadToHead, head_to_head};
use crate::matches::{Match, current_round, split_played, team_names, validate_matches};
use crate::model::{TrainedModel, train};
use crate::predict::{PredictionResult, predict};
use crate::simulate::{ProjectedTable, simulate};
use crate::table::LeagueTable;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub season: i32,
    pub retrieved_at: DateTime<Utc>,
}

impl SnapshotKey {
    pub fn now(season: i32) -> Self {
        Self {
            season,
            retrieved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
struct Trained {
    model: TrainedModel,
    stats: TeamStatsTable,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    key: SnapshotKey,
    config: EngineConfig,
    played: Vec<Match>,
    unplayed: Vec<Match>,
    teams: Vec<String>,
    current_round: u32,
    trained: Option<Trained>,
    not_ready: Option<(usize, usize)>,
}

impl Snapshot {
    /// Validates `matches` and trains when enough results exist. Too few
    /// results still yields a snapshot; it answers team, table and
    /// head-to-head queries but refuses predictions.
    pub fn build(key: SnapshotKey, matches: Vec<Match>, config: &EngineConfig) -> EngineResult<Self> {
        validate_matches(&matches, config.simulation.max_round)?;
        let teams = team_names(&matches);
        let (played, unplayed) = split_played(&matches);
        let current_round = current_round(&played);

        let (trained, not_ready) = match build_features(&played, &config.form) {
            Ok(features) => {
                let model = train(&features, &config.trainer)?;
                let (_, stats) = features.into_parts();
                (Some(Trained { model, stats }), None)
            }
            Err(EngineError::InsufficientData { played, required }) => {
                warn!(season = key.season, played, required, "not enough results to train yet");
                (None, Some((played, required)))
            }
            Err(err) => return Err(err),
        };

        info!(
            season = key.season,
            played = played.len(),
            unplayed = unplayed.len(),
            teams = teams.len(),
            current_round,
            ready = trained.is_some(),
            "built snapshot"
        );
        Ok(Self {
            key,
            config: *config,
            played,
            unplayed,
            teams,
            current_round,
            trained,
            not_ready,
        })
    }

    pub fn key(&self) -> &SnapshotKey {
        &self.key
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn played(&self) -> &[Match] {
        &self.played
    }

    pub fn unplayed(&self) -> &[Match] {
        &self.unplayed
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn is_ready(&self) -> bool {
        self.trained.is_some()
    }

    pub fn model(&self) -> Option<&TrainedModel> {
        self.trained.as_ref().map(|t| &t.model)
    }

    pub fn team_stats(&self) -> Option<&TeamStatsTable> {
        self.trained.as_ref().map(|t| &t.stats)
    }

    fn trained(&self) -> EngineResult<&Trained> {
        self.trained.as_ref().ok_or_else(|| {
            let (played, required) = self
                .not_ready
                .unwrap_or((self.played.len(), self.config.form.min_matches));
            EngineError::InsufficientData { played, required }
        })
    }

    /// Outcome probabilities for a fixture. Unlike the bare predictor, a team
    /// facing itself is rejected.
    pub fn predict(&self, home: &str, away: &str) -> EngineResult<PredictionResult> {
        if home == away {
            return Err(EngineError::SameTeam(home.to_string()));
        }
        let t = self.trained()?;
        predict(home, away, &t.model, &t.stats)
    }

    pub fn simulate(&self, target_round: u32) -> EngineResult<ProjectedTable> {
        let t = self.trained()?;
        simulate(
            target_round,
            &self.unplayed,
            &self.played,
            &t.model,
            &t.stats,
            &self.config.simulation,
        )
    }

    pub fn known_table(&self) -> LeagueTable {
        let mut all = self.played.clone();
        all.extend(self.unplayed.iter().cloned());
        LeagueTable::from_matches(&all)
    }

    pub fn head_to_head(&self, first: &str, second: &str) -> EngineResult<HeadToHead> {
        head_to_head(&self.played, first, second)
    }
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swaps `snapshot` in unless the published one was retrieved later, in
    /// which case the newer one stays and is returned.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(current) = guard.as_ref()
            && current.key().retrieved_at > snapshot.key().retrieved_at
        {
            debug!(
                stale = %snapshot.key().retrieved_at,
                current = %current.key().retrieved_at,
                "discarding snapshot older than the published one"
            );
            return Arc::clone(current);
        }
        let snapshot = Arc::new(snapshot);
        *guard = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub fn invalidate(&self) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }

    /// Reuses the published snapshot only when both its key and the config it
    /// was built with match; anything else is rebuilt from `load`.
    pub fn get_or_build<F>(&self, key: &SnapshotKey, config: &EngineConfig, load: F) -> EngineResult<Arc<Snapshot>>
    where
        F: FnOnce() -> EngineResult<Vec<Match>>,
    {
        if let Some(snapshot) = self
            .current()
            .filter(|s| s.key() == key && s.config() == config)
        {
            return Ok(snapshot);
        }
        let snapshot = Snapshot::build(key.clone(), load()?, config)?;
        Ok(self.publish(snapshot))
    }
}

static CACHE: OnceCell<SnapshotCache> = OnceCell::new();

pub fn global_cache() -> &'static SnapshotCache {
    CACHE.get_or_init(SnapshotCache::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(season: i32, hour: u32) -> SnapshotKey {
        SnapshotKey {
            season,
            retrieved_at: Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap(),
        }
    }

    fn early_season() -> Vec<Match> {
        vec![
            Match::played(None, 1, "A", "B", 1, 0),
            Match::played(None, 1, "C", "D", 2, 2),
            Match::scheduled(None, 2, "B", "C"),
            Match::scheduled(None, 2, "D", "A"),
        ]
    }

    #[test]
    fn not_ready_snapshot_still_answers_lookups() {
        let snap = Snapshot::build(key(2025, 0), early_season(), &EngineConfig::default()).unwrap();
        assert!(!snap.is_ready());
        assert_eq!(snap.teams(), ["A", "B", "C", "D"]);
        assert_eq!(snap.current_round(), 1);
        assert_eq!(snap.known_table().position("A"), Some(1));
        assert_eq!(snap.head_to_head("A", "B").unwrap().wins_first, 1);
        let err = snap.predict("A", "B").unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { played: 2, required: 10 }));
        assert!(snap.simulate(2).unwrap_err().is_not_ready());
    }

    #[test]
    fn self_match_is_rejected_first() {
        let snap = Snapshot::build(key(2025, 0), early_season(), &EngineConfig::default()).unwrap();
        assert!(matches!(snap.predict("A", "A"), Err(EngineError::SameTeam(_))));
    }

    #[test]
    fn invalid_records_fail_the_build() {
        let mut matches = early_season();
        matches[0].away_goals = None;
        let err = Snapshot::build(key(2025, 0), matches, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMatch { index: 0, .. }));
    }

    #[test]
    fn cache_rebuilds_only_on_new_key() {
        let cache = SnapshotCache::new();
        let cfg = EngineConfig::default();
        let first = cache.get_or_build(&key(2025, 0), &cfg, || Ok(early_season())).unwrap();
        let again = cache
            .get_or_build(&key(2025, 0), &cfg, || panic!("must reuse cached snapshot"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let newer = cache.get_or_build(&key(2025, 1), &cfg, || Ok(early_season())).unwrap();
        assert!(!Arc::ptr_eq(&first, &newer));
        // Old readers keep their snapshot.
        assert_eq!(first.key(), &key(2025, 0));

        cache.invalidate();
        assert!(cache.current().is_none());
    }

    #[test]
    fn older_build_never_replaces_newer_snapshot() {
        let cache = SnapshotCache::new();
        let cfg = EngineConfig::default();
        let newer = Snapshot::build(key(2025, 1), early_season(), &cfg).unwrap();
        let older = Snapshot::build(key(2025, 0), early_season(), &cfg).unwrap();

        cache.publish(newer);
        let kept = cache.publish(older);
        assert_eq!(kept.key(), &key(2025, 1));
        assert_eq!(cache.current().map(|s| s.key().clone()), Some(key(2025, 1)));
    }

    #[test]
    fn changed_config_rebuilds_same_key() {
        let cache = SnapshotCache::new();
        let cfg = EngineConfig::default();
        let first = cache.get_or_build(&key(2025, 0), &cfg, || Ok(early_season())).unwrap();

        let mut other = cfg;
        other.form.min_matches = 2;
        let rebuilt = cache.get_or_build(&key(2025, 0), &other, || Ok(early_season())).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert!(rebuilt.is_ready());
        assert!(!first.is_ready());
    }
}
