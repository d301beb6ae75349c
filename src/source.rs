use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::matches::Match;

pub trait MatchSource {
    fn fetch_season(&self, season: i32) -> Result<Vec<Match>>;
}

/// Seasons stored as `<dir>/<season>.json`, each a JSON array of match records.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn season_path(&self, season: i32) -> PathBuf {
        self.dir.join(format!("{season}.json"))
    }
}

impl MatchSource for JsonDirSource {
    fn fetch_season(&self, season: i32) -> Result<Vec<Match>> {
        let path = self.season_path(season);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        parse_matches_json(&raw).with_context(|| format!("failed parsing {}", path.display()))
    }
}

pub fn parse_matches_json(raw: &str) -> Result<Vec<Match>> {
    serde_json::from_str(raw).context("invalid match json")
}

#[derive(Debug, Clone)]
pub struct LoadedSeason {
    pub season: i32,
    pub matches: Vec<Match>,
}

/// Loads `season`, retrying once with the prior season when it fails or comes
/// back empty.
pub fn load_season_with_fallback<S: MatchSource + ?Sized>(
    source: &S,
    season: i32,
) -> EngineResult<LoadedSeason> {
    match fetch_non_empty(source, season) {
        Ok(matches) => {
            info!(season, matches = matches.len(), "loaded season");
            Ok(LoadedSeason { season, matches })
        }
        Err(err) => {
            let prior = season - 1;
            warn!(season, prior, error = %format!("{err:#}"), "season unavailable, trying prior");
            let matches = fetch_non_empty(source, prior)
                .map_err(|prior_err| {
                    EngineError::data_retrieval(
                        season,
                        prior_err.context(format!("prior season {prior} unavailable after: {err:#}")),
                    )
                })?;
            info!(season = prior, matches = matches.len(), "loaded fallback season");
            Ok(LoadedSeason {
                season: prior,
                matches,
            })
        }
    }
}

fn fetch_non_empty<S: MatchSource + ?Sized>(source: &S, season: i32) -> Result<Vec<Match>> {
    let matches = source.fetch_season(season)?;
    if matches.is_empty() {
        return Err(anyhow!("season {season} has no matches"));
    }
    Ok(matches)
}
