//! Score store - best-score leaderboard and known chat locations
//!
//! Persisted as a JSON document rewritten after every change, or kept in
//! memory when no path is configured.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game_server::{LocationId, PlayerId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] io::Error),
    #[error("store encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait ScoreStore: Send + Sync {
    /// Keep `score` if it beats the stored best for `id`
    fn record_score(&self, id: PlayerId, name: &str, score: u32) -> Result<(), StoreError>;
    /// Best scores, highest first
    fn top_scores(&self, limit: usize) -> Result<Vec<(String, u32)>, StoreError>;
    fn remember_location(&self, location: LocationId, title: &str) -> Result<(), StoreError>;
    fn all_locations(&self) -> Result<Vec<LocationId>, StoreError>;
}

/// A single leaderboard entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub score: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoreData {
    leaderboard: BTreeMap<PlayerId, ScoreEntry>,
    locations: BTreeMap<LocationId, String>,
}

#[derive(Debug, Default)]
pub struct JsonStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No store found at {}, starting fresh", path.display());
                StoreData::default()
            }
            Err(e) => return Err(e.into()),
        };
        log::info!(
            "Loaded {} scores and {} locations",
            data.leaderboard.len(),
            data.locations.len()
        );

        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    fn data(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write through to disk via a temporary file
    fn save(&self, data: &StoreData) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(data)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl ScoreStore for JsonStore {
    fn record_score(&self, id: PlayerId, name: &str, score: u32) -> Result<(), StoreError> {
        let mut data = self.data();
        match data.leaderboard.get_mut(&id) {
            Some(entry) if score > entry.score => {
                entry.score = score;
                entry.name = name.to_string();
            }
            Some(_) => return Ok(()),
            None => {
                data.leaderboard.insert(
                    id,
                    ScoreEntry {
                        name: name.to_string(),
                        score,
                    },
                );
            }
        }
        self.save(&data)
    }

    fn top_scores(&self, limit: usize) -> Result<Vec<(String, u32)>, StoreError> {
        let data = self.data();
        let mut entries: Vec<&ScoreEntry> = data.leaderboard.values().collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|e| (e.name.clone(), e.score))
            .collect())
    }

    fn remember_location(&self, location: LocationId, title: &str) -> Result<(), StoreError> {
        let mut data = self.data();
        if data.locations.get(&location).map(String::as_str) == Some(title) {
            return Ok(());
        }
        data.locations.insert(location, title.to_string());
        self.save(&data)
    }

    fn all_locations(&self) -> Result<Vec<LocationId>, StoreError> {
        Ok(self.data().locations.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dino-race-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn record_score_keeps_the_best() {
        let store = JsonStore::in_memory();
        store.record_score(1, "ann", 300).unwrap();
        store.record_score(1, "ann", 120).unwrap();
        store.record_score(2, "bo", 500).unwrap();
        store.record_score(1, "annie", 410).unwrap();

        assert_eq!(
            store.top_scores(10).unwrap(),
            vec![("bo".to_string(), 500), ("annie".to_string(), 410)]
        );
        assert_eq!(store.top_scores(1).unwrap().len(), 1);
    }

    #[test]
    fn locations_are_deduplicated() {
        let store = JsonStore::in_memory();
        store.remember_location(-100, "racers").unwrap();
        store.remember_location(-100, "racers").unwrap();
        store.remember_location(7, "").unwrap();

        assert_eq!(store.all_locations().unwrap(), vec![-100, 7]);
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);

        {
            let store = JsonStore::open(&path).unwrap();
            store.record_score(1, "ann", 900).unwrap();
            store.remember_location(5, "lobby").unwrap();
        }
        let store = JsonStore::open(&path).unwrap();

        assert_eq!(store.top_scores(10).unwrap(), vec![("ann".to_string(), 900)]);
        assert_eq!(store.all_locations().unwrap(), vec![5]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(JsonStore::open(&path), Err(StoreError::Json(_))));
        let _ = fs::remove_file(&path);
    }
}
