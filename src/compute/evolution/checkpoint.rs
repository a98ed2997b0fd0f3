//! On-disk checkpoints of the evolving population.
//!
//! Each checkpoint is a single `checkpoint-<generation>.json` file. Files are
//! written to a temporary name first and renamed into place, so a crashed
//! run never leaves a truncated checkpoint behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::search::Candidate;
use crate::schema::EvolutionHistory;

/// Format version written into every checkpoint.
pub const CHECKPOINT_VERSION: u32 = 1;

const PREFIX: &str = "checkpoint-";
const EXTENSION: &str = ".json";

/// Checkpoint failures.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Checkpoint is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Checkpoint version {found} is not supported (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("Candidate {id} has layers {found:?}, expected {expected:?}")]
    IncompatibleGenome {
        id: u64,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

/// Serialized optimizer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    /// Generations evaluated before this checkpoint was taken.
    pub generation: usize,
    /// Next candidate ID to hand out.
    pub next_id: u64,
    /// Seed the genome RNG restarts from.
    pub rng_seed: u64,
    /// Best fitness seen so far; absent before the first evaluation.
    pub best_fitness: Option<f32>,
    pub stagnation_count: usize,
    /// Population awaiting evaluation.
    pub population: Vec<Candidate>,
    pub history: EvolutionHistory,
}

/// Directory of numbered checkpoint files.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    directory: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the checkpoint for `generation`.
    pub fn path_for(&self, generation: usize) -> PathBuf {
        self.directory
            .join(format!("{PREFIX}{generation}{EXTENSION}"))
    }

    /// All checkpoints, sorted by generation number.
    ///
    /// A missing directory is an empty store. Files that look like
    /// checkpoints but carry an unparseable generation are skipped.
    pub fn list(&self) -> Result<Vec<(usize, PathBuf)>, CheckpointError> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(number) = name
                .strip_prefix(PREFIX)
                .and_then(|rest| rest.strip_suffix(EXTENSION))
            else {
                continue;
            };
            match number.parse::<usize>() {
                Ok(generation) => found.push((generation, path)),
                Err(_) => log::warn!("Ignoring checkpoint with bad name: {}", path.display()),
            }
        }

        found.sort_by_key(|(generation, _)| *generation);
        Ok(found)
    }

    /// The checkpoint with the highest generation, if any.
    pub fn latest(&self) -> Result<Option<(usize, PathBuf)>, CheckpointError> {
        Ok(self.list()?.pop())
    }

    /// Write a checkpoint and return its path.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.path_for(checkpoint.generation);
        let tmp = self
            .directory
            .join(format!(".{PREFIX}{}{EXTENSION}.tmp", checkpoint.generation));

        let json = serde_json::to_string_pretty(checkpoint)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        log::debug!(
            "Saved checkpoint generation={} candidates={} to {}",
            checkpoint.generation,
            checkpoint.population.len(),
            path.display()
        );
        Ok(path)
    }

    /// Read and version-check a checkpoint file.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Checkpoint, CheckpointError> {
        let content = fs::read_to_string(path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&content)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: CHECKPOINT_VERSION,
                found: checkpoint.version,
            });
        }
        Ok(checkpoint)
    }

    /// Load the newest checkpoint, if any.
    pub fn load_latest(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        match self.latest()? {
            Some((_, path)) => self.load(path).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Genome;

    fn checkpoint(generation: usize) -> Checkpoint {
        let mut history = EvolutionHistory::default();
        history.record(&[1.0, 2.0]);
        Checkpoint {
            version: CHECKPOINT_VERSION,
            generation,
            next_id: 7,
            rng_seed: 99,
            best_fitness: Some(2.0),
            stagnation_count: 1,
            population: vec![Candidate {
                id: 3,
                genome: Genome::zeros(&[8, 6, 2]),
                fitness: 2.0,
                generation: 1,
                parents: vec![0, 1],
            }],
            history,
        }
    }

    #[test]
    fn test_empty_or_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("missing"));
        assert!(store.list().unwrap().is_empty());
        assert!(store.latest().unwrap().is_none());
        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let original = checkpoint(5);
        let path = store.save(&original).unwrap();
        assert_eq!(path, dir.path().join("checkpoint-5.json"));
        assert_eq!(store.load(&path).unwrap(), original);
    }

    #[test]
    fn test_latest_is_numeric_not_lexicographic() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        for generation in [5, 10, 9] {
            store.save(&checkpoint(generation)).unwrap();
        }
        let (generation, path) = store.latest().unwrap().unwrap();
        assert_eq!(generation, 10);
        assert_eq!(path, store.path_for(10));
        assert_eq!(store.load_latest().unwrap().unwrap().generation, 10);
    }

    #[test]
    fn test_unrelated_and_malformed_names_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(&checkpoint(3)).unwrap();
        fs::write(dir.path().join("checkpoint-abc.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let listed: Vec<usize> = store.list().unwrap().into_iter().map(|(g, _)| g).collect();
        assert_eq!(listed, vec![3]);
    }

    #[test]
    fn test_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut future = checkpoint(1);
        future.version = CHECKPOINT_VERSION + 1;
        let path = store.save(&future).unwrap();
        assert!(matches!(
            store.load(path),
            Err(CheckpointError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupt_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let path = store.path_for(2);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(store.load(path), Err(CheckpointError::Json(_))));
    }
}
