//! On-disk cache of trained models and fitted scalers, one pair per
//! entity key.
//!
//! Layout: `<root>/lstm_<kind>_<key>_model.json` holds the network plus
//! training metadata, `<root>/lstm_<kind>_<key>_scaler.json` the fitted
//! scaler. A hit requires both files. Invalidation is never automatic,
//! but each model records the last observed month of its training series
//! so an appended history is detected as a stale entry and retrained.

use crate::data::YearMonth;
use crate::error::{ForecastError, Result};
use crate::key::EntityKey;
use crate::model::LstmNetwork;
use crate::preprocess::MinMaxScaler;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// A trained network plus the metadata needed for cache decisions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub network: LstmNetwork,
    /// Window length the network was trained with
    pub time_steps: usize,
    /// Last observed month of the training series; a mismatch against the
    /// current series end marks this entry stale
    pub last_observed: YearMonth,
    pub trained_at: DateTime<Utc>,
    pub final_loss: f64,
    pub epochs_run: usize,
}

/// Result of a cache lookup against a series' current end month
#[derive(Debug)]
pub enum CacheLookup {
    /// Both artifacts present and trained on the same history
    Hit(Box<ModelArtifact>, MinMaxScaler),
    /// One or both artifacts absent
    Miss,
    /// Artifacts present but trained on an older history
    Stale(YearMonth),
}

/// Filesystem store owning the model/scaler artifacts
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
    lock_wait: Duration,
}

impl ModelStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock_wait: Duration::from_secs(60),
        })
    }

    /// Bound how long [`ModelStore::lock`] waits for a competing trainer
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_path(&self, key: &EntityKey) -> PathBuf {
        self.root.join(format!("{}_model.json", key.file_stem()))
    }

    fn scaler_path(&self, key: &EntityKey) -> PathBuf {
        self.root.join(format!("{}_scaler.json", key.file_stem()))
    }

    fn lock_path(&self, key: &EntityKey) -> PathBuf {
        self.root.join(format!("{}.lock", key.file_stem()))
    }

    /// True when both the model and the scaler artifact are present
    pub fn exists(&self, key: &EntityKey) -> bool {
        self.model_path(key).is_file() && self.scaler_path(key).is_file()
    }

    /// Load both artifacts. Deserialization failure is a hard
    /// `CacheLoad` error, never a silent retrain.
    pub fn load(&self, key: &EntityKey) -> Result<(ModelArtifact, MinMaxScaler)> {
        let artifact: ModelArtifact = read_json(&self.model_path(key))?;
        let scaler: MinMaxScaler = read_json(&self.scaler_path(key))?;
        Ok((artifact, scaler))
    }

    /// Cache lookup that treats a model trained on older history as a
    /// miss, logged distinctly from the plain-miss path
    pub fn lookup(&self, key: &EntityKey, last_month: YearMonth) -> Result<CacheLookup> {
        if !self.exists(key) {
            info!("cache miss for {}", key);
            return Ok(CacheLookup::Miss);
        }
        let (artifact, scaler) = self.load(key)?;
        if artifact.last_observed != last_month {
            warn!(
                "stale cached model for {}: trained up to {}, series now ends {}",
                key, artifact.last_observed, last_month
            );
            return Ok(CacheLookup::Stale(artifact.last_observed));
        }
        info!("cache hit for {}", key);
        Ok(CacheLookup::Hit(Box::new(artifact), scaler))
    }

    /// Persist both artifacts. Writes go through temp files and renames
    /// so a concurrent reader never sees a half-written model.
    pub fn save(
        &self,
        key: &EntityKey,
        artifact: &ModelArtifact,
        scaler: &MinMaxScaler,
    ) -> Result<()> {
        let model_path = self.model_path(key);
        let scaler_path = self.scaler_path(key);
        let model_tmp = stage_json(&model_path, artifact)?;
        let scaler_tmp = stage_json(&scaler_path, scaler)?;
        // The model file carries the metadata that lookup validates, so it
        // commits last; a save interrupted between the renames leaves the
        // previous model, which reads as stale or mismatched, never as a
        // fresh model paired with the wrong scaler.
        fs::rename(&scaler_tmp, &scaler_path)?;
        fs::rename(&model_tmp, &model_path)?;
        info!("saved model and scaler for {}", key);
        Ok(())
    }

    /// Remove any cached artifacts for this key
    pub fn evict(&self, key: &EntityKey) -> Result<()> {
        for path in [self.model_path(key), self.scaler_path(key)] {
            if path.is_file() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Take the exclusive per-key training lock.
    ///
    /// The lock guards the whole train-then-save sequence so two requests
    /// for the same never-before-seen entity cannot race. Waits up to the
    /// configured bound for a competing holder, then fails with
    /// `StoreBusy`.
    pub fn lock(&self, key: &EntityKey) -> Result<TrainLock> {
        let path = self.lock_path(key);
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(TrainLock { path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= self.lock_wait {
                        return Err(ForecastError::StoreBusy(format!(
                            "another request is training {}",
                            key
                        )));
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Guard for the per-key training lock; releases the lock file on drop
#[derive(Debug)]
pub struct TrainLock {
    path: PathBuf,
}

impl Drop for TrainLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .map_err(|e| ForecastError::CacheLoad(format!("{}: {}", path.display(), e)))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ForecastError::CacheLoad(format!("{}: {}", path.display(), e)))
}

/// Write `value` to a temp file beside `path` and return the temp path;
/// the caller renames it into place once every sibling is staged
fn stage_json<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp)?;
        serde_json::to_writer(BufWriter::new(file), value).map_err(|e| {
            ForecastError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
    }
    Ok(tmp)
}
