//! Per-file load session.
//!
//! A [`Session`] owns everything tied to one loaded report: the record
//! store, the alias mapping and the load statistics. Loading is
//! idempotent: once a load has succeeded, later calls return
//! [`LoadStatus::AlreadyLoaded`] whatever their arguments. A failed load
//! leaves the session empty, so no partial store is ever queryable.

use crate::chunk::{FileData, FileSource, SliceSource};
use crate::config::{IngestConfig, LoadMode};
use crate::parallel::{ingest, LoadStats};
use crate::query::PivotTable;
use crate::store::RecordStore;
use crate::tsv::{LoadError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Outcome of [`Session::load`].
#[derive(Debug, Clone)]
pub enum LoadStatus {
    /// The file was parsed by this call.
    Loaded(LoadStats),
    /// A previous call already loaded a file; nothing was done.
    AlreadyLoaded,
}

#[derive(Debug)]
struct Loaded {
    path: PathBuf,
    store: Arc<RecordStore>,
    stats: LoadStats,
}

/// One loaded report and its settings.
#[derive(Debug, Default)]
pub struct Session {
    config: IngestConfig,
    loaded: Mutex<Option<Loaded>>,
}

impl Session {
    /// Create an unloaded session with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unloaded session with the given settings.
    pub fn with_config(config: IngestConfig) -> Self {
        Self {
            config,
            loaded: Mutex::new(None),
        }
    }

    /// Settings used by [`Session::load`].
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    fn state(&self) -> Result<MutexGuard<'_, Option<Loaded>>> {
        self.loaded
            .lock()
            .map_err(|_| LoadError::Internal("session lock poisoned".to_string()))
    }

    /// Load `path` with the session's configuration and the given mode.
    ///
    /// Concurrent callers are serialized; the first successful load wins.
    pub fn load<P: AsRef<Path>>(&self, path: P, mode: LoadMode) -> Result<LoadStatus> {
        let path = path.as_ref();
        let mut state = self.state()?;
        if let Some(loaded) = state.as_ref() {
            debug!(
                requested = %path.display(),
                loaded = %loaded.path.display(),
                "report already loaded, ignoring load request"
            );
            return Ok(LoadStatus::AlreadyLoaded);
        }

        let config = self.config.clone().with_mode(mode);
        config.validate()?;

        let size = std::fs::metadata(path)?.len();
        info!(
            path = %path.display(),
            size_mb = size / (1024 * 1024),
            %mode,
            "loading report"
        );

        let (store, stats) = match mode {
            LoadMode::InMemory => {
                let data = FileData::open(path)?;
                let (store, mut stats) = ingest(&SliceSource::new(&data), &config)?;
                stats.used_mmap = data.is_mapped();
                (store, stats)
            }
            LoadMode::Chunked => {
                let source = FileSource::open(path)?;
                ingest(&source, &config)?
            }
        };

        *state = Some(Loaded {
            path: path.to_path_buf(),
            store: Arc::new(store),
            stats: stats.clone(),
        });
        Ok(LoadStatus::Loaded(stats))
    }

    /// True once a load has succeeded.
    pub fn is_loaded(&self) -> Result<bool> {
        Ok(self.state()?.is_some())
    }

    /// The loaded record store, shared read-only.
    pub fn store(&self) -> Result<Arc<RecordStore>> {
        let state = self.state()?;
        state
            .as_ref()
            .map(|l| Arc::clone(&l.store))
            .ok_or(LoadError::NotLoaded)
    }

    /// Statistics of the successful load.
    pub fn stats(&self) -> Result<LoadStats> {
        let state = self.state()?;
        state
            .as_ref()
            .map(|l| l.stats.clone())
            .ok_or(LoadError::NotLoaded)
    }

    /// Path of the loaded report.
    pub fn path(&self) -> Result<PathBuf> {
        let state = self.state()?;
        state
            .as_ref()
            .map(|l| l.path.clone())
            .ok_or(LoadError::NotLoaded)
    }

    /// Sorted distinct series identifiers for `group`.
    pub fn series_ids(&self, group: &str) -> Result<Vec<String>> {
        let store = self.store()?;
        let ids = store
            .sorted_series_ids(group)
            .into_iter()
            .map(str::to_string)
            .collect();
        Ok(ids)
    }

    /// Pivot query against the loaded store.
    pub fn pivot<S, A>(&self, group: &str, series_ids: &[S], aliases: &[A]) -> Result<PivotTable>
    where
        S: AsRef<str>,
        A: AsRef<str>,
    {
        Ok(self.store()?.pivot(group, series_ids, aliases))
    }
}
