use crate::error::Result;
use crate::memory::MemStorage;
use crate::MetricsStorage;
use async_trait::async_trait;
use pulsemon_common::types::{Metric, MetricKind, MetricsSnapshot};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

/// Memory storage mirrored into a JSON snapshot file.
///
/// Saving truncates and rewrites the whole file, so a crash in the middle
/// of a save can leave a corrupt snapshot behind.
///
/// In synchronous mode a write is applied in memory before the save. If the
/// save fails the caller gets the error, but the write stays applied and is
/// persisted by the next successful save; a client that retries the same
/// counter delta will count it twice.
pub struct FileStorage {
    mem: Arc<MemStorage>,
    path: PathBuf,
    sync_save: bool,
    save_lock: Arc<tokio::sync::Mutex<()>>,
    saver: Mutex<Option<JoinHandle<()>>>,
}

impl FileStorage {
    /// Opens the snapshot at `path`.
    ///
    /// With `restore`, an existing non-empty file is loaded first. A
    /// `store_interval_secs` of 0 saves after every write; anything else
    /// starts a background task saving on that period.
    pub async fn open(
        path: impl Into<PathBuf>,
        store_interval_secs: u64,
        restore: bool,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mem = Arc::new(MemStorage::new());
        if restore {
            if let Some(snapshot) = load_from_file(&path).await? {
                tracing::info!(
                    path = %path.display(),
                    counters = snapshot.counters.len(),
                    gauges = snapshot.gauges.len(),
                    "Restored metrics from snapshot"
                );
                mem.replace(snapshot);
            }
        }

        let save_lock = Arc::new(tokio::sync::Mutex::new(()));
        let sync_save = store_interval_secs == 0;
        let saver = if sync_save {
            None
        } else {
            Some(spawn_saver(
                mem.clone(),
                path.clone(),
                save_lock.clone(),
                Duration::from_secs(store_interval_secs),
            ))
        };

        tracing::info!(
            path = %path.display(),
            store_interval_secs,
            restore,
            "Initialized file metric storage"
        );

        Ok(Self {
            mem,
            path,
            sync_save,
            save_lock,
            saver: Mutex::new(saver),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current contents to the snapshot file.
    pub async fn save(&self) -> Result<()> {
        save_locked(&self.mem, &self.path, &self.save_lock).await
    }

    async fn after_write(&self) -> Result<()> {
        if self.sync_save {
            self.save().await?;
        }
        Ok(())
    }
}

fn spawn_saver(
    mem: Arc<MemStorage>,
    path: PathBuf,
    save_lock: Arc<tokio::sync::Mutex<()>>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(period);
        // the first tick completes immediately
        tick.tick().await;
        loop {
            tick.tick().await;
            if let Err(e) = save_locked(&mem, &path, &save_lock).await {
                tracing::error!(path = %path.display(), error = %e, "Periodic snapshot save failed");
            } else {
                tracing::debug!(path = %path.display(), "Snapshot saved");
            }
        }
    })
}

// The snapshot is taken under the save lock so a slower save can never
// overwrite a newer one.
async fn save_locked(
    mem: &MemStorage,
    path: &Path,
    save_lock: &tokio::sync::Mutex<()>,
) -> Result<()> {
    let _guard = save_lock.lock().await;
    save_to_file(path, &mem.snapshot()).await
}

/// Reads a snapshot file. A missing or blank file yields `None`.
pub async fn load_from_file(path: &Path) -> Result<Option<MetricsSnapshot>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Replaces the file contents with `snapshot`.
pub async fn save_to_file(path: &Path, snapshot: &MetricsSnapshot) -> Result<()> {
    let bytes = serde_json::to_vec(snapshot)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[async_trait]
impl MetricsStorage for FileStorage {
    async fn create_record(&self, metric: &Metric) -> Result<Metric> {
        let stored = self.mem.apply(metric)?;
        self.after_write().await?;
        Ok(stored)
    }

    async fn get_record(&self, name: &str, kind: MetricKind) -> Result<Metric> {
        self.mem.find(name, kind)
    }

    async fn get_all_records(&self) -> Result<MetricsSnapshot> {
        Ok(self.mem.snapshot())
    }

    async fn store_metrics_batch(&self, metrics: &[Metric]) -> Result<()> {
        self.mem.apply_batch(metrics)?;
        self.after_write().await
    }

    async fn close(&self) -> Result<()> {
        let saver = self
            .saver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = saver {
            handle.abort();
        }
        self.save().await?;
        tracing::info!(path = %self.path.display(), "Metric snapshot written on close");
        Ok(())
    }
}
