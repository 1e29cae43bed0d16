//! The set of registered backends and their cached availability.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::error::BackendError;
use super::locator::{dependents_of, ToolLocator};
use super::traits::Backend;
use super::types::{BackendStatus, ConversionRequest, ProgressSender, RawResult};
use crate::capability::BackendKind;
use crate::metrics::BACKEND_DETECTIONS;

/// Registered adapters plus a read-mostly availability cache.
///
/// Lookups take a read lock. Detection and invalidation go through a single
/// writer so concurrent callers never probe the same tool twice.
pub struct BackendDirectory {
    backends: HashMap<BackendKind, Arc<dyn Backend>>,
    locator: RwLock<ToolLocator>,
    cache: RwLock<HashMap<BackendKind, BackendStatus>>,
    detect_lock: Mutex<()>,
}

impl BackendDirectory {
    pub fn new(backends: Vec<Arc<dyn Backend>>, locator: ToolLocator) -> Self {
        let backends = backends.into_iter().map(|b| (b.kind(), b)).collect();
        Self {
            backends,
            locator: RwLock::new(locator),
            cache: RwLock::new(HashMap::new()),
            detect_lock: Mutex::new(()),
        }
    }

    /// Kinds with a registered adapter.
    pub fn kinds(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|k| self.backends.contains_key(k))
            .collect()
    }

    /// Cached status, without probing.
    pub async fn cached(&self, kind: BackendKind) -> Option<BackendStatus> {
        self.cache.read().await.get(&kind).cloned()
    }

    /// Backends already probed and found available.
    pub async fn confirmed_available(&self) -> HashSet<BackendKind> {
        self.cache
            .read()
            .await
            .values()
            .filter(|s| s.available)
            .map(|s| s.kind)
            .collect()
    }

    /// Status of `kind`, probing on first use.
    pub async fn status(&self, kind: BackendKind) -> BackendStatus {
        if let Some(status) = self.cached(kind).await {
            return status;
        }

        let _guard = self.detect_lock.lock().await;
        // Another caller may have finished detection while we waited.
        if let Some(status) = self.cached(kind).await {
            return status;
        }

        let status = self.probe(kind).await;
        self.cache.write().await.insert(kind, status.clone());
        status
    }

    /// Status of every registered backend.
    pub async fn statuses(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::new();
        for kind in self.kinds() {
            statuses.push(self.status(kind).await);
        }
        statuses
    }

    /// Drops the cached status for `kind`.
    pub async fn invalidate(&self, kind: BackendKind) {
        let _guard = self.detect_lock.lock().await;
        self.cache.write().await.remove(&kind);
    }

    /// Re-probes `kind`, replacing the cached status.
    pub async fn redetect(&self, kind: BackendKind) -> BackendStatus {
        let _guard = self.detect_lock.lock().await;
        let status = self.probe(kind).await;
        self.cache.write().await.insert(kind, status.clone());
        status
    }

    /// Re-probes every registered backend.
    pub async fn redetect_all(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::new();
        for kind in self.kinds() {
            statuses.push(self.redetect(kind).await);
        }
        statuses
    }

    /// Changes the configured path of one backend and invalidates it.
    pub async fn set_override(&self, kind: BackendKind, path: Option<PathBuf>) {
        let changed = self.locator.write().await.set_override(kind, path);
        if changed {
            self.invalidate(kind).await;
            for dependent in dependents_of(kind) {
                self.invalidate(*dependent).await;
            }
        }
    }

    /// Replaces all configured paths, invalidating the ones that changed.
    pub async fn apply_overrides(&self, paths: &BTreeMap<BackendKind, PathBuf>) {
        for kind in BackendKind::ALL {
            self.set_override(kind, paths.get(&kind).cloned()).await;
        }
    }

    pub async fn overrides(&self) -> BTreeMap<BackendKind, PathBuf> {
        self.locator.read().await.overrides()
    }

    /// Dispatches a request to the backend for `kind`.
    pub async fn convert(
        &self,
        kind: BackendKind,
        request: &ConversionRequest,
        progress: ProgressSender,
    ) -> Result<RawResult, BackendError> {
        let backend = self
            .backends
            .get(&kind)
            .ok_or_else(|| BackendError::unavailable(kind, "no adapter registered"))?;

        let status = self.status(kind).await;
        if !status.available {
            return Err(BackendError::unavailable(
                kind,
                status.error.unwrap_or_else(|| "not detected".to_string()),
            ));
        }

        backend.convert(&status, request, progress).await
    }

    async fn probe(&self, kind: BackendKind) -> BackendStatus {
        let Some(backend) = self.backends.get(&kind) else {
            return BackendStatus::unavailable(kind, "no adapter registered");
        };

        let locator = self.locator.read().await.clone();
        let status = backend.detect(&locator).await;

        if status.available {
            info!(
                backend = %kind,
                path = ?status.path,
                version = ?status.version,
                "Backend available"
            );
            BACKEND_DETECTIONS
                .with_label_values(&[kind.as_str(), "available"])
                .inc();
        } else {
            warn!(backend = %kind, error = ?status.error, "Backend unavailable");
            BACKEND_DETECTIONS
                .with_label_values(&[kind.as_str(), "unavailable"])
                .inc();
        }
        status
    }
}
