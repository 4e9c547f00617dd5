// SPDX-License-Identifier: MIT OR Apache-2.0
//! The build coordinator: the serialized, authorized pipeline from staged
//! archive to released artifact.

mod error;
mod state;
mod traits;

pub use error::CoordinatorError;
pub use state::{CoordinatorState, PersistedState};
pub use traits::{Builder, Publisher};

use autobuild_config::ConfigStore;
use autobuild_core::{Distribution, PackageInfo};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

const STATE_FILE: &str = "run/builder.state";
const STAGE_DIR: &str = "stage";

/// One finished build's result, scoped to a single owner for the
/// `Incoming` RPC reply.
#[derive(Debug, Clone)]
pub struct OwnedIncomingEntry {
    pub stem_name: String,
    pub info: autobuild_core::DistroBuildInfo,
}

pub struct BuildCoordinator {
    base: PathBuf,
    state: Arc<Mutex<CoordinatorState>>,
    next_id: AtomicU64,
    notify_tx: mpsc::Sender<()>,
    notify_rx: Mutex<Option<mpsc::Receiver<()>>>,
    config: Arc<ConfigStore>,
    builder: Arc<dyn Builder>,
    publisher: Arc<dyn Publisher>,
    publish_lock: Mutex<()>,
}

impl BuildCoordinator {
    pub fn new(
        base: impl Into<PathBuf>,
        config: Arc<ConfigStore>,
        builder: Arc<dyn Builder>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(64);
        Self {
            base: base.into(),
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            next_id: AtomicU64::new(1),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
            config,
            builder,
            publisher,
            publish_lock: Mutex::new(()),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.base.join(STATE_FILE)
    }

    fn stage_dir(&self) -> PathBuf {
        self.base.join(STAGE_DIR)
    }

    /// Stage a new archive. See `SPEC_FULL.md` §4.5.2.
    pub async fn stage(
        &self,
        basename: &str,
        data: &[u8],
        owner_uid: u32,
    ) -> Result<PackageInfo, CoordinatorError> {
        let mut state = self.state.lock().await;
        if state.is_building(basename) {
            return Err(CoordinatorError::AlreadyBuilding(basename.to_string()));
        }
        if state.is_awaiting_release(basename) {
            return Err(CoordinatorError::AwaitingRelease(basename.to_string()));
        }
        if state.is_queued(basename) {
            return Err(CoordinatorError::AlreadyQueued(basename.to_string()));
        }

        let stage_dir = self.stage_dir();
        std::fs::create_dir_all(&stage_dir)?;
        let stage_path = stage_dir.join(basename);
        if let Err(err) = std::fs::write(&stage_path, data) {
            let _ = std::fs::remove_file(&stage_path);
            return Err(CoordinatorError::Io(err));
        }

        let info = PackageInfo::from_stage_path(stage_path.clone(), owner_uid).map_err(|_| {
            let _ = std::fs::remove_file(&stage_path);
            CoordinatorError::BadName(basename.to_string())
        })?;

        state.queue.push(info.clone());
        drop(state);
        let _ = self.notify_tx.try_send(());
        Ok(info)
    }

    /// List every finished `DistroBuildInfo` owned by `uid`.
    pub async fn incoming(&self, uid: u32) -> Vec<OwnedIncomingEntry> {
        let state = self.state.lock().await;
        let mut out = Vec::new();
        for build in &state.finished {
            if build.info.owner_uid != uid {
                continue;
            }
            let stem_name = build.info.source_package_dir();
            for info in build.packages.values() {
                out.push(OwnedIncomingEntry {
                    stem_name: stem_name.clone(),
                    info: info.clone(),
                });
            }
        }
        out
    }

    fn filter_owned(state: &CoordinatorState, ids: &[u64], uid: u32) -> Vec<u64> {
        ids.iter()
            .copied()
            .filter(|id| state.find_owned(*id, uid).is_some())
            .collect()
    }

    /// Delete every file belonging to the given ids, owner-scoped. Returns
    /// the ids actually discarded.
    pub async fn discard(&self, ids: &[u64], uid: u32) -> Vec<u64> {
        let mut state = self.state.lock().await;
        let owned = Self::filter_owned(&state, ids, uid);
        let mut accepted = Vec::new();
        for id in &owned {
            let Some((pos, _)) = state.find_owned(*id, uid) else {
                continue;
            };
            let Some(build) = state.finished.get_mut(pos) else {
                continue;
            };
            let Some(distro_info) = build.packages.remove(id) else {
                continue;
            };
            for file in &distro_info.files {
                if let Err(err) = std::fs::remove_file(file) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!(file = %file.display(), error = %err, "failed to remove discarded artifact");
                    }
                }
            }
            accepted.push(*id);
        }
        state.finished.retain(|b| !b.packages.is_empty());
        state.reindex();
        accepted
    }

    /// Move every file belonging to the given ids into the publisher's
    /// incoming directories, then run the publisher once per distinct
    /// distribution touched. Returns the ids actually released.
    pub async fn release(&self, ids: &[u64], uid: u32) -> Vec<u64> {
        let (accepted, touched) = {
            let mut state = self.state.lock().await;
            let owned = Self::filter_owned(&state, ids, uid);
            let mut accepted = Vec::new();
            let mut touched: BTreeSet<Distribution> = BTreeSet::new();
            for id in &owned {
                let Some((pos, _)) = state.find_owned(*id, uid) else {
                    continue;
                };
                let Some(build) = state.finished.get_mut(pos) else {
                    continue;
                };
                let Some(distro_info) = build.packages.get_mut(id) else {
                    continue;
                };
                let dest_dir = self
                    .base
                    .join("repository")
                    .join(&distro_info.distribution.os)
                    .join("incoming")
                    .join(&distro_info.distribution.codename);
                if let Err(err) = move_files(&dest_dir, &mut distro_info.files) {
                    warn!(error = %err, "failed to move released artifact into incoming");
                    continue;
                }
                touched.insert(distro_info.distribution.clone());
                build.packages.remove(id);
                accepted.push(*id);
            }
            state.finished.retain(|b| !b.packages.is_empty());
            state.reindex();
            (accepted, touched)
        };

        if !touched.is_empty() {
            let _guard = self.publish_lock.lock().await;
            for distribution in &touched {
                if let Err(err) = self.publisher.publish(distribution).await {
                    warn!(distribution = %distribution.source_name(), error = %err, "publisher invocation failed");
                }
            }
        }

        accepted
    }

    /// Persist `finished`, `queue` (with any in-progress build folded back
    /// to the head) and `next_id` to `run/builder.state`.
    pub async fn save(&self) -> Result<(), CoordinatorError> {
        let state = self.state.lock().await;
        let persisted = PersistedState::capture(&state, self.next_id.load(Ordering::SeqCst));
        drop(state);
        let bytes = bincode::serialize(&persisted).map_err(CoordinatorError::Persist)?;
        let path = self.state_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    /// Restore state from `run/builder.state`. A missing file is not an
    /// error (fresh install). If a non-empty queue is restored, the
    /// worker is notified once so it picks the head up immediately after
    /// `run_worker` starts.
    pub async fn load(&self) -> Result<(), CoordinatorError> {
        let path = self.state_path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(CoordinatorError::Io(err)),
        };
        let persisted: PersistedState = bincode::deserialize(&bytes).map_err(CoordinatorError::Persist)?;
        let mut state = self.state.lock().await;
        let has_queue = !persisted.queue.is_empty();
        let next_id = persisted.restore_into(&mut state);
        drop(state);
        self.next_id.store(next_id, Ordering::SeqCst);
        if has_queue {
            let _ = self.notify_tx.try_send(());
        }
        Ok(())
    }

    /// Drive the single worker task to completion. Never returns under
    /// normal operation; runs until the process is torn down.
    pub async fn run_worker(self: &Arc<Self>) {
        let mut rx = self
            .notify_rx
            .lock()
            .await
            .take()
            .expect("run_worker must only be called once");
        loop {
            if rx.recv().await.is_none() {
                return;
            }
            self.drain_queue().await;
        }
    }

    async fn drain_queue(self: &Arc<Self>) {
        loop {
            let package = {
                let mut state = self.state.lock().await;
                if state.currently_building.is_some() {
                    return;
                }
                if state.queue.is_empty() {
                    return;
                }
                let package = state.queue.remove(0);
                state.currently_building = Some(package.clone());
                package
            };

            let config = self.config.load().unwrap_or_default();
            info!(package = package.basename(), "starting build");
            let build_info = self.builder.build(package, &config, &self.next_id).await;

            let mut state = self.state.lock().await;
            state.currently_building = None;
            if !build_info.is_orphan() {
                state.finished.push(build_info);
                state.reindex();
            }
            if state.queue.is_empty() {
                return;
            }
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

fn move_files(dest_dir: &Path, files: &mut [PathBuf]) -> std::io::Result<()> {
    std::fs::create_dir_all(dest_dir)?;
    for file in files.iter_mut() {
        let Some(name) = file.file_name() else {
            continue;
        };
        let dest = dest_dir.join(name);
        if std::fs::rename(&file, &dest).is_err() {
            std::fs::copy(&file, &dest)?;
            std::fs::remove_file(&file)?;
        }
        *file = dest;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autobuild_config::AutobuildConfig;
    use autobuild_core::{BuildInfo, Compression, DistroBuildInfo};
    use tempfile::tempdir;

    struct NoopBuilder;

    #[async_trait]
    impl Builder for NoopBuilder {
        async fn build(
            &self,
            package: PackageInfo,
            _config: &AutobuildConfig,
            next_id: &AtomicU64,
        ) -> BuildInfo {
            let mut build = BuildInfo::new(package.clone(), PathBuf::from("/tmp/results"));
            let id = next_id.fetch_add(1, Ordering::SeqCst);
            build.packages.insert(
                id,
                DistroBuildInfo {
                    id,
                    incoming_dir: PathBuf::from("/tmp/incoming"),
                    changes_stem: PathBuf::from(format!("{}_{}", package.name, package.version)),
                    distribution: Distribution::new("ubuntu", "noble", vec!["amd64".into()]),
                    architecture: "source".into(),
                    changes_files: vec![],
                    files: vec![],
                    error: None,
                    log: String::new(),
                    compression: Compression::Gz,
                },
            );
            build
        }
    }

    struct NoopPublisher;

    #[async_trait]
    impl Publisher for NoopPublisher {
        async fn publish(&self, _distribution: &Distribution) -> Result<(), String> {
            Ok(())
        }
    }

    fn coordinator(base: &Path) -> Arc<BuildCoordinator> {
        let config = Arc::new(ConfigStore::new(base.join("etc/autobuild.json")));
        Arc::new(BuildCoordinator::new(
            base,
            config,
            Arc::new(NoopBuilder),
            Arc::new(NoopPublisher),
        ))
    }

    #[tokio::test]
    async fn stage_rejects_collision_with_queued_package() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());
        coord.stage("demo_1.0.tar.gz", b"data", 1000).await.unwrap();
        let err = coord.stage("demo_1.0.tar.gz", b"data", 1000).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyQueued(_)));
    }

    #[tokio::test]
    async fn stage_rejects_bad_name() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());
        let err = coord.stage("not-a-valid-name.txt", b"x", 1000).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::BadName(_)));
    }

    #[tokio::test]
    async fn worker_builds_staged_package_and_it_appears_in_incoming() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());
        coord.stage("demo_1.0.tar.gz", b"data", 1000).await.unwrap();

        let worker_coord = Arc::clone(&coord);
        let worker = tokio::spawn(async move {
            worker_coord.run_worker().await;
        });

        // Give the worker a beat to drain the queue; drain_queue returns as
        // soon as the queue is empty rather than looping forever, so the
        // worker task naturally awaits the next notification.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        worker.abort();

        let entries = coord.incoming(1000).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].info.architecture, "source");
    }

    #[tokio::test]
    async fn discard_removes_only_owned_ids() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());
        coord.stage("demo_1.0.tar.gz", b"data", 1000).await.unwrap();
        let worker_coord = Arc::clone(&coord);
        let worker = tokio::spawn(async move { worker_coord.run_worker().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        worker.abort();

        let entries = coord.incoming(1000).await;
        let id = entries[0].info.id;

        let accepted_wrong_owner = coord.discard(&[id], 9999).await;
        assert!(accepted_wrong_owner.is_empty());

        let accepted = coord.discard(&[id], 1000).await;
        assert_eq!(accepted, vec![id]);
        assert!(coord.incoming(1000).await.is_empty());
    }

    #[tokio::test]
    async fn release_removes_the_package_so_it_does_not_reappear_in_incoming() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());
        coord.stage("demo_1.0.tar.gz", b"data", 1000).await.unwrap();
        let worker_coord = Arc::clone(&coord);
        let worker = tokio::spawn(async move { worker_coord.run_worker().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        worker.abort();

        let entries = coord.incoming(1000).await;
        let id = entries[0].info.id;

        let accepted = coord.release(&[id], 1000).await;
        assert_eq!(accepted, vec![id]);
        assert!(coord.incoming(1000).await.is_empty());

        // A second release of the same id must be a no-op: it no longer
        // exists, so it can't be re-accepted or re-moved.
        let accepted_again = coord.release(&[id], 1000).await;
        assert!(accepted_again.is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip_queue_and_next_id() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path());
        coord.stage("demo_1.0.tar.gz", b"data", 1000).await.unwrap();
        coord.save().await.unwrap();

        let reloaded = coordinator(dir.path());
        reloaded.load().await.unwrap();
        let state = reloaded.state.lock().await;
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.queue[0].name, "demo");
    }
}
