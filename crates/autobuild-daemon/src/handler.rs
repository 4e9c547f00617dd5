// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dispatches authenticated RPC requests onto the build coordinator, and
//! owns the lifecycle of per-uid web-queue HTTP services.

use async_trait::async_trait;
use autobuild_coordinator::{BuildCoordinator, CoordinatorError};
use autobuild_protocol::{AuthenticatedRequest, IncomingPackage, Request, Response, RpcError};
use autobuild_transport::RequestHandler;
use autobuild_web::{build_app, WebQueueState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct WebQueueEntry {
    owner_uid: u32,
    shutdown: tokio::task::JoinHandle<()>,
}

pub struct DaemonHandler {
    coordinator: Arc<BuildCoordinator>,
    webqueue_dir: PathBuf,
    webqueue_seq: AtomicU64,
    webqueues: Mutex<HashMap<PathBuf, WebQueueEntry>>,
}

impl DaemonHandler {
    pub fn new(coordinator: Arc<BuildCoordinator>, base: &Path) -> Self {
        Self {
            coordinator,
            webqueue_dir: base.join("run/webqueue"),
            webqueue_seq: AtomicU64::new(0),
            webqueues: Mutex::new(HashMap::new()),
        }
    }

    async fn start_web_queue(&self, uid: u32) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.webqueue_dir)?;
        let seq = self.webqueue_seq.fetch_add(1, Ordering::SeqCst);
        let socket_path = self.webqueue_dir.join(format!("{uid}-{seq}.sock"));
        let _ = std::fs::remove_file(&socket_path);

        let listener = UnixListener::bind(&socket_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o777))?;
        }

        let app = build_app(WebQueueState { coordinator: Arc::clone(&self.coordinator), uid });
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                warn!(error = %err, "web queue service exited with an error");
            }
        });

        self.webqueues.lock().await.insert(
            socket_path.clone(),
            WebQueueEntry { owner_uid: uid, shutdown: task },
        );
        info!(socket = %socket_path.display(), uid, "started web queue service");
        Ok(socket_path)
    }

    async fn close_web_queue(&self, socket_path: &Path, uid: u32) {
        let mut webqueues = self.webqueues.lock().await;
        let Some(entry) = webqueues.get(socket_path) else {
            return;
        };
        if entry.owner_uid != uid {
            return;
        }
        let entry = webqueues.remove(socket_path).expect("just checked present");
        entry.shutdown.abort();
        let _ = std::fs::remove_file(socket_path);
    }
}

#[async_trait]
impl RequestHandler for DaemonHandler {
    async fn handle(&self, request: AuthenticatedRequest<Request>) -> Response {
        let uid = request.owner_uid;
        match request.payload {
            Request::Stage { filename, data } => {
                match self.coordinator.stage(&filename, &data, uid).await {
                    Ok(info) => Response::Staged(info),
                    Err(err) => Response::Error(to_rpc_error(err)),
                }
            }
            Request::Incoming => {
                let entries = self.coordinator.incoming(uid).await;
                let packages = entries
                    .into_iter()
                    .map(|entry| {
                        IncomingPackage::from_distro_build_info(entry.stem_name, &entry.info, self.coordinator.base())
                    })
                    .collect();
                Response::Incoming(packages)
            }
            Request::Release { ids } => Response::Released {
                accepted_ids: self.coordinator.release(&ids, uid).await,
            },
            Request::Discard { ids } => Response::Discarded {
                accepted_ids: self.coordinator.discard(&ids, uid).await,
            },
            Request::WebQueueService => match self.start_web_queue(uid).await {
                Ok(socket_path) => Response::WebQueueService { socket_path },
                Err(err) => Response::Error(RpcError::Io(err.to_string())),
            },
            Request::CloseWebQueueService { socket_path } => {
                self.close_web_queue(&socket_path, uid).await;
                Response::Closed
            }
        }
    }
}

fn to_rpc_error(err: CoordinatorError) -> RpcError {
    match err {
        CoordinatorError::BadName(name) => RpcError::BadName(name),
        CoordinatorError::AlreadyBuilding(name) => RpcError::AlreadyBuilding(name),
        CoordinatorError::AlreadyQueued(name) => RpcError::AlreadyQueued(name),
        CoordinatorError::AwaitingRelease(name) => RpcError::AwaitingRelease(name),
        CoordinatorError::Io(err) => RpcError::Io(err.to_string()),
        CoordinatorError::Persist(err) => RpcError::Io(err.to_string()),
    }
}
