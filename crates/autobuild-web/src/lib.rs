// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-user HTTP facade over the build coordinator, matching `SPEC_FULL.md`
//! §4.8. One server instance is bound to a single uid — authorization is
//! implicit in which server a client connects to, not in anything carried
//! by the request.
#![deny(unsafe_code)]

use autobuild_coordinator::BuildCoordinator;
use autobuild_protocol::IncomingPackage;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct WebQueueState {
    pub coordinator: Arc<BuildCoordinator>,
    pub uid: u32,
}

#[derive(Debug, Serialize)]
pub struct QueueReply {
    pub packages: Vec<IncomingPackage>,
}

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct ActedReply {
    pub packages: Vec<u64>,
    pub error: Option<String>,
}

/// Build the per-uid router: `GET /queue`, `POST /queue/release`,
/// `POST /queue/discard`. Any other path returns 404 — the actual browser
/// UI is served from an external asset directory this crate does not
/// generate.
pub fn build_app(state: WebQueueState) -> Router {
    Router::new()
        .route("/queue", get(list_queue))
        .route("/queue/release", post(release))
        .route("/queue/discard", post(discard))
        .with_state(Arc::new(state))
}

async fn list_queue(State(state): State<Arc<WebQueueState>>) -> impl IntoResponse {
    let entries = state.coordinator.incoming(state.uid).await;
    let packages = entries
        .into_iter()
        .map(|entry| IncomingPackage::from_distro_build_info(entry.stem_name, &entry.info, state.coordinator.base()))
        .collect();
    Json(QueueReply { packages })
}

async fn release(
    State(state): State<Arc<WebQueueState>>,
    Json(request): Json<IdsRequest>,
) -> impl IntoResponse {
    let accepted = state.coordinator.release(&request.ids, state.uid).await;
    info!(uid = state.uid, count = accepted.len(), "released via web queue");
    Json(ActedReply {
        packages: accepted,
        error: None,
    })
}

async fn discard(
    State(state): State<Arc<WebQueueState>>,
    Json(request): Json<IdsRequest>,
) -> impl IntoResponse {
    let accepted = state.coordinator.discard(&request.ids, state.uid).await;
    info!(uid = state.uid, count = accepted.len(), "discarded via web queue");
    Json(ActedReply {
        packages: accepted,
        error: None,
    })
}
