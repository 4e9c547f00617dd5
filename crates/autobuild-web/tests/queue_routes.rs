// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end exercises of the `/queue` routes against a real
//! `BuildCoordinator`, using `tower::ServiceExt::oneshot` so no socket is
//! bound.

use async_trait::async_trait;
use autobuild_config::{AutobuildConfig, ConfigStore};
use autobuild_coordinator::{BuildCoordinator, Builder, Publisher};
use autobuild_core::{BuildInfo, Compression, Distribution, DistroBuildInfo, PackageInfo};
use autobuild_web::{build_app, WebQueueState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

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

async fn app_for_uid(base: &std::path::Path, uid: u32) -> axum::Router {
    let config = Arc::new(ConfigStore::new(base.join("etc/autobuild.json")));
    let coordinator = Arc::new(BuildCoordinator::new(
        base,
        config,
        Arc::new(NoopBuilder),
        Arc::new(NoopPublisher),
    ));
    coordinator
        .stage("demo_1.0.tar.gz", b"data", uid)
        .await
        .unwrap();

    let worker = Arc::clone(&coordinator);
    let handle = tokio::spawn(async move { worker.run_worker().await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.abort();

    build_app(WebQueueState { coordinator, uid })
}

async fn body_json(resp: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn list_queue_returns_only_the_bound_uids_packages() {
    let dir = tempdir().unwrap();
    let app = app_for_uid(dir.path(), 1000).await;

    let response = app
        .oneshot(Request::builder().uri("/queue").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let packages = json["packages"].as_array().unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0]["name"], "demo");
}

#[tokio::test]
async fn release_scopes_to_bound_uid_and_ignores_foreign_ids() {
    let dir = tempdir().unwrap();
    let app = app_for_uid(dir.path(), 1000).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/queue/release")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"ids":[1,2,3]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    // id 1 belongs to this uid's one finished build; 2 and 3 don't exist.
    assert_eq!(json["packages"].as_array().unwrap(), &vec![serde_json::json!(1)]);
}

#[tokio::test]
async fn discard_removes_only_the_owned_id() {
    let dir = tempdir().unwrap();
    let app = app_for_uid(dir.path(), 1000).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/queue/discard")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"ids":[1]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["packages"].as_array().unwrap(), &vec![serde_json::json!(1)]);

    let follow_up = app
        .oneshot(Request::builder().uri("/queue").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(follow_up).await;
    assert!(json["packages"].as_array().unwrap().is_empty());
}
