use async_trait::async_trait;
use autobuild_config::AutobuildConfig;
use autobuild_core::{BuildInfo, Distribution, PackageInfo};
use std::sync::atomic::AtomicU64;

/// Implemented by `autobuild-builder`. Runs the extraction/build pipeline
/// for one staged package outside the coordinator lock, assigning fresh
/// ids from `next_id` as it creates each `DistroBuildInfo`.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(
        &self,
        package: PackageInfo,
        config: &AutobuildConfig,
        next_id: &AtomicU64,
    ) -> BuildInfo;
}

/// Implemented by `autobuild-publisher`. Invoked once per distinct
/// distribution touched by a `Release`, after the coordinator lock has
/// already been released and the publisher's own exclusion lock acquired.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, distribution: &Distribution) -> Result<(), String>;
}
