// SPDX-License-Identifier: MIT OR Apache-2.0
//! Archive extraction, patching, and `pdebuild` orchestration: the
//! coordinator's `Builder` implementation.
#![deny(unsafe_code)]

mod binary;
mod changelog;
mod changes;
mod error;
mod extract;
mod moves;
mod pdebuild;
mod source;

pub use error::BuildError;

use async_trait::async_trait;
use autobuild_config::AutobuildConfig;
use autobuild_core::{BuildInfo, ExtractedPackage, PackageInfo};
use autobuild_coordinator::Builder;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use tracing::{info, warn};

pub(crate) struct BuildContext<'a> {
    pub base: &'a Path,
    pub pbuilder: &'a str,
    pub group: &'a str,
    pub package: &'a PackageInfo,
    pub extracted: &'a ExtractedPackage,
}

/// Drives the full pipeline for one staged package: extract, then for each
/// configured distribution build the source package and, if that
/// succeeds, each configured architecture's binaries. See
/// `SPEC_FULL.md` §4.6 and §7 for the per-distribution/per-architecture
/// error isolation this implements.
pub struct PdebuildBuilder {
    base: PathBuf,
}

impl PdebuildBuilder {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn work_dir_for(&self, package: &PackageInfo) -> PathBuf {
        self.base
            .join("tmp")
            .join(format!("{}-{}", package.name, package.version))
    }
}

#[async_trait]
impl Builder for PdebuildBuilder {
    async fn build(&self, package: PackageInfo, config: &AutobuildConfig, next_id: &AtomicU64) -> BuildInfo {
        let work_dir = self.work_dir_for(&package);
        let build_results_dir = work_dir.clone();
        let mut build_info = BuildInfo::new(package.clone(), build_results_dir);

        let outcome = match extract::extract_package(&package, &work_dir).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(package = package.basename(), error = %err, "extraction failed");
                build_info.error = Some(err.to_string());
                let _ = std::fs::remove_dir_all(&work_dir);
                return build_info;
            }
        };
        // The staged archive is consumed once extraction succeeds.
        let _ = std::fs::remove_file(&package.stage_path);

        let effective_options = outcome
            .build_options_override
            .clone()
            .unwrap_or_else(|| config.build_options.clone());

        let ctx = BuildContext {
            base: &self.base,
            pbuilder: &config.pbuilder,
            group: &config.group,
            package: &package,
            extracted: &outcome.extracted,
        };

        for distribution in &effective_options.distributions {
            info!(distribution = %distribution.source_name(), "building source package");
            let source_info = source::build_source(&ctx, distribution, next_id).await;
            let source_failed = source_info.error.is_some();
            build_info.packages.insert(source_info.id, source_info);
            if source_failed {
                // A source-build failure aborts only this distribution's
                // binaries; sibling distributions are unaffected.
                continue;
            }

            for (index, arch) in distribution.architectures.iter().enumerate() {
                info!(distribution = %distribution.source_name(), arch, "building binary package");
                let binary_info = binary::build_binary(&ctx, distribution, arch, index == 0, next_id).await;
                build_info.packages.insert(binary_info.id, binary_info);
            }
        }

        let _ = std::fs::remove_dir_all(&work_dir);
        build_info
    }
}
