//! Domain types shared by every crate in the autobuild daemon.

mod distribution;
mod package;

pub use distribution::{BuildOptions, Distribution, RepositoryOptions};
pub use package::{
    Compression, DistroBuildInfo, ExtractedPackage, PackageIdentifierError, PackageInfo,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One staged archive's full build record, spanning every distribution it
/// targets. Finished once the worker returns it, regardless of whether
/// individual per-distribution builds succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub info: PackageInfo,
    pub build_results_dir: PathBuf,
    pub error: Option<String>,
    pub packages: BTreeMap<u64, DistroBuildInfo>,
}

impl BuildInfo {
    pub fn new(info: PackageInfo, build_results_dir: PathBuf) -> Self {
        Self {
            info,
            build_results_dir,
            error: None,
            packages: BTreeMap::new(),
        }
    }

    /// A `BuildInfo` with no per-distribution results and a top-level error
    /// is an orphan: nothing can ever be released or discarded from it, so
    /// it must not be kept in `finished`.
    pub fn is_orphan(&self) -> bool {
        self.packages.is_empty() && self.error.is_some()
    }
}
