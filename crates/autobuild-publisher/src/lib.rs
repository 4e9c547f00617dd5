// SPDX-License-Identifier: MIT OR Apache-2.0
//! `reprepro` adapter. The coordinator already serializes calls to
//! [`RepreproPublisher::publish`] behind its own exclusion lock before
//! invoking it; this crate only knows how to build and run one invocation.
#![deny(unsafe_code)]

use async_trait::async_trait;
use autobuild_core::Distribution;
use autobuild_coordinator::Publisher;
use autobuild_procio::{run, CommandSpec};
use std::path::PathBuf;

pub struct RepreproPublisher {
    base: PathBuf,
}

impl RepreproPublisher {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn invocation(&self, os: &str, subcommand: &str) -> CommandSpec {
        CommandSpec::new("reprepro")
            .arg("-b")
            .arg(self.base.join("repository").join(os).to_string_lossy().to_string())
            .arg("--gnupghome")
            .arg(self.base.join(".gnupg").to_string_lossy().to_string())
            .arg(subcommand)
    }

    /// `reprepro export <codename>`: initialize or refresh the signed
    /// index for a distribution.
    pub async fn init(&self, distribution: &Distribution) -> Result<(), String> {
        let spec = self
            .invocation(&distribution.os, "export")
            .arg(distribution.codename.clone());
        run_checked(spec).await
    }

    /// `reprepro clearvanished`: drop index entries whose files no longer
    /// exist. Used by the `wipe` collaborator before deleting `base`.
    pub async fn clear_vanished(&self, os: &str) -> Result<(), String> {
        run_checked(self.invocation(os, "clearvanished")).await
    }
}

#[async_trait]
impl Publisher for RepreproPublisher {
    async fn publish(&self, distribution: &Distribution) -> Result<(), String> {
        let spec = self
            .invocation(&distribution.os, "processincoming")
            .arg(distribution.codename.clone());
        run_checked(spec).await
    }
}

async fn run_checked(spec: CommandSpec) -> Result<(), String> {
    let output = run(&spec, None).await.map_err(|e| e.to_string())?;
    if output.success() {
        Ok(())
    } else {
        Err(output.combined_log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_includes_base_and_gnupghome() {
        let publisher = RepreproPublisher::new("/var/lib/autobuild");
        let spec = publisher.invocation("ubuntu", "export");
        assert_eq!(spec.program, "reprepro");
        assert!(spec.args.contains(&"/var/lib/autobuild/repository/ubuntu".to_string()));
        assert!(spec.args.contains(&"/var/lib/autobuild/.gnupg".to_string()));
        assert!(spec.args.contains(&"export".to_string()));
    }
}
