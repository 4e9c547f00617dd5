// SPDX-License-Identifier: MIT OR Apache-2.0
//! Optional `tmpfs` mount over the pbuilder build directory, per
//! `SPEC_FULL.md` §5's resource policy. Best-effort: failures are logged,
//! never fatal to daemon startup or shutdown.

use autobuild_procio::{run, CommandSpec};
use std::path::Path;
use tracing::warn;

pub async fn mount(base: &Path) {
    let target = base.join("pbuilder/build");
    if let Err(err) = std::fs::create_dir_all(&target) {
        warn!(error = %err, path = %target.display(), "failed to create tmpfs mount point");
        return;
    }
    let spec = CommandSpec::new("mount")
        .args(["-t", "tmpfs", "tmpfs"])
        .arg(target.to_string_lossy().to_string());
    match run(&spec, None).await {
        Ok(output) if output.success() => {}
        Ok(output) => warn!(log = %output.combined_log, "mount -t tmpfs exited non-zero"),
        Err(err) => warn!(error = %err, "failed to spawn mount"),
    }
}

pub async fn unmount(base: &Path) {
    let target = base.join("pbuilder/build");
    let spec = CommandSpec::new("umount").arg(target.to_string_lossy().to_string());
    match run(&spec, None).await {
        Ok(output) if output.success() => {}
        Ok(output) => warn!(log = %output.combined_log, "umount exited non-zero"),
        Err(err) => warn!(error = %err, "failed to spawn umount"),
    }
}
