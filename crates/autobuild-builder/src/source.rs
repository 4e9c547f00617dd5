use crate::changelog::substitute_unreleased;
use crate::changes::parse_changes_files;
use crate::pdebuild::{into_build_error, invoke_pdebuild, PdebuildInvocation};
use crate::BuildContext;
use autobuild_core::{DistroBuildInfo, Distribution};
use autobuild_procio::{run_piped, CommandSpec};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Build the source package for one distribution: apply the Debian diff
/// and any distribution-specific patch, rewrite the changelog, and invoke
/// `pdebuild -S`. See `SPEC_FULL.md` §4.6.2.
pub async fn build_source(
    ctx: &BuildContext<'_>,
    distribution: &Distribution,
    next_id: &AtomicU64,
) -> DistroBuildInfo {
    let id = next_id.fetch_add(1, Ordering::SeqCst);
    let source_dir = ctx.extracted.work_dir.join(ctx.package.source_package_dir());
    let results_dir = ctx
        .extracted
        .work_dir
        .join(format!("results-{}-source", distribution.codename));
    let incoming_dir = ctx
        .base
        .join("incoming")
        .join(&distribution.os)
        .join(&distribution.codename);

    let mut info = DistroBuildInfo {
        id,
        incoming_dir: incoming_dir.clone(),
        changes_stem: PathBuf::new(),
        distribution: distribution.clone(),
        architecture: "source".to_string(),
        changes_files: Vec::new(),
        files: Vec::new(),
        error: None,
        log: String::new(),
        compression: ctx.package.compression,
    };

    if let Err(err) = run_build_steps(ctx, distribution, &source_dir, &results_dir, &mut info).await {
        info.error = Some(err.to_string());
        if let Some(log) = err.log() {
            info.log = log;
        }
        let _ = std::fs::remove_dir_all(&results_dir);
    }

    info
}

struct StepError {
    message: String,
    log: Option<String>,
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StepError {
    fn log(&self) -> Option<String> {
        self.log.clone()
    }
}

impl From<crate::BuildError> for StepError {
    fn from(err: crate::BuildError) -> Self {
        let log = match &err {
            crate::BuildError::ExternalFailed { log, .. } => Some(log.clone()),
            _ => None,
        };
        Self {
            message: err.to_string(),
            log,
        }
    }
}

async fn run_build_steps(
    ctx: &BuildContext<'_>,
    distribution: &Distribution,
    source_dir: &Path,
    results_dir: &Path,
    info: &mut DistroBuildInfo,
) -> Result<(), StepError> {
    // Re-extract the orig tarball; always gzip regardless of the outer
    // staged archive's compression.
    tokio::fs::create_dir_all(&ctx.extracted.work_dir).await.map_err(crate::BuildError::from)?;
    let untar = CommandSpec::new("tar")
        .arg("-xzf")
        .arg(ctx.extracted.orig_tarball_path.to_string_lossy().to_string())
        .cwd(&ctx.extracted.work_dir);
    let output = autobuild_procio::run(&untar, None).await.map_err(crate::BuildError::from)?;
    if !output.success() {
        return Err(into_build_error("tar (extract orig tarball)", output).into());
    }
    if !source_dir.is_dir() {
        return Err(crate::BuildError::MissingComponent(format!(
            "orig tarball did not produce {}",
            source_dir.display()
        ))
        .into());
    }

    // Apply the Debian diff, streamed from gzip into patch -p1.
    let gunzip = CommandSpec::new("gzip")
        .arg("-dc")
        .arg(ctx.extracted.debian_diff_path.to_string_lossy().to_string());
    let patch = CommandSpec::new("patch").arg("-p1").cwd(source_dir);
    let output = run_piped(&gunzip, &patch).await.map_err(crate::BuildError::from)?;
    if !output.success() {
        return Err(into_build_error("patch (apply debian diff)", output).into());
    }

    if !source_dir.join("debian").is_dir() {
        return Err(crate::BuildError::MissingDebianDir.into());
    }

    if let Some(patch_file) = ctx.extracted.patches.get(&distribution.codename) {
        let spec = CommandSpec::new("patch")
            .arg("-p1")
            .arg("-i")
            .arg(patch_file.to_string_lossy().to_string())
            .cwd(source_dir);
        let output = autobuild_procio::run(&spec, None).await.map_err(crate::BuildError::from)?;
        if !output.success() {
            return Err(into_build_error("patch (apply distribution patch)", output).into());
        }
    }

    let changelog_path = source_dir.join("debian/changelog");
    let changelog = tokio::fs::read_to_string(&changelog_path)
        .await
        .map_err(crate::BuildError::from)?;
    let rewritten = substitute_unreleased(&changelog, &distribution.codename);
    tokio::fs::write(&changelog_path, rewritten)
        .await
        .map_err(crate::BuildError::from)?;

    let invocation = PdebuildInvocation {
        pbuilder: ctx.pbuilder,
        base: ctx.base,
        source_dir,
        results_dir,
        debbuildopts: &["-us", "-uc", "-S"],
        dist: distribution.source_name(),
        arch: None,
    };
    let output = invoke_pdebuild(&invocation).await.map_err(StepError::from)?;
    if !output.success() {
        return Err(into_build_error("pdebuild (source)", output).into());
    }

    let moved = crate::moves::move_results(results_dir, &info.incoming_dir)
        .await
        .map_err(crate::BuildError::from)?;
    for changes_path in moved.iter().filter(|p| p.extension().map(|e| e == "changes").unwrap_or(false)) {
        info.changes_stem = changes_path.with_extension("");
        if let Ok(text) = tokio::fs::read_to_string(changes_path).await {
            info.changes_files = parse_changes_files(&text, &info.incoming_dir);
        }
    }
    info.files = moved;
    if info.files.is_empty() {
        warn!(distribution = %distribution.source_name(), "pdebuild produced no output files");
    }
    crate::moves::assign_ownership(&info.files, ctx.package.owner_uid, ctx.group);
    Ok(())
}
