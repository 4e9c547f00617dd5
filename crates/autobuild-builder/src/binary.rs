use crate::changes::parse_changes_files;
use crate::pdebuild::{into_build_error, invoke_pdebuild, PdebuildInvocation};
use crate::BuildContext;
use autobuild_core::{Distribution, DistroBuildInfo};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Build binary packages for one architecture. `is_first_arch` selects
/// `-b` (binary-and-arch-independent) vs `-B` (arch-dependent only), per
/// `SPEC_FULL.md` §4.6.3 — this intentionally departs from the original
/// implementation, which always passed `-b`.
pub async fn build_binary(
    ctx: &BuildContext<'_>,
    distribution: &Distribution,
    arch: &str,
    is_first_arch: bool,
    next_id: &AtomicU64,
) -> DistroBuildInfo {
    let id = next_id.fetch_add(1, Ordering::SeqCst);
    let source_dir = ctx.extracted.work_dir.join(ctx.package.source_package_dir());
    let results_dir = ctx
        .extracted
        .work_dir
        .join(format!("results-{}-{}", distribution.codename, arch));
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
        architecture: arch.to_string(),
        changes_files: Vec::new(),
        files: Vec::new(),
        error: None,
        log: String::new(),
        compression: ctx.package.compression,
    };

    let debug_flag = if is_first_arch { "-b" } else { "-B" };
    let invocation = PdebuildInvocation {
        pbuilder: ctx.pbuilder,
        base: ctx.base,
        source_dir: &source_dir,
        results_dir: &results_dir,
        debbuildopts: &["-us", "-uc", debug_flag],
        dist: distribution.source_name(),
        arch: Some(arch),
    };

    match invoke_pdebuild(&invocation).await {
        Ok(output) if output.success() => match crate::moves::move_results(&results_dir, &incoming_dir).await {
            Ok(moved) => {
                for changes_path in moved
                    .iter()
                    .filter(|p| p.extension().map(|e| e == "changes").unwrap_or(false))
                {
                    info.changes_stem = changes_path.with_extension("");
                    if let Ok(text) = tokio::fs::read_to_string(changes_path).await {
                        info.changes_files = parse_changes_files(&text, &incoming_dir);
                    }
                }
                crate::moves::assign_ownership(&moved, ctx.package.owner_uid, ctx.group);
                info.files = moved;
            }
            Err(err) => info.error = Some(err.to_string()),
        },
        Ok(output) => {
            let log = output.combined_log.clone();
            let err = into_build_error("pdebuild (binary)", output);
            info.error = Some(err.to_string());
            info.log = log;
            let _ = std::fs::remove_dir_all(&results_dir);
        }
        Err(err) => {
            info.error = Some(err.to_string());
        }
    }

    info
}
