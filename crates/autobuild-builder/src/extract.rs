use crate::BuildError;
use autobuild_core::{BuildOptions, Compression, ExtractedPackage, PackageInfo};
use autobuild_procio::{run, CommandSpec};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ExtractOutcome {
    pub extracted: ExtractedPackage,
    pub build_options_override: Option<BuildOptions>,
}

/// Untar the staged archive into `work_dir` and locate its required and
/// optional members. See `SPEC_FULL.md` §4.6.1.
pub async fn extract_package(info: &PackageInfo, work_dir: &Path) -> Result<ExtractOutcome, BuildError> {
    tokio::fs::create_dir_all(work_dir).await?;

    let spec = CommandSpec::new("tar")
        .arg(format!("-x{}f", info.compression.tar_flag()))
        .arg(info.stage_path.to_string_lossy().to_string())
        .cwd(work_dir);
    let output = run(&spec, None).await?;
    if !output.success() {
        return Err(BuildError::ExternalFailed {
            command: "tar (extract staged archive)".to_string(),
            log: output.combined_log,
        });
    }

    let orig_tarball_path = work_dir.join(format!("{}_{}.orig.tar.gz", info.name, info.version));
    let debian_diff_path = work_dir.join(format!("{}_{}.diff.gz", info.name, info.version));
    let mut missing = Vec::new();
    if !orig_tarball_path.exists() {
        missing.push("orig tarball");
    }
    if !debian_diff_path.exists() {
        missing.push("diff tarball");
    }
    if !missing.is_empty() {
        return Err(BuildError::MissingComponent(missing.join(" and ")));
    }

    let options_path = work_dir.join("options");
    let build_options_override = if options_path.exists() {
        let text = tokio::fs::read_to_string(&options_path).await?;
        Some(serde_json::from_str(&text)?)
    } else {
        None
    };

    let patches = extract_patches(work_dir).await?;

    Ok(ExtractOutcome {
        extracted: ExtractedPackage {
            work_dir: work_dir.to_path_buf(),
            orig_tarball_path,
            debian_diff_path,
            patches,
        },
        build_options_override,
    })
}

async fn extract_patches(work_dir: &Path) -> Result<BTreeMap<String, PathBuf>, BuildError> {
    let patches_dir = work_dir.join("patches");
    let mut patches = BTreeMap::new();
    if !patches_dir.is_dir() {
        return Ok(patches);
    }
    let mut entries = tokio::fs::read_dir(&patches_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let (codename, decompressed) = decompress_patch(&path).await?;
        patches.insert(codename, decompressed);
    }
    Ok(patches)
}

async fn decompress_patch(path: &Path) -> Result<(String, PathBuf), BuildError> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    for (ext, tool, compression) in [
        (".gz", "gunzip", Some(Compression::Gz)),
        (".bz2", "bunzip2", Some(Compression::Bz2)),
        (".xz", "unxz", Some(Compression::Xz)),
    ] {
        if let Some(codename) = filename.strip_suffix(ext) {
            let _ = compression;
            let spec = CommandSpec::new(tool).arg(path.to_string_lossy().to_string());
            let output = run(&spec, None).await?;
            if !output.success() {
                return Err(BuildError::ExternalFailed {
                    command: format!("{tool} (decompress distribution patch)"),
                    log: output.combined_log,
                });
            }
            return Ok((codename.to_string(), path.with_extension("")));
        }
    }
    // Not compressed: the codename is the bare filename.
    Ok((filename.to_string(), path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autobuild_core::PackageInfo;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_orig_and_diff_is_reported() {
        let dir = tempdir().unwrap();
        let empty_source = dir.path().join("empty");
        std::fs::create_dir_all(&empty_source).unwrap();
        let stage = dir.path().join("demo_1.0.tar.gz");

        let tar = CommandSpec::new("tar")
            .arg("-czf")
            .arg(stage.to_string_lossy().to_string())
            .arg("-C")
            .arg(empty_source.to_string_lossy().to_string())
            .arg(".");
        assert!(run(&tar, None).await.unwrap().success());

        let info = PackageInfo::from_stage_path(stage, 1000).unwrap();
        let work_dir = dir.path().join("work");
        let err = extract_package(&info, &work_dir).await.unwrap_err();
        assert!(matches!(err, BuildError::MissingComponent(_)));
    }
}
