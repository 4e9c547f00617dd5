use crate::BuildError;
use autobuild_procio::{run, CommandOutput, CommandSpec};
use std::path::Path;

/// One invocation of the external chroot package builder. See
/// `SPEC_FULL.md` §4.6.2 (source) and §4.6.3 (binary).
pub struct PdebuildInvocation<'a> {
    pub pbuilder: &'a str,
    pub base: &'a Path,
    pub source_dir: &'a Path,
    pub results_dir: &'a Path,
    pub debbuildopts: &'a [&'a str],
    pub dist: String,
    pub arch: Option<&'a str>,
}

pub async fn invoke_pdebuild(inv: &PdebuildInvocation<'_>) -> Result<CommandOutput, BuildError> {
    tokio::fs::create_dir_all(inv.results_dir).await?;

    let mut spec = CommandSpec::new("pdebuild")
        .arg("--pbuilder")
        .arg(inv.pbuilder)
        .arg("--configfile")
        .arg(inv.base.join("etc/pbuilderrc").to_string_lossy().to_string())
        .arg("--buildresult")
        .arg(inv.results_dir.to_string_lossy().to_string())
        .cwd(inv.source_dir)
        .env("DIST", inv.dist.clone())
        .env("AUTOBUILD_BASE", inv.base.to_string_lossy().to_string());

    for opt in inv.debbuildopts {
        spec = spec.arg("--debbuildopts").arg(*opt);
    }
    if let Some(arch) = inv.arch {
        spec = spec.env("ARCH", arch);
    }

    let output = run(&spec, None).await?;
    Ok(output)
}

pub fn into_build_error(command: &str, output: CommandOutput) -> BuildError {
    BuildError::ExternalFailed {
        command: command.to_string(),
        log: output.combined_log,
    }
}
