use crate::Distribution;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Archive compression, derived from the staged filename's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    Gz,
    Xz,
    Bz2,
}

impl Compression {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "gz" => Some(Self::Gz),
            "xz" => Some(Self::Xz),
            "bz2" => Some(Self::Bz2),
            _ => None,
        }
    }

    /// The `tar` flag that selects this compression, e.g. `z` for gzip.
    pub fn tar_flag(self) -> char {
        match self {
            Self::Gz => 'z',
            Self::Xz => 'J',
            Self::Bz2 => 'j',
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Gz => "gz",
            Self::Xz => "xz",
            Self::Bz2 => "bz2",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackageIdentifierError {
    #[error("{0} does not match the package archive naming pattern")]
    BadName(String),
}

/// One staged archive: `<name>[_-]<version>.tar.(gz|xz|bz2)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub stage_path: PathBuf,
    pub name: String,
    pub version: String,
    pub compression: Compression,
    pub owner_uid: u32,
}

fn package_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*)[_-]([0-9]+(?:\.[0-9]+)+)\.tar\.(gz|xz|bz2)$")
            .expect("package identifier pattern is valid")
    })
}

impl PackageInfo {
    /// Parse a staged archive's path into a `PackageInfo`. Fails with
    /// `BadName` if the basename does not match the fixed naming pattern.
    pub fn from_stage_path(stage_path: PathBuf, owner_uid: u32) -> Result<Self, PackageIdentifierError> {
        let basename = stage_path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PackageIdentifierError::BadName(stage_path.display().to_string()))?;
        let captures = package_name_regex()
            .captures(basename)
            .ok_or_else(|| PackageIdentifierError::BadName(basename.to_string()))?;
        let name = captures[1].to_string();
        let version = captures[2].to_string();
        let compression = Compression::from_token(&captures[3])
            .ok_or_else(|| PackageIdentifierError::BadName(basename.to_string()))?;
        Ok(Self {
            stage_path,
            name,
            version,
            compression,
            owner_uid,
        })
    }

    pub fn basename(&self) -> String {
        self.stage_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string()
    }

    /// `true` iff `other_basename` names the same staged archive.
    pub fn matches_stage_file(&self, other_basename: &str) -> bool {
        self.basename() == other_basename
    }

    pub fn source_package_dir(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

/// Transient per-build extraction result; lives only while the worker holds
/// the archive.
#[derive(Debug, Clone)]
pub struct ExtractedPackage {
    pub work_dir: PathBuf,
    pub orig_tarball_path: PathBuf,
    pub debian_diff_path: PathBuf,
    pub patches: BTreeMap<String, PathBuf>,
}

/// One `(source-or-binary) x distribution x architecture` output unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistroBuildInfo {
    pub id: u64,
    pub incoming_dir: PathBuf,
    pub changes_stem: PathBuf,
    pub distribution: Distribution,
    pub architecture: String,
    pub changes_files: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    pub error: Option<String>,
    pub log: String,
    pub compression: Compression,
}

impl DistroBuildInfo {
    pub fn is_source(&self) -> bool {
        Distribution::is_source(&self.architecture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_underscore_name() {
        let p = PackageInfo::from_stage_path("demo_1.2.tar.gz".into(), 1000).unwrap();
        assert_eq!(p.name, "demo");
        assert_eq!(p.version, "1.2");
        assert!(matches!(p.compression, Compression::Gz));
    }

    #[test]
    fn parses_hyphenated_name_and_dotted_version() {
        let p = PackageInfo::from_stage_path("my-tool-1.2.3.tar.xz".into(), 0).unwrap();
        assert_eq!(p.name, "my-tool");
        assert_eq!(p.version, "1.2.3");
        assert!(matches!(p.compression, Compression::Xz));
    }

    #[test]
    fn rejects_missing_version() {
        let err = PackageInfo::from_stage_path("demo.tar.gz".into(), 0).unwrap_err();
        assert!(matches!(err, PackageIdentifierError::BadName(_)));
    }

    #[test]
    fn rejects_unknown_compression() {
        assert!(PackageInfo::from_stage_path("demo_1.0.tar.zst".into(), 0).is_err());
    }

    #[test]
    fn matches_stage_file_by_basename_only() {
        let p = PackageInfo::from_stage_path("/var/lib/autobuild/stage/demo_1.2.tar.gz".into(), 0).unwrap();
        assert!(p.matches_stage_file("demo_1.2.tar.gz"));
        assert!(!p.matches_stage_file("other_1.0.tar.gz"));
    }
}
