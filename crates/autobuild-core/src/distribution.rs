use serde::{Deserialize, Serialize};

/// A `(os, codename)` pair together with the architectures it builds for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Distribution {
    pub os: String,
    pub codename: String,
    pub architectures: Vec<String>,
}

impl Distribution {
    pub fn new(os: impl Into<String>, codename: impl Into<String>, architectures: Vec<String>) -> Self {
        Self {
            os: os.into(),
            codename: codename.into(),
            architectures,
        }
    }

    /// The name of the source build unit, e.g. `ubuntu/noble`.
    pub fn source_name(&self) -> String {
        format!("{}/{}", self.os, self.codename)
    }

    /// The name of a binary build unit for one architecture, e.g.
    /// `ubuntu/noble/amd64`.
    pub fn binary_name(&self, arch: &str) -> String {
        format!("{}/{}/{}", self.os, self.codename, arch)
    }

    /// A `DistroBuildInfo`'s pseudo-architecture `"source"` denotes the
    /// source build rather than any real binary architecture.
    pub fn is_source(arch: &str) -> bool {
        arch == "source"
    }
}

/// `build-options.distributions` in the configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildOptions {
    pub distributions: Vec<Distribution>,
}

impl BuildOptions {
    pub fn has_distribution(&self, os: &str, codename: &str) -> bool {
        self.distributions
            .iter()
            .any(|d| d.os == os && d.codename == codename)
    }
}

/// `repository` in the configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryOptions {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "sign-key")]
    pub sign_key: String,
    #[serde(default = "default_listen_port", rename = "listen-port")]
    pub listen_port: String,
}

fn default_listen_port() -> String {
    "8080".to_string()
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            origin: String::new(),
            label: String::new(),
            description: String::new(),
            sign_key: String::new(),
            listen_port: default_listen_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names() {
        let d = Distribution::new("ubuntu", "noble", vec!["amd64".into(), "arm64".into()]);
        assert_eq!(d.source_name(), "ubuntu/noble");
        assert_eq!(d.binary_name("amd64"), "ubuntu/noble/amd64");
    }

    #[test]
    fn source_pseudo_arch() {
        assert!(Distribution::is_source("source"));
        assert!(!Distribution::is_source("amd64"));
    }

    #[test]
    fn has_distribution_matches_os_and_codename_only() {
        let opts = BuildOptions {
            distributions: vec![Distribution::new("debian", "bookworm", vec!["amd64".into()])],
        };
        assert!(opts.has_distribution("debian", "bookworm"));
        assert!(!opts.has_distribution("debian", "trixie"));
    }
}
