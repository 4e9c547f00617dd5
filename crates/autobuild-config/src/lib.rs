// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lock-protected JSON configuration document for the autobuild daemon.
//!
//! The document lives at `<base>/etc/autobuild.json`. The only write
//! operation is [`update`], which loads the current document under an
//! exclusive advisory file lock, hands it to a closure, and rewrites it if
//! the closure succeeds.
#![deny(unsafe_code)]

use autobuild_core::{BuildOptions, RepositoryOptions};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Errors that can occur while loading, validating, or updating the
/// configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document could not be opened or created.
    #[error("cannot open config file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The exclusive lock could not be acquired.
    #[error("cannot lock config file {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The on-disk content is not valid JSON for [`AutobuildConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[source] serde_json::Error),

    /// The document could not be rewritten.
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Semantic validation failed.
    #[error("config validation failed: {reasons:?}")]
    Validation { reasons: Vec<String> },
}

/// The full configuration document, matching `SPEC_FULL.md` §3.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutobuildConfig {
    #[serde(default = "default_base")]
    pub base: PathBuf,
    #[serde(default)]
    pub remote: String,
    #[serde(default)]
    pub group: String,
    #[serde(default = "default_pbuilder")]
    pub pbuilder: String,
    #[serde(default, rename = "use-tmpfs")]
    pub use_tmpfs: bool,
    #[serde(default, rename = "build-options")]
    pub build_options: BuildOptions,
    #[serde(default)]
    pub repository: RepositoryOptions,
}

fn default_base() -> PathBuf {
    PathBuf::from("/var/lib/autobuild")
}

fn default_pbuilder() -> String {
    "cowbuilder".to_string()
}

impl Default for AutobuildConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            remote: String::new(),
            group: String::new(),
            pbuilder: default_pbuilder(),
            use_tmpfs: false,
            build_options: BuildOptions::default(),
            repository: RepositoryOptions::default(),
        }
    }
}

impl AutobuildConfig {
    /// Reject configurations that cannot possibly drive a build: an empty
    /// `base` would make `wipe` catastrophic, and a `listen-port` that
    /// isn't a valid port number would never bind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons = Vec::new();
        if self.base.as_os_str().is_empty() || self.base == Path::new("/") {
            reasons.push("base must be a non-empty path other than \"/\"".to_string());
        }
        if self.repository.listen_port.parse::<u16>().is_err() {
            reasons.push(format!(
                "repository.listen-port {:?} is not a valid port number",
                self.repository.listen_port
            ));
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation { reasons })
        }
    }
}

/// The config document file, opened once and reused across updates.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn path_str(&self) -> String {
        self.path.display().to_string()
    }

    /// Load the document without locking. Suitable for read-mostly callers
    /// that tolerate observing any committed generation; does not
    /// serialize against concurrent [`ConfigStore::update`] calls.
    pub fn load(&self) -> Result<AutobuildConfig, ConfigError> {
        if !self.path.exists() {
            return Ok(AutobuildConfig::default());
        }
        let text = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Open {
            path: self.path_str(),
            source,
        })?;
        serde_json::from_str(&text).map_err(ConfigError::Parse)
    }

    /// Load the current document under an exclusive advisory file lock,
    /// apply `f`, and rewrite the document if `f` succeeds. If `f` returns
    /// an error the file is left untouched and the lock is released.
    pub fn update<T, E>(
        &self,
        f: impl FnOnce(&mut AutobuildConfig) -> Result<T, E>,
    ) -> Result<T, ConfigError>
    where
        E: Into<ConfigError>,
    {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Open {
                path: self.path_str(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| ConfigError::Open {
                path: self.path_str(),
                source,
            })?;
        let mut locked = fd_lock::RwLock::new(file);
        let mut guard = locked.write().map_err(|source| ConfigError::Lock {
            path: self.path_str(),
            source,
        })?;

        let mut text = String::new();
        guard
            .read_to_string(&mut text)
            .map_err(|source| ConfigError::Write {
                path: self.path_str(),
                source,
            })?;
        let mut config = if text.trim().is_empty() {
            AutobuildConfig::default()
        } else {
            serde_json::from_str(&text).map_err(ConfigError::Parse)?
        };

        let result = f(&mut config).map_err(Into::into)?;

        let rendered = serde_json::to_string_pretty(&config).map_err(ConfigError::Parse)?;
        guard
            .seek(SeekFrom::Start(0))
            .and_then(|_| guard.set_len(0))
            .and_then(|_| guard.write_all(rendered.as_bytes()))
            .and_then(|_| guard.write_all(b"\n"))
            .map_err(|source| ConfigError::Write {
                path: self.path_str(),
                source,
            })?;
        Ok(result)
    }

    /// `save(config)` is `update(x <- config)`: write the given document
    /// back unconditionally.
    pub fn save(&self, config: AutobuildConfig) -> Result<(), ConfigError> {
        self.update(|slot| {
            *slot = config.clone();
            Ok::<_, ConfigError>(())
        })
    }
}

impl From<std::convert::Infallible> for ConfigError {
    fn from(value: std::convert::Infallible) -> Self {
        match value {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("autobuild.json"));
        let config = store.load().unwrap();
        assert_eq!(config.pbuilder, "cowbuilder");
        assert_eq!(config.repository.listen_port, "8080");
    }

    #[test]
    fn update_persists_mutation() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("autobuild.json"));
        store
            .update(|c| {
                c.group = "autobuild".to_string();
                Ok::<_, ConfigError>(())
            })
            .unwrap();
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.group, "autobuild");
    }

    #[test]
    fn update_rolls_back_on_closure_error() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("autobuild.json"));
        store
            .update(|c| {
                c.group = "first".to_string();
                Ok::<_, ConfigError>(())
            })
            .unwrap();
        let err = store.update(|c| {
            c.group = "second".to_string();
            Err::<(), _>(ConfigError::Validation {
                reasons: vec!["nope".into()],
            })
        });
        assert!(err.is_err());
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.group, "first");
    }

    #[test]
    fn validate_rejects_root_base() {
        let mut config = AutobuildConfig::default();
        config.base = PathBuf::from("/");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_port() {
        let mut config = AutobuildConfig::default();
        config.repository.listen_port = "not-a-port".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_overwrites_whole_document() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("autobuild.json"));
        let mut config = AutobuildConfig::default();
        config.group = "wheel".to_string();
        store.save(config).unwrap();
        assert_eq!(store.load().unwrap().group, "wheel");
    }
}
