use autobuild_core::DistroBuildInfo;
use autobuild_core::PackageInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Wraps every decoded request with the owner uid the transport resolved
/// from the connection's peer credentials. `payload` never carries a
/// client-supplied uid field; the transport constructs this envelope after
/// authorization succeeds, so a handler can trust `owner_uid` unconditionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedRequest<T> {
    pub owner_uid: u32,
    pub payload: T,
}

impl<T> AuthenticatedRequest<T> {
    pub fn new(owner_uid: u32, payload: T) -> Self {
        Self { owner_uid, payload }
    }
}

/// One finished `DistroBuildInfo`, reshaped for the `Incoming` reply: file
/// paths are relative to the daemon's base directory rather than absolute,
/// so a remote client never learns the daemon's filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingPackage {
    pub name: String,
    pub id: u64,
    pub distribution_label: String,
    pub architecture: String,
    pub files: Vec<PathBuf>,
    pub error: Option<String>,
}

impl IncomingPackage {
    /// `base` is stripped from each file path so the reply never exposes
    /// the daemon's absolute filesystem layout to a remote client.
    pub fn from_distro_build_info(stem_name: String, info: &DistroBuildInfo, base: &Path) -> Self {
        let files = info
            .files
            .iter()
            .map(|file| file.strip_prefix(base).unwrap_or(file).to_path_buf())
            .collect();
        Self {
            name: stem_name,
            id: info.id,
            distribution_label: info.distribution.source_name(),
            architecture: info.architecture.clone(),
            files,
            error: info.error.clone(),
        }
    }
}

/// Every RPC method's request payload, sent inside an [`AuthenticatedRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Stage { filename: String, data: Vec<u8> },
    Incoming,
    Release { ids: Vec<u64> },
    Discard { ids: Vec<u64> },
    WebQueueService,
    CloseWebQueueService { socket_path: PathBuf },
}

/// Every RPC method's response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Staged(PackageInfo),
    Incoming(Vec<IncomingPackage>),
    Released { accepted_ids: Vec<u64> },
    Discarded { accepted_ids: Vec<u64> },
    WebQueueService { socket_path: PathBuf },
    Closed,
    Error(RpcError),
}

/// The named error kinds from the error-handling design, serialized across
/// the wire so a client can match on kind rather than parse text.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum RpcError {
    #[error("{0} does not match the package archive naming pattern")]
    BadName(String),
    #[error("{0} is already building")]
    AlreadyBuilding(String),
    #[error("{0} is already queued")]
    AlreadyQueued(String),
    #[error("{0} is already built and awaiting release")]
    AwaitingRelease(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Io(String),
    #[error("id {0} not found")]
    NotFound(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_request_carries_owner_uid() {
        let req = AuthenticatedRequest::new(1000, Request::Incoming);
        assert_eq!(req.owner_uid, 1000);
    }
}
