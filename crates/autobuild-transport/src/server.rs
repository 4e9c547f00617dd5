use crate::credentials::{enable_credential_passing, recv_credentials, CredentialError};
use crate::group::is_authorized;
use async_trait::async_trait;
use autobuild_protocol::{read_frame, write_frame, AuthenticatedRequest, FrameError, Request, Response};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Implemented by whatever owns the build coordinator; the transport layer
/// calls this once per decoded request, already wrapped with the verified
/// owner uid.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: AuthenticatedRequest<Request>) -> Response;
}

/// Local RPC server: binds a Unix-domain stream socket, authorizes each
/// connection via peer credentials and group membership, and dispatches
/// frames to a [`RequestHandler`].
pub struct Server<H> {
    socket_path: PathBuf,
    group: String,
    handler: Arc<H>,
}

impl<H: RequestHandler + 'static> Server<H> {
    pub fn new(socket_path: impl Into<PathBuf>, group: impl Into<String>, handler: Arc<H>) -> Self {
        Self {
            socket_path: socket_path.into(),
            group: group.into(),
            handler,
        }
    }

    /// Bind the socket (removing any stale socket file left from a crashed
    /// run) and serve connections until cancelled. Mode `0777` matches the
    /// original daemon: any local user may connect, authorization happens
    /// per request via peer credentials.
    pub async fn serve(&self) -> Result<(), TransportError> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o777))?;
        debug!(path = %self.socket_path.display(), "listening for rpc connections");

        loop {
            let (stream, _addr) = listener.accept().await?;
            let handler = Arc::clone(&self.handler);
            let group = self.group.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_connection(stream, &group, handler).await {
                    warn!(error = %err, "rpc connection ended with an error");
                }
            });
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn serve_connection<H: RequestHandler + ?Sized>(
    mut stream: UnixStream,
    group: &str,
    handler: Arc<H>,
) -> Result<(), TransportError> {
    enable_credential_passing(&stream)?;
    let peer = recv_credentials(&stream).await?;

    if !is_authorized(group, peer.uid) {
        debug!(uid = peer.uid, "connection rejected: not a member of the configured group");
        return Ok(());
    }

    loop {
        let request: Option<Request> = read_frame(&mut stream).await?;
        let Some(request) = request else {
            return Ok(());
        };
        let authenticated = AuthenticatedRequest::new(peer.uid, request);
        let response = handler.handle(authenticated).await;
        write_frame(&mut stream, &response).await?;
    }
}
