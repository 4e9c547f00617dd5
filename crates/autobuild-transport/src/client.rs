use crate::credentials::send_credentials;
use crate::server::TransportError;
use autobuild_protocol::{read_frame, write_frame, Request, Response};
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};

/// One request/response round trip's transport, either a direct Unix
/// socket connection or the stdio of a spawned `ssh ... autobuild connect`
/// tunnel. Both sides speak the same length-delimited frame format.
pub enum Connection {
    Local(UnixStream),
    Tunnel {
        child: Child,
        io: DuplexStdio,
    },
}

impl Connection {
    /// Dial the daemon's local socket directly and send this process's
    /// credentials as the authorization handshake.
    pub async fn connect_local(socket_path: &Path) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(socket_path).await?;
        send_credentials(&stream).await?;
        Ok(Self::Local(stream))
    }

    /// Spawn `ssh <remote> autobuild connect <socket_path>` and tunnel the
    /// wire protocol over its stdio. Credential authorization happens on
    /// the remote end, between the spawned `autobuild connect` process and
    /// the real daemon socket there.
    pub async fn connect_remote(remote: &str, socket_path: &Path) -> Result<Self, TransportError> {
        let mut child = Command::new("ssh")
            .arg(remote)
            .arg("autobuild")
            .arg("connect")
            .arg(socket_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take().expect("stdin was configured as piped");
        let stdout = child.stdout.take().expect("stdout was configured as piped");
        Ok(Self::Tunnel {
            child,
            io: DuplexStdio { stdin, stdout },
        })
    }

    pub async fn call(&mut self, request: Request) -> Result<Response, TransportError> {
        match self {
            Self::Local(stream) => {
                write_frame(stream, &request).await?;
                let response: Option<Response> = read_frame(stream).await?;
                Ok(response.unwrap_or(Response::Error(
                    autobuild_protocol::RpcError::Io("connection closed".to_string()),
                )))
            }
            Self::Tunnel { io, .. } => {
                write_frame(io, &request).await?;
                let response: Option<Response> = read_frame(io).await?;
                Ok(response.unwrap_or(Response::Error(
                    autobuild_protocol::RpcError::Io("connection closed".to_string()),
                )))
            }
        }
    }
}

pub struct DuplexStdio {
    stdin: tokio::process::ChildStdin,
    stdout: tokio::process::ChildStdout,
}

impl AsyncRead for DuplexStdio {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for DuplexStdio {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        Pin::new(&mut this.stdin).poll_write(cx, buf)
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.stdin).poll_flush(cx)
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.stdin).poll_shutdown(cx)
    }
}

/// `autobuild connect`: dial the local socket, send credentials, then
/// relay bytes between the socket and this process's own stdio. Used as
/// the remote end of an ssh-tunneled connection.
pub async fn run_connect_bridge(socket_path: &Path) -> Result<(), TransportError> {
    let stream = UnixStream::connect(socket_path).await?;
    send_credentials(&stream).await?;
    let (mut sock_read, mut sock_write) = stream.into_split();
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    let to_socket = tokio::io::copy(&mut stdin, &mut sock_write);
    let to_stdout = tokio::io::copy(&mut sock_read, &mut stdout);
    tokio::select! {
        result = to_socket => { result?; }
        result = to_stdout => { result?; }
    }
    Ok(())
}
