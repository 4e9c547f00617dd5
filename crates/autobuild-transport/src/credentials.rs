use nix::sys::socket::{
    recvmsg, sendmsg, setsockopt, sockopt::PassCred, ControlMessage, ControlMessageOwned,
    MsgFlags, UnixCredentials,
};
use std::io::{IoSlice, IoSliceMut};
use std::os::unix::io::{AsRawFd, RawFd};
use tokio::io::Interest;
use tokio::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("i/o error exchanging peer credentials: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer did not send credentials")]
    Missing,
}

/// The peer credentials received over a local socket: pid, uid, gid of the
/// connecting process.
#[derive(Debug, Clone, Copy)]
pub struct PeerCredentials {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

/// Enable `SO_PASSCRED` on `stream` so the kernel attaches `SCM_CREDENTIALS`
/// ancillary data to the next received message. Must be called before the
/// client's handshake byte is read.
pub fn enable_credential_passing(stream: &UnixStream) -> Result<(), CredentialError> {
    setsockopt(&BorrowedSock(stream.as_raw_fd()), PassCred, &true)
        .map_err(|e| CredentialError::Io(std::io::Error::from(e)))
}

/// Client side: send this process's own credentials as ancillary data on a
/// one-byte handshake message.
pub async fn send_credentials(stream: &UnixStream) -> Result<(), CredentialError> {
    loop {
        stream.writable().await?;
        let result = stream.try_io(Interest::WRITABLE, || {
            send_credentials_now(stream.as_raw_fd())
        });
        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn send_credentials_now(fd: RawFd) -> std::io::Result<()> {
    let creds = UnixCredentials::new();
    let payload = [0u8; 1];
    let iov = [IoSlice::new(&payload)];
    let cmsg = [ControlMessage::ScmCredentials(&creds)];
    sendmsg::<()>(fd, &iov, &cmsg, MsgFlags::empty(), None)
        .map(|_| ())
        .map_err(std::io::Error::from)
}

/// Server side: receive the handshake byte and the peer's ancillary
/// credentials. `enable_credential_passing` must have been called on this
/// stream already.
pub async fn recv_credentials(stream: &UnixStream) -> Result<PeerCredentials, CredentialError> {
    loop {
        stream.readable().await?;
        let result = stream.try_io(Interest::READABLE, || recv_credentials_now(stream.as_raw_fd()));
        match result {
            Ok(creds) => return Ok(creds),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn recv_credentials_now(fd: RawFd) -> std::io::Result<PeerCredentials> {
    let mut payload = [0u8; 1];
    let mut iov = [IoSliceMut::new(&mut payload)];
    let mut cmsg_buffer = nix::cmsg_space!(UnixCredentials);
    let msg = recvmsg::<()>(
        fd,
        &mut iov,
        Some(&mut cmsg_buffer),
        MsgFlags::empty(),
    )
    .map_err(std::io::Error::from)?;

    for cmsg in msg.cmsgs().map_err(std::io::Error::from)? {
        if let ControlMessageOwned::ScmCredentials(creds) = cmsg {
            return Ok(PeerCredentials {
                pid: creds.pid(),
                uid: creds.uid(),
                gid: creds.gid(),
            });
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        CredentialError::Missing,
    ))
}

/// `nix::sys::socket::setsockopt` wants a `FromRawFd`-capable or
/// `AsFd`-implementing handle; this newtype borrows a raw fd for the
/// duration of the call without taking ownership of it.
struct BorrowedSock(RawFd);

impl std::os::fd::AsFd for BorrowedSock {
    fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        unsafe { std::os::fd::BorrowedFd::borrow_raw(self.0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{getgid, getuid};

    #[tokio::test]
    async fn exchanges_credentials_over_a_socketpair() {
        let (server, client) = UnixStream::pair().unwrap();
        enable_credential_passing(&server).unwrap();

        let send = tokio::spawn(async move {
            send_credentials(&client).await.unwrap();
        });
        let received = recv_credentials(&server).await.unwrap();
        send.await.unwrap();

        assert_eq!(received.uid, getuid().as_raw());
        assert_eq!(received.gid, getgid().as_raw());
    }
}
