// SPDX-License-Identifier: MIT OR Apache-2.0
//! Local and ssh-tunneled RPC transport for the autobuild daemon.

mod client;
mod credentials;
mod group;
mod server;

pub use client::{run_connect_bridge, Connection, DuplexStdio};
pub use credentials::{enable_credential_passing, recv_credentials, send_credentials, CredentialError, PeerCredentials};
pub use group::is_authorized;
pub use server::{RequestHandler, Server, TransportError};
