// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire protocol for the autobuild RPC transport: a length-delimited
//! binary frame carrying `bincode`-encoded [`Request`]/[`Response`] values,
//! and the [`AuthenticatedRequest`] envelope the transport layer wraps
//! every decoded request in after verifying the caller's identity.

pub mod frame;
pub mod messages;

pub use frame::{read_frame, write_frame, FrameError};
pub use messages::{
    AuthenticatedRequest, IncomingPackage, Request, Response, RpcError,
};
