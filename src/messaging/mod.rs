//! One-shot socket messaging between application instances.
//!
//! The running instance hosts a `MessageServer` bound to an ephemeral
//! loopback port; later-launched instances reach it through a
//! `MessageClient`. One connection carries exactly one request/response
//! pair — message boundaries are connection boundaries, so the wire format
//! needs no length prefix or delimiter.
//!
//! # Request Boundary
//!
//! The server treats "no more bytes currently available" as the end of the
//! request. A request split across bursts (network delay, very large
//! payloads) could be truncated and answered prematurely. This is a known
//! limitation of the protocol; callers conventionally keep requests under
//! 1024 bytes, which arrives in a single burst on loopback.
//!
//! Two consequences of that boundary rule:
//!
//! - An empty request is indistinguishable from a connection that has not
//!   sent yet, so the client rejects empty messages up front with a
//!   `Failure` instead of opening a connection that would never be
//!   answered.
//! - A connection that connects but never sends stays registered with the
//!   server until shutdown; nothing on the wire distinguishes it from a
//!   slow sender.
//!
//! The server waits for readiness by polling its sockets on a short
//! interval rather than blocking in an OS readiness call, which adds up to
//! one interval of latency per exchange and a periodic idle wakeup per
//! locked session (see `POLL_INTERVAL` in the server).

mod client;
mod server;
mod types;

#[cfg(test)]
mod tests;

pub use types::{MessageHandler, MessageOutcome};

pub(crate) use client::MessageClient;
pub(crate) use server::{MessageServer, ServerHandle};
