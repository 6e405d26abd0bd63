//! Line-framed wire protocol between the image server and its clients.
//!
//! Every exchange uses a fresh connection and closes it afterwards:
//!
//! ```text
//! CHECK_AVAILABLE          GET                    STORE
//! <key>                    <key>                  <session token>
//!                                                 <key>
//!                                                 <base64 payload> EOF
//! ---------------          ---------------        ---------------
//! CHECK_AVAILABLE |        GET                    STORE | <error line>
//! NOT_AVAILABLE            <base64 payload> EOF
//!                          | <error line>
//! ```
//!
//! Payloads carry no length prefix; end of stream terminates them.

mod client;
mod framing;
mod server;

pub use client::RemoteImageClient;
pub use framing::{Connection, PAYLOAD_CHUNK_SIZE};
pub use server::{Acceptor, ImageServer};

/// Availability query; echoed back when the image exists.
pub const CHECK_AVAILABLE: &str = "CHECK_AVAILABLE";

/// Image fetch; echoed back before the payload.
pub const GET: &str = "GET";

/// Authenticated upload; echoed back once persisted.
pub const STORE: &str = "STORE";

/// Negative answer to [`CHECK_AVAILABLE`].
pub const NOT_AVAILABLE: &str = "NOT_AVAILABLE";

/// Prefix of the reply line for a rejected session.
pub const INVALID_SESSION: &str = "Invalid session";

/// Longest accepted text line, terminator excluded.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Default bound on a base64 payload, in encoded bytes.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 256 * 1024 * 1024;

/// Default port of the image server.
pub const DEFAULT_PORT: u16 = 15555;
