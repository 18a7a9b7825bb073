//! # buttonbox-core
//!
//! Shared library for ButtonBox containing the wire protocol codec and the
//! domain value types used on both ends of the link.
//!
//! ButtonBox is a companion system: a touch device renders configurable
//! button layouts ("macros") and forwards every tap as a single UDP datagram
//! to a paired game machine running a small receiver.  The link is
//! deliberately best-effort — a dropped button press is simply dropped,
//! because retrying stale control input would be wrong, not just wasteful.
//!
//! This crate is used by the dispatch application and by any receiver
//! implementation.  It has zero dependencies on sockets, UI frameworks, or
//! OS APIs.  It defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Each datagram is
//!   one message: a 24-byte binary header followed by a tagged payload,
//!   decoded back into typed Rust structs on the other end.
//!
//! - **`domain`** – The [`Endpoint`] value object describing the current
//!   send target ({host, port}), produced by the settings layer and only
//!   ever read as a snapshot by the transport.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `buttonbox_core::Command` instead of `buttonbox_core::protocol::messages::Command`.
pub use domain::endpoint::{Endpoint, EndpointError};
pub use protocol::codec::{decode_message, encode_message, encode_message_now, ProtocolError};
pub use protocol::messages::{Command, ModifierFlags, PressKind, WireMessage};
pub use protocol::sequence::SequenceCounter;
