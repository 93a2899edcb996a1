//! Relay Protocol - Wire envelope types
//!
//! This crate provides the message unit exchanged between the relay daemon
//! and its peers, plus typed decoding of the server-originated envelopes.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod envelope;
pub mod error;
pub mod event;
pub mod peer;

pub use envelope::{Envelope, MessageType, Meta, ORIGIN_EXTERNAL};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{ServerEvent, WelcomePayload};
pub use peer::PeerId;
