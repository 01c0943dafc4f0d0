//! Wire format for the repeater-chain protocols.
//!
//! Every classical message exchanged between two nodes is an ordered 2-tuple:
//! a string tag followed by a signed integer. On the wire the tuple is a CBOR
//! array `[text, int]`, e.g. `["START", 1234]` or `["END", -1]`.
//!
//! The tag names the protocol stage the message belongs to. Receivers check
//! the tag before interpreting the integer, so a message from the wrong stage
//! is detected instead of being silently misread.
//!
//! This crate also defines [`BellState`], the label an endpoint infers from
//! the 2-bit outcome of the repeater's Bell measurement.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bell;
pub mod errors;
pub mod message;

pub use bell::BellState;
pub use errors::{Result, WireError};
pub use message::{ClassicalMessage, MAX_ENCODED_SIZE, MessageTag};
