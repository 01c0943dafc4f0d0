//! Classical message tuple and its CBOR encoding.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, WireError};

/// Upper bound on the encoded size of any valid message.
///
/// A 2-element array header, a tag of at most 6 bytes and a 64-bit integer
/// fit comfortably; anything larger is rejected before parsing.
pub const MAX_ENCODED_SIZE: usize = 32;

/// Stage tag carried in the first field of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageTag {
    /// Attempt-window start time chosen by the source side
    #[serde(rename = "START")]
    Start,
    /// End of an attempt window, carrying the latched index or -1
    #[serde(rename = "END")]
    End,
    /// Local purification measurement bit
    #[serde(rename = "PURIFY")]
    Purify,
    /// Bell measurement outcome forwarded by the repeater
    #[serde(rename = "SWAP")]
    Swap,
}

impl MessageTag {
    /// Tag as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::End => "END",
            Self::Purify => "PURIFY",
            Self::Swap => "SWAP",
        }
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(tag, value)` message sent over a classical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassicalMessage {
    tag: MessageTag,
    value: i64,
}

impl ClassicalMessage {
    /// Value used in an `END` message when no photon was latched.
    pub const NO_INDEX: i64 = -1;

    /// Create a message from raw parts.
    pub fn new(tag: MessageTag, value: i64) -> Self {
        Self { tag, value }
    }

    /// `(START, start_time)`.
    pub fn start(start_time: i64) -> Self {
        Self::new(MessageTag::Start, start_time)
    }

    /// `(END, index)`, or `(END, -1)` if nothing was latched.
    pub fn end(success_index: Option<u64>) -> Self {
        let value = success_index.and_then(|i| i64::try_from(i).ok()).unwrap_or(Self::NO_INDEX);
        Self::new(MessageTag::End, value)
    }

    /// `(PURIFY, bit)`.
    pub fn purify(outcome: u8) -> Self {
        Self::new(MessageTag::Purify, i64::from(outcome))
    }

    /// `(SWAP, outcome)`.
    pub fn swap(outcome: u8) -> Self {
        Self::new(MessageTag::Swap, i64::from(outcome))
    }

    /// Stage tag.
    pub fn tag(&self) -> MessageTag {
        self.tag
    }

    /// Integer payload.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Attempt index of an `END` message, `None` for the `-1` failure marker
    /// (or any negative value).
    pub fn end_index(&self) -> Option<u64> {
        u64::try_from(self.value).ok()
    }

    /// Encode as a CBOR `[tag, value]` array.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(16);
        ciborium::ser::into_writer(&(self.tag, self.value), &mut buf)
            .map_err(|e| WireError::Encode(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Decode a CBOR `[tag, value]` array.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_ENCODED_SIZE {
            return Err(WireError::TooLarge { size: bytes.len(), max: MAX_ENCODED_SIZE });
        }

        let (tag, value): (MessageTag, i64) =
            ciborium::de::from_reader(bytes).map_err(|e| WireError::Malformed(e.to_string()))?;

        Ok(Self { tag, value })
    }
}

impl fmt::Display for ClassicalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.tag, self.value)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn start_wire_shape() {
        let bytes = ClassicalMessage::start(1234).encode().unwrap();
        insta::assert_snapshot!(hex::encode(&bytes), @"826553544152541904d2");
    }

    #[test]
    fn end_failure_wire_shape() {
        let bytes = ClassicalMessage::end(None).encode().unwrap();
        insta::assert_snapshot!(hex::encode(&bytes), @"8263454e4420");
    }

    #[test]
    fn end_index_marker() {
        assert_eq!(ClassicalMessage::end(Some(3)).end_index(), Some(3));
        assert_eq!(ClassicalMessage::end(None).end_index(), None);
        assert_eq!(ClassicalMessage::end(None).value(), -1);
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&("HELLO", 1i64), &mut buf).unwrap();

        let result = ClassicalMessage::decode(&buf);
        assert!(matches!(result, Err(WireError::Malformed(_))));
    }

    #[test]
    fn decode_rejects_oversized_buffer() {
        let buf = vec![0u8; MAX_ENCODED_SIZE + 1];
        let result = ClassicalMessage::decode(&buf);
        assert!(matches!(result, Err(WireError::TooLarge { .. })));
    }

    #[test]
    fn decode_rejects_wrong_arity() {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&("END",), &mut buf).unwrap();
        assert!(ClassicalMessage::decode(&buf).is_err());
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..48)) {
            let _ = ClassicalMessage::decode(&bytes);
        }

        #[test]
        fn end_messages_survive_the_wire(index in prop::option::of(0u64..1_000_000)) {
            let msg = ClassicalMessage::end(index);
            let decoded = ClassicalMessage::decode(&msg.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded.end_index(), index);
        }
    }
}
