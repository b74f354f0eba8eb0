/// Wire data structures for the ReLink ARQ core
///
/// A `Frame` is the single unit exchanged across the channel in both
/// directions: data frames carry an application payload and a sequence
/// number, acknowledgment frames carry the acknowledged sequence number and
/// a zero payload. Frames are serialized with rkyv for zero-copy validation
/// on receive.
///
/// Integrity is guarded by a weak additive checksum over the two header
/// sequence fields and every payload byte. It is sufficient to flag the
/// single-byte mutations an unreliable channel introduces; it is not a
/// cryptographic integrity mechanism.
use rkyv::{check_archived_root, to_bytes, Archive, Deserialize, Serialize};

use crate::errors::{ArqError, Result};

/// Fixed application payload size, in bytes
pub const PAYLOAD_SIZE: usize = 20;

/// Fixed-length application payload block
pub type Payload = [u8; PAYLOAD_SIZE];

/// Sentinel value in `acknum` meaning "this frame is not an acknowledgment"
pub const NOT_AN_ACK: i32 = -1;

/// One protocol frame
///
/// Invariant: a frame is uncorrupted iff `checksum` equals the recomputed
/// sum of `seqnum + acknum + sum(payload bytes)`. The stored checksum is
/// compared against, never folded into, the recomputed value.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct Frame {
    /// Sequence number in `[0, seq_space)`
    pub seqnum: i32,

    /// Acknowledged sequence number, or `NOT_AN_ACK`
    pub acknum: i32,

    /// Additive checksum over `seqnum`, `acknum`, and the payload
    pub checksum: i32,

    /// Application payload (zeroed on acknowledgment frames)
    pub payload: Payload,
}

impl Frame {
    /// Build a data frame with a freshly computed checksum
    pub fn data(seqnum: i32, payload: Payload) -> Self {
        let mut frame = Self {
            seqnum,
            acknum: NOT_AN_ACK,
            checksum: 0,
            payload,
        };
        frame.checksum = frame.compute_checksum();
        frame
    }

    /// Build an acknowledgment frame
    ///
    /// `seqnum` comes from the receiver's independent ack-frame counter; it
    /// is unrelated to the data sequence space.
    pub fn ack(seqnum: i32, acknum: i32) -> Self {
        let mut frame = Self {
            seqnum,
            acknum,
            checksum: 0,
            payload: [0u8; PAYLOAD_SIZE],
        };
        frame.checksum = frame.compute_checksum();
        frame
    }

    /// Recompute the additive checksum over the header fields and payload
    pub fn compute_checksum(&self) -> i32 {
        let mut sum = self.seqnum.wrapping_add(self.acknum);
        for byte in &self.payload {
            sum = sum.wrapping_add(i32::from(*byte));
        }
        sum
    }

    /// True iff the stored checksum no longer matches the frame contents
    pub fn is_corrupted(&self) -> bool {
        self.checksum != self.compute_checksum()
    }

    /// True iff this frame carries an acknowledgment
    pub fn is_ack(&self) -> bool {
        self.acknum != NOT_AN_ACK
    }

    /// Serialize this frame for the wire using rkyv
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        to_bytes::<_, 64>(self)
            .map(|aligned_vec| aligned_vec.to_vec())
            .map_err(|_| ArqError::SerializationError("failed to serialize frame".to_string()))
    }

    /// Validate and decode a frame from wire bytes
    ///
    /// Structural validation only; checksum verification is the state
    /// machines' job so that channel-corrupted but well-formed frames still
    /// reach `is_corrupted`.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let archived = check_archived_root::<Frame>(bytes).map_err(|_| {
            ArqError::DeserializationError("failed to validate archived frame".to_string())
        })?;

        Ok(Self {
            seqnum: archived.seqnum,
            acknum: archived.acknum,
            checksum: archived.checksum,
            payload: archived.payload,
        })
    }
}

/// One application-supplied message, mapped 1:1 into a data frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub data: Payload,
}

impl Message {
    /// Create a message from a full payload block
    pub fn new(data: Payload) -> Self {
        Self { data }
    }

    /// Create a message from a byte slice, zero-padded to the fixed size
    ///
    /// # Errors
    /// Returns `ArqError::PayloadTooLarge` if the slice exceeds
    /// `PAYLOAD_SIZE`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > PAYLOAD_SIZE {
            return Err(ArqError::PayloadTooLarge {
                len: bytes.len(),
                max: PAYLOAD_SIZE,
            });
        }

        let mut data = [0u8; PAYLOAD_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Payload {
        let mut payload = [0u8; PAYLOAD_SIZE];
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte = i as u8;
        }
        payload
    }

    #[test]
    fn test_fresh_frame_is_not_corrupted() {
        let frame = Frame::data(3, sample_payload());
        assert!(!frame.is_corrupted());

        let ack = Frame::ack(0, 3);
        assert!(!ack.is_corrupted());
        assert!(ack.is_ack());
        assert!(!frame.is_ack());
    }

    #[test]
    fn test_checksum_detects_any_payload_byte_mutation() {
        let frame = Frame::data(1, sample_payload());

        for i in 0..PAYLOAD_SIZE {
            let mut mutated = frame;
            mutated.payload[i] = mutated.payload[i].wrapping_add(1);
            assert!(mutated.is_corrupted(), "mutation at byte {} undetected", i);
        }
    }

    #[test]
    fn test_checksum_detects_header_mutation() {
        let frame = Frame::data(2, sample_payload());

        let mut seq_mutated = frame;
        seq_mutated.seqnum = 5;
        assert!(seq_mutated.is_corrupted());

        let mut ack_mutated = frame;
        ack_mutated.acknum = 4;
        assert!(ack_mutated.is_corrupted());
    }

    #[test]
    fn test_wire_round_trip() {
        let frame = Frame::data(6, sample_payload());
        let bytes = frame.to_wire().unwrap();
        let decoded = Frame::from_wire(&bytes).unwrap();

        assert_eq!(decoded, frame);
        assert!(!decoded.is_corrupted());
    }

    #[test]
    fn test_from_wire_rejects_garbage() {
        assert!(Frame::from_wire(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_message_from_slice_pads_and_rejects() {
        let message = Message::from_slice(b"hello").unwrap();
        assert_eq!(&message.data[..5], b"hello");
        assert!(message.data[5..].iter().all(|b| *b == 0));

        let too_long = [0u8; PAYLOAD_SIZE + 1];
        assert!(matches!(
            Message::from_slice(&too_long),
            Err(ArqError::PayloadTooLarge { .. })
        ));
    }
}
