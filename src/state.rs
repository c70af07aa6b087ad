//! The card's state machine, modeled as a sum type rather than the
//! historical `int state` + `after_send_state` pair.
//!
//! Every state that must remember where to go next embeds its continuation
//! directly (`CmdResponse::next`, boxed since `CardState` is recursive), and
//! every state that owns in-flight transfer data (`ReadBlock`,
//! `WriteListen`) carries that data itself instead of reaching into
//! sibling fields on the card. This is the "sum-typed states" redesign:
//! there is no standalone `after_send_state` field anywhere in this crate.

/// One of the nine states the card's protocol state machine can be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardState {
    /// Just powered on. Only CMD0 is accepted.
    Boot,
    /// SPI mode entered via CMD0. Waiting for CMD55 to begin ACMD41.
    Spi,
    /// CMD55 was seen from `Spi`; only ACMD41 is accepted next.
    SpiAcmd,
    /// Fully initialized, accepting ordinary commands.
    Idle,
    /// CMD55 was seen from `Idle`; the next command is treated as an ACMD
    /// (none are implemented, so it is always illegal).
    IdleAcmd,
    /// Draining a queued response buffer over MISO.
    CmdResponse {
        /// Response bytes, left-aligned; only `bytes[..len]` is meaningful.
        bytes: [u8; 5],
        /// Index of the next byte to send.
        idx: u8,
        /// Total number of bytes in this response (1 for R1, 2 for R2, 5 for R3).
        len: u8,
        /// State to resume once the buffer drains.
        next: Box<CardState>,
    },
    /// Streaming a 512-byte block (plus CRC-16 trailer) out over MISO.
    ReadBlock {
        /// Next backing-store offset to read from.
        cursor: usize,
        /// Bytes of the block still to be sent.
        remaining: u16,
        /// Running CRC-16 over the bytes sent so far.
        crc: u16,
    },
    /// Waiting for the host's `0xFE` start-block token before a write.
    WriteStbt {
        /// Backing-store offset the block will be written to.
        cursor: usize,
    },
    /// Receiving a 512-byte block over MOSI.
    WriteListen {
        /// Next backing-store offset to write to.
        cursor: usize,
        /// Bytes of the block still expected.
        remaining: u16,
        /// Running CRC-16 over the bytes received so far.
        crc: u16,
    },
    /// Receiving the two-byte CRC-16 trailer after a write block.
    WriteCrc {
        /// The CRC-16 computed over the block just received.
        crc: u16,
        /// True while the high-order comparison byte is still outstanding.
        ///
        /// Matches the historical `crc16_fst` flag precisely, including its
        /// (inert, since `enforce_crc` defaults to `false`) quirk of
        /// comparing the *first* received byte against the *low* half of
        /// `crc` and the second against the high half.
        first: bool,
    },
}

/// Builds a queued [`CardState::CmdResponse`] with `bytes` as the payload
/// and `next` as the state to resume once it drains.
///
/// `bytes` must be at most 5 long (the longest response is R3).
pub(crate) fn respond(bytes: &[u8], next: CardState) -> CardState {
    debug_assert!(bytes.len() <= 5, "response buffer overflow: {} bytes", bytes.len());
    let mut buf = [0u8; 5];
    buf[..bytes.len()].copy_from_slice(bytes);
    CardState::CmdResponse {
        bytes: buf,
        idx: 0,
        len: bytes.len() as u8,
        next: Box::new(next),
    }
}
