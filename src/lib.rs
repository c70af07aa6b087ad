//! A simulated SD card operating in SPI mode.
//!
//! This crate drives the byte-level protocol a real SD card speaks once its
//! host has clocked it into SPI mode: CRC-7 command framing, the CMD55 /
//! ACMD41 bring-up handshake, R1/R2/R3 responses, and CRC-16-trailed
//! single-block reads and writes. It has no notion of a filesystem, of
//! concurrent hosts, or of SDHC/SDXC addressing -- just the wire protocol
//! and a byte-addressable backing store, for driving an emulated host MCU
//! the way a real card would.
//!
//! ```no_run
//! use sdcard::{Card, CardConfig};
//!
//! let mut card = Card::open("disk.img", CardConfig::default())?;
//! card.on_cs_change(true);
//! let miso = card.on_spi_transfer(0x40); // first byte of CMD0
//! # Ok::<(), sdcard::Error>(())
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// MUST be the first module listed
mod fmt;

mod card;
mod crc;
mod error;
mod frame;
mod state;

pub use card::{Card, CardConfig};
pub use error::Error;
pub use frame::CommandFrame;
pub use state::CardState;

pub use block_store::{BlockBackend, InMemoryBlockStore, MmapBlockStore, BLOCK_SIZE};
