//! Pinwire peripheral protocol
//!
//! This crate defines the serial protocol between the host (block editor
//! bridge) and the microcontroller firmware. The wire format follows the
//! Firmata conventions: command bytes have the high bit set, data bytes are
//! 7-bit, and variable-length messages are wrapped in sysex frames.
//!
//! # Protocol Overview
//!
//! ```text
//! Fixed frame:   ┌─────────┬────────┬────────┐
//!                │ COMMAND │ DATA 1 │ DATA 2 │   (data bytes < 0x80)
//!                └─────────┴────────┴────────┘
//!
//! Sysex frame:   ┌──────┬────┬──────────────┬──────┐
//!                │ 0xF0 │ ID │ PAYLOAD 0–N  │ 0xF7 │
//!                └──────┴────┴──────────────┴──────┘
//! ```
//!
//! Because every frame starts with a command byte and carries only 7-bit
//! data, a receiver that loses alignment resynchronizes by skipping to the
//! next command byte it recognizes.
//!
//! Opcode values are firmware-defined. They live in an [`OpcodeMap`] that a
//! device profile supplies; [`OpcodeMap::FIRMATA`] holds the stock values.

#![no_std]
#![deny(unsafe_code)]

pub mod command;
pub mod decode;
pub mod frame;
pub mod opcodes;
pub mod report;
pub mod types;

pub use command::{Command, SequenceKind};
pub use decode::{decode, DecodeEvent, Decoded, ReportDecoder};
pub use frame::{EncodingError, Frame, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, MAX_SERIAL_CHUNK};
pub use opcodes::{ModeCodes, OpcodeMap};
pub use report::{FirmwareVersion, Report};
pub use types::{Level, PinId, PinMode};
