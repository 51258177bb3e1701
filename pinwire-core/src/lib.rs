//! Transport-agnostic core of the pinwire link
//!
//! This crate holds everything that does not touch the byte stream or the
//! async runtime:
//!
//! - Pin capability tables and device profiles
//! - Pin state cache and the pending-read registry
//! - Passthrough serial receive buffer
//! - Error taxonomy
//! - Link configuration

#![no_std]
#![deny(unsafe_code)]

pub mod cache;
pub mod capability;
pub mod config;
pub mod error;
pub mod pending;
pub mod profile;
pub mod serial;

pub use cache::{Applied, PinPhase, PinState, PinStateCache, MAX_PINS};
pub use capability::{CapabilityTable, ModeSet, PinCapability, PinClass};
pub use config::{BaudRate, ConfigError, LinkConfig, UnconfiguredPolicy};
pub use error::{
    LinkError, OperationKind, TransportError, ValidationError, ValidationReason,
};
pub use pending::{ReadKind, ReadTarget, ReadValue, MAX_PENDING_READS};
pub use profile::{DeviceProfile, NANO, OTTO, UNO};
pub use serial::SERIAL_RX_CAPACITY;
