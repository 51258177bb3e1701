//! Async runtime side of the pinwire link
//!
//! Connects a block-editor host to a Firmata-style peripheral over any
//! `embedded-io-async` byte stream:
//!
//! - [`transport`]: write adapter and receive pump
//! - [`dispatcher`]: validation, encoding and pending-read resolution
//! - [`peripheral`]: one method per block operation
//!
//! The receive side must be driven concurrently with the operations, for
//! example with `embassy_futures::select`:
//!
//! ```ignore
//! let link: Peripheral<CriticalSectionRawMutex, _> =
//!     Peripheral::new(&NANO, LinkConfig::default(), tx);
//! select(link.run_receiver(rx), async {
//!     link.set_pin_mode(PinId(13), PinMode::Output).await?;
//!     link.set_digital_output(PinId(13), Level::High).await
//! })
//! .await;
//! ```

#![no_std]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible to the other modules
#[macro_use]
mod fmt;

pub mod dispatcher;
pub mod peripheral;
pub mod transport;

#[cfg(test)]
mod mock;

pub use dispatcher::Dispatcher;
pub use peripheral::{Eol, Peripheral, MAX_BEND_STEPS};
pub use transport::{Receiver, ReportSink, TransportAdapter};

pub use pinwire_core::{BaudRate, DeviceProfile, LinkConfig, LinkError, UnconfiguredPolicy};
pub use pinwire_protocol::{FirmwareVersion, Level, PinId, PinMode};
