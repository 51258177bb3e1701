//! Link configuration
//!
//! `LinkConfig` can be persisted as postcard bytes (with a version check on
//! load) and, with the `toml` feature, parsed from a TOML document:
//!
//! ```toml
//! baud_rate = 57600
//! read_timeout_ms = 500
//! unconfigured = "implicit"
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Current config layout version
pub const CONFIG_VERSION: u8 = 1;

/// Maximum serialized config size
pub const MAX_CONFIG_SIZE: usize = 32;

/// Serial line rates the transport offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub enum BaudRate {
    B4800,
    B9600,
    B19200,
    B38400,
    #[default]
    B57600,
    B76800,
    B115200,
}

impl BaudRate {
    pub const ALL: [BaudRate; 7] = [
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B76800,
        BaudRate::B115200,
    ];

    /// Bits per second
    pub const fn as_u32(self) -> u32 {
        match self {
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B76800 => 76800,
            BaudRate::B115200 => 115200,
        }
    }
}

/// Rate not in the offered set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnsupportedBaud(pub u32);

impl core::fmt::Display for UnsupportedBaud {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unsupported baud rate {}", self.0)
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = UnsupportedBaud;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .into_iter()
            .find(|b| b.as_u32() == bps)
            .ok_or(UnsupportedBaud(bps))
    }
}

impl From<BaudRate> for u32 {
    fn from(baud: BaudRate) -> Self {
        baud.as_u32()
    }
}

/// What to do when an operation targets a pin that has no mode yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum UnconfiguredPolicy {
    /// Fail with `NotConfigured`
    #[default]
    Strict,
    /// Send the operation's default mode first
    Implicit,
}

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Serialization failed
    Serialize,
    /// Deserialization failed
    Deserialize,
    /// TOML text could not be parsed
    Parse,
    /// Stored layout version does not match
    VersionMismatch(u8),
    /// Baud rate outside the offered set
    UnsupportedBaud(u32),
    /// Read timeout must be non-zero
    ZeroTimeout,
    /// Desync bound must be non-zero
    ZeroDesyncBound,
}

impl From<UnsupportedBaud> for ConfigError {
    fn from(e: UnsupportedBaud) -> Self {
        ConfigError::UnsupportedBaud(e.0)
    }
}

/// Runtime settings of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    /// Layout version
    pub version: u8,
    /// Host link rate (also the default passthrough rate)
    pub baud_rate: BaudRate,
    /// Deadline for read-type operations
    pub read_timeout_ms: u32,
    /// Cached values younger than this are returned without wire traffic
    pub freshness_ms: u32,
    pub unconfigured: UnconfiguredPolicy,
    /// Longest garbage run tolerated before pending reads are failed
    pub max_desync_bytes: u16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            baud_rate: BaudRate::default(),
            read_timeout_ms: 1000,
            freshness_ms: 50,
            unconfigured: UnconfiguredPolicy::Strict,
            max_desync_bytes: 256,
        }
    }
}

impl LinkConfig {
    /// Check values that the type system does not
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::VersionMismatch(self.version));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_desync_bytes == 0 {
            return Err(ConfigError::ZeroDesyncBound);
        }
        Ok(())
    }

    /// Serialize to postcard bytes
    #[cfg(feature = "serde")]
    pub fn to_slice<'b>(&self, buffer: &'b mut [u8]) -> Result<&'b mut [u8], ConfigError> {
        postcard::to_slice(self, buffer).map_err(|_| ConfigError::Serialize)
    }

    /// Load from postcard bytes
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: LinkConfig = postcard::from_bytes(bytes).map_err(|_| ConfigError::Deserialize)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML text; missing keys take their defaults
    #[cfg(feature = "toml")]
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: LinkConfig = toml::from_str(text).map_err(|_| {
            // Surface the offending rate instead of a generic parse error
            match unsupported_baud_in(text) {
                Some(bps) => ConfigError::UnsupportedBaud(bps),
                None => ConfigError::Parse,
            }
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "toml")]
fn unsupported_baud_in(text: &str) -> Option<u32> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == "baud_rate")
        .and_then(|(_, value)| value.trim().parse::<u32>().ok())
        .filter(|bps| BaudRate::try_from(*bps).is_err())
}
