//! Pin state cache
//!
//! Local mirror of the device: last known value and configured mode per pin,
//! the passthrough serial receive buffer, the firmware version and the reads
//! waiting on a report. All mutation goes through this type so the runtime
//! can keep it under a single lock.

use heapless::{LinearMap, Vec};
use pinwire_protocol::{FirmwareVersion, Level, PinId, PinMode, Report};

use crate::capability::CapabilityTable;
use crate::error::LinkError;
use crate::pending::{
    PendingRead, PendingReads, ReadKind, ReadTarget, ReadValue, Resolutions,
};
use crate::serial::{SerialRxBuffer, SERIAL_RX_CAPACITY};

/// Maximum number of pins tracked
pub const MAX_PINS: usize = 32;

/// Configuration phase of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinPhase {
    #[default]
    Unconfigured,
    Configured(PinMode),
}

/// Last known state of one pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinState {
    pub pin: PinId,
    pub phase: PinPhase,
    /// Last value written or reported
    pub value: Option<u16>,
    /// When `value` was last set (ms)
    pub updated_at: Option<u64>,
    /// Report-enable has been sent for this pin
    pub reporting: bool,
}

impl PinState {
    fn new(pin: PinId) -> Self {
        Self {
            pin,
            phase: PinPhase::Unconfigured,
            value: None,
            updated_at: None,
            reporting: false,
        }
    }

    /// Configured mode, if any
    pub fn mode(&self) -> Option<PinMode> {
        match self.phase {
            PinPhase::Configured(mode) => Some(mode),
            PinPhase::Unconfigured => None,
        }
    }

    /// Value as a digital level
    pub fn level(&self) -> Option<Level> {
        self.value.map(Level::from_value)
    }

    fn set_value(&mut self, value: u16, now_ms: u64) {
        self.value = Some(value);
        self.updated_at = Some(now_ms);
    }
}

/// Effect of applying one report
#[derive(Debug, Default)]
pub struct Applied {
    /// Reads completed by the report
    pub resolved: Resolutions,
    /// Serial bytes dropped because the receive buffer was full
    pub serial_dropped: usize,
}

/// Process-wide mirror of device state
#[derive(Debug)]
pub struct PinStateCache {
    pins: LinearMap<PinId, PinState, MAX_PINS>,
    pending: PendingReads,
    serial: SerialRxBuffer,
    serial_open: bool,
    firmware: Option<FirmwareVersion>,
    connected: bool,
}

impl Default for PinStateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PinStateCache {
    /// Create an empty cache for a connected link
    pub const fn new() -> Self {
        Self {
            pins: LinearMap::new(),
            pending: PendingReads::new(),
            serial: SerialRxBuffer::new(),
            serial_open: false,
            firmware: None,
            connected: true,
        }
    }

    /// Current state of a pin, if it has been referenced
    pub fn get(&self, pin: PinId) -> Option<PinState> {
        self.pins.get(&pin).copied()
    }

    /// Configuration phase of a pin
    pub fn phase(&self, pin: PinId) -> PinPhase {
        self.pins.get(&pin).map(|s| s.phase).unwrap_or_default()
    }

    /// Number of pins with an entry
    pub fn tracked(&self) -> usize {
        self.pins.len()
    }

    fn entry(&mut self, pin: PinId) -> Option<&mut PinState> {
        if !self.pins.contains_key(&pin) {
            self.pins.insert(pin, PinState::new(pin)).ok()?;
        }
        self.pins.get_mut(&pin)
    }

    /// Record a mode change sent to the device
    ///
    /// The previous value belongs to the old mode and is discarded.
    pub fn set_mode(&mut self, pin: PinId, mode: PinMode) {
        if let Some(state) = self.entry(pin) {
            state.phase = PinPhase::Configured(mode);
            state.value = None;
            state.updated_at = None;
        }
    }

    /// Optimistic update after a successful write
    pub fn record_write(&mut self, pin: PinId, value: u16, now_ms: u64) {
        if let Some(state) = self.entry(pin) {
            state.set_value(value, now_ms);
        }
    }

    /// Mark reporting as enabled for a pin
    ///
    /// Returns true the first time, when the enable frame still has to be sent.
    pub fn enable_reporting(&mut self, pin: PinId) -> bool {
        match self.entry(pin) {
            Some(state) if !state.reporting => {
                state.reporting = true;
                true
            }
            _ => false,
        }
    }

    /// Undo [`enable_reporting`](Self::enable_reporting) when the frame could
    /// not be sent
    pub fn clear_reporting(&mut self, pin: PinId) {
        if let Some(state) = self.pins.get_mut(&pin) {
            state.reporting = false;
        }
    }

    /// Cached value no older than `freshness_ms`
    pub fn fresh_value(&self, pin: PinId, now_ms: u64, freshness_ms: u32) -> Option<u16> {
        let state = self.pins.get(&pin)?;
        let value = state.value?;
        let at = state.updated_at?;
        (now_ms.saturating_sub(at) <= u64::from(freshness_ms)).then_some(value)
    }

    /// Apply a decoded report
    pub fn apply(&mut self, table: &CapabilityTable, report: &Report, now_ms: u64) -> Applied {
        let mut applied = Applied::default();

        match report {
            Report::DigitalPort { port, mask } => {
                for bit in 0..8u8 {
                    let Some(pin_number) = port.checked_mul(8).and_then(|p| p.checked_add(bit))
                    else {
                        break;
                    };
                    let pin = PinId(pin_number);
                    let Some(state) = self.pins.get_mut(&pin) else {
                        continue;
                    };
                    if !state.mode().is_some_and(PinMode::is_digital_input) {
                        continue;
                    }
                    let value = u16::from((mask >> bit) & 1);
                    state.set_value(value, now_ms);
                    self.pending.resolve(
                        ReadTarget::Pin {
                            pin,
                            kind: ReadKind::Digital,
                        },
                        ReadValue::Pin(value),
                        &mut applied.resolved,
                    );
                }
            }
            Report::Analog { channel, value } => {
                let Some(pin) = table.pin_for_channel(*channel) else {
                    return applied;
                };
                // Late samples must not clobber a pin reconfigured for output
                if !matches!(
                    self.phase(pin),
                    PinPhase::Unconfigured | PinPhase::Configured(PinMode::AnalogInput)
                ) {
                    return applied;
                }
                if let Some(state) = self.entry(pin) {
                    state.set_value(*value, now_ms);
                }
                self.pending.resolve(
                    ReadTarget::Pin {
                        pin,
                        kind: ReadKind::Analog,
                    },
                    ReadValue::Pin(*value),
                    &mut applied.resolved,
                );
            }
            Report::PinState { pin, value, .. } => {
                if table.get(*pin).is_none() {
                    return applied;
                }
                // For input pins the state byte is the pull-up setting; their
                // level only arrives in port reports
                if self.phase(*pin) != PinPhase::Configured(PinMode::Output) {
                    return applied;
                }
                if let Some(state) = self.entry(*pin) {
                    state.set_value(*value, now_ms);
                }
                self.pending.resolve(
                    ReadTarget::Pin {
                        pin: *pin,
                        kind: ReadKind::Digital,
                    },
                    ReadValue::Pin(*value),
                    &mut applied.resolved,
                );
            }
            Report::SerialData { data, .. } => {
                applied.serial_dropped = self.serial.append(data);
            }
            Report::Version(version) => {
                self.firmware = Some(*version);
                self.pending.resolve(
                    ReadTarget::Version,
                    ReadValue::Version(*version),
                    &mut applied.resolved,
                );
            }
            Report::StringData(_) => {}
        }

        applied
    }

    /// Register a read waiting on a report
    pub fn register_read(
        &mut self,
        target: ReadTarget,
        now_ms: u64,
        timeout_ms: u32,
    ) -> Result<PendingRead, LinkError> {
        if !self.connected {
            return Err(LinkError::ConnectionLost);
        }
        self.pending.register(target, now_ms, timeout_ms)
    }

    /// Release a read slot
    pub fn release_read(&mut self, slot: usize) {
        self.pending.release(slot);
    }

    /// Outstanding reads registry
    pub fn pending(&self) -> &PendingReads {
        &self.pending
    }

    /// Fail every waiting read with `error`, keeping pin state
    pub fn fail_pending(&mut self, error: LinkError) -> Resolutions {
        let mut out = Resolutions::new();
        self.pending.fail_all(error, &mut out);
        out
    }

    /// Forget everything after the link went down
    ///
    /// Waiting reads fail with `ConnectionLost`; the cache stays
    /// disconnected until [`reconnect`](Self::reconnect).
    pub fn invalidate_all(&mut self) -> Resolutions {
        self.pins.clear();
        self.serial.clear();
        self.serial_open = false;
        self.firmware = None;
        self.connected = false;
        self.fail_pending(LinkError::ConnectionLost)
    }

    /// Mark the link up again with empty state
    pub fn reconnect(&mut self) {
        self.pins.clear();
        self.serial.clear();
        self.serial_open = false;
        self.firmware = None;
        self.connected = true;
    }

    /// Return every pin to `Unconfigured` after a firmware reset
    pub fn reset_pins(&mut self) {
        self.pins.clear();
        self.serial.clear();
        self.serial_open = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Last reported firmware version
    pub fn firmware(&self) -> Option<FirmwareVersion> {
        self.firmware
    }

    /// Record that the passthrough serial port was opened
    pub fn open_serial(&mut self) {
        self.serial_open = true;
    }

    pub fn is_serial_open(&self) -> bool {
        self.serial_open
    }

    /// Bytes waiting in the serial receive buffer
    pub fn serial_available(&self) -> usize {
        self.serial.len()
    }

    /// Drain at most `max` serial bytes in arrival order
    pub fn serial_read(&mut self, max: usize) -> Vec<u8, SERIAL_RX_CAPACITY> {
        self.serial.drain(max)
    }
}
