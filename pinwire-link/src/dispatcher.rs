//! Command dispatcher
//!
//! Every request goes through the same steps: validate against the
//! capability table, check the pin's configuration phase, encode, write,
//! then update the cache. Reads additionally register a pending read and
//! wait for the receive path to resolve it.
//!
//! Frame writes are serialized by an async mutex around the transport. The
//! cache and the pending-read signals live behind one blocking mutex that is
//! never held across an await point.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_deadline, Duration, Instant};
use embedded_io_async::Write;

use pinwire_core::cache::{PinState, PinStateCache};
use pinwire_core::config::{BaudRate, LinkConfig, UnconfiguredPolicy};
use pinwire_core::pending::{ReadKind, ReadOutcome, ReadTarget, ReadValue, Resolutions};
use pinwire_core::{
    DeviceProfile, LinkError, OperationKind, PinPhase, TransportError, ValidationError,
    ValidationReason, MAX_PENDING_READS, SERIAL_RX_CAPACITY,
};
use pinwire_protocol::{Command, FirmwareVersion, Level, PinId, PinMode, Report};

use crate::transport::{ReportSink, TransportAdapter};

/// Current time in milliseconds since boot
fn now_ms() -> u64 {
    Instant::now().as_millis()
}

/// Validates, encodes and sends requests; resolves reads from reports
pub struct Dispatcher<M: RawMutex, W> {
    profile: &'static DeviceProfile,
    config: LinkConfig,
    transport: Mutex<M, TransportAdapter<W>>,
    cache: BlockingMutex<M, RefCell<PinStateCache>>,
    signals: [Signal<M, ReadOutcome>; MAX_PENDING_READS],
}

/// Releases a pending-read slot when the waiting future completes or is
/// dropped
struct PendingGuard<'a, M: RawMutex, W> {
    dispatcher: &'a Dispatcher<M, W>,
    slot: usize,
    deadline: Instant,
}

impl<M: RawMutex, W> PendingGuard<'_, M, W> {
    async fn wait(&self) -> ReadOutcome {
        match with_deadline(self.deadline, self.dispatcher.signals[self.slot].wait()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("Read in slot {} timed out", self.slot);
                Err(LinkError::ReadTimeout)
            }
        }
    }
}

impl<M: RawMutex, W> Drop for PendingGuard<'_, M, W> {
    fn drop(&mut self) {
        let slot = self.slot;
        self.dispatcher
            .with_cache(|cache| cache.release_read(slot));
    }
}

impl<M: RawMutex, W> Dispatcher<M, W> {
    fn with_cache<R>(&self, f: impl FnOnce(&mut PinStateCache) -> R) -> R {
        self.cache.lock(|cache| f(&mut cache.borrow_mut()))
    }

    /// Deliver outcomes to waiting reads
    ///
    /// Called with the cache lock held so a slot cannot be released and
    /// reused between resolution and signalling.
    fn complete(&self, resolved: &Resolutions) {
        for (slot, outcome) in resolved.iter() {
            if let Some(signal) = self.signals.get(*slot) {
                signal.signal(*outcome);
            }
        }
    }

    fn update_and_complete(&self, f: impl FnOnce(&mut PinStateCache) -> Resolutions) {
        self.cache.lock(|cache| {
            let resolved = f(&mut cache.borrow_mut());
            self.complete(&resolved);
        });
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Snapshot of a pin's cached state
    pub fn pin_state(&self, pin: PinId) -> Option<PinState> {
        self.with_cache(|cache| cache.get(pin))
    }

    pub fn is_connected(&self) -> bool {
        self.with_cache(|cache| cache.is_connected())
    }

    /// Last firmware version seen on the wire
    pub fn firmware(&self) -> Option<FirmwareVersion> {
        self.with_cache(|cache| cache.firmware())
    }

    /// Bytes waiting in the passthrough receive buffer
    pub fn serial_available(&self) -> usize {
        self.with_cache(|cache| cache.serial_available())
    }

    /// Drain at most `max` passthrough bytes
    pub fn serial_read(&self, max: usize) -> heapless::Vec<u8, SERIAL_RX_CAPACITY> {
        self.with_cache(|cache| cache.serial_read(max))
    }

    pub fn is_serial_open(&self) -> bool {
        self.with_cache(|cache| cache.is_serial_open())
    }

    fn register(&self, target: ReadTarget) -> Result<PendingGuard<'_, M, W>, LinkError> {
        let start = Instant::now();
        let timeout = self.config.read_timeout_ms;
        let read = self.with_cache(|cache| {
            let read = cache.register_read(target, start.as_millis(), timeout)?;
            // Drop an outcome left over from the slot's previous owner
            self.signals[read.slot].reset();
            Ok::<_, LinkError>(read)
        })?;

        Ok(PendingGuard {
            dispatcher: self,
            slot: read.slot,
            // Not rebuilt from the ms stamps, which would round it down
            deadline: start + Duration::from_millis(u64::from(timeout)),
        })
    }
}

impl<M: RawMutex, W: Write> Dispatcher<M, W> {
    pub fn new(profile: &'static DeviceProfile, config: LinkConfig, writer: W) -> Self {
        Self {
            profile,
            config,
            transport: Mutex::new(TransportAdapter::new(writer)),
            cache: BlockingMutex::new(RefCell::new(PinStateCache::new())),
            signals: core::array::from_fn(|_| Signal::new()),
        }
    }

    /// Install a new writer after a disconnect; the cache starts empty
    pub async fn attach(&self, writer: W) {
        self.transport.lock().await.attach(writer);
        self.with_cache(|cache| cache.reconnect());
        info!("Link attached to {}", self.profile.name);
    }

    /// Encode and write one command
    pub async fn send(&self, command: &Command<'_>) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(TransportError::Closed.into());
        }
        self.transport
            .lock()
            .await
            .send(&self.profile.opcodes, command)
            .await
    }

    /// Configure a pin
    pub async fn set_mode(&self, pin: PinId, mode: PinMode) -> Result<(), LinkError> {
        self.profile
            .capabilities
            .check_mode(pin, mode)
            .map_err(|reason| ValidationError::new(OperationKind::SetPinMode, Some(pin), reason))?;

        self.send(&Command::SetPinMode { pin, mode }).await?;
        self.with_cache(|cache| cache.set_mode(pin, mode));
        debug!("Pin {} set to {:?}", pin.0, mode);
        Ok(())
    }

    /// Make sure `pin` is configured for an operation
    ///
    /// A configured pin must already be in a compatible mode. An
    /// unconfigured pin either fails or gets `required` first, depending on
    /// the configured policy.
    async fn ensure_mode(
        &self,
        op: OperationKind,
        pin: PinId,
        required: PinMode,
    ) -> Result<(), LinkError> {
        match self.with_cache(|cache| cache.phase(pin)) {
            PinPhase::Configured(mode) if mode_satisfies(op, mode, required) => Ok(()),
            PinPhase::Configured(configured) => Err(ValidationError::new(
                op,
                Some(pin),
                ValidationReason::ModeMismatch {
                    configured,
                    required,
                },
            )
            .into()),
            PinPhase::Unconfigured => match self.config.unconfigured {
                UnconfiguredPolicy::Strict => Err(LinkError::NotConfigured { op, pin: Some(pin) }),
                UnconfiguredPolicy::Implicit => {
                    info!("Pin {} unconfigured, setting {:?}", pin.0, required);
                    self.set_mode(pin, required).await
                }
            },
        }
    }

    /// Drive an output pin
    ///
    /// `mode` selects the write: Output takes a level, PwmOutput a duty
    /// cycle, ServoOutput an angle.
    pub async fn write_pin(&self, pin: PinId, mode: PinMode, value: u16) -> Result<(), LinkError> {
        let op = match mode {
            PinMode::Output => OperationKind::DigitalWrite,
            PinMode::PwmOutput => OperationKind::PwmWrite,
            PinMode::ServoOutput => OperationKind::ServoWrite,
            other => {
                return Err(ValidationError::new(
                    OperationKind::DigitalWrite,
                    Some(pin),
                    ValidationReason::UnsupportedMode(other),
                )
                .into())
            }
        };

        self.profile
            .capabilities
            .check_value(pin, mode, u32::from(value))
            .map_err(|reason| ValidationError::new(op, Some(pin), reason))?;
        self.ensure_mode(op, pin, mode).await?;

        let command = match mode {
            PinMode::Output => Command::DigitalWrite {
                pin,
                level: Level::from_value(value),
            },
            _ => Command::AnalogWrite { pin, value },
        };
        self.send(&command).await?;

        let now = now_ms();
        self.with_cache(|cache| cache.record_write(pin, value, now));
        Ok(())
    }

    /// Read a pin, from the cache when fresh, otherwise from the device
    pub async fn read_pin(&self, pin: PinId, kind: ReadKind) -> Result<u16, LinkError> {
        let (op, required) = match kind {
            ReadKind::Digital => (OperationKind::DigitalRead, PinMode::Input),
            ReadKind::Analog => (OperationKind::AnalogRead, PinMode::AnalogInput),
        };

        self.profile
            .capabilities
            .check_mode(pin, required)
            .map_err(|reason| ValidationError::new(op, Some(pin), reason))?;
        if !self.is_connected() {
            return Err(LinkError::ConnectionLost);
        }
        self.ensure_mode(op, pin, required).await?;

        let now = now_ms();
        let freshness = self.config.freshness_ms;
        if let Some(value) = self.with_cache(|cache| cache.fresh_value(pin, now, freshness)) {
            trace!("Pin {} served from cache", pin.0);
            return Ok(value);
        }

        // Register before sending so an immediate answer is not missed
        let pending = self.register(ReadTarget::Pin { pin, kind })?;
        self.request_report(pin, kind).await?;

        match pending.wait().await? {
            ReadValue::Pin(value) => Ok(value),
            ReadValue::Version(_) => Err(LinkError::ReadTimeout),
        }
    }

    /// Send the frames that make the device report a pin
    ///
    /// Input levels only arrive in port reports, so a digital read of an
    /// input pin (re)enables its port, which makes the firmware send the port
    /// again. Output pins are queried for their state instead.
    async fn request_report(&self, pin: PinId, kind: ReadKind) -> Result<(), LinkError> {
        let mode = self.with_cache(|cache| cache.get(pin)).and_then(|s| s.mode());

        match kind {
            ReadKind::Analog => {
                let channel = self.profile.capabilities.analog_channel(pin).ok_or_else(|| {
                    ValidationError::new(
                        OperationKind::AnalogRead,
                        Some(pin),
                        ValidationReason::UnsupportedMode(PinMode::AnalogInput),
                    )
                })?;
                if self.with_cache(|cache| cache.enable_reporting(pin)) {
                    let command = Command::ReportAnalog {
                        channel,
                        enable: true,
                    };
                    if let Err(e) = self.send(&command).await {
                        self.with_cache(|cache| cache.clear_reporting(pin));
                        return Err(e);
                    }
                }
            }
            ReadKind::Digital if mode.is_some_and(PinMode::is_digital_input) => {
                self.with_cache(|cache| cache.enable_reporting(pin));
                self.send(&Command::ReportDigital {
                    port: pin.port(),
                    enable: true,
                })
                .await?;
            }
            ReadKind::Digital => {
                self.send(&Command::QueryPinState { pin }).await?;
            }
        }
        Ok(())
    }

    /// Ask the firmware for its protocol version
    pub async fn query_version(&self) -> Result<FirmwareVersion, LinkError> {
        let pending = self.register(ReadTarget::Version)?;
        self.send(&Command::ReportVersion).await?;

        match pending.wait().await? {
            ReadValue::Version(version) => Ok(version),
            ReadValue::Pin(_) => Err(LinkError::ReadTimeout),
        }
    }

    /// Reset the firmware and forget all pin configuration
    pub async fn reset(&self) -> Result<(), LinkError> {
        self.send(&Command::SystemReset).await?;
        self.with_cache(|cache| cache.reset_pins());
        info!("Firmware reset");
        Ok(())
    }

    /// Open the passthrough serial port and start forwarding its input
    pub async fn open_serial(&self, baud: BaudRate) -> Result<(), LinkError> {
        let port = self.profile.serial_port;
        self.send(&Command::SerialConfig {
            port,
            baud: baud.as_u32(),
        })
        .await?;
        self.send(&Command::SerialRead { port }).await?;
        self.with_cache(|cache| cache.open_serial());
        debug!("Serial passthrough open at {} baud", baud.as_u32());
        Ok(())
    }

    /// Make sure the passthrough is open before writing to it
    pub async fn ensure_serial(&self) -> Result<(), LinkError> {
        if self.is_serial_open() {
            return Ok(());
        }
        match self.config.unconfigured {
            UnconfiguredPolicy::Strict => Err(LinkError::NotConfigured {
                op: OperationKind::SerialPrint,
                pin: None,
            }),
            UnconfiguredPolicy::Implicit => {
                info!("Serial passthrough not open, opening");
                self.open_serial(self.config.baud_rate).await
            }
        }
    }

    /// Write one chunk to the passthrough serial port
    pub async fn serial_write(&self, data: &[u8]) -> Result<(), LinkError> {
        self.send(&Command::SerialWrite {
            port: self.profile.serial_port,
            data,
        })
        .await
    }
}

/// Whether a configured mode allows an operation needing `required`
fn mode_satisfies(op: OperationKind, configured: PinMode, required: PinMode) -> bool {
    match op {
        // Output pins read back their level
        OperationKind::DigitalRead => {
            configured.is_digital_input() || configured == PinMode::Output
        }
        _ => configured == required,
    }
}

impl<M: RawMutex, W> ReportSink for Dispatcher<M, W> {
    fn on_report(&self, report: &Report) {
        if let Report::StringData(text) = report {
            info!("Firmware says: {}", text.as_str());
        }

        let now = now_ms();
        let table = self.profile.capabilities;
        self.cache.lock(|cache| {
            let applied = cache.borrow_mut().apply(&table, report, now);
            if applied.serial_dropped > 0 {
                warn!(
                    "Serial receive buffer full, dropped {} bytes",
                    applied.serial_dropped
                );
            }
            self.complete(&applied.resolved);
        });
    }

    fn on_desync(&self, skipped: usize) {
        warn!("Protocol desync: skipped {} bytes", skipped);
    }

    fn on_desync_limit(&self, run: usize) {
        error!("Lost framing for {} bytes, failing pending reads", run);
        self.update_and_complete(|cache| {
            cache.fail_pending(LinkError::Transport(TransportError::Desync))
        });
    }

    fn on_disconnect(&self, reason: TransportError) {
        warn!("Link disconnected: {:?}", reason);
        self.update_and_complete(|cache| cache.invalidate_all());
    }
}
