//! Peripheral facade
//!
//! One method per block-editor operation. Writes complete once their frame
//! is on the wire; reads and timed tone playback suspend the caller.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Timer;
use embedded_io_async::{Read, Write};
use heapless::Vec;

use pinwire_core::cache::PinState;
use pinwire_core::capability::is_valid_tone_frequency;
use pinwire_core::config::{BaudRate, LinkConfig};
use pinwire_core::pending::ReadKind;
use pinwire_core::{
    DeviceProfile, LinkError, OperationKind, TransportError, ValidationError, ValidationReason,
    SERIAL_RX_CAPACITY,
};
use pinwire_protocol::frame::MAX_U14;
use pinwire_protocol::{
    Command, FirmwareVersion, Level, PinId, PinMode, SequenceKind, MAX_SERIAL_CHUNK,
};

use crate::dispatcher::Dispatcher;
use crate::transport::Receiver;

/// Upper bound on the tone steps one bend may expand into
pub const MAX_BEND_STEPS: usize = 64;

/// Line ending for `serial_print`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Eol {
    /// Append "\r\n"
    Warp,
    /// Send the text as is
    NoWarp,
}

/// Public surface used by block handlers
pub struct Peripheral<M: RawMutex, W> {
    dispatcher: Dispatcher<M, W>,
}

impl<M: RawMutex, W: Write> Peripheral<M, W> {
    pub fn new(profile: &'static DeviceProfile, config: LinkConfig, writer: W) -> Self {
        info!("Peripheral link for {}", profile.name);
        Self {
            dispatcher: Dispatcher::new(profile, config, writer),
        }
    }

    /// Underlying dispatcher
    pub fn dispatcher(&self) -> &Dispatcher<M, W> {
        &self.dispatcher
    }

    /// Drive the receive side until the stream ends
    ///
    /// Must run concurrently with the other operations; reads only complete
    /// while it is being polled.
    pub async fn run_receiver<R: Read>(&self, reader: R) -> TransportError {
        let config = self.dispatcher.config();
        let mut receiver = Receiver::new(
            reader,
            self.dispatcher.profile().opcodes,
            usize::from(config.max_desync_bytes),
        );
        receiver.subscribe(&self.dispatcher).await
    }

    /// Reconnect with a new writer after the link went down
    pub async fn attach(&self, writer: W) {
        self.dispatcher.attach(writer).await;
    }

    /// Map a block-editor pin name ("13", "D13", "A0")
    pub fn resolve_pin(&self, name: &str) -> Option<PinId> {
        self.dispatcher.profile().capabilities.resolve(name)
    }

    /// Cached state of a pin
    pub fn pin_state(&self, pin: PinId) -> Option<PinState> {
        self.dispatcher.pin_state(pin)
    }

    pub async fn set_pin_mode(&self, pin: PinId, mode: PinMode) -> Result<(), LinkError> {
        self.dispatcher.set_mode(pin, mode).await
    }

    pub async fn set_digital_output(&self, pin: PinId, level: Level) -> Result<(), LinkError> {
        self.dispatcher
            .write_pin(pin, PinMode::Output, level.as_u16())
            .await
    }

    /// Duty cycle 0-255
    pub async fn set_pwm_output(&self, pin: PinId, duty: u16) -> Result<(), LinkError> {
        self.dispatcher.write_pin(pin, PinMode::PwmOutput, duty).await
    }

    /// Angle 0-180 degrees
    pub async fn set_servo_output(&self, pin: PinId, angle: u16) -> Result<(), LinkError> {
        self.dispatcher
            .write_pin(pin, PinMode::ServoOutput, angle)
            .await
    }

    /// Returns true for a high level
    pub async fn read_digital_pin(&self, pin: PinId) -> Result<bool, LinkError> {
        let value = self.dispatcher.read_pin(pin, ReadKind::Digital).await?;
        Ok(value != 0)
    }

    /// 10-bit ADC sample
    pub async fn read_analog_pin(&self, pin: PinId) -> Result<u16, LinkError> {
        self.dispatcher.read_pin(pin, ReadKind::Analog).await
    }

    /// Open the passthrough serial port
    pub async fn serial_begin(&self, baud: BaudRate) -> Result<(), LinkError> {
        self.dispatcher.open_serial(baud).await
    }

    /// Send text out of the passthrough serial port
    ///
    /// Text longer than one frame is split across consecutive frames.
    pub async fn serial_print(&self, text: &str, eol: Eol) -> Result<(), LinkError> {
        self.dispatcher.ensure_serial().await?;

        let ending: &[u8] = match eol {
            Eol::Warp => b"\r\n",
            Eol::NoWarp => b"",
        };

        let mut chunk: Vec<u8, MAX_SERIAL_CHUNK> = Vec::new();
        for &byte in text.as_bytes().iter().chain(ending) {
            if chunk.is_full() {
                self.dispatcher.serial_write(&chunk).await?;
                chunk.clear();
            }
            // Just drained if it was full
            let _ = chunk.push(byte);
        }
        if !chunk.is_empty() {
            self.dispatcher.serial_write(&chunk).await?;
        }
        Ok(())
    }

    /// Number of received passthrough bytes not read yet
    pub fn serial_available(&self) -> usize {
        self.dispatcher.serial_available()
    }

    /// Take every received passthrough byte, oldest first
    pub fn serial_read_data(&self) -> Vec<u8, SERIAL_RX_CAPACITY> {
        self.dispatcher.serial_read(SERIAL_RX_CAPACITY)
    }

    /// Take at most `max` received passthrough bytes, oldest first
    pub fn serial_read_up_to(&self, max: usize) -> Vec<u8, SERIAL_RX_CAPACITY> {
        self.dispatcher.serial_read(max)
    }

    fn tone_pin(&self) -> Result<PinId, LinkError> {
        self.dispatcher
            .profile()
            .tone_pin
            .ok_or_else(|| ValidationError::new(OperationKind::Tone, None, ValidationReason::NoTonePin).into())
    }

    /// Play one note on the buzzer and wait for it and the following silence
    pub async fn set_tone(
        &self,
        frequency_hz: u16,
        duration_ms: u16,
        silence_ms: u16,
    ) -> Result<(), LinkError> {
        let pin = self.tone_pin()?;
        if !is_valid_tone_frequency(u32::from(frequency_hz)) {
            return Err(ValidationError::new(
                OperationKind::Tone,
                Some(pin),
                ValidationReason::InvalidFrequency,
            )
            .into());
        }

        self.dispatcher
            .send(&Command::Tone {
                pin,
                frequency_hz,
                duration_ms,
                silence_ms,
            })
            .await?;

        Timer::after_millis(u64::from(duration_ms) + u64::from(silence_ms)).await;
        Ok(())
    }

    /// Sweep from one frequency towards another in geometric steps
    ///
    /// Each step multiplies (rising) or divides (falling) the frequency by
    /// `step_factor`; the sweep stops before passing `to_hz`. The whole
    /// sweep is validated before the first note is sent.
    pub async fn set_bend_tone(
        &self,
        from_hz: u16,
        to_hz: u16,
        step_factor: f32,
        duration_ms: u16,
        silence_ms: u16,
    ) -> Result<(), LinkError> {
        let pin = self.tone_pin()?;
        let steps = bend_steps(from_hz, to_hz, step_factor)
            .map_err(|reason| ValidationError::new(OperationKind::Tone, Some(pin), reason))?;

        debug!("Bend tone: {} steps", steps.len());
        for frequency in steps {
            self.set_tone(frequency, duration_ms, silence_ms).await?;
        }
        Ok(())
    }

    async fn sequence(
        &self,
        kind: SequenceKind,
        id: u8,
        steps: u8,
        period_ms: u16,
        amplitude: u8,
    ) -> Result<(), LinkError> {
        if !self.dispatcher.profile().sequences {
            return Err(ValidationError::new(
                OperationKind::Sequence,
                None,
                ValidationReason::SequencesUnsupported,
            )
            .into());
        }
        self.dispatcher
            .send(&Command::Sequence {
                kind,
                id,
                steps,
                period_ms,
                amplitude,
            })
            .await
    }

    /// Play an expressive gesture
    pub async fn set_gesture(&self, id: u8) -> Result<(), LinkError> {
        self.sequence(SequenceKind::Gesture, id, 1, 0, 0).await
    }

    pub async fn set_dance(&self, id: u8, steps: u8, period_ms: u16) -> Result<(), LinkError> {
        self.sequence(SequenceKind::Dance, id, steps, period_ms, 0)
            .await
    }

    pub async fn set_action(
        &self,
        id: u8,
        steps: u8,
        period_ms: u16,
        amplitude: u8,
    ) -> Result<(), LinkError> {
        self.sequence(SequenceKind::Action, id, steps, period_ms, amplitude)
            .await
    }

    pub async fn set_move(
        &self,
        id: u8,
        steps: u8,
        period_ms: u16,
        amplitude: u8,
    ) -> Result<(), LinkError> {
        self.sequence(SequenceKind::Move, id, steps, period_ms, amplitude)
            .await
    }

    /// Ask the firmware for its protocol version
    pub async fn query_firmware(&self) -> Result<FirmwareVersion, LinkError> {
        self.dispatcher.query_version().await
    }

    /// Reset the firmware; every pin goes back to unconfigured
    pub async fn reset(&self) -> Result<(), LinkError> {
        self.dispatcher.reset().await
    }
}

/// Frequencies of a bend, in playing order
fn bend_steps(
    from_hz: u16,
    to_hz: u16,
    step_factor: f32,
) -> Result<Vec<u16, MAX_BEND_STEPS>, ValidationReason> {
    let playable = |hz: u16| is_valid_tone_frequency(u32::from(hz)) && hz <= MAX_U14;
    if !playable(from_hz) || !playable(to_hz) {
        return Err(ValidationReason::InvalidFrequency);
    }
    if !(step_factor.is_finite() && step_factor > 1.0) {
        return Err(ValidationReason::InvalidStepFactor);
    }

    let rising = from_hz < to_hz;
    let mut steps = Vec::new();
    let mut frequency = from_hz;

    while (rising && frequency < to_hz) || (!rising && frequency > to_hz) {
        steps
            .push(frequency)
            .map_err(|_| ValidationReason::TooManySteps)?;

        let next = if rising {
            f32::from(frequency) * step_factor
        } else {
            f32::from(frequency) / step_factor
        };
        // Truncate like an integer loop counter; `as` saturates
        frequency = next as u16;
    }

    Ok(steps)
}
