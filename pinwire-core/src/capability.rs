//! Pin capability tables
//!
//! A capability table is a static description of every physical pin: which
//! modes it supports, whether it has an analog channel and whether it can
//! raise interrupts. Tables are built at compile time and never mutated.

use core::ops::RangeInclusive;

use pinwire_protocol::{PinId, PinMode};

use crate::error::ValidationReason;

/// Set of pin modes, one bit per [`PinMode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeSet(u8);

impl ModeSet {
    /// No supported modes (reserved pin)
    pub const EMPTY: ModeSet = ModeSet(0);

    /// Add a mode to the set
    pub const fn with(self, mode: PinMode) -> Self {
        ModeSet(self.0 | mode.bit())
    }

    /// Check whether the set contains a mode
    pub const fn contains(&self, mode: PinMode) -> bool {
        self.0 & mode.bit() != 0
    }

    /// Returns true if no mode is supported
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate over the modes in the set
    pub fn iter(&self) -> impl Iterator<Item = PinMode> + '_ {
        PinMode::ALL.into_iter().filter(|m| self.contains(*m))
    }
}

/// General-purpose digital I/O
pub const DIGITAL_IO: ModeSet = ModeSet::EMPTY
    .with(PinMode::Input)
    .with(PinMode::Output)
    .with(PinMode::InputPullup);

/// Digital I/O that can also drive a servo
pub const DIGITAL_SERVO: ModeSet = DIGITAL_IO.with(PinMode::ServoOutput);

/// Digital I/O with a hardware PWM timer
pub const DIGITAL_PWM: ModeSet = DIGITAL_SERVO.with(PinMode::PwmOutput);

/// Analog header pin usable as digital I/O
pub const ANALOG_DIGITAL: ModeSet = DIGITAL_IO.with(PinMode::AnalogInput);

/// ADC-only pin
pub const ANALOG_ONLY: ModeSet = ModeSet::EMPTY.with(PinMode::AnalogInput);

/// Classes of pins a table can be queried for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinClass {
    Digital,
    Analog,
    Pwm,
    Servo,
    Interrupt,
}

/// Capabilities of one physical pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinCapability {
    pub pin: PinId,
    pub modes: ModeSet,
    /// ADC channel for analog-capable pins
    pub analog_channel: Option<u8>,
    /// Pin can raise an external interrupt
    pub interrupt: bool,
}

impl PinCapability {
    /// Create a capability entry
    pub const fn new(pin: u8, modes: ModeSet) -> Self {
        Self {
            pin: PinId(pin),
            modes,
            analog_channel: None,
            interrupt: false,
        }
    }

    /// Attach an analog channel
    pub const fn analog(mut self, channel: u8) -> Self {
        self.analog_channel = Some(channel);
        self
    }

    /// Mark the pin as interrupt-capable
    pub const fn interrupt(mut self) -> Self {
        self.interrupt = true;
        self
    }

    /// Check whether this pin belongs to a class
    pub fn is(&self, class: PinClass) -> bool {
        match class {
            PinClass::Digital => self.modes.contains(PinMode::Input),
            PinClass::Analog => self.analog_channel.is_some(),
            PinClass::Pwm => self.modes.contains(PinMode::PwmOutput),
            PinClass::Servo => self.modes.contains(PinMode::ServoOutput),
            PinClass::Interrupt => self.interrupt,
        }
    }
}

/// Legal value range for a mode
///
/// Digital modes carry a level (0/1), PWM a duty cycle, servo an angle in
/// degrees, analog input a 10-bit ADC sample.
pub const fn value_range(mode: PinMode) -> RangeInclusive<u32> {
    match mode {
        PinMode::Input | PinMode::Output | PinMode::InputPullup => 0..=1,
        PinMode::PwmOutput => 0..=255,
        PinMode::ServoOutput => 0..=180,
        PinMode::AnalogInput => 0..=1023,
    }
}

/// Check a value against the range of a mode
pub fn is_valid_value(mode: PinMode, value: u32) -> bool {
    value_range(mode).contains(&value)
}

/// Tone frequencies must be positive
pub fn is_valid_tone_frequency(hz: u32) -> bool {
    hz > 0
}

/// Immutable pin capability lookup
#[derive(Debug, Clone, Copy)]
pub struct CapabilityTable {
    pins: &'static [PinCapability],
}

impl CapabilityTable {
    /// Wrap a static pin list
    pub const fn new(pins: &'static [PinCapability]) -> Self {
        Self { pins }
    }

    /// Look up a pin
    pub fn get(&self, pin: PinId) -> Option<&'static PinCapability> {
        self.pins.iter().find(|c| c.pin == pin)
    }

    /// Supported modes of a pin (empty for unknown pins)
    pub fn capabilities_of(&self, pin: PinId) -> ModeSet {
        self.get(pin).map(|c| c.modes).unwrap_or(ModeSet::EMPTY)
    }

    /// Check whether a pin supports a mode
    pub fn supports(&self, pin: PinId, mode: PinMode) -> bool {
        self.capabilities_of(pin).contains(mode)
    }

    /// ADC channel of a pin
    pub fn analog_channel(&self, pin: PinId) -> Option<u8> {
        self.get(pin).and_then(|c| c.analog_channel)
    }

    /// Pin wired to an ADC channel
    pub fn pin_for_channel(&self, channel: u8) -> Option<PinId> {
        self.pins
            .iter()
            .find(|c| c.analog_channel == Some(channel))
            .map(|c| c.pin)
    }

    /// Check whether a pin can raise interrupts
    pub fn is_interrupt_capable(&self, pin: PinId) -> bool {
        self.get(pin).map(|c| c.interrupt).unwrap_or(false)
    }

    /// Pins belonging to a class
    pub fn pins(&self, class: PinClass) -> impl Iterator<Item = PinId> + '_ {
        self.pins.iter().filter(move |c| c.is(class)).map(|c| c.pin)
    }

    /// Resolve a block-editor pin name ("13", "D13", "A0")
    pub fn resolve(&self, name: &str) -> Option<PinId> {
        let name = name.trim();
        let (analog, digits) = match name.as_bytes().first()? {
            b'A' | b'a' => (true, &name[1..]),
            b'D' | b'd' => (false, &name[1..]),
            _ => (false, name),
        };
        let number: u8 = digits.parse().ok()?;

        if analog {
            self.pin_for_channel(number)
        } else {
            self.get(PinId(number)).map(|c| c.pin)
        }
    }

    /// Validate that a pin supports a mode
    pub fn check_mode(&self, pin: PinId, mode: PinMode) -> Result<(), ValidationReason> {
        let caps = self.get(pin).ok_or(ValidationReason::UnknownPin)?;
        if !caps.modes.contains(mode) {
            return Err(ValidationReason::UnsupportedMode(mode));
        }
        Ok(())
    }

    /// Validate a mode and a value for that mode on a pin
    pub fn check_value(&self, pin: PinId, mode: PinMode, value: u32) -> Result<(), ValidationReason> {
        self.check_mode(pin, mode)?;
        if !is_valid_value(mode, value) {
            return Err(ValidationReason::ValueOutOfRange {
                value,
                max: *value_range(mode).end(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{NANO, UNO};

    #[test]
    fn test_mode_set() {
        assert!(DIGITAL_PWM.contains(PinMode::PwmOutput));
        assert!(DIGITAL_PWM.contains(PinMode::ServoOutput));
        assert!(!DIGITAL_IO.contains(PinMode::AnalogInput));
        assert!(ModeSet::EMPTY.is_empty());
        assert_eq!(ANALOG_ONLY.iter().count(), 1);
    }

    #[test]
    fn test_value_ranges() {
        assert!(is_valid_value(PinMode::PwmOutput, 255));
        assert!(!is_valid_value(PinMode::PwmOutput, 256));
        assert!(is_valid_value(PinMode::ServoOutput, 180));
        assert!(!is_valid_value(PinMode::ServoOutput, 181));
        assert!(is_valid_value(PinMode::Output, 1));
        assert!(!is_valid_value(PinMode::Output, 2));
        assert!(is_valid_tone_frequency(1));
        assert!(!is_valid_tone_frequency(0));
    }

    #[test]
    fn test_uno_capabilities() {
        let table = UNO.capabilities;
        assert!(table.supports(PinId(3), PinMode::PwmOutput));
        assert!(!table.supports(PinId(4), PinMode::PwmOutput));
        assert!(table.supports(PinId(13), PinMode::Output));
        assert!(table.capabilities_of(PinId(0)).is_empty());
        assert!(table.capabilities_of(PinId(42)).is_empty());
        assert!(table.is_interrupt_capable(PinId(2)));
        assert!(!table.is_interrupt_capable(PinId(4)));
        assert_eq!(table.analog_channel(PinId(14)), Some(0));
        assert_eq!(table.pin_for_channel(5), Some(PinId(19)));
        assert_eq!(table.pin_for_channel(6), None);
    }

    #[test]
    fn test_pin_classes() {
        let pwm: heapless::Vec<PinId, 8> = UNO.capabilities.pins(PinClass::Pwm).collect();
        assert_eq!(
            &pwm[..],
            &[PinId(3), PinId(5), PinId(6), PinId(9), PinId(10), PinId(11)]
        );
        assert_eq!(UNO.capabilities.pins(PinClass::Interrupt).count(), 2);
        assert_eq!(NANO.capabilities.pins(PinClass::Analog).count(), 8);
    }

    #[test]
    fn test_resolve_names() {
        let table = NANO.capabilities;
        assert_eq!(table.resolve("13"), Some(PinId(13)));
        assert_eq!(table.resolve("D13"), Some(PinId(13)));
        assert_eq!(table.resolve(" A0 "), Some(PinId(14)));
        assert_eq!(table.resolve("a7"), Some(PinId(21)));
        assert_eq!(table.resolve("A8"), None);
        assert_eq!(table.resolve("99"), None);
        assert_eq!(table.resolve(""), None);
        assert_eq!(table.resolve("pin"), None);
    }

    #[test]
    fn test_nano_analog_only_pins() {
        let table = NANO.capabilities;
        assert!(table.supports(PinId(20), PinMode::AnalogInput));
        assert_eq!(
            table.check_mode(PinId(20), PinMode::Output),
            Err(ValidationReason::UnsupportedMode(PinMode::Output))
        );
    }

    #[test]
    fn test_check_value() {
        let table = UNO.capabilities;
        assert_eq!(table.check_value(PinId(9), PinMode::PwmOutput, 128), Ok(()));
        assert_eq!(
            table.check_value(PinId(9), PinMode::PwmOutput, 300),
            Err(ValidationReason::ValueOutOfRange { value: 300, max: 255 })
        );
        assert_eq!(
            table.check_value(PinId(99), PinMode::Output, 1),
            Err(ValidationReason::UnknownPin)
        );
    }
}
