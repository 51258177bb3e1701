//! Pin identifiers, modes and levels shared by commands and reports

/// Physical pin number as the firmware numbers it
///
/// Analog header pins (A0, A1, ...) have a digital number too; the
/// capability table maps between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinId(pub u8);

impl PinId {
    /// Firmata port that carries this pin in digital reports
    pub const fn port(self) -> u8 {
        self.0 / 8
    }

    /// Bit position of this pin inside its port
    pub const fn port_bit(self) -> u8 {
        self.0 % 8
    }
}

impl From<u8> for PinId {
    fn from(pin: u8) -> Self {
        PinId(pin)
    }
}

/// Operating mode of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    /// Digital input, floating
    Input,
    /// Digital output
    Output,
    /// Digital input with internal pull-up
    InputPullup,
    /// PWM output (duty 0-255)
    PwmOutput,
    /// Hobby servo output (angle 0-180)
    ServoOutput,
    /// ADC input
    AnalogInput,
}

impl PinMode {
    /// All modes, in bit order of [`PinMode::bit`]
    pub const ALL: [PinMode; 6] = [
        PinMode::Input,
        PinMode::Output,
        PinMode::InputPullup,
        PinMode::PwmOutput,
        PinMode::ServoOutput,
        PinMode::AnalogInput,
    ];

    /// Bit used for this mode in capability masks
    pub const fn bit(self) -> u8 {
        match self {
            PinMode::Input => 1 << 0,
            PinMode::Output => 1 << 1,
            PinMode::InputPullup => 1 << 2,
            PinMode::PwmOutput => 1 << 3,
            PinMode::ServoOutput => 1 << 4,
            PinMode::AnalogInput => 1 << 5,
        }
    }

    /// Returns true for digital input modes
    pub fn is_digital_input(self) -> bool {
        matches!(self, PinMode::Input | PinMode::InputPullup)
    }
}

/// Digital logic level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Wire value (0 or 1)
    pub const fn as_u16(self) -> u16 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    /// Any non-zero value reads as high
    pub const fn from_value(value: u16) -> Self {
        if value == 0 {
            Level::Low
        } else {
            Level::High
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_mapping() {
        assert_eq!(PinId(13).port(), 1);
        assert_eq!(PinId(13).port_bit(), 5);
        assert_eq!(PinId(7).port(), 0);
        assert_eq!(PinId(16).port_bit(), 0);
    }

    #[test]
    fn test_mode_bits_distinct() {
        let mut seen = 0u8;
        for mode in PinMode::ALL {
            assert_eq!(seen & mode.bit(), 0);
            seen |= mode.bit();
        }
    }

    #[test]
    fn test_level_from_value() {
        assert_eq!(Level::from_value(0), Level::Low);
        assert_eq!(Level::from_value(1), Level::High);
        assert_eq!(Level::from_value(1023), Level::High);
        assert_eq!(Level::from(true).as_u16(), 1);
    }
}
