//! Opcode tables
//!
//! Opcode and mode values belong to the firmware, not to this crate. A device
//! profile carries an [`OpcodeMap`]; the codec never hard-codes a value.
//!
//! Commands whose low nibble carries a port or channel (digital message,
//! analog message, report requests) are stored as their base value with the
//! low nibble clear.

use crate::types::PinMode;

/// Wire values for each pin mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeCodes {
    pub input: u8,
    pub output: u8,
    pub analog: u8,
    pub pwm: u8,
    pub servo: u8,
    pub pullup: u8,
}

impl ModeCodes {
    /// Stock Firmata mode numbers
    pub const FIRMATA: ModeCodes = ModeCodes {
        input: 0x00,
        output: 0x01,
        analog: 0x02,
        pwm: 0x03,
        servo: 0x04,
        pullup: 0x0B,
    };

    /// Wire value for a mode
    pub fn code(&self, mode: PinMode) -> u8 {
        match mode {
            PinMode::Input => self.input,
            PinMode::Output => self.output,
            PinMode::AnalogInput => self.analog,
            PinMode::PwmOutput => self.pwm,
            PinMode::ServoOutput => self.servo,
            PinMode::InputPullup => self.pullup,
        }
    }

    /// Mode for a wire value, if it is one this layer models
    pub fn mode(&self, code: u8) -> Option<PinMode> {
        PinMode::ALL.into_iter().find(|&m| self.code(m) == code)
    }
}

/// Firmware opcode table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpcodeMap {
    // Nibble-addressed commands (base value, low nibble = port/channel)
    pub digital_message: u8,
    pub analog_message: u8,
    pub report_analog: u8,
    pub report_digital: u8,

    // Single-byte commands
    pub set_pin_mode: u8,
    pub set_digital_pin_value: u8,
    pub report_version: u8,
    pub system_reset: u8,
    pub start_sysex: u8,
    pub end_sysex: u8,

    // Sysex identifiers
    pub extended_analog: u8,
    pub pin_state_query: u8,
    pub pin_state_response: u8,
    pub serial_message: u8,
    pub string_data: u8,
    pub report_firmware: u8,
    pub tone: u8,
    pub sequence: u8,

    // Serial sub-commands (high nibble of the first sysex payload byte)
    pub serial_config: u8,
    pub serial_write: u8,
    pub serial_read: u8,
    pub serial_reply: u8,

    pub modes: ModeCodes,
}

impl OpcodeMap {
    /// Stock Firmata values, with tone and sequence sysex ids used by
    /// educational robot firmwares
    pub const FIRMATA: OpcodeMap = OpcodeMap {
        digital_message: 0x90,
        analog_message: 0xE0,
        report_analog: 0xC0,
        report_digital: 0xD0,

        set_pin_mode: 0xF4,
        set_digital_pin_value: 0xF5,
        report_version: 0xF9,
        system_reset: 0xFF,
        start_sysex: 0xF0,
        end_sysex: 0xF7,

        extended_analog: 0x6F,
        pin_state_query: 0x6D,
        pin_state_response: 0x6E,
        serial_message: 0x60,
        string_data: 0x71,
        report_firmware: 0x79,
        tone: 0x5F,
        sequence: 0x5E,

        serial_config: 0x10,
        serial_write: 0x20,
        serial_read: 0x30,
        serial_reply: 0x40,

        modes: ModeCodes::FIRMATA,
    };

    /// Length of a fixed-size frame starting with `command`, or `None` if
    /// `command` does not start a fixed frame in the device-to-host direction
    pub fn fixed_frame_len(&self, command: u8) -> Option<usize> {
        let base = command & 0xF0;
        if base == self.digital_message || base == self.analog_message {
            Some(3)
        } else if command == self.report_version {
            Some(3)
        } else {
            None
        }
    }

    /// Returns true if `byte` can start a device-to-host frame
    pub fn is_report_start(&self, byte: u8) -> bool {
        byte == self.start_sysex || self.fixed_frame_len(byte).is_some()
    }
}

impl Default for OpcodeMap {
    fn default() -> Self {
        Self::FIRMATA
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_codes_roundtrip() {
        let codes = ModeCodes::FIRMATA;
        for mode in PinMode::ALL {
            assert_eq!(codes.mode(codes.code(mode)), Some(mode));
        }
        assert_eq!(codes.mode(0x7F), None);
    }

    #[test]
    fn test_report_starts() {
        let map = OpcodeMap::FIRMATA;
        assert!(map.is_report_start(0x90));
        assert!(map.is_report_start(0x9F));
        assert!(map.is_report_start(0xE3));
        assert!(map.is_report_start(0xF0));
        assert!(map.is_report_start(0xF9));
        assert!(!map.is_report_start(0xF7));
        assert!(!map.is_report_start(0x42));
        assert!(!map.is_report_start(0xF4));
    }

    #[test]
    fn test_fixed_frame_len() {
        let map = OpcodeMap::FIRMATA;
        assert_eq!(map.fixed_frame_len(0x91), Some(3));
        assert_eq!(map.fixed_frame_len(0xF9), Some(3));
        assert_eq!(map.fixed_frame_len(0xF0), None);
    }
}
