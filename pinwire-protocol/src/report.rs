//! Device-to-host reports

use heapless::{String, Vec};

use crate::frame::{join14, unpack_pairs, MAX_SERIAL_CHUNK};
use crate::opcodes::OpcodeMap;
use crate::types::{PinId, PinMode};

/// Maximum length of a firmware string message
pub const MAX_STRING_LEN: usize = 62;

/// Protocol or firmware version reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

/// Reports emitted by the firmware
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Report {
    /// Levels of the eight pins of a digital port (bit n = pin port*8+n)
    DigitalPort { port: u8, mask: u8 },
    /// Sample from an analog channel
    Analog { channel: u8, value: u16 },
    /// Answer to a pin state query
    PinState {
        pin: PinId,
        mode: Option<PinMode>,
        value: u16,
    },
    /// Bytes received on the passthrough serial port
    SerialData {
        port: u8,
        data: Vec<u8, MAX_SERIAL_CHUNK>,
    },
    /// Protocol version (answer to a version request, also sent at boot)
    Version(FirmwareVersion),
    /// Free-form text from the firmware
    StringData(String<MAX_STRING_LEN>),
}

impl Report {
    /// Parse a fixed-size frame (command byte plus two data bytes)
    pub(crate) fn from_fixed(map: &OpcodeMap, frame: &[u8; 3]) -> Option<Self> {
        let [command, b1, b2] = *frame;
        let base = command & 0xF0;
        let low = command & 0x0F;

        if base == map.digital_message {
            Some(Report::DigitalPort {
                port: low,
                mask: (b1 & 0x7F) | ((b2 & 0x01) << 7),
            })
        } else if base == map.analog_message {
            Some(Report::Analog {
                channel: low,
                value: join14(b1, b2),
            })
        } else if command == map.report_version {
            Some(Report::Version(FirmwareVersion {
                major: b1,
                minor: b2,
            }))
        } else {
            None
        }
    }

    /// Parse the body of a sysex frame (identifier first, no start/end bytes)
    ///
    /// Returns `None` for sysex messages this layer does not interpret.
    pub(crate) fn from_sysex(map: &OpcodeMap, body: &[u8]) -> Option<Self> {
        let (&id, data) = body.split_first()?;

        if id == map.pin_state_response {
            let (&pin, rest) = data.split_first()?;
            let (&mode, state) = rest.split_first()?;
            // State is 7-bit groups, least significant first
            let value = state
                .iter()
                .take(3)
                .enumerate()
                .fold(0u32, |acc, (i, &b)| acc | (u32::from(b & 0x7F) << (7 * i)));
            Some(Report::PinState {
                pin: PinId(pin),
                mode: map.modes.mode(mode),
                value: value.min(u32::from(u16::MAX)) as u16,
            })
        } else if id == map.serial_message {
            let (&sub, pairs) = data.split_first()?;
            if sub & 0xF0 != map.serial_reply {
                return None;
            }
            Some(Report::SerialData {
                port: sub & 0x0F,
                data: unpack_pairs(pairs),
            })
        } else if id == map.report_firmware {
            let major = *data.first()?;
            let minor = *data.get(1)?;
            Some(Report::Version(FirmwareVersion { major, minor }))
        } else if id == map.string_data {
            let bytes: Vec<u8, MAX_STRING_LEN> = unpack_pairs(data);
            let mut text = String::new();
            for &b in bytes.iter() {
                let c = if b.is_ascii() { b as char } else { '?' };
                if text.push(c).is_err() {
                    break;
                }
            }
            Some(Report::StringData(text))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: OpcodeMap = OpcodeMap::FIRMATA;

    #[test]
    fn test_digital_port() {
        let report = Report::from_fixed(&MAP, &[0x91, 0x20, 0x01]).unwrap();
        assert_eq!(report, Report::DigitalPort { port: 1, mask: 0xA0 });
    }

    #[test]
    fn test_analog() {
        let report = Report::from_fixed(&MAP, &[0xE2, 0x7F, 0x07]).unwrap();
        assert_eq!(report, Report::Analog { channel: 2, value: 1023 });
    }

    #[test]
    fn test_version() {
        let report = Report::from_fixed(&MAP, &[0xF9, 2, 5]).unwrap();
        assert_eq!(report, Report::Version(FirmwareVersion { major: 2, minor: 5 }));
    }

    #[test]
    fn test_pin_state_response() {
        let report = Report::from_sysex(&MAP, &[0x6E, 13, 0x01, 0x01]).unwrap();
        assert_eq!(
            report,
            Report::PinState {
                pin: PinId(13),
                mode: Some(PinMode::Output),
                value: 1
            }
        );

        let report = Report::from_sysex(&MAP, &[0x6E, 9, 0x03, 0x7F, 0x01]).unwrap();
        assert_eq!(
            report,
            Report::PinState {
                pin: PinId(9),
                mode: Some(PinMode::PwmOutput),
                value: 255
            }
        );
    }

    #[test]
    fn test_pin_state_unknown_mode() {
        let report = Report::from_sysex(&MAP, &[0x6E, 4, 0x0A, 0]).unwrap();
        assert!(matches!(report, Report::PinState { mode: None, .. }));
    }

    #[test]
    fn test_serial_reply() {
        let report = Report::from_sysex(&MAP, &[0x60, 0x40, b'o', 0, b'k', 0]).unwrap();
        match report {
            Report::SerialData { port, data } => {
                assert_eq!(port, 0);
                assert_eq!(&data[..], b"ok");
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn test_serial_non_reply_ignored() {
        assert!(Report::from_sysex(&MAP, &[0x60, 0x20, b'o', 0]).is_none());
    }

    #[test]
    fn test_string_data() {
        let report = Report::from_sysex(&MAP, &[0x71, b'h', 0, b'i', 0]).unwrap();
        match report {
            Report::StringData(text) => assert_eq!(text.as_str(), "hi"),
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn test_firmware_report() {
        let report = Report::from_sysex(&MAP, &[0x79, 2, 6, b'x', 0]).unwrap();
        assert_eq!(report, Report::Version(FirmwareVersion { major: 2, minor: 6 }));
    }

    #[test]
    fn test_unknown_sysex() {
        assert!(Report::from_sysex(&MAP, &[0x42, 1, 2]).is_none());
        assert!(Report::from_sysex(&MAP, &[]).is_none());
    }
}
