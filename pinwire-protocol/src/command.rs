//! Host-to-device commands
//!
//! Every command encodes to exactly one frame. Encoding is deterministic:
//! the same command and opcode map always produce the same bytes.

use heapless::Vec;

use crate::frame::{nibble, pin7, split14, split21, EncodingError, Frame, MAX_PAYLOAD_SIZE, MAX_SERIAL_CHUNK};
use crate::opcodes::OpcodeMap;
use crate::types::{Level, PinId, PinMode};

/// Family of composite actuator sequence run by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceKind {
    /// Expressive pose (happy, sad, confused, ...)
    Gesture,
    /// Dance routine
    Dance,
    /// One-shot action (jump, bend, shake leg, ...)
    Action,
    /// Locomotion (walk, turn, moonwalk, ...)
    Move,
}

impl SequenceKind {
    /// Wire value
    pub fn to_byte(self) -> u8 {
        match self {
            SequenceKind::Gesture => 0x01,
            SequenceKind::Dance => 0x02,
            SequenceKind::Action => 0x03,
            SequenceKind::Move => 0x04,
        }
    }
}

/// Commands sent from the host to the firmware
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command<'a> {
    /// Configure a pin's mode
    SetPinMode { pin: PinId, mode: PinMode },
    /// Drive a digital output
    DigitalWrite { pin: PinId, level: Level },
    /// Write a PWM duty cycle or servo angle
    AnalogWrite { pin: PinId, value: u16 },
    /// Enable or disable periodic sampling of an analog channel
    ReportAnalog { channel: u8, enable: bool },
    /// Enable or disable change reports for a digital port
    ReportDigital { port: u8, enable: bool },
    /// Ask for a single pin state response
    QueryPinState { pin: PinId },
    /// Play a tone on a pin
    Tone {
        pin: PinId,
        frequency_hz: u16,
        duration_ms: u16,
        silence_ms: u16,
    },
    /// Open the firmware's passthrough serial port
    SerialConfig { port: u8, baud: u32 },
    /// Send bytes out of the passthrough serial port
    SerialWrite { port: u8, data: &'a [u8] },
    /// Start continuous forwarding of passthrough serial input
    SerialRead { port: u8 },
    /// Run a composite actuator sequence
    Sequence {
        kind: SequenceKind,
        id: u8,
        steps: u8,
        period_ms: u16,
        amplitude: u8,
    },
    /// Request the protocol version
    ReportVersion,
    /// Reset the firmware to its boot state
    SystemReset,
}

impl<'a> Command<'a> {
    /// Encode this command into a frame
    pub fn to_frame(&self, map: &OpcodeMap) -> Result<Frame, EncodingError> {
        match self {
            Command::SetPinMode { pin, mode } => {
                Frame::fixed(map.set_pin_mode, &[pin7(pin.0)?, map.modes.code(*mode)])
            }
            Command::DigitalWrite { pin, level } => Frame::fixed(
                map.set_digital_pin_value,
                &[pin7(pin.0)?, level.as_u16() as u8],
            ),
            Command::AnalogWrite { pin, value } => {
                let [lsb, msb] = split14(*value)?;
                if pin.0 <= 0x0F {
                    Frame::fixed(map.analog_message | pin.0, &[lsb, msb])
                } else {
                    Frame::sysex(map, map.extended_analog, &[pin7(pin.0)?, lsb, msb])
                }
            }
            Command::ReportAnalog { channel, enable } => Frame::fixed(
                map.report_analog | nibble(*channel)?,
                &[u8::from(*enable)],
            ),
            Command::ReportDigital { port, enable } => Frame::fixed(
                map.report_digital | nibble(*port)?,
                &[u8::from(*enable)],
            ),
            Command::QueryPinState { pin } => {
                Frame::sysex(map, map.pin_state_query, &[pin7(pin.0)?])
            }
            Command::Tone {
                pin,
                frequency_hz,
                duration_ms,
                silence_ms,
            } => {
                let [f0, f1] = split14(*frequency_hz)?;
                let [d0, d1] = split14(*duration_ms)?;
                let [s0, s1] = split14(*silence_ms)?;
                Frame::sysex(map, map.tone, &[pin7(pin.0)?, f0, f1, d0, d1, s0, s1])
            }
            Command::SerialConfig { port, baud } => {
                let [b0, b1, b2] = split21(*baud)?;
                Frame::sysex(
                    map,
                    map.serial_message,
                    &[map.serial_config | nibble(*port)?, b0, b1, b2],
                )
            }
            Command::SerialWrite { port, data } => {
                if data.len() > MAX_SERIAL_CHUNK {
                    return Err(EncodingError::PayloadTooLarge);
                }
                let mut payload = Vec::<u8, MAX_PAYLOAD_SIZE>::new();
                payload
                    .push(map.serial_write | nibble(*port)?)
                    .map_err(|_| EncodingError::PayloadTooLarge)?;
                for &byte in data.iter() {
                    payload
                        .extend_from_slice(&[byte & 0x7F, byte >> 7])
                        .map_err(|_| EncodingError::PayloadTooLarge)?;
                }
                Frame::sysex(map, map.serial_message, &payload)
            }
            Command::SerialRead { port } => Frame::sysex(
                map,
                map.serial_message,
                &[map.serial_read | nibble(*port)?, 0x00],
            ),
            Command::Sequence {
                kind,
                id,
                steps,
                period_ms,
                amplitude,
            } => {
                let [p0, p1] = split14(*period_ms)?;
                if *id > 0x7F {
                    return Err(EncodingError::ValueOutOfRange(u32::from(*id)));
                }
                if *steps > 0x7F {
                    return Err(EncodingError::ValueOutOfRange(u32::from(*steps)));
                }
                if *amplitude > 0x7F {
                    return Err(EncodingError::ValueOutOfRange(u32::from(*amplitude)));
                }
                Frame::sysex(
                    map,
                    map.sequence,
                    &[kind.to_byte(), *id, *steps, p0, p1, *amplitude],
                )
            }
            Command::ReportVersion => Frame::fixed(map.report_version, &[]),
            Command::SystemReset => Frame::fixed(map.system_reset, &[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(cmd: Command<'_>) -> Vec<u8, 128> {
        cmd.to_frame(&OpcodeMap::FIRMATA)
            .unwrap()
            .encode_to_vec()
            .unwrap()
    }

    #[test]
    fn test_set_pin_mode() {
        let encoded = bytes(Command::SetPinMode {
            pin: PinId(13),
            mode: PinMode::Output,
        });
        assert_eq!(&encoded[..], &[0xF4, 13, 0x01]);
    }

    #[test]
    fn test_digital_write() {
        let encoded = bytes(Command::DigitalWrite {
            pin: PinId(13),
            level: Level::High,
        });
        assert_eq!(&encoded[..], &[0xF5, 13, 1]);
    }

    #[test]
    fn test_analog_write_low_pin() {
        let encoded = bytes(Command::AnalogWrite {
            pin: PinId(9),
            value: 200,
        });
        assert_eq!(&encoded[..], &[0xE9, 200 & 0x7F, 1]);
    }

    #[test]
    fn test_analog_write_extended_pin() {
        let encoded = bytes(Command::AnalogWrite {
            pin: PinId(20),
            value: 90,
        });
        assert_eq!(&encoded[..], &[0xF0, 0x6F, 20, 90, 0, 0xF7]);
    }

    #[test]
    fn test_analog_write_value_overflow() {
        let cmd = Command::AnalogWrite {
            pin: PinId(3),
            value: 0x4000,
        };
        assert_eq!(
            cmd.to_frame(&OpcodeMap::FIRMATA),
            Err(EncodingError::ValueOutOfRange(0x4000))
        );
    }

    #[test]
    fn test_pin_out_of_range() {
        let cmd = Command::SetPinMode {
            pin: PinId(200),
            mode: PinMode::Input,
        };
        assert_eq!(
            cmd.to_frame(&OpcodeMap::FIRMATA),
            Err(EncodingError::PinOutOfRange(200))
        );
    }

    #[test]
    fn test_report_requests() {
        assert_eq!(
            &bytes(Command::ReportAnalog {
                channel: 3,
                enable: true
            })[..],
            &[0xC3, 1]
        );
        assert_eq!(
            &bytes(Command::ReportDigital {
                port: 1,
                enable: false
            })[..],
            &[0xD1, 0]
        );
        let cmd = Command::ReportDigital {
            port: 16,
            enable: true,
        };
        assert_eq!(
            cmd.to_frame(&OpcodeMap::FIRMATA),
            Err(EncodingError::NibbleOutOfRange(16))
        );
    }

    #[test]
    fn test_tone_is_single_frame_with_separate_fields() {
        let encoded = bytes(Command::Tone {
            pin: PinId(13),
            frequency_hz: 440,
            duration_ms: 100,
            silence_ms: 50,
        });
        // 440 = 0x03 << 7 | 0x38
        assert_eq!(
            &encoded[..],
            &[0xF0, 0x5F, 13, 0x38, 0x03, 100, 0, 50, 0, 0xF7]
        );
    }

    #[test]
    fn test_serial_config() {
        let encoded = bytes(Command::SerialConfig {
            port: 0,
            baud: 9600,
        });
        // 9600 = 0x2580 -> 0x00, 0x4B, 0x00
        assert_eq!(&encoded[..], &[0xF0, 0x60, 0x10, 0x00, 0x4B, 0x00, 0xF7]);
    }

    #[test]
    fn test_serial_write_splits_bytes() {
        let encoded = bytes(Command::SerialWrite {
            port: 0,
            data: &[b'A', 0xC8],
        });
        assert_eq!(
            &encoded[..],
            &[0xF0, 0x60, 0x20, b'A', 0, 0x48, 0x01, 0xF7]
        );
    }

    #[test]
    fn test_serial_write_chunk_limit() {
        let data = [b'x'; MAX_SERIAL_CHUNK + 1];
        let cmd = Command::SerialWrite { port: 0, data: &data };
        assert_eq!(
            cmd.to_frame(&OpcodeMap::FIRMATA),
            Err(EncodingError::PayloadTooLarge)
        );

        let data = [b'x'; MAX_SERIAL_CHUNK];
        let cmd = Command::SerialWrite { port: 0, data: &data };
        let frame = cmd.to_frame(&OpcodeMap::FIRMATA).unwrap();
        assert_eq!(frame.len(), crate::frame::MAX_FRAME_SIZE);
    }

    #[test]
    fn test_sequence() {
        let encoded = bytes(Command::Sequence {
            kind: SequenceKind::Move,
            id: 1,
            steps: 4,
            period_ms: 1000,
            amplitude: 20,
        });
        // 1000 = 0x07 << 7 | 0x68
        assert_eq!(
            &encoded[..],
            &[0xF0, 0x5E, 0x04, 1, 4, 0x68, 0x07, 20, 0xF7]
        );
    }

    #[test]
    fn test_single_byte_commands() {
        assert_eq!(&bytes(Command::ReportVersion)[..], &[0xF9]);
        assert_eq!(&bytes(Command::SystemReset)[..], &[0xFF]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let cmd = Command::Tone {
            pin: PinId(13),
            frequency_hz: 1000,
            duration_ms: 250,
            silence_ms: 0,
        };
        assert_eq!(bytes(cmd.clone()), bytes(cmd));
    }
}
