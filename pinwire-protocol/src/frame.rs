//! Frame construction and 7-bit field packing
//!
//! Frame layout:
//! - OPCODE (1 byte): command byte, high bit set
//! - PAYLOAD (0-126 bytes): 7-bit data bytes; for sysex frames the first
//!   payload byte is the sysex identifier
//! - TERMINATOR (0-1 byte): end-of-sysex marker, sysex frames only

use heapless::Vec;

use crate::opcodes::OpcodeMap;

/// Maximum complete frame size in bytes
pub const MAX_FRAME_SIZE: usize = 128;

/// Maximum payload size (frame minus opcode and terminator)
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - 2;

/// Maximum raw bytes carried by one serial passthrough frame
///
/// Each byte travels as two 7-bit halves after the sysex id and the
/// sub-command byte.
pub const MAX_SERIAL_CHUNK: usize = (MAX_PAYLOAD_SIZE - 2) / 2;

/// Largest value a two-byte (14-bit) field can carry
pub const MAX_U14: u16 = 0x3FFF;

/// Errors raised while turning a command into bytes
///
/// These describe wire-format limits only. Whether a pin supports a mode or
/// a value is legal for a mode is decided before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodingError {
    /// Pin number does not fit a 7-bit field
    PinOutOfRange(u8),
    /// Port or channel number does not fit the command nibble
    NibbleOutOfRange(u8),
    /// Value does not fit its field
    ValueOutOfRange(u32),
    /// Payload exceeds the maximum frame size
    PayloadTooLarge,
    /// Payload byte has the high bit set
    InvalidDataByte(u8),
    /// Output buffer too small for the encoded frame
    BufferTooSmall,
}

/// One complete protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command byte (or start-of-sysex)
    pub opcode: u8,
    /// Data bytes, all below 0x80
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
    /// End-of-sysex marker for sysex frames
    pub terminator: Option<u8>,
}

impl Frame {
    /// Create a fixed frame (command byte followed by data bytes)
    pub fn fixed(opcode: u8, data: &[u8]) -> Result<Self, EncodingError> {
        Ok(Self {
            opcode,
            payload: collect_data(data)?,
            terminator: None,
        })
    }

    /// Create a sysex frame with the given identifier and payload
    pub fn sysex(map: &OpcodeMap, id: u8, data: &[u8]) -> Result<Self, EncodingError> {
        let mut payload = Vec::new();
        payload.push(data7(id)?).map_err(|_| EncodingError::PayloadTooLarge)?;
        for &byte in data {
            payload
                .push(data7(byte)?)
                .map_err(|_| EncodingError::PayloadTooLarge)?;
        }
        Ok(Self {
            opcode: map.start_sysex,
            payload,
            terminator: Some(map.end_sysex),
        })
    }

    /// Total encoded length in bytes
    pub fn len(&self) -> usize {
        1 + self.payload.len() + usize::from(self.terminator.is_some())
    }

    /// Frames always carry at least the opcode byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Encode this frame into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, EncodingError> {
        let frame_len = self.len();
        if buffer.len() < frame_len {
            return Err(EncodingError::BufferTooSmall);
        }

        buffer[0] = self.opcode;
        buffer[1..1 + self.payload.len()].copy_from_slice(&self.payload);
        if let Some(end) = self.terminator {
            buffer[1 + self.payload.len()] = end;
        }

        Ok(frame_len)
    }

    /// Encode this frame into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, EncodingError> {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = self.encode(&mut buffer)?;
        let mut vec = Vec::new();
        vec.extend_from_slice(&buffer[..len])
            .map_err(|_| EncodingError::BufferTooSmall)?;
        Ok(vec)
    }
}

fn collect_data(data: &[u8]) -> Result<Vec<u8, MAX_PAYLOAD_SIZE>, EncodingError> {
    let mut payload = Vec::new();
    for &byte in data {
        payload
            .push(data7(byte)?)
            .map_err(|_| EncodingError::PayloadTooLarge)?;
    }
    Ok(payload)
}

/// Check that a byte fits a 7-bit data field
pub fn data7(byte: u8) -> Result<u8, EncodingError> {
    if byte & 0x80 != 0 {
        return Err(EncodingError::InvalidDataByte(byte));
    }
    Ok(byte)
}

/// Check that a pin number fits a 7-bit field
pub fn pin7(pin: u8) -> Result<u8, EncodingError> {
    if pin & 0x80 != 0 {
        return Err(EncodingError::PinOutOfRange(pin));
    }
    Ok(pin)
}

/// Check that a port/channel fits the low nibble of a command byte
pub fn nibble(value: u8) -> Result<u8, EncodingError> {
    if value > 0x0F {
        return Err(EncodingError::NibbleOutOfRange(value));
    }
    Ok(value)
}

/// Split a 14-bit value into (LSB, MSB) 7-bit halves
pub fn split14(value: u16) -> Result<[u8; 2], EncodingError> {
    if value > MAX_U14 {
        return Err(EncodingError::ValueOutOfRange(u32::from(value)));
    }
    Ok([(value & 0x7F) as u8, (value >> 7) as u8])
}

/// Join (LSB, MSB) 7-bit halves into a 14-bit value
pub fn join14(lsb: u8, msb: u8) -> u16 {
    u16::from(lsb & 0x7F) | (u16::from(msb & 0x7F) << 7)
}

/// Split a 21-bit value into three 7-bit groups, LSB first
pub fn split21(value: u32) -> Result<[u8; 3], EncodingError> {
    if value > 0x1F_FFFF {
        return Err(EncodingError::ValueOutOfRange(value));
    }
    Ok([
        (value & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
    ])
}

/// Unpack 7-bit pairs (LSB, MSB) into bytes
///
/// A trailing unpaired byte is ignored.
pub fn unpack_pairs<const N: usize>(data: &[u8]) -> Vec<u8, N> {
    let mut out = Vec::new();
    for pair in data.chunks_exact(2) {
        if out.push((pair[0] & 0x7F) | (pair[1] << 7)).is_err() {
            break;
        }
    }
    out
}
