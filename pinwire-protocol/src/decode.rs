//! Report decoding with partial-frame buffering and resynchronization
//!
//! [`decode`] is a pure function over a byte slice: it looks at the front of
//! the slice and says how many bytes form the next unit (a report, an
//! uninterpreted frame, or garbage), or that more bytes are needed.
//!
//! [`ReportDecoder`] wraps it for a byte stream that arrives in arbitrary
//! pieces. Incomplete frames stay buffered across calls; garbage runs are
//! skipped up to the next recognizable frame start and reported as desync
//! events.

use heapless::Vec;

use crate::frame::MAX_FRAME_SIZE;
use crate::opcodes::OpcodeMap;
use crate::report::Report;

/// Receive buffer capacity: one partial frame plus one fresh chunk
pub const DECODER_BUFFER_SIZE: usize = 2 * MAX_FRAME_SIZE;

/// Result of looking at the front of a byte slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete report; `consumed` bytes belong to it
    Report { report: Report, consumed: usize },
    /// A well-formed frame this layer does not interpret
    Ignored(usize),
    /// Leading bytes that cannot start a frame, or a truncated frame
    Garbage(usize),
    /// The bytes so far are a valid frame prefix; nothing consumed
    Incomplete,
}

/// Decode the next unit from the front of `bytes`
pub fn decode(map: &OpcodeMap, bytes: &[u8]) -> Decoded {
    let Some(&first) = bytes.first() else {
        return Decoded::Incomplete;
    };

    if !map.is_report_start(first) {
        // Skip forward to the next byte that can start a frame
        let run = bytes
            .iter()
            .position(|&b| map.is_report_start(b))
            .unwrap_or(bytes.len());
        return Decoded::Garbage(run);
    }

    if first == map.start_sysex {
        return decode_sysex(map, bytes);
    }

    let Some(len) = map.fixed_frame_len(first) else {
        return Decoded::Garbage(1);
    };

    // A command byte inside the data means the frame was cut short
    if let Some(pos) = bytes[1..bytes.len().min(len)]
        .iter()
        .position(|&b| b & 0x80 != 0)
    {
        return Decoded::Garbage(pos + 1);
    }

    if bytes.len() < len {
        return Decoded::Incomplete;
    }

    let frame = [bytes[0], bytes[1], bytes[2]];
    match Report::from_fixed(map, &frame) {
        Some(report) => Decoded::Report {
            report,
            consumed: len,
        },
        None => Decoded::Ignored(len),
    }
}

fn decode_sysex(map: &OpcodeMap, bytes: &[u8]) -> Decoded {
    for (i, &b) in bytes.iter().enumerate().skip(1) {
        if i >= MAX_FRAME_SIZE {
            // Oversized: drop the start byte and look for the next frame
            return Decoded::Garbage(1);
        }
        if b == map.end_sysex {
            let consumed = i + 1;
            return match Report::from_sysex(map, &bytes[1..i]) {
                Some(report) => Decoded::Report { report, consumed },
                None => Decoded::Ignored(consumed),
            };
        }
        if b & 0x80 != 0 {
            // Another command started before the terminator
            return Decoded::Garbage(i);
        }
    }
    Decoded::Incomplete
}

/// Events produced while feeding bytes to a [`ReportDecoder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A decoded report, in wire order
    Report(Report),
    /// A run of unparsable bytes was skipped
    Desync { skipped: usize },
    /// Consecutive garbage since the last good frame exceeded the limit
    DesyncLimit { run: usize },
}

/// Streaming decoder for device-to-host bytes
#[derive(Debug, Clone)]
pub struct ReportDecoder {
    map: OpcodeMap,
    buffer: Vec<u8, DECODER_BUFFER_SIZE>,
    /// Garbage bytes skipped since the last good frame
    desync_run: usize,
    max_desync: usize,
}

impl ReportDecoder {
    /// Create a decoder; `max_desync` bounds a garbage run before escalation
    pub fn new(map: OpcodeMap, max_desync: usize) -> Self {
        Self {
            map,
            buffer: Vec::new(),
            desync_run: 0,
            max_desync,
        }
    }

    /// Drop buffered bytes and desync accounting
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.desync_run = 0;
    }

    /// Number of bytes waiting for the rest of their frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed received bytes, calling `on_event` for each event in order
    pub fn feed<F: FnMut(DecodeEvent)>(&mut self, mut bytes: &[u8], mut on_event: F) {
        while !bytes.is_empty() {
            let room = self.buffer.capacity() - self.buffer.len();
            let take = room.min(bytes.len());
            // Cannot fail: `take` fits the remaining capacity
            let _ = self.buffer.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            self.drain(&mut on_event);
        }
    }

    fn drain<F: FnMut(DecodeEvent)>(&mut self, on_event: &mut F) {
        let mut start = 0;
        loop {
            match decode(&self.map, &self.buffer[start..]) {
                Decoded::Report { report, consumed } => {
                    start += consumed;
                    self.desync_run = 0;
                    on_event(DecodeEvent::Report(report));
                }
                Decoded::Ignored(consumed) => {
                    start += consumed;
                    self.desync_run = 0;
                }
                Decoded::Garbage(skipped) => {
                    start += skipped;
                    self.desync_run += skipped;
                    on_event(DecodeEvent::Desync { skipped });
                    if self.desync_run > self.max_desync {
                        on_event(DecodeEvent::DesyncLimit {
                            run: self.desync_run,
                        });
                        self.desync_run = 0;
                    }
                }
                Decoded::Incomplete => break,
            }
        }

        // Keep the unconsumed tail at the front of the buffer
        let remaining = self.buffer.len() - start;
        self.buffer.copy_within(start.., 0);
        self.buffer.truncate(remaining);
    }
}
