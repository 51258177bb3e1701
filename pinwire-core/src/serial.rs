//! Receive buffer for the passthrough serial port

use heapless::{Deque, Vec};

/// Capacity of the passthrough receive buffer
pub const SERIAL_RX_CAPACITY: usize = 256;

/// FIFO of bytes streamed back by the firmware
///
/// Bytes are only appended at the back and drained from the front. When the
/// buffer is full, new bytes are dropped.
#[derive(Debug, Default)]
pub struct SerialRxBuffer {
    queue: Deque<u8, SERIAL_RX_CAPACITY>,
}

impl SerialRxBuffer {
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
        }
    }

    /// Append bytes, returning how many were dropped for lack of space
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let mut dropped = 0;
        for &byte in bytes {
            if self.queue.push_back(byte).is_err() {
                dropped += 1;
            }
        }
        dropped
    }

    /// Bytes ready to be read
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain up to `max` bytes in arrival order
    pub fn drain(&mut self, max: usize) -> Vec<u8, SERIAL_RX_CAPACITY> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.queue.pop_front() {
                // `out` is bounded by the queue capacity
                Some(byte) => {
                    let _ = out.push(byte);
                }
                None => break,
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fifo_order() {
        let mut buf = SerialRxBuffer::new();
        buf.append(b"hello");
        buf.append(b" world");
        assert_eq!(buf.len(), 11);
        assert_eq!(&buf.drain(5)[..], b"hello");
        assert_eq!(&buf.drain(SERIAL_RX_CAPACITY)[..], b" world");
        assert!(buf.drain(SERIAL_RX_CAPACITY).is_empty());
    }

    #[test]
    fn test_overflow_drops_new_bytes() {
        let mut buf = SerialRxBuffer::new();
        buf.append(&[1u8; SERIAL_RX_CAPACITY - 2]);
        let dropped = buf.append(&[2, 3, 4, 5]);
        assert_eq!(dropped, 2);

        let all = buf.drain(SERIAL_RX_CAPACITY);
        assert_eq!(all.len(), SERIAL_RX_CAPACITY);
        assert_eq!(&all[SERIAL_RX_CAPACITY - 2..], &[2, 3]);
    }

    proptest! {
        #[test]
        fn prop_chunked_appends_drain_in_order(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..40), 0..6),
            take in 0usize..300,
        ) {
            let mut buf = SerialRxBuffer::new();
            let mut expected: std::vec::Vec<u8> = std::vec::Vec::new();
            for chunk in &chunks {
                buf.append(chunk);
                expected.extend_from_slice(chunk);
            }
            let first = buf.drain(take);
            let rest = buf.drain(SERIAL_RX_CAPACITY);
            let split = take.min(expected.len());
            prop_assert_eq!(&first[..], &expected[..split]);
            prop_assert_eq!(&rest[..], &expected[split..]);
        }
    }
}
