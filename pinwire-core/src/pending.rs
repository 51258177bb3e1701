//! Registry of reads waiting on a device report
//!
//! Each registered read owns a slot index. The runtime pairs every slot with
//! a completion signal; this registry only decides which slots a report
//! resolves. An entry stays in its slot after resolution until the waiter
//! releases it, so a slot is never reused while its signal may still fire.

use heapless::Vec;
use pinwire_protocol::{FirmwareVersion, PinId};

use crate::error::LinkError;

/// Maximum number of reads awaiting a report at the same time
pub const MAX_PENDING_READS: usize = 8;

/// Which kind of report completes a pin read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadKind {
    Digital,
    Analog,
}

/// What a pending read is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadTarget {
    Pin { pin: PinId, kind: ReadKind },
    Version,
}

/// Value delivered to a waiting read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadValue {
    Pin(u16),
    Version(FirmwareVersion),
}

/// Result handed to a waiting read
pub type ReadOutcome = Result<ReadValue, LinkError>;

/// Slots completed by one cache operation, with their outcome
pub type Resolutions = Vec<(usize, ReadOutcome), MAX_PENDING_READS>;

/// One outstanding read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingRead {
    pub slot: usize,
    pub target: ReadTarget,
    /// Registration time (ms)
    pub requested_at: u64,
    /// Deadline (ms)
    pub timeout_at: u64,
    resolved: bool,
}

/// Fixed-capacity set of pending reads
#[derive(Debug, Default)]
pub struct PendingReads {
    entries: Vec<PendingRead, MAX_PENDING_READS>,
}

impl PendingReads {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a read, picking the lowest free slot
    pub fn register(
        &mut self,
        target: ReadTarget,
        now_ms: u64,
        timeout_ms: u32,
    ) -> Result<PendingRead, LinkError> {
        let slot = (0..MAX_PENDING_READS)
            .find(|s| !self.entries.iter().any(|e| e.slot == *s))
            .ok_or(LinkError::Busy)?;

        let entry = PendingRead {
            slot,
            target,
            requested_at: now_ms,
            timeout_at: now_ms.saturating_add(u64::from(timeout_ms)),
            resolved: false,
        };
        self.entries.push(entry).map_err(|_| LinkError::Busy)?;
        Ok(entry)
    }

    /// Free a slot (after completion, timeout or cancellation)
    pub fn release(&mut self, slot: usize) {
        self.entries.retain(|e| e.slot != slot);
    }

    /// Resolve every unresolved read whose target matches
    pub fn resolve(&mut self, target: ReadTarget, value: ReadValue, out: &mut Resolutions) {
        for entry in self.entries.iter_mut() {
            if !entry.resolved && entry.target == target {
                entry.resolved = true;
                // Capacity equals the slot count, so this cannot overflow
                let _ = out.push((entry.slot, Ok(value)));
            }
        }
    }

    /// Fail every unresolved read
    pub fn fail_all(&mut self, error: LinkError, out: &mut Resolutions) {
        for entry in self.entries.iter_mut() {
            if !entry.resolved {
                entry.resolved = true;
                let _ = out.push((entry.slot, Err(error)));
            }
        }
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads still waiting for an outcome
    pub fn waiting(&self) -> impl Iterator<Item = &PendingRead> {
        self.entries.iter().filter(|e| !e.resolved)
    }

    /// Check whether a waiting read targets this pin
    pub fn is_waiting_on(&self, target: ReadTarget) -> bool {
        self.waiting().any(|e| e.target == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D7: ReadTarget = ReadTarget::Pin {
        pin: PinId(7),
        kind: ReadKind::Digital,
    };

    #[test]
    fn test_register_and_release() {
        let mut reads = PendingReads::new();
        let a = reads.register(D7, 100, 1000).unwrap();
        let b = reads.register(ReadTarget::Version, 100, 1000).unwrap();
        assert_eq!(a.slot, 0);
        assert_eq!(b.slot, 1);
        assert_eq!(a.timeout_at, 1100);

        reads.release(0);
        let c = reads.register(D7, 200, 1000).unwrap();
        assert_eq!(c.slot, 0);
        assert_eq!(reads.len(), 2);
    }

    #[test]
    fn test_busy_when_full() {
        let mut reads = PendingReads::new();
        for _ in 0..MAX_PENDING_READS {
            reads.register(D7, 0, 10).unwrap();
        }
        assert_eq!(reads.register(D7, 0, 10), Err(LinkError::Busy));
    }

    #[test]
    fn test_resolve_matching_only_once() {
        let mut reads = PendingReads::new();
        reads.register(D7, 0, 10).unwrap();
        reads.register(ReadTarget::Version, 0, 10).unwrap();

        let mut out = Resolutions::new();
        reads.resolve(D7, ReadValue::Pin(1), &mut out);
        assert_eq!(&out[..], &[(0, Ok(ReadValue::Pin(1)))]);

        // Resolved entries keep their slot but are not resolved again
        out.clear();
        reads.resolve(D7, ReadValue::Pin(0), &mut out);
        assert!(out.is_empty());
        assert_eq!(reads.len(), 2);
        assert!(!reads.is_waiting_on(D7));
        assert!(reads.is_waiting_on(ReadTarget::Version));
    }

    #[test]
    fn test_fail_all() {
        let mut reads = PendingReads::new();
        reads.register(D7, 0, 10).unwrap();
        reads.register(ReadTarget::Version, 0, 10).unwrap();

        let mut out = Resolutions::new();
        reads.fail_all(LinkError::ConnectionLost, &mut out);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(_, r)| *r == Err(LinkError::ConnectionLost)));
        assert_eq!(reads.waiting().count(), 0);
    }
}
