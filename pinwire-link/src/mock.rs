//! In-memory duplex transport for tests
//!
//! Host writes are recorded; device bytes are injected into a pipe that the
//! host reader drains. Closing the port makes the reader return end-of-stream
//! once the pipe is empty.

extern crate std;

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use std::vec::Vec;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::pipe::Pipe;
use embassy_sync::signal::Signal;
use embedded_io::ErrorKind;
use embedded_io_async::{ErrorType, Read, Write};

const PIPE_SIZE: usize = 1024;

pub struct MockPort {
    from_device: Pipe<CriticalSectionRawMutex, PIPE_SIZE>,
    sent: BlockingMutex<CriticalSectionRawMutex, RefCell<Vec<u8>>>,
    closed: AtomicBool,
    close_signal: Signal<CriticalSectionRawMutex, ()>,
    fail_writes: AtomicBool,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            from_device: Pipe::new(),
            sent: BlockingMutex::new(RefCell::new(Vec::new())),
            closed: AtomicBool::new(false),
            close_signal: Signal::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn writer(&self) -> MockWriter<'_> {
        MockWriter(self)
    }

    pub fn reader(&self) -> MockReader<'_> {
        MockReader(self)
    }

    /// Bytes the host wrote since the last call
    pub fn take_sent(&self) -> Vec<u8> {
        self.sent.lock(|sent| core::mem::take(&mut *sent.borrow_mut()))
    }

    /// Queue bytes as if the device had sent them
    pub fn inject(&self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            match self.from_device.try_write(rest) {
                Ok(n) => rest = &rest[n..],
                Err(_) => panic!("mock pipe full"),
            }
        }
    }

    /// End the device-to-host stream
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_signal.signal(());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

pub struct MockWriter<'a>(&'a MockPort);

impl ErrorType for MockWriter<'_> {
    type Error = ErrorKind;
}

impl Write for MockWriter<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.0.fail_writes.load(Ordering::SeqCst) {
            return Err(ErrorKind::BrokenPipe);
        }
        self.0
            .sent
            .lock(|sent| sent.borrow_mut().extend_from_slice(buf));
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub struct MockReader<'a>(&'a MockPort);

impl ErrorType for MockReader<'_> {
    type Error = ErrorKind;
}

impl Read for MockReader<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if let Ok(n) = self.0.from_device.try_read(buf) {
            return Ok(n);
        }
        if self.0.closed.load(Ordering::SeqCst) {
            return Ok(0);
        }
        match select(self.0.from_device.read(buf), self.0.close_signal.wait()).await {
            Either::First(n) => Ok(n),
            Either::Second(()) => Ok(0),
        }
    }
}
