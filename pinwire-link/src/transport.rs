//! Transport adapter and receive pump
//!
//! The write half is wrapped in a [`TransportAdapter`] that turns commands
//! into bytes; the read half is drained by a [`Receiver`] that decodes the
//! byte stream and hands reports to a [`ReportSink`] in wire order.

use embedded_io::Error as _;
use embedded_io_async::{Read, Write};

use pinwire_core::TransportError;
use pinwire_protocol::{Command, DecodeEvent, OpcodeMap, Report, ReportDecoder, MAX_FRAME_SIZE};

use pinwire_core::LinkError;

/// Buffer size for one transport read
const RX_BUF_SIZE: usize = 64;

/// Write side of the link
pub struct TransportAdapter<W> {
    writer: Option<W>,
}

impl<W: Write> TransportAdapter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Replace the writer (after a disconnect)
    pub fn attach(&mut self, writer: W) {
        self.writer = Some(writer);
    }

    /// Take the writer out, closing the adapter
    pub fn detach(&mut self) -> Option<W> {
        self.writer.take()
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Write raw bytes and flush
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;

        if let Err(e) = writer.write_all(bytes).await {
            warn!("Transport write failed: {:?}", e.kind());
            return Err(TransportError::WriteFailed);
        }
        if let Err(e) = writer.flush().await {
            warn!("Transport flush failed: {:?}", e.kind());
            return Err(TransportError::WriteFailed);
        }

        trace!("TX: {} bytes", bytes.len());
        Ok(())
    }

    /// Encode a command and write its frame
    pub async fn send(&mut self, map: &OpcodeMap, command: &Command<'_>) -> Result<(), LinkError> {
        let frame = command.to_frame(map)?;
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = frame.encode(&mut buf)?;
        self.write(&buf[..len]).await?;
        Ok(())
    }
}

/// Consumer of decoded reports and link events
pub trait ReportSink {
    /// A report was decoded
    fn on_report(&self, report: &Report);

    /// Unparsable bytes were skipped
    fn on_desync(&self, skipped: usize) {
        let _ = skipped;
    }

    /// A garbage run exceeded the configured bound
    fn on_desync_limit(&self, run: usize) {
        let _ = run;
    }

    /// The byte stream ended or failed
    fn on_disconnect(&self, reason: TransportError);
}

/// Read side of the link
pub struct Receiver<R> {
    reader: R,
    decoder: ReportDecoder,
}

impl<R: Read> Receiver<R> {
    /// `max_desync` bounds a garbage run before the sink is told to escalate
    pub fn new(reader: R, map: OpcodeMap, max_desync: usize) -> Self {
        Self {
            reader,
            decoder: ReportDecoder::new(map, max_desync),
        }
    }

    /// Pump the reader until it ends, feeding every event to `sink`
    ///
    /// Returns the reason the stream stopped, after the sink has seen it.
    pub async fn subscribe<S: ReportSink + ?Sized>(&mut self, sink: &S) -> TransportError {
        let mut buf = [0u8; RX_BUF_SIZE];

        loop {
            let reason = match self.reader.read(&mut buf).await {
                Ok(0) => TransportError::Closed,
                Ok(n) => {
                    trace!("RX: {} bytes", n);
                    self.decoder.feed(&buf[..n], |event| match event {
                        DecodeEvent::Report(report) => sink.on_report(&report),
                        DecodeEvent::Desync { skipped } => sink.on_desync(skipped),
                        DecodeEvent::DesyncLimit { run } => sink.on_desync_limit(run),
                    });
                    continue;
                }
                Err(e) => {
                    warn!("Transport read failed: {:?}", e.kind());
                    TransportError::ReadFailed
                }
            };

            self.decoder.reset();
            sink.on_disconnect(reason);
            return reason;
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::cell::RefCell;
    use std::vec::Vec;

    use embassy_futures::block_on;
    use pinwire_protocol::{FirmwareVersion, PinId, PinMode};

    use super::*;
    use crate::mock::MockPort;

    #[derive(Default)]
    struct Recorder {
        reports: RefCell<Vec<Report>>,
        desync: RefCell<usize>,
        limits: RefCell<usize>,
        disconnect: RefCell<Option<TransportError>>,
    }

    impl ReportSink for Recorder {
        fn on_report(&self, report: &Report) {
            self.reports.borrow_mut().push(report.clone());
        }

        fn on_desync(&self, skipped: usize) {
            *self.desync.borrow_mut() += skipped;
        }

        fn on_desync_limit(&self, _run: usize) {
            *self.limits.borrow_mut() += 1;
        }

        fn on_disconnect(&self, reason: TransportError) {
            *self.disconnect.borrow_mut() = Some(reason);
        }
    }

    #[test]
    fn test_write_and_send() {
        let port = MockPort::new();
        let mut adapter = TransportAdapter::new(port.writer());

        block_on(async {
            adapter.write(&[0xF9]).await.unwrap();
            adapter
                .send(
                    &OpcodeMap::FIRMATA,
                    &Command::SetPinMode {
                        pin: PinId(13),
                        mode: PinMode::Output,
                    },
                )
                .await
                .unwrap();
        });

        assert_eq!(port.take_sent(), [0xF9, 0xF4, 13, 0x01]);
    }

    #[test]
    fn test_write_closed_and_failing() {
        let port = MockPort::new();
        let mut adapter = TransportAdapter::new(port.writer());

        port.fail_writes(true);
        assert_eq!(
            block_on(adapter.write(&[0xFF])),
            Err(TransportError::WriteFailed)
        );

        assert!(adapter.detach().is_some());
        assert!(!adapter.is_open());
        assert_eq!(block_on(adapter.write(&[0xFF])), Err(TransportError::Closed));
    }

    #[test]
    fn test_encoding_error_sends_nothing() {
        let port = MockPort::new();
        let mut adapter = TransportAdapter::new(port.writer());
        let command = Command::ReportDigital {
            port: 16,
            enable: true,
        };

        let result = block_on(adapter.send(&OpcodeMap::FIRMATA, &command));
        assert!(matches!(result, Err(LinkError::Encoding(_))));
        assert!(port.take_sent().is_empty());
    }

    #[test]
    fn test_receiver_delivers_in_order_then_disconnects() {
        let port = MockPort::new();
        let recorder = Recorder::default();
        let mut receiver = Receiver::new(port.reader(), OpcodeMap::FIRMATA, 16);

        // Version split across two deliveries, garbage, analog report
        port.inject(&[0xF9, 2]);
        port.inject(&[5, 0x12, 0x34, 0xE0, 0x10, 0x01]);
        port.close();

        let reason = block_on(receiver.subscribe(&recorder));
        assert_eq!(reason, TransportError::Closed);
        assert_eq!(
            *recorder.reports.borrow(),
            [
                Report::Version(FirmwareVersion { major: 2, minor: 5 }),
                Report::Analog {
                    channel: 0,
                    value: 0x90
                },
            ]
        );
        assert_eq!(*recorder.desync.borrow(), 2);
        assert_eq!(*recorder.limits.borrow(), 0);
        assert_eq!(*recorder.disconnect.borrow(), Some(TransportError::Closed));
    }

    #[test]
    fn test_receiver_escalates_long_garbage() {
        let port = MockPort::new();
        let recorder = Recorder::default();
        let mut receiver = Receiver::new(port.reader(), OpcodeMap::FIRMATA, 4);

        port.inject(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        port.close();

        block_on(receiver.subscribe(&recorder));
        assert_eq!(*recorder.limits.borrow(), 1);
        assert!(recorder.reports.borrow().is_empty());
    }
}
