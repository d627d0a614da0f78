//! # Input Side
//!
//! [`pump`] cuts a byte stream into [`Message`]s on the hand-off queue.
//! [`StopSignal`] collects the first reason to stop the bridge, whether
//! that is end of input, a read error or an interrupt, so the main thread
//! never has to sit in a blocking read.

use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::message::Message;
use crate::queue::HandoffQueue;

/// Why the bridge is stopping.
#[derive(Debug)]
pub enum StopCause {
    /// The input reached end of file; `bytes` were queued in total.
    Eof { bytes: u64 },
    /// The queue was shut down while input was still flowing.
    QueueClosed { bytes: u64 },
    /// Ctrl-C or an equivalent external request.
    Interrupted,
    /// Reading the input failed.
    ReadFailed(io::Error),
}

/// Reads `reader` until EOF, pushing chunks of at most `max_payload` bytes.
pub fn pump<R: Read>(
    mut reader: R,
    queue: &HandoffQueue<Message>,
    max_payload: usize,
) -> StopCause {
    let mut buf = vec![0u8; max_payload.max(1)];
    let mut bytes = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return StopCause::Eof { bytes },
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return StopCause::ReadFailed(e),
        };
        if queue
            .push(Message::new(Bytes::copy_from_slice(&buf[..n])))
            .is_err()
        {
            return StopCause::QueueClosed { bytes };
        }
        bytes += n as u64;
    }
}

/// Runs [`pump`] on a named thread and reports its outcome to `notifier`.
///
/// The thread is not joined by anyone: it may stay blocked in `read` after
/// the bridge has decided to stop.
pub fn spawn_producer<R>(
    reader: R,
    queue: Arc<HandoffQueue<Message>>,
    max_payload: usize,
    notifier: StopNotifier,
) -> io::Result<thread::JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("wfb-producer".into())
        .spawn(move || {
            let cause = pump(reader, &queue, max_payload);
            debug!(?cause, "producer finished");
            notifier.notify(cause);
        })
}

// ─── Stop Signal ────────────────────────────────────────────────────────────

/// First-reason-wins stop latch shared by the producer and signal handlers.
pub struct StopSignal {
    tx: Sender<StopCause>,
    rx: Receiver<StopCause>,
}

/// Sending half of a [`StopSignal`]; cheap to clone into handlers.
#[derive(Clone)]
pub struct StopNotifier(Sender<StopCause>);

impl StopNotifier {
    /// Never blocks; causes beyond the first few are dropped.
    pub fn notify(&self, cause: StopCause) {
        let _ = self.0.try_send(cause);
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(4);
        Self { tx, rx }
    }

    pub fn notifier(&self) -> StopNotifier {
        StopNotifier(self.tx.clone())
    }

    /// Blocks until the first stop cause arrives.
    pub fn wait(&self) -> StopCause {
        // `self.tx` keeps the channel connected, so this only returns a cause.
        self.rx.recv().unwrap_or(StopCause::Interrupted)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<StopCause> {
        self.rx.recv_timeout(timeout).ok()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Instant;

    /// Yields chunks from a channel; blocks while the channel is empty and
    /// reports EOF once every sender is gone.
    struct ChannelReader(Receiver<Vec<u8>>);

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn pump_splits_input_by_max_payload() {
        let queue = HandoffQueue::new();
        let input = vec![7u8; 2500];
        let cause = pump(Cursor::new(input), &queue, 1000);
        assert!(matches!(cause, StopCause::Eof { bytes: 2500 }));

        let lens: Vec<usize> = (0..3).map(|_| queue.pop().unwrap().len()).collect();
        assert_eq!(lens, vec![1000, 1000, 500]);
        assert!(queue.is_empty());
    }

    #[test]
    fn pump_empty_input_is_eof() {
        let queue = HandoffQueue::new();
        assert!(matches!(
            pump(Cursor::new(Vec::new()), &queue, 1400),
            StopCause::Eof { bytes: 0 }
        ));
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn pump_stops_when_queue_is_shut_down() {
        let queue = HandoffQueue::new();
        queue.shutdown();
        let cause = pump(Cursor::new(vec![1u8; 10]), &queue, 4);
        assert!(matches!(cause, StopCause::QueueClosed { bytes: 0 }));
    }

    #[test]
    fn pump_reports_read_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }
        let queue = HandoffQueue::new();
        match pump(Broken, &queue, 16) {
            StopCause::ReadFailed(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn producer_eof_wakes_waiter() {
        let queue = Arc::new(HandoffQueue::new());
        let stop = StopSignal::new();
        let producer =
            spawn_producer(Cursor::new(b"hello".to_vec()), queue.clone(), 64, stop.notifier())
                .unwrap();

        let cause = stop.wait_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(cause, StopCause::Eof { bytes: 5 }));
        producer.join().unwrap();
        assert_eq!(queue.pop().unwrap().data(), &Bytes::from_static(b"hello"));
    }

    #[test]
    fn interrupt_wins_over_idle_input() {
        let queue = Arc::new(HandoffQueue::new());
        let stop = StopSignal::new();
        let (input_tx, input_rx) = bounded::<Vec<u8>>(0);
        let producer =
            spawn_producer(ChannelReader(input_rx), queue.clone(), 64, stop.notifier()).unwrap();

        // Input stays open but silent; only the interrupt can end the wait.
        assert!(stop.wait_timeout(Duration::from_millis(50)).is_none());
        let notifier = stop.notifier();
        let start = Instant::now();
        thread::spawn(move || notifier.notify(StopCause::Interrupted));
        let cause = stop.wait();
        assert!(matches!(cause, StopCause::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(1));

        drop(input_tx);
        producer.join().unwrap();
        assert!(queue.is_empty());
    }
}
