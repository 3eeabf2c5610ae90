use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::{info, warn};
use tokio::sync::mpsc;

use super::cancel::CancelChannel;
use super::config::{self, LinkSettings};
use super::data::{LinkEvent, LinkSink};
use super::fd::{Descriptor, Flush};
use super::{reader, write};
use crate::error::{Result, SerialError};

/// serial link with a background reader
///
/// Received bytes are pushed to the [`LinkSink`] from a dedicated thread;
/// writes run on the caller's thread. All methods take `&self`, so one link
/// can be shared between threads; concurrent [`write_all`](Self::write_all)
/// calls are serialized.
///
/// Lock order is `session` then `transmit`. Writers only take `transmit`.
pub struct SerialLink {
    sink: Arc<dyn LinkSink>,
    session: Mutex<Option<Session>>,
    transmit: Mutex<Option<Transmit>>,
    connected: Arc<AtomicBool>,
}

/// one open device and the reader attached to it
struct Session {
    settings: LinkSettings,
    device: Arc<Descriptor<Flush>>,
    cancel: Arc<CancelChannel>,
    reader: JoinHandle<()>,
}

/// what a writer needs from the current session
struct Transmit {
    device: Arc<Descriptor<Flush>>,
    cancel: Arc<CancelChannel>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// serial link implementation
impl SerialLink {
    /// closed link delivering to `sink`
    pub fn new(sink: impl LinkSink) -> Self {
        SerialLink {
            sink: Arc::new(sink),
            session: Mutex::new(None),
            transmit: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// closed link delivering into an unbounded channel
    pub fn with_channel() -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SerialLink::new(tx), rx)
    }

    /// Opens `path` at `baud` and starts the reader.
    ///
    /// An already open link is fully closed first. On error the link is
    /// closed, holds no descriptor and has no reader.
    pub fn open(&self, path: &str, baud: u32) -> Result<()> {
        let mut session = lock(&self.session);
        if let Some(previous) = session.take() {
            self.shutdown(previous);
        }

        let device = Arc::new(config::configure(path, baud)?);
        let cancel = Arc::new(CancelChannel::new()?);

        // Set before spawning so an immediate device failure can clear it.
        self.connected.store(true, Ordering::Release);
        let reader = reader::spawn(
            format!("serial-rx {path}"),
            Arc::clone(&device),
            Arc::clone(&cancel),
            Arc::clone(&self.sink),
            Arc::clone(&self.connected),
        )
        .inspect_err(|_| self.connected.store(false, Ordering::Release))?;

        *lock(&self.transmit) = Some(Transmit {
            device: Arc::clone(&device),
            cancel: Arc::clone(&cancel),
        });
        info!("opened serial link {path} at {baud} baud");
        *session = Some(Session {
            settings: LinkSettings::new(path, baud),
            device,
            cancel,
            reader,
        });
        Ok(())
    }

    /// Opens the link described by `settings`.
    pub fn open_settings(&self, settings: &LinkSettings) -> Result<()> {
        self.open(&settings.port_name, settings.baud_rate)
    }

    /// Stops the reader, waits for it, then flushes and closes the device.
    /// Does nothing on a closed link.
    ///
    /// A write blocked on a full output queue is interrupted and fails. A
    /// write already waiting for the final drain finishes first.
    pub fn close(&self) {
        if let Some(session) = lock(&self.session).take() {
            self.shutdown(session);
        }
    }

    /// Whether the link is open and its reader is alive.
    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// settings of the current session
    pub fn settings(&self) -> Option<LinkSettings> {
        lock(&self.session)
            .as_ref()
            .map(|session| session.settings.clone())
    }

    /// Transmits all of `data` and waits until it has left the device.
    ///
    /// Fails with [`SerialError::NotOpen`] when no session exists or the
    /// session is being closed. After any other error an unknown prefix of
    /// `data` may have been sent.
    pub fn write_all(&self, data: &[u8]) -> Result<usize> {
        let transmit = lock(&self.transmit);
        match transmit.as_ref() {
            Some(transmit) if !transmit.cancel.is_cancelled() => {
                write::write_all(transmit.device.as_fd(), data, Some(&transmit.cancel))
            }
            _ => Err(SerialError::NotOpen),
        }
    }

    fn shutdown(&self, session: Session) {
        let Session {
            settings,
            device,
            cancel,
            reader,
        } = session;

        // Signal first: a pending writer wakes up and gives back the lock.
        cancel.cancel();
        drop(lock(&self.transmit).take());

        if reader.join().is_err() {
            warn!("serial reader for {} panicked", settings.port_name);
        }
        self.connected.store(false, Ordering::Release);

        // The reader and the writer slot held the only other references.
        match Arc::try_unwrap(device) {
            Ok(device) => device.release(),
            Err(_) => warn!("serial device {} still shared at close", settings.port_name),
        }
        info!("closed serial link {}", settings.port_name);
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::data::{DisconnectReason, MockLinkSink};
    use crate::serial::test_support::{PtyPair, collect_data, next_event};
    use std::thread;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_open_close_lifecycle() {
        let pty = PtyPair::new();
        let (link, _rx) = SerialLink::with_channel();
        assert!(!link.is_open());
        assert!(link.settings().is_none());

        link.open(&pty.path, 115200).unwrap();
        assert!(link.is_open());
        assert_eq!(link.settings(), Some(LinkSettings::new(&pty.path, 115200)));
        assert!(!pty.slave_closed(Duration::ZERO));

        link.close();
        assert!(!link.is_open());
        assert!(link.settings().is_none());
        assert!(pty.slave_closed(WAIT));
    }

    #[test]
    fn test_repeated_open_close_releases_device() {
        let pty = PtyPair::new();
        let (link, _rx) = SerialLink::with_channel();
        for baud in [9600, 57600, 115200, 230400] {
            for _ in 0..5 {
                link.open(&pty.path, baud).unwrap();
                assert!(link.is_open());
                link.close();
                assert!(!link.is_open());
                assert!(pty.slave_closed(WAIT));
            }
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let pty = PtyPair::new();
        let (link, _rx) = SerialLink::with_channel();
        link.close();
        link.open(&pty.path, 9600).unwrap();
        link.close();
        link.close();
        assert!(!link.is_open());
    }

    #[test]
    fn test_open_unsupported_baud_leaves_link_closed() {
        // No expectations: any sink call fails the test.
        let link = SerialLink::new(MockLinkSink::new());
        match link.open("/nonexistent/serial/device", 12345) {
            Err(SerialError::UnsupportedBaudRate(12345)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!link.is_open());
        assert!(link.settings().is_none());
    }

    #[test]
    fn test_failed_reopen_closes_previous_session() {
        let pty = PtyPair::new();
        let (link, _rx) = SerialLink::with_channel();
        link.open(&pty.path, 115200).unwrap();

        assert!(link.open(&pty.path, 31337).is_err());
        assert!(!link.is_open());
        assert!(pty.slave_closed(WAIT));
        assert!(matches!(link.write_all(b"x"), Err(SerialError::NotOpen)));
    }

    #[test]
    fn test_open_missing_device() {
        let (link, _rx) = SerialLink::with_channel();
        assert!(matches!(
            link.open("/nonexistent/serial/device", 9600),
            Err(SerialError::Open { .. })
        ));
        assert!(!link.is_open());
    }

    #[test]
    fn test_reopen_keeps_single_reader() {
        let first = PtyPair::new();
        let second = PtyPair::new();
        let (link, mut rx) = SerialLink::with_channel();

        link.open(&first.path, 115200).unwrap();
        link.open(&second.path, 115200).unwrap();
        assert!(link.is_open());
        assert!(first.slave_closed(WAIT));
        assert_eq!(
            link.settings().map(|s| s.port_name),
            Some(second.path.clone())
        );

        second.send(b"once");
        assert_eq!(collect_data(&mut rx, 4, WAIT), b"once");
        // A second reader on the same device would have produced more.
        assert!(next_event(&mut rx, Duration::from_millis(100)).is_none());
    }

    #[test]
    fn test_write_all_reaches_peer() {
        let pty = PtyPair::new();
        let (link, _rx) = SerialLink::with_channel();
        link.open(&pty.path, 115200).unwrap();

        assert_eq!(link.write_all(b"hello, device").unwrap(), 13);
        assert_eq!(pty.recv(13, WAIT), b"hello, device");
    }

    #[test]
    fn test_write_all_large_payload() {
        let pty = PtyPair::new();
        let (link, _rx) = SerialLink::with_channel();
        link.open(&pty.path, 115200).unwrap();
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 256) as u8).collect();

        let received = thread::scope(|s| {
            let peer = s.spawn(|| pty.recv(payload.len(), Duration::from_secs(10)));
            assert_eq!(link.write_all(&payload).unwrap(), payload.len());
            peer.join().unwrap()
        });
        assert!(received == payload);
    }

    #[test]
    fn test_concurrent_writers_do_not_interleave() {
        let pty = PtyPair::new();
        let (link, _rx) = SerialLink::with_channel();
        link.open(&pty.path, 115200).unwrap();
        let a = vec![b'a'; 64 * 1024];
        let b = vec![b'b'; 64 * 1024];

        let received = thread::scope(|s| {
            let peer = s.spawn(|| pty.recv(a.len() + b.len(), Duration::from_secs(10)));
            let wa = s.spawn(|| link.write_all(&a).unwrap());
            let wb = s.spawn(|| link.write_all(&b).unwrap());
            assert_eq!(wa.join().unwrap(), a.len());
            assert_eq!(wb.join().unwrap(), b.len());
            peer.join().unwrap()
        });

        assert_eq!(received.len(), a.len() + b.len());
        let (head, tail) = received.split_at(a.len());
        let head_uniform = head.iter().all(|&x| x == head[0]);
        let tail_uniform = tail.iter().all(|&x| x == tail[0]);
        assert!(head_uniform && tail_uniform && head[0] != tail[0]);
    }

    #[test]
    fn test_bursts_arrive_in_order() {
        let pty = PtyPair::new();
        let (link, mut rx) = SerialLink::with_channel();
        link.open(&pty.path, 115200).unwrap();

        let mut expected = Vec::new();
        for burst in 0..8u8 {
            let chunk: Vec<u8> = (0..100).map(|i| burst.wrapping_mul(31).wrapping_add(i)).collect();
            pty.send(&chunk);
            expected.extend_from_slice(&chunk);
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(collect_data(&mut rx, expected.len(), WAIT), expected);
    }

    #[test]
    fn test_close_while_streaming_is_prompt() {
        let pty = PtyPair::new();
        let (link, mut rx) = SerialLink::with_channel();
        link.open(&pty.path, 115200).unwrap();
        let stop = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                let chunk = [0x55u8; 256];
                while !stop.load(Ordering::Acquire) {
                    // Errors are expected once the slave side is gone.
                    let _ = nix::unistd::write(&pty.master, &chunk);
                    thread::sleep(Duration::from_millis(1));
                }
            });

            let streamed = collect_data(&mut rx, 1024, WAIT);
            let start = Instant::now();
            link.close();
            let elapsed = start.elapsed();
            stop.store(true, Ordering::Release);
            assert_eq!(streamed.len(), 1024);
            assert!(elapsed < Duration::from_millis(100), "close took {elapsed:?}");
        });
        assert!(!link.is_open());
    }

    #[test]
    fn test_peer_hangup_marks_link_closed() {
        let pty = PtyPair::new();
        let (link, mut rx) = SerialLink::with_channel();
        link.open(&pty.path, 115200).unwrap();

        drop(pty);
        assert_eq!(
            next_event(&mut rx, WAIT),
            Some(LinkEvent::Disconnected(DisconnectReason::Hangup))
        );
        assert!(!link.is_open());
        // Session resources are still held until close.
        assert!(link.settings().is_some());
        link.close();
        assert!(link.settings().is_none());
    }

    #[test]
    fn test_drop_closes_link() {
        let pty = PtyPair::new();
        let (link, _rx) = SerialLink::with_channel();
        link.open(&pty.path, 9600).unwrap();
        drop(link);
        assert!(pty.slave_closed(WAIT));
    }

    #[test]
    fn test_close_interrupts_stalled_write() {
        let pty = PtyPair::new();
        let (link, _rx) = SerialLink::with_channel();
        link.open(&pty.path, 115200).unwrap();
        let link = Arc::new(link);

        // The peer never reads, so the writer ends up waiting for queue space.
        let writer = {
            let link = Arc::clone(&link);
            thread::spawn(move || link.write_all(&vec![0xA5u8; 1024 * 1024]))
        };
        thread::sleep(Duration::from_millis(200));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        {
            let link = Arc::clone(&link);
            thread::spawn(move || {
                link.close();
                let _ = done_tx.send(());
            });
        }
        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("close blocked behind a pending write");

        match writer.join().unwrap() {
            Err(SerialError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionAborted),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!link.is_open());
        assert!(pty.slave_closed(WAIT));
        assert!(matches!(link.write_all(b"x"), Err(SerialError::NotOpen)));
    }
}
