//! Socket plumbing shared by senders and receiver.

use std::fmt;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::LinkError;

/// Disable Nagle coalescing so each frame leaves immediately.
pub fn tune_low_latency(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)
}

/// Resolve `addr` and connect to the first address that accepts.
///
/// The returned stream is blocking with `TCP_NODELAY` set.
pub fn connect<A>(addr: A) -> Result<TcpStream, LinkError>
where
    A: ToSocketAddrs + fmt::Debug,
{
    let candidates = addr
        .to_socket_addrs()
        .map_err(|e| LinkError::Resolve(format!("{addr:?}: {e}")))?;

    let mut last_err = None;
    for candidate in candidates {
        match TcpStream::connect(candidate) {
            Ok(stream) => {
                tune_low_latency(&stream)?;
                info!("connected to {candidate} (TCP_NODELAY)");
                return Ok(stream);
            }
            Err(e) => {
                debug!("connect to {candidate} failed: {e}");
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(LinkError::Connection(e)),
        None => Err(LinkError::Resolve(format!("{addr:?}: no addresses"))),
    }
}

/// Result of [`read_full`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The buffer was filled.
    Complete,
    /// The stream ended or failed after `read` bytes.
    Disconnected { read: usize },
}

/// Fill `buf` from `reader`, accumulating partial reads.
///
/// A zero-length read or an I/O error ends the attempt; nothing past
/// what the stream delivered is consumed.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> ReadOutcome {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return ReadOutcome::Disconnected { read: filled },
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("read failed after {filled}/{} bytes: {e}", buf.len());
                return ReadOutcome::Disconnected { read: filled };
            }
        }
    }
    ReadOutcome::Complete
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;

    /// Yields at most `step` bytes per read.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn accumulates_partial_reads() {
        let mut reader = Trickle {
            inner: Cursor::new((0u8..10).collect()),
            step: 3,
        };
        let mut buf = [0u8; 10];
        assert_eq!(read_full(&mut reader, &mut buf), ReadOutcome::Complete);
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn short_stream_is_disconnect() {
        let mut reader = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(
            read_full(&mut reader, &mut buf),
            ReadOutcome::Disconnected { read: 3 }
        );
    }

    #[test]
    fn connect_sets_nodelay() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = connect(addr).unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[test]
    fn connect_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(matches!(connect(addr), Err(LinkError::Connection(_))));
    }

    #[test]
    fn unresolvable_host() {
        let err = connect("definitely-not-a-host.invalid:7000").unwrap_err();
        assert!(matches!(err, LinkError::Resolve(_)));
    }
}
