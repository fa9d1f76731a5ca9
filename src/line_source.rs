//! The I/O boundary: a byte transport exposed as timed, newline-terminated
//! text lines.
//!
//! [`LineSource`] is the only seam the core depends on. The provided
//! [`TcpLineSource`] speaks to the sampler master over TCP (a serial-to-TCP
//! bridge presents the serial link as the same byte stream); tests drive
//! sessions through scripted in-memory sources implementing the same trait.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing::trace;

/// Outcome of one [`LineSource::next_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// One received line, terminator stripped. May be empty.
    Line(String),
    /// No complete line arrived within the timeout.
    TimedOut,
    /// The transport reached end-of-stream.
    Closed,
}

/// A byte stream framed as newline-terminated text lines with a read timeout.
pub trait LineSource {
    /// Wait up to `timeout` for the next line.
    ///
    /// Never blocks past `timeout` with no data. Bytes are decoded as UTF-8
    /// with substitution on malformed sequences, never failing.
    ///
    /// # Errors
    /// Only on unrecoverable transport failure; timeouts and end-of-stream
    /// are [`ReadEvent`] values, not errors.
    fn next_line(&mut self, timeout: Duration) -> anyhow::Result<ReadEvent>;

    /// Send one line, newline-terminated, UTF-8.
    ///
    /// # Errors
    /// On write failure or when the source is already closed.
    fn send_line(&mut self, line: &str) -> anyhow::Result<()>;

    /// Release the transport. Idempotent and always safe to call, even after
    /// a prior error.
    fn close(&mut self);
}

/// Opens a [`LineSource`]; the session calls this once when it starts.
pub trait Connector {
    /// The source type produced on success.
    type Source: LineSource;

    /// Open the transport.
    ///
    /// # Errors
    /// On connection failure; the session turns this into a terminal
    /// transport-failure outcome.
    fn connect(&self) -> anyhow::Result<Self::Source>;
}

/// [`LineSource`] over a [`TcpStream`], using the socket read timeout to
/// bound each wait.
#[derive(Debug)]
pub struct TcpLineSource {
    stream: TcpStream,
    pending: Vec<u8>,
    closed: bool,
}

impl TcpLineSource {
    /// Wrap an already connected stream.
    pub fn new(stream: TcpStream) -> TcpLineSource {
        TcpLineSource {
            stream,
            pending: Vec::new(),
            closed: false,
        }
    }

    fn take_pending_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let mut raw: Vec<u8> = self.pending.drain(..=end).collect();
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        Some(String::from_utf8_lossy(&raw).into_owned())
    }
}

impl LineSource for TcpLineSource {
    fn next_line(&mut self, timeout: Duration) -> anyhow::Result<ReadEvent> {
        if let Some(line) = self.take_pending_line() {
            return Ok(ReadEvent::Line(line));
        }
        if self.closed {
            return Ok(ReadEvent::Closed);
        }

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 1024];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(ReadEvent::TimedOut);
            }
            self.stream
                .set_read_timeout(Some(remaining))
                .context("could not set transport read timeout")?;

            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.closed = true;
                    // flush a trailing unterminated line before reporting EOF
                    if self.pending.is_empty() {
                        return Ok(ReadEvent::Closed);
                    }
                    let raw = std::mem::take(&mut self.pending);
                    return Ok(ReadEvent::Line(String::from_utf8_lossy(&raw).into_owned()));
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&buf[..n]);
                    if let Some(line) = self.take_pending_line() {
                        return Ok(ReadEvent::Line(line));
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(ReadEvent::TimedOut);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("transport read failed"),
            }
        }
    }

    fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        if self.closed {
            bail!("cannot send on a closed transport");
        }
        trace!(line, "sending command");
        self.stream
            .write_all(line.as_bytes())
            .and_then(|()| self.stream.write_all(b"\n"))
            .and_then(|()| self.stream.flush())
            .context("transport write failed")
    }

    fn close(&mut self) {
        if !self.closed {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.closed = true;
        }
    }
}

/// Connects a [`TcpLineSource`] to a host:port address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector for `address` (e.g. `"192.168.4.1:3333"`).
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> TcpConnector {
        TcpConnector {
            address: address.into(),
            connect_timeout,
        }
    }
}

impl Connector for TcpConnector {
    type Source = TcpLineSource;

    fn connect(&self) -> anyhow::Result<TcpLineSource> {
        let addr = self
            .address
            .to_socket_addrs()
            .with_context(|| format!("could not resolve {}", self.address))?
            .next()
            .with_context(|| format!("no address for {}", self.address))?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .with_context(|| format!("could not connect to {}", self.address))?;
        stream
            .set_nodelay(true)
            .context("could not configure transport socket")?;
        Ok(TcpLineSource::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    #[test]
    fn frames_lines_and_reports_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let writer = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            peer.write_all(b"@BATCH K=3\r\nO,0,0,5,0,0.1,1\npartial").unwrap();
        });

        let connector = TcpConnector::new(addr.to_string(), Duration::from_secs(1));
        let mut source = connector.connect().unwrap();
        let timeout = Duration::from_secs(1);
        assert_eq!(
            source.next_line(timeout).unwrap(),
            ReadEvent::Line("@BATCH K=3".to_owned())
        );
        assert_eq!(
            source.next_line(timeout).unwrap(),
            ReadEvent::Line("O,0,0,5,0,0.1,1".to_owned())
        );
        writer.join().unwrap();
        // trailing unterminated bytes surface as one final line, then EOF
        assert_eq!(
            source.next_line(timeout).unwrap(),
            ReadEvent::Line("partial".to_owned())
        );
        assert_eq!(source.next_line(timeout).unwrap(), ReadEvent::Closed);
    }

    #[test]
    fn silent_peer_times_out_instead_of_blocking() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = thread::spawn(move || listener.accept().unwrap());

        let connector = TcpConnector::new(addr.to_string(), Duration::from_secs(1));
        let mut source = connector.connect().unwrap();
        let started = Instant::now();
        assert_eq!(
            source.next_line(Duration::from_millis(50)).unwrap(),
            ReadEvent::TimedOut
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        source.close();
        source.close();
        drop(holder.join().unwrap());
    }
}
