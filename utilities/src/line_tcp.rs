use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

pub const TERMINATOR: &[u8] = b"\r\n";

/// CRLF-delimited request/response stream over TCP.
///
/// The stream starts closed; [`LineTcpStream::open`] connects it and
/// [`LineTcpStream::close`] releases it. Closing a stream that is already
/// closed, or that never connected, does nothing.
pub struct LineTcpStream {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    write_timeout: Duration,
    pending: Vec<u8>,
}

impl LineTcpStream {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        LineTcpStream {
            host: host.into(),
            port,
            stream: None,
            connect_timeout,
            write_timeout: connect_timeout,
            pending: Vec::new(),
        }
    }

    pub fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn open(&mut self) -> io::Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addrs = (self.host.as_str(), self.port).to_socket_addrs()?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(self.write_timeout))?;
                    stream.set_nodelay(true)?;
                    self.stream = Some(stream);
                    self.pending.clear();
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", self.peer()),
            )
        }))
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.pending.clear();
    }

    /// Writes `line` followed by CRLF and blocks until a CRLF-terminated
    /// response arrives or `timeout` elapses.
    ///
    /// The returned line does not include the terminator. Bytes received past
    /// the terminator are kept for the next exchange. Any failure closes the
    /// stream, since a reply that arrives late would otherwise be taken as the
    /// answer to the next request.
    pub fn exchange(&mut self, line: &str, timeout: Duration) -> io::Result<String> {
        let result = self.round_trip(line, timeout);
        if result.is_err() {
            self.close();
        }
        result
    }

    fn round_trip(&mut self, line: &str, timeout: Duration) -> io::Result<String> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "stream is closed"))?;

        let mut request = Vec::with_capacity(line.len() + TERMINATOR.len());
        request.extend_from_slice(line.as_bytes());
        request.extend_from_slice(TERMINATOR);
        stream.write_all(&request)?;
        stream.flush()?;

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];

        loop {
            if let Some(end) = find_terminator(&self.pending) {
                let rest = self.pending.split_off(end + TERMINATOR.len());
                self.pending.truncate(end);
                let response = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending = rest;
                return Ok(response);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out(line, timeout));
            }
            stream.set_read_timeout(Some(remaining))?;

            match stream.read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "peer closed the connection before a line terminator",
                    ));
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Err(timed_out(line, timeout));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for LineTcpStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
}

fn timed_out(line: &str, timeout: Duration) -> io::Error {
    io::Error::new(
        ErrorKind::TimedOut,
        format!("no response to '{}' within {:?}", line, timeout),
    )
}
