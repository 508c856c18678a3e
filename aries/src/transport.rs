use std::io;
use std::time::Duration;

use utilities::line_tcp::LineTcpStream;

/// One-line-out, one-line-back exchange with a controller.
pub trait Transport {
    /// Sends `line` and returns the response line without its terminator.
    fn exchange(&mut self, line: &str, timeout: Duration) -> io::Result<String>;

    /// Releases the connection. Calling it again is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

impl Transport for LineTcpStream {
    fn exchange(&mut self, line: &str, timeout: Duration) -> io::Result<String> {
        LineTcpStream::exchange(self, line, timeout)
    }

    fn close(&mut self) {
        LineTcpStream::close(self)
    }

    fn is_open(&self) -> bool {
        LineTcpStream::is_open(self)
    }
}
