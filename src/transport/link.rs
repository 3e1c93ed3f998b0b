//! Byte-stream connections the transport can drive.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// A duplex byte stream with a configurable read timeout.
///
/// Any type implementing this can sit behind a [`Transport`](super::Transport). This
/// includes:
/// - `std::net::TcpStream` (the device-control server)
/// - [`MockLink`](super::mock::MockLink) (testing)
pub trait Link: Read + Write + Send {
    /// Bound the next reads; `None` blocks indefinitely.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Link for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

/// Type-erased boxed link.
pub type DynLink = Box<dyn Link>;

/// Open a TCP connection, trying every resolved address in turn.
pub fn connect_tcp(address: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in address.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                // Requests are small and latency-sensitive
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("'{address}' did not resolve to any address"),
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connects_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let stream = connect_tcp(&address, Duration::from_secs(1)).unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[test]
    fn unresolvable_address_fails() {
        assert!(connect_tcp("not an address", Duration::from_millis(50)).is_err());
    }
}
