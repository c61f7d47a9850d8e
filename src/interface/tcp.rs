//! Serial line reached through a serial-to-network bridge.
//!
//! The bridge passes bytes through transparently, but there is no way to
//! toggle RESET or BOOT0 over a socket, so those operations do nothing here.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info, trace};

use super::{Connection, ControlLines};
use crate::constants::{DEFAULT_TIMEOUT, MAX_RECEIVE_CHUNK};
use crate::error::{LinkError, LinkResult};

/// Host and port of a bridge, parsed from `host:port` or `[v6-literal]:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(address: &str) -> LinkResult<Endpoint> {
        let parse_error = |reason: &str| LinkError::AddressParse {
            address: address.to_owned(),
            reason: reason.to_owned(),
        };

        // The port is after the last colon, IPv6 literals contain colons too
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| parse_error("expected host:port"))?;
        let host = host.trim_matches(|c| c == '[' || c == ']');
        if host.is_empty() {
            return Err(parse_error("empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| parse_error("port must be a number between 0 and 65535"))?;

        Ok(Endpoint {
            host: host.to_owned(),
            port,
        })
    }

    fn socket_addrs(&self) -> LinkResult<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl FromStr for Endpoint {
    type Err = LinkError;

    fn from_str(s: &str) -> LinkResult<Self> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// TCP connection to a serial-to-network bridge
pub struct TcpConnection {
    address: String,
    timeout: Duration,
    control_lines: ControlLines,
    stream: Option<TcpStream>,
}

impl TcpConnection {
    /// Create an unconnected instance, nothing is opened until `connect`
    pub fn new(address: impl Into<String>) -> TcpConnection {
        TcpConnection {
            address: address.into(),
            timeout: DEFAULT_TIMEOUT,
            control_lines: ControlLines::default(),
            stream: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn stream(&mut self) -> LinkResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(LinkError::NotConnected)
    }

    fn apply_timeout(stream: &TcpStream, timeout: Duration) -> LinkResult<()> {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }
}

impl Connection for TcpConnection {
    fn connect(&mut self) -> LinkResult<()> {
        let endpoint = Endpoint::parse(&self.address)?;

        if self.stream.is_some() {
            debug!("Already connected to {}, closing old socket", endpoint);
            self.disconnect();
        }

        let mut last_error = None;
        for addr in endpoint.socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    Self::apply_timeout(&stream, self.timeout)?;
                    info!("Connected to {} ({})", endpoint, addr);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    debug!("Could not connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(LinkError::Transport(last_error.unwrap_or_else(|| {
            std::io::Error::new(
                ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", endpoint),
            )
        })))
    }

    fn disconnect(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        if let Err(e) = stream.shutdown(Shutdown::Both) {
            debug!("Ignoring error while closing {}: {}", self.address, e);
        }
        info!("Disconnected from {}", self.address);
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn write(&mut self, data: &[u8]) -> LinkResult<usize> {
        let written = self.stream()?.write(data)?;
        trace!("Sent {} of {} bytes {:?}", written, data.len(), &data[..written]);
        Ok(written)
    }

    fn read(&mut self, amount: usize) -> LinkResult<Vec<u8>> {
        let stream = self.stream()?;
        let mut buffer = Vec::new();
        let mut chunk = [0u8; MAX_RECEIVE_CHUNK];

        // Block until we have the requested amount or the bridge hangs up
        while buffer.len() < amount {
            let wanted = chunk.len().min(amount - buffer.len());
            match stream.read(&mut chunk[..wanted]) {
                Ok(0) => break,
                Ok(size) => buffer.extend_from_slice(&chunk[..size]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        trace!("Received bytes {:?}", buffer);
        Ok(buffer)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> LinkResult<()> {
        if timeout.is_zero() {
            return Err(LinkError::InvalidTimeout(timeout));
        }

        if let Some(stream) = &self.stream {
            Self::apply_timeout(stream, timeout)?;
            debug!("Timeout of live connection set to {:?}", timeout);
        }
        self.timeout = timeout;
        Ok(())
    }

    fn control_lines(&self) -> ControlLines {
        self.control_lines
    }

    fn set_control_lines(&mut self, lines: ControlLines) {
        self.control_lines = lines;
    }

    fn enable_reset(&mut self, _enable: bool) -> LinkResult<()> {
        Ok(())
    }

    fn enable_boot0(&mut self, _enable: bool) -> LinkResult<()> {
        Ok(())
    }

    fn flush_input_buffer(&mut self) -> LinkResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, port: u16) -> Endpoint {
        Endpoint {
            host: host.to_owned(),
            port,
        }
    }

    #[test]
    fn parses_host_and_port() {
        assert_eq!(
            Endpoint::parse("127.0.0.1:7777").unwrap(),
            endpoint("127.0.0.1", 7777)
        );
        assert_eq!(
            Endpoint::parse("bridge.local:23").unwrap(),
            endpoint("bridge.local", 23)
        );
    }

    #[test]
    fn parses_bracketed_ipv6_literal() {
        let parsed: Endpoint = "[::1]:7777".parse().unwrap();
        assert_eq!(parsed, endpoint("::1", 7777));
        assert_eq!(parsed.to_string(), "[::1]:7777");

        assert_eq!(
            Endpoint::parse("[fe80::1:2]:4000").unwrap(),
            endpoint("fe80::1:2", 4000)
        );
    }

    #[test]
    fn rejects_malformed_addresses() {
        for address in ["localhost", "localhost:http", ":7777", "[]:7777", "host:", "host:70000"] {
            assert!(
                matches!(Endpoint::parse(address), Err(LinkError::AddressParse { .. })),
                "{} should not parse",
                address
            );
        }
    }

    #[test]
    fn new_connection_is_idle_with_default_timeout() {
        let connection = TcpConnection::new("127.0.0.1:7777");
        assert_eq!(connection.address(), "127.0.0.1:7777");
        assert_eq!(connection.timeout(), Duration::from_secs(5));
        assert!(!connection.is_connected());
    }

    #[test]
    fn connect_reports_bad_port() {
        let mut connection = TcpConnection::new("127.0.0.1:serial");
        assert!(matches!(
            connection.connect(),
            Err(LinkError::AddressParse { .. })
        ));
        assert!(!connection.is_connected());
    }

    #[test]
    fn disconnect_without_connect_is_noop() {
        let mut connection = TcpConnection::new("127.0.0.1:7777");
        connection.disconnect();
        connection.disconnect();
        assert!(!connection.is_connected());
    }

    #[test]
    fn io_requires_connection() {
        let mut connection = TcpConnection::new("127.0.0.1:7777");
        assert!(matches!(connection.write(b"ABC"), Err(LinkError::NotConnected)));
        assert!(matches!(connection.read(1), Err(LinkError::NotConnected)));
        assert!(matches!(connection.write_all(b"ABC"), Err(LinkError::NotConnected)));
    }

    #[test]
    fn timeout_updates_while_disconnected() {
        let mut connection = TcpConnection::new("127.0.0.1:7777");
        connection.set_timeout(Duration::from_millis(250)).unwrap();
        assert_eq!(connection.timeout(), Duration::from_millis(250));

        assert!(matches!(
            connection.set_timeout(Duration::ZERO),
            Err(LinkError::InvalidTimeout(_))
        ));
        assert_eq!(connection.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn live_socket_and_stored_timeout_agree() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut connection = TcpConnection::new(listener.local_addr().unwrap().to_string());
        connection.connect().unwrap();

        connection.set_timeout(Duration::from_millis(300)).unwrap();
        assert!(connection.set_timeout(Duration::ZERO).is_err());

        let stream = connection.stream.as_ref().unwrap();
        assert_eq!(stream.read_timeout().unwrap(), Some(Duration::from_millis(300)));
        assert_eq!(stream.write_timeout().unwrap(), Some(Duration::from_millis(300)));
        assert_eq!(connection.timeout(), Duration::from_millis(300));
    }

    #[test]
    fn hardware_lines_are_inert() {
        let mut connection = TcpConnection::new("127.0.0.1:7777");
        let lines = ControlLines {
            swap_rts_dtr: true,
            reset_active_high: true,
            boot0_active_low: true,
        };
        connection.set_control_lines(lines);

        connection.enable_reset(true).unwrap();
        connection.enable_boot0(false).unwrap();
        connection.flush_input_buffer().unwrap();

        assert_eq!(connection.control_lines(), lines);
        assert!(!connection.is_connected());
    }
}
