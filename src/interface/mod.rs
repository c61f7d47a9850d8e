pub mod serialport;
pub mod tcp;

use std::time::Duration;

pub use ::serialport::Parity;
use tracing::debug;

use crate::constants::{POST_RESET_BOOTUP_DELAY_MS, RESET_PULSE_MS};
use crate::error::{LinkError, LinkResult};
use self::serialport::SerialConnection;
use self::tcp::TcpConnection;

const TCP_SCHEME: &str = "tcp://";

/// How the RESET and BOOT0 pins of the target are wired to the modem
/// control lines. Only a physical serial port can act on these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlLines {
    /// Drive RESET from RTS and BOOT0 from DTR instead of the other way round
    pub swap_rts_dtr: bool,
    pub reset_active_high: bool,
    pub boot0_active_low: bool,
}

/// Byte-stream link to a bootloader. Protocol drivers only talk to this
/// trait, so they work the same over a local serial port or a network bridge.
pub trait Connection: Send {
    /// Open the underlying resource
    fn connect(&mut self) -> LinkResult<()>;

    /// Release the underlying resource. Does nothing when not connected.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Send bytes with a single underlying write, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> LinkResult<usize>;

    /// Receive up to `amount` bytes, blocking until that many arrived or the
    /// stream ended
    fn read(&mut self, amount: usize) -> LinkResult<Vec<u8>>;

    fn timeout(&self) -> Duration;

    /// Change the timeout for blocking calls, applying it to the live
    /// resource when connected
    fn set_timeout(&mut self, timeout: Duration) -> LinkResult<()>;

    fn control_lines(&self) -> ControlLines;

    fn set_control_lines(&mut self, lines: ControlLines);

    /// Assert (or release) the target's RESET pin
    fn enable_reset(&mut self, enable: bool) -> LinkResult<()>;

    /// Assert (or release) the target's BOOT0 pin
    fn enable_boot0(&mut self, enable: bool) -> LinkResult<()>;

    /// Discard anything received but not read yet
    fn flush_input_buffer(&mut self) -> LinkResult<()>;

    /// Keep writing until every byte of `data` has been accepted
    fn write_all(&mut self, mut data: &[u8]) -> LinkResult<()> {
        while !data.is_empty() {
            let written = self.write(data)?;
            if written == 0 {
                return Err(LinkError::Transport(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "connection accepted no bytes",
                )));
            }
            data = &data[written..];
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialParams {
    pub port: String,
    pub baud: u32,
    pub parity: Parity,
}

/// Transport selected from a user supplied port string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionType {
    Serial(SerialParams),
    /// `host:port` of a serial-to-network bridge
    Tcp(String),
}

impl ConnectionType {
    /// `tcp://host:port`, or anything ending in a numeric `:port`, is a
    /// network bridge. Everything else is taken as a serial device name.
    pub fn from_port(port: &str, baud: u32, parity: Parity) -> ConnectionType {
        if let Some(address) = port.strip_prefix(TCP_SCHEME) {
            return ConnectionType::Tcp(address.to_owned());
        }

        match port.rsplit_once(':') {
            Some((host, tcp_port))
                if !host.is_empty()
                    && !tcp_port.is_empty()
                    && tcp_port.bytes().all(|b| b.is_ascii_digit()) =>
            {
                ConnectionType::Tcp(port.to_owned())
            }
            _ => ConnectionType::Serial(SerialParams {
                port: port.to_owned(),
                baud,
                parity,
            }),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ConnectionType::Tcp(_))
    }

    /// Build the matching (not yet connected) connection
    pub fn open(self) -> Box<dyn Connection> {
        match self {
            ConnectionType::Serial(params) => Box::new(SerialConnection::new(
                params.port,
                params.baud,
                params.parity,
            )),
            ConnectionType::Tcp(address) => Box::new(TcpConnection::new(address)),
        }
    }
}

/// Pulse RESET with BOOT0 held at the requested level, then give the target
/// time to start. Without control lines (network bridges) this only waits.
pub fn pulse_reset(connection: &mut dyn Connection, boot0: bool) -> LinkResult<()> {
    debug!("Pulsing reset, boot0 {}", boot0);
    connection.enable_boot0(boot0)?;
    connection.enable_reset(true)?;
    std::thread::sleep(Duration::from_millis(RESET_PULSE_MS));
    connection.enable_reset(false)?;
    std::thread::sleep(Duration::from_millis(POST_RESET_BOOTUP_DELAY_MS));
    Ok(())
}
