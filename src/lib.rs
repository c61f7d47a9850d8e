//! Connections to microcontroller bootloaders, either over a local serial
//! port or through a serial-to-network bridge.

pub use error::{LinkError, LinkResult};
pub use interface::{Connection, ConnectionType, ControlLines, Parity, pulse_reset};
pub use interface::serialport::SerialConnection;
pub use interface::tcp::{Endpoint, TcpConnection};

pub mod constants;
pub mod error;
pub mod firmware;
pub mod interface;
pub mod util;
