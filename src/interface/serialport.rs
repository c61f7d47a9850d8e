use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilder, StopBits,
};
use tracing::{debug, info, trace};

use super::{Connection, ControlLines};
use crate::constants::{DEFAULT_TIMEOUT, MAX_RECEIVE_CHUNK};
use crate::error::{LinkError, LinkResult};

pub type ComPort = String;
pub type BaudRate = u32;

/// Which modem control line is driven, and at what level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineLevel {
    Rts(bool),
    Dtr(bool),
}

fn reset_line(lines: ControlLines, enable: bool) -> LineLevel {
    let level = enable != lines.reset_active_high;
    if lines.swap_rts_dtr {
        LineLevel::Rts(level)
    } else {
        LineLevel::Dtr(level)
    }
}

fn boot0_line(lines: ControlLines, enable: bool) -> LineLevel {
    let level = enable != lines.boot0_active_low;
    if lines.swap_rts_dtr {
        LineLevel::Dtr(level)
    } else {
        LineLevel::Rts(level)
    }
}

/// Locally attached serial port (8 data bits, 1 stop bit, no flow control)
pub struct SerialConnection {
    port: ComPort,
    baud: BaudRate,
    parity: Parity,
    timeout: Duration,
    control_lines: ControlLines,
    serial_port: Option<Box<dyn SerialPort>>,
}

impl SerialConnection {
    pub fn new(port: ComPort, baud: BaudRate, parity: Parity) -> SerialConnection {
        SerialConnection {
            port,
            baud,
            parity,
            timeout: DEFAULT_TIMEOUT,
            control_lines: ControlLines::default(),
            serial_port: None,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    fn serial_port(&mut self) -> LinkResult<&mut Box<dyn SerialPort>> {
        self.serial_port.as_mut().ok_or(LinkError::NotConnected)
    }

    /// DTR stays low on open, it drives RESET with the default wiring
    fn builder(&self) -> SerialPortBuilder {
        serialport::new(self.port.as_str(), self.baud)
            .data_bits(DataBits::Eight)
            .parity(self.parity)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.timeout)
            .dtr_on_open(false)
    }

    fn drive(&mut self, line: LineLevel) -> LinkResult<()> {
        let serial_port = self.serial_port()?;
        match line {
            LineLevel::Rts(level) => serial_port.write_request_to_send(level)?,
            LineLevel::Dtr(level) => serial_port.write_data_terminal_ready(level)?,
        }
        trace!("Set {:?}", line);
        Ok(())
    }
}

impl Connection for SerialConnection {
    fn connect(&mut self) -> LinkResult<()> {
        if self.serial_port.is_some() {
            debug!("{} already open, closing it first", self.port);
            self.disconnect();
        }

        let serial_port = self.builder().open()?;

        info!("Opened {} at {} baud", self.port, self.baud);
        self.serial_port = Some(serial_port);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.serial_port.take().is_some() {
            info!("Closed {}", self.port);
        }
    }

    fn is_connected(&self) -> bool {
        self.serial_port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> LinkResult<usize> {
        let written = self.serial_port()?.write(data)?;
        trace!("Sent {} of {} bytes {:?}", written, data.len(), &data[..written]);
        Ok(written)
    }

    fn read(&mut self, amount: usize) -> LinkResult<Vec<u8>> {
        let serial_port = self.serial_port()?;
        let mut buffer = Vec::new();
        let mut chunk = [0u8; MAX_RECEIVE_CHUNK];

        // A serial line never ends, running into the timeout is the end of the data
        while buffer.len() < amount {
            let wanted = chunk.len().min(amount - buffer.len());
            match serial_port.read(&mut chunk[..wanted]) {
                Ok(0) => break,
                Ok(size) => buffer.extend_from_slice(&chunk[..size]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
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

        if let Some(serial_port) = self.serial_port.as_mut() {
            serial_port.set_timeout(timeout)?;
            debug!("Timeout of {} set to {:?}", self.port, timeout);
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

    fn enable_reset(&mut self, enable: bool) -> LinkResult<()> {
        self.drive(reset_line(self.control_lines, enable))
    }

    fn enable_boot0(&mut self, enable: bool) -> LinkResult<()> {
        self.drive(boot0_line(self.control_lines, enable))
    }

    fn flush_input_buffer(&mut self) -> LinkResult<()> {
        self.serial_port()?.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Find the first USB serial port whose product ID is in `product_ids`
pub fn find_port(product_ids: &[u16]) -> LinkResult<ComPort> {
    let ports = serialport::available_ports().map_err(|e| {
        LinkError::ConfigurationError(format!("Could not get available ports. Err {:?}", e))
    })?;

    for port in ports {
        if let serialport::SerialPortType::UsbPort(info) = port.port_type {
            if product_ids.contains(&info.pid) {
                debug!("Found {} (pid {:#06x})", port.port_name, info.pid);
                return Ok(port.port_name);
            }
        }
    }

    Err(LinkError::ConfigurationError(format!(
        "Looked at all available serial ports; none matches product IDs {:04x?}. \
        Try specifying a port?",
        product_ids
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_wiring_resets_with_dtr_and_boots_with_rts() {
        let lines = ControlLines::default();
        assert_eq!(reset_line(lines, true), LineLevel::Dtr(true));
        assert_eq!(reset_line(lines, false), LineLevel::Dtr(false));
        assert_eq!(boot0_line(lines, true), LineLevel::Rts(true));
    }

    #[test]
    fn swapped_wiring_exchanges_lines() {
        let lines = ControlLines {
            swap_rts_dtr: true,
            ..Default::default()
        };
        assert_eq!(reset_line(lines, true), LineLevel::Rts(true));
        assert_eq!(boot0_line(lines, true), LineLevel::Dtr(true));
    }

    #[test]
    fn active_levels_invert_output() {
        let lines = ControlLines {
            swap_rts_dtr: false,
            reset_active_high: true,
            boot0_active_low: true,
        };
        assert_eq!(reset_line(lines, true), LineLevel::Dtr(false));
        assert_eq!(reset_line(lines, false), LineLevel::Dtr(true));
        assert_eq!(boot0_line(lines, true), LineLevel::Rts(false));
        assert_eq!(boot0_line(lines, false), LineLevel::Rts(true));
    }

    #[test]
    fn closed_port_rejects_io_and_control() {
        let mut connection = SerialConnection::new("/dev/ttyUSB9".to_owned(), 115200, Parity::Even);
        assert_eq!(connection.port(), "/dev/ttyUSB9");
        assert!(matches!(connection.read(4), Err(LinkError::NotConnected)));
        assert!(matches!(connection.write(b"\x7f"), Err(LinkError::NotConnected)));
        assert!(matches!(connection.enable_reset(true), Err(LinkError::NotConnected)));
        assert!(matches!(connection.flush_input_buffer(), Err(LinkError::NotConnected)));

        connection.disconnect();
        assert!(!connection.is_connected());
    }

    #[test]
    fn opening_leaves_dtr_low() {
        let connection = SerialConnection::new("/dev/ttyUSB9".to_owned(), 57600, Parity::Even);
        let builder = format!("{:?}", connection.builder());
        assert!(builder.contains("dtr_on_open: Some(false)"), "{}", builder);
        assert!(builder.contains("baud_rate: 57600"), "{}", builder);
    }

    #[test]
    fn timeout_is_kept_for_next_open() {
        let mut connection = SerialConnection::new("/dev/ttyUSB9".to_owned(), 115200, Parity::Even);
        connection.set_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(connection.timeout(), Duration::from_millis(500));
    }
}
