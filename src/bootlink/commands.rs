use std::path::PathBuf;
use std::time::Duration;

use bootlink::{
    Connection, ConnectionType, ControlLines, Parity,
    constants::{DEFAULT_BAUD_RATE, SEND_CHUNK_SIZE, USB_UART_PRODUCT_IDS},
    error::{LinkError, LinkResult},
    firmware,
    interface::serialport::find_port,
    pulse_reset,
    util::{create_progress_bar, hex_dump},
};
use clap::{Args, ValueEnum};
use tracing::{info, warn};

#[derive(ValueEnum, Debug, Clone, Copy)]
pub(crate) enum ParityOption {
    None,
    Odd,
    Even,
}

impl From<ParityOption> for Parity {
    fn from(parity: ParityOption) -> Self {
        match parity {
            ParityOption::None => Parity::None,
            ParityOption::Odd => Parity::Odd,
            ParityOption::Even => Parity::Even,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct PortOptions {
    /// Serial port, or host:port of a serial-to-network bridge
    #[clap(short, long)]
    port: Option<String>,

    /// Baud rate (serial ports only)
    #[clap(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baudrate: u32,

    /// Parity (serial ports only)
    #[clap(long, value_enum, default_value_t = ParityOption::Even)]
    parity: ParityOption,

    /// Timeout of blocking reads and writes, in seconds
    #[clap(short, long, default_value_t = 5.0)]
    timeout: f64,

    /// RESET is wired to RTS and BOOT0 to DTR
    #[clap(long, default_value_t = false)]
    swap_rts_dtr: bool,

    #[clap(long, default_value_t = false)]
    reset_active_high: bool,

    #[clap(long, default_value_t = false)]
    boot0_active_low: bool,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct SendOptions {
    #[command(flatten)]
    port: PortOptions,

    /// Firmware image, Intel HEX (.hex) or raw binary
    #[clap(short, long)]
    firmware: PathBuf,

    /// Reset into the bootloader before sending
    #[clap(long, default_value_t = false)]
    reset: bool,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ReadOptions {
    #[command(flatten)]
    port: PortOptions,

    /// Number of bytes to read
    #[clap(short = 'n', long, default_value_t = 1)]
    count: usize,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ResetOptions {
    #[command(flatten)]
    port: PortOptions,

    /// Hold BOOT0 while resetting to start the system bootloader
    #[clap(long, default_value_t = false)]
    boot0: bool,
}

fn open_connection(opts: &PortOptions) -> LinkResult<(ConnectionType, Box<dyn Connection>)> {
    let port = match &opts.port {
        Some(port) => port.clone(),
        None => find_port(&USB_UART_PRODUCT_IDS)?,
    };

    let connection_type = ConnectionType::from_port(&port, opts.baudrate, opts.parity.into());
    let lines = ControlLines {
        swap_rts_dtr: opts.swap_rts_dtr,
        reset_active_high: opts.reset_active_high,
        boot0_active_low: opts.boot0_active_low,
    };
    if connection_type.is_network() && lines != ControlLines::default() {
        warn!("{} is a network bridge, control line options have no effect", port);
    }

    let timeout = Duration::try_from_secs_f64(opts.timeout).map_err(|e| {
        LinkError::ConfigurationError(format!("Invalid timeout {}: {}", opts.timeout, e))
    })?;

    let mut connection = connection_type.clone().open();
    connection.set_control_lines(lines);
    connection.set_timeout(timeout)?;
    connection.connect()?;

    Ok((connection_type, connection))
}

pub(crate) fn handle_send(opts: SendOptions) -> LinkResult<()> {
    let image = firmware::load(&opts.firmware)?;
    let (_, mut connection) = open_connection(&opts.port)?;

    if opts.reset {
        pulse_reset(connection.as_mut(), true)?;
        connection.flush_input_buffer()?;
    }

    let pb = create_progress_bar(image.len() as u64, "Sending");
    for chunk in image.chunks(SEND_CHUNK_SIZE) {
        connection.write_all(chunk)?;
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message("Sent");

    connection.disconnect();
    info!("Sent {} bytes from {}", image.len(), opts.firmware.display());
    Ok(())
}

pub(crate) fn handle_read(opts: ReadOptions) -> LinkResult<()> {
    let (_, mut connection) = open_connection(&opts.port)?;

    let data = connection.read(opts.count)?;
    connection.disconnect();

    if data.len() < opts.count {
        warn!("Received {} of {} bytes", data.len(), opts.count);
    }
    if !data.is_empty() {
        println!("{}", hex_dump(&data));
    }
    Ok(())
}

pub(crate) fn handle_reset(opts: ResetOptions) -> LinkResult<()> {
    let (connection_type, mut connection) = open_connection(&opts.port)?;

    if connection_type.is_network() {
        warn!("Network bridges have no RESET or BOOT0 lines, nothing to toggle");
    }
    pulse_reset(connection.as_mut(), opts.boot0)?;
    connection.disconnect();

    info!("Reset target (boot0 {})", opts.boot0);
    Ok(())
}
