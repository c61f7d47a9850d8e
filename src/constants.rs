use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Most bytes requested from the OS by a single receive call
pub(crate) const MAX_RECEIVE_CHUNK: usize = 1024;

pub(crate) const RESET_PULSE_MS: u64 = 100;
pub(crate) const POST_RESET_BOOTUP_DELAY_MS: u64 = 500;

/// Largest slice handed to a single `write` call by the CLI
pub const SEND_CHUNK_SIZE: usize = 256;

/// USB product IDs of common USB-UART bridges (CH340, FT232, FT231X, CP210x, ST-Link VCP)
pub const USB_UART_PRODUCT_IDS: [u16; 5] = [0x7523, 0x6001, 0x6015, 0xea60, 0x374b];
