use bootlink::error::LinkResult;
use clap::Parser;
use commands::{ReadOptions, ResetOptions, SendOptions, handle_read, handle_reset, handle_send};

mod commands;

#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
struct Cli {
    /// Log every connection event
    #[clap(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Command {
    /// Stream a firmware image through the connection as raw bytes
    #[command(name = "send", alias = "s")]
    Send(SendOptions),

    /// Read bytes from the connection and print them as hex
    #[command(name = "read", alias = "r")]
    Read(ReadOptions),

    /// Pulse the reset line, optionally holding BOOT0
    #[command(name = "reset")]
    Reset(ResetOptions),
}

fn main() -> LinkResult<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Command::Send(opts) => handle_send(opts)?,
        Command::Read(opts) => handle_read(opts)?,
        Command::Reset(opts) => handle_reset(opts)?,
    }

    Ok(())
}
