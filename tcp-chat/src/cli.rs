use std::{net::SocketAddr, num::NonZeroUsize};

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, relaying every line to all other clients.
    Server(ServerArgs),
    /// Connect to a chat server from this terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:1234")]
    pub listen: SocketAddr,

    /// Messages buffered per client before further messages to it are dropped.
    #[arg(long, default_value = "10")]
    pub queue_capacity: NonZeroUsize,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:1234")]
    pub server: SocketAddr,
}
