//! Multi-client TCP chat room with a server and a terminal client.
//!
//! The server tags every connection with a username and relays each line it
//! receives to all other connected clients. Delivery is best-effort: every
//! session has a small bounded outgoing queue, and a recipient whose queue is
//! full simply misses the message.
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`registry`] owns the live sessions and fans broadcasts out to their
//!   outgoing queues.
//! - [`session`] runs the per-connection receive and send loops.
//! - [`server`] accepts TCP connections and spawns a session for each one.
//! - [`client`] connects to a server and relays stdin lines while printing
//!   whatever the server sends back.
//! - [`line`] implements the newline-delimited framing used on the wire.
//! - [`notice`] formats the join, leave, roster, and chat lines.
//! - [`signal`] waits for the interrupt and terminate signals that end either
//!   mode.

pub mod cli;
pub mod client;
pub mod line;
pub mod notice;
pub mod registry;
pub mod server;
pub mod session;
pub mod signal;
