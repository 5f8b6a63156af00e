//! `depthlink-middleware` – datagram plumbing.
//!
//! Moves telemetry out and commands in without caring what either means.
//!
//! # Modules
//!
//! - [`transport`] – [`TransportSession`]: a connected UDP socket with
//!   fire-and-forget egress and a background receive task for text commands.
//! - [`inbox`] – [`ControlInbox`]: the single-consumer queue that carries
//!   commands from the network task to the frame-processing task.
//! - [`link`] – [`TelemetrySink`] / [`TelemetryLink`]: the seams the runtime
//!   depends on instead of the concrete transport.

pub mod inbox;
pub mod link;
pub mod transport;

pub use inbox::{ControlInbox, ControlSender, control_channel};
pub use link::{TelemetryLink, TelemetrySink};
pub use transport::TransportSession;
