//! Transport seams used by the runtime.
//!
//! The runtime never talks to a socket directly.  It sends through a
//! [`TelemetrySink`] and drives lifecycle through a [`TelemetryLink`], so the
//! scheduler and session controller can be exercised against in-memory fakes.

use depthlink_types::{Endpoint, LinkState, TelemetryPacket};

/// Fire-and-forget packet egress.
///
/// # Contract
///
/// * `send` must not block and must not report failure to the caller;
///   undeliverable packets are dropped.
pub trait TelemetrySink {
    fn send(&self, packet: &TelemetryPacket);
}

/// A sink with an open/close lifecycle against one [`Endpoint`].
///
/// # Contract
///
/// * `open` replaces any existing channel.  It never fails loudly: an
///   unusable endpoint leaves the link in a non-`Ready` state and later sends
///   become no-ops.
/// * `close` is idempotent.
pub trait TelemetryLink: TelemetrySink + Send {
    fn open(&mut self, endpoint: &Endpoint);
    fn close(&mut self);
    fn state(&self) -> LinkState;
}
