//! UDP transport session.
//!
//! [`TransportSession`] owns one connected datagram socket to a single
//! [`Endpoint`]:
//!
//! * **Egress** – [`TransportSession::send`] encodes a [`TelemetryPacket`] to
//!   JSON and hands it straight to the kernel on a non-blocking clone of the
//!   socket, so a send right after `open` does not wait on the reactor.
//!   Nothing is acknowledged or retried; a full socket buffer or an
//!   over-long datagram drops that packet only.
//!
//! * **Ingress** – a spawned receive task decodes each datagram as UTF-8,
//!   trims it and posts the text to the [`ControlSender`] as a
//!   [`ControlMessage::RemoteCommand`].  The task never touches streaming
//!   state itself.
//!
//! # Lifecycle
//!
//! ```text
//! Closed ──open──▶ Opening ──▶ Ready ──close──▶ Closed
//!                     │          │
//!                     │          └─ channel lost ─▶ Failed ──close──▶ Closed
//!                     └─ bad endpoint ─▶ Closed
//! ```
//!
//! Reopening always builds a fresh socket; nothing is pooled.

use std::io;
use std::net::{self, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use depthlink_types::{
    ControlMessage, Endpoint, LinkError, LinkState, MAX_DATAGRAM_BYTES, TelemetryPacket,
};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::inbox::ControlSender;
use crate::link::{TelemetryLink, TelemetrySink};

/// Datagram session to one remote consumer.
///
/// Must be opened from within a Tokio runtime; opening elsewhere leaves the
/// session `Failed` rather than panicking.
pub struct TransportSession {
    commands: ControlSender,
    state: watch::Sender<LinkState>,
    socket: Option<Arc<UdpSocket>>,
    egress: Option<net::UdpSocket>,
    receiver: Option<JoinHandle<()>>,
    endpoint: Option<Endpoint>,
}

impl TransportSession {
    /// Create a closed session whose inbound commands go to `commands`.
    pub fn new(commands: ControlSender) -> Self {
        let (state, _) = watch::channel(LinkState::Closed);
        Self {
            commands,
            state,
            socket: None,
            egress: None,
            receiver: None,
            endpoint: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Endpoint of the currently open channel.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Local address of the open socket; remote commands must be sent here.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// `true` while the receive task is still re-arming receives.
    pub fn is_receiving(&self) -> bool {
        self.receiver.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Open a channel to `endpoint`, closing any existing one first.
    ///
    /// Never returns an error.  An endpoint that cannot be resolved leaves the
    /// session `Closed`; a socket that cannot be created leaves it `Failed`.
    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    pub fn open(&mut self, endpoint: &Endpoint) {
        if self.socket.is_some() || self.state() != LinkState::Closed {
            self.close();
        }
        self.state.send_replace(LinkState::Opening);

        match self.connect(endpoint) {
            Ok(Connected {
                socket,
                egress,
                handle,
            }) => {
                let socket = Arc::new(socket);
                let task = handle.spawn(receive_loop(Arc::clone(&socket), self.commands.clone()));
                info!(
                    local = ?socket.local_addr().ok(),
                    "transport session ready"
                );
                self.socket = Some(socket);
                self.egress = Some(egress);
                self.receiver = Some(task);
                self.endpoint = Some(endpoint.clone());
                self.state.send_replace(LinkState::Ready);
            }
            Err(e @ LinkError::InvalidEndpoint(_)) => {
                warn!(error = %e, "transport open aborted");
                self.state.send_replace(LinkState::Closed);
            }
            Err(e) => {
                warn!(error = %e, "transport channel failed to open");
                self.state.send_replace(LinkState::Failed);
            }
        }
    }

    /// Cancel the in-flight receive and release the socket.  Idempotent.
    #[instrument(skip(self))]
    pub fn close(&mut self) {
        if let Some(task) = self.receiver.take() {
            task.abort();
        }
        self.egress = None;
        let was_open = self.socket.take().is_some();
        self.endpoint = None;
        self.state.send_replace(LinkState::Closed);
        if was_open {
            info!("transport session closed");
        }
    }

    /// Encode and enqueue `packet`.  Failures are logged and the packet is
    /// dropped; a hard socket error moves the session to `Failed`.
    pub fn send(&self, packet: &TelemetryPacket) {
        match self.try_send(packet) {
            Ok(n) => trace!(kind = packet.kind(), bytes = n, "packet sent"),
            Err(LinkError::NotOpen) => trace!(kind = packet.kind(), "send skipped: not open"),
            Err(LinkError::ChannelFailed(reason)) => self.fail(&reason),
            Err(e) => debug!(kind = packet.kind(), error = %e, "packet dropped"),
        }
    }

    /// Move a `Ready` session to `Failed` and stop its receive task.  The
    /// socket stays allocated until `close`.
    fn fail(&self, reason: &str) {
        warn!(%reason, "transport channel failed");
        if let Some(task) = &self.receiver {
            task.abort();
        }
        self.state.send_replace(LinkState::Failed);
    }

    fn try_send(&self, packet: &TelemetryPacket) -> Result<usize, LinkError> {
        if self.state() != LinkState::Ready {
            return Err(LinkError::NotOpen);
        }
        let socket = self.egress.as_ref().ok_or(LinkError::NotOpen)?;
        let bytes = packet.encode()?;
        match socket.send(&bytes) {
            Ok(n) => Ok(n),
            Err(e) if is_channel_lost(&e) => Err(LinkError::ChannelFailed(e.to_string())),
            Err(e) => Err(LinkError::Socket(e.to_string())),
        }
    }

    fn connect(&self, endpoint: &Endpoint) -> Result<Connected, LinkError> {
        let remote = endpoint.resolve()?;
        let handle = Handle::try_current()
            .map_err(|e| LinkError::Socket(format!("no async runtime: {e}")))?;

        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = net::UdpSocket::bind(local).map_err(socket_error)?;
        socket.connect(remote).map_err(socket_error)?;
        socket.set_nonblocking(true).map_err(socket_error)?;
        let egress = socket.try_clone().map_err(socket_error)?;

        let _guard = handle.enter();
        let socket = UdpSocket::from_std(socket).map_err(socket_error)?;
        Ok(Connected {
            socket,
            egress,
            handle,
        })
    }
}

/// A freshly connected channel: the reactor-registered socket for the
/// receive task and a non-blocking clone for egress.
struct Connected {
    socket: UdpSocket,
    egress: net::UdpSocket,
    handle: Handle,
}

impl TelemetrySink for TransportSession {
    fn send(&self, packet: &TelemetryPacket) {
        TransportSession::send(self, packet);
    }
}

impl TelemetryLink for TransportSession {
    fn open(&mut self, endpoint: &Endpoint) {
        TransportSession::open(self, endpoint);
    }

    fn close(&mut self) {
        TransportSession::close(self);
    }

    fn state(&self) -> LinkState {
        TransportSession::state(self)
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(task) = self.receiver.take() {
            task.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Receive loop
// ─────────────────────────────────────────────────────────────────────────────

/// Re-arms a receive after every datagram until an error occurs or the
/// inbox disappears.  Cancelled by aborting its task.
async fn receive_loop(socket: Arc<UdpSocket>, commands: ControlSender) {
    let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => {
                let Some(text) = decode_command(&buf[..n]) else {
                    trace!(bytes = n, "ignored empty or non-UTF-8 datagram");
                    continue;
                };
                debug!(command = %text, "remote command received");
                if !commands.post(ControlMessage::RemoteCommand(text)) {
                    info!("control inbox closed; receive loop stopped");
                    return;
                }
            }
            // ICMP port-unreachable from an earlier send surfaces here on a
            // connected socket; it says nothing about inbound traffic.
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                trace!(error = %e, "peer port unreachable");
            }
            Err(e) => {
                warn!(error = %e, "receive failed; receive loop stopped");
                return;
            }
        }
    }
}

/// UTF-8 decode and trim; `None` for invalid or blank payloads.
pub(crate) fn decode_command(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Errors after which no later datagram can leave this socket.  Anything
/// else (full buffer, ICMP unreachable, `EMSGSIZE`) costs only the packet
/// in hand.
fn is_channel_lost(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe | io::ErrorKind::AddrNotAvailable
    )
}

fn socket_error(e: io::Error) -> LinkError {
    LinkError::Socket(e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
