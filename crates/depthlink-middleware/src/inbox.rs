//! Single-consumer control inbox.
//!
//! Everything that wants to change streaming state (the UDP receive loop, the
//! local REPL) holds a cloneable [`ControlSender`] and posts a
//! [`ControlMessage`].  Exactly one [`ControlInbox`] drains them, on the same
//! task that processes tracked frames, so streaming state has a single writer.
//!
//! Built on an unbounded [`tokio::sync::mpsc`] channel: posting never blocks
//! the network task, and commands are rare enough that the queue stays short.

use depthlink_types::ControlMessage;
use tokio::sync::mpsc;
use tracing::debug;

/// Create a connected sender/inbox pair.
pub fn control_channel() -> (ControlSender, ControlInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlSender { tx }, ControlInbox { rx })
}

/// Producer side. Clone it freely.
#[derive(Clone, Debug)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlSender {
    /// Post a message.  Returns `false` once the inbox has been dropped.
    pub fn post(&self, message: ControlMessage) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(mpsc::error::SendError(dropped)) => {
                debug!(?dropped, "control inbox closed; message discarded");
                false
            }
        }
    }

    /// `true` once the consuming [`ControlInbox`] is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the frame-processing task.
#[derive(Debug)]
pub struct ControlInbox {
    rx: mpsc::UnboundedReceiver<ControlMessage>,
}

impl ControlInbox {
    /// Wait for the next message.  Returns `None` when every sender is gone.
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.rx.recv().await
    }

    /// Take a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<ControlMessage> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_arrive_in_post_order() {
        let (tx, mut inbox) = control_channel();
        let tx2 = tx.clone();

        assert!(tx.post(ControlMessage::RemoteCommand("START".to_string())));
        assert!(tx2.post(ControlMessage::ToggleStreaming));

        assert_eq!(
            inbox.recv().await,
            Some(ControlMessage::RemoteCommand("START".to_string()))
        );
        assert_eq!(inbox.recv().await, Some(ControlMessage::ToggleStreaming));
        assert_eq!(inbox.try_recv(), None);
    }

    #[tokio::test]
    async fn recv_ends_when_all_senders_drop() {
        let (tx, mut inbox) = control_channel();
        drop(tx);
        assert_eq!(inbox.recv().await, None);
    }

    #[test]
    fn post_after_inbox_dropped_reports_false() {
        let (tx, inbox) = control_channel();
        drop(inbox);
        assert!(tx.is_closed());
        assert!(!tx.post(ControlMessage::ToggleStreaming));
    }
}
