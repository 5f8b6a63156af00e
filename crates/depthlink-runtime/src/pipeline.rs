//! [`StreamingPipeline`] – the single task that owns all streaming state.
//!
//! Each iteration waits on two things at once: the control inbox (local
//! toggles, endpoint edits, commands received by the transport) and the next
//! tracked frame.  Control messages win ties so a `STOP` that is already
//! queued is applied before another frame goes out.
//!
//! The loop ends when the [`PoseSource`] reports that no more frames will
//! arrive; it keeps running if every control sender is dropped.

use depthlink_middleware::{ControlInbox, TelemetryLink};
use depthlink_perception::{PoseSource, TrackingControl};
use tracing::{info, instrument, trace};

use crate::controller::SessionController;

/// Counters accumulated over one [`StreamingPipeline::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub streamed_frames: u64,
    pub surveys: u64,
    pub control_messages: u64,
}

pub struct StreamingPipeline<S, L, C> {
    source: S,
    controller: SessionController<L, C>,
    inbox: ControlInbox,
    stats: PipelineStats,
}

impl<S, L, C> StreamingPipeline<S, L, C>
where
    S: PoseSource,
    L: TelemetryLink,
    C: TrackingControl,
{
    pub fn new(source: S, controller: SessionController<L, C>, inbox: ControlInbox) -> Self {
        Self {
            source,
            controller,
            inbox,
            stats: PipelineStats::default(),
        }
    }

    pub fn controller(&self) -> &SessionController<L, C> {
        &self.controller
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Process one control message or one frame.  Returns `false` once the
    /// frame source has ended.
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            biased;
            Some(message) = self.inbox.recv() => {
                trace!(?message, "control message");
                self.stats.control_messages += 1;
                self.controller.handle_control(message);
                true
            }
            frame = self.source.next_frame() => {
                let Some(frame) = frame else {
                    return false;
                };
                self.stats.frames += 1;
                if let Some(report) = self.controller.on_frame(&frame, &self.source) {
                    self.stats.streamed_frames += 1;
                    if report.surveyed {
                        self.stats.surveys += 1;
                    }
                }
                true
            }
        }
    }

    /// Drive the pipeline until the frame source ends, then close any open
    /// session and hand the controller back.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> (SessionController<L, C>, PipelineStats) {
        info!(endpoint = %self.controller.endpoint(), "pipeline started");
        while self.step().await {}

        // Drain anything that raced with the last frame.
        while let Some(message) = self.inbox.try_recv() {
            self.stats.control_messages += 1;
            self.controller.handle_control(message);
        }
        if self.controller.is_streaming() {
            self.controller.toggle_streaming();
        }
        info!(
            frames = self.stats.frames,
            streamed = self.stats.streamed_frames,
            surveys = self.stats.surveys,
            "pipeline finished"
        );
        (self.controller, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use depthlink_middleware::{TelemetrySink, TransportSession, control_channel};
    use depthlink_perception::{
        Pose, Quaternion, RaycastSource, TrackedFrame, Vec3, ViewportPoint,
    };
    use depthlink_types::{ControlMessage, Endpoint, LinkState, TelemetryPacket};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::UdpSocket;

    /// Frames along −Z, with a wall 1.2 m ahead of whatever the current
    /// camera position is.
    struct Corridor {
        frames: VecDeque<TrackedFrame>,
        current: Pose,
    }

    impl Corridor {
        fn new(zs: &[f32]) -> Self {
            let frames = zs
                .iter()
                .map(|&z| TrackedFrame {
                    camera: Pose::new(Vec3::new(0.0, 0.0, z), Quaternion::identity()),
                    feature_points: Vec::new(),
                })
                .collect();
            Self {
                frames,
                current: Pose::identity(),
            }
        }
    }

    impl RaycastSource for Corridor {
        fn raycast(&self, _point: ViewportPoint) -> Option<Vec3> {
            let p = self.current.position;
            Some(Vec3::new(p.x, p.y, p.z - 1.2))
        }
    }

    #[async_trait]
    impl PoseSource for Corridor {
        async fn next_frame(&mut self) -> Option<TrackedFrame> {
            let frame = self.frames.pop_front()?;
            self.current = frame.camera;
            Some(frame)
        }
    }

    #[derive(Clone, Default)]
    struct SharedLink {
        packets: Arc<Mutex<Vec<TelemetryPacket>>>,
        ready: bool,
    }

    impl TelemetrySink for SharedLink {
        fn send(&self, packet: &TelemetryPacket) {
            if self.ready {
                self.packets.lock().unwrap().push(packet.clone());
            }
        }
    }

    impl TelemetryLink for SharedLink {
        fn open(&mut self, _endpoint: &Endpoint) {
            self.ready = true;
        }
        fn close(&mut self) {
            self.ready = false;
        }
        fn state(&self) -> LinkState {
            if self.ready { LinkState::Ready } else { LinkState::Closed }
        }
    }

    struct NoTracking;

    impl TrackingControl for NoTracking {
        fn reset_origin(&mut self) {}
    }

    #[tokio::test]
    async fn queued_start_streams_every_frame() {
        let (tx, inbox) = control_channel();
        let link = SharedLink::default();
        let packets = link.packets.clone();
        let controller = SessionController::new(Endpoint::default(), link, NoTracking);
        let pipeline = StreamingPipeline::new(Corridor::new(&[0.0, -0.5, -1.0]), controller, inbox);

        tx.post(ControlMessage::RemoteCommand("START".into()));
        let (controller, stats) = pipeline.run().await;

        assert_eq!(stats.frames, 3);
        assert_eq!(stats.streamed_frames, 3);
        assert_eq!(stats.control_messages, 1);
        assert!(!controller.is_streaming(), "run closes the session on exit");

        let packets = packets.lock().unwrap();
        assert_eq!(packets.len(), 3);
        let TelemetryPacket::Navigation(first) = &packets[0] else {
            panic!("expected navigation packet");
        };
        assert!((first.obstacle_dist - 8.24).abs() < 1e-4);
    }

    #[tokio::test]
    async fn queued_double_start_keeps_streaming() {
        let (tx, inbox) = control_channel();
        let link = SharedLink::default();
        let packets = link.packets.clone();
        let controller = SessionController::new(Endpoint::default(), link, NoTracking);
        let pipeline = StreamingPipeline::new(Corridor::new(&[0.0, -0.5]), controller, inbox);

        tx.post(ControlMessage::StartStreaming);
        tx.post(ControlMessage::StartStreaming);
        let (_, stats) = pipeline.run().await;

        assert_eq!(stats.control_messages, 2);
        assert_eq!(stats.streamed_frames, 2);
        assert_eq!(packets.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn frames_before_start_are_not_streamed() {
        let (_tx, inbox) = control_channel();
        let link = SharedLink::default();
        let packets = link.packets.clone();
        let controller = SessionController::new(Endpoint::default(), link, NoTracking);
        let pipeline = StreamingPipeline::new(Corridor::new(&[0.0, -1.0]), controller, inbox);

        let (_, stats) = pipeline.run().await;
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.streamed_frames, 0);
        assert!(packets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn walking_corridor_emits_surveys() {
        let (tx, inbox) = control_channel();
        let link = SharedLink::default();
        let packets = link.packets.clone();
        let controller = SessionController::new(Endpoint::default(), link, NoTracking);
        let zs: Vec<f32> = (0..=20).map(|i| -0.25 * i as f32).collect();
        let pipeline = StreamingPipeline::new(Corridor::new(&zs), controller, inbox);

        tx.post(ControlMessage::ToggleStreaming);
        let (_, stats) = pipeline.run().await;
        assert_eq!(stats.surveys, 2);
        let surveys = packets
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.kind() == "survey")
            .count();
        assert_eq!(surveys, 2);
    }

    #[tokio::test]
    async fn stop_queued_between_frames_halts_streaming() {
        let (tx, inbox) = control_channel();
        let link = SharedLink::default();
        let packets = link.packets.clone();
        let controller = SessionController::new(Endpoint::default(), link, NoTracking);
        let mut pipeline =
            StreamingPipeline::new(Corridor::new(&[0.0, 0.0, 0.0]), controller, inbox);

        tx.post(ControlMessage::ToggleStreaming);
        assert!(pipeline.step().await); // START
        assert!(pipeline.step().await); // frame 1
        tx.post(ControlMessage::RemoteCommand("STOP".into()));
        assert!(pipeline.step().await); // STOP wins over frame 2
        assert!(pipeline.step().await); // frame 2, idle
        assert!(pipeline.step().await); // frame 3, idle
        assert!(!pipeline.step().await);

        assert_eq!(packets.lock().unwrap().len(), 1);
        assert_eq!(pipeline.controller().status().label, "Stopped");
    }

    #[tokio::test]
    async fn remote_stop_over_udp_ends_stream() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();

        let (tx, inbox) = control_channel();
        let transport = TransportSession::new(tx.clone());
        let controller =
            SessionController::new(Endpoint::new("127.0.0.1", port), transport, NoTracking);
        let mut pipeline =
            StreamingPipeline::new(Corridor::new(&[0.0, 0.0, 0.0]), controller, inbox);

        tx.post(ControlMessage::ToggleStreaming);
        assert!(pipeline.step().await);
        assert_eq!(pipeline.controller().link().state(), LinkState::Ready);
        assert!(pipeline.step().await);

        let mut buf = [0u8; 2048];
        let (n, from) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let packet = TelemetryPacket::decode(&buf[..n]).unwrap();
        assert_eq!(packet.kind(), "nav");

        peer.send_to(b"STOP\n", from).await.unwrap();
        // The command arrives asynchronously; wait for it to reach the inbox.
        tokio::time::timeout(Duration::from_secs(2), async {
            while pipeline.controller().is_streaming() {
                pipeline.step().await;
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(pipeline.controller().link().state(), LinkState::Closed);
    }
}
