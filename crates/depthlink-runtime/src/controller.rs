//! [`SessionController`] – streaming on/off state machine.
//!
//! The controller owns everything that changes when streaming toggles: the
//! telemetry link, the tracker's origin, the obstacle smoother and the survey
//! anchor.  It is driven exclusively from the pipeline task, so none of its
//! state needs locking.  Observers follow [`StreamingStatus`] through a
//! `watch` channel.
//!
//! ```text
//!   Idle ──toggle/START──▶ Streaming ──toggle/STOP──▶ Stopped
//!                              ▲                          │
//!                              └──────toggle/START────────┘
//! ```

use chrono::Utc;
use depthlink_middleware::TelemetryLink;
use depthlink_perception::{
    ObstacleConfig, ObstacleEstimator, RaycastSource, TrackedFrame, TrackingControl,
};
use depthlink_types::{ControlMessage, Endpoint, RemoteCommand, StreamingStatus};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::scheduler::{SurveyConfig, TelemetryScheduler};

/// Per-frame result reported while streaming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Smoothed obstacle distance carried by the navigation packet.
    pub obstacle_dist: f32,
    /// Whether a survey packet went out alongside it.
    pub surveyed: bool,
}

pub struct SessionController<L, C> {
    endpoint: Endpoint,
    status: watch::Sender<StreamingStatus>,
    link: L,
    tracking: C,
    estimator: ObstacleEstimator,
    scheduler: TelemetryScheduler,
    session: Option<Uuid>,
}

impl<L: TelemetryLink, C: TrackingControl> SessionController<L, C> {
    pub fn new(endpoint: Endpoint, link: L, tracking: C) -> Self {
        let (status, _) = watch::channel(StreamingStatus::idle());
        Self {
            endpoint,
            status,
            link,
            tracking,
            estimator: ObstacleEstimator::default(),
            scheduler: TelemetryScheduler::default(),
            session: None,
        }
    }

    pub fn with_obstacle_config(mut self, config: ObstacleConfig) -> Self {
        self.estimator = ObstacleEstimator::new(config);
        self
    }

    pub fn with_survey_config(mut self, config: SurveyConfig) -> Self {
        self.scheduler = TelemetryScheduler::new(config);
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn status(&self) -> StreamingStatus {
        self.status.borrow().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.status.borrow().active
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<StreamingStatus> {
        self.status.subscribe()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Identifier of the current streaming session, if active.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn tracking(&self) -> &C {
        &self.tracking
    }

    pub fn estimator(&self) -> &ObstacleEstimator {
        &self.estimator
    }

    pub fn scheduler(&self) -> &TelemetryScheduler {
        &self.scheduler
    }

    // ── Control ──────────────────────────────────────────────────────────────

    /// Flip streaming on or off.
    pub fn toggle_streaming(&mut self) {
        if self.is_streaming() {
            self.deactivate();
        } else {
            self.activate();
        }
    }

    /// Apply `START` / `STOP`.  `START` only acts when idle and `STOP` only
    /// when streaming.
    pub fn apply_command(&mut self, command: RemoteCommand) {
        match command {
            RemoteCommand::Start if !self.is_streaming() => self.activate(),
            RemoteCommand::Stop if self.is_streaming() => self.deactivate(),
            _ => debug!(?command, "command has no effect in current state"),
        }
    }

    /// React to a trimmed network command; unknown text is ignored.
    pub fn handle_remote_command(&mut self, text: &str) {
        match RemoteCommand::parse(text) {
            Some(command) => self.apply_command(command),
            None => debug!(command = text, "ignoring unknown remote command"),
        }
    }

    /// Replace the host used by the next activation.  An active session keeps
    /// its current channel.
    pub fn set_endpoint_host(&mut self, host: &str) {
        let host = host.trim();
        if host.is_empty() {
            warn!("ignoring empty endpoint host");
            return;
        }
        self.endpoint.host = host.to_string();
        info!(endpoint = %self.endpoint, "endpoint host updated");
    }

    /// Dispatch one inbox message.
    pub fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::RemoteCommand(text) => self.handle_remote_command(&text),
            ControlMessage::ToggleStreaming => self.toggle_streaming(),
            ControlMessage::StartStreaming => self.apply_command(RemoteCommand::Start),
            ControlMessage::StopStreaming => self.apply_command(RemoteCommand::Stop),
            ControlMessage::SetEndpointHost(host) => self.set_endpoint_host(&host),
        }
    }

    // ── Per-frame ────────────────────────────────────────────────────────────

    /// Estimate the obstacle distance and emit telemetry for one frame.
    /// Frames that arrive while idle are ignored.
    pub fn on_frame(
        &mut self,
        frame: &TrackedFrame,
        raycaster: &dyn RaycastSource,
    ) -> Option<FrameReport> {
        if !self.is_streaming() {
            return None;
        }
        let obstacle_dist = self
            .estimator
            .estimate(&frame.camera, &frame.feature_points, raycaster);
        let emission = self
            .scheduler
            .on_frame(&frame.camera, obstacle_dist, Utc::now(), &self.link);
        Some(FrameReport {
            obstacle_dist,
            surveyed: emission.surveyed(),
        })
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    fn activate(&mut self) {
        self.estimator.reset();
        self.scheduler.reset();
        self.link.open(&self.endpoint);
        self.tracking.reset_origin();

        let session = Uuid::new_v4();
        self.session = Some(session);
        self.status
            .send_replace(StreamingStatus::streaming(&self.endpoint));
        info!(
            session = %session,
            endpoint = %self.endpoint,
            link = ?self.link.state(),
            "streaming started"
        );
    }

    fn deactivate(&mut self) {
        self.link.close();
        let session = self.session.take();
        self.status.send_replace(StreamingStatus::stopped());
        info!(session = ?session, "streaming stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthlink_middleware::TelemetrySink;
    use depthlink_perception::{Pose, Quaternion, Vec3, ViewportPoint};
    use depthlink_types::{LinkState, TelemetryPacket};
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeLink {
        opened: Vec<Endpoint>,
        closes: usize,
        ready: bool,
        packets: RefCell<Vec<TelemetryPacket>>,
    }

    impl TelemetrySink for FakeLink {
        fn send(&self, packet: &TelemetryPacket) {
            if self.ready {
                self.packets.borrow_mut().push(packet.clone());
            }
        }
    }

    impl TelemetryLink for FakeLink {
        fn open(&mut self, endpoint: &Endpoint) {
            self.opened.push(endpoint.clone());
            self.ready = true;
        }
        fn close(&mut self) {
            self.closes += 1;
            self.ready = false;
        }
        fn state(&self) -> LinkState {
            if self.ready { LinkState::Ready } else { LinkState::Closed }
        }
    }

    #[derive(Default)]
    struct FakeTracking {
        resets: usize,
    }

    impl TrackingControl for FakeTracking {
        fn reset_origin(&mut self) {
            self.resets += 1;
        }
    }

    /// Every probe hits a plane at z = `wall_z`, straight ahead.
    struct Wall {
        wall_z: f32,
    }

    impl RaycastSource for Wall {
        fn raycast(&self, _point: ViewportPoint) -> Option<Vec3> {
            Some(Vec3::new(0.0, 0.0, self.wall_z))
        }
    }

    struct Nothing;

    impl RaycastSource for Nothing {
        fn raycast(&self, _point: ViewportPoint) -> Option<Vec3> {
            None
        }
    }

    fn controller() -> SessionController<FakeLink, FakeTracking> {
        SessionController::new(
            Endpoint::new("10.0.0.5", 5005),
            FakeLink::default(),
            FakeTracking::default(),
        )
    }

    fn frame_at(z: f32) -> TrackedFrame {
        TrackedFrame {
            camera: Pose::new(Vec3::new(0.0, 0.0, z), Quaternion::identity()),
            feature_points: Vec::new(),
        }
    }

    fn navs(link: &FakeLink) -> Vec<f32> {
        link.packets
            .borrow()
            .iter()
            .filter_map(|p| match p {
                TelemetryPacket::Navigation(n) => Some(n.obstacle_dist),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn starts_idle() {
        let c = controller();
        assert_eq!(c.status(), StreamingStatus::idle());
        assert!(c.session_id().is_none());
    }

    #[test]
    fn toggle_activates_then_stops() {
        let mut c = controller();
        c.toggle_streaming();
        assert!(c.is_streaming());
        assert_eq!(c.status().label, "Streaming to 10.0.0.5:5005");
        assert_eq!(c.link().opened, vec![Endpoint::new("10.0.0.5", 5005)]);
        assert_eq!(c.tracking().resets, 1);
        assert!(c.session_id().is_some());

        c.toggle_streaming();
        assert_eq!(c.status(), StreamingStatus::stopped());
        assert_eq!(c.link().closes, 1);
        assert!(c.session_id().is_none());
    }

    #[test]
    fn remote_start_and_stop_are_idempotent() {
        let mut c = controller();
        c.handle_remote_command("START");
        c.handle_remote_command("START");
        assert!(c.is_streaming());
        assert_eq!(c.link().opened.len(), 1);

        c.handle_remote_command("STOP");
        c.handle_remote_command("STOP");
        assert!(!c.is_streaming());
        assert_eq!(c.link().closes, 1);
    }

    #[test]
    fn repeated_local_start_is_not_a_toggle() {
        let mut c = controller();
        c.handle_control(ControlMessage::StartStreaming);
        c.handle_control(ControlMessage::StartStreaming);
        assert!(c.is_streaming());
        assert_eq!(c.link().opened.len(), 1);

        c.handle_control(ControlMessage::StopStreaming);
        c.handle_control(ControlMessage::StopStreaming);
        assert_eq!(c.status(), StreamingStatus::stopped());
        assert_eq!(c.link().closes, 1);
    }

    #[test]
    fn stop_while_idle_does_nothing() {
        let mut c = controller();
        c.handle_remote_command("STOP");
        assert_eq!(c.status(), StreamingStatus::idle());
        assert_eq!(c.link().closes, 0);
    }

    #[test]
    fn unknown_commands_are_ignored() {
        let mut c = controller();
        for text in ["start", "Start", "HELLO", "", "START STOP"] {
            c.handle_remote_command(text);
        }
        assert_eq!(c.status(), StreamingStatus::idle());
        assert!(c.link().opened.is_empty());
    }

    #[test]
    fn frames_ignored_while_idle() {
        let mut c = controller();
        assert!(c.on_frame(&frame_at(0.0), &Wall { wall_z: -1.2 }).is_none());
        assert!(c.link().packets.borrow().is_empty());
    }

    #[test]
    fn first_frame_after_activation_smooths_from_far() {
        let mut c = controller();
        c.toggle_streaming();
        let report = c.on_frame(&frame_at(0.0), &Wall { wall_z: -1.2 }).unwrap();
        assert!((report.obstacle_dist - 8.24).abs() < 1e-4);
        assert!(!report.surveyed);
        let sent = navs(c.link());
        assert_eq!(sent.len(), 1);
        assert!((sent[0] - 8.24).abs() < 1e-4);
    }

    #[test]
    fn clear_view_decays_towards_far() {
        let mut c = controller();
        c.toggle_streaming();
        c.on_frame(&frame_at(0.0), &Wall { wall_z: -0.5 });
        let after_hit = c.estimator().smoothed();
        let report = c.on_frame(&frame_at(0.0), &Nothing).unwrap();
        assert!(report.obstacle_dist > after_hit);
        assert!(report.obstacle_dist <= 10.0);
    }

    #[test]
    fn reactivation_resets_smoother_and_anchor() {
        let mut c = controller();
        c.toggle_streaming();
        for _ in 0..20 {
            c.on_frame(&frame_at(0.0), &Wall { wall_z: -0.5 });
        }
        c.on_frame(&frame_at(-3.0), &Nothing);
        assert!(c.estimator().smoothed() < 5.0);
        assert_eq!(c.scheduler().anchor(), Vec3::new(0.0, 0.0, -3.0));

        c.toggle_streaming();
        c.toggle_streaming();
        assert_eq!(c.estimator().smoothed(), 10.0);
        assert_eq!(c.scheduler().anchor(), Vec3::zero());
        assert_eq!(c.tracking().resets, 2);
    }

    #[test]
    fn moving_past_interval_surveys_once() {
        let mut c = controller();
        c.toggle_streaming();
        let first = c.on_frame(&frame_at(0.0), &Nothing).unwrap();
        let second = c.on_frame(&frame_at(2.1), &Nothing).unwrap();
        assert!(!first.surveyed);
        assert!(second.surveyed);

        let packets = c.link().packets.borrow();
        let surveys: Vec<_> = packets
            .iter()
            .filter_map(|p| match p {
                TelemetryPacket::Survey(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(surveys.len(), 1);
        assert_eq!((surveys[0].x, surveys[0].y, surveys[0].z), (0.0, 0.0, 2.1));
    }

    #[test]
    fn endpoint_host_applies_on_next_activation() {
        let mut c = controller();
        c.toggle_streaming();
        c.handle_control(ControlMessage::SetEndpointHost(" 192.168.1.20 ".into()));
        assert_eq!(c.link().opened.last().unwrap().host, "10.0.0.5");

        c.handle_control(ControlMessage::ToggleStreaming);
        c.handle_control(ControlMessage::ToggleStreaming);
        let last = c.link().opened.last().unwrap();
        assert_eq!(last, &Endpoint::new("192.168.1.20", 5005));
        assert_eq!(c.status().label, "Streaming to 192.168.1.20:5005");
    }

    #[test]
    fn empty_host_is_rejected() {
        let mut c = controller();
        c.set_endpoint_host("   ");
        assert_eq!(c.endpoint().host, "10.0.0.5");
    }

    #[test]
    fn status_watch_sees_every_transition() {
        let mut c = controller();
        let rx = c.watch_status();
        c.handle_control(ControlMessage::RemoteCommand("START".into()));
        assert!(rx.borrow().active);
        c.handle_control(ControlMessage::RemoteCommand("STOP".into()));
        assert_eq!(rx.borrow().label, "Stopped");
    }
}
