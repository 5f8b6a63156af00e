//! [`TelemetryScheduler`] – per-frame packet composition.
//!
//! Every tracked frame yields one navigation packet.  A survey packet is
//! added whenever the camera has moved at least `interval_m` from the
//! survey anchor, and the anchor jumps to the triggering position.  The
//! trigger is spatial, not temporal: standing still never produces surveys
//! and fast motion never skips the spacing.

use chrono::{DateTime, Utc};
use depthlink_middleware::TelemetrySink;
use depthlink_perception::{Pose, Vec3};
use depthlink_types::{NavigationPacket, SurveyPacket, TelemetryPacket, unix_seconds};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Survey emission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    /// Displacement from the anchor that triggers a survey packet (metres).
    pub interval_m: f32,
    /// Label carried by every survey packet.
    pub label: String,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            interval_m: 2.0,
            label: "Survey Point".to_string(),
        }
    }
}

/// What a single [`TelemetryScheduler::on_frame`] call sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEmission {
    /// Displacement that triggered a survey packet, if one was sent.
    pub survey_displacement: Option<f32>,
}

impl FrameEmission {
    pub fn surveyed(&self) -> bool {
        self.survey_displacement.is_some()
    }
}

/// Builds and dispatches telemetry for each tracked frame.
#[derive(Debug, Clone)]
pub struct TelemetryScheduler {
    config: SurveyConfig,
    anchor: Vec3,
}

impl TelemetryScheduler {
    pub fn new(config: SurveyConfig) -> Self {
        Self {
            config,
            anchor: Vec3::zero(),
        }
    }

    /// Position of the last survey emission (or the origin after a reset).
    pub fn anchor(&self) -> Vec3 {
        self.anchor
    }

    /// Move the survey anchor back to the origin.
    pub fn reset(&mut self) {
        self.anchor = Vec3::zero();
    }

    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    /// Send the navigation heartbeat and, if due, a survey packet.
    pub fn on_frame(
        &mut self,
        camera: &Pose,
        obstacle_dist: f32,
        at: DateTime<Utc>,
        sink: &dyn TelemetrySink,
    ) -> FrameEmission {
        let timestamp = unix_seconds(at);
        sink.send(&navigation_packet(camera, obstacle_dist, timestamp));

        let displacement = camera.position.distance(self.anchor);
        if displacement < self.config.interval_m {
            return FrameEmission {
                survey_displacement: None,
            };
        }

        sink.send(&survey_packet(camera, &self.config.label, displacement, timestamp));
        debug!(
            displacement,
            x = camera.position.x,
            y = camera.position.y,
            z = camera.position.z,
            "survey point emitted"
        );
        self.anchor = camera.position;
        FrameEmission {
            survey_displacement: Some(displacement),
        }
    }
}

impl Default for TelemetryScheduler {
    fn default() -> Self {
        Self::new(SurveyConfig::default())
    }
}

fn navigation_packet(camera: &Pose, obstacle_dist: f32, timestamp: f64) -> TelemetryPacket {
    let p = camera.position;
    let q = camera.orientation;
    TelemetryPacket::Navigation(NavigationPacket {
        timestamp,
        x: p.x,
        y: p.y,
        z: p.z,
        qx: q.x,
        qy: q.y,
        qz: q.z,
        qw: q.w,
        obstacle_dist,
    })
}

fn survey_packet(camera: &Pose, label: &str, displacement: f32, timestamp: f64) -> TelemetryPacket {
    let p = camera.position;
    TelemetryPacket::Survey(SurveyPacket {
        timestamp,
        x: p.x,
        y: p.y,
        z: p.z,
        label: label.to_string(),
        note: format!("Auto survey after {displacement:.2} m"),
    })
}
