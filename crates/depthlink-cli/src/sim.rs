//! Simulated tracker used by the CLI when no device is attached.
//!
//! A walker paces a straight corridor along the world Z axis:
//!
//! ```text
//!   far wall (plane detected)                back wall (glass, features only)
//!   z = −wall_distance  ◀──── walk ────▶  z = +back_distance
//! ```
//!
//! Heading toward the far wall the camera looks down −Z and ray probes hit
//! the detected plane.  On the way back it faces a glass door that no plane
//! detector would find; only its sparse feature points are visible, so the
//! obstacle estimator has to fall back on point density.

use async_trait::async_trait;
use depthlink_perception::{
    Pose, PoseSource, Quaternion, RaycastSource, TrackedFrame, TrackingControl, Vec3,
    ViewportPoint,
};
use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

/// Corridor geometry and walking speed.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub frame_rate_hz: f32,
    pub speed_mps: f32,
    /// Distance from the start to the far wall (metres).
    pub wall_distance: f32,
    /// Distance from the start to the back wall behind the walker.
    pub back_distance: f32,
    /// The walker turns around this close to a wall.
    pub turn_margin: f32,
    /// Horizontal and vertical field of view (radians).
    pub fov: f32,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: DEFAULT_FRAME_RATE_HZ,
            speed_mps: 0.8,
            wall_distance: 6.0,
            back_distance: 1.0,
            turn_margin: 0.6,
            fov: 60f32.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heading {
    TowardWall,
    TowardDoor,
}

/// [`TrackingControl`] handle for a [`SimulatedWalk`].
#[derive(Debug, Clone)]
pub struct OriginReset(Arc<AtomicBool>);

impl TrackingControl for OriginReset {
    fn reset_origin(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct SimulatedWalk {
    config: WalkConfig,
    shutdown: Arc<AtomicBool>,
    reset_requested: Arc<AtomicBool>,
    ticker: Option<Interval>,
    /// Walker position in corridor coordinates.
    position: Vec3,
    heading: Heading,
    /// Corridor position that the reported frame treats as its origin.
    origin: Vec3,
}

/// Accepted simulated frame rates (Hz).
pub const MIN_FRAME_RATE_HZ: f32 = 1.0;
pub const MAX_FRAME_RATE_HZ: f32 = 240.0;
const DEFAULT_FRAME_RATE_HZ: f32 = 30.0;

/// Map any configured rate onto `[MIN_FRAME_RATE_HZ, MAX_FRAME_RATE_HZ]`.
/// NaN and infinities fall back to 30 Hz.
pub fn clamp_frame_rate(hz: f32) -> f32 {
    if hz.is_finite() {
        hz.clamp(MIN_FRAME_RATE_HZ, MAX_FRAME_RATE_HZ)
    } else {
        DEFAULT_FRAME_RATE_HZ
    }
}

const FEATURE_SPACING: f32 = 0.05;
const FEATURE_HALF_COUNT: i32 = 10;

impl SimulatedWalk {
    pub fn new(config: WalkConfig, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            config,
            shutdown,
            reset_requested: Arc::new(AtomicBool::new(false)),
            ticker: None,
            position: Vec3::zero(),
            heading: Heading::TowardWall,
            origin: Vec3::zero(),
        }
    }

    /// Handle the session controller uses to re-zero this tracker.
    pub fn tracking_control(&self) -> OriginReset {
        OriginReset(self.reset_requested.clone())
    }

    fn frame_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / clamp_frame_rate(self.config.frame_rate_hz))
    }

    fn orientation(&self) -> Quaternion {
        match self.heading {
            Heading::TowardWall => Quaternion::identity(),
            Heading::TowardDoor => Quaternion::from_yaw(PI),
        }
    }

    /// Pose in the reported (possibly re-zeroed) frame.
    pub fn pose(&self) -> Pose {
        Pose::new(self.position.sub(self.origin), self.orientation())
    }

    /// Move the walker by `dt` seconds and build the resulting frame.
    pub fn advance(&mut self, dt: f32) -> TrackedFrame {
        if self.reset_requested.swap(false, Ordering::SeqCst) {
            self.origin = self.position;
            debug!(x = self.origin.x, z = self.origin.z, "simulated tracker re-zeroed");
        }

        let step = self.config.speed_mps * dt;
        match self.heading {
            Heading::TowardWall => {
                self.position.z -= step;
                if self.position.z <= -self.config.wall_distance + self.config.turn_margin {
                    self.heading = Heading::TowardDoor;
                }
            }
            Heading::TowardDoor => {
                self.position.z += step;
                if self.position.z >= self.config.back_distance - self.config.turn_margin {
                    self.heading = Heading::TowardWall;
                }
            }
        }

        TrackedFrame {
            camera: self.pose(),
            feature_points: self.visible_features(),
        }
    }

    /// Grid of features on the wall being faced, centred on the walker.
    fn visible_features(&self) -> Vec<Vec3> {
        let wall_z = match self.heading {
            Heading::TowardWall => -self.config.wall_distance,
            Heading::TowardDoor => self.config.back_distance,
        };
        let range = -FEATURE_HALF_COUNT..=FEATURE_HALF_COUNT;
        range
            .clone()
            .flat_map(|i| range.clone().map(move |j| (i, j)))
            .map(|(i, j)| {
                let world = Vec3::new(
                    self.position.x + i as f32 * FEATURE_SPACING,
                    self.position.y + j as f32 * FEATURE_SPACING,
                    wall_z,
                );
                world.sub(self.origin)
            })
            .collect()
    }
}

impl RaycastSource for SimulatedWalk {
    fn raycast(&self, point: ViewportPoint) -> Option<Vec3> {
        // Only the far wall is a detected plane.
        if self.heading != Heading::TowardWall {
            return None;
        }
        let half = (self.config.fov / 2.0).tan();
        let dir_camera = Vec3::new((point.x - 0.5) * 2.0 * half, (0.5 - point.y) * 2.0 * half, -1.0);
        let dir = self.orientation().rotate(dir_camera);
        if dir.z >= 0.0 {
            return None;
        }
        let t = (-self.config.wall_distance - self.position.z) / dir.z;
        if t <= 0.0 {
            return None;
        }
        Some(self.position.add(dir.scale(t)).sub(self.origin))
    }
}

#[async_trait]
impl PoseSource for SimulatedWalk {
    async fn next_frame(&mut self) -> Option<TrackedFrame> {
        if self.shutdown.load(Ordering::SeqCst) {
            return None;
        }
        let period = self.frame_period();
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        ticker.tick().await;
        if self.shutdown.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.advance(period.as_secs_f32()))
    }
}
