//! Seams to the host tracking collaborator.
//!
//! The host (camera capture, world tracking) is abstracted behind three narrow
//! traits so the estimator and pipeline can run against fakes in tests or a
//! simulated walk on the command line:
//!
//! - [`RaycastSource`] – cast a ray from a viewport point into the scene.
//! - [`PoseSource`] – yields one [`TrackedFrame`] per tracked camera update.
//! - [`TrackingControl`] – asks the tracker to re-zero its world origin.

use async_trait::async_trait;

use crate::transform::{Pose, Vec3};

/// A point in normalised viewport coordinates: `(0, 0)` is the top-left
/// corner, `(1, 1)` the bottom-right, `(0.5, 0.5)` the centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportPoint {
    pub x: f32,
    pub y: f32,
}

impl ViewportPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The viewport centre.
    pub fn centre() -> Self {
        Self::new(0.5, 0.5)
    }
}

/// Anything that can answer "what surface does a ray through this viewport
/// point hit first?" for the current camera transform.
pub trait RaycastSource {
    /// World-frame position of the nearest intersection, if any.
    fn raycast(&self, point: ViewportPoint) -> Option<Vec3>;
}

/// One pose + sensor update from the tracker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackedFrame {
    /// Camera pose in the tracker's world frame.
    pub camera: Pose,
    /// Sparse world-frame feature points visible in this frame.
    pub feature_points: Vec<Vec3>,
}

/// Per-frame producer of [`TrackedFrame`]s.
///
/// Raycasts issued through the [`RaycastSource`] supertrait are answered
/// against the frame most recently returned by [`PoseSource::next_frame`].
#[async_trait]
pub trait PoseSource: RaycastSource + Send {
    /// Wait for the next tracked frame.  Returns `None` once the source has
    /// ended and no further frames will arrive.
    async fn next_frame(&mut self) -> Option<TrackedFrame>;
}

/// Control surface of the tracker.
pub trait TrackingControl: Send {
    /// Request that the tracker re-zero its world frame at the current
    /// camera position.  Takes effect from the next delivered frame.
    fn reset_origin(&mut self);
}
