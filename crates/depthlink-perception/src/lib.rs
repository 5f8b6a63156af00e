//! `depthlink-perception` – obstacle sensing for a tracked handheld camera.
//!
//! Pure geometry and estimation; no I/O.  Everything here runs on the single
//! frame-processing task.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`][transform::Vec3], [`Quaternion`][transform::Quaternion]
//!   and the camera [`Pose`][transform::Pose] with world↔camera conversion.
//! - [`source`] – seams to the host tracker:
//!   [`RaycastSource`][source::RaycastSource], [`PoseSource`][source::PoseSource]
//!   and [`TrackingControl`][source::TrackingControl].
//! - [`obstacle`] – [`ObstacleEstimator`][obstacle::ObstacleEstimator]: grid
//!   raycast with a feature-point density fallback, temporally smoothed.
//! - [`smoothing`] – [`DistanceSmoother`][smoothing::DistanceSmoother]: the
//!   EWMA filter behind the streamed distance.

pub mod obstacle;
pub mod smoothing;
pub mod source;
pub mod transform;

pub use obstacle::{FAR_DISTANCE, MAX_GRID_SIZE, ObstacleConfig, ObstacleEstimator, ObstacleSample};
pub use smoothing::DistanceSmoother;
pub use source::{PoseSource, RaycastSource, TrackedFrame, TrackingControl, ViewportPoint};
pub use transform::{Pose, Quaternion, Vec3};
