//! Hybrid obstacle-distance estimator.
//!
//! Each frame produces one raw [`ObstacleSample`] from a two-tier strategy,
//! which is then folded into a [`DistanceSmoother`]:
//!
//! 1. **Grid raycast** – a square grid of probe rays is cast through viewport
//!    points inside a disk around the centre.  Hits closer than
//!    `min_ray_distance` (self-occlusion) or farther than `max_ray_distance`
//!    (open space) are discarded.  With at least `min_ray_hits` accepted hits
//!    the nearest one wins.
//! 2. **Feature-point density** – only when tier 1 lacks confidence.  World
//!    points are moved into the camera frame and counted inside a forward
//!    box.  A dense enough box is an obstacle at the nearest in-box depth.
//!
//! When neither tier fires the raw sample is the far sentinel, so the
//! smoothed distance decays toward "clear" rather than snapping to it.
//!
//! ```text
//!            camera (looks down −Z)
//!                 │
//!   z = near_z ───┼───  −0.2 m
//!                 │      ┐
//!        |x| ≤ hw │      │ density box
//!        |y| ≤ hh │      │
//!                 │      ┘
//!   z = far_z ────┼───  −2.5 m
//! ```

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::smoothing::DistanceSmoother;
use crate::source::{RaycastSource, ViewportPoint};
use crate::transform::{Pose, Vec3};

/// Distance reported when nothing is in front of the camera (metres).
pub const FAR_DISTANCE: f32 = 10.0;

/// Largest accepted `grid_size`; bigger values are clamped.
pub const MAX_GRID_SIZE: u32 = 64;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Detection thresholds.  Every field has a default, so a partial TOML table
/// overrides only what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    /// Probes per grid side, at most [`MAX_GRID_SIZE`]; odd sizes keep one
    /// probe on the centre.
    pub grid_size: u32,
    /// Radius of the probe disk as a fraction of the viewport.
    pub probe_radius: f32,
    pub min_ray_distance: f32,
    pub max_ray_distance: f32,
    /// Accepted hits required before the raycast tier is trusted.
    pub min_ray_hits: usize,
    /// Near face of the density box (camera-space z, negative).
    pub near_z: f32,
    /// Far face of the density box (camera-space z, negative).
    pub far_z: f32,
    pub half_width: f32,
    pub half_height: f32,
    /// In-box feature points needed to declare an obstacle.
    pub density_threshold: usize,
    /// Reported when the density threshold is met but no depth is available.
    pub density_fallback_distance: f32,
    pub smoothing_alpha: f32,
    pub far_distance: f32,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            grid_size: 5,
            probe_radius: 0.15,
            min_ray_distance: 0.15,
            max_ray_distance: 3.0,
            min_ray_hits: 2,
            near_z: -0.2,
            far_z: -2.5,
            half_width: 0.25,
            half_height: 0.25,
            density_threshold: 60,
            density_fallback_distance: 0.4,
            smoothing_alpha: 0.2,
            far_distance: FAR_DISTANCE,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Raw sample
// ────────────────────────────────────────────────────────────────────────────

/// Unsmoothed single-frame observation, tagged with the tier that made it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObstacleSample {
    Raycast(f32),
    Density(f32),
    /// Neither tier detected anything.
    Clear,
}

impl ObstacleSample {
    /// Raw distance fed to the smoother; `Clear` maps to `far_distance`.
    pub fn distance(self, far_distance: f32) -> f32 {
        match self {
            ObstacleSample::Raycast(d) | ObstacleSample::Density(d) => d,
            ObstacleSample::Clear => far_distance,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ObstacleEstimator
// ────────────────────────────────────────────────────────────────────────────

/// Owns the smoothed obstacle distance and produces one update per frame.
///
/// Not thread-safe by intent: it lives on the frame-processing task and is
/// only reset from that same task.
#[derive(Debug, Clone)]
pub struct ObstacleEstimator {
    config: ObstacleConfig,
    probes: Vec<ViewportPoint>,
    smoother: DistanceSmoother,
    last_sample: ObstacleSample,
}

impl ObstacleEstimator {
    pub fn new(config: ObstacleConfig) -> Self {
        let probes = probe_grid(config.grid_size, config.probe_radius);
        let smoother = DistanceSmoother::new(config.smoothing_alpha, config.far_distance);
        Self {
            config,
            probes,
            smoother,
            last_sample: ObstacleSample::Clear,
        }
    }

    pub fn config(&self) -> &ObstacleConfig {
        &self.config
    }

    /// Viewport points probed by the raycast tier, row-major.
    pub fn probe_points(&self) -> &[ViewportPoint] {
        &self.probes
    }

    /// Current smoothed distance (metres).
    pub fn smoothed(&self) -> f32 {
        self.smoother.value()
    }

    /// Raw sample of the most recent [`ObstacleEstimator::estimate`] call.
    pub fn last_sample(&self) -> ObstacleSample {
        self.last_sample
    }

    /// Return the smoothed distance to the far sentinel.
    pub fn reset(&mut self) {
        self.smoother.reset(self.config.far_distance);
        self.last_sample = ObstacleSample::Clear;
    }

    /// Run both tiers for one frame and return the updated smoothed distance.
    pub fn estimate(
        &mut self,
        camera: &Pose,
        feature_points: &[Vec3],
        raycaster: &dyn RaycastSource,
    ) -> f32 {
        let sample = self.detect(camera, feature_points, raycaster);
        let raw = sample.distance(self.config.far_distance);
        let smoothed = self.smoother.update(raw);
        trace!(?sample, raw, smoothed, "obstacle estimate");
        self.last_sample = sample;
        smoothed
    }

    /// Raw single-frame detection: raycast tier first, density fallback second.
    pub fn detect(
        &self,
        camera: &Pose,
        feature_points: &[Vec3],
        raycaster: &dyn RaycastSource,
    ) -> ObstacleSample {
        if let Some(d) = self.grid_raycast(camera, raycaster) {
            return ObstacleSample::Raycast(d);
        }
        match self.density_fallback(camera, feature_points) {
            Some(d) => ObstacleSample::Density(d),
            None => ObstacleSample::Clear,
        }
    }

    /// Tier 1.  Returns the nearest accepted hit when enough probes agree.
    pub fn grid_raycast(&self, camera: &Pose, raycaster: &dyn RaycastSource) -> Option<f32> {
        let accepted = self.probes.iter().filter_map(|&point| {
            let hit = raycaster.raycast(point)?;
            let d = camera.position.distance(hit);
            (d >= self.config.min_ray_distance && d <= self.config.max_ray_distance).then_some(d)
        });
        nearest_if_confident(accepted, self.config.min_ray_hits)
    }

    /// Tier 2.  Returns the clamped nearest in-box depth when the box is
    /// dense enough.
    pub fn density_fallback(&self, camera: &Pose, feature_points: &[Vec3]) -> Option<f32> {
        let cfg = &self.config;
        let mut count = 0usize;
        let mut nearest: Option<f32> = None;

        for &world in feature_points {
            let p = camera.world_to_camera(world);
            let in_depth = p.z < cfg.near_z && p.z > cfg.far_z;
            if in_depth && p.x.abs() <= cfg.half_width && p.y.abs() <= cfg.half_height {
                count += 1;
                let depth = p.z.abs();
                nearest = Some(nearest.map_or(depth, |n: f32| n.min(depth)));
            }
        }

        if count < cfg.density_threshold {
            return None;
        }
        Some(match nearest {
            Some(depth) => depth.clamp(cfg.min_ray_distance, cfg.max_ray_distance),
            None => cfg.density_fallback_distance,
        })
    }
}

impl Default for ObstacleEstimator {
    fn default() -> Self {
        Self::new(ObstacleConfig::default())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

/// Minimum of `distances` provided at least `min_hits` of them exist.
fn nearest_if_confident(distances: impl Iterator<Item = f32>, min_hits: usize) -> Option<f32> {
    let (hits, nearest) = distances.fold((0usize, f32::INFINITY), |(n, best), d| (n + 1, best.min(d)));
    (hits >= min_hits && hits > 0).then_some(nearest)
}

/// Viewport probe positions for a `size × size` grid scaled into a disk of
/// `radius` around the centre.  Grid corners outside the unit disk are
/// skipped.
fn probe_grid(size: u32, radius: f32) -> Vec<ViewportPoint> {
    let size = size.clamp(1, MAX_GRID_SIZE) as i32;
    let half = size / 2;
    let denom = half.max(1) as f32;
    let centre = ViewportPoint::centre();

    let mut points = Vec::with_capacity((size * size) as usize);
    for row in 0..size {
        for col in 0..size {
            let u = (col - half) as f32 / denom;
            let v = (row - half) as f32 / denom;
            if u * u + v * v > 1.0 + f32::EPSILON {
                continue;
            }
            points.push(ViewportPoint::new(centre.x + u * radius, centre.y + v * radius));
        }
    }
    points
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
