//! `depthlink-runtime` – streaming session orchestration.
//!
//! # Modules
//!
//! - [`scheduler`] – [`TelemetryScheduler`]: one navigation packet per frame,
//!   plus a survey packet each time the camera has travelled the survey
//!   interval from the last survey anchor.
//! - [`controller`] – [`SessionController`]: the Idle / Streaming / Stopped
//!   state machine.  Activation resets the obstacle smoother, the survey
//!   anchor and the tracker origin, then opens the telemetry link.  Remote
//!   `START` / `STOP` commands are idempotent.
//! - [`pipeline`] – [`StreamingPipeline`]: the async loop that serialises
//!   control messages and tracked frames onto one task.
//! - [`telemetry`] – [`init_tracing`]: global `tracing` subscriber with
//!   optional OTLP export.

pub mod controller;
pub mod pipeline;
pub mod scheduler;
pub mod telemetry;

pub use controller::{FrameReport, SessionController};
pub use pipeline::{PipelineStats, StreamingPipeline};
pub use scheduler::{FrameEmission, SurveyConfig, TelemetryScheduler};
pub use telemetry::{LogFormat, TracerProviderGuard, TracingOptions, init_tracing, init_tracing_with};
